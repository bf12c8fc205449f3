use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240201_000001_create_facilities_table::Migration),
            Box::new(m20240201_000002_create_products_table::Migration),
            Box::new(m20240201_000003_create_stock_lots_table::Migration),
            Box::new(m20240201_000004_create_stock_movements_table::Migration),
            Box::new(m20240201_000005_create_monthly_reports_tables::Migration),
        ]
    }
}

// Migration implementations

mod m20240201_000001_create_facilities_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000001_create_facilities_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Facilities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Facilities::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Facilities::Code).string().not_null())
                        .col(ColumnDef::new(Facilities::Name).string().not_null())
                        .col(ColumnDef::new(Facilities::FacilityType).string().not_null())
                        .col(
                            ColumnDef::new(Facilities::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Facilities::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Facilities::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_facilities_code")
                        .table(Facilities::Table)
                        .col(Facilities::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Facilities::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Facilities {
        Table,
        Id,
        Code,
        Name,
        FacilityType,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000002_create_products_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000002_create_products_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Products::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Products::Code).string().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::UnitOfMeasure).string().not_null())
                        .col(ColumnDef::new(Products::LeadTimeMonths).integer().null())
                        .col(
                            ColumnDef::new(Products::Active)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(Products::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(Products::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_products_code")
                        .table(Products::Table)
                        .col(Products::Code)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Code,
        Name,
        UnitOfMeasure,
        LeadTimeMonths,
        Active,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000003_create_stock_lots_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000003_create_stock_lots_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockLots::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockLots::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(StockLots::FacilityId).big_integer().not_null())
                        .col(ColumnDef::new(StockLots::ProductId).big_integer().not_null())
                        .col(ColumnDef::new(StockLots::BatchNumber).string().not_null())
                        .col(ColumnDef::new(StockLots::ExpiryDate).date().null())
                        .col(
                            ColumnDef::new(StockLots::Quantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockLots::UnitOfMeasure).string().not_null())
                        .col(ColumnDef::new(StockLots::Barcode).string().null())
                        .col(ColumnDef::new(StockLots::CreatedAt).timestamp().not_null())
                        .col(ColumnDef::new(StockLots::UpdatedAt).timestamp().not_null())
                        .to_owned(),
                )
                .await?;

            // One lot row per batch at a location; receipts merge into it.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_lots_facility_product_batch")
                        .table(StockLots::Table)
                        .col(StockLots::FacilityId)
                        .col(StockLots::ProductId)
                        .col(StockLots::BatchNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_lots_expiry")
                        .table(StockLots::Table)
                        .col(StockLots::ExpiryDate)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockLots::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockLots {
        Table,
        Id,
        FacilityId,
        ProductId,
        BatchNumber,
        ExpiryDate,
        Quantity,
        UnitOfMeasure,
        Barcode,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240201_000004_create_stock_movements_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000004_create_stock_movements_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(StockMovements::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(StockMovements::Id)
                                .uuid()
                                .not_null()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::FacilityId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(StockMovements::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(StockMovements::MovementType).string().not_null())
                        .col(ColumnDef::new(StockMovements::SourceType).string().not_null())
                        .col(ColumnDef::new(StockMovements::SourceId).uuid().not_null())
                        .col(ColumnDef::new(StockMovements::SourceItemId).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::ReceivedQuantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(StockMovements::IssuedQuantity)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(StockMovements::BatchNumber).string().null())
                        .col(ColumnDef::new(StockMovements::ExpiryDate).date().null())
                        .col(ColumnDef::new(StockMovements::MovementDate).date().not_null())
                        .col(ColumnDef::new(StockMovements::ReferenceNumber).string().null())
                        .col(ColumnDef::new(StockMovements::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(StockMovements::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_facility_product_date")
                        .table(StockMovements::Table)
                        .col(StockMovements::FacilityId)
                        .col(StockMovements::ProductId)
                        .col(StockMovements::MovementDate)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_stock_movements_source")
                        .table(StockMovements::Table)
                        .col(StockMovements::SourceType)
                        .col(StockMovements::SourceId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(StockMovements::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum StockMovements {
        Table,
        Id,
        FacilityId,
        ProductId,
        MovementType,
        SourceType,
        SourceId,
        SourceItemId,
        ReceivedQuantity,
        IssuedQuantity,
        BatchNumber,
        ExpiryDate,
        MovementDate,
        ReferenceNumber,
        CreatedBy,
        CreatedAt,
    }
}

mod m20240201_000005_create_monthly_reports_tables {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240201_000005_create_monthly_reports_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(MonthlyReports::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MonthlyReports::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReports::FacilityId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MonthlyReports::Period).string().not_null())
                        .col(
                            ColumnDef::new(MonthlyReports::GeneratedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(ColumnDef::new(MonthlyReports::CreatedBy).uuid().null())
                        .col(
                            ColumnDef::new(MonthlyReports::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReports::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One report per facility per month.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_monthly_reports_facility_period")
                        .table(MonthlyReports::Table)
                        .col(MonthlyReports::FacilityId)
                        .col(MonthlyReports::Period)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(MonthlyReportItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(MonthlyReportItems::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::ReportId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::ProductId)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::OpeningBalance)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::StockReceived)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::StockIssued)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::PositiveAdjustments)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::NegativeAdjustments)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::ClosingBalance)
                                .decimal_len(19, 4)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::StockoutDays)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::CreatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(MonthlyReportItems::UpdatedAt)
                                .timestamp()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One row per product per report.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_monthly_report_items_report_product")
                        .table(MonthlyReportItems::Table)
                        .col(MonthlyReportItems::ReportId)
                        .col(MonthlyReportItems::ProductId)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(MonthlyReportItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(MonthlyReports::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum MonthlyReports {
        Table,
        Id,
        FacilityId,
        Period,
        GeneratedAt,
        CreatedBy,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum MonthlyReportItems {
        Table,
        Id,
        ReportId,
        ProductId,
        OpeningBalance,
        StockReceived,
        StockIssued,
        PositiveAdjustments,
        NegativeAdjustments,
        ClosingBalance,
        StockoutDays,
        CreatedAt,
        UpdatedAt,
    }
}
