use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender.
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Creates an event channel pair for wiring services to a consumer.
pub fn event_channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity);
    (EventSender::new(tx), rx)
}

/// Events emitted after a successful commit. The core only exposes them;
/// broadcasting to UIs or notification channels is an outer layer's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Stock intake
    StockReceived {
        facility_id: i64,
        product_id: i64,
        lot_id: i64,
        quantity: Decimal,
    },
    OrderReceived {
        facility_id: i64,
        order_id: Uuid,
        line_count: usize,
    },
    TransferReceived {
        facility_id: i64,
        transfer_id: Uuid,
        line_count: usize,
    },

    // Stock consumption
    DispenseCompleted {
        facility_id: i64,
        dispense_id: Uuid,
        line_count: usize,
        total_issued: Decimal,
    },
    BulkDispenseCompleted {
        facility_id: i64,
        dispense_id: Uuid,
        line_count: usize,
        total_issued: Decimal,
    },
    TransferDispatched {
        facility_id: i64,
        transfer_id: Uuid,
        line_count: usize,
    },

    // Lot maintenance
    StockAdjusted {
        facility_id: i64,
        product_id: i64,
        lot_id: i64,
        old_quantity: Decimal,
        new_quantity: Decimal,
    },

    // Reporting
    MonthlyReportGenerated {
        report_id: i64,
        facility_id: i64,
        period: String,
        item_count: usize,
        regenerated: bool,
    },
    MonthlyReportItemEdited {
        report_id: i64,
        item_id: i64,
        product_id: i64,
    },

    /// Generic event data for outer-layer extensions.
    Generic {
        message: String,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    },
}
