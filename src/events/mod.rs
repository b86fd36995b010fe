use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::{Location, TransferStatus};
use crate::errors::ServiceError;

/// Transfer lifecycle notifications, emitted only after the owning
/// transaction has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    TransferCreated {
        transfer_id: Uuid,
        from_location: Location,
        to_location: Location,
        part_number: String,
        quantity: i32,
    },
    TransferStatusChanged {
        transfer_id: Uuid,
        old_status: TransferStatus,
        new_status: TransferStatus,
        actor: String,
        quantity: Option<i32>,
        timestamp: DateTime<Utc>,
    },
    TransferDeleted {
        transfer_id: Uuid,
        actor: String,
    },
    TransferPartNumberChanged {
        transfer_id: Uuid,
        old_part_number: String,
        new_part_number: String,
    },
    StockAdjusted {
        location: Location,
        part_number: String,
        delta: i32,
        new_quantity: i32,
        transfer_id: Uuid,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), ServiceError> {
        self.sender
            .send(event)
            .await
            .map_err(|e| ServiceError::EventError(format!("Failed to send event: {}", e)))
    }

    /// Delivery failures never undo a committed transition; they are logged.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "event dropped after commit");
        }
    }
}

/// Builds a bounded channel and the sender half wrapped for the service.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::TransferCreated {
                transfer_id,
                from_location,
                to_location,
                part_number,
                quantity,
            } => {
                info!(
                    %transfer_id,
                    from = %from_location,
                    to = %to_location,
                    part_number = %part_number,
                    quantity,
                    "transfer created"
                );
            }
            Event::TransferStatusChanged {
                transfer_id,
                old_status,
                new_status,
                actor,
                quantity,
                timestamp,
            } => {
                info!(
                    %transfer_id,
                    old_status = %old_status,
                    new_status = %new_status,
                    actor = %actor,
                    quantity = ?quantity,
                    at = %timestamp,
                    "transfer status changed"
                );
            }
            Event::TransferDeleted { transfer_id, actor } => {
                info!(%transfer_id, actor = %actor, "transfer deleted");
            }
            Event::TransferPartNumberChanged {
                transfer_id,
                old_part_number,
                new_part_number,
            } => {
                info!(
                    %transfer_id,
                    old = %old_part_number,
                    new = %new_part_number,
                    "transfer part number changed"
                );
            }
            Event::StockAdjusted {
                location,
                part_number,
                delta,
                new_quantity,
                transfer_id,
            } => {
                info!(
                    location = %location,
                    part_number = %part_number,
                    delta,
                    new_quantity,
                    %transfer_id,
                    "stock adjusted"
                );
            }
        }
    }

    info!("Event processing loop finished");
}
