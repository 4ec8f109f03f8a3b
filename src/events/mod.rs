use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::ProductRef;

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
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the consumer is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "dropping domain event");
        }
    }
}

/// Domain events raised along the cart to paid-order path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    CartCleared {
        user_id: String,
        lines_removed: u64,
    },
    CheckoutSessionCreated {
        order_id: Uuid,
        user_id: String,
        session_id: String,
    },
    OrderPaid {
        order_id: Uuid,
        session_id: String,
    },
    DuplicatePaymentConfirmation {
        session_id: String,
    },
    InventoryDecremented {
        product: ProductRef,
        quantity: i32,
        remaining: i32,
    },
    InventoryOversold {
        product: ProductRef,
        requested: i32,
        available: i32,
    },
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::CartCleared {
                user_id,
                lines_removed,
            } => {
                info!(user_id = %user_id, lines_removed, "cart cleared");
            }
            Event::CheckoutSessionCreated {
                order_id,
                user_id,
                session_id,
            } => {
                info!(%order_id, user_id = %user_id, session_id = %session_id, "checkout session created");
            }
            Event::OrderPaid {
                order_id,
                session_id,
            } => {
                info!(%order_id, session_id = %session_id, "order paid");
            }
            Event::DuplicatePaymentConfirmation { session_id } => {
                info!(session_id = %session_id, "duplicate payment confirmation ignored");
            }
            Event::InventoryDecremented {
                product,
                quantity,
                remaining,
            } => {
                info!(product = %product, quantity, remaining, "inventory decremented");
            }
            Event::InventoryOversold {
                product,
                requested,
                available,
            } => {
                warn!(product = %product, requested, available, "inventory oversold");
            }
        }
    }

    info!("Event processing loop finished");
}
