//! Inbound payment gateway webhooks: signature checks and the event envelope.
pub mod signature;

use serde::Deserialize;

pub use signature::{sign_payload, SignatureHeader, WebhookVerifier, SIGNATURE_HEADER};

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";

/// The subset of a gateway event this service reads.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: SessionObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionObject {
    pub id: String,
    #[serde(default)]
    pub metadata: SessionMetadata,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionMetadata {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
}

impl WebhookEvent {
    pub fn is_checkout_completed(&self) -> bool {
        self.event_type == CHECKOUT_SESSION_COMPLETED
    }
}
