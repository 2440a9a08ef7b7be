use serde::{Deserialize, Serialize};
use ts_rs::TS;

pub mod auth;
pub mod health;
pub mod tasks;
pub mod teams;
pub mod users;

/// Confirmation body for operations that have nothing else to return.
#[derive(Debug, Serialize, Deserialize, TS)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
