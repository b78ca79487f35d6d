//! HTTP request handlers for the API service.

use serde::Serialize;

pub mod health;
pub mod metrics;
pub mod private;
pub mod public;

pub use health::health_check;
pub use metrics::metrics_handler;
pub use private::{get_private_data, get_profile};
pub use public::get_public;

/// Envelope shared by the service's JSON endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub status: &'static str,
    pub message: &'static str,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: &'static str, data: Option<T>) -> Self {
        Self {
            status: "success",
            message,
            data,
        }
    }
}
