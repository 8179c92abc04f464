//! Shared response types for the admin API.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Basic service information returned by the root endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// Service name
    #[schema(example = "rad-aggregator")]
    pub service: String,
    /// Service version
    #[schema(example = "0.1.0")]
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "rad-aggregator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
