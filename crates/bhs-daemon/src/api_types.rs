//! Response types for bhs-daemon HTTP endpoints.
//!
//! `/v1/status` returns [`crate::state::StatusSnapshot`] directly.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}
