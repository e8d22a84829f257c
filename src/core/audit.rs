//! Audit trail of outbound HTTP calls

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One outbound call attempt. Appended once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAuditRecord {
    /// Assigned by the store on append.
    #[serde(default)]
    pub id: u64,
    /// Request URL without its query string.
    pub request_url: String,
    pub request_method: String,
    pub request_body: Option<String>,
    /// Request headers as a JSON object.
    pub request_headers: Option<String>,
    /// Raw response text, only set on success.
    pub response_text: Option<String>,
    pub created: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub error: Option<String>,
}

impl CallAuditRecord {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// One failed call, with enough detail to diagnose it later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    #[serde(default)]
    pub id: u64,
    pub request_url: String,
    pub request_method: String,
    pub request_body: Option<String>,
    pub error: String,
    pub traceback: String,
    pub created: DateTime<Utc>,
}
