use serde::{Deserialize, Serialize};

/// JSON error body returned by the HTTP surface, e.g.
/// `{"error": "Not authenticated"}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
