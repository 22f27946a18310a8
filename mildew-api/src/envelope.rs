/// Result envelope returned by the detection and registration endpoints
///
/// ```json
/// {
///   "is_success": true,
///   "message": "识别成功",
///   "created_at": "2024-06-01T08:30:00Z",
///   "data": [...]
/// }
/// ```
///
/// Endpoint-specific fields (`grades`, `classes`, `image_path`, ...) sit next
/// to `data` at the top level.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Message for a successful detection
pub const DETECT_OK: &str = "识别成功";

/// Message for a successful registration
pub const REGISTER_OK: &str = "注册成功";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub is_success: bool,
    pub message: String,

    /// UTC, to the second, `Z` suffix
    pub created_at: String,

    pub data: JsonValue,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Envelope {
    pub fn success(message: impl Into<String>, data: JsonValue) -> Self {
        Self {
            is_success: true,
            message: message.into(),
            created_at: timestamp(),
            data,
            extra: Map::new(),
        }
    }

    /// Failed result with empty `data`
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            is_success: false,
            message: message.into(),
            created_at: timestamp(),
            data: JsonValue::Array(Vec::new()),
            extra: Map::new(),
        }
    }

    /// Adds a top-level field
    pub fn with(mut self, key: &str, value: JsonValue) -> Self {
        self.extra.insert(key.to_string(), value);
        self
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
