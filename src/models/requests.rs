//! Request DTOs for the cache server API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::cache::MAX_KEY_LENGTH;

/// Request body for the SET operation (PUT /set)
///
/// # Fields
/// - `key`: The cache key to store the value under
/// - `value`: Any JSON value
/// - `lifetime`: Seconds until expiry; absent, 0 or negative never expires
/// - `options`: Optional attributes stored next to the value
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub lifetime: Option<i64>,
    #[serde(default)]
    pub options: Option<Map<String, Value>>,
}

impl SetRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        validate_key(&self.key)
    }
}

/// Request body for PUT /engine
#[derive(Debug, Clone, Deserialize)]
pub struct EngineRequest {
    pub engine: String,
}

impl EngineRequest {
    pub fn validate(&self) -> Option<String> {
        if self.engine.trim().is_empty() {
            return Some("Engine cannot be empty".to_string());
        }
        None
    }
}

/// Shared key validation for body and path parameters.
pub fn validate_key(key: &str) -> Option<String> {
    if key.trim().is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > MAX_KEY_LENGTH {
        return Some(format!(
            "Key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_request_deserialize() {
        let json = r#"{"key": "cmd12", "value": {"state": 1}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key, "cmd12");
        assert_eq!(req.value, json!({"state": 1}));
        assert!(req.lifetime.is_none());
        assert!(req.options.is_none());
    }

    #[test]
    fn test_set_request_with_lifetime_and_options() {
        let json = r#"{"key": "k", "value": "v", "lifetime": -1, "options": {"src": "poll"}}"#;
        let req: SetRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.lifetime, Some(-1));
        assert_eq!(req.options.unwrap().get("src"), Some(&json!("poll")));
    }

    #[test]
    fn test_validate_keys() {
        assert!(validate_key("").is_some());
        assert!(validate_key("   ").is_some());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH + 1)).is_some());
        assert!(validate_key(&"k".repeat(MAX_KEY_LENGTH)).is_none());
        assert!(validate_key("widgetHtmlmobile12").is_none());
    }

    #[test]
    fn test_engine_request_validation() {
        let req: EngineRequest = serde_json::from_str(r#"{"engine": " "}"#).unwrap();
        assert!(req.validate().is_some());
        let req: EngineRequest = serde_json::from_str(r#"{"engine": "RedisCache"}"#).unwrap();
        assert!(req.validate().is_none());
    }
}
