//! # JSON Codec
//!
//! Request bodies are parsed with simd-json; responses, error envelopes and
//! the OpenAPI document are written with serde_json.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles JSON serialization/deserialization
//! - **O**: Extensible via serde traits
//! - **D**: Depends on serde abstractions, not concrete parsers

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse a JSON string into a typed value using simd-json
///
/// # Errors
///
/// Returns `Error::JsonParse` if parsing fails
pub fn parse_json<T: DeserializeOwned>(json_str: &str) -> Result<T> {
    let mut bytes = json_str.as_bytes().to_vec();
    parse_json_bytes(&mut bytes)
}

/// Parse JSON bytes into a typed value using simd-json
///
/// The parser works in place, so the buffer is clobbered.
///
/// # Errors
///
/// Returns `Error::JsonParse` if parsing fails
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::JsonParse {
        reason: e.to_string(),
    })
}

/// Serialize a value to a JSON byte buffer
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized
pub fn to_json_vec<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Serialize a value to a pretty-printed JSON string
///
/// # Errors
///
/// Returns `Error::Json` if the value cannot be serialized
pub fn to_json_pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct CreateUser {
        name: String,
        #[serde(default)]
        tags: Vec<String>,
    }

    #[test]
    fn test_parse_request_body() {
        let mut body = br#"{"name": "Ada", "tags": ["admin"]}"#.to_vec();
        let user: CreateUser = parse_json_bytes(&mut body).unwrap();
        assert_eq!(user.name, "Ada");
        assert_eq!(user.tags, vec!["admin".to_string()]);
    }

    #[test]
    fn test_parse_str_with_defaults() {
        let user: CreateUser = parse_json(r#"{"name": "Grace"}"#).unwrap();
        assert!(user.tags.is_empty());
    }

    #[test]
    fn test_parse_error_has_reason() {
        let err = parse_json::<CreateUser>(r#"{"name": 42}"#).unwrap_err();
        match err {
            Error::JsonParse { reason } => assert!(!reason.is_empty()),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(matches!(parse_json::<CreateUser>("{"), Err(Error::JsonParse { .. })));
    }

    #[test]
    fn test_serialize() {
        let user = CreateUser {
            name: "Bob".to_string(),
            tags: Vec::new(),
        };
        assert_eq!(to_json_vec(&user).unwrap(), br#"{"name":"Bob","tags":[]}"#.to_vec());
        assert!(to_json_pretty(&user).unwrap().contains("\n"));
    }
}
