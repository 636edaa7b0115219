//! HTTP status mapping for transport errors

use crate::transport::TransportError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Map an unsuccessful HTTP response to a [`TransportError`]
pub fn map_http_error(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<String>,
    request_id: Uuid,
) -> TransportError {
    let error_details = body
        .as_ref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_details(&v));

    let error_message = error_details
        .as_ref()
        .map(|d| d.message.clone())
        .or_else(|| body.clone().filter(|b| !b.is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    let message_with_id = format!("{} [request_id: {}]", error_message, request_id);

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => TransportError::Authentication {
            message: message_with_id,
        },

        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = headers
                .and_then(|h| h.get(RETRY_AFTER))
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after)
                .or_else(|| {
                    error_details
                        .and_then(|d| d.retry_after_seconds)
                        .map(Duration::from_secs)
                });

            TransportError::RateLimit { retry_after }
        }

        StatusCode::BAD_REQUEST => TransportError::InvalidRequest {
            message: message_with_id,
        },

        StatusCode::NOT_FOUND => TransportError::ModelNotAvailable {
            model: extract_model_from_error(&error_message).unwrap_or_else(|| "unknown".to_string()),
        },

        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TransportError::Timeout,

        status if status.is_server_error() => TransportError::ServerError {
            status_code: status.as_u16(),
            message: message_with_id,
        },

        status if status.is_client_error() => TransportError::InvalidRequest {
            message: message_with_id,
        },

        _ => TransportError::Custom {
            code: format!("HTTP_{}", status.as_u16()),
            message: message_with_id,
        },
    }
}

struct ErrorDetails {
    message: String,
    retry_after_seconds: Option<u64>,
}

fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // { "error": { "message": "...", "type": "..." } }
    if let Some(error) = json.get("error") {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: error.get("retry_after").and_then(Value::as_u64),
            });
        }
        if let Some(message) = error.as_str() {
            return Some(ErrorDetails {
                message: message.to_string(),
                retry_after_seconds: None,
            });
        }
    }

    json.get("message").and_then(Value::as_str).map(|message| ErrorDetails {
        message: message.to_string(),
        retry_after_seconds: json.get("retry_after").and_then(Value::as_u64),
    })
}

/// Model name from messages like "model 'gpt-4' not found"
fn extract_model_from_error(message: &str) -> Option<String> {
    ["model '", "model \"", "model `"].iter().find_map(|prefix| {
        let start = message.find(prefix)? + prefix.len();
        let quote = prefix.chars().last()?;
        let end = message[start..].find(quote)?;
        Some(message[start..start + end].to_string())
    })
}

/// Parse a Retry-After header given in seconds
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    header_value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    #[test_case(StatusCode::UNAUTHORIZED, "authentication" ; "unauthorized")]
    #[test_case(StatusCode::BAD_REQUEST, "invalid" ; "bad request")]
    #[test_case(StatusCode::GATEWAY_TIMEOUT, "timeout" ; "gateway timeout")]
    #[test_case(StatusCode::BAD_GATEWAY, "server" ; "bad gateway")]
    #[test_case(StatusCode::UNPROCESSABLE_ENTITY, "invalid" ; "unprocessable")]
    fn test_status_mapping(status: StatusCode, expected: &str) {
        let err = map_http_error(status, None, None, Uuid::new_v4());
        let kind = match err {
            TransportError::Authentication { .. } => "authentication",
            TransportError::InvalidRequest { .. } => "invalid",
            TransportError::Timeout => "timeout",
            TransportError::ServerError { .. } => "server",
            _ => "other",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_rate_limit_prefers_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let body = r#"{"error": {"message": "slow down", "retry_after": 30}}"#.to_string();

        match map_http_error(StatusCode::TOO_MANY_REQUESTS, Some(&headers), Some(body), Uuid::new_v4()) {
            TransportError::RateLimit { retry_after } => assert_eq!(retry_after, Some(Duration::from_secs(7))),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_not_found_extracts_model() {
        let body = r#"{"error": {"message": "The model 'gpt-9' does not exist"}}"#.to_string();
        match map_http_error(StatusCode::NOT_FOUND, None, Some(body), Uuid::new_v4()) {
            TransportError::ModelNotAvailable { model } => assert_eq!(model, "gpt-9"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_message_carries_request_id() {
        let id = Uuid::new_v4();
        let body = r#"{"message": "bad field"}"#.to_string();
        match map_http_error(StatusCode::BAD_REQUEST, None, Some(body), id) {
            TransportError::InvalidRequest { message } => {
                assert!(message.starts_with("bad field"));
                assert!(message.contains(&id.to_string()));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
