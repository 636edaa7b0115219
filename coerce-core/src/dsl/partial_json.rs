//! Parsing of truncated JSON
//!
//! A streamed payload is valid JSON only once the stream ends. Until then
//! [`parse_partial`] cuts the text back to the last settled point and lets
//! `jsonrepair` close whatever is still open. An open string value is kept
//! as it stands. A key without a value, an unfinished number or literal, and
//! a half-received escape all wait for more input.

use crate::error::DecodeError;
use jsonrepair::{repair_json, Options};
use serde_json::Value;

/// Parse a JSON prefix; `Ok(None)` when no value has settled yet
pub fn parse_partial(text: &str) -> Result<Option<Value>, DecodeError> {
    let settled = &text[..settled_len(text)];
    if settled.trim().is_empty() {
        return Ok(None);
    }
    if let Ok(value) = serde_json::from_str(settled) {
        return Ok(Some(value));
    }

    let repaired = repair_json(settled, &Options::default())
        .map_err(|e| DecodeError::new(format!("cannot close partial JSON: {}", e), settled))?;
    serde_json::from_str(&repaired)
        .map(Some)
        .map_err(|e| DecodeError::new(e.to_string(), settled))
}

enum Frame {
    Object { expect_key: bool },
    Array,
}

#[derive(Clone, Copy, PartialEq)]
enum Open {
    Key,
    Value,
}

#[derive(Clone, Copy)]
enum Escape {
    None,
    Started,
    Unicode(u32, u8),
}

/// Length of the longest prefix that ends on a settled value boundary
fn settled_len(text: &str) -> usize {
    let mut stack: Vec<Frame> = Vec::new();
    let mut settled = 0;
    let mut string: Option<Open> = None;
    let mut escape = Escape::None;
    // A high surrogate is only settled together with its low half
    let mut high_surrogate = false;

    for (i, ch) in text.char_indices() {
        let end = i + ch.len_utf8();

        if let Some(open) = string {
            let unit = match escape {
                Escape::Started if ch == 'u' => {
                    escape = Escape::Unicode(0, 0);
                    continue;
                }
                Escape::Started => {
                    escape = Escape::None;
                    None
                }
                Escape::Unicode(code, n) => {
                    let code = (code << 4) | ch.to_digit(16).unwrap_or(0);
                    if n < 3 {
                        escape = Escape::Unicode(code, n + 1);
                        continue;
                    }
                    escape = Escape::None;
                    Some(code)
                }
                Escape::None if ch == '\\' => {
                    escape = Escape::Started;
                    continue;
                }
                Escape::None if ch == '"' => {
                    if open == Open::Value {
                        settled = end;
                    }
                    string = None;
                    high_surrogate = false;
                    continue;
                }
                Escape::None => None,
            };

            high_surrogate = unit.is_some_and(|code| (0xD800..0xDC00).contains(&code));
            if open == Open::Value && !high_surrogate {
                settled = end;
            }
            continue;
        }

        match ch {
            '{' => {
                stack.push(Frame::Object { expect_key: true });
                settled = end;
            }
            '[' => {
                stack.push(Frame::Array);
                settled = end;
            }
            '}' | ']' => {
                stack.pop();
                settled = end;
                if stack.is_empty() {
                    break;
                }
            }
            ',' => {
                if let Some(Frame::Object { expect_key }) = stack.last_mut() {
                    *expect_key = true;
                }
                settled = i;
            }
            ':' => {
                if let Some(Frame::Object { expect_key }) = stack.last_mut() {
                    *expect_key = false;
                }
            }
            '"' => {
                string = Some(match stack.last() {
                    Some(Frame::Object { expect_key: true }) => Open::Key,
                    _ => Open::Value,
                });
            }
            _ => {}
        }
    }

    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_complete_document() {
        assert_eq!(
            parse_partial(r#"{"a": [1, 2.5, true, null], "b": "x"}"#).unwrap(),
            Some(json!({"a": [1, 2.5, true, null], "b": "x"}))
        );
    }

    #[test]
    fn test_open_string_is_kept() {
        assert_eq!(parse_partial(r#"{"name": "Ja"#).unwrap(), Some(json!({"name": "Ja"})));
    }

    #[test]
    fn test_dangling_key_is_dropped() {
        assert_eq!(
            parse_partial(r#"{"name": "Jason", "ag"#).unwrap(),
            Some(json!({"name": "Jason"}))
        );
        assert_eq!(
            parse_partial(r#"{"name": "Jason", "age": "#).unwrap(),
            Some(json!({"name": "Jason"}))
        );
    }

    #[test]
    fn test_trailing_number_and_literal_wait_for_more() {
        assert_eq!(parse_partial(r#"{"age": 1"#).unwrap(), Some(json!({})));
        assert_eq!(parse_partial(r#"{"ok": tr"#).unwrap(), Some(json!({})));
        assert_eq!(parse_partial(r#"[1, 2"#).unwrap(), Some(json!([1])));
        assert_eq!(parse_partial(r#"{"age": 12}"#).unwrap(), Some(json!({"age": 12})));
    }

    #[test]
    fn test_nested_containers_are_closed() {
        assert_eq!(
            parse_partial(r#"{"tasks": [{"name": "a"}, {"name": "b"#).unwrap(),
            Some(json!({"tasks": [{"name": "a"}, {"name": "b"}]}))
        );
    }

    #[test]
    fn test_surrogate_pairs_survive() {
        assert_eq!(
            parse_partial(r#"{"emoji": "\ud83d\ude00", "name": "J"#).unwrap(),
            Some(json!({"emoji": "😀", "name": "J"}))
        );
        // Only the high half has arrived
        assert_eq!(parse_partial(r#"{"s": "a\ud83d"#).unwrap(), Some(json!({"s": "a"})));
        assert_eq!(parse_partial(r#"{"s": "a\ud83d\ude"#).unwrap(), Some(json!({"s": "a"})));
    }

    #[test]
    fn test_half_escapes_wait() {
        assert_eq!(parse_partial(r#"{"s": "line\"#).unwrap(), Some(json!({"s": "line"})));
        assert_eq!(parse_partial(r#"{"s": "caf\u00"#).unwrap(), Some(json!({"s": "caf"})));
        assert_eq!(
            parse_partial(r#"{"s": "a\"b\né"}"#).unwrap(),
            Some(json!({"s": "a\"b\né"}))
        );
    }

    #[test]
    fn test_trailing_text_after_root() {
        assert_eq!(
            parse_partial("{\"a\": 1}\n```").unwrap(),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn test_nothing_settled() {
        assert_eq!(parse_partial("   ").unwrap(), None);
        assert_eq!(parse_partial(r#"{"ab"#).unwrap(), Some(json!({})));
    }
}
