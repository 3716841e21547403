use kiln_common::SourceFormat;
use serde_json::{Map, Value};

/// Field aliases that may carry the text of a structured frame, in priority
/// order after the nested `result.content`.
const CONTENT_ALIASES: &[&str] = &["content", "message", "log", "text"];

/// One decoded live-stream frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON object envelope whose text was found under a known field.
    Structured { content: String },
    /// Anything else, used verbatim.
    PlainText { content: String },
}

impl Frame {
    /// Decode a raw frame body.
    ///
    /// Structured decoding is attempted only when the payload is shaped like a
    /// JSON object (`{ ... }`). Malformed JSON, non-object JSON, and objects
    /// without a string under any known alias are kept as plain text.
    pub fn decode(raw: &str) -> Frame {
        if looks_structured(raw)
            && let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw.trim())
            && let Some(content) = extract_content(&map)
        {
            return Frame::Structured {
                content: strip_line_ending(content).to_string(),
            };
        }
        Frame::PlainText {
            content: strip_line_ending(raw).to_string(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Frame::Structured { content } | Frame::PlainText { content } => content,
        }
    }

    pub fn source_format(&self) -> SourceFormat {
        match self {
            Frame::Structured { .. } => SourceFormat::Structured,
            Frame::PlainText { .. } => SourceFormat::Plain,
        }
    }
}

fn looks_structured(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.starts_with('{') && trimmed.ends_with('}')
}

fn extract_content(map: &Map<String, Value>) -> Option<&str> {
    if let Some(content) = map
        .get("result")
        .and_then(|r| r.get("content"))
        .and_then(Value::as_str)
    {
        return Some(content);
    }
    CONTENT_ALIASES
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
}

fn strip_line_ending(s: &str) -> &str {
    s.trim_end_matches(['\n', '\r'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_result_content() {
        let frame = Frame::decode(r#"{"result":{"content":"hello"}}"#);
        assert_eq!(
            frame,
            Frame::Structured {
                content: "hello".to_string()
            }
        );
    }

    #[test]
    fn test_flat_aliases_in_priority_order() {
        assert_eq!(Frame::decode(r#"{"content":"a"}"#).content(), "a");
        assert_eq!(Frame::decode(r#"{"message":"b"}"#).content(), "b");
        assert_eq!(Frame::decode(r#"{"log":"c"}"#).content(), "c");
        assert_eq!(Frame::decode(r#"{"text":"d"}"#).content(), "d");
        assert_eq!(Frame::decode(r#"{"text":"d","content":"a"}"#).content(), "a");
    }

    #[test]
    fn test_nested_result_wins_over_flat_alias() {
        let frame = Frame::decode(r#"{"message":"outer","result":{"content":"inner"}}"#);
        assert_eq!(frame.content(), "inner");
    }

    #[test]
    fn test_plain_text_is_verbatim() {
        let frame = Frame::decode("Step 3/9 : RUN npm ci");
        assert_eq!(
            frame,
            Frame::PlainText {
                content: "Step 3/9 : RUN npm ci".to_string()
            }
        );
        assert_eq!(frame.source_format(), SourceFormat::Plain);
    }

    #[test]
    fn test_malformed_json_falls_back_to_plain() {
        let frame = Frame::decode("{not json}");
        assert_eq!(frame.content(), "{not json}");
        assert!(matches!(frame, Frame::PlainText { .. }));
    }

    #[test]
    fn test_json_array_is_plain_text() {
        let frame = Frame::decode(r#"["a","b"]"#);
        assert!(matches!(frame, Frame::PlainText { .. }));
    }

    #[test]
    fn test_object_without_alias_is_kept_verbatim() {
        let raw = r#"{"progress":42}"#;
        let frame = Frame::decode(raw);
        assert_eq!(frame, Frame::PlainText { content: raw.to_string() });
    }

    #[test]
    fn test_non_string_alias_is_ignored() {
        let frame = Frame::decode(r#"{"content":7,"log":"seven"}"#);
        assert_eq!(frame.content(), "seven");
    }

    #[test]
    fn test_trailing_newline_is_stripped() {
        assert_eq!(Frame::decode("done\r\n").content(), "done");
        assert_eq!(Frame::decode(r#"{"content":"done\n"}"#).content(), "done");
    }

    #[test]
    fn test_empty_structured_content_is_structured_and_empty() {
        let frame = Frame::decode(r#"{"result":{"content":""}}"#);
        assert_eq!(frame.content(), "");
        assert_eq!(frame.source_format(), SourceFormat::Structured);
    }
}
