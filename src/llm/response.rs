//! Parsing of the service's free-text reply into a [`ParsedReply`].
//!
//! Models often wrap JSON in a Markdown fence.  [`strip_code_fence`] removes a
//! ```` ```json ```` fence when present, otherwise the first plain ```` ``` ````
//! fence, and trims what remains.

use serde_json::Value;

/// Fields read from one JSON reply.  Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedReply {
    pub order: Option<String>,
    pub confidence: Option<String>,
    pub recommendation: bool,
}

/// Return the fenced payload of `text`, or `text` itself, trimmed.
///
/// Applying it twice gives the same result as applying it once.
///
/// ```rust
/// use voice_order::llm::strip_code_fence;
///
/// assert_eq!(strip_code_fence("```json\n{\"order\":\"egg\"}\n```"), "{\"order\":\"egg\"}");
/// assert_eq!(strip_code_fence("  {}  "), "{}");
/// ```
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();

    let inner = if let Some((_, rest)) = text.split_once("```json") {
        rest.split("```").next().unwrap_or(rest)
    } else if let Some((_, rest)) = text.split_once("```") {
        rest.split("```").next().unwrap_or(rest)
    } else {
        text
    };

    inner.trim()
}

/// Strip any fence and decode the JSON object inside.
///
/// # Errors
///
/// A human-readable reason when the payload is not valid JSON or not a JSON
/// object.  Field-level type mismatches are not errors: a non-string
/// `order`/`confidence` is treated as absent.
pub fn parse_reply(raw: &str) -> Result<ParsedReply, String> {
    let payload = strip_code_fence(raw);
    let value: Value = serde_json::from_str(payload).map_err(|e| e.to_string())?;

    let object = value
        .as_object()
        .ok_or_else(|| format!("expected a JSON object, got {payload}"))?;

    let text_field = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);

    let recommendation = match object.get("recommendation") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    Ok(ParsedReply {
        order: text_field("order"),
        confidence: text_field("confidence"),
        recommendation,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fence_is_preferred() {
        let raw = "Sure!\n```\nnote\n```\n```json\n{\"order\":\"tuna\"}\n```";
        assert_eq!(strip_code_fence(raw), "{\"order\":\"tuna\"}");
    }

    #[test]
    fn plain_fence_is_stripped() {
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn unterminated_fence_keeps_tail() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn stripping_is_idempotent() {
        let samples = [
            "```json\n{\"order\":\"egg\"}\n```",
            "```\n{\"order\":\"egg\"}\n```",
            "text ```json {} ``` more ``` x ```",
            "   plain   ",
            "",
            "```",
            "``````",
        ];
        for s in samples {
            let once = strip_code_fence(s);
            assert_eq!(strip_code_fence(once), once, "not idempotent for {s:?}");
        }
    }

    #[test]
    fn parses_full_reply() {
        let reply = parse_reply(
            "```json\n{\"order\": \"tuna\", \"recommendation\": false, \"confidence\": \"high\"}\n```",
        )
        .unwrap();
        assert_eq!(
            reply,
            ParsedReply {
                order: Some("tuna".into()),
                confidence: Some("high".into()),
                recommendation: false,
            }
        );
    }

    #[test]
    fn missing_fields_are_none() {
        let reply = parse_reply("{}").unwrap();
        assert_eq!(reply, ParsedReply::default());
    }

    #[test]
    fn non_string_order_is_absent() {
        let reply = parse_reply("{\"order\": 3, \"confidence\": null}").unwrap();
        assert!(reply.order.is_none());
        assert!(reply.confidence.is_none());
    }

    #[test]
    fn recommendation_accepts_string_true() {
        assert!(parse_reply("{\"recommendation\": \"true\"}").unwrap().recommendation);
    }

    #[test]
    fn prose_is_rejected() {
        assert!(parse_reply("I think they wanted tuna.").is_err());
    }

    #[test]
    fn json_array_is_rejected() {
        assert!(parse_reply("[\"tuna\"]").is_err());
    }
}
