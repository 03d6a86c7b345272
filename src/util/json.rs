use anyhow::{Result, anyhow};
use serde_json::Value;

/// LLM応答からJSON本体を取り出す。
///
/// フェンス付きコードブロック（```json ... ```）が含まれる場合は
/// 中身だけを残してからパースする。
pub(crate) fn extract_json_payload(payload: &str) -> Result<Value> {
    let stripped = strip_code_fences(payload);
    let value: Value = serde_json::from_str(stripped.trim())
        .map_err(|error| anyhow!("response is not valid JSON: {error}"))?;
    Ok(value)
}

/// フェンス付きコードブロックの囲いを剥がす。フェンスが無ければそのまま返す。
pub(crate) fn strip_code_fences(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // The opening fence may carry a language tag ("```json").
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.rfind("```").map_or(body, |idx| &body[..idx]).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_json_passes_through() {
        let value = extract_json_payload(r#"{"timeline": []}"#).expect("parses");
        assert_eq!(value, json!({"timeline": []}));
    }

    #[test]
    fn fenced_block_with_language_tag_is_stripped() {
        let payload = "```json\n{\"a\": 1}\n```";
        let value = extract_json_payload(payload).expect("parses");
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn fenced_block_without_language_tag_is_stripped() {
        let payload = "```\n{\"a\": 1}\n```";
        let value = extract_json_payload(payload).expect("parses");
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn surrounding_prose_is_rejected() {
        let payload = "Here is the scenario: {\"a\": 1}";
        assert!(extract_json_payload(payload).is_err());
    }
}
