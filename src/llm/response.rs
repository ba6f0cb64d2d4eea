use serde_json::Value;

/// Parse model output into an untyped JSON object
///
/// Models often wrap JSON in markdown fences or add a sentence before it, so
/// this strips fences and falls back to the outermost `{...}` span. The result
/// still has to go through the validator.
pub fn parse_model_json(text: &str) -> Result<Value, String> {
    let body = strip_code_fence(text.trim());
    if body.is_empty() {
        return Err("empty response".to_string());
    }

    let first_error = match serde_json::from_str::<Value>(body) {
        Ok(value) if value.is_object() => return Ok(value),
        Ok(_) => "response is JSON but not an object".to_string(),
        Err(e) => e.to_string(),
    };

    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            serde_json::from_str::<Value>(&body[start..=end])
                .ok()
                .filter(Value::is_object)
                .ok_or(first_error)
        }
        _ => Err(first_error),
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening fence line
    let rest = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    match rest.rfind("```") {
        Some(end) => rest[..end].trim(),
        None => rest.trim(),
    }
}

/// Shorten a raw response for logs and reports
pub fn truncate_for_report(raw: &str, max_chars: usize) -> String {
    if raw.chars().count() <= max_chars {
        return raw.to_string();
    }
    let mut out: String = raw.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let value = parse_model_json(r#"{"sentiment": "NEUTRAL"}"#).unwrap();
        assert_eq!(value["sentiment"], "NEUTRAL");
    }

    #[test]
    fn test_fenced_json() {
        let text = "```json\n{\"churn_risk\": \"LOW\"}\n```";
        assert_eq!(parse_model_json(text).unwrap()["churn_risk"], "LOW");

        let text = "```\n{\"churn_risk\": \"HIGH\"}\n```\n";
        assert_eq!(parse_model_json(text).unwrap()["churn_risk"], "HIGH");
    }

    #[test]
    fn test_json_with_chatter() {
        let text = "Here is the analysis:\n{\"urgency\": \"HIGH\"}\nLet me know if you need more.";
        assert_eq!(parse_model_json(text).unwrap()["urgency"], "HIGH");
    }

    #[test]
    fn test_malformed() {
        assert!(parse_model_json("").is_err());
        assert!(parse_model_json("I cannot help with that").is_err());
        assert!(parse_model_json("{\"sentiment\": ").is_err());
        assert!(parse_model_json("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_truncate_for_report() {
        assert_eq!(truncate_for_report("short", 10), "short");
        assert_eq!(truncate_for_report("ग्राहक ने कहा", 3), "ग्र...");
    }
}
