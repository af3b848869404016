use crate::domain::recommendation::Recommendation;
use crate::llm::EngineReply;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_reply(text: &str) -> anyhow::Result<EngineReply> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let value = serde_json::from_str::<serde_json::Value>(&json_str)
        .with_context(|| format!("engine output is not valid JSON: {json_str}"))?;

    if let Some(error) = value.get("error") {
        if !error.is_null() {
            let error = error
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            return Ok(EngineReply::Rejected { error });
        }
    }

    let recommendation = serde_json::from_value::<Recommendation>(value)
        .context("engine output does not match the recommendation schema")?;
    Ok(EngineReply::Advice(recommendation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::{Advice, ConfidenceLevel};
    use serde_json::json;

    fn valid_reply_json() -> String {
        json!({
            "recommendation": "BUY",
            "confidence_level": "Medium",
            "justification": "Price above the 20-day SMA on rising volume.",
            "key_risks": "Thin history; sentiment could reverse.",
            "data_limitations": "No broader market context.",
            "sentiment_analysis": "Mildly positive coverage.",
            "technical_snapshot": "MACD bullish crossover; low short interest."
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn fenced_reply_parses_identically_to_unfenced() {
        let body = valid_reply_json();
        let fenced = format!("```json\n{body}\n```");

        let plain = parse_reply(&body).unwrap();
        let wrapped = parse_reply(&fenced).unwrap();

        let (EngineReply::Advice(a), EngineReply::Advice(b)) = (plain, wrapped) else {
            panic!("expected advice replies");
        };
        assert_eq!(a.recommendation, Advice::Buy);
        assert_eq!(b.recommendation, Advice::Buy);
        assert_eq!(a.confidence_level, ConfidenceLevel::Medium);
        assert_eq!(a.justification, b.justification);
    }

    #[test]
    fn reply_with_error_field_is_rejected() {
        let reply = parse_reply(r#"{"error": "ticker not resolvable"}"#).unwrap();
        let EngineReply::Rejected { error } = reply else {
            panic!("expected rejection");
        };
        assert_eq!(error, "ticker not resolvable");
    }

    #[test]
    fn null_error_field_is_ignored() {
        let mut value: serde_json::Value = serde_json::from_str(&valid_reply_json()).unwrap();
        value["error"] = serde_json::Value::Null;
        let reply = parse_reply(&value.to_string()).unwrap();
        assert!(matches!(reply, EngineReply::Advice(_)));
    }

    #[test]
    fn unknown_advice_value_fails_to_parse() {
        let mut value: serde_json::Value = serde_json::from_str(&valid_reply_json()).unwrap();
        value["recommendation"] = json!("ACCUMULATE");
        assert!(parse_reply(&value.to_string()).is_err());
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let mut value: serde_json::Value = serde_json::from_str(&valid_reply_json()).unwrap();
        value.as_object_mut().unwrap().remove("justification");
        assert!(parse_reply(&value.to_string()).is_err());
    }

    #[test]
    fn non_json_text_fails_to_parse() {
        assert!(parse_reply("I cannot provide financial advice.").is_err());
    }
}
