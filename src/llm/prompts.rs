use crate::heuristics::category_hints;
use crate::models::{CategorySet, Transcript};

/// Longest transcript excerpt sent to the model, in characters
pub const MAX_TRANSCRIPT_CHARS: usize = 6000;

/// Keyword hints listed in the prompt
const MAX_HINTS: usize = 3;

/// System prompt for the LLM (non-negotiable constraints)
pub const SYSTEM_PROMPT: &str = r#"You are a customer service analyst for IndiaMART, a B2B marketplace. You read seller support call transcripts, often in Hinglish (Hindi-English mix, Latin or Devanagari script), and extract structured insights.

You MUST follow these rules:

1. Output MUST be a single JSON object matching the provided schema. No prose, no markdown.
2. Enumerated fields MUST use exactly one of the listed values.
3. primary_category and secondary_categories MUST be codes from the provided category list.
4. Write issue_summary, customer_pain_points and actionable_insight in English.
5. Set follow_up_reason if and only if requires_follow_up is true.
6. Never invent facts. If the transcript does not contain enough evidence to classify the call, respond with exactly:
   {"insufficient_evidence": true, "reason": "<why>"}"#;

/// Build the user prompt for one transcript
pub fn build_classification_prompt(transcript: &Transcript, categories: &CategorySet) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!("# Call: {}\n\n", transcript.call_id));

    prompt.push_str("## Call Metadata\n");
    let metadata = &transcript.metadata;
    let or_unknown = |value: Option<&str>| value.unwrap_or("unknown").to_string();
    prompt.push_str(&format!(
        "- Customer ID: {}\n",
        or_unknown(metadata.customer_id.as_deref())
    ));
    prompt.push_str(&format!("- City: {}\n", or_unknown(metadata.city.as_deref())));
    prompt.push_str(&format!(
        "- Customer Type: {}\n",
        or_unknown(metadata.customer_type.as_ref().map(|t| t.as_str()))
    ));
    let call_date = metadata.call_date.map(|d| d.to_string());
    prompt.push_str(&format!(
        "- Call Date: {}\n\n",
        or_unknown(call_date.as_deref())
    ));

    prompt.push_str("## Categories\n");
    for def in categories.iter() {
        prompt.push_str(&format!("- {} ({}): {}\n", def.code, def.name, def.description));
    }
    prompt.push('\n');

    let hints = category_hints(&transcript.text, categories, MAX_HINTS);
    if !hints.is_empty() {
        prompt.push_str("## Keyword Hints\n");
        for hint in &hints {
            prompt.push_str(&format!("- {}: {}\n", hint.code, hint.matched.join(", ")));
        }
        prompt.push_str("Hints come from keyword matching only; classify from the conversation.\n\n");
    }

    prompt.push_str("## Transcript\n");
    prompt.push_str(&excerpt(&transcript.text, MAX_TRANSCRIPT_CHARS));
    prompt.push_str("\n\n");

    prompt.push_str("## Output Schema\n");
    prompt.push_str("```json\n");
    prompt.push_str(OUTPUT_SCHEMA);
    prompt.push_str("\n```\n\n");

    prompt.push_str("## Instructions\n");
    prompt.push_str("Respond with the JSON object only.\n");
    prompt.push_str("Focus on:\n");
    prompt.push_str("- The seller's main problem and what they expect from IndiaMART\n");
    prompt.push_str("- Frustration or churn signals, even when not stated outright\n");
    prompt.push_str("- Whether the executive handled the call well\n");

    prompt
}

const OUTPUT_SCHEMA: &str = r#"{
  "primary_category": "<category code>",
  "secondary_categories": ["<category code>"],
  "issue_summary": "<1-2 sentences, at most 600 characters>",
  "customer_pain_points": ["<pain point>"],
  "resolution_status": "RESOLVED | PARTIALLY_RESOLVED | UNRESOLVED",
  "sentiment": "POSITIVE | NEUTRAL | NEGATIVE",
  "sentiment_shift": "IMPROVED | WORSENED | UNCHANGED",
  "urgency": "LOW | MEDIUM | HIGH",
  "churn_risk": "LOW | MEDIUM | HIGH",
  "executive_performance": {
    "empathy_shown": true,
    "solution_offered": true,
    "followed_process": true,
    "escalation_needed": false
  },
  "actionable_insight": "<one concrete recommendation>",
  "keywords": ["<keyword>"],
  "requires_follow_up": false,
  "follow_up_reason": null
}"#;

/// First `max_chars` characters, marked when cut
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n[transcript truncated]", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CallMetadata, CustomerType};

    fn transcript(text: &str) -> Transcript {
        Transcript::new("101", text).with_metadata(CallMetadata {
            customer_id: Some("G-77".to_string()),
            city: Some("Surat".to_string()),
            customer_type: Some(CustomerType::Star),
            call_date: None,
        })
    }

    #[test]
    fn test_prompt_includes_metadata_categories_and_hints() {
        let categories = CategorySet::default();
        let prompt = build_classification_prompt(
            &transcript("ग्राहक ने कहा leads galat city se aa rahi hain"),
            &categories,
        );

        assert!(prompt.contains("- City: Surat"));
        assert!(prompt.contains("- Customer Type: STAR"));
        assert!(prompt.contains("- Call Date: unknown"));
        assert!(prompt.contains("- LEAD_QUALITY (BuyLead Quality Issues)"));
        assert!(prompt.contains("- LEAD_QUALITY: galat, leads"));
        assert!(prompt.contains("leads galat city"));
        assert!(SYSTEM_PROMPT.contains("insufficient_evidence"));
    }

    #[test]
    fn test_long_transcript_is_truncated() {
        let categories = CategorySet::default();
        let text = "क".repeat(MAX_TRANSCRIPT_CHARS + 50);
        let prompt = build_classification_prompt(&transcript(&text), &categories);
        assert!(prompt.contains("[transcript truncated]"));
        assert!(!prompt.contains(&text));
        assert_eq!(excerpt("short", 10), "short");
    }
}
