use serde::{Deserialize, Serialize};

use super::{CallMetadata, Category};

/// Overall customer sentiment on the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// How sentiment moved between the start and the end of the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SentimentShift {
    Improved,
    Worsened,
    Unchanged,
}

/// Three-step scale shared by urgency and churn risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionStatus {
    Resolved,
    PartiallyResolved,
    Unresolved,
}

impl std::fmt::Display for Sentiment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sentiment::Positive => write!(f, "POSITIVE"),
            Sentiment::Neutral => write!(f, "NEUTRAL"),
            Sentiment::Negative => write!(f, "NEGATIVE"),
        }
    }
}

impl std::fmt::Display for SentimentShift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimentShift::Improved => write!(f, "IMPROVED"),
            SentimentShift::Worsened => write!(f, "WORSENED"),
            SentimentShift::Unchanged => write!(f, "UNCHANGED"),
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Low => write!(f, "LOW"),
            Level::Medium => write!(f, "MEDIUM"),
            Level::High => write!(f, "HIGH"),
        }
    }
}

impl std::fmt::Display for ResolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionStatus::Resolved => write!(f, "RESOLVED"),
            ResolutionStatus::PartiallyResolved => write!(f, "PARTIALLY_RESOLVED"),
            ResolutionStatus::Unresolved => write!(f, "UNRESOLVED"),
        }
    }
}

/// How the call-center executive handled the call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutivePerformance {
    pub empathy_shown: bool,
    pub solution_offered: bool,
    pub followed_process: bool,
    pub escalation_needed: bool,
}

/// Structured classification output for one call
///
/// Only the validator builds these; see [`crate::llm::Validator`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightRecord {
    pub call_id: String,
    /// Copied from the transcript, never taken from the model
    pub metadata: CallMetadata,
    pub primary_category: Category,
    pub secondary_categories: Vec<Category>,
    pub issue_summary: String,
    pub customer_pain_points: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_status: Option<ResolutionStatus>,
    pub sentiment: Sentiment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment_shift: Option<SentimentShift>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Level>,
    pub churn_risk: Level,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_performance: Option<ExecutivePerformance>,
    pub actionable_insight: String,
    pub keywords: Vec<String>,
    pub requires_follow_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_reason: Option<String>,
}

/// A call the model declined to classify for lack of evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclinedCall {
    pub call_id: String,
    #[serde(default)]
    pub metadata: CallMetadata,
    pub reason: String,
}

/// Outcome of classifying one transcript
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Verdict {
    Classified(InsightRecord),
    Declined(DeclinedCall),
}

impl Verdict {
    pub fn call_id(&self) -> &str {
        match self {
            Verdict::Classified(record) => &record.call_id,
            Verdict::Declined(declined) => &declined.call_id,
        }
    }

    pub fn as_record(&self) -> Option<&InsightRecord> {
        match self {
            Verdict::Classified(record) => Some(record),
            Verdict::Declined(_) => None,
        }
    }

    pub fn is_declined(&self) -> bool {
        matches!(self, Verdict::Declined(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_labels_match_serde() {
        assert_eq!(serde_json::to_value(Sentiment::Negative).unwrap(), "NEGATIVE");
        assert_eq!(
            serde_json::to_value(ResolutionStatus::PartiallyResolved).unwrap(),
            "PARTIALLY_RESOLVED"
        );
        assert_eq!(ResolutionStatus::PartiallyResolved.to_string(), "PARTIALLY_RESOLVED");
        assert_eq!(SentimentShift::Worsened.to_string(), "WORSENED");
        assert_eq!(Level::High.to_string(), "HIGH");
    }

    #[test]
    fn test_declined_verdict_is_tagged() {
        let verdict = Verdict::Declined(DeclinedCall {
            call_id: "7".to_string(),
            metadata: CallMetadata::default(),
            reason: "insufficient evidence".to_string(),
        });
        let json = serde_json::to_value(&verdict).unwrap();
        assert_eq!(json["outcome"], "declined");
        assert_eq!(json["call_id"], "7");
        assert!(verdict.is_declined());
        assert!(verdict.as_record().is_none());
    }
}
