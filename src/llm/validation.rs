use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ValidationError;
use crate::models::{
    normalize_code, CallMetadata, Category, CategorySet, DeclinedCall, ExecutivePerformance,
    InsightRecord, Verdict,
};

/// Longest accepted `issue_summary`, in characters
pub const MAX_ISSUE_SUMMARY_CHARS: usize = 600;

/// Reason recorded when the model declines without giving one
pub const DEFAULT_DECLINE_REASON: &str = "insufficient evidence";

/// Checks untyped model output against the insight record schema
///
/// Every enumerated field must match its value set; nothing is coerced into a
/// valid value. Accepts both fresh model output (with `call_id` and `metadata`
/// injected by the caller) and serialized [`InsightRecord`]s, so validating an
/// already valid record returns it unchanged.
#[derive(Debug, Clone, Copy)]
pub struct Validator<'a> {
    categories: &'a CategorySet,
    known_call_ids: Option<&'a HashSet<String>>,
}

impl<'a> Validator<'a> {
    pub fn new(categories: &'a CategorySet) -> Self {
        Self {
            categories,
            known_call_ids: None,
        }
    }

    /// Also require `call_id` to reference one of these transcripts
    pub fn with_known_calls(mut self, call_ids: &'a HashSet<String>) -> Self {
        self.known_call_ids = Some(call_ids);
        self
    }

    /// Validate a response that may be an explicit decline
    pub fn validate_verdict(&self, raw: &Value) -> Result<Verdict, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        if optional_bool(obj, "insufficient_evidence")?.unwrap_or(false) {
            return self.validate_declined(raw).map(Verdict::Declined);
        }
        self.validate(raw).map(Verdict::Classified)
    }

    /// Validate a decline, from the model or read back from a journal
    pub fn validate_declined(&self, raw: &Value) -> Result<DeclinedCall, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;
        Ok(DeclinedCall {
            call_id: self.call_id(obj)?,
            metadata: metadata(obj)?,
            reason: optional_string(obj, "reason")?
                .unwrap_or_else(|| DEFAULT_DECLINE_REASON.to_string()),
        })
    }

    /// Validate a full insight record
    pub fn validate(&self, raw: &Value) -> Result<InsightRecord, ValidationError> {
        let obj = raw.as_object().ok_or(ValidationError::NotAnObject)?;

        let call_id = self.call_id(obj)?;
        let metadata = metadata(obj)?;

        let primary_raw = required_string(obj, "primary_category")?;
        let primary_category = self.category("primary_category", primary_raw)?;

        let mut secondary_categories: Vec<Category> = Vec::new();
        for raw in string_list(obj, "secondary_categories")? {
            let category = self.category("secondary_categories", &raw)?;
            if !secondary_categories.contains(&category) {
                secondary_categories.push(category);
            }
        }

        let sentiment = required_enum(obj, "sentiment")?;
        let churn_risk = required_enum(obj, "churn_risk")?;
        let resolution_status = optional_enum(obj, "resolution_status")?;
        let sentiment_shift = optional_enum(obj, "sentiment_shift")?;
        let urgency = optional_enum(obj, "urgency")?;

        let issue_summary = optional_string(obj, "issue_summary")?.unwrap_or_default();
        if issue_summary.chars().count() > MAX_ISSUE_SUMMARY_CHARS {
            return Err(ValidationError::FieldTooLong {
                field: "issue_summary".to_string(),
                max: MAX_ISSUE_SUMMARY_CHARS,
            });
        }

        let requires_follow_up = optional_bool(obj, "requires_follow_up")?.unwrap_or(false);
        let follow_up_reason = optional_string(obj, "follow_up_reason")?;
        if requires_follow_up != follow_up_reason.is_some() {
            return Err(ValidationError::FollowUpMismatch { requires_follow_up });
        }

        Ok(InsightRecord {
            call_id,
            metadata,
            primary_category,
            secondary_categories,
            issue_summary,
            customer_pain_points: string_list(obj, "customer_pain_points")?,
            resolution_status,
            sentiment,
            sentiment_shift,
            urgency,
            churn_risk,
            executive_performance: executive_performance(obj)?,
            actionable_insight: optional_string(obj, "actionable_insight")?.unwrap_or_default(),
            keywords: string_list(obj, "keywords")?,
            requires_follow_up,
            follow_up_reason,
        })
    }

    fn call_id(&self, obj: &Map<String, Value>) -> Result<String, ValidationError> {
        let call_id = match present(obj, "call_id") {
            None => return Err(ValidationError::MissingField("call_id".to_string())),
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::String(_)) => {
                return Err(ValidationError::MissingField("call_id".to_string()));
            }
            Some(Value::Number(n)) => n.to_string(),
            Some(_) => {
                return Err(ValidationError::InvalidType {
                    field: "call_id".to_string(),
                    expected: "a string or number",
                });
            }
        };

        if let Some(known) = self.known_call_ids {
            if !known.contains(&call_id) {
                return Err(ValidationError::UnknownCallId(call_id));
            }
        }
        Ok(call_id)
    }

    fn category(&self, field: &str, raw: &str) -> Result<Category, ValidationError> {
        self.categories
            .resolve(raw)
            .ok_or_else(|| ValidationError::InvalidEnumValue {
                field: field.to_string(),
                value: raw.to_string(),
            })
    }
}

/// Field value, treating explicit `null` as absent
fn present<'v>(obj: &'v Map<String, Value>, field: &str) -> Option<&'v Value> {
    obj.get(field).filter(|v| !v.is_null())
}

fn required_string<'v>(obj: &'v Map<String, Value>, field: &str) -> Result<&'v str, ValidationError> {
    match present(obj, field) {
        None => Err(ValidationError::MissingField(field.to_string())),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(ValidationError::MissingField(field.to_string()))
        }
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ValidationError::InvalidType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

/// Trimmed string; absent, null and blank all read as `None`
fn optional_string(obj: &Map<String, Value>, field: &str) -> Result<Option<String>, ValidationError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(_) => Err(ValidationError::InvalidType {
            field: field.to_string(),
            expected: "a string",
        }),
    }
}

fn optional_bool(obj: &Map<String, Value>, field: &str) -> Result<Option<bool>, ValidationError> {
    match present(obj, field) {
        None => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ValidationError::InvalidType {
            field: field.to_string(),
            expected: "a boolean",
        }),
    }
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, ValidationError> {
    let invalid = || ValidationError::InvalidType {
        field: field.to_string(),
        expected: "an array of strings",
    };
    match present(obj, field) {
        None => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) if s.trim().is_empty() => None,
                Value::String(s) => Some(Ok(s.trim().to_string())),
                _ => Some(Err(invalid())),
            })
            .collect(),
        Some(_) => Err(invalid()),
    }
}

fn parse_enum<T: DeserializeOwned>(field: &str, value: &Value) -> Result<T, ValidationError> {
    let raw = value.as_str().ok_or_else(|| ValidationError::InvalidType {
        field: field.to_string(),
        expected: "a string",
    })?;
    serde_json::from_value(Value::String(normalize_code(raw))).map_err(|_| {
        ValidationError::InvalidEnumValue {
            field: field.to_string(),
            value: raw.to_string(),
        }
    })
}

fn required_enum<T: DeserializeOwned>(obj: &Map<String, Value>, field: &str) -> Result<T, ValidationError> {
    let value = present(obj, field).ok_or_else(|| ValidationError::MissingField(field.to_string()))?;
    parse_enum(field, value)
}

fn optional_enum<T: DeserializeOwned>(
    obj: &Map<String, Value>,
    field: &str,
) -> Result<Option<T>, ValidationError> {
    present(obj, field).map(|v| parse_enum(field, v)).transpose()
}

fn metadata(obj: &Map<String, Value>) -> Result<CallMetadata, ValidationError> {
    match present(obj, "metadata") {
        None => Ok(CallMetadata::default()),
        Some(value) => serde_json::from_value(value.clone()).map_err(|_| ValidationError::InvalidType {
            field: "metadata".to_string(),
            expected: "a call metadata object",
        }),
    }
}

fn executive_performance(
    obj: &Map<String, Value>,
) -> Result<Option<ExecutivePerformance>, ValidationError> {
    let Some(value) = present(obj, "executive_performance") else {
        return Ok(None);
    };
    let inner = value.as_object().ok_or_else(|| ValidationError::InvalidType {
        field: "executive_performance".to_string(),
        expected: "an object",
    })?;

    let flag = |name: &str| -> Result<bool, ValidationError> {
        let field = format!("executive_performance.{name}");
        match optional_bool(inner, name) {
            Ok(Some(b)) => Ok(b),
            Ok(None) => Err(ValidationError::MissingField(field)),
            Err(_) => Err(ValidationError::InvalidType {
                field,
                expected: "a boolean",
            }),
        }
    };

    Ok(Some(ExecutivePerformance {
        empathy_shown: flag("empathy_shown")?,
        solution_offered: flag("solution_offered")?,
        followed_process: flag("followed_process")?,
        escalation_needed: flag("escalation_needed")?,
    }))
}
