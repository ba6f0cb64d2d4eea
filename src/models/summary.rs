use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Category, Level, ResolutionStatus, Sentiment};

/// Bucket name for records missing the grouping field
pub const UNKNOWN_GROUP: &str = "unknown";

/// Field to group insight records by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    /// Seller GLID
    Customer,
    City,
    /// Customer type (CATALOG, STAR, ...)
    Segment,
    /// Primary category
    Category,
    /// ISO week of the call date
    Week,
    /// Calendar month of the call date
    Month,
}

impl GroupKey {
    pub fn is_time_bucket(self) -> bool {
        matches!(self, GroupKey::Week | GroupKey::Month)
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupKey::Customer => write!(f, "customer"),
            GroupKey::City => write!(f, "city"),
            GroupKey::Segment => write!(f, "segment"),
            GroupKey::Category => write!(f, "category"),
            GroupKey::Week => write!(f, "week"),
            GroupKey::Month => write!(f, "month"),
        }
    }
}

/// A frequent term from issue summaries and pain points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub term: String,
    pub count: usize,
}

/// Share of calls where the executive showed each behaviour
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutiveRates {
    /// Records that carried an executive assessment
    pub assessed: usize,
    pub empathy_rate: f64,
    pub solution_rate: f64,
    pub process_compliance_rate: f64,
    pub escalation_rate: f64,
}

/// Rollup of the records sharing one grouping key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub count: usize,
    pub category_distribution: BTreeMap<Category, usize>,
    pub sentiment_distribution: BTreeMap<Sentiment, usize>,
    pub churn_risk_distribution: BTreeMap<Level, usize>,
    pub resolution_distribution: BTreeMap<ResolutionStatus, usize>,
    /// `requires_follow_up` records divided by `count`
    pub follow_up_rate: f64,
    pub high_churn_count: usize,
    pub executive: ExecutiveRates,
    pub top_mentions: Vec<Mention>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Rising,
    Falling,
    Stable,
}

/// Direction of a category's share across chronological time buckets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTrend {
    pub category: Category,
    pub direction: TrendDirection,
    /// Least-squares slope of the share per bucket
    pub slope: f64,
    /// Share in each bucket, in bucket order
    pub shares: Vec<f64>,
}

/// Grouped statistical rollup over a set of insight records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    pub group_by: GroupKey,
    /// Records after de-duplication by call id
    pub total_records: usize,
    pub groups: Vec<GroupSummary>,
    /// Only populated for week and month groupings
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trends: Vec<CategoryTrend>,
}

impl AggregateSummary {
    pub fn group(&self, key: &str) -> Option<&GroupSummary> {
        self.groups.iter().find(|g| g.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Headline numbers for a whole record set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overview {
    pub total_calls: usize,
    pub declined_calls: usize,
    pub unique_customers: usize,
    pub unique_cities: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateRange>,
    /// Share of records marked RESOLVED among those with a resolution status
    pub resolution_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryShare {
    pub category: Category,
    pub name: String,
    pub count: usize,
    pub percentage: f64,
}

/// A pattern that affects a meaningful share of calls
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemicIssue {
    HighFrequencyIssue {
        category: Category,
        count: usize,
        percentage: f64,
        recommendation: String,
    },
    HighChurnSegment {
        customer_type: String,
        calls: usize,
        churn_rate: f64,
        recommendation: String,
    },
    LowResolutionCategory {
        category: Category,
        calls: usize,
        resolution_rate: f64,
        recommendation: String,
    },
}

/// A customer pain point as phrased by the model, normalized
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PainPoint {
    pub phrase: String,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecommendationArea {
    ProcessImprovement,
    Retention,
    GeographicStrategy,
    Training,
}

/// One prioritised action for the support organisation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// 1 is most urgent
    pub priority: usize,
    pub area: RecommendationArea,
    pub issue: String,
    pub action: String,
    pub impact: String,
    pub effort: Level,
}

/// Full insights report over a record set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightsReport {
    pub overview: Overview,
    pub overall: GroupSummary,
    pub categories: Vec<CategoryShare>,
    pub top_pain_points: Vec<PainPoint>,
    pub systemic_issues: Vec<SystemicIssue>,
    pub recommendations: Vec<Recommendation>,
}
