use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::heuristics::top_terms;
use crate::models::{
    AggregateSummary, CategorySet, CategoryShare, CategoryTrend, DateRange, DeclinedCall,
    ExecutiveRates, GroupKey, GroupSummary, InsightRecord, InsightsReport, Level, Overview,
    PainPoint, Recommendation, RecommendationArea, ResolutionStatus, SystemicIssue,
    TrendDirection, UNKNOWN_GROUP,
};

/// Slopes with a smaller magnitude count as STABLE
pub const TREND_THRESHOLD: f64 = 0.02;

/// Key of the whole-dataset summary in a report
pub const OVERALL_GROUP: &str = "all";

/// Pain-point phrases listed in a report
pub const TOP_PAIN_POINTS: usize = 20;

/// Cities named in the geographic recommendation
const MAX_NAMED_CITIES: usize = 5;

/// Configuration for aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregateOptions {
    /// Mentions reported per group
    pub top_n: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

/// Thresholds for flagging systemic issues in a report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemicThresholds {
    /// Categories considered for HIGH_FREQUENCY_ISSUE
    pub frequent_top_k: usize,
    /// Share of calls (percent) above which a category is frequent
    pub frequent_min_percent: f64,
    /// Segments need more calls than this for HIGH_CHURN_SEGMENT
    pub churn_min_calls: usize,
    pub churn_min_rate: f64,
    /// Categories need at least this many calls for LOW_RESOLUTION_CATEGORY
    pub resolution_min_calls: usize,
    pub resolution_max_rate: f64,
    /// Cities need more calls than this for a geographic recommendation
    pub city_min_calls: usize,
}

impl Default for SystemicThresholds {
    fn default() -> Self {
        Self {
            frequent_top_k: 5,
            frequent_min_percent: 10.0,
            churn_min_calls: 50,
            churn_min_rate: 0.15,
            resolution_min_calls: 10,
            resolution_max_rate: 0.40,
            city_min_calls: 50,
        }
    }
}

/// Group records with default options
pub fn aggregate(records: &[InsightRecord], group_by: GroupKey) -> AggregateSummary {
    aggregate_with(records, group_by, &AggregateOptions::default())
}

/// Group records and summarize each group
///
/// Records are de-duplicated by call id, keeping the latest. Groups come out
/// in key order, so equal input yields byte-identical output.
pub fn aggregate_with(
    records: &[InsightRecord],
    group_by: GroupKey,
    options: &AggregateOptions,
) -> AggregateSummary {
    let records = dedupe(records);
    let buckets = bucket(&records, group_by);

    let groups = buckets
        .iter()
        .map(|(key, members)| summarize_group(key, members, options.top_n))
        .collect();
    let trends = if group_by.is_time_bucket() {
        category_trends(&buckets)
    } else {
        Vec::new()
    };

    AggregateSummary {
        group_by,
        total_records: records.len(),
        groups,
        trends,
    }
}

/// Keep one record per call id: the last one seen, at its first position
pub fn dedupe(records: &[InsightRecord]) -> Vec<&InsightRecord> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut out: Vec<&InsightRecord> = Vec::with_capacity(records.len());
    for record in records {
        match position.get(record.call_id.as_str()) {
            Some(&i) => out[i] = record,
            None => {
                position.insert(&record.call_id, out.len());
                out.push(record);
            }
        }
    }
    out
}

/// Grouping key for a record; missing values go to [`UNKNOWN_GROUP`]
pub fn group_key(record: &InsightRecord, group_by: GroupKey) -> String {
    let metadata = &record.metadata;
    let key = match group_by {
        GroupKey::Customer => metadata.customer_id.clone(),
        GroupKey::City => metadata.city.clone(),
        GroupKey::Segment => metadata.customer_type.as_ref().map(|t| t.as_str().to_string()),
        GroupKey::Category => Some(record.primary_category.as_str().to_string()),
        GroupKey::Week => metadata.call_date.map(|d| {
            let week = d.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }),
        GroupKey::Month => metadata.call_date.map(|d| d.format("%Y-%m").to_string()),
    };
    key.map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .unwrap_or_else(|| UNKNOWN_GROUP.to_string())
}

fn bucket<'r>(
    records: &[&'r InsightRecord],
    group_by: GroupKey,
) -> BTreeMap<String, Vec<&'r InsightRecord>> {
    let mut buckets: BTreeMap<String, Vec<&InsightRecord>> = BTreeMap::new();
    for record in records {
        buckets.entry(group_key(record, group_by)).or_default().push(*record);
    }
    buckets
}

/// Rollup of one set of records
pub fn summarize_group(key: &str, records: &[&InsightRecord], top_n: usize) -> GroupSummary {
    let mut category_distribution = BTreeMap::new();
    let mut sentiment_distribution = BTreeMap::new();
    let mut churn_risk_distribution = BTreeMap::new();
    let mut resolution_distribution = BTreeMap::new();
    let mut follow_ups = 0;
    let mut executive = ExecutiveCounts::default();

    for record in records {
        *category_distribution.entry(record.primary_category.clone()).or_insert(0) += 1;
        *sentiment_distribution.entry(record.sentiment).or_insert(0) += 1;
        *churn_risk_distribution.entry(record.churn_risk).or_insert(0) += 1;
        if let Some(status) = record.resolution_status {
            *resolution_distribution.entry(status).or_insert(0) += 1;
        }
        if record.requires_follow_up {
            follow_ups += 1;
        }
        if let Some(performance) = record.executive_performance {
            executive.assessed += 1;
            executive.empathy += performance.empathy_shown as usize;
            executive.solution += performance.solution_offered as usize;
            executive.process += performance.followed_process as usize;
            executive.escalation += performance.escalation_needed as usize;
        }
    }

    let texts = records.iter().flat_map(|r| {
        std::iter::once(r.issue_summary.as_str())
            .chain(r.customer_pain_points.iter().map(String::as_str))
    });

    GroupSummary {
        key: key.to_string(),
        count: records.len(),
        high_churn_count: churn_risk_distribution.get(&Level::High).copied().unwrap_or(0),
        category_distribution,
        sentiment_distribution,
        churn_risk_distribution,
        resolution_distribution,
        follow_up_rate: ratio(follow_ups, records.len()),
        executive: executive.rates(),
        top_mentions: top_terms(texts, top_n),
    }
}

#[derive(Default)]
struct ExecutiveCounts {
    assessed: usize,
    empathy: usize,
    solution: usize,
    process: usize,
    escalation: usize,
}

impl ExecutiveCounts {
    fn rates(&self) -> ExecutiveRates {
        ExecutiveRates {
            assessed: self.assessed,
            empathy_rate: ratio(self.empathy, self.assessed),
            solution_rate: ratio(self.solution, self.assessed),
            process_compliance_rate: ratio(self.process, self.assessed),
            escalation_rate: ratio(self.escalation, self.assessed),
        }
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// Per-category share trend across chronological buckets
fn category_trends(buckets: &BTreeMap<String, Vec<&InsightRecord>>) -> Vec<CategoryTrend> {
    let timeline: Vec<&Vec<&InsightRecord>> = buckets
        .iter()
        .filter(|(key, _)| key.as_str() != UNKNOWN_GROUP)
        .map(|(_, members)| members)
        .collect();

    let categories: BTreeSet<_> = timeline
        .iter()
        .flat_map(|members| members.iter().map(|r| &r.primary_category))
        .collect();

    categories
        .into_iter()
        .map(|category| {
            let shares: Vec<f64> = timeline
                .iter()
                .map(|members| {
                    let hits = members.iter().filter(|r| &r.primary_category == category).count();
                    ratio(hits, members.len())
                })
                .collect();
            let slope = least_squares_slope(&shares);
            let direction = if slope >= TREND_THRESHOLD {
                TrendDirection::Rising
            } else if slope <= -TREND_THRESHOLD {
                TrendDirection::Falling
            } else {
                TrendDirection::Stable
            };
            CategoryTrend {
                category: category.clone(),
                direction,
                slope,
                shares,
            }
        })
        .collect()
}

/// Slope of the best-fit line through `(i, ys[i])`; zero for fewer than two points
fn least_squares_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 2 {
        return 0.0;
    }
    let n_f = n as f64;
    let mean_x = (n_f - 1.0) / 2.0;
    let mean_y = ys.iter().sum::<f64>() / n_f;
    let (num, den) = ys.iter().enumerate().fold((0.0, 0.0), |(num, den), (i, y)| {
        let dx = i as f64 - mean_x;
        (num + dx * (y - mean_y), den + dx * dx)
    });
    num / den
}

/// Full report: overview, overall rollup, category shares, pain points,
/// systemic issues and recommendations
pub fn build_report(
    records: &[InsightRecord],
    declined: &[DeclinedCall],
    categories: &CategorySet,
    options: &AggregateOptions,
    thresholds: &SystemicThresholds,
) -> InsightsReport {
    let records = dedupe(records);
    let overall = summarize_group(OVERALL_GROUP, &records, options.top_n);

    let classified: HashSet<&str> = records.iter().map(|r| r.call_id.as_str()).collect();
    let declined_calls = declined
        .iter()
        .map(|d| d.call_id.as_str())
        .filter(|id| !classified.contains(id))
        .collect::<HashSet<_>>()
        .len();

    let overview = overview(&records, declined_calls);
    let shares = category_shares(&overall, categories);
    let top_pain_points = pain_points(&records, TOP_PAIN_POINTS);
    let systemic_issues = systemic_issues(&records, &shares, categories, thresholds);
    let recommendations = recommendations(&records, &overall, &shares, thresholds);

    InsightsReport {
        overview,
        overall,
        categories: shares,
        top_pain_points,
        systemic_issues,
        recommendations,
    }
}

/// Most frequent pain-point phrases, compared lowercased with whitespace collapsed
///
/// Ordered by descending count, ties by first occurrence.
fn pain_points(records: &[&InsightRecord], limit: usize) -> Vec<PainPoint> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let phrases = records.iter().flat_map(|r| r.customer_pain_points.iter());
    for (position, raw) in phrases.enumerate() {
        let phrase = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if phrase.is_empty() {
            continue;
        }
        counts.entry(phrase).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|(_, (a_count, a_first)), (_, (b_count, b_first))| {
        b_count.cmp(a_count).then(a_first.cmp(b_first))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(phrase, (count, _))| PainPoint { phrase, count })
        .collect()
}

/// Prioritised actions, most urgent first
fn recommendations(
    records: &[&InsightRecord],
    overall: &GroupSummary,
    shares: &[CategoryShare],
    thresholds: &SystemicThresholds,
) -> Vec<Recommendation> {
    let mut found: Vec<(RecommendationArea, String, String, String, Level)> = Vec::new();

    if let Some(top) = shares.first() {
        found.push((
            RecommendationArea::ProcessImprovement,
            format!("High volume of {} issues", top.name),
            format!(
                "Create a dedicated playbook and training for {} issues; consider self-service options",
                top.category
            ),
            format!("Could reduce {:.2}% of call volume", top.percentage),
            Level::Medium,
        ));
    }

    if overall.high_churn_count > 0 {
        found.push((
            RecommendationArea::Retention,
            format!("{} calls show high churn risk", overall.high_churn_count),
            "Reach out to high-risk customers within 24 hours of the flagged call".to_string(),
            format!(
                "Potential to retain up to {} customers",
                overall.high_churn_count
            ),
            Level::Medium,
        ));
    }

    let mut busy_cities: Vec<(String, usize)> = bucket(records, GroupKey::City)
        .into_iter()
        .filter(|(city, members)| city != UNKNOWN_GROUP && members.len() > thresholds.city_min_calls)
        .map(|(city, members)| (city, members.len()))
        .collect();
    busy_cities.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    if !busy_cities.is_empty() {
        let named: Vec<&str> = busy_cities
            .iter()
            .take(MAX_NAMED_CITIES)
            .map(|(city, _)| city.as_str())
            .collect();
        found.push((
            RecommendationArea::GeographicStrategy,
            format!("High call volume from {} cities", busy_cities.len()),
            format!("Consider dedicated support teams for {}", named.join(", ")),
            "Faster regional resolution".to_string(),
            Level::High,
        ));
    }

    let executive = overall.executive;
    if executive.assessed > 0 {
        found.push((
            RecommendationArea::Training,
            format!(
                "Executives showed empathy on {:.0}%, offered a solution on {:.0}% and followed process on {:.0}% of assessed calls",
                executive.empathy_rate * 100.0,
                executive.solution_rate * 100.0,
                executive.process_compliance_rate * 100.0
            ),
            "Build targeted training around the weakest of these behaviours".to_string(),
            "Better customer experience and higher satisfaction".to_string(),
            Level::Medium,
        ));
    }

    found
        .into_iter()
        .enumerate()
        .map(|(i, (area, issue, action, impact, effort))| Recommendation {
            priority: i + 1,
            area,
            issue,
            action,
            impact,
            effort,
        })
        .collect()
}

fn overview(records: &[&InsightRecord], declined_calls: usize) -> Overview {
    let unique = |get: fn(&InsightRecord) -> Option<&str>| {
        records
            .iter()
            .filter_map(|r| get(r))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect::<HashSet<_>>()
            .len()
    };

    let dates: Vec<_> = records.iter().filter_map(|r| r.metadata.call_date).collect();
    let date_range = match (dates.iter().min(), dates.iter().max()) {
        (Some(&start), Some(&end)) => Some(DateRange { start, end }),
        _ => None,
    };

    let with_status = records.iter().filter(|r| r.resolution_status.is_some()).count();
    let resolved = records
        .iter()
        .filter(|r| r.resolution_status == Some(ResolutionStatus::Resolved))
        .count();

    Overview {
        total_calls: records.len(),
        declined_calls,
        unique_customers: unique(|r| r.metadata.customer_id.as_deref()),
        unique_cities: unique(|r| r.metadata.city.as_deref()),
        date_range,
        resolution_rate: ratio(resolved, with_status),
    }
}

/// Categories by descending count, ties by code
fn category_shares(overall: &GroupSummary, categories: &CategorySet) -> Vec<CategoryShare> {
    let mut shares: Vec<CategoryShare> = overall
        .category_distribution
        .iter()
        .map(|(category, &count)| CategoryShare {
            category: category.clone(),
            name: categories.display_name(category).to_string(),
            count,
            percentage: round2(ratio(count, overall.count) * 100.0),
        })
        .collect();
    shares.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    shares
}

fn systemic_issues(
    records: &[&InsightRecord],
    shares: &[CategoryShare],
    categories: &CategorySet,
    thresholds: &SystemicThresholds,
) -> Vec<SystemicIssue> {
    let mut issues = Vec::new();

    for share in shares.iter().take(thresholds.frequent_top_k) {
        if share.percentage > thresholds.frequent_min_percent {
            issues.push(SystemicIssue::HighFrequencyIssue {
                category: share.category.clone(),
                count: share.count,
                percentage: share.percentage,
                recommendation: format!(
                    "{} accounts for {:.1}% of calls; prioritise a root-cause fix",
                    categories.display_name(&share.category),
                    share.percentage
                ),
            });
        }
    }

    for (segment, members) in bucket(records, GroupKey::Segment) {
        if segment == UNKNOWN_GROUP || members.len() <= thresholds.churn_min_calls {
            continue;
        }
        let high = members.iter().filter(|r| r.churn_risk == Level::High).count();
        let churn_rate = ratio(high, members.len());
        if churn_rate > thresholds.churn_min_rate {
            issues.push(SystemicIssue::HighChurnSegment {
                recommendation: format!(
                    "{:.1}% of {} calls show high churn risk; plan a retention campaign",
                    churn_rate * 100.0,
                    segment
                ),
                customer_type: segment,
                calls: members.len(),
                churn_rate: round2(churn_rate),
            });
        }
    }

    for (code, members) in bucket(records, GroupKey::Category) {
        if members.len() < thresholds.resolution_min_calls {
            continue;
        }
        let resolved = members
            .iter()
            .filter(|r| r.resolution_status == Some(ResolutionStatus::Resolved))
            .count();
        let resolution_rate = ratio(resolved, members.len());
        if resolution_rate < thresholds.resolution_max_rate {
            let category = members[0].primary_category.clone();
            issues.push(SystemicIssue::LowResolutionCategory {
                recommendation: format!(
                    "Only {:.1}% of {} calls are resolved; review the support playbook",
                    resolution_rate * 100.0,
                    code
                ),
                category,
                calls: members.len(),
                resolution_rate: round2(resolution_rate),
            });
        }
    }

    issues
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
