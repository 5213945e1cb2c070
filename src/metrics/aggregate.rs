use crate::metrics::record::MetricRecord;
use crate::provider::Provider;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Up,
    Down,
    Stable,
}

/// Transient reduction of a record set over a date range. Never persisted;
/// always recomputed from stored records.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateWindow {
    pub totals: BTreeMap<String, f64>,
    pub average_score: f64,
    pub trend: TrendDirection,
    pub change_percent: f64,
}

impl AggregateWindow {
    fn empty() -> Self {
        Self {
            totals: BTreeMap::new(),
            average_score: 0.0,
            trend: TrendDirection::Stable,
            change_percent: 0.0,
        }
    }
}

/// Reduce a record set into totals, average score, and a first-half versus
/// second-half trend on the provider's primary field.
///
/// Totals are field-wise sums, except the provider's monotonic counters
/// (lifetime totals such as review count) which take the running maximum.
/// The trend split is at floor(n/2) of the date-ordered set; change beyond
/// plus/minus five percent (exclusive) classifies as up or down.
pub fn aggregate(provider: Provider, records: &[MetricRecord]) -> AggregateWindow {
    if records.is_empty() {
        return AggregateWindow::empty();
    }
    let profile = provider.profile();

    let mut totals: BTreeMap<String, f64> = BTreeMap::new();
    let mut score_sum = 0.0;
    for record in records {
        for (name, value) in &record.fields {
            let entry = totals.entry(name.clone()).or_insert(0.0);
            if profile.monotonic_fields.contains(&name.as_str()) {
                *entry = entry.max(*value);
            } else {
                *entry += value;
            }
        }
        score_sum += record.calculated_score as f64;
    }
    let average_score = score_sum / records.len() as f64;

    // Range reads come back date-ascending already; re-sort so callers with
    // hand-assembled sets get the same answer.
    let mut ordered: Vec<&MetricRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.date);

    let mid = ordered.len() / 2;
    let first_mean = mean(&ordered[..mid], profile.primary_trend_field);
    let second_mean = mean(&ordered[mid..], profile.primary_trend_field);

    let change_percent = if first_mean == 0.0 {
        0.0
    } else {
        (second_mean - first_mean) / first_mean * 100.0
    };
    let trend = if change_percent > 5.0 {
        TrendDirection::Up
    } else if change_percent < -5.0 {
        TrendDirection::Down
    } else {
        TrendDirection::Stable
    };

    AggregateWindow {
        totals,
        average_score,
        trend,
        change_percent,
    }
}

fn mean(records: &[&MetricRecord], field: &str) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let sum: f64 = records.iter().map(|r| r.field(field)).sum();
    sum / records.len() as f64
}
