use crate::metrics::record::{Dimensions, MetricRecord, field_map};
use crate::provider::Provider;
use crate::providers::RawRows;

/// Map raw provider rows onto the canonical per-date schema.
///
/// Every provider has a fixed field mapping; values the provider omitted are
/// already zero-filled by the adapters, so records never carry nulls.
/// Dimensioned rows (search-console breakdowns, per-location listing rows)
/// become one record per (date, dimension tuple); everything else one record
/// per date. Scores are filled in by the scoring engine afterwards.
pub fn normalize(client_id: &str, raw: RawRows) -> Vec<MetricRecord> {
    match raw {
        RawRows::WebAnalytics(rows) => rows
            .into_iter()
            .map(|r| MetricRecord {
                client_id: client_id.to_string(),
                provider: Provider::WebAnalytics,
                date: r.date,
                dimensions: Dimensions::default(),
                fields: field_map(&[
                    ("total_users", r.total_users),
                    ("new_users", r.new_users),
                    ("sessions", r.sessions),
                    ("engagement_rate", r.engagement_rate),
                    ("bounce_rate", r.bounce_rate),
                    ("conversions", r.conversions),
                    ("pages_per_session", r.pages_per_session),
                    ("avg_session_duration", r.avg_session_duration),
                ]),
                calculated_score: 0,
            })
            .collect(),

        RawRows::SearchConsole(rows) => rows
            .into_iter()
            .map(|r| MetricRecord {
                client_id: client_id.to_string(),
                provider: Provider::SearchConsole,
                date: r.date,
                dimensions: Dimensions {
                    query: r.query,
                    page: r.page,
                    device: r.device,
                    location: None,
                },
                fields: field_map(&[
                    ("impressions", r.impressions),
                    ("clicks", r.clicks),
                    ("ctr", r.ctr),
                    ("position", r.position),
                ]),
                calculated_score: 0,
            })
            .collect(),

        RawRows::BusinessListing(rows) => rows
            .into_iter()
            .map(|r| MetricRecord {
                client_id: client_id.to_string(),
                provider: Provider::BusinessListing,
                date: r.date,
                dimensions: Dimensions {
                    query: None,
                    page: None,
                    device: None,
                    location: r.location,
                },
                fields: field_map(&[
                    ("total_views", r.total_views),
                    ("search_views", r.search_views),
                    ("maps_views", r.maps_views),
                    ("phone_calls", r.phone_calls),
                    ("website_clicks", r.website_clicks),
                    ("direction_requests", r.direction_requests),
                    ("average_rating", r.average_rating),
                    ("total_reviews", r.total_reviews),
                    ("total_photos", r.total_photos),
                    ("posts_created", r.posts_created),
                ]),
                calculated_score: 0,
            })
            .collect(),

        RawRows::Behavioral(rows) => rows
            .into_iter()
            .map(|r| MetricRecord {
                client_id: client_id.to_string(),
                provider: Provider::BehavioralAnalytics,
                date: r.date,
                dimensions: Dimensions::default(),
                fields: field_map(&[
                    ("sessions", r.sessions),
                    ("bounce_rate", r.bounce_rate),
                    ("dead_clicks", r.dead_clicks),
                    ("rage_clicks", r.rage_clicks),
                    ("quick_backs", r.quick_backs),
                    ("js_errors", r.js_errors),
                    ("avg_session_duration", r.avg_session_duration),
                ]),
                calculated_score: 0,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{BehavioralRow, SearchConsoleRow, WebAnalyticsRow};
    use chrono::NaiveDate;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn web_analytics_emits_one_record_per_date() {
        let rows = vec![
            WebAnalyticsRow {
                date: d("2025-06-01"),
                total_users: 120.0,
                new_users: 35.0,
                sessions: 140.0,
                engagement_rate: 0.62,
                bounce_rate: 0.38,
                conversions: 4.0,
                pages_per_session: 2.4,
                avg_session_duration: 95.5,
            },
            WebAnalyticsRow {
                date: d("2025-06-02"),
                total_users: 98.0,
                new_users: 20.0,
                sessions: 110.0,
                engagement_rate: 0.55,
                bounce_rate: 0.45,
                conversions: 2.0,
                pages_per_session: 2.1,
                avg_session_duration: 80.0,
            },
        ];

        let records = normalize("client-1", RawRows::WebAnalytics(rows));
        assert_eq!(records.len(), 2);
        assert!(records[0].dimensions.is_empty());
        assert_eq!(records[0].field("total_users"), 120.0);
        assert_eq!(records[1].field("engagement_rate"), 0.55);
    }

    #[test]
    fn search_console_emits_one_record_per_dimension_tuple() {
        let mk = |query: &str, page: &str| SearchConsoleRow {
            date: d("2025-06-01"),
            query: Some(query.to_string()),
            page: Some(page.to_string()),
            device: None,
            impressions: 100.0,
            clicks: 5.0,
            ctr: 0.05,
            position: 3.0,
        };
        let records = normalize(
            "client-1",
            RawRows::SearchConsole(vec![mk("dentist", "/"), mk("dentist near me", "/contact")]),
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date, records[1].date);
        assert_ne!(records[0].dimensions, records[1].dimensions);
        assert_eq!(records[0].field("ctr"), 0.05);
    }

    #[test]
    fn absent_source_fields_are_zero_not_missing() {
        let records = normalize(
            "client-1",
            RawRows::Behavioral(vec![BehavioralRow {
                date: d("2025-06-01"),
                sessions: 220.0,
                bounce_rate: 0.41,
                dead_clicks: 0.0,
                rage_clicks: 0.0,
                quick_backs: 0.0,
                js_errors: 0.0,
                avg_session_duration: 0.0,
            }]),
        );

        let record = &records[0];
        assert_eq!(record.fields.len(), 7);
        assert_eq!(record.field("js_errors"), 0.0);
        assert_eq!(record.field("rage_clicks"), 0.0);
    }

    #[test]
    fn empty_raw_rows_normalize_to_nothing() {
        let records = normalize("client-1", RawRows::SearchConsole(vec![]));
        assert!(records.is_empty());
    }
}
