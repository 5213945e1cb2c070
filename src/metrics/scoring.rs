use crate::provider::Provider;
use std::collections::BTreeMap;

/// Compute the 0-100 performance score for one record's fields.
///
/// Pure function of the field map: no external state, no randomness. Each
/// weighted sub-score is clamped into [0, cap] before summing, so
/// out-of-range provider values (a bounce rate above 1, a negative counter)
/// degrade gracefully instead of escaping the scale. The final value is
/// rounded, then clamped to [0, 100].
pub fn score(provider: Provider, fields: &BTreeMap<String, f64>) -> i64 {
    let get = |name: &str| fields.get(name).copied().unwrap_or(0.0);

    let raw = match provider {
        // Engagement-led sites: engagement rate dominates, conversions and
        // stickiness fill out the scale.
        Provider::WebAnalytics => {
            capped(get("engagement_rate") * 40.0, 40.0)
                + capped(get("conversions") / 10.0 * 30.0, 30.0)
                + capped((1.0 - get("bounce_rate")) * 20.0, 20.0)
                + capped(get("pages_per_session") / 5.0 * 10.0, 10.0)
        }

        Provider::SearchConsole => {
            capped(get("impressions") / 1000.0 * 20.0, 20.0)
                + capped(get("clicks") / 100.0 * 30.0, 30.0)
                + capped(get("ctr") * 250.0, 25.0)
                + position_score(get("position"))
        }

        Provider::BusinessListing => {
            let actions =
                get("phone_calls") + get("website_clicks") + get("direction_requests");
            let reviews =
                capped(get("average_rating") / 5.0 * 15.0, 15.0)
                    + capped(get("total_reviews") / 20.0 * 10.0, 10.0);
            let content = capped(get("total_photos") / 10.0 * 10.0, 10.0)
                + capped(get("posts_created") * 5.0, 10.0);
            capped(get("total_views") / 100.0 * 25.0, 25.0)
                + capped(actions / 50.0 * 30.0, 30.0)
                + reviews
                + content
        }

        // Starts from a perfect score and subtracts friction.
        Provider::BehavioralAnalytics => {
            let friction =
                get("dead_clicks") + get("rage_clicks") * 2.0 + get("quick_backs");
            100.0 - capped(get("bounce_rate") * 30.0, 30.0)
                - capped(friction * 0.5, 40.0)
                - capped(get("js_errors") * 2.0, 20.0)
                + engagement_bonus(get("avg_session_duration"))
        }
    };

    (raw.round() as i64).clamp(0, 100)
}

fn capped(value: f64, cap: f64) -> f64 {
    value.clamp(0.0, cap)
}

/// 25 points at position 1, minus 2.5 per position; zero without ranking data.
fn position_score(position: f64) -> f64 {
    if position <= 0.0 {
        return 0.0;
    }
    capped(25.0 - (position - 1.0) * 2.5, 25.0)
}

/// Up to 10 bonus points, full bonus at the two-minute session threshold.
fn engagement_bonus(avg_session_secs: f64) -> f64 {
    capped(avg_session_secs / 120.0 * 10.0, 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::record::field_map;

    #[test]
    fn business_listing_worked_example() {
        // views 25 + engagement 21 + reviews (14.4 + 10) + content (10 + 10)
        // = 90.4, rounded to 90.
        let fields = field_map(&[
            ("total_views", 500.0),
            ("phone_calls", 10.0),
            ("website_clicks", 20.0),
            ("direction_requests", 5.0),
            ("average_rating", 4.8),
            ("total_reviews", 50.0),
            ("total_photos", 30.0),
            ("posts_created", 2.0),
        ]);
        assert_eq!(score(Provider::BusinessListing, &fields), 90);
    }

    #[test]
    fn scores_stay_in_range_for_out_of_range_inputs() {
        // Negative bounce rate would push the inverse-bounce sub-score past
        // its cap without clamping; a huge one would push it negative.
        for bounce in [-5.0, 0.0, 0.5, 1.0, 25.0] {
            let fields = field_map(&[
                ("engagement_rate", 2.0),
                ("conversions", 1e9),
                ("bounce_rate", bounce),
                ("pages_per_session", -3.0),
            ]);
            let s = score(Provider::WebAnalytics, &fields);
            assert!((0..=100).contains(&s), "score {s} out of range");
        }
    }

    #[test]
    fn behavioral_clamps_at_both_ends() {
        let terrible = field_map(&[
            ("bounce_rate", 3.0),
            ("dead_clicks", 500.0),
            ("rage_clicks", 500.0),
            ("quick_backs", 500.0),
            ("js_errors", 500.0),
            ("avg_session_duration", 0.0),
        ]);
        assert_eq!(score(Provider::BehavioralAnalytics, &terrible), 10);

        let pristine = field_map(&[("avg_session_duration", 600.0)]);
        assert_eq!(score(Provider::BehavioralAnalytics, &pristine), 100);

        let negative_inputs = field_map(&[
            ("bounce_rate", -1.0),
            ("dead_clicks", -50.0),
            ("js_errors", -2.0),
            ("avg_session_duration", -10.0),
        ]);
        // Negative penalties must not become bonuses.
        assert_eq!(score(Provider::BehavioralAnalytics, &negative_inputs), 100);
    }

    #[test]
    fn search_console_position_curve() {
        let at = |position: f64| {
            let fields = field_map(&[("position", position)]);
            score(Provider::SearchConsole, &fields)
        };
        assert_eq!(at(1.0), 25);
        assert_eq!(at(5.0), 15);
        assert_eq!(at(11.0), 0);
        assert_eq!(at(50.0), 0);
        // No ranking data earns nothing.
        assert_eq!(at(0.0), 0);
    }

    #[test]
    fn empty_fields_score_is_in_range() {
        for p in Provider::ALL {
            let s = score(p, &BTreeMap::new());
            assert!((0..=100).contains(&s));
        }
    }

    #[test]
    fn scoring_is_deterministic() {
        let fields = field_map(&[
            ("impressions", 1234.0),
            ("clicks", 56.0),
            ("ctr", 0.045),
            ("position", 3.7),
        ]);
        let first = score(Provider::SearchConsole, &fields);
        for _ in 0..10 {
            assert_eq!(score(Provider::SearchConsole, &fields), first);
        }
    }
}
