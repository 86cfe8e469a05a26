use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

/// One approved reservation reduced to what usage ranking needs.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSpan {
    pub user_id: Uuid,
    pub user_name: String,
    pub user_email: String,
    pub resource_id: Uuid,
    pub resource_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl UsageSpan {
    fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResource {
    pub id: Uuid,
    pub name: String,
    pub value: i64,
}

/// Leaderboards over approved reservations. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub top_reservers_by_count: Vec<RankedUser>,
    pub top_reservers_by_time: Vec<RankedUser>,
    pub top_resources_by_count: Vec<RankedResource>,
    pub top_resources_by_time: Vec<RankedResource>,
}

#[derive(Default)]
struct Tally {
    count: i64,
    duration_ms: i64,
}

impl UsageReport {
    pub const TOP_N: usize = 10;

    pub fn from_spans(spans: &[UsageSpan]) -> Self {
        let mut users: HashMap<Uuid, (&UsageSpan, Tally)> = HashMap::new();
        let mut resources: HashMap<Uuid, (&UsageSpan, Tally)> = HashMap::new();

        for span in spans {
            let (_, tally) = users.entry(span.user_id).or_insert_with(|| (span, Tally::default()));
            tally.count += 1;
            tally.duration_ms += span.duration_ms();

            let (_, tally) = resources
                .entry(span.resource_id)
                .or_insert_with(|| (span, Tally::default()));
            tally.count += 1;
            tally.duration_ms += span.duration_ms();
        }

        let rank_users = |value: fn(&Tally) -> i64| {
            let ranked: Vec<RankedUser> = users
                .values()
                .map(|(span, tally)| RankedUser {
                    id: span.user_id,
                    name: span.user_name.clone(),
                    email: span.user_email.clone(),
                    value: value(tally),
                })
                .collect();
            top(ranked, |u: &RankedUser| (u.value, u.name.clone()))
        };
        let rank_resources = |value: fn(&Tally) -> i64| {
            let ranked: Vec<RankedResource> = resources
                .values()
                .map(|(span, tally)| RankedResource {
                    id: span.resource_id,
                    name: span.resource_name.clone(),
                    value: value(tally),
                })
                .collect();
            top(ranked, |r: &RankedResource| (r.value, r.name.clone()))
        };

        Self {
            top_reservers_by_count: rank_users(|t| t.count),
            top_reservers_by_time: rank_users(|t| t.duration_ms),
            top_resources_by_count: rank_resources(|t| t.count),
            top_resources_by_time: rank_resources(|t| t.duration_ms),
        }
    }
}

/// Highest value first, ties by name, truncated to [`UsageReport::TOP_N`].
fn top<T>(mut ranked: Vec<T>, key: impl Fn(&T) -> (i64, String)) -> Vec<T> {
    ranked.sort_by(|a, b| {
        let (a_value, a_name) = key(a);
        let (b_value, b_name) = key(b);
        b_value.cmp(&a_value).then_with(|| a_name.cmp(&b_name))
    });
    ranked.truncate(UsageReport::TOP_N);
    ranked
}
