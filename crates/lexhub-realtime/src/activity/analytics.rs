//! Rolling per-user aggregates.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use lexhub_core::types::UserId;

use super::event::ActivityEvent;

const DAY_FORMAT: &str = "%Y-%m-%d";

/// In-process rolling analytics for one user.
///
/// Counter maps are keyed by activity type name and by ISO date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAnalytics {
    pub user_id: UserId,
    pub total_events: u64,
    pub last_activity: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pages_visited: BTreeSet<String>,
    #[serde(default)]
    pub features_used: BTreeSet<String>,
    #[serde(default)]
    pub activity_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub daily_activity: BTreeMap<String, u64>,
}

impl UserAnalytics {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
            total_events: 0,
            last_activity: None,
            pages_visited: BTreeSet::new(),
            features_used: BTreeSet::new(),
            activity_counts: BTreeMap::new(),
            daily_activity: BTreeMap::new(),
        }
    }

    /// Fold one event into the aggregate.
    pub fn record(&mut self, event: &ActivityEvent) {
        self.total_events += 1;
        self.last_activity = Some(match self.last_activity {
            Some(last) => last.max(event.timestamp),
            None => event.timestamp,
        });
        if let Some(page) = &event.page {
            self.pages_visited.insert(page.clone());
        }
        if let Some(feature) = event.feature() {
            self.features_used.insert(feature.to_string());
        }
        *self
            .activity_counts
            .entry(event.activity_type.as_str().to_string())
            .or_default() += 1;
        *self
            .daily_activity
            .entry(day_key(event.timestamp.date_naive()))
            .or_default() += 1;
    }

    /// Events recorded on days within `from..=to`.
    pub fn events_between(&self, from: NaiveDate, to: NaiveDate) -> u64 {
        let (from, to) = (day_key(from), day_key(to));
        self.daily_activity
            .range(from..=to)
            .map(|(_, count)| *count)
            .sum()
    }
}

pub(crate) fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Approximate dashboard aggregate over a date range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_events: u64,
    pub active_users: usize,
    /// Lifetime per-type counts of the users active in the range.
    pub events_by_type: BTreeMap<String, u64>,
    pub events_by_day: BTreeMap<String, u64>,
}

impl ActivityStats {
    pub(crate) fn add_user(&mut self, analytics: &UserAnalytics, from: NaiveDate, to: NaiveDate) {
        let in_range = analytics.events_between(from, to);
        if in_range == 0 {
            return;
        }
        self.total_events += in_range;
        self.active_users += 1;
        for (activity_type, count) in &analytics.activity_counts {
            *self.events_by_type.entry(activity_type.clone()).or_default() += count;
        }
        let (from, to) = (day_key(from), day_key(to));
        for (day, count) in analytics.daily_activity.range(from..=to) {
            *self.events_by_day.entry(day.clone()).or_default() += count;
        }
    }
}
