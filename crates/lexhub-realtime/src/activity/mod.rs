//! User activity tracking: a buffered event log persisted per day, plus
//! rolling per-user analytics.

pub mod analytics;
pub mod event;
pub mod sink;
pub mod tracker;

pub use analytics::{ActivityStats, UserAnalytics};
pub use event::{ActivityEvent, ActivityType};
pub use sink::{ActivitySink, StoreActivitySink};
pub use tracker::ActivityTracker;
