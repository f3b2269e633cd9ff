mod alerts;
mod categories;
mod series;

pub use alerts::{
    AlertGroup, AlertStatus, Staleness, StalenessPolicy, classify_reading, compute_alerts,
};
pub use categories::category_for;
pub use series::{MIN_TREND_POINTS, SeriesPoint, TrendCandidate, build_series, trend_candidates};
