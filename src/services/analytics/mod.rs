pub mod aggregator;
pub mod resolver;
pub mod sanitizer;
pub mod types;
pub mod utils;

pub use aggregator::{AggregateOptions, MetricAggregator};
pub use resolver::{ColumnRoleResolver, ResolveOptions};
pub use types::{AnalyticsSummary, ColumnRole, CorrelationMode, DateRange, Figure, RoleMap};
