//! Host statistics: per-metric append-only logs with gap filling,
//! downsampling for long ranges, and retention.

pub mod error;
pub mod filter;
pub mod mountpoint;
pub mod provider;
pub mod providers;
pub mod record;
pub mod registry;
pub mod sample;
pub mod service;
pub mod store;

pub use error::StatsError;
pub use filter::{bucket_size, AcceptAll, OlderThan, RecordFilter, TimeRange};
pub use mountpoint::MountpointIdMapper;
pub use provider::{average_records, Category, StatProvider};
pub use record::Record;
pub use registry::{MetricSeries, StatsCore, MOUNTPOINTS_FILE};
pub use sample::SampleState;
pub use service::{run_cleaner_loop, run_collector_loop};
pub use store::StatCollector;
