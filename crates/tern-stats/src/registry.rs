use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::StatsError;
use crate::filter::{OlderThan, TimeRange};
use crate::mountpoint::MountpointIdMapper;
use crate::provider::{Category, StatProvider};
use crate::providers::{
    CpuCoreProvider, CpuOverallProvider, DiskIoProvider, DiskUsageProvider, MemoryProvider,
    NetworkProvider, ProcessProvider,
};
use crate::record::Record;
use crate::sample::SampleState;
use crate::store::StatCollector;

/// File holding the mountpoint → id mapping, next to the metric logs.
pub const MOUNTPOINTS_FILE: &str = "mountpoints.json";

/// One metric's processed records, as returned by the read API.
#[derive(Debug, Clone, Serialize)]
pub struct MetricSeries {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub fields: Vec<String>,
    pub records: Vec<Record>,
}

/// Every registered metric store.
#[derive(Default)]
pub struct StatsCore {
    collectors: Vec<Arc<StatCollector>>,
}

impl StatsCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one store. A second store with the same code is ignored.
    pub fn register(&mut self, collector: StatCollector) {
        if self.collector(collector.code()).is_some() {
            tracing::debug!(code = collector.code(), "Duplicate metric ignored");
            return;
        }
        self.collectors.push(Arc::new(collector));
    }

    /// Build the default metric set for this host: CPU (overall and per
    /// core), memory, processes, every mounted disk, every block device
    /// and every non-loopback interface.
    pub fn discover(
        dir: &Path,
        interval: Duration,
        state: &mut SampleState,
    ) -> Result<Self, StatsError> {
        std::fs::create_dir_all(dir).map_err(|source| StatsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let mapper = MountpointIdMapper::load(&dir.join(MOUNTPOINTS_FILE))?;

        let mut providers: Vec<Box<dyn StatProvider>> = vec![
            Box::new(CpuOverallProvider),
            Box::new(MemoryProvider),
            Box::new(ProcessProvider),
        ];
        for index in 0..state.cpu_count() {
            providers.push(Box::new(CpuCoreProvider::new(index)));
        }
        for disk in state.disks() {
            let id = mapper.id_for(&disk.mount_point)?;
            providers.push(Box::new(DiskUsageProvider::new(&disk.mount_point, id)));
        }
        for device in state.disk_io_counters() {
            providers.push(Box::new(DiskIoProvider::new(&device.name)));
        }
        for iface in state.network_counters() {
            if iface.name == "lo" {
                continue;
            }
            providers.push(Box::new(NetworkProvider::new(&iface.name)));
        }

        let mut core = Self::new();
        for provider in providers {
            core.register(StatCollector::new(provider, dir, interval));
        }
        tracing::info!(metrics = core.collectors.len(), dir = %dir.display(), "Statistics registered");
        Ok(core)
    }

    pub fn collectors(&self) -> &[Arc<StatCollector>] {
        &self.collectors
    }

    pub fn collector(&self, code: &str) -> Option<&Arc<StatCollector>> {
        self.collectors.iter().find(|c| c.code() == code)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Arc<StatCollector>> {
        self.collectors
            .iter()
            .filter(move |c| c.category() == category)
    }

    /// One sampling round over every store. Failures are logged per metric;
    /// returns the number of records written.
    pub fn collect_all(&self, state: &mut SampleState, now: i64) -> usize {
        state.begin_tick();
        let mut written = 0;
        for collector in &self.collectors {
            match collector.collect_at(state, now) {
                Ok(true) => written += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(error = %e, code = collector.code(), "Statistics collect failed");
                }
            }
        }
        written
    }

    /// Drop records older than `cutoff` from every store.
    pub fn clean_all(&self, cutoff: i64) -> usize {
        let filter = OlderThan::new(cutoff);
        let mut removed = 0;
        for collector in &self.collectors {
            match collector.clean(&filter) {
                Ok(n) => removed += n,
                Err(e) => {
                    tracing::warn!(error = %e, code = collector.code(), "Statistics clean failed");
                }
            }
        }
        removed
    }

    pub fn load_category(
        &self,
        category: Category,
        from: i64,
        to: i64,
    ) -> Result<Vec<MetricSeries>, StatsError> {
        let range = TimeRange::new(from, to);
        self.by_category(category)
            .map(|collector| {
                Ok(MetricSeries {
                    code: collector.code().to_string(),
                    label: collector.label().map(str::to_string),
                    fields: collector
                        .field_names()
                        .iter()
                        .map(|f| f.to_string())
                        .collect(),
                    records: collector.load(&range)?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        code: &'static str,
        category: Category,
    }

    impl StatProvider for Fixed {
        fn code(&self) -> &str {
            self.code
        }

        fn category(&self) -> Category {
            self.category
        }

        fn field_names(&self) -> &'static [&'static str] {
            &["value"]
        }

        fn collect(&self, _state: &mut SampleState) -> Option<Vec<String>> {
            Some(vec!["7".into()])
        }
    }

    fn core(dir: &Path) -> StatsCore {
        let mut core = StatsCore::new();
        for (code, category) in [
            ("cpuoverall", Category::Cpu),
            ("cpucore0", Category::Cpu),
            ("memory", Category::Memory),
            ("cpuoverall", Category::Cpu),
        ] {
            core.register(StatCollector::new(
                Box::new(Fixed { code, category }),
                dir,
                Duration::from_secs(60),
            ));
        }
        core
    }

    #[test]
    fn duplicate_codes_register_once() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(dir.path());
        assert_eq!(core.collectors().len(), 3);
        assert_eq!(core.by_category(Category::Cpu).count(), 2);
        assert!(core.collector("memory").is_some());
        assert!(core.collector("network").is_none());
    }

    #[test]
    fn load_category_returns_series_per_metric() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(dir.path());
        let mut state = SampleState::new();
        assert_eq!(core.collect_all(&mut state, 1_000), 3);
        assert_eq!(core.collect_all(&mut state, 1_060), 3);

        let series = core.load_category(Category::Cpu, 0, 2_000).unwrap();
        let codes: Vec<_> = series.iter().map(|s| s.code.as_str()).collect();
        assert_eq!(codes, vec!["cpuoverall", "cpucore0"]);
        assert_eq!(series[0].fields, vec!["value"]);
        assert_eq!(series[0].records.len(), 2);

        let json = serde_json::to_value(&series[0]).unwrap();
        assert_eq!(json["records"][0], serde_json::json!([1000, "7"]));
        assert!(json.get("label").is_none());
    }

    #[test]
    fn clean_all_applies_cutoff_everywhere() {
        let dir = tempfile::tempdir().unwrap();
        let core = core(dir.path());
        let mut state = SampleState::new();
        core.collect_all(&mut state, 1_000);
        core.collect_all(&mut state, 1_060);

        assert_eq!(core.clean_all(1_030), 3);
        let memory = core.load_category(Category::Memory, 0, 2_000).unwrap();
        assert_eq!(memory[0].records.len(), 1);
        assert_eq!(memory[0].records[0].timestamp, 1_060);
    }

    #[test]
    fn discover_registers_host_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = SampleState::new();
        let core = StatsCore::discover(dir.path(), Duration::from_secs(60), &mut state).unwrap();
        assert!(core.collector("cpuoverall").is_some());
        assert!(core.collector("memory").is_some());
        assert!(core.collector("process").is_some());
        assert!(core.collector("networklo").is_none());
    }
}
