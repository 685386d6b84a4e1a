//! One append-only log file per metric.
//!
//! Each line is `timestamp|field|field|...`. Collect and clean take the
//! file's write lock; load takes the read lock, so readers never see a
//! half-rewritten file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use crate::error::StatsError;
use crate::filter::{bucket_size, RecordFilter};
use crate::provider::{Category, StatProvider};
use crate::record::Record;
use crate::sample::SampleState;

pub struct StatCollector {
    provider: Box<dyn StatProvider>,
    path: PathBuf,
    /// Nominal seconds between records; drives gap filling.
    interval: i64,
    lock: RwLock<()>,
}

impl StatCollector {
    pub fn new(provider: Box<dyn StatProvider>, dir: &Path, interval: Duration) -> Self {
        let path = dir.join(provider.code());
        Self {
            provider,
            path,
            interval: interval.as_secs().max(1) as i64,
            lock: RwLock::new(()),
        }
    }

    pub fn code(&self) -> &str {
        self.provider.code()
    }

    pub fn category(&self) -> Category {
        self.provider.category()
    }

    pub fn label(&self) -> Option<&str> {
        self.provider.label()
    }

    pub fn field_names(&self) -> &'static [&'static str] {
        self.provider.field_names()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, ()> {
        self.lock.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, ()> {
        self.lock.write().unwrap_or_else(|e| e.into_inner())
    }

    fn io_error(&self, source: io::Error) -> StatsError {
        StatsError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Sample the provider and append one record stamped `now`.
    ///
    /// Returns `false` when the provider has nothing to report yet.
    /// Sampling happens before the file lock is taken.
    pub fn collect_at(&self, state: &mut SampleState, now: i64) -> Result<bool, StatsError> {
        let Some(fields) = self.provider.collect(state) else {
            tracing::trace!(code = self.code(), "No data yet");
            return Ok(false);
        };
        self.append(&Record::new(now, fields))?;
        Ok(true)
    }

    pub fn append(&self, record: &Record) -> Result<(), StatsError> {
        let expected = self.field_names().len();
        if record.fields.len() != expected {
            return Err(StatsError::InvalidRecord(format!(
                "{} has {} fields, expected {expected}",
                self.code(),
                record.fields.len()
            )));
        }
        record.validate()?;

        let _guard = self.write_guard();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;
        writeln!(file, "{}", record.to_line()).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    /// Admitted records with gaps filled, averaged into buckets when the
    /// filter spans more than a day.
    pub fn load(&self, filter: &dyn RecordFilter) -> Result<Vec<Record>, StatsError> {
        let text = {
            let _guard = self.read_guard();
            self.read_file()?
        };

        let field_count = self.field_names().len();
        let empty = self.provider.empty_value();
        let mut admitted = Vec::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match Record::parse_line(line, field_count, empty) {
                Ok(record) if filter.check(&record) => admitted.push(record),
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(
                        error = %e,
                        path = %self.path.display(),
                        line = number + 1,
                        "Skipping malformed record"
                    );
                }
            }
        }

        let filled = fill_gaps(admitted, self.interval, field_count, empty);
        match filter.span().and_then(bucket_size) {
            Some(size) => Ok(filled
                .chunks(size)
                .filter_map(|bucket| self.provider.average_record(bucket))
                .collect()),
            None => Ok(filled),
        }
    }

    /// Drop the leading run of records the filter admits and keep the rest.
    /// Returns the number of records removed.
    pub fn clean(&self, filter: &dyn RecordFilter) -> Result<usize, StatsError> {
        let _guard = self.write_guard();
        let text = self.read_file()?;

        let field_count = self.field_names().len();
        let empty = self.provider.empty_value();
        let mut removed = 0;
        let mut offset = 0;
        for line in text.split_inclusive('\n') {
            let trimmed = line.trim_end_matches(['\n', '\r']);
            if !trimmed.trim().is_empty() {
                let admitted = Record::parse_line(trimmed, field_count, empty)
                    .map(|r| filter.check(&r))
                    .unwrap_or(false);
                if !admitted {
                    break;
                }
                removed += 1;
            }
            offset += line.len();
        }

        if removed == 0 {
            return Ok(0);
        }

        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, &text[offset..]).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;

        tracing::debug!(code = self.code(), removed, "Cleaned statistics");
        Ok(removed)
    }

    /// A metric that never collected has no file yet; that reads as empty.
    fn read_file(&self) -> Result<String, StatsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// Insert empty records at `interval` steps wherever two neighbours are
/// further apart than one and a half intervals.
pub fn fill_gaps(records: Vec<Record>, interval: i64, field_count: usize, empty: &str) -> Vec<Record> {
    let tolerance = interval / 2;
    let mut out: Vec<Record> = Vec::with_capacity(records.len());
    for record in records {
        if let Some(prev) = out.last().map(|r| r.timestamp) {
            if record.timestamp - prev > interval + tolerance {
                let mut t = prev + interval;
                while t < record.timestamp - tolerance {
                    out.push(Record::empty(t, field_count, empty));
                    t += interval;
                }
            }
        }
        out.push(record);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{AcceptAll, OlderThan, TimeRange};
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Emits `[n, n*2]` with an increasing counter.
    struct Counter {
        next: AtomicI64,
    }

    impl StatProvider for Counter {
        fn code(&self) -> &str {
            "counter"
        }

        fn category(&self) -> Category {
            Category::Process
        }

        fn field_names(&self) -> &'static [&'static str] {
            &["value", "double"]
        }

        fn collect(&self, _state: &mut SampleState) -> Option<Vec<String>> {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                return None;
            }
            Some(vec![n.to_string(), (n * 2).to_string()])
        }
    }

    fn collector(dir: &Path) -> StatCollector {
        StatCollector::new(
            Box::new(Counter {
                next: AtomicI64::new(1),
            }),
            dir,
            Duration::from_secs(60),
        )
    }

    fn rec(ts: i64, fields: &[&str]) -> Record {
        Record::new(ts, fields.iter().map(|f| f.to_string()).collect())
    }

    fn timestamps(records: &[Record]) -> Vec<i64> {
        records.iter().map(|r| r.timestamp).collect()
    }

    // ── Collect and load ────────────────────────────────────────────

    #[test]
    fn appended_records_load_back_with_declared_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        assert_eq!(store.path(), dir.path().join("counter"));

        for i in 0..5 {
            store.append(&rec(1_000 + i * 60, &["1", "2"])).unwrap();
        }
        let records = store.load(&AcceptAll).unwrap();
        assert_eq!(records.len(), 5);
        assert!(records.iter().all(|r| r.fields.len() == 2));
    }

    #[test]
    fn collect_skips_when_provider_has_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = StatCollector::new(
            Box::new(Counter {
                next: AtomicI64::new(0),
            }),
            dir.path(),
            Duration::from_secs(60),
        );
        let mut state = SampleState::new();

        assert!(!store.collect_at(&mut state, 100).unwrap());
        assert!(!store.path().exists());
        assert!(store.collect_at(&mut state, 160).unwrap());

        let records = store.load(&AcceptAll).unwrap();
        assert_eq!(records, vec![rec(160, &["1", "2"])]);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collector(dir.path()).load(&AcceptAll).unwrap().is_empty());
        assert_eq!(collector(dir.path()).clean(&AcceptAll).unwrap(), 0);
    }

    #[test]
    fn wrong_field_count_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        assert!(matches!(
            store.append(&rec(1, &["1"])),
            Err(StatsError::InvalidRecord(_))
        ));
        assert!(store.append(&rec(1, &["1|2", "3"])).is_err());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        std::fs::write(store.path(), "100|1|2\ngarbage\n160|3|4|5\n\n160|3\n").unwrap();

        let records = store.load(&AcceptAll).unwrap();
        assert_eq!(records, vec![rec(100, &["1", "2"]), rec(160, &["3", ""])]);
    }

    // ── Gap filling ─────────────────────────────────────────────────

    #[test]
    fn gaps_are_filled_at_interval_steps() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        store.append(&rec(1635073200, &["1", "2"])).unwrap();
        store.append(&rec(1635073416, &["3", "6"])).unwrap();

        let records = store.load(&AcceptAll).unwrap();
        assert_eq!(
            timestamps(&records),
            vec![1635073200, 1635073260, 1635073320, 1635073380, 1635073416]
        );
        assert!(records[1..4].iter().all(|r| r.is_empty("")));
        assert_eq!(records[4].fields, vec!["3", "6"]);
    }

    #[test]
    fn jitter_within_tolerance_is_not_a_gap() {
        let filled = fill_gaps(vec![rec(0, &["1"]), rec(89, &["1"])], 60, 1, "");
        assert_eq!(filled.len(), 2);
        let filled = fill_gaps(vec![rec(0, &["1"]), rec(91, &["1"])], 60, 1, "");
        assert_eq!(timestamps(&filled), vec![0, 60, 91]);
    }

    // ── Downsampling ────────────────────────────────────────────────

    #[test]
    fn long_ranges_are_averaged_into_buckets() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        for i in 0..10 {
            let value = (i * 2).to_string();
            store.append(&rec(i * 60, &[&value, "1"])).unwrap();
        }

        // Two days: five records per bucket.
        let range = TimeRange::new(0, 2 * 86_400);
        let records = store.load(&range).unwrap();
        assert_eq!(records, vec![rec(240, &["4", "1"]), rec(540, &["14", "1"])]);

        // One day or less passes records through.
        let short = TimeRange::new(0, 86_400);
        assert_eq!(store.load(&short).unwrap().len(), 10);
    }

    // ── Clean ───────────────────────────────────────────────────────

    #[test]
    fn clean_removes_only_the_leading_admitted_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        for ts in [100, 160, 220, 50, 280] {
            store.append(&rec(ts, &["1", "2"])).unwrap();
        }

        // 50 is older than the cutoff but sits after a kept record.
        let removed = store.clean(&OlderThan::new(200)).unwrap();
        assert_eq!(removed, 2);
        let text = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(text, "220|1|2\n50|1|2\n280|1|2\n");
        assert!(!dir.path().join("counter.tmp").exists());

        assert_eq!(store.clean(&OlderThan::new(200)).unwrap(), 0);
    }

    #[test]
    fn clean_everything_leaves_an_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = collector(dir.path());
        store.append(&rec(100, &["1", "2"])).unwrap();
        assert_eq!(store.clean(&AcceptAll).unwrap(), 1);
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "");
        store.append(&rec(200, &["1", "2"])).unwrap();
        assert_eq!(store.load(&AcceptAll).unwrap().len(), 1);
    }
}
