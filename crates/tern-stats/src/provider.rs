use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::record::Record;
use crate::sample::SampleState;

/// Grouping used by the read API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Cpu,
    Memory,
    Disk,
    Network,
    Process,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Network => "network",
            Self::Process => "process",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            "network" => Ok(Self::Network),
            "process" => Ok(Self::Process),
            other => Err(StatsError::UnknownCategory(other.to_string())),
        }
    }
}

/// One metric: how to sample it and how to fold several records into one.
pub trait StatProvider: Send + Sync {
    /// File and wire name, e.g. `cpuoverall`, `diskusage3`, `networketh0`.
    fn code(&self) -> &str;
    fn category(&self) -> Category;
    fn field_names(&self) -> &'static [&'static str];

    /// Human name of the measured thing (mountpoint, interface, device).
    fn label(&self) -> Option<&str> {
        None
    }

    fn empty_value(&self) -> &str {
        ""
    }

    /// Averages print with two decimals instead of truncating.
    fn format_float(&self) -> bool {
        false
    }

    /// Current values, or `None` when there is nothing to report yet
    /// (for example, a rate provider that has only seen one sample).
    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>>;

    fn average_record(&self, records: &[Record]) -> Option<Record> {
        average_records(
            records,
            self.field_names().len(),
            self.empty_value(),
            self.format_float(),
        )
    }
}

/// Per-field mean over `records`, skipping empty and unparsable values.
/// A field with no usable value stays empty. The result carries the last
/// record's timestamp.
pub fn average_records(
    records: &[Record],
    field_count: usize,
    empty_value: &str,
    format_float: bool,
) -> Option<Record> {
    let last = records.last()?;
    let fields = (0..field_count)
        .map(|i| {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| r.fields.get(i))
                .filter(|v| v.as_str() != empty_value)
                .filter_map(|v| v.trim().parse::<f64>().ok())
                .collect();
            if values.is_empty() {
                return empty_value.to_string();
            }
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            format_value(mean, format_float)
        })
        .collect();
    Some(Record::new(last.timestamp, fields))
}

pub(crate) fn format_value(value: f64, format_float: bool) -> String {
    if format_float {
        format!("{value:.2}")
    } else {
        (value.trunc() as i64).to_string()
    }
}
