use crate::provider::{Category, StatProvider};
use crate::sample::SampleState;

use super::percent;

const FIELDS: &[&str] = &["usage"];

/// Whole-machine CPU usage percent.
#[derive(Debug, Default)]
pub struct CpuOverallProvider;

impl StatProvider for CpuOverallProvider {
    fn code(&self) -> &str {
        "cpuoverall"
    }

    fn category(&self) -> Category {
        Category::Cpu
    }

    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn format_float(&self) -> bool {
        true
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let usage = state.cpu()?;
        Some(vec![percent(usage.overall)])
    }
}

/// Usage percent of one logical core.
#[derive(Debug)]
pub struct CpuCoreProvider {
    index: usize,
    code: String,
}

impl CpuCoreProvider {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            code: format!("cpucore{index}"),
        }
    }
}

impl StatProvider for CpuCoreProvider {
    fn code(&self) -> &str {
        &self.code
    }

    fn category(&self) -> Category {
        Category::Cpu
    }

    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn format_float(&self) -> bool {
        true
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let usage = state.cpu()?;
        let core = usage.cores.get(self.index)?;
        Some(vec![percent(*core)])
    }
}
