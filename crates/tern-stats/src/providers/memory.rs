use crate::provider::{Category, StatProvider};
use crate::sample::{MemoryUsage, SampleState};

const FIELDS: &[&str] = &["total", "used", "available", "swap_total", "swap_used"];

/// RAM and swap, in bytes.
#[derive(Debug, Default)]
pub struct MemoryProvider;

pub(crate) fn memory_fields(m: &MemoryUsage) -> Vec<String> {
    [m.total, m.used, m.available, m.swap_total, m.swap_used]
        .iter()
        .map(u64::to_string)
        .collect()
}

impl StatProvider for MemoryProvider {
    fn code(&self) -> &str {
        "memory"
    }

    fn category(&self) -> Category {
        Category::Memory
    }

    fn field_names(&self) -> &'static [&'static str] {
        FIELDS
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let usage = state.memory();
        if usage.total == 0 {
            return None;
        }
        Some(memory_fields(&usage))
    }
}
