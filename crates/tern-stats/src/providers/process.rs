use crate::provider::{Category, StatProvider};
use crate::sample::SampleState;

/// Number of running processes.
#[derive(Debug, Default)]
pub struct ProcessProvider;

impl StatProvider for ProcessProvider {
    fn code(&self) -> &str {
        "process"
    }

    fn category(&self) -> Category {
        Category::Process
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["count"]
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        Some(vec![state.process_count().to_string()])
    }
}
