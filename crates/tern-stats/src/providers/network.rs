use crate::provider::{format_value, Category, StatProvider};
use crate::sample::SampleState;

/// Received / transmitted bytes per second on one interface.
#[derive(Debug)]
pub struct NetworkProvider {
    interface: String,
    code: String,
}

impl NetworkProvider {
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
            code: format!("network{}", sanitize(interface)),
        }
    }
}

/// Interface names may contain characters unsuitable for a file name.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

impl StatProvider for NetworkProvider {
    fn code(&self) -> &str {
        &self.code
    }

    fn category(&self) -> Category {
        Category::Network
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["received", "transmitted"]
    }

    fn label(&self) -> Option<&str> {
        Some(&self.interface)
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let counters = state
            .network_counters()
            .into_iter()
            .find(|c| c.name == self.interface)?;
        let rates = state.rate(&self.code, &[counters.first, counters.second])?;
        Some(rates.into_iter().map(|r| format_value(r, false)).collect())
    }
}
