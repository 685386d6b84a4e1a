//! Built-in metric providers.

mod cpu;
mod disk;
mod memory;
mod network;
mod process;

pub use cpu::{CpuCoreProvider, CpuOverallProvider};
pub use disk::{DiskIoProvider, DiskUsageProvider};
pub use memory::MemoryProvider;
pub use network::NetworkProvider;
pub use process::ProcessProvider;

/// Two-decimal rendering shared by the percentage providers.
pub(crate) fn percent(value: f32) -> String {
    format!("{:.2}", value)
}
