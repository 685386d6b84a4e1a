use crate::provider::{format_value, Category, StatProvider};
use crate::sample::SampleState;

/// Capacity of one mountpoint, in bytes. The code carries the mountpoint's
/// id from the mapper rather than its path.
#[derive(Debug)]
pub struct DiskUsageProvider {
    mount_point: String,
    code: String,
}

impl DiskUsageProvider {
    pub fn new(mount_point: &str, id: u32) -> Self {
        Self {
            mount_point: mount_point.to_string(),
            code: format!("diskusage{id}"),
        }
    }
}

impl StatProvider for DiskUsageProvider {
    fn code(&self) -> &str {
        &self.code
    }

    fn category(&self) -> Category {
        Category::Disk
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["total", "used", "available"]
    }

    fn label(&self) -> Option<&str> {
        Some(&self.mount_point)
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let disk = state
            .disks()
            .into_iter()
            .find(|d| d.mount_point == self.mount_point)?;
        let used = disk.total.saturating_sub(disk.available);
        Some(vec![
            disk.total.to_string(),
            used.to_string(),
            disk.available.to_string(),
        ])
    }
}

/// Read / written bytes per second on one block device.
#[derive(Debug)]
pub struct DiskIoProvider {
    device: String,
    code: String,
}

impl DiskIoProvider {
    pub fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            code: format!("diskio{device}"),
        }
    }
}

impl StatProvider for DiskIoProvider {
    fn code(&self) -> &str {
        &self.code
    }

    fn category(&self) -> Category {
        Category::Disk
    }

    fn field_names(&self) -> &'static [&'static str] {
        &["read", "written"]
    }

    fn label(&self) -> Option<&str> {
        Some(&self.device)
    }

    fn collect(&self, state: &mut SampleState) -> Option<Vec<String>> {
        let counters = state
            .disk_io_counters()
            .into_iter()
            .find(|c| c.name == self.device)?;
        let rates = state.rate(&self.code, &[counters.first, counters.second])?;
        Some(rates.into_iter().map(|r| format_value(r, false)).collect())
    }
}
