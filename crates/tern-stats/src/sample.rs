//! Sampling state carried between collector ticks.
//!
//! Rate metrics need the previous counter values and CPU usage needs a
//! previous refresh. All of that lives here, owned by the collector loop
//! and handed to every provider on each tick.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use sysinfo::{Disks, Networks, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Resource {
    Cpu,
    Memory,
    Processes,
    Disks,
    Networks,
    DiskIo,
}

#[derive(Debug, Clone)]
struct CounterSample {
    taken: Instant,
    values: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuUsage {
    pub overall: f32,
    pub cores: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryUsage {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    pub mount_point: String,
    pub total: u64,
    pub available: u64,
}

/// Cumulative byte counters for one device or interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteCounters {
    pub name: String,
    pub first: u64,
    pub second: u64,
}

pub struct SampleState {
    system: System,
    disks: Disks,
    networks: Networks,
    /// Resources already refreshed during the current tick.
    refreshed: HashSet<Resource>,
    cpu_refreshes: u64,
    diskio: Vec<ByteCounters>,
    previous: HashMap<String, CounterSample>,
    tick_at: Instant,
}

impl Default for SampleState {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleState {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            disks: Disks::new_with_refreshed_list(),
            networks: Networks::new_with_refreshed_list(),
            refreshed: HashSet::new(),
            cpu_refreshes: 0,
            diskio: Vec::new(),
            previous: HashMap::new(),
            tick_at: Instant::now(),
        }
    }

    /// Start a new sampling round; every resource is re-read once on demand.
    pub fn begin_tick(&mut self) {
        self.refreshed.clear();
        self.tick_at = Instant::now();
    }

    fn first_this_tick(&mut self, resource: Resource) -> bool {
        self.refreshed.insert(resource)
    }

    /// `None` until a second refresh gives sysinfo a baseline.
    pub fn cpu(&mut self) -> Option<CpuUsage> {
        if self.first_this_tick(Resource::Cpu) {
            self.system.refresh_cpu();
            self.cpu_refreshes += 1;
        }
        if self.cpu_refreshes < 2 {
            return None;
        }
        Some(CpuUsage {
            overall: self.system.global_cpu_info().cpu_usage(),
            cores: self.system.cpus().iter().map(|c| c.cpu_usage()).collect(),
        })
    }

    pub fn cpu_count(&mut self) -> usize {
        if self.system.cpus().is_empty() {
            self.system.refresh_cpu();
        }
        self.system.cpus().len()
    }

    pub fn memory(&mut self) -> MemoryUsage {
        if self.first_this_tick(Resource::Memory) {
            self.system.refresh_memory();
        }
        MemoryUsage {
            total: self.system.total_memory(),
            used: self.system.used_memory(),
            available: self.system.available_memory(),
            swap_total: self.system.total_swap(),
            swap_used: self.system.used_swap(),
        }
    }

    pub fn process_count(&mut self) -> usize {
        if self.first_this_tick(Resource::Processes) {
            self.system.refresh_processes();
        }
        self.system.processes().len()
    }

    pub fn disks(&mut self) -> Vec<DiskUsage> {
        if self.first_this_tick(Resource::Disks) {
            self.disks.refresh_list();
        }
        self.disks
            .list()
            .iter()
            .map(|d| DiskUsage {
                mount_point: d.mount_point().to_string_lossy().to_string(),
                total: d.total_space(),
                available: d.available_space(),
            })
            .collect()
    }

    /// Received / transmitted byte totals per interface.
    pub fn network_counters(&mut self) -> Vec<ByteCounters> {
        if self.first_this_tick(Resource::Networks) {
            self.networks.refresh_list();
            self.networks.refresh();
        }
        let mut out: Vec<ByteCounters> = self
            .networks
            .list()
            .iter()
            .map(|(name, data)| ByteCounters {
                name: name.clone(),
                first: data.total_received(),
                second: data.total_transmitted(),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Read / written byte totals per block device.
    pub fn disk_io_counters(&mut self) -> Vec<ByteCounters> {
        if self.first_this_tick(Resource::DiskIo) {
            self.diskio = read_diskstats();
        }
        self.diskio.clone()
    }

    /// Per-second rates of `counters` since the previous call with `key`.
    ///
    /// The first call only records a baseline. A counter that went
    /// backwards (device reset, wraparound) also re-seeds.
    pub fn rate(&mut self, key: &str, counters: &[u64]) -> Option<Vec<f64>> {
        let now = self.tick_at;
        let current = CounterSample {
            taken: now,
            values: counters.to_vec(),
        };
        let previous = self.previous.insert(key.to_string(), current)?;

        let elapsed = now.saturating_duration_since(previous.taken).as_secs_f64();
        if elapsed <= 0.0 || previous.values.len() != counters.len() {
            return None;
        }
        counters
            .iter()
            .zip(&previous.values)
            .map(|(now, before)| now.checked_sub(*before).map(|d| d as f64 / elapsed))
            .collect()
    }
}

#[cfg(target_os = "linux")]
fn read_diskstats() -> Vec<ByteCounters> {
    match std::fs::read_to_string("/proc/diskstats") {
        Ok(text) => parse_diskstats(&text),
        Err(e) => {
            tracing::debug!(error = %e, "Cannot read /proc/diskstats");
            Vec::new()
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_diskstats() -> Vec<ByteCounters> {
    Vec::new()
}

const SECTOR_BYTES: u64 = 512;

/// Whole-disk devices from `/proc/diskstats`, with sector counts turned into
/// bytes. Partitions, loop and ram devices are skipped.
pub fn parse_diskstats(text: &str) -> Vec<ByteCounters> {
    let mut out = Vec::new();
    for line in text.lines() {
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() < 10 {
            continue;
        }
        let name = cols[2];
        if name.starts_with("loop") || name.starts_with("ram") || is_partition(name) {
            continue;
        }
        let (Ok(read), Ok(written)) = (cols[5].parse::<u64>(), cols[9].parse::<u64>()) else {
            continue;
        };
        out.push(ByteCounters {
            name: name.to_string(),
            first: read * SECTOR_BYTES,
            second: written * SECTOR_BYTES,
        });
    }
    out
}

fn is_partition(name: &str) -> bool {
    // nvme0n1p1, mmcblk0p2
    if name.starts_with("nvme") || name.starts_with("mmcblk") {
        return name
            .rsplit_once('p')
            .is_some_and(|(head, tail)| {
                !tail.is_empty()
                    && tail.chars().all(|c| c.is_ascii_digit())
                    && head.chars().last().is_some_and(|c| c.is_ascii_digit())
            });
    }
    // sda1, vdb2, xvda1
    (name.starts_with("sd") || name.starts_with("vd") || name.starts_with("xvd") || name.starts_with("hd"))
        && name.chars().last().is_some_and(|c| c.is_ascii_digit())
}
