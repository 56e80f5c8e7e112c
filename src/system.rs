//! Host CPU and memory sampling.

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};

/// Host usage at one point in time, both in percent.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct SystemUsage {
    /// 1-minute load average over logical cores. May exceed 100.
    pub cpu: f64,
    /// Used physical memory.
    pub memory: f64,
}

/// Reads host usage with [`sysinfo`].
pub struct SystemSampler {
    system: System,
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSampler {
    /// Create a new [`SystemSampler`].
    /// The CPU list is read once; core count does not change at runtime.
    pub fn new() -> Self {
        let system = System::new_with_specifics(
            RefreshKind::nothing()
                .with_cpu(CpuRefreshKind::nothing())
                .with_memory(MemoryRefreshKind::nothing().with_ram()),
        );

        Self { system }
    }

    /// Take a fresh reading.
    pub fn sample(&mut self) -> SystemUsage {
        self.system
            .refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());

        SystemUsage {
            cpu: cpu_percentage(System::load_average().one, self.system.cpus().len()),
            memory: memory_percentage(
                self.system.total_memory(),
                self.system.free_memory(),
            ),
        }
    }
}

/// Load average relative to `cores`, not clamped.
pub fn cpu_percentage(load: f64, cores: usize) -> f64 {
    if cores == 0 {
        return 0.0;
    }

    load / cores as f64 * 100.0
}

/// Share of `total` memory not free.
pub fn memory_percentage(total: u64, free: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    total.saturating_sub(free) as f64 / total as f64 * 100.0
}
