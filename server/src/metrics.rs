// Metrics collection and tracking

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use highlight_core::SchedulerStatsSnapshot;

static START_TIME: OnceLock<Instant> = OnceLock::new();

/// Record process start for uptime calculation. Idempotent.
pub fn init_start_time() {
    let _ = START_TIME.get_or_init(Instant::now);
}

pub fn uptime_seconds() -> u64 {
    START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub scheduler: SchedulerStatsSnapshot,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub system_load: Option<f64>,
}

pub fn collect_system(request_count: u64) -> SystemMetrics {
    let mut system = sysinfo::System::new();
    system.refresh_cpu();
    system.refresh_memory();

    // Get CPU usage (average across all cores)
    let cpu_usage = system.global_cpu_info().cpu_usage();

    // Get memory information
    let memory_used = system.used_memory();
    let memory_total = system.total_memory();
    let memory_usage_percent = if memory_total > 0 {
        (memory_used as f64 / memory_total as f64 * 100.0) as f32
    } else {
        0.0
    };

    // Get system load (Unix-like systems only)
    let system_load = {
        #[cfg(unix)]
        {
            use std::fs;
            if let Ok(loadavg) = fs::read_to_string("/proc/loadavg") {
                loadavg.split_whitespace().next()
                    .and_then(|s| s.parse::<f64>().ok())
            } else {
                None
            }
        }
        #[cfg(not(unix))]
        None
    };

    SystemMetrics {
        cpu_usage_percent: cpu_usage,
        memory_used_mb: memory_used / 1024 / 1024, // Convert bytes to MB
        memory_total_mb: memory_total / 1024 / 1024,
        memory_usage_percent,
        request_count,
        uptime_seconds: uptime_seconds(),
        system_load,
    }
}
