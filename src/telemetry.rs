//! OS telemetry snapshots for the monitoring built-ins.

/// Whether this build can read OS telemetry.
pub const AVAILABLE: bool = cfg!(feature = "telemetry");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snapshot {
    Cpu,
    Memory,
    Processes,
    Disk,
    Network,
    SystemInfo,
    Uptime,
}

#[cfg(feature = "telemetry")]
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;
#[cfg(feature = "telemetry")]
const MIB: f64 = 1024.0 * 1024.0;

#[cfg(feature = "telemetry")]
/// Rows shown by the process listing.
const PROCESS_LIMIT: usize = 20;

#[cfg(feature = "telemetry")]
pub fn snapshot(kind: Snapshot) -> String {
    match kind {
        Snapshot::Cpu => cpu(),
        Snapshot::Memory => mem(),
        Snapshot::Processes => ps(),
        Snapshot::Disk => disk(),
        Snapshot::Network => network(),
        Snapshot::SystemInfo => system_info(),
        Snapshot::Uptime => uptime(),
    }
}

#[cfg(not(feature = "telemetry"))]
pub fn snapshot(_kind: Snapshot) -> String {
    "System monitoring not available (built without the telemetry feature)".to_string()
}

#[cfg(feature = "telemetry")]
pub fn cpu() -> String {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu();
    // Usage is a delta between two refreshes.
    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    let usage = sys.global_cpu_info().cpu_usage();
    let cores = sys.cpus().len();
    let freq = sys.cpus().first().map(|c| c.frequency()).unwrap_or(0);
    format!("CPU Usage: {usage:.1}%\nCores: {cores}\nFrequency: {freq}MHz")
}

#[cfg(feature = "telemetry")]
pub fn mem() -> String {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    let total = sys.total_memory();
    let used = sys.used_memory();
    let percent = if total > 0 {
        used as f64 / total as f64 * 100.0
    } else {
        0.0
    };
    format!(
        "Memory: {percent:.1}% used\nUsed: {:.1}GB\nTotal: {:.1}GB\nAvailable: {:.1}GB",
        used as f64 / GIB,
        total as f64 / GIB,
        sys.available_memory() as f64 / GIB,
    )
}

#[cfg(feature = "telemetry")]
pub fn ps() -> String {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    sys.refresh_processes();
    let total = sys.total_memory().max(1) as f64;

    let mut procs: Vec<_> = sys.processes().iter().collect();
    procs.sort_by_key(|(pid, _)| **pid);
    procs
        .into_iter()
        .take(PROCESS_LIMIT)
        .map(|(pid, p)| {
            format!(
                "{pid}: {} (CPU: {:.1}%, MEM: {:.1}%)",
                p.name(),
                p.cpu_usage(),
                p.memory() as f64 / total * 100.0
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(feature = "telemetry")]
pub fn disk() -> String {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let lines: Vec<String> = disks
        .list()
        .iter()
        .map(|d| {
            let total = d.total_space();
            let free = d.available_space();
            let used = total.saturating_sub(free);
            let percent = if total > 0 {
                used as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            format!(
                "Disk {}: {percent:.1}% used\nUsed: {:.1}GB\nTotal: {:.1}GB\nFree: {:.1}GB",
                d.mount_point().display(),
                used as f64 / GIB,
                total as f64 / GIB,
                free as f64 / GIB,
            )
        })
        .collect();
    if lines.is_empty() {
        "No disks found".to_string()
    } else {
        lines.join("\n\n")
    }
}

#[cfg(feature = "telemetry")]
pub fn network() -> String {
    let networks = sysinfo::Networks::new_with_refreshed_list();
    let (sent, received) = networks
        .iter()
        .fold((0u64, 0u64), |(s, r), (_, data)| {
            (s + data.total_transmitted(), r + data.total_received())
        });
    format!(
        "Network:\nSent: {:.1}MB\nReceived: {:.1}MB",
        sent as f64 / MIB,
        received as f64 / MIB
    )
}

#[cfg(feature = "telemetry")]
pub fn system_info() -> String {
    use sysinfo::System;

    let unknown = || "unknown".to_string();
    format!(
        "OS: {} {}\nKernel: {}\nHostname: {}\nArch: {}",
        System::name().unwrap_or_else(unknown),
        System::os_version().unwrap_or_else(unknown),
        System::kernel_version().unwrap_or_else(unknown),
        System::host_name().unwrap_or_else(unknown),
        std::env::consts::ARCH,
    )
}

#[cfg(feature = "telemetry")]
pub fn uptime() -> String {
    format_uptime(sysinfo::System::uptime())
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("Uptime: {days}d {hours}h {minutes}m")
}
