use std::fmt;
use std::time::Duration;
#[cfg(feature = "cli")]
use std::sync::Mutex;
#[cfg(feature = "cli")]
use std::time::Instant;
#[cfg(feature = "cli")]
use sysinfo::{Pid, ProcessesToUpdate, System};

/// Stage of an analysis run a resource snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extract,
    Analyse,
    Write,
}

impl Phase {
    /// What the item count of a snapshot in this phase counts.
    pub fn items(&self) -> &'static str {
        match self {
            Phase::Extract => "datasets",
            Phase::Analyse => "fits",
            Phase::Write => "tables",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Extract => "extract",
            Phase::Analyse => "analyse",
            Phase::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PhaseSnapshot {
    pub phase: Phase,
    pub items: usize,
    pub cpu_usage: f32,
    pub memory_mb: u64,
    /// Time since the previous snapshot.
    pub duration: Duration,
}

pub fn slowest_phase(snapshots: &[PhaseSnapshot]) -> Option<&PhaseSnapshot> {
    snapshots.iter().max_by_key(|s| s.duration)
}

pub fn peak_memory_mb(snapshots: &[PhaseSnapshot]) -> u64 {
    snapshots.iter().map(|s| s.memory_mb).max().unwrap_or(0)
}

/// Samples CPU and memory of this process at the end of every phase.
#[cfg(feature = "cli")]
pub struct SystemMonitor {
    system: Mutex<System>,
    pid: Option<Pid>,
    start_time: Instant,
    last_mark: Mutex<Instant>,
    snapshots: Mutex<Vec<PhaseSnapshot>>,
    enabled: bool,
}

#[cfg(feature = "cli")]
impl SystemMonitor {
    pub fn new(enabled: bool) -> Self {
        let mut system = System::new();
        let pid = sysinfo::get_current_pid().ok();
        if enabled {
            system.refresh_memory();
            system.refresh_processes(ProcessesToUpdate::All, true);
        }
        let now = Instant::now();

        Self {
            system: Mutex::new(system),
            pid,
            start_time: now,
            last_mark: Mutex::new(now),
            snapshots: Mutex::new(Vec::new()),
            enabled,
        }
    }

    /// Starts timing the first phase.
    pub fn begin(&self) {
        if let Ok(mut last) = self.last_mark.lock() {
            *last = Instant::now();
        }
    }

    fn sample(&self) -> Option<(f32, u64)> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        let process = system.process(pid)?;
        Some((process.cpu_usage(), process.memory() / 1024 / 1024))
    }

    /// Records the end of `phase`, which handled `items` of [`Phase::items`].
    pub fn record(&self, phase: Phase, items: usize) -> Option<PhaseSnapshot> {
        if !self.enabled {
            return None;
        }
        let (cpu_usage, memory_mb) = self.sample()?;
        let duration = {
            let mut last = self.last_mark.lock().ok()?;
            let now = Instant::now();
            let duration = now.duration_since(*last);
            *last = now;
            duration
        };

        let snapshot = PhaseSnapshot {
            phase,
            items,
            cpu_usage,
            memory_mb,
            duration,
        };
        tracing::info!(
            phase = %phase,
            items,
            cpu = cpu_usage,
            memory_mb,
            "{}: {} {} in {:?}, CPU {:.1}%, memory {}MB",
            phase,
            items,
            phase.items(),
            duration,
            cpu_usage,
            memory_mb
        );
        self.snapshots.lock().ok()?.push(snapshot.clone());
        Some(snapshot)
    }

    pub fn snapshots(&self) -> Vec<PhaseSnapshot> {
        self.snapshots
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn log_summary(&self) {
        if !self.enabled {
            return;
        }
        let snapshots = self.snapshots();
        let total = self.start_time.elapsed();
        match slowest_phase(&snapshots) {
            Some(slowest) => tracing::info!(
                "Run took {:?}, peak memory {}MB, slowest phase {} ({:?})",
                total,
                peak_memory_mb(&snapshots),
                slowest.phase,
                slowest.duration
            ),
            None => tracing::info!("Run took {:?}", total),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(feature = "cli")]
impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new(false)
    }
}

// No-op monitor for builds without the `cli` feature.
#[cfg(not(feature = "cli"))]
#[derive(Default)]
pub struct SystemMonitor;

#[cfg(not(feature = "cli"))]
impl SystemMonitor {
    pub fn new(_enabled: bool) -> Self {
        Self
    }

    pub fn begin(&self) {}

    pub fn record(&self, _phase: Phase, _items: usize) -> Option<PhaseSnapshot> {
        None
    }

    pub fn snapshots(&self) -> Vec<PhaseSnapshot> {
        Vec::new()
    }

    pub fn log_summary(&self) {}

    pub fn is_enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(phase: Phase, millis: u64, memory_mb: u64) -> PhaseSnapshot {
        PhaseSnapshot {
            phase,
            items: 1,
            cpu_usage: 0.0,
            memory_mb,
            duration: Duration::from_millis(millis),
        }
    }

    #[test]
    fn test_slowest_phase_and_peak_memory() {
        let snapshots = vec![
            snapshot(Phase::Extract, 40, 30),
            snapshot(Phase::Analyse, 250, 55),
            snapshot(Phase::Write, 5, 20),
        ];
        let slowest = slowest_phase(&snapshots).unwrap();
        assert_eq!(slowest.phase, Phase::Analyse);
        assert_eq!(peak_memory_mb(&snapshots), 55);

        assert!(slowest_phase(&[]).is_none());
        assert_eq!(peak_memory_mb(&[]), 0);
    }

    #[test]
    fn test_phase_labels() {
        assert_eq!(Phase::Analyse.to_string(), "analyse");
        assert_eq!(Phase::Analyse.items(), "fits");
        assert_eq!(Phase::Extract.items(), "datasets");
    }

    #[test]
    fn test_disabled_monitor_records_nothing() {
        let monitor = SystemMonitor::new(false);
        assert!(!monitor.is_enabled());
        assert!(monitor.record(Phase::Extract, 3).is_none());
        assert!(monitor.snapshots().is_empty());
    }

    #[cfg(feature = "cli")]
    #[test]
    fn test_enabled_monitor_keeps_phase_order() {
        let monitor = SystemMonitor::new(true);
        monitor.begin();
        if monitor.record(Phase::Extract, 2).is_none() {
            // Process information is unavailable in this environment.
            return;
        }
        monitor.record(Phase::Analyse, 1);
        monitor.record(Phase::Write, 3);
        let phases: Vec<Phase> = monitor.snapshots().iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![Phase::Extract, Phase::Analyse, Phase::Write]);
        assert_eq!(monitor.snapshots()[2].items, 3);
    }
}
