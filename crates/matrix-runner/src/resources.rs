//! Resource monitor
//!
//! Samples memory, disk and CPU utilization on a fixed interval:
//! - Threshold checks raise one alert per crossed resource per tick
//! - Min/max/sum/count are accumulated for the execution summary
//! - `start` / `stop` are idempotent; samples landing after `stop` are dropped

use crate::error::ResourceError;
use crate::observer::ExecutionObserver;
use chrono::{DateTime, Utc};
use matrix_core::{ResourceStat, ResourceStatistics};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Point-in-time utilization
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Sample time
    pub timestamp: DateTime<Utc>,
    /// Memory in use (bytes)
    pub memory_used_bytes: u64,
    /// Installed memory (bytes)
    pub memory_total_bytes: u64,
    /// Disk space in use across mounted disks (bytes)
    pub disk_used_bytes: u64,
    /// Disk capacity across mounted disks (bytes)
    pub disk_total_bytes: u64,
    /// Global CPU utilization (percent)
    pub cpu_percent: f64,
}

impl ResourceSnapshot {
    /// Memory utilization (percent)
    #[must_use]
    pub fn memory_percent(&self) -> f64 {
        percent(self.memory_used_bytes, self.memory_total_bytes)
    }

    /// Disk utilization (percent)
    #[must_use]
    pub fn disk_percent(&self) -> f64 {
        percent(self.disk_used_bytes, self.disk_total_bytes)
    }

    /// Utilization of one resource (percent)
    #[must_use]
    pub fn percent_of(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Memory => self.memory_percent(),
            ResourceKind::Disk => self.disk_percent(),
            ResourceKind::Cpu => self.cpu_percent,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Reads system utilization
#[cfg_attr(test, mockall::automock)]
pub trait ResourceProbe: Send + Sync {
    /// Take one sample
    ///
    /// # Errors
    /// Counters could not be read.
    fn sample(&self) -> Result<ResourceSnapshot, ResourceError>;
}

/// Probe backed by `sysinfo`
pub struct SystemProbe {
    system: Mutex<System>,
}

impl std::fmt::Debug for SystemProbe {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemProbe").finish_non_exhaustive()
    }
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProbe {
    /// Create probe
    #[must_use]
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_disks_list();
        Self {
            system: Mutex::new(system),
        }
    }
}

impl ResourceProbe for SystemProbe {
    fn sample(&self) -> Result<ResourceSnapshot, ResourceError> {
        let mut system = self.system.lock();
        system.refresh_memory();
        system.refresh_cpu();
        system.refresh_disks();

        let (disk_total, disk_available) = system
            .disks()
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });

        Ok(ResourceSnapshot {
            timestamp: Utc::now(),
            memory_used_bytes: system.used_memory(),
            memory_total_bytes: system.total_memory(),
            disk_used_bytes: disk_total.saturating_sub(disk_available),
            disk_total_bytes: disk_total,
            cpu_percent: f64::from(system.global_cpu_info().cpu_usage()),
        })
    }
}

/// Monitored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Memory,
    Disk,
    Cpu,
}

impl ResourceKind {
    /// All monitored resources
    pub const ALL: [Self; 3] = [Self::Memory, Self::Disk, Self::Cpu];
}

impl Display for ResourceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Memory => "memory",
            Self::Disk => "disk",
            Self::Cpu => "cpu",
        })
    }
}

/// Alert level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

/// Utilization thresholds (percent)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceThresholds {
    /// Memory warning level
    pub memory_warning: f64,
    /// Memory critical level
    pub memory_critical: f64,
    /// Disk warning level
    pub disk_warning: f64,
    /// Disk critical level
    pub disk_critical: f64,
    /// CPU warning level
    pub cpu_warning: f64,
    /// CPU critical level
    pub cpu_critical: f64,
}

impl Default for ResourceThresholds {
    fn default() -> Self {
        Self {
            memory_warning: 75.0,
            memory_critical: 90.0,
            disk_warning: 80.0,
            disk_critical: 95.0,
            cpu_warning: 80.0,
            cpu_critical: 95.0,
        }
    }
}

impl ResourceThresholds {
    /// Warning and critical thresholds for one resource
    #[must_use]
    pub fn for_kind(&self, kind: ResourceKind) -> (f64, f64) {
        match kind {
            ResourceKind::Memory => (self.memory_warning, self.memory_critical),
            ResourceKind::Disk => (self.disk_warning, self.disk_critical),
            ResourceKind::Cpu => (self.cpu_warning, self.cpu_critical),
        }
    }

    /// Alerts raised by `snapshot`
    ///
    /// At most one alert per resource, at the most severe crossed level.
    #[must_use]
    pub fn check(&self, snapshot: &ResourceSnapshot) -> Vec<ResourceAlert> {
        ResourceKind::ALL
            .into_iter()
            .filter_map(|kind| {
                let value = snapshot.percent_of(kind);
                let (warning, critical) = self.for_kind(kind);
                let (severity, threshold) = if value >= critical {
                    (AlertSeverity::Critical, critical)
                } else if value >= warning {
                    (AlertSeverity::Warning, warning)
                } else {
                    return None;
                };
                Some(ResourceAlert {
                    kind,
                    severity,
                    value_percent: value,
                    threshold_percent: threshold,
                    timestamp: snapshot.timestamp,
                })
            })
            .collect()
    }
}

/// Threshold crossing on one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAlert {
    /// Resource that crossed
    pub kind: ResourceKind,
    /// Most severe level crossed
    pub severity: AlertSeverity,
    /// Observed utilization
    pub value_percent: f64,
    /// Level that was crossed
    pub threshold_percent: f64,
    /// Sample time
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    min: f64,
    max: f64,
    sum: f64,
    count: u64,
}

impl Accumulator {
    fn record(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.sum += value;
        self.count += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn stat(&self) -> ResourceStat {
        if self.count == 0 {
            return ResourceStat::default();
        }
        ResourceStat {
            min: self.min,
            max: self.max,
            average: self.sum / self.count as f64,
        }
    }
}

#[derive(Debug, Default)]
struct Accumulators {
    memory: Accumulator,
    disk: Accumulator,
    cpu: Accumulator,
    samples: u64,
}

struct MonitorState {
    probe: Arc<dyn ResourceProbe>,
    thresholds: ResourceThresholds,
    observer: Arc<dyn ExecutionObserver>,
    running: AtomicBool,
    stats: Mutex<Accumulators>,
}

impl MonitorState {
    fn tick(&self, snapshot: &ResourceSnapshot) {
        {
            let mut stats = self.stats.lock();
            // Checked under the lock so a concurrent stop() wins.
            if !self.running.load(Ordering::SeqCst) {
                return;
            }
            stats.memory.record(snapshot.memory_percent());
            stats.disk.record(snapshot.disk_percent());
            stats.cpu.record(snapshot.cpu_percent);
            stats.samples += 1;
        }

        for alert in self.thresholds.check(snapshot) {
            self.observer.on_resource_warning(&alert);
        }
        self.observer.on_resource_update(snapshot);
    }
}

/// Background sampler
pub struct ResourceMonitor {
    state: Arc<MonitorState>,
    interval: Duration,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ResourceMonitor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceMonitor")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ResourceMonitor {
    /// Create a stopped monitor
    #[must_use]
    pub fn new(
        probe: Arc<dyn ResourceProbe>,
        thresholds: ResourceThresholds,
        interval: Duration,
        observer: Arc<dyn ExecutionObserver>,
    ) -> Self {
        Self {
            state: Arc::new(MonitorState {
                probe,
                thresholds,
                observer,
                running: AtomicBool::new(false),
                stats: Mutex::new(Accumulators::default()),
            }),
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Whether the sampler is active
    #[inline]
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    /// Start sampling; no-op if already running
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let state = Arc::clone(&self.state);
        let period = self.interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !state.running.load(Ordering::SeqCst) {
                    break;
                }
                let probe = Arc::clone(&state.probe);
                match tokio::task::spawn_blocking(move || probe.sample()).await {
                    Ok(Ok(snapshot)) => state.tick(&snapshot),
                    Ok(Err(e)) => warn!(error = %e, "resource sample failed"),
                    Err(e) => warn!(error = %e, "resource sampler task failed"),
                }
            }
        });
        *self.handle.lock() = Some(handle);
        debug!(interval_ms = self.interval.as_millis(), "resource monitor started");
    }

    /// Stop sampling; no-op if not running
    pub fn stop(&self) {
        {
            let _stats = self.state.stats.lock();
            if !self.state.running.swap(false, Ordering::SeqCst) {
                return;
            }
        }
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
        debug!("resource monitor stopped");
    }

    /// Take a sample outside the schedule, without recording it
    ///
    /// Used for per-run deltas; failures yield `None`.
    pub async fn snapshot(&self) -> Option<ResourceSnapshot> {
        let probe = Arc::clone(&self.state.probe);
        match tokio::task::spawn_blocking(move || probe.sample()).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                debug!(error = %e, "resource snapshot unavailable");
                None
            }
            Err(_) => None,
        }
    }

    /// Statistics over every recorded sample
    #[must_use]
    pub fn get_statistics(&self) -> ResourceStatistics {
        let stats = self.state.stats.lock();
        ResourceStatistics {
            memory: stats.memory.stat(),
            disk: stats.disk.stat(),
            cpu: stats.cpu.stat(),
            samples: stats.samples,
        }
    }
}

impl Drop for ResourceMonitor {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;
    use std::sync::atomic::AtomicUsize;

    fn snapshot(memory: f64, disk: f64, cpu: f64) -> ResourceSnapshot {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        ResourceSnapshot {
            timestamp: Utc::now(),
            memory_used_bytes: (memory * 10.0) as u64,
            memory_total_bytes: 1000,
            disk_used_bytes: (disk * 10.0) as u64,
            disk_total_bytes: 1000,
            cpu_percent: cpu,
        }
    }

    #[derive(Default)]
    struct CountingObserver {
        alerts: AtomicUsize,
        updates: AtomicUsize,
    }

    impl ExecutionObserver for CountingObserver {
        fn on_resource_warning(&self, _alert: &ResourceAlert) {
            self.alerts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_resource_update(&self, _snapshot: &ResourceSnapshot) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn thresholds_pick_most_severe_level() {
        let alerts = ResourceThresholds::default().check(&snapshot(80.0, 96.0, 10.0));
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].kind, ResourceKind::Memory);
        assert_eq!(alerts[0].severity, AlertSeverity::Warning);
        assert_eq!(alerts[1].kind, ResourceKind::Disk);
        assert_eq!(alerts[1].severity, AlertSeverity::Critical);

        assert!(ResourceThresholds::default()
            .check(&snapshot(10.0, 10.0, 10.0))
            .is_empty());
    }

    #[test]
    fn accumulator_tracks_min_max_average() {
        let mut acc = Accumulator::default();
        for v in [30.0, 10.0, 20.0] {
            acc.record(v);
        }
        let stat = acc.stat();
        assert_eq!((stat.min, stat.max, stat.average), (10.0, 30.0, 20.0));
    }

    #[tokio::test]
    async fn monitor_samples_and_alerts_every_tick() {
        let mut probe = MockResourceProbe::new();
        probe
            .expect_sample()
            .returning(|| Ok(snapshot(92.0, 50.0, 40.0)));
        let observer = Arc::new(CountingObserver::default());

        let monitor = ResourceMonitor::new(
            Arc::new(probe),
            ResourceThresholds::default(),
            Duration::from_millis(20),
            observer.clone(),
        );
        monitor.start();
        monitor.start();
        tokio::time::sleep(Duration::from_millis(150)).await;
        monitor.stop();
        monitor.stop();

        let stats = monitor.get_statistics();
        assert!(stats.samples >= 1);
        assert_eq!(observer.alerts.load(Ordering::SeqCst), stats.samples as usize);
        assert_eq!(observer.updates.load(Ordering::SeqCst), stats.samples as usize);
        assert!((stats.memory.max - 92.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn samples_after_stop_are_discarded() {
        let mut probe = MockResourceProbe::new();
        probe.expect_sample().returning(|| Ok(snapshot(1.0, 1.0, 1.0)));
        let monitor = ResourceMonitor::new(
            Arc::new(probe),
            ResourceThresholds::default(),
            Duration::from_secs(60),
            Arc::new(NoopObserver),
        );

        monitor.state.running.store(false, Ordering::SeqCst);
        monitor.state.tick(&snapshot(50.0, 50.0, 50.0));
        assert_eq!(monitor.get_statistics().samples, 0);
    }

    #[tokio::test]
    async fn snapshot_failure_is_none() {
        let mut probe = MockResourceProbe::new();
        probe
            .expect_sample()
            .returning(|| Err(ResourceError::ProbeFailed("no counters".into())));
        let monitor = ResourceMonitor::new(
            Arc::new(probe),
            ResourceThresholds::default(),
            Duration::from_secs(5),
            Arc::new(NoopObserver),
        );
        assert!(monitor.snapshot().await.is_none());
    }

    proptest::proptest! {
        #[test]
        fn alerts_track_the_most_severe_level(
            memory in 0.0f64..100.0,
            disk in 0.0f64..100.0,
            cpu in 0.0f64..100.0,
        ) {
            let thresholds = ResourceThresholds::default();
            let snap = snapshot(memory, disk, cpu);
            let alerts = thresholds.check(&snap);
            proptest::prop_assert!(alerts.len() <= ResourceKind::ALL.len());

            for kind in ResourceKind::ALL {
                let (warning, critical) = thresholds.for_kind(kind);
                let value = snap.percent_of(kind);
                let raised: Vec<_> = alerts.iter().filter(|a| a.kind == kind).collect();
                let expected = if value >= critical {
                    Some(AlertSeverity::Critical)
                } else if value >= warning {
                    Some(AlertSeverity::Warning)
                } else {
                    None
                };
                proptest::prop_assert_eq!(raised.first().map(|a| a.severity), expected);
                proptest::prop_assert!(raised.len() <= 1);
            }
        }
    }
}
