//! `SystemStatus`: named counters and timers, side-effect-free to the rest
//! of the system (spec §2.2, §6 "Metrics"). Exposition format is out of
//! scope; this module only maintains the in-process state a real exporter
//! would read from.

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use prometheus::{HistogramVec, IntCounterVec, Opts, Registry};
use tracing::trace;

/// The four terminal outcomes a processor may mark (spec §4.4, §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Success,
    Failure,
    NoData,
    AuthenticationFailure,
}

impl MeterKind {
    fn label(self) -> &'static str {
        match self {
            MeterKind::Success => "success",
            MeterKind::Failure => "failure",
            MeterKind::NoData => "no_data",
            MeterKind::AuthenticationFailure => "authentication_failure",
        }
    }
}

/// A running timer handle returned by [`SystemStatus::timer`]. Records its
/// elapsed duration into the named histogram when [`TimerGuard::stop`] is
/// called, or on drop if never stopped explicitly.
pub struct TimerGuard {
    histogram: prometheus::Histogram,
    started: Instant,
    stopped: bool,
}

impl TimerGuard {
    pub fn stop(mut self) {
        self.record();
        self.stopped = true;
    }

    fn record(&mut self) {
        if !self.stopped {
            let elapsed = self.started.elapsed().as_secs_f64();
            self.histogram.observe(elapsed);
            self.stopped = true;
        }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.record();
    }
}

/// Named counters and timers backed by a `prometheus::Registry`. Safe for
/// concurrent use from many pipeline runs at once; metrics for a given
/// name are registered lazily on first use (compute-if-absent).
#[derive(Clone)]
pub struct SystemStatus {
    registry: Arc<Registry>,
    counters: Arc<DashMap<String, IntCounterVec>>,
    timers: Arc<DashMap<(String, String), prometheus::Histogram>>,
}

impl SystemStatus {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            counters: Arc::new(DashMap::new()),
            timers: Arc::new(DashMap::new()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Mark a terminal outcome under `name`.
    pub fn meter(&self, name: &str, kind: MeterKind) {
        let counter = self
            .counters
            .entry(name.to_string())
            .or_insert_with(|| {
                let opts = Opts::new(
                    format!("{name}_total").replace(['.', '-'], "_"),
                    format!("terminal outcomes for {name}"),
                );
                let vec = IntCounterVec::new(opts, &["outcome"])
                    .expect("static metric name/labels are always valid");
                let _ = self.registry.register(Box::new(vec.clone()));
                vec
            })
            .clone();
        trace!(meter = name, outcome = kind.label(), "meter");
        counter.with_label_values(&[kind.label()]).inc();
    }

    /// Start a named timer around operation `op`. The caller should hold
    /// the guard for the duration of the timed work and call `.stop()`
    /// (or simply let it drop) when done.
    pub fn timer(&self, name: &str, op: &str) -> TimerGuard {
        let key = (name.to_string(), op.to_string());
        let histogram = self
            .timers
            .entry(key)
            .or_insert_with(|| {
                let opts = prometheus::HistogramOpts::new(
                    format!("{name}_{op}_seconds").replace(['.', '-'], "_"),
                    format!("duration of {op} for {name}"),
                );
                let vec = HistogramVec::new(opts, &[])
                    .expect("static metric name is always valid");
                let histogram = vec.with_label_values(&[]);
                let _ = self.registry.register(Box::new(vec));
                histogram
            })
            .clone();
        TimerGuard {
            histogram,
            started: Instant::now(),
            stopped: false,
        }
    }
}

impl Default for SystemStatus {
    fn default() -> Self {
        Self::new()
    }
}
