//! Background scheduler that keeps a probe result per service up to date.
//!
//! On every tick of a fixed interval the `ProbeScheduler` probes all configured services
//! concurrently. For each service the ping and DB probes run concurrently with each other, and the
//! service's record is published as soon as both resolve, independently of the other services.
//! A manual [`ProbeScheduler::refresh_all`] runs the same cycle on demand without touching the
//! interval.
//!
//! Every cycle takes a number from a shared counter when it is issued. A finished record replaces
//! the stored one only if its cycle is not older, so a slow earlier cycle can never overwrite the
//! result of a later one.

use dashmap::{DashMap, mapref::entry::Entry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::executor::ProbeExecutor;
use super::models::{ProbeOutcome, ProbeResult, ProbeTarget};
use crate::outbound::CallError;

/// Owner of the service → [`ProbeResult`] mapping. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ProbeScheduler {
    executor: ProbeExecutor,
    targets: Arc<Vec<ProbeTarget>>,
    interval: Duration,
    results: Arc<DashMap<String, ProbeResult>>,
    cycles: Arc<AtomicU64>,
    revision: Arc<watch::Sender<u64>>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    ticker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ProbeScheduler {
    pub fn new(executor: ProbeExecutor, targets: Vec<ProbeTarget>, interval: Duration, shutdown: CancellationToken) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            executor,
            targets: Arc::new(targets),
            interval,
            results: Arc::new(DashMap::new()),
            cycles: Arc::new(AtomicU64::new(0)),
            revision: Arc::new(revision),
            shutdown,
            tasks: TaskTracker::new(),
            ticker: Arc::new(Mutex::new(None)),
        }
    }

    pub fn targets(&self) -> &[ProbeTarget] {
        &self.targets
    }

    /// Receiver that changes every time a result is published.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Copy of all published results.
    pub fn results(&self) -> HashMap<String, ProbeResult> {
        self.results.iter().map(|entry| (entry.key().clone(), entry.value().clone())).collect()
    }

    pub fn result(&self, service: &str) -> Option<ProbeResult> {
        self.results.get(service).map(|entry| entry.value().clone())
    }

    /// Start the interval task. The first cycle runs immediately. Calling it again is a no-op.
    pub fn start(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if ticker.is_some() {
            return;
        }

        let scheduler = self.clone();
        *ticker = Some(tokio::spawn(async move {
            info!(
                "Starting probe scheduler for {} services (every {:?})",
                scheduler.targets.len(),
                scheduler.interval
            );
            let mut interval = tokio::time::interval(scheduler.interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = scheduler.shutdown.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.run_cycle().await;
                    }
                }
            }

            info!("Probe scheduler has stopped");
        }));
    }

    /// Cancel the interval task and every in-flight probe, then wait for them to finish.
    pub async fn stop(&self) {
        self.shutdown.cancel();

        let handle = self.ticker.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!("Probe scheduler task ended abnormally: {}", e);
        }

        self.tasks.close();
        self.tasks.wait().await;
    }

    /// Run a probe cycle in the background, outside the interval. Returns the cycle number.
    pub fn refresh_all(&self) -> u64 {
        let cycle = self.next_cycle();
        let scheduler = self.clone();
        self.tasks.spawn(async move { scheduler.run_numbered_cycle(cycle).await });
        cycle
    }

    /// Run one full probe cycle and wait for every service to finish.
    pub async fn run_cycle(&self) -> u64 {
        let cycle = self.next_cycle();
        self.run_numbered_cycle(cycle).await;
        cycle
    }

    fn next_cycle(&self) -> u64 {
        self.cycles.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn run_numbered_cycle(&self, cycle: u64) {
        debug!("Running probe cycle {}", cycle);
        futures::future::join_all(self.targets.iter().map(|target| self.probe_service(target, cycle))).await;
    }

    async fn probe_service(&self, target: &ProbeTarget, cycle: u64) {
        let (ping, db) = tokio::join!(
            self.executor.ping(target, &self.shutdown),
            self.executor.db_health(target, &self.shutdown)
        );

        if matches!(ping, Err(CallError::Cancelled)) || matches!(db, Err(CallError::Cancelled)) {
            debug!("Probe cycle {} for {} cancelled", cycle, target.name);
            return;
        }

        let ping = ProbeOutcome::from_call(ping);
        let db = ProbeOutcome::from_call(db);
        record_metrics(&target.name, "ping", ping);
        record_metrics(&target.name, "db", db);

        let result = ProbeResult::from_outcomes(target.name.clone(), cycle, ping, db, chrono::Utc::now());
        if !self.publish(result) {
            debug!("Discarded probe cycle {} for {}: a newer cycle already reported", cycle, target.name);
        }
    }

    /// Store `result` unless a newer cycle already reported for the same service.
    pub(crate) fn publish(&self, result: ProbeResult) -> bool {
        match self.results.entry(result.service.clone()) {
            Entry::Occupied(mut current) => {
                if current.get().cycle > result.cycle {
                    return false;
                }
                current.insert(result);
            }
            Entry::Vacant(slot) => {
                slot.insert(result);
            }
        }
        self.revision.send_modify(|revision| *revision += 1);
        true
    }
}

fn record_metrics(service: &str, probe: &'static str, outcome: ProbeOutcome) {
    let up = if outcome.latency_ms >= 0 { 1.0 } else { 0.0 };
    metrics::gauge!("clusterscope_probe_up", "service" => service.to_string(), "probe" => probe).set(up);
    if outcome.latency_ms >= 0 {
        metrics::histogram!("clusterscope_probe_latency_ms", "service" => service.to_string(), "probe" => probe)
            .record(outcome.latency_ms as f64);
    }
}
