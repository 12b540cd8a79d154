//! Background scheduling for the audit core
//!
//! Drives the retention engine on an hourly tick and keeps a 15-minute
//! threat-detection readiness tick. Each tick runs to completion before
//! the next tick of the same kind starts; different kinds run
//! concurrently with each other and with foreground work.
//!
//! Threat analysis itself stays on-demand through the query interface,
//! pending per-tenant enablement; the readiness tick only signals
//! subscribers.

use crate::retention::RetentionEngine;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, Duration};

/// Scheduler events for monitoring
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// Scheduler started
    Started,
    /// Scheduler stopped
    Stopped,
    /// A retention sweep finished
    RetentionSweepCompleted {
        policies_run: usize,
        failures: usize,
    },
    /// Threat-detection readiness tick fired
    ThreatReadinessTick,
}

/// Tick intervals for the background jobs
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    pub retention_interval: Duration,
    pub threat_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retention_interval: Duration::from_secs(60 * 60),
            threat_interval: Duration::from_secs(15 * 60),
        }
    }
}

/// Periodic driver for the retention engine and threat readiness
pub struct Scheduler {
    retention: Arc<RetentionEngine>,
    config: SchedulerConfig,
    event_tx: broadcast::Sender<SchedulerEvent>,
    running: Arc<RwLock<bool>>,
}

impl Scheduler {
    pub fn new(retention: Arc<RetentionEngine>) -> Self {
        Self::with_config(retention, SchedulerConfig::default())
    }

    pub fn with_config(retention: Arc<RetentionEngine>, config: SchedulerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            retention,
            config,
            event_tx,
            running: Arc::new(RwLock::new(false)),
        }
    }

    /// Subscribe to scheduler events
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the background tick loops
    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        let _ = self.event_tx.send(SchedulerEvent::Started);
        tracing::info!(
            retention_interval_secs = self.config.retention_interval.as_secs(),
            threat_interval_secs = self.config.threat_interval.as_secs(),
            "Audit scheduler started"
        );

        // Retention sweep loop. Sweeps run inline in the loop, so a
        // long sweep delays the next tick rather than overlapping it.
        {
            let retention = self.retention.clone();
            let event_tx = self.event_tx.clone();
            let running = self.running.clone();
            let tick = self.config.retention_interval;

            tokio::spawn(async move {
                let mut ticker = interval(tick);
                ticker.tick().await; // first tick fires immediately; skip it

                loop {
                    ticker.tick().await;
                    if !*running.read().await {
                        break;
                    }

                    let results = retention.execute_ready_policies().await;
                    let failures = results
                        .iter()
                        .filter(|(_, r)| r.error.is_some())
                        .count();
                    if !results.is_empty() {
                        tracing::info!(
                            policies_run = results.len(),
                            failures,
                            "Retention sweep completed"
                        );
                    }
                    let _ = event_tx.send(SchedulerEvent::RetentionSweepCompleted {
                        policies_run: results.len(),
                        failures,
                    });
                }
            });
        }

        // Threat readiness loop
        {
            let event_tx = self.event_tx.clone();
            let running = self.running.clone();
            let tick = self.config.threat_interval;

            tokio::spawn(async move {
                let mut ticker = interval(tick);
                ticker.tick().await;

                loop {
                    ticker.tick().await;
                    if !*running.read().await {
                        break;
                    }
                    tracing::debug!("Threat detection readiness tick");
                    let _ = event_tx.send(SchedulerEvent::ThreatReadinessTick);
                }
            });
        }
    }

    /// Stop the scheduler; in-flight ticks run to completion
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        let _ = self.event_tx.send(SchedulerEvent::Stopped);
        tracing::info!("Audit scheduler stopped");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }
}
