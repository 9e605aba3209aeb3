//! SweepScheduler - verifier の定期実行
//!
//! - 固定周期（staleness interval と同じ値）で sweep を呼ぶ
//! - 同時に走る sweep は常に 1 本まで。`SweepGuard` で排他し、
//!   guard を共有すれば複数の scheduler をまたいでも重ならない
//! - sweep の失敗はログに出すだけで、ループは止めない

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::verifier::{IdleMessageVerifier, SweepReport};

/// "A sweep is in flight" flag.
#[derive(Debug, Clone, Default)]
pub struct SweepGuard {
    in_flight: Arc<AtomicBool>,
}

impl SweepGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another permit is alive.
    pub fn try_acquire(&self) -> Option<SweepPermit> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_held(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop.
#[derive(Debug)]
pub struct SweepPermit {
    in_flight: Arc<AtomicBool>,
}

impl Drop for SweepPermit {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Result of one scheduler tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Swept(SweepReport),
    /// The ledger read failed; the whole scan is retried next tick.
    Aborted(String),
    /// A previous sweep still holds the guard.
    Skipped,
}

pub struct SweepScheduler {
    verifier: Arc<IdleMessageVerifier>,
    guard: SweepGuard,
    period: Duration,
}

impl SweepScheduler {
    pub fn new(verifier: Arc<IdleMessageVerifier>, guard: SweepGuard, period: Duration) -> Self {
        Self {
            verifier,
            guard,
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub async fn run_once(&self) -> Tick {
        let Some(_permit) = self.guard.try_acquire() else {
            debug!("previous sweep still running, skipping tick");
            return Tick::Skipped;
        };

        match self.verifier.sweep().await {
            Ok(report) => {
                if report.republished > 0 || report.malformed > 0 || report.failed > 0 {
                    info!(
                        scanned = report.scanned,
                        republished = report.republished,
                        malformed = report.malformed,
                        failed = report.failed,
                        "idle message sweep finished"
                    );
                } else {
                    debug!(scanned = report.scanned, "idle message sweep finished");
                }
                Tick::Swept(report)
            }
            Err(e) => {
                error!(error = %e, "idle message sweep aborted");
                Tick::Aborted(e.to_string())
            }
        }
    }

    /// Run `run_once` every period until shutdown.
    ///
    /// The first sweep happens one full period after spawning, so nothing
    /// younger than the staleness window is judged.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval の初回 tick は即時に完了するので読み捨てる
            ticker.tick().await;

            info!(period_secs = self.period.as_secs_f64(), "idle message verifier started");
            loop {
                tokio::select! {
                    // only `true` is ever sent; a dropped sender also stops the loop
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.run_once().await;
                    }
                }
            }
            info!("idle message verifier stopped");
        });

        SchedulerHandle { shutdown_tx, join }
    }
}

pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SchedulerHandle {
    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Waits for an in-flight sweep to finish; sweeps are never cut short.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}
