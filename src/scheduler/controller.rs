use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{
    constraints::DeviceConditions,
    refresh::{RefreshJob, UpdateSettingsProvider},
};

use super::loop_worker::{one_time_run, periodic_loop, RunContext, RunReport};

/// Delay of the catch-up run scheduled when no delay is given.
pub const DEFAULT_ONE_TIME_DELAY: Duration = Duration::from_secs(5 * 60);

const REPORT_CHANNEL_CAPACITY: usize = 16;

struct Registration {
    handle: JoinHandle<()>,
    cancel_token: CancellationToken,
}

impl Registration {
    async fn stop(self) -> Result<()> {
        self.cancel_token.cancel();
        self.handle
            .await
            .context("refresh task failed to join")
    }
}

/// Owns the background refresh work: at most one periodic registration
/// (re-registering replaces it) plus any number of delayed one-time runs.
pub struct RefreshScheduler {
    job: RefreshJob,
    settings: Arc<dyn UpdateSettingsProvider>,
    conditions: watch::Receiver<DeviceConditions>,
    run_lock: Arc<Mutex<()>>,
    reports: broadcast::Sender<RunReport>,
    periodic: Mutex<Option<Registration>>,
    one_time: Mutex<Vec<Registration>>,
}

impl RefreshScheduler {
    pub fn new(
        job: RefreshJob,
        settings: Arc<dyn UpdateSettingsProvider>,
        conditions: watch::Receiver<DeviceConditions>,
    ) -> Self {
        let (reports, _) = broadcast::channel(REPORT_CHANNEL_CAPACITY);
        Self {
            job,
            settings,
            conditions,
            run_lock: Arc::new(Mutex::new(())),
            reports,
            periodic: Mutex::new(None),
            one_time: Mutex::new(Vec::new()),
        }
    }

    /// Final result of every run, periodic or one-time.
    pub fn subscribe_reports(&self) -> broadcast::Receiver<RunReport> {
        self.reports.subscribe()
    }

    fn run_context(&self) -> RunContext {
        RunContext {
            job: self.job.clone(),
            settings: Arc::clone(&self.settings),
            conditions: self.conditions.clone(),
            constraints: self.settings.constraints(),
            run_lock: Arc::clone(&self.run_lock),
            reports: self.reports.clone(),
        }
    }

    /// Registers the periodic refresh, replacing any existing registration.
    /// `None` uses the interval from settings. The first run starts right away.
    pub async fn schedule_periodic(&self, interval: Option<Duration>) -> Result<Duration> {
        let interval = interval.unwrap_or_else(|| self.settings.update_interval());
        if interval.is_zero() {
            bail!("refresh interval must be greater than zero");
        }

        let ctx = self.run_context();
        info!(
            "Scheduling periodic widget refresh every {} min with {:?}",
            interval.as_secs() / 60,
            ctx.constraints
        );

        let mut guard = self.periodic.lock().await;
        if let Some(previous) = guard.take() {
            previous.stop().await?;
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(periodic_loop(ctx, interval, cancel_token.clone()));
        *guard = Some(Registration {
            handle,
            cancel_token,
        });

        Ok(interval)
    }

    pub async fn schedule_one_time(&self, delay: Duration) {
        let ctx = self.run_context();
        info!("Scheduling one-time widget refresh in {}s", delay.as_secs());

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(one_time_run(ctx, delay, cancel_token.clone()));

        let mut pending = self.one_time.lock().await;
        pending.retain(|registration| !registration.handle.is_finished());
        pending.push(Registration {
            handle,
            cancel_token,
        });
    }

    pub async fn cancel_periodic(&self) -> Result<()> {
        info!("Cancelling periodic widget refresh");
        match self.periodic.lock().await.take() {
            Some(registration) => registration.stop().await,
            None => Ok(()),
        }
    }

    pub async fn is_periodic_scheduled(&self) -> bool {
        self.periodic.lock().await.is_some()
    }

    /// Cancels all work and waits for the tasks to exit. An attempt already
    /// talking to the network finishes first.
    pub async fn shutdown(&self) -> Result<()> {
        self.cancel_periodic().await?;

        let pending: Vec<_> = self.one_time.lock().await.drain(..).collect();
        for registration in pending {
            if let Err(err) = registration.stop().await {
                warn!("one-time refresh did not stop cleanly: {err:?}");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constraints::NetworkState,
        refresh::{
            testing::{
                harness, target, FixedSettings, MemoryStore, RecordingDisplay, ScriptedSource,
                SlowSource,
            },
            JobResult, RefreshJob,
        },
        scheduler::{DeviceMonitor, RunKind},
    };

    fn scheduler(
        store: MemoryStore,
        source: ScriptedSource,
        settings: FixedSettings,
        monitor: &DeviceMonitor,
    ) -> (RefreshScheduler, Arc<ScriptedSource>) {
        let h = harness(store, source, RecordingDisplay::default());
        let scheduler = RefreshScheduler::new(h.job, Arc::new(settings), monitor.watch());
        (scheduler, h.source)
    }

    fn two_targets() -> MemoryStore {
        MemoryStore::with_targets(vec![target(1, Some("Oslo")), target(2, Some("Bergen"))])
    }

    #[tokio::test(start_paused = true)]
    async fn one_time_run_retries_until_success() {
        let monitor = DeviceMonitor::online();
        let store = MemoryStore::with_targets(vec![target(1, Some("Oslo"))]);
        let (scheduler, source) =
            scheduler(store, ScriptedSource::failing_first(2), FixedSettings::default(), &monitor);
        let mut reports = scheduler.subscribe_reports();

        scheduler.schedule_one_time(Duration::from_secs(60)).await;

        let report = reports.recv().await.unwrap();
        assert_eq!(report.kind, RunKind::OneTime);
        assert_eq!(report.result, JobResult::Success);
        assert_eq!(report.attempts, 3);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn total_failure_stops_at_max_attempts() {
        let monitor = DeviceMonitor::online();
        let settings = FixedSettings {
            max_attempts: 3,
            ..Default::default()
        };
        let (scheduler, source) = scheduler(
            two_targets(),
            ScriptedSource::failing(&["Oslo", "Bergen"]),
            settings,
            &monitor,
        );
        let mut reports = scheduler.subscribe_reports();

        scheduler.schedule_one_time(Duration::ZERO).await;

        let report = reports.recv().await.unwrap();
        assert_eq!(report.result, JobResult::PermanentFailure);
        assert_eq!(report.attempts, 3);
        assert_eq!(source.calls(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_failure_ends_at_the_attempt_guard() {
        let monitor = DeviceMonitor::online();
        let settings = FixedSettings {
            max_attempts: 2,
            ..Default::default()
        };
        let (scheduler, source) =
            scheduler(two_targets(), ScriptedSource::failing(&["Bergen"]), settings, &monitor);
        let mut reports = scheduler.subscribe_reports();

        scheduler.schedule_one_time(Duration::ZERO).await;

        // Attempts 1 and 2 are partial successes and retry; attempt 3 is
        // past the ceiling and stops without fetching.
        let report = reports.recv().await.unwrap();
        assert_eq!(report.result, JobResult::PermanentFailure);
        assert_eq!(report.attempts, 3);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_constraints_before_running() {
        let monitor = DeviceMonitor::new(DeviceConditions {
            network: NetworkState::Metered,
            battery_low: false,
            device_idle: false,
        });
        let settings = FixedSettings {
            wifi_only: true,
            ..Default::default()
        };
        let (scheduler, source) =
            scheduler(two_targets(), ScriptedSource::default(), settings, &monitor);
        let mut reports = scheduler.subscribe_reports();

        scheduler.schedule_one_time(Duration::ZERO).await;
        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(source.calls(), 0);

        monitor.update(DeviceConditions {
            network: NetworkState::Unmetered,
            battery_low: false,
            device_idle: false,
        });

        let report = reports.recv().await.unwrap();
        assert_eq!(report.result, JobResult::Success);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_runs_on_each_interval() {
        let monitor = DeviceMonitor::online();
        let (scheduler, source) = scheduler(
            two_targets(),
            ScriptedSource::default(),
            FixedSettings::default(),
            &monitor,
        );
        let mut reports = scheduler.subscribe_reports();

        let interval = scheduler.schedule_periodic(None).await.unwrap();
        assert_eq!(interval, Duration::from_secs(30 * 60));

        for _ in 0..2 {
            let report = reports.recv().await.unwrap();
            assert_eq!(report.kind, RunKind::Periodic);
            assert_eq!(report.result, JobResult::Success);
        }
        assert_eq!(source.calls(), 4);

        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_and_cancel_clears() {
        let monitor = DeviceMonitor::online();
        let (scheduler, _) = scheduler(
            MemoryStore::default(),
            ScriptedSource::default(),
            FixedSettings::default(),
            &monitor,
        );

        scheduler.schedule_periodic(Some(Duration::from_secs(900))).await.unwrap();
        scheduler.schedule_periodic(Some(Duration::from_secs(1800))).await.unwrap();
        assert!(scheduler.is_periodic_scheduled().await);

        scheduler.cancel_periodic().await.unwrap();
        assert!(!scheduler.is_periodic_scheduled().await);
        assert!(scheduler.schedule_periodic(Some(Duration::ZERO)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_pending_one_time_runs() {
        let monitor = DeviceMonitor::online();
        let (scheduler, source) = scheduler(
            two_targets(),
            ScriptedSource::default(),
            FixedSettings::default(),
            &monitor,
        );

        scheduler.schedule_one_time(DEFAULT_ONE_TIME_DELAY).await;
        scheduler.shutdown().await.unwrap();
        tokio::time::sleep(DEFAULT_ONE_TIME_DELAY * 2).await;

        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_and_one_time_runs_never_overlap() {
        let monitor = DeviceMonitor::online();
        // One target, so each attempt makes exactly one fetch.
        let store = Arc::new(MemoryStore::with_targets(vec![target(1, Some("Oslo"))]));
        let source = Arc::new(SlowSource::new(Duration::from_secs(30)));
        let job = RefreshJob::new(store, source.clone(), Arc::new(RecordingDisplay::default()));
        let scheduler =
            RefreshScheduler::new(job, Arc::new(FixedSettings::default()), monitor.watch());
        let mut reports = scheduler.subscribe_reports();

        // Both become due at once: the periodic first tick is immediate.
        scheduler.schedule_periodic(None).await.unwrap();
        scheduler.schedule_one_time(Duration::ZERO).await;
        scheduler.schedule_one_time(Duration::from_secs(10)).await;

        let mut kinds = Vec::new();
        for _ in 0..3 {
            let report = reports.recv().await.unwrap();
            assert_eq!(report.result, JobResult::Success);
            kinds.push(report.kind);
        }

        assert_eq!(source.calls(), 3);
        assert_eq!(source.peak(), 1);
        assert!(kinds.contains(&RunKind::Periodic));
        assert!(kinds.contains(&RunKind::OneTime));

        scheduler.shutdown().await.unwrap();
    }
}
