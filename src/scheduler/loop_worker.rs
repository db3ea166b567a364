use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    constraints::{Constraints, DeviceConditions},
    refresh::{JobResult, RefreshJob, UpdateSettingsProvider},
};

use super::backoff::backoff_delay;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Upper bound between constraint re-checks when no device update arrives.
const CONSTRAINT_RECHECK_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RunKind {
    Periodic,
    OneTime,
}

/// Final result of one logical run, after all of its retries.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub kind: RunKind,
    pub result: JobResult,
    pub attempts: u32,
}

/// Everything a scheduled run needs. Constraints are frozen when the work is
/// registered; rescheduling derives them again.
#[derive(Clone)]
pub(super) struct RunContext {
    pub job: RefreshJob,
    pub settings: Arc<dyn UpdateSettingsProvider>,
    pub conditions: watch::Receiver<DeviceConditions>,
    pub constraints: Constraints,
    pub run_lock: Arc<Mutex<()>>,
    pub reports: broadcast::Sender<RunReport>,
}

pub(super) async fn periodic_loop(
    mut ctx: RunContext,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                run_to_completion(&mut ctx, RunKind::Periodic, &cancel_token).await;
            }
            _ = cancel_token.cancelled() => {
                log_info!("periodic refresh loop shutting down");
                break;
            }
        }
    }
}

pub(super) async fn one_time_run(
    mut ctx: RunContext,
    delay: Duration,
    cancel_token: CancellationToken,
) {
    tokio::select! {
        _ = tokio::time::sleep(delay) => {
            run_to_completion(&mut ctx, RunKind::OneTime, &cancel_token).await;
        }
        _ = cancel_token.cancelled() => {
            log_debug!("one-time refresh cancelled before it started");
        }
    }
}

/// Drives attempts 1, 2, ... until the job stops asking for a retry. Returns
/// `None` when cancelled midway.
async fn run_to_completion(
    ctx: &mut RunContext,
    kind: RunKind,
    cancel_token: &CancellationToken,
) -> Option<RunReport> {
    if !wait_for_constraints(ctx, cancel_token).await {
        return None;
    }

    // Periodic and one-time work share the lock: one attempt at a time.
    let run_lock = Arc::clone(&ctx.run_lock);
    let _guard = tokio::select! {
        guard = run_lock.lock() => guard,
        _ = cancel_token.cancelled() => return None,
    };

    let mut attempt_number = 1;
    loop {
        let max_attempts = ctx.settings.max_attempts();
        let result = ctx.job.run_attempt(attempt_number, max_attempts).await;

        if result != JobResult::Retry {
            let report = RunReport {
                kind,
                result,
                attempts: attempt_number,
            };
            log_info!(
                "{:?} refresh finished: {} after {} attempt(s)",
                kind,
                result.as_str(),
                attempt_number
            );
            let _ = ctx.reports.send(report);
            return Some(report);
        }

        let delay = backoff_delay(attempt_number);
        log_info!(
            "{:?} refresh attempt {} asked for retry, backing off {:?}",
            kind,
            attempt_number,
            delay
        );

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel_token.cancelled() => return None,
        }

        attempt_number += 1;
        if !wait_for_constraints(ctx, cancel_token).await {
            return None;
        }
    }
}

/// Blocks until the device satisfies the registered constraints. Returns
/// `false` if cancelled first.
async fn wait_for_constraints(ctx: &mut RunContext, cancel_token: &CancellationToken) -> bool {
    loop {
        let conditions = *ctx.conditions.borrow_and_update();
        if ctx.constraints.is_satisfied_by(&conditions) {
            return true;
        }

        log_warn!(
            "refresh deferred: {:?} does not satisfy {:?}",
            conditions,
            ctx.constraints
        );

        tokio::select! {
            changed = ctx.conditions.changed() => {
                if changed.is_err() {
                    // Publisher gone; fall back to the periodic re-check.
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(CONSTRAINT_RECHECK_SECS)) => {}
                        _ = cancel_token.cancelled() => return false,
                    }
                }
            }
            _ = tokio::time::sleep(Duration::from_secs(CONSTRAINT_RECHECK_SECS)) => {}
            _ = cancel_token.cancelled() => return false,
        }
    }
}
