use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::db::{Target, TargetId};

use super::outcome::{aggregate, JobResult, RefreshOutcome, RefreshTally};
use super::ports::{DisplaySignal, TargetStore, WeatherSource};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// One recurring refresh across every configured widget target.
///
/// The job keeps no state between attempts; attempt bookkeeping belongs to the
/// caller. Attempts are assumed to be single-flight.
#[derive(Clone)]
pub struct RefreshJob {
    store: Arc<dyn TargetStore>,
    source: Arc<dyn WeatherSource>,
    display: Arc<dyn DisplaySignal>,
}

impl RefreshJob {
    pub fn new(
        store: Arc<dyn TargetStore>,
        source: Arc<dyn WeatherSource>,
        display: Arc<dyn DisplaySignal>,
    ) -> Self {
        Self {
            store,
            source,
            display,
        }
    }

    /// Runs attempt `attempt_number` (1-based) of the job and reports whether
    /// the scheduler should retry. Never fails: job-level errors are folded
    /// into the returned [`JobResult`].
    pub async fn run_attempt(&self, attempt_number: u32, max_attempts: u32) -> JobResult {
        let run_id = Uuid::new_v4();
        log_info!(
            "[refresh {run_id}] starting attempt {}/{}",
            attempt_number,
            max_attempts
        );

        if attempt_number > max_attempts {
            log_warn!(
                "[refresh {run_id}] attempt {} exceeds maximum of {}, giving up",
                attempt_number,
                max_attempts
            );
            return JobResult::PermanentFailure;
        }

        let result = match self.try_run(run_id, attempt_number, max_attempts).await {
            Ok(result) => result,
            Err(err) => {
                let result = JobResult::retry_unless_exhausted(attempt_number, max_attempts);
                log_error!(
                    "[refresh {run_id}] attempt {}/{} failed: {err:?}; result={}",
                    attempt_number,
                    max_attempts,
                    result.as_str()
                );
                result
            }
        };

        log_info!("[refresh {run_id}] finished with {}", result.as_str());
        result
    }

    async fn try_run(&self, run_id: Uuid, attempt_number: u32, max_attempts: u32) -> Result<JobResult> {
        let targets: Vec<Target> = self
            .store
            .list_configured_targets()
            .await
            .context("failed to enumerate widget targets")?
            .into_iter()
            .filter(Target::is_configured)
            .collect();

        if targets.is_empty() {
            log_debug!("[refresh {run_id}] no configured widgets");
            return Ok(JobResult::Success);
        }

        log_info!(
            "[refresh {run_id}] updating {} widgets: {:?}",
            targets.len(),
            targets.iter().map(|t| t.id).collect::<Vec<_>>()
        );

        let outcomes = self.refresh_all(targets).await;
        let tally = RefreshTally::from_outcomes(&outcomes);

        log_info!(
            "[refresh {run_id}] updated {}/{} widgets ({} failed)",
            tally.succeeded,
            tally.total,
            tally.failed()
        );

        let result = aggregate(tally, attempt_number, max_attempts);
        if result == JobResult::PermanentFailure {
            log_error!(
                "[refresh {run_id}] all widgets failed after {} attempts",
                max_attempts
            );
        }
        Ok(result)
    }

    /// Refreshes targets concurrently. A task that panics counts as a failed
    /// target; it never takes the other targets down with it.
    async fn refresh_all(&self, targets: Vec<Target>) -> Vec<RefreshOutcome> {
        let mut tasks = JoinSet::new();
        for target in targets {
            let job = self.clone();
            tasks.spawn(async move { job.refresh_target(&target).await });
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(err) => {
                    log_error!("widget refresh task aborted: {err}");
                    outcomes.push(RefreshOutcome::Failure);
                }
            }
        }
        outcomes
    }

    /// Refreshes one target. `None` means the target has no location and was
    /// skipped without touching any collaborator.
    pub async fn refresh_target(&self, target: &Target) -> Option<RefreshOutcome> {
        let Some(location) = target.configured_location() else {
            log_debug!("widget {} has no location, skipping", target.id);
            return None;
        };

        Some(self.refresh_location(target.id, location).await)
    }

    /// Looks the location up in the store first; used right after a widget
    /// has been (re)configured.
    pub async fn refresh_target_by_id(&self, target_id: TargetId) -> Result<Option<RefreshOutcome>> {
        let location = self
            .store
            .location(target_id)
            .await
            .with_context(|| format!("failed to read location for widget {target_id}"))?;

        match location.as_deref().map(str::trim) {
            Some(location) if !location.is_empty() => {
                Ok(Some(self.refresh_location(target_id, location).await))
            }
            _ => {
                log_warn!("no location configured for widget {}", target_id);
                Ok(None)
            }
        }
    }

    async fn refresh_location(&self, target_id: TargetId, location: &str) -> RefreshOutcome {
        log_debug!("updating widget {} for location {}", target_id, location);

        let payload = match self.source.fetch(location).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                log_warn!("no weather data returned for widget {}", target_id);
                return RefreshOutcome::Failure;
            }
            Err(err) => {
                log_warn!("weather fetch failed for widget {}: {err:?}", target_id);
                return RefreshOutcome::Failure;
            }
        };

        if let Err(err) = self.store.save_result(target_id, &payload, Utc::now()).await {
            log_error!("failed to save weather for widget {}: {err:?}", target_id);
            return RefreshOutcome::Failure;
        }

        if let Err(err) = self.display.notify_refreshed(target_id) {
            log_error!("failed to signal redraw for widget {}: {err:?}", target_id);
            return RefreshOutcome::Failure;
        }

        log_debug!("widget {} updated", target_id);
        RefreshOutcome::Success
    }
}
