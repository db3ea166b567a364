use serde::Serialize;

/// Result of refreshing a single target.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RefreshOutcome {
    Success,
    Failure,
}

/// What the scheduler should do after an attempt.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum JobResult {
    Success,
    Retry,
    PermanentFailure,
}

impl JobResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobResult::Success => "success",
            JobResult::Retry => "retry",
            JobResult::PermanentFailure => "permanent_failure",
        }
    }

    /// `Retry` while attempts remain, `PermanentFailure` once the ceiling is reached.
    pub fn retry_unless_exhausted(attempt_number: u32, max_attempts: u32) -> Self {
        if attempt_number < max_attempts {
            JobResult::Retry
        } else {
            JobResult::PermanentFailure
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshTally {
    pub succeeded: usize,
    pub total: usize,
}

impl RefreshTally {
    pub fn from_outcomes<'a>(outcomes: impl IntoIterator<Item = &'a RefreshOutcome>) -> Self {
        outcomes
            .into_iter()
            .fold(Self::default(), |mut tally, outcome| {
                tally.total += 1;
                if *outcome == RefreshOutcome::Success {
                    tally.succeeded += 1;
                }
                tally
            })
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// Folds per-target outcomes into one job result.
///
/// A partial success always retries, even on the last allowed attempt. Only a
/// run where nothing succeeded is bounded by `max_attempts`.
pub fn aggregate(tally: RefreshTally, attempt_number: u32, max_attempts: u32) -> JobResult {
    if tally.succeeded == tally.total {
        JobResult::Success
    } else if tally.succeeded > 0 {
        JobResult::Retry
    } else {
        JobResult::retry_unless_exhausted(attempt_number, max_attempts)
    }
}
