//! Small domain types the executor operates over, on top of the `db`
//! crate's persistence rows and the `dag` crate's pure algorithms.

use uuid::Uuid;

/// The terminal outcome a JobRun reached, as reported by whatever ran it
/// (the `scheduler` crate's Executor Runtime). Distinct from
/// `dag::ParentOutcome` because the caller needs to distinguish `timeout`
/// from `failed` for bookkeeping even though both satisfy the same
/// dependency predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Timeout,
    Skipped,
}

impl JobOutcome {
    pub fn status_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
            Self::Skipped => "skipped",
        }
    }

    pub fn to_parent_outcome(self) -> dag::ParentOutcome {
        match self {
            Self::Completed => dag::ParentOutcome::Completed,
            Self::Failed | Self::Timeout => dag::ParentOutcome::Failed,
            Self::Skipped => dag::ParentOutcome::Skipped,
        }
    }
}

/// A subset of JobRuns to reset on `rerun_run`, or `None` to mean "every
/// non-terminal run plus terminal failures" (spec §4.2).
pub type JobRunSubset = Option<Vec<Uuid>>;
