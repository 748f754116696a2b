//! Status objects for distributed (multi-process) operations.
//!
//! The distributed-messaging runtime reports a native per-operation status
//! record per participating process. [`construct_status`] converts that
//! record into the crate's representation without exposing the native
//! layout; [`DistributedStatus`] aggregates one report per participant once
//! all of them have arrived. Per-process failures are surfaced as data, not
//! as errors, so partial success stays inspectable per participant.

/// Native status record of the distributed-messaging runtime.
///
/// Field order matches the native layout; only `source` and `error` are
/// interpreted here.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawStatus {
    /// Rank of the process the status originates from.
    pub source: i32,
    /// Message tag.
    pub tag: i32,
    /// Native error code; zero is success.
    pub error: i32,
}

/// Native success code of the distributed-messaging runtime.
pub const MESSAGE_SUCCESS: i32 = 0;

/// Outcome of a distributed operation on one participating process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    rank: i32,
    code: i32,
}

impl ProcessStatus {
    pub fn new(rank: i32, code: i32) -> Self {
        Self { rank, code }
    }

    /// Rank of the reporting process.
    pub fn rank(&self) -> i32 {
        self.rank
    }

    /// Native error code reported by the process.
    pub fn code(&self) -> i32 {
        self.code
    }

    pub fn succeeded(&self) -> bool {
        self.code == MESSAGE_SUCCESS
    }
}

/// Converts a native status record into the crate's representation,
/// extracting the source rank and error code.
pub fn construct_status(raw: &RawStatus) -> ProcessStatus {
    ProcessStatus {
        rank: raw.source,
        code: raw.error,
    }
}

/// Aggregated outcome of a distributed operation.
///
/// Constructed only after every participating process has reported. The
/// aggregate succeeds if and only if all participants succeeded; individual
/// codes remain accessible either way.
#[derive(Debug, Clone)]
pub struct DistributedStatus {
    operation: String,
    reports: Vec<ProcessStatus>,
    succeeded: bool,
}

impl DistributedStatus {
    /// Builds the aggregate from one report per participant.
    pub fn from_reports(operation: impl Into<String>, reports: Vec<ProcessStatus>) -> Self {
        let operation = operation.into();
        let succeeded = reports.iter().all(ProcessStatus::succeeded);
        if !succeeded {
            log::warn!(
                "distributed operation '{}' failed on {} of {} process(es)",
                operation,
                reports.iter().filter(|r| !r.succeeded()).count(),
                reports.len()
            );
        }
        Self {
            operation,
            reports,
            succeeded,
        }
    }

    /// Identifier of the originating operation.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// True if and only if every participating process reported success.
    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    /// Per-process reports, in the order they were collected.
    pub fn reports(&self) -> &[ProcessStatus] {
        &self.reports
    }

    /// The report of a specific rank, if that rank participated.
    pub fn report_for_rank(&self, rank: i32) -> Option<&ProcessStatus> {
        self.reports.iter().find(|r| r.rank() == rank)
    }

    /// Ranks that reported a failure.
    pub fn failed_ranks(&self) -> Vec<i32> {
        self.reports
            .iter()
            .filter(|r| !r.succeeded())
            .map(ProcessStatus::rank)
            .collect()
    }
}
