//! Ledger-range planner.
//!
//! Reconciles three coordinates -- what the operator asked for, what the
//! upstream archive has, and what has already been committed -- into a
//! single range to stream from the archive. Mirrors
//! `GetLedgerBound` in the indexer this crate supersedes: first-match-wins
//! over the same seven rules, in the same order.

/// Sentinel used by both `--start` and `--end`: any value `<= UNBOUNDED`
/// means "unspecified" on the CLI.
pub const UNBOUNDED: u32 = 1;

/// The planner's verdict: either a concrete range to stream, or a reasoned
/// decision not to run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Nothing to do -- the requested range is already fully indexed.
    Skip,
    /// Stream ledgers `start..=end`.
    Bounded { start: u32, end: u32 },
    /// Stream ledgers `start..` indefinitely.
    Unbounded { start: u32 },
}

/// Rejections for rules 1-3: these are fatal before any I/O happens.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRejected {
    #[error("end ledger {end} is less than start ledger {start}")]
    EndBeforeStart { start: u32, end: u32 },
    #[error("end ledger {end} is greater than latest archived ledger {latest}")]
    EndExceedsArchive { end: u32, latest: u32 },
    #[error("start ledger {start} is greater than latest archived ledger {latest}")]
    StartExceedsArchive { start: u32, latest: u32 },
}

/// Inputs to the planner. All ledger sequence numbers, `0` or `1` meaning
/// "unspecified" for `start_req`/`end_req` per the `UNBOUNDED` sentinel.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs {
    pub start_req: u32,
    pub end_req: u32,
    pub latest_in_archive: u32,
    pub max_indexed: u32,
    pub backfill: bool,
}

/// Apply the seven-rule decision table. First match wins.
pub fn plan(inputs: PlanInputs) -> Result<Plan, RangeRejected> {
    let PlanInputs {
        start_req,
        end_req,
        latest_in_archive,
        max_indexed,
        backfill,
    } = inputs;

    // Rule 1
    if end_req > UNBOUNDED && end_req < start_req {
        return Err(RangeRejected::EndBeforeStart {
            start: start_req,
            end: end_req,
        });
    }
    // Rule 2
    if end_req > UNBOUNDED && end_req > latest_in_archive {
        return Err(RangeRejected::EndExceedsArchive {
            end: end_req,
            latest: latest_in_archive,
        });
    }
    // Rule 3
    if start_req > UNBOUNDED && start_req > latest_in_archive {
        return Err(RangeRejected::StartExceedsArchive {
            start: start_req,
            latest: latest_in_archive,
        });
    }
    // Rule 4: idempotence shortcut.
    if !backfill && end_req > UNBOUNDED && end_req <= max_indexed {
        return Ok(Plan::Skip);
    }

    // Rule 5: resumption. Backfill ignores maxIndexed entirely.
    let mut start = start_req;
    if !backfill && max_indexed > 0 && start_req <= max_indexed {
        start = max_indexed;
    }

    // Rule 6: unbounded.
    if end_req <= UNBOUNDED || start_req <= UNBOUNDED || start == latest_in_archive {
        let start = if start <= UNBOUNDED {
            latest_in_archive
        } else {
            start
        };
        return Ok(Plan::Unbounded { start });
    }

    // Rule 7: bounded.
    Ok(Plan::Bounded {
        start,
        end: end_req,
    })
}
