//! Per-operation outcomes of a migration run.

use crate::plan::DdlOperation;
use std::fmt;

/// What happened to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The DDL ran and was committed.
    Applied,
    /// The object already existed; nothing ran.
    AlreadySatisfied,
    /// The DDL failed and was rolled back.
    Failed(String),
}

/// What happened when filling a freshly added column with its default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackfillOutcome {
    Filled { rows: u64 },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationResult {
    pub operation: DdlOperation,
    pub outcome: Outcome,
    pub backfill: Option<BackfillOutcome>,
}

impl MigrationResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
            || matches!(self.backfill, Some(BackfillOutcome::Failed(_)))
    }
}

impl fmt::Display for MigrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            Outcome::Applied => write!(f, "applied            {}", self.operation)?,
            Outcome::AlreadySatisfied => write!(f, "already satisfied  {}", self.operation)?,
            Outcome::Failed(reason) => write!(f, "FAILED             {}: {}", self.operation, reason)?,
        }
        match &self.backfill {
            Some(BackfillOutcome::Filled { rows }) => write!(f, " (backfilled {} rows)", rows),
            Some(BackfillOutcome::Failed(reason)) => write!(f, " (backfill FAILED: {})", reason),
            None => Ok(()),
        }
    }
}

/// Ordered results of applying a list of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub results: Vec<MigrationResult>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.count(|r| r.outcome == Outcome::Applied)
    }

    pub fn already_satisfied(&self) -> usize {
        self.count(|r| r.outcome == Outcome::AlreadySatisfied)
    }

    /// Results whose DDL or backfill failed.
    pub fn failures(&self) -> impl Iterator<Item = &MigrationResult> {
        self.results.iter().filter(|r| r.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// 0 when everything applied or was already satisfied, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.is_success() { 0 } else { 1 }
    }

    fn count(&self, pred: impl Fn(&MigrationResult) -> bool) -> usize {
        self.results.iter().filter(|r| pred(r)).count()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for result in &self.results {
            writeln!(f, "{}", result)?;
        }
        Ok(())
    }
}
