//! Operations applied during a run, grouped per resource kind.

use serde::Serialize;
use serde_json::Value;

use crate::contract::{Record, RecordId, ResourceKind};
use crate::error::SectionError;

/// One reconciliation decision that was carried out against the remote instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Create {
        kind: ResourceKind,
        payload: Record,
    },
    Update {
        kind: ResourceKind,
        target: RecordId,
        patch: Record,
    },
    Delete {
        kind: ResourceKind,
        target: RecordId,
    },
    Skip {
        kind: ResourceKind,
        target: Option<RecordId>,
    },
}

impl Operation {
    /// Everything except `Skip` changes the remote instance.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, Operation::Skip { .. })
    }
}

/// Counts of applied operations, suitable for printing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationTally {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub skipped: usize,
}

/// Result of one kind's successful run.
#[derive(Debug, Clone)]
pub struct KindReport {
    pub kind: ResourceKind,
    pub operations: Vec<Operation>,
    /// Verbatim remote response for kinds that delegate their apply (schema).
    pub remote_result: Option<Value>,
}

impl KindReport {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            operations: Vec::new(),
            remote_result: None,
        }
    }

    pub fn with_operations(kind: ResourceKind, operations: Vec<Operation>) -> Self {
        Self {
            kind,
            operations,
            remote_result: None,
        }
    }

    pub fn tally(&self) -> OperationTally {
        let mut tally = OperationTally::default();
        for op in &self.operations {
            match op {
                Operation::Create { .. } => tally.created += 1,
                Operation::Update { .. } => tally.updated += 1,
                Operation::Delete { .. } => tally.deleted += 1,
                Operation::Skip { .. } => tally.skipped += 1,
            }
        }
        tally
    }

    pub fn mutations(&self) -> usize {
        self.operations.iter().filter(|op| op.is_mutating()).count()
    }
}

/// Per-kind outcomes of an apply run. Kinds fail independently.
#[derive(Debug)]
pub struct RunReport {
    pub outcomes: Vec<Result<KindReport, SectionError>>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Result::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &SectionError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn reports(&self) -> impl Iterator<Item = &KindReport> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn report_for(&self, kind: ResourceKind) -> Option<&KindReport> {
        self.reports().find(|r| r.kind == kind)
    }
}
