//! core::ops::journal
//!
//! Operation journaling for compensating rollback.
//!
//! # Architecture
//!
//! Every mutating tree operation owns a journal. Each bounds-changing
//! primitive is recorded as a step *after* the store reports success, so
//! the journal always describes exactly what has been applied. If a later
//! step fails, the engine walks the journal backwards and applies the
//! inverse of each reversible step before the transaction is rolled back.
//!
//! # Invariants
//!
//! - Steps are appended in execution order
//! - Only successfully applied primitives are recorded
//! - A journal leaves `InProgress` exactly once
//!
//! # Example
//!
//! ```
//! use nestedset::core::ops::journal::{Journal, StepKind};
//! use nestedset::core::types::Scope;
//!
//! let mut journal = Journal::new("insert");
//! journal.record(StepKind::SpaceOpened { scope: Scope::FIRST, start: 2, size: 2 });
//!
//! assert!(journal.can_fully_rollback());
//! journal.commit();
//! assert!(journal.phase.is_finished());
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::types::{Node, Scope, UtcTimestamp};

/// Unique identifier for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId(String);

impl OpId {
    /// Generate a new unique operation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The current phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    /// Operation is in progress.
    InProgress,
    /// Operation committed successfully.
    Committed,
    /// Operation was rolled back.
    RolledBack,
}

impl OpPhase {
    /// Check if the operation is finished (committed or rolled back).
    pub fn is_finished(&self) -> bool {
        matches!(self, OpPhase::Committed | OpPhase::RolledBack)
    }
}

/// A single step in an operation journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalStep {
    /// Step kind with operation-specific data.
    pub kind: StepKind,
    /// Timestamp when step was recorded.
    pub timestamp: UtcTimestamp,
}

/// The kind of journal step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    /// A gap of `size` was opened at `start` (bounds `>= start` grew).
    SpaceOpened { scope: Scope, start: i64, size: i64 },

    /// A gap of `size` was closed at `start` (bounds `>= start` shrank).
    SpaceClosed { scope: Scope, start: i64, size: i64 },

    /// Every node inside `[left, right]` of `scope` was shifted.
    ///
    /// After the shift the subtree occupies
    /// `[left + offset, right + offset]` in `new_scope`.
    SubtreeShifted {
        scope: Scope,
        left: i64,
        right: i64,
        offset: i64,
        level_offset: i64,
        new_scope: Scope,
    },

    /// A row was inserted or updated.
    NodeWritten { node: Node },

    /// Every node inside `[left, right]` of `scope` was deleted.
    RangeDeleted {
        scope: Scope,
        left: i64,
        right: i64,
        count: usize,
    },

    /// A checkpoint marker.
    Checkpoint { name: String },
}

impl StepKind {
    /// Whether the step can be undone by applying an inverse primitive.
    pub fn is_reversible(&self) -> bool {
        match self {
            StepKind::SpaceOpened { .. }
            | StepKind::SpaceClosed { .. }
            | StepKind::SubtreeShifted { .. }
            | StepKind::Checkpoint { .. } => true,
            StepKind::NodeWritten { .. } | StepKind::RangeDeleted { .. } => false,
        }
    }
}

/// An operation journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    /// Unique operation identifier.
    pub op_id: OpId,
    /// Operation that started this journal.
    pub operation: String,
    /// When the operation started.
    pub started_at: UtcTimestamp,
    /// When the operation finished (if finished).
    pub finished_at: Option<UtcTimestamp>,
    /// Current phase.
    pub phase: OpPhase,
    /// Steps recorded so far.
    pub steps: Vec<JournalStep>,
}

impl Journal {
    /// Create a new journal for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            op_id: OpId::new(),
            operation: operation.into(),
            started_at: UtcTimestamp::now(),
            finished_at: None,
            phase: OpPhase::InProgress,
            steps: vec![],
        }
    }

    /// Append a step that has been applied to the store.
    pub fn record(&mut self, kind: StepKind) {
        self.steps.push(JournalStep {
            kind,
            timestamp: UtcTimestamp::now(),
        });
    }

    /// Append a checkpoint marker.
    pub fn checkpoint(&mut self, name: impl Into<String>) {
        self.record(StepKind::Checkpoint { name: name.into() });
    }

    /// Mark the operation as committed (successful completion).
    pub fn commit(&mut self) {
        self.phase = OpPhase::Committed;
        self.finished_at = Some(UtcTimestamp::now());
    }

    /// Mark the operation as rolled back.
    pub fn rollback(&mut self) {
        self.phase = OpPhase::RolledBack;
        self.finished_at = Some(UtcTimestamp::now());
    }

    /// Steps in reverse order (most recent first) for rollback.
    pub fn steps_for_rollback(&self) -> impl Iterator<Item = &StepKind> {
        self.steps.iter().rev().map(|s| &s.kind)
    }

    /// Check if every recorded step can be compensated.
    ///
    /// Row writes and deletes cannot; the transaction has to restore them.
    pub fn can_fully_rollback(&self) -> bool {
        self.steps.iter().all(|s| s.kind.is_reversible())
    }

    /// Number of steps that changed bounds.
    pub fn bounds_changes(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| {
                matches!(
                    s.kind,
                    StepKind::SpaceOpened { .. }
                        | StepKind::SpaceClosed { .. }
                        | StepKind::SubtreeShifted { .. }
                )
            })
            .count()
    }

    /// Serialize the journal for logging.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
