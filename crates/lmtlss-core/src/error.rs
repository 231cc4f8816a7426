//! Error taxonomy for lmtlss-core.
//!
//! Every error explains what went wrong, why, and how to fix it. Errors are
//! grouped by the category boundaries of this system (archive, lattice,
//! proposal/compile, recall/circulation) and each carries a stable
//! machine-readable code for programmatic handling.
//!
//! # Error Code Ranges
//!
//! | Range  | Category                        |
//! |--------|----------------------------------|
//! | E1xxx  | Configuration                    |
//! | E2xxx  | Archive (event log)              |
//! | E3xxx  | Lattice (nodes/edges/evidence)   |
//! | E4xxx  | Proposal parsing & compilation   |
//! | E5xxx  | Recall, capsule, circulation     |
//! | E9xxx  | Internal / locking               |

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Machine-readable error codes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseFailed,
    ConfigInvalidValue,
    Corruption,
    ShardNotFound,
    ArchiveWriteFailed,
    ArchiveIndexMismatch,
    UnknownEventType,
    InvalidSessionKey,
    WorldActionNotApproved,
    Referential,
    SelfLoop,
    NodeNotFound,
    EdgeNotFound,
    FtsIndexMissing,
    Validation,
    Parse,
    ModelFailed,
    ModelEmptyReply,
    LockTimeout,
    LockAlreadyHeld,
    Io,
    InternalUnexpected,
}

impl ErrorCode {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseFailed => "E1001",
            Self::ConfigInvalidValue => "E1002",
            Self::Corruption => "E2001",
            Self::ShardNotFound => "E2002",
            Self::ArchiveWriteFailed => "E2003",
            Self::ArchiveIndexMismatch => "E2004",
            Self::UnknownEventType => "E2005",
            Self::InvalidSessionKey => "E2006",
            Self::WorldActionNotApproved => "E2007",
            Self::Referential => "E3001",
            Self::SelfLoop => "E3002",
            Self::NodeNotFound => "E3003",
            Self::EdgeNotFound => "E3004",
            Self::FtsIndexMissing => "E3005",
            Self::Validation => "E4001",
            Self::Parse => "E4002",
            Self::ModelFailed => "E5001",
            Self::ModelEmptyReply => "E5002",
            Self::LockTimeout => "E9001",
            Self::LockAlreadyHeld => "E9002",
            Self::Io => "E9003",
            Self::InternalUnexpected => "E9004",
        }
    }

    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseFailed => "Config file parse error",
            Self::ConfigInvalidValue => "Invalid config value",
            Self::Corruption => "Event hash recompute mismatch",
            Self::ShardNotFound => "Day partition file not found",
            Self::ArchiveWriteFailed => "Archive append failed",
            Self::ArchiveIndexMismatch => "Archive index row does not resolve to its line",
            Self::UnknownEventType => "Unrecognized event type",
            Self::InvalidSessionKey => "Malformed session key",
            Self::WorldActionNotApproved => "world_action event missing approval",
            Self::Referential => "Edge endpoint does not exist",
            Self::SelfLoop => "Edge source equals target",
            Self::NodeNotFound => "Lattice node not found",
            Self::EdgeNotFound => "Lattice edge not found",
            Self::FtsIndexMissing => "Full-text index missing",
            Self::Validation => "Proposal failed validation",
            Self::Parse => "Malformed proposal JSON",
            Self::ModelFailed => "Model invocation failed",
            Self::ModelEmptyReply => "Model invocation returned an empty reply",
            Self::LockTimeout => "State directory lock timed out",
            Self::LockAlreadyHeld => "State directory lock already held",
            Self::Io => "I/O error",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseFailed => Some("Fix the TOML syntax in the config file and retry."),
            Self::ConfigInvalidValue => Some("Check the config file for the invalid key."),
            Self::Corruption => {
                Some("The archive is corrupt; restore from backup or investigate disk integrity.")
            }
            Self::ShardNotFound => {
                Some("The day partition may have been deleted. Check the state directory.")
            }
            Self::ArchiveWriteFailed => Some("Check disk space and write permissions."),
            Self::ArchiveIndexMismatch => {
                Some("Run recovery to reconcile the index against the partition tail.")
            }
            Self::UnknownEventType => Some("Normalize legacy event type aliases before appending."),
            Self::InvalidSessionKey => Some(
                "Session keys must be `lmtlss:<agent_id>:<ULID>` with no empty or colon-containing segments.",
            ),
            Self::WorldActionNotApproved => Some(
                "Include `approvalId` and `approved: true` in the payload before appending a world_action event.",
            ),
            Self::Referential => Some("Create both endpoint nodes before creating the edge."),
            Self::SelfLoop => Some("Choose a different target; self-loops are not allowed."),
            Self::NodeNotFound => Some("Check the node id; it may have been archived or never created."),
            Self::EdgeNotFound => Some("Check the edge id."),
            Self::FtsIndexMissing => Some("Rebuild the lattice database to recreate the FTS index."),
            Self::Validation => Some("Fix the proposal fields per the proposal grammar and retry."),
            Self::Parse => Some("Check the `<lattice_update>` block for malformed JSON."),
            Self::ModelFailed => Some("Inspect the model callback's error and retry."),
            Self::ModelEmptyReply => Some("The model callback must return non-empty text."),
            Self::LockTimeout => Some("Wait for the other process to release the lock, then retry."),
            Self::LockAlreadyHeld => Some("Another process holds the lock; wait or remove a stale lock file."),
            Self::Io => Some("Check disk space and permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Top-level error type for all lmtlss-core operations.
#[derive(Debug, thiserror::Error)]
pub enum LmtlssError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Lattice(#[from] LatticeError),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Circulation(#[from] CirculationError),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl LmtlssError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.error_code(),
            Self::Archive(e) => e.error_code(),
            Self::Lattice(e) => e.error_code(),
            Self::Proposal(e) => e.error_code(),
            Self::Circulation(e) => e.error_code(),
            Self::Lock(e) => e.error_code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Config(e) => e.suggestion(),
            Self::Archive(e) => e.suggestion(),
            Self::Lattice(e) => e.suggestion(),
            Self::Proposal(e) => e.suggestion(),
            Self::Circulation(e) => e.suggestion(),
            Self::Lock(e) => e.suggestion(),
        }
    }

    #[must_use]
    pub fn to_json_error(&self) -> JsonError {
        JsonError {
            error_code: self.error_code().to_string(),
            message: self.to_string(),
            suggestion: self.suggestion(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonError {
    pub error_code: String,
    pub message: String,
    pub suggestion: String,
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Error: Failed to parse config at {path}\nCause: {reason}\nFix: Fix the TOML syntax and retry.")]
    ParseFailed { path: PathBuf, reason: String },

    #[error("Error: Invalid config value for '{key}': '{value}'\nCause: {reason}\nFix: Correct the value for '{key}'.")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ParseFailed { .. } => ErrorCode::ConfigParseFailed.code(),
            Self::InvalidValue { .. } => ErrorCode::ConfigInvalidValue.code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::ParseFailed { .. } => "Fix the TOML syntax and retry.".into(),
            Self::InvalidValue { key, .. } => format!("Correct the value for '{key}'."),
        }
    }
}

// ---------------------------------------------------------------------------
// ArchiveError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Error: Event hash mismatch for {event_hash}\nCause: recomputed hash {recomputed} does not match stored hash\nFix: The archive is corrupt; investigate disk integrity or restore from backup.")]
    Corruption {
        event_hash: String,
        recomputed: String,
    },

    #[error("Error: Day partition not found at {path}\nCause: the file may have been deleted or moved\nFix: Check the state directory for the missing partition.")]
    ShardNotFound { path: PathBuf },

    #[error("Error: Failed to append event\nCause: {reason}\nFix: Check disk space and write permissions.")]
    WriteFailed { reason: String },

    #[error("Error: Index row for line {line} does not resolve to the written content\nCause: {reason}\nFix: Run recovery to reconcile the index against the partition tail.")]
    IndexMismatch { line: usize, reason: String },

    #[error("Error: Unknown event type '{event_type}'\nCause: this event type is not part of the canonical or legacy-alias set\nFix: Normalize the event type before appending.")]
    UnknownEventType { event_type: String },

    #[error("Error: Invalid session key '{raw}'\nCause: {reason}\nFix: Session keys must be `lmtlss:<agent_id>:<ULID>` with no empty or colon-containing segments.")]
    InvalidSessionKey { raw: String, reason: String },

    #[error("Error: world_action event is missing approval\nCause: payload lacks `approvalId` and `approved: true`\nFix: Include both fields in the payload before appending.")]
    WorldActionNotApproved,
}

impl ArchiveError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Corruption { .. } => ErrorCode::Corruption.code(),
            Self::ShardNotFound { .. } => ErrorCode::ShardNotFound.code(),
            Self::WriteFailed { .. } => ErrorCode::ArchiveWriteFailed.code(),
            Self::IndexMismatch { .. } => ErrorCode::ArchiveIndexMismatch.code(),
            Self::UnknownEventType { .. } => ErrorCode::UnknownEventType.code(),
            Self::InvalidSessionKey { .. } => ErrorCode::InvalidSessionKey.code(),
            Self::WorldActionNotApproved => ErrorCode::WorldActionNotApproved.code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Corruption { .. } => {
                "The archive is corrupt; investigate disk integrity or restore from backup.".into()
            }
            Self::ShardNotFound { .. } => "Check the state directory for the missing partition.".into(),
            Self::WriteFailed { .. } => "Check disk space and write permissions.".into(),
            Self::IndexMismatch { .. } => {
                "Run recovery to reconcile the index against the partition tail.".into()
            }
            Self::UnknownEventType { .. } => "Normalize the event type before appending.".into(),
            Self::InvalidSessionKey { .. } => {
                "Session keys must be `lmtlss:<agent_id>:<ULID>` with no empty or colon-containing segments.".into()
            }
            Self::WorldActionNotApproved => {
                "Include `approvalId` and `approved: true` in the payload before appending.".into()
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LatticeError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LatticeError {
    #[error("Error: Edge endpoint missing\nCause: {endpoint} does not reference an existing node\nFix: Create both endpoint nodes before creating the edge.")]
    Referential { endpoint: String },

    #[error("Error: Self-loop rejected for node {node_id}\nCause: source and target are the same node\nFix: Choose a different target.")]
    SelfLoop { node_id: String },

    #[error("Error: Node '{node_id}' not found\nCause: no node with this id exists\nFix: Check the node id.")]
    NodeNotFound { node_id: String },

    #[error("Error: Edge '{edge_id}' not found\nCause: no edge with this id exists\nFix: Check the edge id.")]
    EdgeNotFound { edge_id: String },

    #[error("Error: FTS index missing from the lattice database\nCause: {reason}\nFix: Rebuild the lattice database to recreate the FTS index.")]
    FtsIndexMissing { reason: String },

    #[error("Error: lattice database I/O failure\nCause: {reason}\nFix: Check disk space and permissions on the state directory.")]
    Io { reason: String },
}

impl LatticeError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Referential { .. } => ErrorCode::Referential.code(),
            Self::SelfLoop { .. } => ErrorCode::SelfLoop.code(),
            Self::NodeNotFound { .. } => ErrorCode::NodeNotFound.code(),
            Self::EdgeNotFound { .. } => ErrorCode::EdgeNotFound.code(),
            Self::FtsIndexMissing { .. } => ErrorCode::FtsIndexMissing.code(),
            Self::Io { .. } => ErrorCode::Io.code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Referential { .. } => "Create both endpoint nodes before creating the edge.".into(),
            Self::SelfLoop { .. } => "Choose a different target; self-loops are not allowed.".into(),
            Self::NodeNotFound { .. } => "Check the node id.".into(),
            Self::EdgeNotFound { .. } => "Check the edge id.".into(),
            Self::FtsIndexMissing { .. } => "Rebuild the lattice database.".into(),
            Self::Io { .. } => "Check disk space and permissions on the state directory.".into(),
        }
    }
}

impl From<rusqlite::Error> for LatticeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Io {
            reason: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProposalError (VALIDATION / PARSE)
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("Error: Proposal failed validation\nCause: {reasons:?}\nFix: Fix the listed fields per the proposal grammar.")]
    Validation { reasons: Vec<String> },

    #[error("Error: Malformed proposal JSON\nCause: {reason}\nFix: Check the `<lattice_update>` block for malformed JSON.")]
    Parse { reason: String },
}

impl ProposalError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => ErrorCode::Validation.code(),
            Self::Parse { .. } => ErrorCode::Parse.code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Validation { .. } => "Fix the listed fields per the proposal grammar.".into(),
            Self::Parse { .. } => "Check the `<lattice_update>` block for malformed JSON.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// CirculationError (MODEL / IO)
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CirculationError {
    #[error("Error: Model invocation failed\nCause: {reason}\nFix: Inspect the model callback's error and retry.")]
    ModelFailed { reason: String },

    #[error("Error: Model invocation returned an empty reply\nCause: invoke_model returned an empty string\nFix: The model callback must return non-empty text.")]
    ModelEmptyReply,

    #[error("Error: I/O error\nCause: {reason}\nFix: Check disk space and permissions.")]
    Io { reason: String },

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Lattice(#[from] LatticeError),
}

impl CirculationError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ModelFailed { .. } => ErrorCode::ModelFailed.code(),
            Self::ModelEmptyReply => ErrorCode::ModelEmptyReply.code(),
            Self::Io { .. } => ErrorCode::Io.code(),
            Self::Archive(e) => e.error_code(),
            Self::Lattice(e) => e.error_code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::ModelFailed { .. } => "Inspect the model callback's error and retry.".into(),
            Self::ModelEmptyReply => "The model callback must return non-empty text.".into(),
            Self::Io { .. } => "Check disk space and permissions.".into(),
            Self::Archive(e) => e.suggestion(),
            Self::Lattice(e) => e.suggestion(),
        }
    }
}

// ---------------------------------------------------------------------------
// LockError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Error: Lock timed out after {waited_ms}ms at {path}\nCause: another process is holding the lock\nFix: Wait for the other process to finish, then retry.")]
    Timeout { path: PathBuf, waited_ms: u64 },

    #[error("Error: Lock already held at {path}\nCause: another process is using this state directory\nFix: Wait for the other process to finish, or remove a stale lock file.")]
    AlreadyLocked { path: PathBuf },

    #[error("Error: I/O error acquiring lock\nCause: {reason}\nFix: Check disk space and permissions on the state directory.")]
    Io { reason: String },
}

impl LockError {
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => ErrorCode::LockTimeout.code(),
            Self::AlreadyLocked { .. } => ErrorCode::LockAlreadyHeld.code(),
            Self::Io { .. } => ErrorCode::Io.code(),
        }
    }

    #[must_use]
    pub fn suggestion(&self) -> String {
        match self {
            Self::Timeout { .. } => "Wait for the other process to finish, then retry.".into(),
            Self::AlreadyLocked { .. } => {
                "Wait for the other process to finish, or remove a stale lock file.".into()
            }
            Self::Io { .. } => "Check disk space and permissions on the state directory.".into(),
        }
    }
}

// ---------------------------------------------------------------------------
// From impls for common error sources
// ---------------------------------------------------------------------------

impl From<std::io::Error> for LmtlssError {
    fn from(err: std::io::Error) -> Self {
        Self::Circulation(CirculationError::Io {
            reason: err.to_string(),
        })
    }
}

impl From<rusqlite::Error> for LmtlssError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Lattice(LatticeError::FtsIndexMissing {
            reason: err.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
