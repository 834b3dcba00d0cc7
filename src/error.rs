//! Structured error types for a migration run.
//!
//! Failures are classified once, at the orchestrator boundary:
//! - Precondition: nothing was mutated, nothing to roll back
//! - Phase: a phase failed after the backup was taken; the backup was restored
//! - Validation: the pre-cutover checks failed; the backup was restored
//! - RollbackFailed: restoring the backup itself failed; manual recovery needed

use crate::migration::MigrationState;
use std::path::PathBuf;
use thiserror::Error;

/// Problems found by the validation pass.
///
/// Raised inside a phase as an `anyhow::Error` and recovered by downcasting
/// when the orchestrator classifies the failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} validation problem(s): {}", problems.len(), problems.join("; "))]
pub struct ValidationFailure {
    pub problems: Vec<String>,
}

impl ValidationFailure {
    pub fn new(problems: Vec<String>) -> Self {
        Self { problems }
    }
}

/// Error returned by [`crate::migration::MigrationOrchestrator::run`].
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The run was refused before any mutation.
    #[error("precondition failed: {message}")]
    Precondition { message: String },

    /// A phase failed. Returned on its own only once the backup is restored.
    #[error("{phase} failed: {cause:#}")]
    Phase {
        phase: MigrationState,
        cause: anyhow::Error,
    },

    /// The validator rejected the normalized tables before cutover.
    #[error("{phase} failed: {failure}")]
    Validation {
        phase: MigrationState,
        failure: ValidationFailure,
    },

    /// Restoring the backup failed. The database may be left mutated.
    #[error(
        "rollback from {} failed: {cause:#}; original error: {original}",
        backup.display()
    )]
    RollbackFailed {
        original: Box<MigrationError>,
        backup: PathBuf,
        cause: anyhow::Error,
    },
}

impl MigrationError {
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition {
            message: message.into(),
        }
    }

    /// Classify a phase failure, separating validation problems from the rest.
    pub fn from_phase(phase: MigrationState, cause: anyhow::Error) -> Self {
        match cause.downcast::<ValidationFailure>() {
            Ok(failure) => Self::Validation { phase, failure },
            Err(cause) => Self::Phase { phase, cause },
        }
    }

    /// The phase the error was raised in, if any.
    pub fn phase(&self) -> Option<MigrationState> {
        match self {
            Self::Precondition { .. } => None,
            Self::Phase { phase, .. } | Self::Validation { phase, .. } => Some(*phase),
            Self::RollbackFailed { original, .. } => original.phase(),
        }
    }

    /// True when the database was left in a known state (untouched or restored).
    pub fn is_recovered(&self) -> bool {
        !matches!(self, Self::RollbackFailed { .. })
    }

    /// Process exit code used by the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Precondition { .. } => 2,
            Self::Phase { .. } => 3,
            Self::Validation { .. } => 4,
            Self::RollbackFailed { .. } => 5,
        }
    }
}

/// Result type for orchestrated migrations.
pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_from_phase_recovers_validation_failure() {
        let cause = anyhow::Error::new(ValidationFailure::new(vec!["count mismatch".into()]));
        let err = MigrationError::from_phase(MigrationState::Validating, cause);

        match err {
            MigrationError::Validation { phase, failure } => {
                assert_eq!(phase, MigrationState::Validating);
                assert_eq!(failure.problems, vec!["count mismatch".to_string()]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_from_phase_keeps_other_errors() {
        let err = MigrationError::from_phase(MigrationState::MigratingRows, anyhow!("boom"));
        assert!(matches!(err, MigrationError::Phase { .. }));
        assert_eq!(err.phase(), Some(MigrationState::MigratingRows));
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_rollback_failed_reports_original_phase() {
        let original = MigrationError::from_phase(MigrationState::Seeding, anyhow!("disk I/O"));
        let err = MigrationError::RollbackFailed {
            original: Box::new(original),
            backup: PathBuf::from("/tmp/memory.db.bak"),
            cause: anyhow!("backup missing"),
        };

        assert_eq!(err.phase(), Some(MigrationState::Seeding));
        assert!(!err.is_recovered());
        assert_eq!(err.exit_code(), 5);
        let message = err.to_string();
        assert!(message.contains("/tmp/memory.db.bak"));
        assert!(message.contains("seeding failed: disk I/O"), "{message}");
        assert!(!message.contains("restored"), "{message}");
    }

    #[test]
    fn test_precondition_exit_code() {
        let err = MigrationError::precondition("database file not found");
        assert_eq!(err.exit_code(), 2);
        assert!(err.phase().is_none());
        assert!(err.is_recovered());
    }
}
