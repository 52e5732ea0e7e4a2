//! Error types for laminate.
//!
//! All fallible library operations return [`Result<T>`], an alias for
//! `Result<T, Error>`. The taxonomy follows the failure classes of the
//! build pipeline:
//!
//! - **Recipe problems**: [`ValidationError`] (unresolvable base, empty
//!   target) and [`Error::RecipeParse`] for malformed input. Always fatal,
//!   reported before anything is mutated.
//! - **Scheduling problems**: [`SchedulingError`] when the target graph
//!   cannot make progress. Already-committed tags are left in place.
//! - **Storage problems**: [`StorageError`] for checkout/commit/abort and
//!   image-layout failures. Fatal to the current step, never rolls back
//!   prior commits.
//! - **External tools**: [`ToolError`] when a delegated command exits
//!   non-zero. Carries the command identity and its stderr verbatim; never
//!   retried.

use thiserror::Error;

/// Result type alias for operations that may return a laminate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error for all laminate operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Configuration could not be loaded or merged.
    #[error("config error: {0}")]
    Config(String),

    /// A recipe could not be deserialized into the target model.
    #[error("recipe parse error: {0}")]
    RecipeParse(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error (recipe or config file).
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error (image layout metadata).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Structural problems in a parsed recipe, found by `Recipe::validate`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A target declared an empty base string.
    #[error("no base defined for target '{0}'")]
    MissingBase(String),

    /// A target's base is not "empty", not a sibling target, and not an
    /// existing tag.
    #[error("nonexistent base '{base}' for target '{target}'")]
    UnknownBase { target: String, base: String },

    /// A target declares no work at all.
    #[error("no work for target '{0}'")]
    EmptyTarget(String),
}

/// The scheduler could not complete the build graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchedulingError {
    /// A full sweep built nothing while targets remain. Since validation
    /// rules out missing bases, the remaining targets form a cycle among
    /// themselves.
    #[error("unsatisfiable build graph; unbuildable targets: {}", .remaining.join(", "))]
    UnsatisfiableGraph { remaining: Vec<String> },
}

/// Checkout, commit, abort, volume and image-layout failures.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A working copy is already checked out.
    #[error("already checked out: '{0}'")]
    AlreadyCheckedOut(String),

    /// Abort was requested with no active checkout.
    #[error("nothing to abort")]
    NothingToAbort,

    /// Commit was requested with no active checkout.
    #[error("no active checkout to commit")]
    NotCheckedOut,

    /// The checkout source does not resolve to anything.
    #[error("source not found: '{0}'")]
    SourceNotFound(String),

    /// A tag resolves to more than one manifest in the image index.
    #[error("tag is ambiguous: '{0}'")]
    AmbiguousTag(String),

    /// Every history entry of the tag is an empty layer, so there is no
    /// content digest to check out.
    #[error("tag '{0}' has no non-empty layer")]
    NoContentDigest(String),

    /// The configured fs driver has no implementation.
    #[error("unsupported fs type: {0}")]
    UnsupportedBackend(String),

    /// The image layout directory is missing or malformed.
    #[error("invalid image layout: {0}")]
    InvalidLayout(String),

    /// A blob's content does not hash to its digest.
    #[error("blob hash mismatch for sha256:{digest}: content hashes to sha256:{actual}")]
    BlobHashMismatch { digest: String, actual: String },

    /// On-disk checkout state disagrees with itself. Surfaced, never
    /// auto-repaired.
    #[error("inconsistent checkout state: {0}")]
    Inconsistent(String),
}

/// A delegated external command failed.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The command could not be started at all.
    #[error("failed to execute '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero. `identity` names the offending
    /// step; `stderr` is surfaced verbatim.
    #[error("{}", failure_message(.identity, *.code, .stderr))]
    Failed {
        identity: String,
        code: i32,
        stderr: String,
    },
}

fn failure_message(identity: &str, code: i32, stderr: &str) -> String {
    if stderr.is_empty() {
        format!("{} failed (exit code {})", identity, code)
    } else {
        format!("{} failed (exit code {}):\n{}", identity, code, stderr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_failure_message_includes_stderr() {
        let err = ToolError::Failed {
            identity: "'rsync -a src dst'".to_string(),
            code: 23,
            stderr: "rsync: partial transfer".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("'rsync -a src dst' failed (exit code 23)"));
        assert!(msg.contains("partial transfer"));
    }

    #[test]
    fn tool_failure_message_without_stderr() {
        let err = ToolError::Failed {
            identity: "'false'".to_string(),
            code: 1,
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "'false' failed (exit code 1)");
    }

    #[test]
    fn unsatisfiable_graph_names_remaining_targets() {
        let err = SchedulingError::UnsatisfiableGraph {
            remaining: vec!["a".to_string(), "b".to_string()],
        };
        assert!(err.to_string().contains("a, b"));
    }

    #[test]
    fn validation_errors_name_the_target() {
        assert!(ValidationError::MissingBase("web".into())
            .to_string()
            .contains("web"));
        let err = ValidationError::UnknownBase {
            target: "web".into(),
            base: "nope".into(),
        };
        assert!(err.to_string().contains("web"));
        assert!(err.to_string().contains("nope"));
    }
}
