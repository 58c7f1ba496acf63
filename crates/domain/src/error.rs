//! Common error types used across the workspace.
//!
//! Each layer defines its own typed errors and converts into [`HubError`]
//! via `#[from]` or an explicit `into_domain()` at the port boundary.

/// Top-level error shared by every crate in the workspace.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A global identifier did not resolve against the live registry.
    #[error(transparent)]
    NotFound(#[from] NotFoundError),

    /// A domain invariant was violated while building a value.
    #[error("validation error")]
    Validation(#[from] ValidationError),

    /// The device family has no wire representation for the command.
    #[error("unsupported command type")]
    UnsupportedCommand {
        /// Device family that rejected the command (e.g. `"telnet"`).
        family: &'static str,
        /// Command kind (e.g. `"scene_set"`).
        command: &'static str,
    },

    /// No registry is bound to the command processor yet.
    #[error("cannot process command, no system bound")]
    CannotProcess,

    /// Scene expansion went deeper than the allowed nesting.
    #[error("scene {scene_id} nests deeper than {limit} levels")]
    SceneTooDeep { scene_id: String, limit: usize },

    /// The command worker has shut down and no longer accepts work.
    #[error("command queue closed")]
    QueueClosed,

    /// Wire-level failure reported by a device adapter.
    #[error("device transport error")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A global identifier that is not known to the system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} ID {id}")]
pub struct NotFoundError {
    /// What was looked up: `"zone"`, `"scene"`, `"button"`, `"device"`, `"sensor"`.
    pub kind: &'static str,
    pub id: String,
}

impl NotFoundError {
    #[must_use]
    pub fn new(kind: &'static str, id: impl ToString) -> Self {
        Self {
            kind,
            id: id.to_string(),
        }
    }
}

/// Domain invariant violations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("name must not be empty")]
    EmptyName,

    #[error("{0} ID must not be empty")]
    EmptyId(&'static str),

    #[error("duplicate {kind} ID {id}")]
    DuplicateId { kind: &'static str, id: String },

    #[error("duplicate local {kind} ID {local_id} on device {device}")]
    DuplicateLocalId {
        kind: &'static str,
        local_id: String,
        device: String,
    },

    #[error("level {0} must be a finite, non-negative number")]
    InvalidLevel(f32),

    #[error("scene {scene} references unknown {kind} ID {id}")]
    DanglingReference {
        scene: String,
        kind: &'static str,
        id: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_display_unknown_zone_message() {
        let err: HubError = NotFoundError::new("zone", "kitchen").into();
        assert_eq!(err.to_string(), "unknown zone ID kitchen");
    }

    #[test]
    fn should_display_unsupported_command_message() {
        let err = HubError::UnsupportedCommand {
            family: "telnet",
            command: "scene_set",
        };
        assert_eq!(err.to_string(), "unsupported command type");
    }

    #[test]
    fn should_wrap_validation_error() {
        let err: HubError = ValidationError::EmptyName.into();
        assert!(matches!(err, HubError::Validation(ValidationError::EmptyName)));
    }

    #[test]
    fn should_keep_transport_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = HubError::Transport(Box::new(io));
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "pipe");
    }
}
