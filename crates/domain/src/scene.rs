//! Scene: a named, ordered list of commands activated as a unit.

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{HubError, ValidationError};
use crate::id::SceneId;

/// A named sequence of [`Command`]s.
///
/// Activating a scene is equivalent to enqueueing each command in order.
/// Ordering is guaranteed, atomicity is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    pub id: SceneId,
    pub name: String,
    pub commands: Vec<Command>,
}

impl Scene {
    /// Create a builder for constructing a [`Scene`].
    #[must_use]
    pub fn builder() -> SceneBuilder {
        SceneBuilder::default()
    }

    /// Check domain invariants.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] when the name or ID is empty, or a
    /// level command carries a negative or non-finite level.
    pub fn validate(&self) -> Result<(), HubError> {
        if self.name.is_empty() {
            return Err(ValidationError::EmptyName.into());
        }
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId("scene").into());
        }
        for command in &self.commands {
            if let Command::ZoneSetLevel { level, .. } = command {
                if !level.is_finite() || *level < 0.0 {
                    return Err(ValidationError::InvalidLevel(*level).into());
                }
            }
        }
        Ok(())
    }
}

/// Step-by-step builder for [`Scene`].
#[derive(Debug, Default)]
pub struct SceneBuilder {
    id: Option<SceneId>,
    name: Option<String>,
    commands: Vec<Command>,
}

impl SceneBuilder {
    #[must_use]
    pub fn id(mut self, id: impl Into<SceneId>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    /// Consume the builder, validate, and return a [`Scene`].
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] if required fields are missing or invalid.
    pub fn build(self) -> Result<Scene, HubError> {
        let scene = Scene {
            id: self.id.unwrap_or_else(|| SceneId::new("")),
            name: self.name.unwrap_or_default(),
            commands: self.commands,
        };
        scene.validate()?;
        Ok(scene)
    }
}
