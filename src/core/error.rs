use thiserror::Error;

/// Failures raised while building or binding sensors and controllers.
///
/// Neither variant is produced during evaluation of a correctly bound
/// controller: cold-start lookups resolve to zero and partial name lists are
/// reported through [`crate::registry::BindReport`] instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReflexError {
    /// Missing name, invalid parameter, or inconsistent gain configuration.
    #[error("configuration error in `{component}`: {reason}")]
    Config { component: String, reason: String },

    /// A process or channel reference that could not be resolved.
    #[error("binding error in `{component}`: cannot resolve `{target}`")]
    Binding { component: String, target: String },
}

impl ReflexError {
    pub fn config(component: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            component: component.into(),
            reason: reason.into(),
        }
    }

    pub fn binding(component: impl Into<String>, target: impl Into<String>) -> Self {
        Self::Binding {
            component: component.into(),
            target: target.into(),
        }
    }

    /// Name of the sensor or controller that raised the error.
    pub fn component(&self) -> &str {
        match self {
            Self::Config { component, .. } | Self::Binding { component, .. } => component,
        }
    }
}

pub type ReflexResult<T> = Result<T, ReflexError>;
