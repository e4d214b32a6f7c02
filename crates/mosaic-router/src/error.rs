//! Router error types.

/// Errors that can occur while resolving routes.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RouterError {
    /// No route (and no `404` special route) matches the URL.
    #[error("No route matches {0}")]
    NoRouteMatch(String),

    /// The special role is not configured.
    #[error("No special route for role '{0}'")]
    NoSpecialRoute(String),

    /// A route pattern cannot be compiled.
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
