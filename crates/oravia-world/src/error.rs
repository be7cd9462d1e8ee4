//! Error types for the `oravia-world` crate.

/// Errors raised while validating world rules.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    /// The rule table describes an unplayable world.
    #[error("invalid world rules: {reason}")]
    InvalidRules {
        /// Explanation of what is wrong with the rules.
        reason: String,
    },
}
