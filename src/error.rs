use thiserror::Error;

/// Errors raised while authorizing a single invocation, or while wiring the
/// guard at startup.
///
/// A denial is never an error: it is reported through
/// [`Decision::Deny`](crate::guard::Decision::Deny). Everything here means the
/// invocation could not be decided at all.
#[derive(Error, Debug)]
pub enum GuardError {
    #[error("malformed principal in {carrier}: {reason}")]
    MalformedPrincipal { carrier: String, reason: String },

    #[error("subject hook '{0}' is not registered")]
    HookNotRegistered(String),

    #[error("subject hook '{key}' failed: {source:#}")]
    Hook {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("define rules failed: {0:#}")]
    RuleDefinition(#[source] anyhow::Error),

    #[error("invalid conditions for field '{field}': {message}")]
    InvalidConditions { field: String, message: String },

    #[error("operation '{0}' already has acl metadata")]
    DuplicateOperation(String),

    #[error("subject hook '{0}' registered twice")]
    DuplicateHook(String),
}

impl GuardError {
    /// The caller sent a principal the engine cannot read.
    pub fn is_authentication(&self) -> bool {
        matches!(self, GuardError::MalformedPrincipal { .. })
    }

    /// The deployment is wired incorrectly; no request can fix this.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            GuardError::HookNotRegistered(_)
                | GuardError::InvalidConditions { .. }
                | GuardError::DuplicateOperation(_)
                | GuardError::DuplicateHook(_)
        )
    }
}
