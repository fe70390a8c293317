use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the underlying automation capability set.
///
/// The driver only ever special-cases the variants it knows how to recover
/// from (`Stale`, `ClickIntercepted`, `NotInteractable`); everything else
/// bubbles up unchanged inside `Other`.
#[derive(Debug, Error)]
pub enum ScopeError {
    /// A previously located element handle no longer resolves because the
    /// underlying DOM node was replaced.
    #[error("stale element reference: {0}")]
    Stale(String),

    #[error("element not found: {0}")]
    NotFound(String),

    /// The click landed on an overlapping element instead of the target.
    #[error("click intercepted: {0}")]
    ClickIntercepted(String),

    #[error("element not interactable: {0}")]
    NotInteractable(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ScopeError {
    pub fn is_stale(&self) -> bool {
        matches!(self, ScopeError::Stale(_))
    }
}

/// Failures surfaced by driver operations.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("expected combo-select '{selector}' to be closed, but it was already open")]
    AlreadyOpen { selector: String },

    #[error("the '{option}'-option is already selected")]
    AlreadyApplied { option: String },

    #[error("failed to open combo-select options for '{selector}' (options container not found)")]
    OpenFailed { selector: String },

    #[error("no option matched {criteria} (selector: {selector})")]
    OptionNotFound { selector: String, criteria: String },

    #[error("the '{option}'-option is disabled")]
    OptionDisabled { option: String },

    #[error("the '{option}'-option is not selected")]
    NotSelected { option: String },

    /// The click landed but the widget never reported the expected committed
    /// state before the wait budget ran out.
    #[error("selection of {criteria} was not confirmed within {waited:?}")]
    SelectionNotConfirmed { criteria: String, waited: Duration },

    #[error("timed out after {waited:?} waiting for {what} (last seen: {last_seen:?})")]
    Timeout {
        what: String,
        waited: Duration,
        last_seen: Option<String>,
    },

    #[error("no 'label' or 'value' given")]
    MissingCriteria,

    #[error(transparent)]
    Scope(#[from] ScopeError),
}

impl DriverError {
    /// Whether a bounded top-level retry is expected to recover from this
    /// error. Stale references and internal sub-wait timeouts resolve
    /// themselves when the whole operation body re-runs against the live
    /// page; precondition and not-found errors never do.
    pub fn is_transient(&self) -> bool {
        match self {
            DriverError::Timeout { .. } | DriverError::SelectionNotConfirmed { .. } => true,
            DriverError::Scope(e) => e.is_stale(),
            _ => false,
        }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;
