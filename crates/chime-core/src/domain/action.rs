//! Task actions.

use std::fmt;
use std::sync::Arc;

/// Boxed error type returned by fallible actions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The callable attached to a task.
///
/// Two arms: `Void` actions cannot report failure — they are always
/// treated as completed after dispatch (panics are contained and logged
/// only) and cannot participate in dependency gating on either side;
/// `Fallible` actions return a `Result` whose `Err` marks the firing as
/// failed.
///
/// Actions are opaque to the scheduler: they are run on the blocking pool
/// and are not cancelled on timeout, only reported against.
#[derive(Clone)]
pub enum Action {
    Void(Arc<dyn Fn() + Send + Sync>),
    Fallible(Arc<dyn Fn() -> Result<(), BoxError> + Send + Sync>),
}

impl Action {
    pub fn void(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::Void(Arc::new(f))
    }

    pub fn fallible(f: impl Fn() -> Result<(), BoxError> + Send + Sync + 'static) -> Self {
        Self::Fallible(Arc::new(f))
    }

    pub fn is_fallible(&self) -> bool {
        matches!(self, Self::Fallible(_))
    }

    pub(crate) fn call(&self) -> Result<(), BoxError> {
        match self {
            Self::Void(f) => {
                f();
                Ok(())
            }
            Self::Fallible(f) => f(),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void(_) => f.write_str("Action::Void"),
            Self::Fallible(_) => f.write_str("Action::Fallible"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn void_actions_always_succeed() {
        let action = Action::void(|| {});
        assert!(!action.is_fallible());
        assert!(action.call().is_ok());
    }

    #[test]
    fn fallible_actions_propagate_errors() {
        let action = Action::fallible(|| Err("boom".into()));
        assert!(action.is_fallible());
        assert_eq!(action.call().unwrap_err().to_string(), "boom");
    }
}
