//! Injected log destination.
//!
//! The CPU and decoder emit `tracing` records. A [`LogSink`] decides where
//! they go: the process-global subscriber by default, or a specific
//! [`Dispatch`] handed in by the host (tests use this to capture output).

use tracing::Dispatch;

/// Where CPU and decoder records are sent.
#[derive(Clone, Default)]
pub struct LogSink {
    dispatch: Option<Dispatch>,
}

impl LogSink {
    /// Use whatever subscriber is installed globally.
    #[must_use]
    pub fn global() -> Self {
        Self::default()
    }

    /// Route records to `dispatch`.
    #[must_use]
    pub fn new(dispatch: Dispatch) -> Self {
        Self {
            dispatch: Some(dispatch),
        }
    }

    /// Run `f` with this sink as the current subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("injected", &self.dispatch.is_some())
            .finish()
    }
}
