//! Classifying and logging call failures.
//!
//! The reporter decides what happens to an error that escaped the hook
//! chain, in this order:
//!
//! 1. the redirect signal (`FOUND`) is ignored,
//! 2. with `on_api_error.throw` set, the error is handed back to the caller,
//! 3. a custom callback, when installed, receives the error and nothing else
//!    happens,
//! 4. otherwise the error is logged, unless logging is disabled.
//!
//! Storage schema mismatches are recognized either structurally, through
//! [`AdapterError::SchemaMismatch`] anywhere in the cause chain, or by the
//! message mentioning a missing table, relation or column.

use std::fmt;
use std::sync::Arc;

use pylon_core::{AdapterError, ApiStatus, CallError};

use crate::global::GlobalContext;

/// Custom error callback installed through the builder.
pub type OnApiError = Arc<dyn Fn(&CallError, &GlobalContext) + Send + Sync>;

const SCHEMA_HINTS: [&str; 5] = ["no column", "column", "relation", "table", "does not exist"];

/// What the reporter did with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The redirect signal; not an error.
    Ignored,
    /// The embedder asked for errors to be rethrown.
    Propagate,
    /// A custom callback handled it.
    Delegated,
    /// Logged at error level.
    Logged(ErrorKind),
    /// Neither propagated nor logged.
    Silent,
}

/// Classification used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The storage schema does not match what the code expects.
    SchemaMismatch,
    /// A typed `INTERNAL_SERVER_ERROR`.
    Internal,
    /// Any other typed error.
    Api,
    /// An unclassified failure.
    Unhandled,
}

/// Applies the error policy of a pipeline.
#[derive(Clone)]
pub struct ErrorReporter {
    global: Arc<GlobalContext>,
    callback: Option<OnApiError>,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("throw", &self.global.config().on_api_error.throw)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl ErrorReporter {
    /// Creates a reporter over the global context.
    pub fn new(global: Arc<GlobalContext>, callback: Option<OnApiError>) -> Self {
        Self { global, callback }
    }

    /// Classifies `error`, logging it when the policy says so.
    pub fn report(&self, error: &CallError) -> ErrorDisposition {
        if error.is_redirect() {
            return ErrorDisposition::Ignored;
        }
        if self.global.config().on_api_error.throw {
            return ErrorDisposition::Propagate;
        }
        if let Some(callback) = &self.callback {
            callback(error, &self.global);
            return ErrorDisposition::Delegated;
        }

        let logger = self.global.logger();
        if logger.is_disabled() {
            return ErrorDisposition::Silent;
        }

        let message = error.message();
        if is_schema_mismatch(error, &message) {
            logger.error(&message);
            return ErrorDisposition::Logged(ErrorKind::SchemaMismatch);
        }

        match error {
            CallError::Api(api) if api.status() == ApiStatus::InternalServerError => {
                logger.error_with(api.status(), &message);
                ErrorDisposition::Logged(ErrorKind::Internal)
            }
            CallError::Api(api) => {
                if logger.reports_api_errors() {
                    logger.error_with(api.status(), &message);
                    ErrorDisposition::Logged(ErrorKind::Api)
                } else {
                    ErrorDisposition::Silent
                }
            }
            CallError::Unhandled(err) => {
                logger.error_with(error_name(err), &message);
                ErrorDisposition::Logged(ErrorKind::Unhandled)
            }
        }
    }
}

fn is_schema_mismatch(error: &CallError, message: &str) -> bool {
    if let CallError::Unhandled(err) = error {
        let structured = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<AdapterError>())
            .any(AdapterError::is_schema_mismatch);
        if structured {
            return true;
        }
    }
    SCHEMA_HINTS.iter().any(|hint| message.contains(hint))
}

fn error_name(err: &anyhow::Error) -> &'static str {
    let root = err.root_cause();
    if root.is::<AdapterError>() {
        "AdapterError"
    } else if root.is::<serde_json::Error>() {
        "JsonError"
    } else if root.is::<std::io::Error>() {
        "IoError"
    } else {
        "Error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::global::test_context;
    use pylon_core::ApiError;
    use pylon_telemetry::{LogLevel, Logger};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn reporter(configure: impl FnOnce(&mut GlobalContext)) -> ErrorReporter {
        let mut global = test_context();
        configure(&mut global);
        ErrorReporter::new(Arc::new(global), None)
    }

    #[test]
    fn test_redirect_ignored_even_when_throwing() {
        let reporter = reporter(|g| g.config.on_api_error.throw = true);
        let err = CallError::from(ApiError::found());
        assert_eq!(reporter.report(&err), ErrorDisposition::Ignored);
    }

    #[test]
    fn test_throw_propagates() {
        let reporter = reporter(|g| g.config.on_api_error.throw = true);
        let err = CallError::from(ApiError::bad_request("nope"));
        assert_eq!(reporter.report(&err), ErrorDisposition::Propagate);
    }

    #[test]
    fn test_callback_receives_error() {
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let reporter = ErrorReporter::new(
            Arc::new(test_context()),
            Some(Arc::new(move |err: &CallError, _global: &GlobalContext| {
                assert_eq!(err.message(), "gone");
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        let err = CallError::from(ApiError::not_found("gone"));
        assert_eq!(reporter.report(&err), ErrorDisposition::Delegated);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_disabled_logger_is_silent() {
        let reporter = reporter(|g| g.logger = Logger::disabled());
        let err = CallError::from(ApiError::internal("boom"));
        assert_eq!(reporter.report(&err), ErrorDisposition::Silent);
    }

    #[test]
    fn test_schema_mismatch_structured_and_heuristic() {
        let reporter = reporter(|_| {});
        let structured = CallError::from(AdapterError::schema_mismatch("user", "missing"));
        assert_eq!(
            reporter.report(&structured),
            ErrorDisposition::Logged(ErrorKind::SchemaMismatch)
        );

        let heuristic = CallError::from(anyhow::anyhow!("no column named email"));
        assert_eq!(
            reporter.report(&heuristic),
            ErrorDisposition::Logged(ErrorKind::SchemaMismatch)
        );
    }

    #[test]
    fn test_api_errors_gated_by_level() {
        let unset = reporter(|_| {});
        let err = CallError::from(ApiError::unauthorized("who are you"));
        assert_eq!(unset.report(&err), ErrorDisposition::Silent);

        let info = reporter(|g| g.logger = Logger::new(Some(LogLevel::Info), false));
        assert_eq!(info.report(&err), ErrorDisposition::Silent);

        let warn = reporter(|g| g.logger = Logger::new(Some(LogLevel::Warn), false));
        assert_eq!(warn.report(&err), ErrorDisposition::Logged(ErrorKind::Api));
    }

    #[test]
    fn test_internal_always_logged() {
        let reporter = reporter(|g| g.logger = Logger::new(Some(LogLevel::Info), false));
        let err = CallError::from(ApiError::internal("boom"));
        assert_eq!(reporter.report(&err), ErrorDisposition::Logged(ErrorKind::Internal));
    }

    #[test]
    fn test_unhandled_logged_with_name() {
        let reporter = reporter(|_| {});
        let err = CallError::from(anyhow::anyhow!("socket closed"));
        assert_eq!(reporter.report(&err), ErrorDisposition::Logged(ErrorKind::Unhandled));

        let backend = anyhow::Error::new(AdapterError::Backend("timeout".into()));
        assert_eq!(error_name(&backend), "AdapterError");
        assert_eq!(error_name(&anyhow::anyhow!("plain")), "Error");
    }
}
