//! Fire-and-forget error reporting to the service's error log.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::api::{ErrorReport, PracticeApi};

/// Sends unexpected failures to the practice service.
///
/// Delivery is best effort: a failed delivery is logged at debug level and
/// never surfaces to the caller.
#[derive(Clone)]
pub struct ErrorReporter {
    api: Option<Arc<dyn PracticeApi>>,
}

impl std::fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ErrorReporter {
    /// Creates a reporter. A disabled reporter drops every report.
    #[must_use]
    pub fn new(api: Arc<dyn PracticeApi>, enabled: bool) -> Self {
        Self {
            api: enabled.then_some(api),
        }
    }

    /// Creates a reporter that drops every report.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { api: None }
    }

    /// Returns `true` if reports are delivered.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.api.is_some()
    }

    /// Reports an error in the background.
    ///
    /// `context` describes where in the session the error happened. Returns the
    /// delivery task, or `None` if the reporter is disabled or no runtime is
    /// available.
    pub fn notify(
        &self,
        error: &(dyn std::error::Error + 'static),
        context: impl Into<String>,
    ) -> Option<JoinHandle<()>> {
        let api = Arc::clone(self.api.as_ref()?);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no runtime available, error report dropped");
            return None;
        };

        let report = ErrorReport {
            error: error.to_string(),
            stack: error_chain(error),
            component_stack: Some(context.into()),
        };

        Some(runtime.spawn(async move {
            if let Err(e) = api.report_error(&report).await {
                debug!(error = %e, "error report not delivered");
            }
        }))
    }
}

/// Joins the sources of an error, outermost first.
fn error_chain(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    (!causes.is_empty()).then(|| causes.join("\ncaused by: "))
}
