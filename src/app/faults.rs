//! Process-level faults raised by background tasks.
//!
//! A fault normally shuts the process down gracefully. Faults whose code is
//! on the configured ignore list are logged and dropped instead.

use std::collections::HashSet;
use tokio::sync::mpsc;
use tracing::{error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessFault {
    pub component: String,
    pub code: Option<String>,
    pub message: String,
}

impl ProcessFault {
    pub fn new(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl std::fmt::Display for ProcessFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} [{}]: {}", self.component, code, self.message),
            None => write!(f, "{}: {}", self.component, self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    Ignore,
    Shutdown,
}

#[derive(Debug, Clone, Default)]
pub struct FaultPolicy {
    ignored_codes: HashSet<String>,
}

impl FaultPolicy {
    pub fn new(ignored_codes: impl IntoIterator<Item = String>) -> Self {
        Self {
            ignored_codes: ignored_codes.into_iter().collect(),
        }
    }

    pub fn evaluate(&self, fault: &ProcessFault) -> FaultAction {
        let ignored = fault
            .code
            .as_ref()
            .map(|code| self.ignored_codes.contains(code))
            .unwrap_or(false);

        if ignored {
            warn!("Ignoring known fault {}", fault);
            FaultAction::Ignore
        } else {
            error!("Process fault {}", fault);
            FaultAction::Shutdown
        }
    }
}

/// Cloneable handle background tasks use to report faults
#[derive(Debug, Clone)]
pub struct FaultReporter {
    sender: mpsc::UnboundedSender<ProcessFault>,
}

impl FaultReporter {
    pub(super) fn channel() -> (Self, mpsc::UnboundedReceiver<ProcessFault>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }

    pub fn report(&self, fault: ProcessFault) {
        if self.sender.send(fault).is_err() {
            warn!("Fault reported after the orchestrator stopped listening");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ignore_list() {
        let policy = FaultPolicy::new(vec!["slack_webapi_platform_error".to_string()]);

        let slack =
            ProcessFault::new("slack", "invalid_auth").with_code("slack_webapi_platform_error");
        assert_eq!(policy.evaluate(&slack), FaultAction::Ignore);

        let other = ProcessFault::new("server", "listener closed").with_code("server_error");
        assert_eq!(policy.evaluate(&other), FaultAction::Shutdown);

        let uncoded = ProcessFault::new("feed", "task panicked");
        assert_eq!(policy.evaluate(&uncoded), FaultAction::Shutdown);
    }

    #[test]
    fn test_fault_display() {
        let fault = ProcessFault::new("server", "bind failed").with_code("server_error");
        assert_eq!(fault.to_string(), "server [server_error]: bind failed");
    }

    #[tokio::test]
    async fn test_reporter_delivers() {
        let (reporter, mut receiver) = FaultReporter::channel();
        reporter.clone().report(ProcessFault::new("feed", "boom"));
        assert_eq!(receiver.recv().await.unwrap().message, "boom");
    }
}
