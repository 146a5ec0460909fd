use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

/// Component lifecycle states
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

impl ShutdownReason {
    /// Process exit code for a shutdown with this reason
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Error(_) => 1,
            ShutdownReason::Signal(_) | ShutdownReason::UserRequest => 0,
        }
    }
}

/// One-shot trigger shared by signal handlers and callers requesting shutdown
#[derive(Clone)]
pub struct ShutdownTrigger {
    sender: Arc<Mutex<Option<oneshot::Sender<ShutdownReason>>>>,
}

impl ShutdownTrigger {
    pub(super) fn new(sender: oneshot::Sender<ShutdownReason>) -> Self {
        Self {
            sender: Arc::new(Mutex::new(Some(sender))),
        }
    }

    /// Fire the trigger; returns false if shutdown was already requested
    pub async fn trigger(&self, reason: ShutdownReason) -> bool {
        match self.sender.lock().await.take() {
            Some(sender) => sender.send(reason).is_ok(),
            None => false,
        }
    }
}
