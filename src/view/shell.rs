//! Contract with the navigation shell: requests flowing in, events flowing out.

use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "{}", "info".blue()),
            Severity::Warning => write!(f, "{}", "warning".yellow()),
            Severity::Error => write!(f, "{}", "error".red().bold()),
        }
    }
}

/// Notifications the coordinator emits for the status bar and header
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ShellEvent {
    NavigationChanged {
        view: String,
        at: DateTime<Utc>,
    },
    StatusChanged {
        message: String,
        severity: Severity,
        at: DateTime<Utc>,
    },
}

impl ShellEvent {
    pub fn severity(&self) -> Option<Severity> {
        match self {
            ShellEvent::StatusChanged { severity, .. } => Some(*severity),
            ShellEvent::NavigationChanged { .. } => None,
        }
    }
}

impl fmt::Display for ShellEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShellEvent::NavigationChanged { view, at } => {
                write!(f, "[{}] now showing {}", at.format("%H:%M:%S"), view.bold())
            }
            ShellEvent::StatusChanged { message, severity, at } => {
                write!(f, "[{}] {}: {}", at.format("%H:%M:%S"), severity, message)
            }
        }
    }
}

/// A navigation request from the shell
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationRequest {
    pub view: String,
    pub parameter: Value,
}

impl NavigationRequest {
    pub fn new(view: impl Into<String>) -> Self {
        Self { view: view.into(), parameter: Value::Null }
    }

    pub fn with_parameter(mut self, parameter: Value) -> Self {
        self.parameter = parameter;
        self
    }
}

/// Sends shell events; a reporter without a channel only logs
#[derive(Debug, Clone, Default)]
pub struct StatusReporter {
    tx: Option<mpsc::UnboundedSender<ShellEvent>>,
}

impl StatusReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ShellEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn status(&self, message: impl Into<String>, severity: Severity) {
        self.send(ShellEvent::StatusChanged {
            message: message.into(),
            severity,
            at: Utc::now(),
        });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.status(message, Severity::Info);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.status(message, Severity::Warning);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.status(message, Severity::Error);
    }

    pub fn navigation_changed(&self, view: impl Into<String>) {
        self.send(ShellEvent::NavigationChanged { view: view.into(), at: Utc::now() });
    }

    fn send(&self, event: ShellEvent) {
        if let Some(tx) = &self.tx {
            // The shell going away is not our failure
            if tx.send(event).is_err() {
                log::debug!("Shell event receiver dropped");
            }
        }
    }
}
