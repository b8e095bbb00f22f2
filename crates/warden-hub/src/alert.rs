//! Transient operator alerts.
//!
//! Alerts live for the session only. They are never removed; acknowledging
//! one flips its flag and leaves every other alert untouched.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Critical => "critical",
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: Uuid,
    pub raised_at: DateTime<Local>,
    pub message: String,
    pub level: AlertLevel,
    pub acknowledged: bool,
}

impl Alert {
    /// Wall-clock time of day the alert was raised (`HH:MM:SS`).
    pub fn time_label(&self) -> String {
        self.raised_at.format("%H:%M:%S").to_string()
    }
}

#[derive(Debug, Default)]
pub struct AlertQueue {
    alerts: Vec<Alert>,
}

impl AlertQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise a new unacknowledged alert and return its id.
    pub fn raise(&mut self, now: DateTime<Local>, message: impl Into<String>, level: AlertLevel) -> Uuid {
        let message = message.into();
        match level {
            AlertLevel::Info => tracing::info!(%level, "ALERT: {message}"),
            AlertLevel::Warning => tracing::warn!(%level, "ALERT: {message}"),
            AlertLevel::Critical => tracing::error!(%level, "ALERT: {message}"),
        }
        let id = Uuid::new_v4();
        self.alerts.push(Alert {
            id,
            raised_at: now,
            message,
            level,
            acknowledged: false,
        });
        id
    }

    /// Mark one alert acknowledged. Returns false if the id is unknown.
    pub fn acknowledge(&mut self, id: Uuid) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    pub fn unacknowledged(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged)
    }

    pub fn all(&self) -> &[Alert] {
        &self.alerts
    }

    pub fn last(&self) -> Option<&Alert> {
        self.alerts.last()
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}
