//! Append-only audit ledger.
//!
//! File format: a `Timestamp,Event,User,Details` header followed by one record
//! per line. Records are split on the first three commas only, so the details
//! field may itself contain commas.
//!
//! Writes never fail the caller. IO errors are reported through `tracing` and
//! counted; the in-memory mirror is always updated.

use chrono::{DateTime, Local, NaiveDateTime, SubsecRound};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const LEDGER_HEADER: &str = "Timestamp,Event,User,Details";
pub const DEFAULT_USER: &str = "System";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("ledger file has no header")]
    MissingHeader,
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

/// Category of a ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    SystemError,
    SystemEvent,
    SecurityAlert,
    Access,
    AdminAction,
    ApplianceControl,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SystemError => "System Error",
            EventKind::SystemEvent => "System Event",
            EventKind::SecurityAlert => "Security Alert",
            EventKind::Access => "Access",
            EventKind::AdminAction => "Admin Action",
            EventKind::ApplianceControl => "Appliance Control",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "System Error" => Ok(EventKind::SystemError),
            "System Event" => Ok(EventKind::SystemEvent),
            "Security Alert" => Ok(EventKind::SecurityAlert),
            "Access" => Ok(EventKind::Access),
            "Admin Action" => Ok(EventKind::AdminAction),
            "Appliance Control" => Ok(EventKind::ApplianceControl),
            other => Err(format!("unknown event type {other:?}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub timestamp: NaiveDateTime,
    pub event: EventKind,
    pub user: String,
    pub details: String,
}

impl LedgerEntry {
    /// Build an entry, normalising fields so the record stays on one line and
    /// the first three fields stay comma-free.
    pub fn new(now: DateTime<Local>, event: EventKind, user: &str, details: &str) -> Self {
        Self {
            timestamp: now.naive_local().trunc_subsecs(0),
            event,
            user: one_line(user).replace(',', ";"),
            details: one_line(details),
        }
    }

    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.event,
            self.user,
            self.details
        )
    }

    /// Parse one record line. `line_no` is only used in error messages.
    pub fn parse_line(line: &str, line_no: usize) -> Result<Self, LedgerError> {
        let malformed = |reason: String| LedgerError::Malformed { line: line_no, reason };

        let mut fields = line.splitn(4, ',');
        let (Some(ts), Some(event), Some(user), Some(details)) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed("expected 4 fields".into()));
        };

        let timestamp = NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT)
            .map_err(|e| malformed(format!("timestamp {ts:?}: {e}")))?;
        let event = event.parse::<EventKind>().map_err(malformed)?;

        Ok(Self {
            timestamp,
            event,
            user: user.to_string(),
            details: details.to_string(),
        })
    }
}

fn one_line(s: &str) -> String {
    s.replace(['\r', '\n'], " ")
}

/// Durable ledger plus the in-memory list of entries written this session.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: Vec<LedgerEntry>,
    write_failures: u64,
}

impl Ledger {
    /// Open (or initialise) the ledger file at `path`.
    ///
    /// A missing or empty file gets the header line. Failure to create the
    /// file is logged; later appends will keep retrying.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let needs_header = std::fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);

        let mut ledger = Self {
            path,
            entries: Vec::new(),
            write_failures: 0,
        };

        if needs_header {
            match ledger.append_raw(LEDGER_HEADER) {
                Ok(()) => tracing::info!(path = %ledger.path.display(), "ledger initialised"),
                Err(e) => {
                    ledger.write_failures += 1;
                    tracing::error!(path = %ledger.path.display(), error = %e, "failed to initialise ledger");
                }
            }
        }
        ledger
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an entry to memory and to disk. Never fails.
    pub fn record(&mut self, now: DateTime<Local>, event: EventKind, user: &str, details: &str) -> &LedgerEntry {
        let entry = LedgerEntry::new(now, event, user, details);
        tracing::debug!(event = %entry.event, user = %entry.user, details = %entry.details, "ledger");

        if let Err(e) = self.append_raw(&entry.to_line()) {
            self.write_failures += 1;
            tracing::error!(path = %self.path.display(), error = %e, "error saving ledger entry");
        }
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    fn append_raw(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }

    /// Entries written this session, oldest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// The last `n` entries written this session, oldest first.
    pub fn recent(&self, n: usize) -> &[LedgerEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures
    }

    /// Copy the durable ledger to `dest`, returning the number of bytes copied.
    pub fn export(&self, dest: &Path) -> Result<u64, LedgerError> {
        Ok(std::fs::copy(&self.path, dest)?)
    }

    /// Read back every record in a ledger file.
    pub fn read_file(path: &Path) -> Result<Vec<LedgerEntry>, LedgerError> {
        let content = std::fs::read_to_string(path)?;
        let mut lines = content.lines();
        match lines.next() {
            Some(LEDGER_HEADER) => {}
            _ => return Err(LedgerError::MissingHeader),
        }
        lines
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
            .map(|(i, l)| LedgerEntry::parse_line(l, i + 2))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_round_trip_preserves_commas_in_details() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("access_log.csv");
        let mut ledger = Ledger::open(&path);
        let now = Local::now();

        let written: Vec<LedgerEntry> = vec![
            ledger.record(now, EventKind::Access, "System", "PIN authentication successful").clone(),
            ledger.record(now, EventKind::SystemError, "System", "Database load failed: a, b, and c").clone(),
            ledger.record(now, EventKind::ApplianceControl, "alice", "Light turned ON").clone(),
        ];

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), written.len() + 1);
        assert_eq!(content.lines().next(), Some(LEDGER_HEADER));

        let parsed = Ledger::read_file(&path).unwrap();
        assert_eq!(parsed, written);
        assert_eq!(parsed[1].details, "Database load failed: a, b, and c");
    }

    #[test]
    fn test_reopen_does_not_duplicate_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        Ledger::open(&path).record(Local::now(), EventKind::SystemEvent, DEFAULT_USER, "one");
        Ledger::open(&path).record(Local::now(), EventKind::SystemEvent, DEFAULT_USER, "two");

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(LEDGER_HEADER).count(), 1);
        assert_eq!(Ledger::read_file(&path).unwrap().len(), 2);
    }

    #[test]
    fn test_user_commas_and_newlines_are_normalised() {
        let e = LedgerEntry::new(Local::now(), EventKind::Access, "Smith, J", "line one\nline two");
        assert_eq!(e.user, "Smith; J");
        assert_eq!(e.details, "line one line two");
        let back = LedgerEntry::parse_line(&e.to_line(), 2).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn test_parse_rejects_short_line() {
        assert!(matches!(
            LedgerEntry::parse_line("2024-01-01 00:00:00,Access", 5),
            Err(LedgerError::Malformed { line: 5, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_event() {
        assert!(LedgerEntry::parse_line("2024-01-01 00:00:00,Party,System,x", 2).is_err());
    }

    #[test]
    fn test_unwritable_path_does_not_fail_caller() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for appending.
        let mut ledger = Ledger::open(dir.path());
        ledger.record(Local::now(), EventKind::SystemEvent, DEFAULT_USER, "still recorded");
        assert_eq!(ledger.entries().len(), 1);
        assert!(ledger.write_failures() >= 1);
    }

    #[test]
    fn test_recent_returns_tail() {
        let dir = tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path().join("log.csv"));
        for i in 0..15 {
            ledger.record(Local::now(), EventKind::SystemEvent, DEFAULT_USER, &format!("event {i}"));
        }
        let recent = ledger.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].details, "event 5");
        assert_eq!(recent[9].details, "event 14");
    }

    #[test]
    fn test_export_copies_file() {
        let dir = tempdir().unwrap();
        let mut ledger = Ledger::open(dir.path().join("log.csv"));
        ledger.record(Local::now(), EventKind::Access, DEFAULT_USER, "User logged out");
        let dest = dir.path().join("security_logs.csv");
        let bytes = ledger.export(&dest).unwrap();
        assert!(bytes > 0);
        assert_eq!(Ledger::read_file(&dest).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_header_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.csv");
        std::fs::write(&path, "2024-01-01 00:00:00,Access,System,x\n").unwrap();
        assert!(matches!(Ledger::read_file(&path), Err(LedgerError::MissingHeader)));
    }
}
