//! Power, battery, fault, and self-heal state.
//!
//! This module only tracks state and decides transitions. The hub applies
//! the side effects (alerts, ledger entries, appliance shutdowns) for each
//! transition it is handed back.
//!
//! Power is either `Normal` or `BatteryBackup { deadline }`, so a deadline
//! exists exactly when backup is active. Depletion is not a resting state:
//! [`Resilience::poll`] moves straight back to `Normal` once the deadline
//! has passed.

use chrono::{DateTime, Duration, Local};
use serde::Serialize;

/// Battery runtime after an outage.
pub const DEFAULT_BATTERY_SECS: u64 = 300;
/// Longest configurable battery runtime (one week).
pub const MAX_BATTERY_SECS: u64 = 7 * 24 * 60 * 60;
/// Device faults tolerated before an automatic self-heal.
pub const DEFAULT_FAULT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PowerState {
    Normal,
    BatteryBackup { deadline: DateTime<Local> },
}

/// Result of recording one device fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOutcome {
    /// Counter incremented; still below the threshold.
    Counted(u32),
    /// Threshold reached; the caller must run a self-heal.
    ThresholdReached(u32),
}

/// Result of a self-heal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfHealOutcome {
    pub cleared_faults: u32,
    /// True when the heal moved power from `Normal` into battery backup.
    pub entered_backup: bool,
}

#[derive(Debug, Clone)]
pub struct Resilience {
    start_time: DateTime<Local>,
    power: PowerState,
    fault_count: u32,
    last_self_heal: Option<DateTime<Local>>,
    battery_duration: Duration,
    fault_threshold: u32,
}

impl Resilience {
    /// `battery_secs` is clamped to [`MAX_BATTERY_SECS`].
    pub fn new(now: DateTime<Local>, battery_secs: u64, fault_threshold: u32) -> Self {
        Self {
            start_time: now,
            power: PowerState::Normal,
            fault_count: 0,
            last_self_heal: None,
            battery_duration: Duration::seconds(battery_secs.min(MAX_BATTERY_SECS) as i64),
            fault_threshold: fault_threshold.max(1),
        }
    }

    pub fn power(&self) -> PowerState {
        self.power
    }

    pub fn on_battery(&self) -> bool {
        matches!(self.power, PowerState::BatteryBackup { .. })
    }

    pub fn depletion_deadline(&self) -> Option<DateTime<Local>> {
        match self.power {
            PowerState::BatteryBackup { deadline } => Some(deadline),
            PowerState::Normal => None,
        }
    }

    pub fn fault_count(&self) -> u32 {
        self.fault_count
    }

    pub fn last_self_heal(&self) -> Option<DateTime<Local>> {
        self.last_self_heal
    }

    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Mains power lost. Returns false if already on battery.
    pub fn outage(&mut self, now: DateTime<Local>) -> bool {
        if self.on_battery() {
            return false;
        }
        self.power = PowerState::BatteryBackup {
            deadline: now + self.battery_duration,
        };
        true
    }

    /// Mains power restored. Returns false if not on battery.
    pub fn restore(&mut self) -> bool {
        if !self.on_battery() {
            return false;
        }
        self.power = PowerState::Normal;
        true
    }

    /// Deadline check. Returns true exactly once per depletion, when the
    /// battery deadline has been reached and power drops back to `Normal`.
    pub fn poll(&mut self, now: DateTime<Local>) -> bool {
        match self.power {
            PowerState::BatteryBackup { deadline } if now >= deadline => {
                self.power = PowerState::Normal;
                true
            }
            _ => false,
        }
    }

    pub fn record_fault(&mut self) -> FaultOutcome {
        self.fault_count = self.fault_count.saturating_add(1);
        if self.fault_count >= self.fault_threshold {
            FaultOutcome::ThresholdReached(self.fault_count)
        } else {
            FaultOutcome::Counted(self.fault_count)
        }
    }

    /// Reset faults and, when on mains, switch into battery backup as a
    /// protective state.
    pub fn self_heal(&mut self, now: DateTime<Local>) -> SelfHealOutcome {
        let cleared_faults = self.fault_count;
        self.fault_count = 0;
        self.last_self_heal = Some(now);
        let entered_backup = self.outage(now);
        SelfHealOutcome {
            cleared_faults,
            entered_backup,
        }
    }

    pub fn uptime(&self, now: DateTime<Local>) -> Duration {
        (now - self.start_time).max(Duration::zero())
    }
}

/// Format a duration as `Hh Mm Ss`.
pub fn format_uptime(d: Duration) -> String {
    let secs = d.num_seconds().max(0);
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> (Resilience, DateTime<Local>) {
        let now = Local::now();
        (Resilience::new(now, DEFAULT_BATTERY_SECS, DEFAULT_FAULT_THRESHOLD), now)
    }

    #[test]
    fn test_outage_sets_deadline() {
        let (mut r, now) = fresh();
        assert!(r.outage(now));
        assert!(r.on_battery());
        assert_eq!(r.depletion_deadline(), Some(now + Duration::seconds(300)));
    }

    #[test]
    fn test_huge_battery_duration_is_clamped() {
        let now = Local::now();
        let mut r = Resilience::new(now, 100_000_000_000_000_000, 3);
        assert!(r.outage(now));
        assert_eq!(
            r.depletion_deadline(),
            Some(now + Duration::seconds(MAX_BATTERY_SECS as i64))
        );
    }

    #[test]
    fn test_second_outage_keeps_original_deadline() {
        let (mut r, now) = fresh();
        r.outage(now);
        assert!(!r.outage(now + Duration::seconds(100)));
        assert_eq!(r.depletion_deadline(), Some(now + Duration::seconds(300)));
    }

    #[test]
    fn test_restore_clears_deadline() {
        let (mut r, now) = fresh();
        assert!(!r.restore());
        r.outage(now);
        assert!(r.restore());
        assert_eq!(r.power(), PowerState::Normal);
        assert_eq!(r.depletion_deadline(), None);
    }

    #[test]
    fn test_poll_before_and_after_deadline() {
        let (mut r, now) = fresh();
        r.outage(now);
        assert!(!r.poll(now + Duration::seconds(299)));
        assert!(r.on_battery());
        assert!(r.poll(now + Duration::seconds(300)));
        assert!(!r.on_battery());
        assert!(!r.poll(now + Duration::seconds(301)));
    }

    #[test]
    fn test_fault_threshold() {
        let (mut r, _) = fresh();
        assert_eq!(r.record_fault(), FaultOutcome::Counted(1));
        assert_eq!(r.record_fault(), FaultOutcome::Counted(2));
        assert_eq!(r.record_fault(), FaultOutcome::ThresholdReached(3));
    }

    #[test]
    fn test_self_heal_from_normal_enters_backup() {
        let (mut r, now) = fresh();
        r.record_fault();
        let out = r.self_heal(now);
        assert_eq!(out, SelfHealOutcome { cleared_faults: 1, entered_backup: true });
        assert_eq!(r.fault_count(), 0);
        assert_eq!(r.last_self_heal(), Some(now));
        assert!(r.depletion_deadline().is_some());
    }

    #[test]
    fn test_self_heal_on_battery_keeps_deadline() {
        let (mut r, now) = fresh();
        r.outage(now);
        let later = now + Duration::seconds(60);
        let out = r.self_heal(later);
        assert!(!out.entered_backup);
        assert_eq!(r.depletion_deadline(), Some(now + Duration::seconds(300)));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::seconds(3 * 3600 + 25 * 60 + 7)), "3h 25m 7s");
        assert_eq!(format_uptime(Duration::seconds(0)), "0h 0m 0s");
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let mut r = Resilience::new(Local::now(), 300, 0);
        assert_eq!(r.record_fault(), FaultOutcome::ThresholdReached(1));
    }
}
