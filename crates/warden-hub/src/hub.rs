//! The hub: one explicit value holding everything a session touches.
//!
//! Every operation reads the time from the injected [`Clock`], writes its
//! outcome to the ledger, and raises alerts where an operator must notice.
//! Nothing here panics or propagates IO failures from the ledger or store;
//! those are recorded and the hub carries on with a well-defined state.
//!
//! The battery deadline is polled at the start of every control-surface
//! operation: [`Hub::control`], [`Hub::logout`], [`Hub::set_simulation_mode`],
//! [`Hub::acknowledge_alert`], [`Hub::status`], [`Hub::power_outage`],
//! [`Hub::restore_power`] and [`Hub::self_heal`]. There is no timer.

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;
use warden_core::{EmbeddingStore, FaceEncoder, FirstMatchMatcher, Gallery, StoreError};
use warden_hw::{CaptureDevice, Frame, FrameSource, NoPreview, Overlay, PngPreview, PreviewSink};

use crate::alert::{Alert, AlertLevel, AlertQueue};
use crate::appliance::{Appliance, ApplianceDriver, ApplianceStates, SimulatedDriver, UnwiredDriver};
use crate::clock::Clock;
use crate::config::{ConfigError, HubConfig};
use crate::credentials::{Credentials, PIN_USER};
use crate::error::{AuthError, DeviceError, HubError};
use crate::ledger::{EventKind, Ledger, LedgerEntry, DEFAULT_USER};
use crate::resilience::{format_uptime, FaultOutcome, PowerState, Resilience, SelfHealOutcome};
use crate::scan::{self, DeviceFault, ScanObserver, ScanStop};

/// Ledger entries shown on the status panel.
const RECENT_EVENTS: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Registered {
        label: String,
        score: f32,
        /// False when the best face scored at or below the quality
        /// threshold. The embedding is stored either way.
        meets_quality_threshold: bool,
        frames: usize,
    },
    /// No face was found in any scanned frame; nothing was stored.
    NoUsableFace { frames: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Changed { appliance: Appliance, on: bool },
    /// The appliance was already in the requested state.
    Unchanged,
    /// Battery backup blocks this appliance.
    Refused { reason: &'static str },
}

/// Snapshot for the operator dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StatusPanel {
    pub uptime: String,
    pub power: PowerState,
    pub battery_remaining_secs: Option<i64>,
    pub fault_count: u32,
    pub last_self_heal: Option<DateTime<Local>>,
    pub simulation_mode: bool,
    pub session_user: Option<String>,
    pub appliances: ApplianceStates,
    pub enrolled: usize,
    pub recent_events: Vec<LedgerEntry>,
    pub pending_alerts: Vec<Alert>,
}

pub struct Hub {
    clock: Arc<dyn Clock>,
    camera: Box<dyn CaptureDevice>,
    encoder: Box<dyn FaceEncoder>,
    preview: Box<dyn PreviewSink>,
    matcher: FirstMatchMatcher,
    store: EmbeddingStore,
    gallery: Gallery,
    ledger: Ledger,
    alerts: AlertQueue,
    resilience: Resilience,
    appliances: ApplianceStates,
    simulated: SimulatedDriver,
    live: Box<dyn ApplianceDriver>,
    simulation_mode: bool,
    credentials: Credentials,
    session: Option<String>,
    enroll_frame_cap: usize,
    enroll_quality_threshold: f32,
    auth_frame_cap: usize,
}

/// Routes scan progress to the preview sink, and unknown faces to the
/// ledger and alert queue, while the scan holds the camera and encoder.
struct HubObserver<'a> {
    clock: &'a dyn Clock,
    ledger: &'a mut Ledger,
    alerts: &'a mut AlertQueue,
    preview: &'a mut dyn PreviewSink,
}

impl ScanObserver for HubObserver<'_> {
    fn frame(&mut self, frame: &Frame, overlays: &[Overlay]) {
        if let Err(e) = self.preview.show(frame, overlays) {
            tracing::warn!(error = %e, sequence = frame.sequence, "preview update failed");
        }
    }

    fn unknown_face(&mut self, frame_index: usize) {
        let now = self.clock.now();
        tracing::warn!(frame = frame_index, "unknown face in frame");
        self.alerts
            .raise(now, "Intruder alert! Unknown face detected", AlertLevel::Critical);
        self.ledger
            .record(now, EventKind::SecurityAlert, DEFAULT_USER, "Unauthorized face detected");
    }
}

impl Hub {
    /// Build a hub from validated configuration.
    ///
    /// A zero-byte or corrupt store yields an empty gallery and one
    /// `System Error` ledger entry.
    pub fn new(
        config: &HubConfig,
        camera: Box<dyn CaptureDevice>,
        encoder: Box<dyn FaceEncoder>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now();

        let mut ledger = Ledger::open(&config.ledger_path);
        let store = EmbeddingStore::new(&config.store_path);
        let gallery = match store.load() {
            Ok(gallery) => gallery,
            Err(e) => {
                tracing::error!(path = %store.path().display(), error = %e, "store load failed; starting empty");
                ledger.record(now, EventKind::SystemError, DEFAULT_USER, &format!("Database load failed: {e}"));
                Gallery::new()
            }
        };

        let preview: Box<dyn PreviewSink> = match &config.preview_path {
            Some(path) => Box::new(PngPreview::new(path)),
            None => Box::new(NoPreview),
        };

        tracing::info!(
            camera = %camera.describe(),
            enrolled = gallery.len(),
            store = %store.path().display(),
            ledger = %ledger.path().display(),
            simulation = config.simulation_mode,
            "hub ready"
        );

        Ok(Self {
            resilience: Resilience::new(now, config.battery_duration_secs, config.fault_threshold),
            clock,
            camera,
            encoder,
            preview,
            matcher: FirstMatchMatcher::new(config.match_tolerance),
            store,
            gallery,
            ledger,
            alerts: AlertQueue::new(),
            appliances: ApplianceStates::default(),
            simulated: SimulatedDriver,
            live: Box::new(UnwiredDriver),
            simulation_mode: config.simulation_mode,
            credentials: Credentials::new(
                config.admin_password.clone(),
                config.pin.clone(),
                config.rfid_cards.clone(),
            ),
            session: None,
            enroll_frame_cap: config.enroll_frame_cap,
            enroll_quality_threshold: config.enroll_quality_threshold,
            auth_frame_cap: config.auth_frame_cap,
        })
    }

    pub fn with_preview(mut self, preview: Box<dyn PreviewSink>) -> Self {
        self.preview = preview;
        self
    }

    /// Backend used when simulation mode is off.
    pub fn with_live_driver(mut self, driver: Box<dyn ApplianceDriver>) -> Self {
        self.live = driver;
        self
    }

    // --- ledger / alert helpers ---

    fn log(&mut self, event: EventKind, details: &str) {
        self.log_as(event, DEFAULT_USER, details);
    }

    fn log_as(&mut self, event: EventKind, user: &str, details: &str) {
        let now = self.clock.now();
        self.ledger.record(now, event, user, details);
    }

    fn alert(&mut self, message: &str, level: AlertLevel) -> Uuid {
        let now = self.clock.now();
        self.alerts.raise(now, message, level)
    }

    fn open_session(&mut self, user: &str) {
        if let Some(previous) = self.session.replace(user.to_string()) {
            tracing::info!(previous = %previous, user, "session replaced");
        } else {
            tracing::info!(user, "session opened");
        }
    }

    fn require_admin(&mut self, password: &str, failure_details: &str) -> Result<(), HubError> {
        if self.credentials.verify_admin(password) {
            return Ok(());
        }
        self.log(EventKind::SecurityAlert, failure_details);
        Err(AuthError::AdminDenied.into())
    }

    fn persist_gallery(&mut self) {
        if let Err(e) = self.store.save(&self.gallery) {
            tracing::error!(path = %self.store.path().display(), error = %e, "store save failed");
            self.log(EventKind::SystemError, &format!("Database save failed: {e}"));
        }
    }

    // --- camera / faults ---

    fn acquire_camera(&mut self) -> Result<Box<dyn FrameSource>, HubError> {
        match self.camera.acquire() {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::error!(camera = %self.camera.describe(), error = %e, "camera acquire failed");
                self.log(EventKind::SystemError, &format!("Camera access failed: {e}"));
                self.report_camera_failure();
                Err(DeviceError::Acquire(e).into())
            }
        }
    }

    fn device_fault(&mut self, fault: DeviceFault) {
        match fault {
            DeviceFault::Capture(e) => {
                tracing::error!(error = %e, "frame capture failed mid-scan");
                self.log(EventKind::SystemError, "Camera frame capture failed");
            }
            DeviceFault::Encoder(e) => {
                tracing::error!(error = %e, "face detection failed mid-scan");
                self.log(EventKind::SystemError, &format!("Face detection failed: {e}"));
            }
        }
        self.report_camera_failure();
    }

    /// Count one camera or detection failure. Reaching the fault threshold
    /// raises a critical alert and self-heals.
    pub fn report_camera_failure(&mut self) -> FaultOutcome {
        self.log(EventKind::SystemError, "Camera failure detected");
        let outcome = self.resilience.record_fault();
        tracing::warn!(faults = self.resilience.fault_count(), "device fault recorded");
        if let FaultOutcome::ThresholdReached(_) = outcome {
            self.alert("Critical hardware failure detected", AlertLevel::Critical);
            self.run_self_heal();
        }
        outcome
    }

    fn run_self_heal(&mut self) -> SelfHealOutcome {
        self.log(EventKind::SystemEvent, "Self-healing initiated");
        let now = self.clock.now();
        let outcome = self.resilience.self_heal(now);
        if outcome.entered_backup {
            self.alert("System recovered from fault condition", AlertLevel::Info);
        }
        self.log(EventKind::SystemEvent, "Self-healing completed successfully");
        tracing::info!(cleared = outcome.cleared_faults, entered_backup = outcome.entered_backup, "self-heal done");
        outcome
    }

    // --- biometric operations ---

    /// Scan frames for the best face and store it under `label`.
    pub fn enroll(&mut self, label: &str, admin_password: &str) -> Result<EnrollOutcome, HubError> {
        self.require_admin(admin_password, "Admin password verification failed")?;
        let label = label.trim();
        if label.is_empty() {
            return Err(StoreError::EmptyLabel.into());
        }

        let mut session = self.acquire_camera()?;
        let scan = {
            let mut observer = HubObserver {
                clock: self.clock.as_ref(),
                ledger: &mut self.ledger,
                alerts: &mut self.alerts,
                preview: self.preview.as_mut(),
            };
            scan::run_enroll(session.as_mut(), self.encoder.as_mut(), self.enroll_frame_cap, &mut observer)
        };
        drop(session);

        tracing::info!(label, frames = scan.frames, stop = ?scan.stop, "enroll scan finished");
        if let ScanStop::Device(fault) = scan.stop {
            self.device_fault(fault);
        }

        let Some(best) = scan.best else {
            self.log(EventKind::SystemEvent, "Face registration failed - low quality");
            return Ok(EnrollOutcome::NoUsableFace { frames: scan.frames });
        };

        self.gallery.upsert(label, best.embedding)?;
        self.persist_gallery();
        self.log(EventKind::AdminAction, &format!("Registered new user: {label}"));

        let meets_quality_threshold = best.score > self.enroll_quality_threshold;
        if !meets_quality_threshold {
            tracing::warn!(
                label,
                score = best.score,
                threshold = self.enroll_quality_threshold,
                "enrolled face is below the quality threshold"
            );
        }
        Ok(EnrollOutcome::Registered {
            label: label.to_string(),
            score: best.score,
            meets_quality_threshold,
            frames: scan.frames,
        })
    }

    /// Scan for a known face and open a session for it.
    pub fn authenticate_face(&mut self) -> Result<String, HubError> {
        let mut session = self.acquire_camera()?;
        let scan = {
            let mut observer = HubObserver {
                clock: self.clock.as_ref(),
                ledger: &mut self.ledger,
                alerts: &mut self.alerts,
                preview: self.preview.as_mut(),
            };
            scan::run_authenticate(
                session.as_mut(),
                self.encoder.as_mut(),
                &self.matcher,
                &self.gallery,
                self.auth_frame_cap,
                &mut observer,
            )
        };
        drop(session);

        tracing::info!(
            frames = scan.frames,
            unknown = scan.unknown_faces,
            stop = ?scan.stop,
            "auth scan finished"
        );
        if let ScanStop::Device(fault) = scan.stop {
            self.device_fault(fault);
        }

        match scan.matched {
            Some(user) => {
                self.open_session(&user);
                self.log_as(EventKind::Access, &user, &format!("Face authentication successful: {user}"));
                Ok(user)
            }
            None => {
                self.log(EventKind::Access, "Face authentication failed");
                self.alert("Authentication failed", AlertLevel::Warning);
                Err(AuthError::FaceNotRecognized.into())
            }
        }
    }

    // --- fallback credentials ---

    pub fn authenticate_pin(&mut self, pin: &str) -> Result<String, HubError> {
        if !self.credentials.verify_pin(pin) {
            self.log(EventKind::SecurityAlert, "Invalid PIN attempt");
            self.alert("Invalid PIN attempt detected", AlertLevel::Warning);
            return Err(AuthError::InvalidPin.into());
        }
        self.open_session(PIN_USER);
        self.log_as(EventKind::Access, PIN_USER, "PIN authentication successful");
        Ok(PIN_USER.to_string())
    }

    pub fn authenticate_rfid(&mut self, card_id: &str) -> Result<String, HubError> {
        let Some(user) = self.credentials.rfid_user(card_id.trim()).map(str::to_string) else {
            self.log(EventKind::SecurityAlert, "Invalid RFID card used");
            self.alert("Unauthorized RFID access attempt", AlertLevel::Warning);
            return Err(AuthError::UnknownCard.into());
        };
        self.open_session(&user);
        self.log_as(EventKind::Access, &user, &format!("RFID authentication successful: {user}"));
        Ok(user)
    }

    pub fn logout(&mut self) -> Result<(), HubError> {
        self.poll_battery();
        let user = self.session.take().ok_or(AuthError::NotAuthenticated)?;
        self.log_as(EventKind::Access, &user, "User logged out");
        tracing::info!(user = %user, "session closed");
        Ok(())
    }

    // --- appliances ---

    fn driver(&mut self) -> &mut dyn ApplianceDriver {
        if self.simulation_mode {
            &mut self.simulated
        } else {
            self.live.as_mut()
        }
    }

    /// Switch an appliance for the signed-in user, subject to the battery gate.
    pub fn control(&mut self, appliance: Appliance, on: bool) -> Result<ControlOutcome, HubError> {
        self.poll_battery();
        let user = self.session.clone().ok_or(AuthError::NotAuthenticated)?;

        if self.appliances.get(appliance) == on {
            return Ok(ControlOutcome::Unchanged);
        }
        if appliance.battery_gated() && self.resilience.on_battery() {
            let reason = appliance.refusal_reason();
            tracing::warn!(%appliance, on, reason, "control refused on battery");
            return Ok(ControlOutcome::Refused { reason });
        }

        self.driver().apply(appliance, on).map_err(DeviceError::from)?;
        self.appliances.set(appliance, on);
        self.log_as(EventKind::ApplianceControl, &user, &appliance.change_details(on));
        Ok(ControlOutcome::Changed { appliance, on })
    }

    /// Turn an appliance off regardless of the battery gate.
    fn force_off(&mut self, appliance: Appliance) {
        if let Err(e) = self.driver().apply(appliance, false) {
            tracing::error!(%appliance, error = %e, "driver refused forced shutdown; marking off");
        }
        self.appliances.set(appliance, false);
        self.log(EventKind::ApplianceControl, &appliance.change_details(false));
    }

    pub fn set_simulation_mode(&mut self, enabled: bool) {
        self.poll_battery();
        if self.simulation_mode != enabled {
            tracing::info!(enabled, "simulation mode changed");
            self.simulation_mode = enabled;
        }
    }

    // --- power / resilience ---

    /// Apply battery depletion if its deadline has passed. Returns true when
    /// the hub just shut down.
    pub fn poll_battery(&mut self) -> bool {
        let now = self.clock.now();
        if !self.resilience.poll(now) {
            return false;
        }
        self.alert("Battery depleted! System shutting down", AlertLevel::Critical);
        self.log(EventKind::SystemEvent, "Battery depleted - system shutdown");
        for appliance in Appliance::ALL {
            if self.appliances.get(appliance) {
                self.force_off(appliance);
            }
        }
        true
    }

    /// Mains power lost. Returns false if already on battery.
    pub fn power_outage(&mut self) -> bool {
        self.poll_battery();
        let now = self.clock.now();
        if !self.resilience.outage(now) {
            return false;
        }
        self.alert("Power outage detected! Switching to battery backup", AlertLevel::Critical);
        self.log(EventKind::SystemEvent, "Power failure - battery backup activated");

        let running: Vec<Appliance> = Appliance::ALL
            .into_iter()
            .filter(|a| a.non_essential() && self.appliances.get(*a))
            .collect();
        for appliance in &running {
            self.force_off(*appliance);
        }
        if !running.is_empty() {
            self.alert("Non-essential devices disabled to conserve power", AlertLevel::Warning);
        }
        true
    }

    /// Mains power back. Returns false if not on battery.
    pub fn restore_power(&mut self) -> bool {
        self.poll_battery();
        if !self.resilience.restore() {
            return false;
        }
        self.alert("Main power restored", AlertLevel::Info);
        self.log(EventKind::SystemEvent, "Power restored");
        true
    }

    pub fn self_heal(&mut self) -> SelfHealOutcome {
        self.poll_battery();
        self.run_self_heal()
    }

    // --- admin ---

    /// Remove every enrolled identity.
    pub fn clear_store(&mut self, admin_password: &str) -> Result<usize, HubError> {
        self.require_admin(admin_password, "Failed database clear attempt")?;
        let removed = self.gallery.len();
        self.gallery = Gallery::new();
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "store clear failed");
            self.log(EventKind::SystemError, &format!("Database save failed: {e}"));
        }
        self.log(EventKind::AdminAction, "Database cleared");
        Ok(removed)
    }

    /// Copy the ledger file to `dest`.
    pub fn export_ledger(&self, dest: &Path) -> Result<u64, HubError> {
        let bytes = self.ledger.export(dest)?;
        tracing::info!(dest = %dest.display(), bytes, "ledger exported");
        Ok(bytes)
    }

    pub fn acknowledge_alert(&mut self, id: Uuid) -> bool {
        self.poll_battery();
        self.alerts.acknowledge(id)
    }

    pub fn status(&mut self) -> StatusPanel {
        self.poll_battery();
        let now = self.clock.now();
        StatusPanel {
            uptime: format_uptime(self.resilience.uptime(now)),
            power: self.resilience.power(),
            battery_remaining_secs: self
                .resilience
                .depletion_deadline()
                .map(|d| (d - now).num_seconds().max(0)),
            fault_count: self.resilience.fault_count(),
            last_self_heal: self.resilience.last_self_heal(),
            simulation_mode: self.simulation_mode,
            session_user: self.session.clone(),
            appliances: self.appliances,
            enrolled: self.gallery.len(),
            recent_events: self.ledger.recent(RECENT_EVENTS).to_vec(),
            pending_alerts: self.alerts.unacknowledged().cloned().collect(),
        }
    }

    // --- read-only views ---

    pub fn enrolled_labels(&self) -> Vec<String> {
        self.gallery.labels().into_iter().map(str::to_string).collect()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn alerts(&self) -> &AlertQueue {
        &self.alerts
    }

    pub fn resilience(&self) -> &Resilience {
        &self.resilience
    }

    pub fn appliances(&self) -> ApplianceStates {
        self.appliances
    }

    pub fn session_user(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn simulation_mode(&self) -> bool {
        self.simulation_mode
    }
}
