//! warden-hub: Session state and operational resilience for one site.
//!
//! [`Hub`] is the explicit application state: enrolled identities, the
//! session, appliance states, the power/fault state machine, the audit
//! ledger, and the alert queue. [`spawn_engine`] moves it onto a dedicated
//! thread behind an async handle.

pub mod alert;
pub mod appliance;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod error;
pub mod hub;
pub mod ledger;
pub mod resilience;
pub mod scan;

pub use alert::{Alert, AlertLevel, AlertQueue};
pub use appliance::{Appliance, ApplianceDriver, ApplianceStates, DriverError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, HubConfig};
pub use engine::{spawn_engine, EngineError, EngineHandle};
pub use error::{AuthError, DeviceError, HubError};
pub use hub::{ControlOutcome, EnrollOutcome, Hub, StatusPanel};
pub use ledger::{EventKind, Ledger, LedgerEntry, LedgerError};
pub use resilience::{format_uptime, PowerState};
