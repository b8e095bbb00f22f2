use thiserror::Error;
use warden_core::StoreError;
use warden_hw::CameraError;

use crate::appliance::DriverError;
use crate::ledger::LedgerError;

/// A denied request. Each one has already been written to the ledger.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid PIN")]
    InvalidPin,
    #[error("unknown RFID card")]
    UnknownCard,
    #[error("admin password verification failed")]
    AdminDenied,
    #[error("face not recognized")]
    FaceNotRecognized,
    #[error("no authenticated session")]
    NotAuthenticated,
}

/// Camera, encoder, or appliance backend failure.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("camera access failed: {0}")]
    Acquire(#[source] CameraError),
    #[error("appliance driver: {0}")]
    Appliance(#[from] DriverError),
}

#[derive(Error, Debug)]
pub enum HubError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Device(#[from] DeviceError),
    /// Invalid identity data, such as an empty enrollment label.
    #[error("consistency: {0}")]
    Consistency(#[from] StoreError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

