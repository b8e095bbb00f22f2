//! Engine thread: owns the [`Hub`] and serves requests one at a time.
//!
//! Scans block on the camera and the encoder, so the hub lives on its own OS
//! thread. Async callers talk to it through a clonable [`EngineHandle`].

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::error::HubError;
use crate::hub::{EnrollOutcome, Hub};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Hub(#[from] HubError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

type HubJob = Box<dyn FnOnce(&mut Hub) + Send>;

/// Messages sent from callers to the engine thread.
enum EngineRequest {
    Enroll {
        label: String,
        admin_password: String,
        reply: oneshot::Sender<Result<EnrollOutcome, HubError>>,
    },
    AuthenticateFace {
        reply: oneshot::Sender<Result<String, HubError>>,
    },
    /// Any other hub operation. Short operations go through here so they
    /// are serialised with scans.
    Call(HubJob),
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Run an enrollment scan for `label`.
    pub async fn enroll(&self, label: &str, admin_password: &str) -> Result<EnrollOutcome, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Enroll {
                label: label.to_string(),
                admin_password: admin_password.to_string(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Run a face authentication scan.
    pub async fn authenticate_face(&self) -> Result<String, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::AuthenticateFace { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Run `f` against the hub on the engine thread and return its result.
    pub async fn call<R, F>(&self, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Hub) -> R + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: HubJob = Box::new(move |hub| {
            let _ = reply_tx.send(f(hub));
        });
        self.tx
            .send(EngineRequest::Call(job))
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Move `hub` onto a dedicated OS thread and return a handle to it.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_engine(mut hub: Hub) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(8);

    std::thread::Builder::new()
        .name("warden-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Enroll {
                        label,
                        admin_password,
                        reply,
                    } => {
                        let _ = reply.send(hub.enroll(&label, &admin_password));
                    }
                    EngineRequest::AuthenticateFace { reply } => {
                        let _ = reply.send(hub.authenticate_face());
                    }
                    EngineRequest::Call(job) => job(&mut hub),
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::HubConfig;
    use crate::error::AuthError;
    use std::sync::Arc;
    use warden_core::MissingEncoder;
    use warden_hw::V4lCamera;

    fn hub(dir: &std::path::Path) -> Hub {
        let config = HubConfig {
            store_path: dir.join("identities.json"),
            ledger_path: dir.join("access_log.csv"),
            admin_password: "pw".into(),
            pin: "123456".into(),
            ..HubConfig::default()
        };
        Hub::new(
            &config,
            Box::new(V4lCamera::new("/dev/warden-test-missing", 640, 480, 0)),
            Box::new(MissingEncoder),
            Arc::new(SystemClock),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_call_runs_on_engine_thread() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_engine(hub(dir.path())).unwrap();

        let user = handle.call(|hub| hub.authenticate_pin("123456")).await.unwrap().unwrap();
        assert_eq!(user, "Fallback User");

        let name = handle
            .call(|_| std::thread::current().name().map(str::to_string))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("warden-engine"));
    }

    #[tokio::test]
    async fn test_enroll_rejects_bad_password_through_handle() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_engine(hub(dir.path())).unwrap();
        let err = handle.enroll("alice", "nope").await.unwrap_err();
        assert!(matches!(err, EngineError::Hub(HubError::Auth(AuthError::AdminDenied))));
    }

    #[tokio::test]
    async fn test_missing_camera_counts_fault() {
        let dir = tempfile::tempdir().unwrap();
        let handle = spawn_engine(hub(dir.path())).unwrap();
        assert!(handle.authenticate_face().await.is_err());
        let faults = handle.call(|hub| hub.resilience().fault_count()).await.unwrap();
        assert_eq!(faults, 1);
    }
}
