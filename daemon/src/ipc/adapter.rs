//! Session adapter backed by subscribed IPC clients
//!
//! The native recognizer lives in the speech host process. Session
//! commands are pushed to every subscriber; the host answers with
//! `adapter_event` requests tagged with the generation it was given.

use tokio::sync::broadcast;
use tracing::debug;

use super::protocol::{Notification, SessionCommand};
use crate::adapter::{SessionAdapter, SessionOptions};
use crate::error::EngineError;

pub struct IpcSessionAdapter {
    notify_tx: broadcast::Sender<Notification>,
}

impl IpcSessionAdapter {
    pub fn new(notify_tx: broadcast::Sender<Notification>) -> Self {
        Self { notify_tx }
    }

    fn push(&self, command: SessionCommand) -> Result<usize, EngineError> {
        debug!(?command, "sending session command");
        self.notify_tx
            .send(Notification::SessionCommand(command))
            .map_err(|_| EngineError::Adapter("no speech host connected".to_string()))
    }
}

impl SessionAdapter for IpcSessionAdapter {
    fn start_session(
        &self,
        generation: u64,
        language_tag: &str,
        options: &SessionOptions,
    ) -> Result<(), EngineError> {
        let receivers = self.push(SessionCommand::StartSession {
            generation,
            language_tag: language_tag.to_string(),
            options: *options,
        })?;
        debug!(generation, receivers, "session start pushed");
        Ok(())
    }

    fn stop_session(&self) {
        let _ = self.push(SessionCommand::StopSession);
    }

    fn destroy(&self) {
        let _ = self.push(SessionCommand::Destroy);
    }
}
