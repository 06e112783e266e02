use thiserror::Error;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::{channel, Receiver, Sender};
use tokio::sync::watch;

use super::{command::Command, reading::Reading, EngineState};

/// Possible errors for an engine client
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("engine is not running")]
    ChannelClosed,
}

impl From<SendError<Command>> for ClientError {
    fn from(_: SendError<Command>) -> Self {
        Self::ChannelClosed
    }
}

/// A client for a running [super::Engine]. Clients are cheap to clone and
/// may be used from any number of tasks. The engine stops once it is told
/// to or when every client has been dropped.
#[derive(Debug, Clone)]
pub struct EngineClient {
    tx: Sender<Command>,
    state: watch::Receiver<EngineState>,
}

impl EngineClient {
    pub fn new(tx: Sender<Command>, state: watch::Receiver<EngineState>) -> Self {
        Self { tx, state }
    }

    async fn send(&self, cmd: Command) -> Result<(), ClientError> {
        self.tx.send(cmd).await?;
        Ok(())
    }

    async fn recv<T>(mut rx: Receiver<T>) -> Result<T, ClientError> {
        rx.recv().await.ok_or(ClientError::ChannelClosed)
    }

    /// Latest instantaneous reading. Waits for the first tick if nothing has
    /// been sampled yet.
    pub async fn current(&self) -> Result<Reading, ClientError> {
        let (tx, rx) = channel(1);
        self.send(Command::GetCurrent(tx)).await?;
        Self::recv(rx).await
    }

    /// Average of all ticks since the previous call. Every call starts a new
    /// averaging window.
    pub async fn average(&self) -> Result<Reading, ClientError> {
        let (tx, rx) = channel(1);
        self.send(Command::GetAverage(tx)).await?;
        Self::recv(rx).await
    }

    /// Oldest reading in the history. Waits until one is buffered.
    pub async fn next_buffered(&self) -> Result<Reading, ClientError> {
        let (tx, rx) = channel(1);
        self.send(Command::GetBuffered(tx)).await?;
        Self::recv(rx).await
    }

    /// Every reading in the history, oldest first. Leaves the history empty.
    pub async fn drain_history(&self) -> Result<Vec<Reading>, ClientError> {
        let (tx, rx) = channel(1);
        self.send(Command::DrainHistory(tx)).await?;
        Self::recv(rx).await
    }

    /// Ask the engine to stop. Stopping an engine that already stopped is a
    /// no-op.
    pub async fn stop(&self) -> Result<(), ClientError> {
        match self.send(Command::Stop).await {
            Err(ClientError::ChannelClosed) => {
                log::debug!("Engine already stopped");
                Ok(())
            }
            result => result,
        }
    }

    /// Current lifecycle state of the engine
    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Wait until the engine has fully stopped
    pub async fn stopped(&self) {
        let mut state = self.state.clone();
        if state.wait_for(|s| *s == EngineState::Stopped).await.is_err() {
            log::trace!("Engine state channel closed");
        }
    }
}
