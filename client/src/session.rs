//! Event loop that drives one synchronizer from its transport and the UI.

use crate::sync::{MessageOutcome, SyncError, Synchronizer};
use crate::transport::{ChannelState, Transport, TransportEvent};
use log::{debug, error, info, warn};
use shared::Action;
use std::time::Duration;
use tokio::sync::mpsc;

/// Requests from the UI side
#[derive(Debug, Clone)]
pub enum Command {
    Submit(Action),
    Leave,
}

/// What the UI side gets told about
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Connected { resent: usize },
    Reconnecting { delay: Duration },
    Remote(MessageOutcome),
    Rejected(String),
    Solved,
    Disconnected,
}

pub struct Session {
    sync: Synchronizer<Transport>,
    updates: Option<mpsc::UnboundedSender<SessionUpdate>>,
}

impl Session {
    pub fn new(sync: Synchronizer<Transport>) -> Self {
        Self {
            sync,
            updates: None,
        }
    }

    /// Reports every update to `updates` while the session runs
    pub fn with_updates(mut self, updates: mpsc::UnboundedSender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn synchronizer(&self) -> &Synchronizer<Transport> {
        &self.sync
    }

    /// Runs until the UI leaves (or drops its command sender) and the
    /// channel has closed, or until the session desynchronizes.
    pub async fn run(
        &mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), SyncError> {
        self.sync.channel_mut().connect();
        let mut commands_open = true;

        loop {
            tokio::select! {
                event = self.sync.channel_mut().next_event() => {
                    let Some(event) = event else {
                        return Ok(());
                    };
                    if let Err(e) = self.handle_event(event) {
                        error!("Session for room {} failed: {}", self.sync.room_id(), e);
                        self.sync.channel_mut().close();
                        return Err(e);
                    }
                    if self.sync.channel().state() == ChannelState::Disconnected
                        && !commands_open
                    {
                        return Ok(());
                    }
                }
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Submit(action)) => {
                        let was_solved = self.sync.grid().is_solved();
                        if let Err(e) = self.sync.apply_from_ui(action) {
                            warn!("Rejected local action: {}", e);
                            self.notify(SessionUpdate::Rejected(e.to_string()));
                        } else if !was_solved && self.sync.grid().is_solved() {
                            self.notify(SessionUpdate::Solved);
                        }
                    }
                    Some(Command::Leave) | None => {
                        commands_open = false;
                        self.sync.leave();
                        self.sync.channel_mut().close();
                    }
                },
            }
        }
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<(), SyncError> {
        match event {
            TransportEvent::Connected => {
                let resent = self.sync.on_connected();
                info!(
                    "Joined room {} from sequence {} ({} pending resent)",
                    self.sync.room_id(),
                    self.sync.last_confirmed_seq(),
                    resent
                );
                self.notify(SessionUpdate::Connected { resent });
            }
            TransportEvent::Data(raw) => {
                let was_solved = self.sync.grid().is_solved();
                let outcome = self.sync.on_message(&raw)?;
                if outcome != MessageOutcome::Dropped {
                    self.notify(SessionUpdate::Remote(outcome));
                }
                if !was_solved && self.sync.grid().is_solved() {
                    self.notify(SessionUpdate::Solved);
                }
            }
            TransportEvent::Reconnecting { delay } => {
                debug!("Reconnecting in {:?}", delay);
                self.notify(SessionUpdate::Reconnecting { delay });
            }
            TransportEvent::Disconnected => {
                self.notify(SessionUpdate::Disconnected);
            }
        }
        Ok(())
    }

    fn notify(&self, update: SessionUpdate) {
        if let Some(updates) = &self.updates {
            let _ = updates.send(update);
        }
    }
}
