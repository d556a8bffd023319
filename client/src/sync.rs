//! Client-side synchronizer.
//!
//! Local edits are applied to the grid immediately and queued until the
//! server log confirms them. Confirmed actions from the server arrive in log
//! order; each one either retires the head of the pending queue (our own
//! echo) or is applied and then overlaid with whatever is still pending.

use crate::transport::Channel;
use log::{debug, error, info, warn};
use shared::{
    Action, ActionBody, BoundsError, GridState, Identity, PuzzleGeometry, UNCONFIRMED_SEQ,
};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("action already carries actor {0:?}")]
    ActorAlreadySet(String),

    #[error("{0} cannot be submitted as an edit")]
    ProtocolAction(&'static str),

    #[error(transparent)]
    OutOfBounds(#[from] BoundsError),

    #[error("desynchronized: expected sequence {expected}, received {received}; must rejoin")]
    Desync { expected: i64, received: i64 },
}

impl SyncError {
    /// Fatal errors end the session; the client has to rejoin from scratch
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Desync { .. })
    }
}

/// What a frame from the server did to local state
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Undecodable or unusable frame
    Dropped,
    /// A peer's membership or cursor changed
    Presence(Action),
    /// Our own pending action came back from the log
    Confirmed(Action),
    /// Someone else's action (or an unmatched one of ours) was applied
    Applied(Action),
}

/// Where a peer's cursor is, if it has shown one yet
pub type PeerCursors = BTreeMap<String, Option<(usize, usize)>>;

pub struct Synchronizer<C: Channel> {
    room_id: String,
    identity: Identity,
    grid: GridState,
    pending: VecDeque<Action>,
    channel: C,
    last_confirmed_seq: i64,
    desync: Option<(i64, i64)>,
    peers: PeerCursors,
}

impl<C: Channel> Synchronizer<C> {
    pub fn new(
        room_id: impl Into<String>,
        geometry: &dyn PuzzleGeometry,
        identity: Identity,
        channel: C,
    ) -> Self {
        let room_id = room_id.into();
        Self {
            grid: GridState::new(room_id.clone(), geometry),
            room_id,
            identity,
            pending: VecDeque::new(),
            channel,
            last_confirmed_seq: UNCONFIRMED_SEQ,
            desync: None,
            peers: BTreeMap::new(),
        }
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn grid(&self) -> &GridState {
        &self.grid
    }

    /// Locally issued actions the log has not confirmed yet, oldest first
    pub fn pending(&self) -> &VecDeque<Action> {
        &self.pending
    }

    /// Highest sequence number applied so far, `-1` before the first one
    pub fn last_confirmed_seq(&self) -> i64 {
        self.last_confirmed_seq
    }

    pub fn peers(&self) -> &PeerCursors {
        &self.peers
    }

    pub fn is_desynced(&self) -> bool {
        self.desync.is_some()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Applies an edit from the UI optimistically and transmits it
    ///
    /// The UI submits anonymous actions; the identity is stamped here. A
    /// failed send is not retried now, the action is resent on the next
    /// [`Synchronizer::on_connected`].
    pub fn apply_from_ui(&mut self, action: Action) -> Result<(), SyncError> {
        self.check_in_sync()?;
        if let Some(actor) = &action.actor_id {
            return Err(SyncError::ActorAlreadySet(actor.clone()));
        }
        if matches!(
            action.body,
            ActionBody::JoinRoom { .. } | ActionBody::LeaveRoom {}
        ) {
            return Err(SyncError::ProtocolAction(action.kind()));
        }
        self.grid.check_bounds(&action)?;

        let action = action
            .with_actor(self.identity.private_id())
            .with_sequence(UNCONFIRMED_SEQ);

        if action.is_presence() {
            if !self.channel.send(&action.encode()) {
                debug!("Dropped {} while offline", action.kind());
            }
            return Ok(());
        }

        self.grid.apply(&action);
        let frame = action.encode();
        self.pending.push_back(action);
        if !self.channel.send(&frame) {
            debug!(
                "Channel not open, {} pending action(s) wait for reconnect",
                self.pending.len()
            );
        }
        Ok(())
    }

    /// Rejoins the room and resends every pending action in order. Returns
    /// how many pending actions went out.
    pub fn on_connected(&mut self) -> usize {
        if self.desync.is_some() {
            return 0;
        }
        let join = Action::join_room(self.room_id.clone(), self.last_confirmed_seq)
            .with_actor(self.identity.private_id());
        if !self.channel.send(&join.encode()) {
            warn!("Failed to send join for room {}", self.room_id);
            return 0;
        }

        let mut resent = 0;
        for action in &self.pending {
            if !self.channel.send(&action.encode()) {
                break;
            }
            resent += 1;
        }
        if resent < self.pending.len() {
            warn!(
                "Resent {} of {} pending actions before the channel failed",
                resent,
                self.pending.len()
            );
        }
        resent
    }

    /// Handles one frame from the server
    pub fn on_message(&mut self, raw: &str) -> Result<MessageOutcome, SyncError> {
        self.check_in_sync()?;
        let mut action = match Action::decode(raw) {
            Ok(action) => action,
            Err(e) => {
                warn!("Dropping undecodable frame: {}", e);
                return Ok(MessageOutcome::Dropped);
            }
        };

        if action.is_presence() {
            return Ok(self.apply_presence(action));
        }
        if !action.is_confirmed() {
            warn!("Dropping unconfirmed {} from server", action.kind());
            return Ok(MessageOutcome::Dropped);
        }

        let expected = self.last_confirmed_seq + 1;
        if action.sequence_number != expected {
            let received = action.sequence_number;
            error!(
                "Room {} desynchronized: expected sequence {}, received {}",
                self.room_id, expected, received
            );
            self.desync = Some((expected, received));
            return Err(SyncError::Desync { expected, received });
        }
        self.last_confirmed_seq = action.sequence_number;

        if let Err(e) = self.grid.check_bounds(&action) {
            warn!("Skipping confirmed action {}: {}", action.sequence_number, e);
            return Ok(MessageOutcome::Dropped);
        }

        if action.actor_id.as_deref() == Some(self.identity.public_id()) {
            action.actor_id = Some(self.identity.private_id().to_string());
            if self.pending.front() == Some(&action) {
                self.pending.pop_front();
                return Ok(MessageOutcome::Confirmed(action));
            }
        }

        let was_solved = self.grid.is_solved();
        self.grid.apply(&action);
        for pending in &self.pending {
            self.grid.apply(pending);
        }
        if self.grid.is_solved() && !was_solved {
            info!("Room {} solved", self.room_id);
        }
        Ok(MessageOutcome::Applied(action))
    }

    /// Leaves the room and forgets everything still pending
    pub fn leave(&mut self) -> bool {
        let leave = Action::leave_room().with_actor(self.identity.private_id());
        let sent = self.channel.send(&leave.encode());
        if !self.pending.is_empty() {
            info!("Discarding {} unconfirmed action(s)", self.pending.len());
        }
        self.pending.clear();
        self.peers.clear();
        sent
    }

    fn apply_presence(&mut self, action: Action) -> MessageOutcome {
        let Some(peer) = action.actor_id.clone() else {
            debug!("Ignoring anonymous {}", action.kind());
            return MessageOutcome::Dropped;
        };
        if peer == self.identity.public_id() {
            return MessageOutcome::Dropped;
        }
        match &action.body {
            ActionBody::SetCursor { row, col } => {
                self.peers.insert(peer, Some((*row, *col)));
            }
            ActionBody::JoinRoom { .. } => {
                self.peers.entry(peer).or_insert(None);
            }
            ActionBody::LeaveRoom {} => {
                self.peers.remove(&peer);
            }
            _ => {}
        }
        MessageOutcome::Presence(action)
    }

    fn check_in_sync(&self) -> Result<(), SyncError> {
        match self.desync {
            Some((expected, received)) => Err(SyncError::Desync { expected, received }),
            None => Ok(()),
        }
    }
}
