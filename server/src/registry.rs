//! Room membership and action routing for the authoritative server
//!
//! This module decides what happens to every frame a connection sends:
//! - `joinRoom` registers the connection, streams the room's backlog and the
//!   presence of everyone already there
//! - grid edits are validated, appended to the room's log and broadcast to
//!   every member, the sender included
//! - cursor updates are relayed to the other members and remembered for late
//!   joiners
//! - `leaveRoom` and dropped connections are announced to whoever remains
//!
//! The registry performs no network I/O itself. Every handler returns the
//! deliveries the caller has to make, which keeps the routing rules testable
//! without sockets.

use crate::action_log::ActionLog;
use crate::error::ServerError;
use crate::store::KvStore;
use log::{debug, info, warn};
use shared::identity::public_id_for;
use shared::{is_valid_room_id, Action, ActionBody, GridState, MarchingBands, UNCONFIRMED_SEQ};
use std::collections::{BTreeSet, HashMap};

/// Server-assigned id of one live connection
pub type ConnectionId = u64;

/// One action to be written to one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub action: Action,
}

impl Delivery {
    fn new(to: ConnectionId, action: Action) -> Self {
        Self { to, action }
    }

    /// The text frame to send
    pub fn frame(&self) -> String {
        self.action.encode()
    }
}

/// What the server knows about a joined connection
#[derive(Debug, Clone)]
struct Membership {
    room_id: String,
    /// Public id derived from the private id the connection joined with
    public_id: String,
    /// Last cursor position the member reported
    cursor: Option<(usize, usize)>,
}

/// A room with at least one member
#[derive(Debug)]
struct Room {
    /// Server copy of the grid, advanced by every confirmed action
    grid: GridState,
    members: BTreeSet<ConnectionId>,
}

/// Maps live connections to rooms and applies the routing rules
///
/// Rooms are loaded lazily on first join by replaying their log and dropped
/// again when their last member leaves.
pub struct RoomRegistry<S: KvStore> {
    log: ActionLog<S>,
    default_grid_size: usize,
    rooms: HashMap<String, Room>,
    memberships: HashMap<ConnectionId, Membership>,
}

impl<S: KvStore> RoomRegistry<S> {
    /// Creates an empty registry
    ///
    /// `default_grid_size` is recorded for rooms that have never been seen
    /// before; existing rooms keep the size they were created with.
    pub fn new(log: ActionLog<S>, default_grid_size: usize) -> Self {
        Self {
            log,
            default_grid_size,
            rooms: HashMap::new(),
            memberships: HashMap::new(),
        }
    }

    pub fn log(&self) -> &ActionLog<S> {
        &self.log
    }

    /// The server's grid for a loaded room
    pub fn room_grid(&self, room_id: &str) -> Option<&GridState> {
        self.rooms.get(room_id).map(|room| &room.grid)
    }

    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |room| room.members.len())
    }

    /// Room the connection currently belongs to
    pub fn room_of(&self, conn: ConnectionId) -> Option<&str> {
        self.memberships.get(&conn).map(|m| m.room_id.as_str())
    }

    /// Handles one text frame from a connection
    ///
    /// Frames that fail to decode, carry no valid identity, address a room
    /// the connection has not joined or fall outside the grid are dropped and
    /// logged; only store failures are reported as errors.
    pub async fn handle_frame(
        &mut self,
        conn: ConnectionId,
        raw: &str,
    ) -> Result<Vec<Delivery>, ServerError> {
        let action = match Action::decode(raw) {
            Ok(action) => action,
            Err(e) => {
                warn!("Dropping frame from connection {}: {}", conn, e);
                return Ok(Vec::new());
            }
        };
        let public_id = match public_id_for(action.actor_id.as_deref()) {
            Ok(public_id) => public_id,
            Err(e) => {
                warn!(
                    "Dropping {} from connection {}: {}",
                    action.kind(),
                    conn,
                    e
                );
                return Ok(Vec::new());
            }
        };

        match action.body {
            ActionBody::JoinRoom {
                ref room_id,
                last_seen_seq,
            } => {
                let room_id = room_id.clone();
                self.join(conn, room_id, last_seen_seq, public_id).await
            }
            ActionBody::LeaveRoom {} => Ok(self.leave(conn)),
            ActionBody::SetCursor { .. } => Ok(self.set_cursor(conn, public_id, action)),
            ActionBody::SetCell { .. }
            | ActionBody::ClearCell { .. }
            | ActionBody::MarkSegment { .. }
            | ActionBody::ClearSegment { .. } => self.mutate(conn, public_id, action).await,
        }
    }

    /// Forgets a closed connection and tells its room
    pub fn handle_disconnect(&mut self, conn: ConnectionId) -> Vec<Delivery> {
        self.leave(conn)
    }

    async fn join(
        &mut self,
        conn: ConnectionId,
        room_id: String,
        last_seen_seq: i64,
        public_id: String,
    ) -> Result<Vec<Delivery>, ServerError> {
        if !is_valid_room_id(&room_id) {
            warn!("Connection {} asked for invalid room {:?}", conn, room_id);
            return Ok(Vec::new());
        }

        let mut deliveries = Vec::new();
        if let Some(membership) = self.memberships.get(&conn) {
            if membership.room_id == room_id {
                if membership.public_id != public_id {
                    warn!("Connection {} rejoined with another identity", conn);
                    return Ok(Vec::new());
                }
                let backlog = self
                    .log
                    .get_actions(&room_id, last_seen_seq.saturating_add(1))
                    .await?;
                debug!(
                    "Connection {} resynced room {} ({} actions)",
                    conn,
                    room_id,
                    backlog.len()
                );
                return Ok(backlog
                    .into_iter()
                    .map(|action| Delivery::new(conn, action))
                    .collect());
            }
            deliveries.extend(self.leave(conn));
        }

        self.load_room(&room_id).await?;
        let backlog = self
            .log
            .get_actions(&room_id, last_seen_seq.saturating_add(1))
            .await?;
        info!(
            "Connection {} joined room {} as {} ({} backlog actions)",
            conn,
            room_id,
            public_id,
            backlog.len()
        );
        deliveries.extend(backlog.into_iter().map(|action| Delivery::new(conn, action)));

        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Ok(deliveries);
        };
        let announcement =
            Action::join_room(room_id.clone(), UNCONFIRMED_SEQ).with_actor(public_id.clone());
        for &other in &room.members {
            let Some(member) = self.memberships.get(&other) else {
                continue;
            };
            let presence = match member.cursor {
                Some((row, col)) => Action::set_cursor(row, col),
                None => Action::join_room(room_id.clone(), UNCONFIRMED_SEQ),
            };
            deliveries.push(Delivery::new(
                conn,
                presence.with_actor(member.public_id.clone()),
            ));
            deliveries.push(Delivery::new(other, announcement.clone()));
        }

        room.members.insert(conn);
        self.memberships.insert(
            conn,
            Membership {
                room_id,
                public_id,
                cursor: None,
            },
        );
        Ok(deliveries)
    }

    /// Loads a room's grid by replaying its log unless it is already live
    async fn load_room(&mut self, room_id: &str) -> Result<(), ServerError> {
        if self.rooms.contains_key(room_id) {
            return Ok(());
        }
        let size = self.log.room_size(room_id, self.default_grid_size).await?;
        let mut grid = GridState::new(room_id, &MarchingBands::new(size));
        let actions = self.log.get_actions(room_id, 0).await?;
        for action in &actions {
            match grid.check_bounds(action) {
                Ok(()) => grid.apply(action),
                Err(e) => warn!(
                    "Skipping logged action {} in room {}: {}",
                    action.sequence_number, room_id, e
                ),
            }
        }
        info!(
            "Loaded room {} ({}x{}, {} actions replayed{})",
            room_id,
            size,
            size,
            actions.len(),
            if grid.is_solved() { ", solved" } else { "" }
        );
        self.rooms.insert(
            room_id.to_string(),
            Room {
                grid,
                members: BTreeSet::new(),
            },
        );
        Ok(())
    }

    async fn mutate(
        &mut self,
        conn: ConnectionId,
        public_id: String,
        action: Action,
    ) -> Result<Vec<Delivery>, ServerError> {
        let Some(membership) = self.memberships.get(&conn) else {
            warn!(
                "Dropping {} from connection {} outside any room",
                action.kind(),
                conn
            );
            return Ok(Vec::new());
        };
        if membership.public_id != public_id {
            warn!(
                "Dropping {} from connection {}: identity does not match membership",
                action.kind(),
                conn
            );
            return Ok(Vec::new());
        }
        let room_id = membership.room_id.clone();
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Ok(Vec::new());
        };
        if let Err(e) = room.grid.check_bounds(&action) {
            warn!("Dropping {} from connection {}: {}", action.kind(), conn, e);
            return Ok(Vec::new());
        }

        let action = action.with_actor(public_id);
        let Some(seq) = self.log.add_action(&room_id, &action).await? else {
            return Ok(Vec::new());
        };
        let action = action.with_sequence(seq);

        let was_solved = room.grid.is_solved();
        room.grid.apply(&action);
        let solved = room.grid.is_solved();
        let deliveries = room
            .members
            .iter()
            .map(|&to| Delivery::new(to, action.clone()))
            .collect();

        if solved != was_solved {
            if solved {
                info!("Room {} solved at sequence {}", room_id, seq);
            } else {
                info!("Room {} no longer solved at sequence {}", room_id, seq);
            }
            // The action is already logged, so it must go out either way.
            if let Err(e) = self.log.set_solved(&room_id, solved).await {
                warn!("Failed to record solved flag for room {}: {}", room_id, e);
            }
        }
        Ok(deliveries)
    }

    fn set_cursor(&mut self, conn: ConnectionId, public_id: String, action: Action) -> Vec<Delivery> {
        let Some(membership) = self.memberships.get_mut(&conn) else {
            debug!("Ignoring cursor from connection {} outside any room", conn);
            return Vec::new();
        };
        if membership.public_id != public_id {
            warn!("Ignoring cursor from connection {} with another identity", conn);
            return Vec::new();
        }
        let Some(room) = self.rooms.get(&membership.room_id) else {
            return Vec::new();
        };
        if let Err(e) = room.grid.check_bounds(&action) {
            warn!("Ignoring cursor from connection {}: {}", conn, e);
            return Vec::new();
        }
        if let ActionBody::SetCursor { row, col } = action.body {
            membership.cursor = Some((row, col));
        }

        let relay = Action::new(action.body)
            .with_actor(public_id)
            .with_sequence(UNCONFIRMED_SEQ);
        room.members
            .iter()
            .filter(|&&to| to != conn)
            .map(|&to| Delivery::new(to, relay.clone()))
            .collect()
    }

    fn leave(&mut self, conn: ConnectionId) -> Vec<Delivery> {
        let Some(membership) = self.memberships.remove(&conn) else {
            return Vec::new();
        };
        let Some(room) = self.rooms.get_mut(&membership.room_id) else {
            return Vec::new();
        };
        room.members.remove(&conn);
        info!("Connection {} left room {}", conn, membership.room_id);

        let announcement = Action::leave_room().with_actor(membership.public_id);
        let deliveries = room
            .members
            .iter()
            .map(|&to| Delivery::new(to, announcement.clone()))
            .collect();

        if room.members.is_empty() {
            self.rooms.remove(&membership.room_id);
            debug!("Unloaded empty room {}", membership.room_id);
        }
        deliveries
    }
}
