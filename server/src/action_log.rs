//! Per-room append-only action log on top of a [`KvStore`].
//!
//! An action's sequence number is its position in the room's list. Entries
//! are stored unconfirmed and stamped with their position when read back, so
//! the number can never disagree with the storage order.

use crate::store::{KvStore, StoreError};
use log::{debug, error};
use shared::{Action, UNCONFIRMED_SEQ};

fn actions_key(room_id: &str) -> String {
    format!("room:{}:actions", room_id)
}

fn size_key(room_id: &str) -> String {
    format!("room:{}:size", room_id)
}

fn solved_key(room_id: &str) -> String {
    format!("room:{}:solved", room_id)
}

pub struct ActionLog<S: KvStore> {
    store: S,
}

impl<S: KvStore> ActionLog<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Appends an unconfirmed action and returns the sequence number it was
    /// given. An action that already claims a sequence number is assumed to be
    /// recorded and is ignored.
    pub async fn add_action(
        &self,
        room_id: &str,
        action: &Action,
    ) -> Result<Option<i64>, StoreError> {
        if action.sequence_number != UNCONFIRMED_SEQ {
            debug!(
                "Ignoring {} for room {} already at sequence {}",
                action.kind(),
                room_id,
                action.sequence_number
            );
            return Ok(None);
        }
        let len = self
            .store
            .rpush(&actions_key(room_id), action.encode())
            .await?;
        Ok(Some(len as i64 - 1))
    }

    /// Returns every action from `from_seq` onwards with its sequence number
    ///
    /// The result is always contiguous. An entry that no longer decodes fails
    /// the whole read with [`StoreError::Corrupt`].
    pub async fn get_actions(&self, room_id: &str, from_seq: i64) -> Result<Vec<Action>, StoreError> {
        let start = from_seq.max(0);
        let key = actions_key(room_id);
        let raw = self.store.lrange(&key, start, -1).await?;
        raw.iter()
            .enumerate()
            .map(|(offset, raw)| {
                let index = start + offset as i64;
                match Action::decode(raw) {
                    Ok(action) => Ok(action.with_sequence(index)),
                    Err(source) => {
                        error!("Unreadable entry {} in room {}: {}", index, room_id, source);
                        Err(StoreError::Corrupt {
                            key: key.clone(),
                            index,
                            source,
                        })
                    }
                }
            })
            .collect()
    }

    /// Grid size recorded for the room, recording `default_size` for a room
    /// seen for the first time.
    pub async fn room_size(&self, room_id: &str, default_size: usize) -> Result<usize, StoreError> {
        let keys = [size_key(room_id), solved_key(room_id)];
        let stored = self.store.mget(&keys).await?;
        if let Some(size) = stored
            .first()
            .and_then(|size| size.as_deref())
            .and_then(|size| size.parse().ok())
        {
            return Ok(size);
        }
        self.store
            .mset(vec![
                (keys[0].clone(), default_size.to_string()),
                (keys[1].clone(), false.to_string()),
            ])
            .await?;
        Ok(default_size)
    }

    pub async fn set_solved(&self, room_id: &str, solved: bool) -> Result<(), StoreError> {
        self.store.set(&solved_key(room_id), solved.to_string()).await
    }

    pub async fn is_solved(&self, room_id: &str) -> Result<bool, StoreError> {
        Ok(self.store.get(&solved_key(room_id)).await?.as_deref() == Some("true"))
    }
}
