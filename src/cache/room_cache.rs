use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use super::{CacheError, CacheStore};
use crate::dao::models::{MessageId, RoomId, RoomStatus};

/// Conviction score per participant nickname, ordered by nickname.
pub type ScoreMap = BTreeMap<String, u8>;

/// Cached view of a room's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    /// Lifecycle state of the room.
    pub status: RoomStatus,
    /// Nickname of the participant who asked to exit, while one is pending.
    pub requester_nickname: Option<String>,
}

impl StatusSnapshot {
    /// Snapshot of `status` with an optional pending requester.
    pub fn new(status: RoomStatus, requester_nickname: Option<String>) -> Self {
        Self {
            status,
            requester_nickname,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Field {
    LastMessageId,
    Percent,
    Status,
}

impl Field {
    const ALL: [Field; 3] = [Field::LastMessageId, Field::Percent, Field::Status];
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::LastMessageId => "lastMessageId",
            Field::Percent => "percent",
            Field::Status => "status",
        })
    }
}

/// Typed per-room view over a [`CacheStore`].
///
/// Reads return `None` on a miss, a backend failure, or an undecodable value. Writes are
/// best effort: failures are logged and dropped.
#[derive(Clone)]
pub struct RoomCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl RoomCache {
    /// Wrap `store`; every entry written expires after `ttl`.
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Id of the newest message of the room.
    pub async fn last_message_id(&self, room_id: RoomId) -> Option<MessageId> {
        self.read(room_id, Field::LastMessageId).await
    }

    /// Record the newest message id of the room.
    pub async fn set_last_message_id(&self, room_id: RoomId, message_id: MessageId) {
        self.write(room_id, Field::LastMessageId, &message_id).await;
    }

    /// Conviction score per participant.
    pub async fn percent(&self, room_id: RoomId) -> Option<ScoreMap> {
        self.read(room_id, Field::Percent).await
    }

    /// Replace the conviction scores of the room.
    pub async fn set_percent(&self, room_id: RoomId, scores: &ScoreMap) {
        self.write(room_id, Field::Percent, scores).await;
    }

    /// Lifecycle snapshot of the room.
    pub async fn status(&self, room_id: RoomId) -> Option<StatusSnapshot> {
        self.read(room_id, Field::Status).await
    }

    /// Replace the lifecycle snapshot of the room.
    pub async fn set_status(&self, room_id: RoomId, snapshot: &StatusSnapshot) {
        self.write(room_id, Field::Status, snapshot).await;
    }

    /// Drop every cached entry of the room.
    pub async fn invalidate(&self, room_id: RoomId) {
        let keys = Field::ALL.iter().map(|field| key(room_id, *field)).collect();
        if let Err(err) = self.store.delete(keys).await {
            warn!(room_id, error = %err, "failed to invalidate room cache");
        }
    }

    async fn read<T: DeserializeOwned>(&self, room_id: RoomId, field: Field) -> Option<T> {
        let key = key(room_id, field);
        let raw = match self.store.get_string(&key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(%key, "cache miss");
                return None;
            }
            Err(err) => {
                warn!(%key, error = %err, "cache read failed; treating as miss");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => {
                debug!(%key, "cache hit");
                Some(value)
            }
            Err(source) => {
                let err = CacheError::Codec { key, source };
                warn!(error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write<T: Serialize + ?Sized>(&self, room_id: RoomId, field: Field, value: &T) {
        let key = key(room_id, field);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(source) => {
                let err = CacheError::Codec { key, source };
                warn!(error = %err, "failed to encode cache entry");
                return;
            }
        };

        match self.store.set_string(&key, raw, self.ttl).await {
            Ok(()) => debug!(%key, "cache entry refreshed"),
            Err(err) => warn!(%key, error = %err, "cache write failed"),
        }
    }
}

fn key(room_id: RoomId, field: Field) -> String {
    format!("room:{room_id}:{field}")
}
