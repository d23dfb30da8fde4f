//! Room registry: creates, tracks and removes rooms as the server reports
//! them.

use showdown_protocol::{Message, MessageType, RoomId};

use crate::{Room, RoomConfig, RoomError, RoomKind};

/// All tracked rooms, keyed by id. Cloning is O(1).
pub type Rooms = im::HashMap<RoomId, Room>;

/// What applying a message did to the registry.
#[derive(Debug, Clone)]
pub enum RoomChange {
    /// A room was created (or re-created) by `init`.
    Created(RoomId),
    /// A room was removed by `deinit`. Carries its final state.
    Removed(Room),
    /// A tracked room recorded the message.
    Updated(RoomId),
    /// The message has no room scope.
    Ignored,
}

/// Tracks every room the client is in.
///
/// Membership only changes on observed `init` and `deinit`; asking the
/// server to join or leave a room does not touch the registry.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: Rooms,
    config: RoomConfig,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new(config: RoomConfig) -> Self {
        Self {
            rooms: Rooms::new(),
            config,
        }
    }

    /// Applies one decoded message.
    ///
    /// Returns [`RoomError::UnknownRoom`] for a room-scoped message whose
    /// room was never initialised; the registry is left unchanged.
    pub fn on_message(&mut self, msg: &Message) -> Result<RoomChange, RoomError> {
        let id = msg.room();
        if id.is_global() {
            return Ok(RoomChange::Ignored);
        }

        match msg.kind() {
            MessageType::Init => {
                let kind = RoomKind::parse(msg.param(0).unwrap_or_default());
                let mut room = Room::new(id.clone(), kind, self.config.max_logs);
                room.apply(msg);
                if self.rooms.insert(id.clone(), room).is_some() {
                    tracing::debug!(room = %id, "room re-initialised");
                } else {
                    tracing::info!(room = %id, "room created");
                }
                Ok(RoomChange::Created(id.clone()))
            }
            MessageType::Deinit => {
                let room = self
                    .rooms
                    .remove(id)
                    .ok_or_else(|| RoomError::UnknownRoom(id.clone()))?;
                tracing::info!(room = %id, "room removed");
                Ok(RoomChange::Removed(room))
            }
            _ => {
                let room = self
                    .rooms
                    .get_mut(id)
                    .ok_or_else(|| RoomError::UnknownRoom(id.clone()))?;
                room.apply(msg);
                Ok(RoomChange::Updated(id.clone()))
            }
        }
    }

    /// Looks up a tracked room.
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    /// Returns `true` if `id` is tracked.
    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    /// Ids of every tracked room, in no particular order.
    pub fn ids(&self) -> Vec<RoomId> {
        self.rooms.keys().cloned().collect()
    }

    /// Number of tracked rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns `true` if no room is tracked.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// A read-only copy of every tracked room.
    pub fn snapshot(&self) -> Rooms {
        self.rooms.clone()
    }

    /// Forgets every room. Used when the connection drops.
    pub fn clear(&mut self) {
        if !self.rooms.is_empty() {
            tracing::debug!(count = self.rooms.len(), "clearing rooms");
        }
        self.rooms.clear();
    }
}

#[cfg(test)]
mod tests {
    use showdown_protocol::decode;

    use super::*;

    fn feed(registry: &mut RoomRegistry, payload: &str) -> Vec<Result<RoomChange, RoomError>> {
        decode(payload)
            .into_iter()
            .map(|msg| registry.on_message(&msg.unwrap()))
            .collect()
    }

    #[test]
    fn test_on_message_init_creates_room() {
        let mut registry = RoomRegistry::default();
        let changes = feed(&mut registry, ">lobby\n|init|chat\n|title|Lobby");

        assert!(matches!(changes[0], Ok(RoomChange::Created(ref id)) if id.as_str() == "lobby"));
        assert!(matches!(changes[1], Ok(RoomChange::Updated(_))));

        let room = registry.get(&RoomId::new("lobby")).unwrap();
        assert_eq!(room.kind(), &RoomKind::Chat);
        assert_eq!(room.title(), Some("Lobby"));
        assert_eq!(room.logs().len(), 2);
    }

    #[test]
    fn test_on_message_deinit_returns_removed_room() {
        let mut registry = RoomRegistry::default();
        feed(&mut registry, ">lobby\n|init|chat\n|c|+raj|bye");
        let changes = feed(&mut registry, ">lobby\n|deinit");

        let Ok(RoomChange::Removed(room)) = &changes[0] else {
            panic!("expected Removed, got {:?}", changes[0]);
        };
        assert_eq!(room.logs().len(), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_on_message_unknown_room_is_error() {
        let mut registry = RoomRegistry::default();
        let changes = feed(&mut registry, ">nowhere\n|c|+raj|hi\n|deinit");

        assert!(matches!(changes[0], Err(RoomError::UnknownRoom(_))));
        assert!(matches!(changes[1], Err(RoomError::UnknownRoom(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_on_message_global_is_ignored() {
        let mut registry = RoomRegistry::default();
        let changes = feed(&mut registry, "|challstr|4|abc\n|init|chat");

        assert!(changes.iter().all(|c| matches!(c, Ok(RoomChange::Ignored))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_on_message_reinit_replaces_room() {
        let mut registry = RoomRegistry::default();
        feed(&mut registry, ">lobby\n|init|chat\n|c|+raj|old");
        feed(&mut registry, ">lobby\n|init|chat");

        assert_eq!(registry.len(), 1);
        let room = registry.get(&RoomId::new("lobby")).unwrap();
        assert_eq!(room.logs().len(), 1);
    }

    #[test]
    fn test_snapshot_is_unaffected_by_later_messages() {
        let mut registry = RoomRegistry::default();
        feed(&mut registry, ">lobby\n|init|chat");
        let snapshot = registry.snapshot();
        feed(&mut registry, ">lobby\n|c|+raj|later\n>techcode\n|init|chat");

        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[&RoomId::new("lobby")].logs().len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let mut registry = RoomRegistry::new(RoomConfig { max_logs: 10 });
        feed(&mut registry, ">a\n|init|chat\n>b\n|init|battle");
        assert_eq!(registry.len(), 2);

        registry.clear();
        assert!(registry.is_empty());
        assert!(!registry.contains(&RoomId::new("a")));
    }
}
