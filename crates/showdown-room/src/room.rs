//! A single tracked room.
//!
//! Rooms use persistent collections from `im`, so cloning a room (or a
//! whole registry snapshot) shares structure instead of copying logs.

use std::time::SystemTime;

use showdown_protocol::{Message, MessageType, RoomId, User, to_id};

use crate::RoomKind;

/// State of one room the client is in.
#[derive(Debug, Clone)]
pub struct Room {
    id: RoomId,
    kind: RoomKind,
    title: Option<String>,
    users: im::HashMap<String, User>,
    logs: im::Vector<String>,
    max_logs: usize,
    created_at: SystemTime,
}

impl Room {
    /// Creates an empty room.
    pub fn new(id: RoomId, kind: RoomKind, max_logs: usize) -> Self {
        Self {
            id,
            kind,
            title: None,
            users: im::HashMap::new(),
            logs: im::Vector::new(),
            max_logs,
            created_at: SystemTime::now(),
        }
    }

    /// The room's id.
    pub fn id(&self) -> &RoomId {
        &self.id
    }

    /// The kind announced by `init`.
    pub fn kind(&self) -> &RoomKind {
        &self.kind
    }

    /// Whether this is a battle room.
    pub fn is_battle(&self) -> bool {
        self.kind == RoomKind::Battle
    }

    /// Title from the last `title` message.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Users currently in the room, by id.
    pub fn users(&self) -> &im::HashMap<String, User> {
        &self.users
    }

    /// Looks up a user by name or id.
    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.get(&to_id(name))
    }

    /// Log lines, oldest first.
    pub fn logs(&self) -> &im::Vector<String> {
        &self.logs
    }

    /// When the room was initialised.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Records `msg` in the log and updates title and users.
    pub fn apply(&mut self, msg: &Message) {
        self.push_log(msg.line());

        match msg.kind() {
            MessageType::Title => {
                self.title = msg.param(0).map(str::to_owned);
            }
            MessageType::Users => {
                self.users = parse_user_list(msg.param(0).unwrap_or_default());
            }
            MessageType::Join => {
                if let Some(raw) = msg.param(0) {
                    let user = User::parse(raw);
                    self.users.insert(user.id.clone(), user);
                }
            }
            MessageType::Leave => {
                if let Some(raw) = msg.param(0) {
                    self.users.remove(&User::parse(raw).id);
                }
            }
            MessageType::Name => {
                if let Some(raw) = msg.param(0) {
                    if let Some(old) = msg.param(1) {
                        self.users.remove(&to_id(old));
                    }
                    let user = User::parse(raw);
                    self.users.insert(user.id.clone(), user);
                }
            }
            _ => {}
        }
    }

    fn push_log(&mut self, line: &str) {
        self.logs.push_back(line.to_owned());
        while self.logs.len() > self.max_logs {
            self.logs.pop_front();
        }
    }
}

/// Parses `COUNT,USER,USER...`. The leading count is ignored.
fn parse_user_list(list: &str) -> im::HashMap<String, User> {
    list.split(',')
        .skip(1)
        .filter(|entry| !entry.trim().is_empty())
        .map(User::parse)
        .map(|user| (user.id.clone(), user))
        .collect()
}
