//! Presence and broadcast hub.
//!
//! Routes mutation events to every live connection viewing a board and
//! tracks transient "who is here" state. All shared state (connection
//! table, per-board membership) is owned by the hub instance behind one
//! mutex, so independent hubs can coexist in tests and tear down on
//! drop. Nothing here is persisted; presence is advisory and lost on
//! restart.
//!
//! A connection belongs to at most one board: `join` on a connection
//! that is already viewing another board leaves it first, emitting
//! `UserLeft` there.
//!
//! Delivery is at-least-once to connections that stay joined. Sends go
//! through per-connection unbounded channels collected under the lock
//! and flushed after it is released; a failed send to one broken
//! connection is logged and never affects the other members.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::events::{BoardEvent, EventPublisher};
use crate::model::{BoardId, ConnectionId, UserId, UserPresence};

/// Receiving half of one connection's event stream.
pub type EventReceiver = mpsc::UnboundedReceiver<BoardEvent>;

struct ConnectionEntry {
    user_id: UserId,
    user_name: String,
    connected_at: DateTime<Utc>,
    /// The board this connection currently views, if any.
    joined: Option<BoardId>,
    outbox: mpsc::UnboundedSender<BoardEvent>,
}

impl ConnectionEntry {
    fn presence(&self) -> UserPresence {
        UserPresence {
            user_id: self.user_id,
            user_name: self.user_name.clone(),
            connected_at: self.connected_at,
        }
    }
}

#[derive(Default)]
struct HubState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    members: HashMap<BoardId, HashSet<ConnectionId>>,
}

impl HubState {
    /// Drop `conn` from `board`'s membership and return the senders of
    /// the remaining members, for a `UserLeft` broadcast.
    fn remove_member(
        &mut self,
        board: BoardId,
        conn: &ConnectionId,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<BoardEvent>)> {
        let Some(members) = self.members.get_mut(&board) else {
            return Vec::new();
        };
        if !members.remove(conn) {
            return Vec::new();
        }
        if members.is_empty() {
            self.members.remove(&board);
            return Vec::new();
        }
        self.outboxes(board, Some(conn))
    }

    /// Senders of `board`'s members, minus `exclude`.
    fn outboxes(
        &self,
        board: BoardId,
        exclude: Option<&ConnectionId>,
    ) -> Vec<(ConnectionId, mpsc::UnboundedSender<BoardEvent>)> {
        let Some(members) = self.members.get(&board) else {
            return Vec::new();
        };
        members
            .iter()
            .filter(|conn| exclude != Some(*conn))
            .filter_map(|conn| {
                self.connections
                    .get(conn)
                    .map(|entry| (conn.clone(), entry.outbox.clone()))
            })
            .collect()
    }
}

/// The live connection hub. One instance per server process.
pub struct Hub {
    config: HubConfig,
    state: Mutex<HubState>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl Hub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HubState::default()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HubState> {
        // A poisoned hub lock means a panic mid-bookkeeping; presence is
        // advisory, so continue with whatever state is left.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a connection and hand back its event stream. The
    /// connection views no board until it joins one. A reused id is an
    /// implicit disconnect of the prior registration: its board
    /// membership is removed (the old board's members get `UserLeft`)
    /// before the new entry exists, so an id is never a member of two
    /// boards at once.
    pub fn connect(
        &self,
        conn: ConnectionId,
        user_id: UserId,
        user_name: &str,
    ) -> Result<EventReceiver> {
        let (tx, rx) = mpsc::unbounded_channel();
        let evicted = {
            let mut state = self.locked();
            if !state.connections.contains_key(&conn)
                && state.connections.len() >= self.config.max_connections
            {
                return Err(Error::Invalid(format!(
                    "connection limit reached ({})",
                    self.config.max_connections
                )));
            }
            let evicted = match state.connections.remove(&conn) {
                Some(old) => old
                    .joined
                    .map(|board| (old.user_id, state.remove_member(board, &conn))),
                None => None,
            };
            debug!(%conn, %user_id, user_name, "connection registered");
            state.connections.insert(
                conn,
                ConnectionEntry {
                    user_id,
                    user_name: user_name.to_string(),
                    connected_at: Utc::now(),
                    joined: None,
                    outbox: tx,
                },
            );
            evicted
        };
        if let Some((old_user, recipients)) = evicted {
            deliver(recipients, &BoardEvent::UserLeft(old_user));
        }
        Ok(rx)
    }

    /// Remove a connection, leaving its board (if any) and telling the
    /// remaining members.
    pub fn disconnect(&self, conn: &ConnectionId) {
        let (user_id, recipients) = {
            let mut state = self.locked();
            let Some(entry) = state.connections.remove(conn) else {
                return;
            };
            let recipients = match entry.joined {
                Some(board) => state.remove_member(board, conn),
                None => Vec::new(),
            };
            (entry.user_id, recipients)
        };
        debug!(%conn, %user_id, "connection removed");
        deliver(recipients, &BoardEvent::UserLeft(user_id));
    }

    /// Join a board. Supersedes any previous membership of this
    /// connection: the old board's members get `UserLeft` first. The
    /// other members of the new board get `UserJoined`; the joining
    /// connection alone gets the full `CurrentUsers` list.
    pub fn join(&self, conn: &ConnectionId, board: BoardId) -> Result<()> {
        let (left, joined, roster) = {
            let mut state = self.locked();
            let entry = state
                .connections
                .get(conn)
                .ok_or_else(|| Error::not_found("connection", conn))?;
            let user_id = entry.user_id;
            let user_name = entry.user_name.clone();
            let own_outbox = entry.outbox.clone();
            let previous = entry.joined;

            let left = match previous {
                Some(old) if old != board => state.remove_member(old, conn),
                _ => Vec::new(),
            };

            state.members.entry(board).or_default().insert(conn.clone());
            if let Some(entry) = state.connections.get_mut(conn) {
                entry.joined = Some(board);
            }

            let joined = state.outboxes(board, Some(conn));
            let current: Vec<UserPresence> = state
                .members
                .get(&board)
                .map(|members| {
                    members
                        .iter()
                        .filter_map(|member| state.connections.get(member))
                        .map(ConnectionEntry::presence)
                        .collect()
                })
                .unwrap_or_default();

            (
                (left, user_id),
                (joined, user_id, user_name),
                (own_outbox, current),
            )
        };

        let (left_recipients, user_id) = left;
        deliver(left_recipients, &BoardEvent::UserLeft(user_id));

        let (joined_recipients, user_id, user_name) = joined;
        debug!(%conn, %board, %user_id, "joined board");
        deliver(
            joined_recipients,
            &BoardEvent::UserJoined { user_id, user_name },
        );

        let (own_outbox, current) = roster;
        if own_outbox.send(BoardEvent::CurrentUsers(current)).is_err() {
            warn!(%conn, "dropping CurrentUsers for closed connection");
        }
        Ok(())
    }

    /// Leave a board explicitly; the remaining members get `UserLeft`.
    pub fn leave(&self, conn: &ConnectionId, board: BoardId) -> Result<()> {
        let (user_id, recipients) = {
            let mut state = self.locked();
            let entry = state
                .connections
                .get_mut(conn)
                .ok_or_else(|| Error::not_found("connection", conn))?;
            if entry.joined == Some(board) {
                entry.joined = None;
            }
            let user_id = entry.user_id;
            (user_id, state.remove_member(board, conn))
        };
        debug!(%conn, %board, "left board");
        deliver(recipients, &BoardEvent::UserLeft(user_id));
        Ok(())
    }

    /// Fan an event out to every member of `board` except `exclude`.
    pub fn publish_event(
        &self,
        board: BoardId,
        event: BoardEvent,
        exclude: Option<&ConnectionId>,
    ) {
        let recipients = self.locked().outboxes(board, exclude);
        debug!(%board, event = event.name(), recipients = recipients.len(), "broadcast");
        deliver(recipients, &event);
    }

    /// Presence list of a board's current viewers.
    pub fn presence(&self, board: BoardId) -> Vec<UserPresence> {
        let state = self.locked();
        state
            .members
            .get(&board)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|member| state.connections.get(member))
                    .map(ConnectionEntry::presence)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.locked().connections.len()
    }
}

impl EventPublisher for Hub {
    fn publish(&self, board: BoardId, event: BoardEvent, exclude: Option<&ConnectionId>) {
        self.publish_event(board, event, exclude);
    }
}

/// Send `event` to each recipient, logging (and skipping) the ones whose
/// receiving half is gone.
fn deliver(
    recipients: Vec<(ConnectionId, mpsc::UnboundedSender<BoardEvent>)>,
    event: &BoardEvent,
) {
    for (conn, outbox) in recipients {
        if outbox.send(event.clone()).is_err() {
            warn!(%conn, event = event.name(), "delivery failed, connection closed");
        }
    }
}
