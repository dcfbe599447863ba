//! Inbound message routing.
//!
//! Every message a node sends is decoded into an [`Incoming`] and handed to
//! the node's [`EventRouter`]:
//!
//! * `stats` messages go to the stats listeners only.
//! * `playerUpdate` messages update the position of the guild's [`Player`]
//!   and then go to the update listeners.
//! * `event` messages are handled by the guild's [`Player`] first and then go
//!   to the event listeners. When handling a track end exhausts the queue, a
//!   [`Event::QueueEnd`] follows.
//!
//! Messages for a guild without a player, and events of unknown types, are
//! dropped.
//!
//! # Listeners
//!
//! [`Listeners`] is a registry of callbacks that observe all nodes of a
//! [`Client`]. Callbacks run on the node's session task, so they should
//! return quickly. They are never called with a player locked, so calling
//! back into a [`Player`] is fine.
//!
//! ```rust
//! use nodelink::{events::Event, router::Listeners};
//!
//! let listeners = Listeners::default();
//! let id = listeners.register_event_listener(|guild, event: &Event| {
//!     println!("{guild}: {event}");
//! });
//! assert!(listeners.unregister_event_listener(id));
//! ```
//!
//! [`Client`]: crate::client::Client

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    events::Event,
    player::Player,
    protocol::{GuildId, Incoming, PositionUpdate, Stats},
};

type EventCallback = Arc<dyn Fn(GuildId, &Event) + Send + Sync>;
type UpdateCallback = Arc<dyn Fn(GuildId, &PositionUpdate) + Send + Sync>;
type StatsCallback = Arc<dyn Fn(&Stats) + Send + Sync>;

/// Handle to unregister a listener with.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    events: Vec<(ListenerId, EventCallback)>,
    updates: Vec<(ListenerId, UpdateCallback)>,
    stats: Vec<(ListenerId, StatsCallback)>,
}

impl Registry {
    fn next_id(&mut self) -> ListenerId {
        self.next_id += 1;
        ListenerId(self.next_id)
    }
}

/// Shared registry of event, player update and stats callbacks.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct Listeners {
    registry: Arc<Mutex<Registry>>,
}

impl Listeners {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register_event_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(GuildId, &Event) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id();
        registry.events.push((id, Arc::new(callback)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unregister_event_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let events = &mut registry.events;
        let before = events.len();
        events.retain(|(listener, _)| *listener != id);
        events.len() != before
    }

    pub fn register_update_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(GuildId, &PositionUpdate) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id();
        registry.updates.push((id, Arc::new(callback)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unregister_update_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let updates = &mut registry.updates;
        let before = updates.len();
        updates.retain(|(listener, _)| *listener != id);
        updates.len() != before
    }

    pub fn register_stats_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&Stats) + Send + Sync + 'static,
    {
        let mut registry = self.registry();
        let id = registry.next_id();
        registry.stats.push((id, Arc::new(callback)));
        id
    }

    /// Returns whether a listener was removed.
    pub fn unregister_stats_listener(&self, id: ListenerId) -> bool {
        let mut registry = self.registry();
        let stats = &mut registry.stats;
        let before = stats.len();
        stats.retain(|(listener, _)| *listener != id);
        stats.len() != before
    }

    // Callbacks are cloned out of the registry so that they may register or
    // unregister listeners themselves.

    pub(crate) fn emit_event(&self, guild_id: GuildId, event: &Event) {
        let callbacks: Vec<_> = self.registry().events.iter().map(|(_, f)| f.clone()).collect();
        for callback in callbacks {
            callback(guild_id, event);
        }
    }

    pub(crate) fn emit_update(&self, guild_id: GuildId, update: &PositionUpdate) {
        let callbacks: Vec<_> = self.registry().updates.iter().map(|(_, f)| f.clone()).collect();
        for callback in callbacks {
            callback(guild_id, update);
        }
    }

    pub(crate) fn emit_stats(&self, stats: &Stats) {
        let callbacks: Vec<_> = self.registry().stats.iter().map(|(_, f)| f.clone()).collect();
        for callback in callbacks {
            callback(stats);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry();
        f.debug_struct("Listeners")
            .field("events", &registry.events.len())
            .field("updates", &registry.updates.len())
            .field("stats", &registry.stats.len())
            .finish()
    }
}

/// The players of one node, keyed by guild, and the listeners to notify.
#[derive(Clone, Debug, Default)]
pub struct EventRouter {
    players: Arc<Mutex<HashMap<GuildId, Player>>>,
    listeners: Listeners,
}

impl EventRouter {
    #[must_use]
    pub fn new(listeners: Listeners) -> Self {
        Self {
            players: Arc::default(),
            listeners,
        }
    }

    fn players_map(&self) -> std::sync::MutexGuard<'_, HashMap<GuildId, Player>> {
        self.players.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Registers a player, replacing any other player of the same guild.
    pub(crate) fn insert(&self, player: Player) {
        if let Some(previous) = self.players_map().insert(player.guild_id(), player) {
            debug!("replaced player of guild {}", previous.guild_id());
        }
    }

    /// Removes `player`, unless its guild has been taken over by another
    /// player since.
    pub(crate) fn remove(&self, player: &Player) -> bool {
        let mut players = self.players_map();
        match players.get(&player.guild_id()) {
            Some(registered) if registered.ptr_eq(player) => {
                players.remove(&player.guild_id());
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, guild_id: GuildId) -> Option<Player> {
        self.players_map().get(&guild_id).cloned()
    }

    /// Snapshot of all registered players.
    #[must_use]
    pub fn players(&self) -> Vec<Player> {
        self.players_map().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players_map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players_map().is_empty()
    }

    /// Dispatches one decoded message.
    pub fn route(&self, message: Incoming) {
        match message {
            Incoming::Event { guild_id, event } => self.route_event(guild_id, &event),
            Incoming::PlayerUpdate { guild_id, state } => self.route_update(guild_id, &state),
            Incoming::Stats(stats) => self.listeners.emit_stats(&stats),
        }
    }

    fn route_event(&self, guild_id: GuildId, event: &Event) {
        if *event == Event::Unknown {
            debug!("dropping event of unknown type for guild {guild_id}");
            return;
        }

        let Some(player) = self.get(guild_id) else {
            debug!("dropping {event} for unknown guild {guild_id}");
            return;
        };

        trace!("guild {guild_id}: {event}");
        let follow_up = player.handle_event(event);
        self.listeners.emit_event(guild_id, event);

        if let Some(follow_up) = follow_up {
            self.listeners.emit_event(guild_id, &follow_up);
        }
    }

    fn route_update(&self, guild_id: GuildId, update: &PositionUpdate) {
        let Some(player) = self.get(guild_id) else {
            debug!("dropping player update for unknown guild {guild_id}");
            return;
        };

        player.handle_player_update(*update);
        self.listeners.emit_update(guild_id, update);
    }
}
