//! Entry point for applications.
//!
//! A [`Client`] manages the node sessions of one bot user and hands out
//! players. The host application forwards the voice updates its gateway
//! receives to [`Client::on_voice_state_update`] and
//! [`Client::on_voice_server_update`]; the client routes them to the player
//! of the guild.
//!
//! # Example
//!
//! ```no_run
//! use std::{sync::Arc, time::Duration};
//! use nodelink::{client::Client, config::Config, gateway::NoopGateway};
//!
//! # async fn example(user_id: nodelink::protocol::UserId,
//! #                  guild_id: nodelink::protocol::GuildId,
//! #                  channel_id: nodelink::protocol::ChannelId) -> nodelink::error::Result<()> {
//! let client = Client::new(user_id);
//! client.listeners().register_event_listener(|guild_id, event| {
//!     println!("guild {guild_id}: {event}");
//! });
//!
//! client.add_node(Config::default(), Some(Duration::from_secs(30))).await?;
//! let player = client.connect(guild_id, channel_id, Arc::new(NoopGateway), true)?;
//! # Ok(())
//! # }
//! ```

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use crate::{
    config::Config,
    error::{Error, Result},
    gateway::VoiceGateway,
    node::Node,
    player::Player,
    protocol::{ChannelId, GuildId, UserId, VoiceServer, VoiceState},
    router::Listeners,
};

#[derive(Debug)]
pub struct Client {
    user_id: UserId,
    listeners: Listeners,
    nodes: Mutex<Vec<Node>>,
}

impl Client {
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            listeners: Listeners::default(),
            nodes: Mutex::new(Vec::new()),
        }
    }

    fn lock_nodes(&self) -> MutexGuard<'_, Vec<Node>> {
        self.nodes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The bot user, as announced to nodes.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Listeners shared by all nodes of this client.
    #[must_use]
    pub fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    /// Connects to a node and waits for it to become ready.
    ///
    /// The configured user id is replaced by the client's.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DeadlineExceeded`] if the node did not become
    /// ready within `timeout`. The node is dropped in that case.
    ///
    /// [`ErrorKind::DeadlineExceeded`]: crate::error::ErrorKind::DeadlineExceeded
    pub async fn add_node(&self, mut config: Config, timeout: Option<Duration>) -> Result<Node> {
        config.user_id = self.user_id.get();
        let node = Node::new(config, self.listeners.clone());
        node.connect()?;
        self.lock_nodes().push(node.clone());

        if let Err(e) = node.wait_until_ready(timeout).await {
            error!("node {} did not become ready: {e}", node.name());
            self.lock_nodes().retain(|other| !other.ptr_eq(&node));
            node.disconnect().await;
            return Err(e);
        }

        Ok(node)
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<Node> {
        self.lock_nodes().clone()
    }

    /// The ready node with the fewest players.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Unavailable`] if no node is ready.
    ///
    /// [`ErrorKind::Unavailable`]: crate::error::ErrorKind::Unavailable
    pub fn get_node(&self) -> Result<Node> {
        self.lock_nodes()
            .iter()
            .filter(|node| node.is_ready())
            .min_by_key(|node| node.router().len())
            .cloned()
            .ok_or_else(|| Error::unavailable("no node is ready"))
    }

    /// Connects to a voice channel, moving an existing player of the guild
    /// or creating one on the least busy node.
    ///
    /// # Errors
    ///
    /// Returns an error if no node is ready or the gateway refused to join.
    pub fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        gateway: Arc<dyn VoiceGateway>,
        deafen: bool,
    ) -> Result<Player> {
        if let Some(player) = self.get_player(guild_id) {
            player.move_to(guild_id, channel_id, deafen)?;
            return Ok(player);
        }

        let node = self.get_node()?;
        debug!("guild {guild_id}: creating player on node {}", node.name());
        let player = Player::new(guild_id, channel_id, node, gateway);
        player.connect(deafen)?;
        Ok(player)
    }

    #[must_use]
    pub fn get_player(&self, guild_id: GuildId) -> Option<Player> {
        self.lock_nodes().iter().find_map(|node| node.get_player(guild_id))
    }

    #[must_use]
    pub fn all_players(&self) -> Vec<Player> {
        self.lock_nodes().iter().flat_map(Node::players).collect()
    }

    #[must_use]
    pub fn all_connected_players(&self) -> Vec<Player> {
        self.all_players()
            .into_iter()
            .filter(Player::connected)
            .collect()
    }

    /// Players that are currently playing something.
    #[must_use]
    pub fn active_players(&self) -> Vec<Player> {
        self.all_players()
            .into_iter()
            .filter(Player::is_playing)
            .collect()
    }

    /// Routes a voice server update to the player of its guild.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice session could not be sent to the node.
    pub fn on_voice_server_update(&self, server: VoiceServer) -> Result<()> {
        match self.get_player(server.guild_id) {
            Some(player) => player.on_voice_server_update(server),
            None => {
                debug!("guild {}: ignoring voice server update without player", server.guild_id);
                Ok(())
            }
        }
    }

    /// Routes a voice state update of the bot user to the player of its
    /// guild. Voice states of other users are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice session could not be sent to the node.
    pub fn on_voice_state_update(&self, state: VoiceState) -> Result<()> {
        if state.user_id != Some(self.user_id) {
            return Ok(());
        }

        let Some(player) = state.guild_id.and_then(|guild_id| self.get_player(guild_id)) else {
            trace!("ignoring voice state update without player");
            return Ok(());
        };

        player.on_voice_state_update(state)
    }

    /// Drops every node connection and lets it reconnect.
    pub fn reconnect_nodes(&self) {
        for node in self.nodes() {
            node.reconnect();
        }
    }

    /// Disconnects all players and closes all node sessions.
    pub async fn close(&self) {
        for player in self.all_players() {
            player.disconnect(false);
        }

        let nodes = std::mem::take(&mut *self.lock_nodes());
        for node in nodes {
            node.disconnect().await;
        }
        info!("client closed");
    }
}
