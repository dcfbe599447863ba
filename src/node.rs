//! Control channel session with one node.
//!
//! A [`Node`] owns a long-lived websocket connection to a node and everything
//! that flows over it:
//!
//! * **Handshake**: the connection is opened with `Authorization`, `User-Id`,
//!   `Num-Shards` and `Client-Name` headers, plus `Resume-Key` when
//!   configured. A node that recognizes the key answers with
//!   `Session-Resumed: true` and keeps its players.
//! * **Resuming**: with a resume key configured, every new connection is
//!   followed by a `configureResuming` command before the session counts as
//!   ready.
//! * **Outbound**: [`Node::send`] enqueues commands for a single writer, so
//!   commands leave in the order they were submitted. Commands are refused
//!   with [`ErrorKind::Unavailable`] while the node is not ready.
//! * **Inbound**: messages are decoded and dispatched through the node's
//!   [`EventRouter`].
//! * **Reconnecting**: when the connection drops, the node moves to
//!   [`NodeState::Reconnecting`] and retries with exponential backoff until
//!   it is closed. Its players wait in [`PlayerState::NodeBusy`] meanwhile.
//!   If the node comes back without having resumed the session, every player
//!   announces its voice session again and restarts its current track where
//!   it left off.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use nodelink::{config::Config, node::Node, router::Listeners};
//!
//! # async fn example() -> nodelink::error::Result<()> {
//! let node = Node::new(Config::default(), Listeners::default());
//! node.connect()?;
//! node.wait_until_ready(Some(Duration::from_secs(30))).await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`ErrorKind::Unavailable`]: crate::error::ErrorKind::Unavailable
//! [`PlayerState::NodeBusy`]: crate::player::PlayerState::NodeBusy

use std::{
    fmt,
    ops::ControlFlow,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use http::{header::AUTHORIZATION, HeaderValue};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch, Notify},
    task::JoinHandle,
};
use tokio_tungstenite::{
    tungstenite::{client::IntoClientRequest, Message as WebsocketMessage},
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::ReconnectBackoff,
    config::Config,
    error::{Error, Result},
    player::Player,
    protocol::{Command, GuildId, Incoming, Stats},
    router::{EventRouter, Listeners},
};

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state of a node session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeState {
    Connecting,
    Ready,
    Reconnecting,

    /// Closed for good.
    Disconnecting,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Handle to a node session.
///
/// Clones refer to the same session.
#[derive(Clone)]
pub struct Node {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    state: watch::Sender<NodeState>,
    commands: mpsc::UnboundedSender<Command>,

    /// Taken by the session task when connecting.
    pending: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    router: EventRouter,
    stats: Mutex<Option<Stats>>,
    shutdown: CancellationToken,
    reconnect: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Messages larger than this are not parsed.
    const MAX_MESSAGE_SIZE: usize = 64 * 1024;

    const HEADER_USER_ID: &'static str = "user-id";
    const HEADER_NUM_SHARDS: &'static str = "num-shards";
    const HEADER_CLIENT_NAME: &'static str = "client-name";
    const HEADER_RESUME_KEY: &'static str = "resume-key";
    const HEADER_SESSION_RESUMED: &'static str = "session-resumed";

    /// Creates a session that is not connected yet.
    #[must_use]
    pub fn new(config: Config, listeners: Listeners) -> Self {
        let (commands, pending) = mpsc::unbounded_channel();
        Self::with_channel(config, listeners, commands, Some(pending), NodeState::Connecting)
    }

    fn with_channel(
        config: Config,
        listeners: Listeners,
        commands: mpsc::UnboundedSender<Command>,
        pending: Option<mpsc::UnboundedReceiver<Command>>,
        state: NodeState,
    ) -> Self {
        let (state, _) = watch::channel(state);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                commands,
                pending: Mutex::new(pending),
                router: EventRouter::new(listeners),
                stats: Mutex::new(None),
                shutdown: CancellationToken::new(),
                reconnect: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// A ready node without a connection. Commands sent to it end up in the
    /// returned receiver.
    #[cfg(test)]
    pub(crate) fn detached(config: Config) -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let node = Self::with_channel(config, Listeners::default(), commands, None, NodeState::Ready);
        (node, receiver)
    }

    /// Starts the session in the background.
    ///
    /// Returns immediately; use [`Node::wait_until_ready`] to wait for the
    /// connection. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the session was started before.
    pub fn connect(&self) -> Result<()> {
        let commands = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| Error::already_exists(format!("node {} already connected", self.name())))?;

        let node = self.clone();
        let task = tokio::spawn(async move { node.run(commands).await });
        *self.inner.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);

        Ok(())
    }

    /// Closes the session for good.
    ///
    /// Commands submitted before are still written out.
    pub async fn disconnect(&self) {
        self.inner.shutdown.cancel();

        let task = self.inner.task.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("node {} session task failed: {e}", self.name());
            }
        }

        self.set_state(NodeState::Disconnecting);
    }

    /// Drops the current connection and connects again, going through the
    /// usual backoff. Players are restored as after any connection loss.
    ///
    /// Does nothing while the node is not connected.
    pub fn reconnect(&self) {
        if !self.is_ready() {
            debug!("node {}: not connected, ignoring reconnect request", self.name());
            return;
        }

        info!("node {}: reconnect requested", self.name());
        self.inner.reconnect.notify_one();
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// A short name for log lines.
    #[must_use]
    pub fn name(&self) -> String {
        self.inner.config.name()
    }

    #[must_use]
    pub fn state(&self) -> NodeState {
        *self.inner.state.borrow()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == NodeState::Ready
    }

    /// The latest stats the node reported.
    #[must_use]
    pub fn stats(&self) -> Option<Stats> {
        self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn router(&self) -> &EventRouter {
        &self.inner.router
    }

    #[must_use]
    pub fn get_player(&self, guild_id: GuildId) -> Option<Player> {
        self.inner.router.get(guild_id)
    }

    #[must_use]
    pub fn players(&self) -> Vec<Player> {
        self.inner.router.players()
    }

    pub(crate) fn add_player(&self, player: Player) {
        self.inner.router.insert(player);
    }

    pub(crate) fn remove_player(&self, player: &Player) {
        if self.inner.router.remove(player) {
            debug!("node {}: removed player of guild {}", self.name(), player.guild_id());
        }
    }

    /// Submits a command.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Unavailable`] if the node is not ready.
    ///
    /// [`ErrorKind::Unavailable`]: crate::error::ErrorKind::Unavailable
    pub fn send(&self, command: Command) -> Result<()> {
        if !self.is_ready() {
            return Err(Error::unavailable(format!(
                "node {} not ready to {}",
                self.name(),
                command.op()
            )));
        }

        trace!("node {}: queueing {}", self.name(), command.op());
        self.inner
            .commands
            .send(command)
            .map_err(|_| Error::unavailable(format!("node {} session has ended", self.name())))
    }

    /// Waits until the node is ready, for at most `timeout` when given.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::DeadlineExceeded`] if the timeout elapsed first,
    /// or [`ErrorKind::Unavailable`] if the node was closed meanwhile.
    ///
    /// [`ErrorKind::DeadlineExceeded`]: crate::error::ErrorKind::DeadlineExceeded
    /// [`ErrorKind::Unavailable`]: crate::error::ErrorKind::Unavailable
    pub async fn wait_until_ready(&self, timeout: Option<Duration>) -> Result<()> {
        let mut state = self.inner.state.subscribe();
        let settled = async move {
            state
                .wait_for(|state| matches!(state, NodeState::Ready | NodeState::Disconnecting))
                .await
                .map(|state| *state)
                .unwrap_or(NodeState::Disconnecting)
        };

        let state = match timeout {
            Some(timeout) => tokio::time::timeout(timeout, settled).await?,
            None => settled.await,
        };

        match state {
            NodeState::Ready => Ok(()),
            _ => Err(Error::unavailable(format!("node {} is closed", self.name()))),
        }
    }

    /// Like [`Node::wait_until_ready`], but reports failure as `false`.
    pub async fn try_wait_until_ready(&self, timeout: Option<Duration>) -> bool {
        self.wait_until_ready(timeout).await.is_ok()
    }

    fn set_state(&self, state: NodeState) {
        self.inner.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("node {}: {current} -> {state}", self.inner.config.name());
            *current = state;
            true
        });
    }

    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut backoff = ReconnectBackoff::default();

        loop {
            match self.open().await {
                Ok((stream, resumed)) => {
                    backoff.reset();
                    if !resumed {
                        while let Ok(stale) = commands.try_recv() {
                            debug!("node {}: discarding stale {}", self.name(), stale.op());
                        }
                    }

                    info!(
                        "connected to node {}{}",
                        self.name(),
                        if resumed { " (session resumed)" } else { "" }
                    );
                    self.set_state(NodeState::Ready);
                    for player in self.players() {
                        player.on_node_ready(resumed);
                    }

                    match self.serve(stream, &mut commands).await {
                        Ok(()) => break,
                        Err(e) => warn!("lost connection to node {}: {e}", self.name()),
                    }
                }
                Err(e) => warn!("failed to connect to node {}: {e}", self.name()),
            }

            if self.inner.shutdown.is_cancelled() {
                break;
            }

            self.set_state(NodeState::Reconnecting);
            for player in self.players() {
                player.on_node_lost();
            }

            let delay = backoff.next_delay();
            debug!(
                "node {}: reconnecting in {}s (attempt {})",
                self.name(),
                delay.as_secs_f32(),
                backoff.attempts()
            );
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.inner.shutdown.cancelled() => break,
            }
        }

        self.set_state(NodeState::Disconnecting);
        info!("disconnected from node {}", self.name());
    }

    /// Opens the connection and configures resuming.
    ///
    /// Returns whether the node resumed a previous session.
    async fn open(&self) -> Result<(Stream, bool)> {
        let config = &self.inner.config;
        let url = config.websocket_url()?;

        let mut request = url.as_str().into_client_request()?;
        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&config.password)?);
        headers.insert(Self::HEADER_USER_ID, HeaderValue::from(config.user_id));
        headers.insert(Self::HEADER_NUM_SHARDS, HeaderValue::from(config.shard_count));
        headers.insert(Self::HEADER_CLIENT_NAME, HeaderValue::from_str(&config.client_name)?);
        if let Some(key) = &config.resume_key {
            headers.insert(Self::HEADER_RESUME_KEY, HeaderValue::from_str(key)?);
        }

        debug!("node {}: connecting to {url}", self.name());
        let (mut stream, response) = tokio::select! {
            result = tokio_tungstenite::connect_async(request) => result?,
            () = self.inner.shutdown.cancelled() => return Err(Error::cancelled("node closed while connecting")),
        };

        let resumed = response
            .headers()
            .get(Self::HEADER_SESSION_RESUMED)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.eq_ignore_ascii_case("true"));

        if let Some(key) = &config.resume_key {
            let command = Command::ConfigureResuming {
                key: key.clone(),
                timeout: config.resume_timeout,
            };
            stream.send(WebsocketMessage::text(command.to_json()?)).await?;
            debug!(
                "node {}: resuming configured for {}s",
                self.name(),
                config.resume_timeout
            );
        }

        Ok((stream, resumed))
    }

    /// Pumps commands out and messages in until the connection drops, or
    /// until the node is closed, which returns `Ok`.
    async fn serve(
        &self,
        stream: Stream,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<()> {
        let (mut ws_tx, mut ws_rx) = stream.split();

        loop {
            tokio::select! {
                () = self.inner.shutdown.cancelled() => {
                    while let Ok(command) = commands.try_recv() {
                        ws_tx.send(WebsocketMessage::text(command.to_json()?)).await?;
                    }
                    if let Err(e) = ws_tx.close().await {
                        debug!("node {}: error closing connection: {e}", self.name());
                    }
                    return Ok(());
                }

                () = self.inner.reconnect.notified() => {
                    if let Err(e) = ws_tx.close().await {
                        debug!("node {}: error closing connection: {e}", self.name());
                    }
                    return Err(Error::aborted("reconnect requested"));
                }

                Some(command) = commands.recv() => {
                    let json = command.to_json()?;
                    trace!("node {} <- {json}", self.name());
                    ws_tx.send(WebsocketMessage::text(json)).await?;
                }

                message = ws_rx.next() => {
                    let message = message.ok_or_else(|| Error::unavailable("connection closed"))??;
                    if let ControlFlow::Break(e) = self.handle_message(&message) {
                        return Err(e);
                    }
                }
            }
        }
    }

    fn handle_message(&self, message: &WebsocketMessage) -> ControlFlow<Error, ()> {
        match message {
            WebsocketMessage::Text(text) => {
                let message_size = text.len();
                if message_size > Self::MAX_MESSAGE_SIZE {
                    error!("ignoring oversized message with {message_size} bytes");
                    return ControlFlow::Continue(());
                }

                trace!("node {} -> {}", self.name(), text.as_str());
                self.receive(text.as_str());
                ControlFlow::Continue(())
            }
            WebsocketMessage::Close(payload) => ControlFlow::Break(Error::unavailable(format!(
                "connection closed by node: {payload:?}"
            ))),
            // Pings are answered by the websocket layer.
            _ => ControlFlow::Continue(()),
        }
    }

    fn receive(&self, text: &str) {
        match Incoming::parse(text) {
            Ok(Some(message)) => {
                if let Incoming::Stats(stats) = &message {
                    *self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner) =
                        Some(stats.clone());
                }
                self.inner.router.route(message);
            }
            Ok(None) => debug!("node {}: ignoring message with unknown op", self.name()),
            Err(e) => warn!("node {}: failed to parse message: {e}", self.name()),
        }
    }

    /// Whether both handles refer to the same session.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("players", &self.inner.router.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.state())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn send_fails_fast_when_not_ready() {
        let node = Node::new(Config::default(), Listeners::default());
        let guild_id = GuildId::try_from(1).unwrap();

        let err = node.send(Command::Stop { guild_id }).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
    }

    #[test]
    fn detached_node_forwards_commands_in_order() {
        let (node, mut commands) = Node::detached(Config::default());
        let guild_id = GuildId::try_from(1).unwrap();

        node.send(Command::Pause { guild_id, pause: true }).unwrap();
        node.send(Command::Stop { guild_id }).unwrap();

        assert_eq!(commands.try_recv().unwrap().op(), "pause");
        assert_eq!(commands.try_recv().unwrap().op(), "stop");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_ready_times_out() {
        let node = Node::new(Config::default(), Listeners::default());

        let err = node
            .wait_until_ready(Some(Duration::from_secs(5)))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::DeadlineExceeded);
        assert!(!node.try_wait_until_ready(Some(Duration::from_secs(1))).await);
    }

    #[tokio::test]
    async fn wait_until_ready_returns_when_ready() {
        let (node, _commands) = Node::detached(Config::default());
        node.wait_until_ready(None).await.unwrap();
        assert!(node.try_wait_until_ready(Some(Duration::ZERO)).await);
    }

    #[tokio::test]
    async fn waiters_are_released_on_disconnect() {
        let node = Node::new(Config::default(), Listeners::default());
        let waiter = {
            let node = node.clone();
            tokio::spawn(async move { node.wait_until_ready(None).await })
        };

        tokio::task::yield_now().await;
        node.disconnect().await;

        let err = waiter.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert_eq!(node.state(), NodeState::Disconnecting);
    }

    #[tokio::test]
    async fn reconnect_request_needs_a_live_session() {
        let node = Node::new(Config::default(), Listeners::default());
        node.reconnect();
        let armed = tokio::time::timeout(Duration::ZERO, node.inner.reconnect.notified()).await;
        assert!(armed.is_err());

        let (node, _commands) = Node::detached(Config::default());
        node.reconnect();
        let armed = tokio::time::timeout(Duration::ZERO, node.inner.reconnect.notified()).await;
        assert!(armed.is_ok());
    }

    #[test]
    fn voice_migration_during_outage_reaches_resumed_node() {
        use crate::{
            gateway::NoopGateway,
            player::{Player, PlayerState},
            protocol::{ChannelId, VoiceServer, VoiceState},
        };

        let (node, mut commands) = Node::detached(Config::default());
        let guild_id = GuildId::try_from(1).unwrap();
        let channel_id = ChannelId::try_from(2).unwrap();
        let player = Player::new(guild_id, channel_id, node.clone(), Arc::new(NoopGateway));
        node.add_player(player.clone());

        let server = |endpoint: &str| VoiceServer {
            token: "token".to_owned(),
            guild_id,
            endpoint: Some(endpoint.to_owned()),
        };

        player.on_voice_server_update(server("eu-1")).unwrap();
        player
            .on_voice_state_update(VoiceState {
                session_id: "session".to_owned(),
                channel_id: Some(channel_id),
                guild_id: Some(guild_id),
                user_id: None,
            })
            .unwrap();
        assert_eq!(commands.try_recv().unwrap().op(), "voiceUpdate");

        node.set_state(NodeState::Reconnecting);
        player.on_node_lost();
        let err = player.on_voice_server_update(server("eu-2")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);

        node.set_state(NodeState::Ready);
        player.on_node_ready(true);
        assert_eq!(player.state(), PlayerState::Ready);

        match commands.try_recv() {
            Ok(Command::VoiceUpdate { event, .. }) => {
                assert_eq!(event.endpoint.as_deref(), Some("eu-2"));
            }
            other => panic!("expected a voice update, got {other:?}"),
        }

        // Delivered now, so a repeat is absorbed.
        player.on_voice_server_update(server("eu-2")).unwrap();
        assert!(commands.try_recv().is_err());
    }

    #[test]
    fn failed_voice_update_is_retried_on_redelivery() {
        use crate::{
            gateway::NoopGateway,
            player::Player,
            protocol::{ChannelId, VoiceServer, VoiceState},
        };

        let (node, mut commands) = Node::detached(Config::default());
        let guild_id = GuildId::try_from(1).unwrap();
        let channel_id = ChannelId::try_from(2).unwrap();
        let player = Player::new(guild_id, channel_id, node.clone(), Arc::new(NoopGateway));
        node.add_player(player.clone());

        let server = VoiceServer {
            token: "token".to_owned(),
            guild_id,
            endpoint: Some("eu-1".to_owned()),
        };
        player
            .on_voice_state_update(VoiceState {
                session_id: "session".to_owned(),
                channel_id: Some(channel_id),
                guild_id: Some(guild_id),
                user_id: None,
            })
            .unwrap();

        node.set_state(NodeState::Reconnecting);
        assert!(player.on_voice_server_update(server.clone()).is_err());

        node.set_state(NodeState::Ready);
        player.on_voice_server_update(server).unwrap();
        assert_eq!(commands.try_recv().unwrap().op(), "voiceUpdate");
    }

    #[tokio::test]
    async fn connect_twice_is_refused() {
        let node = Node::new(
            Config {
                port: 1,
                ..Config::default()
            },
            Listeners::default(),
        );
        node.connect().unwrap();
        assert_eq!(node.connect().unwrap_err().kind, ErrorKind::AlreadyExists);
        node.disconnect().await;
    }
}
