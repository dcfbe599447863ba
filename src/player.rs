//! Playback state of one voice connection.
//!
//! A [`Player`] belongs to one guild and is bound to one [`Node`]. It owns
//! the guild's queue and transport flags and turns calls like
//! [`Player::play`] or [`Player::seek`] into commands for the node. The node
//! reports back through events and position updates, which the node's router
//! feeds into [`Player::handle_event`] and [`Player::handle_player_update`].
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Connecting -> Ready <-> NodeBusy -> Reconnecting -> Ready
//!                            \                                   /
//!                             `-------> Disconnecting <---------'
//! ```
//!
//! * `Connecting` is entered on [`Player::connect`] and left for `Ready` once
//!   the voice session was forwarded to the node.
//! * `NodeBusy` is entered while the node connection is down.
//! * `Reconnecting` is entered when the node comes back without its previous
//!   session, while the player announces itself again.
//! * `Disconnecting` is terminal.
//!
//! Any transition clears a pending reconnect backoff.
//!
//! # Queue
//!
//! Tracks are appended with [`Player::add`] and taken **from the tail** by
//! [`Player::play`]. With `repeat` enabled, the current track is pushed back
//! before the next one is taken. With `loop_queue` enabled, every advance
//! puts a track back so the queue never runs dry.
//!
//! # Concurrency
//!
//! `Player` is a cheap handle; clones refer to the same state, which is kept
//! behind a mutex. Operations are synchronous: commands are only queued on
//! the node, so no lock is ever held across an await point. Listeners and the
//! voice gateway are called with the state unlocked.

use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, SystemTime},
};

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    backoff::ReconnectBackoff,
    error::{Error, Result},
    events::Event,
    gateway::VoiceGateway,
    node::Node,
    protocol::{
        filters::{Band, ChannelMix, Distortion, Filters, Karaoke, LowPass, Oscillation, Rotation, Timescale},
        messages::FilterUpdate,
        ChannelId, Command, GuildId, PositionUpdate, UserId, VoiceServer, VoiceState,
    },
    track::Track,
    voice::{VoiceHandshake, VoiceUpdate},
};

/// Connection state of a player.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlayerState {
    #[default]
    Created,
    Connecting,
    Ready,
    NodeBusy,
    Reconnecting,
    Disconnecting,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::NodeBusy => "node busy",
            Self::Reconnecting => "reconnecting",
            Self::Disconnecting => "disconnecting",
        };
        f.write_str(name)
    }
}

/// Handle to the playback state of one guild.
#[derive(Clone)]
pub struct Player {
    shared: Arc<Shared>,
}

struct Shared {
    guild_id: GuildId,
    node: Node,
    gateway: Arc<dyn VoiceGateway>,

    /// Cancels scheduled work on teardown.
    cancel: CancellationToken,
    inner: Mutex<Inner>,
}

#[derive(Debug)]
struct Inner {
    state: PlayerState,
    channel_id: Option<ChannelId>,
    last_channel_id: Option<ChannelId>,
    handshake: VoiceHandshake,
    self_deaf: bool,

    queue: VecDeque<Track>,
    current: Option<Track>,

    /// Milliseconds into the current track.
    position: u64,
    paused: bool,
    playing: bool,
    connected: bool,
    auto_playing: bool,

    repeat: bool,
    loop_queue: bool,
    shuffle: bool,
    shuffle_bumped: bool,

    volume: u16,
    filters: Filters,

    /// Armed by abnormal voice connection closures.
    reconnect: Option<ReconnectBackoff>,
    connected_at: Option<SystemTime>,
    metadata: HashMap<String, Value>,
}

impl Inner {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            state: PlayerState::Created,
            channel_id: Some(channel_id),
            last_channel_id: Some(channel_id),
            handshake: VoiceHandshake::new(),
            self_deaf: false,
            queue: VecDeque::new(),
            current: None,
            position: 0,
            paused: false,
            playing: false,
            connected: false,
            auto_playing: false,
            repeat: false,
            loop_queue: false,
            shuffle: false,
            shuffle_bumped: true,
            volume: Player::DEFAULT_VOLUME,
            filters: Filters::default(),
            reconnect: None,
            connected_at: None,
            metadata: HashMap::new(),
        }
    }

    /// Returns whether the state changed.
    fn transition(&mut self, guild_id: GuildId, state: PlayerState) -> bool {
        if self.state == state || self.state == PlayerState::Disconnecting {
            return false;
        }

        debug!("guild {guild_id}: player {} -> {state}", self.state);
        self.state = state;
        if self.reconnect.take().is_some() {
            trace!("guild {guild_id}: cleared reconnect backoff");
        }
        true
    }

    fn resume_point(&self) -> Option<(Track, u64, bool)> {
        self.current
            .clone()
            .map(|track| (track, self.position, self.paused))
    }
}

impl Player {
    pub const DEFAULT_VOLUME: u16 = 100;
    pub const MAX_VOLUME: u16 = 150;

    /// Voice connection close codes after which reconnecting makes sense.
    pub const RECONNECT_CLOSE_CODES: [u16; 6] = [4015, 4014, 4009, 4006, 4000, 1006];

    /// Delay before [`Player::resume`] restores the requested pause state.
    pub const RESUME_DELAY: Duration = Duration::from_secs(1);

    /// Creates a player for `channel_id` in `guild_id`.
    ///
    /// The player is not registered with `node` until [`Player::connect`].
    #[must_use]
    pub fn new(
        guild_id: GuildId,
        channel_id: ChannelId,
        node: Node,
        gateway: Arc<dyn VoiceGateway>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                guild_id,
                node,
                gateway,
                cancel: CancellationToken::new(),
                inner: Mutex::new(Inner::new(channel_id)),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn send(&self, command: Command) -> Result<()> {
        self.shared.node.send(command)
    }

    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.shared.guild_id
    }

    #[must_use]
    pub fn node(&self) -> &Node {
        &self.shared.node
    }

    /// Whether both handles refer to the same player.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    #[must_use]
    pub fn state(&self) -> PlayerState {
        self.lock().state
    }

    #[must_use]
    pub fn channel(&self) -> Option<ChannelId> {
        self.lock().channel_id
    }

    /// The channel the player was in before the current one.
    #[must_use]
    pub fn last_channel(&self) -> Option<ChannelId> {
        self.lock().last_channel_id
    }

    /// Joins the player's voice channel and registers it with its node.
    ///
    /// # Errors
    ///
    /// Returns an error if the player was disconnected before, or if the
    /// gateway refused the request.
    pub fn connect(&self, deafen: bool) -> Result<()> {
        let channel_id = {
            let mut inner = self.lock();
            if inner.state == PlayerState::Disconnecting {
                return Err(Error::failed_precondition(format!(
                    "player of guild {} is disconnected",
                    self.guild_id()
                )));
            }

            inner.connected = true;
            inner.connected_at = Some(SystemTime::now());
            inner.self_deaf = deafen;
            if inner.state == PlayerState::Created {
                inner.transition(self.guild_id(), PlayerState::Connecting);
            }
            inner.channel_id
        };

        self.shared.node.add_player(self.clone());
        info!(
            "guild {}: connecting to voice channel {}",
            self.guild_id(),
            channel_id.map_or_else(|| "-".to_owned(), |id| id.to_string())
        );
        self.shared
            .gateway
            .update_voice_state(self.guild_id(), channel_id, false, deafen)
    }

    /// Moves the player to another voice channel of its guild, resuming the
    /// current track there.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArgument`] if `guild_id` is not the
    /// player's guild, or any error of [`Player::connect`] and
    /// [`Player::resume`].
    ///
    /// [`ErrorKind::InvalidArgument`]: crate::error::ErrorKind::InvalidArgument
    pub fn move_to(&self, guild_id: GuildId, channel_id: ChannelId, deafen: bool) -> Result<()> {
        if guild_id != self.guild_id() {
            return Err(Error::invalid_argument(format!(
                "cannot move player of guild {} to a channel of guild {guild_id}",
                self.guild_id()
            )));
        }

        {
            let mut inner = self.lock();
            if let Some(previous) = inner.channel_id {
                inner.last_channel_id = Some(previous);
            }
            inner.channel_id = Some(channel_id);
        }

        self.connect(deafen)?;

        let resume_point = self.lock().resume_point();
        if let Some((track, position, paused)) = resume_point {
            self.resume(track, position, paused)?;
        }

        Ok(())
    }

    /// Tears the player down.
    ///
    /// With `force`, a [`Event::ForcedDisconnect`] is raised first, to tell
    /// listeners not to reconnect. The player then leaves the voice channel,
    /// destroys its counterpart on the node and unregisters. Failures of the
    /// latter steps are logged; local state is released regardless.
    ///
    /// Calling this on a player that is already disconnecting does nothing.
    pub fn disconnect(&self, force: bool) {
        let guild_id = self.guild_id();
        let forced = {
            let mut inner = self.lock();
            inner.auto_playing = false;
            inner.connected = false;
            if inner.state == PlayerState::Disconnecting {
                return;
            }

            inner.transition(guild_id, PlayerState::Disconnecting);
            force.then(|| {
                debug!("guild {guild_id}: forcing player disconnect");
                let event = Event::forced_disconnect();
                self.apply_event(&mut inner, &event);
                event
            })
        };

        if let Some(event) = forced {
            self.shared.node.router().listeners().emit_event(guild_id, &event);
        }

        if let Err(e) = self.shared.gateway.update_voice_state(guild_id, None, false, false) {
            warn!("guild {guild_id}: failed to leave voice channel: {e}");
        }

        if let Err(e) = self.send(Command::Destroy { guild_id }) {
            warn!("guild {guild_id}: failed to destroy player on node: {e}");
        }

        self.shared.node.remove_player(self);
        self.cleanup();
        info!("guild {guild_id}: player disconnected");
    }

    fn cleanup(&self) {
        self.shared.cancel.cancel();

        let mut inner = self.lock();
        inner.queue.clear();
        inner.current = None;
        inner.position = 0;
        inner.playing = false;
        inner.handshake.clear();
    }

    /// Forwards a voice server update to the node once the voice session is
    /// complete.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice session could not be sent to the node.
    pub fn on_voice_server_update(&self, server: VoiceServer) -> Result<()> {
        let update = {
            let mut inner = self.lock();
            if inner.state == PlayerState::Disconnecting {
                return Ok(());
            }
            inner.handshake.set_server(server)
        };

        update.map_or(Ok(()), |update| self.send_voice_update(update))
    }

    /// Tracks the bot's voice state, forwarding the voice session to the node
    /// once it is complete.
    ///
    /// A voice state without a channel means the bot was removed from the
    /// channel, which forcibly disconnects the player.
    ///
    /// # Errors
    ///
    /// Returns an error if the voice session could not be sent to the node.
    pub fn on_voice_state_update(&self, state: VoiceState) -> Result<()> {
        let guild_id = self.guild_id();

        let Some(channel_id) = state.channel_id else {
            info!("guild {guild_id}: removed from voice channel");
            self.lock().handshake.clear();
            self.disconnect(true);
            return Ok(());
        };

        let update = {
            let mut inner = self.lock();
            if inner.state == PlayerState::Disconnecting {
                return Ok(());
            }

            if inner.channel_id != Some(channel_id) {
                debug!("guild {guild_id}: moved to voice channel {channel_id}");
                if let Some(previous) = inner.channel_id {
                    inner.last_channel_id = Some(previous);
                }
                inner.channel_id = Some(channel_id);
            }

            inner.handshake.set_session(state.session_id)
        };

        update.map_or(Ok(()), |update| self.send_voice_update(update))
    }

    fn send_voice_update(&self, update: VoiceUpdate) -> Result<()> {
        let guild_id = self.guild_id();
        debug!("guild {guild_id}: sending voice session {}", update.session_id);
        self.send(Command::VoiceUpdate {
            guild_id,
            session_id: update.session_id.clone(),
            event: update.event.clone(),
        })?;

        let mut inner = self.lock();
        inner.handshake.mark_sent(&update);
        if matches!(inner.state, PlayerState::Created | PlayerState::Connecting) {
            inner.transition(guild_id, PlayerState::Ready);
        }
        Ok(())
    }

    /// Changes the connection state.
    ///
    /// Does nothing if the state is unchanged or the player is disconnecting.
    pub fn update_state(&self, state: PlayerState) {
        self.lock().transition(self.guild_id(), state);
    }

    pub(crate) fn on_node_lost(&self) {
        self.lock().transition(self.guild_id(), PlayerState::NodeBusy);
    }

    /// Restores the player on a node that is back, re-announcing the voice
    /// session and restarting playback if the node lost its state.
    ///
    /// A resumed node keeps the voice session it had; only a voice update that
    /// did not reach it during the outage is sent.
    pub(crate) fn on_node_ready(&self, resumed: bool) {
        let guild_id = self.guild_id();
        let (voice, resume_point) = {
            let mut inner = self.lock();
            if inner.state != PlayerState::NodeBusy {
                return;
            }
            if resumed {
                inner.transition(guild_id, PlayerState::Ready);
                let pending = inner.handshake.pending();
                drop(inner);

                if let Some(voice) = pending {
                    if let Err(e) = self.send_voice_update(voice) {
                        warn!("guild {guild_id}: failed to send voice session: {e}");
                    }
                }
                return;
            }

            inner.transition(guild_id, PlayerState::Reconnecting);
            (inner.handshake.current(), inner.resume_point())
        };

        if let Some(voice) = voice {
            if let Err(e) = self.send_voice_update(voice) {
                warn!("guild {guild_id}: failed to restore voice session: {e}");
            }
        }

        if let Some((track, position, paused)) = resume_point {
            if let Err(e) = self.resume(track, position, paused) {
                warn!("guild {guild_id}: failed to restore playback: {e}");
            }
        }

        self.update_state(PlayerState::Ready);
    }

    /// Handles an event of this player's guild.
    ///
    /// Returns [`Event::QueueEnd`] when a finished track could not be
    /// followed up because the queue is exhausted.
    pub fn handle_event(&self, event: &Event) -> Option<Event> {
        let mut inner = self.lock();
        self.apply_event(&mut inner, event)
    }

    fn apply_event(&self, inner: &mut Inner, event: &Event) -> Option<Event> {
        let guild_id = self.guild_id();
        debug!("guild {guild_id}: received {event}");

        match event {
            Event::TrackEnd { reason, .. } if reason.may_start_next() => {
                let exhausted = inner.queue.is_empty() && !(inner.repeat && inner.current.is_some());
                if let Err(e) = self.advance(inner) {
                    warn!("guild {guild_id}: failed to play next track: {e}");
                }
                exhausted.then_some(Event::QueueEnd)
            }
            Event::TrackEnd { .. } => {
                inner.playing = false;
                None
            }
            Event::WebSocketClosed { code, .. } if Self::RECONNECT_CLOSE_CODES.contains(code) => {
                if inner.reconnect.is_none() {
                    debug!("guild {guild_id}: voice connection closed with {code}, backing off");
                    inner.reconnect = Some(ReconnectBackoff::default());
                }
                None
            }
            _ => None,
        }
    }

    /// Takes a position update of this player's guild.
    pub fn handle_player_update(&self, update: PositionUpdate) {
        let mut inner = self.lock();
        if update.position > inner.position {
            inner.playing = true;
        }
        trace!(
            "guild {}: position {}",
            self.guild_id(),
            crate::util::format_time(update.position)
        );
        inner.position = update.position;
    }

    /// Whether a reconnect backoff is pending.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.lock().reconnect.is_some()
    }

    /// Takes the next delay of the pending reconnect backoff, if any.
    pub fn next_reconnect_delay(&self) -> Option<Duration> {
        self.lock().reconnect.as_mut().map(ReconnectBackoff::next_delay)
    }

    /// Appends a track to the queue.
    pub fn add(&self, requester: UserId, mut track: Track) {
        track.set_requester(requester);
        self.lock().queue.push_back(track);
    }

    /// Shuffles the queue if shuffling is enabled. See
    /// [`Player::force_shuffle`].
    pub fn maybe_shuffle(&self, sticky: usize) {
        let mut inner = self.lock();
        if inner.shuffle && !inner.queue.is_empty() {
            Self::shuffle_queue(&mut inner, sticky);
        }
    }

    /// Shuffles the queue.
    ///
    /// The first `sticky` tracks keep their place. Unless `shuffle_bumped`
    /// is set, bumped tracks are not shuffled either and follow the sticky
    /// tracks in their original order. The rest is shuffled after them.
    pub fn force_shuffle(&self, sticky: usize) {
        Self::shuffle_queue(&mut self.lock(), sticky);
    }

    fn shuffle_queue(inner: &mut Inner, sticky: usize) {
        if inner.queue.is_empty() {
            return;
        }

        let sticky = sticky.min(inner.queue.len());
        let mut rest: Vec<Track> = inner.queue.drain(sticky..).collect();
        let mut queue = std::mem::take(&mut inner.queue);

        if !inner.shuffle_bumped {
            let (bumped, others): (Vec<_>, Vec<_>) = rest.into_iter().partition(Track::is_bumped);
            queue.extend(bumped);
            rest = others;
        }

        fastrand::shuffle(&mut rest);
        queue.extend(rest);
        inner.queue = queue;
    }

    /// Advances to the next track and plays it.
    ///
    /// Stops and clears the queue when there is nothing left to play.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn play(&self) -> Result<()> {
        self.advance(&mut self.lock())
    }

    /// Same as [`Player::play`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn skip(&self) -> Result<()> {
        self.play()
    }

    fn advance(&self, inner: &mut Inner) -> Result<()> {
        if inner.repeat {
            if let Some(current) = inner.current.clone() {
                inner.queue.push_back(current);
            }
        }

        let previous = inner.current.take();
        inner.position = 0;
        inner.paused = false;

        let Some(track) = inner.queue.pop_back() else {
            return self.stop_locked(inner);
        };

        inner.playing = true;
        if inner.loop_queue {
            inner.queue.push_back(previous.unwrap_or_else(|| track.clone()));
        }

        debug!("guild {}: playing {track}", self.guild_id());
        let command = Command::Play {
            guild_id: self.guild_id(),
            track: track.encoded().to_owned(),
            start_time: track.start_offset(),
            end_time: None,
            no_replace: false,
            pause: false,
        };
        inner.current = Some(track);
        self.send(command)
    }

    /// Plays `track` right away, bypassing the queue.
    ///
    /// Unless `replace` is set, the node ignores this while another track is
    /// playing.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn play_track(&self, track: Track, start: u64, replace: bool, pause: bool) -> Result<()> {
        let mut inner = self.lock();
        let command = Command::Play {
            guild_id: self.guild_id(),
            track: track.encoded().to_owned(),
            start_time: start,
            end_time: None,
            no_replace: !replace,
            pause,
        };

        inner.current = Some(track);
        inner.position = start;
        inner.paused = pause;
        inner.playing = !pause;
        self.send(command)
    }

    /// Restarts `track` at `start`, paused at first, and restores `pause`
    /// after [`Player::RESUME_DELAY`].
    ///
    /// # Errors
    ///
    /// Returns an error if the commands could not be sent to the node.
    pub fn resume(&self, track: Track, start: u64, pause: bool) -> Result<()> {
        debug!("guild {}: resuming {track} at {start} ms", self.guild_id());
        {
            let mut inner = self.lock();
            inner.playing = false;
            inner.paused = true;
            inner.position = start;
            let command = Command::Play {
                guild_id: self.guild_id(),
                track: track.encoded().to_owned(),
                start_time: start,
                end_time: None,
                no_replace: false,
                pause: true,
            };
            inner.current = Some(track);
            self.send(command)?;
        }

        self.pause(true)?;
        self.pause_after(pause, Self::RESUME_DELAY);
        Ok(())
    }

    /// Stops playback and clears the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node. The
    /// queue is cleared either way.
    pub fn stop(&self) -> Result<()> {
        self.stop_locked(&mut self.lock())
    }

    fn stop_locked(&self, inner: &mut Inner) -> Result<()> {
        let result = self.halt_locked(inner);
        inner.queue.clear();
        result
    }

    /// Stops playback, keeping the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn halt_playback(&self) -> Result<()> {
        self.halt_locked(&mut self.lock())
    }

    fn halt_locked(&self, inner: &mut Inner) -> Result<()> {
        inner.current = None;
        inner.position = 0;
        inner.paused = false;
        inner.playing = false;
        inner.auto_playing = false;
        self.send(Command::Stop {
            guild_id: self.guild_id(),
        })
    }

    pub fn clear_queue(&self) {
        self.lock().queue.clear();
    }

    /// Pauses, or resumes with `pause` set to `false`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn pause(&self, pause: bool) -> Result<()> {
        self.lock().paused = pause;
        self.send(Command::Pause {
            guild_id: self.guild_id(),
            pause,
        })
    }

    /// Schedules [`Player::pause`] after `delay`.
    ///
    /// The scheduled call is dropped if the player disconnects first. Must be
    /// called within a Tokio runtime.
    pub fn pause_after(&self, pause: bool, delay: Duration) {
        let player = self.clone();
        let cancel = self.shared.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancel.cancelled() => {
                    trace!("guild {}: scheduled pause dropped", player.guild_id());
                }
                () = tokio::time::sleep(delay) => {
                    if let Err(e) = player.pause(pause) {
                        warn!("guild {}: scheduled pause failed: {e}", player.guild_id());
                    }
                }
            }
        });
    }

    /// Seeks within the current track, if it is seekable.
    ///
    /// `position` is clamped to the track's length.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn seek(&self, position: i64) -> Result<()> {
        let position = {
            let inner = self.lock();
            let Some(current) = inner.current.as_ref().filter(|track| track.is_seekable()) else {
                debug!("guild {}: nothing seekable is playing", self.guild_id());
                return Ok(());
            };

            let length = i64::try_from(current.length()).unwrap_or(i64::MAX);
            u64::try_from(position.clamp(0, length)).unwrap_or_default()
        };

        self.send(Command::Seek {
            guild_id: self.guild_id(),
            position,
        })
    }

    /// Sets the volume, clamped to `0..=150`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_volume(&self, volume: i32) -> Result<()> {
        let volume = u16::try_from(volume.clamp(0, i32::from(Self::MAX_VOLUME))).unwrap_or(Self::MAX_VOLUME);
        self.lock().volume = volume;
        self.send(Command::Volume {
            guild_id: self.guild_id(),
            volume,
        })
    }

    fn update_filters(&self, update: impl FnOnce(&mut Filters)) -> Result<()> {
        let filters = {
            let mut inner = self.lock();
            update(&mut inner.filters);
            inner.filters.clone()
        };

        self.send(Command::Filters(FilterUpdate {
            guild_id: self.guild_id(),
            filters,
        }))
    }

    /// Sets the gain of some equalizer bands.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_equalizer(&self, bands: &[Band]) -> Result<()> {
        self.update_filters(|filters| filters.merge_equalizer(bands))
    }

    /// Sets the gain of one equalizer band.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn equalizer(&self, band: u8, gain: f32) -> Result<()> {
        self.set_equalizer(&[Band { band, gain }])
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_karaoke(&self, karaoke: Karaoke) -> Result<()> {
        self.update_filters(|filters| filters.karaoke = Some(karaoke))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_timescale(&self, timescale: Timescale) -> Result<()> {
        self.update_filters(|filters| filters.timescale = Some(timescale))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_tremolo(&self, tremolo: Oscillation) -> Result<()> {
        self.update_filters(|filters| filters.tremolo = Some(tremolo))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_vibrato(&self, vibrato: Oscillation) -> Result<()> {
        self.update_filters(|filters| filters.vibrato = Some(vibrato))
    }

    /// Rotates the audio at `rotation_hz`, or at a random whole frequency
    /// below 60 Hz when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_rotation(&self, rotation_hz: Option<f32>) -> Result<()> {
        let rotation_hz = rotation_hz.unwrap_or_else(|| f32::from(fastrand::u8(0..60)));
        self.update_filters(|filters| filters.rotation = Some(Rotation { rotation_hz }))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_distortion(&self, distortion: Distortion) -> Result<()> {
        self.update_filters(|filters| filters.distortion = Some(distortion))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_channel_mix(&self, channel_mix: ChannelMix) -> Result<()> {
        self.update_filters(|filters| filters.channel_mix = Some(channel_mix))
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_low_pass(&self, low_pass: LowPass) -> Result<()> {
        self.update_filters(|filters| filters.low_pass = Some(low_pass))
    }

    /// Sets the filter volume, where `1.0` is unchanged. Independent of
    /// [`Player::set_volume`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn set_filter_volume(&self, volume: f32) -> Result<()> {
        self.update_filters(|filters| filters.volume = Some(volume))
    }

    /// Removes all filters at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn reset_filters(&self) -> Result<()> {
        self.update_filters(|filters| *filters = Filters::default())
    }

    /// Raises the three lowest equalizer bands.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn bass_boost(&self) -> Result<()> {
        self.set_equalizer(&[
            Band { band: 0, gain: 0.15 },
            Band { band: 1, gain: 0.15 },
            Band { band: 2, gain: 0.15 },
        ])
    }

    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn nightcore(&self) -> Result<()> {
        self.set_timescale(Timescale {
            speed: 1.2,
            pitch: 1.1,
            rate: 1.2,
        })
    }

    /// Applies a random distortion. Hard on the ears.
    ///
    /// # Errors
    ///
    /// Returns an error if the command could not be sent to the node.
    pub fn random_distortion(&self) -> Result<()> {
        let mut random = || f32::from(fastrand::u8(0..10));
        self.set_distortion(Distortion {
            sin_offset: random(),
            sin_scale: random(),
            cos_offset: random(),
            cos_scale: random(),
            tan_offset: random(),
            tan_scale: random(),
            offset: random(),
            scale: random(),
        })
    }

    /// Stores a value for the application.
    pub fn store(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.lock().metadata.insert(key.into(), value.into());
    }

    /// Returns a value stored with [`Player::store`].
    #[must_use]
    pub fn fetch(&self, key: &str) -> Option<Value> {
        self.lock().metadata.get(key).cloned()
    }

    /// Whether a track is playing, unpaused, on a connected player.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        let inner = self.lock();
        inner.playing && !inner.paused && inner.connected
    }

    /// Whether a track started by auto-play is playing, unpaused.
    #[must_use]
    pub fn is_auto_playing(&self) -> bool {
        let inner = self.lock();
        inner.playing && !inner.paused && inner.auto_playing
    }

    pub fn set_auto_playing(&self, auto_playing: bool) {
        self.lock().auto_playing = auto_playing;
    }

    #[must_use]
    pub fn paused(&self) -> bool {
        self.lock().paused
    }

    #[must_use]
    pub fn volume(&self) -> u16 {
        self.lock().volume
    }

    /// Whether [`Player::connect`] was called and the player was not
    /// disconnected since.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.lock().connected
    }

    /// Whether the node is ready for commands.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.shared.node.is_ready()
    }

    #[must_use]
    pub fn connected_at(&self) -> Option<SystemTime> {
        self.lock().connected_at
    }

    /// Milliseconds into the current track.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    #[must_use]
    pub fn current(&self) -> Option<Track> {
        self.lock().current.clone()
    }

    /// Snapshot of the queue, head first.
    #[must_use]
    pub fn queue(&self) -> Vec<Track> {
        self.lock().queue.iter().cloned().collect()
    }

    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.lock().queue.len()
    }

    #[must_use]
    pub fn filters(&self) -> Filters {
        self.lock().filters.clone()
    }

    #[must_use]
    pub fn repeat(&self) -> bool {
        self.lock().repeat
    }

    pub fn set_repeat(&self, repeat: bool) {
        self.lock().repeat = repeat;
    }

    #[must_use]
    pub fn loop_queue(&self) -> bool {
        self.lock().loop_queue
    }

    pub fn set_loop_queue(&self, loop_queue: bool) {
        self.lock().loop_queue = loop_queue;
    }

    #[must_use]
    pub fn shuffle(&self) -> bool {
        self.lock().shuffle
    }

    pub fn set_shuffle(&self, shuffle: bool) {
        self.lock().shuffle = shuffle;
    }

    #[must_use]
    pub fn shuffle_bumped(&self) -> bool {
        self.lock().shuffle_bumped
    }

    pub fn set_shuffle_bumped(&self, shuffle_bumped: bool) {
        self.lock().shuffle_bumped = shuffle_bumped;
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("guild_id", &self.guild_id())
            .field("node", &self.shared.node.name())
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        write!(
            f,
            "guild {} ({}): playing={}, paused={}, volume={}, queue_size={}",
            self.guild_id(),
            inner.state,
            inner.playing && !inner.paused && inner.connected,
            inner.paused,
            inner.volume,
            inner.queue.len(),
        )?;

        if let Some(current) = &inner.current {
            write!(
                f,
                ", current={current} [{}/{}]",
                crate::util::format_time(inner.position),
                crate::util::format_time(current.length())
            )?;
        }

        Ok(())
    }
}
