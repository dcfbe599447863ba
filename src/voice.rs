//! Voice session handshake.
//!
//! Before a node can stream audio into a voice channel it needs two pieces of
//! information that the chat gateway delivers separately and in any order:
//! the session id from a voice *state* update and the endpoint and token from
//! a voice *server* update. [`VoiceHandshake`] accumulates both per guild and
//! hands out a [`VoiceUpdate`] once the pair is complete.
//!
//! A complete pair is handed out until the caller confirms delivery with
//! [`VoiceHandshake::mark_sent`]. After that, only replacing one of its halves
//! with a different value, as happens when the gateway migrates the session
//! to another voice server, makes it eligible again. Repeated deliveries of a
//! delivered payload are absorbed.

use crate::protocol::VoiceServer;

/// A complete voice session, ready to be forwarded to the node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VoiceUpdate {
    pub session_id: String,
    pub event: VoiceServer,
}

/// Partial voice session of one guild.
#[derive(Clone, Debug, Default)]
pub struct VoiceHandshake {
    session_id: Option<String>,
    event: Option<VoiceServer>,
    sent: Option<VoiceUpdate>,
}

impl VoiceHandshake {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a voice server update.
    ///
    /// Returns the update to send if the handshake is complete and differs
    /// from what was delivered last.
    pub fn set_server(&mut self, event: VoiceServer) -> Option<VoiceUpdate> {
        self.event = Some(event);
        self.pending()
    }

    /// Records the session id of a voice state update.
    ///
    /// Returns the update to send if the handshake is complete and differs
    /// from what was delivered last.
    pub fn set_session(&mut self, session_id: impl Into<String>) -> Option<VoiceUpdate> {
        self.session_id = Some(session_id.into());
        self.pending()
    }

    /// The complete pair, regardless of whether it was handed out before.
    ///
    /// Used to re-announce the session to a node that lost it.
    #[must_use]
    pub fn current(&self) -> Option<VoiceUpdate> {
        Some(VoiceUpdate {
            session_id: self.session_id.clone()?,
            event: self.event.clone()?,
        })
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.event.is_some()
    }

    /// Forgets both halves and what was handed out.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The complete pair if the node has not received it yet.
    #[must_use]
    pub fn pending(&self) -> Option<VoiceUpdate> {
        let update = self.current()?;
        (self.sent.as_ref() != Some(&update)).then_some(update)
    }

    /// Records that `update` reached the node.
    pub fn mark_sent(&mut self, update: &VoiceUpdate) {
        self.sent = Some(update.clone());
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::protocol::GuildId;

    fn server(endpoint: &str) -> VoiceServer {
        VoiceServer {
            token: "token".to_owned(),
            guild_id: GuildId::try_from(1).unwrap(),
            endpoint: Some(endpoint.to_owned()),
        }
    }

    /// Offers a half to the handshake and confirms delivery of the result.
    fn deliver(handshake: &mut VoiceHandshake, update: Option<VoiceUpdate>) -> Option<VoiceUpdate> {
        if let Some(update) = &update {
            handshake.mark_sent(update);
        }
        update
    }

    #[test]
    fn emits_once_both_halves_arrived() {
        let mut handshake = VoiceHandshake::new();
        assert_eq!(handshake.set_session("a"), None);
        assert!(!handshake.is_complete());

        let update = handshake.set_server(server("eu-1")).unwrap();
        assert_eq!(update.session_id, "a");
        assert_eq!(update.event.endpoint.as_deref(), Some("eu-1"));
    }

    #[test]
    fn absorbs_duplicates_and_resends_on_migration() {
        let mut handshake = VoiceHandshake::new();
        handshake.set_server(server("eu-1"));
        let update = handshake.set_session("a");
        assert!(deliver(&mut handshake, update).is_some());

        assert_eq!(handshake.set_session("a"), None);
        assert_eq!(handshake.set_server(server("eu-1")), None);

        let migrated = handshake.set_server(server("eu-2")).unwrap();
        assert_eq!(migrated.event.endpoint.as_deref(), Some("eu-2"));
        assert!(handshake.current().is_some());
    }

    #[test]
    fn undelivered_pair_stays_pending() {
        let mut handshake = VoiceHandshake::new();
        handshake.set_session("a");
        let first = handshake.set_server(server("eu-1"));
        deliver(&mut handshake, first);

        // Migration whose send failed.
        assert!(handshake.set_server(server("eu-2")).is_some());
        let pending = handshake.pending().unwrap();
        assert_eq!(pending.event.endpoint.as_deref(), Some("eu-2"));

        // The same payload again is still offered.
        let again = handshake.set_server(server("eu-2"));
        assert_eq!(again.as_ref(), Some(&pending));

        deliver(&mut handshake, again);
        assert_eq!(handshake.pending(), None);
        assert_eq!(handshake.set_server(server("eu-2")), None);
    }

    #[test]
    fn clear_starts_over() {
        let mut handshake = VoiceHandshake::new();
        handshake.set_server(server("eu-1"));
        let update = handshake.set_session("a");
        deliver(&mut handshake, update);
        handshake.clear();

        assert_eq!(handshake.current(), None);
        assert_eq!(handshake.set_session("a"), None);
        assert!(handshake.set_server(server("eu-1")).is_some());
    }

    #[derive(Clone, Debug)]
    enum Input {
        Server(u8),
        Session(u8),
    }

    fn input() -> impl Strategy<Value = Input> {
        prop_oneof![
            (0u8..3).prop_map(Input::Server),
            (0u8..3).prop_map(Input::Session),
        ]
    }

    proptest! {
        /// Property: when every emitted update is delivered, an update is
        /// emitted iff both halves are present and the pair differs from the
        /// last one delivered.
        #[test]
        fn emission_matches_model(inputs in prop::collection::vec(input(), 0..40)) {
            let mut handshake = VoiceHandshake::new();
            let (mut session, mut endpoint) = (None, None);
            let mut last = None;

            for input in inputs {
                let emitted = match input {
                    Input::Server(n) => {
                        endpoint = Some(n);
                        handshake.set_server(server(&n.to_string()))
                    }
                    Input::Session(n) => {
                        session = Some(n);
                        handshake.set_session(n.to_string())
                    }
                };

                let pair = session.zip(endpoint);
                let expected = pair.is_some() && pair != last;
                prop_assert_eq!(emitted.is_some(), expected);

                if let Some(update) = emitted {
                    handshake.mark_sent(&update);
                    let (s, e) = pair.unwrap();
                    prop_assert_eq!(update.session_id, s.to_string());
                    prop_assert_eq!(update.event.endpoint, Some(e.to_string()));
                    last = pair;
                }
            }
        }
    }
}
