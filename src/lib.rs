//! Client for external audio playback nodes.
//!
//! Chat bots that play music in voice channels can hand the audio work to a
//! separate node process. The bot keeps a websocket control channel to the
//! node and tells it what to play; the node streams audio into the voice
//! channel and reports back with events and position updates.
//!
//! # Overview
//!
//! * [`client::Client`] manages node sessions and hands out players.
//! * [`node::Node`] is one control channel session, with resuming and
//!   reconnects.
//! * [`player::Player`] holds the queue and transport state of one guild.
//! * [`voice::VoiceHandshake`] pairs up the two halves of a voice session
//!   delivered by the chat gateway.
//! * [`router`] dispatches node messages to players and listeners.
//! * [`http::Client`] loads tracks over the node's REST API.
//!
//! The chat gateway itself is out of scope: applications connect players to
//! theirs through [`gateway::VoiceGateway`].
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod http;
pub mod node;
pub mod player;
pub mod protocol;
pub mod router;
pub mod signal;
pub mod track;
pub mod util;
pub mod voice;
