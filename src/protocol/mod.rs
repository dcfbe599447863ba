//! Wire types of the node protocol.
//!
//! # Submodules
//!
//! * [`ids`] - snowflake identifiers shared with the chat gateway
//! * [`messages`] - commands sent over the control channel, and the
//!   messages received on it
//! * [`filters`] - audio filter parameters
//! * [`voice`] - voice payloads forwarded from the chat gateway
//! * [`rest`] - responses of the REST endpoints
//!
//! The module also provides [`json`], which parses a REST response body and
//! logs it for protocol analysis.

pub mod filters;
pub mod ids;
pub mod messages;
pub mod rest;
pub mod voice;

pub use ids::{ChannelId, GuildId, UserId};
pub use messages::{Command, Incoming, PositionUpdate, Stats};
pub use voice::{VoiceServer, VoiceState};

use crate::error::Result;
use serde::Deserialize;
use std::fmt::Debug;

/// Parses and logs a JSON response body.
///
/// # Arguments
///
/// * `body` - Response body text to parse
/// * `origin` - Description of the endpoint for logging
///
/// # Errors
///
/// Returns error if the body is not valid JSON or does not match type `T`.
///
/// # Logging
///
/// * Success: Logs parsed structure at TRACE level
/// * Parse Error: Logs raw JSON at TRACE level if valid JSON
/// * Invalid JSON: Logs error and raw text at ERROR level
pub fn json<T>(body: &str, origin: &str) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Debug,
{
    match serde_json::from_str(body) {
        Ok(result) => {
            trace!("{}: {result:#?}", origin);
            Ok(result)
        }
        Err(e) => {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(body) {
                trace!("{}: {json:#?}", origin);
            } else {
                error!("{}: failed parsing response ({e:?})", origin);
                trace!("{body}");
            }
            Err(e.into())
        }
    }
}
