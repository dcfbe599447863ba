//! Snowflake identifiers as used by the chat gateway and the node.
//!
//! Both sides put snowflakes on the wire as decimal strings, so these types
//! serialize through their `Display` and `FromStr` implementations.

use std::{fmt, num::NonZeroU64, str::FromStr};

use serde_with::{DeserializeFromStr, SerializeDisplay};

use crate::error::Error;

macro_rules! snowflake {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Copy, Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, SerializeDisplay, DeserializeFromStr,
        )]
        pub struct $name(pub NonZeroU64);

        impl $name {
            /// Returns the identifier as a plain integer.
            #[must_use]
            pub fn get(self) -> u64 {
                self.0.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let id = s.parse::<NonZeroU64>().map_err(|e| {
                    Error::invalid_argument(format!("{} should be a snowflake: {e}", stringify!($name)))
                })?;
                Ok(Self(id))
            }
        }

        impl TryFrom<u64> for $name {
            type Error = Error;

            fn try_from(id: u64) -> Result<Self, Self::Error> {
                NonZeroU64::new(id)
                    .map(Self)
                    .ok_or_else(|| Error::invalid_argument(format!("{} cannot be zero", stringify!($name))))
            }
        }
    };
}

snowflake!(
    /// A guild: the scope of one voice connection and one player.
    GuildId
);

snowflake!(
    /// A voice channel within a guild.
    ChannelId
);

snowflake!(
    /// A user, such as the bot itself or whoever requested a track.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_string() {
        let guild = GuildId::try_from(987_654_321).unwrap();
        assert_eq!(serde_json::to_string(&guild).unwrap(), "\"987654321\"");

        let parsed: GuildId = serde_json::from_str("\"987654321\"").unwrap();
        assert_eq!(parsed, guild);
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert!(ChannelId::try_from(0).is_err());
        assert!("abc".parse::<UserId>().is_err());
    }
}
