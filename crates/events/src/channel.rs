use core::str::FromStr;

use serde::{Deserialize, Serialize};

/// Logical, concern-scoped channel.
///
/// The mapping from concern to topic name is static; every publisher and every
/// consumer agrees on these names.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Read-only lookups.
    Query,
    /// Quantity changes and item creation.
    Mutate,
    /// Item removal (single, batch, whole store).
    Delete,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Query, Channel::Mutate, Channel::Delete];

    /// Topic name used on the wire.
    pub const fn topic(self) -> &'static str {
        match self {
            Channel::Query => "phone-inventory-get",
            Channel::Mutate => "phone-inventory-update",
            Channel::Delete => "phone-inventory-delete",
        }
    }

    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.topic() == topic)
    }
}

impl core::fmt::Display for Channel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.topic())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(Channel::Query),
            "mutate" => Ok(Channel::Mutate),
            "delete" => Ok(Channel::Delete),
            other => Channel::from_topic(other).ok_or_else(|| format!("unknown channel: {s}")),
        }
    }
}
