//! Topic Namespace
//!
//! The relay talks on exactly three broker topics, all scoped under one team
//! identifier:
//!
//! - `rfid/{team}/card/status` (inbound): card presented to a reader
//! - `rfid/{team}/card/balance` (inbound): balance changed after a top-up
//! - `rfid/{team}/card/topup` (outbound): top-up command for the reader
//!
//! Nothing outside this set is ever subscribed to or published on.

use std::fmt;

/// Root segment shared by every card topic.
const TOPIC_ROOT: &str = "rfid";

/// Characters that would turn the team segment into a wildcard or add levels.
const RESERVED_CHARS: [char; 4] = ['+', '#', '/', '\0'];

/// Find the first character that makes `team_id` unusable as a single
/// literal topic level.
#[must_use]
pub fn reserved_char(team_id: &str) -> Option<char> {
    team_id.chars().find(|c| RESERVED_CHARS.contains(c))
}

/// Logical channel within the namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Card status reports (inbound).
    Status,
    /// Balance updates (inbound).
    Balance,
    /// Top-up commands (outbound).
    TopUp,
}

impl Topic {
    /// Topics the relay subscribes to.
    pub const INBOUND: [Self; 2] = [Self::Status, Self::Balance];

    /// Final path segment for this channel.
    #[must_use]
    pub const fn leaf(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Balance => "balance",
            Self::TopUp => "topup",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.leaf())
    }
}

/// Fixed topic set for one team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicNamespace {
    team_id: String,
    status: String,
    balance: String,
    topup: String,
}

impl TopicNamespace {
    /// Build the namespace for a team identifier.
    #[must_use]
    pub fn new(team_id: impl Into<String>) -> Self {
        let team_id = team_id.into();
        let path = |topic: Topic| format!("{TOPIC_ROOT}/{team_id}/card/{}", topic.leaf());
        Self {
            status: path(Topic::Status),
            balance: path(Topic::Balance),
            topup: path(Topic::TopUp),
            team_id,
        }
    }

    /// Get the team identifier.
    #[must_use]
    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// Get the full topic path for a channel.
    #[must_use]
    pub fn path(&self, topic: Topic) -> &str {
        match topic {
            Topic::Status => &self.status,
            Topic::Balance => &self.balance,
            Topic::TopUp => &self.topup,
        }
    }

    /// Full paths of the inbound topics.
    #[must_use]
    pub fn inbound_paths(&self) -> Vec<&str> {
        Topic::INBOUND.iter().map(|t| self.path(*t)).collect()
    }

    /// Map a full topic path back to its channel.
    ///
    /// Returns `None` for any path outside this namespace.
    #[must_use]
    pub fn classify(&self, path: &str) -> Option<Topic> {
        [Topic::Status, Topic::Balance, Topic::TopUp]
            .into_iter()
            .find(|topic| self.path(*topic) == path)
    }
}
