//! Session identity and scope resolution.
//!
//! Every goal, plan, schedule and diary entry is owned by a [`Scope`]: either
//! the legacy [`Scope::Global`] space shared by channels that predate
//! per-conversation isolation, or a [`Scope::Session`] keyed by a
//! [`SessionIdentity`]. Lookups from one session never see entities from
//! another; such lookups fail with `NotFound`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    config::SessionConfig,
    error::{EngineError, Result},
};

static CONVERSATION_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9_-]{1,64}$").expect("conversation key regex must compile")
});

const GLOBAL_KEY: &str = "global";

/// A (channel, conversation) pair identifying one isolated conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionIdentity {
    channel: String,
    conversation_key: String,
}

impl SessionIdentity {
    /// Builds an identity, lowercasing the channel and validating the key.
    pub fn new(channel: &str, conversation_key: &str) -> Result<Self> {
        let channel = channel.trim().to_lowercase();
        if channel.is_empty() || channel.contains(':') || channel.contains(char::is_whitespace) {
            return Err(EngineError::invalid_argument("channel")
                .with_reason("channel must be a non-empty word without ':'"));
        }

        let conversation_key = conversation_key.trim();
        if !CONVERSATION_KEY.is_match(conversation_key) {
            return Err(EngineError::invalid_argument("conversation_key").with_reason(
                "must be 1-64 characters of letters, digits, '_' or '-'",
            ));
        }

        Ok(Self {
            channel,
            conversation_key: conversation_key.to_string(),
        })
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn conversation_key(&self) -> &str {
        &self.conversation_key
    }
}

/// Ownership scope of engine entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Scope {
    /// Single implicit conversation used by unscoped channels
    #[default]
    Global,
    /// One isolated conversation
    Session(SessionIdentity),
}

impl Scope {
    pub fn session(channel: &str, conversation_key: &str) -> Result<Self> {
        SessionIdentity::new(channel, conversation_key).map(Scope::Session)
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Scope::Global)
    }

    /// Key persisted alongside scoped rows.
    pub fn storage_key(&self) -> String {
        match self {
            Scope::Global => GLOBAL_KEY.to_string(),
            Scope::Session(identity) => {
                format!("{}:{}", identity.channel, identity.conversation_key)
            }
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}

impl FromStr for Scope {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        if s == GLOBAL_KEY {
            return Ok(Scope::Global);
        }
        // Conversation keys never contain ':'; split on the last one.
        match s.rsplit_once(':') {
            Some((channel, key)) => Scope::session(channel, key),
            None => Err(EngineError::invalid_argument("scope")
                .with_reason(format!("Invalid scope key: {s}"))),
        }
    }
}

impl From<Scope> for String {
    fn from(scope: Scope) -> Self {
        scope.storage_key()
    }
}

impl TryFrom<String> for Scope {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Maps inbound (channel, conversation) pairs onto scopes.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    scoped_channels: Vec<String>,
}

impl ScopeResolver {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            scoped_channels: config
                .scoped_channels
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect(),
        }
    }

    /// Whether the channel keeps conversations isolated from each other.
    pub fn supports_isolation(&self, channel: &str) -> bool {
        let channel = channel.trim().to_lowercase();
        self.scoped_channels.iter().any(|c| *c == channel)
    }

    /// Resolves the scope for an inbound call.
    ///
    /// Channels without isolation support, and isolating channels that supply
    /// no conversation key, resolve to [`Scope::Global`]. A key that is present
    /// but malformed is rejected rather than silently widened to global.
    pub fn resolve(&self, channel: &str, conversation_key: Option<&str>) -> Result<Scope> {
        if !self.supports_isolation(channel) {
            return Ok(Scope::Global);
        }
        match conversation_key.map(str::trim) {
            None | Some("") => Ok(Scope::Global),
            Some(key) => Scope::session(channel, key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> ScopeResolver {
        ScopeResolver::new(&SessionConfig {
            scoped_channels: vec!["web".to_string(), "Telegram".to_string()],
        })
    }

    #[test]
    fn test_identity_normalizes_channel() {
        let identity = SessionIdentity::new("  TeleGram ", "chat-42").unwrap();
        assert_eq!(identity.channel(), "telegram");
        assert_eq!(identity.conversation_key(), "chat-42");
    }

    #[test]
    fn test_identity_rejects_bad_keys() {
        assert!(SessionIdentity::new("web", "").is_err());
        assert!(SessionIdentity::new("web", "has space").is_err());
        assert!(SessionIdentity::new("web", "semi;colon").is_err());
        assert!(SessionIdentity::new("web", &"a".repeat(65)).is_err());
        assert!(SessionIdentity::new("web", &"a".repeat(64)).is_ok());
    }

    #[test]
    fn test_storage_key_round_trip() {
        let scope = Scope::session("web", "abc_123").unwrap();
        assert_eq!(scope.storage_key(), "web:abc_123");
        assert_eq!("web:abc_123".parse::<Scope>().unwrap(), scope);
        assert_eq!("global".parse::<Scope>().unwrap(), Scope::Global);
        assert!("nonsense".parse::<Scope>().is_err());
    }

    #[test]
    fn test_resolver_legacy_channel_is_global() {
        let scope = resolver().resolve("cli", Some("anything")).unwrap();
        assert_eq!(scope, Scope::Global);
    }

    #[test]
    fn test_resolver_scoped_channel() {
        let scope = resolver().resolve("TELEGRAM", Some("12345")).unwrap();
        assert_eq!(scope, Scope::session("telegram", "12345").unwrap());

        assert_eq!(resolver().resolve("web", None).unwrap(), Scope::Global);
        assert!(matches!(
            resolver().resolve("web", Some("../etc")),
            Err(EngineError::InvalidArgument { .. })
        ));
    }
}
