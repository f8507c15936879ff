//! Validated identities under test.
//!
//! A [`Key`] is either an IP address or a player id. Keys are validated once, at parse time,
//! so everything downstream (cache, quota accounting, dispatch) can assume a well-formed key.

use serde::{Deserialize, Serialize};
use std::{fmt, net::IpAddr, str::FromStr};
use thiserror::Error;
use uuid::Uuid;

/// Errors produced when parsing a [`Key`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// Input was empty or whitespace.
    #[error("key is empty")]
    Empty,

    /// Input is neither an IP address nor a player id.
    #[error("malformed key: {0}")]
    Malformed(String),
}

/// Kind of identity a key carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    Ip,
    Player,
}

impl KeyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ip => "ip",
            Self::Player => "player",
        }
    }
}

/// Immutable identity checked against reputation sources.
///
/// Used as the cache index, the in-flight de-duplication index and the argument handed to
/// every source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Key {
    /// IPv4 (dotted) or IPv6 (colon) address.
    Ip(IpAddr),
    /// Application-defined player id.
    Player(Uuid),
}

impl Key {
    #[must_use]
    pub fn kind(&self) -> KeyKind {
        match self {
            Self::Ip(_) => KeyKind::Ip,
            Self::Player(_) => KeyKind::Player,
        }
    }

    #[must_use]
    pub fn as_ip(&self) -> Option<IpAddr> {
        match self {
            Self::Ip(ip) => Some(*ip),
            Self::Player(_) => None,
        }
    }

    #[must_use]
    pub fn as_player(&self) -> Option<Uuid> {
        match self {
            Self::Player(id) => Some(*id),
            Self::Ip(_) => None,
        }
    }
}

impl FromStr for Key {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(KeyError::Empty);
        }

        if let Ok(ip) = trimmed.parse::<IpAddr>() {
            return Ok(Self::Ip(ip));
        }

        // Dotted input that failed IP parsing (e.g. "999.999.1.1") is never a player id.
        if trimmed.contains('.') {
            return Err(KeyError::Malformed(trimmed.to_string()));
        }

        Uuid::parse_str(trimmed)
            .map(Self::Player)
            .map_err(|_| KeyError::Malformed(trimmed.to_string()))
    }
}

impl TryFrom<String> for Key {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Key> for String {
    fn from(key: Key) -> Self {
        key.to_string()
    }
}

impl From<IpAddr> for Key {
    fn from(ip: IpAddr) -> Self {
        Self::Ip(ip)
    }
}

impl From<Uuid> for Key {
    fn from(id: Uuid) -> Self {
        Self::Player(id)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ip(ip) => write!(f, "{ip}"),
            Self::Player(id) => write!(f, "{}", id.hyphenated()),
        }
    }
}
