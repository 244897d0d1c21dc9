//! Session types
//!
//! Provides:
//! - Role enum for the closed set of account roles
//! - Credential, the parsed form of a signed session token
//! - UserProfile, the user snapshot kept next to the token

use chrono::{DateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Roles an account can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    /// Regular traveller: browse, review, book
    User,
    /// Moderation and management access
    Admin,
    /// Business owner managing their listed places
    Partner,
    /// Community member submitting new places
    Contributor,
}

impl Role {
    /// Parse a role from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Role> {
        match s.trim().to_uppercase().as_str() {
            "USER" => Some(Role::User),
            "ADMIN" => Some(Role::Admin),
            "PARTNER" => Some(Role::Partner),
            "CONTRIBUTOR" => Some(Role::Contributor),
            _ => None,
        }
    }
}

// Case-insensitive, matching token payloads
impl<'de> Deserialize<'de> for Role {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Role::from_str(&s).ok_or_else(|| de::Error::custom(format!("unknown role: {}", s)))
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "USER"),
            Role::Admin => write!(f, "ADMIN"),
            Role::Partner => write!(f, "PARTNER"),
            Role::Contributor => write!(f, "CONTRIBUTOR"),
        }
    }
}

/// A parsed session token
///
/// The signature is never checked here; the backend verifies it on every
/// request. The client only reads the payload to decide what to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    /// The raw token, sent back as the bearer value
    pub raw: String,
    /// Role embedded in the payload
    pub role: Role,
    /// Expiry as seconds since epoch (None = never expires)
    pub exp: Option<i64>,
    /// Issued-at as seconds since epoch
    pub iat: Option<i64>,
    /// Subject / user identifier
    pub subject: Option<String>,
    /// Email, when the backend embeds it
    pub email: Option<String>,
}

impl Credential {
    /// Expiry as a timestamp, if the payload carries one
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|secs| Utc.timestamp_opt(secs, 0).single())
    }

    /// Check if the credential has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.exp {
            Some(exp) => now.timestamp() >= exp,
            None => false,
        }
    }

    /// Check whether the role is in `allowed`; an empty set admits any role
    pub fn is_allowed(&self, allowed: &HashSet<Role>) -> bool {
        allowed.is_empty() || allowed.contains(&self.role)
    }
}

/// Accept ids sent either as strings or numbers
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Str(String),
        Num(i64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Str(s) => s,
        Id::Num(n) => n.to_string(),
    })
}

/// User snapshot returned by login and kept beside the token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, alias = "fullName", alias = "name")]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}
