use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;

use parlor_db::{Store, blocking};
use parlor_types::models::FollowStatus;

/// How follow edges combine into DM permission.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DmPolicy {
    /// Both users follow each other
    #[default]
    Mutual,
    /// At least one follows the other
    Either,
    /// Unrecognised mode; nobody may DM. Keeps the configured string for logs.
    Closed(String),
}

impl DmPolicy {
    pub fn allows(&self, a_follows_b: bool, b_follows_a: bool) -> bool {
        match self {
            Self::Mutual => a_follows_b && b_follows_a,
            Self::Either => a_follows_b || b_follows_a,
            Self::Closed(_) => false,
        }
    }
}

impl FromStr for DmPolicy {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "mutual" => Self::Mutual,
            "either" => Self::Either,
            other => Self::Closed(other.to_string()),
        })
    }
}

impl fmt::Display for DmPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mutual => f.write_str("mutual"),
            Self::Either => f.write_str("either"),
            Self::Closed(raw) => write!(f, "closed ({:?})", raw),
        }
    }
}

/// Decides whether two users may exchange direct messages.
#[derive(Clone)]
pub struct DmGate {
    policy: DmPolicy,
    store: Arc<dyn Store>,
}

impl DmGate {
    pub fn new(policy: DmPolicy, store: Arc<dyn Store>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &DmPolicy {
        &self.policy
    }

    /// Fails closed on empty or identical ids without touching the store.
    /// Lookup errors are returned, never treated as permission.
    pub async fn can_dm(&self, a: &str, b: &str) -> Result<bool> {
        if a.is_empty() || b.is_empty() || a == b {
            return Ok(false);
        }

        let store = self.store.clone();
        let (a, b) = (a.to_string(), b.to_string());
        let (a_follows_b, b_follows_a) = blocking(move || {
            let forward = store.follow_status(&a, &b)? == Some(FollowStatus::Accepted);
            let backward = store.follow_status(&b, &a)? == Some(FollowStatus::Accepted);
            Ok((forward, backward))
        })
        .await?;

        Ok(self.policy.allows(a_follows_b, b_follows_a))
    }
}
