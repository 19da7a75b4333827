//! State tokens and the pending/target classification policy.
//!
//! A [`StateToken`] names the condition of an external entity at one poll
//! instant. Tokens only support equality; the engine never orders them.
//! [`StateSet`] holds the small fixed sets of pending and target tokens a
//! wait is configured with, and [`Classification`] is the verdict for one
//! observed token.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Opaque token naming an observed state, e.g. `"RUNNING"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateToken(String);

impl StateToken {
    /// Reserved token that, placed in a pending set, matches any token not
    /// explicitly listed as a target.
    pub const WILDCARD: &'static str = "*";

    /// Create a token from anything string-like.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The wildcard token.
    #[must_use]
    pub fn wildcard() -> Self {
        Self(Self::WILDCARD.to_owned())
    }

    /// Whether this is the wildcard token.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0 == Self::WILDCARD
    }

    /// Borrow the token text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StateToken {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for StateToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for StateToken {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for StateToken {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for StateToken {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A small set of state tokens.
///
/// Sets are tiny in practice (one to three entries), so membership is a
/// linear scan over inline storage. Duplicates are dropped on insert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateSet(SmallVec<[StateToken; 4]>);

impl StateSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a token, ignoring duplicates.
    pub fn insert(&mut self, token: impl Into<StateToken>) {
        let token = token.into();
        if !self.0.contains(&token) {
            self.0.push(token);
        }
    }

    /// Exact membership; the wildcard is treated as an ordinary token here.
    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    /// Whether the set carries the wildcard sentinel.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.0.iter().any(StateToken::is_wildcard)
    }

    /// Membership honouring the wildcard.
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        self.has_wildcard() || self.contains(token)
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the tokens in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &StateToken> {
        self.0.iter()
    }

    /// Tokens present in both sets, excluding the wildcard.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Vec<StateToken> {
        self.0
            .iter()
            .filter(|t| !t.is_wildcard() && other.contains(t.as_str()))
            .cloned()
            .collect()
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{token}")?;
        }
        f.write_str("]")
    }
}

impl<T: Into<StateToken>> FromIterator<T> for StateSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Self::new();
        for token in iter {
            set.insert(token);
        }
        set
    }
}

impl<T: Into<StateToken>, const N: usize> From<[T; N]> for StateSet {
    fn from(tokens: [T; N]) -> Self {
        tokens.into_iter().collect()
    }
}

/// Verdict for one observed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Classification {
    /// The entity has converged.
    Target,
    /// Still in progress; keep polling.
    Pending,
    /// Neither pending nor target; a hard failure.
    Unexpected,
}

impl Classification {
    /// Classify `token` against the two sets.
    ///
    /// Target membership wins over a wildcard pending set, so `*` never
    /// swallows a converged state.
    #[must_use]
    pub fn of(token: &str, pending: &StateSet, target: &StateSet) -> Self {
        if target.contains(token) {
            Self::Target
        } else if pending.matches(token) {
            Self::Pending
        } else {
            Self::Unexpected
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Target => write!(f, "target"),
            Self::Pending => write!(f, "pending"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}
