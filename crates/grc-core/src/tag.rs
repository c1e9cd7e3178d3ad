//! # Approval Version Tags
//!
//! Every approval row carries a tag `u<N>` (user submission) or `r<N>`
//! (reviewer decision). `N` is a positive integer, monotonic per family
//! within one identifier. The two families are numbered independently, so
//! `u3` and `r3` coexist.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::GrcError;

/// The family letter of an approval tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TagFamily {
    /// User-submitted edit (`u`).
    #[serde(rename = "u")]
    User,
    /// Reviewer decision (`r`).
    #[serde(rename = "r")]
    Reviewer,
}

impl TagFamily {
    /// The single-letter prefix.
    pub fn letter(self) -> char {
        match self {
            Self::User => 'u',
            Self::Reviewer => 'r',
        }
    }
}

impl std::fmt::Display for TagFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A parsed approval tag such as `u3` or `r1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApprovalTag {
    family: TagFamily,
    number: u32,
}

impl ApprovalTag {
    /// Build a tag. `number` must be positive.
    pub fn new(family: TagFamily, number: u32) -> Result<Self, GrcError> {
        if number == 0 {
            return Err(GrcError::InvariantViolation(format!(
                "approval tag numbers start at 1, got {}0",
                family.letter()
            )));
        }
        Ok(Self { family, number })
    }

    /// Build from a number that is positive by type.
    pub fn from_nonzero(family: TagFamily, number: NonZeroU32) -> Self {
        Self {
            family,
            number: number.get(),
        }
    }

    /// The first tag of a family.
    pub fn first(family: TagFamily) -> Self {
        Self { family, number: 1 }
    }

    /// Parse a tag string. Returns `None` for anything that is not a
    /// family letter followed by a positive integer.
    pub fn parse(s: &str) -> Option<Self> {
        let mut chars = s.chars();
        let family = match chars.next()? {
            'u' | 'U' => TagFamily::User,
            'r' | 'R' => TagFamily::Reviewer,
            _ => return None,
        };
        let digits = chars.as_str();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let number: u32 = digits.parse().ok()?;
        if number == 0 {
            return None;
        }
        Some(Self { family, number })
    }

    /// The tag family.
    pub fn family(&self) -> TagFamily {
        self.family
    }

    /// The numeric part.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// The next tag in the same family.
    pub fn next(&self) -> Self {
        Self {
            family: self.family,
            number: self.number.saturating_add(1),
        }
    }
}

impl std::fmt::Display for ApprovalTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.family.letter(), self.number)
    }
}

impl std::str::FromStr for ApprovalTag {
    type Err = GrcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| GrcError::field("version", format!("'{s}' is not a u<N>/r<N> tag")))
    }
}

impl TryFrom<String> for ApprovalTag {
    type Error = GrcError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ApprovalTag> for String {
    fn from(tag: ApprovalTag) -> String {
        tag.to_string()
    }
}
