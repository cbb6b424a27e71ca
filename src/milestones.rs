//! Milestone tags and the rules that govern them.
//!
//! Tags are a set-valued attribute of an application. The displayed stage is
//! never stored: it is projected from the current tag set on every read.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MilestoneTag {
    Applied,
    Oa,
    Interview,
    Offer,
    Rejected,
    Withdrew,
}

impl MilestoneTag {
    /// Declaration order, used when listing an application's tags.
    pub const ALL: [MilestoneTag; 6] = [
        MilestoneTag::Applied,
        MilestoneTag::Oa,
        MilestoneTag::Interview,
        MilestoneTag::Offer,
        MilestoneTag::Rejected,
        MilestoneTag::Withdrew,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            MilestoneTag::Applied => "APPLIED",
            MilestoneTag::Oa => "OA",
            MilestoneTag::Interview => "INTERVIEW",
            MilestoneTag::Offer => "OFFER",
            MilestoneTag::Rejected => "REJECTED",
            MilestoneTag::Withdrew => "WITHDREW",
        }
    }

    /// Tags removed from an application before this one is attached.
    pub fn conflicts(self) -> &'static [MilestoneTag] {
        CONFLICTS
            .iter()
            .find(|(tag, _)| *tag == self)
            .map(|(_, removed)| *removed)
            .unwrap_or(&[])
    }
}

impl fmt::Display for MilestoneTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMilestoneTag(pub String);

impl fmt::Display for UnknownMilestoneTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown milestone tag: {}", self.0)
    }
}

impl std::error::Error for UnknownMilestoneTag {}

impl FromStr for MilestoneTag {
    type Err = UnknownMilestoneTag;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MilestoneTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == value)
            .ok_or_else(|| UnknownMilestoneTag(value.to_string()))
    }
}

/// OFFER and WITHDREW intentionally do not clear each other.
const CONFLICTS: &[(MilestoneTag, &[MilestoneTag])] = &[
    (
        MilestoneTag::Rejected,
        &[MilestoneTag::Offer, MilestoneTag::Withdrew],
    ),
    (MilestoneTag::Offer, &[MilestoneTag::Rejected]),
    (MilestoneTag::Withdrew, &[MilestoneTag::Rejected]),
];

/// Highest priority first. APPLIED is the fallback and is not listed.
pub const STAGE_PRIORITY: [MilestoneTag; 5] = [
    MilestoneTag::Rejected,
    MilestoneTag::Withdrew,
    MilestoneTag::Offer,
    MilestoneTag::Interview,
    MilestoneTag::Oa,
];

pub fn derive_stage(tags: &HashSet<MilestoneTag>) -> MilestoneTag {
    STAGE_PRIORITY
        .into_iter()
        .find(|tag| tags.contains(tag))
        .unwrap_or(MilestoneTag::Applied)
}

/// Sorts into declaration order and drops duplicates.
pub fn ordered(tags: &HashSet<MilestoneTag>) -> Vec<MilestoneTag> {
    MilestoneTag::ALL
        .into_iter()
        .filter(|tag| tags.contains(tag))
        .collect()
}
