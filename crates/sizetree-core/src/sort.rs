//! Ordering policies for published file lists.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::record::FileRecord;

/// Sort mode for file listings.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SortMode {
    /// Size descending (largest first).
    #[default]
    SizeDescending,
    /// Size ascending (smallest first).
    SizeAscending,
    /// Name ascending (A-Z).
    NameAscending,
    /// Name descending (Z-A).
    NameDescending,
}

/// The attribute a [`SortMode`] orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SortKey {
    Size,
    Name,
}

impl SortMode {
    /// The default mode for a key: names ascend, sizes descend.
    pub fn for_key(key: SortKey) -> Self {
        match key {
            SortKey::Size => Self::SizeDescending,
            SortKey::Name => Self::NameAscending,
        }
    }

    /// Build a mode from a key and an explicit direction.
    pub fn new(key: SortKey, ascending: bool) -> Self {
        match (key, ascending) {
            (SortKey::Size, true) => Self::SizeAscending,
            (SortKey::Size, false) => Self::SizeDescending,
            (SortKey::Name, true) => Self::NameAscending,
            (SortKey::Name, false) => Self::NameDescending,
        }
    }

    /// Reverse the current sort direction.
    pub fn reverse(self) -> Self {
        match self {
            Self::SizeDescending => Self::SizeAscending,
            Self::SizeAscending => Self::SizeDescending,
            Self::NameAscending => Self::NameDescending,
            Self::NameDescending => Self::NameAscending,
        }
    }

    /// The attribute this mode orders by.
    pub fn key(self) -> SortKey {
        match self {
            Self::SizeDescending | Self::SizeAscending => SortKey::Size,
            Self::NameAscending | Self::NameDescending => SortKey::Name,
        }
    }

    /// Whether this mode orders smallest/first-alphabetical first.
    pub fn is_ascending(self) -> bool {
        matches!(self, Self::SizeAscending | Self::NameAscending)
    }

    /// Compare two records under this mode.
    pub fn compare(self, a: &FileRecord, b: &FileRecord) -> Ordering {
        match self {
            Self::SizeDescending => b.size.cmp(&a.size),
            Self::SizeAscending => a.size.cmp(&b.size),
            Self::NameAscending => compare_names(&a.name, &b.name),
            Self::NameDescending => compare_names(&b.name, &a.name),
        }
    }

    /// Stable-sort `records` in place.
    pub fn sort(self, records: &mut [FileRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

/// Case-insensitive, numeric-aware name comparison (`img_2` before `img_10`).
///
/// Names equal under case folding fall back to a case-sensitive comparison
/// so the order is total.
pub fn compare_names(a: &str, b: &str) -> Ordering {
    alphanumeric_sort::compare_str(a.to_lowercase(), b.to_lowercase())
        .then_with(|| alphanumeric_sort::compare_str(a, b))
}
