//! Shared domain enumerations.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Row-level mutation kind carried by a change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOperation {
    Insert,
    Update,
    Delete,
}

impl ChangeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOperation::Insert => "insert",
            ChangeOperation::Update => "update",
            ChangeOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeOperation {
    type Err = DomainError;

    /// Accepts both `insert` and the upper-case `INSERT` form emitted by change feeds.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "insert" => Ok(ChangeOperation::Insert),
            "update" => Ok(ChangeOperation::Update),
            "delete" => Ok(ChangeOperation::Delete),
            _ => Err(DomainError::unknown_operation(value)),
        }
    }
}

/// Known site-configuration groups, keyed by their `setting_key` in the remote table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SettingGroup {
    Identity,
    Branding,
    Theme,
    Seo,
    Contact,
}

impl SettingGroup {
    pub const ALL: [SettingGroup; 5] = [
        SettingGroup::Identity,
        SettingGroup::Branding,
        SettingGroup::Theme,
        SettingGroup::Seo,
        SettingGroup::Contact,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SettingGroup::Identity => "site_identity",
            SettingGroup::Branding => "branding",
            SettingGroup::Theme => "theme",
            SettingGroup::Seo => "seo",
            SettingGroup::Contact => "contact",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|group| group.as_str() == key)
    }
}
