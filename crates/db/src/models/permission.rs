//! Per-member capabilities within a team.
//!
//! A membership stores its capabilities as a comma-joined list of tokens
//! (`view,edit,comment`). The team creator and `admin` members are allowed
//! everything regardless of that list.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use ts_rs::TS;

use crate::types::MemberRole;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    TS,
    EnumString,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
    Comment,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PermissionError {
    #[error("Permissions are required")]
    Empty,
    #[error("Unknown permission '{0}'")]
    Unknown(String),
}

/// Granted for memberships created through an invitation.
pub const DEFAULT_MEMBER_PERMISSIONS: &str = "view";
/// Granted to the creator of a team.
pub const ADMIN_PERMISSIONS: &str = "view,edit,comment";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Lenient read of a stored value: unknown tokens grant nothing.
    pub fn from_stored(raw: &str) -> Self {
        Self(
            tokens(raw)
                .filter_map(|token| Permission::from_str(token).ok())
                .collect(),
        )
    }

    /// Strict parse used before anything is written.
    pub fn parse(raw: &str) -> Result<Self, PermissionError> {
        let mut set = BTreeSet::new();
        for token in tokens(raw) {
            let permission = Permission::from_str(token)
                .map_err(|_| PermissionError::Unknown(token.to_string()))?;
            set.insert(permission);
        }
        if set.is_empty() {
            return Err(PermissionError::Empty);
        }
        Ok(Self(set))
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .0
            .iter()
            .map(Permission::to_string)
            .collect::<Vec<_>>()
            .join(",");
        f.write_str(&joined)
    }
}

fn tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|token| !token.is_empty())
}

/// What one user may do inside one team.
#[derive(Debug, Clone)]
pub struct TeamAccess {
    pub is_creator: bool,
    pub role: Option<MemberRole>,
    pub permissions: PermissionSet,
}

impl TeamAccess {
    pub fn new(is_creator: bool, role: Option<MemberRole>, permissions: &str) -> Self {
        Self {
            is_creator,
            role,
            permissions: PermissionSet::from_stored(permissions),
        }
    }

    /// Access of a user with no membership row in the team.
    pub fn outsider() -> Self {
        Self {
            is_creator: false,
            role: None,
            permissions: PermissionSet::default(),
        }
    }

    pub fn is_member(&self) -> bool {
        self.role.is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.is_creator || self.role == Some(MemberRole::Admin)
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.is_admin() || (self.is_member() && self.permissions.contains(permission))
    }

    /// Inviting users and changing member permissions.
    pub fn can_manage_members(&self) -> bool {
        self.is_admin()
    }
}
