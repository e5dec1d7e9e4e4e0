//! Role catalog and the static role → partition policy.
//!
//! The policy is the single source of truth for what a role may read. Every
//! load goes through [`AccessPolicy::permitted_partitions`] or
//! [`AccessPolicy::authorize`] first.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::types::Partition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Finance,
    Marketing,
    Hr,
    Engineering,
    Executive,
    Employee,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Finance,
        Role::Marketing,
        Role::Hr,
        Role::Engineering,
        Role::Executive,
        Role::Employee,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Finance => "finance",
            Role::Marketing => "marketing",
            Role::Hr => "hr",
            Role::Engineering => "engineering",
            Role::Executive => "executive",
            Role::Employee => "employee",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let folded = s.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == folded)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

/// Immutable role → ordered partition list.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    table: BTreeMap<Role, Vec<Partition>>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl AccessPolicy {
    /// The organisation-wide policy.
    pub fn standard() -> Self {
        let p = |names: &[&str]| names.iter().map(|n| Partition::new(*n)).collect::<Vec<_>>();
        Self::from_table([
            (Role::Finance, p(&["finance", "marketing", "general"])),
            (Role::Marketing, p(&["marketing"])),
            (Role::Hr, p(&["hr"])),
            (Role::Engineering, p(&["engineering"])),
            (Role::Executive, p(&["marketing", "finance", "general", "hr", "engineering"])),
            (Role::Employee, p(&["general"])),
        ])
    }

    pub fn from_table<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Role, Vec<Partition>)>,
    {
        Self { table: entries.into_iter().collect() }
    }

    pub fn for_role(&self, role: Role) -> &[Partition] {
        self.table.get(&role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Case-insensitive lookup; unknown roles get an empty slice.
    pub fn permitted_partitions(&self, role: &str) -> &[Partition] {
        match role.parse::<Role>() {
            Ok(r) => self.for_role(r),
            Err(_) => &[],
        }
    }

    /// Like [`Self::permitted_partitions`] but turns "no access" into
    /// [`Error::AuthorizationEmpty`] so callers cannot mistake it for an
    /// empty corpus.
    pub fn authorize(&self, role: &str) -> Result<(Role, Vec<Partition>)> {
        let denied = || Error::AuthorizationEmpty { role: role.to_string() };
        let parsed: Role = role.parse().map_err(|_| denied())?;
        let partitions = self.for_role(parsed);
        if partitions.is_empty() {
            return Err(denied());
        }
        Ok((parsed, partitions.to_vec()))
    }

    pub fn is_permitted(&self, role: Role, partition: &Partition) -> bool {
        self.for_role(role).contains(partition)
    }

    pub fn entries(&self) -> impl Iterator<Item = (Role, &[Partition])> {
        self.table.iter().map(|(r, p)| (*r, p.as_slice()))
    }
}
