use crate::auth::{ANONYMOUS, Identity};
use serde::{Deserialize, Serialize};

/// Grants a named permission to a list of principals. Principals may be
/// literal user names or the markers `$all`, `$authenticated`, `$anonymous`.
/// The permission name `*` matches any permission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub permission: String,
    pub principals: Vec<String>,
}

impl PermissionGrant {
    pub fn open(permission: impl Into<String>) -> Self {
        Self {
            permission: permission.into(),
            principals: vec!["$all".to_string()],
        }
    }
}

/// The read-only permission set consulted before a protected handler runs.
/// Built once from configuration; permissions with no grant are denied.
#[derive(Debug, Clone, Default)]
pub struct Acl {
    grants: Vec<PermissionGrant>,
}

impl Acl {
    pub fn new(grants: Vec<PermissionGrant>) -> Self {
        Self { grants }
    }

    /// Everything granted to everyone, the open-access policy.
    pub fn open() -> Self {
        Self::new(vec![PermissionGrant::open("*")])
    }

    /// An exact-name grant always wins over the `*` wildcard, regardless of
    /// the order grants were supplied in; configuration sources that hand us
    /// grants in hash order must not change authorization decisions.
    fn grant_for(&self, permission: &str) -> Option<&PermissionGrant> {
        self.grants
            .iter()
            .find(|grant| grant.permission == permission)
            .or_else(|| self.grants.iter().find(|grant| grant.permission == "*"))
    }

    pub fn allowed(&self, identity: Option<&Identity>, permission: &str) -> bool {
        self.grant_for(permission)
            .map(|grant| permits(&grant.principals, identity))
            .unwrap_or(false)
    }
}

fn permits(principals: &[String], identity: Option<&Identity>) -> bool {
    if principals.is_empty() {
        return false;
    }

    let user = identity.map(Identity::as_str);
    principals.iter().any(|principal| match principal.as_str() {
        "$all" | "@all" => true,
        "$anonymous" | "@anonymous" => user.is_none() || user == Some(ANONYMOUS),
        "$authenticated" | "@authenticated" => user.is_some_and(|name| name != ANONYMOUS),
        other => user == Some(other),
    })
}
