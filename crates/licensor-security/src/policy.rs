//! ---
//! lic_section: "03-access-gateway"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Role based access policy for license operations."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::GatewayError;

/// Role granted to the issuer account.
pub const ISSUER_ROLE: &str = "issuer";
/// Read-only role.
pub const AUDITOR_ROLE: &str = "auditor";

/// Actions that can be performed against the license service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    /// Create, update and erase licenses.
    ManageLicenses,
    /// Bind and release licenses on behalf of entities.
    BindLicenses,
    /// Read individual licenses, dumps and counts.
    ReadLicenses,
}

/// A named set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Role identifier.
    pub name: String,
    /// Permissions attached to the role.
    pub permissions: HashSet<Permission>,
}

impl Role {
    /// Full access.
    pub fn issuer() -> Self {
        Self {
            name: ISSUER_ROLE.into(),
            permissions: HashSet::from([
                Permission::ManageLicenses,
                Permission::BindLicenses,
                Permission::ReadLicenses,
            ]),
        }
    }

    /// Read-only access.
    pub fn auditor() -> Self {
        Self {
            name: AUDITOR_ROLE.into(),
            permissions: HashSet::from([Permission::ReadLicenses]),
        }
    }
}

/// Role definitions and permission evaluation.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    roles: HashMap<String, Role>,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        let mut policy = Self {
            roles: HashMap::new(),
        };
        policy.insert_role(Role::issuer());
        policy.insert_role(Role::auditor());
        policy
    }
}

impl AccessPolicy {
    /// Policy with the built-in `issuer` and `auditor` roles.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a role definition.
    pub fn insert_role(&mut self, role: Role) {
        self.roles.insert(role.name.clone(), role);
    }

    /// Lookup a role by name.
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.roles.get(name)
    }

    /// Determine whether any of the provided role names grant the permission.
    pub fn is_authorized(
        &self,
        roles: &[String],
        permission: Permission,
    ) -> Result<bool, GatewayError> {
        for role_name in roles {
            let role = self
                .roles
                .get(role_name)
                .ok_or_else(|| GatewayError::UnknownRole(role_name.clone()))?;
            if role.permissions.contains(&permission) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roles_cover_permissions() {
        let policy = AccessPolicy::new();
        let issuer = [ISSUER_ROLE.to_owned()];
        let auditor = [AUDITOR_ROLE.to_owned()];
        assert!(policy.is_authorized(&issuer, Permission::ManageLicenses).unwrap());
        assert!(policy.is_authorized(&issuer, Permission::BindLicenses).unwrap());
        assert!(policy.is_authorized(&auditor, Permission::ReadLicenses).unwrap());
        assert!(!policy.is_authorized(&auditor, Permission::BindLicenses).unwrap());
        assert!(!policy.is_authorized(&[], Permission::ReadLicenses).unwrap());
    }

    #[test]
    fn unknown_role_is_an_error() {
        let policy = AccessPolicy::new();
        assert!(matches!(
            policy.is_authorized(&["root".into()], Permission::ReadLicenses),
            Err(GatewayError::UnknownRole(ref name)) if name == "root"
        ));
    }
}
