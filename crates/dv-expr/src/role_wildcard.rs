use std::sync::OnceLock;

use dv_runtime::{EvidenceLedger, RuntimePolicy, global_policy};
use serde::{Deserialize, Serialize};

use crate::ExprError;

/// Selects every column bound to any of an ordered list of roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct RoleWildcard {
    roles: Vec<String>,
    key: OnceLock<String>,
}

impl RoleWildcard {
    /// Build a wildcard from roles in their given order.
    ///
    /// An empty role list violates the constructor's precondition and is
    /// handled by the installed global policy.
    #[must_use]
    pub fn from_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        global_policy().enforce_untracked(!roles.is_empty(), "role_wildcard.from_roles", || {
            "roles must be non-empty".to_owned()
        });
        Self::new_unchecked(roles)
    }

    #[must_use]
    pub fn from_roles_with_policy<I, S>(
        roles: I,
        policy: &RuntimePolicy,
        ledger: &mut EvidenceLedger,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: Vec<String> = roles.into_iter().map(Into::into).collect();
        policy.enforce(
            !roles.is_empty(),
            "role_wildcard.from_roles",
            || "roles must be non-empty".to_owned(),
            ledger,
        );
        Self::new_unchecked(roles)
    }

    fn new_unchecked(roles: Vec<String>) -> Self {
        Self {
            roles,
            key: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Canonical key over the roles in their original order, derived on
    /// first use and cached for the life of the instance.
    #[must_use]
    pub fn key(&self) -> &str {
        self.key
            .get_or_init(|| serde_json::Value::from(self.roles.clone()).to_string())
    }

    fn has_key(&self) -> bool {
        !self.roles.is_empty()
    }
}

/// Key equality plus full, order-sensitive role equality. A wildcard with no
/// roles has no key and equals nothing.
#[must_use]
pub fn role_wildcard_equals(left: &RoleWildcard, right: &RoleWildcard) -> bool {
    left.has_key()
        && right.has_key()
        && left.key() == right.key()
        && left.roles == right.roles
}

impl PartialEq for RoleWildcard {
    fn eq(&self, other: &Self) -> bool {
        role_wildcard_equals(self, other)
    }
}

impl TryFrom<Vec<String>> for RoleWildcard {
    type Error = ExprError;

    fn try_from(roles: Vec<String>) -> Result<Self, Self::Error> {
        if roles.is_empty() {
            return Err(ExprError::EmptyRoleWildcard);
        }
        Ok(Self::new_unchecked(roles))
    }
}

impl From<RoleWildcard> for Vec<String> {
    fn from(wildcard: RoleWildcard) -> Self {
        wildcard.roles
    }
}
