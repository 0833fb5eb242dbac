//! Account role → governance roles + default dashboard mode.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::role::{AccountRole, GovernanceRole, UiMode};

/// Result of mapping a stored account role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleProfile {
    pub account_role: AccountRole,
    pub roles: BTreeSet<GovernanceRole>,
    pub default_mode: UiMode,
}

/// Map a stored account role to its governance roles and default UI mode.
///
/// Total over [`AccountRole`]; a plain viewer maps to no governance roles.
pub fn map_account_role(role: AccountRole) -> RoleProfile {
    let (roles, default_mode): (&[GovernanceRole], UiMode) = match role {
        AccountRole::Admin => (
            &[GovernanceRole::Cto, GovernanceRole::Architect],
            UiMode::Governance,
        ),
        AccountRole::Operator => (
            &[GovernanceRole::TechLead, GovernanceRole::Sre],
            UiMode::Operations,
        ),
        AccountRole::Viewer => (&[], UiMode::Observer),
    };

    RoleProfile {
        account_role: role,
        roles: roles.iter().copied().collect(),
        default_mode,
    }
}
