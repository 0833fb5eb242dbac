use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::role_mapper::{map_account_role, RoleProfile};
use crate::models::environment::Environment;
use crate::models::role::{AccountRole, GovernanceRole};

/// Actions a governance role can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Approve,
    Deploy,
    Rollback,
    BreakGlass,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::View,
        Action::Approve,
        Action::Deploy,
        Action::Rollback,
        Action::BreakGlass,
    ];
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "view" => Ok(Action::View),
            "approve" => Ok(Action::Approve),
            "deploy" => Ok(Action::Deploy),
            "rollback" => Ok(Action::Rollback),
            "break_glass" | "breakglass" => Ok(Action::BreakGlass),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

use Environment::{Dev, Preprod, Prod, Qa, Staging};

const ALL_ENVS: &[Environment] = &Environment::ALL;

/// Static grant table: (action, environments) per governance role.
/// `View` is never listed; it is always allowed.
fn grants(role: GovernanceRole) -> &'static [(Action, &'static [Environment])] {
    match role {
        GovernanceRole::Cto => &[
            (Action::Approve, ALL_ENVS),
            (Action::Deploy, &[Preprod, Prod]),
            (Action::Rollback, ALL_ENVS),
            (Action::BreakGlass, &[Prod]),
        ],
        GovernanceRole::Architect => &[
            (Action::Approve, &[Staging, Preprod, Prod]),
            (Action::Rollback, &[Staging, Preprod]),
        ],
        GovernanceRole::TechLead => &[
            (Action::Approve, &[Dev, Qa, Staging]),
            (Action::Deploy, &[Dev, Qa, Staging]),
            (Action::Rollback, &[Dev, Qa, Staging]),
        ],
        GovernanceRole::Sre => &[
            (Action::Deploy, ALL_ENVS),
            (Action::Rollback, ALL_ENVS),
            (Action::BreakGlass, &[Preprod, Prod]),
        ],
    }
}

/// Union of grants across a set of governance roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PermissionSet {
    grants: BTreeMap<Action, BTreeSet<Environment>>,
}

impl PermissionSet {
    pub fn resolve<'a, I>(roles: I) -> Self
    where
        I: IntoIterator<Item = &'a GovernanceRole>,
    {
        let mut set = Self::default();
        for role in roles {
            for (action, envs) in grants(*role) {
                set.grants
                    .entry(*action)
                    .or_default()
                    .extend(envs.iter().copied());
            }
        }
        set
    }

    /// Allow iff the action is granted for the environment. `View` always passes.
    pub fn allows(&self, action: Action, environment: Environment) -> bool {
        if action == Action::View {
            return true;
        }
        self.grants
            .get(&action)
            .is_some_and(|envs| envs.contains(&environment))
    }

    /// Environments the action applies to. `View` covers every environment.
    pub fn environments_for(&self, action: Action) -> BTreeSet<Environment> {
        if action == Action::View {
            return Environment::ALL.into_iter().collect();
        }
        self.grants.get(&action).cloned().unwrap_or_default()
    }

    /// Full action → environments matrix, including `View`.
    pub fn matrix(&self) -> BTreeMap<Action, BTreeSet<Environment>> {
        Action::ALL
            .into_iter()
            .map(|a| (a, self.environments_for(a)))
            .filter(|(_, envs)| !envs.is_empty())
            .collect()
    }
}

/// Resolved permissions for the acting user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub user_id: String,
    #[serde(flatten)]
    pub profile: RoleProfile,
    #[serde(skip)]
    pub permissions: PermissionSet,
}

impl Actor {
    pub fn new(user_id: impl Into<String>, account_role: AccountRole) -> Self {
        let profile = map_account_role(account_role);
        let permissions = PermissionSet::resolve(&profile.roles);
        Self {
            user_id: user_id.into(),
            profile,
            permissions,
        }
    }

    pub fn account_role(&self) -> AccountRole {
        self.profile.account_role
    }

    pub fn can(&self, action: Action, environment: Environment) -> bool {
        self.permissions.allows(action, environment)
    }

    pub fn can_approve(&self, environment: Environment) -> bool {
        self.can(Action::Approve, environment)
    }

    /// Check the action, returning a denial message on failure.
    pub fn require(&self, action: Action, environment: Environment) -> Result<(), String> {
        if self.can(action, environment) {
            return Ok(());
        }
        tracing::warn!(
            user_id = %self.user_id,
            role = %self.account_role(),
            ?action,
            %environment,
            "governance access denied"
        );
        Err(format!(
            "role '{}' may not {:?} in {}",
            self.account_role(),
            action,
            environment
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_role_subsets() -> Vec<BTreeSet<GovernanceRole>> {
        let roles = GovernanceRole::ALL;
        (0..(1u32 << roles.len()))
            .map(|mask| {
                roles
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, r)| *r)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_viewer_is_view_only_everywhere() {
        let viewer = Actor::new("v", AccountRole::Viewer);
        for env in Environment::ALL {
            assert!(viewer.can(Action::View, env));
            for action in [Action::Approve, Action::Deploy, Action::Rollback, Action::BreakGlass] {
                assert!(!viewer.can(action, env), "viewer must not {:?} in {}", action, env);
            }
        }
    }

    #[test]
    fn test_admin_can_approve_everywhere() {
        let admin = Actor::new("a", AccountRole::Admin);
        for env in Environment::ALL {
            assert!(admin.can_approve(env));
        }
        assert!(admin.can(Action::BreakGlass, Environment::Prod));
        assert!(!admin.can(Action::Deploy, Environment::Dev));
    }

    #[test]
    fn test_operator_grants() {
        let op = Actor::new("o", AccountRole::Operator);
        assert!(op.can_approve(Environment::Staging));
        assert!(!op.can_approve(Environment::Prod));
        assert!(op.can(Action::Deploy, Environment::Prod));
        assert!(op.can(Action::BreakGlass, Environment::Preprod));
        assert!(!op.can(Action::BreakGlass, Environment::Dev));
    }

    #[test]
    fn test_action_requires_environment_in_union() {
        // Architect approves STAGING+, tech lead approves up to STAGING.
        let set = PermissionSet::resolve(&[GovernanceRole::Architect, GovernanceRole::TechLead]);
        assert!(set.allows(Action::Approve, Environment::Dev));
        assert!(set.allows(Action::Approve, Environment::Prod));
        // Rollback from architect stops at PREPROD, tech lead at STAGING.
        assert!(!set.allows(Action::Rollback, Environment::Prod));
        // Neither grants break glass.
        assert!(!set.allows(Action::BreakGlass, Environment::Prod));
    }

    #[test]
    fn test_broadening_roles_never_removes_permission() {
        let subsets = all_role_subsets();
        for smaller in &subsets {
            for larger in subsets.iter().filter(|l| smaller.is_subset(l)) {
                let small = PermissionSet::resolve(smaller);
                let large = PermissionSet::resolve(larger);
                for action in Action::ALL {
                    for env in Environment::ALL {
                        if small.allows(action, env) {
                            assert!(
                                large.allows(action, env),
                                "{:?} lost {:?}/{} when widened to {:?}",
                                smaller,
                                action,
                                env,
                                larger
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_matrix_omits_ungranted_actions() {
        let viewer = PermissionSet::resolve(&[]);
        let matrix = viewer.matrix();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[&Action::View].len(), Environment::ALL.len());
    }

    #[test]
    fn test_require_reports_denial() {
        let viewer = Actor::new("v", AccountRole::Viewer);
        let err = viewer.require(Action::Deploy, Environment::Prod).unwrap_err();
        assert!(err.contains("viewer"));
        assert!(err.contains("PROD"));
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("break-glass".parse::<Action>(), Ok(Action::BreakGlass));
        assert_eq!("Approve".parse::<Action>(), Ok(Action::Approve));
        assert!("delete".parse::<Action>().is_err());
    }
}
