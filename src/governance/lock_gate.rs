//! Environment lock gate.
//!
//! Two states, Locked and Unlocked. An actor may flip the state when their
//! account rank meets the lock's `required_role`. DEV can only be locked by
//! an admin, whatever `required_role` says.

use serde::Serialize;
use thiserror::Error;

use crate::models::environment::Environment;
use crate::models::lock::EnvironmentLock;
use crate::models::role::AccountRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockGate {
    pub can_lock: bool,
    pub can_unlock: bool,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LockError {
    #[error("{0} is already locked")]
    AlreadyLocked(Environment),

    #[error("{0} is not locked")]
    NotLocked(Environment),

    #[error("role '{role}' may not {verb} {environment}")]
    Denied {
        environment: Environment,
        role: AccountRole,
        verb: &'static str,
    },
}

fn meets(actor: AccountRole, required: AccountRole) -> bool {
    actor.rank() >= required.rank()
}

pub fn can_unlock(lock: &EnvironmentLock, actor: AccountRole) -> bool {
    lock.is_locked && meets(actor, lock.required_role)
}

pub fn can_lock(lock: &EnvironmentLock, actor: AccountRole) -> bool {
    if lock.is_locked {
        return false;
    }
    if lock.environment == Environment::Dev {
        return actor == AccountRole::Admin;
    }
    meets(actor, lock.required_role)
}

pub fn evaluate(lock: &EnvironmentLock, actor: AccountRole) -> LockGate {
    LockGate {
        can_lock: can_lock(lock, actor),
        can_unlock: can_unlock(lock, actor),
    }
}

/// Like [`can_lock`], but explains a refusal.
pub fn check_lock(lock: &EnvironmentLock, actor: AccountRole) -> Result<(), LockError> {
    if lock.is_locked {
        return Err(LockError::AlreadyLocked(lock.environment));
    }
    if !can_lock(lock, actor) {
        return Err(LockError::Denied {
            environment: lock.environment,
            role: actor,
            verb: "lock",
        });
    }
    Ok(())
}

/// Like [`can_unlock`], but explains a refusal.
pub fn check_unlock(lock: &EnvironmentLock, actor: AccountRole) -> Result<(), LockError> {
    if !lock.is_locked {
        return Err(LockError::NotLocked(lock.environment));
    }
    if !can_unlock(lock, actor) {
        return Err(LockError::Denied {
            environment: lock.environment,
            role: actor,
            verb: "unlock",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: [AccountRole; 3] = [AccountRole::Admin, AccountRole::Operator, AccountRole::Viewer];

    fn lock(env: Environment, is_locked: bool, required_role: AccountRole) -> EnvironmentLock {
        EnvironmentLock {
            is_locked,
            required_role,
            ..EnvironmentLock::seed(env)
        }
    }

    #[test]
    fn test_dev_lock_is_admin_only() {
        for required in ROLES {
            let l = lock(Environment::Dev, false, required);
            assert!(can_lock(&l, AccountRole::Admin));
            assert!(!can_lock(&l, AccountRole::Operator), "operator locked DEV with required={:?}", required);
            assert!(!can_lock(&l, AccountRole::Viewer));
        }
    }

    #[test]
    fn test_dev_unlock_follows_required_role() {
        let l = lock(Environment::Dev, true, AccountRole::Operator);
        assert!(can_unlock(&l, AccountRole::Operator));
        assert!(!can_unlock(&l, AccountRole::Viewer));
    }

    #[test]
    fn test_unlock_is_noop_when_unlocked() {
        for env in Environment::ALL {
            for required in ROLES {
                for actor in ROLES {
                    assert!(!can_unlock(&lock(env, false, required), actor));
                }
            }
        }
    }

    #[test]
    fn test_lock_is_noop_when_locked() {
        for actor in ROLES {
            assert!(!can_lock(&lock(Environment::Prod, true, AccountRole::Viewer), actor));
        }
    }

    #[test]
    fn test_rank_gates_unlock() {
        let prod = lock(Environment::Prod, true, AccountRole::Admin);
        assert!(can_unlock(&prod, AccountRole::Admin));
        assert!(!can_unlock(&prod, AccountRole::Operator));

        let qa = lock(Environment::Qa, true, AccountRole::Operator);
        assert!(can_unlock(&qa, AccountRole::Admin));
        assert!(can_unlock(&qa, AccountRole::Operator));
        assert!(!can_unlock(&qa, AccountRole::Viewer));
    }

    #[test]
    fn test_evaluate_combines_both_gates() {
        let staging = lock(Environment::Staging, false, AccountRole::Operator);
        assert_eq!(
            evaluate(&staging, AccountRole::Operator),
            LockGate { can_lock: true, can_unlock: false }
        );
    }

    #[test]
    fn test_check_explains_refusal() {
        let dev = lock(Environment::Dev, false, AccountRole::Operator);
        assert_eq!(
            check_lock(&dev, AccountRole::Operator),
            Err(LockError::Denied {
                environment: Environment::Dev,
                role: AccountRole::Operator,
                verb: "lock",
            })
        );
        assert_eq!(
            check_unlock(&dev, AccountRole::Admin),
            Err(LockError::NotLocked(Environment::Dev))
        );
        assert!(check_lock(&dev, AccountRole::Admin).is_ok());
    }
}
