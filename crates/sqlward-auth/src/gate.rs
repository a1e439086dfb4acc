//! Role-based authorization.

use sqlward_state::UserStatus;
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::resolver::{Credential, CredentialResolver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Unauthenticated,
    AccountDisabled,
    AwaitingVerification,
    InsufficientPrivilege,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DenyReason::Unauthenticated => "unauthenticated",
            DenyReason::AccountDisabled => "account disabled",
            DenyReason::AwaitingVerification => "awaiting verification",
            DenyReason::InsufficientPrivilege => "insufficient privilege",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn into_result(self) -> AuthResult<()> {
        match self {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => Err(AuthError::Forbidden(reason)),
        }
    }
}

/// Decide whether `credential` may act with any of `required_roles`.
pub fn authorize(credential: Option<&Credential>, required_roles: &[&str]) -> Decision {
    let Some(credential) = credential else {
        return Decision::Deny(DenyReason::Unauthenticated);
    };
    match credential.user.status {
        UserStatus::Blocked => Decision::Deny(DenyReason::AccountDisabled),
        UserStatus::Pending => Decision::Deny(DenyReason::AwaitingVerification),
        UserStatus::Normal => {
            if required_roles.iter().any(|name| credential.has_role(name)) {
                Decision::Allow
            } else {
                Decision::Deny(DenyReason::InsufficientPrivilege)
            }
        }
    }
}

/// Resolution and authorization for a raw bearer token.
#[derive(Clone)]
pub struct Gate {
    resolver: CredentialResolver,
}

impl Gate {
    pub fn new(resolver: CredentialResolver) -> Self {
        Self { resolver }
    }

    pub fn check(&self, token: Option<&str>, required_roles: &[&str]) -> AuthResult<Credential> {
        let Some(token) = token else {
            return Err(AuthError::Forbidden(DenyReason::Unauthenticated));
        };
        let credential = self.resolver.resolve(token)?;
        let decision = authorize(Some(&credential), required_roles);
        debug!(user_uuid = %credential.user.uuid, ?decision, "authorization decided");
        decision.into_result()?;
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use sqlward_cache::Snapshots;
    use sqlward_state::{Edge, EdgeKind, Role, User};

    use crate::token::TokenAuthority;

    fn credential(status: UserStatus, roles: &[&str]) -> Credential {
        Credential {
            user: User {
                id: 1,
                uuid: "u-1".into(),
                username: "alice".into(),
                real_name: String::new(),
                email: String::new(),
                status,
            },
            roles: roles
                .iter()
                .enumerate()
                .map(|(i, name)| Role {
                    id: i as u64,
                    name: name.to_string(),
                    description: String::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn decision_table() {
        let normal = credential(UserStatus::Normal, &["developer"]);
        let blocked = credential(UserStatus::Blocked, &["admin"]);
        let pending = credential(UserStatus::Pending, &["admin"]);

        assert_eq!(
            authorize(None, &["admin"]),
            Decision::Deny(DenyReason::Unauthenticated)
        );
        assert_eq!(
            authorize(Some(&blocked), &["admin"]),
            Decision::Deny(DenyReason::AccountDisabled)
        );
        assert_eq!(
            authorize(Some(&pending), &["admin"]),
            Decision::Deny(DenyReason::AwaitingVerification)
        );
        assert_eq!(
            authorize(Some(&normal), &["admin"]),
            Decision::Deny(DenyReason::InsufficientPrivilege)
        );
        assert_eq!(
            authorize(Some(&normal), &["admin", "developer"]),
            Decision::Allow
        );
        assert_eq!(
            authorize(Some(&normal), &[]),
            Decision::Deny(DenyReason::InsufficientPrivilege)
        );
    }

    #[test]
    fn deny_reason_texts() {
        assert_eq!(DenyReason::Unauthenticated.to_string(), "unauthenticated");
        assert_eq!(DenyReason::AccountDisabled.to_string(), "account disabled");
        assert_eq!(
            DenyReason::AwaitingVerification.to_string(),
            "awaiting verification"
        );
        assert_eq!(
            DenyReason::InsufficientPrivilege.to_string(),
            "insufficient privilege"
        );
        assert_eq!(
            Decision::Deny(DenyReason::AccountDisabled).into_result(),
            Err(AuthError::Forbidden(DenyReason::AccountDisabled))
        );
    }

    #[test]
    fn gate_checks_token_then_roles() {
        let snapshots = Snapshots::new(Duration::from_secs(1));
        let alice = credential(UserStatus::Normal, &[]).user;
        snapshots.users.publish(vec![alice.clone()]);
        snapshots.roles.publish(vec![Role {
            id: 5,
            name: "reviewer".into(),
            description: String::new(),
        }]);
        snapshots
            .edges
            .publish(vec![Edge::new(EdgeKind::UserToRole, alice.id, 5)]);
        let authority = Arc::new(TokenAuthority::new("secret", Duration::from_secs(60)).unwrap());
        let gate = Gate::new(CredentialResolver::new(
            Arc::clone(&authority),
            Arc::new(snapshots),
        ));
        let token = authority.issue(&alice).unwrap().token;

        assert_eq!(
            gate.check(None, &["reviewer"]),
            Err(AuthError::Forbidden(DenyReason::Unauthenticated))
        );
        assert_eq!(
            gate.check(Some(&token), &["admin"]),
            Err(AuthError::Forbidden(DenyReason::InsufficientPrivilege))
        );
        let credential = gate.check(Some(&token), &["reviewer"]).unwrap();
        assert_eq!(credential.user.uuid, "u-1");
    }
}
