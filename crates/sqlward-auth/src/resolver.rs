//! Token → credential resolution.

use std::collections::HashSet;
use std::sync::Arc;

use sqlward_cache::Snapshots;
use sqlward_state::{EdgeKind, Role, User};
use tracing::debug;

use crate::error::{AuthError, AuthResult};
use crate::token::TokenAuthority;

/// The resolved caller for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: User,
    pub roles: Vec<Role>,
}

impl Credential {
    pub fn has_role(&self, name: &str) -> bool {
        self.roles.iter().any(|r| r.name == name)
    }
}

#[derive(Clone)]
pub struct CredentialResolver {
    authority: Arc<TokenAuthority>,
    snapshots: Arc<Snapshots>,
}

impl CredentialResolver {
    pub fn new(authority: Arc<TokenAuthority>, snapshots: Arc<Snapshots>) -> Self {
        Self {
            authority,
            snapshots,
        }
    }

    pub fn authority(&self) -> &Arc<TokenAuthority> {
        &self.authority
    }

    /// Resolve `token` against published snapshots only; the primary store
    /// is never queried.
    pub fn resolve(&self, token: &str) -> AuthResult<Credential> {
        let claims = self.authority.verify(token)?;
        self.authority.check_fingerprint(&claims.uuid, token)?;

        let user = self
            .snapshots
            .user_by_uuid(&claims.uuid)
            .ok_or(AuthError::UnknownUser)?;

        let role_ids: HashSet<u64> = self
            .snapshots
            .edges
            .filter(|e| e.kind == EdgeKind::UserToRole && e.ancestor_id == user.id)
            .into_iter()
            .map(|e| e.descendant_id)
            .collect();
        if role_ids.is_empty() {
            debug!(user_uuid = %user.uuid, "no role edges");
            return Err(AuthError::NoRoleBinding);
        }

        let roles = self.snapshots.roles.filter(|r| role_ids.contains(&r.id));
        if roles.is_empty() {
            debug!(user_uuid = %user.uuid, "role edges point at unknown roles");
            return Err(AuthError::NoRoleBinding);
        }

        Ok(Credential { user, roles })
    }
}
