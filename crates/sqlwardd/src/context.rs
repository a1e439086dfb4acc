//! Wiring of the sqlward subsystems from one configuration.

use std::sync::Arc;

use anyhow::Context;
use sqlward_auth::{CredentialResolver, Gate, TokenAuthority};
use sqlward_cache::Snapshots;
use sqlward_core::SqlwardConfig;
use sqlward_exec::{
    ExecutionEngine, MySqlConnector, SecretCodec, SentinelWriter, TicketLifecycle,
};
use sqlward_state::{Notifier, StateError, StateStore, TracingNotifier};
use tracing::info;

pub struct AppContext {
    pub config: SqlwardConfig,
    pub store: StateStore,
    pub snapshots: Arc<Snapshots>,
    pub notifier: Arc<dyn Notifier>,
    pub authority: Arc<TokenAuthority>,
    pub gate: Gate,
}

impl AppContext {
    /// Open the store and build the in-memory services. Snapshots start
    /// empty; callers decide when to load them.
    pub fn build(config: SqlwardConfig) -> anyhow::Result<Self> {
        let store = open_store(&config)?;
        Self::with_store(config, store)
    }

    pub fn with_store(config: SqlwardConfig, store: StateStore) -> anyhow::Result<Self> {
        let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        let snapshots = Arc::new(Snapshots::new(config.refresh.deadline()));
        let authority = Arc::new(
            TokenAuthority::new(&config.secrets.token_secret, config.token.ttl())?
                .with_notifier(Arc::clone(&notifier)),
        );
        let gate = Gate::new(CredentialResolver::new(
            Arc::clone(&authority),
            Arc::clone(&snapshots),
        ));
        Ok(Self {
            config,
            store,
            snapshots,
            notifier,
            authority,
            gate,
        })
    }

    pub fn codec(&self) -> anyhow::Result<SecretCodec> {
        SecretCodec::new(&self.config.secrets.cipher_key).context("invalid cipher key")
    }

    pub fn lifecycle(&self) -> TicketLifecycle {
        TicketLifecycle::new(self.store.clone(), Arc::clone(&self.notifier))
    }

    pub fn engine(&self) -> anyhow::Result<ExecutionEngine> {
        let execution = &self.config.execution;
        let mut engine = ExecutionEngine::new(
            self.store.clone(),
            Arc::new(MySqlConnector::new(execution.connect_timeout())),
            self.codec()?,
            Arc::clone(&self.notifier),
        )
        .with_statement_timeout(execution.statement_timeout());
        if let Some(dir) = &execution.sentinel_dir {
            engine = engine.with_sentinel(SentinelWriter::new(dir));
        }
        Ok(engine)
    }
}

/// Whether `err` came from another process holding the store file.
pub fn is_store_locked(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StateError>(), Some(StateError::Locked(_)))
}

fn open_store(config: &SqlwardConfig) -> anyhow::Result<StateStore> {
    let path = &config.store.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating store directory {}", parent.display()))?;
    }
    match StateStore::open(path) {
        Ok(store) => {
            info!(path = %path.display(), "state store opened");
            Ok(store)
        }
        Err(e @ StateError::Locked(_)) => Err(anyhow::Error::new(e).context(format!(
            "store {} is locked by another sqlwardd process",
            path.display()
        ))),
        Err(e) => Err(e).with_context(|| format!("opening store {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlward_state::{Edge, EdgeKind, Role, User, UserStatus};

    fn config(dir: &std::path::Path) -> SqlwardConfig {
        SqlwardConfig::from_toml_str(&format!(
            r#"
[store]
path = "{}"

[secrets]
token_secret = "token-secret"
cipher_key = "cipher-key"
"#,
            dir.join("data").join("sqlward.redb").display()
        ))
        .unwrap()
    }

    #[test]
    fn second_open_reports_lock() {
        let dir = tempfile::tempdir().unwrap();
        let _first = AppContext::build(config(dir.path())).unwrap();
        let err = AppContext::build(config(dir.path())).err().unwrap();
        assert!(err.to_string().contains("locked"), "{err}");
        assert!(is_store_locked(&err));

        // A plain file where the store directory should be.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let other = AppContext::build(config(&blocker)).err().unwrap();
        assert!(!is_store_locked(&other), "{other}");
    }

    #[tokio::test]
    async fn gate_sees_loaded_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config(dir.path())).unwrap();
        let user = User {
            id: 1,
            uuid: "u-1".into(),
            username: "alice".into(),
            real_name: "Alice".into(),
            email: "alice@example.com".into(),
            status: UserStatus::Normal,
        };
        ctx.store.put_user(&user).unwrap();
        ctx.store
            .put_role(&Role {
                id: 10,
                name: "dba".into(),
                description: String::new(),
            })
            .unwrap();
        ctx.store
            .insert_edge(&Edge::new(EdgeKind::UserToRole, 1, 10))
            .unwrap();

        let token = ctx.authority.issue(&user).unwrap().token;
        // Nothing loaded yet.
        assert!(ctx.gate.check(Some(&token), &["dba"]).is_err());

        ctx.snapshots.refresh_all(&ctx.store).await;
        let credential = ctx.gate.check(Some(&token), &["dba"]).unwrap();
        assert_eq!(credential.user.uuid, "u-1");
    }

    #[test]
    fn engine_and_codec_share_the_key() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::build(config(dir.path())).unwrap();
        let sealed = ctx.codec().unwrap().encrypt("hunter2").unwrap();
        assert_eq!(ctx.codec().unwrap().decrypt(&sealed).unwrap(), "hunter2");
        assert!(ctx.engine().is_ok());
    }
}
