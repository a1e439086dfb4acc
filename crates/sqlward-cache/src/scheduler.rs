//! Background refresh loops.
//!
//! Two tasks, one per timed [`RefreshGroup`]. Each awaits its refresh
//! inline, so a group never overlaps itself and an overrun only delays the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use sqlward_core::config::RefreshConfig;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::{RefreshGroup, SnapshotLoader, Snapshots};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshSchedule {
    pub fast: Duration,
    pub slow: Duration,
}

impl From<&RefreshConfig> for RefreshSchedule {
    fn from(config: &RefreshConfig) -> Self {
        Self {
            fast: config.fast_interval(),
            slow: config.slow_interval(),
        }
    }
}

/// Handles of the running refresh loops.
pub struct RefreshScheduler {
    handles: Vec<JoinHandle<()>>,
}

impl RefreshScheduler {
    /// Start the fast and slow loops. Snapshots are expected to be loaded
    /// already, so the first refresh happens one period after start.
    pub fn spawn<L: SnapshotLoader>(
        snapshots: Arc<Snapshots>,
        loader: L,
        schedule: RefreshSchedule,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let handles = [
            (RefreshGroup::Fast, schedule.fast),
            (RefreshGroup::Slow, schedule.slow),
        ]
        .into_iter()
        .map(|(group, period)| {
            tokio::spawn(run_group_loop(
                group,
                period,
                Arc::clone(&snapshots),
                loader.clone(),
                shutdown.clone(),
            ))
        })
        .collect();

        info!(
            fast_secs = schedule.fast.as_secs_f64(),
            slow_secs = schedule.slow.as_secs_f64(),
            "refresh scheduler started"
        );
        Self { handles }
    }

    /// Wait for both loops to exit after shutdown was signalled. A tick in
    /// progress is allowed to finish.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "refresh loop ended abnormally");
            }
        }
        info!("refresh scheduler stopped");
    }
}

async fn run_group_loop<L: SnapshotLoader>(
    group: RefreshGroup,
    period: Duration,
    snapshots: Arc<Snapshots>,
    loader: L,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        if *shutdown.borrow() {
            break;
        }
        tokio::select! {
            _ = ticker.tick() => {
                let outcomes = snapshots.refresh_group(&loader, group).await;
                let failed = outcomes.iter().filter(|(_, o)| !o.is_refreshed()).count();
                debug!(?group, failed, "refresh tick done");
            }
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    debug!(?group, "refresh loop shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use sqlward_state::*;

    use crate::registry::Entity;

    /// Loader that counts calls per entity and serves users from a shared
    /// vector the test can mutate.
    #[derive(Clone, Default)]
    struct CountingLoader {
        calls: Arc<Mutex<HashMap<Entity, usize>>>,
        users: Arc<Mutex<Vec<User>>>,
    }

    impl CountingLoader {
        fn hit(&self, entity: Entity) {
            *self.calls.lock().unwrap().entry(entity).or_default() += 1;
        }

        fn count(&self, entity: Entity) -> usize {
            self.calls.lock().unwrap().get(&entity).copied().unwrap_or(0)
        }
    }

    impl SnapshotLoader for CountingLoader {
        fn load_users(&self) -> StateResult<Vec<User>> {
            self.hit(Entity::Users);
            Ok(self.users.lock().unwrap().clone())
        }
        fn load_roles(&self) -> StateResult<Vec<Role>> {
            self.hit(Entity::Roles);
            Ok(Vec::new())
        }
        fn load_edges(&self) -> StateResult<Vec<Edge>> {
            self.hit(Entity::Edges);
            Ok(Vec::new())
        }
        fn load_clusters(&self) -> StateResult<Vec<Cluster>> {
            self.hit(Entity::Clusters);
            Err(StateError::Read("cluster table unavailable".into()))
        }
        fn load_rules(&self) -> StateResult<Vec<Rule>> {
            self.hit(Entity::Rules);
            Ok(Vec::new())
        }
        fn load_options(&self) -> StateResult<Vec<SystemOption>> {
            self.hit(Entity::Options);
            Ok(Vec::new())
        }
        fn load_statistics(&self) -> StateResult<Vec<Statistic>> {
            self.hit(Entity::Statistics);
            Ok(Vec::new())
        }
        fn load_glossaries(&self) -> StateResult<Vec<Glossary>> {
            self.hit(Entity::Glossaries);
            Ok(Vec::new())
        }
        fn load_avatars(&self) -> StateResult<Vec<Avatar>> {
            self.hit(Entity::Avatars);
            Ok(Vec::new())
        }
        fn load_templates(&self) -> StateResult<Vec<Template>> {
            self.hit(Entity::Templates);
            Ok(Vec::new())
        }
    }

    fn user(id: u64) -> User {
        User {
            id,
            uuid: format!("u-{id}"),
            username: format!("user{id}"),
            real_name: String::new(),
            email: String::new(),
            status: UserStatus::Normal,
        }
    }

    #[tokio::test]
    async fn loops_refresh_their_groups_until_shutdown() {
        let loader = CountingLoader::default();
        let snapshots = Arc::new(Snapshots::new(Duration::from_secs(1)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = RefreshScheduler::spawn(
            Arc::clone(&snapshots),
            loader.clone(),
            RefreshSchedule {
                fast: Duration::from_millis(20),
                slow: Duration::from_millis(50),
            },
            shutdown_rx,
        );

        loader.users.lock().unwrap().push(user(1));
        tokio::time::sleep(Duration::from_millis(300)).await;

        shutdown_tx.send(true).unwrap();
        scheduler.join().await;

        assert!(loader.count(Entity::Users) >= 3);
        assert!(loader.count(Entity::Edges) >= 3);
        assert!(loader.count(Entity::Clusters) >= 1);
        // Static entities are never on a timer.
        assert_eq!(loader.count(Entity::Roles), 0);
        assert_eq!(loader.count(Entity::Templates), 0);
        assert_eq!(snapshots.users.len(), 1);
        // Failing loads leave the empty startup snapshot in place.
        assert_eq!(snapshots.clusters.read_all().generation(), 0);

        let settled = loader.count(Entity::Users);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(loader.count(Entity::Users), settled);
    }

    #[tokio::test]
    async fn dropped_sender_stops_loops() {
        let loader = CountingLoader::default();
        let snapshots = Arc::new(Snapshots::new(Duration::from_secs(1)));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = RefreshScheduler::spawn(
            snapshots,
            loader,
            RefreshSchedule {
                fast: Duration::from_secs(3600),
                slow: Duration::from_secs(3600),
            },
            shutdown_rx,
        );
        drop(shutdown_tx);
        tokio::time::timeout(Duration::from_secs(2), scheduler.join())
            .await
            .unwrap();
    }

    #[test]
    fn schedule_from_config() {
        let config = RefreshConfig::default();
        let schedule = RefreshSchedule::from(&config);
        assert_eq!(schedule.fast, Duration::from_secs(10));
        assert_eq!(schedule.slow, Duration::from_secs(60));
    }
}
