//! One snapshot slot per reference entity, grouped by refresh cadence.

use std::collections::HashSet;
use std::time::Duration;

use sqlward_state::*;
use tracing::info;

use crate::snapshot::{RefreshOutcome, SnapshotSlot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Users,
    Roles,
    Edges,
    Clusters,
    Rules,
    Options,
    Statistics,
    Glossaries,
    Avatars,
    Templates,
}

impl Entity {
    pub const ALL: [Entity; 10] = [
        Entity::Users,
        Entity::Roles,
        Entity::Edges,
        Entity::Clusters,
        Entity::Rules,
        Entity::Options,
        Entity::Statistics,
        Entity::Glossaries,
        Entity::Avatars,
        Entity::Templates,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Entity::Users => "users",
            Entity::Roles => "roles",
            Entity::Edges => "edges",
            Entity::Clusters => "clusters",
            Entity::Rules => "rules",
            Entity::Options => "options",
            Entity::Statistics => "statistics",
            Entity::Glossaries => "glossaries",
            Entity::Avatars => "avatars",
            Entity::Templates => "templates",
        }
    }

    pub fn group(self) -> RefreshGroup {
        match self {
            Entity::Edges | Entity::Users | Entity::Statistics => RefreshGroup::Fast,
            Entity::Clusters | Entity::Options | Entity::Rules => RefreshGroup::Slow,
            Entity::Roles | Entity::Glossaries | Entity::Avatars | Entity::Templates => {
                RefreshGroup::Static
            }
        }
    }
}

/// Refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshGroup {
    /// Frequently changing relations and accounts.
    Fast,
    Slow,
    /// Loaded at startup and refreshed on demand after mutations.
    Static,
}

impl RefreshGroup {
    pub fn entities(self) -> &'static [Entity] {
        match self {
            RefreshGroup::Fast => &[Entity::Edges, Entity::Users, Entity::Statistics],
            RefreshGroup::Slow => &[Entity::Clusters, Entity::Options, Entity::Rules],
            RefreshGroup::Static => &[
                Entity::Roles,
                Entity::Glossaries,
                Entity::Avatars,
                Entity::Templates,
            ],
        }
    }
}

/// Full-table reads backing the snapshots.
///
/// Implemented by [`StateStore`]; tests substitute their own source.
pub trait SnapshotLoader: Clone + Send + Sync + 'static {
    fn load_users(&self) -> StateResult<Vec<User>>;
    fn load_roles(&self) -> StateResult<Vec<Role>>;
    fn load_edges(&self) -> StateResult<Vec<Edge>>;
    fn load_clusters(&self) -> StateResult<Vec<Cluster>>;
    fn load_rules(&self) -> StateResult<Vec<Rule>>;
    fn load_options(&self) -> StateResult<Vec<SystemOption>>;
    fn load_statistics(&self) -> StateResult<Vec<Statistic>>;
    fn load_glossaries(&self) -> StateResult<Vec<Glossary>>;
    fn load_avatars(&self) -> StateResult<Vec<Avatar>>;
    fn load_templates(&self) -> StateResult<Vec<Template>>;
}

impl SnapshotLoader for StateStore {
    fn load_users(&self) -> StateResult<Vec<User>> {
        self.list_users()
    }

    fn load_roles(&self) -> StateResult<Vec<Role>> {
        self.list_roles()
    }

    fn load_edges(&self) -> StateResult<Vec<Edge>> {
        self.list_edges()
    }

    fn load_clusters(&self) -> StateResult<Vec<Cluster>> {
        self.list_clusters()
    }

    fn load_rules(&self) -> StateResult<Vec<Rule>> {
        self.list_rules()
    }

    fn load_options(&self) -> StateResult<Vec<SystemOption>> {
        self.list_options()
    }

    fn load_statistics(&self) -> StateResult<Vec<Statistic>> {
        self.list_statistics()
    }

    fn load_glossaries(&self) -> StateResult<Vec<Glossary>> {
        self.list_glossaries()
    }

    fn load_avatars(&self) -> StateResult<Vec<Avatar>> {
        self.list_avatars()
    }

    fn load_templates(&self) -> StateResult<Vec<Template>> {
        self.list_templates()
    }
}

/// Every reference snapshot the process serves from.
pub struct Snapshots {
    pub users: SnapshotSlot<User>,
    pub roles: SnapshotSlot<Role>,
    pub edges: SnapshotSlot<Edge>,
    pub clusters: SnapshotSlot<Cluster>,
    pub rules: SnapshotSlot<Rule>,
    pub options: SnapshotSlot<SystemOption>,
    pub statistics: SnapshotSlot<Statistic>,
    pub glossaries: SnapshotSlot<Glossary>,
    pub avatars: SnapshotSlot<Avatar>,
    pub templates: SnapshotSlot<Template>,
    deadline: Duration,
}

impl Snapshots {
    /// Empty snapshots; `deadline` bounds each store read during refresh.
    pub fn new(deadline: Duration) -> Self {
        Self {
            users: SnapshotSlot::new(Entity::Users.as_str()),
            roles: SnapshotSlot::new(Entity::Roles.as_str()),
            edges: SnapshotSlot::new(Entity::Edges.as_str()),
            clusters: SnapshotSlot::new(Entity::Clusters.as_str()),
            rules: SnapshotSlot::new(Entity::Rules.as_str()),
            options: SnapshotSlot::new(Entity::Options.as_str()),
            statistics: SnapshotSlot::new(Entity::Statistics.as_str()),
            glossaries: SnapshotSlot::new(Entity::Glossaries.as_str()),
            avatars: SnapshotSlot::new(Entity::Avatars.as_str()),
            templates: SnapshotSlot::new(Entity::Templates.as_str()),
            deadline,
        }
    }

    pub async fn refresh_entity<L: SnapshotLoader>(
        &self,
        loader: &L,
        entity: Entity,
    ) -> RefreshOutcome {
        let l = loader.clone();
        let deadline = self.deadline;
        match entity {
            Entity::Users => self.users.refresh(deadline, move || l.load_users()).await,
            Entity::Roles => self.roles.refresh(deadline, move || l.load_roles()).await,
            Entity::Edges => self.edges.refresh(deadline, move || l.load_edges()).await,
            Entity::Clusters => {
                self.clusters
                    .refresh(deadline, move || l.load_clusters())
                    .await
            }
            Entity::Rules => self.rules.refresh(deadline, move || l.load_rules()).await,
            Entity::Options => {
                self.options
                    .refresh(deadline, move || l.load_options())
                    .await
            }
            Entity::Statistics => {
                self.statistics
                    .refresh(deadline, move || l.load_statistics())
                    .await
            }
            Entity::Glossaries => {
                self.glossaries
                    .refresh(deadline, move || l.load_glossaries())
                    .await
            }
            Entity::Avatars => {
                self.avatars
                    .refresh(deadline, move || l.load_avatars())
                    .await
            }
            Entity::Templates => {
                self.templates
                    .refresh(deadline, move || l.load_templates())
                    .await
            }
        }
    }

    /// Refresh each entity of `group` in turn. A failure in one entity does
    /// not stop the others.
    pub async fn refresh_group<L: SnapshotLoader>(
        &self,
        loader: &L,
        group: RefreshGroup,
    ) -> Vec<(Entity, RefreshOutcome)> {
        let mut outcomes = Vec::with_capacity(group.entities().len());
        for &entity in group.entities() {
            outcomes.push((entity, self.refresh_entity(loader, entity).await));
        }
        outcomes
    }

    pub async fn refresh_fast<L: SnapshotLoader>(
        &self,
        loader: &L,
    ) -> Vec<(Entity, RefreshOutcome)> {
        self.refresh_group(loader, RefreshGroup::Fast).await
    }

    pub async fn refresh_slow<L: SnapshotLoader>(
        &self,
        loader: &L,
    ) -> Vec<(Entity, RefreshOutcome)> {
        self.refresh_group(loader, RefreshGroup::Slow).await
    }

    pub async fn refresh_static<L: SnapshotLoader>(
        &self,
        loader: &L,
    ) -> Vec<(Entity, RefreshOutcome)> {
        self.refresh_group(loader, RefreshGroup::Static).await
    }

    /// Load every entity; used at startup.
    pub async fn refresh_all<L: SnapshotLoader>(
        &self,
        loader: &L,
    ) -> Vec<(Entity, RefreshOutcome)> {
        let mut outcomes = Vec::with_capacity(Entity::ALL.len());
        for entity in Entity::ALL {
            outcomes.push((entity, self.refresh_entity(loader, entity).await));
        }
        let failed = outcomes.iter().filter(|(_, o)| !o.is_refreshed()).count();
        info!(entities = outcomes.len(), failed, "snapshots loaded");
        outcomes
    }

    pub fn user_by_uuid(&self, uuid: &str) -> Option<User> {
        self.users.lookup(uuid)
    }

    pub fn role_by_name(&self, name: &str) -> Option<Role> {
        self.roles.lookup(name)
    }

    pub fn option(&self, key: &str) -> Option<SystemOption> {
        self.options.lookup(key)
    }

    /// Descendant ids of `kind` edges rooted at `ancestor_id`.
    fn descendants(&self, kind: EdgeKind, ancestor_id: u64) -> HashSet<u64> {
        self.edges
            .read_all()
            .rows()
            .iter()
            .filter(|e| e.kind == kind && e.ancestor_id == ancestor_id)
            .map(|e| e.descendant_id)
            .collect()
    }

    pub fn roles_for_user(&self, user_id: u64) -> Vec<Role> {
        let ids = self.descendants(EdgeKind::UserToRole, user_id);
        if ids.is_empty() {
            return Vec::new();
        }
        self.roles.filter(|r| ids.contains(&r.id))
    }

    pub fn reviewers_for_user(&self, user_id: u64) -> Vec<User> {
        let ids = self.descendants(EdgeKind::UserToReviewer, user_id);
        self.users.filter(|u| ids.contains(&u.id))
    }

    pub fn clusters_for_user(&self, user_id: u64) -> Vec<Cluster> {
        let ids = self.descendants(EdgeKind::UserToCluster, user_id);
        self.clusters.filter(|c| ids.contains(&c.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn role(id: u64, name: &str) -> Role {
        Role {
            id,
            name: name.to_string(),
            description: String::new(),
        }
    }

    fn cluster(id: u64) -> Cluster {
        Cluster {
            id,
            name: format!("c{id}"),
            address: "127.0.0.1".into(),
            port: 3306,
            username: "root".into(),
            password: String::new(),
            status: ClusterStatus::Normal,
        }
    }

    fn seeded_store() -> StateStore {
        let store = StateStore::open_in_memory().unwrap();
        for id in 1..=3 {
            store.put_user(&user(id)).unwrap();
            store.put_cluster(&cluster(id)).unwrap();
        }
        store.put_role(&role(10, "admin")).unwrap();
        store.put_role(&role(11, "reviewer")).unwrap();
        store.put_role(&role(12, "developer")).unwrap();
        for edge in [
            Edge::new(EdgeKind::UserToRole, 1, 10),
            Edge::new(EdgeKind::UserToRole, 1, 12),
            Edge::new(EdgeKind::UserToRole, 2, 12),
            Edge::new(EdgeKind::UserToReviewer, 2, 1),
            Edge::new(EdgeKind::UserToCluster, 2, 3),
        ] {
            store.insert_edge(&edge).unwrap();
        }
        store
            .put_option(&SystemOption {
                id: 1,
                key: "osc.enabled".into(),
                value: serde_json::json!(true),
            })
            .unwrap();
        store
    }

    #[tokio::test]
    async fn refresh_all_mirrors_the_store() {
        let store = seeded_store();
        let snapshots = Snapshots::new(Duration::from_secs(2));

        let outcomes = snapshots.refresh_all(&store).await;
        assert_eq!(outcomes.len(), 10);
        assert!(outcomes.iter().all(|(_, o)| o.is_refreshed()));

        assert_eq!(snapshots.users.read_all().rows(), store.list_users().unwrap());
        assert_eq!(snapshots.edges.read_all().rows(), store.list_edges().unwrap());
        assert_eq!(snapshots.roles.len(), 3);
        assert!(snapshots.templates.is_empty());
    }

    #[tokio::test]
    async fn relation_helpers_follow_edge_kinds() {
        let store = seeded_store();
        let snapshots = Snapshots::new(Duration::from_secs(2));
        snapshots.refresh_all(&store).await;

        let names: Vec<String> = snapshots
            .roles_for_user(1)
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["admin", "developer"]);

        let reviewers = snapshots.reviewers_for_user(2);
        assert_eq!(reviewers.len(), 1);
        assert_eq!(reviewers[0].id, 1);

        // A reviewer edge is not a role binding.
        assert_eq!(snapshots.roles_for_user(2).len(), 1);
        assert_eq!(snapshots.clusters_for_user(2)[0].id, 3);
        assert!(snapshots.clusters_for_user(1).is_empty());
        assert!(snapshots.roles_for_user(3).is_empty());

        assert_eq!(snapshots.user_by_uuid("u-2").unwrap().id, 2);
        assert_eq!(snapshots.role_by_name("reviewer").unwrap().id, 11);
        assert_eq!(
            snapshots.option("osc.enabled").unwrap().value,
            serde_json::json!(true)
        );
    }

    #[tokio::test]
    async fn group_refresh_touches_only_its_entities() {
        let store = seeded_store();
        let snapshots = Snapshots::new(Duration::from_secs(2));

        let outcomes = snapshots.refresh_fast(&store).await;
        let entities: Vec<Entity> = outcomes.iter().map(|(e, _)| *e).collect();
        assert_eq!(entities, RefreshGroup::Fast.entities());
        assert_eq!(snapshots.users.len(), 3);
        assert!(snapshots.clusters.is_empty());

        snapshots.refresh_slow(&store).await;
        assert_eq!(snapshots.clusters.len(), 3);
        assert!(snapshots.roles.is_empty());

        snapshots.refresh_static(&store).await;
        assert_eq!(snapshots.roles.len(), 3);
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let store = seeded_store();
        let snapshots = Snapshots::new(Duration::from_secs(2));

        snapshots.refresh_all(&store).await;
        let first = serde_json::to_vec(snapshots.users.read_all().rows()).unwrap();
        let first_edges = serde_json::to_vec(snapshots.edges.read_all().rows()).unwrap();

        snapshots.refresh_all(&store).await;
        let second = serde_json::to_vec(snapshots.users.read_all().rows()).unwrap();
        let second_edges = serde_json::to_vec(snapshots.edges.read_all().rows()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first_edges, second_edges);
        assert_eq!(snapshots.users.read_all().generation(), 2);
    }

    #[test]
    fn every_entity_belongs_to_exactly_one_group() {
        for entity in Entity::ALL {
            let owners = [RefreshGroup::Fast, RefreshGroup::Slow, RefreshGroup::Static]
                .into_iter()
                .filter(|g| g.entities().contains(&entity))
                .count();
            assert_eq!(owners, 1, "{}", entity.as_str());
            assert!(entity.group().entities().contains(&entity));
        }
    }
}
