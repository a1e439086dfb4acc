//! StateStore — redb-backed primary store for sqlward.
//!
//! Provides typed operations over reference data, tickets and statements.
//! All values are JSON-serialized into redb's `&[u8]` value columns. The
//! store supports both on-disk and in-memory backends (the latter for
//! testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::{StateError, StateResult};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

fn encode<T: Serialize>(row: &T) -> StateResult<Vec<u8>> {
    serde_json::to_vec(row).map_err(map_err!(Serialize))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StateResult<T> {
    serde_json::from_slice(bytes).map_err(map_err!(Deserialize))
}

/// Key bounds of one ticket's statements. `;` sorts right after `:`.
fn statement_range(ticket_id: u64) -> (String, String) {
    (
        format!("{}:", id_key(ticket_id)),
        format!("{};", id_key(ticket_id)),
    )
}

/// Thread-safe primary store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent store at the given path.
    ///
    /// redb locks the file exclusively; a second opener gets
    /// [`StateError::Locked`].
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Locked(path.display().to_string()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        info!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        for table in [
            USERS, ROLES, EDGES, CLUSTERS, TICKETS, STATEMENTS, RULES, OPTIONS, STATISTICS,
            GLOSSARIES, AVATARS, TEMPLATES, EXECUTION_CLAIMS,
        ] {
            txn.open_table(table).map_err(map_err!(Table))?;
        }
        txn.open_table(STATEMENT_INDEX).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Generic row access ─────────────────────────────────────────

    fn put_row<T: Serialize>(&self, table: JsonTable, key: &str, row: &T) -> StateResult<()> {
        let value = encode(row)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_row<T: DeserializeOwned>(&self, table: JsonTable, key: &str) -> StateResult<Option<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    /// Full scan in key order.
    fn list_rows<T: DeserializeOwned>(&self, table: JsonTable) -> StateResult<Vec<T>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    // ── Users, roles, edges ────────────────────────────────────────

    pub fn put_user(&self, user: &User) -> StateResult<()> {
        self.put_row(USERS, &id_key(user.id), user)
    }

    pub fn get_user(&self, id: u64) -> StateResult<Option<User>> {
        self.get_row(USERS, &id_key(id))
    }

    pub fn list_users(&self) -> StateResult<Vec<User>> {
        self.list_rows(USERS)
    }

    /// Insert or update a role. Another role already holding the same name
    /// is a [`StateError::Conflict`].
    pub fn put_role(&self, role: &Role) -> StateResult<()> {
        let key = id_key(role.id);
        let value = encode(role)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ROLES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, existing) = entry.map_err(map_err!(Read))?;
                let existing: Role = decode(existing.value())?;
                if existing.name == role.name && existing.id != role.id {
                    return Err(StateError::Conflict(format!(
                        "role name {} already used by role {}",
                        role.name, existing.id
                    )));
                }
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(role = %role.name, "role stored");
        Ok(())
    }

    pub fn list_roles(&self) -> StateResult<Vec<Role>> {
        self.list_rows(ROLES)
    }

    /// Insert a relation instance; a duplicate is a [`StateError::Conflict`].
    pub fn insert_edge(&self, edge: &Edge) -> StateResult<()> {
        let key = edge.table_key();
        let value = encode(edge)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(EDGES).map_err(map_err!(Table))?;
            if table.get(key.as_str()).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Conflict(format!("edge {key} already exists")));
            }
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "edge inserted");
        Ok(())
    }

    /// Delete a relation instance. Returns true if it existed.
    pub fn delete_edge(&self, edge: &Edge) -> StateResult<bool> {
        let key = edge.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(EDGES).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "edge deleted");
        Ok(existed)
    }

    pub fn list_edges(&self) -> StateResult<Vec<Edge>> {
        self.list_rows(EDGES)
    }

    // ── Clusters ───────────────────────────────────────────────────

    pub fn put_cluster(&self, cluster: &Cluster) -> StateResult<()> {
        self.put_row(CLUSTERS, &id_key(cluster.id), cluster)
    }

    pub fn get_cluster(&self, id: u64) -> StateResult<Option<Cluster>> {
        self.get_row(CLUSTERS, &id_key(id))
    }

    pub fn list_clusters(&self) -> StateResult<Vec<Cluster>> {
        self.list_rows(CLUSTERS)
    }

    // ── Tickets ────────────────────────────────────────────────────

    pub fn put_ticket(&self, ticket: &Ticket) -> StateResult<()> {
        self.put_row(TICKETS, &ticket.uuid, ticket)?;
        debug!(ticket_uuid = %ticket.uuid, status = %ticket.status, "ticket stored");
        Ok(())
    }

    pub fn get_ticket(&self, uuid: &str) -> StateResult<Option<Ticket>> {
        self.get_row(TICKETS, uuid)
    }

    pub fn list_tickets(&self) -> StateResult<Vec<Ticket>> {
        self.list_rows(TICKETS)
    }

    /// Store a new ticket and its statements in one write transaction.
    ///
    /// A reused ticket UUID, existing statements under the same ticket id,
    /// or an already indexed statement UUID is a [`StateError::Conflict`]
    /// and nothing is written.
    pub fn insert_ticket(&self, ticket: &Ticket, statements: &[Statement]) -> StateResult<()> {
        let ticket_value = encode(ticket)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut tickets = txn.open_table(TICKETS).map_err(map_err!(Table))?;
            if tickets
                .get(ticket.uuid.as_str())
                .map_err(map_err!(Read))?
                .is_some()
            {
                return Err(StateError::Conflict(format!(
                    "ticket {} already exists",
                    ticket.uuid
                )));
            }

            let mut table = txn.open_table(STATEMENTS).map_err(map_err!(Table))?;
            let (start, end) = statement_range(ticket.id);
            if table
                .range(start.as_str()..end.as_str())
                .map_err(map_err!(Read))?
                .next()
                .is_some()
            {
                return Err(StateError::Conflict(format!(
                    "ticket id {} already has statements",
                    ticket.id
                )));
            }

            let mut index = txn.open_table(STATEMENT_INDEX).map_err(map_err!(Table))?;
            for statement in statements {
                if index
                    .get(statement.uuid.as_str())
                    .map_err(map_err!(Read))?
                    .is_some()
                {
                    return Err(StateError::Conflict(format!(
                        "statement {} already exists",
                        statement.uuid
                    )));
                }
                let key = statement.table_key();
                let value = encode(statement)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                index
                    .insert(statement.uuid.as_str(), key.as_str())
                    .map_err(map_err!(Write))?;
            }
            tickets
                .insert(ticket.uuid.as_str(), ticket_value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(
            ticket_uuid = %ticket.uuid,
            statements = statements.len(),
            "ticket inserted"
        );
        Ok(())
    }

    /// Move a ticket from `expected` to `next` in one write transaction.
    ///
    /// Fails with [`StateError::Conflict`] if the stored status is no
    /// longer `expected`, so concurrent transitions cannot both win, and
    /// with [`StateError::Claimed`] while an execution owns the ticket.
    pub fn transition_ticket(
        &self,
        uuid: &str,
        expected: TicketStatus,
        next: TicketStatus,
    ) -> StateResult<Ticket> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let ticket = {
            let claims = txn.open_table(EXECUTION_CLAIMS).map_err(map_err!(Table))?;
            if claims.get(uuid).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Claimed(uuid.to_string()));
            }
            let mut table = txn.open_table(TICKETS).map_err(map_err!(Table))?;
            let mut ticket: Ticket = match table.get(uuid).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("ticket {uuid}"))),
            };
            if ticket.status != expected {
                return Err(StateError::Conflict(format!(
                    "ticket {uuid} is {}, expected {expected}",
                    ticket.status
                )));
            }
            ticket.status = next;
            ticket.updated_at = epoch_secs();
            let value = encode(&ticket)?;
            table.insert(uuid, value.as_slice()).map_err(map_err!(Write))?;
            ticket
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(ticket_uuid = %uuid, from = %expected, to = %next, "ticket transitioned");
        Ok(ticket)
    }

    // ── Statements ─────────────────────────────────────────────────

    /// Insert or update statements and their UUID index entries. Submission
    /// goes through [`StateStore::insert_ticket`], which checks ownership.
    pub fn put_statements(&self, statements: &[Statement]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(STATEMENTS).map_err(map_err!(Table))?;
            let mut index = txn.open_table(STATEMENT_INDEX).map_err(map_err!(Table))?;
            for statement in statements {
                let key = statement.table_key();
                let value = encode(statement)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
                index
                    .insert(statement.uuid.as_str(), key.as_str())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// All statements of a ticket, ascending by sequence.
    pub fn list_statements(&self, ticket_id: u64) -> StateResult<Vec<Statement>> {
        let (start, end) = statement_range(ticket_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(STATEMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(start.as_str()..end.as_str())
            .map_err(map_err!(Read))?
        {
            let (_, value) = entry.map_err(map_err!(Read))?;
            results.push(decode(value.value())?);
        }
        Ok(results)
    }

    pub fn get_statement_by_uuid(&self, uuid: &str) -> StateResult<Option<Statement>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let index = txn.open_table(STATEMENT_INDEX).map_err(map_err!(Table))?;
        let key = match index.get(uuid).map_err(map_err!(Read))? {
            Some(guard) => guard.value().to_string(),
            None => return Ok(None),
        };
        let table = txn.open_table(STATEMENTS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    // ── Execution claims ───────────────────────────────────────────

    /// Take exclusive ownership of an `Lgtm` ticket for execution.
    ///
    /// Exactly one caller wins; others get [`StateError::Claimed`]. A ticket
    /// that is no longer `Lgtm` is a [`StateError::Conflict`].
    pub fn claim_execution(&self, uuid: &str) -> StateResult<Ticket> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let ticket = {
            let tickets = txn.open_table(TICKETS).map_err(map_err!(Table))?;
            let ticket: Ticket = match tickets.get(uuid).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("ticket {uuid}"))),
            };
            let mut claims = txn.open_table(EXECUTION_CLAIMS).map_err(map_err!(Table))?;
            if claims.get(uuid).map_err(map_err!(Read))?.is_some() {
                return Err(StateError::Claimed(uuid.to_string()));
            }
            if ticket.status != TicketStatus::Lgtm {
                return Err(StateError::Conflict(format!(
                    "ticket {uuid} is {}, expected {}",
                    ticket.status,
                    TicketStatus::Lgtm
                )));
            }
            let claim = encode(&ExecutionClaim {
                ticket_uuid: uuid.to_string(),
                claimed_at: epoch_secs(),
            })?;
            claims
                .insert(uuid, claim.as_slice())
                .map_err(map_err!(Write))?;
            ticket
        };
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(ticket_uuid = %uuid, "execution claimed");
        Ok(ticket)
    }

    pub fn get_execution_claim(&self, uuid: &str) -> StateResult<Option<ExecutionClaim>> {
        self.get_row(EXECUTION_CLAIMS, uuid)
    }

    /// Drop a claim without committing. Operator recovery for a ticket whose
    /// execution never committed; returns true if a claim existed.
    pub fn release_execution_claim(&self, uuid: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut claims = txn.open_table(EXECUTION_CLAIMS).map_err(map_err!(Table))?;
            existed = claims.remove(uuid).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(ticket_uuid = %uuid, existed, "execution claim released");
        Ok(existed)
    }

    /// Persist the outcome of an execution: ticket status and every
    /// statement, all-or-nothing, and only while the caller still holds the
    /// execution claim and the stored ticket is still `expected`. The claim
    /// is removed in the same transaction.
    pub fn commit_execution(
        &self,
        ticket: &Ticket,
        expected: TicketStatus,
        statements: &[Statement],
    ) -> StateResult<()> {
        let ticket_value = encode(ticket)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut claims = txn.open_table(EXECUTION_CLAIMS).map_err(map_err!(Table))?;
            if claims
                .remove(ticket.uuid.as_str())
                .map_err(map_err!(Write))?
                .is_none()
            {
                return Err(StateError::Conflict(format!(
                    "ticket {} has no execution claim",
                    ticket.uuid
                )));
            }

            let mut tickets = txn.open_table(TICKETS).map_err(map_err!(Table))?;
            let stored: Ticket = match tickets.get(ticket.uuid.as_str()).map_err(map_err!(Read))? {
                Some(guard) => decode(guard.value())?,
                None => return Err(StateError::NotFound(format!("ticket {}", ticket.uuid))),
            };
            if stored.status != expected {
                return Err(StateError::Conflict(format!(
                    "ticket {} is {}, expected {expected}",
                    ticket.uuid, stored.status
                )));
            }
            tickets
                .insert(ticket.uuid.as_str(), ticket_value.as_slice())
                .map_err(map_err!(Write))?;

            let mut table = txn.open_table(STATEMENTS).map_err(map_err!(Table))?;
            for statement in statements {
                let key = statement.table_key();
                let value = encode(statement)?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(
            ticket_uuid = %ticket.uuid,
            status = %ticket.status,
            statements = statements.len(),
            "execution committed"
        );
        Ok(())
    }

    // ── Reference data ─────────────────────────────────────────────

    pub fn put_rule(&self, rule: &Rule) -> StateResult<()> {
        self.put_row(RULES, &id_key(rule.id), rule)
    }

    pub fn list_rules(&self) -> StateResult<Vec<Rule>> {
        self.list_rows(RULES)
    }

    pub fn put_option(&self, option: &SystemOption) -> StateResult<()> {
        self.put_row(OPTIONS, &id_key(option.id), option)
    }

    pub fn list_options(&self) -> StateResult<Vec<SystemOption>> {
        self.list_rows(OPTIONS)
    }

    pub fn put_statistic(&self, statistic: &Statistic) -> StateResult<()> {
        self.put_row(STATISTICS, &id_key(statistic.id), statistic)
    }

    pub fn list_statistics(&self) -> StateResult<Vec<Statistic>> {
        self.list_rows(STATISTICS)
    }

    pub fn put_glossary(&self, glossary: &Glossary) -> StateResult<()> {
        self.put_row(GLOSSARIES, &id_key(glossary.id), glossary)
    }

    pub fn list_glossaries(&self) -> StateResult<Vec<Glossary>> {
        self.list_rows(GLOSSARIES)
    }

    pub fn put_avatar(&self, avatar: &Avatar) -> StateResult<()> {
        self.put_row(AVATARS, &id_key(avatar.id), avatar)
    }

    pub fn list_avatars(&self) -> StateResult<Vec<Avatar>> {
        self.list_rows(AVATARS)
    }

    pub fn put_template(&self, template: &Template) -> StateResult<()> {
        self.put_row(TEMPLATES, &id_key(template.id), template)
    }

    pub fn list_templates(&self) -> StateResult<Vec<Template>> {
        self.list_rows(TEMPLATES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: u64) -> User {
        User {
            id,
            uuid: format!("user-{id}"),
            username: format!("user{id}"),
            real_name: format!("User {id}"),
            email: format!("user{id}@example.com"),
            status: UserStatus::Normal,
        }
    }

    fn test_ticket(uuid: &str, status: TicketStatus) -> Ticket {
        Ticket {
            id: 42,
            uuid: uuid.to_string(),
            title: "add column".to_string(),
            submitter_uuid: "user-1".to_string(),
            cluster_id: 1,
            database: "shop".to_string(),
            kind: TicketKind::Ddl,
            status,
            delegate_osc: false,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    fn test_statements(ticket_id: u64, count: u32) -> Vec<Statement> {
        (1..=count)
            .map(|seq| {
                Statement::pending(
                    ticket_id,
                    seq,
                    &format!("stmt-{ticket_id}-{seq}"),
                    &format!("ALTER TABLE t{seq} ADD COLUMN c INT"),
                )
            })
            .collect()
    }

    // ── Reference data ─────────────────────────────────────────────

    #[test]
    fn user_put_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let user = test_user(7);

        store.put_user(&user).unwrap();
        assert_eq!(store.get_user(7).unwrap(), Some(user));
        assert_eq!(store.get_user(8).unwrap(), None);
    }

    #[test]
    fn lists_come_back_in_id_order() {
        let store = StateStore::open_in_memory().unwrap();
        for id in [10, 2, 33, 1] {
            store.put_user(&test_user(id)).unwrap();
        }
        let ids: Vec<u64> = store.list_users().unwrap().iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 2, 10, 33]);
    }

    #[test]
    fn role_names_are_unique() {
        let store = StateStore::open_in_memory().unwrap();
        let admin = Role {
            id: 1,
            name: "admin".into(),
            description: "".into(),
        };
        store.put_role(&admin).unwrap();
        // Updating the same role is fine.
        store.put_role(&admin).unwrap();

        let clash = Role {
            id: 2,
            name: "admin".into(),
            description: "".into(),
        };
        let err = store.put_role(&clash).unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert_eq!(store.list_roles().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_edge_is_rejected() {
        let store = StateStore::open_in_memory().unwrap();
        let edge = Edge::new(EdgeKind::UserToRole, 1, 2);

        store.insert_edge(&edge).unwrap();
        assert!(matches!(
            store.insert_edge(&edge),
            Err(StateError::Conflict(_))
        ));
        // Same endpoints under another relation is a different instance.
        store
            .insert_edge(&Edge::new(EdgeKind::UserToReviewer, 1, 2))
            .unwrap();
        assert_eq!(store.list_edges().unwrap().len(), 2);

        assert!(store.delete_edge(&edge).unwrap());
        assert!(!store.delete_edge(&edge).unwrap());
    }

    #[test]
    fn misc_reference_tables() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_option(&SystemOption {
                id: 1,
                key: "ticket.max_statements".into(),
                value: serde_json::json!(500),
            })
            .unwrap();
        store
            .put_rule(&Rule {
                id: 1,
                name: "default".into(),
                enabled: true,
                config: serde_json::json!({"max_rows": 1000}),
            })
            .unwrap();
        store
            .put_template(&Template {
                id: 1,
                name: "add-index".into(),
                body: "ALTER TABLE".into(),
            })
            .unwrap();
        assert_eq!(store.list_options().unwrap()[0].value, serde_json::json!(500));
        assert!(store.list_rules().unwrap()[0].enabled);
        assert_eq!(store.list_templates().unwrap().len(), 1);
        assert!(store.list_glossaries().unwrap().is_empty());
        assert!(store.list_avatars().unwrap().is_empty());
        assert!(store.list_statistics().unwrap().is_empty());
    }

    // ── Tickets & statements ───────────────────────────────────────

    #[test]
    fn statements_list_in_sequence_order_per_ticket() {
        let store = StateStore::open_in_memory().unwrap();
        let mut stmts = test_statements(42, 12);
        stmts.reverse();
        store.put_statements(&stmts).unwrap();
        store.put_statements(&test_statements(43, 2)).unwrap();

        let listed = store.list_statements(42).unwrap();
        let seqs: Vec<u32> = listed.iter().map(|s| s.sequence).collect();
        assert_eq!(seqs, (1..=12).collect::<Vec<_>>());
        assert_eq!(store.list_statements(43).unwrap().len(), 2);
        assert!(store.list_statements(44).unwrap().is_empty());
    }

    #[test]
    fn statement_lookup_by_uuid() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_statements(&test_statements(42, 3)).unwrap();

        let found = store.get_statement_by_uuid("stmt-42-2").unwrap().unwrap();
        assert_eq!(found.sequence, 2);
        assert!(store.get_statement_by_uuid("nope").unwrap().is_none());
    }

    #[test]
    fn transition_is_conditional() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .put_ticket(&test_ticket("t-1", TicketStatus::WaitingForMrv))
            .unwrap();

        let moved = store
            .transition_ticket("t-1", TicketStatus::WaitingForMrv, TicketStatus::Lgtm)
            .unwrap();
        assert_eq!(moved.status, TicketStatus::Lgtm);

        let err = store
            .transition_ticket("t-1", TicketStatus::WaitingForMrv, TicketStatus::MrvFailure)
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));
        assert_eq!(
            store.get_ticket("t-1").unwrap().unwrap().status,
            TicketStatus::Lgtm
        );

        assert!(matches!(
            store.transition_ticket("t-404", TicketStatus::Lgtm, TicketStatus::Done),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn commit_execution_writes_everything() {
        let store = StateStore::open_in_memory().unwrap();
        let mut stmts = test_statements(42, 2);
        store
            .insert_ticket(&test_ticket("t-1", TicketStatus::Lgtm), &stmts)
            .unwrap();

        let mut ticket = store.claim_execution("t-1").unwrap();
        ticket.status = TicketStatus::Done;
        for s in &mut stmts {
            s.mark_done(3);
        }
        store
            .commit_execution(&ticket, TicketStatus::Lgtm, &stmts)
            .unwrap();

        assert_eq!(
            store.get_ticket("t-1").unwrap().unwrap().status,
            TicketStatus::Done
        );
        assert!(
            store
                .list_statements(42)
                .unwrap()
                .iter()
                .all(|s| s.status == StatementStatus::Done && s.rows_affected == 3)
        );
        assert!(store.get_execution_claim("t-1").unwrap().is_none());
    }

    #[test]
    fn commit_execution_rolls_back_on_status_change() {
        let store = StateStore::open_in_memory().unwrap();
        let stmts = test_statements(42, 2);
        store
            .insert_ticket(&test_ticket("t-1", TicketStatus::Lgtm), &stmts)
            .unwrap();
        store.claim_execution("t-1").unwrap();
        let closed = test_ticket("t-1", TicketStatus::Closed);
        store.put_ticket(&closed).unwrap();

        let mut done = test_ticket("t-1", TicketStatus::Done);
        done.title = "changed".into();
        let mut executed = stmts.clone();
        executed[0].mark_done(1);

        let err = store
            .commit_execution(&done, TicketStatus::Lgtm, &executed)
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)));

        assert_eq!(store.get_ticket("t-1").unwrap().unwrap(), closed);
        assert_eq!(store.list_statements(42).unwrap(), stmts);
        // The claim survives the rollback.
        assert!(store.get_execution_claim("t-1").unwrap().is_some());
    }

    #[test]
    fn commit_requires_a_claim() {
        let store = StateStore::open_in_memory().unwrap();
        let stmts = test_statements(42, 1);
        store
            .insert_ticket(&test_ticket("t-1", TicketStatus::Lgtm), &stmts)
            .unwrap();

        let done = test_ticket("t-1", TicketStatus::Done);
        assert!(matches!(
            store.commit_execution(&done, TicketStatus::Lgtm, &stmts),
            Err(StateError::Conflict(_))
        ));
        assert_eq!(
            store.get_ticket("t-1").unwrap().unwrap().status,
            TicketStatus::Lgtm
        );
    }

    #[test]
    fn only_one_execution_claim_wins() {
        let store = StateStore::open_in_memory().unwrap();
        store
            .insert_ticket(
                &test_ticket("t-1", TicketStatus::Lgtm),
                &test_statements(42, 1),
            )
            .unwrap();

        store.claim_execution("t-1").unwrap();
        assert!(matches!(
            store.claim_execution("t-1"),
            Err(StateError::Claimed(_))
        ));
        // Review transitions wait for the execution too.
        assert!(matches!(
            store.transition_ticket("t-1", TicketStatus::Lgtm, TicketStatus::Closed),
            Err(StateError::Claimed(_))
        ));

        assert!(store.release_execution_claim("t-1").unwrap());
        assert!(!store.release_execution_claim("t-1").unwrap());
        store
            .transition_ticket("t-1", TicketStatus::Lgtm, TicketStatus::Closed)
            .unwrap();
        assert!(matches!(
            store.claim_execution("t-1"),
            Err(StateError::Conflict(_))
        ));
        assert!(matches!(
            store.claim_execution("t-404"),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn insert_ticket_rejects_reused_identities() {
        let store = StateStore::open_in_memory().unwrap();
        let first = test_ticket("t-a", TicketStatus::WaitingForVld);
        let first_stmts = vec![Statement::pending(42, 1, "a1", "ALTER TABLE a ADD c INT")];
        store.insert_ticket(&first, &first_stmts).unwrap();

        // Same numeric id under a new UUID.
        let clash = test_ticket("t-b", TicketStatus::WaitingForVld);
        let err = store
            .insert_ticket(&clash, &[Statement::pending(42, 1, "b1", "DROP TABLE b")])
            .unwrap_err();
        assert!(matches!(err, StateError::Conflict(_)), "{err}");

        // Reused ticket UUID.
        let mut again = test_ticket("t-a", TicketStatus::WaitingForVld);
        again.id = 43;
        assert!(matches!(
            store.insert_ticket(&again, &[Statement::pending(43, 1, "c1", "SELECT 1")]),
            Err(StateError::Conflict(_))
        ));

        // Reused statement UUID under a fresh ticket.
        let mut other = test_ticket("t-c", TicketStatus::WaitingForVld);
        other.id = 44;
        assert!(matches!(
            store.insert_ticket(&other, &[Statement::pending(44, 1, "a1", "DROP TABLE c")]),
            Err(StateError::Conflict(_))
        ));

        assert_eq!(store.list_statements(42).unwrap(), first_stmts);
        assert!(store.list_statements(44).unwrap().is_empty());
        assert!(store.get_ticket("t-b").unwrap().is_none());
        assert!(store.get_ticket("t-c").unwrap().is_none());
        assert_eq!(
            store.get_statement_by_uuid("a1").unwrap().unwrap().sql,
            "ALTER TABLE a ADD c INT"
        );
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sqlward.redb");

        {
            let store = StateStore::open(&db_path).unwrap();
            store
                .put_ticket(&test_ticket("t-1", TicketStatus::Lgtm))
                .unwrap();
        }

        // Reopen the same database file.
        let store = StateStore::open(&db_path).unwrap();
        assert!(store.get_ticket("t-1").unwrap().is_some());
    }

    #[test]
    fn second_open_reports_locked() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("sqlward.redb");

        let _held = StateStore::open(&db_path).unwrap();
        let err = StateStore::open(&db_path).err().unwrap();
        assert!(matches!(err, StateError::Locked(_)));
    }

    #[test]
    fn empty_store_operations() {
        let store = StateStore::open_in_memory().unwrap();

        assert!(store.list_users().unwrap().is_empty());
        assert!(store.list_tickets().unwrap().is_empty());
        assert!(store.get_ticket("nope").unwrap().is_none());
        assert!(store.get_cluster(1).unwrap().is_none());
    }
}
