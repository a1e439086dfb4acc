//! Domain types for the sqlward primary store.
//!
//! Reference data (users, roles, edges, clusters, rules, options,
//! statistics, glossaries, avatars, templates) is read wholesale into
//! snapshots; tickets and statements are read and written per execution.
//! All types are serializable to/from JSON for storage in redb tables.

use serde::{Deserialize, Serialize};

/// Common shape of a stored row, used to index snapshots.
pub trait Record: Clone + Send + Sync + 'static {
    /// Numeric primary key, if the entity has one.
    fn id(&self) -> Option<u64> {
        None
    }

    /// Secondary lookup key (UUID, unique name, option key).
    fn lookup_key(&self) -> Option<&str> {
        None
    }
}

/// Zero-padded key so that lexical order in redb equals numeric order.
pub fn id_key(id: u64) -> String {
    format!("{id:020}")
}

/// Seconds since the Unix epoch.
pub fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

// ── Users, roles, edges ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    Normal,
    /// Registered but not yet verified by an administrator.
    Pending,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    /// External identity carried in tokens.
    pub uuid: String,
    pub username: String,
    pub real_name: String,
    pub email: String,
    pub status: UserStatus,
}

impl Record for User {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.uuid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    pub id: u64,
    pub name: String,
    pub description: String,
}

impl Record for Role {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Discriminates the relations multiplexed onto the edges table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    UserToRole,
    UserToReviewer,
    UserToCluster,
}

impl EdgeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::UserToRole => "user_to_role",
            EdgeKind::UserToReviewer => "user_to_reviewer",
            EdgeKind::UserToCluster => "user_to_cluster",
        }
    }
}

/// One instance of a many-to-many relation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Edge {
    pub kind: EdgeKind,
    pub ancestor_id: u64,
    pub descendant_id: u64,
}

impl Edge {
    pub fn new(kind: EdgeKind, ancestor_id: u64, descendant_id: u64) -> Self {
        Self {
            kind,
            ancestor_id,
            descendant_id,
        }
    }

    /// `{kind}:{ancestor}:{descendant}`; unique per relation instance.
    pub fn table_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.kind.as_str(),
            id_key(self.ancestor_id),
            id_key(self.descendant_id)
        )
    }
}

impl Record for Edge {}

// ── Clusters ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    Normal,
    Disabled,
}

/// A target database cluster.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Cluster {
    pub id: u64,
    pub name: String,
    pub address: String,
    pub port: u16,
    pub username: String,
    /// Encrypted with the secret codec; never plaintext at rest.
    pub password: String,
    pub status: ClusterStatus,
}

impl Cluster {
    /// Copy with the stored credential blanked, for notification payloads.
    pub fn redacted(&self) -> Self {
        Self {
            password: String::new(),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("address", &self.address)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl Record for Cluster {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

// ── Tickets ───────────────────────────────────────────────────────

/// Ticket review/execution state.
///
/// ```text
/// WaitingForVld ─┬─> VldFailure
///                ├─> VldWarning ──> WaitingForMrv
///                └─> WaitingForMrv ─┬─> MrvFailure
///                                   └─> Lgtm ─┬─> Done
///                                             └─> ExecFailure
/// any non-terminal ──> Closed
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketStatus {
    /// Awaiting automated validation.
    WaitingForVld,
    VldFailure,
    VldWarning,
    /// Awaiting manual review.
    WaitingForMrv,
    MrvFailure,
    /// Approved for execution.
    Lgtm,
    Done,
    ExecFailure,
    Closed,
}

impl TicketStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TicketStatus::Done | TicketStatus::ExecFailure | TicketStatus::Closed
        )
    }

    pub fn can_transition_to(self, next: TicketStatus) -> bool {
        use TicketStatus::*;
        if next == Closed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (WaitingForVld, VldFailure)
                | (WaitingForVld, VldWarning)
                | (WaitingForVld, WaitingForMrv)
                | (VldWarning, WaitingForMrv)
                | (WaitingForMrv, MrvFailure)
                | (WaitingForMrv, Lgtm)
                | (Lgtm, Done)
                | (Lgtm, ExecFailure)
        )
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TicketStatus::WaitingForVld => "WAITING_FOR_VLD",
            TicketStatus::VldFailure => "VLD_FAILURE",
            TicketStatus::VldWarning => "VLD_WARNING",
            TicketStatus::WaitingForMrv => "WAITING_FOR_MRV",
            TicketStatus::MrvFailure => "MRV_FAILURE",
            TicketStatus::Lgtm => "LGTM",
            TicketStatus::Done => "DONE",
            TicketStatus::ExecFailure => "EXEC_FAILURE",
            TicketStatus::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketKind {
    Ddl,
    Dml,
}

/// A proposed set of statements against one database of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    /// Numeric work id.
    pub id: u64,
    pub uuid: String,
    pub title: String,
    pub submitter_uuid: String,
    pub cluster_id: u64,
    /// Target database (schema) name.
    pub database: String,
    pub kind: TicketKind,
    pub status: TicketStatus,
    /// Large alterations go through the online-schema-change tool.
    pub delegate_osc: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatementStatus {
    Pending,
    Done,
    Failed,
}

/// One SQL command of a ticket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statement {
    pub ticket_id: u64,
    /// Position within the ticket; executed in ascending order.
    pub sequence: u32,
    /// Correlation id for schema-change tool hooks.
    pub uuid: String,
    pub sql: String,
    pub status: StatementStatus,
    pub result: String,
    pub rows_affected: u64,
}

impl Statement {
    pub fn pending(ticket_id: u64, sequence: u32, uuid: &str, sql: &str) -> Self {
        Self {
            ticket_id,
            sequence,
            uuid: uuid.to_string(),
            sql: sql.to_string(),
            status: StatementStatus::Pending,
            result: String::new(),
            rows_affected: 0,
        }
    }

    pub fn table_key(&self) -> String {
        statement_key(self.ticket_id, self.sequence)
    }

    pub fn mark_done(&mut self, rows_affected: u64) {
        self.status = StatementStatus::Done;
        self.rows_affected = rows_affected;
        self.result = "ok".to_string();
    }

    pub fn mark_failed(&mut self, error: &str) {
        self.status = StatementStatus::Failed;
        self.rows_affected = 0;
        self.result = error.to_string();
    }
}

/// Marks a ticket as owned by one execution, from claim until commit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionClaim {
    pub ticket_uuid: String,
    pub claimed_at: u64,
}

/// `{ticket_id}:{sequence}` composite key.
pub fn statement_key(ticket_id: u64, sequence: u32) -> String {
    format!("{}:{sequence:010}", id_key(ticket_id))
}

// ── Reference data ───────────────────────────────────────────────

/// An automated review rule set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rule {
    pub id: u64,
    pub name: String,
    pub enabled: bool,
    pub config: serde_json::Value,
}

impl Record for Rule {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// A system-wide setting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SystemOption {
    pub id: u64,
    pub key: String,
    pub value: serde_json::Value,
}

impl Record for SystemOption {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.key)
    }
}

/// A daily aggregate, e.g. tickets executed per day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistic {
    pub id: u64,
    pub metric: String,
    /// `YYYY-MM-DD`.
    pub day: String,
    pub value: u64,
}

impl Record for Statistic {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Glossary {
    pub id: u64,
    pub term: String,
    pub definition: String,
}

impl Record for Glossary {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.term)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Avatar {
    pub id: u64,
    pub user_id: u64,
    pub url: String,
}

impl Record for Avatar {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }
}

/// A reusable ticket body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Template {
    pub id: u64,
    pub name: String,
    pub body: String,
}

impl Record for Template {
    fn id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn lookup_key(&self) -> Option<&str> {
        Some(&self.name)
    }
}
