//! redb table definitions for the sqlward primary store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).
//! Numeric ids are zero-padded to 20 digits so lexical order equals id order.

use redb::TableDefinition;

/// Shape shared by every JSON-valued table.
pub type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");

/// Roles keyed by id; names are unique and enforced on insert.
pub const ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("roles");

/// Edges keyed by `{kind}:{ancestor_id}:{descendant_id}`, which makes the
/// relation instance its own primary key.
pub const EDGES: TableDefinition<&str, &[u8]> = TableDefinition::new("edges");

pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Tickets keyed by UUID.
pub const TICKETS: TableDefinition<&str, &[u8]> = TableDefinition::new("tickets");

/// Statements keyed by `{ticket_id}:{sequence}`.
pub const STATEMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("statements");

/// Ticket UUID → JSON `ExecutionClaim`, present while an execution owns
/// the ticket.
pub const EXECUTION_CLAIMS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("execution_claims");

/// Statement UUID → statements table key.
pub const STATEMENT_INDEX: TableDefinition<&str, &str> = TableDefinition::new("statement_index");

pub const RULES: TableDefinition<&str, &[u8]> = TableDefinition::new("rules");

pub const OPTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("options");

pub const STATISTICS: TableDefinition<&str, &[u8]> = TableDefinition::new("statistics");

pub const GLOSSARIES: TableDefinition<&str, &[u8]> = TableDefinition::new("glossaries");

pub const AVATARS: TableDefinition<&str, &[u8]> = TableDefinition::new("avatars");

pub const TEMPLATES: TableDefinition<&str, &[u8]> = TableDefinition::new("templates");
