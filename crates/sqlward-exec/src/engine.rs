//! Ticket execution.
//!
//! `execute` runs the statements of one approved ticket against its
//! cluster in sequence order, stops at the first failure, notifies, and
//! commits ticket and statement outcomes in a single store transaction.
//!
//! Preconditions (ticket status, delegation, cluster state, password
//! decryption) are checked before anything is touched; failing one leaves
//! the store as it was. The ticket is then claimed in the store, so only
//! one execution per ticket reaches the cluster no matter how many engines
//! share the store. Once a connection is attempted, every outcome including
//! a failed connect ends in `DONE` or `EXEC_FAILURE`. A commit failure
//! keeps the claim and the ticket stays blocked until an operator releases
//! it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlward_state::*;
use tracing::{info, warn};

use crate::cluster::{ClusterConnector, ClusterError, ClusterSession, ClusterTarget};
use crate::codec::SecretCodec;
use crate::error::{ExecError, ExecResult};
use crate::sentinel::{SentinelRecord, SentinelWriter};

#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub ticket_uuid: String,
    pub status: TicketStatus,
    /// Statements with their final status, ascending by sequence.
    pub statements: Vec<Statement>,
    /// First failure (connect or statement), if any.
    pub error: Option<String>,
    pub elapsed: Duration,
}

pub struct ExecutionEngine {
    store: StateStore,
    connector: Arc<dyn ClusterConnector>,
    codec: SecretCodec,
    notifier: Arc<dyn Notifier>,
    sentinel: Option<SentinelWriter>,
    statement_timeout: Option<Duration>,
}

impl ExecutionEngine {
    pub fn new(
        store: StateStore,
        connector: Arc<dyn ClusterConnector>,
        codec: SecretCodec,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            connector,
            codec,
            notifier,
            sentinel: None,
            statement_timeout: None,
        }
    }

    /// Per-statement limit; `None` lets statements run unbounded.
    pub fn with_statement_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.statement_timeout = timeout;
        self
    }

    pub fn with_sentinel(mut self, writer: SentinelWriter) -> Self {
        self.sentinel = Some(writer);
        self
    }

    pub async fn execute(&self, ticket_uuid: &str) -> ExecResult<ExecutionReport> {
        let started = Instant::now();

        let ticket = self
            .store
            .get_ticket(ticket_uuid)?
            .ok_or_else(|| ExecError::TicketNotFound(ticket_uuid.to_string()))?;
        if ticket.status != TicketStatus::Lgtm {
            return Err(ExecError::NotExecutable {
                uuid: ticket.uuid,
                status: ticket.status,
            });
        }
        if ticket.delegate_osc {
            return Err(ExecError::DelegatedToOsc(ticket.uuid));
        }

        let mut statements = self.store.list_statements(ticket.id)?;
        let cluster = self
            .store
            .get_cluster(ticket.cluster_id)?
            .ok_or(ExecError::ClusterNotFound(ticket.cluster_id))?;
        if cluster.status == ClusterStatus::Disabled {
            return Err(ExecError::ClusterDisabled(cluster.name));
        }
        let target = ClusterTarget {
            name: cluster.name.clone(),
            host: cluster.address.clone(),
            port: cluster.port,
            username: cluster.username.clone(),
            password: self.codec.decrypt(&cluster.password)?,
            database: ticket.database.clone(),
        };

        let mut ticket = self
            .store
            .claim_execution(ticket_uuid)
            .map_err(|e| match e {
                StateError::Claimed(uuid) => ExecError::AlreadyRunning(uuid),
                StateError::NotFound(_) => ExecError::TicketNotFound(ticket_uuid.to_string()),
                other => other.into(),
            })?;

        info!(
            %ticket_uuid,
            cluster = %cluster.name,
            database = %ticket.database,
            statements = statements.len(),
            "executing ticket"
        );

        let error = match self.connector.connect(&target).await {
            Ok(mut session) => {
                let error = self.run_statements(session.as_mut(), &mut statements).await;
                session.close().await;
                error
            }
            Err(e) => Some(format!("connect to cluster {}: {e}", cluster.name)),
        };

        ticket.status = if error.is_none() {
            TicketStatus::Done
        } else {
            TicketStatus::ExecFailure
        };
        ticket.updated_at = epoch_secs();

        let kind = if error.is_none() {
            EventKind::TicketExecuted
        } else {
            EventKind::TicketFailed
        };
        let mut event = Event::for_ticket(kind, &ticket, Some(&cluster));
        if let Some(e) = &error {
            event = event.with_detail(e.clone());
        }
        self.notifier.fire(&event);

        if let Err(e) = self
            .store
            .commit_execution(&ticket, TicketStatus::Lgtm, &statements)
        {
            warn!(%ticket_uuid, error = %e, "execution commit failed, claim kept");
            self.write_sentinel(&ticket, false, Some(format!("commit failed: {e}")));
            return Err(ExecError::Commit(e));
        }
        self.write_sentinel(&ticket, true, error.clone());

        let elapsed = started.elapsed();
        info!(
            %ticket_uuid,
            status = %ticket.status,
            elapsed_ms = elapsed.as_millis() as u64,
            "ticket execution finished"
        );
        Ok(ExecutionReport {
            ticket_uuid: ticket.uuid,
            status: ticket.status,
            statements,
            error,
            elapsed,
        })
    }

    /// Returns the first failure, leaving later statements pending.
    async fn run_statements(
        &self,
        session: &mut dyn ClusterSession,
        statements: &mut [Statement],
    ) -> Option<String> {
        for statement in statements.iter_mut() {
            let outcome = match self.statement_timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, session.execute(&statement.sql)).await {
                        Ok(result) => result,
                        Err(_) => Err(ClusterError::Timeout(limit)),
                    }
                }
                None => session.execute(&statement.sql).await,
            };
            match outcome {
                Ok(rows) => statement.mark_done(rows),
                Err(e) => {
                    let text = e.to_string();
                    warn!(
                        ticket_id = statement.ticket_id,
                        sequence = statement.sequence,
                        error = %text,
                        "statement failed"
                    );
                    statement.mark_failed(&text);
                    return Some(format!("statement {} failed: {text}", statement.sequence));
                }
            }
        }
        None
    }

    fn write_sentinel(&self, ticket: &Ticket, committed: bool, error: Option<String>) {
        let Some(writer) = &self.sentinel else {
            return;
        };
        let record = SentinelRecord {
            ticket_uuid: ticket.uuid.clone(),
            status: ticket.status.to_string(),
            committed,
            error,
            finished_at: epoch_secs(),
        };
        if let Err(e) = writer.write(&record) {
            warn!(ticket_uuid = %ticket.uuid, error = %e, "failed to write sentinel");
        }
    }
}
