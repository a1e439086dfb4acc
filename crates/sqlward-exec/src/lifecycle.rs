//! Review-side ticket transitions.
//!
//! Execution outcomes (`DONE`, `EXEC_FAILURE`) are recorded only by the
//! engine; everything else in the ticket state machine goes through here.

use std::collections::HashSet;
use std::sync::Arc;

use sqlward_state::*;
use tracing::info;

use crate::error::{ExecError, ExecResult};

/// Outcome of automated validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationVerdict {
    Passed,
    /// Passed with warnings the submitter must acknowledge.
    Warning,
    Failed,
}

pub struct TicketLifecycle {
    store: StateStore,
    notifier: Arc<dyn Notifier>,
}

impl TicketLifecycle {
    pub fn new(store: StateStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Store a new ticket awaiting validation together with its statements.
    pub fn submit(&self, ticket: &Ticket, statements: &[Statement]) -> ExecResult<()> {
        if ticket.status != TicketStatus::WaitingForVld {
            return Err(ExecError::InvalidSubmission(format!(
                "new ticket must be {}, got {}",
                TicketStatus::WaitingForVld,
                ticket.status
            )));
        }
        if statements.is_empty() {
            return Err(ExecError::InvalidSubmission("ticket has no statements".into()));
        }
        let mut sequences = HashSet::new();
        for statement in statements {
            if statement.ticket_id != ticket.id {
                return Err(ExecError::InvalidSubmission(format!(
                    "statement {} belongs to ticket {}",
                    statement.uuid, statement.ticket_id
                )));
            }
            if !sequences.insert(statement.sequence) {
                return Err(ExecError::InvalidSubmission(format!(
                    "duplicate sequence {}",
                    statement.sequence
                )));
            }
        }

        self.store
            .insert_ticket(ticket, statements)
            .map_err(|e| match e {
                StateError::Conflict(msg) => ExecError::InvalidSubmission(msg),
                other => other.into(),
            })?;
        info!(ticket_uuid = %ticket.uuid, statements = statements.len(), "ticket submitted");
        Ok(())
    }

    /// Apply `next` if the state machine allows it from the stored status.
    pub fn transition(&self, ticket_uuid: &str, next: TicketStatus) -> ExecResult<Ticket> {
        let current = self
            .store
            .get_ticket(ticket_uuid)?
            .ok_or_else(|| ExecError::TicketNotFound(ticket_uuid.to_string()))?;
        let kind = match next {
            TicketStatus::VldFailure | TicketStatus::VldWarning | TicketStatus::WaitingForMrv => {
                EventKind::TicketValidated
            }
            TicketStatus::Lgtm => EventKind::TicketApproved,
            TicketStatus::MrvFailure => EventKind::TicketRejected,
            TicketStatus::Closed => EventKind::TicketClosed,
            TicketStatus::WaitingForVld | TicketStatus::Done | TicketStatus::ExecFailure => {
                return Err(self.illegal(&current, next));
            }
        };
        if !current.status.can_transition_to(next) {
            return Err(self.illegal(&current, next));
        }

        let ticket = self
            .store
            .transition_ticket(ticket_uuid, current.status, next)
            .map_err(|e| match e {
                StateError::Claimed(uuid) => ExecError::AlreadyRunning(uuid),
                other => other.into(),
            })?;
        info!(%ticket_uuid, from = %current.status, to = %next, "ticket transitioned");
        self.notifier.fire(&Event::for_ticket(kind, &ticket, None));
        Ok(ticket)
    }

    pub fn record_validation(
        &self,
        ticket_uuid: &str,
        verdict: ValidationVerdict,
    ) -> ExecResult<Ticket> {
        let next = match verdict {
            ValidationVerdict::Passed => TicketStatus::WaitingForMrv,
            ValidationVerdict::Warning => TicketStatus::VldWarning,
            ValidationVerdict::Failed => TicketStatus::VldFailure,
        };
        self.transition(ticket_uuid, next)
    }

    /// The submitter accepts validation warnings and sends the ticket to review.
    pub fn acknowledge_warnings(&self, ticket_uuid: &str) -> ExecResult<Ticket> {
        self.transition(ticket_uuid, TicketStatus::WaitingForMrv)
    }

    pub fn approve(&self, ticket_uuid: &str) -> ExecResult<Ticket> {
        self.transition(ticket_uuid, TicketStatus::Lgtm)
    }

    pub fn reject(&self, ticket_uuid: &str) -> ExecResult<Ticket> {
        self.transition(ticket_uuid, TicketStatus::MrvFailure)
    }

    pub fn close(&self, ticket_uuid: &str) -> ExecResult<Ticket> {
        self.transition(ticket_uuid, TicketStatus::Closed)
    }

    fn illegal(&self, ticket: &Ticket, to: TicketStatus) -> ExecError {
        ExecError::IllegalTransition {
            uuid: ticket.uuid.clone(),
            from: ticket.status,
            to,
        }
    }
}
