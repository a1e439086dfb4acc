//! Lifecycle notifications.
//!
//! Delivery (mail, chat webhooks) is someone else's job; the core only
//! builds an [`Event`] and hands it to a [`Notifier`] synchronously.

use serde::Serialize;
use tracing::info;

use crate::types::{Cluster, Ticket};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TicketExecuted,
    TicketFailed,
    TicketValidated,
    TicketApproved,
    TicketRejected,
    TicketClosed,
    TokenIssued,
    TokenRevoked,
}

/// Notification payload. Cluster copies never carry the stored password.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub ticket: Option<Ticket>,
    pub cluster: Option<Cluster>,
    pub user_uuid: Option<String>,
    pub detail: Option<String>,
}

impl Event {
    pub fn for_ticket(kind: EventKind, ticket: &Ticket, cluster: Option<&Cluster>) -> Self {
        Self {
            kind,
            ticket: Some(ticket.clone()),
            cluster: cluster.map(Cluster::redacted),
            user_uuid: Some(ticket.submitter_uuid.clone()),
            detail: None,
        }
    }

    pub fn for_token(kind: EventKind, user_uuid: &str) -> Self {
        Self {
            kind,
            ticket: None,
            cluster: None,
            user_uuid: Some(user_uuid.to_string()),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Synchronous event sink.
pub trait Notifier: Send + Sync {
    fn fire(&self, event: &Event);
}

/// Notifier that only writes a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn fire(&self, event: &Event) {
        let ticket_uuid = event.ticket.as_ref().map(|t| t.uuid.as_str());
        let status = event.ticket.as_ref().map(|t| t.status.to_string());
        let cluster = event.cluster.as_ref().map(|c| c.name.as_str());
        info!(
            kind = ?event.kind,
            ticket_uuid,
            status,
            cluster,
            user_uuid = event.user_uuid.as_deref(),
            detail = event.detail.as_deref(),
            "notification"
        );
    }
}
