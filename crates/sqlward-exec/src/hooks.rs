//! Online-schema-change tool hooks.
//!
//! The schema-change tool runs one hook executable per lifecycle point.
//! Each invocation names exactly one [`HookKind`] and carries the
//! statement UUID in the environment; the dispatcher resolves the statement
//! and calls the matching [`HookHandler`] method.

use sqlward_state::{StateStore, Statement};
use tracing::{debug, info};

use crate::error::{ExecError, ExecResult};

/// Environment variable carrying the statement UUID.
pub const STATEMENT_UUID_ENV: &str = "SQLWARD_STATEMENT_UUID";
/// Environment variable carrying the tool's status line for `onStatus`.
pub const OSC_STATUS_ENV: &str = "GH_OST_STATUS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    Startup,
    Validated,
    RowcountComplete,
    BeforeRowCopy,
    RowCopyComplete,
    BeginPostponed,
    BeforeCutOver,
    InteractiveCommand,
    Success,
    Failure,
    Status,
    StopReplication,
    StartReplication,
}

impl HookKind {
    pub const ALL: [HookKind; 13] = [
        HookKind::Startup,
        HookKind::Validated,
        HookKind::RowcountComplete,
        HookKind::BeforeRowCopy,
        HookKind::RowCopyComplete,
        HookKind::BeginPostponed,
        HookKind::BeforeCutOver,
        HookKind::InteractiveCommand,
        HookKind::Success,
        HookKind::Failure,
        HookKind::Status,
        HookKind::StopReplication,
        HookKind::StartReplication,
    ];

    /// Hook name as the schema-change tool spells it.
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::Startup => "onStartup",
            HookKind::Validated => "onValidated",
            HookKind::RowcountComplete => "onRowcountComplete",
            HookKind::BeforeRowCopy => "onBeforeRowCopy",
            HookKind::RowCopyComplete => "onRowCopyComplete",
            HookKind::BeginPostponed => "onBeginPostponed",
            HookKind::BeforeCutOver => "onBeforeCutOver",
            HookKind::InteractiveCommand => "onInteractiveCommand",
            HookKind::Success => "onSuccess",
            HookKind::Failure => "onFailure",
            HookKind::Status => "onStatus",
            HookKind::StopReplication => "onStopReplication",
            HookKind::StartReplication => "onStartReplication",
        }
    }

    /// Inverse of [`HookKind::as_str`].
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hook call as read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookInvocation {
    pub kind: HookKind,
    pub statement_uuid: String,
    pub status: Option<String>,
}

impl HookInvocation {
    pub fn from_env(kind: HookKind) -> ExecResult<Self> {
        Self::from_lookup(kind, |name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source (`std::env::var` in
    /// production, a map in tests).
    pub fn from_lookup<F>(kind: HookKind, lookup: F) -> ExecResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let statement_uuid = lookup(STATEMENT_UUID_ENV)
            .filter(|v| !v.is_empty())
            .ok_or(ExecError::MissingHookEnv(STATEMENT_UUID_ENV))?;
        let status = match kind {
            HookKind::Status => lookup(OSC_STATUS_ENV).filter(|v| !v.is_empty()),
            _ => None,
        };
        Ok(Self {
            kind,
            statement_uuid,
            status,
        })
    }
}

/// What a handler sees: the hook point and the statement it concerns.
#[derive(Debug, Clone)]
pub struct HookContext {
    pub kind: HookKind,
    pub statement: Statement,
}

/// Reactions to hook points. Every method defaults to [`observe`].
///
/// [`observe`]: HookHandler::observe
pub trait HookHandler: Send + Sync {
    fn observe(&self, ctx: &HookContext) -> ExecResult<()>;

    fn on_startup(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_validated(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_rowcount_complete(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_before_row_copy(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_row_copy_complete(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_begin_postponed(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_before_cut_over(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_interactive_command(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_success(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_failure(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_status(&self, ctx: &HookContext, _status: &str) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_stop_replication(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
    fn on_start_replication(&self, ctx: &HookContext) -> ExecResult<()> {
        self.observe(ctx)
    }
}

/// Handler that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHookHandler;

impl HookHandler for LoggingHookHandler {
    fn observe(&self, ctx: &HookContext) -> ExecResult<()> {
        info!(
            hook = %ctx.kind,
            statement_uuid = %ctx.statement.uuid,
            ticket_id = ctx.statement.ticket_id,
            sequence = ctx.statement.sequence,
            "schema change hook"
        );
        Ok(())
    }

    fn on_status(&self, ctx: &HookContext, status: &str) -> ExecResult<()> {
        info!(
            statement_uuid = %ctx.statement.uuid,
            ticket_id = ctx.statement.ticket_id,
            %status,
            "schema change status"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Handled,
    /// Nothing to do, e.g. a status hook without a status line.
    Skipped,
}

pub struct HookDispatcher<H> {
    store: StateStore,
    handler: H,
}

impl<H: HookHandler> HookDispatcher<H> {
    pub fn new(store: StateStore, handler: H) -> Self {
        Self { store, handler }
    }

    pub fn dispatch(&self, invocation: &HookInvocation) -> ExecResult<HookOutcome> {
        let statement = self
            .store
            .get_statement_by_uuid(&invocation.statement_uuid)?
            .ok_or_else(|| ExecError::StatementNotFound(invocation.statement_uuid.clone()))?;
        let ctx = HookContext {
            kind: invocation.kind,
            statement,
        };
        debug!(hook = %ctx.kind, statement_uuid = %ctx.statement.uuid, "dispatching hook");

        let h = &self.handler;
        match invocation.kind {
            HookKind::Startup => h.on_startup(&ctx)?,
            HookKind::Validated => h.on_validated(&ctx)?,
            HookKind::RowcountComplete => h.on_rowcount_complete(&ctx)?,
            HookKind::BeforeRowCopy => h.on_before_row_copy(&ctx)?,
            HookKind::RowCopyComplete => h.on_row_copy_complete(&ctx)?,
            HookKind::BeginPostponed => h.on_begin_postponed(&ctx)?,
            HookKind::BeforeCutOver => h.on_before_cut_over(&ctx)?,
            HookKind::InteractiveCommand => h.on_interactive_command(&ctx)?,
            HookKind::Success => h.on_success(&ctx)?,
            HookKind::Failure => h.on_failure(&ctx)?,
            HookKind::Status => match invocation.status.as_deref() {
                Some(status) => h.on_status(&ctx, status)?,
                None => return Ok(HookOutcome::Skipped),
            },
            HookKind::StopReplication => h.on_stop_replication(&ctx)?,
            HookKind::StartReplication => h.on_start_replication(&ctx)?,
        }
        Ok(HookOutcome::Handled)
    }
}
