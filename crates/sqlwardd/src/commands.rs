//! One-shot subcommands.
//!
//! `execute` and `hook` run in this process when it can open the store, and
//! go through the control socket of a running `serve` otherwise.

use std::io::BufRead;

use anyhow::Context;
use sqlward_core::PublicError;
use sqlward_exec::{
    ExecutionEngine, ExecutionReport, HookDispatcher, HookInvocation, HookKind, HookOutcome,
    LoggingHookHandler, SecretCodec,
};
use sqlward_state::StateStore;
use tracing::info;

use crate::control::{ControlCommand, ControlError, Route};

/// Run one approved ticket and print its report as JSON.
pub async fn execute(route: Route, ticket_uuid: &str) -> anyhow::Result<()> {
    let outcome = match route {
        Route::Local(ctx) => run_execute(&ctx.engine()?, ticket_uuid).await,
        Route::Remote(client) => {
            client
                .call(ControlCommand::Execute {
                    ticket: ticket_uuid.to_string(),
                })
                .await?
        }
    };
    let body = outcome.map_err(|e| anyhow::anyhow!("{e}"))?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// Handle one schema-change hook callback; inputs come from the environment.
pub async fn hook(route: Route, kind: HookKind) -> anyhow::Result<()> {
    let invocation = HookInvocation::from_env(kind)?;
    let outcome = match route {
        Route::Local(ctx) => run_hook(&ctx.store, &invocation),
        Route::Remote(client) => client.call(ControlCommand::hook(&invocation)).await?,
    };
    let body = outcome.map_err(|e| anyhow::anyhow!("{e}"))?;
    if body["outcome"] == "skipped" {
        info!(hook = %kind, "hook skipped, nothing to report");
    }
    Ok(())
}

pub async fn run_execute(
    engine: &ExecutionEngine,
    ticket_uuid: &str,
) -> Result<serde_json::Value, ControlError> {
    match engine.execute(ticket_uuid).await {
        Ok(report) => Ok(report_json(&report)),
        Err(e) => Err(PublicError::from_error(&e).into()),
    }
}

pub fn run_hook(
    store: &StateStore,
    invocation: &HookInvocation,
) -> Result<serde_json::Value, ControlError> {
    let dispatcher = HookDispatcher::new(store.clone(), LoggingHookHandler);
    let outcome = dispatcher
        .dispatch(invocation)
        .map_err(|e| ControlError::from(PublicError::from_error(&e)))?;
    let outcome = match outcome {
        HookOutcome::Handled => "handled",
        HookOutcome::Skipped => "skipped",
    };
    Ok(serde_json::json!({ "outcome": outcome }))
}

fn report_json(report: &ExecutionReport) -> serde_json::Value {
    let statements: Vec<_> = report
        .statements
        .iter()
        .map(|s| {
            serde_json::json!({
                "sequence": s.sequence,
                "uuid": s.uuid,
                "status": s.status,
                "rows_affected": s.rows_affected,
                "result": s.result,
            })
        })
        .collect();
    serde_json::json!({
        "ticket_uuid": report.ticket_uuid,
        "status": report.status,
        "error": report.error,
        "elapsed_ms": report.elapsed.as_millis() as u64,
        "statements": statements,
    })
}

/// Read a cluster password from the first line of `input` and return it
/// sealed for storage.
pub fn encrypt(codec: &SecretCodec, input: impl BufRead) -> anyhow::Result<String> {
    let plain = input
        .lines()
        .next()
        .context("no password on standard input")?
        .context("reading password")?;
    Ok(codec.encrypt(plain.trim_end_matches('\r'))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlward_core::SqlwardConfig;
    use sqlward_state::Statement;

    use crate::context::AppContext;

    fn ctx() -> AppContext {
        let config = SqlwardConfig::from_toml_str(
            r#"
[secrets]
token_secret = "token-secret"
cipher_key = "cipher-key"
"#,
        )
        .unwrap();
        AppContext::with_store(config, StateStore::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn encrypt_reads_first_line() {
        let codec = ctx().codec().unwrap();
        let sealed = encrypt(&codec, "hunter2\nignored\n".as_bytes()).unwrap();
        assert_eq!(codec.decrypt(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn encrypt_requires_input() {
        assert!(encrypt(&ctx().codec().unwrap(), "".as_bytes()).is_err());
    }

    #[tokio::test]
    async fn execute_unknown_ticket_is_public_not_found() {
        let err = execute(Route::Local(ctx()), "t-404").await.unwrap_err();
        assert_eq!(err.to_string(), "not_found: ticket t-404 not found");
    }

    #[test]
    fn hook_outcomes() {
        let ctx = ctx();
        ctx.store
            .put_statements(&[Statement::pending(3, 1, "s-1", "ALTER TABLE t ADD c INT")])
            .unwrap();
        let invocation = |kind, uuid: &str| HookInvocation {
            kind,
            statement_uuid: uuid.to_string(),
            status: None,
        };

        assert_eq!(
            run_hook(&ctx.store, &invocation(HookKind::Startup, "s-1")).unwrap(),
            serde_json::json!({"outcome": "handled"})
        );
        assert_eq!(
            run_hook(&ctx.store, &invocation(HookKind::Status, "s-1")).unwrap(),
            serde_json::json!({"outcome": "skipped"})
        );
        let missing = run_hook(&ctx.store, &invocation(HookKind::Startup, "s-9")).unwrap_err();
        assert_eq!(missing.code, "not_found");
    }
}
