//! The `call` subcommand.

use std::time::Duration;

use anyhow::Context as _;
use serde_json::Value;
use zrpc_client::{CancelHandle, Client, ClientConfig, Context, Error, Form};

use crate::cli::CallArgs;
use crate::Exit;

pub async fn run(args: CallArgs, config: &ClientConfig) -> anyhow::Result<Exit> {
    let payload = match args.json.as_deref().map(serde_json::from_str::<Value>).transpose() {
        Ok(payload) => payload,
        Err(e) => {
            eprintln!("error: --json is not valid JSON: {e}");
            return Ok(Exit::ValidationError);
        }
    };

    let client = Client::with_reqwest(config).context("failed to build HTTP client")?;
    let (ctx, cancel) = context_for(&args);
    let endpoint = args.endpoint();

    tokio::spawn(cancel_on_interrupt(cancel));

    let result: zrpc_client::Result<Option<Value>> = if let Some(payload) = &payload {
        client.call_with_json(&ctx, args.method.clone(), &endpoint, &payload).await
    } else if !args.form.is_empty() {
        let mut form = Form::new();
        for (key, value) in &args.form {
            form.entry(key.clone()).or_default().push(value.clone());
        }
        client.call_with_form(&ctx, args.method.clone(), &endpoint, &form).await
    } else {
        client.call(&ctx, args.method.clone(), &endpoint).await
    };

    match result {
        Ok(Some(value)) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(Exit::Success)
        }
        Ok(None) => Ok(Exit::Success),
        Err(Error::Status(info)) => {
            eprintln!("{}", info.error_detail());
            Ok(Exit::StatusError)
        }
        Err(e) => {
            tracing::error!(error = %e, "call failed");
            eprintln!("error: {e}");
            Ok(exit_for(&e))
        }
    }
}

fn context_for(args: &CallArgs) -> (Context, CancelHandle) {
    let (mut ctx, cancel) = match args.timeout_ms {
        Some(ms) => Context::background().with_timeout(Duration::from_millis(ms)),
        None => Context::with_cancel(),
    };
    if let Some(reqid) = &args.reqid {
        ctx = ctx.with_request_id(reqid);
    }
    if let Some(user) = &args.user {
        ctx = ctx.with_user(user);
    }
    (ctx, cancel)
}

async fn cancel_on_interrupt(cancel: CancelHandle) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::debug!("interrupted, cancelling call");
        cancel.cancel();
    }
}

fn exit_for(error: &Error) -> Exit {
    match error {
        Error::InvalidEndpoint { .. } | Error::InvalidHeader { .. } | Error::Serialization(_) => Exit::ValidationError,
        Error::Cancelled(zrpc_client::ContextError::Canceled) => Exit::Interrupted,
        Error::Cancelled(_) | Error::Transport(_) => Exit::NetworkError,
        Error::Status(_) => Exit::StatusError,
        Error::Decode { .. } => Exit::GeneralError,
    }
}
