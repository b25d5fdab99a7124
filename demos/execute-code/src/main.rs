//! Execute code on a running Jupyter kernel and print the result as JSON.
//!
//! Run with:
//!   KERNEL_ID=<id> KERNEL_TOKEN=<token> cargo run -p execute-code-demo -- "print('hello world')"
//!
//! Without arguments the code is read from stdin. Ctrl-C cancels the call.

use std::{io::Read, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use kernel_client_executor::{ChannelConfig, ExecuteOptions, KernelClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env_var(name)
        .map(|raw| raw.parse().with_context(|| format!("invalid {name}: {raw}")))
        .transpose()
}

fn config_from_env() -> Result<ChannelConfig> {
    let kernel_id = env_var("KERNEL_ID").context("KERNEL_ID is required")?;
    let mut config = ChannelConfig::new(kernel_id);

    if let Some(scheme) = env_var("KERNEL_SCHEME") {
        config = config.with_scheme(scheme);
    }
    if let Some(host) = env_var("KERNEL_HOST") {
        config = config.with_host(host);
    }
    if let Some(port) = env_parse("KERNEL_PORT")? {
        config = config.with_port(port);
    }
    if let Some(base_path) = env_var("KERNEL_BASE_PATH") {
        config = config.with_base_path(base_path);
    }
    if let Some(token) = env_var("KERNEL_TOKEN") {
        config = config.with_token(token);
    }
    if let Some(encoded) = env_parse("KERNEL_PATH_ENCODED")? {
        config = config.with_path_encoded(encoded);
    }
    if let Some(verify) = env_parse("KERNEL_VERIFY_TLS")? {
        config = config.with_verify_tls(verify);
    }
    Ok(config)
}

fn read_code() -> Result<String> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if !args.is_empty() {
        return Ok(args.join(" "));
    }
    let mut code = String::new();
    std::io::stdin()
        .read_to_string(&mut code)
        .context("failed to read code from stdin")?;
    Ok(code)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = config_from_env()?;
    let code = read_code()?;

    let cancel = CancellationToken::new();
    let mut options = ExecuteOptions::default()
        .wait_for_idle(env_parse("KERNEL_WAIT_FOR_IDLE")?.unwrap_or(false))
        .with_cancellation(cancel.clone());
    if let Some(secs) = env_parse::<u64>("KERNEL_TIMEOUT_SECS")? {
        options = options.with_timeout(Duration::from_secs(secs));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling execution");
            cancel.cancel();
        }
    });

    let client = KernelClient::new(config)?;
    tracing::info!(session = client.session_id(), "Executing code");
    let result = client.execute_with(&code, &options).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
