use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use unstack_server::{Store, CREATE_COMPLETE};

#[derive(Parser)]
#[command(
    name = "unstack-server",
    about = "In-memory control plane speaking the unstack HTTP protocol v1"
)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value_t = 8321)]
    port: u16,

    /// Status checks a deleting stack reports DELETE_IN_PROGRESS before it is gone.
    #[arg(long, default_value_t = 2)]
    delete_polls: u32,

    /// Stack to create at startup (repeatable).
    #[arg(long = "stack", value_name = "NAME")]
    stacks: Vec<String>,

    /// Key pair to create at startup (repeatable).
    #[arg(long = "key", value_name = "NAME")]
    keys: Vec<String>,

    /// Require this bearer token on every request.
    #[arg(long)]
    auth_token: Option<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut store = Store::new(cli.delete_polls);
    if let Some(token) = &cli.auth_token {
        store = store.with_auth_token(token);
    }
    for name in &cli.stacks {
        store.seed_stack(name, CREATE_COMPLETE);
    }
    for name in &cli.keys {
        store.seed_key(name);
    }

    let addr = format!("0.0.0.0:{}", cli.port);
    info!("starting unstack-server on {addr}");
    info!(
        "{} stack(s), {} key pair(s), {} in-progress poll(s) per deletion",
        cli.stacks.len(),
        cli.keys.len(),
        cli.delete_polls
    );

    if let Err(e) = unstack_server::run_server(&Arc::new(store), &addr) {
        error!("cannot serve on {addr}: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
