mod commands;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use commands::{EXIT_CONFIG_ERROR, EXIT_FAILURE, EXIT_REMOTE_ERROR};
use std::path::PathBuf;
use std::process::ExitCode;
use unstack_core::{install_signal_handler, ShutdownToken};

#[derive(Debug, Parser)]
#[command(
    name = "unstack",
    version,
    about = "Tear down interdependent infrastructure stacks in dependency order"
)]
struct Cli {
    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Which control plane to talk to.
#[derive(Debug, Clone, Args)]
struct BackendArgs {
    /// Stack service backend: "http" or "mock".
    #[arg(long, default_value = "http")]
    backend: String,
    /// Control-plane URL (overrides ~/.config/unstack/remote.json).
    #[arg(long)]
    remote: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Delete every stack in the config, children before parents.
    Down {
        /// Path to the teardown config.
        #[arg(default_value = "unstack.toml")]
        config: PathBuf,
        #[command(flatten)]
        backend: BackendArgs,
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
        /// Leave key material in place after the teardown.
        #[arg(long, default_value_t = false)]
        keep_keys: bool,
        /// Seconds between status checks (overrides [teardown]).
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Consecutive failed checks before giving up on a stack (overrides [teardown]).
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Show the order stacks will be deleted in, without contacting the remote.
    Plan {
        /// Path to the teardown config.
        #[arg(default_value = "unstack.toml")]
        config: PathBuf,
    },
    /// Query the current state of every stack in the config.
    Status {
        /// Path to the teardown config.
        #[arg(default_value = "unstack.toml")]
        config: PathBuf,
        #[command(flatten)]
        backend: BackendArgs,
    },
    /// Check a config for errors, duplicate names, and dependency cycles.
    Validate {
        /// Path to the teardown config.
        #[arg(default_value = "unstack.toml")]
        config: PathBuf,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("UNSTACK_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let json_output = cli.json;

    let result = match cli.command {
        Commands::Down {
            config,
            backend,
            yes,
            keep_keys,
            poll_interval,
            max_attempts,
        } => {
            let shutdown = ShutdownToken::new();
            install_signal_handler(shutdown.clone());
            commands::down::run(
                &config,
                &backend.backend,
                backend.remote.as_deref(),
                &commands::down::DownOptions {
                    yes,
                    keep_keys,
                    poll_interval,
                    max_attempts,
                },
                &shutdown,
                json_output,
            )
        }
        Commands::Plan { config } => commands::plan::run(&config, json_output),
        Commands::Status { config, backend } => commands::status::run(
            &config,
            &backend.backend,
            backend.remote.as_deref(),
            json_output,
        ),
        Commands::Validate { config } => commands::validate::run(&config, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            let code = if msg.starts_with("config error:") {
                EXIT_CONFIG_ERROR
            } else if msg.starts_with("remote error:") {
                EXIT_REMOTE_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}
