pub mod completions;
pub mod down;
pub mod keys;
pub mod man_pages;
pub mod plan;
pub mod status;
pub mod validate;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use unstack_core::StackOutcome;
use unstack_remote::{select_service, MockStackService, RemoteConfig, StackService};
use unstack_schema::{load_config, TeardownConfig};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_REMOTE_ERROR: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_outcome(outcome: &StackOutcome) -> String {
    use console::Style;
    match outcome {
        StackOutcome::Deleted { .. } => Style::new().green().apply_to("deleted").to_string(),
        StackOutcome::Failed { .. } => Style::new().red().bold().apply_to("failed").to_string(),
        StackOutcome::Stranded { .. } => Style::new().yellow().apply_to("stranded").to_string(),
        StackOutcome::Cancelled { .. } => Style::new().dim().apply_to("cancelled").to_string(),
    }
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "absent" => Style::new().green().apply_to(state).to_string(),
        "delete_in_progress" => Style::new().cyan().apply_to(state).to_string(),
        "present" => Style::new().yellow().apply_to(state).to_string(),
        "unknown" => Style::new().dim().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

/// Load and fully validate a teardown config.
pub fn load(path: &Path) -> Result<TeardownConfig, String> {
    load_config(path).map_err(|e| format!("config error: {} ({})", e, path.display()))
}

/// Build the stack service for `backend`.
///
/// The mock backend starts with every configured stack present and every
/// configured key pair existing, so `down --backend mock` rehearses a full run.
pub fn make_service(
    backend: &str,
    remote_url: Option<&str>,
    config: &TeardownConfig,
) -> Result<Arc<dyn StackService>, String> {
    if backend == "mock" {
        let names = config.descriptors().into_iter().map(|d| d.name);
        let mut mock = MockStackService::converging(names, 1);
        for key in &config.keys.names {
            mock = mock.with_key(key.clone());
        }
        return Ok(Arc::new(mock));
    }

    let remote = if let Some(url) = remote_url {
        Some(RemoteConfig::new(url))
    } else if backend == "http" {
        Some(
            RemoteConfig::load_default()
                .map_err(|e| format!("remote error: no --remote and no remote config: {e}"))?,
        )
    } else {
        None
    };
    select_service(backend, remote).map_err(|e| format!("remote error: {e}"))
}
