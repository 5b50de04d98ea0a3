use super::keys::{self, KeyCleanup};
use super::{
    colorize_outcome, json_pretty, load, make_service, spin_fail, spin_ok, spinner, EXIT_FAILURE,
    EXIT_SUCCESS,
};
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use unstack_core::{Orchestrator, RunReport, ShutdownToken, TeardownOptions};

pub struct DownOptions {
    pub yes: bool,
    pub keep_keys: bool,
    pub poll_interval: Option<u64>,
    pub max_attempts: Option<u32>,
}

fn confirm(stacks: usize, config_path: &Path) -> Result<bool, String> {
    if !(stdin().is_terminal() && stderr().is_terminal()) {
        return Err("refusing to tear down without confirmation (pass --yes)".to_owned());
    }
    Confirm::new()
        .with_prompt(format!(
            "delete {stacks} stack(s) listed in {}?",
            config_path.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))
}

fn print_summary(report: &RunReport, cleanup: Option<&KeyCleanup>) {
    for (name, outcome) in &report.outcomes {
        match outcome.reason() {
            Some(reason) => println!("  {name}: {} ({reason})", colorize_outcome(outcome)),
            None => println!("  {name}: {}", colorize_outcome(outcome)),
        }
    }
    if !report.remaining_blockers.is_empty() {
        println!("still blocked:");
        for (name, count) in &report.remaining_blockers {
            println!("  {name}: {count} dependent(s) not deleted");
        }
    }
    if let Some(cleanup) = cleanup {
        if let Some(dir) = &cleanup.removed_dir {
            println!("removed key directory {}", dir.display());
        }
        if !cleanup.deleted.is_empty() || !cleanup.missing.is_empty() {
            println!(
                "key pairs: {} deleted, {} already gone",
                cleanup.deleted.len(),
                cleanup.missing.len()
            );
        }
        if let Some(reason) = &cleanup.dir_error {
            println!("  {reason}");
        }
        for failure in &cleanup.failed {
            println!("  key {}: {}", failure.key, failure.reason);
        }
    }
}

pub fn run(
    config_path: &Path,
    backend: &str,
    remote_url: Option<&str>,
    opts: &DownOptions,
    shutdown: &ShutdownToken,
    json: bool,
) -> Result<u8, String> {
    let config = load(config_path)?;
    let descriptors = config.descriptors();

    let mut options = TeardownOptions::from(&config.teardown);
    if let Some(secs) = opts.poll_interval {
        if secs == 0 {
            return Err("config error: --poll-interval must be at least 1".to_owned());
        }
        options.poll_interval = Duration::from_secs(secs);
    }
    if let Some(attempts) = opts.max_attempts {
        if attempts == 0 {
            return Err("config error: --max-attempts must be at least 1".to_owned());
        }
        options.max_attempts = attempts;
    }

    let service = make_service(backend, remote_url, &config)?;

    if !opts.yes && !json && !confirm(descriptors.len(), config_path)? {
        println!("aborted");
        return Ok(EXIT_FAILURE);
    }

    let total = descriptors.len();
    let pb = (!json).then(|| spinner(&format!("tearing down {total} stack(s)…")));
    let finished = AtomicUsize::new(0);
    let progress = pb.clone();
    let orchestrator =
        Orchestrator::new(service.clone(), options).on_finish(move |name, outcome| {
            let done = finished.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(pb) = &progress {
                let verdict = if outcome.is_deleted() {
                    "deleted"
                } else {
                    "not deleted"
                };
                pb.set_message(format!("{done}/{total} finished (last: {name}, {verdict})"));
            }
        });

    let report = match orchestrator.run(&descriptors, shutdown) {
        Ok(report) => report,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "teardown aborted");
            }
            return Err(format!("teardown aborted: {e}"));
        }
    };

    if let Some(pb) = &pb {
        if report.is_success() {
            spin_ok(pb, &format!("deleted {total} stack(s)"));
        } else if report.was_cancelled() {
            spin_fail(pb, "teardown cancelled");
        } else {
            spin_fail(
                pb,
                &format!("{} of {total} stack(s) not deleted", report.failures().len()),
            );
        }
    }

    // Key material only goes once nothing that might still use it is left.
    let cleanup = if report.is_success() && !opts.keep_keys && !config.keys.is_empty() {
        Some(keys::purge(&config.keys, service.as_ref()))
    } else {
        None
    };

    if json {
        let payload = serde_json::json!({
            "success": report.is_success(),
            "cancelled": report.was_cancelled(),
            "report": report,
            "keys": cleanup,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        print_summary(&report, cleanup.as_ref());
    }

    if cleanup.as_ref().is_some_and(|c| !c.is_clean()) {
        eprintln!("warning: key material was not fully removed");
    }

    if report.is_success() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_FAILURE)
    }
}
