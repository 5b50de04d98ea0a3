use super::{json_pretty, load, EXIT_SUCCESS};
use std::path::Path;
use unstack_schema::{deletion_plan, StackName};

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load(config_path)?;
    let plan =
        deletion_plan(&config.descriptors()).map_err(|e| format!("config error: {e}"))?;

    if json {
        let payload = serde_json::json!({
            "stacks": plan.stack_count(),
            "waves": plan.waves,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{} stack(s) in {} wave(s):",
            plan.stack_count(),
            plan.waves.len()
        );
        for (i, wave) in plan.waves.iter().enumerate() {
            let names: Vec<&str> = wave.iter().map(StackName::as_str).collect();
            println!("  {}: {}", i + 1, names.join(", "));
        }
    }
    Ok(EXIT_SUCCESS)
}
