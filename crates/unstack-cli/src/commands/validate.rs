use super::{json_pretty, load, EXIT_SUCCESS};
use std::path::Path;
use unstack_schema::deletion_plan;

pub fn run(config_path: &Path, json: bool) -> Result<u8, String> {
    let config = load(config_path)?;
    let depth = deletion_plan(&config.descriptors())
        .map_err(|e| format!("config error: {e}"))?
        .waves
        .len();

    if json {
        let payload = serde_json::json!({
            "valid": true,
            "stacks": config.stacks.len(),
            "depth": depth,
            "key_pairs": config.keys.names.len(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "{}: ok ({} stack(s), dependency depth {depth}, {} key pair(s))",
            config_path.display(),
            config.stacks.len(),
            config.keys.names.len()
        );
    }
    Ok(EXIT_SUCCESS)
}
