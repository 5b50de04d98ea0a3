use super::{colorize_state, json_pretty, load, make_service, EXIT_FAILURE, EXIT_SUCCESS};
use serde::Serialize;
use std::path::Path;
use unstack_schema::StackName;

#[derive(Serialize)]
struct StackStatus {
    name: StackName,
    state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Describe every configured stack once. Exits non-zero if any query failed.
pub fn run(
    config_path: &Path,
    backend: &str,
    remote_url: Option<&str>,
    json: bool,
) -> Result<u8, String> {
    let config = load(config_path)?;
    let service = make_service(backend, remote_url, &config)?;

    let statuses: Vec<StackStatus> = config
        .descriptors()
        .into_iter()
        .map(|d| match service.describe(&d.name) {
            Ok(state) => StackStatus {
                name: d.name,
                state: Some(state.to_string()),
                error: None,
            },
            Err(e) => StackStatus {
                name: d.name,
                state: None,
                error: Some(e.to_string()),
            },
        })
        .collect();
    let errors = statuses.iter().filter(|s| s.error.is_some()).count();

    if json {
        println!("{}", json_pretty(&statuses)?);
    } else {
        let width = statuses.iter().map(|s| s.name.len()).max().unwrap_or(0);
        for s in &statuses {
            let name = s.name.as_str();
            match (&s.state, &s.error) {
                (Some(state), _) => println!("{name:<width$}  {}", colorize_state(state)),
                (None, Some(err)) => println!("{name:<width$}  error: {err}"),
                (None, None) => println!("{name:<width$}  ?"),
            }
        }
    }

    if errors > 0 {
        Ok(EXIT_FAILURE)
    } else {
        Ok(EXIT_SUCCESS)
    }
}
