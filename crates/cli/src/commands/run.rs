//! `turngraph run`: Run one agent turn and print the reply.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use turngraph_agent::{
    ContentPart, ExecutionConfig, ExecutionState, IsolatedRequest, IsolatedRuntime,
    PortableOptions, RunConfig, RunOptions, RunView,
};
use turngraph_config::{AppConfig, WorkerType};
use turngraph_core::message::Message;

use super::CliFactory;

pub struct RunArgs {
    pub message: String,
    pub system: Option<String>,
    pub isolate: Option<WorkerType>,
    pub recursion_limit: Option<u32>,
    pub run_name: Option<String>,
    pub json: bool,
    pub resume: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(worker_type) = args.isolate {
        config.isolation.enabled = true;
        config.isolation.worker_type = worker_type;
    }

    let mut run_config = RunConfig::from_app_config(&config);
    if let Some(limit) = args.recursion_limit {
        run_config = run_config.with_recursion_limit(limit);
    }

    let mut inputs = Vec::new();
    if let Some(system) = args.system {
        inputs.push(Message::system(system));
    }
    inputs.push(Message::user(args.message));
    let start_index = inputs.len();

    let mut exec = ExecutionConfig::default();
    if let Some(name) = args.run_name {
        exec = exec.with_run_name(name);
    }

    let options = RunOptions::from_app_config(&config);
    let mut request = IsolatedRequest::new(run_config.clone(), inputs)
        .with_exec(exec)
        .with_options(PortableOptions::from(&options));
    if let Some(path) = &args.resume {
        if options.keep_content {
            let carried = previous_content(path)?;
            debug!(path = %path.display(), parts = carried.len(), "Carrying streaming content");
            request = request.with_content_data(carried);
        } else {
            warn!(path = %path.display(), "agent.keep_content is off; ignoring --resume");
        }
    }

    let factory = Arc::new(CliFactory::new(config.api_key.clone()));
    let runtime = IsolatedRuntime::from_settings(&config.isolation, factory);
    let state = runtime
        .execute(request)
        .await
        .map_err(|e| format!("Run failed: {e}"))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    let view = RunView::new(&state, &run_config, start_index);
    match view.final_text() {
        Some(text) => println!("{text}"),
        None => eprintln!("(no reply)"),
    }
    eprintln!(
        "[{} step(s), {} tokens]",
        view.recursion_count(),
        view.current_usage().total_tokens
    );

    Ok(())
}

/// Streaming content from a state printed by an earlier `run --json`.
fn previous_content(path: &Path) -> Result<Vec<ContentPart>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let state: ExecutionState = serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse {}: {e}", path.display()))?;
    Ok(state.content_data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_content_reads_a_printed_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let state = ExecutionState::new(vec![Message::user("hi")])
            .with_content_data(vec![ContentPart::text("echo:"), ContentPart::text(" hi")]);
        std::fs::write(&path, serde_json::to_string_pretty(&state).unwrap()).unwrap();

        let carried = previous_content(&path).unwrap();
        assert_eq!(carried, state.content_data);
    }

    #[test]
    fn previous_content_reports_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(previous_content(&missing)
            .unwrap_err()
            .to_string()
            .contains("Failed to read"));

        let garbage = dir.path().join("garbage.json");
        std::fs::write(&garbage, "not json").unwrap();
        assert!(previous_content(&garbage)
            .unwrap_err()
            .to_string()
            .contains("Failed to parse"));
    }
}
