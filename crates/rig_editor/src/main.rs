// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rig editor - runs an edit script through the undo journal.
//!
//! Usage: `rig_editor <script.ron> [settings.ron]`
//!
//! Settings default to `rig_editor.ron` in the working directory. Logging
//! uses the settings' filter, extended by `RUST_LOG`.

use rig_editor::config::{EditorSettings, SETTINGS_FILE_NAME};
use rig_editor::script::{EditScript, ScriptRunner};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let Some(script_path) = args.get(1).map(PathBuf::from) else {
        eprintln!("Usage: rig_editor <script.ron> [settings.ron]");
        return ExitCode::from(2);
    };
    let settings_path = args
        .get(2)
        .map_or_else(|| PathBuf::from(SETTINGS_FILE_NAME), PathBuf::from);

    let settings = match EditorSettings::load_or_default(&settings_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Failed to load settings {}: {e}", settings_path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut env_filter = tracing_subscriber::EnvFilter::from_default_env();
    match settings.log_filter.parse::<tracing_subscriber::filter::Directive>() {
        Ok(directive) => env_filter = env_filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring log filter {:?}: {e}", settings.log_filter),
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Rig editor v{}", env!("CARGO_PKG_VERSION"));

    let script = match EditScript::load(&script_path) {
        Ok(script) => script,
        Err(e) => {
            tracing::error!("Failed to load script {}: {e}", script_path.display());
            return ExitCode::FAILURE;
        }
    };

    let mut runner = match ScriptRunner::new(&script, &settings) {
        Ok(runner) => runner,
        Err(e) => {
            tracing::error!("Failed to build scene: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runner.run(&script.steps);
    if let Err(e) = &result {
        tracing::error!("Script stopped: {e}");
    }

    for (name, value) in runner.report() {
        println!("{name} = {value}");
    }
    println!(
        "undo depth: {}, redo depth: {}",
        runner.journal().undo_depth(),
        runner.journal().redo_depth()
    );

    if result.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
