//! Application entry point: terminal voice-chat front-end.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Create the [`tokio`] runtime (multi-thread, 2 workers).
//! 4. Build the classifier and generator backends from config.
//! 5. Restore the previous snapshot (when enabled) and spawn the
//!    orchestrator.
//! 6. Spawn the presentation loop polling the snapshot file.
//! 7. Read stdin lines as final transcripts until EOF, `/quit` or Ctrl-C.
//!
//! At EOF every queued line is still answered before exit; `/quit` and
//! Ctrl-C finish only the turn in flight.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tokio::io::BufReader;
use tokio::sync::mpsc;

use voice_chat::{
    config::{AppConfig, AppPaths},
    llm::{
        ApiClassifier, ApiGenerator, DisabledClassifier, DisabledGenerator, ResponseGenerator,
        TurnClassifier,
    },
    pipeline::{OrchestratorHandle, OrchestratorOptions, TurnOrchestrator},
    presentation::{export_html, timestamped_export_path, PresentationLoop, TerminalRenderer},
    snapshot::SnapshotStore,
    transcript::{read_console, ConsoleCommand, ConsoleLine, TranscriptSink},
};

// ---------------------------------------------------------------------------
// Backends
// ---------------------------------------------------------------------------

fn build_classifier(config: &AppConfig) -> Arc<dyn TurnClassifier> {
    if config.classifier.is_active() {
        log::info!(
            "Classifier: {} at {}",
            config.classifier.model,
            config.classifier.base_url
        );
        Arc::new(ApiClassifier::from_config(
            &config.classifier,
            &config.turn.language,
        ))
    } else {
        log::info!("Classifier disabled; turn-taking uses the heuristic only");
        Arc::new(DisabledClassifier)
    }
}

fn build_generator(config: &AppConfig) -> Arc<dyn ResponseGenerator> {
    if config.generator.is_active() {
        log::info!(
            "Generator: {} at {}",
            config.generator.model,
            config.generator.base_url
        );
        Arc::new(ApiGenerator::from_config(
            &config.generator,
            &config.turn.language,
        ))
    } else {
        log::warn!("Generator disabled; completed turns get the error marker");
        Arc::new(DisabledGenerator)
    }
}

// ---------------------------------------------------------------------------
// Console commands
// ---------------------------------------------------------------------------

fn print_banner() {
    println!("{}", "=== voice-chat ===".bright_magenta().bold());
    println!(
        "{}",
        "Type what you would say. /help lists commands, /quit exits.".bright_black()
    );
    println!();
}

fn print_help() {
    println!("{}", "  /clear            forget the conversation".bright_black());
    println!("{}", "  /history          show recent turns".bright_black());
    println!("{}", "  /export [path]    save the conversation as HTML".bright_black());
    println!("{}", "  /quit             exit after the current turn".bright_black());
    println!("{}", "  ~text             send a partial (ignored) transcript".bright_black());
}

/// Returns `false` when the front-end should exit.
async fn handle_command(
    command: ConsoleCommand,
    handle: &OrchestratorHandle,
    paths: &AppPaths,
    config: &AppConfig,
) -> bool {
    match command {
        ConsoleCommand::Clear => {
            if let Err(e) = handle.clear_history() {
                log::warn!("Clear failed: {e}");
            }
        }
        ConsoleCommand::History => {
            let state = handle.snapshot();
            let recent = state.recent(config.ui.recent_turns);
            if recent.is_empty() {
                println!("{}", "(no turns yet)".bright_black());
            }
            for (index, transcript, response) in recent {
                println!("{}", format!("[{}] {}", index + 1, transcript).green());
                println!("{}", format!("    {}", response).bright_blue());
            }
        }
        ConsoleCommand::Export(target) => {
            let path = target
                .map(PathBuf::from)
                .unwrap_or_else(|| timestamped_export_path(&paths.exports_dir));
            let state = handle.snapshot();
            let destination = path.clone();
            let written =
                tokio::task::spawn_blocking(move || export_html(&state, &destination)).await;
            match written {
                Ok(Ok(())) => println!("{}", format!("Saved {}", path.display()).green()),
                Ok(Err(e)) => eprintln!("{}", format!("Export failed: {e:#}").red()),
                Err(e) => eprintln!("{}", format!("Export task failed: {e}").red()),
            }
        }
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return false,
        ConsoleCommand::Unknown(name) => {
            println!("{}", format!("Unknown command /{name}").yellow());
        }
    }
    true
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run(config: AppConfig) -> Result<()> {
    let paths = AppPaths::new();
    let store = SnapshotStore::new(config.snapshot.resolved_path());
    log::info!("Snapshot file: {}", store.path().display());

    // Orchestrator, starting from the previous session or a cleared record
    let restore = config.snapshot.restore_on_start;
    let reader = store.clone();
    let initial = tokio::task::spawn_blocking(move || reader.load_or_reset(restore))
        .await
        .context("snapshot restore task failed")?
        .unwrap_or_else(|e| {
            log::warn!("Could not prepare snapshot ({e}); starting empty");
            Default::default()
        });
    let (handle, worker) = TurnOrchestrator::new(
        build_classifier(&config),
        build_generator(&config),
        OrchestratorOptions::from_config(&config),
    )
    .with_store(store.clone())
    .with_state(initial)
    .spawn();

    // Presentation
    let renderer = TerminalRenderer::stdout(config.ui.color, config.ui.recent_turns);
    let presentation = PresentationLoop::new(store.clone(), renderer, config.ui.poll_interval());
    let stop_presentation = presentation.stop_handle();
    let presenter = tokio::spawn(presentation.run());

    // Console input
    let (line_tx, mut line_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_console(BufReader::new(tokio::io::stdin()), line_tx));
    print_banner();

    let mut sink = TranscriptSink::new(handle.clone());
    let mut drain_queue = false;
    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                None => {
                    drain_queue = true;
                    break;
                }
                Some(ConsoleLine::Transcript(event)) => {
                    if let Err(e) = sink.accept(event) {
                        log::warn!("Transcript not submitted: {e}");
                        break;
                    }
                }
                Some(ConsoleLine::Command(command)) => {
                    if !handle_command(command, &handle, &paths, &config).await {
                        break;
                    }
                }
            },
            _ = tokio::signal::ctrl_c() => {
                log::info!("Ctrl-C received");
                break;
            }
        }
    }

    // EOF: dropping the last handle lets the worker answer what is queued.
    log::info!("Submitted {} utterances", sink.forwarded());
    if drain_queue {
        drop(sink);
        drop(handle);
    } else {
        handle.shutdown();
    }

    let final_state = worker.await.context("orchestrator task failed")?;
    stop_presentation.stop();
    if let Err(e) = presenter.await {
        log::warn!("Presentation task failed: {e}");
    }

    log::info!(
        "Conversation saved ({} turns) to {}",
        final_state.pair_count(),
        store.path().display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("voice-chat starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Tokio runtime (2 worker threads: orchestrator + presentation)
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    let result = rt.block_on(run(config));

    // The stdin reader may still be parked in a blocking read.
    rt.shutdown_timeout(Duration::from_millis(500));
    result
}
