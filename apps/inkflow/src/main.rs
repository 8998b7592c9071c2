use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use inkflow::config::Config;
use inkflow::llm_client::local::LocalModelServer;
use inkflow::store::{FileStore, KeyValueStore};
use inkflow::{AppError, CancelToken, GenerationClient, PracticeMode, SheetSession};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Logs go to stderr; stdout carries generated text and the render plan.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting inkflow v{}", env!("CARGO_PKG_VERSION"));

    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::open(&config.state_path)?);
    let mut sheet = SheetSession::open(Arc::clone(&store));

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        None | Some("render") => {}
        Some("alphabet") => {
            sheet.set_mode(PracticeMode::Alphabet)?;
        }
        Some("repeat") => {
            sheet.set_mode(PracticeMode::RepeatLetter)?;
        }
        Some("text") => {
            sheet.set_mode(PracticeMode::Custom)?;
            sheet.set_text(args.collect::<Vec<_>>().join(" "))?;
        }
        Some("generate") => {
            let topic = args.collect::<Vec<_>>().join(" ");
            if let Err(e) = run_generate(&config, &store, &mut sheet, &topic).await {
                let report = e.report();
                eprintln!("{}", serde_json::to_string_pretty(&report)?);
                std::process::exit(1);
            }
        }
        Some(other) => {
            bail!("unknown command '{other}' (expected render, text, alphabet, repeat or generate)")
        }
    }

    let plan = sheet.render();
    writeln!(std::io::stdout().lock(), "{}", serde_json::to_string_pretty(&plan)?)?;
    Ok(())
}

/// Loads the model if needed and streams practice sentences to stdout.
/// Ctrl-C stops the stream and keeps what has arrived.
async fn run_generate(
    config: &Config,
    store: &Arc<dyn KeyValueStore>,
    sheet: &mut SheetSession,
    topic: &str,
) -> Result<(), AppError> {
    let server = LocalModelServer::new(&config.model_server_url)?;
    info!("Model server: {}", server.base_url());

    let mut client = GenerationClient::new(Arc::new(server), Arc::clone(store));
    if let Some(limit) = config.load_timeout {
        client = client.with_load_timeout(limit);
    }

    let mut on_progress = |pct: u8| info!(percent = pct, "Loading model");
    if let Some(model_id) = config.model_id.as_deref() {
        client.load(Some(model_id), Some(&mut on_progress)).await?;
    }

    let cancel = CancelToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    // A closed stdout (broken pipe) ends the run like Ctrl-C does.
    let stop = cancel.clone();
    let mut printed = 0usize;
    let outcome = sheet
        .generate_practice_text(&mut client, topic, cancel, Some(&mut on_progress), |text| {
            if stop.is_cancelled() {
                return;
            }
            if let Err(e) = echo_new_text(&mut std::io::stdout().lock(), text, &mut printed) {
                warn!("Stopping generation, stdout is not writable: {e}");
                stop.cancel();
            }
        })
        .await?;
    if let Err(e) = writeln!(std::io::stdout()) {
        warn!("stdout is not writable: {e}");
    }

    info!(
        model = client.model_id(),
        tokens = outcome.tokens,
        cancelled = outcome.cancelled,
        "Generation finished"
    );
    Ok(())
}

/// Writes the part of `text` not yet printed and advances `printed` past it.
fn echo_new_text(out: &mut impl Write, text: &str, printed: &mut usize) -> std::io::Result<()> {
    let fresh = text.get(*printed..).unwrap_or_default();
    *printed = text.len();
    out.write_all(fresh.as_bytes())?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ClosedPipe;

    impl Write for ClosedPipe {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_echo_writes_only_new_text() {
        let mut out = Vec::new();
        let mut printed = 0;
        echo_new_text(&mut out, "Hel", &mut printed).unwrap();
        echo_new_text(&mut out, "Hello", &mut printed).unwrap();
        assert_eq!(out, b"Hello");
        assert_eq!(printed, 5);
    }

    #[test]
    fn test_echo_reports_write_failure() {
        let mut printed = 0;
        let err = echo_new_text(&mut ClosedPipe, "Hello", &mut printed).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }
}
