//! Application entry point: realtime speech translator.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk, apply environment overrides, validate.
//! 3. Create the [`tokio`] runtime.
//! 4. Start the cpal capture stream (the handle stays on this thread).
//! 5. Connect to the realtime endpoint.
//! 6. Install the Ctrl+C handler and run the [`SessionRunner`] until
//!    shutdown or disconnect.
//! 7. Print the result history.  A lost connection exits non-zero.

use std::sync::Arc;

use anyhow::Context;
use realtime_translator::{
    audio::{AudioCapture, AudioChunk, MicrophoneSource},
    config::AppConfig,
    display::TerminalDisplay,
    pipeline::{SessionRunner, ShutdownSignal},
    session::{EngineConfig, SessionEngine},
    transport::RealtimeClient,
};

fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("realtime translator starting up");

    // 2. Configuration
    let config = AppConfig::load()
        .unwrap_or_else(|e| {
            log::warn!("Failed to load config ({e}); using defaults");
            AppConfig::default()
        })
        .with_env_overrides();
    config.validate().context("invalid configuration")?;
    log::info!(
        "translating {} → {} with {}",
        config.translation.source_language,
        config.translation.target_language,
        config.api.model
    );

    // 3. Tokio runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    // 4. Audio capture
    let capture = AudioCapture::new().context("audio capture unavailable")?;
    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<AudioChunk>();
    let _stream = capture
        .start(chunk_tx)
        .context("failed to start audio stream")?;
    let source = MicrophoneSource::new(chunk_rx, config.audio.sample_rate, config.audio.chunk_size);

    let display = Arc::new(TerminalDisplay::stdout(config.ui.history_len));
    let shutdown = ShutdownSignal::new();
    let engine = SessionEngine::new(
        EngineConfig::from(&config.session),
        display.clone(),
        shutdown.clone(),
    );

    let result = rt.block_on(async {
        // 5. Connect
        let (client, inbound) = RealtimeClient::connect(&config.api)
            .await
            .context("could not connect to the realtime service")?;
        let client = Arc::new(client);

        // 6. Ctrl+C → shutdown
        let signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Ctrl+C received, shutting down");
                signal.trigger();
            }
        });

        let runner = SessionRunner::new(config.clone(), engine, client.clone(), shutdown);
        let outcome = runner.run(inbound, Box::new(source)).await;
        client.close().await;
        outcome.map_err(anyhow::Error::from)
    });

    // 7. Summary
    display.render_summary();
    let stats = result?;
    log::info!(
        "session ended: {} tasks, {} completed, {} evicted",
        stats.tasks_created,
        stats.tasks_completed,
        stats.tasks_evicted
    );
    Ok(())
}
