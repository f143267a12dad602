//! Session runner: wires audio, transport and the session engine together.
//!
//! # Flow
//!
//! ```text
//! run()
//!   ├─ session.update, input_audio_buffer.clear
//!   ├─ spawn audio loop     AudioSource → validate → base64 → append → engine.record_audio_sent
//!   ├─ spawn scheduler      TriggerScheduler (forced commit on timeout)
//!   └─ receive loop         Inbound → decode_server_event → engine.dispatch
//!         └─ ends on shutdown or on disconnect
//!   shutdown: cancel in-flight response (best effort), join tasks,
//!             let deferred completions finish (bounded), engine.close()
//! ```

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use crate::audio::{pcm16_to_base64, validate_frame, AudioSource};
use crate::config::AppConfig;
use crate::protocol::{decode_server_event, SessionUpdate};
use crate::session::{Dispatch, EngineStats, SessionEngine, ShutdownSignal, TriggerScheduler};
use crate::transport::{Inbound, Transport, TransportError};

/// Chunks between audio progress log lines.
const AUDIO_LOG_EVERY: u64 = 100;

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Session setup could not be sent.
    #[error("session setup failed: {0}")]
    Transport(#[from] TransportError),

    /// The connection ended without a shutdown request.
    #[error("connection to the realtime service was lost")]
    Disconnected,
}

// ---------------------------------------------------------------------------
// SessionRunner
// ---------------------------------------------------------------------------

/// Runs one realtime session until shutdown or disconnect.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use realtime_translator::audio::AudioSource;
/// # use realtime_translator::config::AppConfig;
/// # use realtime_translator::display::TerminalDisplay;
/// # use realtime_translator::pipeline::SessionRunner;
/// # use realtime_translator::session::{EngineConfig, SessionEngine, ShutdownSignal};
/// # use realtime_translator::transport::RealtimeClient;
/// # async fn example(source: Box<dyn AudioSource>) -> anyhow::Result<()> {
/// let config = AppConfig::load()?.with_env_overrides();
/// let shutdown = ShutdownSignal::new();
/// let display = Arc::new(TerminalDisplay::stdout(config.ui.history_len));
/// let engine = SessionEngine::new(
///     EngineConfig::from(&config.session),
///     display,
///     shutdown.clone(),
/// );
/// let (client, inbound) = RealtimeClient::connect(&config.api).await?;
/// let runner = SessionRunner::new(config, engine, Arc::new(client), shutdown);
/// let stats = runner.run(inbound, source).await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionRunner {
    config: AppConfig,
    engine: SessionEngine,
    transport: Arc<dyn Transport>,
    shutdown: ShutdownSignal,
}

impl SessionRunner {
    pub fn new(
        config: AppConfig,
        engine: SessionEngine,
        transport: Arc<dyn Transport>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            config,
            engine,
            transport,
            shutdown,
        }
    }

    /// Configure the session, then stream audio and dispatch events until
    /// shutdown is requested or the connection drops.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Transport`] if setup cannot be sent;
    /// [`PipelineError::Disconnected`] if the inbound stream ends while no
    /// shutdown was requested.
    pub async fn run(
        self,
        mut inbound: Inbound,
        source: Box<dyn AudioSource>,
    ) -> Result<EngineStats, PipelineError> {
        self.transport
            .configure_session(SessionUpdate::from_config(&self.config))
            .await?;
        self.transport.clear_audio_buffer().await?;
        log::info!(
            "pipeline: session configured ({} → {})",
            self.config.translation.source_language,
            self.config.translation.target_language
        );

        let audio = tokio::spawn(audio_loop(
            source,
            Arc::clone(&self.transport),
            self.engine.clone(),
            self.shutdown.clone(),
            Duration::from_millis(self.config.audio.poll_interval_ms),
            self.config.audio.chunk_size * 2,
        ));

        let scheduler = TriggerScheduler::new(
            self.engine.clone(),
            Arc::clone(&self.transport),
            self.config.session.force_commit_interval(),
        );
        let scheduler = tokio::spawn(scheduler.run(self.shutdown.clone()));

        let mut deferred = Vec::new();
        let disconnected = self.receive_loop(&mut inbound, &mut deferred).await;

        self.shutdown.trigger();
        if !disconnected && self.engine.in_flight() > 0 {
            if let Err(e) = self.transport.cancel_response().await {
                log::debug!("pipeline: cancel on shutdown not sent: {e}");
            }
        }

        for (name, handle) in [("audio", audio), ("scheduler", scheduler)] {
            if let Err(e) = handle.await {
                log::error!("pipeline: {name} task failed: {e}");
            }
        }

        self.drain_deferred(deferred).await;

        let stats = self.engine.close();
        if disconnected {
            Err(PipelineError::Disconnected)
        } else {
            Ok(stats)
        }
    }

    /// Wait for completions still waiting on a transcript.  Shutdown has
    /// already released their waits, so this only covers the final write to
    /// the display; anything slower than the wait ceiling is abandoned.
    async fn drain_deferred(&self, deferred: Vec<JoinHandle<()>>) {
        let pending = deferred.len();
        if pending == 0 {
            return;
        }
        let join_all = async {
            for handle in deferred {
                if let Err(e) = handle.await {
                    log::error!("pipeline: deferred completion failed: {e}");
                }
            }
        };
        let ceiling = self.config.session.source_wait();
        if tokio::time::timeout(ceiling, join_all).await.is_err() {
            log::warn!("pipeline: abandoned deferred completions after {ceiling:?}");
        } else {
            log::debug!("pipeline: {pending} deferred completions finished");
        }
    }

    /// Returns `true` if the loop ended because the connection dropped.
    async fn receive_loop(
        &self,
        inbound: &mut Inbound,
        deferred: &mut Vec<JoinHandle<()>>,
    ) -> bool {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.wait() => return false,
                frame = inbound.recv() => frame,
            };

            let Some(text) = frame else {
                if self.shutdown.is_triggered() {
                    return false;
                }
                log::error!("pipeline: inbound stream ended unexpectedly");
                return true;
            };

            match decode_server_event(&text) {
                Ok(event) => {
                    log::trace!("pipeline: ← {}", event.kind());
                    if let Dispatch::Deferred(handle) = self.engine.dispatch(event) {
                        deferred.retain(|h| !h.is_finished());
                        deferred.push(handle);
                    }
                }
                Err(e) => log::warn!("pipeline: dropping malformed event: {e}"),
            }
        }
    }
}

async fn audio_loop(
    mut source: Box<dyn AudioSource>,
    transport: Arc<dyn Transport>,
    engine: SessionEngine,
    shutdown: ShutdownSignal,
    idle: Duration,
    frame_bytes: usize,
) {
    let mut sent: u64 = 0;
    loop {
        if shutdown.is_triggered() {
            break;
        }

        let frame = match source.next_chunk() {
            Some(frame) => frame,
            None => {
                tokio::select! {
                    _ = shutdown.wait() => break,
                    _ = tokio::time::sleep(idle) => {}
                }
                continue;
            }
        };

        if let Err(e) = validate_frame(&frame, Some(frame_bytes)) {
            log::warn!("audio: skipping frame: {e}");
            continue;
        }

        match transport.send_audio(pcm16_to_base64(&frame)).await {
            Ok(()) => {
                engine.record_audio_sent();
                sent += 1;
                if sent % AUDIO_LOG_EVERY == 0 {
                    log::debug!("audio: {sent} chunks sent");
                }
            }
            Err(TransportError::Closed) => {
                log::warn!("audio: connection closed, stopping send loop");
                break;
            }
            Err(e) => log::warn!("audio: chunk not sent: {e}"),
        }
    }
    log::info!("audio: send loop stopped after {sent} chunks");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ScriptedSource;
    use crate::display::recording::{RecordingSink, SinkEvent};
    use crate::protocol::ClientCommand;
    use crate::session::{EngineConfig, TaskId, TaskStatus, SOURCE_UNAVAILABLE};
    use crate::transport::recording::RecordingTransport;
    use tokio::sync::mpsc;

    struct Harness {
        engine: SessionEngine,
        sink: Arc<RecordingSink>,
        transport: Arc<RecordingTransport>,
        shutdown: ShutdownSignal,
        events: mpsc::Sender<String>,
        handle: tokio::task::JoinHandle<Result<EngineStats, PipelineError>>,
    }

    fn start(transport: RecordingTransport, frames: Vec<Vec<u8>>) -> Harness {
        let mut config = AppConfig::default();
        config.audio.poll_interval_ms = 5;
        let shutdown = ShutdownSignal::new();
        let sink = Arc::new(RecordingSink::new());
        let engine = SessionEngine::new(
            EngineConfig::from(&config.session),
            sink.clone(),
            shutdown.clone(),
        );
        let transport = Arc::new(transport);
        let (events, inbound) = Inbound::channel(64);

        let runner = SessionRunner::new(config, engine.clone(), transport.clone(), shutdown.clone());
        let handle = tokio::spawn(runner.run(inbound, Box::new(ScriptedSource::new(frames))));

        Harness {
            engine,
            sink,
            transport,
            shutdown,
            events,
            handle,
        }
    }

    async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    #[tokio::test]
    async fn setup_then_round_trip_then_clean_shutdown() {
        let h = start(RecordingTransport::new(), vec![]);

        for frame in [
            r#"{"type":"session.created","session":{}}"#,
            r#"{"type":"input_audio_buffer.speech_started","item_id":"it1"}"#,
            r#"{"type":"input_audio_buffer.speech_stopped","item_id":"it1"}"#,
            r#"{"type":"conversation.item.created","item":{"id":"it1","type":"message","role":"user","content":[]}}"#,
            r#"{"type":"response.created","response":{"id":"r1","status":"in_progress"}}"#,
            r#"{"type":"conversation.item.input_audio_transcription.completed","item_id":"it1","transcript":"hello"}"#,
            r#"{"type":"response.text.done","response_id":"r1","text":"bonjour"}"#,
        ] {
            h.events.send(frame.into()).await.unwrap();
        }

        let sink = h.sink.clone();
        wait_for("completion", || {
            sink.events()
                .contains(&SinkEvent::Complete(TaskId(1), "hello".into(), "bonjour".into()))
        })
        .await;

        h.shutdown.trigger();
        let stats = h.handle.await.unwrap().expect("clean shutdown");
        assert_eq!(stats.tasks_created, 1);
        assert_eq!(stats.tasks_completed, 1);

        let control = h.transport.control();
        assert!(matches!(control[0], ClientCommand::UpdateSession { .. }));
        assert_eq!(control[1], ClientCommand::ClearAudio);
        // Nothing in flight at shutdown: no cancel.
        assert!(!control.contains(&ClientCommand::CancelResponse));
    }

    #[tokio::test]
    async fn malformed_and_unknown_frames_do_not_stop_the_loop() {
        let h = start(RecordingTransport::new(), vec![]);
        h.events.send("not json".into()).await.unwrap();
        h.events.send(r#"{"no_type":1}"#.into()).await.unwrap();
        h.events
            .send(r#"{"type":"rate_limits.updated","rate_limits":[]}"#.into())
            .await
            .unwrap();
        h.events
            .send(r#"{"type":"input_audio_buffer.speech_stopped"}"#.into())
            .await
            .unwrap();

        let engine = h.engine.clone();
        wait_for("task creation", || engine.last_task_id() == Some(TaskId(1))).await;

        h.shutdown.trigger();
        assert!(h.handle.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn in_flight_task_is_cancelled_on_shutdown() {
        let h = start(RecordingTransport::new(), vec![]);
        h.events
            .send(r#"{"type":"input_audio_buffer.speech_stopped"}"#.into())
            .await
            .unwrap();
        let engine = h.engine.clone();
        wait_for("task creation", || engine.in_flight() == 1).await;

        h.shutdown.trigger();
        h.handle.await.unwrap().unwrap();
        assert_eq!(
            h.transport.control().last(),
            Some(&ClientCommand::CancelResponse)
        );
    }

    #[tokio::test]
    async fn pending_completion_lands_before_run_returns() {
        let h = start(RecordingTransport::new(), vec![]);
        for frame in [
            r#"{"type":"input_audio_buffer.speech_stopped"}"#,
            r#"{"type":"conversation.item.created","item":{"id":"it1","type":"message","role":"user","content":[]}}"#,
            r#"{"type":"response.created","response":{"id":"r1"}}"#,
            r#"{"type":"response.text.done","response_id":"r1","text":"bonjour"}"#,
        ] {
            h.events.send(frame.into()).await.unwrap();
        }
        let engine = h.engine.clone();
        wait_for("translation", || {
            engine
                .task(TaskId(1))
                .is_some_and(|t| t.status == TaskStatus::TranslationPending)
        })
        .await;

        h.shutdown.trigger();
        let stats = h.handle.await.unwrap().unwrap();
        assert_eq!(stats.tasks_completed, 1);
        assert_eq!(
            h.sink.events().last(),
            Some(&SinkEvent::Complete(
                TaskId(1),
                SOURCE_UNAVAILABLE.into(),
                "bonjour".into()
            ))
        );
    }

    #[tokio::test]
    async fn dropped_connection_is_reported() {
        let h = start(RecordingTransport::new(), vec![]);
        drop(h.events);
        let result = h.handle.await.unwrap();
        assert!(matches!(result, Err(PipelineError::Disconnected)));
        assert!(h.shutdown.is_triggered());
    }

    #[tokio::test]
    async fn audio_frames_are_validated_sent_and_counted() {
        let frame_bytes = AppConfig::default().audio.chunk_size * 2;
        let frames = vec![
            vec![0u8; frame_bytes],
            vec![0u8; 3],
            vec![0u8; frame_bytes],
            vec![],
            vec![0u8; frame_bytes],
        ];
        let h = start(RecordingTransport::new(), frames);

        let engine = h.engine.clone();
        wait_for("audio", || engine.pending_audio_units() == 3).await;

        let appended = h
            .transport
            .sent()
            .into_iter()
            .filter(|c| matches!(c, ClientCommand::AppendAudio { .. }))
            .count();
        assert_eq!(appended, 3);

        h.shutdown.trigger();
        h.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn setup_failure_is_an_error() {
        let h = start(RecordingTransport::closed(), vec![]);
        let result = h.handle.await.unwrap();
        assert!(matches!(
            result,
            Err(PipelineError::Transport(TransportError::Closed))
        ));
    }
}
