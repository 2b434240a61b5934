use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;

use hudlink_audio::{PipelineEvent, PlaybackScheduler, PlaybackWorker, SampleSink};
use hudlink_foundation::{SessionError, SessionState, SharedClock, StateManager, RECONNECT_DELAY};
use hudlink_insight::{ContextClassifier, InsightClient};
use hudlink_live::protocol::{DEFAULT_REALTIME_MODEL, DEFAULT_VOICE};
use hudlink_live::{ClientMessage, DuplexEndpoint, ServerMessage, SessionEvent, SessionSetup};
use hudlink_telemetry::SessionMetrics;
use hudlink_vision::{FrameSampler, SamplerConfig, SAMPLE_INTERVAL_MS};

use crate::session::{DeviceFactory, Session};

/// Options for starting a session controller.
#[derive(Clone, Debug)]
pub struct RuntimeOptions {
    /// Opaque persona blob forwarded in the session setup.
    pub persona: String,
    pub voice: String,
    pub model: String,
    pub reconnect_delay: Duration,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            persona: String::new(),
            voice: DEFAULT_VOICE.to_string(),
            model: DEFAULT_REALTIME_MODEL.to_string(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// External control surface of a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Tear everything down. Idempotent.
    Exit,
    SetMute(bool),
    /// Leave the terminal `Error` state and try again from scratch.
    Restart,
}

/// Handle to a running session controller.
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<Command>,
    pub metrics: SessionMetrics,
    state: Arc<StateManager>,
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Safe to call any number of times, from any path.
    pub async fn exit(&self) {
        let _ = self.cmd_tx.send(Command::Exit).await;
    }

    pub async fn set_mute(&self, muted: bool) {
        let _ = self.cmd_tx.send(Command::SetMute(muted)).await;
    }

    pub async fn restart(&self) {
        let _ = self.cmd_tx.send(Command::Restart).await;
    }

    pub fn state(&self) -> SessionState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> crossbeam_channel::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Wait for the controller to finish (after `exit`).
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// How one pass through `Active` ended.
enum Outcome {
    Exit,
    Reconnect(String),
    DeviceLost,
    Fatal(SessionError),
}

/// Owns the session lifecycle: device acquisition, the duplex connection,
/// the producer pipelines, inbound routing, and the reconnect policy.
pub struct SessionController {
    options: RuntimeOptions,
    endpoint: Arc<dyn DuplexEndpoint>,
    devices: Arc<dyn DeviceFactory>,
    insight: Arc<dyn InsightClient>,
    metrics: SessionMetrics,
    state: Arc<StateManager>,
    clock: SharedClock,
    segment_tx: mpsc::Sender<String>,
    interrupt_tx: mpsc::Sender<()>,
}

impl SessionController {
    /// Spawn the controller and its playback worker.
    pub fn start<S: SampleSink>(
        options: RuntimeOptions,
        endpoint: Arc<dyn DuplexEndpoint>,
        devices: Arc<dyn DeviceFactory>,
        insight: Arc<dyn InsightClient>,
        sink: S,
        clock: SharedClock,
    ) -> SessionHandle {
        let metrics = SessionMetrics::default();
        let state = Arc::new(StateManager::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (segment_tx, segment_rx) = mpsc::channel(64);
        let (interrupt_tx, interrupt_rx) = mpsc::channel(4);

        let scheduler = PlaybackScheduler::new(clock.clone());
        let playback =
            PlaybackWorker::new(scheduler, sink, segment_rx, interrupt_rx, metrics.clone());
        let playback_handle = playback.spawn();

        let controller = SessionController {
            options,
            endpoint,
            devices,
            insight,
            metrics: metrics.clone(),
            state: state.clone(),
            clock,
            segment_tx,
            interrupt_tx,
        };

        let join = tokio::spawn(async move {
            controller.run(cmd_rx).await;
            // The controller dropping its segment sender ends the playback
            // worker, which releases the output device.
            let _ = playback_handle.await;
        });

        SessionHandle {
            cmd_tx,
            metrics,
            state,
            join,
        }
    }

    async fn run(self, mut cmd_rx: mpsc::Receiver<Command>) {
        let mut session = Session::new(self.options.persona.clone());

        'lineage: loop {
            if self.transition(SessionState::Initializing).is_err() {
                break;
            }
            session.attempt += 1;
            tracing::info!("Session attempt {}", session.attempt);

            // Acquire devices only if not already held from a prior attempt.
            if session.devices.mic.is_none() {
                match self.devices.open_microphone(self.metrics.clone()).await {
                    Ok(mic) => session.devices.mic = Some(mic),
                    Err(err) => {
                        if self.enter_error(&mut session, &mut cmd_rx, err).await {
                            continue 'lineage;
                        }
                        break 'lineage;
                    }
                }
            }
            if session.devices.screen.is_none() {
                match self.devices.open_screen().await {
                    Ok(screen) => session.devices.screen = Some(screen),
                    Err(err) => {
                        if self.enter_error(&mut session, &mut cmd_rx, err).await {
                            continue 'lineage;
                        }
                        break 'lineage;
                    }
                }
            }

            // Open the duplex session.
            let setup = SessionSetup {
                model: self.options.model.clone(),
                persona: session.persona.clone(),
                voice: self.options.voice.clone(),
            };
            let mut live = match self.endpoint.open(setup).await {
                Ok(live) => live,
                Err(err) => {
                    if self.enter_error(&mut session, &mut cmd_rx, err).await {
                        continue 'lineage;
                    }
                    break 'lineage;
                }
            };
            let Some(mut events) = live.take_events() else {
                live.close();
                break 'lineage;
            };
            let outbound = live.outbound();

            // Screen pipeline: sampler and classifier share one tick.
            let Some(screen) = session.devices.screen.clone() else {
                live.close();
                break 'lineage;
            };
            let sampler = FrameSampler::new(
                screen.clone(),
                SamplerConfig::default(),
                self.metrics.clone(),
            );
            let classifier = ContextClassifier::new(
                self.insight.clone(),
                self.clock.clone(),
                self.metrics.clone(),
            );
            let vision_task = spawn_vision_task(
                sampler,
                classifier,
                outbound.clone(),
                self.metrics.clone(),
            );

            if self.transition(SessionState::Active).is_err() {
                vision_task.abort();
                live.close();
                break;
            }

            let outcome = {
                let Some(mic) = session.devices.mic.as_mut() else {
                    vision_task.abort();
                    live.close();
                    break 'lineage;
                };
                let audio_rx = &mut mic.audio_rx;
                let pipeline_events = &mut mic.events_rx;
                let mut screen_check = time::interval(Duration::from_secs(1));

                'active: loop {
                    tokio::select! {
                        biased;

                        cmd = cmd_rx.recv() => match cmd {
                            Some(Command::Exit) | None => break 'active Outcome::Exit,
                            Some(Command::SetMute(muted)) => self.metrics.set_muted(muted),
                            // Restart only applies in the Error state.
                            Some(Command::Restart) => {}
                        },

                        event = events.recv() => match event {
                            Some(SessionEvent::Opened) => {}
                            Some(SessionEvent::Message(message)) => {
                                self.route_message(message).await;
                            }
                            Some(SessionEvent::Closed { reason }) => {
                                break 'active Outcome::Reconnect(reason);
                            }
                            Some(SessionEvent::TransportFailed { reason }) => {
                                break 'active Outcome::Fatal(SessionError::TransportError(reason));
                            }
                            None => break 'active Outcome::Reconnect("event stream ended".into()),
                        },

                        block = audio_rx.recv() => match block {
                            Some(block) => {
                                // Enqueue-and-return; a stalled transport
                                // costs blocks, not capture latency.
                                if outbound.try_send(ClientMessage::audio_block(block.data)).is_err() {
                                    tracing::warn!("Outbound transport queue full; dropping audio block");
                                }
                            }
                            None => break 'active Outcome::DeviceLost,
                        },

                        pipeline_event = pipeline_events.recv() => match pipeline_event {
                            Some(PipelineEvent::DeviceLost) | None => {
                                break 'active Outcome::DeviceLost;
                            }
                        },

                        _ = screen_check.tick() => {
                            if screen.has_ended() {
                                tracing::info!("Screen share ended by user; exiting");
                                break 'active Outcome::Exit;
                            }
                        }
                    }
                }
            };

            // Per-attempt teardown, on every path out of Active.
            vision_task.abort();
            live.close();

            match outcome {
                Outcome::Exit => {
                    let _ = self.transition(SessionState::Idle);
                    session.devices.release();
                    break 'lineage;
                }
                Outcome::Reconnect(reason) => {
                    tracing::warn!("Transport lost ({}); reconnecting", reason);
                    if !self.prepare_reconnect(&mut session).await {
                        break 'lineage;
                    }
                }
                Outcome::DeviceLost => {
                    tracing::warn!("Capture device lost; reconnecting with fresh microphone");
                    // The mic handle is no longer valid; drop it so the next
                    // Initializing pass re-acquires. The screen is untouched.
                    if let Some(mic) = session.devices.mic.take() {
                        mic.stop();
                    }
                    if !self.prepare_reconnect(&mut session).await {
                        break 'lineage;
                    }
                }
                Outcome::Fatal(err) => {
                    if self.enter_error(&mut session, &mut cmd_rx, err).await {
                        continue 'lineage;
                    }
                    break 'lineage;
                }
            }
        }

        session.devices.release();
        tracing::info!("Session controller stopped");
    }

    /// Enter `Reconnecting`, wait out the fixed delay, and drop any device
    /// handle that is no longer valid. Returns false if the state machine
    /// cannot continue.
    async fn prepare_reconnect(&self, session: &mut Session) -> bool {
        self.metrics
            .reconnect_attempts
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        if self.transition(SessionState::Reconnecting).is_err() {
            return false;
        }

        time::sleep(self.options.reconnect_delay).await;

        if session
            .devices
            .mic
            .as_ref()
            .map(|mic| mic.driver.is_device_lost())
            .unwrap_or(false)
        {
            if let Some(mic) = session.devices.mic.take() {
                mic.stop();
            }
        }
        true
    }

    /// Enter the terminal `Error` state and wait for an explicit restart.
    /// Returns true to retry (attempt counter reset), false to exit.
    async fn enter_error(
        &self,
        session: &mut Session,
        cmd_rx: &mut mpsc::Receiver<Command>,
        err: SessionError,
    ) -> bool {
        tracing::error!("Session failed: {}", err);
        let _ = self.transition(SessionState::Error {
            reason: err.to_string(),
        });

        loop {
            match cmd_rx.recv().await {
                Some(Command::Restart) => {
                    session.attempt = 0;
                    return true;
                }
                Some(Command::SetMute(muted)) => self.metrics.set_muted(muted),
                Some(Command::Exit) | None => {
                    let _ = self.transition(SessionState::Idle);
                    session.devices.release();
                    return false;
                }
            }
        }
    }

    /// Inbound payloads route to the playback scheduler or the caption
    /// sink. The interruption marker is applied before any audio in the
    /// same message, so stale segments never outlive a barge-in.
    async fn route_message(&self, message: ServerMessage) {
        if message.interrupted {
            let _ = self.interrupt_tx.send(()).await;
        }
        if let Some(audio) = message.audio {
            let _ = self.segment_tx.send(audio).await;
        }
        if let Some(caption) = message.caption {
            self.metrics.push_caption(&caption);
        }
    }

    fn transition(&self, state: SessionState) -> Result<(), SessionError> {
        self.state.transition(state).map_err(|err| {
            tracing::error!("State machine rejected transition: {}", err);
            err
        })
    }
}

/// The shared 1 Hz tick: sample the screen, forward the frame, and offer
/// the same frame to the classifier.
fn spawn_vision_task(
    mut sampler: FrameSampler,
    classifier: ContextClassifier,
    outbound: mpsc::Sender<ClientMessage>,
    metrics: SessionMetrics,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = time::interval(Duration::from_millis(SAMPLE_INTERVAL_MS));
        tick.set_missed_tick_behavior(time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            if sampler.source_ended() {
                // The controller notices the ended source on its own tick.
                break;
            }
            if let Some(frame) = sampler.tick() {
                match outbound.try_send(ClientMessage::video_frame(&frame.jpeg)) {
                    Ok(()) => {
                        metrics
                            .video_frames_sent
                            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        tracing::warn!("Outbound transport queue full; dropping frame");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
                classifier.observe(&frame);
            }
        }
    })
}
