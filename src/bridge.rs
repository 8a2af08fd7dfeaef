//! # Bridge Module
//!
//! The bridge loop: one task that owns the serial link, the input sink and
//! the active telemetry source.
//!
//! ## Cycle
//!
//! 1. Apply queued [`BridgeCommand`]s
//! 2. Read one controller line (bounded by the serial read timeout)
//! 3. Drive the input sink: gamepad state, handbrake and gear key taps
//! 4. Poll the telemetry source for a few milliseconds
//! 5. Compose and write one feedback line while connected
//! 6. Publish a [`BridgeSnapshot`]
//!
//! The serial read timeout paces the loop. Shutdown interrupts the read and
//! any cooldown sleep, but never a feedback write.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::{Config, FeedbackConfig, TelemetryConfig};
use crate::controller::button_map::GamepadButton;
use crate::controller::gear_grid::GearGrid;
use crate::controller::mapper::{GamepadState, InputMapper};
use crate::controller::sink::InputSink;
use crate::controller::steering::SteeringAxis;
use crate::error::{Result, SimBridgeError};
use crate::feedback::FeedbackComposer;
use crate::profile::Profile;
use crate::protocol::encoder::encode_feedback_frame;
use crate::protocol::wire::{ControllerReading, FeedbackLine};
use crate::serial::port_trait::SerialOpener;
use crate::serial::{ConnectionManager, ConnectionState, LinkEvent, SendOutcome};
use crate::telemetry::{start_source, Game, TelemetrySource};

/// Queued commands before senders wait
const COMMAND_QUEUE_DEPTH: usize = 32;

/// Runtime change requested through a [`BridgeHandle`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeCommand {
    SetPort(Option<String>),
    SetGame(Game),
    SetManualGear(bool),
    SetBinding { index: usize, button: GamepadButton },
    SetFfbTest(Option<u8>),
}

/// Published view of the bridge state
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeSnapshot {
    pub updated_at: DateTime<Utc>,
    pub connection: ConnectionState,
    pub port: Option<String>,
    pub game: Game,
    /// Whether a telemetry source is running for `game`
    pub telemetry_active: bool,
    /// Last valid reading, neutral while disconnected
    pub reading: ControllerReading,
    /// Classified shifter gear (0 = neutral)
    pub gear: u8,
    pub last_pressed_button: Option<usize>,
    pub manual_gear: bool,
    pub ffb_test: Option<u8>,
    /// Last feedback line written to the wheel
    pub feedback: FeedbackLine,
    /// No input sink; only telemetry feedback is bridged
    pub feedback_only: bool,
}

impl Default for BridgeSnapshot {
    fn default() -> Self {
        Self {
            updated_at: Utc::now(),
            connection: ConnectionState::Disconnected,
            port: None,
            game: Game::None,
            telemetry_active: false,
            reading: ControllerReading::neutral(),
            gear: 0,
            last_pressed_button: None,
            manual_gear: false,
            ffb_test: None,
            feedback: FeedbackLine::NEUTRAL,
            feedback_only: false,
        }
    }
}

/// Control and observation handle for a running [`BridgeLoop`].
///
/// Dropping every handle stops the loop.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    commands: mpsc::Sender<BridgeCommand>,
    snapshot: watch::Receiver<BridgeSnapshot>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl BridgeHandle {
    pub async fn set_port(&self, port: Option<String>) -> Result<()> {
        self.send(BridgeCommand::SetPort(port)).await
    }

    pub async fn set_game(&self, game: Game) -> Result<()> {
        self.send(BridgeCommand::SetGame(game)).await
    }

    pub async fn set_manual_gear(&self, enabled: bool) -> Result<()> {
        self.send(BridgeCommand::SetManualGear(enabled)).await
    }

    pub async fn set_binding(&self, index: usize, button: GamepadButton) -> Result<()> {
        self.send(BridgeCommand::SetBinding { index, button }).await
    }

    /// Override the rumble byte (`None` ends the test).
    pub async fn set_ffb_test(&self, rumble: Option<u8>) -> Result<()> {
        self.send(BridgeCommand::SetFfbTest(rumble)).await
    }

    /// Latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BridgeSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every published snapshot.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<BridgeSnapshot> {
        self.snapshot.clone()
    }

    /// Ask the loop to stop. It releases the serial link and telemetry
    /// source before `run` returns.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    async fn send(&self, command: BridgeCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SimBridgeError::BridgeStopped)
    }
}

/// Serial ↔ game bridge
pub struct BridgeLoop {
    link: ConnectionManager,
    sink: Option<Box<dyn InputSink>>,
    mapper: InputMapper,
    telemetry_config: TelemetryConfig,
    feedback_config: FeedbackConfig,
    composer: FeedbackComposer,
    game: Game,
    source: Option<Box<dyn TelemetrySource>>,
    profile: Profile,
    profile_path: Option<PathBuf>,
    ffb_test: Option<u8>,
    gear: u8,
    last_pressed_button: Option<usize>,
    last_feedback: FeedbackLine,
    commands: mpsc::Receiver<BridgeCommand>,
    snapshot: watch::Sender<BridgeSnapshot>,
    shutdown: watch::Receiver<bool>,
}

impl BridgeLoop {
    /// Create a bridge and its handle.
    ///
    /// The profile's port and game take precedence over the config file.
    /// Without a sink the bridge runs in feedback-only mode.
    pub fn new(
        config: &Config,
        opener: Box<dyn SerialOpener>,
        sink: Option<Box<dyn InputSink>>,
        profile: Profile,
    ) -> (Self, BridgeHandle) {
        let mut link = ConnectionManager::new(opener, config.serial.clone());
        if profile.selected_port.is_some() {
            link.set_port(profile.selected_port.clone());
        }

        let mut mapper = InputMapper::new(
            SteeringAxis::new(config.steering.lock_degrees),
            GearGrid::from_config(&config.shifter),
        );
        mapper.set_manual_gear(profile.manual_gear_enabled);

        let game = profile.selected_game;
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshot_tx, snapshot_rx) = watch::channel(BridgeSnapshot::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let bridge = Self {
            link,
            sink,
            mapper,
            telemetry_config: config.telemetry.clone(),
            feedback_config: config.feedback.clone(),
            composer: FeedbackComposer::for_game(game, &config.feedback),
            game,
            source: None,
            profile,
            profile_path: None,
            ffb_test: None,
            gear: 0,
            last_pressed_button: None,
            last_feedback: FeedbackLine::NEUTRAL,
            commands: command_rx,
            snapshot: snapshot_tx,
            shutdown: shutdown_rx,
        };
        bridge.publish();

        let handle = BridgeHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            shutdown: Arc::new(shutdown_tx),
        };
        (bridge, handle)
    }

    /// Persist profile changes to `path`.
    #[must_use]
    pub fn with_profile_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.profile_path = Some(path.into());
        self
    }

    /// Use an already started telemetry source instead of starting one for
    /// the profile's game.
    #[must_use]
    pub fn with_source(mut self, source: Box<dyn TelemetrySource>) -> Self {
        self.game = source.game();
        self.composer = FeedbackComposer::for_game(self.game, &self.feedback_config);
        self.source = Some(source);
        self
    }

    /// Run until shutdown is requested or every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Bridge started (game: {}, port: {}, sink: {})",
            self.game,
            self.link.port().unwrap_or("-"),
            if self.sink.is_some() { "on" } else { "feedback only" }
        );

        if self.source.is_none() {
            self.source = Self::start_telemetry(self.telemetry_config.clone(), self.game).await;
        }

        let budget = self.telemetry_config.poll_budget();

        loop {
            if *self.shutdown.borrow() {
                break;
            }
            self.apply_commands().await;

            let event = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                event = self.link.poll() => event,
            };
            self.handle_event(event);

            let frame = match self.source.as_mut() {
                Some(source) => source.read_frame(budget).await,
                None => None,
            };

            if self.link.state() == ConnectionState::Connected {
                let line = self.composer.compose(frame.as_ref(), self.ffb_test);
                let outcome = self.link.send(&encode_feedback_frame(&line)).await;
                self.last_feedback = line;
                if outcome == SendOutcome::Disconnected {
                    self.reset_inputs();
                }
            }

            self.publish();
        }

        self.stop().await;
    }

    async fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("Command: {:?}", command);
            match command {
                BridgeCommand::SetPort(port) => {
                    let before = self.link.state();
                    self.link.set_port(port.clone());
                    if before != ConnectionState::Disconnected
                        && self.link.state() == ConnectionState::Disconnected
                    {
                        self.reset_inputs();
                    }
                    self.profile.selected_port = port;
                    self.save_profile();
                }
                BridgeCommand::SetGame(game) => {
                    self.switch_game(game).await;
                    self.profile.selected_game = game;
                    self.save_profile();
                }
                BridgeCommand::SetManualGear(enabled) => {
                    self.mapper.set_manual_gear(enabled);
                    self.profile.manual_gear_enabled = enabled;
                    self.save_profile();
                }
                BridgeCommand::SetBinding { index, button } => {
                    if self.profile.button_map.set(index, button) {
                        self.save_profile();
                    } else {
                        warn!("Ignoring binding for button index {}", index);
                    }
                }
                BridgeCommand::SetFfbTest(rumble) => {
                    self.ffb_test = rumble;
                }
            }
        }
    }

    fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Reading(reading) => {
                let mapped = self.mapper.process(&reading, &self.profile.button_map);
                self.gear = mapped.gear;
                self.last_pressed_button = mapped.last_pressed_button;

                self.drive_sink(|sink| {
                    sink.update(&mapped.state)?;
                    for key in &mapped.key_taps {
                        debug!("Tap {}", key);
                        sink.tap_key(key)?;
                    }
                    Ok(())
                });
            }
            LinkEvent::Disconnected { cooldown } => {
                info!("Controller disconnected, retrying in {:?}", cooldown);
                self.reset_inputs();
            }
            LinkEvent::Idle | LinkEvent::OpenFailed | LinkEvent::Missed => {}
        }
    }

    /// Forget the controller state and release every gamepad input.
    fn reset_inputs(&mut self) {
        self.mapper.reset();
        self.gear = 0;
        self.last_pressed_button = None;
        self.drive_sink(|sink| sink.update(&GamepadState::neutral()));
    }

    /// Run `action` against the sink. A driver that disappears switches the
    /// bridge to feedback-only mode.
    fn drive_sink<F>(&mut self, action: F)
    where
        F: FnOnce(&mut dyn InputSink) -> Result<()>,
    {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        match action(sink.as_mut()) {
            Ok(()) => {}
            Err(SimBridgeError::DriverUnavailable(reason)) => {
                warn!("Input driver lost ({}), continuing feedback only", reason);
                self.sink = None;
            }
            Err(e) => warn!("Input sink error: {}", e),
        }
    }

    async fn switch_game(&mut self, game: Game) {
        if game == self.game && (self.source.is_some() || game == Game::None) {
            return;
        }

        if let Some(mut source) = self.source.take() {
            source.close().await;
        }

        info!("Switching telemetry to {}", game);
        self.game = game;
        self.composer = FeedbackComposer::for_game(game, &self.feedback_config);
        self.source = Self::start_telemetry(self.telemetry_config.clone(), game).await;
    }

    async fn start_telemetry(
        config: TelemetryConfig,
        game: Game,
    ) -> Option<Box<dyn TelemetrySource>> {
        match start_source(game, &config).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to start {} telemetry: {}", game, e);
                None
            }
        }
    }

    fn save_profile(&self) {
        let Some(path) = self.profile_path.as_ref() else {
            return;
        };
        if let Err(e) = self.profile.save(path) {
            warn!("Failed to save profile to {}: {}", path.display(), e);
        }
    }

    fn publish(&self) {
        self.snapshot.send_replace(BridgeSnapshot {
            updated_at: Utc::now(),
            connection: self.link.state(),
            port: self.link.port().map(str::to_string),
            game: self.game,
            telemetry_active: self.source.is_some(),
            reading: self.link.last_reading().clone(),
            gear: self.gear,
            last_pressed_button: self.last_pressed_button,
            manual_gear: self.mapper.manual_gear(),
            ffb_test: self.ffb_test,
            feedback: self.last_feedback,
            feedback_only: self.sink.is_none(),
        });
    }

    async fn stop(&mut self) {
        info!("Bridge stopping");
        self.link.close();
        if let Some(mut source) = self.source.take() {
            source.close().await;
        }
        self.reset_inputs();
        self.publish();
        info!("Bridge stopped");
    }
}
