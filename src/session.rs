//! Engine Session
//!
//! [`EngineSession`] owns all of the synth's mutable state: the oscillator
//! pool, the stage catalog, the router, the granular scheduler, slider and
//! orientation state, and the pending presentation events. There is no
//! global state; every input arrives as a method call.
//!
//! Engine start is two-phase. [`EngineSession::request_start`] is issued on a
//! user gesture; the host starts its audio backend and reports the outcome
//! with [`EngineSession::engine_started`]. The graph is only built once the
//! backend is running, and oscillator sets can only be added after that.
//!
//! ```text
//! Idle --request_start--> Starting --engine_started(Ok)--> Running
//!  ^                          |                               |
//!  +---- engine_started(Err) -+                               |
//!  +------------------------------ stop ----------------------+
//! ```

use crate::config::SessionConfig;
use crate::curves::CurveKind;
use crate::grains::{Grain, GrainScheduler};
use crate::mapper::{clamp_percent, OrientationSample, ParamWrite, ParameterMapper, SliderState};
use crate::observer::{EventQueue, SessionEvent};
use crate::pool::{FrequencyRange, OscillatorPool, SetId};
use crate::processing::{BlockProcessor, SampleReducer};
use crate::rng::Rng;
use crate::router::{Connection, GraphRouter, Mode, RouterError, TopologyChange};
use crate::stage::{Oversample, Param, StageId, StageRegistry};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Lifecycle of the audio backend as seen by the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    #[default]
    Idle,
    /// Start requested, waiting for the backend
    Starting,
    Running,
}

/// Error types for session operations
#[derive(Debug, Clone, PartialEq)]
pub enum SessionError {
    /// The audio backend failed to start
    EngineStart(String),
    /// A backend start was reported without a pending request
    NoPendingStart,
    /// The operation needs a running engine
    NotStarted,
    Router(RouterError),
    /// Unknown control name or unusable value
    InvalidControl(String),
    Config(String),
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            SessionError::EngineStart(msg) => write!(f, "Audio engine failed to start: {}", msg),
            SessionError::NoPendingStart => write!(f, "No engine start is pending"),
            SessionError::NotStarted => write!(f, "Audio engine is not running"),
            SessionError::Router(e) => write!(f, "Routing error: {}", e),
            SessionError::InvalidControl(msg) => write!(f, "Invalid control: {}", msg),
            SessionError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Router(e) => Some(e),
            _ => None,
        }
    }
}

impl From<RouterError> for SessionError {
    fn from(e: RouterError) -> Self {
        SessionError::Router(e)
    }
}

/// A user control, decoded from its name and value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "control", content = "value")]
pub enum Control {
    Distortion(f64),
    Degradation(f64),
    Reverb(f64),
    Oversample(Oversample),
    FrequencyRange(FrequencyRange),
    Mode(Mode),
    AddSet,
}

impl Control {
    /// Decode a numeric control as sent by a slider or selector.
    ///
    /// Selector values are indices: oversample 0–2, frequency range 0–2 and
    /// mode in [`Mode::ALL`] order. Oversample and frequency range clamp like
    /// sliders; a mode index that names no mode is an error.
    pub fn from_value(name: &str, value: f64) -> Result<Self, SessionError> {
        match name {
            "distortion" => Ok(Control::Distortion(value)),
            "degradation" => Ok(Control::Degradation(value)),
            "reverb" => Ok(Control::Reverb(value)),
            "oversample" => Ok(Control::Oversample(Oversample::from_index(
                selector_index(value),
            ))),
            "frequency_range" => Ok(Control::FrequencyRange(FrequencyRange::from_index(
                selector_index(value),
            ))),
            "mode" => {
                let mode = if value.is_finite() && value >= 0.0 {
                    Mode::ALL.get(value as usize).copied()
                } else {
                    None
                };
                mode.map(Control::Mode)
                    .ok_or_else(|| SessionError::InvalidControl(format!("no mode at {}", value)))
            }
            "add_set" => Ok(Control::AddSet),
            _ => Err(SessionError::InvalidControl(name.to_string())),
        }
    }
}

/// The synth core: all state behind one owner
#[derive(Debug)]
pub struct EngineSession {
    config: SessionConfig,
    state: EngineState,
    mode: Mode,
    orientation: OrientationSample,
    sliders: SliderState,
    pool: OscillatorPool,
    stages: StageRegistry,
    router: GraphRouter,
    grains: GrainScheduler,
    reducer: SampleReducer,
    mapper: ParameterMapper,
    events: EventQueue,
    rng: Rng,
    now: Duration,
}

impl EngineSession {
    /// Build an idle session. Nothing sounds until the engine has started.
    pub fn new(config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;

        let mut rng = config.seed.map(Rng::from_seed).unwrap_or_default();
        let mut stages = StageRegistry::new(&config.stage_defaults(), &mut rng);
        let mapper = ParameterMapper::new();

        let sliders = SliderState {
            distortion: clamp_percent(config.sliders.distortion),
            degradation: clamp_percent(config.sliders.degradation),
            reverb: clamp_percent(config.sliders.reverb),
            oversample: config.sliders.oversample,
        };
        if sliders.degradation > 0.0 {
            mapper.map_degradation(sliders.degradation, &mut stages, &mut rng);
        }
        mapper.map_reverb(sliders.reverb, &mut stages);
        mapper.map_master_gain(config.initial_mode, &mut stages);

        let reducer = SampleReducer::new(hold_of(&stages));
        let grains = GrainScheduler::new(config.grains, config.sample_rate);

        Ok(Self {
            pool: OscillatorPool::new(config.pool_settings()),
            state: EngineState::Idle,
            mode: config.initial_mode,
            orientation: OrientationSample::default(),
            sliders,
            stages,
            router: GraphRouter::new(),
            grains,
            reducer,
            mapper,
            events: EventQueue::with_config(config.events),
            rng,
            now: Duration::ZERO,
            config,
        })
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Ask for the audio backend to start.
    ///
    /// Returns true if a new start is now pending; false if one already was
    /// or the engine is running.
    pub fn request_start(&mut self) -> bool {
        match self.state {
            EngineState::Idle => {
                self.state = EngineState::Starting;
                debug!("engine start requested");
                true
            }
            EngineState::Starting | EngineState::Running => false,
        }
    }

    /// Report the outcome of the backend start.
    ///
    /// On success the graph for the current mode is built and the first
    /// oscillator set starts. On failure the session returns to idle and a
    /// notice is queued.
    pub fn engine_started(&mut self, result: Result<(), String>) -> Result<(), SessionError> {
        if self.state != EngineState::Starting {
            return Err(SessionError::NoPendingStart);
        }

        if let Err(msg) = result {
            warn!(error = %msg, "audio engine failed to start");
            self.state = EngineState::Idle;
            self.notice(format!("Audio could not start: {}", msg));
            return Err(SessionError::EngineStart(msg));
        }

        let change = match self.router.switch_mode(self.mode) {
            Ok(change) => change,
            Err(e) => {
                self.state = EngineState::Idle;
                self.notice(format!("Audio could not start: {}", e));
                return Err(e.into());
            }
        };

        // Sets left over from a previous run were stopped
        if !self.pool.is_empty() {
            self.pool = OscillatorPool::new(self.pool_settings());
        }
        self.pool.create_set(0.0);
        self.state = EngineState::Running;

        let writes = self.mapper.map_master_gain(self.mode, &mut self.stages);
        self.publish_writes(writes);
        self.publish_topology(change);
        self.events.push(SessionEvent::ModeChanged { mode: self.mode });
        self.events.push(SessionEvent::SetCount {
            count: self.pool.len(),
        });
        self.remap_orientation();

        if self.mode.uses_grains() {
            self.grains.start(self.now);
        }

        info!(mode = %self.mode, "audio engine running");
        Ok(())
    }

    /// Stop every generator and grain and drop the graph.
    ///
    /// The stopped sets remain visible until the next start replaces the
    /// pool. Returns false if the engine was not running.
    pub fn stop(&mut self) -> bool {
        match self.state {
            EngineState::Running => {}
            EngineState::Starting => {
                self.state = EngineState::Idle;
                return false;
            }
            EngineState::Idle => return false,
        }

        self.pool.stop_all();
        self.grains.stop();
        let removed = self.router.connections();
        self.router.reset();
        self.reducer.reset();
        self.state = EngineState::Idle;

        self.publish_topology(TopologyChange {
            from: Some(self.mode),
            to: self.mode,
            removed,
            added: Vec::new(),
        });
        info!(sets = self.pool.len(), "audio engine stopped");
        true
    }

    /// The platform refused access to orientation data
    pub fn permission_denied(&mut self, reason: &str) {
        warn!(%reason, "orientation permission denied");
        self.notice(format!("Orientation access denied: {}", reason));
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Handle one orientation reading in raw sensor angles.
    ///
    /// Angles are rounded to whole degrees; missing axes read as zero.
    pub fn handle_orientation(
        &mut self,
        alpha: Option<f64>,
        beta: Option<f64>,
        gamma: Option<f64>,
    ) -> OrientationSample {
        let sample = OrientationSample::from_angles(alpha, beta, gamma);
        self.set_orientation(sample);
        sample
    }

    /// Handle an already rounded orientation sample
    pub fn set_orientation(&mut self, sample: OrientationSample) {
        self.orientation = sample;
        self.events.push(SessionEvent::Orientation {
            x: sample.x,
            y: sample.y,
            rotation: sample.rotation,
        });
        self.remap_orientation();
    }

    /// Switch the routing mode.
    ///
    /// While the engine is not running only the selection is recorded and
    /// `Ok(None)` is returned; the graph is built on start. A rejected
    /// topology leaves mode and graph as they were.
    pub fn switch_mode(&mut self, mode: Mode) -> Result<Option<TopologyChange>, SessionError> {
        if self.state != EngineState::Running {
            self.mode = mode;
            self.events.push(SessionEvent::ModeChanged { mode });
            debug!(%mode, "mode selected before start");
            return Ok(None);
        }

        let change = self.router.switch_mode(mode)?;
        let previous = self.mode;
        self.mode = mode;

        match (previous.uses_grains(), mode.uses_grains()) {
            (false, true) => {
                self.grains.start(self.now);
            }
            (true, false) => {
                self.grains.stop();
            }
            _ => {}
        }

        let writes = self.mapper.map_master_gain(mode, &mut self.stages);
        self.publish_writes(writes);
        self.publish_topology(change.clone());
        self.events.push(SessionEvent::ModeChanged { mode });
        self.remap_orientation();

        Ok(Some(change))
    }

    /// Add one oscillator set; ignored unless the engine is running.
    pub fn add_oscillator_set(&mut self) -> Option<SetId> {
        if self.state != EngineState::Running {
            debug!(state = ?self.state, "ignoring add set before start");
            return None;
        }
        let id = self.pool.add_set(&mut self.rng);
        let count = self.pool.len();
        self.events.push(SessionEvent::SetCount { count });
        info!(count, "oscillator set added");
        Some(id)
    }

    /// Distortion slider, 0–100
    pub fn set_distortion(&mut self, value: f64) {
        self.sliders.distortion = clamp_percent(value);
        let (stage, kind) = self.mapper.map_distortion(
            self.mode,
            self.sliders.distortion,
            &mut self.stages,
            &mut self.rng,
        );
        self.events.push(SessionEvent::Curve { stage, kind });
    }

    /// Degradation slider, 0–100
    pub fn set_degradation(&mut self, value: f64) {
        self.sliders.degradation = clamp_percent(value);
        let writes =
            self.mapper
                .map_degradation(self.sliders.degradation, &mut self.stages, &mut self.rng);
        self.reducer.set_hold(hold_of(&self.stages));
        self.publish_curve(StageId::Bitcrusher);
        self.publish_writes(writes);
    }

    /// Reverb slider, 0–100
    pub fn set_reverb(&mut self, value: f64) {
        self.sliders.reverb = clamp_percent(value);
        let writes = self.mapper.map_reverb(self.sliders.reverb, &mut self.stages);
        self.publish_writes(writes);
    }

    pub fn set_oversample(&mut self, oversample: Oversample) {
        self.sliders.oversample = oversample;
        self.mapper.map_oversample(oversample, &mut self.stages);
        debug!(oversample = oversample.as_str(), "oversample changed");
    }

    /// Change the base frequency of every set and the detune depth.
    pub fn set_frequency_range(&mut self, range: FrequencyRange) {
        self.pool
            .set_base_frequency(range.base_frequency(), range.multiplier());
        self.config.frequency_range = range;
        debug!(range = range.name(), "frequency range changed");
    }

    /// Apply a decoded control
    pub fn apply_control(&mut self, control: Control) -> Result<(), SessionError> {
        match control {
            Control::Distortion(v) => self.set_distortion(v),
            Control::Degradation(v) => self.set_degradation(v),
            Control::Reverb(v) => self.set_reverb(v),
            Control::Oversample(o) => self.set_oversample(o),
            Control::FrequencyRange(r) => self.set_frequency_range(r),
            Control::Mode(m) => {
                self.switch_mode(m)?;
            }
            Control::AddSet => {
                self.add_oscillator_set().ok_or(SessionError::NotStarted)?;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Timers and audio
    // ------------------------------------------------------------------

    /// Advance the session clock and spawn the grain due, if any.
    ///
    /// `now` is monotonic time from any fixed origin; going backwards is
    /// treated as no time passing.
    pub fn poll_grains(&mut self, now: Duration) -> Option<Grain> {
        self.now = self.now.max(now);
        self.grains.poll(self.now, &mut self.rng)
    }

    /// Run the sample-and-hold reducer over one buffer
    pub fn process_reducer(&mut self, input: &[f32], output: &mut [f32]) {
        self.reducer.process_block(input, output);
    }

    /// Record the master bus and write sounding grains to `output`
    pub fn process_grains(&mut self, master: &[f32], output: &mut [f32]) {
        self.grains.process_block(master, output);
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn orientation(&self) -> OrientationSample {
        self.orientation
    }

    pub fn sliders(&self) -> &SliderState {
        &self.sliders
    }

    pub fn frequency_range(&self) -> FrequencyRange {
        self.config.frequency_range
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pool(&self) -> &OscillatorPool {
        &self.pool
    }

    pub fn stages(&self) -> &StageRegistry {
        &self.stages
    }

    pub fn router(&self) -> &GraphRouter {
        &self.router
    }

    pub fn grains(&self) -> &GrainScheduler {
        &self.grains
    }

    pub fn reducer(&self) -> &SampleReducer {
        &self.reducer
    }

    /// Live connections, empty while the engine is not running
    pub fn connections(&self) -> Vec<Connection> {
        self.router.connections()
    }

    pub fn param(&self, stage: StageId, param: Param) -> Option<f64> {
        self.stages.param(stage, param)
    }

    pub fn curve_kind(&self, stage: StageId) -> Option<CurveKind> {
        self.stages.get(stage).curve_kind()
    }

    /// Take all pending presentation events
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain()
    }

    pub fn pending_events(&self) -> &[SessionEvent] {
        self.events.pending()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn pool_settings(&self) -> crate::pool::PoolSettings {
        self.config.pool_settings()
    }

    fn remap_orientation(&mut self) {
        let writes = self.mapper.map_orientation(
            self.mode,
            self.orientation,
            &mut self.stages,
            &mut self.pool,
            &mut self.grains,
        );
        self.publish_writes(writes);
    }

    fn publish_writes(&mut self, writes: Vec<ParamWrite>) {
        for w in writes {
            self.events.push(SessionEvent::Param {
                stage: w.stage,
                param: w.param,
                value: w.value,
            });
        }
    }

    fn publish_curve(&mut self, stage: StageId) {
        if let Some(kind) = self.stages.get(stage).curve_kind() {
            self.events.push(SessionEvent::Curve { stage, kind });
        }
    }

    fn publish_topology(&mut self, change: TopologyChange) {
        if !change.is_empty() {
            self.events.push(SessionEvent::Topology {
                removed: change.removed,
                added: change.added,
            });
        }
    }

    fn notice(&mut self, message: String) {
        self.events.push(SessionEvent::Notice { message });
    }
}

/// Clamp a selector value to an index; negative or non-finite reads as 0.
fn selector_index(value: f64) -> usize {
    if value.is_finite() && value > 0.0 {
        value as usize
    } else {
        0
    }
}

fn hold_of(stages: &StageRegistry) -> usize {
    stages
        .param(StageId::SampleReducer, Param::HoldSamples)
        .map(|h| h.max(1.0) as usize)
        .unwrap_or(1)
}
