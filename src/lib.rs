//! # TiltSynth: Orientation-Driven Synthesizer Core
//!
//! `tiltsynth` is the control core of a drone synthesizer played by tilting a
//! device. Stacked sets of detuned oscillators feed one of several effect
//! topologies; device orientation and a few sliders steer the parameters of
//! whichever topology is live.
//!
//! The crate holds the state and the decisions; a rendering backend (Web
//! Audio, a native graph, a test harness) mirrors them. The only sample-level
//! work done here is the sample-and-hold reducer and granular playback.
//!
//! ## Architecture
//!
//! - **Oscillator Pool** - growable sets of square/sine/triangle generators
//! - **Stage Catalog** - every effect stage with its live parameters and curves
//! - **Graph Router** - declarative per-mode topologies, rebuilt transactionally
//! - **Parameter Mapper** - orientation and sliders to parameter writes
//! - **Grain Scheduler** - periodic grains read from a rolling recording
//! - **Engine Session** - owns all of the above and queues presentation events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tiltsynth::prelude::*;
//!
//! let mut session = EngineSession::new(SessionConfig::default()).unwrap();
//!
//! // On the first user gesture
//! session.request_start();
//! // Once the audio backend reports it is running
//! session.engine_started(Ok(())).unwrap();
//!
//! session.switch_mode(Mode::Glitch).unwrap();
//! session.handle_orientation(Some(120.0), Some(-30.0), Some(15.0));
//! session.set_degradation(40.0);
//!
//! for event in session.drain_events() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod config;
pub mod curves;
pub mod grains;
pub mod mapper;
pub mod observer;
pub mod pool;
pub mod processing;
pub mod rng;
pub mod router;
pub mod session;
pub mod stage;

#[cfg(feature = "wasm")]
pub mod wasm;

/// Prelude module for convenient imports
pub mod prelude {
    // Session
    pub use crate::config::SessionConfig;
    pub use crate::session::{Control, EngineSession, EngineState, SessionError};

    // Oscillators
    pub use crate::pool::{
        FrequencyRange, Generator, OscillatorPool, OscillatorSet, PoolSettings, SetId, Waveform,
    };

    // Stages and curves
    pub use crate::curves::{generate_curve, Curve, CurveKind};
    pub use crate::stage::{
        EffectStage, FilterType, Oversample, Param, StageDefaults, StageId, StageKind,
        StageRegistry,
    };

    // Routing
    pub use crate::router::{
        topology, Connection, GraphRouter, Mode, RouterError, Target, TopologyChange,
    };

    // Mapping
    pub use crate::mapper::{OrientationSample, ParamWrite, ParameterMapper, SliderState};

    // Real-time processing
    pub use crate::grains::{Grain, GrainConfig, GrainScheduler};
    pub use crate::processing::{BlockProcessor, RingBuffer, SampleReducer};

    // Events
    pub use crate::observer::{EventQueue, ObserverConfig, SessionEvent};

    pub use crate::rng::Rng;
}

// Re-export key types at crate root for convenience
pub use prelude::*;
