//! Presentation Events
//!
//! The session reports everything the outside world has to react to as a
//! [`SessionEvent`]: the orientation that drives the image transform, the
//! oscillator count on display, mode changes, parameter and curve writes a
//! rendering backend must mirror, topology diffs, and blocking notices.
//!
//! Events queue up in an [`EventQueue`] that the host drains after each
//! callback. Continuous values keep only their latest update per key.

use crate::curves::CurveKind;
use crate::router::{Connection, Mode};
use crate::stage::{Param, StageId};
use serde::{Deserialize, Serialize};

/// Something the presentation layer or rendering backend should act on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[cfg_attr(feature = "wasm", tsify(into_wasm_abi, from_wasm_abi))]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum SessionEvent {
    /// Latest orientation, in whole degrees
    Orientation { x: i32, y: i32, rotation: i32 },

    /// Number of oscillator sets playing
    SetCount { count: usize },

    /// The active mode changed
    ModeChanged { mode: Mode },

    /// A stage parameter was written
    Param {
        stage: StageId,
        param: Param,
        value: f64,
    },

    /// A waveshaper curve was regenerated
    Curve { stage: StageId, kind: CurveKind },

    /// Edges to drop and create, in that order
    Topology {
        removed: Vec<Connection>,
        added: Vec<Connection>,
    },

    /// Message that must be shown to the user
    Notice { message: String },
}

impl SessionEvent {
    /// Coalescing key; `None` for events that must all be delivered
    pub fn key(&self) -> Option<String> {
        match self {
            SessionEvent::Orientation { .. } => Some("orientation".into()),
            SessionEvent::SetCount { .. } => Some("set_count".into()),
            SessionEvent::ModeChanged { .. } => Some("mode".into()),
            SessionEvent::Param { stage, param, .. } => Some(format!("param:{}:{}", stage, param)),
            SessionEvent::Curve { stage, .. } => Some(format!("curve:{}", stage)),
            SessionEvent::Topology { .. } | SessionEvent::Notice { .. } => None,
        }
    }
}

/// Event queue configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObserverConfig {
    /// Maximum pending events before the oldest coalescible ones are dropped
    pub max_pending: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self { max_pending: 256 }
    }
}

/// Pending events awaiting the host
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    pending: Vec<SessionEvent>,
    config: ObserverConfig,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_config(ObserverConfig::default())
    }

    pub fn with_config(config: ObserverConfig) -> Self {
        Self {
            pending: Vec::new(),
            config,
        }
    }

    /// Queue an event, replacing an older one with the same key
    pub fn push(&mut self, event: SessionEvent) {
        if let Some(key) = event.key() {
            self.pending.retain(|e| e.key().as_deref() != Some(key.as_str()));
        }
        self.pending.push(event);

        // Trim if over limit: drop the oldest coalescible events. Topology
        // diffs and notices are kept even past the limit.
        let max = self.config.max_pending.max(1);
        while self.pending.len() > max {
            match self.pending.iter().position(|e| e.key().is_some()) {
                Some(index) => {
                    self.pending.remove(index);
                }
                None => break,
            }
        }
    }

    /// Take every pending event, oldest first
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        core::mem::take(&mut self.pending)
    }

    /// Peek at pending events without draining
    pub fn pending(&self) -> &[SessionEvent] {
        &self.pending
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn config(&self) -> &ObserverConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_value_wins() {
        let mut queue = EventQueue::new();
        queue.push(SessionEvent::SetCount { count: 1 });
        queue.push(SessionEvent::Orientation {
            x: 1,
            y: 2,
            rotation: 3,
        });
        queue.push(SessionEvent::SetCount { count: 2 });

        let events = queue.drain();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], SessionEvent::SetCount { count: 2 });
        assert!(queue.is_empty());
    }

    #[test]
    fn test_params_coalesce_per_stage_and_param() {
        let mut queue = EventQueue::new();
        for value in [1.0, 2.0] {
            queue.push(SessionEvent::Param {
                stage: StageId::WetGain,
                param: Param::Gain,
                value,
            });
            queue.push(SessionEvent::Param {
                stage: StageId::DryGain,
                param: Param::Gain,
                value,
            });
        }
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_notices_are_never_coalesced() {
        let mut queue = EventQueue::new();
        queue.push(SessionEvent::Notice {
            message: "a".into(),
        });
        queue.push(SessionEvent::Notice {
            message: "a".into(),
        });
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_overflow_drops_oldest_coalescible() {
        let mut queue = EventQueue::with_config(ObserverConfig { max_pending: 3 });
        queue.push(SessionEvent::SetCount { count: 1 });
        queue.push(SessionEvent::Notice {
            message: "a".into(),
        });
        queue.push(SessionEvent::ModeChanged { mode: Mode::Dream });
        queue.push(SessionEvent::Orientation {
            x: 0,
            y: 0,
            rotation: 0,
        });

        let events = queue.drain();
        assert_eq!(events.len(), 3);
        assert!(!events.contains(&SessionEvent::SetCount { count: 1 }));
        assert_eq!(
            events[0],
            SessionEvent::Notice {
                message: "a".into()
            }
        );
    }

    #[test]
    fn test_overflow_keeps_topology_and_notices() {
        let mut queue = EventQueue::with_config(ObserverConfig { max_pending: 2 });
        for i in 0..4 {
            queue.push(SessionEvent::Topology {
                removed: Vec::new(),
                added: vec![Connection::new(StageId::Master, StageId::Destination)],
            });
            queue.push(SessionEvent::Notice {
                message: format!("{}", i),
            });
            queue.push(SessionEvent::SetCount { count: i });
        }

        let events = queue.drain();
        let topology = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Topology { .. }))
            .count();
        let notices = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Notice { .. }))
            .count();
        assert_eq!(topology, 4);
        assert_eq!(notices, 4);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SessionEvent::SetCount { .. })));
    }

    #[test]
    fn test_event_serialization() {
        let event = SessionEvent::ModeChanged { mode: Mode::Glitch };
        let json = serde_json::to_string(&event).unwrap();
        assert_eq!(json, r#"{"type":"mode_changed","mode":"glitch"}"#);
    }
}
