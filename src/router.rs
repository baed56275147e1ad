//! Graph Router
//!
//! Owns every connection between effect stages. The topology of each [`Mode`]
//! is a static edge table; switching modes drops all live edges and rebuilds
//! the adjacency list from the table of the new mode.
//!
//! A rebuild is validated before it goes live: the candidate edge set must be
//! cycle-free (Kahn's algorithm) and the master bus must reach the
//! destination. A rejected candidate leaves the previous topology in place.
//!
//! ```text
//! Noise:   master → fold → noise shaper → reducer → crusher → crush bus
//! Dream:   master → highpass → reverb → (delay + dry) → merge → reducer → crusher → crush bus
//! Glitch:  master → notch → ring mod → reducer → crusher → crush bus
//! Classic: master → drive → out, drive → gain → reverb → out
//!
//! tail:    noise → noise gain → crush bus
//!          crush bus → dry → compressor, crush bus → reverb → wet → compressor
//!          compressor → out
//! ```

use crate::stage::{Param, StageId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::{info, warn};

/// Mutually exclusive routing configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Noise,
    Dream,
    Glitch,
    /// Single-chain patch: drive into a short reverb
    Classic,
}

impl Mode {
    pub const ALL: [Mode; 4] = [Mode::Noise, Mode::Dream, Mode::Glitch, Mode::Classic];

    pub fn name(&self) -> &'static str {
        match self {
            Mode::Noise => "noise",
            Mode::Dream => "dream",
            Mode::Glitch => "glitch",
            Mode::Classic => "classic",
        }
    }

    /// Master bus gain compensating the perceived loudness of the topology
    pub fn master_gain(&self) -> f64 {
        match self {
            Mode::Noise => 1.0,
            Mode::Dream => 0.8,
            Mode::Glitch => 0.7,
            Mode::Classic => 1.0,
        }
    }

    /// Whether the granular scheduler runs in this mode
    pub fn uses_grains(&self) -> bool {
        matches!(self, Mode::Glitch)
    }
}

impl core::fmt::Display for Mode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

impl core::str::FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .iter()
            .copied()
            .find(|m| m.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownMode(s.to_string()))
    }
}

/// A mode name that matches none of [`Mode::ALL`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMode(pub String);

impl core::fmt::Display for UnknownMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Unknown mode: {}", self.0)
    }
}

impl std::error::Error for UnknownMode {}

/// Where a connection lands on the receiving stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "param")]
pub enum Target {
    /// The stage's audio input
    Input,
    /// An audio-rate modulation input of a parameter
    Param(Param),
}

/// A directed edge between two stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection {
    pub from: StageId,
    pub to: StageId,
    pub target: Target,
}

impl Connection {
    pub const fn new(from: StageId, to: StageId) -> Self {
        Self {
            from,
            to,
            target: Target::Input,
        }
    }

    pub const fn to_param(from: StageId, to: StageId, param: Param) -> Self {
        Self {
            from,
            to,
            target: Target::Param(param),
        }
    }
}

const fn edge(from: StageId, to: StageId) -> Connection {
    Connection::new(from, to)
}

const NOISE_HEAD: &[Connection] = &[
    edge(StageId::Master, StageId::FoldShaper),
    edge(StageId::FoldShaper, StageId::NoiseShaper),
    edge(StageId::NoiseShaper, StageId::SampleReducer),
];

const DREAM_HEAD: &[Connection] = &[
    edge(StageId::Master, StageId::Highpass),
    edge(StageId::Highpass, StageId::DreamReverb),
    edge(StageId::DreamReverb, StageId::StereoDelay),
    edge(StageId::DreamReverb, StageId::DelayMerge),
    edge(StageId::StereoDelay, StageId::DelayMerge),
    edge(StageId::DelayMerge, StageId::SampleReducer),
];

const GLITCH_HEAD: &[Connection] = &[
    edge(StageId::Master, StageId::Notch),
    edge(StageId::Notch, StageId::RingModulator),
    Connection::to_param(StageId::RingCarrier, StageId::RingModulator, Param::Gain),
    edge(StageId::RingModulator, StageId::SampleReducer),
    edge(StageId::GrainBus, StageId::Compressor),
];

/// Shared lo-fi tail of Noise, Dream and Glitch
const LOFI_TAIL: &[Connection] = &[
    edge(StageId::SampleReducer, StageId::Bitcrusher),
    edge(StageId::Bitcrusher, StageId::CrushBus),
    edge(StageId::NoiseSource, StageId::NoiseGain),
    edge(StageId::NoiseGain, StageId::CrushBus),
    edge(StageId::CrushBus, StageId::DryGain),
    edge(StageId::CrushBus, StageId::Reverb),
    edge(StageId::Reverb, StageId::WetGain),
    edge(StageId::DryGain, StageId::Compressor),
    edge(StageId::WetGain, StageId::Compressor),
    edge(StageId::Compressor, StageId::Destination),
];

const CLASSIC: &[Connection] = &[
    edge(StageId::Master, StageId::Drive),
    edge(StageId::Drive, StageId::Destination),
    edge(StageId::Drive, StageId::ClassicGain),
    edge(StageId::ClassicGain, StageId::Reverb),
    edge(StageId::Reverb, StageId::Destination),
];

/// The ordered edge table of a mode
pub fn topology(mode: Mode) -> Vec<Connection> {
    match mode {
        Mode::Noise => [NOISE_HEAD, LOFI_TAIL].concat(),
        Mode::Dream => [DREAM_HEAD, LOFI_TAIL].concat(),
        Mode::Glitch => [GLITCH_HEAD, LOFI_TAIL].concat(),
        Mode::Classic => CLASSIC.to_vec(),
    }
}

/// Error types for routing operations
#[derive(Debug, Clone, PartialEq)]
pub enum RouterError {
    CycleDetected { stages: Vec<StageId> },
    Unreachable { mode: Mode },
}

impl core::fmt::Display for RouterError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RouterError::CycleDetected { stages } => {
                write!(f, "Cycle detected involving {} stages", stages.len())
            }
            RouterError::Unreachable { mode } => {
                write!(f, "Master bus does not reach the destination in {} mode", mode)
            }
        }
    }
}

impl std::error::Error for RouterError {}

/// Edge difference produced by a mode switch, for mirroring into a backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyChange {
    pub from: Option<Mode>,
    pub to: Mode,
    pub removed: Vec<Connection>,
    pub added: Vec<Connection>,
}

impl TopologyChange {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Adjacency list of live connections, keyed by source stage
#[derive(Debug, Clone, Default)]
pub struct GraphRouter {
    mode: Mode,
    adjacency: BTreeMap<StageId, BTreeSet<Connection>>,
    built: bool,
}

impl GraphRouter {
    /// A router in the initial Noise mode with nothing connected yet
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Whether any topology has been built since creation or the last reset
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Remove every outgoing connection of a stage.
    ///
    /// Returns how many edges were dropped; an unconnected stage is a no-op.
    pub fn disconnect(&mut self, stage: StageId) -> usize {
        self.adjacency.remove(&stage).map(|e| e.len()).unwrap_or(0)
    }

    /// Remove every connection
    pub fn disconnect_all(&mut self) -> usize {
        StageId::ALL.iter().map(|&s| self.disconnect(s)).sum()
    }

    /// Forget the current topology and return to the initial state
    pub fn reset(&mut self) {
        self.disconnect_all();
        self.mode = Mode::default();
        self.built = false;
    }

    /// Rebuild the connection graph for `mode`.
    pub fn switch_mode(&mut self, mode: Mode) -> Result<TopologyChange, RouterError> {
        self.rebuild(mode, &topology(mode))
    }

    /// Replace the live edges with `edges` under `mode`, if they validate.
    pub(crate) fn rebuild(
        &mut self,
        mode: Mode,
        edges: &[Connection],
    ) -> Result<TopologyChange, RouterError> {
        if let Err(e) = validate(mode, edges) {
            warn!(%mode, error = %e, "rejected topology");
            return Err(e);
        }

        let previous: BTreeSet<Connection> = self.connections().into_iter().collect();
        let from = self.built.then_some(self.mode);

        self.disconnect_all();
        for &connection in edges {
            self.adjacency
                .entry(connection.from)
                .or_default()
                .insert(connection);
        }
        self.mode = mode;
        self.built = true;

        let current: BTreeSet<Connection> = self.connections().into_iter().collect();
        let change = TopologyChange {
            from,
            to: mode,
            removed: previous.difference(&current).copied().collect(),
            added: current.difference(&previous).copied().collect(),
        };
        info!(
            %mode,
            edges = current.len(),
            removed = change.removed.len(),
            added = change.added.len(),
            "switched routing mode"
        );
        Ok(change)
    }

    /// All live connections, sorted
    pub fn connections(&self) -> Vec<Connection> {
        self.adjacency.values().flatten().copied().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(|e| e.len()).sum()
    }

    /// Outgoing connections of a stage
    pub fn outputs(&self, stage: StageId) -> Vec<Connection> {
        self.adjacency
            .get(&stage)
            .map(|e| e.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn is_connected(&self, from: StageId, to: StageId) -> bool {
        self.adjacency
            .get(&from)
            .map(|e| e.iter().any(|c| c.to == to))
            .unwrap_or(false)
    }

    /// Whether signal leaving `from` can arrive at `to` over live edges
    pub fn reaches(&self, from: StageId, to: StageId) -> bool {
        reaches(&self.connections(), from, to)
    }
}

/// Check an edge set for cycles and master-to-destination reachability.
pub fn validate(mode: Mode, edges: &[Connection]) -> Result<(), RouterError> {
    topological_sort(edges)?;
    if !reaches(edges, StageId::Master, StageId::Destination) {
        return Err(RouterError::Unreachable { mode });
    }
    Ok(())
}

fn topological_sort(edges: &[Connection]) -> Result<Vec<StageId>, RouterError> {
    let mut in_degree: HashMap<StageId, usize> = HashMap::new();
    let mut successors: HashMap<StageId, Vec<StageId>> = HashMap::new();

    for connection in edges {
        in_degree.entry(connection.from).or_insert(0);
        *in_degree.entry(connection.to).or_insert(0) += 1;
        successors
            .entry(connection.from)
            .or_default()
            .push(connection.to);
    }

    // Kahn's algorithm
    let mut queue: VecDeque<StageId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut result = Vec::with_capacity(in_degree.len());

    while let Some(stage) = queue.pop_front() {
        result.push(stage);
        for succ in successors.get(&stage).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(succ) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(*succ);
                }
            }
        }
    }

    if result.len() != in_degree.len() {
        let mut in_cycle: Vec<StageId> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(id, _)| id)
            .collect();
        in_cycle.sort();
        return Err(RouterError::CycleDetected { stages: in_cycle });
    }

    Ok(result)
}

fn reaches(edges: &[Connection], from: StageId, to: StageId) -> bool {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([from]);
    while let Some(stage) = queue.pop_front() {
        if stage == to {
            return true;
        }
        if !seen.insert(stage) {
            continue;
        }
        queue.extend(edges.iter().filter(|c| c.from == stage).map(|c| c.to));
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_topology_validates() {
        for mode in Mode::ALL {
            assert_eq!(validate(mode, &topology(mode)), Ok(()), "{} mode", mode);
        }
    }

    #[test]
    fn test_tables_have_no_duplicates() {
        for mode in Mode::ALL {
            let edges = topology(mode);
            let unique: BTreeSet<Connection> = edges.iter().copied().collect();
            assert_eq!(unique.len(), edges.len(), "{} mode", mode);
        }
    }

    #[test]
    fn test_initial_state() {
        let router = GraphRouter::new();
        assert_eq!(router.mode(), Mode::Noise);
        assert_eq!(router.edge_count(), 0);
        assert!(!router.is_built());
    }

    #[test]
    fn test_disconnect_unconnected_is_noop() {
        let mut router = GraphRouter::new();
        assert_eq!(router.disconnect(StageId::Compressor), 0);
        assert_eq!(router.disconnect_all(), 0);
    }

    #[test]
    fn test_switch_mode_is_idempotent() {
        let mut router = GraphRouter::new();
        let first = router.switch_mode(Mode::Dream).map(|c| c.added.len());
        let once = router.connections();

        for _ in 0..5 {
            let change = router.switch_mode(Mode::Dream);
            assert!(change.map(|c| c.is_empty()).unwrap_or(false));
        }

        assert_eq!(first, Ok(once.len()));
        assert_eq!(router.connections(), once);
        assert_eq!(router.edge_count(), topology(Mode::Dream).len());
    }

    #[test]
    fn test_no_leakage_between_modes() {
        for from in Mode::ALL {
            for to in Mode::ALL {
                if from == to {
                    continue;
                }
                let mut router = GraphRouter::new();
                assert!(router.switch_mode(from).is_ok());
                assert!(router.switch_mode(to).is_ok());

                let live: BTreeSet<Connection> = router.connections().into_iter().collect();
                let expected: BTreeSet<Connection> = topology(to).into_iter().collect();
                assert_eq!(live, expected, "{} -> {}", from, to);
            }
        }
    }

    #[test]
    fn test_change_reports_diff() {
        let mut router = GraphRouter::new();
        let first = router.switch_mode(Mode::Noise).unwrap_or_default();
        assert_eq!(first.from, None);
        assert_eq!(first.added.len(), topology(Mode::Noise).len());

        let change = router.switch_mode(Mode::Glitch).unwrap_or_default();
        assert_eq!(change.from, Some(Mode::Noise));
        assert!(change
            .removed
            .contains(&edge(StageId::Master, StageId::FoldShaper)));
        assert!(change.added.contains(&Connection::to_param(
            StageId::RingCarrier,
            StageId::RingModulator,
            Param::Gain
        )));
        // The shared tail stays connected
        assert!(!change
            .removed
            .contains(&edge(StageId::Compressor, StageId::Destination)));
    }

    #[test]
    fn test_master_reaches_destination() {
        let mut router = GraphRouter::new();
        for mode in Mode::ALL {
            assert!(router.switch_mode(mode).is_ok());
            assert!(router.reaches(StageId::Master, StageId::Destination));
        }
    }

    #[test]
    fn test_glitch_routes_grains_into_compressor() {
        let mut router = GraphRouter::new();
        assert!(router.switch_mode(Mode::Glitch).is_ok());
        assert!(router.is_connected(StageId::GrainBus, StageId::Compressor));
        assert!(router.switch_mode(Mode::Noise).is_ok());
        assert!(!router.is_connected(StageId::GrainBus, StageId::Compressor));
    }

    #[test]
    fn test_cyclic_rebuild_is_rejected_and_rolled_back() {
        let mut router = GraphRouter::new();
        assert!(router.switch_mode(Mode::Noise).is_ok());
        let before = router.connections();

        let mut cyclic = topology(Mode::Noise);
        cyclic.push(edge(StageId::Compressor, StageId::CrushBus));
        let result = router.rebuild(Mode::Dream, &cyclic);

        assert!(matches!(result, Err(RouterError::CycleDetected { .. })));
        assert_eq!(router.mode(), Mode::Noise);
        assert_eq!(router.connections(), before);
    }

    #[test]
    fn test_unreachable_destination_is_rejected() {
        let edges = vec![edge(StageId::Master, StageId::Drive)];
        assert_eq!(
            validate(Mode::Classic, &edges),
            Err(RouterError::Unreachable {
                mode: Mode::Classic
            })
        );
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("glitch".parse::<Mode>(), Ok(Mode::Glitch));
        assert_eq!(" Dream ".parse::<Mode>(), Ok(Mode::Dream));
        assert!("ambient".parse::<Mode>().is_err());
    }

    #[test]
    fn test_reset_returns_to_initial_state() {
        let mut router = GraphRouter::new();
        assert!(router.switch_mode(Mode::Glitch).is_ok());
        router.reset();
        assert_eq!(router.mode(), Mode::Noise);
        assert_eq!(router.edge_count(), 0);
    }
}
