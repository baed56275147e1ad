//! Oscillator Set Pool
//!
//! A growable collection of generator triples (square, sine, triangle) summed
//! into the master bus. Sets are only ever added: each one is started the
//! moment it is created and keeps running until the session stops.
//!
//! Loudness compensation is approximate. A new set's gain is
//! `base_gain / sqrt(n)` where `n` counts the pool including the new set;
//! sets created earlier keep the gain they were born with.

use crate::rng::Rng;
use libm::Libm;
use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Stable handle to an oscillator set
    pub struct SetId;
}

/// Generator waveform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Waveform {
    Square,
    Sine,
    Triangle,
}

impl Waveform {
    /// Waveforms of a set, in generator order
    pub const SET: [Waveform; 3] = [Waveform::Square, Waveform::Sine, Waveform::Triangle];
}

/// A single tone generator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Generator {
    pub waveform: Waveform,
    /// Hz
    pub frequency: f64,
    /// Cents
    pub detune: f64,
    pub running: bool,
}

/// Three co-modulated generators feeding a per-set gain node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscillatorSet {
    generators: [Generator; 3],
    gain: f64,
    detune_offset: f64,
}

impl OscillatorSet {
    pub fn generators(&self) -> &[Generator; 3] {
        &self.generators
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Static detune of the set in cents, added under orientation detune
    pub fn detune_offset(&self) -> f64 {
        self.detune_offset
    }

    /// Overwrite the live detune of each generator (square, sine, triangle).
    pub fn set_detunes(&mut self, detunes: [f64; 3]) {
        for (generator, detune) in self.generators.iter_mut().zip(detunes) {
            generator.detune = detune;
        }
    }
}

/// Pool construction settings
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub base_frequency: f64,
    pub multiplier: f64,
    /// Gain of the first set; later sets get `base_gain / sqrt(n)`
    pub base_gain: f64,
    /// Cents between consecutive sets' detune offsets, also the jitter width
    pub detune_spread: f64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            base_frequency: 50.0,
            multiplier: 1.0,
            base_gain: 0.3,
            detune_spread: 15.0,
        }
    }
}

/// The growable collection of oscillator sets
#[derive(Debug, Clone)]
pub struct OscillatorPool {
    // Insert-only, so slot order is creation order
    sets: SlotMap<SetId, OscillatorSet>,
    settings: PoolSettings,
}

impl OscillatorPool {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            sets: SlotMap::with_key(),
            settings,
        }
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn base_frequency(&self) -> f64 {
        self.settings.base_frequency
    }

    pub fn multiplier(&self) -> f64 {
        self.settings.multiplier
    }

    pub fn get(&self, id: SetId) -> Option<&OscillatorSet> {
        self.sets.get(id)
    }

    /// Sets in creation order
    pub fn iter(&self) -> impl Iterator<Item = (SetId, &OscillatorSet)> {
        self.sets.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SetId, &mut OscillatorSet)> {
        self.sets.iter_mut()
    }

    /// Gain the next created set will receive
    pub fn next_gain(&self) -> f64 {
        self.settings.base_gain / Libm::<f64>::sqrt((self.sets.len() + 1) as f64)
    }

    /// Create a running set at the current base frequency.
    pub fn create_set(&mut self, detune_offset: f64) -> SetId {
        let gain = self.next_gain();
        let frequency = self.settings.base_frequency;
        let generators = Waveform::SET.map(|waveform| Generator {
            waveform,
            frequency,
            detune: detune_offset,
            running: true,
        });

        self.sets.insert(OscillatorSet {
            generators,
            gain,
            detune_offset,
        })
    }

    /// Create a set spread away from the existing ones.
    ///
    /// The offset is `len * spread` plus uniform jitter of `±spread`.
    pub fn add_set(&mut self, rng: &mut Rng) -> SetId {
        let spread = self.settings.detune_spread;
        let offset = self.sets.len() as f64 * spread + rng.range(-spread, spread);
        self.create_set(offset)
    }

    /// Change base frequency and detune multiplier for every set.
    ///
    /// Generator frequencies follow; detune is left alone.
    pub fn set_base_frequency(&mut self, frequency: f64, multiplier: f64) {
        self.settings.base_frequency = frequency;
        self.settings.multiplier = multiplier;
        for set in self.sets.values_mut() {
            for generator in &mut set.generators {
                generator.frequency = frequency;
            }
        }
    }

    /// Halt every generator.
    pub fn stop_all(&mut self) {
        for set in self.sets.values_mut() {
            for generator in &mut set.generators {
                generator.running = false;
            }
        }
    }
}

impl Default for OscillatorPool {
    fn default() -> Self {
        Self::new(PoolSettings::default())
    }
}

/// Frequency range selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "wasm", derive(tsify::Tsify))]
#[serde(rename_all = "snake_case")]
pub enum FrequencyRange {
    #[default]
    Low,
    Mid,
    Full,
}

impl FrequencyRange {
    pub const ALL: [FrequencyRange; 3] =
        [FrequencyRange::Low, FrequencyRange::Mid, FrequencyRange::Full];

    /// Base frequency in Hz
    pub fn base_frequency(&self) -> f64 {
        match self {
            FrequencyRange::Low => 50.0,
            FrequencyRange::Mid => 110.0,
            FrequencyRange::Full => 220.0,
        }
    }

    /// Detune depth multiplier
    pub fn multiplier(&self) -> f64 {
        match self {
            FrequencyRange::Low => 1.0,
            FrequencyRange::Mid => 2.0,
            FrequencyRange::Full => 4.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrequencyRange::Low => "low",
            FrequencyRange::Mid => "mid",
            FrequencyRange::Full => "full",
        }
    }

    /// Map a selector index; larger indices saturate at `Full`.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

impl core::str::FromStr for FrequencyRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("Unknown frequency range: {}", s))
    }
}
