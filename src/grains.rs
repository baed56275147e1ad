//! Granular Grain Scheduler
//!
//! Records the master bus into a rolling buffer and, while running, spawns a
//! short grain from that buffer on a fixed period. Each grain reads from a
//! random point behind the write head at a slightly randomised pitch and is
//! shaped by a linear fade-in/fade-out so it never clicks.
//!
//! Scheduling is cooperative: the host calls [`GrainScheduler::poll`] with the
//! current time and receives whatever grain came due. Recording and rendering
//! happen on the audio callback through [`GrainScheduler::process_block`].

use crate::processing::{BlockProcessor, RingBuffer};
use crate::rng::Rng;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Shortest grain, in seconds
pub const MIN_GRAIN_SECONDS: f64 = 0.01;
/// Longest grain, in seconds
pub const MAX_GRAIN_SECONDS: f64 = 0.2;

/// Scheduler tuning
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrainConfig {
    /// Length of the rolling recording buffer
    pub buffer_seconds: f64,
    /// Time between grain spawns
    pub period_ms: u64,
    /// Fraction of the buffer a grain may start from, behind the write head
    pub jitter: f64,
    /// Maximum relative pitch deviation of a grain
    pub pitch_spread: f64,
    /// Fade-in and fade-out length, each as a fraction of grain length
    pub fade_fraction: f64,
    /// Upper bound on simultaneously sounding grains
    pub max_voices: usize,
}

impl Default for GrainConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 3.0,
            period_ms: 100,
            jitter: 0.5,
            pitch_spread: 0.05,
            fade_fraction: 0.2,
            max_voices: 16,
        }
    }
}

/// One scheduled grain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grain {
    /// Absolute recorder frame the grain starts reading at
    pub start_frame: f64,
    /// Playback rate (pitch multiplier)
    pub rate: f64,
    /// Length in output frames
    pub length: usize,
    /// Fade-in and fade-out length in frames
    pub fade: usize,
}

impl Grain {
    /// Linear attack/release envelope at output frame `i`
    pub fn envelope(&self, i: usize) -> f32 {
        if i >= self.length {
            return 0.0;
        }
        if self.fade == 0 {
            return 1.0;
        }
        let attack = (i + 1) as f32 / self.fade as f32;
        let release = (self.length - i) as f32 / self.fade as f32;
        attack.min(release).min(1.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct Voice {
    grain: Grain,
    position: usize,
}

/// Periodic grain spawner with its recorder
#[derive(Debug, Clone)]
pub struct GrainScheduler {
    config: GrainConfig,
    sample_rate: f64,
    recorder: RingBuffer,
    grain_seconds: f64,
    next_due: Option<Duration>,
    voices: Vec<Voice>,
    spawned: u64,
}

impl GrainScheduler {
    pub fn new(config: GrainConfig, sample_rate: f64) -> Self {
        let capacity = (config.buffer_seconds.max(0.0) * sample_rate) as usize;
        Self {
            config,
            sample_rate,
            recorder: RingBuffer::new(capacity),
            grain_seconds: MIN_GRAIN_SECONDS,
            next_due: None,
            voices: Vec::with_capacity(config.max_voices),
            spawned: 0,
        }
    }

    pub fn config(&self) -> &GrainConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Grains spawned since creation
    pub fn spawned(&self) -> u64 {
        self.spawned
    }

    /// Grains currently sounding
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn grain_seconds(&self) -> f64 {
        self.grain_seconds
    }

    /// Set the grain duration, clamped to 10–200 ms.
    pub fn set_grain_seconds(&mut self, seconds: f64) {
        self.grain_seconds = if seconds.is_finite() {
            seconds.clamp(MIN_GRAIN_SECONDS, MAX_GRAIN_SECONDS)
        } else {
            MIN_GRAIN_SECONDS
        };
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.config.period_ms.max(1))
    }

    /// Begin spawning; the first grain comes due one period after `now`.
    ///
    /// Returns false if the scheduler was already running, in which case its
    /// timer is left as it was.
    pub fn start(&mut self, now: Duration) -> bool {
        if self.is_running() {
            return false;
        }
        self.next_due = Some(now + self.period());
        debug!(period_ms = self.config.period_ms, "grain scheduler started");
        true
    }

    /// Cancel the pending tick. Grains already sounding play out.
    pub fn stop(&mut self) -> bool {
        let was_running = self.next_due.take().is_some();
        if was_running {
            debug!(spawned = self.spawned, "grain scheduler stopped");
        }
        was_running
    }

    /// Spawn the grain due at `now`, if any.
    ///
    /// Missed ticks are not replayed: after a long gap one grain is spawned
    /// and the next tick is scheduled a full period later.
    pub fn poll(&mut self, now: Duration, rng: &mut Rng) -> Option<Grain> {
        let due = self.next_due?;
        if now < due {
            return None;
        }

        let period = self.period();
        let next = due + period;
        self.next_due = Some(if next <= now { now + period } else { next });

        let grain = self.make_grain(rng);
        if self.voices.len() < self.config.max_voices {
            self.voices.push(Voice { grain, position: 0 });
        }
        self.spawned += 1;
        Some(grain)
    }

    fn make_grain(&self, rng: &mut Rng) -> Grain {
        let rate = 1.0 + rng.range(-self.config.pitch_spread, self.config.pitch_spread);
        let length = ((self.grain_seconds * self.sample_rate) as usize).max(1);
        let fade = (length as f64 * self.config.fade_fraction.clamp(0.0, 0.5)) as usize;

        // Keep the whole read span behind the write head
        let span = length as f64 * (1.0 + self.config.pitch_spread);
        let window = self.config.jitter.clamp(0.0, 1.0) * self.recorder.len() as f64;
        let room = (self.recorder.len() as f64 - span).max(0.0);
        let offset = span + rng.next_f64() * window.min(room);

        Grain {
            start_frame: self.recorder.written() as f64 - offset,
            rate,
            length,
            fade,
        }
    }

    /// Record a block of the master bus without rendering
    pub fn record(&mut self, input: &[f32]) {
        self.recorder.write_block(input);
    }

    /// Mix every sounding grain into `output`, dropping finished ones.
    pub fn render(&mut self, output: &mut [f32]) {
        let recorder = &self.recorder;
        for voice in &mut self.voices {
            for sample in output.iter_mut() {
                if voice.position >= voice.grain.length {
                    break;
                }
                let frame = voice.grain.start_frame + voice.position as f64 * voice.grain.rate;
                *sample += recorder.read_absolute(frame) * voice.grain.envelope(voice.position);
                voice.position += 1;
            }
        }
        self.voices.retain(|v| v.position < v.grain.length);
    }
}

impl BlockProcessor for GrainScheduler {
    /// Record `input` (the master bus) and write the grain mix to `output`.
    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        self.record(input);
        output.fill(0.0);
        self.render(output);
    }

    fn reset(&mut self) {
        self.recorder.clear();
        self.voices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> GrainScheduler {
        GrainScheduler::new(GrainConfig::default(), 1000.0)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_idle_scheduler_never_spawns() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(1);
        for t in 0..50 {
            assert!(grains.poll(ms(t * 100), &mut rng).is_none());
        }
        assert_eq!(grains.spawned(), 0);
    }

    #[test]
    fn test_spawn_density() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(1);
        assert!(grains.start(ms(0)));

        // Poll every 10ms for one second: ten grains at 100ms intervals
        let count = (1..=100)
            .filter_map(|t| grains.poll(ms(t * 10), &mut rng))
            .count();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_start_twice_does_not_double_schedule() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(1);
        assert!(grains.start(ms(0)));
        assert!(!grains.start(ms(50)));

        let count = (1..=100)
            .filter_map(|t| grains.poll(ms(t * 10), &mut rng))
            .count();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_stop_cancels_pending_tick() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(1);
        grains.start(ms(0));
        assert!(grains.poll(ms(100), &mut rng).is_some());
        assert!(grains.stop());
        assert!(!grains.stop());
        for t in 2..20 {
            assert!(grains.poll(ms(t * 100), &mut rng).is_none());
        }
        assert_eq!(grains.spawned(), 1);
    }

    #[test]
    fn test_missed_ticks_are_not_replayed() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(1);
        grains.start(ms(0));
        assert!(grains.poll(ms(1000), &mut rng).is_some());
        assert!(grains.poll(ms(1050), &mut rng).is_none());
        assert!(grains.poll(ms(1100), &mut rng).is_some());
    }

    #[test]
    fn test_grain_size_clamped() {
        let mut grains = scheduler();
        grains.set_grain_seconds(5.0);
        assert_eq!(grains.grain_seconds(), MAX_GRAIN_SECONDS);
        grains.set_grain_seconds(0.0);
        assert_eq!(grains.grain_seconds(), MIN_GRAIN_SECONDS);
        grains.set_grain_seconds(f64::NAN);
        assert_eq!(grains.grain_seconds(), MIN_GRAIN_SECONDS);
    }

    #[test]
    fn test_grain_shape() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(4);
        grains.record(&vec![0.5; 3000]);
        grains.set_grain_seconds(0.1);
        grains.start(ms(0));

        for t in 1..30 {
            if let Some(grain) = grains.poll(ms(t * 100), &mut rng) {
                assert_eq!(grain.length, 100);
                assert_eq!(grain.fade, 20);
                assert!((0.95..=1.05).contains(&grain.rate));
                // Reads stay within recorded audio
                let end = grain.start_frame + grain.length as f64 * grain.rate;
                assert!(grain.start_frame >= 0.0);
                assert!(end <= 3000.0);
            }
        }
    }

    #[test]
    fn test_envelope_ramps() {
        let grain = Grain {
            start_frame: 0.0,
            rate: 1.0,
            length: 100,
            fade: 20,
        };
        assert!(grain.envelope(0) < 0.1);
        assert_eq!(grain.envelope(50), 1.0);
        assert!(grain.envelope(99) < 0.1);
        assert_eq!(grain.envelope(100), 0.0);
        for i in 1..20 {
            assert!(grain.envelope(i) > grain.envelope(i - 1));
        }
    }

    #[test]
    fn test_render_plays_grain_to_completion() {
        let mut grains = scheduler();
        let mut rng = Rng::from_seed(4);
        grains.record(&vec![1.0; 3000]);
        grains.set_grain_seconds(0.05);
        grains.start(ms(0));
        assert!(grains.poll(ms(100), &mut rng).is_some());
        grains.stop();

        let mut out = vec![0.0f32; 32];
        let mut total = Vec::new();
        while grains.active_voices() > 0 {
            out.fill(0.0);
            grains.render(&mut out);
            total.extend_from_slice(&out);
        }

        let peak = total.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak > 0.9 && peak <= 1.0);
        assert!(total[0] < 0.2);
        assert_eq!(total.iter().filter(|s| **s > 0.0).count(), 50);
    }

    #[test]
    fn test_process_block_records_and_outputs_silence_when_idle() {
        let mut grains = scheduler();
        let input = [0.3f32; 64];
        let mut output = [1.0f32; 64];
        grains.process_block(&input, &mut output);
        assert!(output.iter().all(|s| *s == 0.0));
        assert_eq!(grains.recorder.written(), 64);
    }
}
