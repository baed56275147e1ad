//! Real-Time Block Processing
//!
//! The only sample-level work the core does itself: the sample-and-hold rate
//! reducer and the rolling recorder that feeds granular playback. Both are
//! driven by the rendering backend once per audio buffer through
//! [`BlockProcessor`] and never allocate after construction.

/// A processor the audio callback drives once per buffer.
///
/// `input` and `output` have the same length; implementations must not block
/// or allocate.
pub trait BlockProcessor {
    fn process_block(&mut self, input: &[f32], output: &mut [f32]);

    /// Clear internal state
    fn reset(&mut self) {}
}

/// Fixed-size circular buffer with an absolute write counter
///
/// Frames are addressed by the absolute frame number they were written at
/// (`read_absolute`), which lets a reader snapshot a position once and keep
/// reading while the writer moves on.
#[derive(Debug, Clone)]
pub struct RingBuffer {
    buffer: Vec<f32>,
    write_pos: usize,
    written: u64,
}

impl RingBuffer {
    /// Create a new ring buffer with the given capacity (at least one frame)
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![0.0; capacity.max(1)],
            write_pos: 0,
            written: 0,
        }
    }

    /// Get the buffer size
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total frames written since creation or the last clear
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Write a sample and return the one it replaced
    #[inline]
    pub fn write(&mut self, sample: f32) -> f32 {
        let old = self.buffer[self.write_pos];
        self.buffer[self.write_pos] = sample;
        self.write_pos += 1;
        if self.write_pos == self.buffer.len() {
            self.write_pos = 0;
        }
        self.written += 1;
        old
    }

    pub fn write_block(&mut self, samples: &[f32]) {
        for &s in samples {
            self.write(s);
        }
    }

    /// Read by absolute frame number with linear interpolation.
    ///
    /// Frames not yet written, or already overwritten, read as silence.
    pub fn read_absolute(&self, frame: f64) -> f32 {
        if frame < 0.0 {
            return 0.0;
        }
        let index = frame as u64;
        let frac = (frame - index as f64) as f32;
        let a = self.frame(index);
        let b = self.frame(index + 1);
        a + frac * (b - a)
    }

    fn frame(&self, index: u64) -> f32 {
        let size = self.buffer.len() as u64;
        if index >= self.written || self.written - index > size {
            return 0.0;
        }
        self.buffer[(index % size) as usize]
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
        self.written = 0;
    }
}

/// Sample-and-hold rate reducer
///
/// Takes one input sample every `hold` frames and repeats it in between,
/// which lowers the effective sample rate by that factor.
#[derive(Debug, Clone)]
pub struct SampleReducer {
    hold: usize,
    counter: usize,
    held: f32,
}

impl SampleReducer {
    pub fn new(hold: usize) -> Self {
        Self {
            hold: hold.max(1),
            counter: 0,
            held: 0.0,
        }
    }

    pub fn hold(&self) -> usize {
        self.hold
    }

    /// Change the hold length; the current hold period is cut short if needed
    pub fn set_hold(&mut self, hold: usize) {
        self.hold = hold.max(1);
        if self.counter >= self.hold {
            self.counter = 0;
        }
    }
}

impl Default for SampleReducer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl BlockProcessor for SampleReducer {
    fn process_block(&mut self, input: &[f32], output: &mut [f32]) {
        for (x, y) in input.iter().zip(output.iter_mut()) {
            if self.counter == 0 {
                self.held = *x;
            }
            *y = self.held;
            self.counter += 1;
            if self.counter >= self.hold {
                self.counter = 0;
            }
        }
    }

    fn reset(&mut self) {
        self.counter = 0;
        self.held = 0.0;
    }
}
