//! Frame delay (FIFO lookahead).

use crate::element::{Filter, FilterContext, Output};
use crate::error::{Error, Result};
use crate::frame::PlanarFrame;
use crate::pipeline::parser::FilterOptions;
use std::collections::VecDeque;

/// Upper bound on the window storage reserved up front.
const MAX_PREALLOC: usize = 16;

/// Withholds the most recent `frames` inputs.
///
/// Once the window is full each new input releases the oldest held frame,
/// so output order always equals input order. Flushing drains the window.
#[derive(Debug)]
pub struct Delay {
    frames: usize,
    window: VecDeque<PlanarFrame>,
}

impl Delay {
    /// Delay by `frames` frames. Zero makes the filter a pass-through.
    pub fn new(frames: usize) -> Self {
        Self {
            frames,
            window: VecDeque::with_capacity(frames.saturating_add(1).min(MAX_PREALLOC)),
        }
    }

    /// Create from descriptor options.
    pub fn from_options(options: &FilterOptions) -> Result<Self> {
        options.ensure_known("delay", &["frames"])?;
        let frames = match options.get_u64("delay", "frames")? {
            None => 1,
            Some(n) => usize::try_from(n).map_err(|e| Error::InvalidOption {
                filter: "delay".to_string(),
                key: "frames".to_string(),
                reason: e.to_string(),
            })?,
        };
        Ok(Self::new(frames))
    }

    /// Configured delay.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Frames currently held.
    pub fn held(&self) -> usize {
        self.window.len()
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Filter for Delay {
    fn name(&self) -> &str {
        "delay"
    }

    fn process(&mut self, frame: PlanarFrame, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        self.window.push_back(frame);
        if self.window.len() > self.frames {
            return Ok(self.window.pop_front().into());
        }
        Ok(Output::None)
    }

    fn flush(&mut self, _ctx: &mut FilterContext<'_>) -> Result<Output> {
        Ok(Output::from(self.window.drain(..).collect::<Vec<_>>()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elements::testing::{filled, gray};
    use crate::pipeline::FramePool;

    fn values(output: Output) -> Vec<u8> {
        output.into_iter().map(|f| f.to_bytes()[0]).collect()
    }

    #[test]
    fn test_delay_preserves_order() {
        let format = gray(2, 2);
        let mut pool = FramePool::new();
        let mut ctx = FilterContext::new("delay", format, format, &mut pool);
        let mut delay = Delay::new(2);

        let mut emitted = Vec::new();
        for v in 1..=5 {
            emitted.extend(values(delay.process(filled(&format, v), &mut ctx).unwrap()));
        }
        assert_eq!(emitted, [1, 2, 3]);
        assert_eq!(delay.held(), 2);

        assert_eq!(values(delay.flush(&mut ctx).unwrap()), [4, 5]);
        assert_eq!(delay.held(), 0);
    }

    #[test]
    fn test_delay_zero_is_passthrough() {
        let format = gray(2, 2);
        let mut pool = FramePool::new();
        let mut ctx = FilterContext::new("delay", format, format, &mut pool);
        let mut delay = Delay::new(0);

        assert_eq!(values(delay.process(filled(&format, 9), &mut ctx).unwrap()), [9]);
        assert!(delay.flush(&mut ctx).unwrap().is_empty());
    }

    #[test]
    fn test_delay_options() {
        let mut options = FilterOptions::new();
        assert_eq!(Delay::from_options(&options).unwrap().frames(), 1);
        options.insert("frames", "3");
        assert_eq!(Delay::from_options(&options).unwrap().frames(), 3);
        options.insert("frames", "-1");
        assert!(Delay::from_options(&options).is_err());
    }

    #[test]
    fn test_delay_huge_window() {
        let mut options = FilterOptions::new();
        options.insert("frames", "18446744073709551615");
        let mut delay = Delay::from_options(&options).unwrap();
        assert_eq!(delay.frames(), usize::MAX);

        let format = gray(2, 2);
        let mut pool = FramePool::new();
        let mut ctx = FilterContext::new("delay", format, format, &mut pool);
        assert!(delay.process(filled(&format, 3), &mut ctx).unwrap().is_empty());
        assert_eq!(values(delay.flush(&mut ctx).unwrap()), [3]);
    }
}
