//! Streaming driver: moves raw frames between byte streams and a graph.
//!
//! The driver owns a configured [`FilterGraph`], one reusable input frame,
//! one reusable output frame and the frame counters of a single run. Each
//! iteration reads exactly one frame's worth of bytes, pushes it, and writes
//! every frame that reaches the sink. At end of input the graph is flushed
//! and the drained frames are written the same way.
//!
//! # Example
//!
//! ```rust
//! use planefilter::pipeline::{DriverConfig, StreamingDriver};
//!
//! let config = DriverConfig::new(4, 2).with_descriptor("negate");
//! let mut driver = StreamingDriver::new(config).unwrap();
//!
//! let input: Vec<u8> = vec![0; 12 * 3];
//! let mut output = Vec::new();
//! let result = driver.run(&mut input.as_slice(), &mut output).unwrap();
//!
//! assert_eq!(result.frames_processed, 3);
//! assert!(output.iter().all(|&v| v == 255));
//! ```

use crate::element::PadRef;
use crate::error::{Error, Result};
use crate::format::{FormatCaps, Framerate, PixelFormat, VideoFormat};
use crate::frame::{PlanarFrame, validate_geometry};
use crate::io::{ByteSink, ByteSource, ReadSource, WriteSink};
use crate::pipeline::factory::FilterFactory;
use crate::pipeline::graph::FilterGraph;
use std::io::{Read, Write};
use tracing::{debug, info, trace};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a streaming run.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Pixel format of the input stream.
    pub pixel_format: PixelFormat,

    /// Frame rate used for timestamps.
    pub framerate: Framerate,

    /// Filter chain between source and sink.
    pub descriptor: String,

    /// Formats the sink accepts.
    pub sink_formats: FormatCaps,

    /// Stride alignment of the driver's frames, in bytes (power of two).
    pub alignment: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            width: 480,
            height: 272,
            pixel_format: PixelFormat::Yuv420p,
            framerate: Framerate::FPS_25,
            descriptor: "null".to_string(),
            sink_formats: FormatCaps::Fixed(PixelFormat::Yuv420p),
            alignment: 1,
        }
    }
}

impl DriverConfig {
    /// Default configuration at the given geometry.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Self::default()
        }
    }

    /// Set the input pixel format.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Set the frame rate.
    pub fn with_framerate(mut self, framerate: Framerate) -> Self {
        self.framerate = framerate;
        self
    }

    /// Set the filter chain.
    pub fn with_descriptor(mut self, descriptor: impl Into<String>) -> Self {
        self.descriptor = descriptor.into();
        self
    }

    /// Set the formats the sink accepts.
    pub fn with_sink_formats(mut self, formats: impl Into<FormatCaps>) -> Self {
        self.sink_formats = formats.into();
        self
    }

    /// Set the stride alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Input stream format.
    pub fn input_format(&self) -> VideoFormat {
        VideoFormat::new(self.width, self.height, self.pixel_format, self.framerate)
    }

    /// Bytes per input frame.
    pub fn frame_size(&self) -> usize {
        self.pixel_format.frame_size(self.width, self.height)
    }

    /// Check geometry and alignment.
    pub fn validate(&self) -> Result<()> {
        validate_geometry(self.width, self.height, self.pixel_format)?;
        if !self.alignment.is_power_of_two() {
            return Err(Error::InvalidGeometry {
                width: self.width,
                height: self.height,
                format: self.pixel_format,
                reason: format!("stride alignment {} is not a power of two", self.alignment),
            });
        }
        Ok(())
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineResult {
    /// Complete frames read from the byte source.
    pub frames_read: u64,
    /// Frames written to the byte sink, including those drained by flush.
    pub frames_processed: u64,
}

// ============================================================================
// Driver
// ============================================================================

/// Runs one stream through a configured filter graph.
pub struct StreamingDriver {
    config: DriverConfig,
    graph: FilterGraph,
    input: PlanarFrame,
    output: PlanarFrame,
    scratch: Vec<u8>,
    frames_read: u64,
    frames_processed: u64,
}

impl StreamingDriver {
    /// Build and configure the graph described by `config`.
    pub fn new(config: DriverConfig) -> Result<Self> {
        Self::with_factory(config, FilterFactory::new())
    }

    /// Like [`new`](Self::new), resolving filter names through `factory`.
    pub fn with_factory(config: DriverConfig, factory: FilterFactory) -> Result<Self> {
        config.validate()?;

        let mut graph = FilterGraph::with_factory(factory);
        let src = graph.create_source(
            config.pixel_format,
            config.width,
            config.height,
            config.framerate,
        )?;
        let sink = graph.create_sink(config.sink_formats.clone())?;
        graph.parse_and_link(
            &config.descriptor,
            PadRef::output(src, 0),
            PadRef::input(sink, 0),
        )?;
        graph.configure()?;

        let input_format = config.input_format();
        let output_format = graph.output_format().copied().unwrap_or(input_format);
        let input = PlanarFrame::allocate_aligned(
            input_format.width,
            input_format.height,
            input_format.pixel_format,
            config.alignment,
        )?;
        let output = PlanarFrame::allocate_aligned(
            output_format.width,
            output_format.height,
            output_format.pixel_format,
            config.alignment,
        )?;
        debug!(
            descriptor = %config.descriptor,
            input = %input_format,
            output = %output_format,
            "streaming driver ready"
        );

        Ok(Self {
            scratch: vec![0; input.total_bytes()],
            config,
            graph,
            input,
            output,
            frames_read: 0,
            frames_processed: 0,
        })
    }

    /// The configuration this driver was built from.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The driver's graph.
    pub fn graph(&self) -> &FilterGraph {
        &self.graph
    }

    /// Complete frames read so far.
    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    /// Frames written so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// Stream every frame from `source` through the graph into `sink`.
    ///
    /// A source that ends exactly on a frame boundary ends the stream
    /// normally; one that ends inside a frame fails with
    /// [`Error::TruncatedFrame`]. Any failure closes the graph.
    pub fn run<S, W>(&mut self, source: &mut S, sink: &mut W) -> Result<PipelineResult>
    where
        S: ByteSource + ?Sized,
        W: ByteSink + ?Sized,
    {
        let result = self.stream(source, sink);
        if result.is_err() {
            self.graph.close();
        }
        result
    }

    /// [`run`](Self::run) over `std::io` reader and writer.
    pub fn run_io<R: Read, W: Write>(&mut self, reader: R, writer: W) -> Result<PipelineResult> {
        let mut source = ReadSource::new(reader);
        let mut sink = WriteSink::new(writer);
        self.run(&mut source, &mut sink)
    }

    fn stream<S, W>(&mut self, source: &mut S, sink: &mut W) -> Result<PipelineResult>
    where
        S: ByteSource + ?Sized,
        W: ByteSink + ?Sized,
    {
        loop {
            match source.read_exact(&mut self.scratch) {
                Ok(()) => {}
                Err(e) if e.is_end_of_stream() => break,
                Err(Error::ShortRead { expected, got }) => {
                    return Err(Error::TruncatedFrame {
                        frame: self.frames_read,
                        expected,
                        got,
                    });
                }
                Err(e) => return Err(e),
            }

            self.input.fill_from(&self.scratch)?;
            self.frames_read += 1;
            self.graph.push(&self.input)?;

            while self.graph.pull_into(&mut self.output)? {
                self.output.write_to(sink)?;
                self.frames_processed += 1;
            }
            trace!(
                frames_read = self.frames_read,
                frames_processed = self.frames_processed,
                "frame cycle"
            );
        }

        for frame in self.graph.flush()? {
            frame?.write_to(sink)?;
            self.frames_processed += 1;
        }
        sink.flush()?;

        info!(
            frames_read = self.frames_read,
            frames_processed = self.frames_processed,
            "Complete with {} frames",
            self.frames_processed
        );
        Ok(PipelineResult {
            frames_read: self.frames_read,
            frames_processed: self.frames_processed,
        })
    }
}

impl std::fmt::Debug for StreamingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDriver")
            .field("descriptor", &self.config.descriptor)
            .field("graph", &self.graph)
            .field("frames_read", &self.frames_read)
            .field("frames_processed", &self.frames_processed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::NodeState;

    fn ramp(len: usize) -> Vec<u8> {
        (0..len).map(|i| i as u8).collect()
    }

    #[test]
    fn test_default_config() {
        let config = DriverConfig::default();
        assert_eq!((config.width, config.height), (480, 272));
        assert_eq!(config.pixel_format, PixelFormat::Yuv420p);
        assert_eq!(config.framerate, Framerate::FPS_25);
        assert_eq!(config.descriptor, "null");
        assert_eq!(config.frame_size(), 480 * 272 * 3 / 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(DriverConfig::new(0, 2).validate().is_err());
        assert!(DriverConfig::new(3, 2).validate().is_err());
        assert!(DriverConfig::new(4, 2).with_alignment(3).validate().is_err());
        assert!(DriverConfig::new(4, 2).with_alignment(32).validate().is_ok());
    }

    #[test]
    fn test_run_passthrough() {
        let mut driver = StreamingDriver::new(DriverConfig::new(4, 2)).unwrap();
        let input = ramp(36);
        let mut output = Vec::new();

        let result = driver.run(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(
            result,
            PipelineResult {
                frames_read: 3,
                frames_processed: 3
            }
        );
        assert_eq!(output, input);
        assert_eq!(driver.graph().state(), NodeState::Closed);
    }

    #[test]
    fn test_run_aligned_frames_round_trip() {
        let config = DriverConfig::new(6, 4).with_alignment(16);
        let mut driver = StreamingDriver::new(config).unwrap();
        let input = ramp(36 * 2);
        let mut output = Vec::new();

        driver.run(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_run_counts_flushed_frames() {
        let config = DriverConfig::new(4, 2).with_descriptor("delay=frames=2");
        let mut driver = StreamingDriver::new(config).unwrap();
        let input = ramp(12 * 4);
        let mut output = Vec::new();

        let result = driver.run(&mut input.as_slice(), &mut output).unwrap();
        assert_eq!(result.frames_processed, 4);
        assert_eq!(output, input);
    }

    #[test]
    fn test_run_truncated_frame() {
        let mut driver = StreamingDriver::new(DriverConfig::new(4, 2)).unwrap();
        let input = ramp(12 + 5);
        let mut output = Vec::new();

        match driver.run(&mut input.as_slice(), &mut output) {
            Err(Error::TruncatedFrame {
                frame,
                expected,
                got,
            }) => {
                assert_eq!((frame, expected, got), (1, 12, 5));
            }
            other => panic!("expected TruncatedFrame, got {other:?}"),
        }
        assert_eq!(output.len(), 12);
        assert_eq!(driver.graph().state(), NodeState::Closed);
    }

    #[test]
    fn test_empty_input() {
        let mut driver = StreamingDriver::new(DriverConfig::new(4, 2)).unwrap();
        let mut empty: &[u8] = &[];
        let mut output = Vec::new();
        let result = driver.run(&mut empty, &mut output).unwrap();
        assert_eq!(result, PipelineResult::default());
        assert!(output.is_empty());
    }

    #[test]
    fn test_second_run_fails() {
        let mut driver = StreamingDriver::new(DriverConfig::new(4, 2)).unwrap();
        let mut output = Vec::new();
        driver.run(&mut &b""[..], &mut output).unwrap();
        let mut empty: &[u8] = &[];
        assert!(matches!(
            driver.run(&mut empty, &mut output),
            Err(Error::GraphClosed)
        ));
    }

    #[test]
    fn test_sink_rejects_source_format() {
        let config = DriverConfig::new(4, 2).with_sink_formats(PixelFormat::Yuv444p);
        assert!(matches!(
            StreamingDriver::new(config),
            Err(Error::FormatMismatch { .. })
        ));
    }
}
