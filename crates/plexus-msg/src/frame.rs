//! Audio and video frame messages.
//!
//! Frames are data messages with format metadata attached. Like
//! [`Data`](crate::Data) they have no result; a dropped frame is logged
//! and forgotten, which is the right behavior for media paths.

use chrono::{DateTime, Utc};
use plexus_types::Loc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Pixel layout of a video frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Rgb24,
    Rgba,
    Bgr24,
    Bgra,
    I420,
    Nv12,
    Nv21,
}

/// An audio frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioFrame {
    name: String,
    src: Loc,
    dests: Vec<Loc>,
    properties: Map<String, Value>,
    data: Vec<u8>,
    sample_rate: u32,
    channels: u32,
    samples_per_channel: u32,
    /// Capture timestamp of the frame itself, distinct from the
    /// envelope timestamp.
    frame_timestamp_ms: i64,
    timestamp: DateTime<Utc>,
}

impl AudioFrame {
    /// Creates an empty audio frame.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: Loc::empty(),
            dests: Vec::new(),
            properties: Map::new(),
            data: Vec::new(),
            sample_rate: 0,
            channels: 0,
            samples_per_channel: 0,
            frame_timestamp_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// The message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source location.
    #[must_use]
    pub fn src(&self) -> &Loc {
        &self.src
    }

    /// Overwrites the source location.
    pub fn set_src(&mut self, src: Loc) {
        self.src = src;
    }

    /// Destination locations.
    #[must_use]
    pub fn dests(&self) -> &[Loc] {
        &self.dests
    }

    /// Replaces the destinations with a single location.
    pub fn set_dest(&mut self, dest: Loc) {
        self.dests = vec![dest];
    }

    /// Builder form of [`set_dest`](Self::set_dest).
    #[must_use]
    pub fn with_dest(mut self, dest: Loc) -> Self {
        self.set_dest(dest);
        self
    }

    /// Sample buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the sample buffer and format metadata.
    pub fn set_samples(
        &mut self,
        data: Vec<u8>,
        sample_rate: u32,
        channels: u32,
        samples_per_channel: u32,
    ) {
        self.data = data;
        self.sample_rate = sample_rate;
        self.channels = channels;
        self.samples_per_channel = samples_per_channel;
    }

    /// Samples per second.
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    #[must_use]
    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Samples per channel in this frame.
    #[must_use]
    pub fn samples_per_channel(&self) -> u32 {
        self.samples_per_channel
    }

    /// Capture timestamp in milliseconds.
    #[must_use]
    pub fn frame_timestamp_ms(&self) -> i64 {
        self.frame_timestamp_ms
    }

    /// Sets the capture timestamp.
    pub fn set_frame_timestamp_ms(&mut self, ts: i64) {
        self.frame_timestamp_ms = ts;
    }

    /// The property map.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Envelope timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// A video frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoFrame {
    name: String,
    src: Loc,
    dests: Vec<Loc>,
    properties: Map<String, Value>,
    data: Vec<u8>,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
    frame_timestamp_ms: i64,
    timestamp: DateTime<Utc>,
}

impl VideoFrame {
    /// Creates an empty RGB24 video frame.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: Loc::empty(),
            dests: Vec::new(),
            properties: Map::new(),
            data: Vec::new(),
            width: 0,
            height: 0,
            pixel_format: PixelFormat::Rgb24,
            frame_timestamp_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// The message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source location.
    #[must_use]
    pub fn src(&self) -> &Loc {
        &self.src
    }

    /// Overwrites the source location.
    pub fn set_src(&mut self, src: Loc) {
        self.src = src;
    }

    /// Destination locations.
    #[must_use]
    pub fn dests(&self) -> &[Loc] {
        &self.dests
    }

    /// Replaces the destinations with a single location.
    pub fn set_dest(&mut self, dest: Loc) {
        self.dests = vec![dest];
    }

    /// Builder form of [`set_dest`](Self::set_dest).
    #[must_use]
    pub fn with_dest(mut self, dest: Loc) -> Self {
        self.set_dest(dest);
        self
    }

    /// Pixel buffer.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the pixel buffer and format metadata.
    pub fn set_pixels(&mut self, data: Vec<u8>, width: u32, height: u32, format: PixelFormat) {
        self.data = data;
        self.width = width;
        self.height = height;
        self.pixel_format = format;
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Pixel layout.
    #[must_use]
    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Capture timestamp in milliseconds.
    #[must_use]
    pub fn frame_timestamp_ms(&self) -> i64 {
        self.frame_timestamp_ms
    }

    /// Sets the capture timestamp.
    pub fn set_frame_timestamp_ms(&mut self, ts: i64) {
        self.frame_timestamp_ms = ts;
    }

    /// The property map.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Envelope timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}
