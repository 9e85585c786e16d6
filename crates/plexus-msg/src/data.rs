//! Data messages.

use chrono::{DateTime, Utc};
use plexus_types::Loc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An opaque data message.
///
/// Data messages carry a byte buffer plus the usual property map. They
/// have no result; delivery failures are logged, not reported back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Data {
    name: String,
    src: Loc,
    dests: Vec<Loc>,
    properties: Map<String, Value>,
    #[serde(with = "serde_bytes_vec")]
    buf: Vec<u8>,
    timestamp: DateTime<Utc>,
}

impl Data {
    /// Creates a data message with an empty buffer.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            src: Loc::empty(),
            dests: Vec::new(),
            properties: Map::new(),
            buf: Vec::new(),
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

    /// The byte buffer.
    #[must_use]
    pub fn buf(&self) -> &[u8] {
        &self.buf
    }

    /// Replaces the byte buffer.
    pub fn set_buf(&mut self, buf: Vec<u8>) {
        self.buf = buf;
    }

    /// Builder form of [`set_buf`](Self::set_buf).
    #[must_use]
    pub fn with_buf(mut self, buf: Vec<u8>) -> Self {
        self.set_buf(buf);
        self
    }

    /// The property map.
    #[must_use]
    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    /// Looks a property up by key.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Sets a property.
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }

    /// Builder form of [`set_property`](Self::set_property).
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set_property(key, value);
        self
    }

    /// Creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

// serde_json has no native bytes representation; keep buffers as plain
// arrays so Data stays self-describing in JSON-based tooling.
mod serde_bytes_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(buf: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.collect_seq(buf)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        Vec::<u8>::deserialize(de)
    }
}
