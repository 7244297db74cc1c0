//! Core data types for the positioning system

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Received signal strength, in dBm for WiFi captures.
pub type SignalStrength = i32;

/// Identifier of a wireless access point (a MAC address in practice)
///
/// Colon-separated MAC addresses are stored in upper case, the form batch
/// payloads decode to, so ids from any source compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ApId(String);

impl ApId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match parse_mac(&id) {
            Some(bytes) => Self::from_mac_bytes(bytes),
            None => Self(id),
        }
    }

    /// Render six raw bytes as `XX:XX:XX:XX:XX:XX`.
    pub fn from_mac_bytes(bytes: [u8; 6]) -> Self {
        let [a, b, c, d, e, f] = bytes;
        Self(format!("{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{f:02X}"))
    }

    /// Parse the identifier back into MAC bytes, if it is a colon-separated MAC.
    pub fn mac_bytes(&self) -> Option<[u8; 6]> {
        parse_mac(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ApId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ApId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<ApId> for String {
    fn from(id: ApId) -> Self {
        id.0
    }
}

fn parse_mac(text: &str) -> Option<[u8; 6]> {
    let mut bytes = [0u8; 6];
    let mut parts = text.split(':');
    for byte in bytes.iter_mut() {
        let part = parts.next()?;
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        *byte = u8::from_str_radix(part, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(bytes)
}

/// Access point to signal strength map for one observation
pub type SignalMap = HashMap<ApId, SignalStrength>;

/// Indoor position: geodetic latitude/longitude plus building floor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lon: f64,
    pub floor: i32,
}

impl Position {
    pub fn new(lat: f64, lon: f64, floor: i32) -> Self {
        Self { lat, lon, floor }
    }

    /// Planar distance in degrees, ignoring floor.
    pub fn planar_distance(&self, other: &Position) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        (dlat * dlat + dlon * dlon).sqrt()
    }
}

/// Reference observation recorded at a known position
#[derive(Debug, Clone, PartialEq)]
pub struct Fingerprint {
    position: Position,
    signal_map: SignalMap,
}

impl Fingerprint {
    /// Returns `None` for an empty signal map; such a scene can never match.
    pub fn new(position: Position, signal_map: SignalMap) -> Option<Self> {
        if signal_map.is_empty() {
            return None;
        }
        Some(Self { position, signal_map })
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn signal_map(&self) -> &SignalMap {
        &self.signal_map
    }
}

/// Output of one WKNN estimation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    pub position: Position,
    pub accuracy_m: f64,
    /// Signal distances of the selected neighbors, nearest first
    pub neighbor_distances: Vec<f64>,
}

impl PositionEstimate {
    /// Neighbor distances rounded to one decimal, for display.
    pub fn rounded_neighbor_distances(&self) -> Vec<f64> {
        self.neighbor_distances
            .iter()
            .map(|d| (d * 10.0).round() / 10.0)
            .collect()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
