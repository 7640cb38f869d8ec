//! Presentation-derived values computed from reconciled state.
//!
//! Everything here is pure: the same reconciled input always yields the same
//! output, so callers may recompute freely after any reconciliation pass.

use crate::model::{AccessMask, Channel, HealthState, SessionDetail, StateColor, StateDetail};
use std::collections::HashSet;

const UNIT_SUFFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];
const UNIT_DIVISOR: f64 = 1024.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessBits {
    pub read: bool,
    pub write: bool,
}

impl AccessBits {
    /// Short `rw` style label, `-` for an empty mask.
    pub fn label(&self) -> &'static str {
        match (self.read, self.write) {
            (true, true) => "rw",
            (true, false) => "r",
            (false, true) => "w",
            (false, false) => "-",
        }
    }
}

pub fn decode_bits(bits: u32) -> AccessBits {
    AccessBits {
        read: bits & 1 != 0,
        write: bits & 2 != 0,
    }
}

impl AccessMask {
    pub fn read(self) -> bool {
        decode_bits(self.0).read
    }

    pub fn write(self) -> bool {
        decode_bits(self.0).write
    }

    pub fn decode(self) -> AccessBits {
        decode_bits(self.0)
    }
}

impl StateDetail {
    pub fn access_bits(&self) -> AccessBits {
        self.access.decode()
    }

    pub fn deny_bits(&self) -> AccessBits {
        self.deny.decode()
    }
}

pub fn state_color(state: &HealthState) -> StateColor {
    match state {
        HealthState::Healthy => StateColor::Green,
        HealthState::Restoring => StateColor::Yellow,
        HealthState::Missing => StateColor::Orange,
        HealthState::Dead | HealthState::Other(_) => StateColor::Red,
    }
}

/// Deduplicated `host:port` strings in first-seen order.
pub fn format_addresses(channels: &[Channel]) -> Vec<String> {
    let mut seen = HashSet::new();
    channels
        .iter()
        .map(Channel::address)
        .filter(|address| seen.insert(address.clone()))
        .collect()
}

/// Flattens the channels of every known session into one deduplicated
/// address list.
pub fn aggregate_addresses<'a>(sessions: impl IntoIterator<Item = &'a SessionDetail>) -> Vec<String> {
    let channels: Vec<Channel> = sessions
        .into_iter()
        .flat_map(|session| session.channels.iter().cloned())
        .collect();
    format_addresses(&channels)
}

/// Renders a byte or file count with a base-1024 suffix.
///
/// Values below 1024 are printed verbatim. Larger values are scaled while
/// they exceed 1024 and the suffix ladder has room, then printed with one
/// decimal below 10 and rounded otherwise (`2048` → `2.0K`, `10240` → `10K`).
pub fn humanize_bytes(value: u64) -> String {
    if value < 1024 {
        return value.to_string();
    }

    let mut scaled = value as f64 / UNIT_DIVISOR;
    let mut unit = 0;
    while scaled > UNIT_DIVISOR && unit + 1 < UNIT_SUFFIXES.len() {
        scaled /= UNIT_DIVISOR;
        unit += 1;
    }

    let suffix = UNIT_SUFFIXES[unit];
    if scaled < 10.0 {
        format!("{:.1}{suffix}", (scaled * 10.0).round() / 10.0)
    } else {
        format!("{}{suffix}", scaled.round() as u64)
    }
}

/// Like [`humanize_bytes`] but renders an absent value as `-`.
pub fn humanize_optional(value: Option<u64>) -> String {
    value.map(humanize_bytes).unwrap_or_else(|| "-".to_string())
}
