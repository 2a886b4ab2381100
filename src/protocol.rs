//! Notification frame decoding for the scale's weight characteristic.
//!
//! There is no vendor documentation for this format. What is known from
//! captures: the scale notifies 8-byte frames while empty (no payload) and
//! 12-byte frames carrying a weight. Extraction is a short pipeline of pure
//! candidate layouts tried in confidence order; the first value that passes
//! the sanity filter wins, anything else drops the frame.

use crate::types::{Reading, UnitKind};
use embassy_time::Instant;
use log::{debug, warn};
use uuid::Uuid;

pub const SCALE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000FFE0_0000_1000_8000_00805F9B34FB);
pub const WEIGHT_CHAR_UUID: Uuid = Uuid::from_u128(0x0000FFE1_0000_1000_8000_00805F9B34FB);

/// Empty-scale heartbeat; carries no weight payload.
pub const HEARTBEAT_FRAME_LEN: usize = 8;
/// The only frame length observed to carry a weight.
pub const WEIGHT_FRAME_LEN: usize = 12;

// Fixed layout (verified against a related device family).
const FIXED_SIGN_OFFSET: usize = 5;
const FIXED_MAGNITUDE_OFFSET: usize = 6;
const FIXED_UNIT_OFFSET: usize = 9;
const MAX_FIXED_MAGNITUDE: u16 = 50_000;

// Sliding-window scan fallback.
const MAX_SCAN_VALUE: u16 = 10_000;
const MAX_SCAN_WEIGHT: f64 = 5_000.0;
const MAX_UNIT_CODE: u8 = 6;

/// Weight candidate produced by one extractor, before timestamping.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DecodedWeight {
    weight: f64,
    unit: UnitKind,
    is_stable: bool,
}

/// Unit-code table recovered from captures. Code 0 is whole grams; code 1 is
/// grams sent in tenths; every other mapped code is also sent in tenths.
/// Unknown codes fall back to whole grams.
fn unit_from_code(code: u8) -> (UnitKind, bool) {
    match code {
        0 => (UnitKind::Gram, false),
        1 => (UnitKind::Gram, true),
        2 => (UnitKind::Milliliter, true),
        3 => (UnitKind::FluidOunce, true),
        4 => (UnitKind::Ounce, true),
        5 => (UnitKind::Pound, true),
        6 => (UnitKind::Kilogram, true),
        _ => (UnitKind::Gram, false),
    }
}

/// Decode one notification buffer into a reading.
///
/// Never fails loudly: malformed or unrecognized input is logged and yields
/// `None`, and decoding the same bytes twice yields the same value.
pub fn decode(frame: &[u8]) -> Option<Reading> {
    match frame.len() {
        HEARTBEAT_FRAME_LEN => {
            debug!("heartbeat frame, no weight payload: {:02X?}", frame);
            None
        }
        WEIGHT_FRAME_LEN => {
            let extractors: [fn(&[u8]) -> Option<DecodedWeight>; 2] = [extract_fixed, extract_scan];
            for extract in extractors {
                if let Some(candidate) = extract(frame) {
                    debug!(
                        "decoded {:.1}{} (stable: {}) from {:02X?}",
                        candidate.weight,
                        candidate.unit.suffix(),
                        candidate.is_stable,
                        frame
                    );
                    return Some(Reading {
                        weight: candidate.weight,
                        unit: candidate.unit,
                        is_stable: candidate.is_stable,
                        observed_at: Instant::now(),
                    });
                }
            }
            warn!("no known layout matched weight frame: {:02X?}", frame);
            None
        }
        len => {
            warn!("unexpected frame length {}: {:02X?}", len, frame);
            None
        }
    }
}

/// Fixed layout: sign byte, little-endian magnitude, unit code near the tail.
/// A missing or unknown unit byte means whole grams.
fn extract_fixed(frame: &[u8]) -> Option<DecodedWeight> {
    let sign = *frame.get(FIXED_SIGN_OFFSET)?;
    let magnitude = u16::from_le_bytes([
        *frame.get(FIXED_MAGNITUDE_OFFSET)?,
        *frame.get(FIXED_MAGNITUDE_OFFSET + 1)?,
    ]);
    if magnitude == 0 || magnitude >= MAX_FIXED_MAGNITUDE {
        return None;
    }
    let code = frame.get(FIXED_UNIT_OFFSET).copied().unwrap_or(0);
    let (unit, tenths) = unit_from_code(code);
    let mut weight = f64::from(magnitude);
    if tenths {
        weight /= 10.0;
    }
    if sign != 0 {
        weight = -weight;
    }
    // This layout has no stability flag; captures suggest the scale only
    // sends it once settled. Assumed stable, not yet confirmed on hardware.
    Some(DecodedWeight {
        weight,
        unit,
        is_stable: true,
    })
}

/// Fallback scan: look at every offset for a big-endian value followed by a
/// plausible unit code, sign in the byte before, stability flag two bytes
/// past the unit code. Frames that miss the fixed layout still tend to carry
/// the weight somewhere in this shape.
fn extract_scan(frame: &[u8]) -> Option<DecodedWeight> {
    for offset in 0..frame.len().saturating_sub(2) {
        let value = u16::from_be_bytes([frame[offset], frame[offset + 1]]);
        if value == 0 || value >= MAX_SCAN_VALUE {
            continue;
        }
        let code = frame[offset + 2];
        if code > MAX_UNIT_CODE {
            continue;
        }
        let (unit, tenths) = unit_from_code(code);
        let mut weight = f64::from(value);
        if tenths {
            weight /= 10.0;
        }
        if weight >= MAX_SCAN_WEIGHT {
            continue;
        }
        let negative = offset
            .checked_sub(1)
            .map(|prev| frame[prev] != 0)
            .unwrap_or(false);
        if negative {
            weight = -weight;
        }
        // Absent or out-of-range flag defaults to stable, mirroring the
        // observed firmware behavior; only an explicit 0 marks it unstable.
        let is_stable = !matches!(frame.get(offset + 4).copied(), Some(0));
        return Some(DecodedWeight {
            weight,
            unit,
            is_stable,
        });
    }
    None
}
