use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use embassy_time::Instant;
use serde::{Deserialize, Serialize};

/// Largest notification buffer the scale is known to send. Weight frames are
/// 12 bytes, heartbeats 8; a little headroom keeps oversized junk loggable.
pub const MAX_FRAME_BYTES: usize = 16;

/// One raw notification buffer as delivered by the transport.
pub type RawFrame = heapless::Vec<u8, MAX_FRAME_BYTES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    Gram,
    Ounce,
    Pound,
    Kilogram,
    Milliliter,
    FluidOunce,
}

impl UnitKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            UnitKind::Gram => "g",
            UnitKind::Ounce => "oz",
            UnitKind::Pound => "lb",
            UnitKind::Kilogram => "kg",
            UnitKind::Milliliter => "ml",
            UnitKind::FluidOunce => "fl oz",
        }
    }
}

/// A single decoded weight measurement. Produced only by the frame decoder
/// and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Sign-carrying magnitude in the unit below; tenth resolution at most.
    pub weight: f64,
    pub unit: UnitKind,
    /// Whether the scale flagged the value as settled.
    pub is_stable: bool,
    pub observed_at: Instant,
}

/// Why a connection attempt (or the transport itself) gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailReason {
    Unsupported,
    UserCancelled,
    ConnectFailed,
    ServiceNotFound,
    CharacteristicNotFound,
    SubscribeFailed,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FailReason::Unsupported => write!(f, "transport does not support BLE notifications"),
            FailReason::UserCancelled => write!(f, "device selection was cancelled"),
            FailReason::ConnectFailed => write!(f, "could not connect to the scale"),
            FailReason::ServiceNotFound => write!(f, "scale service not found"),
            FailReason::CharacteristicNotFound => write!(f, "weight characteristic not found"),
            FailReason::SubscribeFailed => write!(f, "could not enable weight notifications"),
        }
    }
}

/// Externally visible lifecycle state of the scale link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionStatus {
    Idle,
    Discovering,
    Connecting,
    Subscribing,
    Active,
    Disconnecting,
    Failed(FailReason),
}

/// Stable readings handed to the consumer, one entry per *new* stable value.
pub type ReadingChannel = Channel<CriticalSectionRawMutex, Reading, 8>;
