//! Radio-stack boundary.
//!
//! The core never talks to a BLE stack directly; it drives anything that can
//! select a device, open the weight notification channel, and deliver frames.
//! Frames and the device-initiated disconnect share one bounded channel so
//! the monitor processes them strictly in arrival order.

use crate::types::{FailReason, RawFrame};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, channel::Channel};
use std::sync::Arc;
use uuid::Uuid;

/// Criteria for the transport's device chooser.
#[derive(Debug, Clone, Default)]
pub struct DeviceFilter {
    pub name_prefix: Option<String>,
    pub service_uuid: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    Unsupported,
    UserCancelled,
    ConnectFailed,
    ServiceNotFound,
    CharacteristicNotFound,
    SubscribeFailed,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            TransportError::Unsupported => write!(f, "BLE notifications not supported"),
            TransportError::UserCancelled => write!(f, "device selection cancelled"),
            TransportError::ConnectFailed => write!(f, "connection failed"),
            TransportError::ServiceNotFound => write!(f, "service not found"),
            TransportError::CharacteristicNotFound => write!(f, "characteristic not found"),
            TransportError::SubscribeFailed => write!(f, "subscription failed"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for FailReason {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Unsupported => FailReason::Unsupported,
            TransportError::UserCancelled => FailReason::UserCancelled,
            TransportError::ConnectFailed => FailReason::ConnectFailed,
            TransportError::ServiceNotFound => FailReason::ServiceNotFound,
            TransportError::CharacteristicNotFound => FailReason::CharacteristicNotFound,
            TransportError::SubscribeFailed => FailReason::SubscribeFailed,
        }
    }
}

/// One asynchronous delivery from a live subscription.
#[derive(Debug, Clone)]
pub enum LinkEvent {
    Frame(RawFrame),
    Disconnected,
}

pub type LinkEventChannel = Channel<CriticalSectionRawMutex, LinkEvent, 16>;

/// Capabilities the core needs from the host radio stack.
///
/// All handshake calls may suspend indefinitely (`request_device` typically
/// waits on a user choosing from a picker). A subscribed transport pushes
/// `LinkEvent`s into the channel it was handed until `unsubscribe` or the
/// device drops the link, in which case it must push `Disconnected` last.
pub trait Transport {
    type Device;
    type Channel;

    fn is_supported(&self) -> bool;

    async fn request_device(
        &mut self,
        filter: &DeviceFilter,
    ) -> Result<Self::Device, TransportError>;

    /// Resolve the transport link plus the weight service/characteristic.
    async fn open_session(&mut self, device: &Self::Device)
        -> Result<Self::Channel, TransportError>;

    async fn subscribe(
        &mut self,
        channel: &Self::Channel,
        events: Arc<LinkEventChannel>,
    ) -> Result<(), TransportError>;

    /// Best-effort; callers log and swallow errors.
    async fn unsubscribe(&mut self, channel: &Self::Channel) -> Result<(), TransportError>;

    async fn close(&mut self, device: &Self::Device);
}
