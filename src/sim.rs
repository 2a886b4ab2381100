//! In-memory transport for demos and tests.
//!
//! Replays a scripted notification session: every handshake step can be told
//! to fail, and a canned list of frames (optionally followed by a
//! device-initiated disconnect) is delivered on subscribe. Call counters make
//! teardown behavior observable.

use crate::transport::{DeviceFilter, LinkEvent, LinkEventChannel, Transport, TransportError};
use crate::types::RawFrame;
use log::{debug, warn};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SimDevice {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct SimChannel;

#[derive(Debug, Default)]
pub struct SimulatedTransport {
    supported: bool,
    request_failure: Option<TransportError>,
    open_failure: Option<TransportError>,
    subscribe_failure: Option<TransportError>,
    unsubscribe_failure: Option<TransportError>,
    frames: Vec<RawFrame>,
    end_with_disconnect: bool,
    pub subscribe_calls: usize,
    pub unsubscribe_calls: usize,
    pub close_calls: usize,
}

impl SimulatedTransport {
    pub fn new() -> Self {
        Self {
            supported: true,
            ..Self::default()
        }
    }

    /// A host without notification support; `connect` fails immediately.
    pub fn unsupported() -> Self {
        Self::default()
    }

    pub fn fail_request(&mut self, error: TransportError) {
        self.request_failure = Some(error);
    }

    pub fn fail_open(&mut self, error: TransportError) {
        self.open_failure = Some(error);
    }

    pub fn fail_subscribe(&mut self, error: TransportError) {
        self.subscribe_failure = Some(error);
    }

    pub fn fail_unsubscribe(&mut self, error: TransportError) {
        self.unsubscribe_failure = Some(error);
    }

    pub fn clear_failures(&mut self) {
        self.request_failure = None;
        self.open_failure = None;
        self.subscribe_failure = None;
        self.unsubscribe_failure = None;
    }

    /// Queue one raw notification buffer for delivery on subscribe.
    pub fn push_frame(&mut self, bytes: &[u8]) {
        match RawFrame::from_slice(bytes) {
            Ok(frame) => self.frames.push(frame),
            Err(_) => warn!("simulated frame longer than the buffer cap, ignored"),
        }
    }

    pub fn clear_frames(&mut self) {
        self.frames.clear();
    }

    /// Deliver a device-initiated disconnect after the queued frames.
    pub fn disconnect_at_end(&mut self, yes: bool) {
        self.end_with_disconnect = yes;
    }
}

impl Transport for SimulatedTransport {
    type Device = SimDevice;
    type Channel = SimChannel;

    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn request_device(
        &mut self,
        filter: &DeviceFilter,
    ) -> Result<SimDevice, TransportError> {
        if let Some(error) = self.request_failure {
            return Err(error);
        }
        debug!("simulated chooser resolving for {:?}", filter);
        Ok(SimDevice {
            name: "SIM-SCALE".to_string(),
        })
    }

    async fn open_session(&mut self, device: &SimDevice) -> Result<SimChannel, TransportError> {
        if let Some(error) = self.open_failure {
            return Err(error);
        }
        debug!("simulated session open for {}", device.name);
        Ok(SimChannel)
    }

    async fn subscribe(
        &mut self,
        _channel: &SimChannel,
        events: Arc<LinkEventChannel>,
    ) -> Result<(), TransportError> {
        self.subscribe_calls += 1;
        if let Some(error) = self.subscribe_failure {
            return Err(error);
        }
        for frame in &self.frames {
            if events.try_send(LinkEvent::Frame(frame.clone())).is_err() {
                warn!("simulated frame dropped - event channel full");
            }
        }
        if self.end_with_disconnect && events.try_send(LinkEvent::Disconnected).is_err() {
            warn!("simulated disconnect dropped - event channel full");
        }
        Ok(())
    }

    async fn unsubscribe(&mut self, _channel: &SimChannel) -> Result<(), TransportError> {
        self.unsubscribe_calls += 1;
        match self.unsubscribe_failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn close(&mut self, device: &SimDevice) {
        self.close_calls += 1;
        debug!("simulated device {} closed", device.name);
    }
}

/// Build a 12-byte frame in the fixed layout: sign at byte 5, little-endian
/// magnitude at 6..8, unit code at 9.
pub fn fixed_weight_frame(sign: u8, magnitude: u16, unit_code: u8) -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[5] = sign;
    frame[6..8].copy_from_slice(&magnitude.to_le_bytes());
    frame[9] = unit_code;
    frame
}

/// Build a 12-byte frame only the scan fallback recognizes: big-endian value
/// at bytes 1..3 with the unit code and stability flag behind it. Values
/// whose low byte is itself a plausible unit code would lock the scan onto
/// an earlier offset, so pick magnitudes with a low byte above 6.
pub fn scan_weight_frame(negative: bool, value: u16, unit_code: u8, stable: bool) -> [u8; 12] {
    let mut frame = [0u8; 12];
    frame[0] = negative as u8;
    frame[1..3].copy_from_slice(&value.to_be_bytes());
    frame[3] = unit_code;
    frame[5] = stable as u8;
    frame
}
