//! Session driver and consumer API.
//!
//! `ScaleMonitor` walks the transport through the discovery/connect/subscribe
//! handshake, owns the single live session, and pumps incoming frames through
//! the decoder and classifier. New stable readings land on a bounded channel
//! for the consumer; the latest reading (stable or not) is always available
//! for display.
//!
//! All transitions run through `&mut self`, so connect/disconnect calls and
//! event handling are serialized by construction. The only concurrent entry
//! point is the clonable [`SessionCanceller`], which lets an owner abort a
//! pending handshake or a running session from elsewhere.

use crate::classifier::ReadingClassifier;
use crate::connection::{LinkController, LinkInput};
use crate::protocol::{decode, SCALE_SERVICE_UUID};
use crate::transport::{DeviceFilter, LinkEvent, LinkEventChannel, Transport};
use crate::types::{ConnectionStatus, FailReason, Reading, ReadingChannel};
use embassy_futures::select::{select, Either};
use embassy_sync::{blocking_mutex::raw::CriticalSectionRawMutex, signal::Signal};
use embassy_time::{Duration, Timer};
use log::{debug, info, warn};
use std::sync::Arc;

// Notification enablement is flaky on some stacks; retry a few times before
// declaring the attempt dead.
const MAX_SUBSCRIBE_ATTEMPTS: u32 = 3;
const SUBSCRIBE_RETRY_DELAY_MS: u64 = 250;

type CancelSignal = Signal<CriticalSectionRawMutex, ()>;

/// Handle for requesting disconnection from outside the monitor's `&mut`
/// methods, e.g. while `connect()` is still awaiting the device chooser.
#[derive(Clone)]
pub struct SessionCanceller {
    signal: Arc<CancelSignal>,
}

impl SessionCanceller {
    pub fn request_disconnect(&self) {
        self.signal.signal(());
    }
}

/// The currently bound device and notification channel. Exists only between
/// a successful subscribe and teardown; taken exactly once on any exit.
struct Session<T: Transport> {
    device: T::Device,
    channel: Option<T::Channel>,
}

/// Owns the transport and the single live session.
///
/// Dropping the monitor releases the transport's own handles but skips the
/// unsubscribe-then-close sequence; call [`ScaleMonitor::disconnect`] (or
/// cancel a running [`ScaleMonitor::run_session`]) first for a clean
/// teardown.
pub struct ScaleMonitor<T: Transport> {
    transport: T,
    filter: DeviceFilter,
    link: LinkController,
    session: Option<Session<T>>,
    classifier: ReadingClassifier,
    events: Arc<LinkEventChannel>,
    stable_readings: Arc<ReadingChannel>,
    latest: Option<Reading>,
    cancel: Arc<CancelSignal>,
}

impl<T: Transport> ScaleMonitor<T> {
    pub fn new(transport: T) -> Self {
        let filter = DeviceFilter {
            name_prefix: None,
            service_uuid: Some(SCALE_SERVICE_UUID),
        };
        Self::with_filter(transport, filter)
    }

    pub fn with_filter(transport: T, filter: DeviceFilter) -> Self {
        Self {
            transport,
            filter,
            link: LinkController::new(),
            session: None,
            classifier: ReadingClassifier::new(),
            events: Arc::new(LinkEventChannel::new()),
            stable_readings: Arc::new(ReadingChannel::new()),
            latest: None,
            cancel: Arc::new(CancelSignal::new()),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.link.status()
    }

    /// Latest decoded reading of the current session, stable or not.
    pub fn latest_reading(&self) -> Option<&Reading> {
        self.latest.as_ref()
    }

    /// Channel carrying one entry per new stable reading.
    pub fn stable_readings(&self) -> Arc<ReadingChannel> {
        Arc::clone(&self.stable_readings)
    }

    pub fn canceller(&self) -> SessionCanceller {
        SessionCanceller {
            signal: Arc::clone(&self.cancel),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Drive the full handshake. Returns the resulting status; a call while
    /// neither idle nor failed is rejected and leaves the status untouched.
    pub async fn connect(&mut self) -> ConnectionStatus {
        match self.link.status() {
            ConnectionStatus::Idle | ConnectionStatus::Failed(_) => {}
            status => {
                warn!("connect() ignored while {:?}", status);
                return status;
            }
        }
        self.link.handle(LinkInput::ConnectRequested);

        if !self.transport.is_supported() {
            warn!("transport reports no notification support");
            return self.fail(FailReason::Unsupported);
        }

        let device = match self.transport.request_device(&self.filter).await {
            Ok(device) => device,
            Err(e) => {
                warn!("device selection failed: {}", e);
                return self.fail(e.into());
            }
        };
        if self.cancel.try_take().is_some() {
            info!("disconnect requested while selecting a device");
            self.transport.close(&device).await;
            return self.link.handle(LinkInput::DisconnectRequested);
        }
        self.link.handle(LinkInput::DeviceSelected);

        let channel = match self.transport.open_session(&device).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("session open failed: {}", e);
                self.transport.close(&device).await;
                return self.fail(e.into());
            }
        };
        if self.cancel.try_take().is_some() {
            info!("disconnect requested while opening the session");
            self.link.handle(LinkInput::DisconnectRequested);
            self.transport.close(&device).await;
            return self.link.handle(LinkInput::TeardownComplete);
        }
        self.link.handle(LinkInput::LinkOpened);

        // A previous session may have left frames behind; they must not
        // bleed into this one.
        while self.events.try_receive().is_ok() {}

        if let Err(e) = self.subscribe_with_retry(&channel).await {
            warn!("enabling notifications failed: {}", e);
            self.transport.close(&device).await;
            return self.fail(e.into());
        }
        if self.cancel.try_take().is_some() {
            info!("disconnect requested while enabling notifications");
            self.link.handle(LinkInput::DisconnectRequested);
            self.session = Some(Session {
                device,
                channel: Some(channel),
            });
            self.teardown_session().await;
            return self.link.handle(LinkInput::TeardownComplete);
        }

        self.classifier.reset();
        self.latest = None;
        self.session = Some(Session {
            device,
            channel: Some(channel),
        });
        info!("scale link active");
        self.link.handle(LinkInput::Subscribed)
    }

    async fn subscribe_with_retry(
        &mut self,
        channel: &T::Channel,
    ) -> Result<(), crate::transport::TransportError> {
        let mut attempt = 1;
        loop {
            match self
                .transport
                .subscribe(channel, Arc::clone(&self.events))
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt < MAX_SUBSCRIBE_ATTEMPTS => {
                    warn!(
                        "notification enable failed on attempt {}/{}: {}",
                        attempt, MAX_SUBSCRIBE_ATTEMPTS, e
                    );
                    Timer::after(Duration::from_millis(SUBSCRIBE_RETRY_DELAY_MS)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Process link events until the session ends, by either a disconnect
    /// request (via the [`SessionCanceller`]) or the device dropping the
    /// link. Frames and the disconnect event are handled in arrival order.
    pub async fn run_session(&mut self) {
        if self.link.status() != ConnectionStatus::Active {
            warn!("run_session() called without an active link");
            return;
        }
        let events = Arc::clone(&self.events);
        let cancel = Arc::clone(&self.cancel);
        loop {
            match select(events.receive(), cancel.wait()).await {
                Either::First(LinkEvent::Frame(frame)) => self.handle_frame(&frame),
                Either::First(LinkEvent::Disconnected) => {
                    warn!("scale closed the link");
                    self.link.handle(LinkInput::LinkLost);
                    self.teardown_session().await;
                    return;
                }
                Either::Second(()) => {
                    info!("disconnect requested");
                    self.link.handle(LinkInput::DisconnectRequested);
                    self.teardown_session().await;
                    self.link.handle(LinkInput::TeardownComplete);
                    return;
                }
            }
        }
    }

    /// Explicit disconnect. Safe to call repeatedly; teardown runs at most
    /// once per session.
    pub async fn disconnect(&mut self) -> ConnectionStatus {
        match self.link.status() {
            ConnectionStatus::Active => {
                self.link.handle(LinkInput::DisconnectRequested);
                self.teardown_session().await;
                self.link.handle(LinkInput::TeardownComplete)
            }
            ConnectionStatus::Idle => {
                debug!("disconnect() with no active session");
                ConnectionStatus::Idle
            }
            status => {
                debug!("disconnect() ignored while {:?}", status);
                status
            }
        }
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        let Some(reading) = decode(frame) else {
            // Per-frame decode trouble never disturbs the subscription.
            debug!("frame dropped: {:02X?}", frame);
            return;
        };
        self.latest = Some(reading.clone());
        if let Some(stable) = self.classifier.observe(&reading) {
            info!(
                "new stable reading: {:.1}{}",
                stable.weight,
                stable.unit.suffix()
            );
            if self.stable_readings.try_send(stable).is_err() {
                warn!("stable reading dropped - consumer channel full");
            }
        }
    }

    /// Unsubscribe-then-close, exactly once per session. Unsubscribe errors
    /// are logged and swallowed: the session is being discarded regardless.
    async fn teardown_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            debug!("teardown with no live session");
            return;
        };
        if let Some(channel) = session.channel.take() {
            if let Err(e) = self.transport.unsubscribe(&channel).await {
                warn!("unsubscribe failed during teardown: {}", e);
            }
        }
        self.transport.close(&session.device).await;
        info!("scale session torn down");
    }

    /// Handshake-step failure. A disconnect requested while the step was
    /// pending wins over the failure and lands in idle, and the cancel
    /// signal never outlives the attempt that saw it.
    fn fail(&mut self, reason: FailReason) -> ConnectionStatus {
        if self.cancel.try_take().is_some() {
            info!("disconnect requested while the handshake was failing");
            let status = self.link.handle(LinkInput::DisconnectRequested);
            if status == ConnectionStatus::Disconnecting {
                return self.link.handle(LinkInput::TeardownComplete);
            }
            return status;
        }
        self.link.handle(LinkInput::HandshakeFailed(reason))
    }
}

impl<T: Transport> Drop for ScaleMonitor<T> {
    fn drop(&mut self) {
        // No async drop in Rust; the owned transport releases its handles,
        // but an explicit disconnect() is the clean path.
        if self.session.is_some() {
            warn!("scale monitor dropped with a live session");
        }
    }
}
