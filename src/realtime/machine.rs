//! Connection state machine for the realtime channel.
//!
//! Pure and synchronous: it consumes [`ChannelEvent`]s and returns the
//! [`ChannelAction`] the driver must perform. All I/O and timers live in the
//! driver, which keeps this type trivially testable.

use std::time::Duration;

use serde_json::Value;

use super::message::ServerMessage;

/// Error text exposed to views when the connection fails.
pub const CONNECTION_ERROR: &str = "WebSocket connection error";

/// Connection state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn label(&self) -> &'static str {
        match self {
            ChannelState::Disconnected => "Disconnected",
            ChannelState::Connecting => "Connecting...",
            ChannelState::Connected => "Connected",
        }
    }
}

/// Everything a live connection can report.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Opened,
    Message(String),
    Closed,
    Error(String),
}

/// Side effect requested from the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelAction {
    /// Start a connection attempt.
    Connect,
    /// Fill the reconnect timer slot.
    ScheduleReconnect(Duration),
    /// Empty the reconnect timer slot.
    CancelReconnect,
    /// Close the live connection, if any.
    Close,
}

/// View-facing state of the channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChannelSnapshot {
    pub state: ChannelState,
    /// Uploaded images, most recent first.
    pub images: Vec<Value>,
    pub error: Option<String>,
    /// The server refused this session; the channel will not reconnect.
    pub rejected: bool,
}

impl ChannelSnapshot {
    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }
}

pub struct ChannelMachine {
    snapshot: ChannelSnapshot,
    mounted: bool,
    reconnect_pending: bool,
    reconnect_delay: Duration,
}

impl ChannelMachine {
    /// A mounted, disconnected machine.
    pub fn new(reconnect_delay: Duration) -> Self {
        Self {
            snapshot: ChannelSnapshot::default(),
            mounted: true,
            reconnect_pending: false,
            reconnect_delay,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.snapshot.state
    }

    pub fn snapshot(&self) -> &ChannelSnapshot {
        &self.snapshot
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_pending
    }

    /// `Disconnected -> Connecting`. No-op while an attempt or a connection
    /// is live, after unmount, or once the server rejected the session.
    pub fn open(&mut self) -> Option<ChannelAction> {
        if !self.mounted || self.snapshot.rejected {
            return None;
        }
        if self.snapshot.state != ChannelState::Disconnected {
            log::debug!("Channel open ignored, already {}", self.snapshot.state.label());
            return None;
        }
        self.snapshot.state = ChannelState::Connecting;
        Some(ChannelAction::Connect)
    }

    pub fn handle(&mut self, event: ChannelEvent) -> Option<ChannelAction> {
        match event {
            ChannelEvent::Opened => {
                if !self.mounted {
                    return Some(ChannelAction::Close);
                }
                self.snapshot.state = ChannelState::Connected;
                self.snapshot.error = None;
                None
            }
            ChannelEvent::Message(text) => self.on_message(&text),
            ChannelEvent::Error(reason) => {
                log::error!("WebSocket error: {}", reason);
                self.snapshot.error = Some(CONNECTION_ERROR.to_string());
                self.snapshot.state = ChannelState::Disconnected;
                None
            }
            ChannelEvent::Closed => {
                self.snapshot.state = ChannelState::Disconnected;
                if !self.mounted || self.snapshot.rejected || self.reconnect_pending {
                    return None;
                }
                self.reconnect_pending = true;
                Some(ChannelAction::ScheduleReconnect(self.reconnect_delay))
            }
        }
    }

    fn on_message(&mut self, text: &str) -> Option<ChannelAction> {
        match ServerMessage::parse(text) {
            Ok(ServerMessage::ImageUploaded { image }) => {
                self.snapshot.images.insert(0, image);
                None
            }
            Ok(msg) if msg.is_unauthorized() => {
                log::warn!("Realtime channel rejected the session, not reconnecting");
                self.snapshot.rejected = true;
                Some(ChannelAction::Close)
            }
            Ok(ServerMessage::Error { message }) => {
                log::warn!("Realtime channel error: {}", message.unwrap_or_default());
                None
            }
            Ok(ServerMessage::Unknown) => {
                log::debug!("Ignoring unrecognized channel message");
                None
            }
            Err(e) => {
                log::warn!("Error parsing WebSocket message: {}", e);
                None
            }
        }
    }

    /// The reconnect timer fired.
    pub fn reconnect_due(&mut self) -> Option<ChannelAction> {
        self.reconnect_pending = false;
        self.open()
    }

    /// Teardown. Flags the machine unmounted first, then asks the driver to
    /// drop the timer and close the connection.
    pub fn unmount(&mut self) -> Vec<ChannelAction> {
        self.mounted = false;
        let mut actions = Vec::new();
        if self.reconnect_pending {
            self.reconnect_pending = false;
            actions.push(ChannelAction::CancelReconnect);
        }
        if self.snapshot.state != ChannelState::Disconnected {
            actions.push(ChannelAction::Close);
        }
        self.snapshot.state = ChannelState::Disconnected;
        actions
    }
}
