//! Self-healing realtime push channel.
//!
//! [`mount`] spawns a driver task that owns at most one live connection and
//! one reconnect timer. It feeds connection events into [`ChannelMachine`] and
//! publishes a [`ChannelSnapshot`] after every step. The channel reconnects
//! after a fixed delay while mounted; [`ChannelHandle::unmount`] (or dropping
//! the handle) stops it for good.

pub mod machine;
pub mod message;
pub mod socket;

pub use machine::{ChannelAction, ChannelEvent, ChannelMachine, ChannelSnapshot, ChannelState};
pub use message::ServerMessage;
pub use socket::WebSocketConnector;

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Sleep;

use crate::api::token::TokenStore;
use crate::api::urls::ApiUrls;

/// Default delay between a close and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("WebSocket connect failed: {0}")]
    Connect(String),

    #[error("Failed to parse channel message: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Opens push connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError>;
}

/// A live push connection.
///
/// `next_event` yields `Message`, `Error` and `Closed` events; `None` means
/// the connection is gone and is treated as `Closed`.
#[async_trait]
pub trait Connection: Send {
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self);
}

/// Channel settings.
#[derive(Clone)]
pub struct ChannelConfig {
    pub urls: ApiUrls,
    /// Read on every attempt so a fresh login is picked up on reconnect.
    pub tokens: Arc<dyn TokenStore>,
    pub reconnect_delay: Duration,
}

impl ChannelConfig {
    pub fn new(urls: ApiUrls, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            urls,
            tokens,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

enum Command {
    Unmount,
}

/// Owner-side handle of a mounted channel.
pub struct ChannelHandle {
    mounted: Arc<AtomicBool>,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<ChannelSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Current view state.
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified after every state change.
    pub fn subscribe(&self) -> watch::Receiver<ChannelSnapshot> {
        self.snapshot.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    /// Stop the channel. The unmounted flag is set before this returns, so
    /// a close observed afterwards never schedules a reconnect.
    pub fn unmount(&self) {
        if self.mounted.swap(false, Ordering::SeqCst) {
            let _ = self.commands.send(Command::Unmount);
        }
    }

    /// Unmount and wait for the driver to release the connection.
    pub async fn closed(mut self) {
        self.unmount();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::error!("Realtime driver task failed: {}", e);
            }
        }
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Mount a channel and start connecting. Must be called inside a Tokio runtime.
pub fn mount(config: ChannelConfig, connector: Arc<dyn Connector>) -> ChannelHandle {
    let mounted = Arc::new(AtomicBool::new(true));
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let machine = ChannelMachine::new(config.reconnect_delay);
    let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot().clone());

    let driver = Driver {
        config,
        connector,
        machine,
        mounted: mounted.clone(),
        commands: commands_rx,
        snapshot: snapshot_tx,
        connecting: None,
        connection: None,
        timer: None,
    };
    let task = tokio::spawn(driver.run());

    ChannelHandle {
        mounted,
        commands: commands_tx,
        snapshot: snapshot_rx,
        task: Some(task),
    }
}

type ConnectFuture =
    Pin<Box<dyn Future<Output = Result<Box<dyn Connection>, ChannelError>> + Send>>;

enum Step {
    Command,
    Connected(Result<Box<dyn Connection>, ChannelError>),
    Event(Option<ChannelEvent>),
    ReconnectDue,
}

struct Driver {
    config: ChannelConfig,
    connector: Arc<dyn Connector>,
    machine: ChannelMachine,
    mounted: Arc<AtomicBool>,
    commands: mpsc::UnboundedReceiver<Command>,
    snapshot: watch::Sender<ChannelSnapshot>,
    /// In-flight connection attempt.
    connecting: Option<ConnectFuture>,
    /// Live connection.
    connection: Option<Box<dyn Connection>>,
    /// Single reconnect timer slot.
    timer: Option<Pin<Box<Sleep>>>,
}

impl Driver {
    async fn run(mut self) {
        if let Some(action) = self.machine.open() {
            self.apply(action).await;
        }
        self.publish();

        loop {
            let step = tokio::select! {
                biased;
                _ = self.commands.recv() => Step::Command,
                result = poll_connecting(&mut self.connecting) => Step::Connected(result),
                event = poll_connection(&mut self.connection) => Step::Event(event),
                _ = poll_timer(&mut self.timer) => Step::ReconnectDue,
            };

            // The owner may have unmounted while this step was in flight.
            if !self.mounted.load(Ordering::SeqCst) {
                if let Step::Connected(Ok(conn)) = step {
                    self.connection = Some(conn);
                }
                self.connecting = None;
                self.teardown().await;
                break;
            }

            match step {
                Step::Command => {
                    // Only `Unmount` exists, and a closed queue means the handle is gone.
                    self.teardown().await;
                    break;
                }
                Step::Connected(Ok(conn)) => {
                    self.connecting = None;
                    self.connection = Some(conn);
                    log::info!("Realtime channel connected");
                    if let Some(action) = self.machine.handle(ChannelEvent::Opened) {
                        self.apply(action).await;
                    }
                }
                Step::Connected(Err(e)) => {
                    self.connecting = None;
                    self.machine.handle(ChannelEvent::Error(e.to_string()));
                    if let Some(action) = self.machine.handle(ChannelEvent::Closed) {
                        self.apply(action).await;
                    }
                }
                Step::Event(Some(ChannelEvent::Closed)) | Step::Event(None) => {
                    self.connection = None;
                    log::info!("Realtime channel closed");
                    if let Some(action) = self.machine.handle(ChannelEvent::Closed) {
                        self.apply(action).await;
                    }
                }
                Step::Event(Some(event)) => {
                    if let Some(action) = self.machine.handle(event) {
                        self.apply(action).await;
                    }
                }
                Step::ReconnectDue => {
                    self.timer = None;
                    if let Some(action) = self.machine.reconnect_due() {
                        self.apply(action).await;
                    }
                }
            }

            self.publish();
        }

        log::info!("Realtime channel stopped");
    }

    async fn apply(&mut self, action: ChannelAction) {
        match action {
            ChannelAction::Connect => {
                let token = self.config.tokens.get();
                let url = self.config.urls.ws_with_token(token.as_deref());
                log::info!("Connecting realtime channel to {}", self.config.urls.ws());
                let connector = self.connector.clone();
                self.connecting = Some(Box::pin(async move { connector.connect(&url).await }));
            }
            ChannelAction::ScheduleReconnect(delay) => {
                log::info!("Reconnecting realtime channel in {:?}", delay);
                self.timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            ChannelAction::CancelReconnect => {
                self.timer = None;
            }
            ChannelAction::Close => {
                self.connecting = None;
                if let Some(mut conn) = self.connection.take() {
                    conn.close().await;
                }
                // Close is only requested once reconnecting is ruled out.
                let _ = self.machine.handle(ChannelEvent::Closed);
            }
        }
    }

    async fn teardown(&mut self) {
        for action in self.machine.unmount() {
            self.apply(action).await;
        }
        self.timer = None;
        self.connecting = None;
        if let Some(mut conn) = self.connection.take() {
            conn.close().await;
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshot.send_replace(self.machine.snapshot().clone());
    }
}

async fn poll_connecting(
    slot: &mut Option<ConnectFuture>,
) -> Result<Box<dyn Connection>, ChannelError> {
    match slot {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn poll_connection(slot: &mut Option<Box<dyn Connection>>) -> Option<ChannelEvent> {
    match slot {
        Some(conn) => conn.next_event().await,
        None => std::future::pending().await,
    }
}

async fn poll_timer(slot: &mut Option<Pin<Box<Sleep>>>) {
    match slot {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}
