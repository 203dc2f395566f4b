//! WebSocket transport for the realtime channel.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{ChannelError, ChannelEvent, Connection, Connector};

/// Connects with `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ChannelError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        Ok(Box::new(WebSocketConnection {
            stream,
            finished: false,
        }))
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    /// Set once a close frame or a transport error was reported.
    finished: bool,
}

#[async_trait]
impl Connection for WebSocketConnection {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(ChannelEvent::Message(text)),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => return Some(ChannelEvent::Message(text)),
                    Err(_) => log::warn!("Dropping non-UTF-8 binary channel message"),
                },
                Some(Ok(Message::Close(frame))) => {
                    log::info!("Server closed realtime channel: {:?}", frame);
                    self.finished = true;
                    return Some(ChannelEvent::Closed);
                }
                // Ping/pong and raw frames
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            log::debug!("Realtime channel close: {}", e);
        }
        self.finished = true;
    }
}
