//! WebSocket transport (tokio-tungstenite)
//!
//! Opening spawns two tasks:
//!
//! - writer: forwards outbound text to the socket, sends a Close frame once
//!   the outbound sender is dropped
//! - reader: forwards socket messages as [`TransportEvent`]s until the socket
//!   ends or the inbound receiver is dropped

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};

use super::{TransportConnection, TransportError, TransportEvent, TransportFactory};

/// Opens WebSocket connections to a fixed URL
#[derive(Debug, Clone)]
pub struct WebSocketTransportFactory {
    url: String,
}

impl WebSocketTransportFactory {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl TransportFactory for WebSocketTransportFactory {
    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn open(&self) -> Result<TransportConnection, TransportError> {
        let (ws_stream, response) =
            connect_async(self.url.as_str())
                .await
                .map_err(|e| TransportError::Open {
                    endpoint: self.url.clone(),
                    reason: e.to_string(),
                })?;
        tracing::debug!(
            "WebSocket handshake with {} completed ({})",
            self.url,
            response.status()
        );

        let (mut write, mut read) = ws_stream.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();

        let url = self.url.clone();
        tokio::spawn(async move {
            while let Some(text) = outbound_rx.recv().await {
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    tracing::debug!("WebSocket write to {} failed: {}", url, e);
                    return;
                }
            }
            // Outbound sender dropped: close gracefully
            if let Err(e) = write.send(Message::Close(None)).await {
                tracing::debug!("WebSocket close to {} failed: {}", url, e);
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(message) = read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => TransportEvent::Frame(text.to_string()),
                    Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                        Ok(text) => TransportEvent::Frame(text),
                        Err(_) => {
                            tracing::warn!("Ignoring non-UTF-8 binary message ({} bytes)", data.len());
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let reason = frame.map(|f| f.reason.to_string());
                        let _ = inbound_tx.send(TransportEvent::Closed(reason));
                        return;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = inbound_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if inbound_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = inbound_tx.send(TransportEvent::Closed(None));
        });

        Ok(TransportConnection { outbound, inbound })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_unreachable_endpoint_fails() {
        // テスト項目: 接続できない URL では Open エラーが返される
        // given (前提条件):
        let factory = WebSocketTransportFactory::new("ws://127.0.0.1:1/ws");

        // when (操作):
        let result = factory.open().await;

        // then (期待する結果):
        match result {
            Err(TransportError::Open { endpoint, .. }) => {
                assert_eq!(endpoint, "ws://127.0.0.1:1/ws")
            }
            other => panic!("expected open failure, got {:?}", other.map(|_| ())),
        }
    }
}
