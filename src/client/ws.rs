// Copyright 2023 ICON Foundation
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Websocket subscriptions to the node's `/block` and `/event` endpoints.
//!
//! A subscription dials the HTTP endpoint with its scheme swapped to `ws`,
//! writes the request JSON, reads one status response, then streams typed
//! notifications to the handler until the peer closes, an error occurs or
//! the connection is closed through the client's connection table.

use std::sync::atomic::Ordering;

use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use btp_relayer_types::{BlockNotification, BlockRequest, EventNotification, EventRequest, WsResponse};
use btp_relayer_utils::{Error, Result};

use super::Client;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What a subscription handler is called with: the post-handshake
/// initialization signal, a typed notification, or a transport error that
/// is about to terminate the stream.
#[derive(Debug)]
pub enum WsEvent<T> {
    /// The subscription handshake succeeded; notifications follow.
    Init,
    /// One streamed notification.
    Notification(T),
    /// The read loop failed; the subscription ends after this event.
    Err(Error),
}

/// Receives [`WsEvent`]s from a subscription. Returning an error stops the
/// subscription and surfaces that error from the monitor call.
#[async_trait::async_trait]
pub trait MonitorHandler<T>: Send {
    /// Handles the next event.
    async fn on_event(&mut self, event: WsEvent<T>) -> Result<()>;
}

impl Client {
    /// Streams block notifications from `/block`.
    pub async fn monitor_block<H>(&self, request: &BlockRequest, handler: &mut H) -> Result<()>
    where
        H: MonitorHandler<BlockNotification>,
    {
        self.monitor("/block", request, handler).await
    }

    /// Streams event notifications from `/event`.
    pub async fn monitor_event<H>(&self, request: &EventRequest, handler: &mut H) -> Result<()>
    where
        H: MonitorHandler<EventNotification>,
    {
        self.monitor("/event", request, handler).await
    }

    /// Dials `path`, performs the subscription handshake and pumps
    /// notifications into `handler` until the stream ends.
    pub async fn monitor<Req, Resp, H>(
        &self,
        path: &str,
        request: &Req,
        handler: &mut H,
    ) -> Result<()>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
        H: MonitorHandler<Resp>,
    {
        let url = self.ws_endpoint(path);
        let (mut stream, _) = connect_async(url.as_str())
            .await
            .map_err(|_| Error::WsConnectFail)?;

        let key = self.register_connection(&stream);
        let close_rx = {
            let (close_tx, close_rx) = mpsc::channel::<()>(1);
            self.conns.lock().insert(key.clone(), close_tx);
            close_rx
        };

        let result = monitor_loop(&mut stream, request, handler, close_rx).await;

        tracing::debug!(conn = %key, "monitor finish");
        self.conns.lock().remove(&key);
        let _ = stream
            .close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            }))
            .await;
        result
    }

    /// Closes every registered subscription; their monitor calls return
    /// without error.
    pub fn close_all_monitors(&self) {
        let conns = std::mem::take(&mut *self.conns.lock());
        for (key, close_tx) in conns {
            tracing::debug!(conn = %key, "close monitor");
            let _ = close_tx.try_send(());
        }
    }

    fn ws_endpoint(&self, path: &str) -> String {
        // swap only the scheme prefix: http -> ws, https -> wss
        let mut url = self.endpoint.to_string().replacen("http", "ws", 1);
        url.push_str(path);
        url
    }

    fn register_connection(&self, stream: &WsStream) -> String {
        let local_addr = match stream.get_ref() {
            MaybeTlsStream::Plain(tcp) => tcp.local_addr().ok(),
            _ => None,
        };
        match local_addr {
            Some(addr) => addr.to_string(),
            None => format!("conn-{}", self.next_conn_id.fetch_add(1, Ordering::Relaxed)),
        }
    }
}

async fn monitor_loop<Req, Resp, H>(
    stream: &mut WsStream,
    request: &Req,
    handler: &mut H,
    mut close_rx: mpsc::Receiver<()>,
) -> Result<()>
where
    Req: Serialize + Sync,
    Resp: DeserializeOwned + Send,
    H: MonitorHandler<Resp>,
{
    stream
        .send(Message::Text(serde_json::to_string(request)?))
        .await?;

    let response: WsResponse = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => break serde_json::from_str(&text)?,
            Some(Ok(Message::Ping(payload))) => stream.send(Message::Pong(payload)).await?,
            Some(Ok(Message::Close(_))) | None => return Err(Error::WsConnectFail),
            Some(Err(err)) => return Err(err.into()),
            Some(Ok(_)) => {}
        }
    };
    if response.code != 0 {
        return Err(Error::WsInvalidResponse {
            code: response.code,
            message: response.message,
        });
    }

    handler.on_event(WsEvent::Init).await?;

    loop {
        tokio::select! {
            _ = close_rx.recv() => return Ok(()),
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<Resp>(&text) {
                    Ok(notification) => handler.on_event(WsEvent::Notification(notification)).await?,
                    Err(err) => {
                        let reason = err.to_string();
                        let _ = handler.on_event(WsEvent::Err(err.into())).await;
                        return Err(Error::WsRead(reason));
                    }
                },
                Some(Ok(Message::Ping(payload))) => stream.send(Message::Pong(payload)).await?,
                // a close frame from the peer is plain end-of-stream
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Err(err)) => {
                    let reason = err.to_string();
                    let _ = handler.on_event(WsEvent::Err(err.into())).await;
                    return Err(Error::WsRead(reason));
                }
                Some(Ok(_)) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_endpoint_swaps_scheme_only() {
        let client = Client::new("http://node:9080/api/v3").unwrap();
        assert_eq!(client.ws_endpoint("/block"), "ws://node:9080/api/v3/block");

        let tls = Client::new("https://node/api/v3").unwrap();
        assert_eq!(tls.ws_endpoint("/event"), "wss://node/api/v3/event");
    }
}
