//! Transport seam for the realtime feed.
//!
//! The feed worker only needs to open a connection, read text frames, write
//! text frames and close. [`WsTransport`] does that over a websocket.

use std::future::Future;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::feed::client::FeedClientError;

/// A frame read from an open feed connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 text payload.
    Text(String),
    /// Payload that arrived in a non-text frame and is not valid UTF-8.
    Undecodable,
    /// Peer closed the connection.
    Close,
}

/// Opens feed connections.
pub trait FeedTransport: Send + Sync + 'static {
    type Connection: FeedConnection;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, FeedClientError>> + Send;
}

/// One open feed connection, exclusively owned by the feed worker.
pub trait FeedConnection: Send + 'static {
    /// Reads the next frame. `None` means the stream ended.
    ///
    /// Must be cancel safe: the worker races it against outbound sends and
    /// shutdown.
    fn recv(&mut self) -> impl Future<Output = Option<Result<Frame, FeedClientError>>> + Send;

    fn send_text(&mut self, text: String)
        -> impl Future<Output = Result<(), FeedClientError>> + Send;

    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Websocket transport over `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WsTransport;

impl FeedTransport for WsTransport {
    type Connection = WsConnection;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Connection, FeedClientError>> + Send {
        let url = url.to_string();
        async move {
            let (socket, _) = connect_async(url).await?;
            Ok(WsConnection { socket })
        }
    }
}

#[derive(Debug)]
pub struct WsConnection {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl FeedConnection for WsConnection {
    async fn recv(&mut self) -> Option<Result<Frame, FeedClientError>> {
        loop {
            match self.socket.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                Ok(Message::Binary(bytes)) => {
                    return Some(Ok(match String::from_utf8(bytes) {
                        Ok(text) => Frame::Text(text),
                        Err(_) => Frame::Undecodable,
                    }));
                }
                // tungstenite queues the pong itself; flushing sends it.
                Ok(Message::Ping(_)) => {
                    if let Err(err) = self.socket.flush().await {
                        return Some(Err(err.into()));
                    }
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(_)) => return Some(Ok(Frame::Close)),
                Err(err) => return Some(Err(err.into())),
            }
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), FeedClientError> {
        self.socket.send(Message::Text(text)).await?;
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.socket.close(None).await;
    }
}
