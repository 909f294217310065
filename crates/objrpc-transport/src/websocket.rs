//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! Every socket gets two tasks: a writer that drains an unbounded queue
//! into the sink, and a reader that turns incoming frames into
//! [`TransportEvent`]s. The engine only ever sees the queue (through
//! [`WebSocketSocket`]) and the events.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request, Response,
};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use crate::{
    CloseStatus, EventSender, Payload, RequestMeta, Socket, SocketId,
    TransportError, TransportEvent,
};

/// Frames queued for the writer task.
enum Outgoing {
    Frame(Message),
    Close(CloseStatus, String),
}

/// A WebSocket listener that reports accepted sockets as
/// [`TransportEvent::Connect`].
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }

    /// Returns the local address the listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }

    /// Accepts one connection, completes the WebSocket handshake, reports
    /// it on `events`, and starts its I/O tasks.
    pub async fn accept(
        &self,
        events: &EventSender,
    ) -> Result<SocketId, TransportError> {
        let (stream, addr) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let mut meta = RequestMeta {
            peer: Some(addr),
            ..RequestMeta::default()
        };
        let ws = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request,
             resp: Response|
             -> Result<Response, ErrorResponse> {
                meta.uri = req.uri().to_string();
                meta.headers = req
                    .headers()
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.as_str().to_string(),
                            value.to_str().unwrap_or_default().to_string(),
                        )
                    })
                    .collect();
                Ok(resp)
            },
        )
        .await
        .map_err(|e| {
            TransportError::AcceptFailed(TransportError::io(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let (socket, reader) = attach(ws, events.clone());
        let id = socket.id();
        tracing::debug!(%id, %addr, "accepted WebSocket connection");

        events
            .send(TransportEvent::Connect {
                socket,
                request: meta,
            })
            .map_err(|_| TransportError::Shutdown)?;
        tokio::spawn(reader);
        Ok(id)
    }

    /// Accepts connections until the event receiver goes away.
    ///
    /// A failed handshake only loses that one peer; the loop keeps going.
    pub async fn serve(self, events: EventSender) -> Result<(), TransportError> {
        loop {
            match self.accept(&events).await {
                Ok(_) => {}
                Err(TransportError::Shutdown) => {
                    tracing::info!("event receiver gone, listener stopping");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    if events.is_closed() {
                        return Ok(());
                    }
                }
            }
        }
    }
}

/// Dials a WebSocket endpoint and reports it as [`TransportEvent::Open`].
pub async fn connect(
    url: &str,
    events: &EventSender,
) -> Result<Arc<WebSocketSocket>, TransportError> {
    let (ws, _response) =
        tokio_tungstenite::connect_async(url).await.map_err(|e| {
            TransportError::ConnectFailed(TransportError::io(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

    let (socket, reader) = attach(ws, events.clone());
    tracing::debug!(id = %socket.id(), url, "dialed WebSocket connection");

    events
        .send(TransportEvent::Open {
            socket: socket.clone(),
        })
        .map_err(|_| TransportError::Shutdown)?;
    tokio::spawn(reader);
    Ok(socket)
}

/// The engine's handle on a single WebSocket.
pub struct WebSocketSocket {
    id: SocketId,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Socket for WebSocketSocket {
    fn id(&self) -> SocketId {
        self.id
    }

    fn send(&self, payload: Payload) -> Result<(), TransportError> {
        let message = match payload {
            Payload::Text(text) => Message::Text(text.into()),
            Payload::Binary(bytes) => Message::Binary(bytes.into()),
            Payload::Value(_) => {
                return Err(TransportError::UnsupportedPayload(
                    "pre-decoded values cannot be written to a WebSocket",
                ));
            }
        };
        self.outgoing
            .send(Outgoing::Frame(message))
            .map_err(|_| TransportError::ConnectionClosed(self.id.to_string()))
    }

    fn close(
        &self,
        status: CloseStatus,
        reason: &str,
    ) -> Result<(), TransportError> {
        // The writer is gone once a close went out, which is fine.
        let _ = self
            .outgoing
            .send(Outgoing::Close(status, reason.to_string()));
        Ok(())
    }
}

/// Splits the stream, spawns the writer, and returns the socket plus the
/// reader future. The caller reports the socket before spawning the reader
/// so that no message event can overtake the connect/open event.
fn attach<S>(
    ws: WebSocketStream<S>,
    events: EventSender,
) -> (Arc<WebSocketSocket>, impl Future<Output = ()> + Send + 'static)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = SocketId::next();
    let (mut sink, mut stream) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    tokio::spawn(async move {
        while let Some(outgoing) = rx.recv().await {
            match outgoing {
                Outgoing::Frame(message) => {
                    if let Err(e) = sink.send(message).await {
                        tracing::debug!(%id, error = %e, "WebSocket write failed");
                        break;
                    }
                }
                Outgoing::Close(status, reason) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(status.code()),
                        reason: reason.into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break;
                }
            }
        }
    });

    let reader = async move {
        loop {
            let event = match stream.next().await {
                Some(Ok(Message::Text(text))) => TransportEvent::Message {
                    socket: id,
                    payload: Payload::Text(text.to_string()),
                },
                Some(Ok(Message::Binary(data))) => TransportEvent::Message {
                    socket: id,
                    payload: Payload::Binary(data.to_vec()),
                },
                Some(Ok(Message::Pong(data))) => TransportEvent::Pong {
                    socket: id,
                    payload: data.to_vec(),
                },
                Some(Ok(Message::Close(frame))) => {
                    let (status, reason) = match frame {
                        Some(frame) => (
                            CloseStatus::new(u16::from(frame.code)),
                            frame.reason.to_string(),
                        ),
                        None => (CloseStatus::NO_STATUS, String::new()),
                    };
                    let _ = events.send(TransportEvent::Close {
                        socket: id,
                        status,
                        reason,
                    });
                    break;
                }
                Some(Ok(_)) => continue, // ping (answered by tungstenite) or raw frame
                Some(Err(e)) => {
                    let _ = events.send(TransportEvent::Error {
                        socket: id,
                        error: TransportError::ReceiveFailed(
                            TransportError::io(
                                std::io::ErrorKind::ConnectionReset,
                                e,
                            ),
                        ),
                    });
                    break;
                }
                None => {
                    let _ = events.send(TransportEvent::Close {
                        socket: id,
                        status: CloseStatus::ABNORMAL,
                        reason: String::new(),
                    });
                    break;
                }
            };
            if events.send(event).is_err() {
                break;
            }
        }
        tracing::debug!(%id, "WebSocket reader finished");
    };

    (Arc::new(WebSocketSocket { id, outgoing: tx }), reader)
}
