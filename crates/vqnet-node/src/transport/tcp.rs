//! TCP transport.
//!
//! Frames are a big-endian `u32` length followed by a JSON document. A
//! server connection answers its requests one at a time, so the client keeps
//! a pool of idle connections per peer and dials a new one whenever all are
//! busy. Nested calls between the same two nodes therefore never wait on
//! each other's socket.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use super::{ConnectError, Connector, PeerClient};
use crate::config::NodeEndpoint;
use crate::error::{NodeError, NodeResult};
use crate::node::Node;
use crate::protocol::{Request, Response};

/// Largest accepted frame.
pub const MAX_FRAME_BYTES: u32 = 64 * 1024 * 1024;

/// Write one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> NodeResult<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = serde_json::to_vec(message)?;
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|&len| len <= MAX_FRAME_BYTES)
        .ok_or_else(|| {
            NodeError::Transport(format!("frame of {} bytes is too large", payload.len()))
        })?;
    writer.write_u32(len).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `None` means the peer closed the connection between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> NodeResult<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = match reader.read_u32().await {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if len > MAX_FRAME_BYTES {
        return Err(NodeError::Transport(format!(
            "incoming frame of {len} bytes exceeds the {MAX_FRAME_BYTES} byte limit"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;
    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Pooled TCP channel to one peer.
#[derive(Debug)]
pub struct TcpPeer {
    address: String,
    idle: Mutex<Vec<TcpStream>>,
}

impl TcpPeer {
    /// A peer at `address` with one already open connection.
    pub fn new(address: impl Into<String>, stream: TcpStream) -> Self {
        Self {
            address: address.into(),
            idle: Mutex::new(vec![stream]),
        }
    }

    fn checkout(&self) -> Option<TcpStream> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    fn checkin(&self, stream: TcpStream) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stream);
    }
}

#[async_trait]
impl PeerClient for TcpPeer {
    async fn call(&self, request: Request) -> NodeResult<Response> {
        let mut stream = match self.checkout() {
            Some(stream) => stream,
            None => {
                debug!(address = %self.address, "All connections busy, dialing another");
                TcpStream::connect(&self.address).await?
            }
        };
        write_frame(&mut stream, &request).await?;
        let reply: NodeResult<Response> = read_frame(&mut stream).await?.ok_or_else(|| {
            NodeError::Transport(format!("{} closed the connection", self.address))
        })?;
        self.checkin(stream);
        reply
    }
}

/// Dials peers over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        name: &str,
        endpoint: &NodeEndpoint,
    ) -> Result<Arc<dyn PeerClient>, ConnectError> {
        let address = endpoint.address();
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(NodeError::from)?;
                Ok(Arc::new(TcpPeer::new(address, stream)))
            }
            Err(e) if e.kind() == ErrorKind::ConnectionRefused => {
                Err(ConnectError::Refused(format!("{name} at {address}: {e}")))
            }
            Err(e) => Err(ConnectError::Failed(e.into())),
        }
    }
}

/// Serve `node` on `listener` until the task is dropped.
pub async fn serve(node: Arc<Node>, listener: TcpListener) -> NodeResult<()> {
    info!(node = %node.name(), address = ?listener.local_addr().ok(), "Serving node");
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(node = %node.name(), %peer, "Accepted connection");
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            if let Err(e) = serve_connection(node, stream).await {
                warn!(%peer, error = %e, "Connection closed with error");
            }
        });
    }
}

async fn serve_connection(node: Arc<Node>, mut stream: TcpStream) -> NodeResult<()> {
    stream.set_nodelay(true)?;
    while let Some(request) = read_frame::<_, Request>(&mut stream).await? {
        let reply = node.handle(request).await;
        write_frame(&mut stream, &reply).await?;
    }
    Ok(())
}
