use crate::request::PendingRequests;
use crate::socket::error::{Result, SocketError};
use log::{debug, error, trace, warn};
use pushcore::framing::FrameDecoder;
use pushcore::iproto::Response;
use pushcore::iproto::consts::GREETING_SIZE;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::Mutex;
use tokio::time::timeout;

/// Write side of one TCP session. Reads are owned by a spawned pump that
/// routes every decoded frame to its waiter.
pub struct FrameSocket {
    writer: Mutex<Option<OwnedWriteHalf>>,
    is_connected: Arc<AtomicBool>,
    peer_addr: SocketAddr,
}

impl FrameSocket {
    /// Dials `addr`, reads the fixed-size greeting and starts the read pump.
    pub async fn connect(
        addr: &str,
        dial_timeout: Duration,
        pending: Arc<PendingRequests>,
    ) -> Result<(Self, [u8; GREETING_SIZE])> {
        debug!(target: "Connection", "Dialing {addr}");
        let mut stream = match timeout(dial_timeout, TcpStream::connect(addr)).await {
            Ok(stream) => stream?,
            Err(_) => {
                return Err(SocketError::DialTimeout {
                    addr: addr.to_string(),
                    timeout: dial_timeout,
                });
            }
        };
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;

        let mut greeting = [0u8; GREETING_SIZE];
        match timeout(dial_timeout, stream.read_exact(&mut greeting)).await {
            Ok(read) => {
                read?;
            }
            Err(_) => return Err(SocketError::GreetingTimeout),
        }
        trace!(target: "Connection", "<-- Greeting from {peer_addr}");

        let (reader, writer) = stream.into_split();
        let is_connected = Arc::new(AtomicBool::new(true));
        tokio::spawn(Self::read_pump(reader, pending, is_connected.clone()));

        let socket = Self {
            writer: Mutex::new(Some(writer)),
            is_connected,
            peer_addr,
        };
        Ok((socket, greeting))
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SocketError::SocketClosed)?;
        if !self.is_connected() {
            return Err(SocketError::SocketClosed);
        }

        trace!(target: "Connection", "--> Sending packet: {} bytes", packet.len());
        if let Err(e) = writer.write_all(packet).await {
            self.is_connected.store(false, Ordering::Release);
            *guard = None;
            return Err(e.into());
        }
        Ok(())
    }

    pub async fn close(&self) {
        self.is_connected.store(false, Ordering::Release);
        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
    }

    async fn read_pump(
        mut reader: OwnedReadHalf,
        pending: Arc<PendingRequests>,
        is_connected: Arc<AtomicBool>,
    ) {
        let mut decoder = FrameDecoder::new();

        'pump: loop {
            match reader.read_buf(decoder.buffer_mut()).await {
                Ok(0) => {
                    trace!(target: "Connection", "Server closed the stream");
                    break;
                }
                Ok(n) => trace!(target: "Connection", "<-- Read {n} bytes"),
                Err(e) => {
                    warn!(target: "Connection", "Error reading from socket: {e}");
                    break;
                }
            }

            loop {
                match decoder.decode_frame() {
                    Ok(Some(frame)) => match Response::decode(frame) {
                        Ok(response) => {
                            let sync = response.header.sync;
                            if !pending.complete(response) {
                                debug!(target: "Connection", "Dropping response for unknown sync {sync}");
                            }
                        }
                        Err(e) => {
                            error!(target: "Connection", "Malformed response frame: {e}");
                            break 'pump;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        error!(target: "Connection", "Framing error: {e}");
                        break 'pump;
                    }
                }
            }
        }

        is_connected.store(false, Ordering::Release);
        let failed = pending.fail_all();
        if failed > 0 {
            warn!(target: "Connection", "Socket lost with {failed} requests in flight");
        }
    }
}
