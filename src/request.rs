use crate::client::Session;
use crate::service::CallError;
use dashmap::DashMap;
use log::{trace, warn};
use pushcore::iproto::{Request, Response};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

/// Requests awaiting a response on one session, keyed by sync id.
#[derive(Debug, Default)]
pub struct PendingRequests {
    waiters: DashMap<u64, oneshot::Sender<Response>>,
    next_sync: AtomicU64,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (u64, oneshot::Receiver<Response>) {
        let sync = self.next_sync.fetch_add(1, Ordering::Relaxed) + 1;
        let (tx, rx) = oneshot::channel();
        self.waiters.insert(sync, tx);
        (sync, rx)
    }

    /// Hands a response to its waiter. Returns false if nobody is waiting.
    pub fn complete(&self, response: Response) -> bool {
        let sync = response.header.sync;
        match self.waiters.remove(&sync) {
            Some((_, waiter)) => {
                if waiter.send(response).is_err() {
                    warn!(target: "Connection", "Waiter for sync {sync} was dropped");
                }
                true
            }
            None => false,
        }
    }

    pub fn cancel(&self, sync: u64) {
        self.waiters.remove(&sync);
    }

    /// Drops every waiter so their receivers observe a closed channel.
    pub fn fail_all(&self) -> usize {
        let count = self.waiters.len();
        self.waiters.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl Session {
    /// Sends one request and waits for the response with the same sync id.
    pub(crate) async fn send_request(
        &self,
        request: Request<'_>,
        request_timeout: Duration,
    ) -> Result<Response, CallError> {
        let (sync, rx) = self.pending.register();
        let packet = match request.encode(sync) {
            Ok(packet) => packet,
            Err(e) => {
                self.pending.cancel(sync);
                return Err(e.into());
            }
        };

        if let Err(e) = self.socket.send_packet(&packet).await {
            self.pending.cancel(sync);
            return Err(e.into());
        }
        trace!(target: "Connection", "--> Request type {:#x}, sync {sync}", request.request_type());

        match timeout(request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(CallError::Disconnected),
            Err(_) => {
                self.pending.cancel(sync);
                Err(CallError::Timeout(request_timeout))
            }
        }
    }
}
