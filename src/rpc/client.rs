use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use super::message::{RpcMessage, RpcRequest, RpcResponse};

const CLOSE_GRACE: Duration = Duration::from_secs(5);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// JSON-RPC 2.0 client over a single WebSocket.
///
/// Calls may be issued concurrently from any number of tasks: each request
/// gets its own id and a reader task hands every response to the caller
/// waiting on that id, so responses can arrive in any order.
pub struct RpcClient {
    outgoing: mpsc::UnboundedSender<Message>,
    pending: Pending,
    closed: Arc<AtomicBool>,
    next_id: AtomicU64,
    call_timeout: Duration,
    reader: JoinHandle<()>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    pub async fn connect(url: impl Into<String>, call_timeout: Duration) -> Result<Self> {
        let url = url.into();
        debug!("Connecting to {}", url);

        let (stream, _) = timeout(call_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| Error::Timeout)??;
        let (mut sink, mut source) = stream.split();

        let (outgoing, mut queue) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = sink.send(message).await {
                    debug!("WebSocket write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let reader = {
            let pending = pending.clone();
            let closed = closed.clone();
            tokio::spawn(async move {
                while let Some(frame) = source.next().await {
                    match frame {
                        Ok(Message::Text(text)) => dispatch(&pending, &text).await,
                        Ok(Message::Close(frame)) => {
                            debug!("WebSocket closed by peer: {:?}", frame);
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("WebSocket read failed: {}", e);
                            break;
                        }
                    }
                }

                closed.store(true, Ordering::SeqCst);
                for (_, waiter) in pending.lock().await.drain() {
                    let _ = waiter.send(Err(Error::ConnectionClosed));
                }
            })
        };

        Ok(Self {
            outgoing,
            pending,
            closed,
            next_id: AtomicU64::new(1),
            call_timeout,
            reader,
            writer: Mutex::new(Some(writer)),
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_string(&RpcRequest::new(id, method, params))?;

        let (waiter, response) = oneshot::channel();
        self.pending.lock().await.insert(id, waiter);

        if self.closed.load(Ordering::SeqCst) || self.outgoing.send(Message::Text(payload)).is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConnectionClosed);
        }
        debug!("RPC #{} -> {}", id, method);

        match timeout(self.call_timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                warn!("RPC #{} ({}) timed out after {:?}", id, method, self.call_timeout);
                Err(Error::Timeout)
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a close frame and waits for the writer to flush it.
    pub async fn close(&self) -> Result<()> {
        let _ = self.outgoing.send(Message::Close(None));
        let writer = self.writer.lock().await.take();
        if let Some(handle) = writer {
            timeout(CLOSE_GRACE, handle)
                .await
                .map_err(|_| Error::Timeout)?
                .map_err(|e| Error::Session(format!("WebSocket writer task failed: {}", e)))?;
        }
        self.reader.abort();
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn dispatch(pending: &Pending, text: &str) {
    let message: RpcMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Ignoring malformed RPC frame ({}): {}", e, text);
            return;
        }
    };

    match message {
        RpcMessage::Response(response) => {
            let id = response.id;
            match pending.lock().await.remove(&id) {
                Some(waiter) => {
                    let _ = waiter.send(into_result(response));
                }
                None => debug!("Response for unknown RPC #{}", id),
            }
        }
        RpcMessage::Notification(notification) => {
            trace!("Ignoring notification {}", notification.method);
        }
    }
}

fn into_result(response: RpcResponse) -> Result<Value> {
    match (response.error, response.result) {
        (Some(error), _) => Err(Error::Rpc {
            code: error.code,
            message: error.message,
        }),
        (None, result) => Ok(result.unwrap_or(Value::Null)),
    }
}
