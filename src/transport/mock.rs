//! Scripted in-memory transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportProvider};

#[derive(Default)]
struct MockState {
    find_misses: u32,
    connect_failures: u32,
    connect_hangs: bool,
    write_hangs: bool,
    subscribe_failures: u32,
    finds: u32,
    connect_calls: u32,
    subscribe_calls: u32,
    disconnects: u32,
    connected: bool,
    writes: Vec<(&'static str, Bytes)>,
    notify: Option<mpsc::Sender<Bytes>>,
    replies: VecDeque<Vec<Bytes>>,
}

/// Shared control surface over every transport a [`MockProvider`] hands out.
#[derive(Clone, Default)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn with<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    /// Next `n` address lookups find nothing.
    pub fn miss_finds(&self, n: u32) {
        self.with(|s| s.find_misses = n);
    }

    /// Next `n` connect attempts are refused.
    pub fn fail_connects(&self, n: u32) {
        self.with(|s| s.connect_failures = n);
    }

    /// Connect attempts never complete.
    pub fn hang_connects(&self, hang: bool) {
        self.with(|s| s.connect_hangs = hang);
    }

    /// Writes never complete.
    pub fn hang_writes(&self, hang: bool) {
        self.with(|s| s.write_hangs = hang);
    }

    /// Next `n` subscribe attempts are refused.
    pub fn fail_subscribes(&self, n: u32) {
        self.with(|s| s.subscribe_failures = n);
    }

    /// Queues fragments sent back after the next unanswered write.
    pub fn reply_with(&self, fragments: Vec<Bytes>) {
        self.with(|s| s.replies.push_back(fragments));
    }

    /// Pushes a fragment into the notification stream right now.
    pub async fn notify(&self, fragment: Bytes) {
        let tx = self.with(|s| s.notify.clone());
        if let Some(tx) = tx {
            tx.send(fragment).await.unwrap();
        }
    }

    /// Simulates the device going out of range.
    pub fn drop_link(&self) {
        self.with(|s| {
            s.connected = false;
            s.notify = None;
        });
    }

    pub fn finds(&self) -> u32 {
        self.with(|s| s.finds)
    }

    pub fn connect_calls(&self) -> u32 {
        self.with(|s| s.connect_calls)
    }

    pub fn subscribe_calls(&self) -> u32 {
        self.with(|s| s.subscribe_calls)
    }

    pub fn disconnects(&self) -> u32 {
        self.with(|s| s.disconnects)
    }

    pub fn writes(&self) -> Vec<(&'static str, Bytes)> {
        self.with(|s| s.writes.clone())
    }
}

/// Transport backed by a [`MockHandle`].
pub(crate) struct MockTransport {
    handle: MockHandle,
}

impl Transport for MockTransport {
    fn connect(&mut self, _timeout: Duration) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let hang = self.handle.with(|s| {
                s.connect_calls += 1;
                if s.connect_hangs {
                    return Ok(true);
                }
                if s.connect_failures > 0 {
                    s.connect_failures -= 1;
                    return Err(Error::transport("mock connect refused"));
                }
                s.connected = true;
                Ok(false)
            })?;
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }

    fn disconnect(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.handle.with(|s| {
                s.disconnects += 1;
                s.connected = false;
                s.notify = None;
            });
            Ok(())
        })
    }

    fn write(&mut self, characteristic: &'static str, data: Bytes) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let (hang, tx, reply) = self.handle.with(|s| {
                s.writes.push((characteristic, data));
                (s.write_hangs, s.notify.clone(), s.replies.pop_front())
            });
            if hang {
                std::future::pending::<()>().await;
            }
            if let (Some(tx), Some(fragments)) = (tx, reply) {
                for fragment in fragments {
                    tx.send(fragment).await.map_err(|_| Error::TransportLost)?;
                }
            }
            Ok(())
        })
    }

    fn subscribe_notify(
        &mut self,
        _characteristic: &'static str,
        fragments: mpsc::Sender<Bytes>,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.handle.with(|s| {
                s.subscribe_calls += 1;
                if s.subscribe_failures > 0 {
                    s.subscribe_failures -= 1;
                    return Err(Error::transport("mock subscribe refused"));
                }
                s.notify = Some(fragments);
                Ok(())
            })
        })
    }

    fn is_connected(&self) -> bool {
        self.handle.with(|s| s.connected)
    }
}

/// Provider handing out transports that share one [`MockHandle`].
#[derive(Clone, Default)]
pub(crate) struct MockProvider {
    pub handle: MockHandle,
}

impl TransportProvider for MockProvider {
    type Transport = MockTransport;

    fn find_transport_by_address(&self, _address: &str) -> Option<MockTransport> {
        self.handle.with(|s| {
            s.finds += 1;
            if s.find_misses > 0 {
                s.find_misses -= 1;
                None
            } else {
                Some(MockTransport {
                    handle: self.handle.clone(),
                })
            }
        })
    }
}

/// Builds a complete status message split into radio-sized fragments.
pub(crate) fn status_fragments(payload: &[u8; 48]) -> Vec<Bytes> {
    let mut msg = vec![0xAA, 0xAA, 0xAA, 0xAA, 49];
    msg.extend_from_slice(payload);
    msg.chunks(20).map(Bytes::copy_from_slice).collect()
}

/// Status payload with the given temperatures and operating minutes.
pub(crate) fn status_payload(state: u8, current: u8, target: u8, minutes: u16) -> [u8; 48] {
    let mut data = [0u8; 48];
    data[1] = state;
    data[4] = current;
    data[5] = target;
    data[6] = 30;
    data[7] = 70;
    data[35..37].copy_from_slice(&minutes.to_be_bytes());
    data
}

/// Installs a test subscriber once so `RUST_LOG` works in tests.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
