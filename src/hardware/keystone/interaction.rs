//! Play/read handshake between the keyring and whatever shows and scans QR codes.
//!
//! `channel()` splits into a `ChannelInteraction` (held by the keyring) and an
//! `AirgapPort` (held by the application). Each request carries a oneshot
//! reply, and only one exchange may be outstanding at a time.

use crate::core::domain::Ur;
use crate::core::errors::{KeyringError, KeyringResult};
use async_trait::async_trait;
use std::future::Future;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

#[async_trait]
pub trait AirgapInteraction: Send + Sync {
    /// Emit a payload for the device to capture.
    async fn play(&self, ur: Ur) -> KeyringResult<()>;

    /// Receive the next payload the device produced.
    async fn read(&self) -> KeyringResult<Ur>;

    /// One full round trip.
    async fn exchange(&self, ur: Ur) -> KeyringResult<Ur> {
        self.play(ur).await?;
        self.read().await
    }
}

/// What the application is asked to do.
#[derive(Debug)]
pub enum AirgapRequest {
    Play {
        ur: Ur,
        reply: oneshot::Sender<KeyringResult<()>>,
    },
    Read {
        reply: oneshot::Sender<KeyringResult<Ur>>,
    },
}

/// Keyring side of the channel.
pub struct ChannelInteraction {
    requests: mpsc::Sender<AirgapRequest>,
    gate: Mutex<()>,
}

/// Application side of the channel.
pub struct AirgapPort {
    requests: mpsc::Receiver<AirgapRequest>,
}

pub fn channel() -> (ChannelInteraction, AirgapPort) {
    let (tx, rx) = mpsc::channel(1);
    (
        ChannelInteraction {
            requests: tx,
            gate: Mutex::new(()),
        },
        AirgapPort { requests: rx },
    )
}

fn port_closed() -> KeyringError {
    KeyringError::ExchangeFailure("air-gapped port closed".to_string())
}

fn busy() -> KeyringError {
    KeyringError::ExchangeFailure("another air-gapped exchange is outstanding".to_string())
}

impl ChannelInteraction {
    async fn send_play(&self, ur: Ur) -> KeyringResult<()> {
        let (reply, response) = oneshot::channel();
        debug!("Playing UR {}", ur.ur_type);
        self.requests
            .send(AirgapRequest::Play { ur, reply })
            .await
            .map_err(|_| port_closed())?;
        response.await.map_err(|_| port_closed())?
    }

    async fn send_read(&self) -> KeyringResult<Ur> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(AirgapRequest::Read { reply })
            .await
            .map_err(|_| port_closed())?;
        let ur = response.await.map_err(|_| port_closed())??;
        debug!("Read UR {}", ur.ur_type);
        Ok(ur)
    }
}

#[async_trait]
impl AirgapInteraction for ChannelInteraction {
    async fn play(&self, ur: Ur) -> KeyringResult<()> {
        let _guard = self.gate.try_lock().map_err(|_| busy())?;
        self.send_play(ur).await
    }

    async fn read(&self) -> KeyringResult<Ur> {
        let _guard = self.gate.try_lock().map_err(|_| busy())?;
        self.send_read().await
    }

    async fn exchange(&self, ur: Ur) -> KeyringResult<Ur> {
        let _guard = self.gate.try_lock().map_err(|_| busy())?;
        self.send_play(ur).await?;
        self.send_read().await
    }
}

impl AirgapPort {
    pub async fn next(&mut self) -> Option<AirgapRequest> {
        self.requests.recv().await
    }

    /// Answer requests with the given handlers until the keyring side is dropped.
    pub async fn serve<P, PF, R, RF>(mut self, mut on_play: P, mut on_read: R)
    where
        P: FnMut(Ur) -> PF,
        PF: Future<Output = KeyringResult<()>>,
        R: FnMut() -> RF,
        RF: Future<Output = KeyringResult<Ur>>,
    {
        while let Some(request) = self.next().await {
            let delivered = match request {
                AirgapRequest::Play { ur, reply } => reply.send(on_play(ur).await).is_ok(),
                AirgapRequest::Read { reply } => reply.send(on_read().await).is_ok(),
            };
            if !delivered {
                warn!("Air-gapped reply dropped: requester went away");
            }
        }
    }
}

/// Read-only interaction returning one fixed payload. Used to import from an
/// already-scanned UR.
pub struct FixedRead {
    ur: Ur,
}

impl FixedRead {
    pub fn new(ur: Ur) -> Self {
        Self { ur }
    }
}

#[async_trait]
impl AirgapInteraction for FixedRead {
    async fn play(&self, _ur: Ur) -> KeyringResult<()> {
        Err(KeyringError::ExchangeFailure("no display attached to a fixed reader".to_string()))
    }

    async fn read(&self) -> KeyringResult<Ur> {
        Ok(self.ur.clone())
    }
}
