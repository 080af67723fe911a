//! In-process channel with the same contract as the TCP subscriber.
//!
//! Handy for embedding a producer and a viewer in one process and for
//! driving supervisors deterministically. Dropping every [`MemorySender`]
//! is reported as [`CastError::ChannelClosed`], the in-process analogue of
//! a transport fault.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use super::Channel;
use crate::error::CastError;

/// Producer half of a [`MemoryChannel`].
#[derive(Debug, Clone)]
pub struct MemorySender {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl MemorySender {
    /// Queue a payload. Fails once the channel has been closed.
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<(), CastError> {
        self.tx.send(payload.into())?;
        Ok(())
    }
}

/// Subscriber half.
#[derive(Debug)]
pub struct MemoryChannel {
    rx: mpsc::UnboundedReceiver<Bytes>,
    conflate: bool,
    closed: bool,
}

impl MemoryChannel {
    /// Create a connected pair. With `conflate`, each `recv` yields only the
    /// newest queued payload.
    pub fn pair(conflate: bool) -> (MemorySender, MemoryChannel) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            MemorySender { tx },
            MemoryChannel {
                rx,
                conflate,
                closed: false,
            },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn recv(&mut self, timeout: Duration) -> Result<Bytes, CastError> {
        if self.closed {
            return Err(CastError::ChannelClosed);
        }

        let mut payload = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => return Err(CastError::Timeout(timeout)),
            Ok(None) => return Err(CastError::ChannelClosed),
            Ok(Some(payload)) => payload,
        };

        if self.conflate {
            while let Ok(newer) = self.rx.try_recv() {
                payload = newer;
            }
        }
        Ok(payload)
    }

    async fn close(&mut self) {
        self.rx.close();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn conflating_pair_yields_newest() {
        let (tx, mut rx) = MemoryChannel::pair(true);
        tx.send(&b"a"[..]).unwrap();
        tx.send(&b"b"[..]).unwrap();
        tx.send(&b"c"[..]).unwrap();

        let got = rx.recv(Duration::from_millis(50)).await.unwrap();
        assert_eq!(&got[..], b"c");
        assert!(rx.recv(Duration::from_millis(10)).await.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn queued_pair_keeps_order() {
        let (tx, mut rx) = MemoryChannel::pair(false);
        tx.send(vec![1u8]).unwrap();
        tx.send(vec![2u8]).unwrap();
        assert_eq!(&rx.recv(Duration::from_millis(50)).await.unwrap()[..], &[1]);
        assert_eq!(&rx.recv(Duration::from_millis(50)).await.unwrap()[..], &[2]);
    }

    #[tokio::test]
    async fn dropped_sender_is_a_fault() {
        let (tx, mut rx) = MemoryChannel::pair(true);
        drop(tx);
        let err = rx.recv(Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, CastError::ChannelClosed));
    }

    #[tokio::test]
    async fn close_rejects_senders() {
        let (tx, mut rx) = MemoryChannel::pair(true);
        rx.close().await;
        assert!(tx.send(vec![0u8]).is_err());
        assert!(matches!(
            rx.recv(Duration::from_millis(10)).await,
            Err(CastError::ChannelClosed)
        ));
    }
}
