//! Newline-delimited JSON transport over an async reader and writer.
//!
//! Each input line is one delivery; each publish writes one line. Declined
//! envelopes are redelivered ahead of new input. Used by the binary on
//! stdin/stdout so agents can be chained with pipes.

use super::{Envelope, EnvelopeId, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines, Stdin, Stdout,
};
use tokio::sync::Mutex;
use tracing::debug;

pub struct LineTransport<R, W> {
    topic: String,
    poll_timeout: Duration,
    reader: Mutex<Lines<BufReader<R>>>,
    writer: Mutex<W>,
    redeliveries: parking_lot::Mutex<VecDeque<Envelope>>,
    next_offset: AtomicU64,
    eof: AtomicBool,
}

impl LineTransport<Stdin, Stdout> {
    /// Transport reading deliveries from stdin and publishing to stdout
    pub fn stdio(topic: impl Into<String>, poll_timeout: Duration) -> Self {
        Self::new(topic, tokio::io::stdin(), tokio::io::stdout(), poll_timeout)
    }
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(topic: impl Into<String>, reader: R, writer: W, poll_timeout: Duration) -> Self {
        Self {
            topic: topic.into(),
            poll_timeout,
            reader: Mutex::new(BufReader::new(reader).lines()),
            writer: Mutex::new(writer),
            redeliveries: parking_lot::Mutex::new(VecDeque::new()),
            next_offset: AtomicU64::new(0),
            eof: AtomicBool::new(false),
        }
    }

    /// Consume the transport and return its writer
    pub fn into_writer(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait]
impl<R, W> Transport for LineTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    async fn consume(&self) -> Result<Option<Envelope>, TransportError> {
        let redelivered = self.redeliveries.lock().pop_front();
        if let Some(envelope) = redelivered {
            return Ok(Some(envelope));
        }
        if self.eof.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let mut reader = self.reader.lock().await;
        loop {
            let line = match tokio::time::timeout(self.poll_timeout, reader.next_line()).await {
                Err(_) => return Ok(None),
                Ok(result) => result.map_err(|e| {
                    TransportError::ConsumeFailed(format!(
                        "reading line from '{}': {}",
                        self.topic, e
                    ))
                })?,
            };
            let Some(line) = line else {
                self.eof.store(true, Ordering::SeqCst);
                return Err(TransportError::Closed);
            };
            if line.trim().is_empty() {
                continue;
            }
            let id = EnvelopeId {
                topic: self.topic.clone(),
                partition: 0,
                offset: self.next_offset.fetch_add(1, Ordering::SeqCst),
            };
            return Ok(Some(Envelope::new(id, line.into_bytes())));
        }
    }

    async fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        debug!(envelope = %envelope.id, "Line consumed");
        Ok(())
    }

    async fn decline(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.redeliveries.lock().push_back(envelope.clone());
        Ok(())
    }

    async fn publish(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        writer.write_all(payload).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}
