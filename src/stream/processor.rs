// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// Drives one upstream byte stream through the line decoder and the
// aggregator on a spawned task, and hands the resulting units to the
// client side through a bounded channel. The task stops reading upstream
// as soon as the client side is dropped.

use std::fmt::Display;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::toolcall::Normalizer;

use super::aggregator::Aggregator;
use super::decoder::LineDecoder;
use super::encoder::{ChunkEncoder, CompletionBuilder, ResponseMeta};
use super::types::{StreamInterrupted, StreamSettings, Unit};

const UNIT_CHANNEL_CAPACITY: usize = 64;

/// Turns upstream NDJSON into client-facing output.
#[derive(Clone)]
pub struct StreamProcessor {
    normalizer: Arc<Normalizer>,
    settings: StreamSettings,
}

impl StreamProcessor {
    pub fn new(normalizer: Arc<Normalizer>, settings: StreamSettings) -> Self {
        Self { normalizer, settings }
    }

    pub fn settings(&self) -> StreamSettings {
        self.settings
    }

    /// Aggregate an upstream stream into ordered units.
    ///
    /// The last unit is always `Unit::Finish`, unless the returned stream
    /// is dropped first. A transport error mid-stream ends reading and puts
    /// `Unit::Interrupted` right before the finish.
    pub fn units<S, E>(&self, input: S) -> impl Stream<Item = Unit> + Send + Unpin + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let normalizer = self.normalizer.clone();
        let policy = self.settings.upstream_error;
        let (tx, rx) = mpsc::channel::<Unit>(UNIT_CHANNEL_CAPACITY);

        tokio::spawn(async move {
            tokio::pin!(input);
            let mut decoder = LineDecoder::new();
            let mut aggregator = Aggregator::new(policy);
            let mut interrupted = None;

            loop {
                let next = tokio::select! {
                    _ = tx.closed() => {
                        tracing::debug!("client went away; dropping upstream stream");
                        return;
                    }
                    next = input.next() => next,
                };

                match next {
                    Some(Ok(chunk)) => {
                        for frame in decoder.push(&chunk) {
                            if send_all(&tx, aggregator.consume(frame)).await.is_err() {
                                return;
                            }
                        }
                        if aggregator.is_halted() {
                            tracing::info!("upstream error ended the stream early");
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "upstream stream failed; finishing response");
                        interrupted = Some(e.to_string());
                        break;
                    }
                    None => break,
                }
            }

            for frame in decoder.finish() {
                if send_all(&tx, aggregator.consume(frame)).await.is_err() {
                    return;
                }
            }

            tracing::debug!(
                mode = ?aggregator.mode(),
                accumulated = aggregator.accumulated().len(),
                sent = aggregator.sent(),
                "upstream stream ended"
            );
            let mut tail = aggregator.finish(&normalizer);
            if let Some(reason) = interrupted {
                let finish_at = tail.len().saturating_sub(1);
                tail.insert(finish_at, Unit::Interrupted(reason));
            }
            let _ = send_all(&tx, tail).await;
        });

        ReceiverStream::new(rx)
    }

    /// Stream SSE frames for a `stream: true` request.
    pub fn process<S, E>(
        &self,
        input: S,
        meta: ResponseMeta,
    ) -> impl Stream<Item = Bytes> + Send + Unpin + 'static
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut encoder = ChunkEncoder::new(meta, self.settings.argument_chunk_chars);
        self.units(input)
            .flat_map(move |unit| futures_util::stream::iter(encoder.encode(&unit)))
    }

    /// Read the whole upstream stream and build one `chat.completion` body.
    ///
    /// Fails if the upstream transport broke off before the end.
    pub async fn collect<S, E>(
        &self,
        input: S,
        meta: &ResponseMeta,
    ) -> Result<serde_json::Value, StreamInterrupted>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut builder = CompletionBuilder::new();
        let mut units = self.units(input);
        while let Some(unit) = units.next().await {
            builder.push(unit);
        }
        if let Some(reason) = builder.interrupted() {
            return Err(StreamInterrupted(reason.to_string()));
        }
        Ok(builder.build(meta))
    }
}

async fn send_all(tx: &mpsc::Sender<Unit>, units: Vec<Unit>) -> Result<(), ()> {
    for unit in units {
        tx.send(unit).await.map_err(|_| ())?;
    }
    Ok(())
}
