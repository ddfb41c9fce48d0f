//! Capture → encode → publish loop

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::broadcast::{BroadcastError, FrameBuffer, Publisher};

use super::source::{FrameEncoder, FrameSource};

/// Producer options
#[derive(Debug, Clone, Default)]
pub struct ProducerConfig {
    /// Stop after this many encode failures in a row (None = never stop)
    pub max_consecutive_encode_failures: Option<u32>,
}

impl ProducerConfig {
    /// Stop the loop after `max` consecutive encode failures
    pub fn max_consecutive_encode_failures(mut self, max: u32) -> Self {
        self.max_consecutive_encode_failures = Some(max);
        self
    }
}

/// Why the producer loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// The source reported the device closed
    SourceExhausted,
    /// Shutdown was requested
    Shutdown,
    /// The encoder failed too many times in a row
    EncodeFailures(u32),
    /// Someone else closed the frame buffer
    BufferClosed,
}

/// Summary returned when the loop ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerReport {
    pub exit: ProducerExit,
    pub frames_published: u64,
    pub encode_failures: u64,
    pub empty_frames: u64,
}

/// Drives a source and an encoder, publishing every encoded frame
pub struct Producer<S, E> {
    source: S,
    encoder: E,
    publisher: Publisher,
    config: ProducerConfig,
}

impl<S, E> Producer<S, E>
where
    S: FrameSource,
    E: FrameEncoder<S::Frame>,
{
    /// Create a producer publishing into `buffer`
    pub fn new(source: S, encoder: E, buffer: Arc<FrameBuffer>) -> Self {
        Self::with_config(source, encoder, buffer, ProducerConfig::default())
    }

    /// Create a producer with custom options
    pub fn with_config(
        source: S,
        encoder: E,
        buffer: Arc<FrameBuffer>,
        config: ProducerConfig,
    ) -> Self {
        let publisher = Publisher::new(buffer, encoder.content_type());

        Self {
            source,
            encoder,
            publisher,
            config,
        }
    }

    /// Run the loop on the current thread until the source ends or shutdown
    ///
    /// The frame buffer is closed on exit so every open stream ends.
    pub fn run(mut self, shutdown: &CancellationToken) -> ProducerReport {
        let mut report = ProducerReport {
            exit: ProducerExit::Shutdown,
            frames_published: 0,
            encode_failures: 0,
            empty_frames: 0,
        };
        let mut consecutive_failures = 0u32;

        tracing::info!(content_type = self.publisher.content_type(), "Producer started");

        report.exit = loop {
            if shutdown.is_cancelled() {
                break ProducerExit::Shutdown;
            }

            let Some(raw) = self.source.read_frame() else {
                tracing::info!(
                    frames = report.frames_published,
                    "Frame source closed, stopping producer"
                );
                break ProducerExit::SourceExhausted;
            };

            let data = match self.encoder.encode(&raw) {
                Ok(data) => data,
                Err(e) => {
                    report.encode_failures += 1;
                    consecutive_failures += 1;
                    tracing::warn!(
                        error = %e,
                        consecutive = consecutive_failures,
                        "Dropping frame that failed to encode"
                    );

                    match self.config.max_consecutive_encode_failures {
                        Some(max) if consecutive_failures >= max => {
                            tracing::error!(failures = consecutive_failures, "Too many encode failures");
                            break ProducerExit::EncodeFailures(consecutive_failures);
                        }
                        _ => continue,
                    }
                }
            };
            consecutive_failures = 0;

            if data.is_empty() {
                report.empty_frames += 1;
                continue;
            }

            match self.publisher.publish(data) {
                Ok(_) => report.frames_published += 1,
                Err(BroadcastError::Closed) => break ProducerExit::BufferClosed,
                Err(e) => tracing::debug!(error = %e, "Publish skipped"),
            }
        };

        self.publisher.close();

        tracing::info!(
            exit = ?report.exit,
            frames = report.frames_published,
            encode_failures = report.encode_failures,
            "Producer stopped"
        );
        report
    }

    /// Run the loop on tokio's blocking pool
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<ProducerReport> {
        tokio::task::spawn_blocking(move || self.run(&shutdown))
    }
}
