//! Broker-facing publish sink
//!
//! The shipping pipeline treats the broker client as an opaque capability:
//! anything implementing [`Sink`] can receive payloads. Completion of each
//! accepted request is reported asynchronously as a [`ProducerTransaction`]
//! on the channel the caller supplies.

pub mod tcp;

pub use tcp::TcpSink;

use crossbeam_channel::Sender;

/// Failure modes of a single publish submission.
///
/// The publish loop keys its behavior off these by variant: `NotConnected` is
/// transient and retried, `Stopped` is terminal, and everything else is
/// opaque — logged and dropped without retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    /// Transient: the broker connection is currently down
    #[error("not connected")]
    NotConnected,

    /// Terminal: the sink has been stopped
    #[error("stopped")]
    Stopped,

    /// Opaque, non-transient failure
    #[error("{0}")]
    Other(String),
}

/// Completion record correlating one publish attempt's outcome.
///
/// Produced by the sink once per accepted request, consumed exactly once by
/// the transaction drain loop.
#[derive(Debug, Clone)]
pub struct ProducerTransaction {
    pub topic: String,
    pub body_len: usize,
    pub error: Option<PublishError>,
}

/// An asynchronous publish capability.
///
/// `publish_async` either rejects the request immediately with a
/// [`PublishError`] or accepts it, in which case exactly one
/// [`ProducerTransaction`] is later delivered on `done`.
pub trait Sink: Send + Sync + 'static {
    fn publish_async(
        &self,
        topic: &str,
        body: &[u8],
        done: Sender<ProducerTransaction>,
    ) -> std::result::Result<(), PublishError>;

    /// Stop the sink. Subsequent submissions fail with [`PublishError::Stopped`].
    fn stop(&self);
}

/// Broker client configuration applied at construction.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Compress publish bodies on the wire
    pub compression: bool,
    /// Cap on requests accepted but not yet completed
    pub max_in_flight: usize,
    /// Emit sink-internal diagnostics
    pub verbose: bool,
    /// Shared secret for broker authentication, when set
    pub auth_secret: Option<String>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            compression: true,
            max_in_flight: 100,
            verbose: false,
            auth_secret: None,
        }
    }
}

impl SinkConfig {
    /// Apply a shared secret. An empty secret leaves authentication off.
    #[must_use]
    pub fn with_auth_secret(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.auth_secret = Some(secret.to_string());
        }
        self
    }
}
