//! TCP broker sink
//!
//! Frames publish requests onto a single TCP connection from a dedicated
//! writer thread, so submissions return without touching the network. A lost
//! connection is retried once per request; while the connection is down the
//! sink reports [`PublishError::NotConnected`] so the publish loop can apply
//! its own retry policy.

use super::{ProducerTransaction, PublishError, Sink, SinkConfig};
use crate::core::error::{LoggerError, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use std::io::Write;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Frame carrying one publish payload.
pub(crate) const FRAME_PUBLISH: u8 = 0x01;
/// Frame carrying the shared authentication secret.
pub(crate) const FRAME_AUTH: u8 = 0x02;

struct PublishRequest {
    topic: String,
    body: Vec<u8>,
    done: Sender<ProducerTransaction>,
}

/// Broker sink over a raw TCP connection.
pub struct TcpSink {
    req_tx: Mutex<Option<Sender<PublishRequest>>>,
    writer_handle: Mutex<Option<thread::JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl TcpSink {
    /// Connect to the broker and start the writer thread.
    ///
    /// Applies the [`SinkConfig`] at construction: the authentication frame
    /// is sent before any publish when a shared secret is configured, and a
    /// failure to apply it is a construction error.
    pub fn connect(addr: &str, config: SinkConfig) -> Result<Self> {
        let stream = open_stream(addr)
            .map_err(|e| LoggerError::io_operation("connecting to broker", addr, e))?;

        let connected = Arc::new(AtomicBool::new(true));
        let mut writer = Writer {
            stream: Some(stream),
            addr: addr.to_string(),
            config: config.clone(),
            connected: Arc::clone(&connected),
        };

        if let Some(secret) = writer.config.auth_secret.clone() {
            writer.send_auth(&secret).map_err(|e| {
                LoggerError::config("TcpSink", format!("failed to apply shared secret: {e}"))
            })?;
        }
        if config.verbose {
            eprintln!("[LOGSHIP SINK] connected to {addr}");
        }

        let (req_tx, req_rx) = bounded(config.max_in_flight);
        let handle = thread::Builder::new()
            .name("logship-sink-writer".to_string())
            .spawn(move || writer.run(req_rx))?;

        Ok(Self {
            req_tx: Mutex::new(Some(req_tx)),
            writer_handle: Mutex::new(Some(handle)),
            connected,
            stopped: AtomicBool::new(false),
        })
    }
}

impl Sink for TcpSink {
    fn publish_async(
        &self,
        topic: &str,
        body: &[u8],
        done: Sender<ProducerTransaction>,
    ) -> std::result::Result<(), PublishError> {
        if self.stopped.load(Ordering::Acquire) {
            return Err(PublishError::Stopped);
        }
        if !self.connected.load(Ordering::Acquire) {
            return Err(PublishError::NotConnected);
        }

        let guard = self.req_tx.lock();
        let Some(req_tx) = guard.as_ref() else {
            return Err(PublishError::Stopped);
        };
        let request = PublishRequest {
            topic: topic.to_string(),
            body: body.to_vec(),
            done,
        };
        match req_tx.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(PublishError::Other("in-flight limit reached".to_string()))
            }
            Err(TrySendError::Disconnected(_)) => Err(PublishError::Stopped),
        }
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        // Dropping the sender lets the writer drain accepted requests and exit.
        drop(self.req_tx.lock().take());
        if let Some(handle) = self.writer_handle.lock().take() {
            if handle.join().is_err() {
                eprintln!("[LOGSHIP SINK] writer thread panicked during stop");
            }
        }
    }
}

impl Drop for TcpSink {
    fn drop(&mut self) {
        if !self.stopped.load(Ordering::Acquire) {
            self.stop();
        }
    }
}

fn open_stream(addr: &str) -> std::io::Result<TcpStream> {
    let stream = TcpStream::connect(addr)?;
    stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

struct Writer {
    stream: Option<TcpStream>,
    addr: String,
    config: SinkConfig,
    connected: Arc<AtomicBool>,
}

impl Writer {
    fn run(mut self, req_rx: Receiver<PublishRequest>) {
        for request in req_rx.iter() {
            let error = self.handle(&request);
            let transaction = ProducerTransaction {
                topic: request.topic,
                body_len: request.body.len(),
                error,
            };
            // The drain side may already be gone during shutdown.
            let _ = request.done.send(transaction);
        }
    }

    fn handle(&mut self, request: &PublishRequest) -> Option<PublishError> {
        let frame = match self.encode_publish(&request.topic, &request.body) {
            Ok(frame) => frame,
            Err(err) => return Some(PublishError::Other(format!("encoding frame: {err}"))),
        };

        match self.write_frame(&frame) {
            Ok(()) => None,
            Err(write_err) => {
                self.connected.store(false, Ordering::Release);
                self.stream = None;
                // One reconnect-and-resend attempt, then give up on this request.
                match self.reconnect() {
                    Ok(()) => match self.write_frame(&frame) {
                        Ok(()) => None,
                        Err(resend_err) => {
                            self.connected.store(false, Ordering::Release);
                            self.stream = None;
                            Some(PublishError::Other(format!(
                                "write failed after reconnect: {resend_err}"
                            )))
                        }
                    },
                    Err(reconnect_err) => Some(PublishError::Other(format!(
                        "write failed: {write_err}; reconnect failed: {reconnect_err}"
                    ))),
                }
            }
        }
    }

    fn reconnect(&mut self) -> std::io::Result<()> {
        let stream = open_stream(&self.addr)?;
        self.stream = Some(stream);
        if let Some(secret) = self.config.auth_secret.clone() {
            self.send_auth(&secret)?;
        }
        self.connected.store(true, Ordering::Release);
        if self.config.verbose {
            eprintln!("[LOGSHIP SINK] reconnected to {}", self.addr);
        }
        Ok(())
    }

    fn encode_publish(&self, topic: &str, body: &[u8]) -> std::io::Result<Vec<u8>> {
        let payload = if self.config.compression {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body)?;
            encoder.finish()?
        } else {
            body.to_vec()
        };

        let mut frame = Vec::with_capacity(1 + 4 + topic.len() + 4 + payload.len());
        frame.push(FRAME_PUBLISH);
        frame.extend_from_slice(&(topic.len() as u32).to_be_bytes());
        frame.extend_from_slice(topic.as_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    fn send_auth(&mut self, secret: &str) -> std::io::Result<()> {
        let mut frame = Vec::with_capacity(1 + 4 + secret.len());
        frame.push(FRAME_AUTH);
        frame.extend_from_slice(&(secret.len() as u32).to_be_bytes());
        frame.extend_from_slice(secret.as_bytes());
        self.write_frame(&frame)
    }

    fn write_frame(&mut self, frame: &[u8]) -> std::io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no broker connection",
            ));
        };
        stream.write_all(frame)?;
        stream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream as StdStream};

    fn read_frame(stream: &mut StdStream) -> (u8, Vec<u8>, Vec<u8>) {
        let mut kind = [0u8; 1];
        stream.read_exact(&mut kind).unwrap();
        let mut len = [0u8; 4];
        stream.read_exact(&mut len).unwrap();
        let mut first = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut first).unwrap();
        if kind[0] == FRAME_AUTH {
            return (kind[0], first, Vec::new());
        }
        stream.read_exact(&mut len).unwrap();
        let mut second = vec![0u8; u32::from_be_bytes(len) as usize];
        stream.read_exact(&mut second).unwrap();
        (kind[0], first, second)
    }

    #[test]
    fn test_publish_frames_topic_and_body() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let config = SinkConfig {
            compression: false,
            ..SinkConfig::default()
        };
        let sink = TcpSink::connect(&addr, config).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (done_tx, done_rx) = unbounded();
        sink.publish_async("events", b"payload bytes", done_tx).unwrap();

        let (kind, topic, payload) = read_frame(&mut server);
        assert_eq!(kind, FRAME_PUBLISH);
        assert_eq!(topic, b"events");
        assert_eq!(payload, b"payload bytes");

        let transaction = done_rx.recv().unwrap();
        assert_eq!(transaction.topic, "events");
        assert_eq!(transaction.body_len, b"payload bytes".len());
        assert!(transaction.error.is_none());

        sink.stop();
    }

    #[test]
    fn test_compressed_body_roundtrips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let sink = TcpSink::connect(&addr, SinkConfig::default()).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (done_tx, done_rx) = unbounded();
        sink.publish_async("events", b"compress me", done_tx).unwrap();

        let (_, _, payload) = read_frame(&mut server);
        let mut decoder = GzDecoder::new(payload.as_slice());
        let mut body = Vec::new();
        decoder.read_to_end(&mut body).unwrap();
        assert_eq!(body, b"compress me");

        assert!(done_rx.recv().unwrap().error.is_none());
        sink.stop();
    }

    #[test]
    fn test_auth_frame_sent_before_publishes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let config = SinkConfig {
            compression: false,
            ..SinkConfig::default()
        }
        .with_auth_secret("hunter2");
        let sink = TcpSink::connect(&addr, config).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (kind, secret, _) = read_frame(&mut server);
        assert_eq!(kind, FRAME_AUTH);
        assert_eq!(secret, b"hunter2");

        let (done_tx, _done_rx) = unbounded();
        sink.publish_async("events", b"x", done_tx).unwrap();
        let (kind, _, _) = read_frame(&mut server);
        assert_eq!(kind, FRAME_PUBLISH);

        sink.stop();
    }

    #[test]
    fn test_empty_secret_sends_no_auth_frame() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let config = SinkConfig {
            compression: false,
            ..SinkConfig::default()
        }
        .with_auth_secret("");
        let sink = TcpSink::connect(&addr, config).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let (done_tx, _done_rx) = unbounded();
        sink.publish_async("events", b"x", done_tx).unwrap();

        // First frame on the wire is the publish itself.
        let (kind, topic, _) = read_frame(&mut server);
        assert_eq!(kind, FRAME_PUBLISH);
        assert_eq!(topic, b"events");

        sink.stop();
    }

    #[test]
    fn test_connect_refused_is_construction_error() {
        // Bind then drop to get an address nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        assert!(TcpSink::connect(&addr, SinkConfig::default()).is_err());
    }

    #[test]
    fn test_publish_after_stop_is_terminal() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let sink = TcpSink::connect(&addr, SinkConfig::default()).unwrap();
        sink.stop();

        let (done_tx, _done_rx) = unbounded();
        assert_eq!(
            sink.publish_async("events", b"x", done_tx),
            Err(PublishError::Stopped)
        );
    }
}
