//! Event stream ingest with auto-reconnect.
//!
//! Opens a long-lived `text/event-stream` GET through the router, splits the
//! body into newline-terminated frames, decodes every `data:` payload into a
//! typed resource and hands it to the caller's handler, synchronously, in wire
//! order. When the connection fails or ends, the loop opens a new one.
//!
//! # Example
//!
//! ```rust,ignore
//! use nestly_api::{Client, ReconnectConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! client
//!     .devices_stream()
//!     .with_reconnect(ReconnectConfig::exponential())
//!     .run(cancel.clone(), |update| match update {
//!         Ok(devices) => println!("{} thermostats", devices.thermostats.len()),
//!         Err(e) => eprintln!("stream error: {e}"),
//!     })
//!     .await;
//! ```

use std::marker::PhantomData;
use std::time::Duration;

use bytes::BytesMut;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::client::Client;
use crate::error::{ApiError, ErrorKind};
use crate::models::{Devices, Resource, Structures};
use crate::router::{Delivery, Route};

/// Longest unterminated line kept while waiting for its newline.
pub const DEFAULT_MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Delay policy between stream connection attempts.
///
/// The default reconnects immediately and forever. [`exponential`](Self::exponential)
/// opts into backoff; `max_retries` bounds consecutive failed connects.
#[derive(Debug, Clone, Default)]
pub struct ReconnectConfig {
    /// Delay before the first retry after a failed connect. Zero disables backoff.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay.
    pub max_delay: Duration,

    /// Consecutive failed connects tolerated before the loop gives up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl ReconnectConfig {
    /// Reconnect without delay, forever.
    pub fn immediate() -> Self {
        Self::default()
    }

    /// Exponential backoff from 1s up to 30s, forever.
    pub fn exponential() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Delay to wait after the `attempt`-th consecutive failure (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        calculate_backoff(attempt, self)
    }
}

// ── Event envelope ───────────────────────────────────────────────────

/// One decoded `data:` frame: `{"path": "/devices", "data": {...}}`.
#[derive(Debug, Deserialize)]
pub struct StreamEvent<T> {
    #[serde(default)]
    pub path: Option<String>,
    pub data: Option<T>,
}

// ── EventStream ──────────────────────────────────────────────────────

type MalformedFrameHook = Box<dyn FnMut(&str, &serde_json::Error) + Send>;

/// A configured, not yet running, event stream for resource `R`.
///
/// Built by [`Client::devices_stream`], [`Client::structures_stream`] or
/// [`Client::stream`]; started with [`run`](Self::run).
pub struct EventStream<R> {
    client: Client,
    reconnect: ReconnectConfig,
    max_frame_len: usize,
    on_malformed: Option<MalformedFrameHook>,
    _resource: PhantomData<fn() -> R>,
}

impl Client {
    /// Stream of `/devices` updates.
    pub fn devices_stream(&self) -> EventStream<Devices> {
        self.stream()
    }

    /// Stream of `/structures` updates.
    pub fn structures_stream(&self) -> EventStream<Structures> {
        self.stream()
    }

    /// Stream of updates for any [`Resource`].
    pub fn stream<R: Resource>(&self) -> EventStream<R> {
        EventStream {
            client: self.clone(),
            reconnect: ReconnectConfig::default(),
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            on_malformed: None,
            _resource: PhantomData,
        }
    }
}

/// How one connection ended without a connect error.
enum Disconnect {
    Cancelled,
    Ended,
}

impl<R: Resource> EventStream<R> {
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Cap the length of a single line. A connection whose pending line
    /// grows past `bytes` without a newline is dropped and reported as a
    /// `body_read_error`.
    pub fn with_max_frame_len(mut self, bytes: usize) -> Self {
        self.max_frame_len = bytes;
        self
    }

    /// Observe frames whose payload fails to decode.
    ///
    /// Such frames are always skipped; without a hook they are only
    /// visible at `trace` level.
    pub fn on_malformed_frame(
        mut self,
        hook: impl FnMut(&str, &serde_json::Error) + Send + 'static,
    ) -> Self {
        self.on_malformed = Some(Box::new(hook));
        self
    }

    /// Run the ingest loop until `cancel` fires.
    ///
    /// Decoded updates arrive as `handler(Ok(resource))` on this task; the
    /// next frame is not read until the handler returns. A failed connect
    /// or an oversized line is reported once as `handler(Err(e))` and
    /// followed by a reconnect. Read errors and end-of-stream reconnect
    /// silently.
    ///
    /// Returns only when cancelled, or when `max_retries` consecutive
    /// connects have failed.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut handler: F)
    where
        F: FnMut(Result<R, ApiError>) + Send,
    {
        if self.client.session().discovered_url().is_none() {
            let probe_route = Route::get(R::PATH, Delivery::Snapshot);
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                probe = self.client.router().send(&probe_route) => {
                    match probe {
                        Ok(resp) => debug!(status = %resp.status(), "endpoint probe answered"),
                        Err(e) => debug!(error = %e, "endpoint probe failed"),
                    }
                }
            }
        }

        let mut attempt: u32 = 0;

        loop {
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                outcome = self.connect_and_read(&cancel, &mut handler) => outcome,
            };

            match outcome {
                Ok(Disconnect::Cancelled) => break,
                Ok(Disconnect::Ended) => {
                    info!(path = R::PATH, "event stream ended, reconnecting");
                    attempt = 0;
                }
                Err(e) => {
                    warn!(error = %e, attempt, path = R::PATH, "event stream failed");
                    handler(Err(e));

                    if cancel.is_cancelled() {
                        break;
                    }
                    if self.reconnect.max_retries.is_some_and(|max| attempt >= max) {
                        error!(attempt, "event stream reconnection limit reached, giving up");
                        break;
                    }

                    let delay = self.reconnect.delay_for(attempt);
                    attempt += 1;

                    if !delay.is_zero() {
                        debug!(delay_ms = delay.as_millis(), attempt, "waiting before reconnect");
                        tokio::select! {
                            biased;
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(delay) => {}
                        }
                    }
                }
            }
        }

        debug!(path = R::PATH, "event stream loop exiting");
    }

    /// Open one streaming connection and pump frames until it drops.
    async fn connect_and_read<F>(
        &mut self,
        cancel: &CancellationToken,
        handler: &mut F,
    ) -> Result<Disconnect, ApiError>
    where
        F: FnMut(Result<R, ApiError>) + Send,
    {
        let mut resp = self
            .client
            .router()
            .send(&Route::get(R::PATH, Delivery::Stream))
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::from_response_body(ErrorKind::Devices, status, &body));
        }

        info!(url = %resp.url(), "event stream connected");

        let mut decoder = FrameDecoder::new(self.max_frame_len);

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Disconnect::Cancelled),
                chunk = resp.chunk() => chunk,
            };

            match chunk {
                Ok(Some(bytes)) => decoder.extend(&bytes),
                Ok(None) => {
                    debug!("event stream closed by server");
                    return Ok(Disconnect::Ended);
                }
                Err(e) => {
                    debug!(error = %e, "event stream read failed");
                    return Ok(Disconnect::Ended);
                }
            }

            while let Some(line) = decoder.next_line() {
                if let Some(resource) = self.decode_frame(&line) {
                    handler(Ok(resource));
                    if cancel.is_cancelled() {
                        return Ok(Disconnect::Cancelled);
                    }
                }
            }

            if decoder.overflowed() {
                return Err(ApiError::new(
                    ErrorKind::BodyRead,
                    format!("event stream line exceeds {} bytes", self.max_frame_len),
                ));
            }
        }
    }

    /// Decode one line into a resource, or `None` if it carries nothing.
    fn decode_frame(&mut self, line: &str) -> Option<R> {
        let payload = data_payload(line)?;

        match serde_json::from_str::<Option<StreamEvent<R>>>(payload) {
            Ok(Some(StreamEvent {
                data: Some(mut resource),
                ..
            })) => {
                resource.attach_session(self.client.handle());
                Some(resource)
            }
            Ok(event) => {
                trace!(path = ?event.and_then(|e| e.path), "frame without payload");
                None
            }
            Err(e) => {
                trace!(error = %e, "discarding undecodable frame");
                if let Some(hook) = self.on_malformed.as_mut() {
                    hook(payload, &e);
                }
                None
            }
        }
    }
}

// ── Frame parsing ────────────────────────────────────────────────────

/// Splits a byte stream into `\n`-terminated lines.
///
/// An unterminated tail stays buffered until more bytes arrive; if the
/// connection ends first it is dropped with the decoder. Bytes already
/// searched for a newline are not searched again.
#[derive(Debug)]
struct FrameDecoder {
    buf: BytesMut,
    scanned: usize,
    max_line: usize,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

impl FrameDecoder {
    fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            scanned: 0,
            max_line,
        }
    }

    fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|&b| b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let pos = self.scanned + offset;
        self.scanned = 0;
        let raw = self.buf.split_to(pos + 1);
        let mut line = &raw[..pos];
        if let [rest @ .., b'\r'] = line {
            line = rest;
        }
        Some(String::from_utf8_lossy(line).into_owned())
    }

    /// Whether the pending unterminated line is longer than allowed.
    fn overflowed(&self) -> bool {
        self.buf.len() > self.max_line
    }
}

/// The JSON payload of a `data:` line, or `None` for any other line.
///
/// The field name is everything before the first `:`; exactly one space
/// after the colon is stripped. Blank lines, comments and other fields
/// (`event:`, `id:`, `retry:`) yield `None`, as does an empty payload.
pub fn data_payload(line: &str) -> Option<&str> {
    let (field, value) = line.split_once(':').unwrap_or((line, ""));
    if field != "data" {
        return None;
    }
    let value = value.strip_prefix(' ').unwrap_or(value);
    (!value.is_empty()).then_some(value)
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 25%)`
///
/// A zero `initial_delay` means no delay at all. The jitter is seeded from
/// the attempt number so tests are deterministic.
fn calculate_backoff(attempt: u32, config: &ReconnectConfig) -> Duration {
    if config.initial_delay.is_zero() {
        return Duration::ZERO;
    }

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::try_from_secs_f64(with_jitter).unwrap_or(config.max_delay)
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn default_reconnect_is_immediate_and_unbounded() {
        let config = ReconnectConfig::default();
        assert!(config.max_retries.is_none());
        for attempt in [0, 1, 5, 1000] {
            assert_eq!(config.delay_for(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn backoff_increases_exponentially() {
        let config = ReconnectConfig::exponential();

        let d0 = config.delay_for(0);
        let d1 = config.delay_for(1);
        let d2 = config.delay_for(2);

        assert!(d1 > d0, "d1 ({d1:?}) should be greater than d0 ({d0:?})");
        assert!(d2 > d1, "d2 ({d2:?}) should be greater than d1 ({d1:?})");
    }

    #[test]
    fn backoff_caps_at_max_delay() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            max_retries: None,
        };

        // With jitter factor up to 1.25, max effective is 12.5s
        for attempt in [10, 64, u32::MAX] {
            let d = config.delay_for(attempt);
            assert!(d <= Duration::from_millis(12_500), "attempt {attempt}: {d:?}");
        }
    }

    #[test]
    fn data_payload_extracts_data_fields_only() {
        assert_eq!(data_payload(r#"data: {"path":"/devices"}"#), Some(r#"{"path":"/devices"}"#));
        assert_eq!(data_payload("data:{}"), Some("{}"));
        // Only one leading space is stripped.
        assert_eq!(data_payload("data:  {}"), Some(" {}"));
        // Colons inside the payload belong to the payload.
        assert_eq!(data_payload(r#"data: {"a":"b:c"}"#), Some(r#"{"a":"b:c"}"#));

        assert_eq!(data_payload("event: put"), None);
        assert_eq!(data_payload("id: 42"), None);
        assert_eq!(data_payload(": keep-alive"), None);
        assert_eq!(data_payload(""), None);
        assert_eq!(data_payload("data"), None);
        assert_eq!(data_payload("data: "), None);
        assert_eq!(data_payload("metadata: {}"), None);
    }

    #[test]
    fn frame_decoder_handles_split_chunks() {
        let mut decoder = FrameDecoder::default();

        decoder.extend(b"event: put\ndata: {\"pa");
        assert_eq!(decoder.next_line().as_deref(), Some("event: put"));
        assert_eq!(decoder.next_line(), None);

        decoder.extend(b"th\":\"/devices\"}\r\n\n");
        assert_eq!(decoder.next_line().as_deref(), Some(r#"data: {"path":"/devices"}"#));
        assert_eq!(decoder.next_line().as_deref(), Some(""));
        assert_eq!(decoder.next_line(), None);
    }

    #[test]
    fn frame_decoder_keeps_unterminated_tail() {
        let mut decoder = FrameDecoder::default();
        decoder.extend(b"data: {}");
        assert_eq!(decoder.next_line(), None);
        decoder.extend(b"\n");
        assert_eq!(decoder.next_line().as_deref(), Some("data: {}"));
    }

    #[test]
    fn frame_decoder_joins_a_line_split_over_many_chunks() {
        let payload = "x".repeat(64 * 1024);
        let line = format!("data: \"{payload}\"");
        let mut decoder = FrameDecoder::default();

        for piece in line.as_bytes().chunks(100) {
            decoder.extend(piece);
            assert_eq!(decoder.next_line(), None);
            assert!(!decoder.overflowed());
        }
        assert_eq!(decoder.scanned, line.len());

        decoder.extend(b"\ndata: {}\n");
        assert_eq!(decoder.next_line(), Some(line));
        assert_eq!(decoder.next_line().as_deref(), Some("data: {}"));
        assert_eq!(decoder.next_line(), None);
        assert_eq!(decoder.scanned, 0);
    }

    #[test]
    fn frame_decoder_flags_an_oversized_tail() {
        let mut decoder = FrameDecoder::new(16);

        decoder.extend(b"data: {}\ndata: 0123456789");
        assert_eq!(decoder.next_line().as_deref(), Some("data: {}"));
        assert_eq!(decoder.next_line(), None);
        assert!(!decoder.overflowed());

        decoder.extend(b"abc");
        assert_eq!(decoder.next_line(), None);
        assert!(decoder.overflowed());
    }

    #[test]
    fn stream_event_with_null_data() {
        let event: StreamEvent<Devices> =
            serde_json::from_str(r#"{"path":"/devices","data":null}"#).unwrap();
        assert_eq!(event.path.as_deref(), Some("/devices"));
        assert!(event.data.is_none());

        let event: StreamEvent<Structures> = serde_json::from_str(r#"{"path":"/structures"}"#).unwrap();
        assert!(event.data.is_none());
    }
}
