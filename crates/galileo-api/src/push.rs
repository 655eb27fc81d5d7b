// Push channel
//
// A `PushSource` performs one handshake and yields a stream of raw push
// messages. Reconnection is the consumer's job (the sync engine in
// `galileo-core`), driven by `ReconnectConfig` and `backoff_delay`.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use secrecy::ExposeSecret;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tracing::{debug, info, trace};
use url::Url;

use crate::auth::{Credential, TokenStore};
use crate::error::Error;

// ── Signals ──────────────────────────────────────────────────────────

/// One item read from the push channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PushSignal {
    /// A decoded JSON message, `{"event": ..., "sequence": ..., "data": ...}`.
    Event(serde_json::Value),
    /// The channel dropped. No further items follow.
    Disconnected { reason: String },
}

/// Stream of push signals for one connection. Ending without a
/// `Disconnected` item also means the connection is gone.
pub type PushStream = Pin<Box<dyn Stream<Item = PushSignal> + Send>>;

/// Opens push-channel connections.
#[async_trait]
pub trait PushSource: Send + Sync {
    /// Perform the handshake. Errors mean no connection was established.
    async fn connect(&self) -> Result<PushStream, Error>;
}

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Exponential backoff configuration for reconnection and resync retries.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Upper bound on backoff delay. Default: 30s.
    pub max_delay: Duration,

    /// Maximum consecutive failed handshakes before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_retries: None,
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// The jitter is derived from the attempt number, so it is deterministic
/// per attempt but still spreads clients that fail at different times.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.min(30) as i32;
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    Duration::from_secs_f64((capped * jitter_factor).max(0.0))
}

// ── WebSocketPushSource ──────────────────────────────────────────────

/// [`PushSource`] over a WebSocket at `<origin>/galileo/user_interface/v1/events`,
/// authenticated with the bearer header.
#[derive(Debug, Clone)]
pub struct WebSocketPushSource {
    url: Url,
    tokens: Arc<TokenStore>,
}

impl WebSocketPushSource {
    pub fn new(tokens: Arc<TokenStore>) -> Result<Self, Error> {
        let url = tokens.base().push_url()?;
        Ok(Self { url, tokens })
    }

    /// Connect to an explicit URL instead of the one derived from the backend.
    pub fn with_url(url: Url, tokens: Arc<TokenStore>) -> Self {
        Self { url, tokens }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn handshake(
        &self,
        credential: &Credential,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        tungstenite::Error,
    > {
        let uri: tungstenite::http::Uri = self
            .url
            .as_str()
            .parse()
            .map_err(|e: tungstenite::http::uri::InvalidUri| {
                tungstenite::Error::Url(tungstenite::error::UrlError::UnableToConnect(
                    e.to_string(),
                ))
            })?;

        let request = ClientRequestBuilder::new(uri).with_header(
            "Authorization",
            format!("Bearer {}", credential.access_token().expose_secret()),
        );
        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        Ok(ws)
    }
}

#[async_trait]
impl PushSource for WebSocketPushSource {
    async fn connect(&self) -> Result<PushStream, Error> {
        info!(url = %self.url, "connecting to push channel");
        let credential = self.tokens.current_for_request().await?;

        let ws = match self.handshake(&credential).await {
            Ok(ws) => ws,
            Err(tungstenite::Error::Http(resp)) if resp.status().as_u16() == 401 => {
                debug!("push handshake rejected with 401, refreshing credential");
                let fresh = self.tokens.refresh_stale(&credential).await?;
                match self.handshake(&fresh).await {
                    Ok(ws) => ws,
                    Err(tungstenite::Error::Http(resp)) if resp.status().as_u16() == 401 => {
                        return Err(Error::Unauthorized);
                    }
                    Err(e) => return Err(Error::PushConnect(e.to_string())),
                }
            }
            Err(e) => return Err(Error::PushConnect(e.to_string())),
        };
        info!("push channel connected");

        let mut ws = ws;
        let stream = async_stream::stream! {
            loop {
                match ws.next().await {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        for message in parse_frame(text.as_bytes()) {
                            yield PushSignal::Event(message);
                        }
                    }
                    Some(Ok(tungstenite::Message::Binary(bytes))) => {
                        for message in parse_frame(&bytes) {
                            yield PushSignal::Event(message);
                        }
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        let reason = frame.map_or_else(
                            || "close frame received".to_owned(),
                            |cf| format!("closed by server ({}): {}", cf.code, cf.reason),
                        );
                        yield PushSignal::Disconnected { reason };
                        break;
                    }
                    Some(Ok(_)) => {
                        // tungstenite answers pings itself
                        trace!("push control frame");
                    }
                    Some(Err(e)) => {
                        yield PushSignal::Disconnected { reason: e.to_string() };
                        break;
                    }
                    None => {
                        yield PushSignal::Disconnected { reason: "stream ended".to_owned() };
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Decode one frame. A frame holds either a single message object or an
/// array of them; anything else is logged and skipped.
fn parse_frame(raw: &[u8]) -> Vec<serde_json::Value> {
    match serde_json::from_slice::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Array(items)) => items,
        Ok(value @ serde_json::Value::Object(_)) => vec![value],
        Ok(other) => {
            debug!(kind = ?other, "ignoring non-object push frame");
            Vec::new()
        }
        Err(e) => {
            debug!(error = %e, "failed to parse push frame");
            Vec::new()
        }
    }
}
