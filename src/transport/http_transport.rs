use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::config::ServerConfig;
use crate::error::RelayError;

/// Upper bound on the upstream error body echoed back to clients, in characters.
pub const ERROR_BODY_EXCERPT_CHARS: usize = 500;
/// Bytes read from a non-2xx body; enough for the excerpt in any UTF-8 text.
const ERROR_BODY_READ_LIMIT_BYTES: usize = 2 * 1024;

/// Response body chunks with the idle timeout applied.
pub type UpstreamBody = BoxStream<'static, Result<Bytes, RelayError>>;

fn build_reqwest_client(
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Option<Duration>,
    connect_timeout: Duration,
    use_env_proxy: bool,
) -> Result<reqwest::Client, RelayError> {
    let mut builder = reqwest::Client::builder()
        .pool_max_idle_per_host(pool_max_idle_per_host)
        .pool_idle_timeout(pool_idle_timeout)
        .tcp_nodelay(true)
        .connect_timeout(connect_timeout)
        .redirect(reqwest::redirect::Policy::none());

    if !use_env_proxy {
        builder = builder.no_proxy();
    }

    builder
        .build()
        .map_err(|err| RelayError::Transport(format!("Failed to build HTTP client: {err}")))
}

/// Map a reqwest failure onto the relay taxonomy, keeping timeouts distinct.
#[must_use]
pub fn classify_reqwest_error(err: &reqwest::Error) -> RelayError {
    if err.is_timeout() {
        RelayError::Timeout(format!("upstream timed out: {err}"))
    } else if err.is_connect() {
        RelayError::Transport(format!("failed to connect to upstream: {err}"))
    } else {
        RelayError::Transport(format!("upstream request failed: {err}"))
    }
}

/// Keep at most `max_chars` characters of `text`.
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Read at most `limit` bytes of `body` as lossy UTF-8 and drop the rest.
pub async fn read_body_prefix<S, E>(body: S, limit: usize) -> Result<String, E>
where
    S: futures_util::Stream<Item = Result<Bytes, E>>,
{
    let mut body = std::pin::pin!(body);
    let mut buf = Vec::with_capacity(limit.min(512));
    while buf.len() < limit {
        let Some(chunk) = body.next().await else {
            break;
        };
        let chunk = chunk?;
        let take = (limit - buf.len()).min(chunk.len());
        buf.extend_from_slice(&chunk[..take]);
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Apply `idle` to every poll of `stream`; the first error or timeout ends it.
pub fn with_idle_timeout<S>(stream: S, idle: Duration) -> UpstreamBody
where
    S: futures_util::Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    futures_util::stream::unfold(
        (Box::pin(stream), false),
        move |(mut stream, done)| async move {
            if done {
                return None;
            }
            match tokio::time::timeout(idle, stream.next()).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), (stream, false))),
                Ok(Some(Err(err))) => Some((Err(classify_reqwest_error(&err)), (stream, true))),
                Ok(None) => None,
                Err(_) => Some((
                    Err(RelayError::Timeout(format!(
                        "no data from upstream for {}s",
                        idle.as_secs()
                    ))),
                    (stream, true),
                )),
            }
        },
    )
    .boxed()
}

/// HTTP client for the streaming conversation endpoints.
pub struct HttpTransport {
    client: reqwest::Client,
    idle_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport with connection pooling and timeouts from the given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };
        let client = match build_reqwest_client(
            config.http_pool_max_idle_per_host.max(1),
            pool_idle_timeout,
            Duration::from_secs(config.connect_timeout_secs),
            config.http_use_env_proxy,
        ) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "failed to build configured reqwest client, falling back to default client");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
        }
    }

    /// POST `body` and return the streaming response body.
    ///
    /// Waiting for response headers is bounded by the idle timeout, as is
    /// every later body chunk. Dropping the returned stream closes the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Upstream`] for a non-2xx status (body truncated to
    /// [`ERROR_BODY_EXCERPT_CHARS`]), [`RelayError::Timeout`] on connect or idle
    /// timeout, and [`RelayError::Transport`] for other connection failures.
    pub async fn post_stream(
        &self,
        url: url::Url,
        headers: http::HeaderMap,
        body: Bytes,
    ) -> Result<UpstreamBody, RelayError> {
        let send = self.client.post(url).headers(headers).body(body).send();
        let response = match tokio::time::timeout(self.idle_timeout, send).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(classify_reqwest_error(&err)),
            Err(_) => {
                return Err(RelayError::Timeout(format!(
                    "no response headers from upstream within {}s",
                    self.idle_timeout.as_secs()
                )))
            }
        };

        let status = response.status();
        if !status.is_success() {
            let excerpt = read_body_prefix(response.bytes_stream(), ERROR_BODY_READ_LIMIT_BYTES);
            let text = match tokio::time::timeout(self.idle_timeout, excerpt).await {
                Ok(Ok(text)) => text,
                Ok(Err(err)) => format!("<failed to read error body: {err}>"),
                Err(_) => "<timed out reading error body>".to_string(),
            };
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body: truncate_chars(&text, ERROR_BODY_EXCERPT_CHARS).to_string(),
            });
        }

        Ok(with_idle_timeout(response.bytes_stream(), self.idle_timeout))
    }
}
