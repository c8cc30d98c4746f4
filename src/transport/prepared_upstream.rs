use http::header::{HeaderName, HeaderValue, CONTENT_TYPE, COOKIE, ORIGIN, REFERER, USER_AGENT};
use http::HeaderMap;

use crate::config::UpstreamConfig;
use crate::error::RelayError;

const X_XAI_REQUEST_ID: HeaderName = HeaderName::from_static("x-xai-request-id");
const X_STATSIG_ID: HeaderName = HeaderName::from_static("x-statsig-id");

const CONVERSATIONS_PATH: [&str; 3] = ["rest", "app-chat", "conversations"];

/// Which conversation resource a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamEndpoint<'a> {
    NewConversation,
    Responses { conversation_id: &'a str },
}

/// Upstream URLs and headers computed once from configuration.
#[derive(Debug, Clone)]
pub struct PreparedUpstream {
    base_url: url::Url,
    new_conversation_url: url::Url,
    static_headers: HeaderMap,
    fallback_cookie: Option<HeaderValue>,
}

fn config_err(field: &str, err: impl std::fmt::Display) -> RelayError {
    RelayError::Config(format!("{field}: {err}"))
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue, RelayError> {
    HeaderValue::from_str(value).map_err(|err| config_err(field, err))
}

impl PreparedUpstream {
    /// Build the prepared upstream from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] when the base URL or a header value is unusable.
    pub fn new(upstream: &UpstreamConfig) -> Result<Self, RelayError> {
        let base_url = url::Url::parse(upstream.trimmed_base_url())
            .map_err(|err| config_err("upstream.base_url", err))?;
        let new_conversation_url = join_segments(&base_url, &["new"])?;

        let mut static_headers = HeaderMap::with_capacity(8);
        static_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        static_headers.insert(
            USER_AGENT,
            header_value("upstream.user_agent", &upstream.user_agent)?,
        );
        static_headers.insert(
            ORIGIN,
            header_value("upstream.origin", &upstream.effective_origin())?,
        );
        static_headers.insert(
            REFERER,
            header_value("upstream.referer", &upstream.effective_referer())?,
        );
        if let Some(statsig_id) = upstream.statsig_id.as_deref().filter(|s| !s.is_empty()) {
            static_headers.insert(X_STATSIG_ID, header_value("upstream.statsig_id", statsig_id)?);
        }

        let fallback_cookie = upstream
            .fallback_cookie()
            .map(|cookie| header_value("upstream.cookie", cookie))
            .transpose()?;

        Ok(Self {
            base_url,
            new_conversation_url,
            static_headers,
            fallback_cookie,
        })
    }

    /// Absolute URL for `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Internal`] if the base URL cannot carry path segments.
    pub fn endpoint_url(&self, endpoint: UpstreamEndpoint<'_>) -> Result<url::Url, RelayError> {
        match endpoint {
            UpstreamEndpoint::NewConversation => Ok(self.new_conversation_url.clone()),
            UpstreamEndpoint::Responses { conversation_id } => {
                join_segments(&self.base_url, &[conversation_id, "responses"])
            }
        }
    }

    /// Cookie header for this request: the caller's own, else the configured fallback.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidRequest`] for a cookie that is not a valid header value,
    /// or [`RelayError::Config`] when neither source provides one.
    pub fn resolve_cookie(&self, credential: Option<&str>) -> Result<HeaderValue, RelayError> {
        if let Some(cookie) = credential.map(str::trim).filter(|c| !c.is_empty()) {
            return HeaderValue::from_str(cookie).map_err(|_| {
                RelayError::InvalidRequest("cookie contains invalid header characters".into())
            });
        }
        self.fallback_cookie.clone().ok_or_else(|| {
            RelayError::Config(
                "no cookie supplied and no fallback configured (set GROK_COOKIE or upstream.cookie)"
                    .into(),
            )
        })
    }

    /// Full header set for one upstream call.
    #[must_use]
    pub fn request_headers(&self, cookie: HeaderValue, request_id: uuid::Uuid) -> HeaderMap {
        let mut headers = self.static_headers.clone();
        headers.insert(COOKIE, cookie);
        let mut id_buf = uuid::Uuid::encode_buffer();
        let id = request_id.hyphenated().encode_lower(&mut id_buf);
        if let Ok(value) = HeaderValue::from_str(id) {
            headers.insert(X_XAI_REQUEST_ID, value);
        }
        headers
    }
}

fn join_segments(base: &url::Url, tail: &[&str]) -> Result<url::Url, RelayError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| RelayError::Internal(format!("base URL '{base}' cannot have a path")))?
        .pop_if_empty()
        .extend(CONVERSATIONS_PATH)
        .extend(tail);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prepared(base_url: &str, cookie: &str) -> PreparedUpstream {
        PreparedUpstream::new(&UpstreamConfig {
            base_url: base_url.into(),
            cookie: cookie.into(),
            ..UpstreamConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_urls() {
        let upstream = prepared("https://grok.example.com/", "");
        assert_eq!(
            upstream
                .endpoint_url(UpstreamEndpoint::NewConversation)
                .unwrap()
                .as_str(),
            "https://grok.example.com/rest/app-chat/conversations/new"
        );
        assert_eq!(
            upstream
                .endpoint_url(UpstreamEndpoint::Responses {
                    conversation_id: "c1"
                })
                .unwrap()
                .as_str(),
            "https://grok.example.com/rest/app-chat/conversations/c1/responses"
        );
    }

    #[test]
    fn test_conversation_id_is_one_path_segment() {
        let upstream = prepared("http://127.0.0.1:9000/prefix", "");
        let url = upstream
            .endpoint_url(UpstreamEndpoint::Responses {
                conversation_id: "a/b?c",
            })
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9000/prefix/rest/app-chat/conversations/a%2Fb%3Fc/responses"
        );
    }

    #[test]
    fn test_cookie_resolution_prefers_request() {
        let upstream = prepared("https://grok.example.com", "fallback=1");
        assert_eq!(upstream.resolve_cookie(Some("mine=2")).unwrap(), "mine=2");
        assert_eq!(upstream.resolve_cookie(Some("  ")).unwrap(), "fallback=1");
        assert_eq!(upstream.resolve_cookie(None).unwrap(), "fallback=1");
    }

    #[test]
    fn test_missing_cookie_is_config_error() {
        let upstream = prepared("https://grok.example.com", "");
        assert!(matches!(
            upstream.resolve_cookie(None),
            Err(RelayError::Config(_))
        ));
        assert!(matches!(
            upstream.resolve_cookie(Some("bad\ncookie")),
            Err(RelayError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_headers() {
        let upstream = prepared("https://grok.example.com", "");
        let headers = upstream.request_headers(
            HeaderValue::from_static("k=v"),
            uuid::Uuid::from_u128(0x1234),
        );
        assert_eq!(headers[CONTENT_TYPE], "application/json");
        assert_eq!(headers[COOKIE], "k=v");
        assert_eq!(headers[ORIGIN], "https://grok.example.com");
        assert_eq!(headers[REFERER], "https://grok.example.com/");
        assert!(headers[USER_AGENT].to_str().unwrap().starts_with("Mozilla/5.0"));
        assert_eq!(
            headers["x-xai-request-id"],
            "00000000-0000-0000-0000-000000001234"
        );
        assert!(headers.get("x-statsig-id").is_none());
    }
}
