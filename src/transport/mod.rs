mod http_transport;
mod prepared_upstream;

pub use http_transport::{
    classify_reqwest_error, truncate_chars, with_idle_timeout, HttpTransport, UpstreamBody,
    ERROR_BODY_EXCERPT_CHARS,
};
pub use prepared_upstream::{PreparedUpstream, UpstreamEndpoint};
