pub mod error_envelope;
pub mod rate_limit;
pub mod security_headers;
pub mod tracing;

pub use error_envelope::error_envelope_middleware;
pub use rate_limit::{IpRateLimiter, create_ip_rate_limiter, ip_rate_limit_middleware};
pub use security_headers::security_headers_middleware;
pub use self::tracing::{
    CORRELATION_ID_HEADER, REQUEST_ID_HEADER, RequestId, make_request_span, request_id_middleware,
};
