//! Ready-made retry predicates
//!
//! Pass these to [`RequestOptions::should_retry`](crate::RequestOptions::should_retry).

use crate::types::ResponseOrError;

/// True for 503 and 504 responses, never for transport errors
pub fn is_5xx(candidate: ResponseOrError<'_>) -> bool {
    matches!(candidate.status(), Some(503) | Some(504))
}

/// True for any transport error, whatever it is
pub fn is_network_error(candidate: ResponseOrError<'_>) -> bool {
    matches!(candidate, ResponseOrError::Error(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{TransportError, TransportResponse};
    use reqwest::header::HeaderMap;

    fn response(status: u16) -> TransportResponse {
        TransportResponse::from_bytes(status, HeaderMap::new(), "")
    }

    #[test]
    fn test_is_5xx() {
        assert!(is_5xx(ResponseOrError::Response(&response(503))));
        assert!(is_5xx(ResponseOrError::Response(&response(504))));

        assert!(!is_5xx(ResponseOrError::Response(&response(500))));
        assert!(!is_5xx(ResponseOrError::Response(&response(502))));
        assert!(!is_5xx(ResponseOrError::Response(&response(200))));
        assert!(!is_5xx(ResponseOrError::Response(&response(404))));

        let err = TransportError::Other("ECONNRESET".to_string());
        assert!(!is_5xx(ResponseOrError::Error(&err)));
    }

    #[test]
    fn test_is_network_error() {
        let err = TransportError::Timeout;
        assert!(is_network_error(ResponseOrError::Error(&err)));

        let err = TransportError::Redirect { status: 503 };
        assert!(is_network_error(ResponseOrError::Error(&err)));

        assert!(!is_network_error(ResponseOrError::Response(&response(503))));
        assert!(!is_network_error(ResponseOrError::Response(&response(200))));
    }
}
