//! W3C trace-context headers for outgoing bootstrap requests.

use opentelemetry::trace::TraceContextExt;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Copy the current span's context into `traceparent` / `tracestate`.
///
/// Leaves `headers` untouched when no valid OpenTelemetry context is active.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    if !span_context.is_valid() {
        return;
    }

    let traceparent = format!(
        "00-{}-{}-{:02x}",
        span_context.trace_id(),
        span_context.span_id(),
        span_context.trace_flags().to_u8()
    );
    if let Ok(value) = HeaderValue::from_str(&traceparent) {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = span_context.trace_state().header();
    if tracestate.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&tracestate) {
        headers.insert(TRACESTATE_HEADER, value);
    }
}

/// Headers for one bootstrap attempt: trace context plus request id.
pub fn outgoing_headers(request_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    inject_trace_context(&mut headers);

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_trace_headers_without_active_span() {
        let mut headers = HeaderMap::new();
        inject_trace_context(&mut headers);
        assert!(headers.is_empty());
    }

    #[test]
    fn test_outgoing_headers_carry_request_id() {
        let headers = outgoing_headers("req-42");
        assert_eq!(
            headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
            Some("req-42")
        );
        assert!(headers.get(TRACEPARENT_HEADER).is_none());
    }
}
