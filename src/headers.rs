//! Delivery headers GitHub attaches to every webhook request

use axum::http::{HeaderMap, StatusCode};

use crate::error::{ERROR_PREFIX, HandlerError};
use crate::event::EventName;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";
pub const SIGNATURE_SHA256_HEADER: &str = "x-hub-signature-256";
pub const SIGNATURE_SHA1_HEADER: &str = "x-hub-signature";

/// Required headers that are absent, in check order.
///
/// Either signature header satisfies the signature requirement; when both are
/// absent it is reported under the SHA-256 name.
pub fn missing_headers(headers: &HeaderMap) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if !headers.contains_key(EVENT_HEADER) {
        missing.push(EVENT_HEADER);
    }
    if !headers.contains_key(SIGNATURE_SHA256_HEADER) && !headers.contains_key(SIGNATURE_SHA1_HEADER)
    {
        missing.push(SIGNATURE_SHA256_HEADER);
    }
    if !headers.contains_key(DELIVERY_HEADER) {
        missing.push(DELIVERY_HEADER);
    }
    missing
}

pub fn missing_headers_error(missing: &[&str]) -> HandlerError {
    HandlerError::with_status(
        StatusCode::BAD_REQUEST,
        format!(
            "{} Required headers missing: {}",
            ERROR_PREFIX,
            missing.join(", ")
        ),
    )
}

/// Who sent what: the identity of one delivery, taken from its headers.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryIdentity {
    pub event: EventName,
    pub id: String,
    pub signature: String,
}

impl DeliveryIdentity {
    /// Expects `missing_headers` to have come back empty.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, HandlerError> {
        let event_value = header_str(headers, EVENT_HEADER)?;
        let event = event_value.parse::<EventName>().map_err(|e| {
            HandlerError::with_status(StatusCode::BAD_REQUEST, format!("{} {}", ERROR_PREFIX, e))
        })?;
        let id = header_str(headers, DELIVERY_HEADER)?.to_string();

        // Prefer the stronger digest; an empty SHA-256 value counts as absent.
        let sha256 = match headers.get(SIGNATURE_SHA256_HEADER) {
            Some(_) => header_str(headers, SIGNATURE_SHA256_HEADER)?,
            None => "",
        };
        let signature = if sha256.is_empty() && headers.contains_key(SIGNATURE_SHA1_HEADER) {
            header_str(headers, SIGNATURE_SHA1_HEADER)?
        } else {
            sha256
        };
        let signature = signature.to_string();

        Ok(Self {
            event,
            id,
            signature,
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, HandlerError> {
    let value = headers.get(name).ok_or_else(|| missing_headers_error(&[name]))?;
    value.to_str().map_err(|_| {
        HandlerError::with_status(
            StatusCode::BAD_REQUEST,
            format!("{} Header {} is not valid UTF-8", ERROR_PREFIX, name),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn full_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(EVENT_HEADER, HeaderValue::from_static("push"));
        headers.insert(DELIVERY_HEADER, HeaderValue::from_static("72d3162e"));
        headers.insert(SIGNATURE_SHA256_HEADER, HeaderValue::from_static("sha256=aa"));
        headers.insert(SIGNATURE_SHA1_HEADER, HeaderValue::from_static("sha1=bb"));
        headers
    }

    #[test]
    fn test_nothing_missing() {
        assert!(missing_headers(&full_headers()).is_empty());
    }

    #[test]
    fn test_missing_in_check_order() {
        let headers = HeaderMap::new();
        assert_eq!(
            missing_headers(&headers),
            vec![EVENT_HEADER, SIGNATURE_SHA256_HEADER, DELIVERY_HEADER]
        );
        assert_eq!(
            missing_headers_error(&missing_headers(&headers)).message,
            "[webhook-gate] Required headers missing: x-github-event, x-hub-signature-256, x-github-delivery"
        );
    }

    #[test]
    fn test_either_signature_header_is_enough() {
        let mut headers = full_headers();
        headers.remove(SIGNATURE_SHA256_HEADER);
        assert!(missing_headers(&headers).is_empty());

        let mut headers = full_headers();
        headers.remove(SIGNATURE_SHA1_HEADER);
        assert!(missing_headers(&headers).is_empty());

        headers.remove(SIGNATURE_SHA256_HEADER);
        assert_eq!(missing_headers(&headers), vec![SIGNATURE_SHA256_HEADER]);
    }

    #[test]
    fn test_identity_prefers_sha256() {
        let identity = DeliveryIdentity::from_headers(&full_headers()).unwrap();
        assert_eq!(identity.event, EventName::Push);
        assert_eq!(identity.id, "72d3162e");
        assert_eq!(identity.signature, "sha256=aa");
    }

    #[test]
    fn test_identity_falls_back_to_sha1() {
        let mut headers = full_headers();
        headers.remove(SIGNATURE_SHA256_HEADER);
        let identity = DeliveryIdentity::from_headers(&headers).unwrap();
        assert_eq!(identity.signature, "sha1=bb");
    }

    #[test]
    fn test_identity_empty_sha256_falls_back_to_sha1() {
        let mut headers = full_headers();
        headers.insert(SIGNATURE_SHA256_HEADER, HeaderValue::from_static(""));
        let identity = DeliveryIdentity::from_headers(&headers).unwrap();
        assert_eq!(identity.signature, "sha1=bb");

        // Nothing to fall back to: the empty value goes on to fail verification.
        headers.remove(SIGNATURE_SHA1_HEADER);
        let identity = DeliveryIdentity::from_headers(&headers).unwrap();
        assert_eq!(identity.signature, "");
    }

    #[test]
    fn test_identity_rejects_unknown_event() {
        let mut headers = full_headers();
        headers.insert(EVENT_HEADER, HeaderValue::from_static("teleport"));
        let error = DeliveryIdentity::from_headers(&headers).unwrap_err();
        assert_eq!(error.status, Some(StatusCode::BAD_REQUEST));
        assert!(error.message.contains("teleport"));
    }

    #[test]
    fn test_identity_rejects_non_utf8() {
        let mut headers = full_headers();
        headers.insert(
            DELIVERY_HEADER,
            HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap(),
        );
        let error = DeliveryIdentity::from_headers(&headers).unwrap_err();
        assert!(error.message.contains(DELIVERY_HEADER));
    }
}
