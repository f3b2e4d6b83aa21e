//! Visitor identity derivation.
//!
//! The identity is the first address of an `X-Forwarded-For` style header when
//! one is present, otherwise the address of the connection itself. The string
//! is not parsed as an IP address; it is only a deduplication key.

use crate::{AtlasError, VisitorIdentity};

/// Header conventionally carrying the client address chain behind proxies.
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Find the [`FORWARDED_FOR_HEADER`] value among request headers.
///
/// Header names compare case-insensitively, as HTTP requires.
///
/// ```rust
/// use visitor_atlas::identity::forwarded_for;
///
/// let headers = [("host", "example.org"), ("x-forwarded-for", "203.0.113.7")];
/// assert_eq!(forwarded_for(headers), Some("203.0.113.7"));
/// ```
pub fn forwarded_for<'a, I>(headers: I) -> Option<&'a str>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    headers
        .into_iter()
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(FORWARDED_FOR_HEADER))
        .map(|(_, value)| value)
}

/// Derive a visitor identity from request metadata.
///
/// # Arguments
///
/// * `forwarded_for` - Raw value of the forwarding header, if any
/// * `remote_addr` - Address of the peer that opened the connection, if known
///
/// # Errors
///
/// [`AtlasError::InvalidInput`] when neither source yields a non-empty address.
///
/// # Example
///
/// ```rust
/// use visitor_atlas::client_identity;
///
/// let id = client_identity(Some("203.0.113.7, 10.0.0.1"), Some("10.0.0.2")).unwrap();
/// assert_eq!(id.as_str(), "203.0.113.7");
///
/// let id = client_identity(None, Some("10.0.0.2")).unwrap();
/// assert_eq!(id.as_str(), "10.0.0.2");
/// ```
pub fn client_identity(
    forwarded_for: Option<&str>,
    remote_addr: Option<&str>,
) -> Result<VisitorIdentity, AtlasError> {
    let forwarded = forwarded_for
        .and_then(|h| h.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty());

    forwarded
        .or_else(|| remote_addr.map(str::trim).filter(|s| !s.is_empty()))
        .map(VisitorIdentity::new)
        .ok_or_else(|| AtlasError::invalid("request carries no client address"))
}
