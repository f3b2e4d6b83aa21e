//! Geolocation lookup boundary.
//!
//! A [`GeoResolver`] turns a client address into a [`GeoObservation`] or a
//! [`ResolutionFailure`]. Every call is a single attempt: no retry, no backoff.
//! The caller decides what a failure means for the request.
//!
//! The HTTP implementation, [`IpInfoResolver`] (feature `http`), talks to
//! ipinfo.io style services that answer `GET /{ip}/json` with
//!
//! ```json
//! {"ip": "8.8.8.8", "country": "US", "loc": "37.4056,-122.0775"}
//! ```
//!
//! Either field may be missing (private ranges, anycast, rate limiting), which
//! is reported as [`ResolutionFailure::IncompleteData`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{GeoObservation, ResolutionFailure};

/// Default lookup endpoint; `{ip}` is replaced by the client address.
pub const DEFAULT_URL_TEMPLATE: &str = "https://ipinfo.io/{ip}/json";

/// Configuration for HTTP geolocation lookups.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// URL with an `{ip}` placeholder.
    /// Default: `https://ipinfo.io/{ip}/json`
    pub url_template: String,

    /// Upper bound for one lookup, connection plus body.
    /// Default: 5 seconds
    pub timeout: Duration,

    /// User-Agent header sent with each lookup.
    pub user_agent: String,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY` from the environment. Default: true
    pub system_proxy: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            timeout: Duration::from_secs(5),
            user_agent: concat!("visitor-atlas/", env!("CARGO_PKG_VERSION")).to_string(),
            system_proxy: true,
        }
    }
}

/// Lookup service for client addresses.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    /// Resolve one address. Exactly one attempt is made.
    async fn resolve(&self, address: &str) -> Result<GeoObservation, ResolutionFailure>;

    /// Resolver name (for logs).
    fn name(&self) -> &'static str;
}

/// Fields of a lookup response that matter here. Everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LookupResponse {
    pub country: Option<String>,
    pub loc: Option<String>,
}

/// Turn a lookup response into an observation.
///
/// `loc` must be `"lat,lon"`. A missing or empty field, or a `loc` that does
/// not hold two numbers, is [`ResolutionFailure::IncompleteData`]. Numbers
/// outside the coordinate ranges are [`ResolutionFailure::InvalidData`], which
/// the tracker reports as invalid input instead of skipping.
///
/// # Example
///
/// ```rust
/// use visitor_atlas::{parse_lookup, LookupResponse};
///
/// let response = LookupResponse {
///     country: Some("jp".into()),
///     loc: Some("35.6895,139.6917".into()),
/// };
/// let obs = parse_lookup(&response).unwrap();
/// assert_eq!(obs.country(), "JP");
/// assert_eq!(obs.latitude(), 35.6895);
/// ```
pub fn parse_lookup(response: &LookupResponse) -> Result<GeoObservation, ResolutionFailure> {
    let incomplete = || ResolutionFailure::IncompleteData {
        country: response.country.clone(),
        loc: response.loc.clone(),
    };

    let country = response
        .country
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(incomplete)?;
    let loc = response.loc.as_deref().ok_or_else(incomplete)?;
    let (latitude, longitude) = parse_loc(loc).ok_or_else(incomplete)?;

    GeoObservation::new(country, latitude, longitude)
        .map_err(|e| ResolutionFailure::InvalidData(e.to_string()))
}

fn parse_loc(loc: &str) -> Option<(f64, f64)> {
    let mut parts = loc.split(',');
    let lat = parts.next()?.trim().parse::<f64>().ok()?;
    let lon = parts.next()?.trim().parse::<f64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((lat, lon))
}

/// Expand the `{ip}` placeholder of a URL template.
pub fn lookup_url(template: &str, address: &str) -> String {
    template.replace("{ip}", address)
}

// ============================================================================
// HTTP resolver
// ============================================================================

#[cfg(feature = "http")]
pub use http::IpInfoResolver;

#[cfg(feature = "http")]
mod http {
    use std::time::Instant;

    use async_trait::async_trait;
    use log::{debug, warn};
    use reqwest::Client;

    use super::{lookup_url, parse_lookup, Duration, GeoResolver, LookupResponse, ResolverConfig};
    use crate::{AtlasError, GeoObservation, ResolutionFailure};

    /// HTTP resolver for ipinfo.io compatible endpoints.
    pub struct IpInfoResolver {
        client: Client,
        url_template: String,
        timeout: Duration,
    }

    impl IpInfoResolver {
        pub fn new(config: &ResolverConfig) -> Result<Self, AtlasError> {
            if !config.url_template.contains("{ip}") {
                return Err(AtlasError::invalid(format!(
                    "resolver URL template has no {{ip}} placeholder: {}",
                    config.url_template
                )));
            }

            if config.timeout.is_zero() {
                return Err(AtlasError::invalid("resolver timeout must be non-zero"));
            }

            let timeout = config.timeout;
            let mut builder = Client::builder()
                .connect_timeout(timeout)
                .pool_idle_timeout(Duration::from_secs(60))
                .user_agent(config.user_agent.clone());
            if !config.system_proxy {
                builder = builder.no_proxy();
            }
            let client = builder
                .build()
                .map_err(|e| AtlasError::Network(format!("Failed to create HTTP client: {}", e)))?;

            Ok(Self {
                client,
                url_template: config.url_template.clone(),
                timeout,
            })
        }

        async fn fetch(&self, url: &str) -> Result<LookupResponse, ResolutionFailure> {
            let resp = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| ResolutionFailure::Network(format!("Request error: {}", e)))?;

            let status = resp.status();
            if !status.is_success() {
                return Err(ResolutionFailure::Network(format!("HTTP {}", status)));
            }

            resp.json::<LookupResponse>()
                .await
                .map_err(|e| ResolutionFailure::Network(format!("JSON parse error: {}", e)))
        }
    }

    #[async_trait]
    impl GeoResolver for IpInfoResolver {
        async fn resolve(&self, address: &str) -> Result<GeoObservation, ResolutionFailure> {
            let url = lookup_url(&self.url_template, address);
            let start = Instant::now();

            // Bounds connect, headers and body together.
            let response = match tokio::time::timeout(self.timeout, self.fetch(&url)).await {
                Ok(result) => result,
                Err(_) => Err(ResolutionFailure::Network(format!(
                    "lookup timed out after {:?}",
                    self.timeout
                ))),
            };

            match &response {
                Ok(data) => debug!(
                    "[IpInfoResolver] {} -> country={:?} loc={:?} in {:?}",
                    address, data.country, data.loc, start.elapsed()
                ),
                Err(e) => warn!("[IpInfoResolver] {} failed after {:?}: {}", address, start.elapsed(), e),
            }

            parse_lookup(&response?)
        }

        fn name(&self) -> &'static str {
            "ipinfo"
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_rejects_template_without_placeholder() {
            let config = ResolverConfig {
                url_template: "https://ipinfo.io/json".into(),
                ..ResolverConfig::default()
            };
            assert!(matches!(IpInfoResolver::new(&config), Err(AtlasError::InvalidInput(_))));
        }

        #[test]
        fn test_builds_with_defaults() {
            let resolver = IpInfoResolver::new(&ResolverConfig::default()).unwrap();
            assert_eq!(resolver.name(), "ipinfo");
            assert_eq!(resolver.timeout, Duration::from_secs(5));
        }

        #[test]
        fn test_rejects_zero_timeout() {
            let config = ResolverConfig {
                timeout: Duration::ZERO,
                ..ResolverConfig::default()
            };
            assert!(IpInfoResolver::new(&config).is_err());
        }

        fn local_config(port: u16, timeout: Duration) -> ResolverConfig {
            ResolverConfig {
                url_template: format!("http://127.0.0.1:{}/{{ip}}/json", port),
                timeout,
                system_proxy: false,
                ..ResolverConfig::default()
            }
        }

        /// Serve one canned HTTP response on a loopback port.
        async fn serve_once(status: &'static str, body: &'static str) -> u16 {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            tokio::spawn(async move {
                if let Ok((mut socket, _)) = listener.accept().await {
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    let reply = format!(
                        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(reply.as_bytes()).await;
                }
            });
            port
        }

        #[tokio::test]
        async fn test_resolves_from_local_server() {
            let port = serve_once("200 OK", r#"{"ip":"8.8.8.8","country":"US","loc":"37.4056,-122.0775"}"#).await;
            let resolver = IpInfoResolver::new(&local_config(port, Duration::from_secs(2))).unwrap();
            let obs = resolver.resolve("8.8.8.8").await.unwrap();
            assert_eq!(obs.country(), "US");
            assert_eq!(obs.longitude(), -122.0775);
        }

        #[tokio::test]
        async fn test_error_status_is_network_failure() {
            let port = serve_once("429 Too Many Requests", "{}").await;
            let resolver = IpInfoResolver::new(&local_config(port, Duration::from_secs(2))).unwrap();
            let result = resolver.resolve("8.8.8.8").await;
            assert!(matches!(result, Err(ResolutionFailure::Network(msg)) if msg.contains("429")));
        }

        #[tokio::test]
        async fn test_silent_server_hits_lookup_timeout() {
            // Accepts connections and never answers.
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            let port = listener.local_addr().unwrap().port();
            let server = tokio::spawn(async move {
                let mut held = Vec::new();
                while let Ok((socket, _)) = listener.accept().await {
                    held.push(socket);
                }
            });

            let resolver = IpInfoResolver::new(&local_config(port, Duration::from_millis(200))).unwrap();
            let start = Instant::now();
            let result = resolver.resolve("8.8.8.8").await;
            server.abort();

            match result {
                Err(ResolutionFailure::Network(msg)) => assert!(msg.contains("timed out"), "{}", msg),
                other => panic!("expected timeout, got {:?}", other),
            }
            assert!(start.elapsed() < Duration::from_secs(2));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(country: Option<&str>, loc: Option<&str>) -> LookupResponse {
        LookupResponse {
            country: country.map(String::from),
            loc: loc.map(String::from),
        }
    }

    #[test]
    fn test_parse_full_response() {
        let obs = parse_lookup(&response(Some("US"), Some("37.4056,-122.0775"))).unwrap();
        assert_eq!(obs.country(), "US");
        assert_eq!(obs.latitude(), 37.4056);
        assert_eq!(obs.longitude(), -122.0775);
    }

    #[test]
    fn test_parse_from_json_ignores_extra_fields() {
        let json = r#"{"ip":"8.8.8.8","city":"Mountain View","country":"US","loc":"37.4056, -122.0775","org":"AS15169"}"#;
        let data: LookupResponse = serde_json::from_str(json).unwrap();
        let obs = parse_lookup(&data).unwrap();
        assert_eq!(obs.longitude(), -122.0775);
    }

    #[test]
    fn test_missing_fields_are_incomplete() {
        for r in [
            response(None, Some("1,2")),
            response(Some("US"), None),
            response(Some(""), Some("1,2")),
            response(None, None),
        ] {
            assert!(matches!(
                parse_lookup(&r),
                Err(ResolutionFailure::IncompleteData { .. })
            ));
        }
    }

    #[test]
    fn test_bogon_response_is_incomplete() {
        let data: LookupResponse = serde_json::from_str(r#"{"ip":"10.0.0.1","bogon":true}"#).unwrap();
        assert!(matches!(
            parse_lookup(&data),
            Err(ResolutionFailure::IncompleteData { country: None, loc: None })
        ));
    }

    #[test]
    fn test_malformed_loc_is_incomplete() {
        for loc in ["", "35.0", "35.0,abc", "1,2,3"] {
            assert!(
                parse_lookup(&response(Some("JP"), Some(loc))).is_err(),
                "accepted loc {:?}",
                loc
            );
        }
    }

    #[test]
    fn test_out_of_range_coordinates_are_invalid_data() {
        let result = parse_lookup(&response(Some("US"), Some("91.0,0.0")));
        assert!(matches!(result, Err(ResolutionFailure::InvalidData(_))));
    }

    #[test]
    fn test_lookup_url() {
        assert_eq!(
            lookup_url(DEFAULT_URL_TEMPLATE, "203.0.113.7"),
            "https://ipinfo.io/203.0.113.7/json"
        );
    }
}
