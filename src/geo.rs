//! IP Geolocation Heuristics
//!
//! Guesses which region the machine running the browser is in, and provides the
//! coordinates and locale used to spoof a region in the browser itself.

use crate::error::{BrowserError, Result};
use crate::region::TargetRegion;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::time::Duration;

/// Free lookup service that needs no API key
pub const DEFAULT_LOOKUP_ENDPOINT: &str = "https://ipapi.co/json/";

/// IPv4 prefixes seen on UK ISPs and cloud providers. Coarse on purpose.
const GB_IP_PREFIXES: [&str; 8] = ["51.", "81.", "82.", "86.", "87.", "193.", "194.", "195."];

/// Browser geolocation and locale for a region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeolocationSettings {
    /// BCP 47 locale, e.g. "en-GB"
    pub locale: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Accuracy in meters
    pub accuracy: f64,
}

impl GeolocationSettings {
    /// London for GB; New York for everything else
    pub fn for_region(target: &TargetRegion) -> Self {
        match target.code() {
            "GB" => Self {
                locale: target.language_tag(),
                latitude: 51.5074,
                longitude: -0.1278,
                accuracy: 100.0,
            },
            _ => Self {
                locale: "en-US".to_string(),
                latitude: 40.7128,
                longitude: -74.0060,
                accuracy: 100.0,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    country_code: Option<String>,
}

/// Public-IP country lookup
pub struct GeoLookup {
    endpoint: String,
    timeout: Duration,
}

impl Default for GeoLookup {
    fn default() -> Self {
        Self::new(DEFAULT_LOOKUP_ENDPOINT)
    }
}

impl GeoLookup {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Country code of this machine's public IP
    pub async fn country_code(&self) -> Result<String> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| BrowserError::Other(format!("Failed to build HTTP client: {}", e)))?;

        let response = client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| BrowserError::Other(format!("Geolocation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(BrowserError::Other(format!(
                "Geolocation lookup returned status {}",
                response.status()
            )));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| BrowserError::Other(format!("Unparseable geolocation response: {}", e)))?;

        body.country_code
            .map(|c| c.to_ascii_uppercase())
            .ok_or_else(|| BrowserError::Other("Geolocation response had no country_code".to_string()))
    }

    /// Whether this machine appears to be in `target`: the public lookup when it
    /// answers, otherwise the local address prefix heuristic
    pub async fn is_region_ip_address(&self, target: &TargetRegion) -> bool {
        match self.country_code().await {
            Ok(code) => {
                log::info!("Detected country code from public IP: {}", code);
                code == target.code()
            }
            Err(e) => {
                log::warn!("Public IP lookup failed, using local address: {}", e);
                let ip = local_ip_address();
                let matched = is_region_ip(&ip, target);
                log::info!(
                    "IP address {} is {}from {} based on local check",
                    ip,
                    if matched { "" } else { "not " },
                    target.code()
                );
                matched
            }
        }
    }
}

/// Address of the interface that would route to the internet.
///
/// Connecting a UDP socket sends nothing; it only selects a route.
pub fn local_ip_address() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect("8.8.8.8:80")?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => {
            log::warn!("No routable IPv4 address found, using localhost");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Err(e) => {
            log::warn!("Error getting local IP address: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Prefix heuristic; only GB has known prefixes
pub fn is_region_ip(ip: &IpAddr, target: &TargetRegion) -> bool {
    let IpAddr::V4(v4) = ip else {
        return false;
    };

    let prefixes: &[&str] = match target.code() {
        "GB" => &GB_IP_PREFIXES,
        _ => &[],
    };

    let text = v4.to_string();
    prefixes.iter().any(|p| text.starts_with(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gb_prefixes() {
        let gb = TargetRegion::gb();

        assert!(is_region_ip(&"81.2.69.160".parse().unwrap(), &gb));
        assert!(is_region_ip(&"195.10.0.1".parse().unwrap(), &gb));
        assert!(!is_region_ip(&"8.8.8.8".parse().unwrap(), &gb));
        assert!(!is_region_ip(&"127.0.0.1".parse().unwrap(), &gb));
        assert!(!is_region_ip(&"::1".parse().unwrap(), &gb));
    }

    #[test]
    fn test_no_prefixes_for_other_regions() {
        assert!(!is_region_ip(&"81.2.69.160".parse().unwrap(), &TargetRegion::us()));
    }

    #[test]
    fn test_settings_for_region() {
        let gb = GeolocationSettings::for_region(&TargetRegion::gb());
        assert_eq!(gb.locale, "en-GB");
        assert!((gb.latitude - 51.5074).abs() < 1e-9);

        let de = GeolocationSettings::for_region(&TargetRegion::from_code("DE").unwrap());
        assert_eq!(de.locale, "en-US");
    }

    #[test]
    fn test_local_ip_address_never_unspecified() {
        assert!(!local_ip_address().is_unspecified());
    }
}
