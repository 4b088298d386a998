//! URL validation for SSRF protection.
//!
//! URLs handed to `extract` come from model output, so they are untrusted.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{SecurityError, SecurityResult};

/// URL validator for SSRF protection.
///
/// Rejects:
/// - Non-HTTP(S) schemes (file://, ftp://)
/// - Internal hosts (localhost, cloud metadata names)
/// - Private, loopback and link-local IP ranges
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Hosts that bypass all other checks
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a validator with default rules.
    pub fn new() -> Self {
        let blocked_cidrs = [
            "10.0.0.0/8",
            "172.16.0.0/12",
            "192.168.0.0/16",
            "169.254.0.0/16", // Link-local / cloud metadata
            "127.0.0.0/8",
            "0.0.0.0/8",
            "::1/128",
            "fc00::/7",
            "fe80::/10",
        ]
        .into_iter()
        .filter_map(|cidr| cidr.parse().ok())
        .collect();

        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs,
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Block an additional CIDR range.
    pub fn block_cidr(mut self, cidr: ipnet::IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    /// Validate a URL without touching the network.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = match parsed.host() {
            Some(url::Host::Domain(domain)) => domain.to_lowercase(),
            Some(url::Host::Ipv4(ip)) => return self.check_ip(IpAddr::V4(ip)),
            Some(url::Host::Ipv6(ip)) => return self.check_ip(IpAddr::V6(ip)),
            None => return Err(SecurityError::NoHost),
        };

        if self.allowed_hosts.contains(&host) {
            return Ok(());
        }
        if self.blocked_hosts.contains(&host) || host.ends_with(".localhost") {
            return Err(SecurityError::BlockedHost(host));
        }

        Ok(())
    }

    /// Validate and resolve DNS, catching names that point at internal IPs.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<()> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let Some(url::Host::Domain(host)) = parsed.host() else {
            return Ok(());
        };
        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host(format!("{}:{}", host, port))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

        for addr in addrs {
            self.check_ip(addr.ip()).map_err(|_| {
                SecurityError::BlockedCidr(format!(
                    "DNS for {} resolved to blocked IP {}",
                    host,
                    addr.ip()
                ))
            })?;
        }

        Ok(())
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        if self.allowed_hosts.contains(&ip.to_string()) {
            return Ok(());
        }
        match self.blocked_cidrs.iter().find(|cidr| cidr.contains(&ip)) {
            Some(_) => Err(SecurityError::BlockedCidr(ip.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allows_public_https() {
        let validator = UrlValidator::new();
        assert!(validator.validate("https://docs.rs/tokio").is_ok());
        assert!(validator.validate("http://93.184.216.34/").is_ok());
    }

    #[test]
    fn test_blocks_internal_targets() {
        let validator = UrlValidator::new();
        assert!(matches!(
            validator.validate("file:///etc/passwd"),
            Err(SecurityError::DisallowedScheme(_))
        ));
        assert!(matches!(
            validator.validate("http://localhost:8080/"),
            Err(SecurityError::BlockedHost(_))
        ));
        assert!(matches!(
            validator.validate("http://169.254.169.254/latest/meta-data"),
            Err(SecurityError::BlockedCidr(_))
        ));
        assert!(matches!(
            validator.validate("http://[::1]/"),
            Err(SecurityError::BlockedCidr(_))
        ));
        assert!(matches!(
            validator.validate("http://10.1.2.3/"),
            Err(SecurityError::BlockedCidr(_))
        ));
    }

    #[test]
    fn test_allow_host_bypasses_block() {
        let validator = UrlValidator::new().allow_host("localhost");
        assert!(validator.validate("http://localhost:3000/").is_ok());
    }
}
