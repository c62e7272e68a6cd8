use std::net::{Ipv4Addr, Ipv6Addr};

use url::Url;

use crate::error::GatewayError;

/// Check if an IPv4 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()          // 127.0.0.0/8
        || ip.is_private()    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local() // 169.254.0.0/16
        || ip.is_broadcast()  // 255.255.255.255
        || ip.is_unspecified() // 0.0.0.0
        || ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGNAT)
}

/// Check if an IPv6 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    ip.is_loopback()
        || ip.is_unspecified()
        || {
            let segments = ip.segments();
            // fc00::/7 (unique local)
            (segments[0] & 0xFE00) == 0xFC00
            // fe80::/10 (link-local)
            || (segments[0] & 0xFFC0) == 0xFE80
            || match ip.to_ipv4_mapped() {
                Some(v4) => is_private_ipv4(&v4),
                None => false,
            }
        }
}

/// Validate the configured upstream base (HTTPS, public host, no query or fragment).
pub fn validate_upstream_base(url: &str) -> Result<(), String> {
    let parsed = Url::parse(url).map_err(|_| "invalid URL format".to_string())?;

    if parsed.scheme() != "https" {
        return Err("upstream must use HTTPS".to_string());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err("upstream base must not carry a query or fragment".to_string());
    }

    match parsed.host() {
        Some(url::Host::Ipv4(ip)) if is_private_ipv4(&ip) => {
            Err("upstream cannot be a private or loopback IP address".to_string())
        }
        Some(url::Host::Ipv6(ip)) if is_private_ipv6(&ip) => {
            Err("upstream cannot be a private or loopback IP address".to_string())
        }
        Some(url::Host::Domain(domain)) => {
            let domain = domain.to_lowercase();
            if domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
            {
                Err("upstream cannot be localhost or local domain".to_string())
            } else {
                Ok(())
            }
        }
        Some(_) => Ok(()),
        None => Err("upstream URL must have a host".to_string()),
    }
}

/// Sanitize a query string to prevent CRLF injection and fragment smuggling.
/// Returns the (still-encoded) query with any fragment removed.
pub fn sanitize_query(query: &str) -> Result<String, GatewayError> {
    if query.contains('\r') || query.contains('\n') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain newlines".to_string(),
        ));
    }

    // Fragments are never sent to a server
    let sanitized = match query.find('#') {
        Some(idx) => &query[..idx],
        None => query,
    };

    let decoded = urlencoding::decode(sanitized).unwrap_or(std::borrow::Cow::Borrowed(sanitized));
    if decoded.contains('\0') || decoded.contains('\r') || decoded.contains('\n') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain control characters".to_string(),
        ));
    }

    Ok(sanitized.to_string())
}

/// Sanitize the proxied path suffix to prevent path traversal and URL authority injection.
/// Validates against the decoded form but returns the original (still-encoded) path
/// so that `%3F` stays `%3F` and cannot turn into a query separator upstream.
pub fn sanitize_path(path: &str) -> Result<String, GatewayError> {
    let decoded = urlencoding::decode(path)
        .map_err(|_| GatewayError::InvalidRequest("invalid URL encoding in path".to_string()))?;

    if decoded
        .split(['/', '\\'])
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(GatewayError::InvalidRequest(
            "path traversal not allowed".to_string(),
        ));
    }

    // A leading slash would produce `//host` authority injection after joining
    if decoded.starts_with('/') || decoded.starts_with('\\') {
        return Err(GatewayError::InvalidRequest(
            "path must not start with /".to_string(),
        ));
    }

    if decoded.contains('@') {
        return Err(GatewayError::InvalidRequest(
            "path must not contain @".to_string(),
        ));
    }

    if decoded.contains('\r') || decoded.contains('\n') || decoded.contains('\0') {
        return Err(GatewayError::InvalidRequest(
            "path must not contain control characters".to_string(),
        ));
    }

    Ok(path.to_string())
}

/// Constant-time byte comparison that does not leak input lengths.
/// Both inputs are hashed to fixed-length digests before comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use sha2::{Digest, Sha256};
    let ha = Sha256::digest(a);
    let hb = Sha256::digest(b);
    let mut result = 0u8;
    for (x, y) in ha.iter().zip(hb.iter()) {
        result |= x ^ y;
    }
    result == 0
}
