//! Routing-key resolution for inbound connections.
//!
//! A connection is keyed by the `email` query parameter of its upgrade
//! request when one is supplied, otherwise by the peer's IP address.
//! Resolution never fails: any problem with the query falls back to the
//! address.

use std::collections::HashMap;
use std::net::SocketAddr;

/// Query parameter carrying the caller's identity.
const EMAIL_PARAM: &str = "email";

/// Resolve the routing key for a connection.
pub fn resolve_identity(query: Option<&str>, remote_addr: SocketAddr) -> String {
    match email_from_query(query) {
        Ok(Some(email)) => email,
        Ok(None) => remote_addr.ip().to_string(),
        Err(reason) => {
            tracing::debug!(%reason, %remote_addr, "unparsable connection query, keying by address");
            remote_addr.ip().to_string()
        }
    }
}

/// Parse `key=value&...` pairs and pull out a non-empty email.
///
/// The raw query is split before decoding, so an escaped `&` or `=` belongs
/// to the value. Pairs that are not exactly one `key=value` (or have an empty
/// value) are skipped. A repeated key or a bad percent escape fails the whole
/// query.
fn email_from_query(query: Option<&str>) -> Result<Option<String>, &'static str> {
    let Some(query) = query.filter(|q| !q.is_empty()) else {
        return Ok(None);
    };

    let mut params: HashMap<&str, &str> = HashMap::new();
    for pair in query.split('&') {
        let mut parts = pair.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        if params.insert(key, value).is_some() {
            return Err("duplicate query parameter");
        }
    }

    let Some(raw) = params.get(EMAIL_PARAM) else {
        return Ok(None);
    };
    let email = urlencoding::decode(raw).map_err(|_| "invalid percent-encoding")?;
    if email.is_empty() {
        return Ok(None);
    }
    Ok(Some(email.into_owned()))
}
