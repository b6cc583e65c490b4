//! Extraction of the `user` identity from an upgrade request.
//!
//! Clients connect to `ws://host:port/?user=<identity>`.  The identity is the
//! registry key, so parsing lives in the domain layer where it can be tested
//! without a socket.  Decoding follows standard query-string rules: `+` means
//! space and `%XX` is a percent-encoded byte; a pair that fails to decode is
//! skipped rather than failing the whole query.

/// Returns the value of the first well-formed `user` parameter in `query`,
/// or the empty string when the parameter is missing.
///
/// The caller treats an empty result as "no identity": the connection is
/// closed without being registered.
pub fn user_from_query(query: Option<&str>) -> String {
    let Some(query) = query else {
        return String::new();
    };

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if decode_component(key).as_deref() != Some("user") {
            continue;
        }
        if let Some(user) = decode_component(value) {
            return user;
        }
        // Malformed percent-escape in this pair; a later duplicate may
        // still be well-formed.
    }

    String::new()
}

/// Percent-decodes one query-string component.
///
/// Returns `None` when the component contains a truncated or non-hex
/// `%` escape.
fn decode_component(component: &str) -> Option<String> {
    let bytes = component.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b'%' => {
                let hi = hex_value(*bytes.get(i + 1)?)?;
                let lo = hex_value(*bytes.get(i + 2)?)?;
                decoded.push(hi << 4 | lo);
                i += 3;
            }
            other => {
                decoded.push(other);
                i += 1;
            }
        }
    }

    Some(String::from_utf8_lossy(&decoded).into_owned())
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
