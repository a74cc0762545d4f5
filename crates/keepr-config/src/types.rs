//! Typed parsing of raw config values.

/// Parse a git boolean.
///
/// A key with no `=` (`None`) is true. Empty string is false.
pub fn parse_bool(value: Option<&[u8]>) -> Option<bool> {
    let value = match value {
        None => return Some(true),
        Some(v) => v,
    };
    if value.is_empty() {
        return Some(false);
    }
    let lower: Vec<u8> = value.to_ascii_lowercase();
    match lower.as_slice() {
        b"true" | b"yes" | b"on" | b"1" => Some(true),
        b"false" | b"no" | b"off" | b"0" => Some(false),
        _ => None,
    }
}

/// Parse an integer with optional `k`/`m`/`g` scaling suffix.
pub fn parse_int(value: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(value).ok()?.trim();
    if s.is_empty() {
        return None;
    }
    let (digits, scale) = match s.as_bytes().last()? {
        b'k' | b'K' => (&s[..s.len() - 1], 1024i64),
        b'm' | b'M' => (&s[..s.len() - 1], 1024 * 1024),
        b'g' | b'G' => (&s[..s.len() - 1], 1024 * 1024 * 1024),
        _ => (s, 1),
    };
    digits.trim().parse::<i64>().ok()?.checked_mul(scale)
}
