//! Config file parser for git's INI-like format.
//!
//! Only what reading tunables needs: section headers (both spellings of
//! subsections), key/value lines with quoting, escapes, inline comments
//! and backslash line continuation. Write fidelity (raw-text
//! preservation) is not needed here.

use bstr::BString;

use crate::error::ConfigError;
use crate::{ConfigEntry, ConfigKey, ConfigScope};

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// Parse a config file's bytes into entries, in file order.
pub fn parse_bytes(
    input: &[u8],
    filename: &str,
    scope: ConfigScope,
) -> Result<Vec<ConfigEntry>, ConfigError> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    let lines: Vec<&[u8]> = input.split(|&b| b == b'\n').collect();

    let mut entries = Vec::new();
    let mut section: Option<(String, Option<BString>)> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = strip_cr(lines[i]);
        let trimmed = trim_ascii_start(line);

        if trimmed.is_empty() || trimmed[0] == b'#' || trimmed[0] == b';' {
            i += 1;
            continue;
        }

        if trimmed[0] == b'[' {
            section = Some(parse_section_header(trimmed, filename, i + 1)?);
            i += 1;
            continue;
        }

        let (sec, sub) = section.as_ref().ok_or_else(|| ConfigError::Parse {
            file: filename.into(),
            line: i + 1,
            reason: "key before any section header".into(),
        })?;

        let (name, rest) = parse_key(trimmed, filename, i + 1)?;
        let value = match rest {
            Some(raw) => Some(parse_value(&lines, &mut i, raw, filename)?),
            None => None,
        };

        entries.push(ConfigEntry {
            key: ConfigKey {
                section: sec.clone(),
                subsection: sub.clone(),
                name,
            },
            value,
            scope,
        });
        i += 1;
    }

    Ok(entries)
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn trim_ascii_start(mut s: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = s {
        s = rest;
    }
    s
}

/// Parse `[section]`, `[section "subsection"]` or the deprecated
/// `[section.subsection]` spelling.
fn parse_section_header(
    line: &[u8],
    file: &str,
    lineno: usize,
) -> Result<(String, Option<BString>), ConfigError> {
    let err = |reason: &str| ConfigError::Parse {
        file: file.into(),
        line: lineno,
        reason: reason.into(),
    };

    let body = &line[1..];
    let mut name = Vec::new();
    let mut subsection: Option<BString> = None;
    let mut pos = 0;

    while pos < body.len() {
        match body[pos] {
            b']' => {
                pos += 1;
                // Only whitespace or a comment may follow.
                let rest = trim_ascii_start(&body[pos..]);
                if !rest.is_empty() && rest[0] != b'#' && rest[0] != b';' {
                    return Err(err("trailing junk after section header"));
                }
                if name.is_empty() {
                    return Err(err("empty section name"));
                }
                let name = String::from_utf8(name)
                    .map_err(|_| err("non-ASCII section name"))?
                    .to_ascii_lowercase();
                // Deprecated dotted form: everything past the first dot is
                // the subsection, downcased.
                if subsection.is_none() {
                    if let Some(dot) = name.find('.') {
                        let sub = BString::from(&name[dot + 1..]);
                        return Ok((name[..dot].to_string(), Some(sub)));
                    }
                }
                return Ok((name, subsection));
            }
            b'"' => {
                let mut sub = Vec::new();
                pos += 1;
                loop {
                    if pos >= body.len() {
                        return Err(err("unterminated subsection"));
                    }
                    match body[pos] {
                        b'"' => {
                            pos += 1;
                            break;
                        }
                        b'\\' => {
                            pos += 1;
                            if pos >= body.len() {
                                return Err(err("unterminated subsection"));
                            }
                            sub.push(body[pos]);
                            pos += 1;
                        }
                        c => {
                            sub.push(c);
                            pos += 1;
                        }
                    }
                }
                subsection = Some(BString::from(sub));
            }
            b' ' | b'\t' => pos += 1,
            c if c.is_ascii_alphanumeric() || c == b'-' || c == b'.' => {
                if subsection.is_some() {
                    return Err(err("section name after subsection"));
                }
                name.push(c);
                pos += 1;
            }
            _ => return Err(err("invalid character in section header")),
        }
    }

    Err(err("missing ']' in section header"))
}

/// Split a key line into the (lowercased) variable name and the raw
/// remainder after `=`, or `None` for a value-less boolean key.
fn parse_key<'a>(
    line: &'a [u8],
    file: &str,
    lineno: usize,
) -> Result<(String, Option<&'a [u8]>), ConfigError> {
    let err = |reason: &str| ConfigError::Parse {
        file: file.into(),
        line: lineno,
        reason: reason.into(),
    };

    let mut end = 0;
    while end < line.len() && (line[end].is_ascii_alphanumeric() || line[end] == b'-') {
        end += 1;
    }
    if end == 0 || !line[0].is_ascii_alphabetic() {
        return Err(err("invalid variable name"));
    }
    let name = String::from_utf8_lossy(&line[..end]).to_ascii_lowercase();

    let rest = trim_ascii_start(&line[end..]);
    if rest.is_empty() || rest[0] == b'#' || rest[0] == b';' {
        return Ok((name, None));
    }
    if rest[0] != b'=' {
        return Err(err("expected '=' after variable name"));
    }
    Ok((name, Some(&rest[1..])))
}

/// Parse a value, consuming further physical lines on backslash
/// continuation. `i` is left at the last line consumed.
fn parse_value(
    lines: &[&[u8]],
    i: &mut usize,
    first: &[u8],
    file: &str,
) -> Result<BString, ConfigError> {
    let err = |line: usize, reason: &str| ConfigError::Parse {
        file: file.into(),
        line,
        reason: reason.into(),
    };

    let mut out: Vec<u8> = Vec::new();
    // Whitespace seen outside quotes, emitted only when more value text
    // follows (so trailing whitespace is trimmed, interior preserved).
    let mut pending: Vec<u8> = Vec::new();
    let mut in_quotes = false;
    let mut bytes = trim_ascii_start(first);

    loop {
        let mut continued = false;
        let mut j = 0;
        while j < bytes.len() {
            match bytes[j] {
                b'\\' => {
                    if j + 1 >= bytes.len() {
                        continued = true;
                        break;
                    }
                    j += 1;
                    let esc = match bytes[j] {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'b' => 0x08,
                        b'"' => b'"',
                        b'\\' => b'\\',
                        _ => return Err(err(*i + 1, "invalid escape in value")),
                    };
                    out.append(&mut pending);
                    out.push(esc);
                    j += 1;
                }
                b'"' => {
                    out.append(&mut pending);
                    in_quotes = !in_quotes;
                    j += 1;
                }
                b'#' | b';' if !in_quotes => {
                    j = bytes.len();
                }
                b' ' | b'\t' if !in_quotes => {
                    if !out.is_empty() {
                        pending.push(bytes[j]);
                    }
                    j += 1;
                }
                c => {
                    out.append(&mut pending);
                    out.push(c);
                    j += 1;
                }
            }
        }

        if in_quotes && !continued {
            return Err(err(*i + 1, "unterminated quoted value"));
        }
        if !continued {
            break;
        }
        *i += 1;
        if *i >= lines.len() {
            return Err(err(*i, "backslash continuation at end of file"));
        }
        bytes = strip_cr(lines[*i]);
    }

    Ok(BString::from(out))
}
