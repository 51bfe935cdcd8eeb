use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::error::TargetError;

/// Ports probed when no specification is given.
pub const DEFAULT_PORT_RANGE: std::ops::RangeInclusive<u16> = 1..=100;

/// Parse an inline port specification such as `22,80,443` or `20-22,80`.
///
/// - absent or blank: ports 1 through 100
/// - each comma-separated token is a single port or an inclusive `a-b` range
/// - values outside 1..=65535 are dropped, ranges are clipped
/// - the result is sorted ascending without duplicates
pub fn parse_port_spec(spec: Option<&str>) -> Result<Vec<u16>, TargetError> {
    let spec = match spec.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => return Ok(DEFAULT_PORT_RANGE.collect()),
    };

    let mut set = BTreeSet::new();
    for token in spec.split(',') {
        insert_token(&mut set, token.trim())
            .map_err(|e| TargetError::config(format!("port spec {spec:?}: {e}")))?;
    }
    Ok(set.into_iter().collect())
}

/// Parse a ports file: one port or `a-b` range per line.
///
/// Everything after `#` is a comment; blank lines are ignored. Out-of-range
/// values are dropped the same way as in [`parse_port_spec`].
pub fn parse_ports_str(s: &str) -> Result<Vec<u16>, TargetError> {
    let mut set = BTreeSet::new();

    for (idx, raw_line) in s.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw_line.split('#').next().map(str::trim).unwrap_or("");
        if line.is_empty() {
            continue;
        }
        insert_token(&mut set, line)
            .map_err(|e| TargetError::config(format!("line {line_no}: {e}")))?;
    }

    Ok(set.into_iter().collect())
}

/// Load a ports list from a file path. Errors if the file cannot be read or parsed.
pub fn load_ports_from_path(path: impl AsRef<Path>) -> Result<Vec<u16>, TargetError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| TargetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_ports_str(&content)
}

fn insert_token(set: &mut BTreeSet<u16>, token: &str) -> Result<(), String> {
    if let Some((a, b)) = token.split_once('-') {
        let start = parse_number(a.trim())?;
        let end = parse_number(b.trim())?;
        let lo = start.max(1);
        let hi = end.min(u16::MAX as i64);
        if lo <= hi {
            set.extend((lo as u16)..=(hi as u16));
        }
        return Ok(());
    }

    let p = parse_number(token)?;
    if (1..=u16::MAX as i64).contains(&p) {
        set.insert(p as u16);
    }
    Ok(())
}

fn parse_number(s: &str) -> Result<i64, String> {
    s.parse::<i64>()
        .map_err(|e| format!("invalid port value {s:?}: {e}"))
}
