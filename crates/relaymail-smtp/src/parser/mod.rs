//! SMTP reply parser.
//!
//! Replies are one or more lines of the form `250-text` (continuation) or
//! `250 text` (final line). A bare three-digit line is also accepted as a
//! final line, which some relays emit for QUIT.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Assembles a reply from the raw lines of one server response.
///
/// All lines must carry the same code as the first; a mismatch is treated
/// as a protocol violation rather than silently taking either code.
///
/// # Errors
///
/// Returns [`Error::Protocol`] for an empty response, a short or
/// non-numeric code, or inconsistent codes across lines.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };

    let code = parse_code(first)?;
    let mut text = Vec::with_capacity(lines.len());
    for line in lines {
        if parse_code(line)? != code {
            return Err(Error::Protocol(format!(
                "inconsistent reply codes: {first:?} then {line:?}"
            )));
        }
        text.push(line.get(4..).unwrap_or("").to_string());
    }

    Ok(Reply::new(code, text))
}

/// Returns true when `line` terminates a (possibly multi-line) reply.
#[must_use]
pub fn is_final_line(line: &str) -> bool {
    line.len() == 3 || (line.len() >= 4 && line.as_bytes()[3] == b' ')
}

fn parse_code(line: &str) -> Result<ReplyCode> {
    let digits = line
        .get(0..3)
        .ok_or_else(|| Error::Protocol(format!("reply line too short: {line:?}")))?;
    let code = digits
        .parse::<u16>()
        .map_err(|_| Error::Protocol(format!("non-numeric reply code: {line:?}")))?;
    if line.len() > 3 && !matches!(line.as_bytes()[3], b' ' | b'-') {
        return Err(Error::Protocol(format!("malformed reply line: {line:?}")));
    }
    Ok(ReplyCode::new(code))
}
