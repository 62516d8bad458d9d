//! SMTP response parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from raw response lines (line terminators removed).
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// The text part of each line goes through [`decode_text`], so a server
/// that emits non-UTF-8 bytes still yields a readable reply.
///
/// # Errors
///
/// Returns an error if the reply is malformed.
pub fn parse_reply(lines: &[Vec<u8>]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("Empty reply".into()));
    };

    if first.len() < 3 {
        return Err(Error::Protocol(format!(
            "Reply too short: {}",
            decode_text(first)
        )));
    }

    let code = parse_code(&first[..3])?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if line.len() < 3 || parse_code(&line[..3])? != code {
            return Err(Error::Protocol(format!(
                "Malformed reply line: {}",
                decode_text(line)
            )));
        }
        // Skip code and separator (e.g., "250-" or "250 ")
        message.push(line.get(4..).map(decode_text).unwrap_or_default());
    }

    Ok(Reply::new(code, message))
}

fn parse_code(digits: &[u8]) -> Result<ReplyCode> {
    std::str::from_utf8(digits)
        .ok()
        .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u16>().ok())
        .map(ReplyCode::new)
        .ok_or_else(|| Error::Protocol(format!("Invalid reply code: {}", decode_text(digits))))
}

/// Checks if a line is the last line of a multi-line reply.
///
/// Multi-line replies use `-` separator for continuation and ` ` for the last line.
/// A bare three-digit line also terminates the reply.
#[must_use]
pub fn is_last_reply_line(line: &[u8]) -> bool {
    line.len() == 3 || (line.len() >= 4 && line[3] != b'-')
}

/// Decodes protocol bytes for display.
///
/// Valid UTF-8 is returned as-is. Anything else is rendered as an escaped
/// byte literal (`b"caf\xe9"`), which is never empty and never fails.
#[must_use]
pub fn decode_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => format!("b\"{}\"", bytes.escape_ascii()),
    }
}
