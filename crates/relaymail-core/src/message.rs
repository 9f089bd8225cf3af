//! Message rewriting: envelope extraction and blind-copy stripping.
//!
//! The rewriter turns one raw RFC 5322 message into the envelope sender,
//! the full envelope recipient list, and the bytes to transmit. Bcc
//! headers are removed from the transmitted header block but every
//! address they named stays in the envelope, which is what makes a blind
//! copy blind: the relay delivers to the recipient without any visible
//! header admitting it.
//!
//! Reconstruction is byte-faithful. Kept header lines are emitted from
//! the original input verbatim, with their original casing, ordering,
//! folding, and line endings, and the body is never touched.

use std::ops::Range;

use mailparse::{MailAddr, addrparse};

use relaymail_smtp::Address;

use crate::error::{Error, Result};

/// The rewriter's output: envelope addresses plus transmission bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Envelope sender, from the single mailbox in the From header.
    pub from: Address,
    /// Envelope recipients aggregated from To, Cc, and Bcc in header
    /// encounter order. Duplicates are kept.
    pub recipients: Vec<Address>,
    /// The message to transmit: all non-Bcc header lines verbatim, the
    /// original blank separator, the original body bytes unchanged.
    pub body: Vec<u8>,
}

/// One logical header: possibly folded across several physical lines.
struct RawHeader<'a> {
    name: &'a str,
    value: String,
    bytes: Range<usize>,
}

impl Envelope {
    /// Rewrites a raw message into an envelope.
    ///
    /// Deterministic for identical input bytes.
    ///
    /// # Errors
    ///
    /// [`Error::MessageParse`] for a malformed header block,
    /// [`Error::FromAddress`] when From is missing or is not exactly one
    /// mailbox, [`Error::RecipientParse`] for an unparseable To, Cc, or
    /// Bcc address list or a message naming no recipients at all.
    pub fn rewrite(raw: &[u8]) -> Result<Self> {
        let (headers, separator, body_start) = scan_headers(raw)?;

        let from = parse_from(&headers)?;
        let recipients = parse_recipients(&headers)?;

        let mut body = Vec::with_capacity(raw.len());
        for header in &headers {
            if !header.name.trim_end().eq_ignore_ascii_case("bcc") {
                body.extend_from_slice(&raw[header.bytes.clone()]);
            }
        }
        body.extend_from_slice(&raw[separator]);
        body.extend_from_slice(&raw[body_start..]);

        Ok(Self {
            from,
            recipients,
            body,
        })
    }
}

/// Splits the header block into logical headers, returning them with the
/// byte range of the blank separator line and the body start offset.
fn scan_headers(raw: &[u8]) -> Result<(Vec<RawHeader<'_>>, Range<usize>, usize)> {
    let mut headers: Vec<RawHeader<'_>> = Vec::new();
    let mut pos = 0;

    while pos < raw.len() {
        let line_end = raw[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i + 1);
        let Some(line_end) = line_end else {
            return Err(Error::MessageParse(
                "header block is not terminated by a blank line".into(),
            ));
        };

        let content = trim_line_ending(&raw[pos..line_end]);
        if content.is_empty() {
            // Blank separator: headers end here, the body follows.
            return Ok((headers, pos..line_end, line_end));
        }

        let text = std::str::from_utf8(content).map_err(|_| {
            Error::MessageParse("header line is not valid UTF-8".into())
        })?;

        if text.starts_with(' ') || text.starts_with('\t') {
            let Some(current) = headers.last_mut() else {
                return Err(Error::MessageParse(
                    "continuation line before any header".into(),
                ));
            };
            current.value.push(' ');
            current.value.push_str(text.trim());
            current.bytes.end = line_end;
        } else {
            let Some((name, value)) = text.split_once(':') else {
                return Err(Error::MessageParse(format!(
                    "header line without a colon: {text:?}"
                )));
            };
            if name.trim().is_empty() {
                return Err(Error::MessageParse("header line with an empty name".into()));
            }
            headers.push(RawHeader {
                name,
                value: value.trim().to_string(),
                bytes: pos..line_end,
            });
        }
        pos = line_end;
    }

    Err(Error::MessageParse(
        "header block is not terminated by a blank line".into(),
    ))
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_from(headers: &[RawHeader<'_>]) -> Result<Address> {
    let values: Vec<&str> = headers
        .iter()
        .filter(|h| h.name.trim_end().eq_ignore_ascii_case("from"))
        .map(|h| h.value.as_str())
        .collect();
    if values.is_empty() {
        return Err(Error::FromAddress("message has no From header".into()));
    }

    let joined = values.join(", ");
    let mailboxes = flatten_address_list(&joined)
        .map_err(|e| Error::FromAddress(format!("unparseable From header: {e}")))?;
    match mailboxes.as_slice() {
        [single] => Address::new(single.as_str())
            .map_err(|e| Error::FromAddress(e.to_string())),
        other => Err(Error::FromAddress(format!(
            "From must name exactly one mailbox, found {}",
            other.len()
        ))),
    }
}

fn parse_recipients(headers: &[RawHeader<'_>]) -> Result<Vec<Address>> {
    let mut recipients = Vec::new();
    for header in headers {
        let name = header.name.trim_end();
        if !(name.eq_ignore_ascii_case("to")
            || name.eq_ignore_ascii_case("cc")
            || name.eq_ignore_ascii_case("bcc"))
        {
            continue;
        }
        let mailboxes = flatten_address_list(&header.value).map_err(|e| {
            Error::RecipientParse(format!("unparseable {name} header: {e}"))
        })?;
        for mailbox in mailboxes {
            recipients
                .push(Address::new(mailbox.as_str()).map_err(|e| {
                    Error::RecipientParse(e.to_string())
                })?);
        }
    }
    if recipients.is_empty() {
        return Err(Error::RecipientParse(
            "message names no To, Cc, or Bcc recipients".into(),
        ));
    }
    Ok(recipients)
}

/// Parses an RFC 5322 address list and flattens groups to bare mailboxes.
fn flatten_address_list(value: &str) -> std::result::Result<Vec<String>, mailparse::MailParseError> {
    let mut mailboxes = Vec::new();
    for addr in addrparse(value)?.iter() {
        match addr {
            MailAddr::Single(info) => mailboxes.push(info.addr.clone()),
            MailAddr::Group(group) => {
                for info in &group.addrs {
                    mailboxes.push(info.addr.clone());
                }
            }
        }
    }
    Ok(mailboxes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn addresses(envelope: &Envelope) -> Vec<&str> {
        envelope.recipients.iter().map(Address::as_str).collect()
    }

    #[test]
    fn basic_bcc_stripping() {
        let raw = b"From: a@x.com\r\nTo: b@x.com\r\nBcc: c@x.com\r\n\r\nhi";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(envelope.from.as_str(), "a@x.com");
        assert_eq!(addresses(&envelope), ["b@x.com", "c@x.com"]);
        assert_eq!(
            envelope.body,
            b"From: a@x.com\r\nTo: b@x.com\r\n\r\nhi"
        );
    }

    #[test]
    fn every_bcc_occurrence_is_stripped() {
        let raw = b"Bcc: one@x.com\nFrom: a@x.com\nBCC: two@x.com\nTo: b@x.com\nbcc: three@x.com\n\nbody\n";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(envelope.body, b"From: a@x.com\nTo: b@x.com\n\nbody\n");
        assert_eq!(
            addresses(&envelope),
            ["one@x.com", "two@x.com", "b@x.com", "three@x.com"]
        );
    }

    #[test]
    fn similarly_named_headers_survive() {
        let raw = b"From: a@x.com\nTo: b@x.com\nX-Bcc-Audit: yes\n\nbody";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert!(
            String::from_utf8(envelope.body).unwrap().contains("X-Bcc-Audit: yes")
        );
    }

    #[test]
    fn folded_recipient_header_is_kept_verbatim() {
        let raw = b"From: a@x.com\r\nTo: b@x.com,\r\n\tc@x.com\r\nSubject: folded\r\n\r\nbody";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(addresses(&envelope), ["b@x.com", "c@x.com"]);
        // The folded line survives with its original tab and line endings.
        assert_eq!(envelope.body, raw);
    }

    #[test]
    fn group_addresses_are_flattened() {
        let raw = b"From: a@x.com\nTo: team: b@x.com, c@x.com;\n\nbody";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(addresses(&envelope), ["b@x.com", "c@x.com"]);
    }

    #[test]
    fn duplicates_and_order_are_preserved() {
        let raw = b"From: a@x.com\nCc: dup@x.com\nTo: b@x.com, dup@x.com\n\nbody";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(addresses(&envelope), ["dup@x.com", "b@x.com", "dup@x.com"]);
    }

    #[test]
    fn display_names_reduce_to_bare_mailboxes() {
        let raw = b"From: \"Ada L.\" <a@x.com>\nTo: Bob <b@x.com>\n\nbody";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert_eq!(envelope.from.as_str(), "a@x.com");
        assert_eq!(addresses(&envelope), ["b@x.com"]);
    }

    #[test]
    fn body_bytes_are_untouched() {
        let raw = b"From: a@x.com\nTo: b@x.com\n\nline one\nline two\r\nno trailing newline";
        let envelope = Envelope::rewrite(raw).unwrap();
        assert!(envelope.body.ends_with(b"\n\nline one\nline two\r\nno trailing newline"));
    }

    #[test]
    fn rewrite_is_idempotent_once_bcc_is_gone() {
        let raw = b"From: a@x.com\nTo: b@x.com\nBcc: c@x.com\nSubject: x\n\nhello\n";
        let first = Envelope::rewrite(raw).unwrap();
        let second = Envelope::rewrite(&first.body).unwrap();
        assert_eq!(second.body, first.body);
        assert_eq!(second.from, first.from);
        assert_eq!(addresses(&second), ["b@x.com"]);
    }

    #[test]
    fn missing_from_header() {
        let err = Envelope::rewrite(b"To: b@x.com\n\nbody").unwrap_err();
        assert!(matches!(err, Error::FromAddress(_)));
    }

    #[test]
    fn multiple_from_mailboxes() {
        let err =
            Envelope::rewrite(b"From: a@x.com, b@x.com\nTo: c@x.com\n\nbody").unwrap_err();
        assert!(matches!(err, Error::FromAddress(_)));
    }

    #[test]
    fn from_headers_are_combined_before_the_count_check() {
        let err =
            Envelope::rewrite(b"From: a@x.com\nFrom: b@x.com\nTo: c@x.com\n\nbody").unwrap_err();
        assert!(matches!(err, Error::FromAddress(_)));
    }

    #[test]
    fn header_line_without_colon() {
        let err = Envelope::rewrite(b"From: a@x.com\nnot a header\n\nbody").unwrap_err();
        assert!(matches!(err, Error::MessageParse(_)));
    }

    #[test]
    fn continuation_before_any_header() {
        let err = Envelope::rewrite(b"  folded\nFrom: a@x.com\n\nbody").unwrap_err();
        assert!(matches!(err, Error::MessageParse(_)));
    }

    #[test]
    fn missing_blank_separator() {
        let err = Envelope::rewrite(b"From: a@x.com\nTo: b@x.com\n").unwrap_err();
        assert!(matches!(err, Error::MessageParse(_)));
    }

    #[test]
    fn empty_input() {
        assert!(matches!(
            Envelope::rewrite(b"").unwrap_err(),
            Error::MessageParse(_)
        ));
    }

    #[test]
    fn message_without_recipients_is_rejected() {
        // No RCPT TO could ever be issued for such a message; it fails
        // here, before any network activity.
        let err = Envelope::rewrite(b"From: a@x.com\nSubject: s\n\nbody").unwrap_err();
        assert!(matches!(err, Error::RecipientParse(_)));
    }
}
