// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Minimal BSD syslog (RFC 3164) datagram decoding.
//!
//! Only what routing needs is extracted: the sender, the program tag, and the content that
//! follows the priority field. The content keeps its header so the classifier can decide how
//! much of it to show.

use std::net::IpAddr;
use std::time::SystemTime;

use crate::errors::ParseError;

/// One decoded log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Address of the host that sent the datagram.
    pub source: String,
    /// Program name from the syslog header, empty when the header has none.
    pub tag: String,
    /// Everything after the priority field, header included.
    pub content: String,
    pub received_at: SystemTime,
}

impl Record {
    pub fn new(source: impl Into<String>, tag: impl Into<String>, content: impl Into<String>) -> Self {
        Record {
            source: source.into(),
            tag: tag.into(),
            content: content.into(),
            received_at: SystemTime::now(),
        }
    }
}

/// Decodes one datagram received from `source`.
pub fn decode(datagram: &[u8], source: IpAddr) -> Result<Record, ParseError> {
    let text = String::from_utf8_lossy(datagram);
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let content = strip_priority(&text)?;
    let tag = extract_tag(content);
    Ok(Record::new(source.to_string(), tag, content))
}

// "<PRI>" where PRI is facility * 8 + severity, at most 191.
fn strip_priority(text: &str) -> Result<&str, ParseError> {
    let preview = || text.chars().take(8).collect::<String>();
    let rest = text
        .strip_prefix('<')
        .ok_or_else(|| ParseError::Priority(preview()))?;
    let end = rest
        .find('>')
        .filter(|end| (1..=3).contains(end))
        .ok_or_else(|| ParseError::Priority(preview()))?;
    let priority: u8 = rest[..end]
        .parse()
        .map_err(|_| ParseError::Priority(preview()))?;
    if priority > 191 {
        return Err(ParseError::Priority(preview()));
    }
    Ok(&rest[end + 1..])
}

fn has_timestamp(content: &str) -> bool {
    let bytes = content.as_bytes();
    bytes.len() > 16
        && content.is_char_boundary(16)
        && bytes[3] == b' '
        && bytes[6] == b' '
        && bytes[9] == b':'
        && bytes[12] == b':'
        && bytes[15] == b' '
}

// "Mmm dd hh:mm:ss host tag[pid]: msg"
fn extract_tag(content: &str) -> String {
    if !has_timestamp(content) {
        return String::new();
    }
    let Some((_host, rest)) = content[16..].split_once(' ') else {
        return String::new();
    };
    rest.split(['[', ':', ' '])
        .next()
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    const SOURCE: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5));

    #[test]
    fn test_decode_bsd_message() {
        let record = decode(
            b"<34>Oct 11 22:14:15 mymachine su[230]: 'su root' failed for lonvick\n",
            SOURCE,
        )
        .unwrap();
        assert_eq!(record.source, "10.0.0.5");
        assert_eq!(record.tag, "su");
        assert_eq!(
            record.content,
            "Oct 11 22:14:15 mymachine su[230]: 'su root' failed for lonvick\n"
        );
    }

    #[test]
    fn test_decode_tag_with_colon() {
        let record = decode(b"<6>Oct  1 08:00:00 db1 kernel: disk panic", SOURCE).unwrap();
        assert_eq!(record.tag, "kernel");
    }

    #[test]
    fn test_decode_without_header_has_empty_tag() {
        let record = decode(b"<13>just some text", SOURCE).unwrap();
        assert_eq!(record.tag, "");
        assert_eq!(record.content, "just some text");
    }

    #[test]
    fn test_decode_rejects_bad_priority() {
        assert!(matches!(decode(b"no priority", SOURCE), Err(ParseError::Priority(_))));
        assert!(matches!(decode(b"<999>x", SOURCE), Err(ParseError::Priority(_))));
        assert!(matches!(decode(b"<abc>x", SOURCE), Err(ParseError::Priority(_))));
        assert!(matches!(decode(b"<>x", SOURCE), Err(ParseError::Priority(_))));
    }

    #[test]
    fn test_decode_rejects_empty() {
        assert_eq!(decode(b"", SOURCE), Err(ParseError::Empty));
        assert_eq!(decode(b"  \n", SOURCE), Err(ParseError::Empty));
    }
}
