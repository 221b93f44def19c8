//! Incremental parse contract used by the session engine.
//!
//! [`parse`] is a pure function of the accumulated receive buffer: it keeps
//! no state between calls and re-examines the buffer from the start each
//! time. It either asks for more bytes, or yields the first complete
//! response together with the number of bytes it occupied.

use crate::parser::lexer::literal_header;
use crate::parser::response::{Response, ResponseParser, UntaggedResponse};
use crate::types::Status;
use crate::{Error, Result};

/// Longest response line accepted, excluding literal payloads.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Largest literal payload accepted.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024;

/// Which responses the current exchange can accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The first line after connect: `* OK`, `* PREAUTH` or `* BYE`.
    Greeting,
    /// Tagged or untagged responses only.
    Response,
    /// Tagged, untagged, or a `+` continuation request.
    ResponseOrContinuation,
}

/// Outcome of one [`parse`] call.
#[derive(Debug)]
pub enum Parsed {
    /// The buffer does not yet hold a complete response.
    NeedsMoreData,
    /// A complete response occupying the first `consumed` bytes.
    Ok {
        /// The parsed response.
        response: Response,
        /// Bytes to drop from the front of the buffer.
        consumed: usize,
    },
    /// The first response is malformed or not acceptable in this mode.
    Error {
        /// What went wrong.
        error: Error,
        /// Bytes to drop from the front of the buffer.
        consumed: usize,
    },
}

/// Parses the first response in `buffer` under `mode`.
#[must_use]
pub fn parse(buffer: &[u8], mode: Mode) -> Parsed {
    let consumed = match frame_len(buffer) {
        Ok(Some(len)) => len,
        Ok(None) => return Parsed::NeedsMoreData,
        Err(error) => {
            return Parsed::Error {
                error,
                consumed: buffer.len(),
            };
        }
    };
    let result = ResponseParser::parse(&buffer[..consumed]).and_then(|response| {
        check_mode(&response, mode)?;
        Ok(response)
    });
    match result {
        Ok(response) => Parsed::Ok { response, consumed },
        Err(error) => Parsed::Error { error, consumed },
    }
}

fn check_mode(response: &Response, mode: Mode) -> Result<()> {
    match (mode, response) {
        (
            Mode::Greeting,
            Response::Untagged(UntaggedResponse::Status {
                status: Status::Ok | Status::PreAuth | Status::Bye,
                ..
            }),
        )
        | (Mode::Response, Response::Tagged { .. } | Response::Untagged(_))
        | (Mode::ResponseOrContinuation, _) => Ok(()),
        (Mode::Greeting, _) => Err(Error::Protocol("expected server greeting".to_string())),
        (Mode::Response, Response::Continuation { .. }) => Err(Error::Protocol(
            "unexpected continuation request".to_string(),
        )),
    }
}

/// Length of the first complete response, literals included.
///
/// A line ending in `{n}` continues after `n` payload bytes, possibly with
/// further literals, until a line ends without one.
pub fn frame_len(buffer: &[u8]) -> Result<Option<usize>> {
    let mut start = 0;
    loop {
        let rest = &buffer[start..];
        let Some(lf) = rest.windows(2).position(|w| w == b"\r\n") else {
            if rest.len() > MAX_LINE_LENGTH {
                return Err(Error::Protocol("response line too long".to_string()));
            }
            return Ok(None);
        };
        if lf > MAX_LINE_LENGTH {
            return Err(Error::Protocol("response line too long".to_string()));
        }
        let line_end = start + lf + 2;
        let Some(len) = trailing_literal(&buffer[start..line_end]) else {
            return Ok(Some(line_end));
        };
        if len > MAX_LITERAL_SIZE {
            return Err(Error::Protocol(format!("literal of {len} bytes is too large")));
        }
        start = line_end + len;
        if start > buffer.len() {
            return Ok(None);
        }
    }
}

/// Payload length announced at the end of a CRLF-terminated line.
fn trailing_literal(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"\r\n")?;
    if !body.ends_with(b"}") {
        return None;
    }
    let open = body.iter().rposition(|&b| b == b'{')?;
    literal_header(&line[open..]).map(|(len, _)| len)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn partial_line_needs_more_data() {
        assert!(matches!(parse(b"* OK IMAP4rev1 rea", Mode::Greeting), Parsed::NeedsMoreData));
        assert!(matches!(parse(b"", Mode::Response), Parsed::NeedsMoreData));
    }

    #[test]
    fn complete_line_reports_consumed_bytes() {
        let buf = b"* 3 EXISTS\r\nx1 OK done\r\n";
        let Parsed::Ok { response, consumed } = parse(buf, Mode::Response) else {
            panic!("expected a response");
        };
        assert_eq!(consumed, 12);
        assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
        assert!(matches!(parse(&buf[consumed..], Mode::Response), Parsed::Ok { .. }));
    }

    #[test]
    fn reparsing_a_growing_buffer_is_stable() {
        let full = b"* 1 FETCH (BODY[] {5}\r\nhello)\r\n";
        for cut in 0..full.len() {
            assert!(
                matches!(parse(&full[..cut], Mode::Response), Parsed::NeedsMoreData),
                "cut at {cut}"
            );
        }
        assert!(matches!(
            parse(full, Mode::Response),
            Parsed::Ok { consumed, .. } if consumed == full.len()
        ));
    }

    #[test]
    fn frame_spans_several_literals() {
        let buf = b"* LIST () {1}\r\n/ {3}\r\nabc\r\nx2 OK\r\n";
        assert_eq!(frame_len(buf).unwrap(), Some(27));
    }

    #[test]
    fn literal_payload_can_end_with_brace() {
        let buf = b"* 1 FETCH (BODY[] {3}\r\n{2})\r\n";
        assert_eq!(frame_len(buf).unwrap(), Some(buf.len()));
    }

    #[test]
    fn continuation_is_rejected_outside_its_mode() {
        assert!(matches!(parse(b"+ go\r\n", Mode::Response), Parsed::Error { consumed: 6, .. }));
        assert!(matches!(
            parse(b"+ go\r\n", Mode::ResponseOrContinuation),
            Parsed::Ok { response: Response::Continuation { .. }, .. }
        ));
    }

    #[test]
    fn greeting_mode_accepts_status_greetings_only() {
        assert!(matches!(parse(b"* PREAUTH hi\r\n", Mode::Greeting), Parsed::Ok { .. }));
        assert!(matches!(parse(b"* BYE busy\r\n", Mode::Greeting), Parsed::Ok { .. }));
        assert!(matches!(parse(b"* 1 EXISTS\r\n", Mode::Greeting), Parsed::Error { .. }));
    }

    #[test]
    fn malformed_line_is_consumed() {
        let Parsed::Error { consumed, .. } = parse(b"((bad\r\nx1 OK\r\n", Mode::Response) else {
            panic!("expected an error");
        };
        assert_eq!(consumed, 7);
    }

    #[test]
    fn overlong_line_is_an_error() {
        let buf = vec![b'a'; MAX_LINE_LENGTH + 1];
        assert!(matches!(parse(&buf, Mode::Response), Parsed::Error { .. }));
    }
}
