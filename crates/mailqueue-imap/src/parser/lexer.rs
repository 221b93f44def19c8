//! Tokenizer for one complete server response.
//!
//! The lexer runs over a frame that the [`wire`](super::wire) layer has
//! already checked for completeness, so running out of input is a parse
//! error here rather than a request for more bytes.

use crate::{Error, Result};

/// A lexical token. Literals borrow from the frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// Atom, including flags such as `\Seen`.
    Atom(&'a str),
    /// Quoted string with escapes resolved.
    Quoted(String),
    /// `{n}` literal payload.
    Literal(&'a [u8]),
    /// All-digit atom.
    Number(u64),
    /// `NIL`, any case.
    Nil,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// ` `
    Space,
    /// `*`
    Asterisk,
    /// `+`
    Plus,
    /// `\r\n`
    Crlf,
    /// End of the frame.
    Eof,
}

/// Cursor over a response frame.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    /// Starts at the beginning of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Current byte offset.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Next byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    /// Consumes one byte if it equals `byte`.
    pub fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Builds a parse error at the current offset.
    pub fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse {
            position: self.pos,
            message: message.into(),
        }
    }

    /// Reads the next token.
    pub fn next_token(&mut self) -> Result<Token<'a>> {
        let Some(byte) = self.peek() else {
            return Ok(Token::Eof);
        };
        let single = match byte {
            b'(' => Some(Token::LParen),
            b')' => Some(Token::RParen),
            b'[' => Some(Token::LBracket),
            b']' => Some(Token::RBracket),
            b' ' => Some(Token::Space),
            b'*' => Some(Token::Asterisk),
            b'+' => Some(Token::Plus),
            _ => None,
        };
        if let Some(token) = single {
            self.pos += 1;
            return Ok(token);
        }
        match byte {
            b'\r' if self.input.get(self.pos + 1) == Some(&b'\n') => {
                self.pos += 2;
                Ok(Token::Crlf)
            }
            b'"' => self.quoted(),
            b'{' => self.literal(),
            _ if is_atom_char(byte) => Ok(self.atom()),
            _ => Err(self.error(format!("unexpected byte {byte:#04x}"))),
        }
    }

    fn quoted(&mut self) -> Result<Token<'a>> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(escaped @ (b'"' | b'\\')) => out.push(escaped),
                        _ => return Err(self.error("bad escape in quoted string")),
                    }
                    self.pos += 1;
                }
                Some(b'\r' | b'\n') | None => {
                    return Err(self.error("unterminated quoted string"));
                }
                Some(other) => {
                    out.push(other);
                    self.pos += 1;
                }
            }
        }
        String::from_utf8(out)
            .map(Token::Quoted)
            .map_err(|_| self.error("quoted string is not UTF-8"))
    }

    fn literal(&mut self) -> Result<Token<'a>> {
        let (len, header) = literal_header(&self.input[self.pos..])
            .ok_or_else(|| self.error("malformed literal header"))?;
        let start = self.pos + header;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= self.input.len())
            .ok_or_else(|| self.error("literal runs past end of response"))?;
        self.pos = end;
        Ok(Token::Literal(&self.input[start..end]))
    }

    fn atom(&mut self) -> Token<'a> {
        let start = self.pos;
        while self.peek().is_some_and(is_atom_char) {
            self.pos += 1;
        }
        let bytes = &self.input[start..self.pos];
        // Atom bytes are a subset of ASCII.
        let text = std::str::from_utf8(bytes).unwrap_or_default();
        if bytes.iter().all(u8::is_ascii_digit)
            && let Ok(n) = text.parse()
        {
            return Token::Number(n);
        }
        if text.eq_ignore_ascii_case("NIL") {
            Token::Nil
        } else {
            Token::Atom(text)
        }
    }

    /// Consumes a space or fails.
    pub fn expect_space(&mut self) -> Result<()> {
        if self.eat(b' ') {
            Ok(())
        } else {
            Err(self.error("expected space"))
        }
    }

    /// Consumes `byte` or fails with `what`.
    pub fn expect_byte(&mut self, byte: u8, what: &str) -> Result<()> {
        if self.eat(byte) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    /// Reads an atom.
    pub fn atom_str(&mut self) -> Result<&'a str> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s),
            other => Err(self.error(format!("expected atom, got {other:?}"))),
        }
    }

    /// Reads a number that must fit 32 bits.
    pub fn number(&mut self) -> Result<u32> {
        let n = self.number64()?;
        u32::try_from(n).map_err(|_| self.error("number exceeds 32 bits"))
    }

    /// Reads a 63-bit number (mod-sequences, Gmail ids).
    pub fn number64(&mut self) -> Result<u64> {
        match self.next_token()? {
            Token::Number(n) => Ok(n),
            other => Err(self.error(format!("expected number, got {other:?}"))),
        }
    }

    /// Reads an astring: atom, number, quoted string or literal.
    pub fn astring(&mut self) -> Result<String> {
        match self.next_token()? {
            Token::Atom(s) => Ok(s.to_string()),
            Token::Number(n) => Ok(n.to_string()),
            Token::Quoted(s) => Ok(s),
            Token::Literal(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
            // NIL used as a mailbox name.
            Token::Nil => Ok("NIL".to_string()),
            other => Err(self.error(format!("expected string, got {other:?}"))),
        }
    }

    /// Reads an nstring: `NIL`, quoted string or literal.
    pub fn nstring(&mut self) -> Result<Option<String>> {
        match self.next_token()? {
            Token::Nil => Ok(None),
            Token::Quoted(s) => Ok(Some(s)),
            Token::Literal(bytes) => Ok(Some(String::from_utf8_lossy(bytes).into_owned())),
            other => Err(self.error(format!("expected nstring, got {other:?}"))),
        }
    }

    /// Consumes bytes while `keep` holds and returns them.
    pub fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(&keep) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// Returns the raw bytes up to (not including) `stop` or CR.
    pub fn raw_until(&mut self, stop: u8) -> &'a [u8] {
        self.take_while(|b| b != stop && b != b'\r')
    }

    /// Returns the rest of the line as text and consumes the CRLF.
    pub fn rest_of_line(&mut self) -> String {
        let text = String::from_utf8_lossy(self.raw_until(b'\r')).into_owned();
        if self.peek() == Some(b'\r') {
            self.pos = (self.pos + 2).min(self.input.len());
        }
        text
    }

    /// Skips one value: a token, or a balanced parenthesized group.
    ///
    /// Returns the raw bytes that were skipped.
    pub fn skip_value(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let mut depth = 0usize;
        loop {
            match self.next_token()? {
                Token::LParen => depth += 1,
                Token::RParen if depth > 0 => depth -= 1,
                Token::LBracket => {
                    self.raw_until(b']');
                    self.expect_byte(b']', "]")?;
                }
                Token::Crlf | Token::Eof | Token::RParen => {
                    return Err(self.error("value ended early"));
                }
                _ => {}
            }
            if depth == 0 {
                return Ok(&self.input[start..self.pos]);
            }
        }
    }
}

/// Parses a `{n}` or `{n+}` header followed by CRLF.
///
/// Returns the payload length and the header length including CRLF.
pub(crate) fn literal_header(input: &[u8]) -> Option<(usize, usize)> {
    let close = input.iter().position(|&b| b == b'}')?;
    let digits = input.get(1..close)?;
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let len = std::str::from_utf8(digits).ok()?.parse().ok()?;
    (input.get(close + 1..close + 3)? == b"\r\n").then_some((len, close + 3))
}

/// Atom characters, plus `\` so that flags lex as one atom.
#[must_use]
pub const fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7e)
        && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'[' | b']')
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

    fn tokens(input: &[u8]) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token().unwrap();
            if token == Token::Eof {
                return out;
            }
            out.push(token);
        }
    }

    #[test]
    fn tagged_line() {
        assert_eq!(
            tokens(b"x12 OK done\r\n"),
            vec![
                Token::Atom("x12"),
                Token::Space,
                Token::Atom("OK"),
                Token::Space,
                Token::Atom("done"),
                Token::Crlf,
            ]
        );
    }

    #[test]
    fn flags_and_numbers() {
        assert_eq!(
            tokens(b"(\\Seen $Junk) 18446744073709551615"),
            vec![
                Token::LParen,
                Token::Atom("\\Seen"),
                Token::Space,
                Token::Atom("$Junk"),
                Token::RParen,
                Token::Space,
                Token::Number(u64::MAX),
            ]
        );
    }

    #[test]
    fn quoted_escapes_and_nil() {
        assert_eq!(
            tokens(b"\"a \\\"b\\\\\" nil"),
            vec![
                Token::Quoted("a \"b\\".to_string()),
                Token::Space,
                Token::Nil
            ]
        );
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let mut lexer = Lexer::new(b"\"abc\r\n");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn literal_payload_may_contain_crlf() {
        let mut lexer = Lexer::new(b"{6}\r\nab\r\ncd)");
        assert_eq!(lexer.next_token().unwrap(), Token::Literal(b"ab\r\ncd"));
        assert_eq!(lexer.next_token().unwrap(), Token::RParen);
    }

    #[test]
    fn truncated_literal_is_an_error() {
        let mut lexer = Lexer::new(b"{10}\r\nshort");
        assert!(lexer.next_token().is_err());
    }

    #[test]
    fn literal_header_forms() {
        assert_eq!(literal_header(b"{5}\r\nhello"), Some((5, 5)));
        assert_eq!(literal_header(b"{12+}\r\n"), Some((12, 7)));
        assert_eq!(literal_header(b"{}\r\n"), None);
        assert_eq!(literal_header(b"{5}"), None);
    }

    #[test]
    fn skip_value_handles_nesting() {
        let mut lexer = Lexer::new(b"((\"a\" NIL) 3) rest");
        assert_eq!(lexer.skip_value().unwrap(), b"((\"a\" NIL) 3)");
        assert_eq!(lexer.next_token().unwrap(), Token::Space);
    }

    #[test]
    fn atom_chars() {
        assert!(is_atom_char(b'\\'));
        assert!(is_atom_char(b':'));
        assert!(!is_atom_char(b' '));
        assert!(!is_atom_char(b']'));
        assert!(!is_atom_char(b'{'));
    }
}
