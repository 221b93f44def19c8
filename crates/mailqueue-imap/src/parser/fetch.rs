//! FETCH data items.

use crate::parser::lexer::{Lexer, Token};
use crate::parser::response::parse_flag_list;
use crate::types::{Flags, Uid};
use crate::Result;

/// One data item from a `* n FETCH (...)` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchItem {
    /// `FLAGS (...)`
    Flags(Flags),
    /// `UID n`
    Uid(Uid),
    /// `RFC822.SIZE n`
    Rfc822Size(u32),
    /// `INTERNALDATE "..."`, as sent.
    InternalDate(String),
    /// `ENVELOPE (...)`
    Envelope(Box<Envelope>),
    /// `BODYSTRUCTURE (...)`, kept as the raw parenthesized text.
    BodyStructure(String),
    /// `BODY[section]<origin>`, `RFC822`, `RFC822.HEADER` or `RFC822.TEXT`.
    Body {
        /// Section text between the brackets; `None` for the RFC822 forms.
        section: Option<String>,
        /// Partial fetch origin.
        origin: Option<u32>,
        /// Payload; `None` when the server sent NIL.
        data: Option<Vec<u8>>,
    },
    /// `MODSEQ (n)`
    ModSeq(u64),
    /// `X-GM-MSGID n`
    GmailMessageId(u64),
    /// `X-GM-THRID n`
    GmailThreadId(u64),
    /// `X-GM-LABELS (...)`
    GmailLabels(Vec<String>),
}

/// Parsed ENVELOPE structure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From.
    pub from: Vec<Address>,
    /// Sender.
    pub sender: Vec<Address>,
    /// Reply-To.
    pub reply_to: Vec<Address>,
    /// To.
    pub to: Vec<Address>,
    /// Cc.
    pub cc: Vec<Address>,
    /// Bcc.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Address structure from an envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route, obsolete.
    pub adl: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain.
    pub host: Option<String>,
}

impl Address {
    /// `mailbox@host`, if both parts are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        Some(format!("{}@{}", self.mailbox.as_ref()?, self.host.as_ref()?))
    }
}

/// Parses the parenthesized item list after `FETCH `.
pub(crate) fn parse_fetch_items(lexer: &mut Lexer<'_>) -> Result<Vec<FetchItem>> {
    lexer.expect_byte(b'(', "( before fetch items")?;
    let mut items = Vec::new();
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(items),
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            other => return Err(lexer.error(format!("unexpected {other:?} in FETCH"))),
        };
        if let Some(item) = parse_item(lexer, &name)? {
            items.push(item);
        }
    }
}

fn parse_item(lexer: &mut Lexer<'_>, name: &str) -> Result<Option<FetchItem>> {
    if matches!(name, "BODY" | "BINARY") && lexer.peek() == Some(b'[') {
        return parse_body(lexer).map(Some);
    }
    lexer.expect_space()?;
    let item = match name {
        "FLAGS" => FetchItem::Flags(parse_flag_list(lexer)?),
        "UID" => {
            let n = lexer.number()?;
            FetchItem::Uid(Uid::new(n).ok_or_else(|| lexer.error("UID 0"))?)
        }
        "RFC822.SIZE" => FetchItem::Rfc822Size(lexer.number()?),
        "INTERNALDATE" => FetchItem::InternalDate(lexer.nstring()?.unwrap_or_default()),
        "ENVELOPE" => FetchItem::Envelope(Box::new(parse_envelope(lexer)?)),
        "BODYSTRUCTURE" | "BODY" => {
            let raw = lexer.skip_value()?;
            FetchItem::BodyStructure(String::from_utf8_lossy(raw).into_owned())
        }
        "RFC822" | "RFC822.HEADER" | "RFC822.TEXT" => FetchItem::Body {
            section: None,
            origin: None,
            data: read_payload(lexer)?,
        },
        "MODSEQ" => {
            lexer.expect_byte(b'(', "( before MODSEQ value")?;
            let n = lexer.number64()?;
            lexer.expect_byte(b')', ") after MODSEQ value")?;
            FetchItem::ModSeq(n)
        }
        "X-GM-MSGID" => FetchItem::GmailMessageId(lexer.number64()?),
        "X-GM-THRID" => FetchItem::GmailThreadId(lexer.number64()?),
        "X-GM-LABELS" => FetchItem::GmailLabels(parse_labels(lexer)?),
        _ => {
            lexer.skip_value()?;
            return Ok(None);
        }
    };
    Ok(Some(item))
}

/// `[section]<origin> payload`; the name is already consumed.
fn parse_body(lexer: &mut Lexer<'_>) -> Result<FetchItem> {
    lexer.expect_byte(b'[', "[")?;
    // Sections such as HEADER.FIELDS (A B) contain spaces and parens.
    let section = String::from_utf8_lossy(lexer.raw_until(b']')).into_owned();
    lexer.expect_byte(b']', "] after section")?;
    let origin = if lexer.eat(b'<') {
        // `>` is an atom char, so the digits are taken by hand.
        let digits = lexer.take_while(|b| b.is_ascii_digit());
        let n = std::str::from_utf8(digits)
            .ok()
            .and_then(|d| d.parse().ok())
            .ok_or_else(|| lexer.error("expected origin number"))?;
        lexer.expect_byte(b'>', "> after origin")?;
        Some(n)
    } else {
        None
    };
    lexer.expect_space()?;
    Ok(FetchItem::Body {
        section: (!section.is_empty()).then_some(section),
        origin,
        data: read_payload(lexer)?,
    })
}

fn read_payload(lexer: &mut Lexer<'_>) -> Result<Option<Vec<u8>>> {
    match lexer.next_token()? {
        Token::Nil => Ok(None),
        Token::Literal(bytes) => Ok(Some(bytes.to_vec())),
        Token::Quoted(text) => Ok(Some(text.into_bytes())),
        other => Err(lexer.error(format!("expected body payload, got {other:?}"))),
    }
}

fn parse_labels(lexer: &mut Lexer<'_>) -> Result<Vec<String>> {
    lexer.expect_byte(b'(', "( before labels")?;
    let mut labels = Vec::new();
    loop {
        if lexer.eat(b')') {
            return Ok(labels);
        }
        if !lexer.eat(b' ') {
            labels.push(lexer.astring()?);
        }
    }
}

fn parse_envelope(lexer: &mut Lexer<'_>) -> Result<Envelope> {
    lexer.expect_byte(b'(', "( before envelope")?;
    let date = lexer.nstring()?;
    lexer.expect_space()?;
    let subject = lexer.nstring()?;
    let mut lists: [Vec<Address>; 6] = Default::default();
    for list in &mut lists {
        lexer.expect_space()?;
        *list = parse_addresses(lexer)?;
    }
    lexer.expect_space()?;
    let in_reply_to = lexer.nstring()?;
    lexer.expect_space()?;
    let message_id = lexer.nstring()?;
    lexer.expect_byte(b')', ") after envelope")?;
    let [from, sender, reply_to, to, cc, bcc] = lists;
    Ok(Envelope {
        date,
        subject,
        from,
        sender,
        reply_to,
        to,
        cc,
        bcc,
        in_reply_to,
        message_id,
    })
}

fn parse_addresses(lexer: &mut Lexer<'_>) -> Result<Vec<Address>> {
    match lexer.next_token()? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut addresses = Vec::new();
            loop {
                match lexer.next_token()? {
                    Token::RParen => return Ok(addresses),
                    Token::Space => {}
                    Token::LParen => {
                        let mut parts: [Option<String>; 4] = Default::default();
                        for (i, part) in parts.iter_mut().enumerate() {
                            if i > 0 {
                                lexer.expect_space()?;
                            }
                            *part = lexer.nstring()?;
                        }
                        lexer.expect_byte(b')', ") after address")?;
                        let [name, adl, mailbox, host] = parts;
                        addresses.push(Address {
                            name,
                            adl,
                            mailbox,
                            host,
                        });
                    }
                    other => {
                        return Err(lexer.error(format!("unexpected {other:?} in address list")));
                    }
                }
            }
        }
        other => Err(lexer.error(format!("expected address list, got {other:?}"))),
    }
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
    use crate::types::Flag;

    fn items(input: &[u8]) -> Vec<FetchItem> {
        parse_fetch_items(&mut Lexer::new(input)).unwrap()
    }

    #[test]
    fn flags_uid_and_size() {
        let parsed = items(b"(FLAGS (\\Seen) UID 4827313 RFC822.SIZE 44827)");
        assert_eq!(
            parsed,
            vec![
                FetchItem::Flags([Flag::Seen].into_iter().collect()),
                FetchItem::Uid(Uid::new(4827313).unwrap()),
                FetchItem::Rfc822Size(44827),
            ]
        );
    }

    #[test]
    fn body_section_with_literal_and_origin() {
        let parsed = items(b"(BODY[HEADER.FIELDS (SUBJECT)]<0> {21}\r\nSubject: hi there\r\n\r\n)");
        assert_eq!(
            parsed,
            vec![FetchItem::Body {
                section: Some("HEADER.FIELDS (SUBJECT)".to_string()),
                origin: Some(0),
                data: Some(b"Subject: hi there\r\n\r\n".to_vec()),
            }]
        );
    }

    #[test]
    fn partial_origin_followed_by_more_items() {
        let parsed = items(b"(BODY[TEXT]<1024> \"abc\" UID 7)");
        assert_eq!(
            parsed,
            vec![
                FetchItem::Body {
                    section: Some("TEXT".to_string()),
                    origin: Some(1024),
                    data: Some(b"abc".to_vec()),
                },
                FetchItem::Uid(Uid::new(7).unwrap()),
            ]
        );
        assert!(parse_fetch_items(&mut Lexer::new(b"(BODY[TEXT]<> \"abc\")")).is_err());
    }

    #[test]
    fn whole_body_and_nil_payload() {
        let parsed = items(b"(BODY[] NIL RFC822.TEXT \"abc\")");
        assert_eq!(
            parsed,
            vec![
                FetchItem::Body {
                    section: None,
                    origin: None,
                    data: None,
                },
                FetchItem::Body {
                    section: None,
                    origin: None,
                    data: Some(b"abc".to_vec()),
                },
            ]
        );
    }

    #[test]
    fn envelope_with_addresses() {
        let parsed = items(
            b"(ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700\" \"Plans\" \
              ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) NIL NIL \
              ((NIL NIL \"imap\" \"cac.washington.edu\")) NIL NIL NIL \"<B27397-0100000@cac>\"))",
        );
        let [FetchItem::Envelope(envelope)] = parsed.as_slice() else {
            panic!("expected one envelope, got {parsed:?}");
        };
        assert_eq!(envelope.subject.as_deref(), Some("Plans"));
        assert_eq!(
            envelope.from[0].email().as_deref(),
            Some("gray@cac.washington.edu")
        );
        assert!(envelope.sender.is_empty());
        assert_eq!(envelope.to[0].name, None);
        assert_eq!(envelope.message_id.as_deref(), Some("<B27397-0100000@cac>"));
    }

    #[test]
    fn condstore_and_gmail_items() {
        let parsed = items(
            b"(MODSEQ (12121231000) X-GM-MSGID 1278455344230334865 X-GM-LABELS (\\Inbox \"Work Stuff\"))",
        );
        assert_eq!(
            parsed,
            vec![
                FetchItem::ModSeq(12121231000),
                FetchItem::GmailMessageId(1278455344230334865),
                FetchItem::GmailLabels(vec!["\\Inbox".to_string(), "Work Stuff".to_string()]),
            ]
        );
    }

    #[test]
    fn bodystructure_is_kept_raw_and_unknown_items_skipped() {
        let parsed = items(b"(BODYSTRUCTURE (\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 3 1) PREVIEW \"x\" UID 7)");
        assert_eq!(
            parsed,
            vec![
                FetchItem::BodyStructure("(\"TEXT\" \"PLAIN\" NIL NIL NIL \"7BIT\" 3 1)".to_string()),
                FetchItem::Uid(Uid::new(7).unwrap()),
            ]
        );
    }
}
