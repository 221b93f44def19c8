//! Structured server responses and the parser that builds them.

use crate::parser::fetch::{FetchItem, parse_fetch_items};
use crate::parser::lexer::{Lexer, Token};
use crate::types::{
    AppendUid, Capability, CopyUid, Flag, Flags, ListResponse, Mailbox, MailboxAttribute,
    ResponseCode, SeqNum, Status, Tag, Uid, UidSet, UidValidity,
};
use crate::Result;

/// One complete server response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Command completion carrying the command's tag.
    Tagged {
        /// Echoed tag.
        tag: Tag,
        /// Completion status.
        status: Status,
        /// Optional bracketed code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// Server data (`* ...`).
    Untagged(UntaggedResponse),
    /// Continuation request (`+ ...`).
    Continuation {
        /// Text after the `+`, if any.
        text: Option<String>,
    },
}

/// Untagged server data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// `* OK|NO|BAD|PREAUTH|BYE [code] text`
    Status {
        /// Status word.
        status: Status,
        /// Optional bracketed code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// `* CAPABILITY ...`
    Capability(Vec<Capability>),
    /// `* FLAGS (...)`
    Flags(Flags),
    /// `* LIST (...) "/" name`
    List(ListResponse),
    /// `* LSUB (...) "/" name`
    Lsub(ListResponse),
    /// `* SEARCH n n n`
    Search(Vec<u32>),
    /// `* STATUS name (...)`
    MailboxStatus {
        /// Mailbox the counters belong to.
        mailbox: Mailbox,
        /// Reported counters.
        items: Vec<StatusItem>,
    },
    /// `* ID (...)` or `* ID NIL`
    Id(Option<Vec<(String, Option<String>)>>),
    /// `* ENABLED ...`
    Enabled(Vec<Capability>),
    /// `* n EXISTS`
    Exists(u32),
    /// `* n RECENT`
    Recent(u32),
    /// `* n EXPUNGE`
    Expunge(SeqNum),
    /// `* n FETCH (...)`
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Returned data items.
        items: Vec<FetchItem>,
    },
    /// Anything this parser does not model, kept so the exchange can go on.
    Unknown {
        /// Response keyword (with its number prefix, if any).
        keyword: String,
        /// Remaining text.
        text: String,
    },
}

/// One counter from a STATUS response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusItem {
    /// `MESSAGES`
    Messages(u32),
    /// `RECENT`
    Recent(u32),
    /// `UIDNEXT`
    UidNext(Uid),
    /// `UIDVALIDITY`
    UidValidity(UidValidity),
    /// `UNSEEN`
    Unseen(u32),
    /// `HIGHESTMODSEQ`
    HighestModSeq(u64),
}

/// Parses complete response frames.
pub struct ResponseParser;

impl ResponseParser {
    /// Parses one frame, which must include its trailing CRLF.
    pub fn parse(frame: &[u8]) -> Result<Response> {
        let mut lexer = Lexer::new(frame);
        let response = match lexer.next_token()? {
            Token::Asterisk => {
                lexer.expect_space()?;
                Response::Untagged(parse_untagged(&mut lexer)?)
            }
            Token::Plus => {
                lexer.eat(b' ');
                let text = lexer.rest_of_line();
                Response::Continuation {
                    text: (!text.is_empty()).then_some(text),
                }
            }
            Token::Atom(tag) => {
                lexer.expect_space()?;
                let word = lexer.atom_str()?;
                let status = Status::parse(word)
                    .ok_or_else(|| lexer.error(format!("invalid status {word}")))?;
                let (code, text) = parse_resp_text(&mut lexer)?;
                Response::Tagged {
                    tag: Tag::new(tag),
                    status,
                    code,
                    text,
                }
            }
            other => return Err(lexer.error(format!("expected *, + or tag, got {other:?}"))),
        };
        Ok(response)
    }
}

fn parse_untagged(lexer: &mut Lexer<'_>) -> Result<UntaggedResponse> {
    match lexer.next_token()? {
        Token::Number(n) => {
            let n = u32::try_from(n).map_err(|_| lexer.error("message number too large"))?;
            lexer.expect_space()?;
            let keyword = lexer.atom_str()?;
            parse_message_data(lexer, n, keyword)
        }
        Token::Atom(keyword) => parse_keyword(lexer, keyword),
        other => Err(lexer.error(format!("unexpected {other:?} after *"))),
    }
}

fn parse_message_data(lexer: &mut Lexer<'_>, n: u32, keyword: &str) -> Result<UntaggedResponse> {
    let data = match keyword.to_ascii_uppercase().as_str() {
        "EXISTS" => UntaggedResponse::Exists(n),
        "RECENT" => UntaggedResponse::Recent(n),
        "EXPUNGE" => UntaggedResponse::Expunge(seq_num(lexer, n)?),
        "FETCH" => {
            let seq = seq_num(lexer, n)?;
            lexer.expect_space()?;
            UntaggedResponse::Fetch {
                seq,
                items: parse_fetch_items(lexer)?,
            }
        }
        _ => {
            lexer.eat(b' ');
            UntaggedResponse::Unknown {
                keyword: format!("{n} {keyword}"),
                text: lexer.rest_of_line(),
            }
        }
    };
    Ok(data)
}

fn seq_num(lexer: &Lexer<'_>, n: u32) -> Result<SeqNum> {
    SeqNum::new(n).ok_or_else(|| lexer.error("sequence number 0"))
}

fn parse_keyword(lexer: &mut Lexer<'_>, keyword: &str) -> Result<UntaggedResponse> {
    if let Some(status) = Status::parse(keyword) {
        let (code, text) = parse_resp_text(lexer)?;
        return Ok(UntaggedResponse::Status { status, code, text });
    }
    let data = match keyword.to_ascii_uppercase().as_str() {
        "CAPABILITY" => UntaggedResponse::Capability(parse_atom_list(lexer)?),
        "ENABLED" => UntaggedResponse::Enabled(parse_atom_list(lexer)?),
        "FLAGS" => {
            lexer.expect_space()?;
            UntaggedResponse::Flags(parse_flag_list(lexer)?)
        }
        "LIST" => {
            lexer.expect_space()?;
            UntaggedResponse::List(parse_list(lexer)?)
        }
        "LSUB" => {
            lexer.expect_space()?;
            UntaggedResponse::Lsub(parse_list(lexer)?)
        }
        "SEARCH" => UntaggedResponse::Search(parse_search(lexer)?),
        "STATUS" => {
            lexer.expect_space()?;
            let mailbox = Mailbox::new(lexer.astring()?);
            lexer.expect_space()?;
            UntaggedResponse::MailboxStatus {
                mailbox,
                items: parse_status_items(lexer)?,
            }
        }
        "ID" => {
            lexer.expect_space()?;
            UntaggedResponse::Id(parse_id_params(lexer)?)
        }
        _ => {
            lexer.eat(b' ');
            UntaggedResponse::Unknown {
                keyword: keyword.to_string(),
                text: lexer.rest_of_line(),
            }
        }
    };
    Ok(data)
}

/// `[code] text`, with the leading space optional for bare `x1 OK`.
fn parse_resp_text(lexer: &mut Lexer<'_>) -> Result<(Option<ResponseCode>, String)> {
    lexer.eat(b' ');
    let code = if lexer.eat(b'[') {
        Some(parse_response_code(lexer)?)
    } else {
        None
    };
    lexer.eat(b' ');
    Ok((code, lexer.rest_of_line()))
}

/// Parses a response code; the `[` is already consumed.
pub(crate) fn parse_response_code(lexer: &mut Lexer<'_>) -> Result<ResponseCode> {
    let name = lexer.atom_str()?.to_ascii_uppercase();
    let code = match name.as_str() {
        "ALERT" => ResponseCode::Alert,
        "PARSE" => ResponseCode::Parse,
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "NOMODSEQ" => ResponseCode::NoModSeq,
        "CAPABILITY" => ResponseCode::Capability(parse_atom_list(lexer)?),
        "PERMANENTFLAGS" => {
            lexer.expect_space()?;
            ResponseCode::PermanentFlags(parse_flag_list(lexer)?.into_iter().collect())
        }
        "UIDNEXT" => {
            lexer.expect_space()?;
            let n = lexer.number()?;
            ResponseCode::UidNext(Uid::new(n).ok_or_else(|| lexer.error("UIDNEXT 0"))?)
        }
        "UIDVALIDITY" => {
            lexer.expect_space()?;
            ResponseCode::UidValidity(parse_validity(lexer)?)
        }
        "UNSEEN" => {
            lexer.expect_space()?;
            let n = lexer.number()?;
            ResponseCode::Unseen(SeqNum::new(n).ok_or_else(|| lexer.error("UNSEEN 0"))?)
        }
        "HIGHESTMODSEQ" => {
            lexer.expect_space()?;
            ResponseCode::HighestModSeq(lexer.number64()?)
        }
        "APPENDUID" => {
            lexer.expect_space()?;
            let uid_validity = parse_validity(lexer)?;
            lexer.expect_space()?;
            let uids = parse_uid_set(lexer)?;
            ResponseCode::AppendUid(AppendUid { uid_validity, uids })
        }
        "COPYUID" => {
            lexer.expect_space()?;
            let uid_validity = parse_validity(lexer)?;
            lexer.expect_space()?;
            let source = parse_uid_set(lexer)?;
            lexer.expect_space()?;
            let destination = parse_uid_set(lexer)?;
            ResponseCode::CopyUid(CopyUid {
                uid_validity,
                source,
                destination,
            })
        }
        _ => {
            let raw = lexer.raw_until(b']');
            let text = String::from_utf8_lossy(raw).trim().to_string();
            ResponseCode::Other {
                name,
                text: (!text.is_empty()).then_some(text),
            }
        }
    };
    lexer.raw_until(b']');
    lexer.expect_byte(b']', "] after response code")?;
    Ok(code)
}

fn parse_validity(lexer: &mut Lexer<'_>) -> Result<UidValidity> {
    let n = lexer.number()?;
    UidValidity::new(n).ok_or_else(|| lexer.error("UIDVALIDITY 0"))
}

fn parse_uid_set(lexer: &mut Lexer<'_>) -> Result<Vec<Uid>> {
    let raw = lexer.take_while(|b| b.is_ascii_digit() || b == b':' || b == b',');
    let text = String::from_utf8_lossy(raw);
    UidSet::expand(&text).ok_or_else(|| lexer.error(format!("invalid uid-set {text}")))
}

/// Space-prefixed atoms up to the end of the line or a `]`.
fn parse_atom_list(lexer: &mut Lexer<'_>) -> Result<Vec<Capability>> {
    let mut list = Vec::new();
    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Atom(atom) => list.push(Capability::parse(atom)),
            Token::Number(n) => list.push(Capability::parse(&n.to_string())),
            other => return Err(lexer.error(format!("unexpected {other:?} in capability list"))),
        }
    }
    Ok(list)
}

/// `(\Flag \Flag ...)`
pub(crate) fn parse_flag_list(lexer: &mut Lexer<'_>) -> Result<Flags> {
    lexer.expect_byte(b'(', "( before flag list")?;
    let mut flags = Flags::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => return Ok(flags),
            Token::Space => {}
            Token::Atom(atom) => {
                // `\*` lexes as a lone backslash followed by an asterisk.
                let flag = if atom == "\\" && lexer.eat(b'*') {
                    Flag::MayCreate
                } else {
                    Flag::parse(atom)
                };
                flags.insert(flag);
            }
            other => return Err(lexer.error(format!("unexpected {other:?} in flag list"))),
        }
    }
}

fn parse_list(lexer: &mut Lexer<'_>) -> Result<ListResponse> {
    lexer.expect_byte(b'(', "( before name attributes")?;
    let mut attributes = Vec::new();
    loop {
        match lexer.next_token()? {
            Token::RParen => break,
            Token::Space => {}
            Token::Atom(atom) => attributes.push(MailboxAttribute::parse(atom)),
            other => return Err(lexer.error(format!("unexpected {other:?} in attributes"))),
        }
    }
    lexer.expect_space()?;
    let delimiter = lexer.nstring()?.and_then(|d| d.chars().next());
    lexer.expect_space()?;
    let mailbox = Mailbox::new(lexer.astring()?);
    Ok(ListResponse {
        attributes,
        delimiter,
        mailbox,
    })
}

fn parse_search(lexer: &mut Lexer<'_>) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    while lexer.eat(b' ') {
        match lexer.next_token()? {
            Token::Number(n) => {
                ids.push(u32::try_from(n).map_err(|_| lexer.error("search id too large"))?);
            }
            // `(MODSEQ n)` trailer from CONDSTORE searches.
            Token::LParen => {
                lexer.raw_until(b')');
                lexer.expect_byte(b')', ")")?;
            }
            other => return Err(lexer.error(format!("unexpected {other:?} in SEARCH"))),
        }
    }
    Ok(ids)
}

fn parse_status_items(lexer: &mut Lexer<'_>) -> Result<Vec<StatusItem>> {
    lexer.expect_byte(b'(', "( before status items")?;
    let mut items = Vec::new();
    loop {
        let name = match lexer.next_token()? {
            Token::RParen => return Ok(items),
            Token::Space => continue,
            Token::Atom(name) => name.to_ascii_uppercase(),
            other => return Err(lexer.error(format!("unexpected {other:?} in STATUS"))),
        };
        lexer.expect_space()?;
        let value = lexer.number64()?;
        let small = u32::try_from(value).ok();
        let item = match name.as_str() {
            "MESSAGES" => small.map(StatusItem::Messages),
            "RECENT" => small.map(StatusItem::Recent),
            "UNSEEN" => small.map(StatusItem::Unseen),
            "UIDNEXT" => small.and_then(Uid::new).map(StatusItem::UidNext),
            "UIDVALIDITY" => small.and_then(UidValidity::new).map(StatusItem::UidValidity),
            "HIGHESTMODSEQ" => Some(StatusItem::HighestModSeq(value)),
            _ => None,
        };
        items.extend(item);
    }
}

fn parse_id_params(lexer: &mut Lexer<'_>) -> Result<Option<Vec<(String, Option<String>)>>> {
    match lexer.next_token()? {
        Token::Nil => Ok(None),
        Token::LParen => {
            let mut params = Vec::new();
            loop {
                if lexer.eat(b')') {
                    return Ok(Some(params));
                }
                lexer.eat(b' ');
                let key = lexer.nstring()?.unwrap_or_default();
                lexer.expect_space()?;
                let value = lexer.nstring()?;
                params.push((key, value));
            }
        }
        other => Err(lexer.error(format!("expected ID parameter list, got {other:?}"))),
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

    fn untagged(line: &[u8]) -> UntaggedResponse {
        match ResponseParser::parse(line).unwrap() {
            Response::Untagged(data) => data,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    #[test]
    fn greeting_with_capability_code() {
        let data = untagged(b"* OK [CAPABILITY IMAP4rev1 IDLE AUTH=XOAUTH2] ready\r\n");
        let UntaggedResponse::Status { status, code, text } = data else {
            panic!("expected status");
        };
        assert_eq!(status, Status::Ok);
        assert_eq!(text, "ready");
        assert_eq!(
            code,
            Some(ResponseCode::Capability(vec![
                Capability::Imap4Rev1,
                Capability::Idle,
                Capability::Auth("XOAUTH2".to_string()),
            ]))
        );
    }

    #[test]
    fn tagged_without_text() {
        let response = ResponseParser::parse(b"x3 OK\r\n").unwrap();
        assert_eq!(
            response,
            Response::Tagged {
                tag: Tag::new("x3"),
                status: Status::Ok,
                code: None,
                text: String::new(),
            }
        );
    }

    #[test]
    fn tagged_no_with_trycreate() {
        let response = ResponseParser::parse(b"x9 NO [TRYCREATE] no such mailbox\r\n").unwrap();
        let Response::Tagged { status, code, .. } = response else {
            panic!("expected tagged");
        };
        assert_eq!(status, Status::No);
        assert_eq!(code, Some(ResponseCode::TryCreate));
    }

    #[test]
    fn continuation_with_and_without_text() {
        assert_eq!(
            ResponseParser::parse(b"+ idling\r\n").unwrap(),
            Response::Continuation {
                text: Some("idling".to_string())
            }
        );
        assert_eq!(
            ResponseParser::parse(b"+\r\n").unwrap(),
            Response::Continuation { text: None }
        );
    }

    #[test]
    fn appenduid_and_copyuid_codes() {
        let response = ResponseParser::parse(b"x4 OK [APPENDUID 38505 3955] done\r\n").unwrap();
        let Response::Tagged { code, .. } = response else {
            panic!("expected tagged");
        };
        assert_eq!(
            code,
            Some(ResponseCode::AppendUid(AppendUid {
                uid_validity: UidValidity::new(38505).unwrap(),
                uids: vec![Uid::new(3955).unwrap()],
            }))
        );

        let response =
            ResponseParser::parse(b"x5 OK [COPYUID 38505 304,319:320 3956:3958] done\r\n")
                .unwrap();
        let Response::Tagged {
            code: Some(ResponseCode::CopyUid(copy)),
            ..
        } = response
        else {
            panic!("expected COPYUID");
        };
        let source: Vec<u32> = copy.source.iter().map(|u| u.get()).collect();
        let dest: Vec<u32> = copy.destination.iter().map(|u| u.get()).collect();
        assert_eq!(source, vec![304, 319, 320]);
        assert_eq!(dest, vec![3956, 3957, 3958]);
    }

    #[test]
    fn select_data() {
        assert_eq!(untagged(b"* 172 EXISTS\r\n"), UntaggedResponse::Exists(172));
        assert_eq!(untagged(b"* 1 RECENT\r\n"), UntaggedResponse::Recent(1));
        let UntaggedResponse::Flags(flags) =
            untagged(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
        else {
            panic!("expected FLAGS");
        };
        assert_eq!(flags.len(), 5);
        let UntaggedResponse::Status {
            code: Some(ResponseCode::PermanentFlags(flags)),
            ..
        } = untagged(b"* OK [PERMANENTFLAGS (\\Deleted \\Seen \\*)] Limited\r\n")
        else {
            panic!("expected PERMANENTFLAGS");
        };
        assert_eq!(flags, vec![Flag::Deleted, Flag::Seen, Flag::MayCreate]);
    }

    #[test]
    fn list_and_lsub() {
        let UntaggedResponse::List(list) =
            untagged(b"* LIST (\\HasNoChildren \\Sent) \"/\" \"Sent Items\"\r\n")
        else {
            panic!("expected LIST");
        };
        assert_eq!(list.delimiter, Some('/'));
        assert_eq!(list.mailbox.as_str(), "Sent Items");
        assert!(list.attributes.contains(&MailboxAttribute::Sent));

        let UntaggedResponse::Lsub(lsub) = untagged(b"* LSUB () NIL INBOX\r\n") else {
            panic!("expected LSUB");
        };
        assert_eq!(lsub.delimiter, None);
        assert!(lsub.mailbox.is_inbox());
    }

    #[test]
    fn list_name_as_literal() {
        let UntaggedResponse::List(list) = untagged(b"* LIST () \".\" {8}\r\nweird\"nm\r\n") else {
            panic!("expected LIST");
        };
        assert_eq!(list.mailbox.as_str(), "weird\"nm");
    }

    #[test]
    fn search_ignores_modseq_trailer() {
        assert_eq!(
            untagged(b"* SEARCH 2 84 882 (MODSEQ 917162500)\r\n"),
            UntaggedResponse::Search(vec![2, 84, 882])
        );
        assert_eq!(untagged(b"* SEARCH\r\n"), UntaggedResponse::Search(vec![]));
    }

    #[test]
    fn status_items() {
        let UntaggedResponse::MailboxStatus { mailbox, items } = untagged(
            b"* STATUS \"INBOX\" (MESSAGES 231 UIDNEXT 44292 UNSEEN 3 HIGHESTMODSEQ 7011231777)\r\n",
        ) else {
            panic!("expected STATUS");
        };
        assert!(mailbox.is_inbox());
        assert_eq!(
            items,
            vec![
                StatusItem::Messages(231),
                StatusItem::UidNext(Uid::new(44292).unwrap()),
                StatusItem::Unseen(3),
                StatusItem::HighestModSeq(7011231777),
            ]
        );
    }

    #[test]
    fn id_and_enabled() {
        assert_eq!(
            untagged(b"* ID (\"name\" \"Dovecot\" \"version\" NIL)\r\n"),
            UntaggedResponse::Id(Some(vec![
                ("name".to_string(), Some("Dovecot".to_string())),
                ("version".to_string(), None),
            ]))
        );
        assert_eq!(untagged(b"* ID NIL\r\n"), UntaggedResponse::Id(None));
        assert_eq!(
            untagged(b"* ENABLED CONDSTORE\r\n"),
            UntaggedResponse::Enabled(vec![Capability::CondStore])
        );
    }

    #[test]
    fn unknown_keywords_are_kept() {
        assert_eq!(
            untagged(b"* NAMESPACE ((\"\" \"/\")) NIL NIL\r\n"),
            UntaggedResponse::Unknown {
                keyword: "NAMESPACE".to_string(),
                text: "((\"\" \"/\")) NIL NIL".to_string(),
            }
        );
        assert_eq!(
            untagged(b"* 3 VANISHED\r\n"),
            UntaggedResponse::Unknown {
                keyword: "3 VANISHED".to_string(),
                text: String::new(),
            }
        );
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(ResponseParser::parse(b"(oops\r\n").is_err());
        assert!(ResponseParser::parse(b"x1 MAYBE fine\r\n").is_err());
        assert!(ResponseParser::parse(b"* 0 EXPUNGE\r\n").is_err());
    }
}
