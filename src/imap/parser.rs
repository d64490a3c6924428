//-
// Copyright (c) 2024, Jason Lingle
//
// This file is part of stubmail.
//
// Stubmail is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free
// Software Foundation, either version 3 of the License, or (at your option)
// any later version.
//
// Stubmail is distributed in the hope that it will be useful, but WITHOUT ANY
// WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more
// details.
//
// You should have received a copy of the GNU General Public License along
// with stubmail. If not, see <http://www.gnu.org/licenses/>.

//! Parsing of complete IMAP command lines.
//!
//! The server accumulates a full command, literals included, into one buffer
//! before parsing; by the time the tokenizer sees a `{n}` marker, the n
//! octets it announces are inline right after it. This keeps the parser a
//! straightforward one-pass affair with no continuation state.
//!
//! Sequence sets are resolved against the selected mailbox's maxima at parse
//! time, so `*` already has its concrete value in the produced `Command`.

use std::str;

use chrono::prelude::*;

use crate::search::SearchTerm;
use crate::store::model::{Flag, SeqRange, Seqnum, Uid};
use crate::support::error::Error;

/// A fully parsed command line.
#[derive(Clone, Debug)]
pub struct Request {
    pub tag: String,
    pub command: Command,
}

/// Failure to parse a command line.
///
/// The tag is included when it could at least be extracted, so the rejection
/// can be tagged `BAD` instead of terminating the connection.
#[derive(Debug)]
pub struct RequestError {
    pub tag: Option<String>,
    pub error: Error,
}

#[derive(Clone, Debug)]
pub enum Command {
    Capability,
    Noop,
    Logout,
    Login {
        userid: String,
        password: String,
    },
    Select {
        mailbox: String,
    },
    Examine {
        mailbox: String,
    },
    Create {
        mailbox: String,
    },
    Delete {
        mailbox: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Subscribe {
        mailbox: String,
    },
    Unsubscribe {
        mailbox: String,
    },
    List {
        reference: String,
        pattern: String,
    },
    Lsub {
        reference: String,
        pattern: String,
    },
    Status {
        mailbox: String,
        items: Vec<StatusItem>,
    },
    Append {
        mailbox: String,
        flags: Option<Vec<Flag>>,
        date: Option<DateTime<Utc>>,
        content: Vec<u8>,
    },
    Check,
    Close,
    Unselect,
    Expunge,
    Search {
        term: SearchTerm,
        uid: bool,
    },
    Fetch {
        set: SequenceSet,
        items: Vec<FetchItem>,
        uid: bool,
    },
    Store {
        set: SequenceSet,
        op: StoreOp,
        silent: bool,
        flags: Vec<Flag>,
        uid: bool,
    },
    Copy {
        set: SequenceSet,
        mailbox: String,
        uid: bool,
    },
}

/// The message set of a `FETCH`/`STORE`/`COPY`, already resolved to the
/// addressing mode the command used.
#[derive(Clone, Debug)]
pub enum SequenceSet {
    Seqnum(SeqRange<Seqnum>),
    Uid(SeqRange<Uid>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusItem {
    Messages,
    Recent,
    UidNext,
    UidValidity,
    Unseen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchItem {
    Flags,
    Uid,
    InternalDate,
    Rfc822Size,
    /// `RFC822`, equivalent to `BODY[]` but echoed under its own label.
    Rfc822,
    Rfc822Header,
    Rfc822Text,
    Body {
        peek: bool,
        section: Section,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Full,
    Header,
    Text,
}

/// Parse one complete command line.
///
/// `max_seqnum` and `max_uid` give the values `*` resolves to in sequence
/// sets; pass the selected mailbox's current maxima, or anything at all if
/// no mailbox is selected (commands taking sequence sets are rejected before
/// the set matters in that case).
pub fn parse_request(
    data: &[u8],
    max_seqnum: Seqnum,
    max_uid: Uid,
) -> Result<Request, RequestError> {
    let mut t = Tokenizer::new(data);

    let tag = t.tag().map_err(|error| RequestError { tag: None, error })?;

    let command = parse_command(&mut t, max_seqnum, max_uid)
        .map_err(|error| RequestError {
            tag: Some(tag.clone()),
            error,
        })?;

    Ok(Request { tag, command })
}

fn parse_command(
    t: &mut Tokenizer<'_>,
    max_seqnum: Seqnum,
    max_uid: Uid,
) -> Result<Command, Error> {
    t.space()?;
    let mut name = t.atom()?.to_ascii_uppercase();

    let mut uid = false;
    if "UID" == name {
        t.space()?;
        name = t.atom()?.to_ascii_uppercase();
        uid = true;
    }

    let sequence_set = |t: &mut Tokenizer<'_>| -> Result<SequenceSet, Error> {
        if uid {
            Ok(SequenceSet::Uid(t.sequence_set(max_uid)?))
        } else {
            Ok(SequenceSet::Seqnum(t.sequence_set(max_seqnum)?))
        }
    };

    let command = match name.as_str() {
        "CAPABILITY" => Command::Capability,
        "NOOP" => Command::Noop,
        "LOGOUT" => Command::Logout,
        "CHECK" => Command::Check,
        "CLOSE" => Command::Close,
        "UNSELECT" => Command::Unselect,
        "EXPUNGE" => Command::Expunge,

        "LOGIN" => {
            t.space()?;
            let userid = t.astring()?;
            t.space()?;
            let password = t.astring()?;
            Command::Login { userid, password }
        },

        "SELECT" => Command::Select {
            mailbox: t.mailbox()?,
        },
        "EXAMINE" => Command::Examine {
            mailbox: t.mailbox()?,
        },
        "CREATE" => Command::Create {
            mailbox: t.mailbox()?,
        },
        "DELETE" => Command::Delete {
            mailbox: t.mailbox()?,
        },
        "SUBSCRIBE" => Command::Subscribe {
            mailbox: t.mailbox()?,
        },
        "UNSUBSCRIBE" => Command::Unsubscribe {
            mailbox: t.mailbox()?,
        },

        "RENAME" => {
            let from = t.mailbox()?;
            let to = t.mailbox()?;
            Command::Rename { from, to }
        },

        "LIST" | "LSUB" => {
            t.space()?;
            let reference = t.astring()?;
            t.space()?;
            let pattern = t.list_mailbox()?;
            if "LIST" == name {
                Command::List { reference, pattern }
            } else {
                Command::Lsub { reference, pattern }
            }
        },

        "STATUS" => {
            let mailbox = t.mailbox()?;
            t.space()?;
            t.require(b'(')?;
            let mut items = Vec::new();
            loop {
                items.push(status_item(&t.atom()?)?);
                if !t.consume(b' ') {
                    break;
                }
            }
            t.require(b')')?;
            Command::Status { mailbox, items }
        },

        "APPEND" => {
            let mailbox = t.mailbox()?;
            t.space()?;

            let flags = if Some(b'(') == t.peek() {
                let flags = t.flag_list()?;
                t.space()?;
                Some(flags)
            } else {
                None
            };

            let date = if Some(b'"') == t.peek() {
                let date = t.date_time()?;
                t.space()?;
                Some(date)
            } else {
                None
            };

            let content = t.literal()?.to_vec();
            Command::Append {
                mailbox,
                flags,
                date,
                content,
            }
        },

        "SEARCH" => {
            t.space()?;
            let term = search_program(t, max_seqnum, max_uid)?;
            Command::Search { term, uid }
        },

        "FETCH" => {
            t.space()?;
            let set = sequence_set(t)?;
            t.space()?;
            let items = fetch_items(t)?;
            Command::Fetch { set, items, uid }
        },

        "STORE" => {
            t.space()?;
            let set = sequence_set(t)?;
            t.space()?;
            let item = t.atom()?.to_ascii_uppercase();

            let (item, silent) = match item.strip_suffix(".SILENT") {
                Some(item) => (item, true),
                None => (item.as_str(), false),
            };
            let op = match item {
                "FLAGS" => StoreOp::Replace,
                "+FLAGS" => StoreOp::Add,
                "-FLAGS" => StoreOp::Remove,
                _ => return Err(Error::Syntax(
                    "Expected FLAGS, +FLAGS, or -FLAGS".to_owned(),
                )),
            };

            t.space()?;
            let flags = if Some(b'(') == t.peek() {
                t.flag_list()?
            } else {
                let mut flags = vec![t.flag()?];
                while t.consume(b' ') {
                    flags.push(t.flag()?);
                }
                flags
            };

            Command::Store {
                set,
                op,
                silent,
                flags,
                uid,
            }
        },

        "COPY" => {
            t.space()?;
            let set = sequence_set(t)?;
            let mailbox = t.mailbox()?;
            Command::Copy { set, mailbox, uid }
        },

        _ => {
            return Err(Error::Syntax(format!("Unknown command '{}'", name)));
        },
    };

    if uid
        && !matches!(
            command,
            Command::Search { .. }
                | Command::Fetch { .. }
                | Command::Store { .. }
                | Command::Copy { .. }
        )
    {
        return Err(Error::Syntax(format!(
            "{} cannot be used with UID",
            name,
        )));
    }

    t.end()?;
    Ok(command)
}

/// `Flag` re-exported operation selector for `STORE`.
pub use crate::store::folder::FlagsOp as StoreOp;

fn status_item(raw: &str) -> Result<StatusItem, Error> {
    match raw.to_ascii_uppercase().as_str() {
        "MESSAGES" => Ok(StatusItem::Messages),
        "RECENT" => Ok(StatusItem::Recent),
        "UIDNEXT" => Ok(StatusItem::UidNext),
        "UIDVALIDITY" => Ok(StatusItem::UidValidity),
        "UNSEEN" => Ok(StatusItem::Unseen),
        _ => Err(Error::Syntax(format!("Unknown STATUS item '{}'", raw))),
    }
}

fn fetch_items(t: &mut Tokenizer<'_>) -> Result<Vec<FetchItem>, Error> {
    let mut items = Vec::new();
    if t.consume(b'(') {
        loop {
            items.push(fetch_item(&t.atom()?)?);
            if !t.consume(b' ') {
                break;
            }
        }
        t.require(b')')?;
    } else {
        items.push(fetch_item(&t.atom()?)?);
    }
    Ok(items)
}

fn fetch_item(raw: &str) -> Result<FetchItem, Error> {
    match raw.to_ascii_uppercase().as_str() {
        "FLAGS" => Ok(FetchItem::Flags),
        "UID" => Ok(FetchItem::Uid),
        "INTERNALDATE" => Ok(FetchItem::InternalDate),
        "RFC822.SIZE" => Ok(FetchItem::Rfc822Size),
        "RFC822" => Ok(FetchItem::Rfc822),
        "RFC822.HEADER" => Ok(FetchItem::Rfc822Header),
        "RFC822.TEXT" => Ok(FetchItem::Rfc822Text),
        "BODY[]" => Ok(FetchItem::Body {
            peek: false,
            section: Section::Full,
        }),
        "BODY.PEEK[]" => Ok(FetchItem::Body {
            peek: true,
            section: Section::Full,
        }),
        "BODY[HEADER]" => Ok(FetchItem::Body {
            peek: false,
            section: Section::Header,
        }),
        "BODY.PEEK[HEADER]" => Ok(FetchItem::Body {
            peek: true,
            section: Section::Header,
        }),
        "BODY[TEXT]" => Ok(FetchItem::Body {
            peek: false,
            section: Section::Text,
        }),
        "BODY.PEEK[TEXT]" => Ok(FetchItem::Body {
            peek: true,
            section: Section::Text,
        }),
        _ => Err(Error::Syntax(format!("Unknown FETCH item '{}'", raw))),
    }
}

fn search_program(
    t: &mut Tokenizer<'_>,
    max_seqnum: Seqnum,
    max_uid: Uid,
) -> Result<SearchTerm, Error> {
    // An optional CHARSET prefix is tolerated but only for charsets we
    // already speak.
    if t.looking_at_keyword("CHARSET") {
        let _ = t.atom()?;
        t.space()?;
        let charset = t.astring()?;
        if !charset.eq_ignore_ascii_case("US-ASCII")
            && !charset.eq_ignore_ascii_case("UTF-8")
        {
            return Err(Error::Syntax(format!(
                "Unsupported charset '{}'",
                charset,
            )));
        }
        t.space()?;
    }

    let mut terms = Vec::new();
    loop {
        terms.push(search_key(t, max_seqnum, max_uid)?);
        if !t.consume(b' ') {
            break;
        }
    }

    if 1 == terms.len() {
        Ok(terms.pop().expect("len checked"))
    } else {
        Ok(SearchTerm::And(terms))
    }
}

fn search_key(
    t: &mut Tokenizer<'_>,
    max_seqnum: Seqnum,
    max_uid: Uid,
) -> Result<SearchTerm, Error> {
    if t.consume(b'(') {
        let mut terms = Vec::new();
        loop {
            terms.push(search_key(t, max_seqnum, max_uid)?);
            if !t.consume(b' ') {
                break;
            }
        }
        t.require(b')')?;
        return Ok(SearchTerm::And(terms));
    }

    if t.peek().map_or(false, |b| b.is_ascii_digit() || b'*' == b) {
        return Ok(SearchTerm::SeqnumSet(t.sequence_set(max_seqnum)?));
    }

    let key = t.atom()?.to_ascii_uppercase();
    let term = match key.as_str() {
        "ALL" => SearchTerm::All,

        "ANSWERED" => SearchTerm::FlagSet(Flag::Answered),
        "DELETED" => SearchTerm::FlagSet(Flag::Deleted),
        "DRAFT" => SearchTerm::FlagSet(Flag::Draft),
        "FLAGGED" => SearchTerm::FlagSet(Flag::Flagged),
        "RECENT" => SearchTerm::FlagSet(Flag::Recent),
        "SEEN" => SearchTerm::FlagSet(Flag::Seen),

        "UNANSWERED" => SearchTerm::FlagUnset(Flag::Answered),
        "UNDELETED" => SearchTerm::FlagUnset(Flag::Deleted),
        "UNDRAFT" => SearchTerm::FlagUnset(Flag::Draft),
        "UNFLAGGED" => SearchTerm::FlagUnset(Flag::Flagged),
        "OLD" => SearchTerm::FlagUnset(Flag::Recent),
        "UNSEEN" => SearchTerm::FlagUnset(Flag::Seen),

        "NEW" => SearchTerm::New,

        "KEYWORD" => {
            t.space()?;
            SearchTerm::FlagSet(Flag::Keyword(t.atom()?))
        },
        "UNKEYWORD" => {
            t.space()?;
            SearchTerm::FlagUnset(Flag::Keyword(t.atom()?))
        },

        "HEADER" => {
            t.space()?;
            let name = t.astring()?;
            t.space()?;
            let value = t.astring()?;
            SearchTerm::header(&name, &value)
        },
        "SUBJECT" => {
            t.space()?;
            SearchTerm::subject(&t.astring()?)
        },
        "FROM" => {
            t.space()?;
            SearchTerm::from(&t.astring()?)
        },
        "TO" => {
            t.space()?;
            SearchTerm::to(&t.astring()?)
        },

        "LARGER" => {
            t.space()?;
            SearchTerm::Larger(t.number()?)
        },
        "SMALLER" => {
            t.space()?;
            SearchTerm::Smaller(t.number()?)
        },

        "NOT" => {
            t.space()?;
            SearchTerm::not(search_key(t, max_seqnum, max_uid)?)
        },
        "OR" => {
            t.space()?;
            let a = search_key(t, max_seqnum, max_uid)?;
            t.space()?;
            let b = search_key(t, max_seqnum, max_uid)?;
            SearchTerm::or(a, b)
        },

        "UID" => {
            t.space()?;
            SearchTerm::UidSet(t.sequence_set(max_uid)?)
        },

        _ => {
            return Err(Error::Syntax(format!("Unknown SEARCH key '{}'", key)));
        },
    };

    Ok(term)
}

/// Cursor over a complete command line.
pub struct Tokenizer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Tokenizer { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn consume(&mut self, byte: u8) -> bool {
        if Some(byte) == self.peek() {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn require(&mut self, byte: u8) -> Result<(), Error> {
        if self.consume(byte) {
            Ok(())
        } else {
            Err(Error::Syntax(format!(
                "Expected '{}' at octet {}",
                byte as char, self.pos,
            )))
        }
    }

    fn space(&mut self) -> Result<(), Error> {
        self.require(b' ')
    }

    fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn end(&mut self) -> Result<(), Error> {
        if self.at_end() {
            Ok(())
        } else {
            Err(Error::Syntax(format!(
                "Trailing garbage at octet {}",
                self.pos,
            )))
        }
    }

    /// Whether the upcoming atom is the given (uppercase) keyword.
    fn looking_at_keyword(&self, keyword: &str) -> bool {
        let rest = &self.data[self.pos.min(self.data.len())..];
        rest.len() >= keyword.len()
            && rest[..keyword.len()].eq_ignore_ascii_case(keyword.as_bytes())
            && rest
                .get(keyword.len())
                .map_or(true, |&b| !is_atom_byte(b))
    }

    fn tag(&mut self) -> Result<String, Error> {
        self.atom()
    }

    fn atom(&mut self) -> Result<String, Error> {
        let start = self.pos;
        while self.peek().map_or(false, is_atom_byte) {
            self.pos += 1;
        }

        if self.pos == start {
            return Err(Error::Syntax(format!(
                "Expected atom at octet {}",
                self.pos,
            )));
        }

        Ok(String::from_utf8_lossy(&self.data[start..self.pos])
            .into_owned())
    }

    fn number(&mut self) -> Result<u32, Error> {
        let start = self.pos;
        while self.peek().map_or(false, |b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or_else(|| {
                Error::Syntax(format!("Expected number at octet {}", start))
            })
    }

    fn quoted(&mut self) -> Result<Vec<u8>, Error> {
        self.require(b'"')?;

        let mut content = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'\r') | Some(b'\n') => {
                    return Err(Error::Syntax(
                        "Unterminated quoted string".to_owned(),
                    ));
                },
                Some(b'"') => {
                    self.pos += 1;
                    return Ok(content);
                },
                Some(b'\\') => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b @ b'"') | Some(b @ b'\\') => {
                            content.push(b);
                            self.pos += 1;
                        },
                        _ => {
                            return Err(Error::Syntax(
                                "Bad quoted-string escape".to_owned(),
                            ));
                        },
                    }
                },
                Some(b) => {
                    content.push(b);
                    self.pos += 1;
                },
            }
        }
    }

    /// Consume a `{n}` marker and the n inlined octets that follow it.
    fn literal(&mut self) -> Result<&'a [u8], Error> {
        // The binary (~) and LITERAL+ (+) decorations don't change how the
        // inlined content reads.
        self.consume(b'~');
        self.require(b'{')?;
        let len = self.number()? as usize;
        self.consume(b'+');
        self.require(b'}')?;
        self.require(b'\r')?;
        self.require(b'\n')?;

        if self.data.len() - self.pos < len {
            return Err(Error::Syntax(
                "Literal longer than remaining input".to_owned(),
            ));
        }

        let content = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(content)
    }

    /// atom, quoted string, or literal.
    fn astring(&mut self) -> Result<String, Error> {
        match self.peek() {
            Some(b'"') => Ok(String::from_utf8_lossy(&self.quoted()?)
                .into_owned()),
            Some(b'{') | Some(b'~') => Ok(String::from_utf8_lossy(
                self.literal()?,
            )
            .into_owned()),
            _ => self.atom(),
        }
    }

    fn mailbox(&mut self) -> Result<String, Error> {
        self.space()?;
        self.astring()
    }

    /// Like `astring`, but wildcards are part of the token.
    fn list_mailbox(&mut self) -> Result<String, Error> {
        match self.peek() {
            Some(b'"') | Some(b'{') | Some(b'~') => self.astring(),
            _ => {
                let start = self.pos;
                while self
                    .peek()
                    .map_or(false, |b| is_atom_byte(b) || b'%' == b || b'*' == b)
                {
                    self.pos += 1;
                }

                if self.pos == start {
                    return Err(Error::Syntax(format!(
                        "Expected mailbox pattern at octet {}",
                        start,
                    )));
                }

                Ok(String::from_utf8_lossy(&self.data[start..self.pos])
                    .into_owned())
            },
        }
    }

    fn flag(&mut self) -> Result<Flag, Error> {
        let start = self.pos;
        let system = self.consume(b'\\');
        let name = self.atom()?;
        let raw = if system {
            format!("\\{}", name)
        } else {
            name
        };
        raw.parse().map_err(|_| {
            Error::Syntax(format!("Bad flag at octet {}", start))
        })
    }

    fn flag_list(&mut self) -> Result<Vec<Flag>, Error> {
        self.require(b'(')?;
        let mut flags = Vec::new();
        if !self.consume(b')') {
            loop {
                flags.push(self.flag()?);
                if !self.consume(b' ') {
                    break;
                }
            }
            self.require(b')')?;
        }
        Ok(flags)
    }

    fn sequence_set<T>(&mut self, splat: T) -> Result<SeqRange<T>, Error>
    where
        T: std::convert::TryFrom<u32> + Into<u32> + PartialOrd + Copy,
    {
        let start = self.pos;
        while self.peek().map_or(false, |b| {
            b.is_ascii_digit() || b':' == b || b',' == b || b'*' == b
        }) {
            self.pos += 1;
        }

        str::from_utf8(&self.data[start..self.pos])
            .ok()
            .and_then(|s| SeqRange::parse(s, splat))
            .ok_or_else(|| {
                Error::Syntax(format!(
                    "Bad sequence set at octet {}",
                    start,
                ))
            })
    }

    /// The `date-time` form, e.g. `"04-Jul-2020 16:31:00 +0000"`.
    fn date_time(&mut self) -> Result<DateTime<Utc>, Error> {
        let raw = self.quoted()?;
        let raw = String::from_utf8_lossy(&raw);
        DateTime::parse_from_str(raw.trim(), "%d-%b-%Y %H:%M:%S %z")
            .map(|d| d.with_timezone(&Utc))
            .map_err(|_| Error::Syntax(format!("Bad date-time '{}'", raw)))
    }
}

fn is_atom_byte(b: u8) -> bool {
    // atom-specials, minus '[' and ']' so FETCH items lex as single atoms.
    b > b' '
        && b < 127
        && !b"(){%*\"\\".contains(&b)
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(line: &str) -> Request {
        parse_request(line.as_bytes(), Seqnum::u(10), Uid::u(100)).unwrap()
    }

    fn parse_err(line: &str) -> RequestError {
        parse_request(line.as_bytes(), Seqnum::u(10), Uid::u(100)).unwrap_err()
    }

    #[test]
    fn simple_commands() {
        let req = parse("a1 CAPABILITY");
        assert_eq!("a1", req.tag);
        assert!(matches!(req.command, Command::Capability));

        assert!(matches!(parse("a2 noop").command, Command::Noop));
        assert!(matches!(parse("a3 LOGOUT").command, Command::Logout));
        assert!(matches!(parse("a4 EXPUNGE").command, Command::Expunge));
    }

    #[test]
    fn login_forms() {
        match parse("a1 LOGIN alice hunter2").command {
            Command::Login { userid, password } => {
                assert_eq!("alice", userid);
                assert_eq!("hunter2", password);
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 LOGIN \"al ice\" \"pass\\\"word\"").command {
            Command::Login { userid, password } => {
                assert_eq!("al ice", userid);
                assert_eq!("pass\"word", password);
            },
            c => panic!("unexpected: {:?}", c),
        }

        // Literal arguments arrive inlined after their markers.
        match parse("a1 LOGIN {5}\r\nalice {7}\r\nhunter2").command {
            Command::Login { userid, password } => {
                assert_eq!("alice", userid);
                assert_eq!("hunter2", password);
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn zero_length_literal() {
        match parse("a1 LOGIN {0}\r\n x").command {
            Command::Login { userid, password } => {
                assert_eq!("", userid);
                assert_eq!("x", password);
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn select_and_friends() {
        match parse("a1 SELECT INBOX").command {
            Command::Select { mailbox } => assert_eq!("INBOX", mailbox),
            c => panic!("unexpected: {:?}", c),
        }
        match parse("a1 RENAME work archive").command {
            Command::Rename { from, to } => {
                assert_eq!("work", from);
                assert_eq!("archive", to);
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn list_patterns() {
        match parse("a1 LIST \"\" work.%").command {
            Command::List { reference, pattern } => {
                assert_eq!("", reference);
                assert_eq!("work.%", pattern);
            },
            c => panic!("unexpected: {:?}", c),
        }
        match parse("a1 LIST \"\" *").command {
            Command::List { pattern, .. } => assert_eq!("*", pattern),
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn status_items() {
        match parse("a1 STATUS INBOX (MESSAGES unseen UIDNEXT)").command {
            Command::Status { mailbox, items } => {
                assert_eq!("INBOX", mailbox);
                assert_eq!(
                    vec![
                        StatusItem::Messages,
                        StatusItem::Unseen,
                        StatusItem::UidNext,
                    ],
                    items,
                );
            },
            c => panic!("unexpected: {:?}", c),
        }

        assert!(matches!(
            parse_err("a1 STATUS INBOX (BOGUS)").error,
            Error::Syntax(_),
        ));
    }

    #[test]
    fn append_forms() {
        match parse("a1 APPEND saved {3}\r\nfoo").command {
            Command::Append {
                mailbox,
                flags,
                date,
                content,
            } => {
                assert_eq!("saved", mailbox);
                assert_eq!(None, flags);
                assert_eq!(None, date);
                assert_eq!(b"foo".to_vec(), content);
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse(
            "a1 APPEND saved (\\Seen custom) \
             \"04-Jul-2020 16:31:00 +0000\" {3}\r\nfoo",
        )
        .command
        {
            Command::Append { flags, date, .. } => {
                assert_eq!(
                    Some(vec![
                        Flag::Seen,
                        Flag::Keyword("custom".to_owned()),
                    ]),
                    flags,
                );
                assert_eq!(
                    Some(Utc.ymd(2020, 7, 4).and_hms(16, 31, 0)),
                    date,
                );
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn append_content_is_raw_bytes() {
        // The literal may contain anything, including what looks like more
        // command syntax.
        let line = b"a1 APPEND saved {14}\r\nbody {2}\r\nmore";
        let req =
            parse_request(line, Seqnum::u(1), Uid::u(1)).unwrap();
        match req.command {
            Command::Append { content, .. } => {
                assert_eq!(b"body {2}\r\nmore".to_vec(), content);
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn fetch_items_and_sets() {
        match parse("a1 FETCH 1:3 (FLAGS UID RFC822.SIZE)").command {
            Command::Fetch { set, items, uid } => {
                assert!(!uid);
                match set {
                    SequenceSet::Seqnum(r) => {
                        assert!(r.contains(Seqnum::u(2)));
                        assert!(!r.contains(Seqnum::u(4)));
                    },
                    s => panic!("unexpected: {:?}", s),
                }
                assert_eq!(
                    vec![
                        FetchItem::Flags,
                        FetchItem::Uid,
                        FetchItem::Rfc822Size,
                    ],
                    items,
                );
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 UID FETCH 1:* BODY.PEEK[]").command {
            Command::Fetch { set, items, uid } => {
                assert!(uid);
                match set {
                    // * resolves against the maximum UID.
                    SequenceSet::Uid(r) => assert!(r.contains(Uid::u(100))),
                    s => panic!("unexpected: {:?}", s),
                }
                assert_eq!(
                    vec![FetchItem::Body {
                        peek: true,
                        section: Section::Full,
                    }],
                    items,
                );
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn store_forms() {
        match parse("a1 STORE 2 +FLAGS.SILENT (\\Deleted)").command {
            Command::Store {
                op, silent, flags, uid, ..
            } => {
                assert!(matches!(op, StoreOp::Add));
                assert!(silent);
                assert!(!uid);
                assert_eq!(vec![Flag::Deleted], flags);
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 UID STORE 5 FLAGS \\Seen \\Flagged").command {
            Command::Store {
                op, silent, flags, uid, ..
            } => {
                assert!(matches!(op, StoreOp::Replace));
                assert!(!silent);
                assert!(uid);
                assert_eq!(vec![Flag::Seen, Flag::Flagged], flags);
            },
            c => panic!("unexpected: {:?}", c),
        }
    }

    #[test]
    fn uid_only_applies_to_some_commands() {
        assert!(matches!(
            parse_err("a1 UID NOOP").error,
            Error::Syntax(_),
        ));
        assert!(parse_request(
            b"a1 UID COPY 1 dst",
            Seqnum::u(10),
            Uid::u(100),
        )
        .is_ok());
    }

    #[test]
    fn search_programs() {
        match parse("a1 SEARCH ALL").command {
            Command::Search { term, uid } => {
                assert!(!uid);
                assert!(matches!(term, SearchTerm::All));
            },
            c => panic!("unexpected: {:?}", c),
        }

        // Adjacent keys form an implicit AND.
        match parse("a1 SEARCH UNSEEN LARGER 100").command {
            Command::Search { term, .. } => match term {
                SearchTerm::And(terms) => {
                    assert_eq!(2, terms.len());
                    assert!(matches!(
                        terms[0],
                        SearchTerm::FlagUnset(Flag::Seen),
                    ));
                    assert!(matches!(terms[1], SearchTerm::Larger(100)));
                },
                t => panic!("unexpected: {:?}", t),
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 SEARCH OR (NEW FROM alice) NOT DELETED").command {
            Command::Search { term, .. } => match term {
                SearchTerm::Or(a, b) => {
                    assert!(matches!(*a, SearchTerm::And(_)));
                    assert!(matches!(*b, SearchTerm::Not(_)));
                },
                t => panic!("unexpected: {:?}", t),
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 SEARCH HEADER X-Priority 2").command {
            Command::Search { term, .. } => {
                assert!(matches!(term, SearchTerm::Header(..)));
            },
            c => panic!("unexpected: {:?}", c),
        }

        match parse("a1 UID SEARCH UID 1:50 SEEN").command {
            Command::Search { term, uid } => {
                assert!(uid);
                assert!(matches!(term, SearchTerm::And(_)));
            },
            c => panic!("unexpected: {:?}", c),
        }

        // Bare sequence sets are valid keys.
        match parse("a1 SEARCH 2:4").command {
            Command::Search { term, .. } => match term {
                SearchTerm::SeqnumSet(r) => assert!(r.contains(Seqnum::u(3))),
                t => panic!("unexpected: {:?}", t),
            },
            c => panic!("unexpected: {:?}", c),
        }

        assert!(matches!(
            parse_err("a1 SEARCH CHARSET KOI8-R ALL").error,
            Error::Syntax(_),
        ));
    }

    #[test]
    fn syntax_errors_keep_the_tag() {
        let err = parse_err("a1 FROB");
        assert_eq!(Some("a1".to_owned()), err.tag);

        let err = parse_err("a1 LOGIN onlyone");
        assert_eq!(Some("a1".to_owned()), err.tag);

        let err = parse_err("a1  NOOP");
        assert_eq!(Some("a1".to_owned()), err.tag);

        assert_eq!(None, parse_err("").tag);
    }

    #[test]
    fn trailing_garbage_rejected() {
        assert!(matches!(
            parse_err("a1 NOOP extra").error,
            Error::Syntax(_),
        ));
    }
}
