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

//! The boolean query trees evaluated by `SEARCH`.
//!
//! A `SearchTerm` is built once (by the IMAP search command parser, or
//! directly by test code) and then evaluated as a pure function of a stored
//! message. Evaluation has no side effects and is free to short-circuit;
//! the folder guarantees result ordering, not the evaluator.

use regex::{Regex, RegexBuilder};

use crate::store::message::StoredMessage;
use crate::store::model::{Flag, SeqRange, Seqnum, Uid};

/// An immutable node in a search query tree.
#[derive(Clone, Debug)]
pub enum SearchTerm {
    /// Matches every message.
    All,
    /// The given flag is set.
    FlagSet(Flag),
    /// The given flag is not set.
    FlagUnset(Flag),
    /// `\Recent` and not `\Seen` (the `NEW` key).
    New,
    /// The named header exists and its value contains the pattern. An empty
    /// pattern matches any message carrying the header at all.
    Header(String, Pattern),
    /// Size strictly greater than the operand.
    Larger(u32),
    /// Size strictly less than the operand.
    Smaller(u32),
    Subject(Pattern),
    From(Pattern),
    To(Pattern),
    /// Current sequence number is in the set.
    SeqnumSet(SeqRange<Seqnum>),
    /// UID is in the set.
    UidSet(SeqRange<Uid>),
    /// All operands match. An empty operand list matches everything.
    And(Vec<SearchTerm>),
    /// Either operand matches. `OR` takes exactly two operands.
    Or(Box<SearchTerm>, Box<SearchTerm>),
    Not(Box<SearchTerm>),
}

/// A case-insensitive substring pattern, pre-compiled at tree construction
/// so evaluation never fails.
#[derive(Clone, Debug)]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pat: &str) -> Self {
        // `escape` guarantees a valid expression.
        Pattern(
            RegexBuilder::new(&regex::escape(pat))
                .case_insensitive(true)
                .build()
                .expect("escaped pattern failed to compile"),
        )
    }

    fn is_match(&self, s: &str) -> bool {
        self.0.is_match(s)
    }
}

impl SearchTerm {
    pub fn header(name: &str, pat: &str) -> Self {
        SearchTerm::Header(name.to_owned(), Pattern::new(pat))
    }

    pub fn subject(pat: &str) -> Self {
        SearchTerm::Subject(Pattern::new(pat))
    }

    pub fn from(pat: &str) -> Self {
        SearchTerm::From(Pattern::new(pat))
    }

    pub fn to(pat: &str) -> Self {
        SearchTerm::To(Pattern::new(pat))
    }

    pub fn not(term: SearchTerm) -> Self {
        SearchTerm::Not(Box::new(term))
    }

    pub fn or(a: SearchTerm, b: SearchTerm) -> Self {
        SearchTerm::Or(Box::new(a), Box::new(b))
    }

    /// Evaluate this term against a message snapshot.
    ///
    /// `seqnum` is the message's sequence number at the time of the search,
    /// needed for sequence-set terms.
    pub fn matches(&self, seqnum: Seqnum, message: &StoredMessage) -> bool {
        match self {
            &SearchTerm::All => true,

            &SearchTerm::FlagSet(ref flag) => message.is_set(flag),
            &SearchTerm::FlagUnset(ref flag) => !message.is_set(flag),

            &SearchTerm::New => {
                message.is_set(&Flag::Recent) && !message.is_set(&Flag::Seen)
            }

            &SearchTerm::Header(ref name, ref pat) => message
                .message()
                .header(name)
                .map_or(false, |value| pat.is_match(&value)),

            &SearchTerm::Larger(thresh) => {
                message.size() > thresh as usize
            }
            &SearchTerm::Smaller(thresh) => {
                message.size() < thresh as usize
            }

            &SearchTerm::Subject(ref pat) => message
                .message()
                .subject()
                .map_or(false, |s| pat.is_match(&s)),
            &SearchTerm::From(ref pat) => message
                .message()
                .from()
                .map_or(false, |s| pat.is_match(&s)),
            &SearchTerm::To(ref pat) => message
                .message()
                .to()
                .map_or(false, |s| pat.is_match(&s)),

            &SearchTerm::SeqnumSet(ref range) => range.contains(seqnum),
            &SearchTerm::UidSet(ref range) => range.contains(message.uid()),

            &SearchTerm::And(ref terms) => {
                terms.iter().all(|t| t.matches(seqnum, message))
            }
            &SearchTerm::Or(ref a, ref b) => {
                a.matches(seqnum, message) || b.matches(seqnum, message)
            }
            &SearchTerm::Not(ref term) => !term.matches(seqnum, message),
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::prelude::*;

    use super::*;
    use crate::mime::Message;
    use crate::store::model::Flags;

    fn message(size_padding: usize, flags: &[Flag]) -> StoredMessage {
        let mut content = b"From: sender@example.com\r\n\
                            To: dest@example.com\r\n\
                            Subject: Quarterly Report\r\n\
                            X-Priority: 2\r\n\
                            \r\n"
            .to_vec();
        content.resize(content.len() + size_padding, b'x');

        StoredMessage::new(
            Uid::u(42),
            Message::new(content),
            flags.iter().cloned().collect::<Flags>(),
            Utc.ymd(2020, 7, 4).and_hms(16, 31, 0),
        )
    }

    fn matches(term: &SearchTerm, message: &StoredMessage) -> bool {
        term.matches(Seqnum::u(3), message)
    }

    #[test]
    fn leaf_predicates() {
        let m = message(0, &[Flag::Seen]);

        assert!(matches(&SearchTerm::All, &m));
        assert!(matches(&SearchTerm::FlagSet(Flag::Seen), &m));
        assert!(!matches(&SearchTerm::FlagSet(Flag::Draft), &m));
        assert!(matches(&SearchTerm::FlagUnset(Flag::Draft), &m));

        assert!(matches(&SearchTerm::subject("quarterly"), &m));
        assert!(matches(&SearchTerm::subject("REPORT"), &m));
        assert!(!matches(&SearchTerm::subject("minutes"), &m));
        assert!(matches(&SearchTerm::from("sender@"), &m));
        assert!(matches(&SearchTerm::to("dest@example.com"), &m));

        assert!(matches(&SearchTerm::header("x-priority", "2"), &m));
        // Empty pattern matches mere header presence.
        assert!(matches(&SearchTerm::header("x-priority", ""), &m));
        assert!(!matches(&SearchTerm::header("x-missing", ""), &m));
    }

    #[test]
    fn size_comparisons_are_strict() {
        let m = message(0, &[]);
        let size = m.size() as u32;

        assert!(!matches(&SearchTerm::Larger(size), &m));
        assert!(!matches(&SearchTerm::Smaller(size), &m));
        assert!(matches(&SearchTerm::Larger(size - 1), &m));
        assert!(matches(&SearchTerm::Smaller(size + 1), &m));
    }

    #[test]
    fn new_is_recent_and_unseen() {
        assert!(matches(&SearchTerm::New, &message(0, &[Flag::Recent])));
        assert!(!matches(
            &SearchTerm::New,
            &message(0, &[Flag::Recent, Flag::Seen]),
        ));
        assert!(!matches(&SearchTerm::New, &message(0, &[])));
    }

    #[test]
    fn sequence_sets() {
        let m = message(0, &[]);

        let seqnums = SeqRange::parse("1:5", Seqnum::u(10)).unwrap();
        assert!(matches(&SearchTerm::SeqnumSet(seqnums), &m));
        let seqnums = SeqRange::parse("4:5", Seqnum::u(10)).unwrap();
        assert!(!matches(&SearchTerm::SeqnumSet(seqnums), &m));

        let uids = SeqRange::parse("42", Uid::u(100)).unwrap();
        assert!(matches(&SearchTerm::UidSet(uids), &m));
        let uids = SeqRange::parse("1:41", Uid::u(100)).unwrap();
        assert!(!matches(&SearchTerm::UidSet(uids), &m));
    }

    #[test]
    fn combinators() {
        let m = message(0, &[Flag::Seen]);

        assert!(matches(&SearchTerm::And(vec![]), &m));
        assert!(matches(
            &SearchTerm::And(vec![
                SearchTerm::FlagSet(Flag::Seen),
                SearchTerm::subject("report"),
            ]),
            &m,
        ));
        assert!(!matches(
            &SearchTerm::And(vec![
                SearchTerm::FlagSet(Flag::Seen),
                SearchTerm::FlagSet(Flag::Draft),
            ]),
            &m,
        ));

        assert!(matches(
            &SearchTerm::or(
                SearchTerm::FlagSet(Flag::Draft),
                SearchTerm::FlagSet(Flag::Seen),
            ),
            &m,
        ));
        assert!(!matches(
            &SearchTerm::or(
                SearchTerm::FlagSet(Flag::Draft),
                SearchTerm::FlagSet(Flag::Answered),
            ),
            &m,
        ));

        assert!(matches(
            &SearchTerm::not(SearchTerm::FlagSet(Flag::Draft)),
            &m,
        ));
    }
}
