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

use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt;
use std::marker::PhantomData;
use std::num::NonZeroU32;
use std::str::FromStr;

use bitflags::bitflags;

use crate::support::error::Error;

/// Uniquely identifies a message within a single mailbox.
///
/// UIDs start at 1 and increase monotonically as messages are added to the
/// mailbox. UIDs are never reused or reassigned.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Uid({})", self.0.get())
    }
}

impl Uid {
    // Safety: both literals are non-zero.
    pub const MIN: Self = unsafe { Uid(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self = unsafe { Uid(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(uid: u32) -> Option<Self> {
        NonZeroU32::new(uid).map(Uid)
    }

    pub fn next(self) -> Option<Self> {
        if Uid::MAX == self {
            None
        } else {
            NonZeroU32::new(self.0.get() + 1).map(Uid)
        }
    }

    #[cfg(test)]
    pub fn u(uid: u32) -> Self {
        Uid::of(uid).unwrap()
    }
}

impl TryFrom<u32> for Uid {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Uid> for u32 {
    fn from(uid: Uid) -> u32 {
        uid.0.get()
    }
}

/// The message sequence number (MSN) of a message.
///
/// This is the 1-based position of the message among the messages currently
/// present in its mailbox, ordered by UID. It shifts whenever a message with
/// a lesser UID is expunged, so it is only meaningful relative to a
/// particular observation of the mailbox.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Seqnum(pub NonZeroU32);

impl fmt::Debug for Seqnum {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Seqnum({})", self.0.get())
    }
}

impl Seqnum {
    pub const MIN: Self = unsafe { Seqnum(NonZeroU32::new_unchecked(1)) };
    pub const MAX: Self =
        unsafe { Seqnum(NonZeroU32::new_unchecked(u32::MAX)) };

    pub fn of(seqnum: u32) -> Option<Self> {
        NonZeroU32::new(seqnum).map(Seqnum)
    }

    #[cfg(test)]
    pub fn u(seqnum: u32) -> Self {
        Seqnum::of(seqnum).unwrap()
    }

    pub fn to_index(self) -> usize {
        self.0.get() as usize - 1
    }

    pub fn from_index(ix: usize) -> Self {
        Seqnum::of(u32::try_from(ix + 1).unwrap_or(u32::MAX)).unwrap()
    }
}

impl TryFrom<u32> for Seqnum {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, ()> {
        Self::of(v).ok_or(())
    }
}

impl From<Seqnum> for u32 {
    fn from(seqnum: Seqnum) -> u32 {
        seqnum.0.get()
    }
}

/// An IMAP sequence set over sequence numbers or UIDs.
///
/// The set is held as disjoint inclusive runs keyed by their first element,
/// so membership tests and ascending iteration are cheap regardless of how
/// fragmented the set was on the wire. Overlaps and duplicates collapse on
/// insertion; the original ordering is not preserved.
///
/// `Display` writes the minimal wire form. An empty set renders as an empty
/// string, which is not valid IMAP syntax, but `parse` never produces an
/// empty set.
#[derive(Clone, PartialEq, Eq)]
pub struct SeqRange<T> {
    runs: BTreeMap<u32, u32>,
    _marker: PhantomData<T>,
}

impl<T> SeqRange<T> {
    pub fn new() -> Self {
        SeqRange {
            runs: BTreeMap::new(),
            _marker: PhantomData,
        }
    }
}

impl<T: TryFrom<u32> + Into<u32> + PartialOrd> SeqRange<T> {
    /// A set holding the single inclusive range `start..=end`.
    pub fn range(start: T, end: T) -> Self {
        let mut this = SeqRange::new();
        this.insert(start, end);
        this
    }

    /// Add the inclusive range `start..=end`, coalescing with anything it
    /// touches.
    pub fn insert(&mut self, start: T, end: T) {
        assert!(end >= start);
        self.merge(start.into(), end.into());
    }

    fn merge(&mut self, mut lo: u32, mut hi: u32) {
        // Every run starting at or below hi+1 whose end reaches lo-1
        // coalesces with the new one. Runs are disjoint, so walking
        // backwards from hi+1 visits them in one contiguous group.
        let absorbed = self
            .runs
            .range(..=hi.saturating_add(1))
            .rev()
            .take_while(|&(_, &end)| end.saturating_add(1) >= lo)
            .map(|(&start, _)| start)
            .collect::<Vec<_>>();

        for start in absorbed {
            let end = self.runs.remove(&start).unwrap();
            lo = lo.min(start);
            hi = hi.max(end);
        }

        self.runs.insert(lo, hi);
    }

    pub fn contains(&self, item: T) -> bool {
        let v: u32 = item.into();
        matches!(
            self.runs.range(..=v).next_back(),
            Some((_, &end)) if end >= v,
        )
    }

    /// Iterate the members in strictly ascending order.
    ///
    /// Members above `max` (such as a `*` endpoint beyond the mailbox) are
    /// skipped, as are values `T` cannot represent.
    pub fn items<'a>(
        &'a self,
        max: impl Into<u32>,
    ) -> impl Iterator<Item = T> + 'a {
        let max: u32 = max.into();
        self.runs
            .iter()
            .take_while(move |&(&start, _)| start <= max)
            .flat_map(move |(&start, &end)| start..=end.min(max))
            .filter_map(|v| T::try_from(v).ok())
    }

    /// Parse IMAP sequence-set syntax, with `splat` standing in for `*`.
    ///
    /// Returns `None` on any malformed element, including zero (sequence
    /// numbers and UIDs start at 1).
    pub fn parse(raw: &str, splat: T) -> Option<Self> {
        let splat: u32 = splat.into();
        let endpoint = |e: &str| match e {
            "*" => Some(splat),
            e => e.parse::<u32>().ok().filter(|&v| 0 != v),
        };

        let mut this = Self::new();
        for piece in raw.split(',') {
            match memchr::memchr(b':', piece.as_bytes()) {
                None => {
                    let only = endpoint(piece)?;
                    this.merge(only, only);
                },
                Some(colon) => {
                    let a = endpoint(&piece[..colon])?;
                    let b = endpoint(&piece[colon + 1..])?;
                    // The grammar permits the endpoints in either order.
                    this.merge(a.min(b), a.max(b));
                },
            }
        }

        Some(this)
    }

    /// The number of members in the set.
    pub fn len(&self) -> usize {
        self.runs
            .iter()
            .map(|(&start, &end)| (end - start) as usize + 1)
            .sum()
    }

    /// The largest member, as a raw `u32`.
    pub fn max(&self) -> Option<u32> {
        self.runs.iter().next_back().map(|(_, &end)| end)
    }
}

impl<T> fmt::Display for SeqRange<T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (&start, &end) in &self.runs {
            if !first {
                write!(f, ",")?;
            }
            first = false;

            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}:{}", start, end)?;
            }
        }

        Ok(())
    }
}

impl fmt::Debug for SeqRange<Seqnum> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Seqnum {}]", self)
    }
}

impl fmt::Debug for SeqRange<Uid> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[Uid {}]", self)
    }
}

/// A single message flag: one of the six system flags, or a keyword.
///
/// `Display` renders the wire form (`\Seen`, keywords verbatim); `FromStr`
/// accepts system flags in any casing, rejects unknown backslash flags, and
/// validates keyword syntax. `\Recent` is an ordinary member of this enum
/// even though only the server may set it.
#[derive(Clone)]
pub enum Flag {
    Answered,
    Deleted,
    Draft,
    Flagged,
    Recent,
    Seen,
    Keyword(String),
}

impl Flag {
    /// The wire name, without the leading backslash of a system flag.
    fn name(&self) -> &str {
        match self {
            &Flag::Answered => "Answered",
            &Flag::Deleted => "Deleted",
            &Flag::Draft => "Draft",
            &Flag::Flagged => "Flagged",
            &Flag::Recent => "Recent",
            &Flag::Seen => "Seen",
            &Flag::Keyword(ref kw) => kw,
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            &Flag::Keyword(_) => f.write_str(self.name()),
            _ => write!(f, "\\{}", self.name()),
        }
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flag as fmt::Display>::fmt(self, f)
    }
}

impl FromStr for Flag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        const SYSTEM: &[Flag] = &[
            Flag::Answered,
            Flag::Deleted,
            Flag::Draft,
            Flag::Flagged,
            Flag::Recent,
            Flag::Seen,
        ];

        match s.strip_prefix('\\') {
            Some(name) => SYSTEM
                .iter()
                .find(|flag| name.eq_ignore_ascii_case(flag.name()))
                .cloned()
                .ok_or(Error::NxFlag),
            None if !s.is_empty() && s.bytes().all(is_keyword_byte) => {
                Ok(Flag::Keyword(s.to_owned()))
            },
            None => Err(Error::UnsafeName),
        }
    }
}

/// Printable ASCII minus the atom-specials of the flag grammar.
fn is_keyword_byte(b: u8) -> bool {
    (b'!'..=b'~').contains(&b) && !b"(){*%\\\"]".contains(&b)
}

impl PartialEq for Flag {
    fn eq(&self, other: &Flag) -> bool {
        match (self, other) {
            // Keywords compare ASCII-case-insensitively, matching how the
            // flag set stores them.
            (&Flag::Keyword(ref a), &Flag::Keyword(ref b)) => {
                a.eq_ignore_ascii_case(b)
            },
            (a, b) => {
                std::mem::discriminant(a) == std::mem::discriminant(b)
            },
        }
    }
}

impl Eq for Flag {}

bitflags! {
    #[derive(Default)]
    struct SystemFlags: u8 {
        const ANSWERED = 1 << 0;
        const DELETED = 1 << 1;
        const DRAFT = 1 << 2;
        const FLAGGED = 1 << 3;
        const RECENT = 1 << 4;
        const SEEN = 1 << 5;
    }
}

/// A set of message flags with value semantics.
///
/// Everything that leaves the store carries a *copy* of the stored flag set,
/// so external code cannot mutate a message's flags except through the
/// folder's flag operations (which run inside the folder's critical
/// section).
///
/// The `Display` form is the wire format: `(\Answered \Seen kw)`, with an
/// empty set rendering as `()`.
#[derive(Clone, Default)]
pub struct Flags {
    system: SystemFlags,
    keywords: Vec<String>,
}

impl Flags {
    pub fn empty() -> Self {
        Flags::default()
    }

    pub fn is_empty(&self) -> bool {
        self.system.is_empty() && self.keywords.is_empty()
    }

    pub fn contains(&self, flag: &Flag) -> bool {
        match flag {
            &Flag::Keyword(ref kw) => {
                self.keywords.iter().any(|k| k.eq_ignore_ascii_case(kw))
            }
            f => self.system.contains(system_bit(f)),
        }
    }

    pub fn insert(&mut self, flag: Flag) {
        match flag {
            Flag::Keyword(kw) => {
                if !self.contains(&Flag::Keyword(kw.clone())) {
                    self.keywords.push(kw);
                }
            }
            f => self.system.insert(system_bit(&f)),
        }
    }

    pub fn remove(&mut self, flag: &Flag) {
        match flag {
            &Flag::Keyword(ref kw) => {
                self.keywords.retain(|k| !k.eq_ignore_ascii_case(kw));
            }
            f => self.system.remove(system_bit(f)),
        }
    }

    /// Add every flag in `other` to this set.
    pub fn insert_all(&mut self, other: &Flags) {
        for flag in other.iter() {
            self.insert(flag);
        }
    }

    /// Remove every flag in `other` from this set.
    pub fn remove_all(&mut self, other: &Flags) {
        for flag in other.iter().collect::<Vec<_>>() {
            self.remove(&flag);
        }
    }

    pub fn clear(&mut self) {
        self.system = SystemFlags::empty();
        self.keywords.clear();
    }

    /// Iterate the flags in this set, system flags first in the conventional
    /// order, then keywords in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = Flag> + '_ {
        const SYSTEM: &[(SystemFlags, Flag)] = &[
            (SystemFlags::ANSWERED, Flag::Answered),
            (SystemFlags::DELETED, Flag::Deleted),
            (SystemFlags::DRAFT, Flag::Draft),
            (SystemFlags::FLAGGED, Flag::Flagged),
            (SystemFlags::RECENT, Flag::Recent),
            (SystemFlags::SEEN, Flag::Seen),
        ];

        SYSTEM
            .iter()
            .filter(move |&&(bit, _)| self.system.contains(bit))
            .map(|&(_, ref flag)| flag.clone())
            .chain(
                self.keywords
                    .iter()
                    .map(|kw| Flag::Keyword(kw.clone())),
            )
    }

    /// The flag set a folder reports as permanent: every system flag except
    /// `\Recent` (which only the server may set).
    pub fn permanent() -> Self {
        let mut flags = Flags::empty();
        flags.insert(Flag::Answered);
        flags.insert(Flag::Deleted);
        flags.insert(Flag::Draft);
        flags.insert(Flag::Flagged);
        flags.insert(Flag::Seen);
        flags
    }
}

fn system_bit(flag: &Flag) -> SystemFlags {
    match flag {
        &Flag::Answered => SystemFlags::ANSWERED,
        &Flag::Deleted => SystemFlags::DELETED,
        &Flag::Draft => SystemFlags::DRAFT,
        &Flag::Flagged => SystemFlags::FLAGGED,
        &Flag::Recent => SystemFlags::RECENT,
        &Flag::Seen => SystemFlags::SEEN,
        &Flag::Keyword(_) => unreachable!("keyword has no system bit"),
    }
}

impl From<Flag> for Flags {
    fn from(flag: Flag) -> Self {
        let mut flags = Flags::empty();
        flags.insert(flag);
        flags
    }
}

impl std::iter::FromIterator<Flag> for Flags {
    fn from_iter<I: IntoIterator<Item = Flag>>(it: I) -> Self {
        let mut flags = Flags::empty();
        for flag in it {
            flags.insert(flag);
        }
        flags
    }
}

impl PartialEq for Flags {
    fn eq(&self, other: &Flags) -> bool {
        self.system == other.system
            && self.keywords.len() == other.keywords.len()
            && self
                .keywords
                .iter()
                .all(|kw| other.contains(&Flag::Keyword(kw.clone())))
    }
}

impl Eq for Flags {}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (ix, flag) in self.iter().enumerate() {
            if ix > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", flag)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        <Flags as fmt::Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn seqrange_parsing() {
        fn p(s: &str) -> String {
            SeqRange::parse(s, Uid::u(100))
                .map(|r: SeqRange<Uid>| r.to_string())
                .unwrap_or_else(|| "<None>".to_owned())
        }

        assert_eq!("1", p("1"));
        assert_eq!("1:5", p("1:5"));
        assert_eq!("1:5", p("5:1"));
        assert_eq!("1,3,5", p("1,3,5"));
        assert_eq!("1:7", p("1:3,2:7"));
        assert_eq!("100", p("*"));
        assert_eq!("42:100", p("42:*"));
        assert_eq!("<None>", p(""));
        assert_eq!("<None>", p("1:2:3"));
        assert_eq!("<None>", p("x"));
    }

    #[test]
    fn seqrange_adjacent_ranges_fuse() {
        let mut r = SeqRange::<Uid>::new();
        r.insert(Uid::u(1), Uid::u(3));
        r.insert(Uid::u(4), Uid::u(6));
        assert_eq!("1:6", r.to_string());
    }

    #[test]
    fn seqrange_rejects_zero() {
        assert!(SeqRange::parse("0", Uid::u(10)).is_none());
        assert!(SeqRange::parse("0:3", Uid::u(10)).is_none());
    }

    #[test]
    fn seqrange_contained_ranges_collapse() {
        let mut r = SeqRange::<Uid>::new();
        r.insert(Uid::u(5), Uid::u(9));
        r.insert(Uid::u(1), Uid::u(20));
        r.insert(Uid::u(7), Uid::u(8));
        assert_eq!("1:20", r.to_string());
        assert_eq!(20, r.len());
    }

    #[test]
    fn seqrange_items_ascending_and_capped() {
        let r: SeqRange<Uid> = SeqRange::parse("3,1,5:*", Uid::u(7)).unwrap();
        let items: Vec<u32> =
            r.items(Uid::u(6)).map(|u: Uid| u.into()).collect();
        assert_eq!(vec![1, 3, 5, 6], items);
    }

    #[test]
    fn seqrange_contains() {
        let r: SeqRange<Seqnum> =
            SeqRange::parse("2:4,9", Seqnum::u(20)).unwrap();
        assert!(r.contains(Seqnum::u(2)));
        assert!(r.contains(Seqnum::u(3)));
        assert!(r.contains(Seqnum::u(9)));
        assert!(!r.contains(Seqnum::u(1)));
        assert!(!r.contains(Seqnum::u(5)));
    }

    proptest! {
        #[test]
        fn seqrange_models_a_set(
            ranges in prop::collection::vec((1u32..50, 0u32..10), 0..8),
        ) {
            let mut range = SeqRange::<Uid>::new();
            let mut model = HashSet::<u32>::new();

            for &(start, extent) in &ranges {
                range.insert(Uid::u(start), Uid::u(start + extent));
                model.extend(start..=start + extent);
            }

            let mut expected = model.iter().copied().collect::<Vec<_>>();
            expected.sort_unstable();
            let actual = range
                .items(Uid::MAX)
                .map(u32::from)
                .collect::<Vec<_>>();
            prop_assert_eq!(expected, actual);
            prop_assert_eq!(model.len(), range.len());
        }
    }

    #[test]
    fn flag_round_trip() {
        for raw in &["\\Answered", "\\Deleted", "\\Recent", "\\Seen", "fwd"] {
            let flag: Flag = raw.parse().unwrap();
            assert_eq!(*raw, flag.to_string());
        }

        assert_eq!(Flag::Seen, "\\SEEN".parse::<Flag>().unwrap());
        assert!(matches!("\\NoSuchFlag".parse::<Flag>(), Err(Error::NxFlag)));
        assert!(matches!(
            "bad flag".parse::<Flag>(),
            Err(Error::UnsafeName)
        ));
    }

    #[test]
    fn flags_set_semantics() {
        let mut flags = Flags::empty();
        assert_eq!("()", flags.to_string());

        flags.insert(Flag::Seen);
        flags.insert(Flag::Answered);
        flags.insert(Flag::Keyword("Fwd".to_owned()));
        flags.insert(Flag::Keyword("FWD".to_owned())); // dup, ignored
        assert_eq!("(\\Answered \\Seen Fwd)", flags.to_string());

        assert!(flags.contains(&Flag::Seen));
        assert!(flags.contains(&Flag::Keyword("fwd".to_owned())));
        flags.remove(&Flag::Seen);
        assert!(!flags.contains(&Flag::Seen));
        flags.remove(&Flag::Keyword("fwd".to_owned()));
        assert_eq!("(\\Answered)", flags.to_string());
    }

    #[test]
    fn flags_value_semantics() {
        let mut a = Flags::empty();
        a.insert(Flag::Seen);

        let mut b = a.clone();
        b.insert(Flag::Deleted);

        assert!(!a.contains(&Flag::Deleted));
        assert!(b.contains(&Flag::Seen));
    }

    #[test]
    fn flags_bulk_ops() {
        let base: Flags =
            vec![Flag::Seen, Flag::Draft].into_iter().collect();
        let mut flags = Flags::empty();
        flags.insert(Flag::Answered);
        flags.insert_all(&base);
        assert_eq!("(\\Answered \\Draft \\Seen)", flags.to_string());

        flags.remove_all(&base);
        assert_eq!("(\\Answered)", flags.to_string());
    }
}
