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

//! Utilities for *writing* values under IMAP's "lexical rules".
//!
//! The main decision made here is which form to use to encode a string:
//! atom, quoted string, or literal. We are conservative: atom form is only
//! used when every character is from a safe subset, quoted form when the
//! string has no controls, backslashes, quotes, or 8-bit bytes, and literal
//! form otherwise.

use std::io::{self, Write};

use chrono::prelude::*;

use crate::store::model::Flags;

pub struct LexWriter<W> {
    writer: W,
}

impl<W: Write> LexWriter<W> {
    pub fn new(writer: W) -> Self {
        LexWriter { writer }
    }

    pub fn verbatim(&mut self, s: &str) -> io::Result<()> {
        self.writer.write_all(s.as_bytes())
    }

    /// Write a string in the most conservative form it fits.
    pub fn astring(&mut self, s: &str) -> io::Result<()> {
        if is_conservative_atom(s) {
            self.verbatim(s)
        } else if is_quotable(s) {
            write!(self.writer, "\"{}\"", s)
        } else {
            self.literal(s.as_bytes())
        }
    }

    /// Mailbox names follow astring rules, but INBOX is always sent bare.
    pub fn mailbox(&mut self, name: &str) -> io::Result<()> {
        if name.eq_ignore_ascii_case("INBOX") {
            self.verbatim("INBOX")
        } else {
            self.astring(name)
        }
    }

    pub fn literal(&mut self, data: &[u8]) -> io::Result<()> {
        write!(self.writer, "{{{}}}\r\n", data.len())?;
        self.writer.write_all(data)
    }

    pub fn flags(&mut self, flags: &Flags) -> io::Result<()> {
        write!(self.writer, "{}", flags)
    }

    /// The `date-time` form used by `INTERNALDATE`.
    pub fn date_time(&mut self, date: DateTime<Utc>) -> io::Result<()> {
        write!(
            self.writer,
            "\"{}\"",
            date.format("%d-%b-%Y %H:%M:%S +0000"),
        )
    }

    pub fn end_line(&mut self) -> io::Result<()> {
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()
    }
}

fn is_conservative_atom(s: &str) -> bool {
    !s.is_empty()
        && !s.eq_ignore_ascii_case("NIL")
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || b"?=+/_.#-".contains(&b)
        })
}

fn is_quotable(s: &str) -> bool {
    s.len() < 100
        && s.bytes()
            .all(|b| b >= b' ' && b < 127 && b != b'"' && b != b'\\')
}
