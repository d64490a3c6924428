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

//! A minimal view over a raw RFC 5322 message.
//!
//! The store and the protocol engines treat message content as an opaque
//! byte payload. The only structure ever needed from it is header access (for
//! `SEARCH` and `FETCH` header items) and the total size, so that is all this
//! type provides. There is deliberately no MIME tree, no transfer-decoding,
//! and no charset handling; tests that need richer inspection should parse
//! the raw bytes with a real MIME library on their side.

use std::sync::Arc;

/// An immutable, cheaply clonable raw message.
///
/// Header lookup is a linear scan over the header block. Messages in a test
/// store are small and rarely groveled, so there is no index.
#[derive(Clone, Debug)]
pub struct Message {
    data: Arc<Vec<u8>>,
}

impl Message {
    pub fn new(data: Vec<u8>) -> Self {
        Message {
            data: Arc::new(data),
        }
    }

    /// The exact byte content, as used for `RFC822.SIZE` and `BODY[]`.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The raw header block, including the blank separator line.
    pub fn header_block(&self) -> &[u8] {
        &self.data[..self.body_start()]
    }

    pub fn body(&self) -> &[u8] {
        &self.data[self.body_start()..]
    }

    /// Look up the value of the first header named `name`
    /// (ASCII-case-insensitive), with continuation lines unfolded and
    /// exterior whitespace trimmed.
    ///
    /// Returns `None` if no such header exists. Header values are assumed to
    /// be UTF-8-ish; invalid bytes are replaced.
    pub fn header(&self, name: &str) -> Option<String> {
        let mut lines = HeaderLines {
            data: self.header_block(),
        };

        while let Some(line) = lines.next() {
            let colon = match memchr::memchr(b':', line) {
                Some(c) => c,
                None => continue,
            };

            if !name.as_bytes().eq_ignore_ascii_case(line[..colon].trim()) {
                continue;
            }

            let mut value = Vec::new();
            value.extend_from_slice(&line[colon + 1..]);
            // Unfold any continuation lines.
            while let Some(cont) =
                lines.peek().filter(|l| l.starts_with(b" ") || l.starts_with(b"\t"))
            {
                value.push(b' ');
                value.extend_from_slice(cont.trim());
                lines.next();
            }

            return Some(
                String::from_utf8_lossy(value.trim()).into_owned(),
            );
        }

        None
    }

    pub fn subject(&self) -> Option<String> {
        self.header("Subject")
    }

    pub fn from(&self) -> Option<String> {
        self.header("From")
    }

    pub fn to(&self) -> Option<String> {
        self.header("To")
    }

    fn body_start(&self) -> usize {
        let data: &[u8] = &self.data;
        let mut ix = 0;
        while let Some(lf) = memchr::memchr(b'\n', &data[ix..]) {
            let line = &data[ix..ix + lf];
            ix += lf + 1;
            if line.is_empty() || line == b"\r" {
                return ix;
            }
        }
        data.len()
    }
}

struct HeaderLines<'a> {
    data: &'a [u8],
}

impl<'a> HeaderLines<'a> {
    fn peek(&self) -> Option<&'a [u8]> {
        if self.data.is_empty() {
            return None;
        }

        let line = match memchr::memchr(b'\n', self.data) {
            Some(lf) => &self.data[..lf],
            None => self.data,
        };
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            None
        } else {
            Some(line)
        }
    }
}

impl<'a> Iterator for HeaderLines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        let line = self.peek()?;
        self.data = match memchr::memchr(b'\n', self.data) {
            Some(lf) => &self.data[lf + 1..],
            None => &[],
        };
        Some(line)
    }
}

trait TrimAscii {
    fn trim(&self) -> &Self;
}

impl TrimAscii for [u8] {
    fn trim(&self) -> &[u8] {
        let start = self
            .iter()
            .position(|b| !b.is_ascii_whitespace())
            .unwrap_or(self.len());
        let end = self
            .iter()
            .rposition(|b| !b.is_ascii_whitespace())
            .map(|e| e + 1)
            .unwrap_or(start);
        &self[start..end]
    }
}
