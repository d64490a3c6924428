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

use chrono::prelude::*;

use super::model::{Flag, Flags, Uid};
use crate::mime::Message;

/// A message as held by a folder.
///
/// The content and internal date are immutable, and the UID is assigned
/// exactly once at append time. Only the flag set ever changes, and only
/// through the owning folder's flag operations.
///
/// Instances handed out by the folder are snapshots; their flag set is a
/// copy of the stored state at the time of the call.
#[derive(Clone, Debug)]
pub struct StoredMessage {
    uid: Uid,
    message: Message,
    flags: Flags,
    internal_date: DateTime<Utc>,
}

impl StoredMessage {
    pub(crate) fn new(
        uid: Uid,
        message: Message,
        flags: Flags,
        internal_date: DateTime<Utc>,
    ) -> Self {
        StoredMessage {
            uid,
            message,
            flags,
            internal_date,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn flags(&self) -> &Flags {
        &self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut Flags {
        &mut self.flags
    }

    pub fn internal_date(&self) -> DateTime<Utc> {
        self.internal_date
    }

    pub fn is_set(&self, flag: &Flag) -> bool {
        self.flags.contains(flag)
    }

    /// The message size in octets, as reported by `RFC822.SIZE` and compared
    /// by `LARGER`/`SMALLER`.
    pub fn size(&self) -> usize {
        self.message.size()
    }
}
