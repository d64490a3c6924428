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

//! Per-connection selected-mailbox state.
//!
//! Folder notifications arrive on whatever thread mutated the folder, inside
//! its critical section. The session listener therefore only forwards events
//! into a channel; the connection's own thread drains the channel between
//! commands and turns the events into unsolicited responses.

use std::sync::Arc;

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::store::folder::{FolderListener, MailFolder};
use crate::store::model::{Flags, Seqnum, Uid};

/// A folder change relevant to a session, queued for the next response
/// window.
#[derive(Clone, Debug)]
pub(super) enum FolderEvent {
    /// One or more messages were appended.
    Added,
    Expunged(Seqnum),
    FlagsUpdated {
        seqnum: Seqnum,
        flags: Flags,
        uid: Option<Uid>,
    },
    FolderDeleted,
}

struct SessionListener {
    events: Sender<FolderEvent>,
}

impl FolderListener for SessionListener {
    fn added(&self, _seqnum: Seqnum) {
        let _ = self.events.send(FolderEvent::Added);
    }

    fn expunged(&self, seqnum: Seqnum) {
        let _ = self.events.send(FolderEvent::Expunged(seqnum));
    }

    fn flags_updated(&self, seqnum: Seqnum, flags: &Flags, uid: Option<Uid>) {
        let _ = self.events.send(FolderEvent::FlagsUpdated {
            seqnum,
            flags: flags.clone(),
            uid,
        });
    }

    fn folder_deleted(&self) {
        let _ = self.events.send(FolderEvent::FolderDeleted);
    }
}

/// The mailbox a session has SELECTed or EXAMINEd, with its event queue.
///
/// Dropping this detaches the listener from the folder.
pub(super) struct SelectedMailbox {
    folder: Arc<MailFolder>,
    read_only: bool,
    listener: Arc<dyn FolderListener>,
    events: Receiver<FolderEvent>,
}

impl SelectedMailbox {
    pub fn select(folder: Arc<MailFolder>, read_only: bool) -> Self {
        let (tx, rx) = unbounded();
        let listener: Arc<dyn FolderListener> =
            Arc::new(SessionListener { events: tx });
        folder.add_listener(Arc::clone(&listener));

        SelectedMailbox {
            folder,
            read_only,
            listener,
            events: rx,
        }
    }

    pub fn folder(&self) -> &Arc<MailFolder> {
        &self.folder
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// The listener to exclude when this session mutates flags itself.
    pub fn listener(&self) -> &Arc<dyn FolderListener> {
        &self.listener
    }

    /// Pull all queued events without blocking.
    pub fn drain_events(&self) -> Vec<FolderEvent> {
        self.events.try_iter().collect()
    }
}

impl Drop for SelectedMailbox {
    fn drop(&mut self) {
        self.folder.remove_listener(&self.listener);
    }
}
