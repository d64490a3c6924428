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

use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex, RwLock};

use chrono::prelude::*;

use super::message::StoredMessage;
use super::model::*;
use crate::mime::Message;
use crate::search::SearchTerm;
use crate::support::error::Error;

/// The hierarchy delimiter used in folder paths.
pub const HIERARCHY_DELIMITER: char = '.';

/// Receives change notifications from a folder.
///
/// Listeners are invoked inside the folder's critical section so that the
/// order of notifications matches the order of mutations. They must only
/// record or forward the event; calling back into the folder deadlocks.
pub trait FolderListener: Send + Sync {
    /// A message was appended and now has the given sequence number.
    fn added(&self, seqnum: Seqnum);
    /// The message at the given (pre-removal) sequence number was expunged.
    fn expunged(&self, seqnum: Seqnum);
    /// The message's flags changed. `uid` is populated if the mutator asked
    /// for UIDs to be included in notifications (UID STORE).
    fn flags_updated(&self, seqnum: Seqnum, flags: &Flags, uid: Option<Uid>);
    /// The whole folder was deleted.
    fn folder_deleted(&self);
}

/// How a flag mutation combines with the existing flag set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagsOp {
    Add,
    Remove,
    Replace,
}

/// A single mailbox folder.
///
/// All mutation happens under one internal mutex, giving the per-folder
/// critical section that keeps UID assignment and sequence numbers
/// consistent. Read accessors take the same lock briefly and return
/// snapshots, so they never observe a folder mid-mutation.
pub struct MailFolder {
    /// Full path; behind a lock so RENAME can update it in place without
    /// invalidating references other sessions hold.
    path: RwLock<String>,
    uid_validity: u32,
    selectable: AtomicBool,
    inner: Mutex<FolderInner>,
    listeners: Mutex<Vec<Arc<dyn FolderListener>>>,
}

struct FolderInner {
    /// Present messages, ascending by UID.
    messages: Vec<StoredMessage>,
    uid_next: Uid,
}

impl MailFolder {
    pub(super) fn new(path: String, selectable: bool) -> Self {
        // RFC 3501 suggests the creation time as the UIDVALIDITY value.
        let uid_validity = Utc::now().timestamp() as u32;
        MailFolder {
            path: RwLock::new(path),
            uid_validity,
            selectable: AtomicBool::new(selectable),
            inner: Mutex::new(FolderInner {
                messages: Vec::new(),
                uid_next: Uid::MIN,
            }),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// The full path of this folder, e.g. `#mail.alice.INBOX`.
    pub fn full_name(&self) -> String {
        self.path.read().unwrap().clone()
    }

    /// The final path component.
    pub fn name(&self) -> String {
        let path = self.path.read().unwrap();
        path.rsplit(HIERARCHY_DELIMITER)
            .next()
            .unwrap_or(&path)
            .to_owned()
    }

    pub(super) fn set_path(&self, path: String) {
        *self.path.write().unwrap() = path;
    }

    /// Whether this folder can be SELECTed, as opposed to being a pure
    /// hierarchy placeholder. Placeholders still exist and may hold
    /// sub-folders.
    pub fn is_selectable(&self) -> bool {
        self.selectable.load(SeqCst)
    }

    pub(super) fn set_selectable(&self, selectable: bool) {
        self.selectable.store(selectable, SeqCst);
    }

    pub fn uid_validity(&self) -> u32 {
        self.uid_validity
    }

    pub fn uid_next(&self) -> Uid {
        self.lock().uid_next
    }

    pub fn permanent_flags(&self) -> Flags {
        Flags::permanent()
    }

    pub fn add_listener(&self, listener: Arc<dyn FolderListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn FolderListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Atomically assign the next UID, insert the message, advance UIDNEXT,
    /// and notify listeners of the new message.
    ///
    /// The `\Recent` flag is always added to whatever `flags` are given.
    pub fn append(
        &self,
        message: Message,
        flags: Option<Flags>,
        internal_date: Option<DateTime<Utc>>,
    ) -> Uid {
        let mut inner = self.lock();

        let uid = inner.uid_next;
        // Running a u32 out of 4 billion appends is not a realistic test
        // scenario; treat it as unrecoverable.
        inner.uid_next = uid.next().expect("UID space exhausted");

        let mut flags = flags.unwrap_or_else(Flags::empty);
        flags.insert(Flag::Recent);

        inner.messages.push(StoredMessage::new(
            uid,
            message,
            flags,
            internal_date.unwrap_or_else(Utc::now),
        ));

        let seqnum = Seqnum::from_index(inner.messages.len() - 1);
        self.notify(|l| l.added(seqnum));

        uid
    }

    /// Remove every message carrying `\Deleted` and return their UIDs in
    /// ascending order.
    ///
    /// Listeners observe one `expunged` event per removed message, in
    /// ascending UID order, each carrying the sequence number the message
    /// had at the moment of its removal (i.e. after the shift caused by
    /// earlier removals in the same expunge). Clients can therefore apply
    /// the events one at a time to their own sequence-number bookkeeping.
    pub fn expunge(&self) -> Vec<Uid> {
        let mut inner = self.lock();
        let mut removed = Vec::new();

        let mut ix = 0;
        while ix < inner.messages.len() {
            if inner.messages[ix].is_set(&Flag::Deleted) {
                let message = inner.messages.remove(ix);
                removed.push(message.uid());
                let seqnum = Seqnum::from_index(ix);
                self.notify(|l| l.expunged(seqnum));
            } else {
                ix += 1;
            }
        }

        removed
    }

    /// Mutate the flag set of the message with the given UID.
    ///
    /// All listeners except `silent` are notified of the resulting flag
    /// set; `silent` is only excluded from this one echo, not from future
    /// notifications. `with_uid` controls whether the notification carries
    /// the UID (UID STORE requires the unsolicited FETCH to include it).
    pub fn set_flags(
        &self,
        flags: &Flags,
        op: FlagsOp,
        uid: Uid,
        silent: Option<&Arc<dyn FolderListener>>,
        with_uid: bool,
    ) -> Result<(), Error> {
        let mut inner = self.lock();
        let ix = inner.index_of(uid).ok_or(Error::NxMessage)?;

        {
            let stored = inner.messages[ix].flags_mut();
            match op {
                FlagsOp::Add => stored.insert_all(flags),
                FlagsOp::Remove => stored.remove_all(flags),
                FlagsOp::Replace => {
                    stored.clear();
                    stored.insert_all(flags);
                }
            }
        }

        let seqnum = Seqnum::from_index(ix);
        let snapshot = inner.messages[ix].flags().clone();
        let uid_note = if with_uid { Some(uid) } else { None };
        self.notify_except(silent, |l| {
            l.flags_updated(seqnum, &snapshot, uid_note)
        });

        Ok(())
    }

    /// Duplicate the message's content, flags and internal date into `dest`,
    /// which assigns a fresh UID.
    ///
    /// The source read and the destination append are two independent
    /// critical sections; concurrent observers may transiently see one
    /// without the other.
    pub fn copy_message(
        &self,
        uid: Uid,
        dest: &MailFolder,
    ) -> Result<Uid, Error> {
        let source = self.get_message(uid).ok_or(Error::NxMessage)?;
        Ok(dest.append(
            source.message().clone(),
            Some(source.flags().clone()),
            Some(source.internal_date()),
        ))
    }

    /// A snapshot of the message with the given UID.
    pub fn get_message(&self, uid: Uid) -> Option<StoredMessage> {
        let inner = self.lock();
        inner
            .index_of(uid)
            .map(|ix| inner.messages[ix].clone())
    }

    /// Resolve a sequence set against the MSN space.
    ///
    /// Returns snapshots in ascending order with their current sequence
    /// numbers. Elements of the set that address no message are silently
    /// dropped.
    pub fn messages_by_seqnum(
        &self,
        range: &SeqRange<Seqnum>,
    ) -> Vec<(Seqnum, StoredMessage)> {
        let inner = self.lock();
        range
            .items(Seqnum::from_index(inner.messages.len().max(1) - 1))
            .filter_map(|seqnum: Seqnum| {
                inner
                    .messages
                    .get(seqnum.to_index())
                    .map(|m| (seqnum, m.clone()))
            })
            .collect()
    }

    /// Resolve a sequence set against the UID space.
    pub fn messages_by_uid(
        &self,
        range: &SeqRange<Uid>,
    ) -> Vec<(Seqnum, StoredMessage)> {
        let inner = self.lock();
        inner
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| range.contains(m.uid()))
            .map(|(ix, m)| (Seqnum::from_index(ix), m.clone()))
            .collect()
    }

    /// Evaluate `term` against every present message and return the UIDs of
    /// matches, ascending.
    pub fn search(&self, term: &SearchTerm) -> Vec<Uid> {
        let inner = self.lock();
        inner
            .messages
            .iter()
            .enumerate()
            .filter(|&(ix, ref m)| term.matches(Seqnum::from_index(ix), m))
            .map(|(_, m)| m.uid())
            .collect()
    }

    pub fn message_count(&self) -> usize {
        self.lock().messages.len()
    }

    /// The current sequence number of the message with the given UID.
    pub fn get_msn(&self, uid: Uid) -> Result<Seqnum, Error> {
        self.lock()
            .index_of(uid)
            .map(Seqnum::from_index)
            .ok_or(Error::NxMessage)
    }

    /// Count the `\Recent` messages, optionally clearing the flag as it
    /// goes (the SELECT behaviour: the first session to see a recent
    /// message consumes its recency).
    pub fn recent_count(&self, reset: bool) -> usize {
        let mut inner = self.lock();
        let mut count = 0;
        for message in &mut inner.messages {
            if message.is_set(&Flag::Recent) {
                count += 1;
                if reset {
                    message.flags_mut().remove(&Flag::Recent);
                }
            }
        }
        count
    }

    pub fn unseen_count(&self) -> usize {
        self.lock()
            .messages
            .iter()
            .filter(|m| !m.is_set(&Flag::Seen))
            .count()
    }

    /// The sequence number of the first message without `\Seen`, if any.
    pub fn first_unseen(&self) -> Option<Seqnum> {
        self.lock()
            .messages
            .iter()
            .position(|m| !m.is_set(&Flag::Seen))
            .map(Seqnum::from_index)
    }

    pub(super) fn signal_deletion(&self) {
        self.notify(|l| l.folder_deleted());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FolderInner> {
        // Mutex poisoning only occurs if a panic happened inside a folder
        // operation, at which point the test run is already lost.
        self.inner.lock().unwrap()
    }

    fn notify(&self, f: impl Fn(&dyn FolderListener)) {
        self.notify_except(None, f);
    }

    fn notify_except(
        &self,
        except: Option<&Arc<dyn FolderListener>>,
        f: impl Fn(&dyn FolderListener),
    ) {
        let listeners = self.listeners.lock().unwrap();
        for listener in listeners.iter() {
            if except.map_or(false, |e| Arc::ptr_eq(e, listener)) {
                continue;
            }
            f(&**listener);
        }
    }
}

impl FolderInner {
    fn index_of(&self, uid: Uid) -> Option<usize> {
        // Messages are sorted by UID.
        self.messages.binary_search_by_key(&uid, |m| m.uid()).ok()
    }
}
