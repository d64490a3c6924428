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

//! The top-level in-memory mail store.
//!
//! All mailboxes of all users live in one flat map keyed by fully-qualified,
//! case-folded path. Hierarchy is purely a naming convention over that map:
//! `#mail.alice.work.reports` is a child of `#mail.alice.work` because of its
//! name, not because either folder holds a reference to the other.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use lazy_static::lazy_static;
use log::info;
use regex::{Regex, RegexBuilder};

use super::folder::{FlagsOp, MailFolder, HIERARCHY_DELIMITER};
use super::model::{Flag, Flags};
use super::users::{User, UserManager};
use super::wait::DeliveryMonitor;
use crate::mime::Message;
use crate::search::SearchTerm;
use crate::support::error::Error;

/// The namespace under which all user mailboxes live.
pub const USER_NAMESPACE: &str = "#mail";
pub const INBOX_NAME: &str = "INBOX";

/// The root store: accounts, mailboxes, and the delivery monitor.
pub struct MailStore {
    folders: Mutex<BTreeMap<String, Arc<MailFolder>>>,
    /// Case-folded full names of subscribed mailboxes.
    subscriptions: Mutex<BTreeSet<String>>,
    users: UserManager,
    monitor: Arc<DeliveryMonitor>,
}

impl MailStore {
    pub fn new() -> Self {
        MailStore {
            folders: Mutex::new(BTreeMap::new()),
            subscriptions: Mutex::new(BTreeSet::new()),
            users: UserManager::new(),
            monitor: Arc::new(DeliveryMonitor::new()),
        }
    }

    pub fn users(&self) -> &UserManager {
        &self.users
    }

    pub fn monitor(&self) -> &Arc<DeliveryMonitor> {
        &self.monitor
    }

    /// Create an account and provision its INBOX.
    pub fn create_user(
        &self,
        email: &str,
        login: &str,
        password: &str,
    ) -> Result<User, Error> {
        let user = self.users.create_user(email, login, password)?;
        self.provision_inbox(&user)?;
        Ok(user)
    }

    /// Fetch the account for a delivery address, provisioning the account
    /// and its INBOX if the address is unknown.
    pub fn user_for_email(&self, email: &str) -> Result<User, Error> {
        let user = self.users.user_for_email(email)?;
        self.provision_inbox(&user)?;
        Ok(user)
    }

    /// Deliver a message to the INBOX of the given address and wake any
    /// delivery waiters.
    ///
    /// Unknown addresses get an account on the fly, so a test can point its
    /// SMTP client at the server without any setup.
    pub fn deliver(&self, email: &str, message: Message) -> Result<(), Error> {
        let user = self.user_for_email(email)?;
        let inbox = self.inbox(&user)?;
        inbox.append(message, None, None);
        info!("Delivered message to <{}>", email);
        self.monitor.message_delivered();
        Ok(())
    }

    /// Resolve a mailbox name as the given user sees it.
    ///
    /// `INBOX` resolves case-insensitively to the user's inbox. Names
    /// starting with `#` are already fully qualified. Anything else is
    /// relative to the user's namespace root.
    fn qualify(user: &User, mailbox_name: &str) -> String {
        if mailbox_name.eq_ignore_ascii_case(INBOX_NAME) {
            format!(
                "{}{}{}{}{}",
                USER_NAMESPACE,
                HIERARCHY_DELIMITER,
                user.mailbox_root(),
                HIERARCHY_DELIMITER,
                INBOX_NAME,
            )
        } else if mailbox_name.starts_with('#') {
            mailbox_name.to_owned()
        } else if mailbox_name.is_empty() {
            format!(
                "{}{}{}",
                USER_NAMESPACE,
                HIERARCHY_DELIMITER,
                user.mailbox_root(),
            )
        } else {
            format!(
                "{}{}{}{}{}",
                USER_NAMESPACE,
                HIERARCHY_DELIMITER,
                user.mailbox_root(),
                HIERARCHY_DELIMITER,
                mailbox_name,
            )
        }
    }

    // Mailbox name matching is case-insensitive, so the map key is the
    // case-folded path while the folder keeps the name it was created with.
    fn key(full_name: &str) -> String {
        full_name.to_ascii_lowercase()
    }

    pub fn get_folder(
        &self,
        user: &User,
        mailbox_name: &str,
    ) -> Option<Arc<MailFolder>> {
        let full = Self::qualify(user, mailbox_name);
        self.folders
            .lock()
            .unwrap()
            .get(&Self::key(&full))
            .map(Arc::clone)
    }

    pub fn get_folder_required(
        &self,
        user: &User,
        mailbox_name: &str,
    ) -> Result<Arc<MailFolder>, Error> {
        self.get_folder(user, mailbox_name).ok_or(Error::NxMailbox)
    }

    /// The user's INBOX, provisioned on first use.
    pub fn inbox(&self, user: &User) -> Result<Arc<MailFolder>, Error> {
        self.provision_inbox(user)?;
        self.get_folder_required(user, INBOX_NAME)
    }

    fn provision_inbox(&self, user: &User) -> Result<(), Error> {
        let full = Self::qualify(user, INBOX_NAME);
        let mut folders = self.folders.lock().unwrap();
        if !folders.contains_key(&Self::key(&full)) {
            Self::create_hierarchy(&mut folders, &full, true)?;
        }
        Ok(())
    }

    /// Create a mailbox, and any missing intermediate mailboxes as
    /// unselectable placeholders.
    ///
    /// Creating a name that currently exists only as a placeholder upgrades
    /// it to a selectable mailbox.
    pub fn create_mailbox(
        &self,
        user: &User,
        mailbox_name: &str,
    ) -> Result<Arc<MailFolder>, Error> {
        let full = Self::qualify(user, mailbox_name);

        // At least a namespace and user root must enclose the new mailbox.
        if full.split(HIERARCHY_DELIMITER).count() < 3 {
            return Err(Error::UnsafeName);
        }

        let mut folders = self.folders.lock().unwrap();
        if let Some(existing) = folders.get(&Self::key(&full)) {
            if existing.is_selectable() {
                return Err(Error::MailboxExists);
            }

            existing.set_selectable(true);
            return Ok(Arc::clone(existing));
        }

        let created = Self::create_hierarchy(&mut folders, &full, true)?;
        info!("Created mailbox {}", full);
        Ok(created)
    }

    fn create_hierarchy(
        folders: &mut BTreeMap<String, Arc<MailFolder>>,
        full_name: &str,
        selectable: bool,
    ) -> Result<Arc<MailFolder>, Error> {
        if full_name
            .split(HIERARCHY_DELIMITER)
            .any(|component| component.is_empty())
        {
            return Err(Error::UnsafeName);
        }

        let mut path = String::new();
        let mut newest = None;
        for component in full_name.split(HIERARCHY_DELIMITER) {
            if !path.is_empty() {
                path.push(HIERARCHY_DELIMITER);
            }
            path.push_str(component);

            let last = path.len() == full_name.len();
            let folder = folders
                .entry(Self::key(&path))
                .or_insert_with(|| {
                    Arc::new(MailFolder::new(path.clone(), selectable && last))
                });
            newest = Some(Arc::clone(folder));
        }

        // The loop runs at least once for any validated name.
        Ok(newest.expect("empty mailbox path"))
    }

    /// Delete a mailbox. It must exist, have no children, and hold no
    /// messages.
    pub fn delete_mailbox(
        &self,
        user: &User,
        mailbox_name: &str,
    ) -> Result<(), Error> {
        let full = Self::qualify(user, mailbox_name);
        let key = Self::key(&full);

        let mut folders = self.folders.lock().unwrap();
        let folder = folders.get(&key).ok_or(Error::NxMailbox)?;

        let child_prefix = format!("{}{}", key, HIERARCHY_DELIMITER);
        if folders.keys().any(|k| k.starts_with(&child_prefix)) {
            return Err(Error::MailboxHasInferiors);
        }
        if folder.message_count() > 0 {
            return Err(Error::MailboxHasContents);
        }

        let folder = folders.remove(&key).expect("checked above");
        drop(folders);
        folder.signal_deletion();
        info!("Deleted mailbox {}", full);
        Ok(())
    }

    /// Rename a mailbox, carrying any child mailboxes along.
    ///
    /// Renaming INBOX is special: the messages move to the newly created
    /// mailbox and INBOX itself stays, empty.
    pub fn rename_mailbox(
        &self,
        user: &User,
        from_name: &str,
        to_name: &str,
    ) -> Result<(), Error> {
        let from_full = Self::qualify(user, from_name);
        let to_full = Self::qualify(user, to_name);

        if from_full.eq_ignore_ascii_case(&Self::qualify(user, INBOX_NAME)) {
            return self.rename_inbox(user, to_name);
        }

        let from_key = Self::key(&from_full);
        let to_key = Self::key(&to_full);

        let mut folders = self.folders.lock().unwrap();
        if !folders.contains_key(&from_key) {
            return Err(Error::NxMailbox);
        }
        if folders.contains_key(&to_key) {
            return Err(Error::MailboxExists);
        }

        let child_prefix = format!("{}{}", from_key, HIERARCHY_DELIMITER);
        let affected = folders
            .keys()
            .filter(|k| **k == from_key || k.starts_with(&child_prefix))
            .cloned()
            .collect::<Vec<_>>();

        for old_key in affected {
            let folder = folders.remove(&old_key).expect("key from same map");
            let new_full =
                format!("{}{}", to_full, &folder.full_name()[from_full.len()..]);
            folder.set_path(new_full.clone());
            folders.insert(Self::key(&new_full), folder);
        }

        info!("Renamed mailbox {} to {}", from_full, to_full);
        Ok(())
    }

    fn rename_inbox(&self, user: &User, to_name: &str) -> Result<(), Error> {
        let inbox = self.inbox(user)?;
        let target = self.create_mailbox(user, to_name)?;

        let deleted = Flags::from(Flag::Deleted);
        for uid in inbox.search(&SearchTerm::All) {
            inbox.copy_message(uid, &target)?;
            inbox.set_flags(&deleted, FlagsOp::Add, uid, None, false)?;
        }
        inbox.expunge();
        Ok(())
    }

    /// Subscribe to a mailbox, which must exist.
    pub fn subscribe(&self, user: &User, mailbox_name: &str) -> Result<(), Error> {
        let folder = self.get_folder_required(user, mailbox_name)?;
        self.subscriptions
            .lock()
            .unwrap()
            .insert(Self::key(&folder.full_name()));
        Ok(())
    }

    /// Drop a subscription. The mailbox itself need not exist anymore.
    pub fn unsubscribe(
        &self,
        user: &User,
        mailbox_name: &str,
    ) -> Result<(), Error> {
        let full = Self::qualify(user, mailbox_name);
        if self.subscriptions.lock().unwrap().remove(&Self::key(&full)) {
            Ok(())
        } else {
            Err(Error::NxMailbox)
        }
    }

    pub fn is_subscribed(&self, folder: &MailFolder) -> bool {
        self.subscriptions
            .lock()
            .unwrap()
            .contains(&Self::key(&folder.full_name()))
    }

    /// All mailboxes the user can see whose name matches the pattern.
    ///
    /// `*` matches anything including the delimiter; `%` matches anything up
    /// to the next delimiter. Results come back sorted by full name.
    pub fn list_mailboxes(
        &self,
        user: &User,
        pattern: &str,
    ) -> Vec<Arc<MailFolder>> {
        lazy_static! {
            static ref WILD: Regex = Regex::new(r"[*%]|[^*%]+").unwrap();
        }

        let full_pattern = Self::qualify(user, pattern);
        let mut regex = String::from("^");
        for part in WILD.find_iter(&full_pattern) {
            match part.as_str() {
                "*" => regex.push_str(".*"),
                "%" => regex.push_str("[^.]*"),
                literal => regex.push_str(&regex::escape(literal)),
            }
        }
        regex.push('$');

        // The pattern is built from an escape; it always compiles.
        let regex = RegexBuilder::new(&regex)
            .case_insensitive(true)
            .build()
            .expect("mailbox pattern failed to compile");

        self.folders
            .lock()
            .unwrap()
            .values()
            .filter(|f| regex.is_match(&f.full_name()))
            .map(Arc::clone)
            .collect()
    }
}

impl Default for MailStore {
    fn default() -> Self {
        MailStore::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn store_with_user() -> (MailStore, User) {
        let store = MailStore::new();
        let user = store
            .create_user("alice@example.com", "alice", "hunter2")
            .unwrap();
        (store, user)
    }

    fn message() -> Message {
        Message::new(b"Subject: hi\r\n\r\nbody\r\n".to_vec())
    }

    #[test]
    fn inbox_provisioned_with_account() {
        let (store, user) = store_with_user();
        let inbox = store.get_folder_required(&user, "INBOX").unwrap();
        assert!(inbox.is_selectable());
        assert_eq!("#mail.alice.INBOX", inbox.full_name());
    }

    #[test]
    fn inbox_name_is_case_insensitive() {
        let (store, user) = store_with_user();
        assert!(store.get_folder(&user, "inbox").is_some());
        assert!(store.get_folder(&user, "InBoX").is_some());
    }

    #[test]
    fn create_makes_placeholder_parents() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work.reports.q3").unwrap();

        let leaf = store.get_folder_required(&user, "work.reports.q3").unwrap();
        assert!(leaf.is_selectable());

        let mid = store.get_folder_required(&user, "work.reports").unwrap();
        assert!(!mid.is_selectable());
        let top = store.get_folder_required(&user, "work").unwrap();
        assert!(!top.is_selectable());

        // Creating the placeholder name upgrades it rather than failing.
        let mid = store.create_mailbox(&user, "work.reports").unwrap();
        assert!(mid.is_selectable());
    }

    #[test]
    fn create_existing_fails() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work").unwrap();
        assert!(matches!(
            store.create_mailbox(&user, "work"),
            Err(Error::MailboxExists),
        ));
        assert!(matches!(
            store.create_mailbox(&user, "WORK"),
            Err(Error::MailboxExists),
        ));
    }

    #[test]
    fn create_rejects_malformed_names() {
        let (store, user) = store_with_user();
        assert!(matches!(
            store.create_mailbox(&user, "work..reports"),
            Err(Error::UnsafeName),
        ));
        assert!(matches!(
            store.create_mailbox(&user, "work."),
            Err(Error::UnsafeName),
        ));
        assert!(matches!(
            store.create_mailbox(&user, ""),
            Err(Error::UnsafeName),
        ));
    }

    #[test]
    fn delete_constraints() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work.reports").unwrap();

        assert!(matches!(
            store.delete_mailbox(&user, "nonexistent"),
            Err(Error::NxMailbox),
        ));
        assert!(matches!(
            store.delete_mailbox(&user, "work"),
            Err(Error::MailboxHasInferiors),
        ));

        let reports = store.get_folder_required(&user, "work.reports").unwrap();
        reports.append(message(), None, None);
        assert!(matches!(
            store.delete_mailbox(&user, "work.reports"),
            Err(Error::MailboxHasContents),
        ));

        let uid = reports.get_message(crate::store::model::Uid::u(1)).unwrap().uid();
        reports
            .set_flags(&Flag::Deleted.into(), FlagsOp::Add, uid, None, false)
            .unwrap();
        reports.expunge();

        store.delete_mailbox(&user, "work.reports").unwrap();
        assert!(store.get_folder(&user, "work.reports").is_none());
        store.delete_mailbox(&user, "work").unwrap();
    }

    #[test]
    fn rename_carries_children() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work.reports").unwrap();
        let reports = store.get_folder_required(&user, "work.reports").unwrap();
        reports.append(message(), None, None);

        store.rename_mailbox(&user, "work", "archive").unwrap();

        assert!(store.get_folder(&user, "work").is_none());
        assert!(store.get_folder(&user, "work.reports").is_none());
        let moved = store.get_folder_required(&user, "archive.reports").unwrap();
        assert_eq!(1, moved.message_count());
        assert_eq!("#mail.alice.archive.reports", moved.full_name());
        // Same folder object under the new name.
        assert!(Arc::ptr_eq(&reports, &moved));
    }

    #[test]
    fn rename_to_existing_fails() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "a").unwrap();
        store.create_mailbox(&user, "b").unwrap();
        assert!(matches!(
            store.rename_mailbox(&user, "a", "b"),
            Err(Error::MailboxExists),
        ));
        assert!(matches!(
            store.rename_mailbox(&user, "nonexistent", "c"),
            Err(Error::NxMailbox),
        ));
    }

    #[test]
    fn rename_inbox_moves_messages_and_keeps_inbox() {
        let (store, user) = store_with_user();
        let inbox = store.inbox(&user).unwrap();
        inbox.append(message(), None, None);
        inbox.append(message(), None, None);

        store.rename_mailbox(&user, "INBOX", "old-mail").unwrap();

        let inbox = store.inbox(&user).unwrap();
        assert_eq!(0, inbox.message_count());
        let moved = store.get_folder_required(&user, "old-mail").unwrap();
        assert_eq!(2, moved.message_count());
    }

    #[test]
    fn list_wildcards() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work.reports").unwrap();
        store.create_mailbox(&user, "work.notes").unwrap();
        store.create_mailbox(&user, "personal").unwrap();

        let names = |pattern: &str| {
            store
                .list_mailboxes(&user, pattern)
                .iter()
                .map(|f| f.full_name())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            vec![
                "#mail.alice.INBOX".to_owned(),
                "#mail.alice.personal".to_owned(),
                "#mail.alice.work".to_owned(),
                "#mail.alice.work.notes".to_owned(),
                "#mail.alice.work.reports".to_owned(),
            ],
            names("*"),
        );

        // % stops at the delimiter.
        assert_eq!(
            vec![
                "#mail.alice.INBOX".to_owned(),
                "#mail.alice.personal".to_owned(),
                "#mail.alice.work".to_owned(),
            ],
            names("%"),
        );

        assert_eq!(
            vec![
                "#mail.alice.work.notes".to_owned(),
                "#mail.alice.work.reports".to_owned(),
            ],
            names("work.%"),
        );

        assert!(names("nothing*").is_empty());
    }

    #[test]
    fn list_does_not_cross_users() {
        let (store, alice) = store_with_user();
        let bob = store
            .create_user("bob@example.com", "bob", "x")
            .unwrap();
        store.create_mailbox(&bob, "secrets").unwrap();

        assert!(store
            .list_mailboxes(&alice, "*")
            .iter()
            .all(|f| f.full_name().starts_with("#mail.alice")));
    }

    #[test]
    fn subscriptions() {
        let (store, user) = store_with_user();
        store.create_mailbox(&user, "work").unwrap();

        assert!(matches!(
            store.subscribe(&user, "nonexistent"),
            Err(Error::NxMailbox),
        ));

        store.subscribe(&user, "work").unwrap();
        let work = store.get_folder_required(&user, "work").unwrap();
        assert!(store.is_subscribed(&work));

        // Subscription survives deletion of the mailbox and can still be
        // dropped afterwards.
        store.delete_mailbox(&user, "work").unwrap();
        store.unsubscribe(&user, "work").unwrap();
        assert!(matches!(
            store.unsubscribe(&user, "work"),
            Err(Error::NxMailbox),
        ));
    }

    #[test]
    fn delivery_auto_provisions_and_notifies() {
        let store = MailStore::new();
        store.deliver("new@example.com", message()).unwrap();

        let user = store.users().get_user("new@example.com").unwrap();
        let inbox = store.inbox(&user).unwrap();
        assert_eq!(1, inbox.message_count());
        assert_eq!(1, store.monitor().delivered_count());

        // The delivered message is \Recent.
        let stored = inbox.get_message(crate::store::model::Uid::u(1)).unwrap();
        assert!(stored.is_set(&Flag::Recent));
    }
}
