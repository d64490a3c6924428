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

//! Execution of parsed IMAP commands.
//!
//! The processor holds the per-connection protocol state (authentication,
//! selected mailbox) and translates commands into store operations. Untagged
//! data is written directly; the tagged completion result is returned to the
//! caller, which also interleaves any queued unsolicited responses before
//! sending it.

use std::io::Write;
use std::sync::Arc;

use log::info;

use super::lex::LexWriter;
use super::parser::{
    parse_request, Command, FetchItem, Request, RequestError, Section,
    SequenceSet, StatusItem,
};
use super::session::{FolderEvent, SelectedMailbox};
use crate::mime::Message;
use crate::store::folder::{FlagsOp, MailFolder, HIERARCHY_DELIMITER};
use crate::store::message::StoredMessage;
use crate::store::model::{Flag, Flags, Seqnum, Uid};
use crate::store::store::{MailStore, USER_NAMESPACE};
use crate::store::users::User;
use crate::support::error::Error;

static CAPABILITIES: &[&str] = &["IMAP4rev1", "LITERAL+", "UNSELECT"];

static TAGLINE: &str = concat!(
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " IMAP4rev1 server ready",
);

/// The tagged conclusion of a command.
#[derive(Clone, Debug, PartialEq)]
pub(super) enum Response {
    Ok(String),
    No(String),
    Bad(String),
}

/// `Err` carries store or IO failures; the caller turns store failures into
/// `NO`/`BAD` responses and treats IO failures as fatal to the connection.
pub(super) type CmdResult = Result<Response, Error>;

macro_rules! authenticated {
    ($this:expr) => {
        match $this.user {
            Some(ref user) => user.clone(),
            None => return Ok(Response::Bad("Not logged in".to_owned())),
        }
    };
}

macro_rules! selected {
    ($this:expr) => {
        match $this.selected {
            Some(ref sel) => sel,
            None => {
                return Ok(Response::Bad("No mailbox selected".to_owned()))
            },
        }
    };
}

pub struct CommandProcessor {
    log_prefix: String,
    store: Arc<MailStore>,
    user: Option<User>,
    selected: Option<SelectedMailbox>,
    logged_out: bool,
}

impl CommandProcessor {
    pub fn new(log_prefix: String, store: Arc<MailStore>) -> Self {
        CommandProcessor {
            log_prefix,
            store,
            user: None,
            selected: None,
            logged_out: false,
        }
    }

    pub fn logged_out(&self) -> bool {
        self.logged_out
    }

    /// Send the untagged greeting.
    pub fn greet(&self, w: &mut impl Write) -> Result<(), Error> {
        let mut w = LexWriter::new(w);
        w.verbatim("* OK ")?;
        w.verbatim(TAGLINE)?;
        w.end_line()?;
        Ok(())
    }

    /// Process one complete accumulated command line, writing all responses.
    pub fn handle_command(
        &mut self,
        cmdline: &[u8],
        w: &mut impl Write,
    ) -> Result<(), Error> {
        let (max_seqnum, max_uid) = self.sequence_maxima();
        let mut w = LexWriter::new(w);

        let request = match parse_request(cmdline, max_seqnum, max_uid) {
            Ok(request) => request,
            Err(RequestError { tag, error }) => {
                info!("{} Rejected command: {}", self.log_prefix, error);
                match tag {
                    Some(tag) => {
                        w.verbatim(&tag)?;
                        w.verbatim(" BAD ")?;
                    },
                    None => w.verbatim("* BAD ")?,
                }
                w.verbatim(&error.to_string())?;
                w.end_line()?;
                return Ok(());
            },
        };

        let Request { tag, command } = request;
        let result = self.dispatch(command, &mut w);

        let response = match result {
            Ok(response) => response,
            Err(Error::Io(e)) => return Err(Error::Io(e)),
            Err(Error::Syntax(s)) => {
                Response::Bad(Error::Syntax(s).to_string())
            },
            Err(e) => Response::No(e.to_string()),
        };

        self.emit_unsolicited(&mut w)?;

        let (cond, text) = match response {
            Response::Ok(text) => ("OK", text),
            Response::No(text) => ("NO", text),
            Response::Bad(text) => ("BAD", text),
        };
        w.verbatim(&tag)?;
        w.verbatim(" ")?;
        w.verbatim(cond)?;
        w.verbatim(" ")?;
        w.verbatim(&text)?;
        w.end_line()?;
        Ok(())
    }

    /// The values `*` resolves to in sequence sets, from the selected
    /// mailbox.
    fn sequence_maxima(&self) -> (Seqnum, Uid) {
        match self.selected {
            Some(ref sel) => {
                let count = sel.folder().message_count();
                let max_seqnum = if 0 == count {
                    Seqnum::MAX
                } else {
                    Seqnum::from_index(count - 1)
                };
                let max_uid = Uid::of(u32::from(sel.folder().uid_next()) - 1)
                    .unwrap_or(Uid::MAX);
                (max_seqnum, max_uid)
            },
            None => (Seqnum::MAX, Uid::MAX),
        }
    }

    fn dispatch(
        &mut self,
        command: Command,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        match command {
            Command::Capability => self.cmd_capability(w),
            Command::Noop => Ok(Response::Ok("NOOP completed".to_owned())),
            Command::Logout => self.cmd_logout(w),
            Command::Login { userid, password } => {
                self.cmd_login(&userid, &password)
            },

            Command::Select { mailbox } => self.cmd_select(&mailbox, false, w),
            Command::Examine { mailbox } => self.cmd_select(&mailbox, true, w),
            Command::Create { mailbox } => self.cmd_create(&mailbox),
            Command::Delete { mailbox } => self.cmd_delete(&mailbox),
            Command::Rename { from, to } => self.cmd_rename(&from, &to),
            Command::Subscribe { mailbox } => self.cmd_subscribe(&mailbox),
            Command::Unsubscribe { mailbox } => self.cmd_unsubscribe(&mailbox),
            Command::List { reference, pattern } => {
                self.cmd_list(&reference, &pattern, false, w)
            },
            Command::Lsub { reference, pattern } => {
                self.cmd_list(&reference, &pattern, true, w)
            },
            Command::Status { mailbox, items } => {
                self.cmd_status(&mailbox, &items, w)
            },
            Command::Append {
                mailbox,
                flags,
                date,
                content,
            } => self.cmd_append(&mailbox, flags, date, content),

            Command::Check => self.cmd_check(),
            Command::Close => self.cmd_close(),
            Command::Unselect => self.cmd_unselect(),
            Command::Expunge => self.cmd_expunge(),
            Command::Search { term, uid } => self.cmd_search(&term, uid, w),
            Command::Fetch { set, items, uid } => {
                self.cmd_fetch(&set, items, uid, w)
            },
            Command::Store {
                set,
                op,
                silent,
                flags,
                uid,
            } => self.cmd_store(&set, op, silent, flags, uid),
            Command::Copy { set, mailbox, uid } => {
                self.cmd_copy(&set, &mailbox, uid)
            },
        }
    }

    fn cmd_capability(
        &self,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        w.verbatim("* CAPABILITY")?;
        for cap in CAPABILITIES {
            w.verbatim(" ")?;
            w.verbatim(cap)?;
        }
        w.end_line()?;
        Ok(Response::Ok("CAPABILITY completed".to_owned()))
    }

    fn cmd_logout(&mut self, w: &mut LexWriter<&mut impl Write>) -> CmdResult {
        w.verbatim("* BYE Logging out")?;
        w.end_line()?;
        self.selected = None;
        self.user = None;
        self.logged_out = true;
        Ok(Response::Ok("LOGOUT completed".to_owned()))
    }

    fn cmd_login(&mut self, userid: &str, password: &str) -> CmdResult {
        if self.user.is_some() {
            return Ok(Response::Bad("Already logged in".to_owned()));
        }

        // NxUser and BadCredentials collapse to one answer so a probe can't
        // tell which part was wrong.
        let user = self
            .store
            .users()
            .authenticate(userid, password)
            .map_err(|_| Error::BadCredentials)?;
        self.store.inbox(&user)?;

        info!("{} Logged in as {}", self.log_prefix, user.login());
        self.user = Some(user);
        Ok(Response::Ok("LOGIN completed".to_owned()))
    }

    fn cmd_select(
        &mut self,
        mailbox: &str,
        read_only: bool,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        // Whatever happens, the old selection is gone (RFC 3501 says a
        // failed SELECT leaves the session unselected).
        self.selected = None;
        let user = authenticated!(self);

        let folder = self.store.get_folder_required(&user, mailbox)?;
        if !folder.is_selectable() {
            return Err(Error::MailboxUnselectable);
        }

        let selected = SelectedMailbox::select(Arc::clone(&folder), read_only);

        // EXAMINE must not consume recency.
        let recent = folder.recent_count(!read_only);
        w.verbatim(&format!("* FLAGS {}", folder.permanent_flags()))?;
        w.end_line()?;
        w.verbatim(&format!("* {} EXISTS", folder.message_count()))?;
        w.end_line()?;
        w.verbatim(&format!("* {} RECENT", recent))?;
        w.end_line()?;
        if let Some(unseen) = folder.first_unseen() {
            w.verbatim(&format!(
                "* OK [UNSEEN {}] Message {} is first unseen",
                u32::from(unseen),
                u32::from(unseen),
            ))?;
            w.end_line()?;
        }
        w.verbatim(&format!(
            "* OK [UIDVALIDITY {}] UIDs valid",
            folder.uid_validity(),
        ))?;
        w.end_line()?;
        w.verbatim(&format!(
            "* OK [UIDNEXT {}] Predicted next UID",
            u32::from(folder.uid_next()),
        ))?;
        w.end_line()?;
        w.verbatim(&format!(
            "* OK [PERMANENTFLAGS {}] Flags permitted",
            folder.permanent_flags(),
        ))?;
        w.end_line()?;

        self.selected = Some(selected);
        Ok(Response::Ok(if read_only {
            "[READ-ONLY] EXAMINE completed".to_owned()
        } else {
            "[READ-WRITE] SELECT completed".to_owned()
        }))
    }

    fn cmd_create(&mut self, mailbox: &str) -> CmdResult {
        let user = authenticated!(self);
        self.store.create_mailbox(&user, mailbox)?;
        Ok(Response::Ok("CREATE completed".to_owned()))
    }

    fn cmd_delete(&mut self, mailbox: &str) -> CmdResult {
        let user = authenticated!(self);
        self.store.delete_mailbox(&user, mailbox)?;
        Ok(Response::Ok("DELETE completed".to_owned()))
    }

    fn cmd_rename(&mut self, from: &str, to: &str) -> CmdResult {
        let user = authenticated!(self);
        self.store.rename_mailbox(&user, from, to)?;
        Ok(Response::Ok("RENAME completed".to_owned()))
    }

    fn cmd_subscribe(&mut self, mailbox: &str) -> CmdResult {
        let user = authenticated!(self);
        self.store.subscribe(&user, mailbox)?;
        Ok(Response::Ok("SUBSCRIBE completed".to_owned()))
    }

    fn cmd_unsubscribe(&mut self, mailbox: &str) -> CmdResult {
        let user = authenticated!(self);
        self.store.unsubscribe(&user, mailbox)?;
        Ok(Response::Ok("UNSUBSCRIBE completed".to_owned()))
    }

    fn cmd_list(
        &mut self,
        reference: &str,
        pattern: &str,
        lsub: bool,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        let user = authenticated!(self);
        let verb = if lsub { "LSUB" } else { "LIST" };

        // An empty pattern asks only for the hierarchy delimiter.
        if pattern.is_empty() {
            w.verbatim(&format!(
                "* {} (\\Noselect) \"{}\" \"\"",
                verb, HIERARCHY_DELIMITER,
            ))?;
            w.end_line()?;
            return Ok(Response::Ok(format!("{} completed", verb)));
        }

        let search = format!("{}{}", reference, pattern);
        for folder in self.store.list_mailboxes(&user, &search) {
            if lsub && !self.store.is_subscribed(&folder) {
                continue;
            }

            let attributes = if folder.is_selectable() {
                "()"
            } else {
                "(\\Noselect)"
            };
            w.verbatim(&format!(
                "* {} {} \"{}\" ",
                verb, attributes, HIERARCHY_DELIMITER,
            ))?;
            w.mailbox(&visible_name(&user, &folder))?;
            w.end_line()?;
        }

        Ok(Response::Ok(format!("{} completed", verb)))
    }

    fn cmd_status(
        &mut self,
        mailbox: &str,
        items: &[StatusItem],
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        let user = authenticated!(self);
        let folder = self.store.get_folder_required(&user, mailbox)?;
        if !folder.is_selectable() {
            return Err(Error::MailboxUnselectable);
        }

        let mut parts = Vec::with_capacity(items.len());
        for item in items {
            parts.push(match item {
                StatusItem::Messages => {
                    format!("MESSAGES {}", folder.message_count())
                },
                StatusItem::Recent => {
                    format!("RECENT {}", folder.recent_count(false))
                },
                StatusItem::UidNext => {
                    format!("UIDNEXT {}", u32::from(folder.uid_next()))
                },
                StatusItem::UidValidity => {
                    format!("UIDVALIDITY {}", folder.uid_validity())
                },
                StatusItem::Unseen => {
                    format!("UNSEEN {}", folder.unseen_count())
                },
            });
        }

        w.verbatim("* STATUS ")?;
        w.mailbox(&visible_name(&user, &folder))?;
        w.verbatim(&format!(" ({})", parts.join(" ")))?;
        w.end_line()?;
        Ok(Response::Ok("STATUS completed".to_owned()))
    }

    fn cmd_append(
        &mut self,
        mailbox: &str,
        flags: Option<Vec<Flag>>,
        date: Option<chrono::DateTime<chrono::Utc>>,
        content: Vec<u8>,
    ) -> CmdResult {
        let user = authenticated!(self);

        let folder = match self.store.get_folder_required(&user, mailbox) {
            Ok(folder) => folder,
            Err(Error::NxMailbox) => {
                return Ok(Response::No(
                    "[TRYCREATE] Mailbox does not exist".to_owned(),
                ));
            },
            Err(e) => return Err(e),
        };
        if !folder.is_selectable() {
            return Err(Error::MailboxUnselectable);
        }

        let flags = flags.map(|flags| flags.into_iter().collect::<Flags>());
        folder.append(Message::new(content), flags, date);
        Ok(Response::Ok("APPEND completed".to_owned()))
    }

    fn cmd_check(&mut self) -> CmdResult {
        let _ = selected!(self);
        // The store has no housekeeping to request.
        Ok(Response::Ok("CHECK completed".to_owned()))
    }

    fn cmd_close(&mut self) -> CmdResult {
        let _ = selected!(self);
        if let Some(selected) = self.selected.take() {
            let read_only = selected.read_only();
            let folder = Arc::clone(selected.folder());
            // Detach the listener before expunging; CLOSE sends no untagged
            // EXPUNGE responses.
            drop(selected);
            if !read_only {
                folder.expunge();
            }
        }
        Ok(Response::Ok("CLOSE completed".to_owned()))
    }

    fn cmd_unselect(&mut self) -> CmdResult {
        let _ = selected!(self);
        self.selected = None;
        Ok(Response::Ok("UNSELECT completed".to_owned()))
    }

    fn cmd_expunge(&mut self) -> CmdResult {
        let selected = selected!(self);
        if selected.read_only() {
            return Ok(Response::No("Mailbox is read-only".to_owned()));
        }

        selected.folder().expunge();
        Ok(Response::Ok("EXPUNGE completed".to_owned()))
    }

    fn cmd_search(
        &self,
        term: &crate::search::SearchTerm,
        uid_mode: bool,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        let selected = selected!(self);
        let folder = selected.folder();

        let mut line = String::from("* SEARCH");
        for uid in folder.search(term) {
            if uid_mode {
                line.push_str(&format!(" {}", u32::from(uid)));
            } else if let Ok(seqnum) = folder.get_msn(uid) {
                line.push_str(&format!(" {}", u32::from(seqnum)));
            }
        }
        w.verbatim(&line)?;
        w.end_line()?;
        Ok(Response::Ok("SEARCH completed".to_owned()))
    }

    fn cmd_fetch(
        &self,
        set: &SequenceSet,
        mut items: Vec<FetchItem>,
        uid_mode: bool,
        w: &mut LexWriter<&mut impl Write>,
    ) -> CmdResult {
        let selected = selected!(self);
        let folder = selected.folder();

        // Addressing a sequence number beyond the current snapshot is a
        // protocol error; unknown UIDs are merely ignored.
        if let SequenceSet::Seqnum(ref range) = *set {
            if range.max().unwrap_or(0) as usize > folder.message_count() {
                return Ok(Response::Bad(
                    "Message sequence number out of range".to_owned(),
                ));
            }
        }

        let messages = match *set {
            SequenceSet::Seqnum(ref range) => folder.messages_by_seqnum(range),
            SequenceSet::Uid(ref range) => folder.messages_by_uid(range),
        };

        // UID FETCH always reports the UID.
        if uid_mode && !items.contains(&FetchItem::Uid) {
            items.push(FetchItem::Uid);
        }

        let sets_seen = items.iter().any(|item| {
            matches!(
                item,
                FetchItem::Rfc822
                    | FetchItem::Rfc822Text
                    | FetchItem::Body { peek: false, .. }
            )
        });

        for (seqnum, message) in messages {
            let message = if sets_seen
                && !selected.read_only()
                && !message.is_set(&Flag::Seen)
            {
                folder.set_flags(
                    &Flags::from(Flag::Seen),
                    FlagsOp::Add,
                    message.uid(),
                    Some(selected.listener()),
                    false,
                )?;
                // Refresh so a FLAGS item in the same FETCH sees the change.
                folder.get_message(message.uid()).unwrap_or(message)
            } else {
                message
            };

            w.verbatim(&format!("* {} FETCH (", u32::from(seqnum)))?;
            for (ix, item) in items.iter().enumerate() {
                if ix > 0 {
                    w.verbatim(" ")?;
                }
                write_fetch_item(w, item, &message)?;
            }
            w.verbatim(")")?;
            w.end_line()?;
        }

        Ok(Response::Ok("FETCH completed".to_owned()))
    }

    fn cmd_store(
        &self,
        set: &SequenceSet,
        op: FlagsOp,
        silent: bool,
        flags: Vec<Flag>,
        uid_mode: bool,
    ) -> CmdResult {
        let selected = selected!(self);
        if selected.read_only() {
            return Ok(Response::No("Mailbox is read-only".to_owned()));
        }
        let folder = selected.folder();

        let flags = flags.into_iter().collect::<Flags>();
        let messages = match *set {
            SequenceSet::Seqnum(ref range) => folder.messages_by_seqnum(range),
            SequenceSet::Uid(ref range) => folder.messages_by_uid(range),
        };

        // For a non-silent STORE, this session's own listener stays
        // subscribed, and the resulting FETCH FLAGS echo is exactly the
        // response the command wants.
        let silent_listener = if silent {
            Some(selected.listener())
        } else {
            None
        };
        for (_, message) in messages {
            folder.set_flags(
                &flags,
                op,
                message.uid(),
                silent_listener,
                uid_mode,
            )?;
        }

        Ok(Response::Ok("STORE completed".to_owned()))
    }

    fn cmd_copy(
        &self,
        set: &SequenceSet,
        mailbox: &str,
        _uid_mode: bool,
    ) -> CmdResult {
        let user = authenticated!(self);
        let selected = selected!(self);
        let folder = selected.folder();

        let dest = match self.store.get_folder_required(&user, mailbox) {
            Ok(dest) => dest,
            Err(Error::NxMailbox) => {
                return Ok(Response::No(
                    "[TRYCREATE] Mailbox does not exist".to_owned(),
                ));
            },
            Err(e) => return Err(e),
        };
        if !dest.is_selectable() {
            return Err(Error::MailboxUnselectable);
        }

        let messages = match *set {
            SequenceSet::Seqnum(ref range) => folder.messages_by_seqnum(range),
            SequenceSet::Uid(ref range) => folder.messages_by_uid(range),
        };
        for (_, message) in messages {
            folder.copy_message(message.uid(), &dest)?;
        }

        Ok(Response::Ok("COPY completed".to_owned()))
    }

    /// Drain queued folder events into unsolicited responses.
    fn emit_unsolicited(
        &mut self,
        w: &mut LexWriter<&mut impl Write>,
    ) -> Result<(), Error> {
        let deleted = match self.selected {
            Some(ref selected) => {
                let mut added = false;
                let mut deleted = false;
                for event in selected.drain_events() {
                    match event {
                        FolderEvent::Added => added = true,
                        FolderEvent::Expunged(seqnum) => {
                            w.verbatim(&format!(
                                "* {} EXPUNGE",
                                u32::from(seqnum),
                            ))?;
                            w.end_line()?;
                        },
                        FolderEvent::FlagsUpdated { seqnum, flags, uid } => {
                            match uid {
                                Some(uid) => w.verbatim(&format!(
                                    "* {} FETCH (FLAGS {} UID {})",
                                    u32::from(seqnum),
                                    flags,
                                    u32::from(uid),
                                ))?,
                                None => w.verbatim(&format!(
                                    "* {} FETCH (FLAGS {})",
                                    u32::from(seqnum),
                                    flags,
                                ))?,
                            }
                            w.end_line()?;
                        },
                        FolderEvent::FolderDeleted => deleted = true,
                    }
                }

                if added {
                    let folder = selected.folder();
                    w.verbatim(&format!(
                        "* {} EXISTS",
                        folder.message_count(),
                    ))?;
                    w.end_line()?;
                    w.verbatim(&format!(
                        "* {} RECENT",
                        folder.recent_count(false),
                    ))?;
                    w.end_line()?;
                }
                deleted
            },
            None => false,
        };

        if deleted {
            info!(
                "{} Selected mailbox disappeared; deselecting",
                self.log_prefix,
            );
            self.selected = None;
        }
        Ok(())
    }
}

/// The mailbox name as the user addresses it: the fully qualified path with
/// the user's own namespace prefix stripped.
fn visible_name(user: &User, folder: &MailFolder) -> String {
    let full = folder.full_name();
    let prefix = format!(
        "{}{}{}{}",
        USER_NAMESPACE,
        HIERARCHY_DELIMITER,
        user.mailbox_root(),
        HIERARCHY_DELIMITER,
    );
    match full.strip_prefix(&prefix) {
        Some(relative) => relative.to_owned(),
        None => full,
    }
}

fn write_fetch_item(
    w: &mut LexWriter<&mut impl Write>,
    item: &FetchItem,
    message: &StoredMessage,
) -> Result<(), Error> {
    match *item {
        FetchItem::Flags => {
            w.verbatim("FLAGS ")?;
            w.flags(message.flags())?;
        },
        FetchItem::Uid => {
            w.verbatim(&format!("UID {}", u32::from(message.uid())))?;
        },
        FetchItem::InternalDate => {
            w.verbatim("INTERNALDATE ")?;
            w.date_time(message.internal_date())?;
        },
        FetchItem::Rfc822Size => {
            w.verbatim(&format!("RFC822.SIZE {}", message.size()))?;
        },
        FetchItem::Rfc822 => {
            w.verbatim("RFC822 ")?;
            w.literal(message.message().as_bytes())?;
        },
        FetchItem::Rfc822Header => {
            w.verbatim("RFC822.HEADER ")?;
            w.literal(message.message().header_block())?;
        },
        FetchItem::Rfc822Text => {
            w.verbatim("RFC822.TEXT ")?;
            w.literal(message.message().body())?;
        },
        FetchItem::Body { section, .. } => {
            // BODY.PEEK is echoed back as plain BODY per RFC 3501.
            let (label, content) = match section {
                Section::Full => ("BODY[] ", message.message().as_bytes()),
                Section::Header => {
                    ("BODY[HEADER] ", message.message().header_block())
                },
                Section::Text => ("BODY[TEXT] ", message.message().body()),
            };
            w.verbatim(label)?;
            w.literal(content)?;
        },
    }
    Ok(())
}
