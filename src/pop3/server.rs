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

//! The blocking per-connection POP3 server loop.
//!
//! Authentication takes a snapshot of the INBOX, and message numbers refer
//! to that snapshot for the rest of the session; mail arriving afterwards is
//! not visible until the next login. DELE only marks `\Deleted`; the
//! messages disappear when QUIT moves the session through the update state.
//!
//! Both USER/PASS and APOP are supported. The greeting carries the RFC 1939
//! timestamp banner APOP digests against.

use std::io::{self, BufRead, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use md5::{Digest, Md5};

use crate::search::SearchTerm;
use crate::store::folder::{FlagsOp, MailFolder};
use crate::store::message::StoredMessage;
use crate::store::model::{Flag, Flags, Uid};
use crate::store::store::MailStore;
use crate::store::users::User;
use crate::support::error::Error;

const MAX_LINE: usize = 4096;

static GREETING: &str = concat!(
    "+OK ",
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " POP3 server ready",
);

/// The maildrop a session locked onto at PASS time.
struct Maildrop {
    inbox: Arc<MailFolder>,
    /// UIDs present at login, in maildrop-number order.
    snapshot: Vec<Uid>,
}

impl Maildrop {
    /// Resolve a 1-based maildrop number to its live message, `Err` with
    /// the reply text if it is out of range or already deleted.
    fn message(&self, number: usize) -> Result<StoredMessage, String> {
        let uid = match number {
            0 => return Err("-ERR No such message".to_owned()),
            n => match self.snapshot.get(n - 1) {
                Some(&uid) => uid,
                None => return Err("-ERR No such message".to_owned()),
            },
        };

        match self.inbox.get_message(uid) {
            Some(ref m) if m.is_set(&Flag::Deleted) => {
                Err(format!("-ERR Message {} is deleted", number))
            },
            Some(m) => Ok(m),
            None => Err("-ERR No such message".to_owned()),
        }
    }

    /// All messages still visible, with their maildrop numbers.
    fn visible(&self) -> Vec<(usize, StoredMessage)> {
        self.snapshot
            .iter()
            .enumerate()
            .filter_map(|(ix, &uid)| {
                self.inbox
                    .get_message(uid)
                    .filter(|m| !m.is_set(&Flag::Deleted))
                    .map(|m| (ix + 1, m))
            })
            .collect()
    }
}

pub struct Server {
    read: Box<dyn BufRead + Send>,
    write: Box<dyn Write + Send>,
    store: Arc<MailStore>,
    log_prefix: String,
    /// The timestamp banner sent in the greeting, which APOP digests
    /// against.
    banner: String,
    /// USER argument awaiting its PASS.
    pending_user: Option<String>,
    maildrop: Option<Maildrop>,
}

impl Server {
    pub fn new<R: BufRead + Send + 'static, W: Write + Send + 'static>(
        read: R,
        write: W,
        store: Arc<MailStore>,
        log_prefix: String,
    ) -> Self {
        Server {
            read: Box::new(read),
            write: Box::new(write),
            store,
            log_prefix,
            banner: fresh_banner(),
            pending_user: None,
            maildrop: None,
        }
    }

    pub fn run(&mut self) -> Result<(), Error> {
        let greeting = format!("{} {}", GREETING, self.banner);
        self.reply(&greeting)?;

        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => {
                    self.reply("-ERR Line too long")?;
                    return Ok(());
                },
            };

            let mut words = line.split_whitespace();
            let verb = words
                .next()
                .map(|w| w.to_ascii_uppercase())
                .unwrap_or_default();
            let arg1 = words.next().map(str::to_owned);
            let arg2 = words.next().map(str::to_owned);

            match verb.as_str() {
                "USER" => self.cmd_user(arg1)?,
                "PASS" => self.cmd_pass(arg1)?,
                "APOP" => self.cmd_apop(arg1, arg2)?,
                "CAPA" => self.cmd_capa()?,
                "NOOP" => self.reply("+OK")?,

                "STAT" => self.cmd_stat()?,
                "LIST" => self.cmd_list(arg1)?,
                "UIDL" => self.cmd_uidl(arg1)?,
                "RETR" => self.cmd_retr(arg1)?,
                "TOP" => self.cmd_top(arg1, arg2)?,
                "DELE" => self.cmd_dele(arg1)?,
                "RSET" => self.cmd_rset()?,

                "QUIT" => {
                    if let Some(ref maildrop) = self.maildrop {
                        maildrop.inbox.expunge();
                    }
                    self.reply("+OK Bye")?;
                    return Ok(());
                },

                _ => self.reply("-ERR Unrecognised command")?,
            }
        }
    }

    fn cmd_user(&mut self, arg: Option<String>) -> Result<(), Error> {
        if self.maildrop.is_some() {
            return self.reply("-ERR Already authenticated");
        }
        match arg {
            Some(name) => {
                self.pending_user = Some(name);
                self.reply("+OK Send PASS")
            },
            None => self.reply("-ERR USER requires a name"),
        }
    }

    fn cmd_pass(&mut self, arg: Option<String>) -> Result<(), Error> {
        if self.maildrop.is_some() {
            return self.reply("-ERR Already authenticated");
        }
        let name = match self.pending_user.take() {
            Some(name) => name,
            None => return self.reply("-ERR Send USER first"),
        };
        let password = match arg {
            Some(password) => password,
            None => return self.reply("-ERR PASS requires a password"),
        };

        let user =
            match self.store.users().authenticate(&name, &password) {
                Ok(user) => user,
                Err(_) => {
                    info!(
                        "{} Rejected login for {}",
                        self.log_prefix, name,
                    );
                    return self.reply("-ERR Bad user name or password");
                },
            };

        self.open_maildrop(user)
    }

    fn cmd_apop(
        &mut self,
        arg1: Option<String>,
        arg2: Option<String>,
    ) -> Result<(), Error> {
        if self.maildrop.is_some() {
            return self.reply("-ERR Already authenticated");
        }
        let (name, digest) = match (arg1, arg2) {
            (Some(name), Some(digest)) => (name, digest),
            _ => return self.reply("-ERR APOP requires name and digest"),
        };

        let authentic = self.store.users().get_user(&name).filter(|user| {
            digest.eq_ignore_ascii_case(&apop_digest(
                &self.banner,
                user.password(),
            ))
        });
        match authentic {
            Some(user) => self.open_maildrop(user),
            None => {
                info!("{} Rejected APOP for {}", self.log_prefix, name);
                self.reply("-ERR Bad user name or password")
            },
        }
    }

    fn open_maildrop(&mut self, user: User) -> Result<(), Error> {
        let inbox = self.store.inbox(&user)?;
        let snapshot = inbox.search(&SearchTerm::All);
        info!(
            "{} Opened maildrop for {} ({} messages)",
            self.log_prefix,
            user.login(),
            snapshot.len(),
        );
        self.maildrop = Some(Maildrop { inbox, snapshot });
        self.reply("+OK Maildrop locked and ready")
    }

    fn cmd_capa(&mut self) -> Result<(), Error> {
        self.reply("+OK Capability list follows")?;
        self.reply("USER")?;
        self.reply("TOP")?;
        self.reply("UIDL")?;
        self.reply(".")
    }

    fn cmd_stat(&mut self) -> Result<(), Error> {
        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return self.reply("-ERR Not authenticated"),
        };
        let visible = maildrop.visible();
        let size: usize = visible.iter().map(|(_, m)| m.size()).sum();
        self.reply(&format!("+OK {} {}", visible.len(), size))
    }

    fn cmd_list(&mut self, arg: Option<String>) -> Result<(), Error> {
        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return self.reply("-ERR Not authenticated"),
        };

        match parse_number(arg) {
            NumberArg::Absent => {
                let visible = maildrop.visible();
                let size: usize =
                    visible.iter().map(|(_, m)| m.size()).sum();
                let header = format!(
                    "+OK {} messages ({} octets)",
                    visible.len(),
                    size,
                );
                let lines = visible
                    .iter()
                    .map(|&(n, ref m)| format!("{} {}", n, m.size()))
                    .collect::<Vec<_>>();
                self.reply(&header)?;
                for line in lines {
                    self.reply(&line)?;
                }
                self.reply(".")
            },
            NumberArg::Number(n) => match maildrop.message(n) {
                Ok(m) => self.reply(&format!("+OK {} {}", n, m.size())),
                Err(err) => self.reply(&err),
            },
            NumberArg::Malformed => self.reply("-ERR Bad message number"),
        }
    }

    fn cmd_uidl(&mut self, arg: Option<String>) -> Result<(), Error> {
        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return self.reply("-ERR Not authenticated"),
        };
        // UIDs are stable and never reused within a folder, so the folder
        // UID qualified by the UIDVALIDITY makes a conforming UIDL.
        let validity = maildrop.inbox.uid_validity();

        match parse_number(arg) {
            NumberArg::Absent => {
                let lines = maildrop
                    .visible()
                    .iter()
                    .map(|&(n, ref m)| {
                        format!(
                            "{} {}-{}",
                            n,
                            validity,
                            u32::from(m.uid()),
                        )
                    })
                    .collect::<Vec<_>>();
                self.reply("+OK")?;
                for line in lines {
                    self.reply(&line)?;
                }
                self.reply(".")
            },
            NumberArg::Number(n) => match maildrop.message(n) {
                Ok(m) => self.reply(&format!(
                    "+OK {} {}-{}",
                    n,
                    validity,
                    u32::from(m.uid()),
                )),
                Err(err) => self.reply(&err),
            },
            NumberArg::Malformed => self.reply("-ERR Bad message number"),
        }
    }

    fn cmd_retr(&mut self, arg: Option<String>) -> Result<(), Error> {
        let message = match self.numbered_message(arg) {
            Ok(message) => message,
            Err(err) => return self.reply(&err),
        };

        self.reply(&format!("+OK {} octets", message.size()))?;
        self.write_stuffed(message.message().as_bytes(), usize::MAX)
    }

    fn cmd_top(
        &mut self,
        arg1: Option<String>,
        arg2: Option<String>,
    ) -> Result<(), Error> {
        let body_lines = match parse_number(arg2) {
            NumberArg::Number(n) => n,
            _ => return self.reply("-ERR TOP requires msg and line count"),
        };
        let message = match self.numbered_message(arg1) {
            Ok(message) => message,
            Err(err) => return self.reply(&err),
        };

        self.reply("+OK")?;
        // The header block carries its own blank separator line.
        self.write_unstuffed_lines(message.message().header_block())?;
        self.write_stuffed(message.message().body(), body_lines)
    }

    fn cmd_dele(&mut self, arg: Option<String>) -> Result<(), Error> {
        let message = match self.numbered_message(arg) {
            Ok(message) => message,
            Err(err) => return self.reply(&err),
        };

        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return self.reply("-ERR Not authenticated"),
        };
        maildrop.inbox.set_flags(
            &Flags::from(Flag::Deleted),
            FlagsOp::Add,
            message.uid(),
            None,
            false,
        )?;
        self.reply("+OK Message deleted")
    }

    fn cmd_rset(&mut self) -> Result<(), Error> {
        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return self.reply("-ERR Not authenticated"),
        };

        for &uid in &maildrop.snapshot {
            if let Some(message) = maildrop.inbox.get_message(uid) {
                if message.is_set(&Flag::Deleted) {
                    maildrop.inbox.set_flags(
                        &Flags::from(Flag::Deleted),
                        FlagsOp::Remove,
                        uid,
                        None,
                        false,
                    )?;
                }
            }
        }
        self.reply("+OK")
    }

    /// Look up the message a single-number command addresses, `Err` with
    /// the reply text on any failure.
    fn numbered_message(
        &self,
        arg: Option<String>,
    ) -> Result<StoredMessage, String> {
        let maildrop = match self.maildrop {
            Some(ref maildrop) => maildrop,
            None => return Err("-ERR Not authenticated".to_owned()),
        };
        match parse_number(arg) {
            NumberArg::Number(n) => maildrop.message(n),
            _ => Err("-ERR Bad message number".to_owned()),
        }
    }

    /// Write message content with POP3 byte-stuffing and the terminating
    /// dot, truncated to `max_lines` lines.
    fn write_stuffed(
        &mut self,
        data: &[u8],
        max_lines: usize,
    ) -> Result<(), Error> {
        let mut written = 0;
        let mut start = 0;
        while start < data.len() && written < max_lines {
            let end = memchr::memchr(b'\n', &data[start..])
                .map(|ix| start + ix + 1)
                .unwrap_or(data.len());
            let line = &data[start..end];
            if line.starts_with(b".") {
                self.write.write_all(b".")?;
            }
            self.write.write_all(line)?;
            if !line.ends_with(b"\n") {
                self.write.write_all(b"\r\n")?;
            }
            start = end;
            written += 1;
        }
        self.write.write_all(b".\r\n")?;
        self.write.flush()?;
        Ok(())
    }

    /// Write lines verbatim (header blocks never start with a dot).
    fn write_unstuffed_lines(&mut self, data: &[u8]) -> Result<(), Error> {
        self.write.write_all(data)?;
        if !data.ends_with(b"\n") {
            self.write.write_all(b"\r\n")?;
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Option<String>, Error> {
        let mut line = Vec::<u8>::new();
        let nread = self
            .read
            .by_ref()
            .take(MAX_LINE as u64)
            .read_until(b'\n', &mut line)?;

        if 0 == nread {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF reached before reading full line",
            )));
        }
        if !line.ends_with(b"\n") {
            return Ok(None);
        }

        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    fn reply(&mut self, text: &str) -> Result<(), Error> {
        self.write.write_all(text.as_bytes())?;
        self.write.write_all(b"\r\n")?;
        self.write.flush()?;
        Ok(())
    }
}

/// The RFC 1939 timestamp banner, unique per connection within this
/// process.
fn fresh_banner() -> String {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    format!(
        "<{}.{}.{}@localhost>",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed),
        Utc::now().timestamp(),
    )
}

/// The APOP digest: MD5 over the greeting banner followed by the shared
/// secret, in lowercase hex.
fn apop_digest(banner: &str, password: &str) -> String {
    let mut md5 = Md5::new();
    md5.update(banner.as_bytes());
    md5.update(password.as_bytes());
    hex::encode(md5.finalize())
}

enum NumberArg {
    Absent,
    Number(usize),
    Malformed,
}

fn parse_number(arg: Option<String>) -> NumberArg {
    match arg {
        None => NumberArg::Absent,
        Some(s) => match s.parse::<usize>() {
            Ok(n) => NumberArg::Number(n),
            Err(_) => NumberArg::Malformed,
        },
    }
}

/// Accept connections forever, spawning a thread-per-connection server for
/// each.
pub fn serve(
    listener: std::net::TcpListener,
    store: Arc<MailStore>,
) -> Result<(), Error> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!("POP3 accept failed: {}", e);
                continue;
            },
        };

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_owned());
        let log_prefix = format!("pop3:{}", peer);
        info!("{} Connection established", log_prefix);

        let store = Arc::clone(&store);
        std::thread::spawn(move || {
            let read = match stream.try_clone() {
                Ok(read) => io::BufReader::new(read),
                Err(e) => {
                    error!("{} Failed to clone stream: {}", log_prefix, e);
                    return;
                },
            };

            let mut server =
                Server::new(read, stream, store, log_prefix.clone());
            match server.run() {
                Ok(()) => info!("{} Connection closed", log_prefix),
                Err(e) => info!("{} Connection lost: {}", log_prefix, e),
            }
        });
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::mime::Message;
    use crate::testing::SharedBuffer;

    fn test_store() -> Arc<MailStore> {
        let store = Arc::new(MailStore::new());
        store
            .create_user("alice@example.com", "alice", "hunter2")
            .unwrap();
        store
    }

    fn deliver(store: &Arc<MailStore>, subject: &str, body: &str) {
        store
            .deliver(
                "alice@example.com",
                Message::new(
                    format!(
                        "Subject: {}\r\n\r\n{}\r\n",
                        subject, body,
                    )
                    .into_bytes(),
                ),
            )
            .unwrap();
    }

    fn run_session(store: &Arc<MailStore>, input: &str) -> String {
        let output = SharedBuffer::default();
        let mut server = Server::new(
            Cursor::new(input.as_bytes().to_vec()),
            output.clone(),
            Arc::clone(store),
            "pop3:test".to_owned(),
        );
        let _ = server.run();
        output.into_string()
    }

    const LOGIN: &str = "USER alice\r\nPASS hunter2\r\n";

    #[test]
    fn authentication() {
        let store = test_store();

        let out = run_session(&store, "USER alice\r\nPASS wrong\r\nQUIT\r\n");
        assert!(out.contains("-ERR Bad user name or password"), "{}", out);

        let out = run_session(&store, "PASS hunter2\r\nQUIT\r\n");
        assert!(out.contains("-ERR Send USER first"), "{}", out);

        let out = run_session(&store, "STAT\r\nQUIT\r\n");
        assert!(out.contains("-ERR Not authenticated"), "{}", out);

        let out = run_session(&store, &format!("{}QUIT\r\n", LOGIN));
        assert!(out.contains("+OK Maildrop locked and ready"), "{}", out);
    }

    #[test]
    fn apop_digest_matches_rfc_example() {
        assert_eq!(
            "c4c9334bac560ecc979e58001b3e22fb",
            apop_digest("<1896.697170952@dbc.mtview.ca.us>", "tanstaaf"),
        );
    }

    #[test]
    fn greeting_carries_unique_apop_banner() {
        let store = test_store();
        let banner_of = |out: &str| {
            let greeting = out.lines().next().unwrap().to_owned();
            let start = greeting.find('<').expect("no banner in greeting");
            assert!(greeting.ends_with('>'), "{}", greeting);
            greeting[start..].to_owned()
        };

        let first = banner_of(&run_session(&store, "QUIT\r\n"));
        let second = banner_of(&run_session(&store, "QUIT\r\n"));
        assert_ne!(first, second);
    }

    #[test]
    fn apop_authenticates_with_banner_digest() {
        let store = test_store();
        deliver(&store, "one", "1");

        let output = SharedBuffer::default();
        let mut server = Server::new(
            Cursor::new(Vec::new()),
            output.clone(),
            Arc::clone(&store),
            "pop3:test".to_owned(),
        );
        let digest = apop_digest(&server.banner, "hunter2");
        server.read = Box::new(Cursor::new(
            format!("APOP alice {}\r\nSTAT\r\nQUIT\r\n", digest)
                .into_bytes(),
        ));
        let _ = server.run();

        let out = output.into_string();
        assert!(out.contains("+OK Maildrop locked and ready"), "{}", out);
        assert!(out.contains("+OK 1 "), "{}", out);
    }

    #[test]
    fn apop_rejects_bad_digest() {
        let store = test_store();

        let out = run_session(
            &store,
            "APOP alice 00000000000000000000000000000000\r\nQUIT\r\n",
        );
        assert!(out.contains("-ERR Bad user name or password"), "{}", out);

        let out = run_session(
            &store,
            "APOP nobody 00000000000000000000000000000000\r\nQUIT\r\n",
        );
        assert!(out.contains("-ERR Bad user name or password"), "{}", out);

        let out = run_session(&store, "APOP alice\r\nQUIT\r\n");
        assert!(out.contains("-ERR APOP requires"), "{}", out);
    }

    #[test]
    fn stat_and_list() {
        let store = test_store();
        deliver(&store, "one", "first body");
        deliver(&store, "two", "x");

        let size1 = "Subject: one\r\n\r\nfirst body\r\n".len();
        let size2 = "Subject: two\r\n\r\nx\r\n".len();

        let out = run_session(
            &store,
            &format!("{}STAT\r\nLIST\r\nLIST 2\r\nLIST 9\r\nQUIT\r\n", LOGIN),
        );
        assert!(
            out.contains(&format!("+OK 2 {}", size1 + size2)),
            "{}",
            out,
        );
        assert!(out.contains(&format!("\r\n1 {}\r\n", size1)), "{}", out);
        assert!(out.contains(&format!("\r\n2 {}\r\n", size2)), "{}", out);
        assert!(out.contains(&format!("+OK 2 {}\r\n", size2)), "{}", out);
        assert!(out.contains("-ERR No such message"), "{}", out);
    }

    #[test]
    fn retr_returns_full_message() {
        let store = test_store();
        deliver(&store, "hello", "body text");

        let out = run_session(
            &store,
            &format!("{}RETR 1\r\nQUIT\r\n", LOGIN),
        );
        assert!(
            out.contains(
                "+OK 29 octets\r\n\
                 Subject: hello\r\n\r\nbody text\r\n.\r\n",
            ),
            "{}",
            out,
        );
    }

    #[test]
    fn retr_byte_stuffs_dot_lines() {
        let store = test_store();
        store
            .deliver(
                "alice@example.com",
                Message::new(
                    b"Subject: s\r\n\r\n.hidden\r\nvisible\r\n".to_vec(),
                ),
            )
            .unwrap();

        let out = run_session(
            &store,
            &format!("{}RETR 1\r\nQUIT\r\n", LOGIN),
        );
        assert!(
            out.contains("\r\n..hidden\r\nvisible\r\n.\r\n"),
            "{}",
            out,
        );
    }

    #[test]
    fn top_truncates_body() {
        let store = test_store();
        deliver(&store, "s", "line1\r\nline2\r\nline3");

        let out = run_session(
            &store,
            &format!("{}TOP 1 2\r\nQUIT\r\n", LOGIN),
        );
        assert!(
            out.contains(
                "+OK\r\nSubject: s\r\n\r\nline1\r\nline2\r\n.\r\n",
            ),
            "{}",
            out,
        );
        assert!(!out.contains("line3"), "{}", out);

        let out = run_session(
            &store,
            &format!("{}TOP 1\r\nQUIT\r\n", LOGIN),
        );
        assert!(out.contains("-ERR TOP requires"), "{}", out);
    }

    #[test]
    fn dele_hides_and_quit_expunges() {
        let store = test_store();
        deliver(&store, "one", "1");
        deliver(&store, "two", "2");

        let out = run_session(
            &store,
            &format!(
                "{}DELE 1\r\nSTAT\r\nRETR 1\r\nLIST\r\nQUIT\r\n",
                LOGIN,
            ),
        );
        assert!(out.contains("+OK Message deleted"), "{}", out);
        assert!(out.contains("+OK 1 "), "{}", out);
        assert!(out.contains("-ERR Message 1 is deleted"), "{}", out);
        // Message 2 keeps its number.
        assert!(out.contains("\r\n2 "), "{}", out);

        // QUIT expunged the deleted message.
        let user =
            store.users().get_user_by_email("alice@example.com").unwrap();
        let inbox = store.inbox(&user).unwrap();
        assert_eq!(1, inbox.message_count());
        let uid = inbox.search(&SearchTerm::All)[0];
        let survivor = inbox.get_message(uid).unwrap();
        assert_eq!(Some("two".to_owned()), survivor.message().subject());
    }

    #[test]
    fn rset_undeletes() {
        let store = test_store();
        deliver(&store, "one", "1");

        let out = run_session(
            &store,
            &format!("{}DELE 1\r\nRSET\r\nSTAT\r\nQUIT\r\n", LOGIN),
        );
        assert!(out.contains("+OK 1 "), "{}", out);

        let user =
            store.users().get_user_by_email("alice@example.com").unwrap();
        assert_eq!(1, store.inbox(&user).unwrap().message_count());
    }

    #[test]
    fn uidl_is_stable_across_sessions() {
        let store = test_store();
        deliver(&store, "one", "1");
        deliver(&store, "two", "2");

        let first = run_session(
            &store,
            &format!("{}UIDL 2\r\nDELE 1\r\nQUIT\r\n", LOGIN),
        );
        let second = run_session(
            &store,
            &format!("{}UIDL 1\r\nQUIT\r\n", LOGIN),
        );

        // The survivor kept its UIDL even though its number changed.
        let uidl_of = |out: &str, n: u32| {
            out.lines()
                .find(|l| l.starts_with(&format!("+OK {} ", n)))
                .and_then(|l| l.split(' ').nth(2).map(str::to_owned))
                .expect("no UIDL reply")
        };
        assert_eq!(uidl_of(&first, 2), uidl_of(&second, 1));
    }

    #[test]
    fn new_mail_appears_at_next_login() {
        let store = test_store();
        deliver(&store, "one", "1");

        let out =
            run_session(&store, &format!("{}STAT\r\nQUIT\r\n", LOGIN));
        assert!(out.contains("+OK 1 "), "{}", out);

        deliver(&store, "two", "2");
        let out =
            run_session(&store, &format!("{}STAT\r\nQUIT\r\n", LOGIN));
        assert!(out.contains("+OK 2 "), "{}", out);
    }

    #[test]
    fn capa_lists_extensions() {
        let store = test_store();
        let out = run_session(&store, "CAPA\r\nQUIT\r\n");
        assert!(
            out.contains("+OK Capability list follows\r\nUSER\r\nTOP\r\nUIDL\r\n.\r\n"),
            "{}",
            out,
        );
    }
}
