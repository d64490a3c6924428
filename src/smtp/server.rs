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

//! The blocking per-connection SMTP server loop.
//!
//! A deliberately permissive receiver: any syntactically plausible sender
//! and recipient are accepted, and recipients unknown to the store get an
//! account created on the fly, so the system under test needs no setup
//! before pointing its mail submission at us.

use std::io::{self, BufRead, Read, Write};

use log::{error, info};

use crate::mime::Message;
use crate::store::store::MailStore;
use crate::support::error::Error;
use std::sync::Arc;

const MAX_LINE: usize = 65536;

static GREETING: &str = concat!(
    "220 ",
    env!("CARGO_PKG_NAME"),
    " ",
    env!("CARGO_PKG_VERSION"),
    " SMTP service ready",
);

/// The envelope being accumulated by the current transaction.
///
/// The RFC 5321 state sequence falls out of which fields are populated:
/// `MAIL FROM` requires a prior HELO, `RCPT TO` a sender, `DATA` at least
/// one recipient.
#[derive(Default)]
struct Envelope {
    helo: Option<String>,
    from: Option<String>,
    recipients: Vec<String>,
}

pub struct Server {
    read: Box<dyn BufRead + Send>,
    write: Box<dyn Write + Send>,
    store: Arc<MailStore>,
    log_prefix: String,
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
        }
    }

    pub fn run(&mut self) -> Result<(), Error> {
        self.reply(GREETING)?;

        let mut envelope = Envelope::default();
        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => {
                    self.reply("500 Line too long")?;
                    return Ok(());
                },
            };

            let (verb, rest) = split_verb(&line);
            match verb.as_str() {
                "HELO" | "EHLO" => {
                    envelope = Envelope {
                        helo: Some(rest.trim().to_owned()),
                        ..Envelope::default()
                    };
                    self.reply(&format!("250 {}", env!("CARGO_PKG_NAME")))?;
                },

                "MAIL" => {
                    if envelope.helo.is_none() {
                        self.reply("503 Send HELO first")?;
                    } else if envelope.from.is_some() {
                        self.reply("503 Nested MAIL command")?;
                    } else if let Some(addr) = parse_path(rest, "FROM") {
                        envelope.from = Some(addr);
                        self.reply("250 OK")?;
                    } else {
                        self.reply("500 Syntax error in MAIL command")?;
                    }
                },

                "RCPT" => {
                    if envelope.from.is_none() {
                        self.reply("503 Need MAIL before RCPT")?;
                    } else if let Some(addr) = parse_path(rest, "TO") {
                        envelope.recipients.push(addr);
                        self.reply("250 OK")?;
                    } else {
                        self.reply("500 Syntax error in RCPT command")?;
                    }
                },

                "DATA" => {
                    if envelope.recipients.is_empty() {
                        self.reply("503 Need RCPT before DATA")?;
                    } else {
                        self.reply("354 Start mail input; end with .")?;
                        let content = self.read_data()?;
                        self.commit(&envelope, content)?;
                        // The envelope is spent but the HELO survives.
                        envelope = Envelope {
                            helo: envelope.helo.take(),
                            ..Envelope::default()
                        };
                        self.reply("250 OK")?;
                    }
                },

                "RSET" => {
                    envelope = Envelope {
                        helo: envelope.helo.take(),
                        ..Envelope::default()
                    };
                    self.reply("250 OK")?;
                },

                "NOOP" => self.reply("250 OK")?,

                // Everyone is plausible here.
                "VRFY" => self.reply(
                    "252 Cannot VRFY user; try RCPT to attempt delivery",
                )?,

                "QUIT" => {
                    self.reply("221 Bye")?;
                    return Ok(());
                },

                _ => self.reply("500 Unrecognised command")?,
            }
        }
    }

    fn commit(
        &mut self,
        envelope: &Envelope,
        content: Vec<u8>,
    ) -> Result<(), Error> {
        let message = Message::new(content);
        for recipient in &envelope.recipients {
            self.store.deliver(recipient, message.clone())?;
        }
        info!(
            "{} Accepted message from <{}> for {} recipient(s)",
            self.log_prefix,
            envelope.from.as_deref().unwrap_or(""),
            envelope.recipients.len(),
        );
        Ok(())
    }

    /// Read the dot-stuffed message body following a DATA command.
    ///
    /// Returns the content with the stuffing removed and the terminating
    /// lone dot consumed.
    fn read_data(&mut self) -> Result<Vec<u8>, Error> {
        let mut content = Vec::<u8>::new();
        loop {
            let line = match self.read_line()? {
                Some(line) => line,
                None => {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "overlong line in DATA",
                    )));
                },
            };

            if "." == line {
                return Ok(content);
            }

            let line = line.strip_prefix('.').unwrap_or(&line);
            content.extend_from_slice(line.as_bytes());
            content.extend_from_slice(b"\r\n");
        }
    }

    /// Read one line with the ending stripped, or `None` if it exceeds the
    /// line limit.
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

fn split_verb(line: &str) -> (String, &str) {
    match line.find(' ') {
        Some(ix) => (line[..ix].to_ascii_uppercase(), &line[ix + 1..]),
        None => (line.to_ascii_uppercase(), ""),
    }
}

/// Extract the address from `FROM:<addr>` / `TO:<addr>`, tolerating missing
/// angle brackets and spaces around the colon.
fn parse_path(rest: &str, keyword: &str) -> Option<String> {
    let rest = rest.trim();
    if rest.len() < keyword.len()
        || !rest[..keyword.len()].eq_ignore_ascii_case(keyword)
    {
        return None;
    }

    let rest = rest[keyword.len()..].trim_start();
    let rest = rest.strip_prefix(':')?.trim();
    let addr = rest
        .strip_prefix('<')
        .and_then(|r| r.strip_suffix('>'))
        .unwrap_or(rest)
        .trim();
    if addr.is_empty() {
        None
    } else {
        Some(addr.to_owned())
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
                error!("SMTP accept failed: {}", e);
                continue;
            },
        };

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_owned());
        let log_prefix = format!("smtp:{}", peer);
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
