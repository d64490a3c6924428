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

//! The blocking per-connection IMAP server loop.
//!
//! Commands are accumulated into a single buffer before parsing. When a line
//! ends with a literal marker, the continuation prompt is sent (unless the
//! client used LITERAL+), the literal octets and the rest of the command are
//! appended to the buffer, and accumulation continues until a line ends
//! without a marker. The complete buffer then goes to the command processor
//! in one piece.

use std::io::{self, BufRead, Read, Write};
use std::str;

use lazy_static::lazy_static;
use log::{error, info};
use regex::bytes::Regex;

use super::commands::CommandProcessor;
use crate::store::store::MailStore;
use crate::support::error::Error;

const MAX_LINE: usize = 65536;
const MAX_COMMAND: usize = 64 * 1024 * 1024;

lazy_static! {
    static ref LITERAL_AT_EOL: Regex =
        Regex::new(r#"~?\{([0-9]+)\+?\}$"#).unwrap();
}

pub struct Server {
    read: Box<dyn BufRead + Send>,
    write: Box<dyn Write + Send>,
    processor: CommandProcessor,
}

impl Server {
    pub fn new<R: BufRead + Send + 'static, W: Write + Send + 'static>(
        read: R,
        write: W,
        processor: CommandProcessor,
    ) -> Self {
        Server {
            read: Box::new(read),
            write: Box::new(write),
            processor,
        }
    }

    /// Run the server.
    ///
    /// Blocks until the client logs out, the stream ends, or an IO error
    /// occurs.
    pub fn run(&mut self) -> Result<(), Error> {
        self.processor.greet(&mut self.write)?;

        let mut cmdline = Vec::<u8>::new();
        while !self.processor.logged_out() {
            let nread = match self.buffer_next_line(&mut cmdline)? {
                Some(n) => n,
                None => return Ok(()),
            };

            if let Some((length, literal_plus)) =
                check_literal(&cmdline, nread)
            {
                if cmdline.len() + length > MAX_COMMAND {
                    self.write.write_all(b"* BYE Command too long\r\n")?;
                    self.write.flush()?;
                    return Ok(());
                }

                // The literal marker stays in the buffer; the parser
                // re-recognises it and reads the inlined octets after it.
                cmdline.extend_from_slice(b"\r\n");
                if !literal_plus {
                    self.write.write_all(b"+ go\r\n")?;
                    self.write.flush()?;
                }

                let nread = self
                    .read
                    .by_ref()
                    .take(length as u64)
                    .read_to_end(&mut cmdline)?;
                if nread != length {
                    return Err(Error::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "EOF reading literal",
                    )));
                }

                continue;
            }

            self.processor.handle_command(&cmdline, &mut self.write)?;
            cmdline.clear();
        }

        Ok(())
    }

    /// Read the next line, appending it to `cmdline` with the line ending
    /// removed, and return the number of bytes added.
    ///
    /// Returns `None` after telling the client its line was too long, which
    /// terminates the connection.
    fn buffer_next_line(
        &mut self,
        cmdline: &mut Vec<u8>,
    ) -> Result<Option<usize>, Error> {
        let start = cmdline.len();
        let mut nread = self
            .read
            .by_ref()
            .take(MAX_LINE as u64)
            .read_until(b'\n', cmdline)?;

        if 0 == nread {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "EOF reached before reading full line",
            )));
        }

        if !cmdline.ends_with(b"\n") {
            self.write.write_all(b"* BYE Command line too long\r\n")?;
            self.write.flush()?;
            return Ok(None);
        }

        cmdline.pop();
        nread -= 1;
        if cmdline.len() > start && cmdline.ends_with(b"\r") {
            cmdline.pop();
            nread -= 1;
        }

        Ok(Some(nread))
    }
}

/// Check whether the last `nread` bytes of the command line end with a
/// literal marker, returning its announced length and whether it used
/// LITERAL+ syntax.
fn check_literal(cmdline: &[u8], nread: usize) -> Option<(usize, bool)> {
    LITERAL_AT_EOL
        .captures(&cmdline[cmdline.len() - nread..])
        .and_then(|c| c.get(0).and_then(|m0| c.get(1).map(|m1| (m0, m1))))
        .and_then(|(m0, m1)| {
            str::from_utf8(m1.as_bytes())
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .map(|len| (len, m0.as_bytes().contains(&b'+')))
        })
}

/// Accept connections forever, spawning a thread-per-connection server for
/// each.
pub fn serve(
    listener: std::net::TcpListener,
    store: std::sync::Arc<MailStore>,
) -> Result<(), Error> {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                error!("IMAP accept failed: {}", e);
                continue;
            },
        };

        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".to_owned());
        let log_prefix = format!("imap:{}", peer);
        info!("{} Connection established", log_prefix);

        let store = std::sync::Arc::clone(&store);
        std::thread::spawn(move || {
            let read = match stream.try_clone() {
                Ok(read) => io::BufReader::new(read),
                Err(e) => {
                    error!("{} Failed to clone stream: {}", log_prefix, e);
                    return;
                },
            };

            let processor =
                CommandProcessor::new(log_prefix.clone(), store);
            let mut server = Server::new(read, stream, processor);
            match server.run() {
                Ok(()) => info!("{} Connection closed", log_prefix),
                Err(e) => info!("{} Connection lost: {}", log_prefix, e),
            }
        });
    }

    Ok(())
}
