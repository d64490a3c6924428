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

//! Stubmail is an embeddable mail server for testing mail-handling
//! software. It keeps every message in memory and serves the same store
//! over SMTP, POP3, and IMAP4rev1, so a test can submit mail through one
//! protocol and observe it through another.
//!
//! The usual arrangement is to create one [`store::store::MailStore`],
//! hand it to whichever of [`smtp::serve`], [`pop3::serve`], and
//! [`imap::serve`] the test needs (each on its own listener and thread),
//! and use [`store::wait::DeliveryMonitor`] to block the test until the
//! expected number of messages has arrived.
//!
//! Nothing is persisted and no real mail is ever sent.

pub mod mime;
pub mod search;
pub mod store;
pub mod support;

pub mod imap;
pub mod pop3;
pub mod smtp;

#[cfg(test)]
pub mod testing;
