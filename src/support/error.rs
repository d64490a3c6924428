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

use std::io;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox already exists")]
    MailboxExists,
    #[error("Mailbox does not exist")]
    NxMailbox,
    #[error("Mailbox has child mailboxes")]
    MailboxHasInferiors,
    #[error("Mailbox is not empty")]
    MailboxHasContents,
    #[error("Mailbox is not selectable")]
    MailboxUnselectable,
    #[error("Unsafe mailbox or flag name")]
    UnsafeName,
    #[error("No such message")]
    NxMessage,
    #[error("No such user")]
    NxUser,
    #[error("User already exists")]
    UserExists,
    #[error("Bad user name or password")]
    BadCredentials,
    #[error("Non-existent flag")]
    NxFlag,
    #[error("Bad command syntax: {0}")]
    Syntax(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}
