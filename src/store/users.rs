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

use std::collections::BTreeMap;
use std::sync::Mutex;

use log::info;

use crate::support::error::Error;

/// An account known to the store.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    login: String,
    email: String,
    password: String,
}

impl User {
    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The component naming this user's subtree of the mailbox hierarchy.
    ///
    /// Logins are frequently email addresses, which contain the hierarchy
    /// delimiter, so the token is the login with delimiters substituted.
    pub fn mailbox_root(&self) -> String {
        self.login
            .replace(super::folder::HIERARCHY_DELIMITER, "_")
    }
}

/// The in-memory account registry.
///
/// Accounts are created up front by test code, or implicitly when mail is
/// delivered to an unknown address (with login and password both set to the
/// address, so tests can immediately log in as the recipient).
pub struct UserManager {
    users: Mutex<BTreeMap<String, User>>,
}

impl UserManager {
    pub fn new() -> Self {
        UserManager {
            users: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create an account, failing if the login is already taken.
    pub fn create_user(
        &self,
        email: &str,
        login: &str,
        password: &str,
    ) -> Result<User, Error> {
        let mut users = self.users.lock().unwrap();
        if users.contains_key(login) {
            return Err(Error::UserExists);
        }

        let user = User {
            login: login.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
        };
        users.insert(login.to_owned(), user.clone());
        info!("Created user {} <{}>", login, email);
        Ok(user)
    }

    pub fn get_user(&self, login: &str) -> Option<User> {
        self.users.lock().unwrap().get(login).cloned()
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned()
    }

    /// Fetch the account for `email`, creating it if unknown.
    pub fn user_for_email(&self, email: &str) -> Result<User, Error> {
        match self.get_user_by_email(email) {
            Some(user) => Ok(user),
            None => self.create_user(email, email, email),
        }
    }

    /// Check a login/password pair.
    pub fn authenticate(
        &self,
        login: &str,
        password: &str,
    ) -> Result<User, Error> {
        let user = self.get_user(login).ok_or(Error::NxUser)?;
        if user.password == password {
            Ok(user)
        } else {
            Err(Error::BadCredentials)
        }
    }

    pub fn delete_user(&self, login: &str) -> Result<(), Error> {
        self.users
            .lock()
            .unwrap()
            .remove(login)
            .map(|_| ())
            .ok_or(Error::NxUser)
    }

    pub fn all_users(&self) -> Vec<User> {
        self.users.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_and_authenticate() {
        let users = UserManager::new();
        users
            .create_user("alice@example.com", "alice", "hunter2")
            .unwrap();

        assert!(users.authenticate("alice", "hunter2").is_ok());
        assert!(matches!(
            users.authenticate("alice", "wrong"),
            Err(Error::BadCredentials),
        ));
        assert!(matches!(
            users.authenticate("nobody", "hunter2"),
            Err(Error::NxUser),
        ));
    }

    #[test]
    fn duplicate_login_rejected() {
        let users = UserManager::new();
        users
            .create_user("alice@example.com", "alice", "hunter2")
            .unwrap();
        assert!(matches!(
            users.create_user("other@example.com", "alice", "x"),
            Err(Error::UserExists),
        ));
    }

    #[test]
    fn mailbox_root_has_no_delimiters() {
        let users = UserManager::new();
        let user = users
            .create_user("a@example.com", "a@example.com", "x")
            .unwrap();
        assert_eq!("a@example_com", user.mailbox_root());
    }

    #[test]
    fn delivery_address_is_auto_provisioned() {
        let users = UserManager::new();
        let user = users.user_for_email("new@example.com").unwrap();
        assert_eq!("new@example.com", user.login());
        assert_eq!("new@example.com", user.password());

        // Idempotent.
        assert_eq!(user, users.user_for_email("new@example.com").unwrap());
    }

    #[test]
    fn lookup_by_email() {
        let users = UserManager::new();
        users
            .create_user("alice@example.com", "alice", "hunter2")
            .unwrap();

        assert_eq!(
            "alice",
            users
                .get_user_by_email("alice@example.com")
                .unwrap()
                .login(),
        );
        assert_eq!(None, users.get_user_by_email("bob@example.com"));
    }
}
