//! Session registry
//!
//! Maps session IDs to [`Session`]s and enforces the display-name rule:
//! at most one authorized session per name (case-sensitive).
//!
//! # Concurrency note
//!
//! The registry is a plain `HashMap` owned by the `ChatServer` actor.
//! Every mutation runs inside that single task, so [`SessionRegistry::authorize`]
//! (name check plus state change) can never interleave with another login.

use std::collections::HashMap;

use tracing::debug;

use crate::error::RequestError;
use crate::message::{Login, Message};
use crate::session::Session;
use crate::types::Usid;

/// All live sessions, keyed by session ID
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<Usid, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted, unauthorized session
    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.usid, session);
    }

    pub fn get(&self, usid: &Usid) -> Option<&Session> {
        self.sessions.get(usid)
    }

    /// Remove a session, returning it if it existed
    pub fn remove(&mut self, usid: &Usid) -> Option<Session> {
        self.sessions.remove(usid)
    }

    /// The session for `usid`, if it exists and is authorized
    ///
    /// # Errors
    /// [`RequestError::NotAuthorized`] otherwise.
    pub fn authorized(&self, usid: &Usid) -> Result<&Session, RequestError> {
        self.sessions
            .get(usid)
            .filter(|session| session.is_authorized())
            .ok_or(RequestError::NotAuthorized)
    }

    /// Authorize `usid` under `login` if the name is free.
    ///
    /// # Errors
    /// - [`RequestError::AlreadyLoggedIn`] if the session is authorized
    /// - [`RequestError::NameTaken`] if another authorized session
    ///   holds the name
    /// - [`RequestError::NotAuthorized`] if the session does not exist
    pub fn authorize(&mut self, usid: &Usid, login: Login) -> Result<&Session, RequestError> {
        match self.sessions.get(usid) {
            None => return Err(RequestError::NotAuthorized),
            Some(session) if session.is_authorized() => {
                return Err(RequestError::AlreadyLoggedIn)
            }
            Some(_) => {}
        }

        if self.is_name_taken(&login.name) {
            return Err(RequestError::NameTaken(login.name));
        }

        debug!("Session {} authorized as '{}'", usid, login.name);
        let session = self
            .sessions
            .get_mut(usid)
            .ok_or(RequestError::NotAuthorized)?;
        session.login = Some(login);
        Ok(&*session)
    }

    /// True if an authorized session uses this display name
    pub fn is_name_taken(&self, name: &str) -> bool {
        self.sessions
            .values()
            .any(|session| session.name() == Some(name))
    }

    /// Login identities of all authorized sessions
    pub fn authorized_logins(&self) -> Vec<Login> {
        self.sessions
            .values()
            .filter_map(|session| session.login.clone())
            .collect()
    }

    /// Queue `msg` on every registered session, authorized or not
    pub fn broadcast(&self, msg: &Message) {
        for session in self.sessions.values() {
            if let Err(e) = session.send(msg.clone()) {
                tracing::warn!("Broadcast to {} dropped: {}", session.usid, e);
            }
        }
    }

    /// Drop every session, closing their outbound queues
    pub fn clear(&mut self) {
        self.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
