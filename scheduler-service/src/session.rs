use shared::{Identity, Role};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a user is already logged in")]
    AlreadyLoggedIn,

    #[error("nobody is logged in")]
    NotLoggedIn,
}

/// Who is logged in to this process, if anyone. Booking calls receive the
/// identity from here; they never read or change the session themselves.
#[derive(Debug, Default)]
pub struct Session {
    current: Option<Identity>,
}

impl Session {
    pub fn current(&self) -> Option<&Identity> {
        self.current.as_ref()
    }

    pub fn current_with_role(&self, role: Role) -> Option<&Identity> {
        self.current.as_ref().filter(|identity| identity.role == role)
    }

    pub fn login(&mut self, identity: Identity) -> Result<(), SessionError> {
        if self.current.is_some() {
            return Err(SessionError::AlreadyLoggedIn);
        }
        self.current = Some(identity);
        Ok(())
    }

    pub fn logout(&mut self) -> Result<Identity, SessionError> {
        self.current.take().ok_or(SessionError::NotLoggedIn)
    }
}
