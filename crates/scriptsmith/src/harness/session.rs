use std::ops::{Deref, DerefMut};
use std::time::Duration;

use crate::error::CapabilityError;

/// A scriptable browser session.
pub trait BrowserSession {
    fn navigate(&mut self, url: &str) -> Result<(), CapabilityError>;

    /// Blocks until the page's network is idle or `timeout` elapses.
    fn wait_for_idle(&mut self, timeout: Duration) -> Result<(), CapabilityError>;

    /// Releases the session. Called exactly once by [`SessionGuard`].
    fn close(&mut self);
}

/// Owns a session and closes it when dropped, on every exit path.
pub struct SessionGuard<S: BrowserSession> {
    session: S,
}

impl<S: BrowserSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: BrowserSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: BrowserSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: BrowserSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}
