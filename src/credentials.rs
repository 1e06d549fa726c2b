//! The account the hook posts as. Credentials only ever come from the
//! environment so they stay out of the (usually committed) project file.

use std::fmt;

/// The account handle (e.g. `alice.bsky.social`).
pub const HANDLE_VAR: &str = "BLUESKY_HANDLE";

/// An app password generated for the account, not the account password.
pub const APP_PASSWORD_VAR: &str = "BLUESKY_APP_PASSWORD";

#[derive(Clone, PartialEq)]
pub struct Credentials {
    pub handle: String,
    pub app_password: String,
}

impl Credentials {
    /// Reads [`HANDLE_VAR`] and [`APP_PASSWORD_VAR`] from the process
    /// environment.
    pub fn from_env() -> Option<Credentials> {
        Credentials::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the credentials through `lookup`. Returns `None` if either
    /// variable is unset or empty.
    pub fn from_lookup<F>(lookup: F) -> Option<Credentials>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.is_empty());
        Some(Credentials {
            handle: non_empty(HANDLE_VAR)?,
            app_password: non_empty(APP_PASSWORD_VAR)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("handle", &self.handle)
            .field("app_password", &"<redacted>")
            .finish()
    }
}
