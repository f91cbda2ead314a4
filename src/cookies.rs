// Cookie jar that reqwest drives and that can be saved to and restored from disk

use std::io;
use std::sync::{MutexGuard, PoisonError};

use cookie_store::CookieStore as Store;
use reqwest::Url;
use reqwest::cookie::CookieStore;
use reqwest::header::HeaderValue;
use reqwest_cookie_store::CookieStoreMutex;

use crate::error::Result;

#[derive(Debug, Default)]
pub struct CookieJar {
    store: CookieStoreMutex,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value of the first live cookie with this name, whatever its domain.
    pub fn get(&self, name: &str) -> Option<String> {
        self.lock()
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value().to_string())
    }

    /// Serializes every cookie, session cookies included: the portal's
    /// SMSESSION carries no expiry but must survive a restart.
    pub fn to_blob(&self) -> Result<Vec<u8>> {
        let mut blob = Vec::new();
        cookie_store::serde::json::save_incl_expired_and_nonpersistent(&self.lock(), &mut blob)
            .map_err(io::Error::other)?;
        Ok(blob)
    }

    /// Replaces the jar's contents, dropping anything that expired while stored.
    pub fn restore_blob(&self, blob: &[u8]) -> Result<()> {
        let restored = cookie_store::serde::json::load(blob)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        *self.lock() = restored;
        Ok(())
    }
}

impl CookieStore for CookieJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.store.set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.store.cookies(url)
    }
}
