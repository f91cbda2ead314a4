// Authenticated portal session: the HTTP client and the cookie jar it shares.
// Domain operations are plain async functions over `&Session`; re-login and
// CSRF attachment are applied by nesting the two wrappers:
//
//     session.call_authenticated(|s| s.with_csrf_token(|s| fetch_something(s))).await

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;

use crate::auth;
use crate::config::PortalConfig;
use crate::cookies::CookieJar;
use crate::error::{MoparError, Result};
use crate::models::Credentials;
use crate::storage::{FileSessionStore, SessionStore};

pub struct Session {
    http: Client,
    jar: Arc<CookieJar>,
    csrf: Mutex<Option<(HeaderName, HeaderValue)>>,
    credentials: Credentials,
    config: Arc<PortalConfig>,
    store: Box<dyn SessionStore>,
    // Serializes re-login so concurrent callers never overwrite each other's cookies
    login_lock: tokio::sync::Mutex<()>,
    login_generation: AtomicU64,
}

impl Session {
    /// Restores the cookie jar saved at `credentials.cookie_path`, or logs in
    /// when there is none.
    pub async fn connect(credentials: Credentials, config: PortalConfig) -> Result<Self> {
        let store = FileSessionStore::new(&credentials.cookie_path);
        Self::with_store(credentials, config, Box::new(store)).await
    }

    pub async fn with_store(
        credentials: Credentials,
        config: PortalConfig,
        store: Box<dyn SessionStore>,
    ) -> Result<Self> {
        let session = Self::new(credentials, config, store)?;

        if let Some(blob) = session.store.load()? {
            match session.jar.restore_blob(&blob) {
                Ok(()) => {
                    tracing::info!(cookies = session.jar.len(), "Restored saved session");
                    return Ok(session);
                }
                Err(e) => tracing::warn!(error = %e, "Saved session is unreadable, logging in again"),
            }
        }

        auth::login(&session).await?;
        Ok(session)
    }

    /// Builds a session without touching the store or the network.
    pub fn new(
        credentials: Credentials,
        config: PortalConfig,
        store: Box<dyn SessionStore>,
    ) -> Result<Self> {
        let jar = Arc::new(CookieJar::new());
        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .cookie_provider(Arc::clone(&jar))
            .build()?;

        Ok(Self {
            http,
            jar,
            csrf: Mutex::new(None),
            credentials,
            config: Arc::new(config),
            store,
            login_lock: tokio::sync::Mutex::new(()),
            login_generation: AtomicU64::new(0),
        })
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Undecorated client: no CSRF header. Used by the login handshake.
    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    pub(crate) fn get(&self, url: &str) -> RequestBuilder {
        self.decorate(self.http.get(url))
    }

    pub(crate) fn post(&self, url: &str) -> RequestBuilder {
        self.decorate(self.http.post(url))
    }

    fn decorate(&self, request: RequestBuilder) -> RequestBuilder {
        match self.csrf_header() {
            Some((name, value)) => request.header(name, value),
            None => request,
        }
    }

    fn csrf_header(&self) -> Option<(HeaderName, HeaderValue)> {
        self.csrf
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The token that will be attached to the next request, if any.
    pub fn csrf_token(&self) -> Option<String> {
        self.csrf_header()
            .and_then(|(_, value)| value.to_str().ok().map(str::to_string))
    }

    pub(crate) fn set_csrf_token(&self, token: &str) -> Result<()> {
        let name = HeaderName::from_bytes(self.config.csrf_header.as_bytes())
            .map_err(|e| MoparError::Protocol(format!("invalid CSRF header name: {e}")))?;
        let value = HeaderValue::from_str(token)
            .map_err(|e| MoparError::Protocol(format!("CSRF token is not a valid header value: {e}")))?;
        *self.csrf.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some((name, value));
        Ok(())
    }

    /// Writes the current cookie jar to the session store.
    pub fn persist(&self) -> Result<()> {
        let blob = self.jar.to_blob()?;
        self.store.save(&blob)
    }

    pub(crate) fn bump_login_generation(&self) {
        self.login_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of successful logins performed by this session.
    pub fn login_count(&self) -> u64 {
        self.login_generation.load(Ordering::SeqCst)
    }

    /// Runs `op`, logging in again and retrying once if it reports
    /// `NotAuthenticated`. A second `NotAuthenticated` becomes a fatal
    /// `Authentication` error.
    pub async fn call_authenticated<'a, T, F, Fut>(&'a self, op: F) -> Result<T>
    where
        F: Fn(&'a Session) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let generation = self.login_generation.load(Ordering::SeqCst);
        match op(self).await {
            Err(MoparError::NotAuthenticated) => {}
            other => return other,
        }

        tracing::warn!("Attempted to access page before login, re-authenticating");
        let _guard = self.login_lock.lock().await;
        // Another caller may have logged in while we waited for the lock
        if self.login_generation.load(Ordering::SeqCst) == generation {
            auth::login(self).await?;
        } else {
            tracing::debug!("Session was refreshed concurrently, skipping login");
        }

        match op(self).await {
            Err(MoparError::NotAuthenticated) => Err(MoparError::Authentication(
                "still not logged in after re-authenticating".into(),
            )),
            other => other,
        }
    }

    /// Fetches a CSRF token, attaches it to the session, then runs `op`.
    pub async fn with_csrf_token<'a, T, F, Fut>(&'a self, op: F) -> Result<T>
    where
        F: FnOnce(&'a Session) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        self.refresh_csrf_token().await?;
        op(self).await
    }

    async fn refresh_csrf_token(&self) -> Result<()> {
        let body = self.http.get(&self.config.token_url).send().await?.text().await?;
        let document = authenticated_document(&body)?;
        let token = document
            .get("token")
            .and_then(Value::as_str)
            .ok_or_else(|| MoparError::Protocol("token response has no token field".into()))?;
        self.set_csrf_token(token)?;
        tracing::debug!("Attached fresh CSRF token");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("credentials", &self.credentials)
            .field("cookies", &self.jar.len())
            .field("logins", &self.login_count())
            .finish_non_exhaustive()
    }
}

fn is_forbidden(document: &Value) -> bool {
    match document.get("errorCode") {
        Some(Value::String(code)) => code == "403",
        Some(Value::Number(code)) => code.as_u64() == Some(403),
        _ => false,
    }
}

/// Parses a body from an endpoint that answers with an HTML login page when
/// the session has lapsed: anything that is not JSON, or that carries a 403
/// `errorCode`, means `NotAuthenticated`.
pub fn authenticated_document(body: &str) -> Result<Value> {
    let document: Value =
        serde_json::from_str(body).map_err(|_| MoparError::NotAuthenticated)?;
    if is_forbidden(&document) {
        return Err(MoparError::NotAuthenticated);
    }
    Ok(document)
}

/// Parses a JSON body where malformed content means the portal changed shape.
/// A 403 `errorCode` still means the session lapsed.
pub fn document(body: &str) -> Result<Value> {
    let document: Value = serde_json::from_str(body)
        .map_err(|e| MoparError::Protocol(format!("expected a JSON document: {e}")))?;
    if is_forbidden(&document) {
        return Err(MoparError::NotAuthenticated);
    }
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::sync::atomic::AtomicUsize;

    struct MemoryStore(Mutex<Option<Vec<u8>>>);

    impl SessionStore for MemoryStore {
        fn load(&self) -> Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().clone())
        }

        fn save(&self, blob: &[u8]) -> Result<()> {
            *self.0.lock().unwrap() = Some(blob.to_vec());
            Ok(())
        }
    }

    fn offline_session() -> Session {
        Session::new(
            Credentials::new("user", "pass", "1234", "unused.json"),
            PortalConfig::with_base_url("http://127.0.0.1:9"),
            Box::new(MemoryStore(Mutex::new(None))),
        )
        .unwrap()
    }

    #[test]
    fn html_body_means_not_authenticated() {
        let err = authenticated_document("<html>Sign in</html>").unwrap_err();
        assert!(err.is_not_authenticated());
    }

    #[test]
    fn forbidden_error_code_means_not_authenticated() {
        assert!(authenticated_document(r#"{"errorCode":"403"}"#).unwrap_err().is_not_authenticated());
        assert!(authenticated_document(r#"{"errorCode":403}"#).unwrap_err().is_not_authenticated());
        assert!(document(r#"{"errorCode":"403"}"#).unwrap_err().is_not_authenticated());
    }

    #[test]
    fn other_error_codes_pass_through() {
        let doc = authenticated_document(r#"{"errorCode":"500","vehicles":[]}"#).unwrap();
        assert_eq!(doc["errorCode"], "500");
    }

    #[test]
    fn malformed_plain_document_is_protocol_error() {
        assert!(matches!(document("oops"), Err(MoparError::Protocol(_))));
    }

    #[test]
    fn csrf_token_is_replaced_not_merged() {
        let session = offline_session();
        assert_eq!(session.csrf_token(), None);
        session.set_csrf_token("first").unwrap();
        session.set_csrf_token("second").unwrap();
        assert_eq!(session.csrf_token().as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn passes_through_success_and_non_auth_errors() {
        let session = offline_session();

        let value = session.call_authenticated(|_| async { Ok(7) }).await.unwrap();
        assert_eq!(value, 7);

        let calls = AtomicUsize::new(0);
        let err = session
            .call_authenticated(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(MoparError::Validation("bad index".into())) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, MoparError::Validation(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.login_count(), 0);
    }

    #[tokio::test]
    async fn restores_saved_cookies_without_logging_in() {
        let saved = CookieJar::new();
        let set_cookie = HeaderValue::from_static("SMSESSION=saved; Path=/");
        saved.set_cookies(
            &mut std::iter::once(&set_cookie),
            &reqwest::Url::parse("http://127.0.0.1:9/sign-in").unwrap(),
        );
        let blob = saved.to_blob().unwrap();
        let session = Session::with_store(
            Credentials::new("user", "pass", "1234", "unused.json"),
            PortalConfig::with_base_url("http://127.0.0.1:9"),
            Box::new(MemoryStore(Mutex::new(Some(blob)))),
        )
        .await
        .unwrap();

        assert_eq!(session.login_count(), 0);
        assert_eq!(session.jar().get("SMSESSION").as_deref(), Some("saved"));
    }
}
