// SSO login: trades the account credentials for portal session cookies

use crate::error::{MoparError, Result};
use crate::html::extract_field;
use crate::session::Session;

const RELAY_STATE: &str = "RelayState";
const SAML_RESPONSE: &str = "SAMLResponse";

/// Runs the SAML handshake and persists the resulting cookie jar.
///
/// Any stale cookies are discarded first. Every failure, whether a missing
/// form field or a failed request, is reported as `Authentication`; retrying
/// is the caller's decision.
pub async fn login(session: &Session) -> Result<()> {
    tracing::info!(user = %session.credentials().username, "Logging in (no valid cookie found)");

    match handshake(session).await {
        Ok(()) => {
            session.persist()?;
            session.bump_login_generation();
            tracing::info!(cookies = session.jar().len(), "Login complete, session cookies saved");
            Ok(())
        }
        Err(e) => {
            tracing::error!(error = %e, "Login failed");
            Err(match e {
                failed @ MoparError::Authentication(_) => failed,
                other => MoparError::Authentication(other.to_string()),
            })
        }
    }
}

async fn handshake(session: &Session) -> Result<()> {
    let config = session.config();
    let credentials = session.credentials();
    session.jar().clear();

    let sso_page = session
        .http()
        .post(&config.sso_url)
        .form(&[
            ("USER", credentials.username.as_str()),
            ("PASSWORD", credentials.password.as_str()),
            ("TARGET", config.target_url.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let relay_state = extract_field(&sso_page, RELAY_STATE)?;
    let saml_response = extract_field(&sso_page, SAML_RESPONSE)?;
    tracing::debug!("SSO accepted credentials, completing SAML handshake");

    session
        .http()
        .post(&config.signin_url)
        .form(&[
            (RELAY_STATE, relay_state.as_str()),
            (SAML_RESPONSE, saml_response.as_str()),
        ])
        .send()
        .await?
        .error_for_status()?;

    session
        .http()
        .get(&config.signin_url)
        .send()
        .await?
        .error_for_status()?;

    Ok(())
}
