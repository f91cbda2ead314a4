// Runtime settings (config file + environment) and the immutable endpoint set
// handed to every session.

use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::models::Credentials;

pub const DEFAULT_COOKIE_PATH: &str = "./motorparts_cookies.json";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/64.0.3282.140 Safari/537.36 Edge/18.17763";
pub const CSRF_HEADER: &str = "mopar-csrf-salt";

const SIGNIN_URL: &str = "https://www.mopar.com/sign-in";
const SSO_URL: &str = "https://sso.extra.chrysler.com/siteminderagent/forms/b2clogin.fcc";
const TARGET_URL: &str = "https://sso.extra.chrysler.com/cgi-bin/moparproderedirect.cgi?\
     env=prd&PartnerSpId=B2CAEM&IdpAdapterId=B2CSM&appID=MOPUSEN_C&TargetResource=";
const PORTAL_BASE: &str = "https://www.mopar.com";

/// Which vehicle identifier an endpoint expects, and under which parameter name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleIdentifier {
    Vin,
    Uuid,
}

impl VehicleIdentifier {
    pub fn param(self) -> &'static str {
        match self {
            VehicleIdentifier::Vin => "vin",
            VehicleIdentifier::Uuid => "uuid",
        }
    }
}

/// Remote status protocol revision.
///
/// `Legacy` polls the command endpoint itself and only knows `SUCCESS`, so a
/// failed command never reaches a terminal state. `Current` polls a dedicated
/// status endpoint that also reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusProtocol {
    #[default]
    Legacy,
    Current,
}

/// Every URL and wire-level knob the client needs. Built once, never mutated.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    pub sso_url: String,
    pub signin_url: String,
    pub target_url: String,
    pub profile_url: String,
    pub token_url: String,
    pub tow_url: String,
    pub vhr_url: String,
    pub lock_url: String,
    pub engine_url: String,
    pub alarm_url: String,
    pub status_url: String,
    pub user_agent: String,
    pub csrf_header: String,
    pub vhr_identifier: VehicleIdentifier,
    pub tow_identifier: VehicleIdentifier,
    pub command_identifier: VehicleIdentifier,
    pub status_protocol: StatusProtocol,
}

impl Default for PortalConfig {
    fn default() -> Self {
        let mut config = Self::with_base_url(PORTAL_BASE);
        config.sso_url = SSO_URL.to_string();
        config.signin_url = SIGNIN_URL.to_string();
        config.target_url = format!("{TARGET_URL}{SIGNIN_URL}");
        config
    }
}

impl PortalConfig {
    /// Lays every endpoint out under a single origin. Used for mock servers
    /// and for portals mirrored behind a proxy.
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let signin_url = format!("{base}/sign-in");
        Self {
            sso_url: format!("{base}/siteminderagent/forms/b2clogin.fcc"),
            target_url: format!(
                "{base}/cgi-bin/moparproderedirect.cgi?env=prd&PartnerSpId=B2CAEM\
                 &IdpAdapterId=B2CSM&appID=MOPUSEN_C&TargetResource={signin_url}"
            ),
            signin_url,
            profile_url: format!("{base}/moparsvc/user/getProfile"),
            token_url: format!("{base}/moparsvc/token"),
            tow_url: format!("{base}/moparsvc/vehicle/tow-guide/vin"),
            vhr_url: format!("{base}/moparsvc/getVHR"),
            lock_url: format!("{base}/moparsvc/connect/lock"),
            engine_url: format!("{base}/moparsvc/connect/engine"),
            alarm_url: format!("{base}/moparsvc/connect/alarm"),
            status_url: format!("{base}/moparsvc/connect/remoteStatus"),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            csrf_header: CSRF_HEADER.to_string(),
            vhr_identifier: VehicleIdentifier::Uuid,
            tow_identifier: VehicleIdentifier::Vin,
            command_identifier: VehicleIdentifier::Vin,
            status_protocol: StatusProtocol::Legacy,
        }
    }

    /// Switches to the later protocol revision, which addresses vehicles by
    /// uuid and reports command failure.
    pub fn current_protocol(mut self) -> Self {
        self.command_identifier = VehicleIdentifier::Uuid;
        self.status_protocol = StatusProtocol::Current;
        self
    }
}

// MOPAR_USERNAME, MOPAR_PASSWORD, MOPAR_PIN, MOPAR_COOKIE_PATH, ...
fn environment() -> Environment {
    Environment::with_prefix("MOPAR").prefix_separator("_").separator("__")
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub username: String,
    pub password: String,
    pub pin: String,
    pub cookie_path: PathBuf,
    pub user_agent: Option<String>,
    pub base_url: Option<String>,
    pub status_protocol: StatusProtocol,
}

impl Settings {
    pub fn new() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::load(environment())
    }

    fn load(env: Environment) -> Result<Self> {
        let builder = Config::builder()
            .set_default("cookie_path", DEFAULT_COOKIE_PATH)?
            .set_default("status_protocol", "legacy")?
            // motorparts.toml next to the binary, if any
            .add_source(File::with_name("motorparts").required(false))
            .add_source(env);

        let settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password, &self.pin, &self.cookie_path)
    }

    pub fn portal_config(&self) -> PortalConfig {
        let mut portal = match &self.base_url {
            Some(base) => PortalConfig::with_base_url(base),
            None => PortalConfig::default(),
        };
        if self.status_protocol == StatusProtocol::Current {
            portal = portal.current_protocol();
        }
        if let Some(agent) = &self.user_agent {
            portal.user_agent = agent.clone();
        }
        portal
    }
}
