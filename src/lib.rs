//! Client for the Mopar owner portal.
//!
//! ```no_run
//! # async fn demo() -> motorparts::Result<()> {
//! use motorparts::{Credentials, PortalConfig, Session};
//!
//! let credentials = Credentials::new("me@example.com", "secret", "1234", "./cookies.json");
//! let session = Session::connect(credentials, PortalConfig::default()).await?;
//! for (item, value) in session.report(0).await? {
//!     println!("{item}: {value}");
//! }
//! session.lock(0).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod cookies;
pub mod error;
pub mod html;
pub mod models;
pub mod remote;
pub mod session;
pub mod storage;

pub use api::traverse_report;
pub use config::{PortalConfig, Settings, StatusProtocol, VehicleIdentifier};
pub use error::{MoparError, Result};
pub use models::{CommandOutcome, Credentials, RemoteCommand, Summary};
pub use remote::PollOptions;
pub use session::Session;
pub use storage::{FileSessionStore, SessionStore};

pub const ATTRIBUTION: &str = "Information provided by www.mopar.com";
