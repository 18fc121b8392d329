//! Lakejob Core Library
//!
//! This crate provides the core functionality behind the `lakejob` CLI:
//! - Authentication against Azure Active Directory (device code, username/password,
//!   client secret, client certificate)
//! - Data Lake Analytics job management (create, get, cancel)
//! - Job monitoring with a configurable poll policy
//! - Layered configuration (defaults, config file, environment)
//!
//! # Features
//!
//! - `browser` (default): Automatically open the verification URL during the device code flow
//!
//! # Example
//!
//! ```no_run
//! use lakejob_core::{auth, config, jobs};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = config::load_settings(None)?;
//!
//!     // Authenticate using the device code flow
//!     let identity = auth::IdentityClient::new(&settings.identity);
//!     let client_id = settings.identity.device_client_id();
//!     let credential = auth::authenticate_device_code(
//!         &identity,
//!         &client_id,
//!         Some(|event: &auth::DeviceCodeEvent| println!("{}", event.message)),
//!     )
//!     .await?;
//!
//!     // Submit the sample job and wait for it to end
//!     let client = jobs::JobClient::new(credential, &settings.analytics.dns_suffix);
//!     let account = settings.analytics.require_account()?;
//!     let job = jobs::submit_and_wait(
//!         &client,
//!         account,
//!         &jobs::JobInformation::usql("HelloWorld", jobs::HELLO_WORLD_SCRIPT),
//!         &settings.poll,
//!         &CancellationToken::new(),
//!         None,
//!     )
//!     .await?;
//!     println!("Job finished with result: {}", job.result.unwrap_or_default());
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod config;
pub mod http;
pub mod jobs;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use auth::{AuthError, AuthMethod, IdentityClient, TokenCredential};
pub use config::{ConfigSource, Settings};
pub use http::HttpClient;
pub use jobs::{JobClient, JobError, JobInformation, JobResult, JobState, PollPolicy};
