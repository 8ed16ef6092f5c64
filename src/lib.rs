//! Refresh Google Artifact Registry credentials in npm `.npmrc` files.
//!
//! This crate merges a short-lived access token into npm configuration:
//!
//! - Registries are declared in a project `.npmrc` (the *source*)
//! - Credentials are written to the user `~/.npmrc` (the *target*)
//! - Existing tokens are refreshed in place, existing passwords are kept
//! - Credentials found in the project file are moved to the user file
//! - Files are replaced atomically
//!
//! # Quick Start
//!
//! ```no_run
//! use npmrc_auth_rs::{AuthConfig, TokenChain, TokenSource, UpdateOptions};
//!
//! // Project .npmrc found from cwd, credentials written to ~/.npmrc
//! let config = AuthConfig::from_options(UpdateOptions::default())?;
//!
//! // ADC (user or service account key), then the metadata server,
//! // then `gcloud auth print-access-token`
//! let token = TokenChain::google_default().fetch_token()?;
//!
//! let summary = config.apply(&token)?;
//! println!("Credentials updated in {}", summary.target.display());
//! # Ok::<(), npmrc_auth_rs::Error>(())
//! ```
//!
//! # Recognised lines
//!
//! Registry URLs are stored in npm's nerf-darted form (scheme stripped):
//!
//! ```ini
//! @myorg:registry=https://us-west1-npm.pkg.dev/my-project/my-repo/
//! //us-west1-npm.pkg.dev/my-project/my-repo/:_authToken=ya29.token
//! //us-west1-npm.pkg.dev/my-project/my-repo/:_password=base64-encoded-password
//! ```
//!
//! Every other line is carried through unchanged, and each file keeps its
//! line ending (LF or CRLF). By default only Artifact Registry hosts
//! (`<location>-npm.pkg.dev` and the bare `npm.pkg.dev`) are recognised;
//! [`DomainMode::AllDomains`] accepts any host.

mod config;
mod credentials;
mod entry;
mod error;
mod parser;
mod paths;
mod reconcile;
mod writer;

// Re-export main types
pub use config::{AuthConfig, UpdateOptions};
pub use credentials::{
    ApplicationDefault, GcloudCli, MetadataServer, StaticToken, TokenChain, TokenSource,
    CLOUD_PLATFORM_SCOPE, CREDENTIALS_ENV, METADATA_HOST_ENV,
};
pub use entry::{join_lines, Entry};
pub use error::{Error, Result};
pub use parser::{
    line_ending, parse_line, parse_lines, upgrade_legacy_pairs, DomainMode, Patterns,
};
pub use paths::{expand_tilde, find_local_prefix, project_config_path, same_file, user_config_path};
pub use reconcile::{reconcile, reconcile_shared, update_config_files, Reconciled, UpdateSummary};
pub use writer::write_atomic;
