//! Resolution of which files to update and how.
//!
//! This module contains [`UpdateOptions`], the raw caller-supplied settings,
//! and [`AuthConfig`], the resolved configuration used for a run.

use crate::error::{Error, Result};
use crate::parser::DomainMode;
use crate::paths::{
    expand_tilde, find_local_prefix, project_config_path, same_file, user_config_path,
};
use crate::reconcile::{update_config_files, UpdateSummary};
use std::path::{Path, PathBuf};

/// Options for locating the config files.
///
/// Unset paths fall back to npm's defaults.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    /// Project config declaring registries (default: `{localPrefix}/.npmrc`).
    /// A leading `~` is expanded.
    pub repo_config: Option<String>,
    /// Config that receives credentials (default: `~/.npmrc`).
    /// A leading `~` is expanded.
    pub credential_config: Option<String>,
    /// Override current working directory for project config discovery.
    pub cwd: Option<PathBuf>,
    /// Write credentials for every registry host, not only Artifact Registry.
    pub allow_all_domains: bool,
}

/// Resolved settings for one credential refresh.
///
/// # Examples
///
/// ```no_run
/// use npmrc_auth_rs::{AuthConfig, UpdateOptions};
///
/// let config = AuthConfig::from_options(UpdateOptions::default())?;
/// let summary = config.apply("ya29.token")?;
/// println!("credentials written to {}", summary.target.display());
/// # Ok::<(), npmrc_auth_rs::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    /// Project config declaring registries.
    pub repo_config: PathBuf,
    /// Config that receives credentials.
    pub credential_config: PathBuf,
    /// Which registry hosts get credentials.
    pub mode: DomainMode,
}

impl AuthConfig {
    /// Resolve options against npm's default locations.
    ///
    /// Returns `Err(Error::HomeDirNotFound)` if no credential config was given
    /// and the home directory cannot be determined.
    pub fn from_options(opts: UpdateOptions) -> Result<Self> {
        let repo_config = match opts.repo_config {
            Some(path) => expand_tilde(&path),
            None => {
                let cwd = opts.cwd.unwrap_or_else(|| {
                    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
                });
                project_config_path(&find_local_prefix(&cwd))
            }
        };

        let credential_config = match opts.credential_config {
            Some(path) => expand_tilde(&path),
            None => user_config_path().ok_or(Error::HomeDirNotFound)?,
        };

        Ok(AuthConfig {
            repo_config,
            credential_config,
            mode: DomainMode::from_allow_all(opts.allow_all_domains),
        })
    }

    /// Merge `token` into the configured files.
    pub fn apply(&self, token: &str) -> Result<UpdateSummary> {
        update_config_files(&self.repo_config, &self.credential_config, token, self.mode)
    }

    /// Whether the project and credential configs are the same file.
    pub fn is_shared(&self) -> bool {
        same_file(&self.repo_config, &self.credential_config)
    }

    /// Path of the project config.
    pub fn repo_config_path(&self) -> &Path {
        &self.repo_config
    }

    /// Path of the credential config.
    pub fn credential_config_path(&self) -> &Path {
        &self.credential_config
    }
}
