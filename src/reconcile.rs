//! Merging registry declarations and credentials across two .npmrc files.
//!
//! The *source* file (usually the project `.npmrc`) declares registries. The
//! *target* file (usually `~/.npmrc`) holds credentials. Reconciliation:
//!
//! - keeps registry declarations and unrelated lines in the source,
//! - moves `_authToken`/`_password` lines out of the source into the target,
//! - refreshes every `_authToken` already in the target with the new token,
//! - appends an `_authToken` for every declared registry the target lacks.
//!
//! An existing `_password` for a registry always wins over a new token.
//!
//! Each file keeps its line ending: a CRLF file is written back with CRLF.

use crate::credentials::check_token;
use crate::entry::{join_lines, Entry};
use crate::error::{Error, Result};
use crate::parser::{line_ending, parse_lines, upgrade_legacy_pairs, DomainMode, Patterns};
use crate::paths::same_file;
use crate::writer::write_atomic;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The result of reconciling a source and a target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// New source entries, in original order.
    pub source: Vec<Entry>,
    /// New target entries: existing lines first, then newly added credentials.
    pub target: Vec<Entry>,
    /// Number of credentials appended to the target.
    pub added: usize,
    /// Number of existing target tokens replaced with the new token.
    pub refreshed: usize,
    /// Number of registries whose existing target `_password` was kept.
    pub kept_passwords: usize,
    /// Line terminator of the source file.
    pub source_line_ending: &'static str,
    /// Line terminator of the target file (the source's if the target has none).
    pub target_line_ending: &'static str,
}

impl Reconciled {
    /// Source file content to write.
    pub fn source_content(&self) -> String {
        join_lines(&self.source, self.source_line_ending)
    }

    /// Target file content to write.
    pub fn target_content(&self) -> String {
        join_lines(&self.target, self.target_line_ending)
    }
}

/// Credentials waiting to be written, keyed by registry URL in first-seen order.
#[derive(Debug, Default)]
struct PendingCredentials {
    entries: Vec<Entry>,
}

impl PendingCredentials {
    /// Insert or replace the credential for the entry's registry, keeping the
    /// position of the first insertion.
    fn upsert(&mut self, entry: Entry) {
        let url = entry.registry_url();
        match self.entries.iter_mut().find(|e| e.registry_url() == url) {
            Some(slot) => *slot = entry,
            None => self.entries.push(entry),
        }
    }

    /// Drop the credential for `url`, returning whether one was pending.
    fn remove(&mut self, url: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.registry_url() != Some(url));
        self.entries.len() != before
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn into_entries(self) -> Vec<Entry> {
        self.entries
    }
}

/// Reconcile a source file with a separate target file.
///
/// `target` is `None` when the target file does not exist yet; it is then
/// treated as empty and receives only the new credentials.
pub fn reconcile(source: &str, target: Option<&str>, token: &str, patterns: &Patterns) -> Reconciled {
    let source_line_ending = line_ending(source);
    let target_line_ending = match target {
        Some(text) if text.contains('\n') => line_ending(text),
        _ => source_line_ending,
    };

    let upgraded = upgrade_legacy_pairs(source, token, patterns);
    Reconciled {
        source_line_ending,
        target_line_ending,
        ..merge(&upgraded, target, token, patterns)
    }
}

/// Reconcile a file that is both the source and the target.
///
/// Only [`Reconciled::target`] should be written back: it holds every line of
/// the file plus the credentials that were missing.
pub fn reconcile_shared(content: &str, token: &str, patterns: &Patterns) -> Reconciled {
    let eol = line_ending(content);
    let upgraded = upgrade_legacy_pairs(content, token, patterns);
    Reconciled {
        source_line_ending: eol,
        target_line_ending: eol,
        ..merge(&upgraded, Some(&upgraded), token, patterns)
    }
}

fn merge(source: &str, target: Option<&str>, token: &str, patterns: &Patterns) -> Reconciled {
    let mut pending = PendingCredentials::default();
    let mut new_source = Vec::new();

    for entry in parse_lines(source, patterns) {
        match &entry {
            Entry::Registry { url, .. } => {
                pending.upsert(Entry::auth_token(url.as_str(), token));
                new_source.push(entry);
            }
            Entry::AuthToken { url, .. } => {
                debug!(
                    registry = %url,
                    "found an auth token in the project config, moving it to the credential config"
                );
                pending.upsert(Entry::auth_token(url.as_str(), token));
            }
            Entry::Password { url, .. } => {
                debug!(
                    registry = %url,
                    "found a password in the project config, moving it to the credential config"
                );
                pending.upsert(entry);
            }
            Entry::Plain(_) => new_source.push(entry),
        }
    }

    let mut new_target = Vec::new();
    let mut refreshed = 0;
    let mut kept_passwords = 0;

    for mut entry in target.map(|t| parse_lines(t, patterns)).unwrap_or_default() {
        if matches!(&entry, Entry::Plain(text) if text.is_empty()) {
            continue;
        }

        if let Some(url) = entry.registry_url().filter(|_| entry.is_credential()) {
            if pending.remove(url) && matches!(entry, Entry::Password { .. }) {
                kept_passwords += 1;
            }
        }
        if let Entry::AuthToken { url, token: current } = &mut entry {
            debug!(registry = %url, "refreshing auth token");
            *current = token.to_string();
            refreshed += 1;
        }
        new_target.push(entry);
    }

    let added = pending.len();
    new_target.extend(pending.into_entries());

    Reconciled {
        source: new_source,
        target: new_target,
        added,
        refreshed,
        kept_passwords,
        source_line_ending: "\n",
        target_line_ending: "\n",
    }
}

/// What [`update_config_files`] changed on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// File that received the credentials.
    pub target: PathBuf,
    /// File that declared the registries.
    pub source: PathBuf,
    /// Number of credentials appended to the target.
    pub added: usize,
    /// Number of existing tokens refreshed in the target.
    pub refreshed: usize,
    /// Number of registries already covered by a `_password` in the target.
    pub kept_passwords: usize,
    /// Whether the source file was rewritten (credentials moved out of it).
    pub source_rewritten: bool,
}

impl UpdateSummary {
    /// Whether no registry ended up with a credential from this run, neither
    /// a new or refreshed token nor a kept password.
    pub fn is_noop(&self) -> bool {
        self.added == 0 && self.refreshed == 0 && self.kept_passwords == 0
    }
}

/// Read, reconcile and rewrite the source and target config files.
///
/// The target is written before the source so that credentials are persisted
/// even if rewriting the source fails. When both paths name the same file it
/// is written once, with the merged content.
///
/// Returns `Err(Error::InvalidToken)` before touching any file if `token`
/// is empty or contains whitespace or control characters, and
/// `Err(Error::ConfigNotFound)` if the source cannot be read. A missing
/// target is created.
pub fn update_config_files(
    source: &Path,
    target: &Path,
    token: &str,
    mode: DomainMode,
) -> Result<UpdateSummary> {
    check_token(token)?;

    let source_content = fs::read_to_string(source).map_err(|e| Error::ConfigNotFound {
        path: source.to_path_buf(),
        source: e,
    })?;
    let patterns = Patterns::for_mode(mode);

    if same_file(source, target) {
        let reconciled = reconcile_shared(&source_content, token, patterns);
        write_atomic(target, &reconciled.target_content())?;
        info!(
            path = %target.display(),
            added = reconciled.added,
            refreshed = reconciled.refreshed,
            "updated shared config file"
        );
        return Ok(UpdateSummary {
            target: target.to_path_buf(),
            source: source.to_path_buf(),
            added: reconciled.added,
            refreshed: reconciled.refreshed,
            kept_passwords: reconciled.kept_passwords,
            source_rewritten: false,
        });
    }

    let target_content = match fs::read_to_string(target) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %target.display(), "credential config does not exist, creating it");
            None
        }
        Err(e) => {
            return Err(Error::ReadFile {
                path: target.to_path_buf(),
                source: e,
            })
        }
    };

    let reconciled = reconcile(&source_content, target_content.as_deref(), token, patterns);

    write_atomic(target, &reconciled.target_content())?;
    info!(
        path = %target.display(),
        added = reconciled.added,
        refreshed = reconciled.refreshed,
        "updated credential config"
    );

    let new_source = reconciled.source_content();
    let source_rewritten = new_source != source_content;
    if source_rewritten {
        write_atomic(source, &new_source)?;
        info!(path = %source.display(), "moved credentials out of project config");
    }

    Ok(UpdateSummary {
        target: target.to_path_buf(),
        source: source.to_path_buf(),
        added: reconciled.added,
        refreshed: reconciled.refreshed,
        kept_passwords: reconciled.kept_passwords,
        source_rewritten,
    })
}
