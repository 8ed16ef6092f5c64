//! Line classification for .npmrc files.
//!
//! This module turns raw `.npmrc` lines into [`Entry`] values. Only three line
//! shapes are recognised (registry declarations, `_authToken` and `_password`
//! credentials); everything else is kept as [`Entry::Plain`].
//!
//! Note: We match each line with anchored regular expressions instead of a
//! general INI parser because the file is rewritten afterwards, and lines we
//! do not understand must survive byte-for-byte.

use crate::entry::Entry;
use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::debug;

/// Scope names: `@` followed by npm's allowed scope characters.
const SCOPE: &str = r"@[a-zA-Z0-9\-*~][a-zA-Z0-9\-*._~]*";

/// Artifact Registry hosts: `<location>-npm.pkg.dev` or bare `npm.pkg.dev`.
const ARTIFACT_REGISTRY_URL: &str = r"//(?:[a-zA-Z0-9-]+-)?npm\.pkg\.dev/.*/";

/// Any host. The trailing slash is still required so that generated
/// credential keys parse back as credentials.
const ANY_URL: &str = r"//.*/";

static ARTIFACT_REGISTRY: LazyLock<Patterns> =
    LazyLock::new(|| Patterns::with_url_pattern(ARTIFACT_REGISTRY_URL));

static ALL_DOMAINS: LazyLock<Patterns> = LazyLock::new(|| Patterns::with_url_pattern(ANY_URL));

/// Which registry hosts are eligible for credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DomainMode {
    /// Only Artifact Registry hosts (`*-npm.pkg.dev`, `npm.pkg.dev`).
    #[default]
    ArtifactRegistry,
    /// Any registry host.
    AllDomains,
}

impl DomainMode {
    /// Map the `--allow-all-domains` flag to a mode.
    pub fn from_allow_all(allow_all_domains: bool) -> Self {
        if allow_all_domains {
            DomainMode::AllDomains
        } else {
            DomainMode::ArtifactRegistry
        }
    }
}

/// The set of line patterns active for one reconciliation run.
#[derive(Debug)]
pub struct Patterns {
    registry: Regex,
    auth_token: Regex,
    password: Regex,
    legacy_pair: Regex,
}

impl Patterns {
    /// Get the shared pattern set for a domain mode.
    pub fn for_mode(mode: DomainMode) -> &'static Patterns {
        match mode {
            DomainMode::ArtifactRegistry => &ARTIFACT_REGISTRY,
            DomainMode::AllDomains => &ALL_DOMAINS,
        }
    }

    fn with_url_pattern(url: &str) -> Self {
        let build = |pattern: String| {
            Regex::new(&pattern).expect("npmrc line patterns are valid regular expressions")
        };

        Patterns {
            registry: build(format!(
                r"^(?:(?P<scope>{SCOPE}):)?registry=https:(?P<url>{url})$"
            )),
            auth_token: build(format!(r"^(?P<url>{url}):_authToken=(?P<token>.*)$")),
            password: build(format!(r"^(?P<url>{url}):_password=(?P<password>.*)$")),
            legacy_pair: build(format!(
                r"(?mR)^[ \t]*(?P<url>{url}):_password=.*\r?\n[ \t]*(?P<user_url>{url}):username=oauth2accesstoken[ \t]*$"
            )),
        }
    }
}

/// Classify a single line.
///
/// Patterns are tried in order registry, `_authToken`, `_password` against the
/// line with surrounding whitespace trimmed. Lines matching none of them are
/// returned as [`Entry::Plain`] holding the original, untrimmed text.
pub fn parse_line(line: &str, patterns: &Patterns) -> Entry {
    let trimmed = line.trim();

    if let Some(caps) = patterns.registry.captures(trimmed) {
        return Entry::Registry {
            scope: caps.name("scope").map(|m| m.as_str().to_string()),
            url: caps["url"].to_string(),
        };
    }

    if let Some(caps) = patterns.auth_token.captures(trimmed) {
        return Entry::auth_token(&caps["url"], &caps["token"]);
    }

    if let Some(caps) = patterns.password.captures(trimmed) {
        return Entry::password(&caps["url"], &caps["password"]);
    }

    Entry::Plain(line.to_string())
}

/// The line terminator of `content`: `"\r\n"` if its first line break is
/// CRLF, `"\n"` otherwise.
pub fn line_ending(content: &str) -> &'static str {
    match content.find('\n') {
        Some(end) if content[..end].ends_with('\r') => "\r\n",
        _ => "\n",
    }
}

/// Parse file content into entries, one per line.
///
/// In a CRLF file the `\r` is stripped from every line. A trailing line
/// break yields a final empty [`Entry::Plain`], so joining the result with
/// [`line_ending`] of the input reproduces it.
pub fn parse_lines(content: &str, patterns: &Patterns) -> Vec<Entry> {
    let crlf = line_ending(content) == "\r\n";
    content
        .split('\n')
        .map(|line| match line.strip_suffix('\r') {
            Some(stripped) if crlf => parse_line(stripped, patterns),
            _ => parse_line(line, patterns),
        })
        .collect()
}

/// Rewrite legacy basic-auth pairs into bearer token lines.
///
/// Older versions of `gcloud artifacts print-settings npm` emitted
///
/// ```text
/// //us-west1-npm.pkg.dev/proj/repo/:_password="..."
/// //us-west1-npm.pkg.dev/proj/repo/:username=oauth2accesstoken
/// ```
///
/// Each such pair (both lines for the same registry URL) is replaced by a
/// single `//us-west1-npm.pkg.dev/proj/repo/:_authToken=<token>` line. Pairs
/// whose URLs differ are left as they are.
pub fn upgrade_legacy_pairs<'a>(content: &'a str, token: &str, patterns: &Patterns) -> Cow<'a, str> {
    patterns
        .legacy_pair
        .replace_all(content, |caps: &Captures| {
            let url = &caps["url"];
            if url != &caps["user_url"] {
                return caps[0].to_string();
            }
            debug!(registry = url, "replacing legacy password credentials with an auth token");
            format!("{}:_authToken={}", url, token)
        })
}
