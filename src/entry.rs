//! Typed representation of a single `.npmrc` line.
//!
//! Only the line shapes that matter for registry authentication are modelled;
//! everything else is carried through untouched as [`Entry::Plain`].

use std::fmt;

/// One line of an `.npmrc` file.
///
/// Registry URLs are stored scheme-less (`//host/path/`), the same
/// "nerf-darted" form npm uses to key credentials.
///
/// # Security Notes
///
/// The `Debug` implementation redacts tokens and passwords so entries can be
/// logged without leaking credentials. `Display` produces the real line.
#[derive(Clone, PartialEq, Eq)]
pub enum Entry {
    /// Any line that is not one of the recognised shapes, kept verbatim.
    Plain(String),

    /// `[@scope:]registry=https://host/path/`
    Registry {
        /// Scope including the leading `@`, or `None` for the default registry.
        scope: Option<String>,
        url: String,
    },

    /// `//host/path/:_authToken=token`
    AuthToken { url: String, token: String },

    /// `//host/path/:_password=base64`
    Password { url: String, password: String },
}

impl Entry {
    /// Create a default-registry or scoped registry entry.
    pub fn registry(scope: Option<&str>, url: impl Into<String>) -> Self {
        Entry::Registry {
            scope: scope.map(str::to_string),
            url: url.into(),
        }
    }

    /// Create a bearer token entry.
    pub fn auth_token(url: impl Into<String>, token: impl Into<String>) -> Self {
        Entry::AuthToken {
            url: url.into(),
            token: token.into(),
        }
    }

    /// Create a legacy password entry.
    pub fn password(url: impl Into<String>, password: impl Into<String>) -> Self {
        Entry::Password {
            url: url.into(),
            password: password.into(),
        }
    }

    /// The registry URL this entry refers to, if any.
    pub fn registry_url(&self) -> Option<&str> {
        match self {
            Entry::Plain(_) => None,
            Entry::Registry { url, .. }
            | Entry::AuthToken { url, .. }
            | Entry::Password { url, .. } => Some(url),
        }
    }

    /// Whether this entry holds a credential (`_authToken` or `_password`).
    pub fn is_credential(&self) -> bool {
        matches!(self, Entry::AuthToken { .. } | Entry::Password { .. })
    }

    /// Render the entry as an `.npmrc` line.
    pub fn serialize(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Plain(text) => f.write_str(text),
            Entry::Registry {
                scope: Some(scope),
                url,
            } => write!(f, "{}:registry=https:{}", scope, url),
            Entry::Registry { scope: None, url } => write!(f, "registry=https:{}", url),
            Entry::AuthToken { url, token } => write!(f, "{}:_authToken={}", url, token),
            Entry::Password { url, password } => write!(f, "{}:_password={}", url, password),
        }
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Plain(text) => f.debug_tuple("Plain").field(text).finish(),
            Entry::Registry { scope, url } => f
                .debug_struct("Registry")
                .field("scope", scope)
                .field("url", url)
                .finish(),
            Entry::AuthToken { url, .. } => f
                .debug_struct("AuthToken")
                .field("url", url)
                .field("token", &"[REDACTED]")
                .finish(),
            Entry::Password { url, .. } => f
                .debug_struct("Password")
                .field("url", url)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Join entries into file content, one line per entry, separated by
/// `line_ending` (`"\n"` or `"\r\n"`).
///
/// No trailing line break is added; a trailing empty [`Entry::Plain`] produces one.
pub fn join_lines(entries: &[Entry], line_ending: &str) -> String {
    entries
        .iter()
        .map(Entry::to_string)
        .collect::<Vec<_>>()
        .join(line_ending)
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "//us-west1-npm.pkg.dev/myproj/myrepo/";

    #[test]
    fn test_serialize_plain() {
        let entry = Entry::Plain("myregistry.someProperty=someValue".to_string());
        assert_eq!(entry.serialize(), "myregistry.someProperty=someValue");
    }

    #[test]
    fn test_serialize_registry() {
        assert_eq!(
            Entry::registry(None, URL).serialize(),
            "registry=https://us-west1-npm.pkg.dev/myproj/myrepo/"
        );
        assert_eq!(
            Entry::registry(Some("@myscope"), URL).serialize(),
            "@myscope:registry=https://us-west1-npm.pkg.dev/myproj/myrepo/"
        );
    }

    #[test]
    fn test_serialize_credentials() {
        assert_eq!(
            Entry::auth_token(URL, "myToken").serialize(),
            "//us-west1-npm.pkg.dev/myproj/myrepo/:_authToken=myToken"
        );
        assert_eq!(
            Entry::password(URL, "myPassword").serialize(),
            "//us-west1-npm.pkg.dev/myproj/myrepo/:_password=myPassword"
        );
    }

    #[test]
    fn test_registry_url() {
        assert_eq!(Entry::registry(None, URL).registry_url(), Some(URL));
        assert_eq!(Entry::auth_token(URL, "t").registry_url(), Some(URL));
        assert_eq!(Entry::Plain("x".into()).registry_url(), None);
        assert!(Entry::password(URL, "p").is_credential());
        assert!(!Entry::registry(None, URL).is_credential());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let token = format!("{:?}", Entry::auth_token(URL, "super-secret-token"));
        assert!(!token.contains("super-secret-token"));
        assert!(token.contains("[REDACTED]"));
        assert!(token.contains(URL));

        let password = format!("{:?}", Entry::password(URL, "c2VjcmV0"));
        assert!(!password.contains("c2VjcmV0"));
        assert!(password.contains("[REDACTED]"));
    }

    #[test]
    fn test_join_lines() {
        let entries = vec![
            Entry::registry(None, URL),
            Entry::Plain(String::new()),
        ];
        assert_eq!(
            join_lines(&entries, "\n"),
            "registry=https://us-west1-npm.pkg.dev/myproj/myrepo/\n"
        );
        assert_eq!(
            join_lines(&entries, "\r\n"),
            "registry=https://us-west1-npm.pkg.dev/myproj/myrepo/\r\n"
        );
        assert_eq!(join_lines(&[], "\n"), "");
    }
}
