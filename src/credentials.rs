//! Access token acquisition for Google Artifact Registry.
//!
//! A [`TokenSource`] produces a short-lived OAuth2 access token. The default
//! [`TokenChain`] tries, in order:
//!
//! 1. Application Default Credentials (`GOOGLE_APPLICATION_CREDENTIALS`, or the
//!    file written by `gcloud auth application-default login`)
//! 2. The GCE metadata server
//! 3. The `gcloud` CLI (`gcloud auth print-access-token`)

use crate::error::{Error, Result};
use reqwest::blocking::{Client, Response};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

/// OAuth2 scope required to read from Artifact Registry.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Environment variable pointing at a credentials JSON file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Environment variable overriding the metadata server host.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// Something that can produce an access token.
pub trait TokenSource {
    /// Short human-readable name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Fetch a fresh access token.
    fn fetch_token(&self) -> Result<String>;
}

/// A token supplied directly by the caller.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        StaticToken(token.into())
    }
}

impl fmt::Debug for StaticToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StaticToken").field(&"[REDACTED]").finish()
    }
}

impl TokenSource for StaticToken {
    fn name(&self) -> &'static str {
        "static token"
    }

    fn fetch_token(&self) -> Result<String> {
        non_empty(self.name(), &self.0)
    }
}

/// Only the `type` field, to pick how to read the rest of the file.
#[derive(Deserialize)]
struct CredentialsKind {
    #[serde(rename = "type")]
    kind: String,
}

/// An `authorized_user` credentials file.
#[derive(Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token_uri: Option<String>,
}

/// A `service_account` key file.
#[derive(Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    private_key_id: Option<String>,
    token_uri: Option<String>,
}

/// Claims of the signed assertion exchanged for a service account token.
#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    scope: String,
}

/// Application Default Credentials from a JSON file.
///
/// The file is taken from, in order: an explicit path, the
/// `GOOGLE_APPLICATION_CREDENTIALS` environment variable, or gcloud's
/// well-known location. `authorized_user` files are exchanged with a
/// refresh-token grant and `service_account` keys with a signed RS256
/// assertion (JWT bearer grant). Every token obtained is then checked at the
/// tokeninfo endpoint for [`CLOUD_PLATFORM_SCOPE`].
#[derive(Debug, Clone, Default)]
pub struct ApplicationDefault {
    path: Option<PathBuf>,
    tokeninfo_url: Option<String>,
}

impl ApplicationDefault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific credentials file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        ApplicationDefault {
            path: Some(path.into()),
            tokeninfo_url: None,
        }
    }

    /// Check token scopes at `url` instead of Google's tokeninfo endpoint.
    pub fn with_tokeninfo_url(mut self, url: impl Into<String>) -> Self {
        self.tokeninfo_url = Some(url.into());
        self
    }

    /// The credentials file this source would read, if one can be located.
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.path
            .clone()
            .or_else(|| std::env::var_os(CREDENTIALS_ENV).map(PathBuf::from))
            .or_else(well_known_credentials_path)
    }

    fn refresh(&self, http: &Client, user: AuthorizedUser) -> Result<String> {
        let token_uri = user.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let url = parse_url(token_uri)?;

        debug!(token_uri = %url, "exchanging refresh token");
        self.request_token(
            http,
            &url,
            &[
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ],
        )
    }

    fn exchange_assertion(&self, http: &Client, key: ServiceAccountKey) -> Result<String> {
        let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
        let url = parse_url(token_uri)?;

        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &key.client_email,
            scope: CLOUD_PLATFORM_SCOPE,
            aud: token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs(),
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = key.private_key_id.clone();

        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())?;
        let assertion = jsonwebtoken::encode(&header, &claims, &signing_key)?;

        debug!(
            token_uri = %url,
            account = %key.client_email,
            "exchanging service account assertion"
        );
        self.request_token(
            http,
            &url,
            &[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())],
        )
    }

    fn request_token(&self, http: &Client, url: &Url, form: &[(&str, &str)]) -> Result<String> {
        let response = http.post(url.clone()).form(form).send()?;
        let body: TokenResponse = check_status(response, url)?.json()?;
        non_empty(self.name(), &body.access_token)
    }

    /// Ask the tokeninfo endpoint which scopes `token` carries.
    fn check_scopes(&self, http: &Client, token: &str) -> Result<()> {
        let url = parse_url(self.tokeninfo_url.as_deref().unwrap_or(DEFAULT_TOKENINFO_URL))?;
        let response = http
            .post(url.clone())
            .form(&[("access_token", token)])
            .send()?;
        let info: TokenInfo = check_status(response, &url)?.json()?;
        ensure_cloud_platform(&info.scope)
    }
}

impl TokenSource for ApplicationDefault {
    fn name(&self) -> &'static str {
        "application default credentials"
    }

    fn fetch_token(&self) -> Result<String> {
        let path = self.credentials_path().ok_or(Error::HomeDirNotFound)?;
        let content = std::fs::read_to_string(&path).map_err(|e| Error::ReadCredentials {
            path: path.clone(),
            source: e,
        })?;

        let CredentialsKind { kind } = serde_json::from_str(&content)?;
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let token = match kind.as_str() {
            "authorized_user" => self.refresh(&http, serde_json::from_str(&content)?)?,
            "service_account" => self.exchange_assertion(&http, serde_json::from_str(&content)?)?,
            _ => return Err(Error::UnsupportedCredentialType(kind)),
        };

        self.check_scopes(&http, &token)?;
        Ok(token)
    }
}

/// Location gcloud writes Application Default Credentials to.
///
/// `CLOUDSDK_CONFIG` overrides the gcloud config directory.
fn well_known_credentials_path() -> Option<PathBuf> {
    let config_dir = match std::env::var_os("CLOUDSDK_CONFIG") {
        Some(dir) => PathBuf::from(dir),
        None => gcloud_config_dir()?,
    };
    Some(config_dir.join("application_default_credentials.json"))
}

#[cfg(windows)]
fn gcloud_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("gcloud"))
}

#[cfg(not(windows))]
fn gcloud_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".config").join("gcloud"))
}

/// The GCE / Cloud Run / GKE metadata server.
///
/// Before handing out the default service account's token, the account's
/// scopes are checked for [`CLOUD_PLATFORM_SCOPE`].
#[derive(Debug, Clone)]
pub struct MetadataServer {
    host: String,
}

impl MetadataServer {
    /// Use `GCE_METADATA_HOST` or `metadata.google.internal`.
    pub fn new() -> Self {
        let host = std::env::var(METADATA_HOST_ENV)
            .unwrap_or_else(|_| DEFAULT_METADATA_HOST.to_string());
        Self::with_host(host)
    }

    /// Use a specific `host[:port]`.
    pub fn with_host(host: impl Into<String>) -> Self {
        MetadataServer { host: host.into() }
    }

    fn get(&self, http: &Client, path: &str) -> Result<Response> {
        let url = parse_url(&format!(
            "http://{}/computeMetadata/v1/instance/service-accounts/default/{}",
            self.host, path
        ))?;
        let response = http
            .get(url.clone())
            .header("Metadata-Flavor", "Google")
            .send()?;
        check_status(response, &url)
    }
}

impl Default for MetadataServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenSource for MetadataServer {
    fn name(&self) -> &'static str {
        "metadata server"
    }

    fn fetch_token(&self) -> Result<String> {
        let http = Client::builder().timeout(METADATA_TIMEOUT).build()?;

        let scopes = self.get(&http, "scopes")?.text()?;
        ensure_cloud_platform(&scopes)?;

        let body: TokenResponse = self.get(&http, "token")?.json()?;
        non_empty(self.name(), &body.access_token)
    }
}

/// The local `gcloud` CLI.
#[derive(Debug, Clone, Default)]
pub struct GcloudCli {
    program: Option<PathBuf>,
}

impl GcloudCli {
    /// Locate `gcloud` on `$PATH` when fetching.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        GcloudCli {
            program: Some(program.into()),
        }
    }
}

impl TokenSource for GcloudCli {
    fn name(&self) -> &'static str {
        "gcloud"
    }

    fn fetch_token(&self) -> Result<String> {
        let program = match &self.program {
            Some(program) => program.clone(),
            None => which::which("gcloud").map_err(|_| Error::BinaryNotFound("gcloud".into()))?,
        };

        debug!(program = %program.display(), "running gcloud auth print-access-token");
        let output = Command::new(&program)
            .args(["auth", "print-access-token"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(Error::CommandFailed {
                program: program.display().to_string(),
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        non_empty(self.name(), &String::from_utf8_lossy(&output.stdout))
    }
}

/// Tries each source in turn and returns the first token.
pub struct TokenChain {
    sources: Vec<Box<dyn TokenSource>>,
}

impl TokenChain {
    pub fn new(sources: Vec<Box<dyn TokenSource>>) -> Self {
        TokenChain { sources }
    }

    /// Application Default Credentials, then the metadata server, then gcloud.
    pub fn google_default() -> Self {
        Self::new(vec![
            Box::new(ApplicationDefault::new()),
            Box::new(MetadataServer::new()),
            Box::new(GcloudCli::new()),
        ])
    }
}

impl fmt::Debug for TokenChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sources.iter().map(|s| s.name()))
            .finish()
    }
}

impl TokenSource for TokenChain {
    fn name(&self) -> &'static str {
        "credential chain"
    }

    /// Insufficient scopes end the search: the account exists but cannot be
    /// used for Artifact Registry, and later sources would not fix that.
    fn fetch_token(&self) -> Result<String> {
        let mut failures = Vec::new();

        for source in &self.sources {
            match source.fetch_token() {
                Ok(token) => {
                    debug!(source = source.name(), "obtained access token");
                    return Ok(token);
                }
                Err(e @ Error::InsufficientScopes { .. }) => return Err(e),
                Err(e) => {
                    debug!(source = source.name(), error = %e, "token source failed");
                    failures.push(format!("{}: {}", source.name(), e));
                }
            }
        }

        Err(Error::CredentialsNotFound {
            attempted: failures.join("; "),
        })
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        message: e.to_string(),
    })
}

fn check_status(response: Response, url: &Url) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(Error::TokenEndpoint {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

fn non_empty(source: &'static str, token: &str) -> Result<String> {
    let token = token.trim();
    if token.is_empty() {
        return Err(Error::EmptyToken(source));
    }
    check_token(token)?;
    Ok(token.to_string())
}

/// Reject tokens that would not survive as the value of a single `.npmrc` line.
pub(crate) fn check_token(token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(Error::InvalidToken("token is empty"));
    }
    if token.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidToken(
            "token contains whitespace or control characters",
        ));
    }
    Ok(())
}

/// Scopes may be separated by spaces (tokeninfo) or newlines (metadata server).
fn ensure_cloud_platform(scopes: &str) -> Result<()> {
    if scopes.split_whitespace().any(|scope| scope == CLOUD_PLATFORM_SCOPE) {
        return Ok(());
    }
    Err(Error::InsufficientScopes {
        scopes: scopes.split_whitespace().collect::<Vec<_>>().join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing(fn() -> Error);

    impl TokenSource for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn fetch_token(&self) -> Result<String> {
            Err((self.0)())
        }
    }

    #[test]
    fn test_static_token_trims() {
        assert_eq!(StaticToken::new(" abcd\n").fetch_token().unwrap(), "abcd");
    }

    #[test]
    fn test_static_token_empty() {
        assert!(matches!(
            StaticToken::new("  ").fetch_token(),
            Err(Error::EmptyToken("static token"))
        ));
    }

    #[test]
    fn test_static_token_rejects_embedded_newline() {
        match StaticToken::new("abcd\nregistry=https://evil-npm.pkg.dev/x/y/").fetch_token() {
            Err(Error::InvalidToken(_)) => {}
            other => panic!("Expected InvalidToken, got: {:?}", other),
        }
    }

    #[test]
    fn test_check_token() {
        assert!(check_token("ya29.a0AfH6SM-_x").is_ok());
        for token in ["", "ab cd", "ab\tcd", "ab\rcd", "ab\u{7f}cd"] {
            assert!(
                matches!(check_token(token), Err(Error::InvalidToken(_))),
                "token {:?}",
                token
            );
        }
    }

    #[test]
    fn test_ensure_cloud_platform() {
        assert!(ensure_cloud_platform(
            "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/cloud-platform"
        )
        .is_ok());
        assert!(ensure_cloud_platform("openid\nhttps://www.googleapis.com/auth/cloud-platform\n").is_ok());

        match ensure_cloud_platform("openid https://www.googleapis.com/auth/cloud-platform.read-only") {
            Err(Error::InsufficientScopes { scopes }) => assert_eq!(
                scopes,
                "openid, https://www.googleapis.com/auth/cloud-platform.read-only"
            ),
            other => panic!("Expected InsufficientScopes, got: {:?}", other),
        }
    }

    #[test]
    fn test_static_token_debug_redacts() {
        let debug_output = format!("{:?}", StaticToken::new("super-secret-token"));
        assert!(!debug_output.contains("super-secret-token"));
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[test]
    fn test_chain_returns_first_success() {
        let chain = TokenChain::new(vec![
            Box::new(Failing(|| Error::BinaryNotFound("gcloud".into()))),
            Box::new(StaticToken::new("second")),
            Box::new(StaticToken::new("third")),
        ]);
        assert_eq!(chain.fetch_token().unwrap(), "second");
    }

    #[test]
    fn test_chain_reports_all_failures() {
        let chain = TokenChain::new(vec![
            Box::new(Failing(|| Error::BinaryNotFound("gcloud".into()))),
            Box::new(StaticToken::new("")),
        ]);

        match chain.fetch_token() {
            Err(Error::CredentialsNotFound { attempted }) => {
                assert!(attempted.contains("failing: gcloud binary not found"));
                assert!(attempted.contains("static token: static token returned an empty token"));
            }
            other => panic!("Expected CredentialsNotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_chain_stops_on_insufficient_scopes() {
        let chain = TokenChain::new(vec![
            Box::new(Failing(|| Error::InsufficientScopes {
                scopes: "email".into(),
            })),
            Box::new(StaticToken::new("unused")),
        ]);
        assert!(matches!(
            chain.fetch_token(),
            Err(Error::InsufficientScopes { .. })
        ));
    }

    #[test]
    fn test_chain_debug_lists_sources() {
        let chain = TokenChain::google_default();
        assert_eq!(
            format!("{:?}", chain),
            r#"["application default credentials", "metadata server", "gcloud"]"#
        );
    }

    #[test]
    fn test_application_default_explicit_path_wins() {
        let source = ApplicationDefault::with_path("/tmp/adc.json");
        assert_eq!(source.credentials_path(), Some(PathBuf::from("/tmp/adc.json")));
    }

    #[test]
    fn test_application_default_missing_file() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("missing.json");

        match ApplicationDefault::with_path(&path).fetch_token() {
            Err(Error::ReadCredentials { path: p, .. }) => assert_eq!(p, path),
            other => panic!("Expected ReadCredentials, got: {:?}", other),
        }
    }

    #[test]
    fn test_application_default_external_account_unsupported() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("adc.json");
        std::fs::write(
            &path,
            r#"{"type": "external_account", "audience": "//iam.googleapis.com/projects/1"}"#,
        )
        .unwrap();

        match ApplicationDefault::with_path(&path).fetch_token() {
            Err(Error::UnsupportedCredentialType(kind)) => assert_eq!(kind, "external_account"),
            other => panic!("Expected UnsupportedCredentialType, got: {:?}", other),
        }
    }

    #[test]
    fn test_service_account_bad_private_key() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("key.json");
        std::fs::write(
            &path,
            r#"{"type": "service_account", "client_email": "sa@p.iam.gserviceaccount.com",
                "private_key": "not a pem", "token_uri": "http://127.0.0.1:9/token"}"#,
        )
        .unwrap();

        assert!(matches!(
            ApplicationDefault::with_path(&path).fetch_token(),
            Err(Error::Signing(_))
        ));
    }

    #[test]
    fn test_application_default_malformed_json() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("adc.json");
        std::fs::write(&path, "not json").unwrap();

        assert!(matches!(
            ApplicationDefault::with_path(&path).fetch_token(),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_application_default_invalid_token_uri() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("adc.json");
        std::fs::write(
            &path,
            r#"{"type": "authorized_user", "client_id": "id", "client_secret": "secret",
                "refresh_token": "refresh", "token_uri": "not a url"}"#,
        )
        .unwrap();

        match ApplicationDefault::with_path(&path).fetch_token() {
            Err(Error::InvalidUrl { url, .. }) => assert_eq!(url, "not a url"),
            other => panic!("Expected InvalidUrl, got: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_gcloud_cli_reads_stdout() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("gcloud");
        std::fs::write(&script, "#!/bin/sh\necho ya29.from-gcloud\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(
            GcloudCli::with_program(&script).fetch_token().unwrap(),
            "ya29.from-gcloud"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_gcloud_cli_failure() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().unwrap();
        let script = temp.path().join("gcloud");
        std::fs::write(&script, "#!/bin/sh\necho 'not logged in' >&2\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        match GcloudCli::with_program(&script).fetch_token() {
            Err(Error::CommandFailed {
                exit_code, stderr, ..
            }) => {
                assert_eq!(exit_code, 2);
                assert_eq!(stderr, "not logged in");
            }
            other => panic!("Expected CommandFailed, got: {:?}", other),
        }
    }
}
