//! Infisical secret store provider.
//!
//! Logs in with a machine identity, then lists the secrets of one project
//! environment and folder on every fetch. The access token is cached until
//! shortly before it expires; a token the server rejects is renewed once per
//! fetch.

use async_trait::async_trait;
use dynconf_common::Snapshot;
use dynconf_config::{Provider, ProviderError};
use parking_lot::Mutex;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument};
use url::Url;

/// Infisical cloud.
pub const DEFAULT_SITE_URL: &str = "https://app.infisical.com";
/// Folder listed when none is configured.
pub const DEFAULT_SECRET_PATH: &str = "/";
/// Where Kubernetes mounts the service account token.
pub const DEFAULT_KUBERNETES_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Fallback for an empty universal-auth client id.
pub const UNIVERSAL_CLIENT_ID_ENV: &str = "INFISICAL_UNIVERSAL_AUTH_CLIENT_ID";
/// Fallback for an empty universal-auth client secret.
pub const UNIVERSAL_CLIENT_SECRET_ENV: &str = "INFISICAL_UNIVERSAL_AUTH_CLIENT_SECRET";
/// Fallback for an empty Kubernetes identity id.
pub const KUBERNETES_IDENTITY_ID_ENV: &str = "INFISICAL_KUBERNETES_IDENTITY_ID";
/// Fallback for an empty Kubernetes token path.
pub const KUBERNETES_TOKEN_PATH_ENV: &str = "INFISICAL_KUBERNETES_SERVICE_ACCOUNT_TOKEN_PATH";

const UNIVERSAL_LOGIN_PATH: &str = "api/v1/auth/universal-auth/login";
const KUBERNETES_LOGIN_PATH: &str = "api/v1/auth/kubernetes-auth/login";
const SECRETS_PATH: &str = "api/v3/secrets/raw";

// Tokens are renewed this long before the server would expire them.
const TOKEN_RENEW_MARGIN: Duration = Duration::from_secs(30);

/// Machine identity used to log in.
///
/// Empty fields are read from the matching `INFISICAL_*` environment
/// variable at login time.
#[derive(Clone, PartialEq, Eq)]
pub enum InfisicalAuth {
    /// Client id and secret of a universal-auth identity.
    Universal {
        /// Client id.
        client_id: String,
        /// Client secret.
        client_secret: String,
    },
    /// Kubernetes service account login.
    Kubernetes {
        /// Identity id.
        identity_id: String,
        /// Path of the service account token.
        token_path: Option<PathBuf>,
    },
}

impl InfisicalAuth {
    /// Universal auth with the given credentials.
    pub fn universal(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::Universal {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Kubernetes auth for `identity_id`, reading the mounted token.
    pub fn kubernetes(identity_id: impl Into<String>, token_path: Option<PathBuf>) -> Self {
        Self::Kubernetes {
            identity_id: identity_id.into(),
            token_path,
        }
    }

    /// Fills empty fields from the environment.
    fn resolve(&self) -> Result<Self, ProviderError> {
        match self {
            Self::Universal {
                client_id,
                client_secret,
            } => Ok(Self::Universal {
                client_id: or_env(client_id, UNIVERSAL_CLIENT_ID_ENV)?,
                client_secret: or_env(client_secret, UNIVERSAL_CLIENT_SECRET_ENV)?,
            }),
            Self::Kubernetes {
                identity_id,
                token_path,
            } => Ok(Self::Kubernetes {
                identity_id: or_env(identity_id, KUBERNETES_IDENTITY_ID_ENV)?,
                token_path: Some(token_path.clone().unwrap_or_else(|| {
                    env_value(KUBERNETES_TOKEN_PATH_ENV)
                        .unwrap_or_else(|| DEFAULT_KUBERNETES_TOKEN_PATH.to_string())
                        .into()
                })),
            }),
        }
    }
}

impl Default for InfisicalAuth {
    fn default() -> Self {
        Self::universal("", "")
    }
}

impl fmt::Debug for InfisicalAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Universal { client_id, .. } => f
                .debug_struct("Universal")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
            Self::Kubernetes {
                identity_id,
                token_path,
            } => f
                .debug_struct("Kubernetes")
                .field("identity_id", identity_id)
                .field("token_path", token_path)
                .finish(),
        }
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn or_env(value: &str, name: &str) -> Result<String, ProviderError> {
    if !value.is_empty() {
        return Ok(value.to_string());
    }
    env_value(name).ok_or_else(|| ProviderError::Other(format!("{name} is not set")))
}

/// Where secrets are read from and how to log in.
#[derive(Debug, Clone)]
pub struct InfisicalConfig {
    /// Base URL of the Infisical server.
    pub site_url: String,
    /// Login identity.
    pub auth: InfisicalAuth,
    /// Project slug.
    pub project_slug: String,
    /// Environment slug, e.g. `dev` or `prod`.
    pub environment: String,
    /// Folder to list.
    pub secret_path: String,
    /// Bound on each HTTP request.
    pub timeout: Duration,
}

impl InfisicalConfig {
    /// Reads `environment` of `project_slug` on Infisical cloud.
    pub fn new(project_slug: impl Into<String>, environment: impl Into<String>, auth: InfisicalAuth) -> Self {
        Self {
            site_url: DEFAULT_SITE_URL.to_string(),
            auth,
            project_slug: project_slug.into(),
            environment: environment.into(),
            secret_path: DEFAULT_SECRET_PATH.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Points at a self-hosted server.
    pub fn with_site_url(mut self, site_url: impl Into<String>) -> Self {
        self.site_url = site_url.into();
        self
    }

    /// Lists another folder.
    pub fn with_secret_path(mut self, secret_path: impl Into<String>) -> Self {
        self.secret_path = secret_path.into();
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct Endpoints {
    universal_login: Url,
    kubernetes_login: Url,
    secrets: Url,
}

impl Endpoints {
    fn new(site_url: &str) -> Result<Self, ProviderError> {
        let invalid = |message: String| ProviderError::Parse {
            source_name: site_url.to_string(),
            message,
        };

        // `join` replaces the last path segment unless the base ends in '/'
        let mut base = Url::parse(site_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let join = |path: &str| base.join(path).map_err(|e| invalid(e.to_string()));

        Ok(Self {
            universal_login: join(UNIVERSAL_LOGIN_PATH)?,
            kubernetes_login: join(KUBERNETES_LOGIN_PATH)?,
            secrets: join(SECRETS_PATH)?,
        })
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum LoginRequest<'a> {
    #[serde(rename_all = "camelCase")]
    Universal { client_id: &'a str, client_secret: &'a str },
    #[serde(rename_all = "camelCase")]
    Kubernetes { identity_id: &'a str, jwt: &'a str },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Deserialize)]
struct ListSecretsResponse {
    secrets: Vec<Secret>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Secret {
    secret_key: String,
    secret_value: String,
}

struct AccessToken {
    value: String,
    renew_at: Instant,
}

/// Reads a project environment from an Infisical server.
///
/// [`config`](Provider::config) returns the secrets listed while connecting;
/// every [`fetch_config`](Provider::fetch_config) lists them again.
pub struct InfisicalProvider {
    client: Client,
    endpoints: Endpoints,
    config: InfisicalConfig,
    token: Mutex<Option<AccessToken>>,
    initial: Snapshot,
}

impl InfisicalProvider {
    /// Logs in and captures the initial snapshot.
    ///
    /// Fails when the site URL is invalid, when the login is refused or when
    /// the secrets cannot be listed.
    pub async fn connect(config: InfisicalConfig) -> Result<Self, ProviderError> {
        let endpoints = Endpoints::new(&config.site_url)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Other(format!("failed to create HTTP client: {e}")))?;

        let mut provider = Self {
            client,
            endpoints,
            config,
            token: Mutex::new(None),
            initial: Snapshot::new(),
        };
        provider.initial = provider.list_secrets().await?;
        info!(
            site = %provider.config.site_url,
            project = %provider.config.project_slug,
            environment = %provider.config.environment,
            keys = provider.initial.len(),
            "Connected to Infisical"
        );
        Ok(provider)
    }

    /// Connection settings.
    pub const fn settings(&self) -> &InfisicalConfig {
        &self.config
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| Instant::now() < token.renew_at)
            .map(|token| token.value.clone());
        match cached {
            Some(token) => Ok(token),
            None => self.login().await,
        }
    }

    #[instrument(skip(self), fields(project = %self.config.project_slug))]
    async fn login(&self) -> Result<String, ProviderError> {
        let auth = self.config.auth.resolve()?;
        let jwt;
        let (url, request) = match &auth {
            InfisicalAuth::Universal {
                client_id,
                client_secret,
            } => (
                &self.endpoints.universal_login,
                LoginRequest::Universal {
                    client_id,
                    client_secret,
                },
            ),
            InfisicalAuth::Kubernetes {
                identity_id,
                token_path,
            } => {
                let path = token_path
                    .as_deref()
                    .ok_or_else(|| ProviderError::Other("no service account token path".into()))?;
                jwt = tokio::fs::read_to_string(path).await?;
                (
                    &self.endpoints.kubernetes_login,
                    LoginRequest::Kubernetes {
                        identity_id,
                        jwt: jwt.trim(),
                    },
                )
            }
        };

        let response = self
            .client
            .post(url.clone())
            .json(&request)
            .send()
            .await
            .map_err(request_error)?;
        let login: LoginResponse = success(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;

        let lifetime = Duration::from_secs(login.expires_in).saturating_sub(TOKEN_RENEW_MARGIN);
        *self.token.lock() = Some(AccessToken {
            value: login.access_token.clone(),
            renew_at: Instant::now() + lifetime,
        });
        debug!(expires_in = login.expires_in, "Logged in to Infisical");
        Ok(login.access_token)
    }

    async fn request_secrets(&self, token: &str) -> Result<Response, ProviderError> {
        self.client
            .get(self.endpoints.secrets.clone())
            .bearer_auth(token)
            .query(&[
                ("workspaceSlug", self.config.project_slug.as_str()),
                ("environment", self.config.environment.as_str()),
                ("secretPath", self.config.secret_path.as_str()),
            ])
            .send()
            .await
            .map_err(request_error)
    }

    async fn list_secrets(&self) -> Result<Snapshot, ProviderError> {
        let token = self.access_token().await?;
        let mut response = self.request_secrets(&token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!("Access token rejected, logging in again");
            *self.token.lock() = None;
            let token = self.login().await?;
            response = self.request_secrets(&token).await?;
        }

        let listed: ListSecretsResponse = success(response)
            .await?
            .json()
            .await
            .map_err(request_error)?;
        Ok(listed
            .secrets
            .into_iter()
            .map(|secret| (secret.secret_key, secret.secret_value))
            .collect())
    }
}

#[async_trait]
impl Provider for InfisicalProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        self.list_secrets().await
    }
}

impl fmt::Debug for InfisicalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfisicalProvider")
            .field("config", &self.config)
            .field("initial_keys", &self.initial.len())
            .finish_non_exhaustive()
    }
}

async fn success(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Remote {
        status: Some(status.as_u16()),
        message: format!("{status}: {}", body.trim()),
    })
}

fn request_error(error: reqwest::Error) -> ProviderError {
    ProviderError::Remote {
        status: error.status().map(|s| s.as_u16()),
        message: error.to_string(),
    }
}
