//! Asynchronous Lizzy stack client implementation.

use crate::models::{CreateStackOptions, CreateStackRequest, Stack, TrafficUpdate};
use crate::watch::{DeploymentWatch, StackSource};
use crate::Result;
use async_trait::async_trait;
use lizzy_core::client::{ClientConfig, PollPolicy};
use lizzy_core::config::LizzyConfig;
use lizzy_core::query::QueryParams;
use lizzy_core::version::warn_on_version_mismatch;
use lizzy_core::Error;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;
use validator::Validate;

const USER_AGENT: &str = concat!("lizzy-stacks/", env!("CARGO_PKG_VERSION"));
const STACKS: &str = "stacks";

/// Builder for [`StackClient`].
#[derive(Debug, Clone)]
pub struct StackClientBuilder {
    config: LizzyConfig,
    http_config: ClientConfig,
}

impl StackClientBuilder {
    /// Create a new builder from a [`LizzyConfig`].
    #[must_use]
    pub fn new(config: LizzyConfig) -> Self {
        Self {
            config,
            http_config: ClientConfig::new(),
        }
    }

    /// Override the HTTP client configuration used when building the client.
    ///
    /// The request timeout always comes from the [`LizzyConfig`].
    #[must_use]
    pub fn with_http_config(mut self, http_config: ClientConfig) -> Self {
        self.http_config = http_config;
        self
    }

    /// Finalise the builder and create the [`StackClient`].
    pub fn build(self) -> Result<StackClient> {
        self.config.check()?;
        let api_url = normalize_api_url(self.config.parse_base_url()?)?;

        let http_config = self.http_config.with_timeout(self.config.timeout());

        let mut builder = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(http_config.timeout)
            .connect_timeout(http_config.connect_timeout)
            .pool_idle_timeout(http_config.pool_idle_timeout)
            .pool_max_idle_per_host(http_config.pool_max_idle_per_host)
            .gzip(http_config.enable_compression);

        if !self.config.tls_verify {
            warn!("TLS verification disabled for Lizzy client");
            builder = builder.danger_accept_invalid_certs(true);
        }

        if let Some(ca_cert) = &self.config.tls_ca_cert {
            debug!("loading Lizzy CA certificate from {}", ca_cert.display());
            let bytes = std::fs::read(ca_cert).map_err(|err| {
                Error::ConfigError(format!(
                    "Failed to read Lizzy CA certificate {}: {err}",
                    ca_cert.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&bytes)
                .map_err(|err| Error::ConfigError(format!("Invalid Lizzy CA certificate: {err}")))?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder.build().map_err(|err| {
            Error::ConfigError(format!("Failed to build Lizzy HTTP client: {err}"))
        })?;

        Ok(StackClient {
            http,
            api_url,
            access_token: self.config.access_token.clone(),
            client_version: self.config.client_version.clone(),
            poll_policy: self.config.poll_policy(),
        })
    }
}

/// Asynchronous client for the Lizzy `stacks` collection.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct StackClient {
    http: Client,
    api_url: Url,
    access_token: SecretString,
    client_version: String,
    poll_policy: PollPolicy,
}

impl StackClient {
    /// Construct a client for `base_url` authenticating with `access_token`.
    ///
    /// `/api` is appended to the base URL unless it already ends there.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Result<Self> {
        let config = LizzyConfig::new(base_url, access_token)?;
        StackClientBuilder::new(config).build()
    }

    /// Construct a client directly from the configuration.
    pub fn from_config(config: &LizzyConfig) -> Result<Self> {
        StackClientBuilder::new(config.clone()).build()
    }

    /// Start a builder pre-populated with the provided configuration.
    #[must_use]
    pub fn builder(config: LizzyConfig) -> StackClientBuilder {
        StackClientBuilder::new(config)
    }

    /// Return the effective API root, e.g. `https://lizzy.example.com/api`.
    #[must_use]
    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// Version this client reports to the server.
    #[must_use]
    pub fn client_version(&self) -> &str {
        &self.client_version
    }

    /// Poll policy used by [`StackClient::wait_for_deployment`].
    #[must_use]
    pub const fn poll_policy(&self) -> PollPolicy {
        self.poll_policy
    }

    /// Request a new stack built from the definition file at `definition`.
    ///
    /// The file is sent verbatim as `senza_yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationError`] for invalid options, [`Error::Io`] if the
    /// definition cannot be read and [`Error::Request`] on a non-success response.
    pub async fn create_stack(
        &self,
        definition: impl AsRef<Path>,
        options: &CreateStackOptions,
    ) -> Result<Stack> {
        options.validate()?;

        let path = definition.as_ref();
        let senza_yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|err| Error::Io {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;

        let request = CreateStackRequest::new(options, senza_yaml);
        let stack: Stack = self
            .send_json(Method::POST, &[STACKS], &QueryParams::new(), Some(&request))
            .await?;

        info!(
            stack_id = stack.stack_id().unwrap_or_default(),
            image_version = %options.image_version,
            "Requested new stack"
        );
        Ok(stack)
    }

    /// Fetch a single stack.
    pub async fn get_stack(&self, stack_id: &str) -> Result<Stack> {
        self.get_json(&[STACKS, stack_id], &QueryParams::new()).await
    }

    /// List stacks, restricted to `references` when it is not empty.
    pub async fn list_stacks(&self, references: &[&str]) -> Result<Vec<Stack>> {
        let mut query = QueryParams::new();
        query.push_list("references", references);
        self.get_json(&[STACKS], &query).await
    }

    /// Delete a stack.
    pub async fn delete_stack(&self, stack_id: &str) -> Result<()> {
        self.execute::<()>(
            Method::DELETE,
            &[STACKS, stack_id],
            &QueryParams::new(),
            None,
        )
        .await?;
        info!(stack_id, "Requested stack deletion");
        Ok(())
    }

    /// Route `percentage` of the traffic to a stack.
    ///
    /// When the API rejects the change the request body is dumped to the log before
    /// the error is returned.
    pub async fn set_traffic(&self, stack_id: &str, percentage: u8) -> Result<()> {
        let update = TrafficUpdate {
            new_traffic: percentage,
        };
        update.validate()?;

        match self
            .execute(
                Method::PATCH,
                &[STACKS, stack_id],
                &QueryParams::new(),
                Some(&update),
            )
            .await
        {
            Ok(_) => {
                info!(stack_id, percentage, "Traffic switched");
                Ok(())
            }
            Err(err) => {
                if matches!(err, Error::Request { .. }) {
                    let dump = serde_json::to_string_pretty(&update)?;
                    warn!(stack_id, "Data Json:\n{dump}");
                }
                Err(err)
            }
        }
    }

    /// Poll a stack until its deployment completes, fails, or keeps erroring.
    ///
    /// The watch uses a clone of this client and its [`PollPolicy`].
    #[must_use]
    pub fn wait_for_deployment(&self, stack_id: impl Into<String>) -> DeploymentWatch<Self> {
        DeploymentWatch::new(self.clone(), stack_id, self.poll_policy)
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::InvalidEndpoint(format!("Lizzy URL `{}` cannot be a base", self.api_url))
            })?
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(&self, segments: &[&str], query: &QueryParams) -> Result<T>
    where
        T: DeserializeOwned,
    {
        self.send_json::<(), T>(Method::GET, segments, query, None).await
    }

    async fn send_json<B, R>(
        &self,
        method: Method,
        segments: &[&str],
        query: &QueryParams,
        body: Option<&B>,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.execute(method, segments, query, body).await?;
        let url = response.url().clone();

        response
            .json::<R>()
            .await
            .map_err(|err| Error::ParseError(format!("`{}`: {err}", url.path())))
    }

    /// Issue one request against the API.
    ///
    /// Every call goes through here: it attaches the bearer token and JSON headers,
    /// checks the server version advisory and turns non-success statuses into
    /// [`Error::Request`].
    async fn execute<B>(
        &self,
        method: Method,
        segments: &[&str],
        query: &QueryParams,
        body: Option<&B>,
    ) -> Result<Response>
    where
        B: Serialize + ?Sized,
    {
        let url = self.endpoint(segments)?;
        debug!(%method, path = %url.path(), ?query, "Sending Lizzy request");

        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(self.access_token.expose_secret())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");

        if !query.is_empty() {
            request = request.query(query.as_pairs());
        }

        if let Some(payload) = body {
            request = request.json(payload);
        }

        let response = request.send().await?;
        warn_on_version_mismatch(&self.client_version, response.headers());

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        debug!(%status, "Lizzy request failed");

        Err(Error::Request { status, body })
    }
}

#[async_trait]
impl StackSource for StackClient {
    async fn fetch_stack(&self, stack_id: &str) -> Result<Stack> {
        self.get_stack(stack_id).await
    }
}

/// Strip trailing slashes and make sure the path ends in `/api`.
fn normalize_api_url(mut url: Url) -> Result<Url> {
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&path);

    if url.path() != "/api" {
        let base = url.to_string();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidEndpoint(format!("Lizzy URL `{base}` cannot be a base")))?
            .pop_if_empty()
            .push("api");
    }

    Ok(url)
}
