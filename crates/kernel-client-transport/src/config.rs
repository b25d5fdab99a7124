//! Connection configuration for the kernel channels endpoint.

use std::collections::BTreeMap;

use kernel_client_core::ConfigurationError;
use serde::{Deserialize, Serialize};
use url::Url;

/// Where and how to reach `/api/kernels/{kernel_id}/channels`.
///
/// `token` and `auth_header` are mutually exclusive; see [`Self::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Kernel to attach to. Required.
    pub kernel_id: String,
    /// `ws`, `wss`, `http` or `https`.
    pub scheme: String,
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Server base path, e.g. `/user/me`.
    pub base_path: String,
    /// Sent as `Authorization: token {token}` when non-empty.
    pub token: Option<String>,
    /// Raw headers attached to the websocket handshake.
    pub auth_header: Option<BTreeMap<String, String>>,
    /// `base_path` and `kernel_id` are already percent-escaped.
    pub path_encoded: bool,
    /// Verify the server certificate on `wss` connections.
    pub verify_tls: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            kernel_id: String::new(),
            scheme: "ws".to_string(),
            host: "localhost".to_string(),
            port: 8888,
            base_path: "/".to_string(),
            token: None,
            auth_header: None,
            path_encoded: false,
            verify_tls: true,
        }
    }
}

impl ChannelConfig {
    /// Default configuration for `kernel_id`.
    #[must_use]
    pub fn new(kernel_id: impl Into<String>) -> Self {
        Self {
            kernel_id: kernel_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_auth_header(mut self, headers: BTreeMap<String, String>) -> Self {
        self.auth_header = Some(headers);
        self
    }

    #[must_use]
    pub const fn with_path_encoded(mut self, encoded: bool) -> Self {
        self.path_encoded = encoded;
        self
    }

    #[must_use]
    pub const fn with_verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }

    /// Check the configuration before connecting.
    ///
    /// # Errors
    /// Returns error for an empty kernel id, a token combined with an
    /// explicit header map, or an unsupported scheme.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.kernel_id.is_empty() {
            return Err(ConfigurationError::MissingKernelId);
        }
        if self.active_token().is_some() && self.auth_header.is_some() {
            return Err(ConfigurationError::ConflictingAuth);
        }
        self.ws_scheme().map(|_| ())
    }

    /// Websocket scheme, mapping `http`/`https` onto `ws`/`wss`.
    ///
    /// # Errors
    /// Returns `ConfigurationError::UnsupportedScheme` for anything else.
    pub fn ws_scheme(&self) -> Result<&'static str, ConfigurationError> {
        match self.scheme.to_ascii_lowercase().as_str() {
            "ws" | "http" => Ok("ws"),
            "wss" | "https" => Ok("wss"),
            other => Err(ConfigurationError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Whether the connection runs over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        matches!(self.ws_scheme(), Ok("wss"))
    }

    /// Normalized base path: empty, or `/segment[/segment...]`.
    #[must_use]
    pub fn normalized_base_path(&self) -> String {
        let trimmed = self.base_path.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("/{trimmed}")
        }
    }

    /// Channels endpoint for one client session.
    ///
    /// # Errors
    /// Returns error if the scheme is unsupported or the host does not
    /// form a valid URL.
    pub fn endpoint(&self, session_id: &str) -> Result<Url, ConfigurationError> {
        let scheme = self.ws_scheme()?;
        let mut url = Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))
            .map_err(|e| ConfigurationError::InvalidUrl(e.to_string()))?;

        if self.path_encoded {
            let path = format!(
                "{}/api/kernels/{}/channels",
                self.normalized_base_path(),
                self.kernel_id
            );
            url.set_path(&path);
        } else {
            let mut segments = url.path_segments_mut().map_err(|()| {
                ConfigurationError::InvalidUrl(format!("{} cannot carry a path", self.host))
            })?;
            segments.clear();
            segments.extend(self.base_path.split('/').filter(|s| !s.is_empty()));
            segments.extend(["api", "kernels", self.kernel_id.as_str(), "channels"]);
        }

        url.query_pairs_mut().append_pair("session_id", session_id);
        Ok(url)
    }

    /// Headers attached to the websocket handshake.
    #[must_use]
    pub fn handshake_headers(&self) -> BTreeMap<String, String> {
        if let Some(headers) = &self.auth_header {
            return headers.clone();
        }
        self.active_token()
            .map(|token| BTreeMap::from([("Authorization".to_string(), format!("token {token}"))]))
            .unwrap_or_default()
    }

    /// An empty token counts as no token.
    fn active_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }
}
