//! Provider configuration.
//!
//! The provider is configured once per run with the grid master endpoint
//! and credentials. Connection details deserialize straight from the
//! provider configuration JSON and are validated before a client is built.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::schema::{Attribute, Diagnostic, Schema};

const DEFAULT_WAPI_VERSION: &str = "2.13";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DELETE_CONFLICT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RESULTS: u32 = 1000;

/// Connection settings for an Infoblox grid master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NiosConfig {
    /// Base URL of the grid master, e.g. `https://gm.example.net`.
    pub server: String,
    /// WAPI username.
    pub username: String,
    /// WAPI password.
    pub password: String,
    /// WAPI version to address, without the leading `v`.
    #[serde(default = "default_wapi_version")]
    pub wapi_version: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Ceiling for the delete-conflict retry window, in seconds.
    #[serde(default = "default_delete_conflict_timeout_secs")]
    pub delete_conflict_timeout_secs: u64,
    /// Verify the grid master's TLS certificate.
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
    /// Page cap passed to search requests.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_wapi_version() -> String {
    DEFAULT_WAPI_VERSION.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_delete_conflict_timeout_secs() -> u64 {
    DEFAULT_DELETE_CONFLICT_TIMEOUT_SECS
}

fn default_tls_verify() -> bool {
    true
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

impl NiosConfig {
    /// Parse and validate a configuration value.
    ///
    /// Returns the parsed configuration or the diagnostics explaining what
    /// is wrong with it.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, Vec<Diagnostic>> {
        let config: Self = serde_json::from_value(value.clone()).map_err(|e| {
            vec![Diagnostic::error("Invalid provider configuration").with_detail(e.to_string())]
        })?;
        let diagnostics = config.validate();
        if diagnostics.is_empty() {
            Ok(config)
        } else {
            Err(diagnostics)
        }
    }

    /// Validate the configuration, returning diagnostics for any problems.
    pub fn validate(&self) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        match Url::parse(&self.server) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                diagnostics.push(
                    Diagnostic::error("Unsupported server URL scheme")
                        .with_detail(format!("Got '{}', expected http or https", url.scheme()))
                        .with_attribute("server"),
                );
            }
            Err(e) => {
                diagnostics.push(
                    Diagnostic::error("Invalid server URL")
                        .with_detail(e.to_string())
                        .with_attribute("server"),
                );
            }
        }

        if self.username.is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing WAPI username").with_attribute("username"),
            );
        }
        if self.password.is_empty() {
            diagnostics.push(
                Diagnostic::error("Missing WAPI password").with_attribute("password"),
            );
        }
        if self.wapi_version.is_empty() || !self.wapi_version.chars().next().unwrap().is_ascii_digit()
        {
            diagnostics.push(
                Diagnostic::error("Invalid WAPI version")
                    .with_detail(format!(
                        "Got '{}', expected a bare version like '2.13'",
                        self.wapi_version
                    ))
                    .with_attribute("wapi_version"),
            );
        }

        diagnostics
    }

    /// The base URL all WAPI paths hang off, e.g.
    /// `https://gm.example.net/wapi/v2.13/`.
    pub fn base_url(&self) -> String {
        format!(
            "{}/wapi/v{}/",
            self.server.trim_end_matches('/'),
            self.wapi_version
        )
    }

    /// The schema for the provider configuration block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "server",
                Attribute::required_string().with_description("Grid master base URL"),
            )
            .with_attribute(
                "username",
                Attribute::required_string().with_description("WAPI username"),
            )
            .with_attribute(
                "password",
                Attribute::required_string()
                    .sensitive()
                    .with_description("WAPI password"),
            )
            .with_attribute(
                "wapi_version",
                Attribute::optional_string()
                    .with_default(serde_json::json!(DEFAULT_WAPI_VERSION)),
            )
            .with_attribute(
                "timeout_secs",
                Attribute::optional_int64().with_default(serde_json::json!(DEFAULT_TIMEOUT_SECS)),
            )
            .with_attribute(
                "delete_conflict_timeout_secs",
                Attribute::optional_int64()
                    .with_default(serde_json::json!(DEFAULT_DELETE_CONFLICT_TIMEOUT_SECS)),
            )
            .with_attribute(
                "tls_verify",
                Attribute::optional_bool().with_default(serde_json::json!(true)),
            )
            .with_attribute(
                "max_results",
                Attribute::optional_int64().with_default(serde_json::json!(DEFAULT_MAX_RESULTS)),
            )
    }
}
