//! WAPI transport.
//!
//! The grid master exposes objects over a REST API (the WAPI). This module
//! provides the [`ObjectApi`] trait — the seam every lifecycle operation
//! talks through — and [`WapiClient`], its HTTPS implementation. The
//! client is a plain request/response layer: field selection via
//! `_return_fields+`, response shaping via `_return_as_object=1`, basic
//! auth, and status-code classification. Retry decisions belong to the
//! caller (see [`crate::reconcile`]).

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::NiosConfig;
use crate::error::{classify_response, ProviderError};

/// Object-level operations against the grid.
///
/// Implemented by [`WapiClient`] for real grids and by the in-memory fake
/// in [`crate::testing`] for unit tests.
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Fetch one object by its `_ref`.
    async fn get_by_ref(
        &self,
        reference: &str,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError>;

    /// Create an object of the given WAPI type, returning the created
    /// object with the requested fields.
    async fn create(
        &self,
        objtype: &str,
        body: &Value,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError>;

    /// Update the object behind `reference`, returning the updated object.
    async fn update(
        &self,
        reference: &str,
        body: &Value,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError>;

    /// Delete the object behind `reference`, returning the deleted ref.
    async fn delete(&self, reference: &str) -> Result<String, ProviderError>;

    /// List objects of a type whose extensible attribute `name` equals
    /// `value` — the single-field equality filter used for rediscovery.
    async fn search_by_extattr(
        &self,
        objtype: &str,
        name: &str,
        value: &str,
        return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError>;

    /// List objects of a type matching the given field filters.
    async fn search(
        &self,
        objtype: &str,
        filters: &BTreeMap<String, String>,
        return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError>;
}

/// HTTPS client for the WAPI.
#[derive(Debug, Clone)]
pub struct WapiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    max_results: u32,
}

impl WapiClient {
    /// Build a client from a validated configuration.
    pub fn new(config: &NiosConfig) -> Result<Self, ProviderError> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs));
        if !config.tls_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        Ok(Self {
            http: builder.build()?,
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            max_results: config.max_results,
        })
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Value, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "WAPI request");

        let mut req = self
            .http
            .request(method, &url)
            .basic_auth(&self.username, Some(&self.password))
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(classify_response(status.as_u16(), &text));
        }

        let value: Value = serde_json::from_str(&text)?;
        Ok(unwrap_result(value))
    }

    fn object_query(return_fields: &[&str]) -> Vec<(String, String)> {
        let mut query = vec![("_return_as_object".to_string(), "1".to_string())];
        if !return_fields.is_empty() {
            query.push(("_return_fields+".to_string(), return_fields.join(",")));
        }
        query
    }
}

/// Unwrap the `{"result": ...}` envelope produced by `_return_as_object=1`.
fn unwrap_result(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn as_result_list(value: Value) -> Result<Vec<Value>, ProviderError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(ProviderError::InvalidRequest(format!(
            "expected a list from the WAPI, got {}",
            other
        ))),
    }
}

#[async_trait]
impl ObjectApi for WapiClient {
    #[instrument(skip(self, return_fields), name = "wapi.get")]
    async fn get_by_ref(
        &self,
        reference: &str,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        self.request(
            Method::GET,
            reference,
            &Self::object_query(return_fields),
            None,
        )
        .await
    }

    #[instrument(skip(self, body, return_fields), name = "wapi.create")]
    async fn create(
        &self,
        objtype: &str,
        body: &Value,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        self.request(
            Method::POST,
            objtype,
            &Self::object_query(return_fields),
            Some(body),
        )
        .await
    }

    #[instrument(skip(self, body, return_fields), name = "wapi.update")]
    async fn update(
        &self,
        reference: &str,
        body: &Value,
        return_fields: &[&str],
    ) -> Result<Value, ProviderError> {
        self.request(
            Method::PUT,
            reference,
            &Self::object_query(return_fields),
            Some(body),
        )
        .await
    }

    #[instrument(skip(self), name = "wapi.delete")]
    async fn delete(&self, reference: &str) -> Result<String, ProviderError> {
        let value = self.request(Method::DELETE, reference, &[], None).await?;
        match value {
            Value::String(deleted_ref) => Ok(deleted_ref),
            other => Err(ProviderError::InvalidRequest(format!(
                "expected a deleted ref string from the WAPI, got {}",
                other
            ))),
        }
    }

    #[instrument(skip(self, return_fields), name = "wapi.search_by_extattr")]
    async fn search_by_extattr(
        &self,
        objtype: &str,
        name: &str,
        value: &str,
        return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError> {
        let mut query = Self::object_query(return_fields);
        query.push(("_max_results".to_string(), self.max_results.to_string()));
        // EA filters are spelled `*<name>=<value>`.
        query.push((format!("*{}", name), value.to_string()));

        let result = self.request(Method::GET, objtype, &query, None).await?;
        as_result_list(result)
    }

    #[instrument(skip(self, filters, return_fields), name = "wapi.search")]
    async fn search(
        &self,
        objtype: &str,
        filters: &BTreeMap<String, String>,
        return_fields: &[&str],
    ) -> Result<Vec<Value>, ProviderError> {
        let mut query = Self::object_query(return_fields);
        query.push(("_max_results".to_string(), self.max_results.to_string()));
        for (field, value) in filters {
            query.push((field.clone(), value.clone()));
        }

        let result = self.request(Method::GET, objtype, &query, None).await?;
        as_result_list(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> WapiClient {
        let config = NiosConfig::from_value(&json!({
            "server": server.uri(),
            "username": "admin",
            "password": "infoblox",
            "wapi_version": "2.13",
        }))
        .unwrap();
        WapiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_unwraps_result_envelope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wapi/v2.13/range/ZG5z:10.0.0.0"))
            .and(query_param("_return_as_object", "1"))
            .and(query_param("_return_fields+", "extattrs,comment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": {"_ref": "range/ZG5z:10.0.0.0", "comment": "lab"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let object = client
            .get_by_ref("range/ZG5z:10.0.0.0", &["extattrs", "comment"])
            .await
            .unwrap();
        assert_eq!(object["comment"], "lab");
    }

    #[tokio::test]
    async fn test_404_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "Error": "AdmConDataNotFoundError", "text": "not found"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_by_ref("range/gone", &[]).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_create_posts_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/wapi/v2.13/rangetemplate"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "result": {"_ref": "rangetemplate/x:tmpl", "name": "tmpl"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let created = client
            .create("rangetemplate", &json!({"name": "tmpl"}), &["extattrs"])
            .await
            .unwrap();
        assert_eq!(created["_ref"], "rangetemplate/x:tmpl");
    }

    #[tokio::test]
    async fn test_delete_returns_ref_string() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/wapi/v2.13/range/ZG5z:10.0.0.0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!("range/ZG5z:10.0.0.0")))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let deleted = client.delete("range/ZG5z:10.0.0.0").await.unwrap();
        assert_eq!(deleted, "range/ZG5z:10.0.0.0");
    }

    #[tokio::test]
    async fn test_search_by_extattr_uses_star_filter() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/wapi/v2.13/roaminghost"))
            .and(query_param("*terraform_internal_id", "abc-123"))
            .and(query_param("_max_results", "1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "result": [{"_ref": "roaminghost/y:rh1", "name": "rh1"}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let results = client
            .search_by_extattr("roaminghost", "terraform_internal_id", "abc-123", &[])
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0]["name"], "rh1");
    }

    #[tokio::test]
    async fn test_server_error_is_fatal_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.get_by_ref("range/x", &[]).await.unwrap_err();
        assert!(matches!(err, ProviderError::Api { status: 500, .. }));
    }
}
