use reqwest::{header::HeaderMap, Client};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::{configuration::Config, error::Error};

const USER_AGENT: &str = concat!("lp-aggregator/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct HTTP {
    pub http: Client,
}

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
}

impl HTTP {
    pub fn new(config: &Config) -> Result<HTTP, Error> {
        Self::with_timeout(Duration::from_secs(config.timeout))
    }

    pub fn with_timeout(timeout: Duration) -> Result<HTTP, Error> {
        let http = match Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(c) => c,
            Err(e) => {
                return Err(Error::ReqwestError(e));
            },
        };

        Ok(HTTP { http })
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<T, Error> {
        debug!("GET {}", url);
        let json = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json::<T>()
            .await?;

        Ok(json)
    }

    /// Posts a GraphQL query and unwraps the `{data, errors}` envelope. A
    /// non-empty `errors` list fails the call even when partial data came
    /// back.
    pub async fn post_graphql<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &str,
        variables: Value,
        headers: HeaderMap,
    ) -> Result<T, Error> {
        debug!("POST {}", url);
        let envelope = self
            .http
            .post(url)
            .headers(headers)
            .json(&GraphQLRequest { query, variables })
            .send()
            .await?
            .error_for_status()?
            .json::<GraphQLResponse<T>>()
            .await?;

        if !envelope.errors.is_empty() {
            let message = envelope
                .errors
                .into_iter()
                .map(|e| e.message)
                .collect::<Vec<String>>()
                .join("; ");
            return Err(Error::SourceError {
                source_name: url.to_owned(),
                message,
            });
        }

        envelope.data.ok_or_else(|| Error::SourceError {
            source_name: url.to_owned(),
            message: String::from("GraphQL response without data"),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use reqwest::header::HeaderValue;

    use super::*;

    #[derive(Deserialize)]
    struct Pools {
        pools: Vec<Value>,
    }

    fn client() -> HTTP {
        HTTP::with_timeout(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn graphql_envelope_is_unwrapped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": { "pools": [{ "id": "a" }, { "id": "b" }] }
            })))
            .mount(&server)
            .await;

        let url = format!("{}/graphql", server.uri());
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_static("secret"));
        let data: Pools = client()
            .post_graphql(&url, "{ pools { id } }", json!({}), headers)
            .await
            .unwrap();

        assert_eq!(data.pools.len(), 2);
    }

    #[tokio::test]
    async fn graphql_errors_fail_the_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": null,
                "errors": [{ "message": "indexer unavailable" }]
            })))
            .mount(&server)
            .await;

        let result: Result<Pools, Error> = client()
            .post_graphql(&server.uri(), "{ pools { id } }", json!({}), HeaderMap::new())
            .await;

        match result {
            Err(Error::SourceError { message, .. }) => {
                assert_eq!(message, "indexer unavailable")
            },
            _ => panic!("expected a source error"),
        }
    }

    #[tokio::test]
    async fn http_status_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result: Result<Value, Error> =
            client().get_json(&format!("{}/vaults", server.uri())).await;

        assert!(matches!(result, Err(Error::ReqwestError(_))));
    }
}
