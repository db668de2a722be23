//! reqwest-backed default transport.

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use super::{Method, Transport, TransportRequest, TransportResponse};
use crate::error::TransportError;

/// Default [`Transport`] over a shared reqwest client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Use a caller-configured client (timeouts, proxies, pools).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        request: &TransportRequest,
    ) -> Result<TransportResponse, TransportError> {
        debug!(method = %request.method, url = %request.url, "dispatching request");

        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
            Method::Put => self.client.put(&request.url),
            Method::Delete => self.client.delete(&request.url),
        };

        let pairs: Vec<(&str, &str)> = request
            .params
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        builder = match request.method {
            Method::Get | Method::Delete => builder.query(&pairs),
            Method::Post | Method::Put => {
                if request.multipart.is_empty() {
                    builder.form(&pairs)
                } else {
                    let mut form = reqwest::multipart::Form::new();
                    for (name, value) in &request.params {
                        form = form.text(name.clone(), value.clone());
                    }
                    for part in &request.multipart {
                        let piece = reqwest::multipart::Part::bytes(part.bytes.clone())
                            .file_name(part.filename.clone())
                            .mime_str(&part.content_type)?;
                        form = form.part(part.name.clone(), piece);
                    }
                    builder.multipart(form)
                }
            }
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(String::from);
        let body = response.text().await?;

        debug!(status, bytes = body.len(), "response received");

        Ok(TransportResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Params;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_get_sends_query_params_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/users/show")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("user_id".into(), "123".into()),
                Matcher::UrlEncoded("include_entities".into(), "true".into()),
            ]))
            .match_header("authorization", "OAuth test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 123}"#)
            .create_async()
            .await;

        let mut params = Params::new();
        params.insert("user_id".to_string(), "123".to_string());
        params.insert("include_entities".to_string(), "true".to_string());

        let request = TransportRequest::new(Method::Get, format!("{}/users/show", server.url()))
            .with_params(params)
            .with_header("Authorization", "OAuth test");

        let response = HttpTransport::new().request(&request).await.unwrap();
        mock.assert_async().await;

        assert_eq!(response.status, 200);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.body, r#"{"id": 123}"#);
    }

    #[tokio::test]
    async fn test_post_sends_form_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/statuses/update")
            .match_body(Matcher::UrlEncoded("status".into(), "hello world".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 1}"#)
            .create_async()
            .await;

        let mut params = Params::new();
        params.insert("status".to_string(), "hello world".to_string());

        let request =
            TransportRequest::new(Method::Post, format!("{}/statuses/update", server.url()))
                .with_params(params);

        let response = HttpTransport::new().request(&request).await.unwrap();
        mock.assert_async().await;
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_failure_status_is_not_a_transport_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/missing")
            .with_status(404)
            .with_body(r#"{"error": "not found"}"#)
            .create_async()
            .await;

        let request = TransportRequest::new(Method::Get, format!("{}/missing", server.url()));
        let response = HttpTransport::new().request(&request).await.unwrap();

        assert_eq!(response.status, 404);
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_multi_keeps_input_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/first")
            .with_body(r#"{"n": 1}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/second")
            .with_body(r#"{"n": 2}"#)
            .create_async()
            .await;

        let requests = vec![
            TransportRequest::new(Method::Get, format!("{}/first", server.url())),
            TransportRequest::new(Method::Get, format!("{}/second", server.url())),
        ];

        let transport = HttpTransport::new();
        let results = transport.multi(&requests).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].as_ref().unwrap().body.contains('1'));
        assert!(results[1].as_ref().unwrap().body.contains('2'));
    }
}
