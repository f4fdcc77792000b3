use reqwest::Method;
use serde_json::Value;

use crate::error::ApiResult;

use super::{ApiClient, ApiResponse, RequestConfig};

/// Verb-oriented wrapper over [`ApiClient`] used by the domain services.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: ApiClient,
}

impl HttpClient {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, url: &str, request_id: Option<&str>) -> ApiResult<ApiResponse> {
        self.send(Method::GET, url, None, request_id).await
    }

    pub async fn post(
        &self,
        url: &str,
        body: Option<Value>,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        self.send(Method::POST, url, body, request_id).await
    }

    pub async fn put(
        &self,
        url: &str,
        body: Option<Value>,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        self.send(Method::PUT, url, body, request_id).await
    }

    pub async fn patch(
        &self,
        url: &str,
        body: Option<Value>,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        self.send(Method::PATCH, url, body, request_id).await
    }

    pub async fn delete(
        &self,
        url: &str,
        body: Option<Value>,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        self.send(Method::DELETE, url, body, request_id).await
    }

    pub fn cancel_request(&self, request_id: &str) -> bool {
        self.client.cancel_request(request_id)
    }

    pub fn cancel_all_requests(&self) -> usize {
        self.client.cancel_all_requests()
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<Value>,
        request_id: Option<&str>,
    ) -> ApiResult<ApiResponse> {
        let config = RequestConfig::new(method, url).with_body(body);
        self.client.request(config, request_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn put_sends_body_to_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/products/7")
                .header("content-type", "application/json")
                .json_body(json!({ "name": "Mate", "price": 12 }));
            then.status(200)
                .json_body(json!({ "success": true, "data": { "id": "7", "price": 12 } }));
        });

        let config = ClientConfig::new(server.base_url()).with_retry(1, Duration::from_millis(1));
        let http = HttpClient::new(ApiClient::new(config).unwrap());
        let response = http
            .put("products/7", Some(json!({ "name": "Mate", "price": 12 })), None)
            .await
            .unwrap();
        mock.assert();
        let data: serde_json::Value = response.data().unwrap();
        assert_eq!(data["price"], 12);
    }
}
