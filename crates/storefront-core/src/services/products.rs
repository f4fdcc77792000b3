use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::auth::User;
use crate::endpoints::{self, build_endpoint};
use crate::error::ApiResult;
use crate::http::{to_body, HttpClient};

/// Request id under which catalogue listings run, so a stale listing can be cancelled.
pub const LIST_REQUEST_ID: &str = "products:list";

/// `{ user?, items }` payload returned by collection endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemsPayload<T> {
    #[serde(default)]
    pub user: Option<User>,
    pub items: Vec<T>,
}

#[derive(Debug, Clone)]
pub struct ProductService {
    http: HttpClient,
}

impl ProductService {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    pub async fn list<T>(&self) -> ApiResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let endpoint = build_endpoint(endpoints::products::LIST, &[]);
        let payload: ItemsPayload<T> = self
            .http
            .get(&endpoint, Some(LIST_REQUEST_ID))
            .await?
            .data()?;
        Ok(payload.items)
    }

    /// Abort a listing still in flight.
    pub fn cancel_list(&self) -> bool {
        self.http.cancel_request(LIST_REQUEST_ID)
    }

    pub async fn create<B, T>(&self, product: &B) -> ApiResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let endpoint = build_endpoint(endpoints::products::CREATE, &[]);
        self.http
            .post(&endpoint, Some(to_body(product)?), None)
            .await?
            .data()
    }

    pub async fn update<B, T>(&self, id: &str, changes: &B) -> ApiResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let endpoint = build_endpoint(endpoints::products::UPDATE, &[("id", id)]);
        self.http
            .patch(&endpoint, Some(to_body(changes)?), None)
            .await?
            .data()
    }

    pub async fn delete(&self, id: &str) -> ApiResult<()> {
        let endpoint = build_endpoint(endpoints::products::DELETE, &[("id", id)]);
        self.http.delete(&endpoint, None, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::error::ErrorKind;
    use crate::http::ApiClient;
    use httpmock::prelude::*;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn service(server: &MockServer) -> ProductService {
        let config = ClientConfig::new(server.base_url()).with_retry(1, Duration::from_millis(1));
        ProductService::new(HttpClient::new(ApiClient::new(config).unwrap()))
    }

    #[tokio::test]
    async fn list_returns_items() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/products");
            then.status(200).json_body(json!({
                "success": true,
                "data": {
                    "user": { "id": "u1", "email": "ada@example.com" },
                    "items": [{ "id": "p1", "name": "Mate" }, { "id": "p2", "name": "Bombilla" }]
                }
            }));
        });

        let items: Vec<Value> = service(&server).list().await.unwrap();
        mock.assert();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["name"], "Bombilla");
    }

    #[tokio::test]
    async fn create_posts_product_and_returns_record() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/products")
                .json_body(json!({ "name": "Yerba", "price": 7 }));
            then.status(201).json_body(json!({
                "success": true,
                "data": { "id": "p9", "name": "Yerba", "price": 7 }
            }));
        });

        let created: Value = service(&server)
            .create(&json!({ "name": "Yerba", "price": 7 }))
            .await
            .unwrap();
        mock.assert();
        assert_eq!(created["id"], "p9");
    }

    #[tokio::test]
    async fn update_targets_parameterised_path() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(httpmock::Method::PATCH)
                .path("/products/42")
                .json_body(json!({ "price": 10 }));
            then.status(200)
                .json_body(json!({ "success": true, "data": { "id": "42", "price": 10 } }));
        });

        let updated: Value = service(&server)
            .update("42", &json!({ "price": 10 }))
            .await
            .unwrap();
        mock.assert();
        assert_eq!(updated["price"], 10);
    }

    #[tokio::test]
    async fn delete_missing_product_is_not_found() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(DELETE).path("/products/404");
            then.status(404);
        });

        let err = service(&server).delete("404").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), Some("(HTTP_404)"));
        assert_eq!(err.message(), "Recurso no encontrado");
    }

    #[tokio::test]
    async fn listing_can_be_cancelled() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/products");
            then.status(200)
                .delay(Duration::from_secs(2))
                .json_body(json!({ "success": true, "data": { "items": [] } }));
        });

        let products = service(&server);
        let handle = {
            let products = products.clone();
            tokio::spawn(async move { products.list::<Value>().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(products.cancel_list());
        let err = handle.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestCancelled);
    }
}
