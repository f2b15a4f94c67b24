use std::fmt::Display;

use serde::{Serialize, de::DeserializeOwned};

use crate::client::ApiClient;
use crate::error::ApiResult;
use crate::query::ListQuery;

/// Resource
///
/// Generic CRUD handle for one backend resource (`/{resource}`), borrowed from a scoped
/// client. Typed per-resource wrappers are thin layers over these calls.
#[derive(Clone)]
pub struct Resource<'a> {
    client: &'a ApiClient,
    base_path: String,
}

impl<'a> Resource<'a> {
    pub(crate) fn new(client: &'a ApiClient, name: &str) -> Self {
        Self {
            client,
            base_path: format!("/{}", name.trim_matches('/')),
        }
    }

    pub fn path(&self) -> &str {
        &self.base_path
    }

    fn item_path(&self, id: impl Display) -> String {
        format!("{}/{}", self.base_path, id)
    }

    /// GET /{resource}?{wire query}
    pub async fn list<T: DeserializeOwned>(&self, query: &ListQuery) -> ApiResult<T> {
        self.client.get(&query.apply_to_path(&self.base_path)).await
    }

    /// GET /{resource}/{id}
    pub async fn get<T: DeserializeOwned>(&self, id: impl Display) -> ApiResult<T> {
        self.client.get(&self.item_path(id)).await
    }

    /// GET /{resource}/key/{key}, used by the config resource.
    pub async fn by_key<T: DeserializeOwned>(&self, key: &str) -> ApiResult<T> {
        self.client
            .get(&format!("{}/key/{}", self.base_path, key))
            .await
    }

    /// POST /{resource}
    pub async fn create<B, T>(&self, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.client.post(&self.base_path, body).await
    }

    /// PATCH /{resource}/{id}
    pub async fn update<B, T>(&self, id: impl Display, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.client.patch(&self.item_path(id), body).await
    }

    /// PUT /{resource}/{id}
    pub async fn replace<B, T>(&self, id: impl Display, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.client.put(&self.item_path(id), body).await
    }

    /// DELETE /{resource}/{id}
    pub async fn delete(&self, id: impl Display) -> ApiResult<()> {
        self.client
            .delete::<serde_json::Value>(&self.item_path(id))
            .await?;
        Ok(())
    }
}
