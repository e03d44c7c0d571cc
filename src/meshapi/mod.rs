// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Typed client for the mesh control-plane REST API.
//!
//! One [`ObjectApi`] per mesh resource kind, all sharing the collection
//! endpoint; the server stores every kind in one object store and the
//! client filters by the `kind` discriminator.

use std::marker::PhantomData;

use reqwest::StatusCode;
use tracing::debug;
use url::Url;

use crate::constants::api;
use crate::error::{MeshctlError, Result};
use crate::resource::{
    Canary, Ingress, LoadBalance, MeshResource, MeshService, ObservabilityMetrics,
    ObservabilityOutputServer, ObservabilityTracings, Resilience, ResourceDocument, Tenant,
};

/// Dispatch a generic per-kind method on a document's `kind` discriminator.
macro_rules! dispatch_kind {
    ($self:ident, $doc:expr, $method:ident) => {
        match $doc.kind.as_str() {
            Tenant::KIND => $self.$method::<Tenant>($doc).await,
            MeshService::KIND => $self.$method::<MeshService>($doc).await,
            LoadBalance::KIND => $self.$method::<LoadBalance>($doc).await,
            Canary::KIND => $self.$method::<Canary>($doc).await,
            ObservabilityTracings::KIND => $self.$method::<ObservabilityTracings>($doc).await,
            ObservabilityMetrics::KIND => $self.$method::<ObservabilityMetrics>($doc).await,
            ObservabilityOutputServer::KIND => {
                $self.$method::<ObservabilityOutputServer>($doc).await
            }
            Resilience::KIND => $self.$method::<Resilience>($doc).await,
            Ingress::KIND => $self.$method::<Ingress>($doc).await,
            other => Err(MeshctlError::decode(
                format!("document {:?}", $doc.name),
                format!("unrecognized resource kind {:?}", other),
            )),
        }
    };
}

/// Client for the mesh control-plane REST API.
pub struct MeshClient {
    base: Url,
    http: reqwest::Client,
}

impl MeshClient {
    /// Create a client for the given server address.
    ///
    /// A bare `host:port` is taken as `http://host:port`.
    pub fn new(server: &str) -> Result<Self> {
        let address = if server.starts_with("http://") || server.starts_with("https://") {
            server.to_string()
        } else {
            format!("http://{}", server)
        };
        let base = Url::parse(&address).map_err(|e| MeshctlError::InvalidServer {
            address: server.to_string(),
            message: e.to_string(),
        })?;

        Ok(MeshClient {
            base,
            http: reqwest::Client::new(),
        })
    }

    pub fn tenants(&self) -> ObjectApi<'_, Tenant> {
        ObjectApi::new(self)
    }

    pub fn services(&self) -> ObjectApi<'_, MeshService> {
        ObjectApi::new(self)
    }

    pub fn load_balances(&self) -> ObjectApi<'_, LoadBalance> {
        ObjectApi::new(self)
    }

    pub fn canaries(&self) -> ObjectApi<'_, Canary> {
        ObjectApi::new(self)
    }

    pub fn observability_tracings(&self) -> ObjectApi<'_, ObservabilityTracings> {
        ObjectApi::new(self)
    }

    pub fn observability_metrics(&self) -> ObjectApi<'_, ObservabilityMetrics> {
        ObjectApi::new(self)
    }

    pub fn observability_output_servers(&self) -> ObjectApi<'_, ObservabilityOutputServer> {
        ObjectApi::new(self)
    }

    pub fn resiliences(&self) -> ObjectApi<'_, Resilience> {
        ObjectApi::new(self)
    }

    pub fn ingresses(&self) -> ObjectApi<'_, Ingress> {
        ObjectApi::new(self)
    }

    /// Apply every decoded document through the typed API for its kind,
    /// stopping at the first failure.
    pub async fn apply_documents(&self, docs: &[ResourceDocument]) -> Result<()> {
        for doc in docs {
            self.apply_document(doc).await?;
        }
        Ok(())
    }

    /// Apply one decoded document: create, falling back to an update when
    /// the object already exists.
    pub async fn apply_document(&self, doc: &ResourceDocument) -> Result<()> {
        dispatch_kind!(self, doc, apply_as)
    }

    /// Fetch the objects the documents name, one list per empty-named
    /// document and one item otherwise, flattened in document order.
    pub async fn fetch_documents(&self, docs: &[ResourceDocument]) -> Result<Vec<serde_json::Value>> {
        let mut values = Vec::new();
        for doc in docs {
            values.extend(dispatch_kind!(self, doc, fetch_as)?);
        }
        Ok(values)
    }

    async fn apply_as<T: MeshResource>(&self, doc: &ResourceDocument) -> Result<()> {
        let object: T = resource_from_document(doc)?;
        let objects = ObjectApi::<T>::new(self);
        match objects.create(&object).await {
            Err(MeshctlError::Conflict { .. }) => objects.patch(&object).await,
            result => result,
        }
    }

    async fn fetch_as<T: MeshResource>(
        &self,
        doc: &ResourceDocument,
    ) -> Result<Vec<serde_json::Value>> {
        let objects = ObjectApi::<T>::new(self);
        if doc.name.is_empty() {
            objects
                .list()
                .await?
                .iter()
                .map(|o| {
                    serde_json::to_value(o).map_err(|e| MeshctlError::decode(T::KIND, e))
                })
                .collect()
        } else {
            let object = objects.get(&doc.name).await?;
            Ok(vec![serde_json::to_value(&object)
                .map_err(|e| MeshctlError::decode(T::KIND, e))?])
        }
    }

    /// Fetch the control-plane cluster membership list.
    pub async fn members(&self) -> Result<Vec<serde_json::Value>> {
        let url = self.url_for(api::MEMBERS_URL)?;
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MeshctlError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }

    fn objects_url(&self) -> Result<Url> {
        self.url_for(api::OBJECTS_URL)
    }

    fn object_url(&self, name: &str) -> Result<Url> {
        self.url_for(&format!("{}/{}", api::OBJECTS_URL, name))
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| MeshctlError::InvalidServer {
            address: self.base.to_string(),
            message: e.to_string(),
        })
    }
}

/// CRUD operations for one mesh resource kind.
pub struct ObjectApi<'a, T> {
    client: &'a MeshClient,
    _kind: PhantomData<T>,
}

impl<'a, T: MeshResource> ObjectApi<'a, T> {
    fn new(client: &'a MeshClient) -> Self {
        ObjectApi {
            client,
            _kind: PhantomData,
        }
    }

    pub async fn get(&self, name: &str) -> Result<T> {
        let url = self.client.object_url(name)?;
        debug!("GET {}", url);
        let response = self.client.http.get(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(not_found::<T>(name)),
            status => Err(api_error(status, response).await),
        }
    }

    /// List all objects of this kind, in server order.
    pub async fn list(&self) -> Result<Vec<T>> {
        let url = self.client.objects_url()?;
        debug!("GET {}", url);
        let response = self.client.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        let objects: Vec<serde_json::Value> = response.json().await?;
        decode_objects_of_kind(objects)
    }

    pub async fn create(&self, object: &T) -> Result<()> {
        let url = self.client.objects_url()?;
        debug!("POST {}", url);
        let response = self.client.http.post(url).json(object).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(MeshctlError::Conflict {
                kind: T::KIND.to_string(),
                name: object.name().to_string(),
            }),
            status => Err(api_error(status, response).await),
        }
    }

    pub async fn patch(&self, object: &T) -> Result<()> {
        let url = self.client.object_url(object.name())?;
        debug!("PUT {}", url);
        let response = self.client.http.put(url).json(object).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(not_found::<T>(object.name())),
            status => Err(api_error(status, response).await),
        }
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        let url = self.client.object_url(name)?;
        debug!("DELETE {}", url);
        let response = self.client.http.delete(url).send().await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(not_found::<T>(name)),
            status => Err(api_error(status, response).await),
        }
    }
}

/// Convert a decoded document into the typed resource for its kind.
fn resource_from_document<T: MeshResource>(doc: &ResourceDocument) -> Result<T> {
    serde_yaml::from_value(doc.body.clone())
        .map_err(|e| MeshctlError::decode(format!("{} {:?}", doc.kind, doc.name), e))
}

/// Pick the objects matching `T`'s kind out of a mixed collection payload.
fn decode_objects_of_kind<T: MeshResource>(objects: Vec<serde_json::Value>) -> Result<Vec<T>> {
    objects
        .into_iter()
        .filter(|v| v.get("kind").and_then(|k| k.as_str()) == Some(T::KIND))
        .map(|v| {
            serde_json::from_value(v).map_err(|e| MeshctlError::decode("mesh API response", e))
        })
        .collect()
}

fn not_found<T: MeshResource>(name: &str) -> MeshctlError {
    MeshctlError::NotFound {
        kind: T::KIND.to_string(),
        name: name.to_string(),
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> MeshctlError {
    MeshctlError::Api {
        status: status.as_u16(),
        message: response.text().await.unwrap_or_default(),
    }
}
