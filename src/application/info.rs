//! Resource info (metadata and configuration) call-sites.

use std::sync::Arc;

use costboard_api_types::{InfoKind, InfoResponse};
use serde::de::DeserializeOwned;

use crate::cache::{
    FetchError, FetchOptions, INFO_SCOPE, ObserveOptions, Query, QueryCache, QueryKey,
    QueryObserver, QueryParams, compose_scoped_key,
};
use crate::infra::http::ApiClient;

/// Cached access to `info/<resource>/<kind>`.
#[derive(Clone, Debug)]
pub struct InfoResourceClient {
    api: ApiClient,
    cache: QueryCache,
    resource: String,
}

impl InfoResourceClient {
    pub fn new(api: ApiClient, cache: QueryCache, resource: impl Into<String>) -> Self {
        Self {
            api,
            cache,
            resource: resource.into(),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn key<T>(&self, kind: InfoKind, params: &QueryParams) -> QueryKey<InfoResponse<T>> {
        QueryKey::new(compose_scoped_key(
            INFO_SCOPE,
            &self.resource,
            kind.as_str(),
            params,
        ))
    }

    pub fn query<T>(
        &self,
        kind: InfoKind,
        params: &QueryParams,
        mut options: ObserveOptions,
    ) -> Query<InfoResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        options.deps.insert(0, params.canonical());

        let api = self.api.clone();
        let path = format!("info/{}/{}", self.resource, kind);
        let params = params.clone();
        Query::new(self.key(kind, &params), move || {
            let api = api.clone();
            let path = path.clone();
            let params = params.clone();
            async move {
                api.get_json::<InfoResponse<T>>(&path, &params)
                    .await
                    .map_err(|err| err.into_fetch_error())
            }
        })
        .with_options(options)
    }

    pub async fn fetch_kind<T>(
        &self,
        kind: InfoKind,
        params: &QueryParams,
    ) -> Result<Arc<InfoResponse<T>>, FetchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let descriptor = self.query::<T>(kind, params, ObserveOptions::default());
        let fetcher = descriptor.fetcher;
        let options = FetchOptions {
            stale_time: self.cache.config().default_stale_time(),
        };
        self.cache
            .fetch(&descriptor.key, move || (*fetcher)(), options)
            .await
    }

    pub async fn metadata<T>(&self, params: &QueryParams) -> Result<Arc<InfoResponse<T>>, FetchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.fetch_kind(InfoKind::Metadata, params).await
    }

    pub async fn configuration<T>(
        &self,
        params: &QueryParams,
    ) -> Result<Arc<InfoResponse<T>>, FetchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.fetch_kind(InfoKind::Configuration, params).await
    }

    pub fn observe<T>(
        &self,
        kind: InfoKind,
        params: &QueryParams,
        options: ObserveOptions,
    ) -> QueryObserver<InfoResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        QueryObserver::new(self.cache.clone(), self.query(kind, params, options))
    }
}
