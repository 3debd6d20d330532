use crate::cache::{
    OptimisticSnapshot, PollHandle, ProductKeys, QueryCache, QueryObserver, QueryState, ReadOptions,
};
use crate::client::{CatalogClient, ProductApi};
use crate::error_code::ApiResult;
use crate::resilience::retry::{retry_with, RetryProfile};
use crate::types::{fallback_products, CreateProduct, Product, ProductPatch, UpdateProduct};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Categories change rarely; they stay fresh longer than products.
pub const CATEGORY_STALE_TIME: Duration = Duration::from_secs(30 * 60);

/// Product list that falls back to demo data when nothing else is available.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackProducts {
    pub state: QueryState<Vec<Product>>,
    /// `state.data` holds bundled demo products, not catalog data.
    pub using_fallback: bool,
}

/// Product catalog backed by a [`QueryCache`].
///
/// Queries read through the cache. Mutations validate their input, run with
/// the mutation retry profile and, once the server confirms, patch every
/// cached view of the affected product. The remote catalog does not persist
/// writes, so these patches are the only place mutations become visible.
#[derive(Clone)]
pub struct Catalog {
    api: Arc<dyn ProductApi>,
    cache: QueryCache,
    mutation_retry: RetryProfile,
}

impl Catalog {
    pub fn new(api: Arc<dyn ProductApi>, cache: QueryCache) -> Self {
        Self {
            api,
            cache,
            mutation_retry: RetryProfile::mutation(),
        }
    }

    pub fn from_client(client: CatalogClient) -> Self {
        Self::new(Arc::new(client), QueryCache::default())
    }

    pub fn with_mutation_retry(mut self, profile: RetryProfile) -> Self {
        self.mutation_retry = profile;
        self
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn api(&self) -> &Arc<dyn ProductApi> {
        &self.api
    }

    /// Clone the api handle into a fetcher closure.
    fn fetcher<T, F, Fut>(&self, call: F) -> impl Fn() -> Fut + Send + Sync + 'static
    where
        F: Fn(Arc<dyn ProductApi>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ApiResult<T>> + Send + 'static,
    {
        let api = Arc::clone(&self.api);
        move || call(Arc::clone(&api))
    }

    pub async fn products(&self, limit: Option<u32>) -> QueryState<Vec<Product>> {
        let fetch = self.fetcher(move |api| async move { api.products(limit).await });
        self.cache.read(&ProductKeys::list(limit), fetch).await
    }

    /// Non-positive ids are never fetched and read as idle.
    pub async fn product(&self, id: i64) -> QueryState<Product> {
        if id <= 0 {
            return QueryState::idle();
        }
        let fetch = self.fetcher(move |api| async move { api.product(id).await });
        self.cache.read(&ProductKeys::detail(id), fetch).await
    }

    /// An empty category is never fetched and reads as idle.
    pub async fn products_in_category(&self, category: &str) -> QueryState<Vec<Product>> {
        if category.is_empty() {
            return QueryState::idle();
        }
        let owned = category.to_string();
        let fetch = self.fetcher(move |api| {
            let category = owned.clone();
            async move { api.products_in_category(&category).await }
        });
        self.cache.read(&ProductKeys::by_category(category), fetch).await
    }

    pub async fn categories(&self) -> QueryState<Vec<String>> {
        let fetch = self.fetcher(|api| async move { api.categories().await });
        let options = ReadOptions::default().stale_time(CATEGORY_STALE_TIME);
        self.cache
            .read_with(&ProductKeys::categories(), options, fetch)
            .await
    }

    /// Products, or demo products when the read failed with no data to show.
    pub async fn products_or_fallback(&self, limit: Option<u32>) -> FallbackProducts {
        let mut state = self.products(limit).await;
        if !state.is_error_without_data() {
            return FallbackProducts {
                state,
                using_fallback: false,
            };
        }
        let mut demo = fallback_products();
        if let Some(n) = limit {
            demo.truncate(n as usize);
        }
        info!(
            kind = state.error.as_ref().map(|e| e.code()),
            "serving fallback products"
        );
        state.data = Some(demo);
        FallbackProducts {
            state,
            using_fallback: true,
        }
    }

    /// Subscribe to a product list, fetching it in the background when stale.
    pub fn watch_products(&self, limit: Option<u32>) -> QueryObserver {
        let key = ProductKeys::list(limit);
        let fetch = self.fetcher(move |api| async move { api.products(limit).await });
        let _: QueryState<Vec<Product>> = self.cache.read_cached(&key, ReadOptions::default(), fetch);
        self.cache.observe(&key)
    }

    /// Refetch every cached product list every `interval`.
    pub fn poll_lists(&self, interval: Duration) -> PollHandle {
        self.cache.start_polling(ProductKeys::lists(), interval)
    }

    pub async fn prefetch_product(&self, id: i64) {
        if id <= 0 {
            return;
        }
        let fetch = self.fetcher(move |api| async move { api.product(id).await });
        self.cache
            .prefetch(&ProductKeys::detail(id), ReadOptions::default(), fetch)
            .await;
    }

    /// Invalidate everything under `products`.
    pub fn refetch_all(&self) -> usize {
        self.cache.invalidate(ProductKeys::all())
    }

    pub fn refetch_lists(&self) -> usize {
        self.cache.invalidate(ProductKeys::lists())
    }

    async fn mutate<T, F, Fut>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ApiResult<T>>,
    {
        retry_with(
            &self.mutation_retry,
            None,
            |attempt, err, delay| {
                debug!(
                    op,
                    attempt = attempt + 1,
                    kind = err.code(),
                    delay_ms = delay.as_millis() as u64,
                    "mutation retry scheduled"
                )
            },
            |_| call(),
        )
        .await
        .map_err(|e| {
            warn!(op, kind = e.code(), http_status = e.http_status, "mutation failed");
            Error::from(e)
        })
    }

    /// Create a product and prepend it to every cached list.
    pub async fn create_product(&self, input: CreateProduct) -> Result<Product> {
        input.validate()?;
        let created = self
            .mutate("create", || self.api.create_product(&input))
            .await?;
        let snapshot = self
            .cache
            .apply_optimistic_mutation::<Vec<Product>, _>(ProductKeys::lists(), |mut list| {
                list.insert(0, created.clone());
                list
            });
        info!(id = created.id, lists = snapshot.len(), "product created");
        Ok(created)
    }

    /// Update a product and merge the confirmed fields into every cached
    /// list and into its detail entry.
    pub async fn update_product(&self, id: i64, input: UpdateProduct) -> Result<ProductPatch> {
        input.validate()?;
        let echoed = self
            .mutate("update", || self.api.update_product(id, &input))
            .await?;
        let patch = ProductPatch::from(input).overlay(&echoed);

        let mut from_list: Option<Product> = None;
        let snapshot = self
            .cache
            .apply_optimistic_mutation::<Vec<Product>, _>(ProductKeys::lists(), |list| {
                list.into_iter()
                    .map(|p| {
                        if p.id != id {
                            return p;
                        }
                        let merged = p.merged_with(&patch);
                        from_list = Some(merged.clone());
                        merged
                    })
                    .collect()
            });
        let detail_patch = patch.clone();
        self.cache
            .set_query_data::<Product, _>(&ProductKeys::detail(id), move |old| match old {
                Some(p) => Some(p.merged_with(&detail_patch)),
                None => from_list.or_else(|| detail_patch.clone().into_product(id)),
            });
        info!(id, lists = snapshot.len(), "product updated");
        Ok(patch)
    }

    /// Delete a product and drop it from every cached list. Deleting an id
    /// that is no longer listed leaves the lists unchanged.
    pub async fn delete_product(&self, id: i64) -> Result<ProductPatch> {
        let echoed = self
            .mutate("delete", || self.api.delete_product(id))
            .await?;
        let snapshot = remove_from_lists(&self.cache, id);
        info!(id, lists = snapshot.len(), "product deleted");
        Ok(echoed)
    }

    /// Delete with the lists updated before the server answers; restored if
    /// the delete fails.
    pub async fn delete_product_optimistic(&self, id: i64) -> Result<ProductPatch> {
        self.cache.cancel(ProductKeys::lists());
        let snapshot = remove_from_lists(&self.cache, id);
        match self.mutate("delete", || self.api.delete_product(id)).await {
            Ok(echoed) => {
                info!(id, lists = snapshot.len(), "product deleted");
                Ok(echoed)
            }
            Err(e) => {
                self.cache.rollback(snapshot);
                Err(e)
            }
        }
    }
}

fn remove_from_lists(cache: &QueryCache, id: i64) -> OptimisticSnapshot {
    cache.apply_optimistic_mutation::<Vec<Product>, _>(ProductKeys::lists(), |mut list| {
        list.retain(|p| p.id != id);
        list
    })
}
