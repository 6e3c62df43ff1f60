//! Per-appliance context.
//!
//! A [`NetProfiler`] owns everything tied to one appliance: the endpoint
//! wrapper, the persisted column and area caches, the column catalog and the
//! lock serializing report traffic from worker threads. Nothing here is
//! global; two appliances are two values.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::api::connection::Connection;
use crate::api::endpoints::ProfilerApi;
use crate::config::ProfilerConfig;
use crate::error::Result;
use crate::logging::structured::LogContext;
use crate::metadata::areas::AreaCatalog;
use crate::metadata::cache::{MetadataCache, VerifySummary};
use crate::metadata::catalog::{ColumnCatalog, GroupbyScope};
use crate::metadata::column::{Column, ColumnRef};
use crate::metadata::store::LocalStore;
use crate::metadata::triplets::{Centricity, Groupby, Realm};

pub struct NetProfiler {
    api: ProfilerApi,
    store: Arc<dyn LocalStore>,
    config: ProfilerConfig,
    ctx: LogContext,
    version: String,
    cache: MetadataCache,
    catalog: ColumnCatalog,
    areas: AreaCatalog,
    lock: Mutex<()>,
}

impl NetProfiler {
    /// Connect to an appliance: read its software version, load or refresh
    /// the column cache for every legal triplet, and load the area list.
    pub fn connect(conn: Arc<dyn Connection>, store: Arc<dyn LocalStore>, config: ProfilerConfig) -> Result<Self> {
        let ctx = LogContext::new(conn.host());
        let api = ProfilerApi::new(conn);

        let version = api.sw_version()?;
        log::info!("{} PROFILER_CONNECT sw_version={}", ctx, version);

        let mut cache = MetadataCache::load(store.as_ref(), &version, &ctx);
        cache.verify(
            &api,
            store.as_ref(),
            &Realm::ALL,
            &Centricity::ALL,
            Groupby::ALL,
            false,
            &ctx,
        )?;
        let catalog = ColumnCatalog::new(cache.unique_columns());

        let areas = AreaCatalog::load_or_fetch(store.as_ref(), &version, || api.areas(), &ctx)?;

        log::info!(
            "{} PROFILER_READY columns={} triplets={} areas={}",
            ctx,
            catalog.len(),
            cache.len(),
            areas.len()
        );

        Ok(Self {
            api,
            store,
            config,
            ctx,
            version,
            cache,
            catalog,
            areas,
            lock: Mutex::new(()),
        })
    }

    /// Connect over HTTPS with basic authentication, caching metadata under
    /// the configured directory.
    #[cfg(feature = "http")]
    pub fn open(host: &str, username: &str, password: &str, config: ProfilerConfig) -> Result<Self> {
        let conn = crate::api::http::HttpConnection::new(host, config.request_timeout()).with_basic_auth(username, password);
        let store = crate::metadata::store::FileStore::new(config.cache_dir());
        Self::connect(Arc::new(conn), Arc::new(store), config)
    }

    pub fn host(&self) -> &str {
        self.api.host()
    }

    /// Appliance software version, also the cache file discriminator.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn api(&self) -> &ProfilerApi {
        &self.api
    }

    pub fn config(&self) -> &ProfilerConfig {
        &self.config
    }

    pub fn ctx(&self) -> &LogContext {
        &self.ctx
    }

    pub fn catalog(&self) -> &ColumnCatalog {
        &self.catalog
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn areas(&self) -> &AreaCatalog {
        &self.areas
    }

    /// Resolve column references, optionally restricted to the columns legal
    /// for `groupby`.
    pub fn get_columns(&self, columns: &[ColumnRef], groupby: Option<Groupby>) -> Result<Vec<Arc<Column>>> {
        let scope = groupby.map(|g| GroupbyScope {
            groupby: g,
            keys: self.cache.keys_for_groupby(g),
        });
        self.catalog.resolve_many(columns, scope.as_ref())
    }

    pub fn get_columns_by_ids(&self, ids: &[i64]) -> Result<Vec<Arc<Column>>> {
        self.catalog.get_by_ids(ids)
    }

    pub fn search_columns(
        &self,
        realms: Option<&[Realm]>,
        centricities: Option<&[Centricity]>,
        groupbys: Option<&[Groupby]>,
    ) -> Vec<Arc<Column>> {
        self.cache.search_columns(realms, centricities, groupbys)
    }

    pub fn area_id(&self, name: &str) -> Result<i64> {
        self.areas.area_id(name)
    }

    /// Re-verify the column cache, refetching every triplet when `force`.
    pub fn refresh_columns(&mut self, force: bool) -> Result<VerifySummary> {
        let summary = self.cache.verify(
            &self.api,
            self.store.as_ref(),
            &Realm::ALL,
            &Centricity::ALL,
            Groupby::ALL,
            force,
            &self.ctx,
        )?;
        self.catalog = ColumnCatalog::new(self.cache.unique_columns());
        Ok(summary)
    }

    /// Serializes report create / poll / fetch steps across threads sharing
    /// this appliance.
    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock()
    }

    /// End the session. A failed logout is logged and otherwise ignored;
    /// the handle is consumed either way.
    pub fn logout(self) -> Result<()> {
        match self.api.logout() {
            Ok(()) => log::info!("{} PROFILER_LOGOUT", self.ctx),
            Err(e) => log::warn!("{} PROFILER_LOGOUT_FAILED error={}", self.ctx, e),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::connection::Method;
    use crate::api::testing::{connect, scripted, COLUMNS, INFO};
    use crate::error::ProfilerError;
    use crate::metadata::column::refs;
    use crate::metadata::store::MemoryStore;

    #[test]
    fn test_connect_builds_catalog_and_areas() {
        let conn = scripted("np.example.com");
        let profiler = connect(&conn);
        assert_eq!(profiler.version(), "10.23");
        assert_eq!(profiler.host(), "np.example.com");
        assert!(profiler.catalog().contains("avg_bytes"));
        assert_eq!(profiler.area_id("Data_Center").unwrap(), 1);
        assert!(matches!(profiler.area_id("Moon"), Err(ProfilerError::InvalidArea(_))));
        assert!(profiler.cache().len() > 0);
    }

    #[test]
    fn test_second_connect_uses_cache() {
        let conn = scripted("np");
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::default());
        NetProfiler::connect(conn.clone(), store.clone(), ProfilerConfig::default()).unwrap();
        let first = conn.count(Method::Get, COLUMNS);
        assert!(first > 0);

        NetProfiler::connect(conn.clone(), store, ProfilerConfig::default()).unwrap();
        assert_eq!(conn.count(Method::Get, COLUMNS), first);
        assert_eq!(conn.count(Method::Get, INFO), 2);
    }

    #[test]
    fn test_get_columns() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let cols = profiler
            .get_columns(&refs(vec!["host_ip", "avg_bytes"]), Some(Groupby::Host))
            .unwrap();
        assert_eq!(cols.iter().map(|c| c.id).collect::<Vec<_>>(), vec![17, 33]);
        assert!(Arc::ptr_eq(&cols[1], &profiler.get_columns_by_ids(&[33]).unwrap()[0]));
        assert!(matches!(
            profiler.get_columns(&refs(vec!["bogus"]), None),
            Err(ProfilerError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_refresh_force_refetches() {
        let conn = scripted("np");
        let mut profiler = connect(&conn);
        let before = conn.count(Method::Get, COLUMNS);
        let summary = profiler.refresh_columns(true).unwrap();
        assert_eq!(summary.fetched, profiler.cache().len());
        assert_eq!(conn.count(Method::Get, COLUMNS), before * 2);
        assert!(profiler.catalog().contains("time"));
    }

    #[test]
    fn test_connect_fails_without_metadata() {
        let conn = Arc::new(crate::api::testing::FakeConnection::new("np"));
        conn.on(Method::Get, INFO, Ok(serde_json::json!({"sw_version": "10.23"})));
        let err = NetProfiler::connect(conn, Arc::new(MemoryStore::default()), ProfilerConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ProfilerError::MetadataUnavailable(_)));
    }

    #[test]
    fn test_logout_tolerates_failed_request() {
        let conn = scripted("np");
        connect(&conn).logout().unwrap();
        assert_eq!(conn.count(Method::Get, "/api/common/1.0/logout.json"), 1);

        let conn = scripted("np");
        conn.on(Method::Get, "/api/common/1.0/logout.json", Ok(serde_json::json!({})));
        assert!(connect(&conn).logout().is_ok());
    }

    #[test]
    fn test_lock_is_exclusive() {
        let conn = scripted("np");
        let profiler = connect(&conn);
        let guard = profiler.lock();
        assert!(profiler.lock.try_lock().is_none());
        drop(guard);
        assert!(profiler.lock.try_lock().is_some());
    }
}
