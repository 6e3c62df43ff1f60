//! Triplet-keyed column metadata cache.
//!
//! Column listings are expensive to fetch (one request per realm, centricity
//! and groupby combination) and only change with the appliance software, so
//! they are persisted per appliance version and refetched only when a
//! triplet is missing or a refresh is forced.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{ProfilerError, Result};
use crate::logging::structured::LogContext;
use crate::metadata::column::Column;
use crate::metadata::store::{columns_file_name, LocalStore};
use crate::metadata::triplets::{valid_triplets, Centricity, Groupby, Realm, Triplet, CACHE_VERSION};

/// Fetches the raw column listing for one triplet.
pub trait ColumnSource {
    fn fetch_columns(&self, triplet: &Triplet) -> Result<Vec<Value>>;
}

/// On-disk layout of the column cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheFile {
    pub version: u32,
    pub appliance_version: String,
    pub checksum: String,
    pub triplets: BTreeMap<String, Vec<Column>>,
}

/// SHA-256 hex digest of `content`.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of one `verify` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub fetched: usize,
    pub cached: usize,
    pub failed: usize,
}

/// In-memory column cache for one appliance version.
#[derive(Debug, Default)]
pub struct MetadataCache {
    appliance_version: String,
    entries: BTreeMap<String, Vec<Arc<Column>>>,
}

impl MetadataCache {
    pub fn new(appliance_version: &str) -> Self {
        Self {
            appliance_version: appliance_version.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the persisted cache for `appliance_version`.
    ///
    /// A missing, unreadable, tampered or outdated file yields an empty
    /// cache; it will be rebuilt by the next `verify`.
    pub fn load(store: &dyn LocalStore, appliance_version: &str, ctx: &LogContext) -> Self {
        let mut cache = Self::new(appliance_version);
        let name = columns_file_name(appliance_version);

        let contents = match store.read(&name) {
            Ok(Some(contents)) => contents,
            Ok(None) => {
                log::debug!("{} COLUMN_CACHE_ABSENT file={}", ctx, name);
                return cache;
            }
            Err(e) => {
                log::warn!("{} COLUMN_CACHE_READ_FAILED file={} error={}", ctx, name, e);
                return cache;
            }
        };

        let file: CacheFile = match serde_json::from_str(&contents) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("{} COLUMN_CACHE_CORRUPT file={} error={}", ctx, name, e);
                return cache;
            }
        };

        if file.version < CACHE_VERSION {
            log::info!(
                "{} COLUMN_CACHE_OUTDATED stored={} expected={}",
                ctx,
                file.version,
                CACHE_VERSION
            );
            return cache;
        }

        match serde_json::to_string(&file.triplets) {
            Ok(serialized) if compute_hash(&serialized) == file.checksum => {}
            _ => {
                log::warn!("{} COLUMN_CACHE_CHECKSUM_MISMATCH file={}", ctx, name);
                return cache;
            }
        }

        let mut seen: HashMap<String, Arc<Column>> = HashMap::new();
        for (key, columns) in file.triplets {
            let shared = columns
                .into_iter()
                .map(|c| {
                    Arc::clone(
                        seen.entry(c.key.clone())
                            .or_insert_with(|| Arc::new(c)),
                    )
                })
                .collect();
            cache.entries.insert(key, shared);
        }

        log::info!(
            "{} COLUMN_CACHE_LOADED triplets={} columns={}",
            ctx,
            cache.entries.len(),
            seen.len()
        );
        cache
    }

    pub fn appliance_version(&self) -> &str {
        &self.appliance_version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, triplet: &Triplet) -> bool {
        self.entries.contains_key(&triplet.key())
    }

    pub fn columns_for(&self, triplet: &Triplet) -> Option<&[Arc<Column>]> {
        self.entries.get(&triplet.key()).map(Vec::as_slice)
    }

    /// Fetch every legal triplet that is missing (or all of them when
    /// `force_refetch`), then persist if anything was fetched.
    ///
    /// A failing triplet is logged and skipped. Only when nothing could be
    /// fetched and the cache is still empty does this fail.
    #[allow(clippy::too_many_arguments)]
    pub fn verify(
        &mut self,
        source: &dyn ColumnSource,
        store: &dyn LocalStore,
        realms: &[Realm],
        centricities: &[Centricity],
        groupbys: &[Groupby],
        force_refetch: bool,
        ctx: &LogContext,
    ) -> Result<VerifySummary> {
        let mut summary = VerifySummary::default();
        let mut seen: HashMap<String, Arc<Column>> = self
            .unique_columns()
            .into_iter()
            .map(|c| (c.key.clone(), c))
            .collect();

        let triplets = valid_triplets(realms, centricities, groupbys);
        for triplet in &triplets {
            let key = triplet.key();
            if !force_refetch && self.entries.contains_key(&key) {
                summary.cached += 1;
                continue;
            }

            log::debug!("{} COLUMN_FETCH triplet={}", ctx, triplet);
            let fetched = source.fetch_columns(triplet).and_then(|raw| {
                raw.iter().map(Column::from_json).collect::<Result<Vec<_>>>()
            });

            match fetched {
                Ok(columns) => {
                    let merged: Vec<Arc<Column>> = columns
                        .into_iter()
                        .map(|c| {
                            Arc::clone(
                                seen.entry(c.key.clone())
                                    .or_insert_with(|| Arc::new(c)),
                            )
                        })
                        .collect();
                    self.entries.insert(key, merged);
                    summary.fetched += 1;
                }
                Err(e) => {
                    log::warn!(
                        "{} COLUMN_FETCH_FAILED triplet={} error={}",
                        ctx,
                        triplet,
                        e
                    );
                    summary.failed += 1;
                }
            }
        }

        if summary.fetched == 0 && summary.failed > 0 && self.entries.is_empty() {
            log::error!(
                "{} COLUMN_CACHE_UNAVAILABLE attempted={}",
                ctx,
                summary.failed
            );
            return Err(ProfilerError::MetadataUnavailable(summary.failed));
        }

        if summary.fetched > 0 {
            self.persist(store)?;
        }

        log::info!(
            "{} COLUMN_CACHE_VERIFIED fetched={} cached={} failed={}",
            ctx,
            summary.fetched,
            summary.cached,
            summary.failed
        );
        Ok(summary)
    }

    /// Write the cache, stamped with the current schema version.
    pub fn persist(&self, store: &dyn LocalStore) -> Result<()> {
        let triplets: BTreeMap<String, Vec<Column>> = self
            .entries
            .iter()
            .map(|(k, cols)| (k.clone(), cols.iter().map(|c| (**c).clone()).collect()))
            .collect();
        let checksum = compute_hash(&serde_json::to_string(&triplets)?);
        let file = CacheFile {
            version: CACHE_VERSION,
            appliance_version: self.appliance_version.clone(),
            checksum,
            triplets,
        };
        store.write(
            &columns_file_name(&self.appliance_version),
            &serde_json::to_string(&file)?,
        )
    }

    /// Every cached column once, in first-seen order.
    pub fn unique_columns(&self) -> Vec<Arc<Column>> {
        dedupe(self.entries.values().flatten())
    }

    /// Union of the entries matching any combination of the filters. `None`
    /// matches everything on that axis.
    pub fn search_columns(
        &self,
        realms: Option<&[Realm]>,
        centricities: Option<&[Centricity]>,
        groupbys: Option<&[Groupby]>,
    ) -> Vec<Arc<Column>> {
        let realms = realms.unwrap_or(&Realm::ALL);
        let centricities = centricities.unwrap_or(&Centricity::ALL);
        let groupbys = groupbys.unwrap_or(Groupby::ALL);

        let mut wanted = HashSet::new();
        for realm in realms {
            for centricity in centricities {
                for groupby in groupbys {
                    wanted.insert(Triplet::new(*realm, *centricity, *groupby).key());
                }
            }
        }

        dedupe(
            self.entries
                .iter()
                .filter(|(k, _)| wanted.contains(*k))
                .flat_map(|(_, cols)| cols.iter()),
        )
    }

    /// Keys of the columns legal for `groupby` under any realm or centricity.
    pub fn keys_for_groupby(&self, groupby: Groupby) -> HashSet<String> {
        self.search_columns(None, None, Some(&[groupby]))
            .into_iter()
            .map(|c| c.key.clone())
            .collect()
    }
}

fn dedupe<'a>(columns: impl Iterator<Item = &'a Arc<Column>>) -> Vec<Arc<Column>> {
    let mut seen = HashSet::new();
    columns
        .filter(|c| seen.insert(c.key.clone()))
        .cloned()
        .collect()
}
