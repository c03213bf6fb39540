//! B. HashResolver. Ported from
//! `original_source/common/hash_manager.py:HashManager`.

mod error;
pub mod sync;

pub use error::{HashError, Result};
pub use sync::{detect_export_kind, detect_lookup_type_heuristic, load_asset_export, load_site_export, ExportKind, SyncStats};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

use tipflow_protocol::LookupType;
use tipflow_store::Store;

struct Cache {
    loaded: bool,
    entries: HashMap<(String, LookupType), String>,
}

/// Lazy, Store-backed cache of resolved hashes. Cheap to clone;
/// shares its cache and unknown-hashes log path across TipProcessor calls.
#[derive(Clone)]
pub struct HashResolver {
    store: Store,
    cache: Arc<Mutex<Cache>>,
    unknown_hashes_log: PathBuf,
}

impl HashResolver {
    pub fn new(store: Store, unknown_hashes_log: PathBuf) -> Self {
        HashResolver {
            store,
            cache: Arc::new(Mutex::new(Cache {
                loaded: false,
                entries: HashMap::new(),
            })),
            unknown_hashes_log,
        }
    }

    async fn ensure_loaded(&self, cache: &mut Cache) -> Result<()> {
        if cache.loaded {
            return Ok(());
        }
        let rows = self.store.load_all_hashes().await?;
        cache.entries = rows.into_iter().map(|row| ((row.tip_hash, row.lookup_type), row.resolved_value)).collect();
        cache.loaded = true;
        Ok(())
    }

    /// `Lookup(type, hash, tip_for_logging, inspection_id_for_logging)`.
    pub async fn lookup(
        &self,
        lookup_type: LookupType,
        tip_hash: &str,
        tip_for_logging: &str,
        inspection_id_for_logging: &str,
    ) -> Result<String> {
        let mut cache = self.cache.lock().await;
        self.ensure_loaded(&mut cache).await?;

        let key = (tip_hash.to_string(), lookup_type);
        if let Some(value) = cache.entries.get(&key) {
            return Ok(value.clone());
        }
        drop(cache);

        self.store.record_unknown_hash_sighting(tip_hash, lookup_type).await?;
        self.append_unknown_log(lookup_type, tip_hash, tip_for_logging, inspection_id_for_logging).await?;
        Ok(format!("Unknown ({tip_hash})"))
    }

    async fn append_unknown_log(
        &self,
        lookup_type: LookupType,
        tip_hash: &str,
        tip: &str,
        inspection_id: &str,
    ) -> Result<()> {
        if let Some(parent) = self.unknown_hashes_log.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.unknown_hashes_log)
            .await?;
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("{timestamp} | {lookup_type} | {tip_hash} | {inspection_id} | TIP:{tip}\n");
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Manually resolve a previously-unknown hash; updates the cache in
    /// place so subsequent lookups see it without a reload.
    pub async fn resolve_manually(&self, tip_hash: &str, lookup_type: LookupType, resolved_value: &str) -> Result<()> {
        self.store.resolve_hash_manually(tip_hash, lookup_type, resolved_value, Some("manual")).await?;
        let mut cache = self.cache.lock().await;
        cache.entries.insert((tip_hash.to_string(), lookup_type), resolved_value.to_string());
        Ok(())
    }

    /// Full refresh from authoritative asset/site exports;
    /// invalidates the whole in-memory cache.
    pub async fn sync_from_exports(&self, asset_path: Option<&std::path::Path>, site_path: Option<&std::path::Path>) -> Result<SyncStats> {
        let mut stats = SyncStats::default();
        let mut records = Vec::new();

        if let Some(path) = asset_path {
            let (asset_stats, asset_records) = load_asset_export(path)?;
            stats.assets_processed = asset_stats.assets_processed;
            stats.assets_skipped = asset_stats.assets_skipped;
            records.extend(asset_records);
        }
        if let Some(path) = site_path {
            let (site_stats, site_records) = load_site_export(path)?;
            stats.sites_processed = site_stats.sites_processed;
            stats.sites_skipped = site_stats.sites_skipped;
            records.extend(site_records);
        }

        if records.is_empty() {
            warn!("hash dictionary sync invoked with no records");
            return Ok(stats);
        }

        self.store.replace_all_hashes(&records).await?;

        let mut cache = self.cache.lock().await;
        cache.loaded = false;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> Store {
        Store::connect("sqlite::memory:", 1).await.unwrap()
    }

    #[tokio::test]
    async fn lookup_hit_returns_cached_value() {
        let store = test_store().await;
        store
            .replace_all_hashes(&[("h1".to_string(), LookupType::Vehicle, "Truck-7".to_string(), "PrimeMover".to_string())])
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let resolver = HashResolver::new(store, dir.path().join("unknown_hashes.log"));

        let result = resolver.lookup(LookupType::Vehicle, "h1", "tip-1", "LCD-1").await.unwrap();
        assert_eq!(result, "Truck-7");
    }

    #[tokio::test]
    async fn lookup_miss_records_sighting_and_returns_placeholder() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("unknown_hashes.log");
        let resolver = HashResolver::new(store.clone(), log_path.clone());

        let result = resolver.lookup(LookupType::Vehicle, "missing-hash", "tip-1", "LCD-1").await.unwrap();
        assert_eq!(result, "Unknown (missing-hash)");

        let unresolved = store.list_unknown_hashes().await.unwrap();
        assert_eq!(unresolved.len(), 1);
        assert_eq!(unresolved[0].tip_hash, "missing-hash");

        let log_contents = tokio::fs::read_to_string(&log_path).await.unwrap();
        assert!(log_contents.contains("missing-hash"));
    }

    #[tokio::test]
    async fn resolve_manually_is_visible_without_reload() {
        let store = test_store().await;
        let dir = tempfile::tempdir().unwrap();
        let resolver = HashResolver::new(store, dir.path().join("unknown_hashes.log"));

        resolver.lookup(LookupType::Trailer, "h2", "tip-2", "LCD-2").await.unwrap();
        resolver.resolve_manually("h2", LookupType::Trailer, "Trailer-9").await.unwrap();
        let result = resolver.lookup(LookupType::Trailer, "h2", "tip-2", "LCD-2").await.unwrap();
        assert_eq!(result, "Trailer-9");
    }
}
