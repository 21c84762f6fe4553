//! Memoising repository decorator.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::data_types::*;
use crate::error::Result;
use crate::repository::{rank_within, Repository, ZipCriteria};

/// Hit/miss counters for a [`CachedRepository`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Caches reference-data reads from an inner repository.
///
/// Nothing expires on its own; call [`CachedRepository::invalidate`] after the
/// underlying data changes.
pub struct CachedRepository<R> {
    inner: R,
    providers: Mutex<Option<Vec<Provider>>>,
    geocoded: Mutex<Option<Vec<Provider>>>,
    zip_records: Mutex<Option<Vec<ZipDemographic>>>,
    by_ccn: Mutex<HashMap<Ccn, Option<Provider>>>,
    by_zip: Mutex<HashMap<ZipCode, Option<ZipDemographic>>>,
    by_criteria: Mutex<HashMap<ZipCriteria, Vec<ZipDemographic>>>,
    service_areas: Mutex<HashMap<Ccn, Vec<ZipCode>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Values are inserted whole, so a poisoned guard still holds consistent data
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<R: Repository> CachedRepository<R> {
    pub fn new(inner: R) -> Self {
        CachedRepository {
            inner,
            providers: Mutex::new(None),
            geocoded: Mutex::new(None),
            zip_records: Mutex::new(None),
            by_ccn: Mutex::new(HashMap::new()),
            by_zip: Mutex::new(HashMap::new()),
            by_criteria: Mutex::new(HashMap::new()),
            service_areas: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Drop every cached value
    pub fn invalidate(&self) {
        *lock(&self.providers) = None;
        *lock(&self.geocoded) = None;
        *lock(&self.zip_records) = None;
        lock(&self.by_ccn).clear();
        lock(&self.by_zip).clear();
        lock(&self.by_criteria).clear();
        lock(&self.service_areas).clear();
        debug!("repository cache invalidated");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    fn slot<T: Clone>(&self, slot: &Mutex<Option<T>>, load: impl FnOnce() -> Result<T>) -> Result<T> {
        let mut guard = lock(slot);
        if let Some(value) = guard.as_ref() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = load()?;
        *guard = Some(value.clone());
        Ok(value)
    }

    fn keyed<K: Eq + Hash + Clone, V: Clone>(
        &self,
        map: &Mutex<HashMap<K, V>>,
        key: &K,
        load: impl FnOnce() -> Result<V>,
    ) -> Result<V> {
        if let Some(value) = lock(map).get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = load()?;
        lock(map).insert(key.clone(), value.clone());
        Ok(value)
    }
}

impl<R: Repository> Repository for CachedRepository<R> {
    fn providers(&self) -> Result<Vec<Provider>> {
        self.slot(&self.providers, || self.inner.providers())
    }

    fn provider(&self, ccn: &Ccn) -> Result<Option<Provider>> {
        self.keyed(&self.by_ccn, ccn, || self.inner.provider(ccn))
    }

    fn providers_with_coordinates(&self) -> Result<Vec<Provider>> {
        self.slot(&self.geocoded, || self.inner.providers_with_coordinates())
    }

    fn providers_near(&self, point: GeoPoint, radius_miles: f64) -> Result<Vec<ProviderDistance>> {
        Ok(rank_within(self.providers_with_coordinates()?, point, radius_miles))
    }

    fn zip_records(&self) -> Result<Vec<ZipDemographic>> {
        self.slot(&self.zip_records, || self.inner.zip_records())
    }

    fn zip_record(&self, zip: &ZipCode) -> Result<Option<ZipDemographic>> {
        self.keyed(&self.by_zip, zip, || self.inner.zip_record(zip))
    }

    /// Cached codes are served directly; the rest go to the inner repository
    /// in one call
    fn zip_records_for(&self, zips: &[ZipCode]) -> Result<Vec<ZipDemographic>> {
        let wanted: BTreeSet<&ZipCode> = zips.iter().collect();
        let mut records = Vec::with_capacity(wanted.len());
        let mut missing = Vec::new();
        {
            let cached = lock(&self.by_zip);
            for zip in &wanted {
                match cached.get(*zip) {
                    Some(entry) => {
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        records.extend(entry.clone());
                    }
                    None => missing.push((*zip).clone()),
                }
            }
        }

        if !missing.is_empty() {
            self.misses.fetch_add(missing.len() as u64, Ordering::Relaxed);
            let loaded = self.inner.zip_records_for(&missing)?;
            let mut cached = lock(&self.by_zip);
            for zip in missing {
                let record = loaded.iter().find(|r| r.zip_code == zip).cloned();
                cached.insert(zip, record);
            }
            records.extend(loaded);
        }

        records.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        Ok(records)
    }

    fn zip_records_matching(&self, criteria: &ZipCriteria) -> Result<Vec<ZipDemographic>> {
        self.keyed(&self.by_criteria, criteria, || self.inner.zip_records_matching(criteria))
    }

    fn service_area_links(&self) -> Result<Vec<(Ccn, ZipCode)>> {
        self.inner.service_area_links()
    }

    fn service_area(&self, ccn: &Ccn) -> Result<Vec<ZipCode>> {
        self.keyed(&self.service_areas, ccn, || self.inner.service_area(ccn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn dataset() -> Dataset {
        let mut provider = Provider::new(Ccn::new("450001").unwrap());
        provider.enhanced_location = Some(GeoPoint::new(30.0, -97.0));
        let mut zip = ZipDemographic::new(ZipCode::new("78701").unwrap());
        zip.location = Some(GeoPoint::new(30.27, -97.74));
        zip.medicare_eligible = Some(500);
        Dataset::from_records(vec![provider], vec![zip])
    }

    #[test]
    fn test_repeat_reads_hit_cache() {
        let cached = CachedRepository::new(dataset());
        let first = cached.providers().unwrap();
        let second = cached.providers().unwrap();
        assert_eq!(first, second);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 1 });

        let criteria = ZipCriteria::new(100);
        assert_eq!(
            cached.zip_records_matching(&criteria).unwrap(),
            cached.inner().zip_records_matching(&criteria).unwrap()
        );
        cached.zip_records_matching(&criteria).unwrap();
        assert_eq!(cached.stats(), CacheStats { hits: 2, misses: 2 });
    }

    #[test]
    fn test_negative_lookups_are_cached() {
        let cached = CachedRepository::new(dataset());
        let unknown = Ccn::new("999999").unwrap();
        assert!(cached.provider(&unknown).unwrap().is_none());
        assert!(cached.provider(&unknown).unwrap().is_none());
        assert_eq!(cached.stats().hits, 1);
    }

    #[test]
    fn test_zip_batch_mixes_cached_and_loaded() {
        let cached = CachedRepository::new(dataset());
        let austin = ZipCode::new("78701").unwrap();
        let unknown = ZipCode::new("78799").unwrap();
        cached.zip_record(&austin).unwrap();

        let records = cached.zip_records_for(&[austin.clone(), unknown.clone(), austin.clone()]).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(cached.stats(), CacheStats { hits: 1, misses: 2 });

        // the unknown code is now a cached negative
        assert!(cached.zip_record(&unknown).unwrap().is_none());
        assert_eq!(cached.stats().hits, 2);
    }

    #[test]
    fn test_invalidate_forces_reload() {
        let cached = CachedRepository::new(dataset());
        cached.zip_records().unwrap();
        cached.invalidate();
        cached.zip_records().unwrap();
        assert_eq!(cached.stats(), CacheStats { hits: 0, misses: 2 });
    }
}
