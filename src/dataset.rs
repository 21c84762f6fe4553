/*!
 * In-memory dataset with lookup indexes
 *
 * A [`Dataset`] is a snapshot of both reference tables, indexed by CCN,
 * state and ZIP code, with a latitude-sorted proximity index over geocoded
 * providers. It implements [`Repository`], so every analysis can run against
 * it instead of the database.
 */

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::filter::ProviderFilter;
use crate::market::MarketAnalytics;
use crate::proximity::ProximityIndex;
use crate::quality::{self, QualityAnalytics};
use crate::repository::{sort_by_distance, Repository, SqliteRepository, ZipCriteria};

/// Builder for loading a dataset
pub struct DatasetBuilder {
    database_path: Option<PathBuf>,
    state: Option<String>,
    derive_quality: bool,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self {
            database_path: None,
            state: None,
            derive_quality: true,
        }
    }

    /// SQLite database to snapshot
    pub fn database<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.database_path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Keep only providers and ZIP records in one state
    pub fn state(mut self, state: &str) -> Self {
        self.state = Some(state.trim().to_ascii_uppercase());
        self
    }

    /// Fill missing composite scores, patient volumes and high-quality flags
    pub fn derive_quality_fields(mut self, derive: bool) -> Self {
        self.derive_quality = derive;
        self
    }

    pub fn build(self) -> Result<Dataset> {
        let path = self.database_path.ok_or_else(|| HomeHealthError::Configuration {
            message: "no database path given to DatasetBuilder".to_string(),
            suggestion: Some("call .database(path) before .build()".to_string()),
        })?;
        let repository = SqliteRepository::open(&path)?;
        let mut providers = repository.providers()?;
        let mut zip_records = repository.zip_records()?;
        let mut service_areas = repository.service_area_links()?;

        // Percentile thresholds come from the whole population, not the state slice
        if self.derive_quality {
            quality::derive_quality_fields(&mut providers);
        }

        if let Some(state) = &self.state {
            providers.retain(|p| p.in_state(state));
            zip_records.retain(|z| {
                z.state
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case(state))
                    .unwrap_or(false)
            });
            let kept: HashSet<&Ccn> = providers.iter().map(|p| &p.ccn).collect();
            service_areas.retain(|(ccn, _)| kept.contains(ccn));
        }

        let dataset = Dataset::assemble(providers, zip_records, false).with_service_areas(service_areas);
        info!(
            path = %path.display(),
            providers = dataset.len(),
            zip_records = dataset.zip_records.len(),
            "loaded dataset snapshot"
        );
        Ok(dataset)
    }
}

/// Indexed in-memory snapshot of providers and ZIP demographics
pub struct Dataset {
    providers: Vec<Provider>,
    zip_records: Vec<ZipDemographic>,
    ccn_index: HashMap<Ccn, usize>,
    state_index: HashMap<String, Vec<usize>>,
    zip_index: HashMap<ZipCode, usize>,
    locations: ProximityIndex<usize>,
    service_areas: HashMap<Ccn, Vec<ZipCode>>,
}

impl Dataset {
    /// Build from records, deriving missing quality fields
    pub fn from_records(providers: Vec<Provider>, zip_records: Vec<ZipDemographic>) -> Self {
        Self::assemble(providers, zip_records, true)
    }

    /// Snapshot everything a repository holds
    pub fn from_repository<R: Repository + ?Sized>(repository: &R) -> Result<Self> {
        Ok(Self::from_records(repository.providers()?, repository.zip_records()?)
            .with_service_areas(repository.service_area_links()?))
    }

    /// Attach provider-to-ZIP service area links; duplicates collapse
    pub fn with_service_areas(mut self, links: impl IntoIterator<Item = (Ccn, ZipCode)>) -> Self {
        for (ccn, zip) in links {
            self.service_areas.entry(ccn).or_default().push(zip);
        }
        for zips in self.service_areas.values_mut() {
            zips.sort();
            zips.dedup();
        }
        self
    }

    /// Snapshot a SQLite database
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        DatasetBuilder::new().database(path).build()
    }

    fn assemble(mut providers: Vec<Provider>, mut zip_records: Vec<ZipDemographic>, derive_quality: bool) -> Self {
        providers.sort_by(|a, b| a.ccn.cmp(&b.ccn));
        providers.dedup_by(|a, b| a.ccn == b.ccn);
        zip_records.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        zip_records.dedup_by(|a, b| a.zip_code == b.zip_code);

        if derive_quality {
            quality::derive_quality_fields(&mut providers);
        }

        let mut ccn_index = HashMap::with_capacity(providers.len());
        let mut state_index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, provider) in providers.iter().enumerate() {
            ccn_index.insert(provider.ccn.clone(), i);
            if let Some(state) = &provider.state {
                state_index
                    .entry(state.trim().to_ascii_uppercase())
                    .or_default()
                    .push(i);
            }
        }
        let zip_index = zip_records
            .iter()
            .enumerate()
            .map(|(i, z)| (z.zip_code.clone(), i))
            .collect();
        let locations = ProximityIndex::for_providers(&providers);

        Dataset {
            providers,
            zip_records,
            ccn_index,
            state_index,
            zip_index,
            locations,
            service_areas: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn provider_records(&self) -> &[Provider] {
        &self.providers
    }

    pub fn zip_demographics(&self) -> &[ZipDemographic] {
        &self.zip_records
    }

    pub fn get_by_ccn(&self, ccn: &Ccn) -> Option<&Provider> {
        self.ccn_index.get(ccn).map(|&i| &self.providers[i])
    }

    pub fn get_by_state(&self, state: &str) -> Vec<&Provider> {
        self.state_index
            .get(&state.trim().to_ascii_uppercase())
            .map(|indices| indices.iter().map(|&i| &self.providers[i]).collect())
            .unwrap_or_default()
    }

    pub fn get_zip(&self, zip: &ZipCode) -> Option<&ZipDemographic> {
        self.zip_index.get(zip).map(|&i| &self.zip_records[i])
    }

    /// Providers matching `filter`, best composite score first
    pub fn search(&self, filter: &ProviderFilter) -> Vec<&Provider> {
        filter.apply(&self.providers)
    }

    pub fn quality(&self) -> QualityAnalytics<'_> {
        QualityAnalytics::new(&self.providers)
    }

    pub fn market(&self) -> MarketAnalytics<'_> {
        MarketAnalytics::new(&self.providers)
    }

    pub fn statistics(&self) -> DatasetStatistics {
        DatasetStatistics::from_dataset(self)
    }
}

impl Repository for Dataset {
    fn providers(&self) -> Result<Vec<Provider>> {
        Ok(self.providers.clone())
    }

    fn provider(&self, ccn: &Ccn) -> Result<Option<Provider>> {
        Ok(self.get_by_ccn(ccn).cloned())
    }

    fn providers_with_coordinates(&self) -> Result<Vec<Provider>> {
        Ok(self
            .providers
            .iter()
            .filter(|p| p.enhanced_location.is_some())
            .cloned()
            .collect())
    }

    fn providers_near(&self, point: GeoPoint, radius_miles: f64) -> Result<Vec<ProviderDistance>> {
        let mut ranked: Vec<ProviderDistance> = self
            .locations
            .within(&point, radius_miles)
            .into_iter()
            .map(|(&i, distance_miles)| ProviderDistance {
                provider: self.providers[i].clone(),
                distance_miles,
            })
            .collect();
        sort_by_distance(&mut ranked);
        Ok(ranked)
    }

    fn zip_records(&self) -> Result<Vec<ZipDemographic>> {
        Ok(self.zip_records.clone())
    }

    fn zip_record(&self, zip: &ZipCode) -> Result<Option<ZipDemographic>> {
        Ok(self.get_zip(zip).cloned())
    }

    fn zip_records_matching(&self, criteria: &ZipCriteria) -> Result<Vec<ZipDemographic>> {
        Ok(self
            .zip_records
            .iter()
            .filter(|record| criteria.matches(record))
            .cloned()
            .collect())
    }

    fn service_area(&self, ccn: &Ccn) -> Result<Vec<ZipCode>> {
        Ok(self.service_areas.get(ccn).cloned().unwrap_or_default())
    }

    fn service_area_links(&self) -> Result<Vec<(Ccn, ZipCode)>> {
        let mut links: Vec<(Ccn, ZipCode)> = self
            .service_areas
            .iter()
            .flat_map(|(ccn, zips)| zips.iter().map(move |zip| (ccn.clone(), zip.clone())))
            .collect();
        links.sort();
        Ok(links)
    }
}

/// Coverage statistics for a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetStatistics {
    pub total_providers: usize,
    pub providers_with_enhanced_coordinates: usize,
    pub providers_with_original_county: usize,
    pub providers_with_enhanced_county: usize,
    pub providers_with_any_county: usize,
    pub high_quality_providers: usize,
    pub states_represented: usize,
    pub zip_records: usize,
    pub zip_records_with_coordinates: usize,
    pub rural_zip_records: usize,
}

impl DatasetStatistics {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let providers = &dataset.providers;
        let zips = &dataset.zip_records;
        Self {
            total_providers: providers.len(),
            providers_with_enhanced_coordinates: providers.iter().filter(|p| p.enhanced_location.is_some()).count(),
            providers_with_original_county: providers.iter().filter(|p| p.geography.county.is_some()).count(),
            providers_with_enhanced_county: providers.iter().filter(|p| p.geography.enhanced_county.is_some()).count(),
            providers_with_any_county: providers.iter().filter(|p| p.county_name().is_some()).count(),
            high_quality_providers: providers.iter().filter(|p| p.high_quality()).count(),
            states_represented: dataset.state_index.len(),
            zip_records: zips.len(),
            zip_records_with_coordinates: zips.iter().filter(|z| z.location.is_some()).count(),
            rural_zip_records: zips.iter().filter(|z| z.rural()).count(),
        }
    }

    fn pct(part: usize, whole: usize) -> f64 {
        if whole == 0 {
            0.0
        } else {
            part as f64 / whole as f64 * 100.0
        }
    }

    /// Print a summary of the statistics
    pub fn print_summary(&self) {
        println!("=== Home Health Dataset Statistics ===");
        println!("Providers: {}", self.total_providers);
        println!(
            "  With enhanced coordinates: {} ({:.1}%)",
            self.providers_with_enhanced_coordinates,
            Self::pct(self.providers_with_enhanced_coordinates, self.total_providers)
        );
        println!(
            "  County coverage: original {}, enhanced {}, combined {} ({:.1}%)",
            self.providers_with_original_county,
            self.providers_with_enhanced_county,
            self.providers_with_any_county,
            Self::pct(self.providers_with_any_county, self.total_providers)
        );
        println!(
            "  High quality: {} ({:.1}%)",
            self.high_quality_providers,
            Self::pct(self.high_quality_providers, self.total_providers)
        );
        println!("  States represented: {}", self.states_represented);
        println!("ZIP records: {}", self.zip_records);
        println!("  With coordinates: {}", self.zip_records_with_coordinates);
        println!("  Rural: {}", self.rural_zip_records);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(ccn: &str, state: &str, lat: Option<f64>) -> Provider {
        let mut p = Provider::new(Ccn::new(ccn).unwrap());
        p.state = Some(state.to_string());
        p.enhanced_location = lat.map(|lat| GeoPoint::new(lat, -90.0));
        p.ratings.quality_of_care = Some(3.0);
        p
    }

    #[test]
    fn test_indexes_and_dedup() {
        let dataset = Dataset::from_records(
            vec![
                provider("000002", "ms", Some(32.0)),
                provider("000001", "MS", None),
                provider("000001", "MS", None),
            ],
            Vec::new(),
        );
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get_by_state("Ms").len(), 2);
        assert!(dataset.get_by_ccn(&Ccn::new("1").unwrap()).is_some());
        // derived from the single rating
        assert_eq!(dataset.provider_records()[0].composite_quality_score, Some(3.0));
    }

    #[test]
    fn test_providers_near_matches_default_impl() {
        let dataset = Dataset::from_records(
            (0..30)
                .map(|i| provider(&format!("{:06}", i), "MS", Some(30.0 + i as f64 * 0.1)))
                .collect(),
            Vec::new(),
        );
        let center = GeoPoint::new(31.0, -90.0);
        let indexed = dataset.providers_near(center, 40.0).unwrap();
        let linear = crate::repository::rank_within(dataset.providers().unwrap(), center, 40.0);
        assert_eq!(indexed, linear);
        assert!(indexed.windows(2).all(|w| w[0].distance_miles <= w[1].distance_miles));
    }

    #[test]
    fn test_statistics() {
        let mut zip = ZipDemographic::new(ZipCode::new("39201").unwrap());
        zip.location = Some(GeoPoint::new(32.3, -90.2));
        zip.is_rural = Some(true);
        let dataset = Dataset::from_records(
            vec![provider("000001", "MS", Some(32.0)), provider("000002", "AL", None)],
            vec![zip, ZipDemographic::new(ZipCode::new("39202").unwrap())],
        );
        let stats = dataset.statistics();
        assert_eq!(stats.total_providers, 2);
        assert_eq!(stats.providers_with_enhanced_coordinates, 1);
        assert_eq!(stats.states_represented, 2);
        assert_eq!(stats.zip_records, 2);
        assert_eq!(stats.zip_records_with_coordinates, 1);
        assert_eq!(stats.rural_zip_records, 1);
    }

    #[test]
    fn test_state_snapshot_keeps_population_wide_quality_flags() {
        use rusqlite::{params, Connection};

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("hh.db");
        let conn = Connection::open(&path).unwrap();
        crate::schema::create_schema(&conn).unwrap();
        let insert = |ccn: &str, state: &str, score: f64| {
            conn.execute(
                "INSERT INTO providers (ccn, state, composite_quality_score) VALUES (?1, ?2, ?3)",
                params![ccn, state, score],
            )
            .unwrap();
        };
        for i in 1..=9 {
            insert(&format!("4500{:02}", i), "TX", 5.0);
        }
        insert("250001", "MS", 2.0);
        insert("250002", "MS", 2.5);
        insert("250003", "MS", 3.0);
        conn.execute(
            "INSERT INTO service_areas (ccn, zip_code) VALUES ('250003', '39201'), ('450001', '78701')",
            [],
        )
        .unwrap();
        drop(conn);

        let ccn = Ccn::new("250003").unwrap();
        let full = Dataset::load(&path).unwrap();
        let state = DatasetBuilder::new().database(&path).state("ms").build().unwrap();

        assert_eq!(full.get_by_ccn(&ccn).unwrap().is_high_quality, Some(false));
        assert_eq!(state.get_by_ccn(&ccn).unwrap().is_high_quality, Some(false));
        assert_eq!(state.len(), 3);
        assert_eq!(state.service_area(&ccn).unwrap(), vec![ZipCode::new("39201").unwrap()]);
        assert_eq!(state.service_area_links().unwrap().len(), 1);
    }

    #[test]
    fn test_service_area_links_dedup() {
        let ccn = Ccn::new("000001").unwrap();
        let zip = ZipCode::new("39201").unwrap();
        let dataset = Dataset::from_records(vec![provider("000001", "MS", None)], Vec::new())
            .with_service_areas(vec![(ccn.clone(), zip.clone()), (ccn.clone(), zip.clone())]);
        assert_eq!(dataset.service_area(&ccn).unwrap(), vec![zip]);
        assert!(dataset.service_area(&Ccn::new("000002").unwrap()).unwrap().is_empty());
    }
}
