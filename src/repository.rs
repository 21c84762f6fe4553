/*!
 * Read-only access to provider and ZIP reference data
 *
 * [`Repository`] is the seam every analysis runs against. [`SqliteRepository`]
 * reads the production database; [`crate::dataset::Dataset`] and
 * [`crate::cache::CachedRepository`] provide in-memory and memoised variants.
 */

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, OpenFlags, Row};
use tracing::{debug, info, warn};

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::geo;
use crate::quality;
use crate::schema::{ProviderSchema, ServiceAreaSchema, TableColumns, ZipCrosswalkSchema};

/// Bound parameters per `IN (...)` batch, well under SQLite's variable limit
const IN_BATCH: usize = 400;

/// Filter over the ZIP crosswalk used to pick desert candidates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ZipCriteria {
    /// Minimum Medicare-eligible population (inclusive)
    pub min_medicare_population: u64,
    /// Two-letter state, compared case-insensitively
    pub state_filter: Option<String>,
    pub rural_only: bool,
}

impl ZipCriteria {
    pub fn new(min_medicare_population: u64) -> Self {
        ZipCriteria {
            min_medicare_population,
            state_filter: None,
            rural_only: false,
        }
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        let state = state.into().trim().to_ascii_uppercase();
        self.state_filter = if state.is_empty() { None } else { Some(state) };
        self
    }

    pub fn rural_only(mut self, rural_only: bool) -> Self {
        self.rural_only = rural_only;
        self
    }

    /// Whether a record satisfies every criterion, including having coordinates
    pub fn matches(&self, record: &ZipDemographic) -> bool {
        if record.location.is_none() {
            return false;
        }
        match record.medicare_eligible {
            Some(eligible) if eligible >= self.min_medicare_population => {}
            _ => return false,
        }
        if let Some(state) = &self.state_filter {
            let in_state = record
                .state
                .as_deref()
                .map(|s| s.trim().eq_ignore_ascii_case(state))
                .unwrap_or(false);
            if !in_state {
                return false;
            }
        }
        !self.rural_only || record.rural()
    }
}

/// Read-only accessor over providers and ZIP demographics.
///
/// Unknown keys yield `None` or an empty list; errors are reserved for
/// storage failures.
pub trait Repository: Send + Sync {
    /// Every provider, ordered by CCN
    fn providers(&self) -> Result<Vec<Provider>>;

    fn provider(&self, ccn: &Ccn) -> Result<Option<Provider>>;

    /// Providers with finite enhanced coordinates, ordered by CCN
    fn providers_with_coordinates(&self) -> Result<Vec<Provider>> {
        Ok(self
            .providers()?
            .into_iter()
            .filter(|p| p.enhanced_location.is_some())
            .collect())
    }

    /// Providers within `radius_miles` (inclusive) of `point`, nearest first
    fn providers_near(&self, point: GeoPoint, radius_miles: f64) -> Result<Vec<ProviderDistance>> {
        let providers = self.providers_with_coordinates()?;
        Ok(rank_within(providers, point, radius_miles))
    }

    /// Every ZIP record, ordered by ZIP code
    fn zip_records(&self) -> Result<Vec<ZipDemographic>>;

    fn zip_record(&self, zip: &ZipCode) -> Result<Option<ZipDemographic>>;

    /// Records for the given codes; duplicates collapse and unknown codes are skipped
    fn zip_records_for(&self, zips: &[ZipCode]) -> Result<Vec<ZipDemographic>> {
        let unique: BTreeSet<&ZipCode> = zips.iter().collect();
        let mut records = Vec::with_capacity(unique.len());
        for zip in unique {
            if let Some(record) = self.zip_record(zip)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Records satisfying `criteria`, ordered by ZIP code
    fn zip_records_matching(&self, criteria: &ZipCriteria) -> Result<Vec<ZipDemographic>> {
        Ok(self
            .zip_records()?
            .into_iter()
            .filter(|record| criteria.matches(record))
            .collect())
    }

    /// Every (provider, served ZIP) link, ordered; empty when the source has
    /// no service area data
    fn service_area_links(&self) -> Result<Vec<(Ccn, ZipCode)>> {
        Ok(Vec::new())
    }

    /// ZIP codes a provider reports serving, ordered and unique
    fn service_area(&self, ccn: &Ccn) -> Result<Vec<ZipCode>> {
        let mut zips: Vec<ZipCode> = self
            .service_area_links()?
            .into_iter()
            .filter(|(linked, _)| linked == ccn)
            .map(|(_, zip)| zip)
            .collect();
        zips.sort();
        zips.dedup();
        Ok(zips)
    }
}

/// Keep providers whose enhanced location lies within the radius, nearest
/// first with ties broken by CCN
pub(crate) fn rank_within(
    providers: impl IntoIterator<Item = Provider>,
    point: GeoPoint,
    radius_miles: f64,
) -> Vec<ProviderDistance> {
    let mut ranked: Vec<ProviderDistance> = providers
        .into_iter()
        .filter_map(|provider| {
            let location = provider.enhanced_location?;
            let distance_miles = point.distance_to(&location);
            (distance_miles <= radius_miles).then_some(ProviderDistance {
                provider,
                distance_miles,
            })
        })
        .collect();
    sort_by_distance(&mut ranked);
    ranked
}

pub(crate) fn sort_by_distance(ranked: &mut [ProviderDistance]) {
    ranked.sort_by(|a, b| {
        a.distance_miles
            .total_cmp(&b.distance_miles)
            .then_with(|| a.provider.ccn.cmp(&b.provider.ccn))
    });
}

/// SQLite-backed repository.
///
/// Each call opens its own read-only connection. Column availability is
/// detected once at open time; absent optional columns read as NULL.
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    path: PathBuf,
    provider_columns: TableColumns,
    zip_columns: TableColumns,
    service_columns: TableColumns,
}

impl SqliteRepository {
    /// Open a database, validating that both tables carry their key column
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(HomeHealthError::database_not_found(path));
        }

        let connection = Self::connect_to(&path)?;
        let provider_columns = TableColumns::detect(&connection, ProviderSchema::TABLE)?;
        provider_columns.validate(ProviderSchema::required_columns())?;
        let zip_columns = TableColumns::detect(&connection, ZipCrosswalkSchema::TABLE)?;
        zip_columns.validate(ZipCrosswalkSchema::required_columns())?;

        let missing_provider = provider_columns.missing_optional(&ProviderSchema::column_names());
        if !missing_provider.is_empty() {
            warn!(table = ProviderSchema::TABLE, missing = ?missing_provider, "optional columns absent, reading as NULL");
        }
        let missing_zip = zip_columns.missing_optional(&ZipCrosswalkSchema::column_names());
        if !missing_zip.is_empty() {
            warn!(table = ZipCrosswalkSchema::TABLE, missing = ?missing_zip, "optional columns absent, reading as NULL");
        }

        let service_columns = TableColumns::detect(&connection, ServiceAreaSchema::TABLE)?;
        if service_columns.is_present() {
            service_columns.validate(ServiceAreaSchema::required_columns())?;
        } else {
            debug!(table = ServiceAreaSchema::TABLE, "no service area table");
        }

        info!(path = %path.display(), "opened home health database");
        Ok(SqliteRepository {
            path,
            provider_columns,
            zip_columns,
            service_columns,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect_to(path: &Path) -> Result<Connection> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(connection)
    }

    fn connect(&self) -> Result<Connection> {
        Self::connect_to(&self.path)
    }

    /// Providers subquery with every catalogued column, so predicates can
    /// reference optional columns whether or not the table has them
    fn provider_source(&self) -> String {
        format!(
            "(SELECT {} FROM {})",
            self.provider_columns.select_list(&ProviderSchema::column_names()),
            ProviderSchema::TABLE
        )
    }

    fn zip_source(&self) -> String {
        format!(
            "(SELECT {} FROM {})",
            self.zip_columns.select_list(&ZipCrosswalkSchema::column_names()),
            ZipCrosswalkSchema::TABLE
        )
    }

    fn query_providers<P: rusqlite::Params>(&self, predicate: &str, params: P) -> Result<Vec<Provider>> {
        let connection = self.connect()?;
        let sql = format!("SELECT * FROM {} WHERE {}", self.provider_source(), predicate);
        debug!(%sql, "querying providers");

        let mut stmt = connection.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_provider)?;

        let mut providers = Vec::new();
        let mut skipped = 0usize;
        for row in rows {
            match row? {
                Some(provider) => providers.push(provider),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped provider rows with malformed CCN");
        }
        providers.sort_by(|a, b| a.ccn.cmp(&b.ccn));
        debug!(count = providers.len(), "loaded providers");
        Ok(providers)
    }

    fn query_zip_records<P: rusqlite::Params>(&self, predicate: &str, params: P) -> Result<Vec<ZipDemographic>> {
        let connection = self.connect()?;
        let sql = format!("SELECT * FROM {} WHERE {}", self.zip_source(), predicate);
        debug!(%sql, "querying zip records");

        let mut stmt = connection.prepare(&sql)?;
        let rows = stmt.query_map(params, row_to_zip)?;

        let mut records = Vec::new();
        let mut skipped = 0usize;
        for row in rows {
            match row? {
                Some(record) => records.push(record),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped zip rows with malformed ZIP code");
        }
        records.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        records.dedup_by(|a, b| a.zip_code == b.zip_code);
        debug!(count = records.len(), "loaded zip records");
        Ok(records)
    }
}

impl SqliteRepository {
    fn query_service_areas<P: rusqlite::Params>(&self, predicate: &str, params: P) -> Result<Vec<(Ccn, ZipCode)>> {
        let connection = self.connect()?;
        let sql = format!(
            "SELECT ccn, zip_code FROM {} WHERE {}",
            ServiceAreaSchema::TABLE,
            predicate
        );
        debug!(%sql, "querying service areas");

        let mut stmt = connection.prepare(&sql)?;
        let rows = stmt.query_map(params, |row| {
            let ccn = read_text(row, "ccn")?.and_then(|raw| Ccn::new(&raw).ok());
            let zip = read_zip(row, "zip_code")?;
            Ok(ccn.zip(zip))
        })?;

        let mut links = Vec::new();
        for row in rows {
            if let Some(link) = row? {
                links.push(link);
            }
        }
        links.sort();
        links.dedup();
        Ok(links)
    }
}

impl Repository for SqliteRepository {
    fn providers(&self) -> Result<Vec<Provider>> {
        self.query_providers("1 = 1", [])
    }

    fn provider(&self, ccn: &Ccn) -> Result<Option<Provider>> {
        // Some extracts store CCNs as integers, dropping leading zeros
        let unpadded = ccn.as_str().trim_start_matches('0');
        let found = self.query_providers(
            "ccn = ?1 OR CAST(ccn AS TEXT) = ?2",
            rusqlite::params![ccn.as_str(), unpadded],
        )?;
        Ok(found.into_iter().find(|p| &p.ccn == ccn))
    }

    fn providers_with_coordinates(&self) -> Result<Vec<Provider>> {
        let providers = self.query_providers(
            "x_latitude IS NOT NULL AND x_longitude IS NOT NULL",
            [],
        )?;
        Ok(providers
            .into_iter()
            .filter(|p| p.enhanced_location.is_some())
            .collect())
    }

    fn providers_near(&self, point: GeoPoint, radius_miles: f64) -> Result<Vec<ProviderDistance>> {
        if radius_miles.is_nan() || radius_miles < 0.0 {
            return Ok(Vec::new());
        }
        let band = geo::latitude_band_degrees(radius_miles);
        let candidates = self.query_providers(
            "x_latitude IS NOT NULL AND x_longitude IS NOT NULL \
             AND x_latitude BETWEEN ?1 AND ?2",
            rusqlite::params![point.latitude - band, point.latitude + band],
        )?;
        Ok(rank_within(candidates, point, radius_miles))
    }

    fn zip_records(&self) -> Result<Vec<ZipDemographic>> {
        self.query_zip_records("1 = 1", [])
    }

    fn zip_record(&self, zip: &ZipCode) -> Result<Option<ZipDemographic>> {
        let numeric: i64 = zip.as_str().parse().unwrap_or(-1);
        let found = self.query_zip_records(
            "zip_code = ?1 OR zip_code = ?2",
            rusqlite::params![zip.as_str(), numeric],
        )?;
        Ok(found.into_iter().find(|r| &r.zip_code == zip))
    }

    fn zip_records_for(&self, zips: &[ZipCode]) -> Result<Vec<ZipDemographic>> {
        let wanted: BTreeSet<&ZipCode> = zips.iter().collect();
        let unique: Vec<&ZipCode> = wanted.iter().copied().collect();

        let mut records = Vec::with_capacity(unique.len());
        for batch in unique.chunks(IN_BATCH) {
            // Match codes stored as text or as integers without leading zeros
            let mut values: Vec<Value> = batch.iter().map(|zip| Value::Text(zip.as_str().to_string())).collect();
            values.extend(
                batch
                    .iter()
                    .filter_map(|zip| zip.as_str().parse::<i64>().ok())
                    .map(Value::Integer),
            );
            let placeholders = vec!["?"; values.len()].join(", ");
            let predicate = format!("zip_code IN ({placeholders})");
            records.extend(self.query_zip_records(&predicate, rusqlite::params_from_iter(values))?);
        }

        records.retain(|record| wanted.contains(&record.zip_code));
        records.sort_by(|a, b| a.zip_code.cmp(&b.zip_code));
        records.dedup_by(|a, b| a.zip_code == b.zip_code);
        Ok(records)
    }

    fn service_area_links(&self) -> Result<Vec<(Ccn, ZipCode)>> {
        if !self.service_columns.is_present() {
            return Ok(Vec::new());
        }
        self.query_service_areas("1 = 1", [])
    }

    fn service_area(&self, ccn: &Ccn) -> Result<Vec<ZipCode>> {
        if !self.service_columns.is_present() {
            return Ok(Vec::new());
        }
        let unpadded = ccn.as_str().trim_start_matches('0');
        let links = self.query_service_areas(
            "ccn = ?1 OR CAST(ccn AS TEXT) = ?2",
            rusqlite::params![ccn.as_str(), unpadded],
        )?;
        Ok(links
            .into_iter()
            .filter(|(linked, _)| linked == ccn)
            .map(|(_, zip)| zip)
            .collect())
    }

    fn zip_records_matching(&self, criteria: &ZipCriteria) -> Result<Vec<ZipDemographic>> {
        let records = self.query_zip_records(
            "medicare_eligibles >= ?1 \
             AND (?2 IS NULL OR UPPER(TRIM(state_abbr)) = UPPER(?2)) \
             AND latitude IS NOT NULL AND longitude IS NOT NULL",
            rusqlite::params![
                criteria.min_medicare_population as i64,
                criteria.state_filter.as_deref()
            ],
        )?;
        Ok(records
            .into_iter()
            .filter(|record| criteria.matches(record))
            .collect())
    }
}

fn row_to_provider(row: &Row<'_>) -> rusqlite::Result<Option<Provider>> {
    let ccn = match read_text(row, "ccn")?.and_then(|raw| Ccn::new(&raw).ok()) {
        Some(ccn) => ccn,
        None => return Ok(None),
    };

    let ratings = StarRatings {
        quality_of_care: read_real(row, "quality_care_star_rating")?,
        patient_survey: read_real(row, "hhcahps_star_rating")?,
    };
    let completed_surveys = read_count(row, "number_completed_surveys")?.map(|n| n.min(u32::MAX as u64) as u32);
    let survey_response_rate = read_real(row, "survey_response_rate")?;

    let composite_quality_score = read_real(row, "composite_quality_score")?
        .or_else(|| quality::composite_quality_score(&ratings));
    let estimated_total_patients = read_real(row, "estimated_total_patients")?
        .filter(|p| *p >= 0.0)
        .or_else(|| quality::estimated_total_patients(completed_surveys, survey_response_rate));

    Ok(Some(Provider {
        ccn,
        name: read_text(row, "provider_name")?,
        address: read_text(row, "address")?,
        city: read_text(row, "city")?,
        state: read_text(row, "state")?.map(|s| s.to_ascii_uppercase()),
        zip_code: read_zip(row, "zip_code")?,
        phone: read_text(row, "phone")?,
        ownership_type: read_text(row, "ownership_type")?,
        certification_date: read_text(row, "certification_date")?.and_then(|raw| parse_date(&raw)),
        services: ServiceOfferings {
            nursing: read_flag(row, "offers_nursing")?.unwrap_or(false),
            physical_therapy: read_flag(row, "offers_physical_therapy")?.unwrap_or(false),
            occupational_therapy: read_flag(row, "offers_occupational_therapy")?.unwrap_or(false),
            speech_pathology: read_flag(row, "offers_speech_pathology")?.unwrap_or(false),
            medical_social: read_flag(row, "offers_medical_social")?.unwrap_or(false),
            home_health_aide: read_flag(row, "offers_home_health_aide")?.unwrap_or(false),
        },
        ratings,
        composite_quality_score,
        is_high_quality: read_flag(row, "is_high_quality")?,
        completed_surveys,
        survey_response_rate,
        estimated_total_patients,
        unique_zips_served: read_count(row, "unique_zips_served")?.map(|n| n.min(u32::MAX as u64) as u32),
        location: GeoPoint::from_parts(read_real(row, "latitude")?, read_real(row, "longitude")?),
        enhanced_location: GeoPoint::from_parts(read_real(row, "x_latitude")?, read_real(row, "x_longitude")?),
        geography: GeographyEnrichment {
            county: read_text(row, "county")?,
            enhanced_county: read_text(row, "x_county")?,
            county_fips: read_text(row, "x_county_fips")?,
            cbsa_name: read_text(row, "x_cbsa_name")?,
            cbsa_code: read_text(row, "x_cbsa_code")?,
            metro_type: read_text(row, "x_metro_type")?,
            rucc_code: read_int(row, "x_rucc_code")?,
            rucc_category: read_text(row, "x_rucc_category")?,
            rucc_subcategory: read_text(row, "x_rucc_subcategory")?,
            rucc_description: read_text(row, "x_rucc_description")?,
            density_category: read_text(row, "x_density_category")?,
            density_description: read_text(row, "x_density_description")?,
            is_rural: read_flag(row, "x_is_rural")?,
            is_frontier: read_flag(row, "x_is_frontier")?,
        },
    }))
}

fn row_to_zip(row: &Row<'_>) -> rusqlite::Result<Option<ZipDemographic>> {
    let zip_code = match read_zip(row, "zip_code")? {
        Some(zip) => zip,
        None => return Ok(None),
    };

    Ok(Some(ZipDemographic {
        zip_code,
        city: read_text(row, "city")?,
        state: read_text(row, "state_abbr")?.map(|s| s.to_ascii_uppercase()),
        county: read_text(row, "primary_county_name")?,
        county_fips: read_text(row, "county_fips")?,
        cbsa_code: read_text(row, "cbsa_code")?,
        cbsa_name: read_text(row, "cbsa_name")?,
        location: GeoPoint::from_parts(read_real(row, "latitude")?, read_real(row, "longitude")?),
        population: read_count(row, "population")?,
        medicare_eligible: read_count(row, "medicare_eligibles")?,
        medicare_enrolled: read_count(row, "medicare_enrolled")?,
        medicare_penetration_pct: read_real(row, "medicare_penetration_pct")?,
        is_rural: read_flag(row, "is_rural")?,
        is_frontier: read_flag(row, "is_frontier")?,
        rucc_code: read_int(row, "rucc_code")?,
        rucc_description: read_text(row, "rucc_description")?,
        density_category: read_text(row, "density_category")?,
    }))
}

// Lenient column readers: ETL output mixes integer, real and text storage.

fn read_text(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(column)? {
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

fn read_real(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<f64>> {
    let value = match row.get_ref(column)? {
        ValueRef::Integer(i) => Some(i as f64),
        ValueRef::Real(f) => Some(f),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).trim().parse::<f64>().ok(),
        ValueRef::Null | ValueRef::Blob(_) => None,
    };
    Ok(value.filter(|v| v.is_finite()))
}

fn read_int(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(column)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|f| f.fract() == 0.0).map(|f| f as i64))
        }
        _ => None,
    })
}

/// Non-negative count; negative stored values are treated as unknown
fn read_count(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<u64>> {
    Ok(read_real(row, column)?
        .filter(|v| *v >= 0.0)
        .map(|v| v.round() as u64))
}

fn read_flag(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<bool>> {
    Ok(match row.get_ref(column)? {
        ValueRef::Integer(i) => Some(i != 0),
        ValueRef::Real(f) => Some(f != 0.0),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes).trim().to_ascii_lowercase();
            match text.as_str() {
                "1" | "true" | "t" | "yes" | "y" => Some(true),
                "0" | "false" | "f" | "no" | "n" => Some(false),
                _ => None,
            }
        }
        _ => None,
    })
}

/// ZIP codes stored as integers or as ZIP+4 text are normalised to 5 digits
fn read_zip(row: &Row<'_>, column: &str) -> rusqlite::Result<Option<ZipCode>> {
    Ok(match row.get_ref(column)? {
        ValueRef::Integer(i) => ZipCode::from_number(i).ok(),
        ValueRef::Real(f) if f.is_finite() && f.fract() == 0.0 => ZipCode::from_number(f as i64).ok(),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            let text = text.trim();
            let five = text.split('-').next().unwrap_or(text);
            if five.len() < 5 && !five.is_empty() && five.chars().all(|c| c.is_ascii_digit()) {
                ZipCode::new(&format!("{five:0>5}")).ok()
            } else {
                ZipCode::new(five).ok()
            }
        }
        _ => None,
    })
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw.split(|c: char| c == 'T' || c == ' ').next().unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_part, "%m/%d/%Y"))
        .ok()
}
