/*!
 * Schema definitions for the home health database
 *
 * Column catalogues for the `providers` and `zip_county_crosswalk` tables as
 * produced by the ingestion pipeline. Only the key column of each table is
 * required; every enrichment column may be absent and is then read as NULL.
 */

use rusqlite::Connection;
use tracing::debug;

use crate::error::{HomeHealthError, Result};

/// Provider table schema
pub struct ProviderSchema;

impl ProviderSchema {
    pub const TABLE: &'static str = "providers";

    /// All columns the repository reads, in select order
    pub fn column_names() -> Vec<&'static str> {
        vec![
            // Identity and contact
            "ccn",
            "provider_name",
            "address",
            "city",
            "state",
            "zip_code",
            "phone",
            "ownership_type",
            "certification_date",

            // Services
            "offers_nursing",
            "offers_physical_therapy",
            "offers_occupational_therapy",
            "offers_speech_pathology",
            "offers_medical_social",
            "offers_home_health_aide",

            // Quality and volume
            "quality_care_star_rating",
            "hhcahps_star_rating",
            "composite_quality_score",
            "is_high_quality",
            "number_completed_surveys",
            "survey_response_rate",
            "estimated_total_patients",
            "unique_zips_served",

            // Original geography
            "county",
            "latitude",
            "longitude",

            // Crosswalk enrichment
            "x_county",
            "x_county_fips",
            "x_latitude",
            "x_longitude",
            "x_cbsa_name",
            "x_cbsa_code",
            "x_metro_type",
            "x_rucc_code",
            "x_rucc_category",
            "x_rucc_subcategory",
            "x_rucc_description",
            "x_density_category",
            "x_density_description",
            "x_is_rural",
            "x_is_frontier",
        ]
    }

    pub fn required_columns() -> &'static [&'static str] {
        &["ccn"]
    }
}

/// ZIP/county crosswalk table schema
pub struct ZipCrosswalkSchema;

impl ZipCrosswalkSchema {
    pub const TABLE: &'static str = "zip_county_crosswalk";

    pub fn column_names() -> Vec<&'static str> {
        vec![
            "zip_code",
            "city",
            "state_abbr",
            "primary_county_name",
            "county_fips",
            "cbsa_code",
            "cbsa_name",
            "latitude",
            "longitude",
            "population",
            "medicare_eligibles",
            "medicare_enrolled",
            "medicare_penetration_pct",
            "is_rural",
            "is_frontier",
            "rucc_code",
            "rucc_description",
            "density_category",
        ]
    }

    pub fn required_columns() -> &'static [&'static str] {
        &["zip_code"]
    }
}

/// Provider-to-ZIP service area table; optional in a database
pub struct ServiceAreaSchema;

impl ServiceAreaSchema {
    pub const TABLE: &'static str = "service_areas";

    pub fn required_columns() -> &'static [&'static str] {
        &["ccn", "zip_code"]
    }
}

/// Columns actually present in a table, as reported by `PRAGMA table_info`
#[derive(Debug, Clone, Default)]
pub struct TableColumns {
    table: String,
    present: Vec<String>,
}

impl TableColumns {
    /// Read the column list of `table`; an absent table yields no columns
    pub fn detect(connection: &Connection, table: &str) -> Result<Self> {
        let pragma = format!("PRAGMA table_info('{table}')");
        let mut stmt = connection.prepare(&pragma)?;
        let mut rows = stmt.query([])?;

        let mut present = Vec::new();
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            present.push(name);
        }

        debug!(table, columns = present.len(), "detected table columns");
        Ok(TableColumns {
            table: table.to_string(),
            present,
        })
    }

    /// Whether the table exists at all
    pub fn is_present(&self) -> bool {
        !self.present.is_empty()
    }

    pub fn has(&self, column: &str) -> bool {
        self.present
            .iter()
            .any(|present| present.eq_ignore_ascii_case(column))
    }

    /// Fail when any required column is missing
    pub fn validate(&self, required: &[&str]) -> Result<()> {
        let missing: Vec<String> = required
            .iter()
            .filter(|column| !self.has(column))
            .map(|column| column.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(HomeHealthError::SchemaMismatch {
                table: self.table.clone(),
                missing,
            })
        }
    }

    /// Build a select list over `wanted`, substituting `NULL AS col` for
    /// columns this table lacks
    pub fn select_list(&self, wanted: &[&str]) -> String {
        wanted
            .iter()
            .map(|column| {
                if self.has(column) {
                    column.to_string()
                } else {
                    format!("NULL AS {column}")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn missing_optional(&self, wanted: &[&str]) -> Vec<String> {
        wanted
            .iter()
            .filter(|column| !self.has(column))
            .map(|column| column.to_string())
            .collect()
    }
}

/// Create every table with the full column set.
///
/// The ingestion pipeline owns the production database; this DDL exists for
/// fixtures and local experiments.
pub fn create_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS providers (
            ccn TEXT PRIMARY KEY,
            provider_name TEXT,
            address TEXT,
            city TEXT,
            state TEXT,
            zip_code TEXT,
            phone TEXT,
            ownership_type TEXT,
            certification_date TEXT,
            offers_nursing INTEGER,
            offers_physical_therapy INTEGER,
            offers_occupational_therapy INTEGER,
            offers_speech_pathology INTEGER,
            offers_medical_social INTEGER,
            offers_home_health_aide INTEGER,
            quality_care_star_rating REAL,
            hhcahps_star_rating REAL,
            composite_quality_score REAL,
            is_high_quality INTEGER,
            number_completed_surveys INTEGER,
            survey_response_rate REAL,
            estimated_total_patients REAL,
            unique_zips_served INTEGER,
            county TEXT,
            latitude REAL,
            longitude REAL,
            x_county TEXT,
            x_county_fips TEXT,
            x_latitude REAL,
            x_longitude REAL,
            x_cbsa_name TEXT,
            x_cbsa_code TEXT,
            x_metro_type TEXT,
            x_rucc_code INTEGER,
            x_rucc_category TEXT,
            x_rucc_subcategory TEXT,
            x_rucc_description TEXT,
            x_density_category TEXT,
            x_density_description TEXT,
            x_is_rural INTEGER,
            x_is_frontier INTEGER
        );
        CREATE TABLE IF NOT EXISTS zip_county_crosswalk (
            zip_code TEXT PRIMARY KEY,
            city TEXT,
            state_abbr TEXT,
            primary_county_name TEXT,
            county_fips TEXT,
            cbsa_code TEXT,
            cbsa_name TEXT,
            latitude REAL,
            longitude REAL,
            population INTEGER,
            medicare_eligibles INTEGER,
            medicare_enrolled INTEGER,
            medicare_penetration_pct REAL,
            is_rural INTEGER,
            is_frontier INTEGER,
            rucc_code INTEGER,
            rucc_description TEXT,
            density_category TEXT
        );
        CREATE TABLE IF NOT EXISTS service_areas (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            ccn TEXT,
            zip_code TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_service_areas_ccn ON service_areas(ccn);
        CREATE INDEX IF NOT EXISTS idx_providers_state ON providers(state);
        CREATE INDEX IF NOT EXISTS idx_providers_x_latitude ON providers(x_latitude);
        CREATE INDEX IF NOT EXISTS idx_zip_state ON zip_county_crosswalk(state_abbr);",
    )?;
    Ok(())
}
