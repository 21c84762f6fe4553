//! Temporary SQLite databases for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use homehealth::schema::create_schema;
use rusqlite::{params, Connection};
use tempfile::TempDir;

/// A database file that lives as long as the value
pub struct TestDb {
    _dir: TempDir,
    path: PathBuf,
    conn: Connection,
}

/// One `providers` row; unset fields stay NULL
#[derive(Default)]
pub struct ProviderRow<'a> {
    pub ccn: &'a str,
    pub name: Option<&'a str>,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub zip_code: Option<&'a str>,
    pub county: Option<&'a str>,
    pub quality_star: Option<f64>,
    pub survey_star: Option<f64>,
    pub completed_surveys: Option<i64>,
    pub response_rate: Option<f64>,
    /// Crosswalk (enhanced) coordinates
    pub location: Option<(f64, f64)>,
    /// Coordinates reported with the provider record
    pub original_location: Option<(f64, f64)>,
}

/// One `zip_county_crosswalk` row
#[derive(Default)]
pub struct ZipRow<'a> {
    pub zip_code: &'a str,
    pub city: Option<&'a str>,
    pub state: Option<&'a str>,
    pub county: Option<&'a str>,
    pub location: Option<(f64, f64)>,
    pub population: Option<i64>,
    pub eligible: Option<i64>,
    pub enrolled: Option<i64>,
    pub penetration: Option<f64>,
    pub rural: Option<bool>,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cms_homehealth.db");
        let conn = Connection::open(&path).unwrap();
        create_schema(&conn).unwrap();
        TestDb { _dir: dir, path, conn }
    }

    /// Tables created from raw DDL instead of the full schema
    pub fn with_ddl(ddl: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("partial.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(ddl).unwrap();
        TestDb { _dir: dir, path, conn }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn execute(&self, sql: &str) {
        self.conn.execute_batch(sql).unwrap();
    }

    pub fn provider(&self, row: ProviderRow<'_>) -> &Self {
        self.conn
            .execute(
                "INSERT INTO providers (ccn, provider_name, city, state, zip_code, x_county, \
                    quality_care_star_rating, hhcahps_star_rating, number_completed_surveys, \
                    survey_response_rate, x_latitude, x_longitude, latitude, longitude) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    row.ccn,
                    row.name,
                    row.city,
                    row.state,
                    row.zip_code,
                    row.county,
                    row.quality_star,
                    row.survey_star,
                    row.completed_surveys,
                    row.response_rate,
                    row.location.map(|l| l.0),
                    row.location.map(|l| l.1),
                    row.original_location.map(|l| l.0),
                    row.original_location.map(|l| l.1),
                ],
            )
            .unwrap();
        self
    }

    pub fn zip(&self, row: ZipRow<'_>) -> &Self {
        self.conn
            .execute(
                "INSERT INTO zip_county_crosswalk (zip_code, city, state_abbr, primary_county_name, \
                    latitude, longitude, population, medicare_eligibles, medicare_enrolled, \
                    medicare_penetration_pct, is_rural) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    row.zip_code,
                    row.city,
                    row.state,
                    row.county,
                    row.location.map(|l| l.0),
                    row.location.map(|l| l.1),
                    row.population,
                    row.eligible,
                    row.enrolled,
                    row.penetration,
                    row.rural,
                ],
            )
            .unwrap();
        self
    }
}

pub fn located_provider<'a>(ccn: &'a str, state: &'a str, zip: &'a str, lat: f64, lon: f64) -> ProviderRow<'a> {
    ProviderRow {
        ccn,
        state: Some(state),
        zip_code: Some(zip),
        location: Some((lat, lon)),
        ..Default::default()
    }
}

pub fn demand_zip<'a>(zip: &'a str, state: &'a str, lat: f64, lon: f64, eligible: i64, enrolled: i64) -> ZipRow<'a> {
    ZipRow {
        zip_code: zip,
        state: Some(state),
        location: Some((lat, lon)),
        eligible: Some(eligible),
        enrolled: Some(enrolled),
        ..Default::default()
    }
}

pub fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}
