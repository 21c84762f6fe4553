//! Service areas of a single provider.
//!
//! Coverage reads the ZIP codes an agency reports serving and resolves them
//! through the crosswalk. Gap analysis looks the other way: ZIPs in the
//! agency's state, within driving range, where few agencies are registered.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::repository::{Repository, ZipCriteria};

pub const GAP_RADIUS_MILES: f64 = 100.0;
/// ZIPs need strictly more eligible beneficiaries than this to count
pub const GAP_MIN_MEDICARE_ELIGIBLE: u64 = 100;
/// Most agencies registered in a ZIP for it to still count as a gap
pub const GAP_MAX_PROVIDERS: usize = 2;
/// Nearest candidates kept before scoring
pub const GAP_CANDIDATE_LIMIT: usize = 50;
pub const GAP_TOP_OPPORTUNITIES: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HomeBase {
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub zip_code: Option<ZipCode>,
}

impl From<&Provider> for HomeBase {
    fn from(provider: &Provider) -> Self {
        HomeBase {
            city: provider.city.clone(),
            state: provider.state.clone(),
            county: provider.county_name().map(str::to_string),
            zip_code: provider.zip_code.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total_zip_codes: usize,
    pub total_cities: usize,
    pub total_states: usize,
    pub total_counties: usize,
    /// Served ZIPs missing from the crosswalk
    pub unmatched_zip_codes: usize,
    pub total_medicare_eligible: u64,
    pub total_medicare_enrolled: u64,
}

/// ZIP codes an agency reports serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAreaCoverage {
    pub ccn: Ccn,
    pub provider_name: Option<String>,
    pub home_base: HomeBase,
    pub coverage_stats: CoverageStats,
    pub zip_codes_served: Vec<ZipCode>,
}

/// An under-covered ZIP within reach of the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAreaGap {
    pub zip_code: ZipCode,
    pub city: Option<String>,
    pub county: Option<String>,
    pub state: Option<String>,
    pub population: Option<u64>,
    pub medicare_eligible: Option<u64>,
    pub medicare_enrolled: Option<u64>,
    /// Agencies whose registered ZIP is this one
    pub provider_count: usize,
    pub distance_miles: f64,
    pub opportunity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapSummary {
    pub total_gap_areas: usize,
    pub total_medicare_eligible: u64,
    pub total_medicare_enrolled: u64,
    pub average_distance_miles: f64,
    pub underserved_population: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAreaGapReport {
    pub ccn: Ccn,
    pub provider_name: Option<String>,
    pub home_base: HomeBase,
    pub summary: GapSummary,
    /// Best opportunity score first
    pub top_opportunities: Vec<ServiceAreaGap>,
    /// Nearest first
    pub gap_areas: Vec<ServiceAreaGap>,
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Weighted demand, proximity and scarcity; unknown enrollment counts as zero
pub fn gap_opportunity_score(eligible: u64, enrolled: Option<u64>, distance_miles: f64, provider_count: usize) -> f64 {
    eligible as f64 * 0.4
        + enrolled.unwrap_or(0) as f64 * 0.4
        + (GAP_RADIUS_MILES - distance_miles) * 0.1
        + (GAP_MAX_PROVIDERS as f64 + 1.0 - provider_count as f64) * 50.0 * 0.1
}

fn require_provider<R: Repository + ?Sized>(repository: &R, ccn: &Ccn) -> Result<Provider> {
    repository
        .provider(ccn)?
        .ok_or_else(|| HomeHealthError::provider_not_found(ccn.as_str()))
}

/// Served ZIPs of one agency with the cities, states and demand behind them
pub fn service_area_coverage<R: Repository + ?Sized>(repository: &R, ccn: &Ccn) -> Result<ServiceAreaCoverage> {
    let provider = require_provider(repository, ccn)?;
    let zip_codes_served = repository.service_area(ccn)?;
    let records = repository.zip_records_for(&zip_codes_served)?;

    let mut cities = BTreeSet::new();
    let mut states = BTreeSet::new();
    let mut counties = BTreeSet::new();
    for record in &records {
        let state = record.state.as_deref().map(|s| s.trim().to_ascii_uppercase());
        if let Some(city) = record.city.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            cities.insert((city.to_uppercase(), state.clone()));
        }
        if let Some(county) = record.county.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            counties.insert((county.to_uppercase(), state.clone()));
        }
        if let Some(state) = state.filter(|s| !s.is_empty()) {
            states.insert(state);
        }
    }

    let coverage_stats = CoverageStats {
        total_zip_codes: zip_codes_served.len(),
        total_cities: cities.len(),
        total_states: states.len(),
        total_counties: counties.len(),
        unmatched_zip_codes: zip_codes_served.len() - records.len(),
        total_medicare_eligible: records.iter().filter_map(|r| r.medicare_eligible).sum(),
        total_medicare_enrolled: records.iter().filter_map(|r| r.medicare_enrolled).sum(),
    };
    debug!(%ccn, zips = coverage_stats.total_zip_codes, unmatched = coverage_stats.unmatched_zip_codes, "resolved service area");

    Ok(ServiceAreaCoverage {
        ccn: provider.ccn.clone(),
        provider_name: provider.name.clone(),
        home_base: HomeBase::from(&provider),
        coverage_stats,
        zip_codes_served,
    })
}

/// Nearby ZIPs in the provider's state with demand and at most two registered agencies
pub fn service_area_gaps<R: Repository + ?Sized>(repository: &R, ccn: &Ccn) -> Result<ServiceAreaGapReport> {
    let provider = require_provider(repository, ccn)?;
    let origin = provider
        .best_location()
        .ok_or_else(|| HomeHealthError::provider_location_unavailable(ccn.as_str()))?;

    let mut gap_areas = match provider.state.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(state) => {
            let criteria = ZipCriteria::new(GAP_MIN_MEDICARE_ELIGIBLE + 1).state(state);
            let candidates = repository.zip_records_matching(&criteria)?;

            let mut registered: HashMap<ZipCode, usize> = HashMap::new();
            for other in repository.providers()? {
                if let Some(zip) = other.zip_code {
                    *registered.entry(zip).or_default() += 1;
                }
            }

            candidates
                .into_iter()
                .filter_map(|record| {
                    let distance = origin.distance_to(&record.location?);
                    let provider_count = registered.get(&record.zip_code).copied().unwrap_or(0);
                    if distance > GAP_RADIUS_MILES || provider_count > GAP_MAX_PROVIDERS {
                        return None;
                    }
                    let eligible = record.medicare_eligible.unwrap_or(0);
                    Some(ServiceAreaGap {
                        opportunity_score: gap_opportunity_score(
                            eligible,
                            record.medicare_enrolled,
                            distance,
                            provider_count,
                        ),
                        zip_code: record.zip_code,
                        city: record.city,
                        county: record.county,
                        state: record.state,
                        population: record.population,
                        medicare_eligible: record.medicare_eligible,
                        medicare_enrolled: record.medicare_enrolled,
                        provider_count,
                        distance_miles: distance,
                    })
                })
                .collect()
        }
        None => {
            debug!(%ccn, "provider has no state; no gap candidates");
            Vec::new()
        }
    };

    gap_areas.sort_by(|a, b| {
        a.distance_miles
            .total_cmp(&b.distance_miles)
            .then_with(|| b.medicare_eligible.cmp(&a.medicare_eligible))
            .then_with(|| a.zip_code.cmp(&b.zip_code))
    });
    gap_areas.truncate(GAP_CANDIDATE_LIMIT);

    let mut top_opportunities = gap_areas.clone();
    top_opportunities.sort_by(|a, b| {
        b.opportunity_score
            .total_cmp(&a.opportunity_score)
            .then_with(|| a.distance_miles.total_cmp(&b.distance_miles))
    });
    top_opportunities.truncate(GAP_TOP_OPPORTUNITIES);

    let count = gap_areas.len();
    let total_medicare_enrolled = gap_areas.iter().filter_map(|g| g.medicare_enrolled).sum();
    let average_distance = if count > 0 {
        gap_areas.iter().map(|g| g.distance_miles).sum::<f64>() / count as f64
    } else {
        0.0
    };
    let summary = GapSummary {
        total_gap_areas: count,
        total_medicare_eligible: gap_areas.iter().filter_map(|g| g.medicare_eligible).sum(),
        total_medicare_enrolled,
        average_distance_miles: round_one(average_distance),
        underserved_population: total_medicare_enrolled,
    };
    info!(%ccn, gaps = count, "analyzed service area gaps");

    Ok(ServiceAreaGapReport {
        ccn: provider.ccn.clone(),
        provider_name: provider.name.clone(),
        home_base: HomeBase::from(&provider),
        summary,
        top_opportunities,
        gap_areas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn zip(code: &str, state: &str, lat: f64, eligible: u64, enrolled: Option<u64>) -> ZipDemographic {
        let mut record = ZipDemographic::new(ZipCode::new(code).unwrap());
        record.city = Some(format!("Town {}", code));
        record.county = Some("Hinds".to_string());
        record.state = Some(state.to_string());
        record.location = Some(GeoPoint::new(lat, -90.0));
        record.medicare_eligible = Some(eligible);
        record.medicare_enrolled = enrolled;
        record
    }

    fn agency(ccn: &str, zip: &str, state: Option<&str>, location: Option<GeoPoint>) -> Provider {
        let mut provider = Provider::new(Ccn::new(ccn).unwrap());
        provider.name = Some(format!("Agency {}", ccn));
        provider.state = state.map(str::to_string);
        provider.zip_code = Some(ZipCode::new(zip).unwrap());
        provider.enhanced_location = location;
        provider
    }

    fn dataset() -> Dataset {
        let home = Some(GeoPoint::new(32.0, -90.0));
        let providers = vec![
            agency("250001", "39201", Some("MS"), home),
            agency("250002", "39203", Some("MS"), None),
            agency("250003", "39203", Some("MS"), None),
            agency("250004", "39203", Some("MS"), None),
            agency("250005", "39205", Some("MS"), None),
            agency("250006", "39201", None, home),
        ];
        let zips = vec![
            zip("39201", "MS", 32.0, 150, Some(100)),
            zip("39202", "MS", 32.5, 900, None),  // ~35 mi
            zip("39203", "MS", 32.1, 5000, Some(4000)), // three agencies
            zip("39204", "MS", 32.2, 100, Some(80)), // not above the eligibility floor
            zip("39205", "MS", 33.0, 300, Some(200)), // ~69 mi
            zip("39206", "MS", 34.0, 600, Some(500)), // ~138 mi
            zip("35201", "AL", 32.0, 800, Some(700)),
        ];
        Dataset::from_records(providers, zips)
            .with_service_areas(vec![
                (Ccn::new("250001").unwrap(), ZipCode::new("39201").unwrap()),
                (Ccn::new("250001").unwrap(), ZipCode::new("39205").unwrap()),
                (Ccn::new("250001").unwrap(), ZipCode::new("35201").unwrap()),
                (Ccn::new("250001").unwrap(), ZipCode::new("99999").unwrap()),
            ])
    }

    #[test]
    fn test_gap_candidates() {
        let report = service_area_gaps(&dataset(), &Ccn::new("250001").unwrap()).unwrap();
        let nearest: Vec<&str> = report.gap_areas.iter().map(|g| g.zip_code.as_str()).collect();
        assert_eq!(nearest, vec!["39201", "39202", "39205"]);
        assert_eq!(report.gap_areas[0].provider_count, 2);
        assert_eq!(report.gap_areas[0].distance_miles, 0.0);

        let top: Vec<&str> = report.top_opportunities.iter().map(|g| g.zip_code.as_str()).collect();
        assert_eq!(top, vec!["39202", "39205", "39201"]);

        assert_eq!(report.summary.total_gap_areas, 3);
        assert_eq!(report.summary.total_medicare_eligible, 1350);
        assert_eq!(report.summary.total_medicare_enrolled, 300);
        assert_eq!(report.summary.underserved_population, 300);
        assert_eq!(report.home_base.zip_code.as_ref().map(ZipCode::as_str), Some("39201"));
    }

    #[test]
    fn test_gap_score_weights() {
        // 150 * 0.4 + 100 * 0.4 + 100 * 0.1 + 1 * 50 * 0.1
        assert!((gap_opportunity_score(150, Some(100), 0.0, 2) - 115.0).abs() < 1e-9);
        assert!((gap_opportunity_score(100, None, 100.0, 0) - 55.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_errors_and_stateless_provider() {
        let data = dataset();
        assert!(matches!(
            service_area_gaps(&data, &Ccn::new("259999").unwrap()),
            Err(HomeHealthError::NotFound { .. })
        ));
        assert!(matches!(
            service_area_gaps(&data, &Ccn::new("250002").unwrap()),
            Err(HomeHealthError::MissingGeography { .. })
        ));

        let report = service_area_gaps(&data, &Ccn::new("250006").unwrap()).unwrap();
        assert!(report.gap_areas.is_empty());
        assert_eq!(report.summary.average_distance_miles, 0.0);
    }

    #[test]
    fn test_coverage_resolves_through_crosswalk() {
        let coverage = service_area_coverage(&dataset(), &Ccn::new("250001").unwrap()).unwrap();
        let served: Vec<&str> = coverage.zip_codes_served.iter().map(ZipCode::as_str).collect();
        assert_eq!(served, vec!["35201", "39201", "39205", "99999"]);

        let stats = &coverage.coverage_stats;
        assert_eq!(stats.total_zip_codes, 4);
        assert_eq!(stats.unmatched_zip_codes, 1);
        assert_eq!(stats.total_cities, 3);
        assert_eq!(stats.total_states, 2);
        assert_eq!(stats.total_counties, 2);
        assert_eq!(stats.total_medicare_eligible, 1250);
        assert_eq!(stats.total_medicare_enrolled, 1000);
    }

    #[test]
    fn test_coverage_without_service_areas() {
        let coverage = service_area_coverage(&dataset(), &Ccn::new("250002").unwrap()).unwrap();
        assert!(coverage.zip_codes_served.is_empty());
        assert_eq!(coverage.coverage_stats.total_states, 0);
        assert_eq!(coverage.coverage_stats.unmatched_zip_codes, 0);
    }
}
