//! Expansion opportunities for a single provider.
//!
//! Desert ZIPs are looked up within the provider's own state only; a provider
//! near a state line will not see opportunities across it.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::data_types::*;
use crate::deserts::{classify_deserts, DesertCriteria};
use crate::error::{HomeHealthError, Result};
use crate::repository::Repository;

pub const DEFAULT_SEARCH_RADIUS_MILES: f64 = 100.0;
/// Radius used to decide whether a ZIP is a desert
pub const DESERT_RADIUS_MILES: f64 = 25.0;
pub const DESERT_MIN_MEDICARE_POPULATION: u64 = 50;
pub const DESERT_MAX_PROVIDERS: usize = 1;
pub const TOP_TARGETS: usize = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionProvider {
    pub ccn: Ccn,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub current_quality_score: Option<f64>,
}

/// A desert ZIP within reach of the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionOpportunity {
    pub zip_code: ZipCode,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub medicare_eligible: Option<u64>,
    pub medicare_enrolled: Option<u64>,
    pub providers_within_radius: usize,
    pub desert_severity: DesertSeverity,
    pub market_opportunity_score: f64,
    pub distance_from_provider: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionSummary {
    pub total_desert_opportunities: usize,
    pub total_opportunity_population: u64,
    pub average_distance_miles: f64,
    pub total_opportunity_score: f64,
    pub search_radius_miles: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub provider: ExpansionProvider,
    pub summary: ExpansionSummary,
    pub top_targets: Vec<ExpansionOpportunity>,
    pub all_opportunities: Vec<ExpansionOpportunity>,
}

fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Rank desert ZIPs in the provider's state that lie within `search_radius_miles`
pub fn expansion_opportunities<R: Repository + ?Sized>(
    repository: &R,
    ccn: &Ccn,
    search_radius_miles: f64,
) -> Result<ExpansionReport> {
    let provider = repository
        .provider(ccn)?
        .ok_or_else(|| HomeHealthError::provider_not_found(ccn.as_str()))?;
    let origin = provider
        .best_location()
        .ok_or_else(|| HomeHealthError::provider_location_unavailable(ccn.as_str()))?;

    let deserts = match provider.state.as_deref() {
        Some(state) => {
            let criteria = DesertCriteria::default()
                .radius(DESERT_RADIUS_MILES)
                .min_population(DESERT_MIN_MEDICARE_POPULATION)
                .max_providers(DESERT_MAX_PROVIDERS)
                .state(Some(state));
            classify_deserts(repository, &criteria)?
        }
        None => {
            debug!(%ccn, "provider has no state; no expansion candidates");
            Vec::new()
        }
    };

    let mut opportunities: Vec<ExpansionOpportunity> = deserts
        .into_iter()
        .filter_map(|desert| {
            let distance = origin.distance_to(&desert.location());
            (distance <= search_radius_miles).then(|| ExpansionOpportunity {
                zip_code: desert.zip_code,
                city: desert.city,
                state: desert.state,
                county: desert.county,
                latitude: desert.latitude,
                longitude: desert.longitude,
                medicare_eligible: desert.medicare_eligible,
                medicare_enrolled: desert.medicare_enrolled,
                providers_within_radius: desert.providers_within_radius,
                desert_severity: desert.desert_severity,
                market_opportunity_score: desert.market_opportunity_score,
                distance_from_provider: distance,
            })
        })
        .collect();

    opportunities.sort_by(|a, b| {
        b.market_opportunity_score
            .total_cmp(&a.market_opportunity_score)
            .then_with(|| a.distance_from_provider.total_cmp(&b.distance_from_provider))
            .then_with(|| a.zip_code.cmp(&b.zip_code))
    });

    let count = opportunities.len();
    let average_distance = if count > 0 {
        opportunities.iter().map(|o| o.distance_from_provider).sum::<f64>() / count as f64
    } else {
        0.0
    };
    let summary = ExpansionSummary {
        total_desert_opportunities: count,
        total_opportunity_population: opportunities.iter().filter_map(|o| o.medicare_enrolled).sum(),
        average_distance_miles: round_one(average_distance),
        total_opportunity_score: round_one(opportunities.iter().map(|o| o.market_opportunity_score).sum()),
        search_radius_miles,
    };
    info!(%ccn, opportunities = count, search_radius_miles, "analyzed expansion opportunities");

    Ok(ExpansionReport {
        provider: ExpansionProvider {
            ccn: provider.ccn.clone(),
            name: provider.name.clone(),
            city: provider.city.clone(),
            state: provider.state.clone(),
            current_quality_score: provider.composite_quality_score,
        },
        summary,
        top_targets: opportunities.iter().take(TOP_TARGETS).cloned().collect(),
        all_opportunities: opportunities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Dataset;

    fn desert_zip(code: &str, state: &str, lat: f64, lon: f64, eligible: u64) -> ZipDemographic {
        let mut zip = ZipDemographic::new(ZipCode::new(code).unwrap());
        zip.state = Some(state.to_string());
        zip.location = Some(GeoPoint::new(lat, lon));
        zip.medicare_eligible = Some(eligible);
        zip.medicare_enrolled = Some(eligible / 2);
        zip
    }

    fn origin_provider(state: Option<&str>) -> Provider {
        let mut provider = Provider::new(Ccn::new("270001").unwrap());
        provider.state = state.map(str::to_string);
        // Original coordinates only: expansion falls back to them
        provider.location = Some(GeoPoint::new(46.0, -108.0));
        provider
    }

    #[test]
    fn test_radius_cutoff_and_state_scope() {
        let dataset = Dataset::from_records(
            vec![origin_provider(Some("MT"))],
            vec![
                desert_zip("59001", "MT", 46.5, -108.0, 400),  // ~35 mi
                desert_zip("59002", "MT", 48.0, -108.0, 900),  // ~138 mi
                desert_zip("82001", "WY", 45.9, -108.0, 5000), // other state
            ],
        );
        let report = expansion_opportunities(&dataset, &Ccn::new("270001").unwrap(), 100.0).unwrap();
        let zips: Vec<&str> = report.all_opportunities.iter().map(|o| o.zip_code.as_str()).collect();
        assert_eq!(zips, vec!["59001"]);
        assert_eq!(report.summary.total_desert_opportunities, 1);
        assert_eq!(report.all_opportunities[0].desert_severity, DesertSeverity::CompleteDesert);
    }

    #[test]
    fn test_provider_without_state_has_no_opportunities() {
        let dataset = Dataset::from_records(
            vec![origin_provider(None)],
            vec![desert_zip("59001", "MT", 46.5, -108.0, 400)],
        );
        let report = expansion_opportunities(&dataset, &Ccn::new("270001").unwrap(), 100.0).unwrap();
        assert!(report.all_opportunities.is_empty());
        assert_eq!(report.summary.average_distance_miles, 0.0);
    }

    #[test]
    fn test_errors() {
        let mut no_location = origin_provider(Some("MT"));
        no_location.location = None;
        let dataset = Dataset::from_records(vec![no_location], Vec::new());
        let ccn = Ccn::new("270001").unwrap();
        assert!(matches!(
            expansion_opportunities(&dataset, &ccn, 100.0),
            Err(HomeHealthError::MissingGeography { .. })
        ));
        assert!(matches!(
            expansion_opportunities(&dataset, &Ccn::new("999999").unwrap(), 100.0),
            Err(HomeHealthError::NotFound { .. })
        ));
    }
}
