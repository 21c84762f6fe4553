/*!
 * Coverage desert classification
 *
 * A ZIP code is a desert candidate when it has enough Medicare-eligible
 * residents and at most `max_providers_in_radius` geocoded providers within
 * `radius_miles` of its centroid. Candidates are labelled by severity and
 * ranked by a weighted market opportunity score.
 */

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::data_types::*;
use crate::error::Result;
use crate::proximity::ProximityIndex;
use crate::repository::{Repository, ZipCriteria};

pub const DEFAULT_RADIUS_MILES: f64 = 25.0;
pub const DEFAULT_MIN_MEDICARE_POPULATION: u64 = 100;
pub const DEFAULT_MAX_PROVIDERS_IN_RADIUS: usize = 2;

/// Radius and population floor used for the summary tiers
pub const SUMMARY_RADIUS_MILES: f64 = 25.0;
pub const SUMMARY_MIN_MEDICARE_POPULATION: u64 = 50;

const ELIGIBLE_WEIGHT: f64 = 0.4;
const ENROLLED_WEIGHT: f64 = 0.4;
const SCARCITY_WEIGHT: f64 = 0.2;
const SCARCITY_POINTS_PER_PROVIDER: f64 = 50.0;

/// Parameters for [`classify_deserts`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesertCriteria {
    pub radius_miles: f64,
    pub min_medicare_population: u64,
    pub max_providers_in_radius: usize,
    pub state_filter: Option<String>,
    pub rural_only: bool,
}

impl Default for DesertCriteria {
    fn default() -> Self {
        DesertCriteria {
            radius_miles: DEFAULT_RADIUS_MILES,
            min_medicare_population: DEFAULT_MIN_MEDICARE_POPULATION,
            max_providers_in_radius: DEFAULT_MAX_PROVIDERS_IN_RADIUS,
            state_filter: None,
            rural_only: false,
        }
    }
}

impl DesertCriteria {
    pub fn radius(mut self, radius_miles: f64) -> Self {
        self.radius_miles = radius_miles;
        self
    }

    pub fn min_population(mut self, min_medicare_population: u64) -> Self {
        self.min_medicare_population = min_medicare_population;
        self
    }

    pub fn max_providers(mut self, max_providers_in_radius: usize) -> Self {
        self.max_providers_in_radius = max_providers_in_radius;
        self
    }

    pub fn state(mut self, state: Option<&str>) -> Self {
        self.state_filter = state
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn rural_only(mut self, rural_only: bool) -> Self {
        self.rural_only = rural_only;
        self
    }

    fn zip_criteria(&self) -> ZipCriteria {
        let criteria = ZipCriteria::new(self.min_medicare_population).rural_only(self.rural_only);
        match &self.state_filter {
            Some(state) => criteria.state(state.as_str()),
            None => criteria,
        }
    }
}

/// `0.4 * eligible + 0.4 * enrolled + 0.2 * 50 * (max - count)`, unknown counts as 0
pub fn market_opportunity_score(
    medicare_eligible: Option<u64>,
    medicare_enrolled: Option<u64>,
    max_providers_in_radius: usize,
    providers_within_radius: usize,
) -> f64 {
    let scarcity = max_providers_in_radius.saturating_sub(providers_within_radius) as f64;
    ELIGIBLE_WEIGHT * medicare_eligible.unwrap_or(0) as f64
        + ENROLLED_WEIGHT * medicare_enrolled.unwrap_or(0) as f64
        + SCARCITY_WEIGHT * SCARCITY_POINTS_PER_PROVIDER * scarcity
}

/// Provider locations and per-ZIP counts shared across classifier runs
pub struct CoverageIndex {
    locations: ProximityIndex<()>,
    providers_by_zip: HashMap<ZipCode, usize>,
}

impl CoverageIndex {
    pub fn from_providers(providers: &[Provider]) -> Self {
        let mut providers_by_zip = HashMap::new();
        for zip in providers.iter().filter_map(|p| p.zip_code.as_ref()) {
            *providers_by_zip.entry(zip.clone()).or_insert(0) += 1;
        }
        CoverageIndex {
            locations: ProximityIndex::new(
                providers.iter().filter_map(|p| p.enhanced_location.map(|l| (l, ()))),
            ),
            providers_by_zip,
        }
    }

    pub fn load<R: Repository + ?Sized>(repository: &R) -> Result<Self> {
        let providers = repository.providers()?;
        let index = CoverageIndex::from_providers(&providers);
        debug!(
            providers = providers.len(),
            geocoded = index.locations.len(),
            "built coverage index"
        );
        Ok(index)
    }

    pub fn geocoded_providers(&self) -> usize {
        self.locations.len()
    }

    /// Classify pre-filtered candidate ZIPs against this index
    pub fn classify(
        &self,
        candidates: &[ZipDemographic],
        radius_miles: f64,
        max_providers_in_radius: usize,
    ) -> Vec<CoverageDesertResult> {
        let located: Vec<(&ZipDemographic, GeoPoint)> = candidates
            .iter()
            .filter_map(|zip| zip.location.map(|point| (zip, point)))
            .collect();

        #[cfg(feature = "parallel")]
        let counts: Vec<usize> = located
            .par_iter()
            .map(|(_, point)| self.locations.count_within(point, radius_miles))
            .collect();

        #[cfg(not(feature = "parallel"))]
        let counts: Vec<usize> = located
            .iter()
            .map(|(_, point)| self.locations.count_within(point, radius_miles))
            .collect();

        let mut results: Vec<CoverageDesertResult> = located
            .into_iter()
            .zip(counts)
            .filter(|(_, count)| *count <= max_providers_in_radius)
            .map(|((zip, point), count)| CoverageDesertResult {
                zip_code: zip.zip_code.clone(),
                city: zip.city.clone(),
                state: zip.state.clone(),
                county: zip.county.clone(),
                latitude: point.latitude,
                longitude: point.longitude,
                population: zip.population,
                medicare_eligible: zip.medicare_eligible,
                medicare_enrolled: zip.medicare_enrolled,
                medicare_penetration_pct: zip.penetration(),
                is_rural: zip.is_rural,
                is_frontier: zip.is_frontier,
                rucc_description: zip.rucc_description.clone(),
                density_category: zip.density_category.clone(),
                providers_in_zip: self.providers_by_zip.get(&zip.zip_code).copied().unwrap_or(0),
                providers_within_radius: count,
                desert_severity: DesertSeverity::from_count(count),
                market_opportunity_score: market_opportunity_score(
                    zip.medicare_eligible,
                    zip.medicare_enrolled,
                    max_providers_in_radius,
                    count,
                ),
            })
            .collect();

        sort_by_opportunity(&mut results);
        results
    }
}

/// Highest score first; ties by ZIP code
pub fn sort_by_opportunity(results: &mut [CoverageDesertResult]) {
    results.sort_by(|a, b| {
        b.market_opportunity_score
            .total_cmp(&a.market_opportunity_score)
            .then_with(|| a.zip_code.cmp(&b.zip_code))
    });
}

/// Find underserved ZIP codes
pub fn classify_deserts<R: Repository + ?Sized>(
    repository: &R,
    criteria: &DesertCriteria,
) -> Result<Vec<CoverageDesertResult>> {
    let candidates = repository.zip_records_matching(&criteria.zip_criteria())?;
    if candidates.is_empty() {
        debug!(?criteria, "no desert candidates");
        return Ok(Vec::new());
    }
    let index = CoverageIndex::load(repository)?;
    let results = index.classify(&candidates, criteria.radius_miles, criteria.max_providers_in_radius);
    info!(
        candidates = candidates.len(),
        deserts = results.len(),
        radius = criteria.radius_miles,
        max_providers = criteria.max_providers_in_radius,
        "classified coverage deserts"
    );
    Ok(results)
}

/// Totals for one severity tier of the summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeverityTier {
    pub severity: DesertSeverity,
    pub max_providers_in_radius: usize,
    pub zip_count: usize,
    pub medicare_population: u64,
    pub total_opportunity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateDesertBreakdown {
    pub state: String,
    pub underserved_zips: usize,
    pub medicare_eligible: u64,
    pub medicare_enrolled: u64,
    pub total_opportunity_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesertSummary {
    pub state_filter: Option<String>,
    pub complete_deserts: SeverityTier,
    pub severe_underservice: SeverityTier,
    pub moderate_underservice: SeverityTier,
    pub total_underserved_zips: usize,
    pub total_underserved_medicare_population: u64,
    pub states_with_deserts: usize,
    /// `None` when no ZIP qualifies
    pub avg_opportunity_score_per_zip: Option<f64>,
    pub state_breakdown: Vec<StateDesertBreakdown>,
    pub top_opportunities: Vec<CoverageDesertResult>,
}

fn tier(severity: DesertSeverity, max_providers_in_radius: usize, results: &[CoverageDesertResult]) -> SeverityTier {
    SeverityTier {
        severity,
        max_providers_in_radius,
        zip_count: results.len(),
        medicare_population: results.iter().filter_map(|r| r.medicare_enrolled).sum(),
        total_opportunity_score: results.iter().map(|r| r.market_opportunity_score).sum(),
    }
}

/// Classify at max 0, 1 and 2 providers (radius 25, min population 50) and
/// aggregate the widest tier by state
pub fn desert_summary<R: Repository + ?Sized>(
    repository: &R,
    state_filter: Option<&str>,
) -> Result<DesertSummary> {
    let base = DesertCriteria::default()
        .radius(SUMMARY_RADIUS_MILES)
        .min_population(SUMMARY_MIN_MEDICARE_POPULATION)
        .state(state_filter);
    let candidates = repository.zip_records_matching(&base.zip_criteria())?;
    let index = CoverageIndex::load(repository)?;

    let complete = index.classify(&candidates, base.radius_miles, 0);
    let severe = index.classify(&candidates, base.radius_miles, 1);
    let moderate = index.classify(&candidates, base.radius_miles, 2);

    let mut by_state: BTreeMap<String, StateDesertBreakdown> = BTreeMap::new();
    // ZIPs without a state count toward the tiers but not the breakdown
    for result in &moderate {
        let state = match result.state.as_deref().map(str::trim) {
            Some(state) if !state.is_empty() => state.to_ascii_uppercase(),
            _ => continue,
        };
        let entry = by_state.entry(state.clone()).or_insert_with(|| StateDesertBreakdown {
            state,
            underserved_zips: 0,
            medicare_eligible: 0,
            medicare_enrolled: 0,
            total_opportunity_score: 0.0,
        });
        entry.underserved_zips += 1;
        entry.medicare_eligible += result.medicare_eligible.unwrap_or(0);
        entry.medicare_enrolled += result.medicare_enrolled.unwrap_or(0);
        entry.total_opportunity_score += result.market_opportunity_score;
    }

    let moderate_tier = tier(DesertSeverity::ModerateUnderservice, 2, &moderate);
    let avg_opportunity_score_per_zip = (!moderate.is_empty())
        .then(|| moderate_tier.total_opportunity_score / moderate.len() as f64);

    Ok(DesertSummary {
        state_filter: base.state_filter.clone(),
        complete_deserts: tier(DesertSeverity::CompleteDesert, 0, &complete),
        severe_underservice: tier(DesertSeverity::SevereUnderservice, 1, &severe),
        total_underserved_zips: moderate.len(),
        total_underserved_medicare_population: moderate_tier.medicare_population,
        states_with_deserts: by_state.len(),
        avg_opportunity_score_per_zip,
        state_breakdown: by_state.into_values().collect(),
        top_opportunities: moderate.into_iter().take(20).collect(),
        moderate_underservice: moderate_tier,
    })
}
