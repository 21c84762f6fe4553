/*!
 * Market sizing and competitive position
 *
 * [`market_potential`] aggregates demand over a set of ZIP codes.
 * [`MarketAnalytics`] looks at provider concentration within a county and at
 * one provider's competitive standing.
 */

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::filter::sort_by_quality;
use crate::repository::Repository;

/// Flat annual revenue assumed per enrolled Medicare patient
pub const REVENUE_PER_PATIENT: f64 = 3500.0;
/// Miles per degree of latitude used for the bounding-box span
pub const MILES_PER_DEGREE_LATITUDE_APPROX: f64 = 69.0;
/// Miles per degree of longitude at mid-latitudes
pub const MILES_PER_DEGREE_LONGITUDE_APPROX: f64 = 54.6;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSummary {
    pub total_zip_codes: usize,
    pub states_covered: usize,
    pub counties_covered: usize,
    pub total_population: u64,
    pub total_medicare_eligibles: u64,
    pub total_medicare_enrolled: u64,
    pub avg_medicare_penetration_pct: f64,
    pub rural_zip_count: usize,
    pub frontier_zip_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeographicSpan {
    pub min_latitude: Option<f64>,
    pub max_latitude: Option<f64>,
    pub min_longitude: Option<f64>,
    pub max_longitude: Option<f64>,
    pub latitude_span_degrees: f64,
    pub longitude_span_degrees: f64,
    pub approximate_miles_north_south: f64,
    pub approximate_miles_east_west: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketOpportunity {
    pub estimated_annual_market_value: f64,
    pub medicare_market_penetration: f64,
    pub underserved_population: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketPotentialReport {
    pub market_summary: MarketSummary,
    pub geographic_span: GeographicSpan,
    pub market_opportunity: MarketOpportunity,
    /// Inputs dropped because they were not 5-digit ZIP codes
    pub discarded_inputs: Vec<String>,
    /// Well-formed codes with no reference row
    pub unmatched_zip_codes: Vec<ZipCode>,
}

/// Aggregate demand over a set of ZIP codes.
///
/// Malformed entries are skipped and reported back; duplicates collapse.
/// Fails with `NoData` when nothing matches a reference row.
pub fn market_potential<R, S>(repository: &R, zip_codes: &[S]) -> Result<MarketPotentialReport>
where
    R: Repository + ?Sized,
    S: AsRef<str>,
{
    let mut valid: BTreeSet<ZipCode> = BTreeSet::new();
    let mut discarded_inputs = Vec::new();
    for raw in zip_codes {
        match ZipCode::new(raw.as_ref()) {
            Ok(zip) => {
                valid.insert(zip);
            }
            Err(_) => discarded_inputs.push(raw.as_ref().to_string()),
        }
    }
    if !discarded_inputs.is_empty() {
        warn!(discarded = discarded_inputs.len(), "ignoring malformed ZIP codes");
    }

    let requested: Vec<ZipCode> = valid.into_iter().collect();
    let records = repository.zip_records_for(&requested)?;
    if records.is_empty() {
        return Err(HomeHealthError::NoData {
            message: "no data found for provided ZIP codes".to_string(),
        });
    }

    let matched: BTreeSet<&ZipCode> = records.iter().map(|r| &r.zip_code).collect();
    let unmatched_zip_codes: Vec<ZipCode> = requested
        .iter()
        .filter(|zip| !matched.contains(zip))
        .cloned()
        .collect();

    let report = aggregate(&records, discarded_inputs, unmatched_zip_codes);
    debug!(
        zips = report.market_summary.total_zip_codes,
        enrolled = report.market_summary.total_medicare_enrolled,
        "computed market potential"
    );
    Ok(report)
}

fn aggregate(
    records: &[ZipDemographic],
    discarded_inputs: Vec<String>,
    unmatched_zip_codes: Vec<ZipCode>,
) -> MarketPotentialReport {
    let states: BTreeSet<&str> = records.iter().filter_map(|r| r.state.as_deref()).collect();
    let counties: BTreeSet<&str> = records.iter().filter_map(|r| r.county.as_deref()).collect();

    let total_population: u64 = records.iter().filter_map(|r| r.population).sum();
    let total_medicare_eligibles: u64 = records.iter().filter_map(|r| r.medicare_eligible).sum();
    let total_medicare_enrolled: u64 = records.iter().filter_map(|r| r.medicare_enrolled).sum();

    let penetrations: Vec<f64> = records.iter().filter_map(|r| r.penetration()).collect();
    let avg_penetration = if penetrations.is_empty() {
        0.0
    } else {
        round_to(penetrations.iter().sum::<f64>() / penetrations.len() as f64, 2)
    };

    let points: Vec<GeoPoint> = records.iter().filter_map(|r| r.location).collect();
    let fold = |pick: fn(&GeoPoint) -> f64, better: fn(f64, f64) -> f64| {
        points.iter().map(pick).reduce(better)
    };
    let min_latitude = fold(|p| p.latitude, f64::min);
    let max_latitude = fold(|p| p.latitude, f64::max);
    let min_longitude = fold(|p| p.longitude, f64::min);
    let max_longitude = fold(|p| p.longitude, f64::max);

    let lat_span = match (min_latitude, max_latitude) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => 0.0,
    };
    let lon_span = match (min_longitude, max_longitude) {
        (Some(lo), Some(hi)) => hi - lo,
        _ => 0.0,
    };

    MarketPotentialReport {
        market_summary: MarketSummary {
            total_zip_codes: records.len(),
            states_covered: states.len(),
            counties_covered: counties.len(),
            total_population,
            total_medicare_eligibles,
            total_medicare_enrolled,
            avg_medicare_penetration_pct: avg_penetration,
            rural_zip_count: records.iter().filter(|r| r.rural()).count(),
            frontier_zip_count: records.iter().filter(|r| r.frontier()).count(),
        },
        geographic_span: GeographicSpan {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
            latitude_span_degrees: round_to(lat_span, 4),
            longitude_span_degrees: round_to(lon_span, 4),
            approximate_miles_north_south: round_to(lat_span * MILES_PER_DEGREE_LATITUDE_APPROX, 1),
            approximate_miles_east_west: round_to(lon_span * MILES_PER_DEGREE_LONGITUDE_APPROX, 1),
        },
        market_opportunity: MarketOpportunity {
            estimated_annual_market_value: total_medicare_enrolled as f64 * REVENUE_PER_PATIENT,
            medicare_market_penetration: avg_penetration,
            underserved_population: total_medicare_enrolled,
        },
        discarded_inputs,
        unmatched_zip_codes,
    }
}

/// Sum of squared patient-volume shares; 0 when total volume is not positive
pub fn market_concentration<'a>(providers: impl IntoIterator<Item = &'a Provider>) -> f64 {
    let volumes: Vec<f64> = providers
        .into_iter()
        .filter_map(|p| p.estimated_total_patients)
        .filter(|v| v.is_finite() && *v >= 0.0)
        .collect();
    let total: f64 = volumes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    volumes.iter().map(|v| (v / total).powi(2)).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountyMarketAnalysis {
    pub county: String,
    pub state: String,
    pub total_providers: usize,
    pub high_quality_providers: usize,
    pub high_quality_percentage: f64,
    pub average_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub market_concentration_index: f64,
    pub top_providers: Vec<ProviderSummary>,
    /// Every matching provider, best score first
    pub providers: Vec<ProviderSummary>,
}

/// Geographic scope for competitor analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CompetitorScope {
    #[default]
    State,
    County,
    City,
}

impl std::fmt::Display for CompetitorScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompetitorScope::State => write!(f, "state"),
            CompetitorScope::County => write!(f, "county"),
            CompetitorScope::City => write!(f, "city"),
        }
    }
}

impl std::str::FromStr for CompetitorScope {
    type Err = HomeHealthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(CompetitorScope::State),
            "county" => Ok(CompetitorScope::County),
            "city" => Ok(CompetitorScope::City),
            _ => Err(HomeHealthError::MalformedInput {
                value: s.to_string(),
                reason: "expected state, county or city".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitorAnalysis {
    pub target: ProviderSummary,
    pub scope: CompetitorScope,
    pub rank: usize,
    pub total_competitors: usize,
    pub better_competitors: usize,
    pub market_share: f64,
    pub percentile_rank: f64,
    pub top_competitors: Vec<ProviderSummary>,
}

fn same_text(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.trim().eq_ignore_ascii_case(b.trim()),
        _ => false,
    }
}

/// Market analytics over a provider population
pub struct MarketAnalytics<'a> {
    providers: &'a [Provider],
}

impl<'a> MarketAnalytics<'a> {
    pub fn new(providers: &'a [Provider]) -> Self {
        MarketAnalytics { providers }
    }

    /// Providers in `state` whose county (enhanced or reported) or city
    /// contains `county`, case-insensitively
    pub fn county_market(&self, county: &str, state: &str) -> CountyMarketAnalysis {
        let needle = county.trim().to_lowercase();
        let contains = |field: Option<&str>| {
            field
                .map(|value| value.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };

        let mut matches: Vec<&Provider> = self
            .providers
            .iter()
            .filter(|p| p.in_state(state))
            .filter(|p| {
                contains(p.geography.county.as_deref())
                    || contains(p.geography.enhanced_county.as_deref())
                    || contains(p.city.as_deref())
            })
            .collect();
        sort_by_quality(&mut matches);

        let total_providers = matches.len();
        let high_quality_providers = matches.iter().filter(|p| p.high_quality()).count();
        let scores: Vec<f64> = matches.iter().filter_map(|p| p.composite_quality_score).collect();
        let average_quality_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        let mut by_volume: Vec<&Provider> = matches
            .iter()
            .copied()
            .filter(|p| p.estimated_total_patients.is_some())
            .collect();
        by_volume.sort_by(|a, b| {
            let a_volume = a.estimated_total_patients.unwrap_or(0.0);
            let b_volume = b.estimated_total_patients.unwrap_or(0.0);
            b_volume.total_cmp(&a_volume).then_with(|| a.ccn.cmp(&b.ccn))
        });

        CountyMarketAnalysis {
            county: county.trim().to_string(),
            state: state.trim().to_ascii_uppercase(),
            total_providers,
            high_quality_providers,
            high_quality_percentage: if total_providers > 0 {
                high_quality_providers as f64 / total_providers as f64 * 100.0
            } else {
                0.0
            },
            average_quality_score,
            total_estimated_patients: matches.iter().filter_map(|p| p.estimated_total_patients).sum(),
            market_concentration_index: market_concentration(matches.iter().copied()),
            top_providers: by_volume.iter().take(5).map(|p| ProviderSummary::from(*p)).collect(),
            providers: matches.iter().map(|p| ProviderSummary::from(*p)).collect(),
        }
    }

    /// Rank a provider's quality and volume share among competitors in scope
    pub fn competitors(&self, target: &Provider, scope: CompetitorScope) -> CompetitorAnalysis {
        let in_scope = |p: &Provider| -> bool {
            if p.ccn == target.ccn || !same_text(p.state.as_deref(), target.state.as_deref()) {
                return false;
            }
            match scope {
                CompetitorScope::State => true,
                CompetitorScope::County => same_text(p.county_name(), target.county_name()),
                CompetitorScope::City => same_text(p.city.as_deref(), target.city.as_deref()),
            }
        };

        let mut competitors: Vec<&Provider> = self.providers.iter().filter(|p| in_scope(p)).collect();
        sort_by_quality(&mut competitors);

        let better_competitors = match target.composite_quality_score {
            Some(score) => competitors
                .iter()
                .filter(|c| c.composite_quality_score.map(|s| s > score).unwrap_or(false))
                .count(),
            None => 0,
        };
        let rank = better_competitors + 1;
        let total_competitors = competitors.len();

        let own_volume = target.estimated_total_patients.unwrap_or(0.0);
        let market_volume: f64 = competitors
            .iter()
            .filter_map(|c| c.estimated_total_patients)
            .sum::<f64>()
            + own_volume;
        let market_share = if market_volume > 0.0 { own_volume / market_volume } else { 0.0 };

        let percentile_rank = if total_competitors > 0 {
            (total_competitors as f64 - rank as f64 + 1.0) / total_competitors as f64 * 100.0
        } else {
            100.0
        };

        CompetitorAnalysis {
            target: ProviderSummary::from(target),
            scope,
            rank,
            total_competitors,
            better_competitors,
            market_share,
            percentile_rank,
            top_competitors: competitors.iter().take(10).map(|p| ProviderSummary::from(*p)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(ccn: &str, city: &str, county: &str, score: Option<f64>, patients: Option<f64>) -> Provider {
        let mut p = Provider::new(Ccn::new(ccn).unwrap());
        p.state = Some("AL".to_string());
        p.city = Some(city.to_string());
        p.geography.county = Some(county.to_string());
        p.composite_quality_score = score;
        p.estimated_total_patients = patients;
        p
    }

    #[test]
    fn test_concentration() {
        let providers = vec![
            provider("000001", "Birmingham", "Jefferson", Some(4.0), Some(50.0)),
            provider("000002", "Birmingham", "Jefferson", Some(3.0), Some(50.0)),
        ];
        assert!((market_concentration(&providers) - 0.5).abs() < 1e-12);

        let monopoly = vec![provider("000003", "Mobile", "Mobile", None, Some(10.0))];
        assert_eq!(market_concentration(&monopoly), 1.0);

        let unknown = vec![provider("000004", "Mobile", "Mobile", None, None)];
        assert_eq!(market_concentration(&unknown), 0.0);
    }

    #[test]
    fn test_county_market_matches_city_or_county() {
        let providers = vec![
            provider("000001", "Birmingham", "Jefferson", Some(4.0), Some(300.0)),
            provider("000002", "Hoover", "Shelby", Some(3.0), Some(100.0)),
            provider("000003", "Jefferson City", "Other", None, None),
        ];
        let analysis = MarketAnalytics::new(&providers).county_market("jefferson", "al");
        assert_eq!(analysis.total_providers, 2);
        assert_eq!(analysis.providers[0].ccn.as_str(), "000001");
        assert_eq!(analysis.average_quality_score, Some(4.0));
        assert_eq!(analysis.market_concentration_index, 1.0);
    }

    #[test]
    fn test_competitors_rank_and_share() {
        let providers = vec![
            provider("000001", "Birmingham", "Jefferson", Some(4.5), Some(300.0)),
            provider("000002", "Birmingham", "Jefferson", Some(3.0), Some(100.0)),
            provider("000003", "Mobile", "Mobile", Some(2.0), Some(100.0)),
        ];
        let analytics = MarketAnalytics::new(&providers);
        let state = analytics.competitors(&providers[1], CompetitorScope::State);
        assert_eq!(state.total_competitors, 2);
        assert_eq!(state.rank, 2);
        assert!((state.market_share - 0.2).abs() < 1e-12);
        assert_eq!(state.percentile_rank, 50.0);

        let city = analytics.competitors(&providers[2], CompetitorScope::City);
        assert_eq!(city.total_competitors, 0);
        assert_eq!(city.percentile_rank, 100.0);
        assert_eq!(city.market_share, 1.0);
    }
}
