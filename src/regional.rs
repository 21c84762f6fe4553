/*!
 * Regional views over the provider population
 *
 * Group-by reports keyed on the crosswalk enrichment columns: rural-urban
 * continuum codes, density categories, CBSAs and counties. Every view works
 * on a provider slice, so it runs the same over a [`Dataset`](crate::dataset::Dataset)
 * or a repository snapshot.
 */

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::filter::sort_by_quality;
use crate::market::market_concentration;

/// Density categories in display order; unknown labels sort after these
pub const DENSITY_ORDER: &[&str] = &["high_density", "medium_density", "low_density", "rural"];

/// Providers listed in the top section of a CBSA analysis
pub const CBSA_TOP_PROVIDERS: usize = 10;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        round_to(part as f64 * 100.0 / whole as f64, 2)
    }
}

fn normalized(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// County as reported, falling back to the crosswalk county
fn reported_county(provider: &Provider) -> Option<&str> {
    provider
        .geography
        .county
        .as_deref()
        .or(provider.geography.enhanced_county.as_deref())
}

/// Running totals for one group of providers
#[derive(Default)]
struct Tally<'a> {
    providers: usize,
    ccns: BTreeSet<&'a Ccn>,
    names: BTreeSet<&'a str>,
    score_sum: f64,
    scored: usize,
    patients: f64,
    high_quality: usize,
    states: BTreeSet<String>,
    counties: BTreeSet<String>,
    enhanced_counties: BTreeSet<String>,
    cbsas: BTreeSet<String>,
    latitude_sum: f64,
    longitude_sum: f64,
    located: usize,
}

impl<'a> Tally<'a> {
    fn add(&mut self, provider: &'a Provider) {
        self.providers += 1;
        self.ccns.insert(&provider.ccn);
        if let Some(name) = provider.name.as_deref() {
            self.names.insert(name);
        }
        if let Some(score) = provider.composite_quality_score {
            self.score_sum += score;
            self.scored += 1;
        }
        self.patients += provider.estimated_total_patients.unwrap_or(0.0);
        if provider.high_quality() {
            self.high_quality += 1;
        }
        if let Some(state) = normalized(provider.state.as_deref()) {
            self.states.insert(state.to_ascii_uppercase());
        }
        if let Some(county) = normalized(reported_county(provider)) {
            self.counties.insert(county);
        }
        if let Some(county) = normalized(provider.geography.enhanced_county.as_deref()) {
            self.enhanced_counties.insert(county);
        }
        if let Some(cbsa) = normalized(provider.geography.cbsa_name.as_deref()) {
            self.cbsas.insert(cbsa);
        }
        if let Some(point) = provider.enhanced_location {
            self.latitude_sum += point.latitude;
            self.longitude_sum += point.longitude;
            self.located += 1;
        }
    }

    fn average_quality(&self) -> Option<f64> {
        (self.scored > 0).then(|| self.score_sum / self.scored as f64)
    }

    fn high_quality_percentage(&self) -> f64 {
        percentage(self.high_quality, self.providers)
    }

    fn average_latitude(&self) -> Option<f64> {
        (self.located > 0).then(|| self.latitude_sum / self.located as f64)
    }

    fn average_longitude(&self) -> Option<f64> {
        (self.located > 0).then(|| self.longitude_sum / self.located as f64)
    }
}

/// Providers sharing one rural-urban continuum description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuccGroup {
    pub rucc_description: String,
    pub rucc_category: Option<String>,
    pub provider_count: usize,
    pub unique_ccns: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub high_quality_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityGroup {
    pub density_category: String,
    pub density_description: Option<String>,
    pub provider_count: usize,
    pub unique_ccns: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub high_quality_count: usize,
    pub high_quality_percentage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AreaType {
    Rural,
    Urban,
}

impl std::fmt::Display for AreaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AreaType::Rural => write!(f, "Rural"),
            AreaType::Urban => write!(f, "Urban"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaTypeGroup {
    pub area_type: AreaType,
    pub provider_count: usize,
    pub unique_ccns: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub high_quality_count: usize,
    pub states_covered: usize,
    pub counties_covered: usize,
}

/// Totals over providers in frontier areas; zeros when there are none
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrontierStats {
    pub total_providers: usize,
    pub unique_ccns: usize,
    pub avg_quality_score: f64,
    pub total_estimated_patients: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuralUrbanAnalysis {
    pub rucc_distribution: Vec<RuccGroup>,
    pub density_analysis: Vec<DensityGroup>,
    pub rural_urban_comparison: Vec<AreaTypeGroup>,
    pub frontier_stats: FrontierStats,
}

/// Rural and urban provider mix for one state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRuralUrbanSummary {
    pub state: String,
    pub total_providers: usize,
    pub rural_providers: usize,
    pub urban_providers: usize,
    pub frontier_providers: usize,
    pub rural_percentage: f64,
    pub rural_avg_quality: Option<f64>,
    pub urban_avg_quality: Option<f64>,
    pub unique_cbsas: usize,
    pub unique_counties: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityCategorySummary {
    pub density_category: String,
    pub provider_count: usize,
    pub unique_ccns: usize,
    pub states_covered: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub high_quality_count: usize,
    pub high_quality_percentage: f64,
    pub avg_latitude: Option<f64>,
    pub avg_longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbsaAnalysis {
    pub cbsa_name: String,
    pub total_providers: usize,
    pub unique_ccns: usize,
    pub unique_counties: usize,
    pub high_quality_providers: usize,
    pub high_quality_percentage: f64,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub market_concentration_index: f64,
    /// Spread of enhanced coordinates in degrees; 0 without coordinates
    pub geographic_lat_range: f64,
    pub geographic_lng_range: f64,
    pub top_providers: Vec<ProviderSummary>,
    pub providers: Vec<ProviderSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CbsaSummary {
    pub cbsa_code: Option<String>,
    pub cbsa_name: String,
    pub metro_type: Option<String>,
    pub unique_providers: usize,
    pub unique_counties: usize,
    pub unique_states: usize,
    pub high_quality_count: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub avg_latitude: Option<f64>,
    pub avg_longitude: Option<f64>,
}

/// One county (reported, else crosswalk) within a state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountySummary {
    pub county_name: String,
    pub state: Option<String>,
    pub unique_providers: usize,
    pub unique_provider_names: usize,
    pub total_records: usize,
    pub avg_latitude: Option<f64>,
    pub avg_longitude: Option<f64>,
    pub high_quality_count: usize,
    pub avg_quality_score: Option<f64>,
    pub total_estimated_patients: f64,
    pub enhanced_county_count: usize,
    pub original_county_count: usize,
}

fn density_rank(category: &str) -> usize {
    DENSITY_ORDER
        .iter()
        .position(|known| known.eq_ignore_ascii_case(category))
        .unwrap_or(DENSITY_ORDER.len())
}

fn by_count_desc<T>(groups: &mut [T], count: impl Fn(&T) -> usize, name: impl Fn(&T) -> &str) {
    groups.sort_by(|a, b| count(b).cmp(&count(a)).then_with(|| name(a).cmp(name(b))));
}

/// Rural-urban, density, CBSA and county reports over a provider population
pub struct RegionalAnalytics<'a> {
    providers: &'a [Provider],
}

impl<'a> RegionalAnalytics<'a> {
    pub fn new(providers: &'a [Provider]) -> Self {
        RegionalAnalytics { providers }
    }

    /// RUCC distribution, density breakdown, rural vs urban and frontier totals
    pub fn rural_urban(&self) -> RuralUrbanAnalysis {
        let mut rucc: BTreeMap<(String, Option<String>), Tally<'a>> = BTreeMap::new();
        let mut density: BTreeMap<(String, Option<String>), Tally<'a>> = BTreeMap::new();
        let mut area: BTreeMap<AreaType, Tally<'a>> = BTreeMap::new();
        let mut frontier = Tally::default();

        for provider in self.providers {
            let geography = &provider.geography;
            if let Some(description) = normalized(geography.rucc_description.as_deref()) {
                rucc.entry((description, normalized(geography.rucc_category.as_deref())))
                    .or_default()
                    .add(provider);
            }
            if let Some(category) = normalized(geography.density_category.as_deref()) {
                density
                    .entry((category, normalized(geography.density_description.as_deref())))
                    .or_default()
                    .add(provider);
            }
            if let Some(rural) = geography.is_rural {
                let kind = if rural { AreaType::Rural } else { AreaType::Urban };
                area.entry(kind).or_default().add(provider);
            }
            if geography.is_frontier == Some(true) {
                frontier.add(provider);
            }
        }

        let mut rucc_distribution: Vec<RuccGroup> = rucc
            .into_iter()
            .map(|((rucc_description, rucc_category), tally)| RuccGroup {
                rucc_description,
                rucc_category,
                provider_count: tally.providers,
                unique_ccns: tally.ccns.len(),
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                high_quality_count: tally.high_quality,
            })
            .collect();
        by_count_desc(&mut rucc_distribution, |g| g.provider_count, |g| g.rucc_description.as_str());

        let mut density_analysis: Vec<DensityGroup> = density
            .into_iter()
            .map(|((density_category, density_description), tally)| DensityGroup {
                density_category,
                density_description,
                provider_count: tally.providers,
                unique_ccns: tally.ccns.len(),
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                high_quality_count: tally.high_quality,
                high_quality_percentage: tally.high_quality_percentage(),
            })
            .collect();
        by_count_desc(&mut density_analysis, |g| g.provider_count, |g| g.density_category.as_str());

        let mut rural_urban_comparison: Vec<AreaTypeGroup> = area
            .into_iter()
            .map(|(area_type, tally)| AreaTypeGroup {
                area_type,
                provider_count: tally.providers,
                unique_ccns: tally.ccns.len(),
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                high_quality_count: tally.high_quality,
                states_covered: tally.states.len(),
                counties_covered: tally.counties.len(),
            })
            .collect();
        rural_urban_comparison.sort_by(|a, b| {
            b.provider_count
                .cmp(&a.provider_count)
                .then_with(|| a.area_type.cmp(&b.area_type))
        });

        RuralUrbanAnalysis {
            rucc_distribution,
            density_analysis,
            rural_urban_comparison,
            frontier_stats: FrontierStats {
                total_providers: frontier.providers,
                unique_ccns: frontier.ccns.len(),
                avg_quality_score: frontier.average_quality().map(|q| round_to(q, 2)).unwrap_or(0.0),
                total_estimated_patients: frontier.patients,
            },
        }
    }

    /// Rural-urban mix per state, highest rural share first.
    ///
    /// Only providers with a known rural flag and a state are counted.
    pub fn state_rural_urban_summary(&self, state: Option<&str>) -> Vec<StateRuralUrbanSummary> {
        #[derive(Default)]
        struct StateTally<'p> {
            all: Tally<'p>,
            rural: Tally<'p>,
            urban: Tally<'p>,
            frontier: usize,
        }

        let wanted = state.map(|s| s.trim().to_ascii_uppercase());
        let mut states: BTreeMap<String, StateTally<'a>> = BTreeMap::new();
        for provider in self.providers {
            let Some(rural) = provider.geography.is_rural else {
                continue;
            };
            let Some(code) = normalized(provider.state.as_deref()).map(|s| s.to_ascii_uppercase()) else {
                continue;
            };
            if wanted.as_deref().is_some_and(|w| w != code) {
                continue;
            }
            let entry = states.entry(code).or_default();
            entry.all.add(provider);
            if rural {
                entry.rural.add(provider);
            } else {
                entry.urban.add(provider);
            }
            if provider.geography.is_frontier == Some(true) {
                entry.frontier += 1;
            }
        }

        let mut summaries: Vec<StateRuralUrbanSummary> = states
            .into_iter()
            .map(|(state, tally)| StateRuralUrbanSummary {
                state,
                total_providers: tally.all.providers,
                rural_providers: tally.rural.providers,
                urban_providers: tally.urban.providers,
                frontier_providers: tally.frontier,
                rural_percentage: percentage(tally.rural.providers, tally.all.providers),
                rural_avg_quality: tally.rural.average_quality(),
                urban_avg_quality: tally.urban.average_quality(),
                unique_cbsas: tally.all.cbsas.len(),
                unique_counties: tally.all.counties.len(),
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.rural_percentage
                .total_cmp(&a.rural_percentage)
                .then_with(|| a.state.cmp(&b.state))
        });
        summaries
    }

    /// Providers per density category, densest first
    pub fn density_categories(&self) -> Vec<DensityCategorySummary> {
        let mut groups: BTreeMap<String, Tally<'a>> = BTreeMap::new();
        for provider in self.providers {
            if let Some(category) = normalized(provider.geography.density_category.as_deref()) {
                groups.entry(category).or_default().add(provider);
            }
        }

        let mut summaries: Vec<DensityCategorySummary> = groups
            .into_iter()
            .map(|(density_category, tally)| DensityCategorySummary {
                density_category,
                provider_count: tally.providers,
                unique_ccns: tally.ccns.len(),
                states_covered: tally.states.len(),
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                high_quality_count: tally.high_quality,
                high_quality_percentage: tally.high_quality_percentage(),
                avg_latitude: tally.average_latitude(),
                avg_longitude: tally.average_longitude(),
            })
            .collect();
        summaries.sort_by(|a, b| {
            density_rank(&a.density_category)
                .cmp(&density_rank(&b.density_category))
                .then_with(|| a.density_category.cmp(&b.density_category))
        });
        summaries
    }

    /// Providers whose CBSA name contains `cbsa_name`, case-insensitively
    pub fn cbsa(&self, cbsa_name: &str) -> Result<CbsaAnalysis> {
        let needle = cbsa_name.trim().to_lowercase();
        let mut matches: Vec<&Provider> = self
            .providers
            .iter()
            .filter(|p| {
                p.geography
                    .cbsa_name
                    .as_deref()
                    .map(|name| name.to_lowercase().contains(&needle))
                    .unwrap_or(false)
            })
            .collect();
        if matches.is_empty() {
            return Err(HomeHealthError::NoData {
                message: format!("no providers found for CBSA '{}'", cbsa_name.trim()),
            });
        }
        sort_by_quality(&mut matches);

        let mut tally = Tally::default();
        for provider in &matches {
            tally.add(provider);
        }

        let range = |values: Vec<f64>| -> f64 {
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if values.is_empty() {
                0.0
            } else {
                round_to(max - min, 3)
            }
        };
        let located: Vec<GeoPoint> = matches.iter().filter_map(|p| p.enhanced_location).collect();

        Ok(CbsaAnalysis {
            cbsa_name: cbsa_name.trim().to_string(),
            total_providers: tally.providers,
            unique_ccns: tally.ccns.len(),
            unique_counties: tally.enhanced_counties.len(),
            high_quality_providers: tally.high_quality,
            high_quality_percentage: round_to(tally.high_quality as f64 * 100.0 / tally.providers as f64, 1),
            avg_quality_score: tally.average_quality().map(|q| round_to(q, 2)),
            total_estimated_patients: tally.patients,
            market_concentration_index: round_to(market_concentration(matches.iter().copied()), 3),
            geographic_lat_range: range(located.iter().map(|p| p.latitude).collect()),
            geographic_lng_range: range(located.iter().map(|p| p.longitude).collect()),
            top_providers: matches
                .iter()
                .take(CBSA_TOP_PROVIDERS)
                .map(|p| ProviderSummary::from(*p))
                .collect(),
            providers: matches.iter().map(|p| ProviderSummary::from(*p)).collect(),
        })
    }

    /// One row per CBSA with providers, most providers first
    pub fn cbsa_summary(&self) -> Vec<CbsaSummary> {
        type CbsaKey = (String, Option<String>, Option<String>);
        let mut groups: BTreeMap<CbsaKey, Tally<'a>> = BTreeMap::new();
        for provider in self.providers {
            let geography = &provider.geography;
            if let Some(name) = normalized(geography.cbsa_name.as_deref()) {
                let key = (
                    name,
                    normalized(geography.cbsa_code.as_deref()),
                    normalized(geography.metro_type.as_deref()),
                );
                groups.entry(key).or_default().add(provider);
            }
        }

        let mut summaries: Vec<CbsaSummary> = groups
            .into_iter()
            .map(|((cbsa_name, cbsa_code, metro_type), tally)| CbsaSummary {
                cbsa_code,
                cbsa_name,
                metro_type,
                unique_providers: tally.ccns.len(),
                unique_counties: tally.enhanced_counties.len(),
                unique_states: tally.states.len(),
                high_quality_count: tally.high_quality,
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                avg_latitude: tally.average_latitude(),
                avg_longitude: tally.average_longitude(),
            })
            .collect();
        by_count_desc(&mut summaries, |s| s.unique_providers, |s| s.cbsa_name.as_str());
        summaries
    }

    /// One row per county and state, largest estimated patient volume first
    pub fn county_summary(&self) -> Vec<CountySummary> {
        let mut groups: BTreeMap<(String, Option<String>), (Tally<'a>, usize, usize)> = BTreeMap::new();
        for provider in self.providers {
            let Some(county) = normalized(reported_county(provider)) else {
                continue;
            };
            let state = normalized(provider.state.as_deref()).map(|s| s.to_ascii_uppercase());
            let (tally, enhanced, original) = groups.entry((county, state)).or_default();
            tally.add(provider);
            if provider.geography.enhanced_county.is_some() {
                *enhanced += 1;
            }
            if provider.geography.county.is_some() {
                *original += 1;
            }
        }

        let mut summaries: Vec<CountySummary> = groups
            .into_iter()
            .map(|((county_name, state), (tally, enhanced, original))| CountySummary {
                county_name,
                state,
                unique_providers: tally.ccns.len(),
                unique_provider_names: tally.names.len(),
                total_records: tally.providers,
                avg_latitude: tally.average_latitude(),
                avg_longitude: tally.average_longitude(),
                high_quality_count: tally.high_quality,
                avg_quality_score: tally.average_quality(),
                total_estimated_patients: tally.patients,
                enhanced_county_count: enhanced,
                original_county_count: original,
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.total_estimated_patients
                .total_cmp(&a.total_estimated_patients)
                .then_with(|| a.county_name.cmp(&b.county_name))
                .then_with(|| a.state.cmp(&b.state))
        });
        summaries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Spec {
        ccn: &'static str,
        state: &'static str,
        rural: Option<bool>,
        frontier: bool,
        density: Option<&'static str>,
        cbsa: Option<&'static str>,
        county: Option<&'static str>,
        score: Option<f64>,
        patients: Option<f64>,
        high_quality: bool,
    }

    fn build(spec: Spec) -> Provider {
        let mut p = Provider::new(Ccn::new(spec.ccn).unwrap());
        p.name = Some(format!("Agency {}", spec.ccn));
        p.state = Some(spec.state.to_string());
        p.composite_quality_score = spec.score;
        p.estimated_total_patients = spec.patients;
        p.is_high_quality = Some(spec.high_quality);
        p.geography.is_rural = spec.rural;
        p.geography.is_frontier = Some(spec.frontier);
        p.geography.density_category = spec.density.map(str::to_string);
        p.geography.cbsa_name = spec.cbsa.map(str::to_string);
        p.geography.enhanced_county = spec.county.map(str::to_string);
        if spec.rural == Some(true) {
            p.geography.rucc_description = Some("Nonmetro - completely rural".to_string());
            p.geography.rucc_category = Some("Rural".to_string());
        } else if spec.rural == Some(false) {
            p.geography.rucc_description = Some("Metro - 1 million or more".to_string());
            p.geography.rucc_category = Some("Metro".to_string());
        }
        p
    }

    fn providers() -> Vec<Provider> {
        let base = Spec {
            ccn: "",
            state: "MT",
            rural: Some(true),
            frontier: false,
            density: Some("rural"),
            cbsa: None,
            county: Some("Garfield"),
            score: Some(3.0),
            patients: Some(100.0),
            high_quality: false,
        };
        vec![
            build(Spec { ccn: "270001", frontier: true, score: Some(4.0), high_quality: true, ..base }),
            build(Spec { ccn: "270002", frontier: true, patients: Some(50.0), ..base }),
            build(Spec {
                ccn: "270003",
                rural: Some(false),
                density: Some("high_density"),
                cbsa: Some("Billings, MT"),
                county: Some("Yellowstone"),
                score: Some(4.5),
                patients: Some(300.0),
                high_quality: true,
                ..base
            }),
            build(Spec {
                ccn: "050001",
                state: "CA",
                rural: Some(false),
                density: Some("medium_density"),
                cbsa: Some("Los Angeles-Long Beach, CA"),
                county: Some("Los Angeles"),
                score: Some(2.0),
                patients: Some(700.0),
                ..base
            }),
            build(Spec {
                ccn: "050002",
                state: "CA",
                rural: Some(false),
                density: Some("medium_density"),
                cbsa: Some("Los Angeles-Long Beach, CA"),
                county: Some("Orange"),
                score: None,
                patients: Some(300.0),
                ..base
            }),
            build(Spec { ccn: "050003", state: "CA", rural: None, density: None, county: None, ..base }),
        ]
    }

    #[test]
    fn test_rural_urban_groups() {
        let providers = providers();
        let analysis = RegionalAnalytics::new(&providers).rural_urban();

        let area: Vec<(AreaType, usize)> = analysis
            .rural_urban_comparison
            .iter()
            .map(|g| (g.area_type, g.provider_count))
            .collect();
        assert_eq!(area, vec![(AreaType::Urban, 3), (AreaType::Rural, 2)]);
        let urban = &analysis.rural_urban_comparison[0];
        assert_eq!(urban.states_covered, 2);
        assert_eq!(urban.counties_covered, 3);
        assert_eq!(urban.avg_quality_score, Some(3.25));

        assert_eq!(analysis.rucc_distribution.len(), 2);
        assert_eq!(analysis.rucc_distribution[0].rucc_category.as_deref(), Some("Metro"));

        let frontier = &analysis.frontier_stats;
        assert_eq!(frontier.total_providers, 2);
        assert_eq!(frontier.avg_quality_score, 3.5);
        assert_eq!(frontier.total_estimated_patients, 150.0);

        let rural_density = analysis
            .density_analysis
            .iter()
            .find(|g| g.density_category == "rural")
            .unwrap();
        assert_eq!(rural_density.high_quality_percentage, 50.0);
    }

    #[test]
    fn test_frontier_stats_empty() {
        let analysis = RegionalAnalytics::new(&[]).rural_urban();
        assert_eq!(analysis.frontier_stats.total_providers, 0);
        assert_eq!(analysis.frontier_stats.avg_quality_score, 0.0);
        assert!(analysis.rucc_distribution.is_empty());
    }

    #[test]
    fn test_state_summary_orders_by_rural_share() {
        let providers = providers();
        let analytics = RegionalAnalytics::new(&providers);
        let summary = analytics.state_rural_urban_summary(None);
        let states: Vec<&str> = summary.iter().map(|s| s.state.as_str()).collect();
        assert_eq!(states, vec!["MT", "CA"]);

        let mt = &summary[0];
        assert_eq!(mt.total_providers, 3);
        assert_eq!(mt.rural_providers, 2);
        assert_eq!(mt.frontier_providers, 2);
        assert_eq!(mt.rural_percentage, 66.67);
        assert_eq!(mt.rural_avg_quality, Some(3.5));
        assert_eq!(mt.urban_avg_quality, Some(4.5));
        assert_eq!(mt.unique_cbsas, 1);

        // CA's provider without a rural flag is left out
        let ca = analytics.state_rural_urban_summary(Some("ca"));
        assert_eq!(ca.len(), 1);
        assert_eq!(ca[0].total_providers, 2);
        assert_eq!(ca[0].rural_percentage, 0.0);
    }

    #[test]
    fn test_density_order() {
        let providers = providers();
        let categories: Vec<String> = RegionalAnalytics::new(&providers)
            .density_categories()
            .into_iter()
            .map(|c| c.density_category)
            .collect();
        assert_eq!(categories, vec!["high_density", "medium_density", "rural"]);
    }

    #[test]
    fn test_cbsa_analysis() {
        let providers = providers();
        let analytics = RegionalAnalytics::new(&providers);
        let la = analytics.cbsa("los angeles").unwrap();
        assert_eq!(la.total_providers, 2);
        assert_eq!(la.unique_counties, 2);
        assert_eq!(la.avg_quality_score, Some(2.0));
        assert_eq!(la.market_concentration_index, 0.58);
        assert_eq!(la.geographic_lat_range, 0.0);
        assert_eq!(la.top_providers[0].ccn.as_str(), "050001");

        assert!(matches!(analytics.cbsa("Boise"), Err(HomeHealthError::NoData { .. })));
    }

    #[test]
    fn test_cbsa_and_county_summaries() {
        let providers = providers();
        let analytics = RegionalAnalytics::new(&providers);
        let cbsas = analytics.cbsa_summary();
        assert_eq!(cbsas.len(), 2);
        assert_eq!(cbsas[0].cbsa_name, "Los Angeles-Long Beach, CA");
        assert_eq!(cbsas[0].unique_providers, 2);

        let counties = analytics.county_summary();
        assert_eq!(counties[0].county_name, "Los Angeles");
        assert_eq!(counties[0].enhanced_county_count, 1);
        assert_eq!(counties[0].original_county_count, 0);
        let garfield = counties.iter().find(|c| c.county_name == "Garfield").unwrap();
        assert_eq!(garfield.total_records, 2);
        assert_eq!(garfield.total_estimated_patients, 150.0);
        // no county at all
        assert_eq!(counties.len(), 4);
    }
}
