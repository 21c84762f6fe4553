/*!
 * Single entry point for every analysis
 *
 * [`HomeHealthAnalytics`] owns a [`Repository`] and the default parameters
 * from [`AppConfig`]. It validates raw identifiers, turns unknown keys into
 * `NotFound` errors and delegates to the analysis modules.
 */

use tracing::{debug, instrument};

use crate::config::AppConfig;
use crate::data_types::*;
use crate::dataset::{Dataset, DatasetStatistics};
use crate::deserts::{self, DesertCriteria, DesertSummary};
use crate::error::{HomeHealthError, Result};
use crate::expansion::{self, ExpansionReport};
use crate::filter::ProviderFilter;
use crate::market::{self, CompetitorAnalysis, CompetitorScope, CountyMarketAnalysis, MarketAnalytics, MarketPotentialReport};
use crate::proximity::{self, NearestProviders};
use crate::quality::{self, ComparisonScope, ProviderComparison, QualityAnalytics, QualityBenchmarks};
use crate::regional::{
    CbsaAnalysis, CbsaSummary, CountySummary, DensityCategorySummary, RegionalAnalytics, RuralUrbanAnalysis,
    StateRuralUrbanSummary,
};
use crate::repository::Repository;
use crate::service_areas::{self, ServiceAreaCoverage, ServiceAreaGapReport};

/// Analyses over one repository
pub struct HomeHealthAnalytics<R> {
    repository: R,
    desert_defaults: DesertCriteria,
    expansion_radius_miles: f64,
}

impl<R: Repository> HomeHealthAnalytics<R> {
    /// Use the built-in defaults
    pub fn new(repository: R) -> Self {
        Self {
            repository,
            desert_defaults: DesertCriteria::default(),
            expansion_radius_miles: expansion::DEFAULT_SEARCH_RADIUS_MILES,
        }
    }

    /// Take desert and expansion defaults from `config`
    pub fn with_config(repository: R, config: &AppConfig) -> Self {
        Self {
            repository,
            desert_defaults: DesertCriteria::default()
                .radius(config.default_radius_miles)
                .min_population(config.default_min_medicare_population)
                .max_providers(config.default_max_providers_in_radius),
            expansion_radius_miles: config.expansion_search_radius_miles,
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Criteria built from the configured defaults
    pub fn desert_criteria(&self) -> DesertCriteria {
        self.desert_defaults.clone()
    }

    /// All providers with missing quality fields derived
    fn scored_providers(&self) -> Result<Vec<Provider>> {
        let mut providers = self.repository.providers()?;
        quality::derive_quality_fields(&mut providers);
        Ok(providers)
    }

    /// Look up one provider by CCN
    pub fn provider(&self, ccn: &str) -> Result<Provider> {
        let ccn = Ccn::new(ccn)?;
        self.repository
            .provider(&ccn)?
            .ok_or_else(|| HomeHealthError::provider_not_found(ccn.as_str()))
    }

    /// Look up one ZIP record
    pub fn zip_record(&self, zip: &str) -> Result<ZipDemographic> {
        let zip = ZipCode::new(zip)?;
        self.repository
            .zip_record(&zip)?
            .ok_or_else(|| HomeHealthError::zip_not_found(zip.as_str()))
    }

    #[instrument(skip(self), level = "debug")]
    pub fn classify_deserts(&self, criteria: &DesertCriteria) -> Result<Vec<CoverageDesertResult>> {
        deserts::classify_deserts(&self.repository, criteria)
    }

    pub fn desert_summary(&self, state: Option<&str>) -> Result<DesertSummary> {
        deserts::desert_summary(&self.repository, state)
    }

    /// Geocoded providers closest to a ZIP centroid
    pub fn nearest_providers(&self, zip: &str, max_radius_miles: f64) -> Result<NearestProviders> {
        let zip = ZipCode::new(zip)?;
        proximity::nearest_providers_to_zip(&self.repository, &zip, max_radius_miles)
    }

    pub fn market_potential<S: AsRef<str>>(&self, zip_codes: &[S]) -> Result<MarketPotentialReport> {
        market::market_potential(&self.repository, zip_codes)
    }

    /// Expansion targets around a provider; `None` uses the configured radius
    pub fn expansion_opportunities(&self, ccn: &str, search_radius_miles: Option<f64>) -> Result<ExpansionReport> {
        let ccn = Ccn::new(ccn)?;
        let radius = search_radius_miles.unwrap_or(self.expansion_radius_miles);
        expansion::expansion_opportunities(&self.repository, &ccn, radius)
    }

    pub fn quality_benchmarks(&self, state: Option<&str>) -> Result<QualityBenchmarks> {
        let providers = self.scored_providers()?;
        QualityAnalytics::new(&providers).benchmarks(state)
    }

    pub fn provider_comparison(&self, ccn: &str, scope: ComparisonScope) -> Result<ProviderComparison> {
        let target = self.provider(ccn)?;
        let providers = self.scored_providers()?;
        let target = providers
            .iter()
            .find(|p| p.ccn == target.ccn)
            .cloned()
            .unwrap_or(target);
        QualityAnalytics::new(&providers).compare(&target, scope)
    }

    pub fn county_market_analysis(&self, county: &str, state: &str) -> Result<CountyMarketAnalysis> {
        let providers = self.scored_providers()?;
        let analysis = MarketAnalytics::new(&providers).county_market(county, state);
        debug!(county, state, providers = analysis.total_providers, "county market analysed");
        Ok(analysis)
    }

    pub fn competitor_analysis(&self, ccn: &str, scope: CompetitorScope) -> Result<CompetitorAnalysis> {
        let target = self.provider(ccn)?;
        let providers = self.scored_providers()?;
        let target = providers
            .iter()
            .find(|p| p.ccn == target.ccn)
            .cloned()
            .unwrap_or(target);
        Ok(MarketAnalytics::new(&providers).competitors(&target, scope))
    }

    pub fn rural_urban_analysis(&self) -> Result<RuralUrbanAnalysis> {
        let providers = self.scored_providers()?;
        Ok(RegionalAnalytics::new(&providers).rural_urban())
    }

    /// Rural share per state; `Some` narrows to one state
    pub fn state_rural_urban_summary(&self, state: Option<&str>) -> Result<Vec<StateRuralUrbanSummary>> {
        let providers = self.scored_providers()?;
        Ok(RegionalAnalytics::new(&providers).state_rural_urban_summary(state))
    }

    pub fn density_category_analysis(&self) -> Result<Vec<DensityCategorySummary>> {
        let providers = self.scored_providers()?;
        Ok(RegionalAnalytics::new(&providers).density_categories())
    }

    /// Market view of every provider whose CBSA name contains `cbsa_name`
    pub fn cbsa_analysis(&self, cbsa_name: &str) -> Result<CbsaAnalysis> {
        let providers = self.scored_providers()?;
        let analysis = RegionalAnalytics::new(&providers).cbsa(cbsa_name)?;
        debug!(cbsa_name, providers = analysis.total_providers, "CBSA analysed");
        Ok(analysis)
    }

    pub fn cbsa_summary(&self) -> Result<Vec<CbsaSummary>> {
        let providers = self.scored_providers()?;
        Ok(RegionalAnalytics::new(&providers).cbsa_summary())
    }

    pub fn county_summary(&self) -> Result<Vec<CountySummary>> {
        let providers = self.scored_providers()?;
        Ok(RegionalAnalytics::new(&providers).county_summary())
    }

    /// ZIP codes a provider reports serving, resolved through the crosswalk
    pub fn service_area_coverage(&self, ccn: &str) -> Result<ServiceAreaCoverage> {
        let ccn = Ccn::new(ccn)?;
        service_areas::service_area_coverage(&self.repository, &ccn)
    }

    #[instrument(skip(self), level = "debug")]
    pub fn service_area_gaps(&self, ccn: &str) -> Result<ServiceAreaGapReport> {
        let ccn = Ccn::new(ccn)?;
        service_areas::service_area_gaps(&self.repository, &ccn)
    }

    /// Matching providers, best composite score first
    pub fn search_providers(&self, filter: &ProviderFilter) -> Result<Vec<Provider>> {
        let providers = self.scored_providers()?;
        Ok(filter.apply(&providers).into_iter().cloned().collect())
    }

    /// Coverage statistics over a full snapshot of the repository
    pub fn statistics(&self) -> Result<DatasetStatistics> {
        Ok(Dataset::from_repository(&self.repository)?.statistics())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;

    fn dataset() -> Dataset {
        let mut a = Provider::new(Ccn::new("250001").unwrap());
        a.state = Some("MS".to_string());
        a.enhanced_location = Some(GeoPoint::new(32.30, -90.18));
        a.ratings.quality_of_care = Some(4.5);

        let mut b = Provider::new(Ccn::new("250002").unwrap());
        b.state = Some("MS".to_string());
        b.enhanced_location = Some(GeoPoint::new(32.35, -90.20));
        b.ratings.quality_of_care = Some(3.0);

        let mut zip = ZipDemographic::new(ZipCode::new("39201").unwrap());
        zip.state = Some("MS".to_string());
        zip.location = Some(GeoPoint::new(32.29, -90.18));
        zip.medicare_eligible = Some(900);

        Dataset::from_records(vec![a, b], vec![zip])
    }

    #[test]
    fn test_lookup_errors() {
        let analytics = HomeHealthAnalytics::new(dataset());
        assert!(matches!(analytics.provider("250001"), Ok(p) if p.ccn.as_str() == "250001"));
        assert!(matches!(analytics.provider("999999"), Err(HomeHealthError::NotFound { .. })));
        assert!(matches!(analytics.provider("25-01"), Err(HomeHealthError::MalformedInput { .. })));
        assert!(matches!(analytics.nearest_providers("3920", 25.0), Err(HomeHealthError::MalformedInput { .. })));
    }

    #[test]
    fn test_config_defaults_flow_into_criteria() {
        let config = ConfigBuilder::new()
            .radius_miles(10.0)
            .max_providers_in_radius(0)
            .build()
            .unwrap();
        let analytics = HomeHealthAnalytics::with_config(dataset(), &config);
        // two providers within a few miles, so no desert at max 0
        let deserts = analytics.classify_deserts(&analytics.desert_criteria()).unwrap();
        assert!(deserts.is_empty());

        let loose = analytics.desert_criteria().max_providers(5);
        assert_eq!(analytics.classify_deserts(&loose).unwrap().len(), 1);
    }

    #[test]
    fn test_search_and_comparison() {
        let analytics = HomeHealthAnalytics::new(dataset());
        let found = analytics.search_providers(&ProviderFilter::new().state("ms")).unwrap();
        assert_eq!(found[0].ccn.as_str(), "250001");

        let comparison = analytics.provider_comparison("250002", ComparisonScope::State).unwrap();
        assert_eq!(comparison.comparison.provider_rank, 2);
        assert_eq!(analytics.statistics().unwrap().total_providers, 2);
    }

    #[test]
    fn test_regional_views_without_enrichment() {
        let analytics = HomeHealthAnalytics::new(dataset());
        let states = analytics.state_rural_urban_summary(None).unwrap();
        // neither provider carries a rural flag
        assert!(states.is_empty());
        assert!(matches!(analytics.cbsa_analysis("Jackson"), Err(HomeHealthError::NoData { .. })));

        let counties = analytics.county_summary().unwrap();
        assert!(counties.is_empty());
        assert_eq!(analytics.rural_urban_analysis().unwrap().frontier_stats.total_providers, 0);
    }

    #[test]
    fn test_service_area_lookups_validate_ccn() {
        let analytics = HomeHealthAnalytics::new(dataset());
        assert!(matches!(analytics.service_area_gaps("25-01"), Err(HomeHealthError::MalformedInput { .. })));
        assert!(matches!(analytics.service_area_coverage("999999"), Err(HomeHealthError::NotFound { .. })));

        let gaps = analytics.service_area_gaps("250001").unwrap();
        let zips: Vec<&str> = gaps.gap_areas.iter().map(|g| g.zip_code.as_str()).collect();
        assert_eq!(zips, vec!["39201"]);
        assert!(analytics.service_area_coverage("250002").unwrap().zip_codes_served.is_empty());
    }
}
