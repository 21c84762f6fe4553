/*!
 * # Home Health Coverage Analytics
 *
 * A Rust library for finding gaps in Medicare home health coverage and
 * sizing the markets around them, built on the CMS home health provider list
 * and a ZIP-level demographic crosswalk.
 *
 * ## Features
 *
 * - **Coverage deserts**: ZIP codes with Medicare demand and few providers in reach
 * - **Market sizing**: population, enrollment and estimated value over a ZIP set
 * - **Expansion advice**: underserved ZIPs near an existing agency
 * - **Quality benchmarks**: star-rating distributions and peer comparison
 * - **Regional views**: rural-urban, density, CBSA and county breakdowns
 * - **Service areas**: reported coverage and nearby under-served ZIPs per agency
 * - **Pluggable storage**: a read-only SQLite repository, an in-memory dataset, and a cache
 *
 * ## Quick Start
 *
 * ```no_run
 * use homehealth::prelude::*;
 *
 * # fn main() -> Result<()> {
 * let repository = SqliteRepository::open("data/processed/cms_homehealth.db")?;
 * let analytics = HomeHealthAnalytics::new(CachedRepository::new(repository));
 *
 * let criteria = DesertCriteria::default().state(Some("MS")).rural_only(true);
 * for desert in analytics.classify_deserts(&criteria)?.iter().take(10) {
 *     println!("{} {:?} {:.1}", desert.zip_code, desert.desert_severity, desert.market_opportunity_score);
 * }
 * # Ok(())
 * # }
 * ```
 *
 * ## Working in Memory
 *
 * ```no_run
 * # use homehealth::prelude::*;
 * # fn main() -> Result<()> {
 * let dataset = DatasetBuilder::new()
 *     .database("data/processed/cms_homehealth.db")
 *     .state("TX")
 *     .build()?;
 *
 * dataset.statistics().print_summary();
 *
 * let top = dataset.search(&ProviderFilter::new().city_contains("austin").high_quality_only());
 * println!("{} high-quality agencies in Austin", top.len());
 *
 * // Dataset is itself a repository
 * let report = market_potential(&dataset, &["78701", "78702"])?;
 * println!("{:.0}", report.market_opportunity.estimated_annual_market_value);
 * # Ok(())
 * # }
 * ```
 *
 * ## Exporting Results
 *
 * ```no_run
 * # use homehealth::prelude::*;
 * # use std::path::Path;
 * # fn main() -> Result<()> {
 * # let analytics = HomeHealthAnalytics::new(SqliteRepository::open("hh.db")?);
 * let deserts = analytics.classify_deserts(&DesertCriteria::default())?;
 * export_rows(&deserts, ExportFormat::Csv, Path::new("deserts.csv"))?;
 * # Ok(())
 * # }
 * ```
 *
 * ## Configuration
 *
 * [`config::AppConfig::load`] layers built-in defaults, an optional TOML file
 * and `HOMEHEALTH_*` environment variables. See [`config`] for the keys.
 */

// Re-export error types from root
pub use error::{ExportFormat, HomeHealthError, Result};

// Public modules
pub mod analytics;
pub mod cache;
pub mod config;
pub mod data_types;
pub mod dataset;
pub mod deserts;
pub mod error;
pub mod expansion;
pub mod export;
pub mod filter;
pub mod geo;
pub mod market;
pub mod proximity;
pub mod quality;
pub mod regional;
pub mod repository;
pub mod schema;
pub mod service_areas;

/// Prelude module for convenient imports
///
/// ```
/// use homehealth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::analytics::HomeHealthAnalytics;
    pub use crate::cache::{CacheStats, CachedRepository};
    pub use crate::config::{AppConfig, ConfigBuilder};
    pub use crate::data_types::*;
    pub use crate::dataset::{Dataset, DatasetBuilder, DatasetStatistics};
    pub use crate::deserts::{classify_deserts, desert_summary, DesertCriteria, DesertSummary};
    pub use crate::error::{HomeHealthError, Result};
    pub use crate::expansion::{expansion_opportunities, ExpansionOpportunity, ExpansionReport};
    pub use crate::export::{export_rows, write_report, write_rows, CsvExporter, JsonExporter, ResultExporter};
    pub use crate::filter::ProviderFilter;
    pub use crate::market::{market_potential, CompetitorScope, MarketPotentialReport};
    pub use crate::proximity::{nearest_providers_to_zip, NearestProviders};
    pub use crate::quality::{ComparisonScope, QualityBenchmarks};
    pub use crate::regional::{CbsaAnalysis, RegionalAnalytics, RuralUrbanAnalysis};
    pub use crate::repository::{Repository, SqliteRepository, ZipCriteria};
    pub use crate::service_areas::{service_area_coverage, service_area_gaps, ServiceAreaCoverage, ServiceAreaGapReport};
    pub use crate::ExportFormat;
}

/// Fixed values shared across analyses
pub mod constants {
    pub use crate::deserts::{
        DEFAULT_MAX_PROVIDERS_IN_RADIUS, DEFAULT_MIN_MEDICARE_POPULATION, DEFAULT_RADIUS_MILES,
    };
    pub use crate::expansion::DEFAULT_SEARCH_RADIUS_MILES;
    pub use crate::geo::{EARTH_RADIUS_MILES, MILES_PER_DEGREE_LATITUDE};
    pub use crate::market::REVENUE_PER_PATIENT;
    pub use crate::proximity::{DEFAULT_NEAREST_RADIUS_MILES, NEAREST_PROVIDER_LIMIT};
    pub use crate::quality::HIGH_QUALITY_SCORE;
    pub use crate::service_areas::{GAP_MAX_PROVIDERS, GAP_RADIUS_MILES};

    /// Table of home health agencies
    pub const PROVIDERS_TABLE: &str = "providers";

    /// Table of ZIP demographics and geography
    pub const ZIP_CROSSWALK_TABLE: &str = "zip_county_crosswalk";

    /// Table of ZIP codes each provider reports serving
    pub const SERVICE_AREAS_TABLE: &str = "service_areas";
}

/// Common recipes
pub mod cookbook {
    use crate::prelude::*;

    /// Rural deserts in one state, best opportunity first
    pub fn rural_deserts_in_state<R: Repository + ?Sized>(
        repository: &R,
        state: &str,
    ) -> Result<Vec<CoverageDesertResult>> {
        classify_deserts(
            repository,
            &DesertCriteria::default().state(Some(state)).rural_only(true),
        )
    }

    /// High-quality agencies in a state offering a service
    pub fn high_quality_offering<'a>(dataset: &'a Dataset, state: &str, service: Service) -> Vec<&'a Provider> {
        dataset.search(
            &ProviderFilter::new()
                .state(state)
                .offers(service)
                .high_quality_only(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_identifier_validation() {
        assert_eq!(Ccn::new("17001").unwrap().as_str(), "017001");
        assert!(Ccn::new("1234567").is_err());
        assert!(ZipCode::new("0501").is_err());
        assert!(ZipCode::new("00501").is_ok());
    }

    #[test]
    fn test_cookbook_rural_deserts() {
        let mut zip = ZipDemographic::new(ZipCode::new("39040").unwrap());
        zip.state = Some("MS".to_string());
        zip.location = Some(GeoPoint::new(32.6, -90.4));
        zip.medicare_eligible = Some(400);
        zip.is_rural = Some(true);
        let dataset = Dataset::from_records(Vec::new(), vec![zip]);

        let deserts = super::cookbook::rural_deserts_in_state(&dataset, "ms").unwrap();
        assert_eq!(deserts.len(), 1);
        assert_eq!(deserts[0].desert_severity, DesertSeverity::CompleteDesert);
        assert!(super::cookbook::rural_deserts_in_state(&dataset, "AL").unwrap().is_empty());
    }
}
