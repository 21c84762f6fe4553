/*!
 * Data type definitions for home health records
 *
 * Typed representations of the two reference tables (providers and the
 * ZIP/county crosswalk) plus the derived coverage-desert result. Every
 * enrichment column is optional: a missing value is `None`, never a sentinel.
 */

use serde::{Deserialize, Serialize};
use chrono::NaiveDate;

use crate::error::{HomeHealthError, Result};
use crate::geo;

/// CMS Certification Number - up to 6 alphanumerics, zero-padded to 6
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ccn(String);

impl Ccn {
    /// Create a new CCN, validating format and restoring dropped leading zeros
    pub fn new(ccn: &str) -> Result<Self> {
        let trimmed = ccn.trim();
        if trimmed.is_empty()
            || trimmed.len() > 6
            || !trimmed.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(HomeHealthError::malformed_ccn(ccn));
        }
        Ok(Ccn(format!("{:0>6}", trimmed.to_ascii_uppercase())))
    }

    /// Get the CCN as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ccn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Ccn {
    type Err = HomeHealthError;

    fn from_str(s: &str) -> Result<Self> {
        Ccn::new(s)
    }
}

/// Five-digit US ZIP code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZipCode(String);

impl ZipCode {
    /// Create a ZIP code; exactly 5 ASCII digits after trimming
    pub fn new(zip: &str) -> Result<Self> {
        let trimmed = zip.trim();
        if trimmed.len() != 5 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
            return Err(HomeHealthError::malformed_zip(zip));
        }
        Ok(ZipCode(trimmed.to_string()))
    }

    /// Build a ZIP code from a number, restoring leading zeros (`2134` -> `02134`)
    pub fn from_number(value: i64) -> Result<Self> {
        if !(0..=99_999).contains(&value) {
            return Err(HomeHealthError::malformed_zip(&value.to_string()));
        }
        Ok(ZipCode(format!("{:05}", value)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ZipCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ZipCode {
    type Err = HomeHealthError;

    fn from_str(s: &str) -> Result<Self> {
        ZipCode::new(s)
    }
}

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint { latitude, longitude }
    }

    /// Build a point only when both coordinates are present and finite
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(GeoPoint::new(lat, lon))
            }
            _ => None,
        }
    }

    /// Great-circle distance to another point in miles
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        geo::distance_miles(self.latitude, self.longitude, other.latitude, other.longitude)
    }
}

/// Star ratings published by CMS (0-5 scale)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StarRatings {
    pub quality_of_care: Option<f64>,
    pub patient_survey: Option<f64>,
}

impl StarRatings {
    /// Ratings that are present, in a fixed order
    pub fn available(&self) -> Vec<f64> {
        [self.quality_of_care, self.patient_survey]
            .into_iter()
            .flatten()
            .filter(|r| r.is_finite())
            .collect()
    }
}

/// Services a home health agency offers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    Nursing,
    PhysicalTherapy,
    OccupationalTherapy,
    SpeechPathology,
    MedicalSocial,
    HomeHealthAide,
}

impl Service {
    pub const ALL: [Service; 6] = [
        Service::Nursing,
        Service::PhysicalTherapy,
        Service::OccupationalTherapy,
        Service::SpeechPathology,
        Service::MedicalSocial,
        Service::HomeHealthAide,
    ];
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Service::Nursing => write!(f, "Nursing"),
            Service::PhysicalTherapy => write!(f, "Physical Therapy"),
            Service::OccupationalTherapy => write!(f, "Occupational Therapy"),
            Service::SpeechPathology => write!(f, "Speech Pathology"),
            Service::MedicalSocial => write!(f, "Medical Social"),
            Service::HomeHealthAide => write!(f, "Home Health Aide"),
        }
    }
}

impl std::str::FromStr for Service {
    type Err = HomeHealthError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "nursing" => Ok(Service::Nursing),
            "physicaltherapy" | "pt" => Ok(Service::PhysicalTherapy),
            "occupationaltherapy" | "ot" => Ok(Service::OccupationalTherapy),
            "speechpathology" | "speech" => Ok(Service::SpeechPathology),
            "medicalsocial" => Ok(Service::MedicalSocial),
            "homehealthaide" | "aide" => Ok(Service::HomeHealthAide),
            _ => Err(HomeHealthError::MalformedInput {
                value: s.to_string(),
                reason: "unknown service".to_string(),
            }),
        }
    }
}

/// Service offering flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOfferings {
    pub nursing: bool,
    pub physical_therapy: bool,
    pub occupational_therapy: bool,
    pub speech_pathology: bool,
    pub medical_social: bool,
    pub home_health_aide: bool,
}

impl ServiceOfferings {
    pub fn offers(&self, service: Service) -> bool {
        match service {
            Service::Nursing => self.nursing,
            Service::PhysicalTherapy => self.physical_therapy,
            Service::OccupationalTherapy => self.occupational_therapy,
            Service::SpeechPathology => self.speech_pathology,
            Service::MedicalSocial => self.medical_social,
            Service::HomeHealthAide => self.home_health_aide,
        }
    }

    pub fn count(&self) -> usize {
        Service::ALL.iter().filter(|s| self.offers(**s)).count()
    }
}

/// County, CBSA and rural-urban enrichment attached to a provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeographyEnrichment {
    /// County as reported in the CMS provider file
    pub county: Option<String>,
    /// County resolved from the ZIP crosswalk
    pub enhanced_county: Option<String>,
    pub county_fips: Option<String>,
    pub cbsa_name: Option<String>,
    pub cbsa_code: Option<String>,
    pub metro_type: Option<String>,
    pub rucc_code: Option<i64>,
    pub rucc_category: Option<String>,
    pub rucc_subcategory: Option<String>,
    pub rucc_description: Option<String>,
    pub density_category: Option<String>,
    pub density_description: Option<String>,
    pub is_rural: Option<bool>,
    pub is_frontier: Option<bool>,
}

/// Provider size by estimated annual patient volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderSizeCategory {
    Small,
    Medium,
    Large,
    #[serde(rename = "Very Large")]
    VeryLarge,
}

impl ProviderSizeCategory {
    pub fn from_patients(patients: f64) -> Self {
        if patients <= 100.0 {
            ProviderSizeCategory::Small
        } else if patients <= 500.0 {
            ProviderSizeCategory::Medium
        } else if patients <= 1000.0 {
            ProviderSizeCategory::Large
        } else {
            ProviderSizeCategory::VeryLarge
        }
    }
}

impl std::fmt::Display for ProviderSizeCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderSizeCategory::Small => write!(f, "Small"),
            ProviderSizeCategory::Medium => write!(f, "Medium"),
            ProviderSizeCategory::Large => write!(f, "Large"),
            ProviderSizeCategory::VeryLarge => write!(f, "Very Large"),
        }
    }
}

/// A certified home health agency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub ccn: Ccn,
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<ZipCode>,
    pub phone: Option<String>,
    pub ownership_type: Option<String>,
    pub certification_date: Option<NaiveDate>,
    pub services: ServiceOfferings,
    pub ratings: StarRatings,
    pub composite_quality_score: Option<f64>,
    pub is_high_quality: Option<bool>,
    pub completed_surveys: Option<u32>,
    /// Survey response rate in percent
    pub survey_response_rate: Option<f64>,
    pub estimated_total_patients: Option<f64>,
    pub unique_zips_served: Option<u32>,
    /// Coordinates from the CMS provider file
    pub location: Option<GeoPoint>,
    /// Coordinates resolved from the ZIP crosswalk
    pub enhanced_location: Option<GeoPoint>,
    pub geography: GeographyEnrichment,
}

impl Provider {
    /// Minimal provider with only an identifier; everything else unknown
    pub fn new(ccn: Ccn) -> Self {
        Provider {
            ccn,
            name: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            phone: None,
            ownership_type: None,
            certification_date: None,
            services: ServiceOfferings::default(),
            ratings: StarRatings::default(),
            composite_quality_score: None,
            is_high_quality: None,
            completed_surveys: None,
            survey_response_rate: None,
            estimated_total_patients: None,
            unique_zips_served: None,
            location: None,
            enhanced_location: None,
            geography: GeographyEnrichment::default(),
        }
    }

    /// Enhanced coordinates, falling back to the original ones
    pub fn best_location(&self) -> Option<GeoPoint> {
        self.enhanced_location.or(self.location)
    }

    /// Enhanced county, falling back to the reported county
    pub fn county_name(&self) -> Option<&str> {
        self.geography
            .enhanced_county
            .as_deref()
            .or(self.geography.county.as_deref())
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed provider)")
    }

    pub fn high_quality(&self) -> bool {
        self.is_high_quality.unwrap_or(false)
    }

    pub fn size_category(&self) -> Option<ProviderSizeCategory> {
        self.estimated_total_patients
            .map(ProviderSizeCategory::from_patients)
    }

    /// Case-insensitive state comparison
    pub fn in_state(&self, state: &str) -> bool {
        self.state
            .as_deref()
            .map(|s| s.trim().eq_ignore_ascii_case(state.trim()))
            .unwrap_or(false)
    }
}

/// One row of the ZIP/county crosswalk with demand figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZipDemographic {
    pub zip_code: ZipCode,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub county_fips: Option<String>,
    pub cbsa_code: Option<String>,
    pub cbsa_name: Option<String>,
    pub location: Option<GeoPoint>,
    pub population: Option<u64>,
    pub medicare_eligible: Option<u64>,
    pub medicare_enrolled: Option<u64>,
    /// Stored penetration percent, if the crosswalk carries one
    pub medicare_penetration_pct: Option<f64>,
    pub is_rural: Option<bool>,
    pub is_frontier: Option<bool>,
    pub rucc_code: Option<i64>,
    pub rucc_description: Option<String>,
    pub density_category: Option<String>,
}

impl ZipDemographic {
    pub fn new(zip_code: ZipCode) -> Self {
        ZipDemographic {
            zip_code,
            city: None,
            state: None,
            county: None,
            county_fips: None,
            cbsa_code: None,
            cbsa_name: None,
            location: None,
            population: None,
            medicare_eligible: None,
            medicare_enrolled: None,
            medicare_penetration_pct: None,
            is_rural: None,
            is_frontier: None,
            rucc_code: None,
            rucc_description: None,
            density_category: None,
        }
    }

    /// Medicare penetration percent; the stored value wins, otherwise
    /// enrolled / eligible * 100 when eligible is positive
    pub fn penetration(&self) -> Option<f64> {
        if let Some(stored) = self.medicare_penetration_pct.filter(|p| p.is_finite()) {
            return Some(stored);
        }
        match (self.medicare_enrolled, self.medicare_eligible) {
            (Some(enrolled), Some(eligible)) if eligible > 0 => {
                Some(enrolled as f64 / eligible as f64 * 100.0)
            }
            _ => None,
        }
    }

    pub fn rural(&self) -> bool {
        self.is_rural.unwrap_or(false)
    }

    pub fn frontier(&self) -> bool {
        self.is_frontier.unwrap_or(false)
    }
}

/// Underservice level of a ZIP code, keyed on the provider count in radius
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DesertSeverity {
    #[serde(rename = "Complete Desert")]
    CompleteDesert,
    #[serde(rename = "Severe Underservice")]
    SevereUnderservice,
    #[serde(rename = "Moderate Underservice")]
    ModerateUnderservice,
}

impl DesertSeverity {
    /// 0 providers, 1 provider, 2 or more
    pub fn from_count(providers_within_radius: usize) -> Self {
        match providers_within_radius {
            0 => DesertSeverity::CompleteDesert,
            1 => DesertSeverity::SevereUnderservice,
            _ => DesertSeverity::ModerateUnderservice,
        }
    }
}

impl std::fmt::Display for DesertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DesertSeverity::CompleteDesert => write!(f, "Complete Desert"),
            DesertSeverity::SevereUnderservice => write!(f, "Severe Underservice"),
            DesertSeverity::ModerateUnderservice => write!(f, "Moderate Underservice"),
        }
    }
}

/// A candidate ZIP code classified as underserved
///
/// Flat so it can be written as a CSV row directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageDesertResult {
    pub zip_code: ZipCode,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub population: Option<u64>,
    pub medicare_eligible: Option<u64>,
    pub medicare_enrolled: Option<u64>,
    pub medicare_penetration_pct: Option<f64>,
    pub is_rural: Option<bool>,
    pub is_frontier: Option<bool>,
    pub rucc_description: Option<String>,
    pub density_category: Option<String>,
    /// Providers whose own ZIP is this ZIP (informational)
    pub providers_in_zip: usize,
    pub providers_within_radius: usize,
    pub desert_severity: DesertSeverity,
    pub market_opportunity_score: f64,
}

impl CoverageDesertResult {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}

/// A provider paired with its distance from a query point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDistance {
    pub provider: Provider,
    pub distance_miles: f64,
}

/// Flat provider view used in rankings and result-set exports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub ccn: Ccn,
    pub name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<ZipCode>,
    pub composite_quality_score: Option<f64>,
    pub is_high_quality: bool,
    pub estimated_total_patients: Option<f64>,
    pub distance_miles: Option<f64>,
}

impl From<&Provider> for ProviderSummary {
    fn from(provider: &Provider) -> Self {
        ProviderSummary {
            ccn: provider.ccn.clone(),
            name: provider.name.clone(),
            city: provider.city.clone(),
            state: provider.state.clone(),
            zip_code: provider.zip_code.clone(),
            composite_quality_score: provider.composite_quality_score,
            is_high_quality: provider.high_quality(),
            estimated_total_patients: provider.estimated_total_patients,
            distance_miles: None,
        }
    }
}

impl From<&ProviderDistance> for ProviderSummary {
    fn from(ranked: &ProviderDistance) -> Self {
        let mut summary = ProviderSummary::from(&ranked.provider);
        summary.distance_miles = Some(ranked.distance_miles);
        summary
    }
}
