/*!
 * Composable provider filters
 *
 * Each builder method adds one predicate; a provider matches when every
 * predicate holds. Filters are owned and thread-safe so they can be stored,
 * passed to a repository-backed facade, or applied to a borrowed slice.
 */

use std::fmt;

use crate::data_types::*;

type Predicate = Box<dyn Fn(&Provider) -> bool + Send + Sync>;

fn contains_ignore_case(field: Option<&str>, needle: &str) -> bool {
    field
        .map(|value| value.to_lowercase().contains(needle))
        .unwrap_or(false)
}

/// Best composite score first, unscored last, ties by CCN
pub fn sort_by_quality(providers: &mut [&Provider]) {
    providers.sort_by(|a, b| {
        match (a.composite_quality_score, b.composite_quality_score) {
            (Some(x), Some(y)) => y.total_cmp(&x),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        }
        .then_with(|| a.ccn.cmp(&b.ccn))
    });
}

/// Builder of AND-combined provider predicates
#[derive(Default)]
pub struct ProviderFilter {
    predicates: Vec<Predicate>,
    descriptions: Vec<String>,
}

impl fmt::Debug for ProviderFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderFilter")
            .field("predicates", &self.descriptions)
            .finish()
    }
}

impl ProviderFilter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, description: String, predicate: impl Fn(&Provider) -> bool + Send + Sync + 'static) -> Self {
        self.descriptions.push(description);
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Filter by state (case-insensitive)
    pub fn state(self, state: &str) -> Self {
        let state = state.trim().to_ascii_uppercase();
        self.push(format!("state = {state}"), move |p| p.in_state(&state))
    }

    /// Filter by any of several states
    pub fn states_in<S: AsRef<str>>(self, states: &[S]) -> Self {
        let states: Vec<String> = states
            .iter()
            .map(|s| s.as_ref().trim().to_ascii_uppercase())
            .collect();
        self.push(format!("state in {states:?}"), move |p| {
            states.iter().any(|s| p.in_state(s))
        })
    }

    pub fn city_contains(self, city: &str) -> Self {
        let needle = city.trim().to_lowercase();
        self.push(format!("city ~ {needle}"), move |p| contains_ignore_case(p.city.as_deref(), &needle))
    }

    /// Matches the reported or the crosswalk county
    pub fn county_contains(self, county: &str) -> Self {
        let needle = county.trim().to_lowercase();
        self.push(format!("county ~ {needle}"), move |p| {
            contains_ignore_case(p.geography.county.as_deref(), &needle)
                || contains_ignore_case(p.geography.enhanced_county.as_deref(), &needle)
        })
    }

    pub fn name_contains(self, name: &str) -> Self {
        let needle = name.trim().to_lowercase();
        self.push(format!("name ~ {needle}"), move |p| contains_ignore_case(p.name.as_deref(), &needle))
    }

    pub fn ccn_contains(self, ccn: &str) -> Self {
        let needle = ccn.trim().to_lowercase();
        self.push(format!("ccn ~ {needle}"), move |p| p.ccn.as_str().to_lowercase().contains(&needle))
    }

    pub fn zip(self, zip: ZipCode) -> Self {
        self.push(format!("zip = {zip}"), move |p| p.zip_code.as_ref() == Some(&zip))
    }

    pub fn high_quality_only(self) -> Self {
        self.push("high quality".to_string(), |p| p.high_quality())
    }

    pub fn min_quality(self, min: f64) -> Self {
        self.push(format!("quality >= {min}"), move |p| {
            p.composite_quality_score.map(|s| s >= min).unwrap_or(false)
        })
    }

    pub fn max_quality(self, max: f64) -> Self {
        self.push(format!("quality <= {max}"), move |p| {
            p.composite_quality_score.map(|s| s <= max).unwrap_or(false)
        })
    }

    pub fn min_patient_volume(self, min: f64) -> Self {
        self.push(format!("patients >= {min}"), move |p| {
            p.estimated_total_patients.map(|v| v >= min).unwrap_or(false)
        })
    }

    pub fn ownership_contains(self, ownership: &str) -> Self {
        let needle = ownership.trim().to_lowercase();
        self.push(format!("ownership ~ {needle}"), move |p| {
            contains_ignore_case(p.ownership_type.as_deref(), &needle)
        })
    }

    pub fn offers(self, service: Service) -> Self {
        self.push(format!("offers {service}"), move |p| p.services.offers(service))
    }

    pub fn rural_only(self) -> Self {
        self.push("rural".to_string(), |p| p.geography.is_rural == Some(true))
    }

    pub fn frontier_only(self) -> Self {
        self.push("frontier".to_string(), |p| p.geography.is_frontier == Some(true))
    }

    pub fn rucc_category(self, category: &str) -> Self {
        let category = category.trim().to_string();
        self.push(format!("rucc category = {category}"), move |p| {
            p.geography
                .rucc_category
                .as_deref()
                .map(|c| c.trim().eq_ignore_ascii_case(&category))
                .unwrap_or(false)
        })
    }

    pub fn cbsa_name_contains(self, cbsa: &str) -> Self {
        let needle = cbsa.trim().to_lowercase();
        self.push(format!("cbsa ~ {needle}"), move |p| {
            contains_ignore_case(p.geography.cbsa_name.as_deref(), &needle)
        })
    }

    /// Add an arbitrary predicate
    pub fn custom<F>(self, description: &str, predicate: F) -> Self
    where
        F: Fn(&Provider) -> bool + Send + Sync + 'static,
    {
        self.push(description.to_string(), predicate)
    }

    pub fn matches(&self, provider: &Provider) -> bool {
        self.predicates.iter().all(|predicate| predicate(provider))
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Human-readable list of active predicates
    pub fn describe(&self) -> &[String] {
        &self.descriptions
    }

    /// Matching providers, best composite score first
    pub fn apply<'a>(&self, providers: &'a [Provider]) -> Vec<&'a Provider> {
        let mut matched: Vec<&Provider> = providers.iter().filter(|p| self.matches(p)).collect();
        sort_by_quality(&mut matched);
        matched
    }

    pub fn count(&self, providers: &[Provider]) -> usize {
        providers.iter().filter(|p| self.matches(p)).count()
    }
}
