/*!
 * Radius search over geocoded providers
 *
 * [`ProximityIndex`] keeps points sorted by latitude so a radius query only
 * runs the Haversine test on the latitude band that can contain matches.
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};
use crate::geo;
use crate::repository::Repository;

/// Upper bound on results from [`nearest_providers_to_zip`]
pub const NEAREST_PROVIDER_LIMIT: usize = 50;

/// Default search radius for nearest-provider lookups
pub const DEFAULT_NEAREST_RADIUS_MILES: f64 = 100.0;

#[derive(Debug, Clone)]
struct Entry<T> {
    point: GeoPoint,
    item: T,
}

/// Latitude-sorted point index
#[derive(Debug, Clone)]
pub struct ProximityIndex<T> {
    entries: Vec<Entry<T>>,
}

impl<T> ProximityIndex<T> {
    /// Build an index; points with non-finite coordinates are dropped
    pub fn new(items: impl IntoIterator<Item = (GeoPoint, T)>) -> Self {
        let mut entries: Vec<Entry<T>> = items
            .into_iter()
            .filter(|(point, _)| point.latitude.is_finite() && point.longitude.is_finite())
            .map(|(point, item)| Entry { point, item })
            .collect();
        entries.sort_by(|a, b| a.point.latitude.total_cmp(&b.point.latitude));
        ProximityIndex { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn band(&self, center: &GeoPoint, radius_miles: f64) -> &[Entry<T>] {
        if radius_miles.is_nan() || radius_miles < 0.0 {
            return &[];
        }
        let half_width = geo::latitude_band_degrees(radius_miles);
        let low = center.latitude - half_width;
        let high = center.latitude + half_width;
        let start = self.entries.partition_point(|e| e.point.latitude < low);
        let end = self.entries.partition_point(|e| e.point.latitude <= high);
        &self.entries[start..end.max(start)]
    }

    /// Number of points within `radius_miles` (inclusive) of `center`
    pub fn count_within(&self, center: &GeoPoint, radius_miles: f64) -> usize {
        self.band(center, radius_miles)
            .iter()
            .filter(|e| center.distance_to(&e.point) <= radius_miles)
            .count()
    }

    /// Items within `radius_miles` with their distances, in index order
    pub fn within(&self, center: &GeoPoint, radius_miles: f64) -> Vec<(&T, f64)> {
        self.band(center, radius_miles)
            .iter()
            .filter_map(|e| {
                let distance = center.distance_to(&e.point);
                (distance <= radius_miles).then_some((&e.item, distance))
            })
            .collect()
    }
}

impl ProximityIndex<usize> {
    /// Index providers by enhanced location; items are positions in `providers`
    pub fn for_providers(providers: &[Provider]) -> Self {
        ProximityIndex::new(
            providers
                .iter()
                .enumerate()
                .filter_map(|(i, p)| p.enhanced_location.map(|point| (point, i))),
        )
    }
}

/// Count providers with enhanced coordinates within the radius of a point
pub fn count_providers_within<R: Repository + ?Sized>(
    repository: &R,
    point: GeoPoint,
    radius_miles: f64,
) -> Result<usize> {
    Ok(repository.providers_near(point, radius_miles)?.len())
}

/// The ZIP a nearest-provider search was centred on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetZip {
    pub zip_code: ZipCode,
    pub city: Option<String>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub medicare_eligible: Option<u64>,
    pub medicare_enrolled: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearestProviders {
    pub target: TargetZip,
    pub max_radius_miles: f64,
    pub providers: Vec<ProviderDistance>,
}

/// Up to [`NEAREST_PROVIDER_LIMIT`] providers nearest to a ZIP code's centroid
pub fn nearest_providers_to_zip<R: Repository + ?Sized>(
    repository: &R,
    zip: &ZipCode,
    max_radius_miles: f64,
) -> Result<NearestProviders> {
    let record = repository
        .zip_record(zip)?
        .ok_or_else(|| HomeHealthError::zip_not_found(zip.as_str()))?;
    let center = record
        .location
        .ok_or_else(|| HomeHealthError::zip_location_unavailable(zip.as_str()))?;

    let mut providers = repository.providers_near(center, max_radius_miles)?;
    providers.truncate(NEAREST_PROVIDER_LIMIT);
    debug!(zip = %zip, found = providers.len(), max_radius_miles, "nearest providers");

    Ok(NearestProviders {
        target: TargetZip {
            zip_code: record.zip_code,
            city: record.city,
            state: record.state,
            county: record.county,
            medicare_eligible: record.medicare_eligible,
            medicare_enrolled: record.medicare_enrolled,
        },
        max_radius_miles,
        providers,
    })
}
