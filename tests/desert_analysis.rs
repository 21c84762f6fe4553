/*!
 * Coverage desert classification against a SQLite database
 *
 * Layout (1 degree of latitude is about 69 miles):
 * - 54321 at 44.0: no provider within 25 miles
 * - 54322 at 45.0: one provider 7 miles away, registered in another ZIP
 * - 54323 at 46.0: two providers registered in the ZIP itself
 * - 54324 at 47.0: isolated but only 50 Medicare eligibles
 * - 54325: plenty of demand, no coordinates
 * - 55401 in MN: three providers nearby
 */

mod common;

use std::collections::BTreeSet;

use common::*;
use homehealth::prelude::*;

fn fixture() -> TestDb {
    let db = TestDb::new();
    db.zip(demand_zip("54321", "WI", 44.0, -89.0, 200, 150))
        .zip(ZipRow {
            rural: Some(true),
            ..demand_zip("54322", "WI", 45.0, -89.0, 500, 300)
        })
        .zip(demand_zip("54323", "WI", 46.0, -89.0, 120, 60))
        .zip(demand_zip("54324", "WI", 47.0, -89.0, 50, 40))
        .zip(ZipRow {
            zip_code: "54325",
            state: Some("WI"),
            eligible: Some(900),
            ..Default::default()
        })
        .zip(demand_zip("55401", "MN", 44.98, -93.27, 1000, 500));

    db.provider(located_provider("520001", "WI", "54400", 45.1, -89.0))
        .provider(located_provider("520002", "WI", "54323", 46.05, -89.0))
        .provider(located_provider("520003", "WI", "54323", 45.95, -89.0))
        .provider(located_provider("240001", "MN", "55401", 44.98, -93.27))
        .provider(located_provider("240002", "MN", "55401", 44.99, -93.25))
        .provider(located_provider("240003", "MN", "55402", 44.97, -93.28));
    db
}

fn zips(results: &[CoverageDesertResult]) -> Vec<&str> {
    results.iter().map(|r| r.zip_code.as_str()).collect()
}

#[test]
fn test_default_classification() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();
    let results = classify_deserts(&repo, &DesertCriteria::default()).unwrap();

    assert_eq!(zips(&results), vec!["54322", "54321", "54323"]);

    let isolated = &results[1];
    assert_eq!(isolated.desert_severity, DesertSeverity::CompleteDesert);
    assert_eq!(isolated.providers_within_radius, 0);
    assert!(approx(isolated.market_opportunity_score, 160.0));

    // counted through the radius, not by ZIP assignment
    let cross_zip = &results[0];
    assert_eq!(cross_zip.desert_severity, DesertSeverity::SevereUnderservice);
    assert_eq!(cross_zip.providers_within_radius, 1);
    assert_eq!(cross_zip.providers_in_zip, 0);
    assert!(approx(cross_zip.market_opportunity_score, 330.0));

    let moderate = &results[2];
    assert_eq!(moderate.desert_severity, DesertSeverity::ModerateUnderservice);
    assert_eq!(moderate.providers_in_zip, 2);
    assert!(approx(moderate.market_opportunity_score, 72.0));
}

#[test]
fn test_zero_max_yields_only_complete_deserts() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();
    let results = classify_deserts(&repo, &DesertCriteria::default().max_providers(0)).unwrap();
    assert_eq!(zips(&results), vec!["54321"]);
    assert!(results
        .iter()
        .all(|r| r.desert_severity == DesertSeverity::CompleteDesert));
}

#[test]
fn test_results_grow_with_max_providers() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();
    let mut previous: BTreeSet<String> = BTreeSet::new();
    for max in 0..=4 {
        let current: BTreeSet<String> =
            classify_deserts(&repo, &DesertCriteria::default().max_providers(max))
                .unwrap()
                .iter()
                .map(|r| r.zip_code.to_string())
                .collect();
        assert!(previous.is_subset(&current), "max {max} dropped a ZIP");
        previous = current;
    }
    assert!(previous.contains("55401"));
}

#[test]
fn test_state_and_rural_filters() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();

    let wisconsin = classify_deserts(&repo, &DesertCriteria::default().state(Some("wi"))).unwrap();
    assert_eq!(wisconsin.len(), 3);
    assert!(classify_deserts(&repo, &DesertCriteria::default().state(Some("MN")))
        .unwrap()
        .is_empty());

    let rural = classify_deserts(&repo, &DesertCriteria::default().rural_only(true)).unwrap();
    assert_eq!(zips(&rural), vec!["54322"]);

    let lower_floor = classify_deserts(&repo, &DesertCriteria::default().min_population(50)).unwrap();
    assert!(zips(&lower_floor).contains(&"54324"));
}

#[test]
fn test_repeatable_across_repositories() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();
    let criteria = DesertCriteria::default().max_providers(3);

    let first = classify_deserts(&repo, &criteria).unwrap();
    let second = classify_deserts(&repo, &criteria).unwrap();
    assert_eq!(first, second);

    let dataset = Dataset::load(db.path()).unwrap();
    assert_eq!(classify_deserts(&dataset, &criteria).unwrap(), first);

    let cached = CachedRepository::new(repo);
    assert_eq!(classify_deserts(&cached, &criteria).unwrap(), first);
    assert_eq!(classify_deserts(&cached, &criteria).unwrap(), first);
    assert!(cached.stats().hits > 0);
}

#[test]
fn test_summary_tiers() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();
    let summary = desert_summary(&repo, None).unwrap();

    // summary floor is 50 eligibles, so 54324 joins
    assert_eq!(summary.complete_deserts.zip_count, 2);
    assert_eq!(summary.severe_underservice.zip_count, 3);
    assert_eq!(summary.moderate_underservice.zip_count, 4);
    assert_eq!(summary.total_underserved_zips, 4);
    assert_eq!(summary.states_with_deserts, 1);
    assert_eq!(summary.state_breakdown[0].state, "WI");
    assert_eq!(summary.state_breakdown[0].medicare_eligible, 200 + 500 + 120 + 50);
    assert_eq!(summary.top_opportunities[0].zip_code.as_str(), "54322");

    let minnesota = desert_summary(&repo, Some("MN")).unwrap();
    assert_eq!(minnesota.total_underserved_zips, 0);
    assert_eq!(minnesota.avg_opportunity_score_per_zip, None);
}

#[test]
fn test_nearest_providers_to_zip() {
    let db = fixture();
    let repo = SqliteRepository::open(db.path()).unwrap();

    let nearest = nearest_providers_to_zip(&repo, &ZipCode::new("54323").unwrap(), 25.0).unwrap();
    assert_eq!(nearest.providers.len(), 2);
    assert!(nearest.providers[0].distance_miles <= nearest.providers[1].distance_miles);

    let none = nearest_providers_to_zip(&repo, &ZipCode::new("54321").unwrap(), 25.0).unwrap();
    assert!(none.providers.is_empty());

    let err = nearest_providers_to_zip(&repo, &ZipCode::new("54325").unwrap(), 25.0).unwrap_err();
    assert!(matches!(err, HomeHealthError::MissingGeography { .. }));

    let err = nearest_providers_to_zip(&repo, &ZipCode::new("10001").unwrap(), 25.0).unwrap_err();
    assert!(matches!(err, HomeHealthError::NotFound { .. }));
}

#[test]
fn test_same_coordinates_are_zero_miles_apart() {
    let a = GeoPoint::new(44.0, -89.0);
    let b = GeoPoint::new(44.0, -89.0);
    assert_eq!(a.distance_to(&b), 0.0);
    assert!(approx(
        a.distance_to(&GeoPoint::new(45.0, -89.0)),
        GeoPoint::new(45.0, -89.0).distance_to(&a)
    ));
}
