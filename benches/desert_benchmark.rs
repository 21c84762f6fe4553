use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use homehealth::deserts::CoverageIndex;
use homehealth::prelude::*;
use homehealth::proximity::ProximityIndex;

// Deterministic grid over the continental US; no files needed
fn synthetic_dataset(providers: usize, zips: usize) -> Dataset {
    let point = |i: usize, n: usize| {
        let side = (n as f64).sqrt().ceil() as usize;
        let lat = 25.0 + 24.0 * (i / side) as f64 / side as f64;
        let lon = -124.0 + 57.0 * (i % side) as f64 / side as f64;
        GeoPoint::new(lat, lon)
    };

    let provider_records = (0..providers)
        .map(|i| {
            let mut p = Provider::new(Ccn::new(&format!("{:06}", i)).unwrap());
            p.state = Some(if i % 2 == 0 { "TX" } else { "KS" }.to_string());
            p.enhanced_location = Some(point(i, providers));
            p.ratings.quality_of_care = Some(1.0 + (i % 5) as f64);
            p
        })
        .collect();

    let zip_records = (0..zips)
        .map(|i| {
            let mut z = ZipDemographic::new(ZipCode::new(&format!("{:05}", i)).unwrap());
            z.state = Some(if i % 2 == 0 { "TX" } else { "KS" }.to_string());
            z.location = Some(point(i, zips));
            z.medicare_eligible = Some(50 + (i as u64 * 37) % 2000);
            z.medicare_enrolled = Some(20 + (i as u64 * 17) % 900);
            z
        })
        .collect();

    Dataset::from_records(provider_records, zip_records)
}

fn benchmark_distance(c: &mut Criterion) {
    let a = GeoPoint::new(30.27, -97.74);
    let b = GeoPoint::new(32.78, -96.80);
    c.bench_function("haversine_distance", |bench| {
        bench.iter(|| black_box(a).distance_to(black_box(&b)))
    });
}

fn benchmark_proximity_index(c: &mut Criterion) {
    let dataset = synthetic_dataset(10_000, 1);
    let index = ProximityIndex::for_providers(dataset.provider_records());
    let center = GeoPoint::new(37.0, -95.0);

    let mut group = c.benchmark_group("proximity_count");
    for radius in [10.0, 25.0, 100.0] {
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |bench, &radius| {
            bench.iter(|| index.count_within(black_box(&center), radius))
        });
    }
    group.finish();
}

fn benchmark_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_deserts");
    group.sample_size(20);

    for (providers, zips) in [(1_000, 5_000), (10_000, 30_000)] {
        let dataset = synthetic_dataset(providers, zips);
        let criteria = DesertCriteria::default();
        group.bench_with_input(
            BenchmarkId::new("providers_zips", format!("{providers}x{zips}")),
            &dataset,
            |bench, dataset| bench.iter(|| classify_deserts(dataset, &criteria).unwrap()),
        );

        let index = CoverageIndex::from_providers(dataset.provider_records());
        let candidates = dataset.zip_demographics().to_vec();
        group.bench_with_input(
            BenchmarkId::new("prebuilt_index", format!("{providers}x{zips}")),
            &candidates,
            |bench, candidates| bench.iter(|| index.classify(candidates, 25.0, 2)),
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_distance, benchmark_proximity_index, benchmark_classification);
criterion_main!(benches);
