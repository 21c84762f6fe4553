/*!
 * Quality scoring, benchmarks and peer comparison
 *
 * Derived quality fields (composite score, estimated patient volume, the
 * high-quality flag) plus statistical views over a provider population.
 */

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data_types::*;
use crate::error::{HomeHealthError, Result};

/// Composite score at or above which a provider is always high quality
pub const HIGH_QUALITY_SCORE: f64 = 4.0;

/// Maximum score difference for a provider to count as "similar"
pub const SIMILAR_SCORE_DELTA: f64 = 0.5;

/// Mean of the available star ratings
pub fn composite_quality_score(ratings: &StarRatings) -> Option<f64> {
    let available = ratings.available();
    if available.is_empty() {
        None
    } else {
        Some(available.iter().sum::<f64>() / available.len() as f64)
    }
}

/// Completed surveys scaled up by the response rate (percent)
pub fn estimated_total_patients(completed_surveys: Option<u32>, response_rate_pct: Option<f64>) -> Option<f64> {
    match (completed_surveys, response_rate_pct) {
        (Some(completed), Some(rate)) if rate.is_finite() && rate > 0.0 => {
            Some(completed as f64 / (rate / 100.0))
        }
        _ => None,
    }
}

/// Linear-interpolation percentile over ascending `sorted` values.
/// `fraction` is in `[0, 1]`.
pub fn percentile(sorted: &[f64], fraction: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let weight = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

fn sorted_finite(scores: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Descriptive statistics over a set of quality scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreStatistics {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    /// Sample standard deviation; `None` with fewer than two scores
    pub std_dev: Option<f64>,
    pub min: f64,
    pub max: f64,
}

impl ScoreStatistics {
    pub fn from_scores(scores: &[f64]) -> Option<Self> {
        let sorted = sorted_finite(scores);
        let count = sorted.len();
        if count == 0 {
            return None;
        }
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std_dev = (count >= 2).then(|| {
            let variance = sorted.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
            variance.sqrt()
        });
        Some(ScoreStatistics {
            count,
            mean,
            median: percentile(&sorted, 0.5)?,
            std_dev,
            min: sorted[0],
            max: sorted[count - 1],
        })
    }
}

/// High-quality classification: score >= 4.0 OR score >= the population's
/// 75th percentile
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HighQualityRule {
    pub absolute_threshold: f64,
    pub percentile_threshold: Option<f64>,
}

impl HighQualityRule {
    pub fn from_scores(scores: &[f64]) -> Self {
        HighQualityRule {
            absolute_threshold: HIGH_QUALITY_SCORE,
            percentile_threshold: percentile(&sorted_finite(scores), 0.75),
        }
    }

    pub fn is_high_quality(&self, score: f64) -> bool {
        if !score.is_finite() {
            return false;
        }
        score >= self.absolute_threshold
            || self.percentile_threshold.map(|t| score >= t).unwrap_or(false)
    }
}

/// Fill composite score, patient volume and the high-quality flag where the
/// stored data left them empty
pub fn derive_quality_fields(providers: &mut [Provider]) {
    for provider in providers.iter_mut() {
        if provider.composite_quality_score.is_none() {
            provider.composite_quality_score = composite_quality_score(&provider.ratings);
        }
        if provider.estimated_total_patients.is_none() {
            provider.estimated_total_patients =
                estimated_total_patients(provider.completed_surveys, provider.survey_response_rate);
        }
    }

    let scores: Vec<f64> = providers.iter().filter_map(|p| p.composite_quality_score).collect();
    let rule = HighQualityRule::from_scores(&scores);
    let mut derived = 0usize;
    for provider in providers.iter_mut().filter(|p| p.is_high_quality.is_none()) {
        provider.is_high_quality = Some(
            provider
                .composite_quality_score
                .map(|score| rule.is_high_quality(score))
                .unwrap_or(false),
        );
        derived += 1;
    }
    debug!(derived, threshold = ?rule.percentile_threshold, "derived high-quality flags");
}

/// Benchmark percentiles of the composite score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityPercentiles {
    pub p10: f64,
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// Providers bucketed by rounded star level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarDistribution {
    pub five_star: usize,
    pub four_star: usize,
    pub three_star: usize,
    pub two_star: usize,
    pub one_star: usize,
}

impl StarDistribution {
    pub fn from_scores(scores: &[f64]) -> Self {
        let mut distribution = StarDistribution::default();
        for &score in scores {
            if score >= 4.5 {
                distribution.five_star += 1;
            } else if score >= 3.5 {
                distribution.four_star += 1;
            } else if score >= 2.5 {
                distribution.three_star += 1;
            } else if score >= 1.5 {
                distribution.two_star += 1;
            } else {
                distribution.one_star += 1;
            }
        }
        distribution
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityBenchmarks {
    pub state: Option<String>,
    pub total_providers: usize,
    pub mean_quality: f64,
    pub median_quality: f64,
    pub std_quality: Option<f64>,
    pub percentiles: QualityPercentiles,
    pub distribution: StarDistribution,
    pub high_quality_threshold: Option<f64>,
    pub high_quality_count: usize,
}

/// Where to draw the comparison group from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonScope {
    #[default]
    State,
    County,
    National,
}

impl std::fmt::Display for ComparisonScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComparisonScope::State => write!(f, "state"),
            ComparisonScope::County => write!(f, "county"),
            ComparisonScope::National => write!(f, "national"),
        }
    }
}

impl std::str::FromStr for ComparisonScope {
    type Err = HomeHealthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "state" => Ok(ComparisonScope::State),
            "county" => Ok(ComparisonScope::County),
            "national" => Ok(ComparisonScope::National),
            _ => Err(HomeHealthError::MalformedInput {
                value: s.to_string(),
                reason: "expected state, county or national".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonStats {
    pub scope: ComparisonScope,
    pub total_providers: usize,
    pub provider_rank: usize,
    pub percentile: f64,
    pub z_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderComparison {
    pub target: ProviderSummary,
    pub comparison: ComparisonStats,
    pub market: ScoreStatistics,
    /// Comparison scores, best first
    pub quality_distribution: Vec<f64>,
    pub top_performers: Vec<ProviderSummary>,
    pub bottom_performers: Vec<ProviderSummary>,
    pub similar_providers: Vec<ProviderSummary>,
}

/// Quality analytics over a provider population
pub struct QualityAnalytics<'a> {
    providers: &'a [Provider],
}

impl<'a> QualityAnalytics<'a> {
    pub fn new(providers: &'a [Provider]) -> Self {
        QualityAnalytics { providers }
    }

    /// Providers with a composite score, best first (ties by CCN)
    fn scored(&self, keep: impl Fn(&Provider) -> bool) -> Vec<&'a Provider> {
        let mut scored: Vec<&Provider> = self
            .providers
            .iter()
            .filter(|p| p.composite_quality_score.map(f64::is_finite).unwrap_or(false))
            .filter(|p| keep(p))
            .collect();
        scored.sort_by(|a, b| {
            let a_score = a.composite_quality_score.unwrap_or(f64::NEG_INFINITY);
            let b_score = b.composite_quality_score.unwrap_or(f64::NEG_INFINITY);
            b_score.total_cmp(&a_score).then_with(|| a.ccn.cmp(&b.ccn))
        });
        scored
    }

    /// Score distribution, optionally restricted to one state
    pub fn benchmarks(&self, state: Option<&str>) -> Result<QualityBenchmarks> {
        let scored = self.scored(|p| state.map(|s| p.in_state(s)).unwrap_or(true));
        let scores: Vec<f64> = scored.iter().filter_map(|p| p.composite_quality_score).collect();

        let stats = ScoreStatistics::from_scores(&scores).ok_or_else(|| HomeHealthError::NoData {
            message: match state {
                Some(s) => format!("no providers with a quality score in {}", s.to_ascii_uppercase()),
                None => "no providers with a quality score".to_string(),
            },
        })?;

        let sorted = sorted_finite(&scores);
        let at = |fraction: f64| percentile(&sorted, fraction).unwrap_or(stats.median);
        let rule = HighQualityRule::from_scores(&scores);

        Ok(QualityBenchmarks {
            state: state.map(|s| s.trim().to_ascii_uppercase()),
            total_providers: stats.count,
            mean_quality: stats.mean,
            median_quality: stats.median,
            std_quality: stats.std_dev,
            percentiles: QualityPercentiles {
                p10: at(0.10),
                p25: at(0.25),
                p50: at(0.50),
                p75: at(0.75),
                p90: at(0.90),
                p95: at(0.95),
            },
            distribution: StarDistribution::from_scores(&scores),
            high_quality_threshold: rule.percentile_threshold,
            high_quality_count: scores.iter().filter(|s| rule.is_high_quality(**s)).count(),
        })
    }

    /// Rank, percentile and z-score of one provider against its peers
    pub fn compare(&self, target: &Provider, scope: ComparisonScope) -> Result<ProviderComparison> {
        let score = target
            .composite_quality_score
            .filter(|s| s.is_finite())
            .ok_or_else(|| HomeHealthError::InsufficientData {
                reason: format!("provider {} has no quality score for comparison", target.ccn),
                required: 1,
                found: 0,
            })?;

        let group = match scope {
            ComparisonScope::National => self.scored(|_| true),
            ComparisonScope::State => match target.state.as_deref() {
                Some(state) => self.scored(|p| p.in_state(state)),
                None => Vec::new(),
            },
            ComparisonScope::County => match (target.county_name(), target.state.as_deref()) {
                (Some(county), Some(state)) => self.scored(|p| {
                    p.in_state(state)
                        && p.county_name()
                            .map(|c| c.trim().eq_ignore_ascii_case(county.trim()))
                            .unwrap_or(false)
                }),
                _ => Vec::new(),
            },
        };

        let scores: Vec<f64> = group.iter().filter_map(|p| p.composite_quality_score).collect();
        if scores.len() < 2 {
            return Err(HomeHealthError::insufficient_sample(
                &format!("{scope} comparison"),
                2,
                scores.len(),
            ));
        }
        let market = ScoreStatistics::from_scores(&scores)
            .ok_or_else(|| HomeHealthError::insufficient_sample("comparison", 2, 0))?;

        let n = scores.len();
        let provider_rank = 1 + scores.iter().filter(|s| **s > score).count();
        let percentile = (n - provider_rank + 1) as f64 / n as f64 * 100.0;
        let z_score = match market.std_dev {
            Some(std) if std > 0.0 => (score - market.mean) / std,
            _ => 0.0,
        };
        debug!(ccn = %target.ccn, %scope, n, provider_rank, "compared provider");

        let summarize = |providers: &[&Provider]| -> Vec<ProviderSummary> {
            providers.iter().map(|p| ProviderSummary::from(*p)).collect()
        };
        let bottom_start = n.saturating_sub(10);
        let similar: Vec<&Provider> = group
            .iter()
            .copied()
            .filter(|p| {
                p.composite_quality_score
                    .map(|s| (s - score).abs() <= SIMILAR_SCORE_DELTA)
                    .unwrap_or(false)
            })
            .take(10)
            .collect();

        Ok(ProviderComparison {
            target: ProviderSummary::from(target),
            comparison: ComparisonStats {
                scope,
                total_providers: n,
                provider_rank,
                percentile,
                z_score,
            },
            market,
            quality_distribution: scores,
            top_performers: summarize(&group[..n.min(10)]),
            bottom_performers: summarize(&group[bottom_start..]),
            similar_providers: summarize(&similar),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored_provider(ccn: &str, state: &str, county: &str, score: f64) -> Provider {
        let mut provider = Provider::new(Ccn::new(ccn).unwrap());
        provider.state = Some(state.to_string());
        provider.geography.county = Some(county.to_string());
        provider.composite_quality_score = Some(score);
        provider
    }

    #[test]
    fn test_composite_and_volume() {
        let ratings = StarRatings { quality_of_care: Some(4.5), patient_survey: None };
        assert_eq!(composite_quality_score(&ratings), Some(4.5));
        assert_eq!(composite_quality_score(&StarRatings::default()), None);

        assert_eq!(estimated_total_patients(Some(50), Some(25.0)), Some(200.0));
        assert_eq!(estimated_total_patients(Some(50), Some(0.0)), None);
        assert_eq!(estimated_total_patients(None, Some(25.0)), None);
    }

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&sorted, 0.75), Some(3.25));
        assert_eq!(percentile(&sorted, 0.5), Some(2.5));
        assert_eq!(percentile(&[], 0.5), None);
    }

    #[test]
    fn test_high_quality_or_rule() {
        let rule = HighQualityRule::from_scores(&[1.0, 2.0, 3.0, 4.0]);
        // 3.3 is below 4.0 but above the 75th percentile (3.25)
        assert!(rule.is_high_quality(3.3));
        assert!(rule.is_high_quality(4.0));
        assert!(!rule.is_high_quality(3.2));

        let high = HighQualityRule::from_scores(&[4.5, 4.6, 4.7, 4.8]);
        assert!(high.is_high_quality(4.1));
    }

    #[test]
    fn test_sample_std() {
        let stats = ScoreStatistics::from_scores(&[2.0, 4.0]).unwrap();
        assert!((stats.std_dev.unwrap() - std::f64::consts::SQRT_2).abs() < 1e-12);
        assert_eq!(ScoreStatistics::from_scores(&[3.0]).unwrap().std_dev, None);
    }

    #[test]
    fn test_compare_rank_and_percentile() {
        let providers = vec![
            scored_provider("000001", "AL", "Jefferson", 4.0),
            scored_provider("000002", "AL", "Jefferson", 3.0),
            scored_provider("000003", "AL", "Mobile", 2.0),
            scored_provider("000004", "GA", "Fulton", 5.0),
        ];
        let analytics = QualityAnalytics::new(&providers);
        let result = analytics.compare(&providers[1], ComparisonScope::State).unwrap();
        assert_eq!(result.comparison.total_providers, 3);
        assert_eq!(result.comparison.provider_rank, 2);
        assert!((result.comparison.percentile - 200.0 / 3.0).abs() < 1e-9);
        assert_eq!(result.comparison.z_score, 0.0);
        assert_eq!(result.top_performers[0].ccn.as_str(), "000001");

        let county = analytics.compare(&providers[1], ComparisonScope::County).unwrap();
        assert_eq!(county.comparison.total_providers, 2);
    }

    #[test]
    fn test_compare_insufficient_and_flat() {
        let providers = vec![
            scored_provider("000001", "AL", "Jefferson", 3.0),
            scored_provider("000002", "GA", "Fulton", 3.0),
        ];
        let analytics = QualityAnalytics::new(&providers);
        let err = analytics.compare(&providers[0], ComparisonScope::State).unwrap_err();
        assert!(matches!(err, HomeHealthError::InsufficientData { found: 1, .. }));

        let national = analytics.compare(&providers[0], ComparisonScope::National).unwrap();
        assert_eq!(national.comparison.z_score, 0.0);
        assert_eq!(national.comparison.percentile, 100.0);
    }

    #[test]
    fn test_benchmarks_empty_is_no_data() {
        let providers = vec![scored_provider("000001", "AL", "Jefferson", 3.0)];
        let analytics = QualityAnalytics::new(&providers);
        assert!(matches!(analytics.benchmarks(Some("TX")), Err(HomeHealthError::NoData { .. })));

        let al = analytics.benchmarks(Some("al")).unwrap();
        assert_eq!(al.total_providers, 1);
        assert_eq!(al.std_quality, None);
        assert_eq!(al.distribution.three_star, 1);
    }
}
