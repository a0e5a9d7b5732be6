//! Fatigue risk analysis
//!
//! Combines the load window figures with optional subjective feedback into a
//! composite fatigue score (0-100) and a risk tier.
//!
//! # Algorithm
//!
//! 1. ACWR is mapped onto a zone using fixed bands:
//!    - below 0.8: undertraining (low risk)
//!    - 0.8 to 1.3: optimal (low risk)
//!    - above 1.3 up to 1.5: elevated (moderate risk)
//!    - above 1.5: high risk (high, or critical under high monotony)
//! 2. The composite score is a weighted mean of the components that are
//!    defined: zone points, monotony, strain and subjective scores.
//!    Undefined components drop out and the remaining weights are rescaled.
//! 3. The final risk is the most severe of the zone risk, the score risk and
//!    the subjective floor, so a higher score never lowers the tier.
//!
//! Without an ACWR the analyzer relies on subjective inputs alone. Without
//! either, the result is flagged `insufficient_data` with an `unknown` risk.

use chrono::NaiveDate;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{FatigueError, Result};
use crate::models::{FatigueAssessment, RiskLevel, SubjectiveInputs, WorkloadEntry};
use crate::windows::{LoadWindowAggregator, WindowConfig, WindowMetrics};

/// ACWR band edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcwrBands {
    /// Below this the client is undertraining
    pub undertraining_below: Decimal,
    /// Upper edge (inclusive) of the optimal band
    pub optimal_upper: Decimal,
    /// Upper edge (inclusive) of the elevated band; above is high risk
    pub elevated_upper: Decimal,
}

impl Default for AcwrBands {
    fn default() -> Self {
        AcwrBands {
            undertraining_below: dec!(0.8),
            optimal_upper: dec!(1.3),
            elevated_upper: dec!(1.5),
        }
    }
}

/// Score points awarded for each ACWR zone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZonePoints {
    pub undertraining: Decimal,
    pub optimal: Decimal,
    pub elevated: Decimal,
    pub high_risk: Decimal,
}

impl Default for ZonePoints {
    fn default() -> Self {
        ZonePoints {
            undertraining: dec!(20),
            optimal: dec!(10),
            elevated: dec!(60),
            high_risk: dec!(90),
        }
    }
}

/// Weights of the composite score components
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub acwr: Decimal,
    pub monotony: Decimal,
    pub strain: Decimal,
    pub subjective: Decimal,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        ScoreWeights {
            acwr: dec!(0.4),
            monotony: dec!(0.2),
            strain: dec!(0.2),
            subjective: dec!(0.2),
        }
    }
}

/// Minimum composite score for each risk tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub moderate: Decimal,
    pub high: Decimal,
    pub critical: Decimal,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        RiskThresholds {
            moderate: dec!(40),
            high: dec!(65),
            critical: dec!(85),
        }
    }
}

/// Rounding applied to the composite score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreRounding {
    /// Ties go to the even neighbour
    HalfEven,
    /// Ties go away from zero
    HalfUp,
    /// Drop extra digits
    Truncate,
}

impl ScoreRounding {
    fn strategy(&self) -> RoundingStrategy {
        match self {
            ScoreRounding::HalfEven => RoundingStrategy::MidpointNearestEven,
            ScoreRounding::HalfUp => RoundingStrategy::MidpointAwayFromZero,
            ScoreRounding::Truncate => RoundingStrategy::ToZero,
        }
    }
}

/// Fatigue analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    pub bands: AcwrBands,
    pub zone_points: ZonePoints,
    pub weights: ScoreWeights,
    pub risk_thresholds: RiskThresholds,

    /// Monotony at or above which a high-risk ACWR becomes critical
    pub critical_monotony: Decimal,

    /// Monotony mapped to a full component score of 100
    pub monotony_ceiling: Decimal,

    /// Strain mapped to a full component score of 100
    pub strain_ceiling: Decimal,

    pub score_decimal_places: u32,
    pub score_rounding: ScoreRounding,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            bands: AcwrBands::default(),
            zone_points: ZonePoints::default(),
            weights: ScoreWeights::default(),
            risk_thresholds: RiskThresholds::default(),
            critical_monotony: dec!(2.0),
            monotony_ceiling: dec!(3.0),
            strain_ceiling: dec!(15000),
            score_decimal_places: 1,
            score_rounding: ScoreRounding::HalfUp,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> Result<()> {
        let bands = &self.bands;
        if !(bands.undertraining_below <= bands.optimal_upper
            && bands.optimal_upper <= bands.elevated_upper)
        {
            return Err(FatigueError::Configuration(
                "ACWR bands must be ascending".to_string(),
            ));
        }

        let thresholds = &self.risk_thresholds;
        if !(thresholds.moderate <= thresholds.high && thresholds.high <= thresholds.critical) {
            return Err(FatigueError::Configuration(
                "risk thresholds must be ascending".to_string(),
            ));
        }

        let weights = [
            self.weights.acwr,
            self.weights.monotony,
            self.weights.strain,
            self.weights.subjective,
        ];
        if weights.iter().any(|w| *w < Decimal::ZERO) || weights.iter().sum::<Decimal>().is_zero() {
            return Err(FatigueError::Configuration(
                "score weights must be non-negative with a positive sum".to_string(),
            ));
        }

        if self.monotony_ceiling <= Decimal::ZERO || self.strain_ceiling <= Decimal::ZERO {
            return Err(FatigueError::Configuration(
                "monotony and strain ceilings must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// ACWR interpretation zones
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcwrZone {
    Undertraining,
    Optimal,
    Elevated,
    HighRisk,
}

impl AcwrZone {
    /// Classify an ACWR value
    pub fn from_acwr(acwr: Decimal, bands: &AcwrBands) -> Self {
        if acwr < bands.undertraining_below {
            AcwrZone::Undertraining
        } else if acwr <= bands.optimal_upper {
            AcwrZone::Optimal
        } else if acwr <= bands.elevated_upper {
            AcwrZone::Elevated
        } else {
            AcwrZone::HighRisk
        }
    }

    /// Risk tier implied by the zone alone
    pub fn baseline_risk(&self, monotony: Option<Decimal>, critical_monotony: Decimal) -> RiskLevel {
        match self {
            AcwrZone::Undertraining | AcwrZone::Optimal => RiskLevel::Low,
            AcwrZone::Elevated => RiskLevel::Moderate,
            AcwrZone::HighRisk => match monotony {
                Some(m) if m >= critical_monotony => RiskLevel::Critical,
                _ => RiskLevel::High,
            },
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcwrZone::Undertraining => "undertraining",
            AcwrZone::Optimal => "optimal",
            AcwrZone::Elevated => "elevated",
            AcwrZone::HighRisk => "high_risk",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AcwrZone::Undertraining => "Undertraining (detraining risk)",
            AcwrZone::Optimal => "Optimal training zone",
            AcwrZone::Elevated => "Elevated load (monitor closely)",
            AcwrZone::HighRisk => "Load spike (high injury risk)",
        }
    }

    fn points(&self, points: &ZonePoints) -> Decimal {
        match self {
            AcwrZone::Undertraining => points.undertraining,
            AcwrZone::Optimal => points.optimal,
            AcwrZone::Elevated => points.elevated,
            AcwrZone::HighRisk => points.high_risk,
        }
    }
}

impl std::str::FromStr for AcwrZone {
    type Err = FatigueError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "undertraining" => Ok(AcwrZone::Undertraining),
            "optimal" => Ok(AcwrZone::Optimal),
            "elevated" => Ok(AcwrZone::Elevated),
            "high_risk" => Ok(AcwrZone::HighRisk),
            _ => Err(FatigueError::invalid("acwr_zone", format!("unknown zone: {}", s))),
        }
    }
}

/// Core fatigue analysis engine
pub struct FatigueAnalyzer {
    config: AnalyzerConfig,
    aggregator: LoadWindowAggregator,
}

impl FatigueAnalyzer {
    /// Create analyzer with default configuration
    pub fn new() -> Self {
        FatigueAnalyzer {
            config: AnalyzerConfig::default(),
            aggregator: LoadWindowAggregator::new(),
        }
    }

    /// Create analyzer with custom configuration
    pub fn with_config(config: AnalyzerConfig, windows: WindowConfig) -> Self {
        FatigueAnalyzer {
            config,
            aggregator: LoadWindowAggregator::with_config(windows),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn aggregator(&self) -> &LoadWindowAggregator {
        &self.aggregator
    }

    /// Analyze a client's history as of `as_of`
    ///
    /// Only invalid subjective scores or loads beyond the decimal range
    /// produce an error; missing history is
    /// reported through `insufficient_data`.
    pub fn analyze(
        &self,
        entries: &[WorkloadEntry],
        as_of: NaiveDate,
        subjective: Option<&SubjectiveInputs>,
    ) -> Result<FatigueAssessment> {
        if let Some(inputs) = subjective {
            inputs.validate()?;
        }
        let metrics = self.aggregator.aggregate(entries, as_of)?;
        Ok(self.assess(&metrics, subjective))
    }

    /// Turn window metrics and subjective inputs into an assessment
    pub fn assess(
        &self,
        metrics: &WindowMetrics,
        subjective: Option<&SubjectiveInputs>,
    ) -> FatigueAssessment {
        let subjective = subjective.filter(|s| !s.is_empty());
        let subjective_score = subjective.and_then(subjective_component);
        let floor = subjective.map(subjective_risk_floor).unwrap_or(RiskLevel::Unknown);

        let zone = metrics
            .acwr
            .map(|acwr| AcwrZone::from_acwr(acwr, &self.config.bands));

        let (fatigue_score, risk_level, insufficient_data) = match zone {
            Some(zone) => {
                let score = self.composite_score(Some(zone), metrics, subjective_score);
                let tier = zone.baseline_risk(metrics.monotony, self.config.critical_monotony);
                let risk = score
                    .map(|s| self.risk_from_score(s))
                    .unwrap_or(RiskLevel::Low)
                    .max(tier)
                    .max(floor);
                (score, risk, false)
            }
            None => match subjective_score {
                Some(component) => {
                    let score = self.round_score(component);
                    (Some(score), self.risk_from_score(score).max(floor), false)
                }
                None => (None, RiskLevel::Unknown, true),
            },
        };

        FatigueAssessment {
            analysis_date: metrics.as_of,
            acute_load: metrics.acute_load,
            chronic_load: metrics.chronic_load,
            acwr: metrics.acwr,
            acwr_zone: zone,
            monotony: metrics.monotony,
            strain: metrics.strain,
            fatigue_score,
            risk_level,
            insufficient_data,
            subjective: subjective.cloned(),
            recommendation: recommendation(risk_level, zone),
            next_session_adjustment: next_session_adjustment(subjective),
        }
    }

    /// Weighted mean of the defined score components
    pub fn composite_score(
        &self,
        zone: Option<AcwrZone>,
        metrics: &WindowMetrics,
        subjective: Option<Decimal>,
    ) -> Option<Decimal> {
        let hundred = Decimal::ONE_HUNDRED;
        let weights = &self.config.weights;

        let components = [
            (weights.acwr, zone.map(|z| z.points(&self.config.zone_points))),
            (
                weights.monotony,
                metrics
                    .monotony
                    .map(|m| (m / self.config.monotony_ceiling).min(Decimal::ONE) * hundred),
            ),
            (
                weights.strain,
                metrics
                    .strain
                    .map(|s| (s / self.config.strain_ceiling).min(Decimal::ONE) * hundred),
            ),
            (weights.subjective, subjective),
        ];

        let (weighted, total_weight) = components
            .iter()
            .filter_map(|(weight, value)| value.map(|v| (*weight, v)))
            .filter(|(weight, _)| *weight > Decimal::ZERO)
            .fold((Decimal::ZERO, Decimal::ZERO), |(sum, total), (weight, value)| {
                (sum + weight * value, total + weight)
            });

        if total_weight.is_zero() {
            return None;
        }

        Some(self.round_score(weighted / total_weight))
    }

    /// Risk tier for a composite score; non-decreasing in the score
    pub fn risk_from_score(&self, score: Decimal) -> RiskLevel {
        let thresholds = &self.config.risk_thresholds;
        if score >= thresholds.critical {
            RiskLevel::Critical
        } else if score >= thresholds.high {
            RiskLevel::High
        } else if score >= thresholds.moderate {
            RiskLevel::Moderate
        } else {
            RiskLevel::Low
        }
    }

    fn round_score(&self, score: Decimal) -> Decimal {
        score
            .max(Decimal::ZERO)
            .min(Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(
                self.config.score_decimal_places,
                self.config.score_rounding.strategy(),
            )
    }
}

impl Default for FatigueAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean of the subjective indicators, scaled to 0-100 (higher is worse)
fn subjective_component(inputs: &SubjectiveInputs) -> Option<Decimal> {
    let ten = Decimal::TEN;
    let indicators: Vec<Decimal> = [
        inputs.session_rpe,
        inputs.muscle_soreness,
        inputs.post_fatigue_level.or(inputs.pre_fatigue_level),
        inputs.stress_level,
        inputs.sleep_quality.map(|q| ten - q),
        inputs.post_energy_level.or(inputs.pre_energy_level).map(|e| ten - e),
    ]
    .into_iter()
    .flatten()
    .collect();

    if indicators.is_empty() {
        return None;
    }

    let mean = indicators.iter().sum::<Decimal>() / Decimal::from(indicators.len());
    Some(mean * ten)
}

/// Lowest risk tier the subjective report alone justifies
fn subjective_risk_floor(inputs: &SubjectiveInputs) -> RiskLevel {
    let mut floor = RiskLevel::Unknown;

    if let Some(post_fatigue) = inputs.post_fatigue_level {
        if post_fatigue >= dec!(8) {
            floor = floor.max(RiskLevel::High);
        } else if post_fatigue >= dec!(6) {
            floor = floor.max(RiskLevel::Moderate);
        }
    }

    if matches!(inputs.post_energy_level, Some(energy) if energy <= dec!(3)) {
        floor = floor.max(RiskLevel::High);
    }

    if matches!(inputs.fatigue_delta(), Some(delta) if delta >= dec!(4)) {
        floor = floor.max(RiskLevel::High);
    }

    floor
}

fn recommendation(risk: RiskLevel, zone: Option<AcwrZone>) -> String {
    match (risk, zone) {
        (RiskLevel::Unknown, _) => {
            "Not enough data yet. Keep logging sessions to build a baseline.".to_string()
        }
        (RiskLevel::Low, Some(AcwrZone::Undertraining)) => {
            "Training load is low. Consider increasing volume gradually.".to_string()
        }
        (RiskLevel::Low, _) => "Continue with planned training intensity.".to_string(),
        (RiskLevel::Moderate, _) => {
            "Moderate fatigue. Monitor closely and adjust if needed.".to_string()
        }
        (RiskLevel::High, _) => {
            "High fatigue detected. Consider reducing next session intensity or adding a recovery day."
                .to_string()
        }
        (RiskLevel::Critical, _) => {
            "Critical fatigue risk. Prioritize rest and recovery before resuming hard training."
                .to_string()
        }
    }
}

fn next_session_adjustment(subjective: Option<&SubjectiveInputs>) -> String {
    let post_fatigue = match subjective.and_then(|s| s.post_fatigue_level) {
        Some(level) => level,
        None => return "Continue with planned training.".to_string(),
    };

    if post_fatigue >= dec!(8) {
        "Reduce intensity by 30-40%. Focus on technique and recovery.".to_string()
    } else if post_fatigue >= dec!(6) {
        "Reduce intensity by 15-20%. Monitor fatigue closely.".to_string()
    } else if post_fatigue <= dec!(3) {
        "Can increase intensity if feeling good. Maintain good form.".to_string()
    } else {
        "Continue with planned intensity. Monitor for any signs of fatigue.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn metrics(acwr: Option<Decimal>, monotony: Option<Decimal>, strain: Option<Decimal>) -> WindowMetrics {
        let chronic = if acwr.is_some() { dec!(700) } else { Decimal::ZERO };
        WindowMetrics {
            as_of: NaiveDate::from_ymd_opt(2024, 9, 28).unwrap(),
            acute_load: acwr.map(|a| a * dec!(700)).unwrap_or(Decimal::ZERO),
            chronic_load: chronic,
            acwr,
            monotony,
            strain,
            chronic_total: chronic * dec!(4),
            acute_daily_mean: Decimal::ZERO,
            chronic_daily_mean: Decimal::ZERO,
            training_days: 0,
        }
    }

    #[test]
    fn test_acwr_zones() {
        let bands = AcwrBands::default();
        assert_eq!(AcwrZone::from_acwr(dec!(0.5), &bands), AcwrZone::Undertraining);
        assert_eq!(AcwrZone::from_acwr(dec!(0.8), &bands), AcwrZone::Optimal);
        assert_eq!(AcwrZone::from_acwr(dec!(1.3), &bands), AcwrZone::Optimal);
        assert_eq!(AcwrZone::from_acwr(dec!(1.4), &bands), AcwrZone::Elevated);
        assert_eq!(AcwrZone::from_acwr(dec!(1.5), &bands), AcwrZone::Elevated);
        assert_eq!(AcwrZone::from_acwr(dec!(1.51), &bands), AcwrZone::HighRisk);
    }

    #[test]
    fn test_high_risk_becomes_critical_with_monotony() {
        let zone = AcwrZone::HighRisk;
        assert_eq!(zone.baseline_risk(None, dec!(2)), RiskLevel::High);
        assert_eq!(zone.baseline_risk(Some(dec!(1.5)), dec!(2)), RiskLevel::High);
        assert_eq!(zone.baseline_risk(Some(dec!(2.5)), dec!(2)), RiskLevel::Critical);
    }

    #[test]
    fn test_no_history_no_subjective_is_insufficient() {
        let analyzer = FatigueAnalyzer::new();
        let as_of = NaiveDate::from_ymd_opt(2024, 9, 28).unwrap();

        let assessment = analyzer.analyze(&[], as_of, None).unwrap();

        assert!(assessment.insufficient_data);
        assert_eq!(assessment.risk_level, RiskLevel::Unknown);
        assert_eq!(assessment.fatigue_score, None);
        assert_eq!(assessment.acwr, None);
        assert_eq!(assessment.acwr_zone, None);
    }

    #[test]
    fn test_undefined_acwr_falls_back_to_subjective() {
        let analyzer = FatigueAnalyzer::new();
        let subjective = SubjectiveInputs {
            session_rpe: Some(dec!(9)),
            muscle_soreness: Some(dec!(8)),
            ..SubjectiveInputs::default()
        };

        let assessment = analyzer.assess(&metrics(None, None, None), Some(&subjective));

        assert!(!assessment.insufficient_data);
        assert_eq!(assessment.fatigue_score, Some(dec!(85.0)));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        assert_eq!(assessment.acwr_zone, None);
    }

    #[test]
    fn test_empty_subjective_counts_as_absent() {
        let analyzer = FatigueAnalyzer::new();
        let assessment = analyzer.assess(&metrics(None, None, None), Some(&SubjectiveInputs::default()));

        assert!(assessment.insufficient_data);
        assert_eq!(assessment.subjective, None);
    }

    #[test]
    fn test_optimal_load_scores_low() {
        let analyzer = FatigueAnalyzer::new();
        let assessment = analyzer.assess(&metrics(Some(dec!(1.0)), None, None), None);

        assert_eq!(assessment.acwr_zone, Some(AcwrZone::Optimal));
        // Only the zone component is defined
        assert_eq!(assessment.fatigue_score, Some(dec!(10.0)));
        assert_eq!(assessment.risk_level, RiskLevel::Low);
    }

    #[test]
    fn test_spike_with_monotony_is_critical() {
        let analyzer = FatigueAnalyzer::new();
        let assessment = analyzer.assess(
            &metrics(Some(dec!(2.2)), Some(dec!(2.4)), Some(dec!(9000))),
            None,
        );

        assert_eq!(assessment.acwr_zone, Some(AcwrZone::HighRisk));
        assert_eq!(assessment.risk_level, RiskLevel::Critical);
        // (0.4*90 + 0.2*80 + 0.2*60) / 0.8
        assert_eq!(assessment.fatigue_score, Some(dec!(80.0)));
    }

    #[test]
    fn test_subjective_floor_raises_risk() {
        let analyzer = FatigueAnalyzer::new();
        let subjective = SubjectiveInputs {
            pre_fatigue_level: Some(dec!(2)),
            post_fatigue_level: Some(dec!(7)),
            ..SubjectiveInputs::default()
        };

        let assessment = analyzer.assess(&metrics(Some(dec!(1.0)), None, None), Some(&subjective));

        // Fatigue jumped by 5 points during the session
        assert_eq!(assessment.risk_level, RiskLevel::High);
        assert_eq!(
            assessment.next_session_adjustment,
            "Reduce intensity by 15-20%. Monitor fatigue closely."
        );
    }

    #[test]
    fn test_invalid_subjective_is_rejected() {
        let analyzer = FatigueAnalyzer::new();
        let subjective = SubjectiveInputs {
            session_rpe: Some(dec!(-1)),
            ..SubjectiveInputs::default()
        };
        let as_of = NaiveDate::from_ymd_opt(2024, 9, 28).unwrap();

        assert!(matches!(
            analyzer.analyze(&[], as_of, Some(&subjective)),
            Err(FatigueError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_score_rounding_is_configurable() {
        let config = AnalyzerConfig {
            score_decimal_places: 0,
            score_rounding: ScoreRounding::HalfEven,
            ..AnalyzerConfig::default()
        };
        let analyzer = FatigueAnalyzer::with_config(config, WindowConfig::default());
        let subjective = SubjectiveInputs {
            session_rpe: Some(dec!(2.45)),
            ..SubjectiveInputs::default()
        };

        let assessment = analyzer.assess(&metrics(None, None, None), Some(&subjective));
        assert_eq!(assessment.fatigue_score, Some(dec!(24)));
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalyzerConfig::default().validate().is_ok());

        let mut config = AnalyzerConfig::default();
        config.risk_thresholds.high = dec!(90);
        assert!(config.validate().is_err());

        let mut config = AnalyzerConfig::default();
        config.weights = ScoreWeights {
            acwr: Decimal::ZERO,
            monotony: Decimal::ZERO,
            strain: Decimal::ZERO,
            subjective: Decimal::ZERO,
        };
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn test_risk_is_monotonic_in_score(a in 0u32..=1000u32, b in 0u32..=1000u32) {
            let analyzer = FatigueAnalyzer::new();
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            let low_score = Decimal::from(low) / Decimal::TEN;
            let high_score = Decimal::from(high) / Decimal::TEN;

            prop_assert!(analyzer.risk_from_score(low_score) <= analyzer.risk_from_score(high_score));
        }

        #[test]
        fn test_score_stays_in_range(
            acwr in 0u32..400u32,
            monotony in 0u32..800u32,
            strain in 0u32..40000u32,
            rpe in 0u32..=10u32,
        ) {
            let analyzer = FatigueAnalyzer::new();
            let subjective = SubjectiveInputs {
                session_rpe: Some(Decimal::from(rpe)),
                ..SubjectiveInputs::default()
            };
            let assessment = analyzer.assess(
                &metrics(
                    Some(Decimal::from(acwr) / dec!(100)),
                    Some(Decimal::from(monotony) / dec!(100)),
                    Some(Decimal::from(strain)),
                ),
                Some(&subjective),
            );

            let score = assessment.fatigue_score.unwrap();
            prop_assert!(score >= Decimal::ZERO && score <= Decimal::ONE_HUNDRED);
            prop_assert!(assessment.risk_level != RiskLevel::Unknown);
        }
    }
}
