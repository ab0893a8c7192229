//! # 运动统计
//!
//! 将一组振幅序列归约为 0~100 的运动评分。
//!
//! 两级统计：
//! 1. 每条序列计算变异系数 CV = 标准差 / 均值
//! 2. 丢弃 CV >= 离群阈值（1.3）的序列，对剩余 CV 再求标准差 `D`，
//!    按 `min_deviation` / `max_deviation` 映射为百分比
//!
//! 历史上该指标被称为 "kurtosis"，但它并不是四阶矩，而是 CV 的离散度。
//! 日志中保留这一名称以便与现场数据对照。

use csi_protocol::AmplitudeSequence;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// CV 离群阈值
pub const KURTOSIS_OUTLIER: f64 = 1.3;

/// 评分上限
pub const MAX_SCORE: f64 = 100.0;

/// 算术平均值，空序列返回 `None`
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// 样本方差（单遍递推公式）
///
/// 维护前缀和 `t`，第 i 个元素（i >= 1）贡献
/// `((i + 1) * H[i] - t)^2 / ((i + 1) * i)`，最后除以 `n - 1`。
/// 长度 <= 1 时返回 0。
pub fn variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n <= 1 {
        return 0.0;
    }

    let mut t = values[0];
    let mut acc = 0.0;
    for (i, &h) in values.iter().enumerate().skip(1) {
        let k = i as f64;
        t += h;
        let diff = (k + 1.0) * h - t;
        acc += diff * diff / ((k + 1.0) * k);
    }

    acc / (n as f64 - 1.0)
}

/// 样本标准差
pub fn standard_deviation(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// 变异系数
///
/// 空序列、均值为 0 或结果非有限值时返回 `None`，调用方应排除该序列。
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m == 0.0 {
        return None;
    }

    let cv = standard_deviation(values) / m;
    cv.is_finite().then_some(cv)
}

/// 评分配置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// 低于此离散度视为无运动
    pub min_deviation: f64,
    /// 离散度从 `min_deviation` 起再增加此值即为 100%
    pub max_deviation: f64,
    /// CV 离群阈值
    pub outlier_threshold: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_deviation: 0.02,
            max_deviation: 0.05,
            outlier_threshold: KURTOSIS_OUTLIER,
        }
    }
}

/// 一次评估的详细结果
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionEstimate {
    /// 运动评分 [0, 100]
    pub score: f64,
    /// 剩余 CV 的标准差
    pub deviation: f64,
    /// 参与二级统计的序列数
    pub samples_used: usize,
    /// CV 超过离群阈值被丢弃的序列数
    pub samples_rejected: usize,
    /// 空序列或均值为 0 被排除的序列数
    pub samples_skipped: usize,
}

/// 运动评估器
#[derive(Debug, Clone, Default)]
pub struct MotionEstimator {
    config: EstimatorConfig,
}

impl MotionEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// 评估一组振幅序列，返回评分
    pub fn estimate(&self, sequences: &[AmplitudeSequence]) -> f64 {
        self.estimate_detailed(sequences).score
    }

    /// 评估一组振幅序列，返回详细结果
    pub fn estimate_detailed(&self, sequences: &[AmplitudeSequence]) -> MotionEstimate {
        let mut cvs = Vec::with_capacity(sequences.len());
        let mut skipped = 0;

        for seq in sequences {
            match coefficient_of_variation(seq) {
                Some(cv) => cvs.push(cv),
                None => skipped += 1,
            }
        }

        let mut estimate = self.estimate_from_cv(&cvs);
        estimate.samples_skipped = skipped;
        estimate
    }

    /// 二级统计：从 CV 集合计算评分
    pub fn estimate_from_cv(&self, cvs: &[f64]) -> MotionEstimate {
        let kept: Vec<f64> = cvs
            .iter()
            .copied()
            .filter(|&cv| cv < self.config.outlier_threshold)
            .collect();

        let deviation = standard_deviation(&kept);
        let score = self.score_from_deviation(deviation);
        debug!(
            kurtosis_deviation = deviation,
            score,
            used = kept.len(),
            rejected = cvs.len() - kept.len(),
            "Motion estimated"
        );

        MotionEstimate {
            score,
            deviation,
            samples_used: kept.len(),
            samples_rejected: cvs.len() - kept.len(),
            samples_skipped: 0,
        }
    }

    /// 离散度 → 百分比（保留一位小数）
    pub fn score_from_deviation(&self, deviation: f64) -> f64 {
        let EstimatorConfig {
            min_deviation,
            max_deviation,
            ..
        } = self.config;

        if deviation.is_nan() || deviation <= min_deviation {
            0.0
        } else if deviation >= min_deviation + max_deviation {
            MAX_SCORE
        } else {
            let pct = ((deviation - min_deviation) * 100.0 / max_deviation * 10.0).round() / 10.0;
            pct.clamp(0.0, MAX_SCORE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};

    fn two_pass_variance(values: &[f64]) -> f64 {
        let n = values.len() as f64;
        let m = values.iter().sum::<f64>() / n;
        values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (n - 1.0)
    }

    /// 构造一个 CV 恰为 `cv` 的两元素序列（均值 1）
    fn sequence_with_cv(cv: f64) -> Vec<f64> {
        // 两元素 [1 - a, 1 + a] 的样本标准差为 a * sqrt(2)
        let a = cv / 2f64.sqrt();
        vec![1.0 - a, 1.0 + a]
    }

    #[test]
    fn test_variance_short_sequences() {
        assert_eq!(variance(&[]), 0.0);
        assert_eq!(variance(&[42.0]), 0.0);
        assert_eq!(variance(&[1.0, 3.0]), 2.0);
    }

    #[test]
    fn test_variance_known_values() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!((variance(&values) - 32.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_cv_excludes_zero_mean_and_empty() {
        assert_eq!(coefficient_of_variation(&[]), None);
        assert_eq!(coefficient_of_variation(&[0.0, 0.0, 0.0]), None);
        assert_eq!(coefficient_of_variation(&[-1.0, 1.0]), None);
        assert_eq!(coefficient_of_variation(&[5.0]), Some(0.0));
    }

    #[test]
    fn test_single_element_sequences_score_zero() {
        let estimator = MotionEstimator::default();
        let seqs = vec![vec![3.0], vec![7.0], vec![]];
        let est = estimator.estimate_detailed(&seqs);
        assert_eq!(est.score, 0.0);
        assert_eq!(est.samples_used, 2);
        assert_eq!(est.samples_skipped, 1);
    }

    #[test]
    fn test_empty_input_scores_zero() {
        let estimator = MotionEstimator::default();
        assert_eq!(estimator.estimate(&[]), 0.0);
    }

    #[test]
    fn test_one_surviving_cv_scores_zero() {
        let estimator = MotionEstimator::default();
        let est = estimator.estimate_from_cv(&[0.5, 2.0, 5.0]);
        assert_eq!(est.samples_used, 1);
        assert_eq!(est.samples_rejected, 2);
        assert_eq!(est.deviation, 0.0);
        assert_eq!(est.score, 0.0);
    }

    #[test]
    fn test_outlier_threshold_is_exclusive() {
        let estimator = MotionEstimator::default();
        let est = estimator.estimate_from_cv(&[1.3, 0.1, 0.2]);
        assert_eq!(est.samples_used, 2);
        assert_eq!(est.samples_rejected, 1);
    }

    #[test]
    fn test_low_dispersion_scenario() {
        let estimator = MotionEstimator::new(EstimatorConfig {
            min_deviation: 0.02,
            max_deviation: 0.05,
            outlier_threshold: KURTOSIS_OUTLIER,
        });
        let est = estimator.estimate_from_cv(&[0.01, 0.02, 0.015]);
        assert!((est.deviation - 0.005).abs() < 1e-3);
        assert_eq!(est.score, 0.0);
    }

    #[test]
    fn test_score_boundaries() {
        let estimator = MotionEstimator::default();
        assert_eq!(estimator.score_from_deviation(0.02), 0.0);
        assert_eq!(estimator.score_from_deviation(0.02 + 0.05), 100.0);
        assert_eq!(estimator.score_from_deviation(0.0), 0.0);
        assert_eq!(estimator.score_from_deviation(10.0), 100.0);
        assert_eq!(estimator.score_from_deviation(f64::NAN), 0.0);
    }

    #[test]
    fn test_score_linear_region_rounds_to_one_decimal() {
        let estimator = MotionEstimator::default();
        // (0.045 - 0.02) * 100 / 0.05 = 50
        assert!((estimator.score_from_deviation(0.045) - 50.0).abs() < 1e-9);
        // (0.03 - 0.02) * 100 / 0.05 = 20
        assert!((estimator.score_from_deviation(0.03) - 20.0).abs() < 1e-9);
        // 一位小数
        let s = estimator.score_from_deviation(0.021234);
        assert!(((s * 10.0).round() - s * 10.0).abs() < 1e-9);
        assert!((s - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_from_sequences_with_motion() {
        let estimator = MotionEstimator::default();
        let seqs: Vec<Vec<f64>> = [0.1, 0.2, 0.3, 0.4]
            .iter()
            .map(|&cv| sequence_with_cv(cv))
            .collect();
        let est = estimator.estimate_detailed(&seqs);
        // CV 集合 {0.1..0.4} 的标准差约 0.129，超过 0.07 上限
        assert_eq!(est.samples_used, 4);
        assert!((est.deviation - 0.129_099).abs() < 1e-5);
        assert_eq!(est.score, 100.0);
    }

    #[test]
    fn test_variance_matches_two_pass_random() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        for n in 2..=1000 {
            let values: Vec<f64> = (0..n).map(|_| rng.gen_range(0.1..1000.0)).collect();
            let a = variance(&values);
            let b = two_pass_variance(&values);
            assert!((a - b).abs() <= 1e-9 * b.abs().max(1e-12), "n={n}: {a} vs {b}");
        }
    }

    proptest! {
        #[test]
        fn prop_variance_matches_two_pass(values in prop::collection::vec(0.001f64..1e4, 2..1000)) {
            let a = variance(&values);
            let b = two_pass_variance(&values);
            prop_assert!((a - b).abs() <= 1e-9 * b.abs().max(1e-12));
        }

        #[test]
        fn prop_estimate_order_independent(
            cvs in prop::collection::vec(0.0f64..1.2, 0..40),
            seed in any::<u64>(),
        ) {
            let estimator = MotionEstimator::default();
            let mut shuffled = cvs.clone();
            shuffled.shuffle(&mut rand::rngs::StdRng::seed_from_u64(seed));

            let a = estimator.estimate_from_cv(&cvs);
            let b = estimator.estimate_from_cv(&shuffled);
            prop_assert_eq!(a.samples_used, b.samples_used);
            prop_assert!((a.deviation - b.deviation).abs() <= 1e-9 * a.deviation.max(1e-12));
            prop_assert!((a.score - b.score).abs() <= 0.1 + 1e-9);
        }

        #[test]
        fn prop_score_is_clamped(deviation in -10.0f64..10.0, min in 0.0f64..1.0, max in 0.001f64..1.0) {
            let estimator = MotionEstimator::new(EstimatorConfig {
                min_deviation: min,
                max_deviation: max,
                outlier_threshold: KURTOSIS_OUTLIER,
            });
            let score = estimator.score_from_deviation(deviation);
            prop_assert!((0.0..=100.0).contains(&score));
        }
    }
}
