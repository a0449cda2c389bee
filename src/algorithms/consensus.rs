//! Robust model fitting on top of `sample_consensus`.
//!
//! [`Ransac`] is a seeded, adaptive RANSAC that breaks ties between equally
//! supported models by their mean residual, which keeps results reproducible.
//! The `arrsac` crate plugs into the same [`Consensus`] interface.

use arrsac::Arrsac;
use rand::{rngs::StdRng, seq::index, SeedableRng};
use sample_consensus::{Consensus, Estimator, Model};
use tracing::trace;

use crate::config::{ConsensusMethod, EstimatorConfig};

/// Best model found, with the indices of the data it explains.
#[derive(Debug, Clone)]
pub struct ConsensusResult<M> {
    pub model: M,
    pub inliers: Vec<usize>,
    pub mean_residual: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Score {
    inliers: usize,
    mean_residual: f64,
}

impl Score {
    fn of<M: Model<D>, D>(model: &M, data: &[D], threshold: f64) -> (Self, Vec<usize>) {
        let mut inliers = Vec::new();
        let mut total = 0.0;
        for (i, datum) in data.iter().enumerate() {
            let residual = model.residual(datum);
            if residual <= threshold {
                inliers.push(i);
                total += residual;
            }
        }
        let mean_residual = if inliers.is_empty() {
            f64::INFINITY
        } else {
            total / inliers.len() as f64
        };
        (
            Self {
                inliers: inliers.len(),
                mean_residual,
            },
            inliers,
        )
    }

    /// More inliers wins, equal support falls back to the lower mean residual.
    fn beats(&self, other: &Score) -> bool {
        self.inliers > other.inliers
            || (self.inliers == other.inliers && self.mean_residual < other.mean_residual)
    }
}

/// Iterations needed to draw one all-inlier sample with the given confidence.
fn required_iterations(confidence: f64, inlier_ratio: f64, min_samples: usize, max: usize) -> usize {
    if inlier_ratio <= 0.0 {
        return max;
    }
    let all_inliers = inlier_ratio.powi(min_samples as i32);
    let denom = (1.0 - all_inliers).max(1e-12).ln();
    if denom >= 0.0 {
        return max;
    }
    (((1.0 - confidence).ln() / denom).ceil() as usize).min(max)
}

/// Seeded RANSAC (Random Sample Consensus).
pub struct Ransac {
    threshold: f64,
    max_iterations: usize,
    confidence: f64,
    rng: StdRng,
}

impl Ransac {
    pub fn new(threshold: f64, max_iterations: usize, confidence: f64, seed: u64) -> Self {
        Self {
            threshold,
            max_iterations,
            confidence,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn search<E, Data>(&mut self, estimator: &E, data: &[Data]) -> Option<(E::Model, Vec<usize>)>
    where
        E: Estimator<Data>,
        Data: Clone,
    {
        if data.len() < E::MIN_SAMPLES {
            return None;
        }

        let mut best: Option<(E::Model, Vec<usize>, Score)> = None;
        let mut budget = self.max_iterations;
        let mut iteration = 0;
        while iteration < budget {
            iteration += 1;
            let sample: Vec<Data> = index::sample(&mut self.rng, data.len(), E::MIN_SAMPLES)
                .into_iter()
                .map(|i| data[i].clone())
                .collect();

            for model in estimator.estimate(sample.into_iter()) {
                let (score, inliers) = Score::of(&model, data, self.threshold);
                if score.inliers < E::MIN_SAMPLES {
                    continue;
                }
                if best.as_ref().map_or(true, |(_, _, b)| score.beats(b)) {
                    let ratio = score.inliers as f64 / data.len() as f64;
                    budget = required_iterations(self.confidence, ratio, E::MIN_SAMPLES, self.max_iterations)
                        .max(iteration);
                    best = Some((model, inliers, score));
                }
            }
        }

        trace!(iterations = iteration, "ransac finished");
        best.map(|(model, inliers, _)| (model, inliers))
    }
}

impl<E, Data> Consensus<E, Data> for Ransac
where
    E: Estimator<Data>,
    Data: Clone,
{
    type Inliers = Vec<usize>;

    fn model<I>(&mut self, estimator: &E, data: I) -> Option<E::Model>
    where
        I: Iterator<Item = Data> + Clone,
    {
        self.model_inliers(estimator, data).map(|(model, _)| model)
    }

    fn model_inliers<I>(&mut self, estimator: &E, data: I) -> Option<(E::Model, Self::Inliers)>
    where
        I: Iterator<Item = Data> + Clone,
    {
        let data: Vec<Data> = data.collect();
        self.search(estimator, &data)
    }
}

/// Runs the configured consensus method, then refits the model on its inliers.
pub fn fit_robust<E, Data>(
    estimator: &E,
    data: &[Data],
    config: &EstimatorConfig,
) -> Option<ConsensusResult<E::Model>>
where
    E: Estimator<Data>,
    Data: Clone,
{
    let threshold = config.reprojection_threshold;
    let found = match config.method {
        ConsensusMethod::Ransac => Ransac::new(
            threshold,
            config.max_iterations,
            config.confidence,
            config.seed,
        )
        .model_inliers(estimator, data.iter().cloned()),
        ConsensusMethod::Arrsac => Arrsac::new(threshold, StdRng::seed_from_u64(config.seed))
            .model_inliers(estimator, data.iter().cloned())
            .map(|(model, inliers)| (model, inliers.into_iter().collect())),
    };

    let (model, inliers) = found?;
    Some(refine(estimator, data, model, &inliers, threshold))
}

/// Least squares refit over the consensus set, kept unless the original model scores better.
pub fn refine<E, Data>(
    estimator: &E,
    data: &[Data],
    model: E::Model,
    inliers: &[usize],
    threshold: f64,
) -> ConsensusResult<E::Model>
where
    E: Estimator<Data>,
    Data: Clone,
{
    let (mut best_score, mut best_inliers) = Score::of(&model, data, threshold);
    let mut best_model = model;

    let support: Vec<Data> = inliers.iter().map(|&i| data[i].clone()).collect();
    if support.len() >= E::MIN_SAMPLES {
        for refit in estimator.estimate(support.into_iter()) {
            let (score, refit_inliers) = Score::of(&refit, data, threshold);
            if !best_score.beats(&score) {
                best_score = score;
                best_inliers = refit_inliers;
                best_model = refit;
            }
        }
    }

    ConsensusResult {
        model: best_model,
        inliers: best_inliers,
        mean_residual: best_score.mean_residual,
    }
}
