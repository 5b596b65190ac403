use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{DomainLikelihood, LabeledFeatureRow};

const FEATURES: usize = 6;
const EPOCHS: usize = 500;
const LEARNING_RATE: f64 = 0.1;

pub const ARTIFACT_NAME: &str = "domain_likelihood";

/// Multinomial logistic (softmax) regression over standardized feature
/// rows, predicting the domain a student's behavior fits. Trained by
/// full-batch gradient descent; convex, so zero initialization suffices.
///
/// The whole struct is the persisted artifact: standardization constants
/// travel with the weights so prediction cannot drift from training.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainClassifier {
    pub domains: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
}

impl DomainClassifier {
    /// Trains on rows that already carry a cluster assignment and a
    /// proficiency value. Fails hard when there is nothing to learn from.
    pub fn train(rows: &[LabeledFeatureRow]) -> Result<DomainClassifier, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::MissingReferenceData(
                "no labeled feature rows to train the likelihood model on".to_string(),
            ));
        }

        let names: std::collections::BTreeSet<&str> =
            rows.iter().map(|r| r.domain.as_str()).collect();
        if names.len() < 2 {
            return Err(PipelineError::MissingReferenceData(format!(
                "need at least 2 domains to train, found {}",
                names.len()
            )));
        }

        let domains: Vec<String> = names.iter().map(|d| d.to_string()).collect();
        let index: BTreeMap<&str, usize> =
            names.iter().enumerate().map(|(i, d)| (*d, i)).collect();
        let classes = domains.len();
        let labels: Vec<usize> = rows.iter().map(|r| index[r.domain.as_str()]).collect();

        let raw: Vec<[f64; FEATURES]> = rows.iter().map(feature_vector).collect();
        let (means, stds) = column_stats(&raw);
        let x: Vec<[f64; FEATURES]> = raw.iter().map(|v| standardize(v, &means, &stds)).collect();

        let mut weights = vec![vec![0.0; FEATURES]; classes];
        let mut bias = vec![0.0; classes];
        let n = x.len() as f64;

        for _ in 0..EPOCHS {
            let mut grad_w = vec![vec![0.0; FEATURES]; classes];
            let mut grad_b = vec![0.0; classes];

            for (i, sample) in x.iter().enumerate() {
                let probs = softmax_logits(sample, &weights, &bias);
                for class in 0..classes {
                    let error = probs[class] - if labels[i] == class { 1.0 } else { 0.0 };
                    for feature in 0..FEATURES {
                        grad_w[class][feature] += error * sample[feature];
                    }
                    grad_b[class] += error;
                }
            }

            for class in 0..classes {
                for feature in 0..FEATURES {
                    weights[class][feature] -= LEARNING_RATE * grad_w[class][feature] / n;
                }
                bias[class] -= LEARNING_RATE * grad_b[class] / n;
            }
        }

        Ok(DomainClassifier {
            domains,
            means: means.to_vec(),
            stds: stds.to_vec(),
            weights,
            bias,
        })
    }

    /// Probability vector across the trained domains; sums to 1.
    pub fn predict_proba(&self, row: &LabeledFeatureRow) -> Vec<f64> {
        let mut means = [0.0; FEATURES];
        let mut stds = [1.0; FEATURES];
        means.copy_from_slice(&self.means);
        stds.copy_from_slice(&self.stds);
        let x = standardize(&feature_vector(row), &means, &stds);
        softmax_logits(&x, &self.weights, &self.bias)
    }

    /// One likelihood row per trained domain for a student, averaging the
    /// probability vectors of the student's feature rows. Stays a proper
    /// distribution (sums to 1).
    pub fn predict_student(&self, rows: &[LabeledFeatureRow]) -> Result<Vec<DomainLikelihood>, PipelineError> {
        if rows.is_empty() {
            return Err(PipelineError::MissingReferenceData(
                "student has no labeled feature rows to predict from".to_string(),
            ));
        }
        let student_id = rows[0].student_id;
        let mut totals = vec![0.0; self.domains.len()];
        for row in rows {
            for (i, p) in self.predict_proba(row).iter().enumerate() {
                totals[i] += p;
            }
        }
        let n = rows.len() as f64;
        Ok(self
            .domains
            .iter()
            .zip(totals.iter())
            .map(|(domain, total)| DomainLikelihood {
                student_id,
                domain: domain.clone(),
                likelihood_score: total / n,
            })
            .collect())
    }
}

fn feature_vector(row: &LabeledFeatureRow) -> [f64; FEATURES] {
    [
        row.avg_score,
        row.attempt_frequency,
        row.recency_score,
        row.consistency_index,
        row.proficiency_pct,
        row.cluster.ordinal(),
    ]
}

fn column_stats(rows: &[[f64; FEATURES]]) -> ([f64; FEATURES], [f64; FEATURES]) {
    let n = rows.len() as f64;
    let mut means = [0.0; FEATURES];
    let mut stds = [0.0; FEATURES];
    for col in 0..FEATURES {
        means[col] = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        let variance = rows.iter().map(|r| (r[col] - means[col]).powi(2)).sum::<f64>() / n;
        stds[col] = variance.sqrt();
    }
    (means, stds)
}

fn standardize(row: &[f64; FEATURES], means: &[f64; FEATURES], stds: &[f64; FEATURES]) -> [f64; FEATURES] {
    let mut out = [0.0; FEATURES];
    for col in 0..FEATURES {
        out[col] = if stds[col] > 0.0 { (row[col] - means[col]) / stds[col] } else { 0.0 };
    }
    out
}

fn softmax_logits(x: &[f64; FEATURES], weights: &[Vec<f64>], bias: &[f64]) -> Vec<f64> {
    let logits: Vec<f64> = weights
        .iter()
        .zip(bias.iter())
        .map(|(w, b)| x.iter().zip(w.iter()).map(|(xi, wi)| xi * wi).sum::<f64>() + b)
        .collect();
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}
