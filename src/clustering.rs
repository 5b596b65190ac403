use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::models::{Cluster, ClusterAssignment};

pub const MIN_POPULATION: usize = 4;
const K: usize = 4;
const N_INIT: usize = 10;
const MAX_ITERATIONS: usize = 100;
const SEED: u64 = 42;

/// Per-student row presented to the clusterer: the four engineered
/// signals plus the latest weekly engagement score.
#[derive(Debug, Clone)]
pub struct ClusterInput {
    pub student_id: i32,
    pub domain: String,
    pub avg_score: f64,
    pub attempt_frequency: f64,
    pub recency_score: f64,
    pub consistency_index: f64,
    pub engagement_score: f64,
}

impl ClusterInput {
    fn vector(&self) -> [f64; 5] {
        [
            self.avg_score,
            self.attempt_frequency,
            self.recency_score,
            self.consistency_index,
            self.engagement_score,
        ]
    }
}

/// Clusters every domain independently; domains with fewer than
/// MIN_POPULATION students are skipped. Returns the assignments and the
/// number of skipped domains.
pub fn cluster_all(rows: &[ClusterInput], today: NaiveDate) -> (Vec<ClusterAssignment>, usize) {
    let mut by_domain: BTreeMap<&str, Vec<&ClusterInput>> = BTreeMap::new();
    for row in rows {
        by_domain.entry(row.domain.as_str()).or_default().push(row);
    }

    let mut assignments = Vec::new();
    let mut skipped = 0usize;
    for (_, domain_rows) in by_domain {
        match cluster_domain(&domain_rows, today) {
            Some(mut domain_assignments) => assignments.append(&mut domain_assignments),
            None => skipped += 1,
        }
    }
    (assignments, skipped)
}

/// Clusters one domain's population into the four ordinal buckets.
///
/// The 5-feature vectors are z-standardized, partitioned by seeded
/// k-means (k=4, best of 10 initializations), and the resulting centroids
/// are ranked by their members' mean engagement score: lowest rank maps
/// to LOW, highest to CONSISTENT. Labels are rank-derived each run, not
/// stable identities. Confidence is 1/(1+d) for the distance to the
/// nearest centroid in standardized space.
pub fn cluster_domain(rows: &[&ClusterInput], today: NaiveDate) -> Option<Vec<ClusterAssignment>> {
    if rows.len() < MIN_POPULATION {
        return None;
    }

    let vectors: Vec<[f64; 5]> = rows.iter().map(|r| r.vector()).collect();
    let standardized = standardize(&vectors);
    let (labels, centroids) = kmeans(&standardized);

    // Rank clusters by their members' mean engagement score, ascending.
    let mut mean_engagement: Vec<(usize, f64)> = (0..K)
        .map(|cluster_id| {
            let members: Vec<f64> = labels
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == cluster_id)
                .map(|(i, _)| rows[i].engagement_score)
                .collect();
            let mean = if members.is_empty() {
                f64::NEG_INFINITY
            } else {
                members.iter().sum::<f64>() / members.len() as f64
            };
            (cluster_id, mean)
        })
        .collect();
    mean_engagement.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

    let ordered = [Cluster::Low, Cluster::Dropping, Cluster::Improving, Cluster::Consistent];
    let mut label_map = [Cluster::Low; K];
    for (rank, (cluster_id, _)) in mean_engagement.iter().enumerate() {
        label_map[*cluster_id] = ordered[rank];
    }

    let assignments = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let nearest = centroids
                .iter()
                .map(|c| distance(&standardized[i], c))
                .fold(f64::INFINITY, f64::min);
            ClusterAssignment {
                student_id: row.student_id,
                domain: row.domain.clone(),
                cluster: label_map[labels[i]],
                confidence: 1.0 / (1.0 + nearest),
                last_updated: today,
            }
        })
        .collect();

    Some(assignments)
}

fn standardize(vectors: &[[f64; 5]]) -> Vec<[f64; 5]> {
    let n = vectors.len() as f64;
    let mut means = [0.0; 5];
    let mut stds = [0.0; 5];
    for col in 0..5 {
        means[col] = vectors.iter().map(|v| v[col]).sum::<f64>() / n;
        let variance = vectors.iter().map(|v| (v[col] - means[col]).powi(2)).sum::<f64>() / n;
        stds[col] = variance.sqrt();
    }
    vectors
        .iter()
        .map(|v| {
            let mut out = [0.0; 5];
            for col in 0..5 {
                out[col] = if stds[col] > 0.0 { (v[col] - means[col]) / stds[col] } else { 0.0 };
            }
            out
        })
        .collect()
}

/// Seeded Lloyd's k-means: N_INIT restarts from randomly sampled points,
/// keeping the partition with the lowest inertia.
fn kmeans(points: &[[f64; 5]]) -> (Vec<usize>, Vec<[f64; 5]>) {
    let mut rng = StdRng::seed_from_u64(SEED);
    let mut best_inertia = f64::INFINITY;
    let mut best_labels = vec![0usize; points.len()];
    let mut best_centroids: Vec<[f64; 5]> = points[..K].to_vec();

    for _ in 0..N_INIT {
        let mut indices: Vec<usize> = (0..points.len()).collect();
        indices.shuffle(&mut rng);
        let mut centroids: Vec<[f64; 5]> = indices.iter().take(K).map(|&i| points[i]).collect();
        let mut labels = vec![0usize; points.len()];

        for _ in 0..MAX_ITERATIONS {
            let mut changed = false;
            for (i, point) in points.iter().enumerate() {
                let nearest = nearest_centroid(point, &centroids);
                if labels[i] != nearest {
                    labels[i] = nearest;
                    changed = true;
                }
            }

            recompute_centroids(points, &labels, &mut centroids);
            if !changed {
                break;
            }
        }

        let inertia: f64 = points
            .iter()
            .enumerate()
            .map(|(i, p)| distance(p, &centroids[labels[i]]).powi(2))
            .sum();

        if inertia < best_inertia {
            best_inertia = inertia;
            best_labels = labels;
            best_centroids = centroids;
        }
    }

    (best_labels, best_centroids)
}

fn nearest_centroid(point: &[f64; 5], centroids: &[[f64; 5]]) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = distance(point, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn recompute_centroids(points: &[[f64; 5]], labels: &[usize], centroids: &mut [[f64; 5]]) {
    for cluster_id in 0..K {
        let members: Vec<&[f64; 5]> = points
            .iter()
            .enumerate()
            .filter(|(i, _)| labels[*i] == cluster_id)
            .map(|(_, p)| p)
            .collect();
        if members.is_empty() {
            // Reseed an emptied cluster on the point farthest from its
            // assigned centroid, so all four buckets stay populated.
            if let Some((farthest, _)) = points
                .iter()
                .enumerate()
                .map(|(i, p)| (i, distance(p, &centroids[labels[i]])))
                .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            {
                centroids[cluster_id] = points[farthest];
            }
            continue;
        }
        for col in 0..5 {
            centroids[cluster_id][col] =
                members.iter().map(|m| m[col]).sum::<f64>() / members.len() as f64;
        }
    }
}

fn distance(a: &[f64; 5], b: &[f64; 5]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn row(student_id: i32, engagement: f64) -> ClusterInput {
        // Signals correlated with the engagement score so the four rows
        // are well separated in feature space.
        ClusterInput {
            student_id,
            domain: "AI/ML".to_string(),
            avg_score: engagement,
            attempt_frequency: engagement / 10.0,
            recency_score: engagement / 100.0,
            consistency_index: engagement / 120.0,
            engagement_score: engagement,
        }
    }

    #[test]
    fn small_domains_are_skipped() {
        let rows = vec![row(1, 20.0), row(2, 50.0), row(3, 80.0)];
        let (assignments, skipped) = cluster_all(&rows, today());
        assert!(assignments.is_empty());
        assert_eq!(skipped, 1);
    }

    #[test]
    fn four_spread_students_get_one_label_each() {
        let rows = vec![row(1, 10.0), row(2, 40.0), row(3, 70.0), row(4, 95.0)];
        let (assignments, skipped) = cluster_all(&rows, today());
        assert_eq!(skipped, 0);
        assert_eq!(assignments.len(), 4);

        let mut labels: Vec<&str> = assignments.iter().map(|a| a.cluster.as_str()).collect();
        labels.sort();
        assert_eq!(labels, vec!["CONSISTENT", "DROPPING", "IMPROVING", "LOW"]);

        let top = assignments.iter().find(|a| a.student_id == 4).unwrap();
        assert_ne!(top.cluster, Cluster::Low);
        assert_eq!(top.cluster, Cluster::Consistent);
        let bottom = assignments.iter().find(|a| a.student_id == 1).unwrap();
        assert_eq!(bottom.cluster, Cluster::Low);
    }

    #[test]
    fn confidence_is_bounded_and_high_for_tight_points() {
        let rows = vec![row(1, 10.0), row(2, 40.0), row(3, 70.0), row(4, 95.0)];
        let (assignments, _) = cluster_all(&rows, today());
        for a in &assignments {
            assert!(a.confidence > 0.0 && a.confidence <= 1.0);
            // Singleton clusters sit on their centroid exactly.
            assert!((a.confidence - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn domains_cluster_independently() {
        let mut rows: Vec<ClusterInput> = (1..=4).map(|i| row(i, i as f64 * 20.0)).collect();
        for i in 1..=2 {
            let mut r = row(100 + i, 50.0);
            r.domain = "Web Dev".to_string();
            rows.push(r);
        }
        let (assignments, skipped) = cluster_all(&rows, today());
        assert_eq!(assignments.len(), 4);
        assert_eq!(skipped, 1);
        assert!(assignments.iter().all(|a| a.domain == "AI/ML"));
    }
}
