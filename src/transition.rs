use crate::models::Cluster;

pub const MIN_HISTORY_POINTS: usize = 3;

const CONSISTENT_DROP: f64 = -10.0;
const DROPPING_TO_LOW: f64 = -5.0;
const DROPPING_RECOVERY: f64 = 8.0;
const IMPROVING_PROMOTION: f64 = 10.0;
const LOW_RECOVERY: f64 = 8.0;

/// Short-term trend: latest weekly score minus the mean of the two
/// scores before it. Requires at least MIN_HISTORY_POINTS observations,
/// oldest first.
pub fn trend(scores_oldest_first: &[f64]) -> Option<f64> {
    if scores_oldest_first.len() < MIN_HISTORY_POINTS {
        return None;
    }
    let latest = scores_oldest_first[scores_oldest_first.len() - 1];
    let prev = &scores_oldest_first[scores_oldest_first.len() - 3..scores_oldest_first.len() - 1];
    Some(latest - (prev[0] + prev[1]) / 2.0)
}

/// Applies one step of the trend-gated transition table. Upward moves
/// need a stronger trend than downward ones so labels don't flap, and at
/// most one edge is taken per run. Returns None when the label holds.
pub fn next_cluster(current: Cluster, trend: f64) -> Option<Cluster> {
    let next = match current {
        Cluster::Consistent if trend < CONSISTENT_DROP => Cluster::Dropping,
        Cluster::Dropping if trend < DROPPING_TO_LOW => Cluster::Low,
        Cluster::Dropping if trend > DROPPING_RECOVERY => Cluster::Improving,
        Cluster::Improving if trend > IMPROVING_PROMOTION => Cluster::Consistent,
        Cluster::Low if trend > LOW_RECOVERY => Cluster::Improving,
        _ => return None,
    };
    Some(next)
}

/// Combines history and current label into a transition decision.
/// Domains with too little history are left untouched (not an error).
pub fn evaluate(current: Cluster, scores_oldest_first: &[f64]) -> Option<Cluster> {
    let trend = trend(scores_oldest_first)?;
    next_cluster(current, trend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_history_never_transitions() {
        assert_eq!(evaluate(Cluster::Consistent, &[90.0, 10.0]), None);
        assert_eq!(evaluate(Cluster::Low, &[95.0]), None);
    }

    #[test]
    fn consistent_drops_on_sharp_decline() {
        // trend = 70 - mean(90, 88) = -19
        assert_eq!(evaluate(Cluster::Consistent, &[90.0, 88.0, 70.0]), Some(Cluster::Dropping));
    }

    #[test]
    fn dropping_recovers_on_strong_upswing() {
        // trend = 62 - mean(50, 48) = 13
        assert_eq!(evaluate(Cluster::Dropping, &[50.0, 48.0, 62.0]), Some(Cluster::Improving));
    }

    #[test]
    fn dropping_sinks_to_low() {
        assert_eq!(next_cluster(Cluster::Dropping, -6.0), Some(Cluster::Low));
        assert_eq!(next_cluster(Cluster::Dropping, -5.0), None);
    }

    #[test]
    fn improving_promotes_only_past_threshold() {
        assert_eq!(next_cluster(Cluster::Improving, 10.1), Some(Cluster::Consistent));
        assert_eq!(next_cluster(Cluster::Improving, 10.0), None);
        assert_eq!(next_cluster(Cluster::Improving, -20.0), None);
    }

    #[test]
    fn low_recovers_to_improving_not_higher() {
        // One edge per run: a huge upswing still only reaches IMPROVING.
        assert_eq!(next_cluster(Cluster::Low, 50.0), Some(Cluster::Improving));
    }

    #[test]
    fn hysteresis_holds_small_moves() {
        assert_eq!(next_cluster(Cluster::Consistent, -9.9), None);
        assert_eq!(next_cluster(Cluster::Dropping, 7.9), None);
        assert_eq!(next_cluster(Cluster::Low, -40.0), None);
    }

    #[test]
    fn trend_uses_latest_three_points_only() {
        let t = trend(&[10.0, 20.0, 50.0, 48.0, 62.0]).unwrap();
        assert!((t - 13.0).abs() < 1e-9);
    }
}
