//! Weighted k-nearest-neighbor position estimation
//!
//! Every fingerprint is scored by the Euclidean distance between its signal
//! map and the live observation over the live APs. A live AP the fingerprint
//! never saw costs a fixed squared penalty, and a fingerprint sharing no AP
//! at all is pushed behind every matching one. The `k` closest fingerprints
//! are averaged with inverse-distance weights.

use crate::core::{
    now_ms, Fingerprint, Position, PositionEstimate, SignalMap, DEFAULT_K_NEIGHBORS,
    DEGREES_TO_METERS, MISMATCH_PENALTY, NO_MATCH_DISTANCE, WEIGHT_EPSILON,
};
use crate::utils::config::SystemConfig;
use nalgebra::{Vector2, Vector3};
use tracing::{error, trace};

/// Estimator parameters
#[derive(Debug, Clone, PartialEq)]
pub struct WknnConfig {
    pub k: usize,
    pub weight_epsilon: f64,
    pub mismatch_penalty: f64,
    pub degrees_to_meters: f64,
}

impl Default for WknnConfig {
    fn default() -> Self {
        Self {
            k: DEFAULT_K_NEIGHBORS,
            weight_epsilon: WEIGHT_EPSILON,
            mismatch_penalty: MISMATCH_PENALTY,
            degrees_to_meters: DEGREES_TO_METERS,
        }
    }
}

impl From<&SystemConfig> for WknnConfig {
    fn from(config: &SystemConfig) -> Self {
        Self {
            k: config.k_neighbors,
            weight_epsilon: config.weight_epsilon,
            mismatch_penalty: config.mismatch_penalty,
            degrees_to_meters: config.degrees_to_meters,
        }
    }
}

/// A fingerprint with its signal distance to the live observation
#[derive(Debug, Clone, PartialEq)]
pub struct RankedNeighbor<'a> {
    pub fingerprint: &'a Fingerprint,
    pub distance: f64,
    /// Live APs also present in the fingerprint
    pub matched_aps: usize,
}

impl RankedNeighbor<'_> {
    pub fn is_match(&self) -> bool {
        self.matched_aps > 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct WknnEstimator {
    config: WknnConfig,
}

impl WknnEstimator {
    pub fn new(config: WknnConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WknnConfig {
        &self.config
    }

    /// Signal distance between `live` and `fingerprint` plus the matched AP count.
    ///
    /// Returns [`NO_MATCH_DISTANCE`] when no live AP appears in the fingerprint.
    pub fn signal_distance(&self, live: &SignalMap, fingerprint: &Fingerprint) -> (f64, usize) {
        let mut sum_sq = 0.0;
        let mut matched = 0;

        for (ap_id, &live_signal) in live {
            match fingerprint.signal_map().get(ap_id) {
                Some(&reference) => {
                    let diff = f64::from(live_signal) - f64::from(reference);
                    sum_sq += diff * diff;
                    matched += 1;
                }
                None => sum_sq += self.config.mismatch_penalty,
            }
        }

        if matched == 0 {
            (NO_MATCH_DISTANCE, 0)
        } else {
            (sum_sq.sqrt(), matched)
        }
    }

    /// All fingerprints ordered by ascending distance.
    ///
    /// Matching fingerprints always precede non-matching ones. The sort is
    /// stable, so equal distances keep their input order.
    pub fn rank<'a>(&self, live: &SignalMap, fingerprints: &'a [Fingerprint]) -> Vec<RankedNeighbor<'a>> {
        let mut ranked: Vec<RankedNeighbor<'a>> = fingerprints
            .iter()
            .map(|fingerprint| {
                let (distance, matched_aps) = self.signal_distance(live, fingerprint);
                RankedNeighbor {
                    fingerprint,
                    distance,
                    matched_aps,
                }
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.is_match()
                .cmp(&a.is_match())
                .then_with(|| a.distance.total_cmp(&b.distance))
        });
        ranked
    }

    /// Estimate the position of `live` stamped with the current wall-clock time
    pub fn estimate(&self, live: &SignalMap, fingerprints: &[Fingerprint]) -> Option<PositionEstimate> {
        self.estimate_at(live, fingerprints, now_ms())
    }

    /// Estimate the position of `live`, stamping the result with `timestamp_ms`.
    ///
    /// Returns `None` when either input is empty.
    pub fn estimate_at(
        &self,
        live: &SignalMap,
        fingerprints: &[Fingerprint],
        timestamp_ms: u64,
    ) -> Option<PositionEstimate> {
        if live.is_empty() || fingerprints.is_empty() {
            return None;
        }

        let ranked = self.rank(live, fingerprints);
        let neighbors = &ranked[..self.config.k.min(ranked.len())];

        let mut weighted_sum = Vector3::<f64>::zeros();
        let mut weight_sum = 0.0;
        for neighbor in neighbors {
            let weight = 1.0 / (neighbor.distance + self.config.weight_epsilon);
            let position = neighbor.fingerprint.position();
            weighted_sum += Vector3::new(position.lat, position.lon, f64::from(position.floor)) * weight;
            weight_sum += weight;
        }

        if !(weight_sum > 0.0 && weight_sum.is_finite()) {
            error!(
                weight_sum,
                epsilon = self.config.weight_epsilon,
                "degenerate neighbor weights, no estimate produced"
            );
            return None;
        }

        let centroid = weighted_sum / weight_sum;
        let position = Position::new(centroid.x, centroid.y, centroid.z.round() as i32);

        let center = Vector2::new(centroid.x, centroid.y);
        let mean_offset = neighbors
            .iter()
            .map(|n| {
                let p = n.fingerprint.position();
                Vector2::new(p.lat, p.lon).metric_distance(&center)
            })
            .sum::<f64>()
            / neighbors.len() as f64;

        let estimate = PositionEstimate {
            timestamp_ms,
            position,
            accuracy_m: mean_offset * self.config.degrees_to_meters,
            neighbor_distances: neighbors.iter().map(|n| n.distance).collect(),
        };

        trace!(
            lat = estimate.position.lat,
            lon = estimate.position.lon,
            floor = estimate.position.floor,
            accuracy_m = estimate.accuracy_m,
            "position estimated"
        );
        Some(estimate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ApId;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn signals(pairs: &[(&str, i32)]) -> SignalMap {
        pairs.iter().map(|(ap, rssi)| (ApId::from(*ap), *rssi)).collect()
    }

    fn fingerprint(lat: f64, lon: f64, floor: i32, pairs: &[(&str, i32)]) -> Fingerprint {
        Fingerprint::new(Position::new(lat, lon, floor), signals(pairs)).unwrap()
    }

    #[test]
    fn test_two_fingerprint_example() {
        let fingerprints = vec![
            fingerprint(1.0, 1.0, 0, &[("A", -50), ("B", -60)]),
            fingerprint(2.0, 2.0, 0, &[("A", -55), ("B", -65)]),
        ];
        let live = signals(&[("A", -50), ("B", -60)]);
        let estimator = WknnEstimator::new(WknnConfig {
            k: 2,
            ..WknnConfig::default()
        });

        let estimate = estimator.estimate_at(&live, &fingerprints, 42).unwrap();

        let w1 = 1.0 / 0.001;
        let w2 = 1.0 / (50.0f64.sqrt() + 0.001);
        let expected = (w1 + 2.0 * w2) / (w1 + w2);

        assert_eq!(estimate.timestamp_ms, 42);
        assert_relative_eq!(estimate.position.lat, expected, epsilon = 1e-12);
        assert_relative_eq!(estimate.position.lon, expected, epsilon = 1e-12);
        assert_relative_eq!(estimate.position.lat, 1.0001, epsilon = 1e-4);
        assert_eq!(estimate.position.floor, 0);

        assert_eq!(estimate.neighbor_distances.len(), 2);
        assert_relative_eq!(estimate.neighbor_distances[0], 0.0);
        assert_relative_eq!(estimate.neighbor_distances[1], 50.0f64.sqrt(), epsilon = 1e-12);
        assert_eq!(estimate.rounded_neighbor_distances(), vec![0.0, 7.1]);

        let offset1 = 2.0f64.sqrt() * (expected - 1.0);
        let offset2 = 2.0f64.sqrt() * (2.0 - expected);
        assert_relative_eq!(
            estimate.accuracy_m,
            (offset1 + offset2) / 2.0 * DEGREES_TO_METERS,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_empty_inputs_yield_none() {
        let estimator = WknnEstimator::default();
        let fingerprints = vec![fingerprint(1.0, 1.0, 0, &[("A", -50)])];

        assert!(estimator.estimate(&SignalMap::new(), &fingerprints).is_none());
        assert!(estimator.estimate(&signals(&[("A", -50)]), &[]).is_none());
    }

    #[test]
    fn test_mismatch_penalty_applied() {
        let estimator = WknnEstimator::default();
        let fp = fingerprint(0.0, 0.0, 0, &[("A", -50)]);
        let live = signals(&[("A", -53), ("Z", -70)]);

        let (distance, matched) = estimator.signal_distance(&live, &fp);
        assert_eq!(matched, 1);
        assert_relative_eq!(distance, (9.0f64 + 10_000.0).sqrt());
    }

    #[test]
    fn test_extreme_signal_values() {
        let estimator = WknnEstimator::default();
        let fingerprints = vec![
            fingerprint(1.0, 1.0, 0, &[("A", -50)]),
            fingerprint(2.0, 2.0, 0, &[("A", i32::MIN)]),
        ];
        let live = signals(&[("A", i32::MAX)]);

        let (distance, matched) = estimator.signal_distance(&live, &fingerprints[0]);
        assert_eq!(matched, 1);
        assert_relative_eq!(distance, f64::from(i32::MAX) + 50.0, max_relative = 1e-12);

        let (distance, _) = estimator.signal_distance(&live, &fingerprints[1]);
        assert_relative_eq!(distance, f64::from(i32::MAX) - f64::from(i32::MIN), max_relative = 1e-12);

        let estimate = estimator.estimate_at(&live, &fingerprints, 7).unwrap();
        assert!(estimate.position.lat.is_finite());
        assert!(estimate.accuracy_m.is_finite());
        assert_relative_eq!(estimate.neighbor_distances[0], f64::from(i32::MAX) + 50.0, max_relative = 1e-12);
    }

    #[test]
    fn test_no_common_ap_sorts_last() {
        let estimator = WknnEstimator::new(WknnConfig {
            k: 1,
            ..WknnConfig::default()
        });
        let fingerprints = vec![
            fingerprint(9.0, 9.0, 4, &[("X", -40)]),
            fingerprint(1.0, 1.0, 0, &[("A", -90), ("Y", -40)]),
        ];
        let live = signals(&[("A", -30)]);

        let ranked = estimator.rank(&live, &fingerprints);
        assert!(ranked[0].is_match());
        assert_eq!(ranked[1].distance, NO_MATCH_DISTANCE);

        let estimate = estimator.estimate_at(&live, &fingerprints, 1).unwrap();
        assert_eq!(estimate.position.floor, 0);
        assert_relative_eq!(estimate.position.lat, 1.0);
    }

    #[test]
    fn test_all_unmatched_still_estimates() {
        let estimator = WknnEstimator::default();
        let fingerprints = vec![fingerprint(3.0, 4.0, 1, &[("X", -40)])];
        let estimate = estimator
            .estimate_at(&signals(&[("A", -30)]), &fingerprints, 1)
            .unwrap();
        assert_relative_eq!(estimate.position.lat, 3.0);
        assert_eq!(estimate.neighbor_distances, vec![NO_MATCH_DISTANCE]);
        assert_relative_eq!(estimate.accuracy_m, 0.0);
    }

    #[test]
    fn test_stable_tie_break() {
        let estimator = WknnEstimator::new(WknnConfig {
            k: 1,
            ..WknnConfig::default()
        });
        let fingerprints = vec![
            fingerprint(1.0, 1.0, 0, &[("A", -50)]),
            fingerprint(2.0, 2.0, 1, &[("A", -50)]),
        ];
        let estimate = estimator
            .estimate_at(&signals(&[("A", -50)]), &fingerprints, 1)
            .unwrap();
        assert_relative_eq!(estimate.position.lat, 1.0);

        let ranked = estimator.rank(&signals(&[("A", -50)]), &fingerprints);
        assert_eq!(ranked[0].fingerprint.position().lat, 1.0);
        assert_eq!(ranked[1].fingerprint.position().lat, 2.0);
    }

    #[test]
    fn test_k_larger_than_database() {
        let estimator = WknnEstimator::new(WknnConfig {
            k: 10,
            ..WknnConfig::default()
        });
        let fingerprints = vec![
            fingerprint(1.0, 1.0, 0, &[("A", -50)]),
            fingerprint(1.0, 3.0, 2, &[("A", -50)]),
        ];
        let estimate = estimator
            .estimate_at(&signals(&[("A", -50)]), &fingerprints, 1)
            .unwrap();
        assert_eq!(estimate.neighbor_distances.len(), 2);
        assert_relative_eq!(estimate.position.lon, 2.0);
        assert_eq!(estimate.position.floor, 1);
        assert_relative_eq!(estimate.accuracy_m, DEGREES_TO_METERS);
    }

    #[test]
    fn test_floor_rounding() {
        let estimator = WknnEstimator::default();
        // distances 0, 10, 10: weight of floor 2 dominates
        let fingerprints = vec![
            fingerprint(0.0, 0.0, 2, &[("A", -50)]),
            fingerprint(0.0, 0.0, 0, &[("A", -60)]),
            fingerprint(0.0, 0.0, 0, &[("A", -40)]),
        ];
        let estimate = estimator
            .estimate_at(&signals(&[("A", -50)]), &fingerprints, 1)
            .unwrap();
        assert_eq!(estimate.position.floor, 2);
    }

    #[test]
    fn test_degenerate_weights_yield_none() {
        let estimator = WknnEstimator::new(WknnConfig {
            weight_epsilon: 0.0,
            ..WknnConfig::default()
        });
        let fingerprints = vec![fingerprint(0.0, 0.0, 0, &[("A", -50)])];
        // zero distance with zero epsilon gives an infinite weight
        assert!(estimator
            .estimate_at(&signals(&[("A", -50)]), &fingerprints, 1)
            .is_none());
    }

    proptest! {
        #[test]
        fn prop_centroid_inside_neighbor_bounds(
            refs in proptest::collection::vec(
                (-10.0f64..10.0, -10.0f64..10.0, -2i32..5, -100i32..-20, -100i32..-20),
                1..12,
            ),
            live_a in -100i32..-20,
            live_b in -100i32..-20,
            k in 1usize..6,
        ) {
            let fingerprints: Vec<Fingerprint> = refs
                .iter()
                .map(|&(lat, lon, floor, a, b)| fingerprint(lat, lon, floor, &[("A", a), ("B", b)]))
                .collect();
            let live = signals(&[("A", live_a), ("B", live_b)]);
            let estimator = WknnEstimator::new(WknnConfig { k, ..WknnConfig::default() });

            let estimate = estimator.estimate_at(&live, &fingerprints, 1).unwrap();
            let ranked = estimator.rank(&live, &fingerprints);
            let selected = &ranked[..k.min(ranked.len())];

            let lats = selected.iter().map(|n| n.fingerprint.position().lat);
            let lons = selected.iter().map(|n| n.fingerprint.position().lon);
            let floors = selected.iter().map(|n| n.fingerprint.position().floor);
            let (min_lat, max_lat) = lats.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let (min_lon, max_lon) = lons.fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));
            let (min_floor, max_floor) = floors.fold((i32::MAX, i32::MIN), |(lo, hi), v| (lo.min(v), hi.max(v)));

            prop_assert!(estimate.position.lat >= min_lat - 1e-9 && estimate.position.lat <= max_lat + 1e-9);
            prop_assert!(estimate.position.lon >= min_lon - 1e-9 && estimate.position.lon <= max_lon + 1e-9);
            prop_assert!(estimate.position.floor >= min_floor && estimate.position.floor <= max_floor);
            prop_assert_eq!(estimate.neighbor_distances.len(), selected.len());
            prop_assert!(estimate.accuracy_m >= 0.0);
        }
    }
}
