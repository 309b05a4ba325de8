use serde::Serialize;

/// Keeps an exact match from producing an infinite weight.
pub const DISTANCE_EPSILON: f64 = 1e-3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f64,
}

/// Unsmoothed k-NN output for one query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEstimate {
    pub x_norm: f64,
    pub y_norm: f64,
    /// `1 / (1 + mean neighbour distance)`. Decreases monotonically with
    /// distance in z-score space; it is a heuristic, not a probability.
    pub confidence: f64,
    pub neighbors: usize,
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// The `k` rows closest to `query`, nearest first. Uses every row when there
/// are fewer than `k`.
pub fn nearest(rows: &[Vec<f64>], query: &[f64], k: usize) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = rows
        .iter()
        .enumerate()
        .map(|(row, features)| Neighbor {
            row,
            distance: euclidean(features, query),
        })
        .collect();
    neighbors.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    neighbors.truncate(k);
    neighbors
}

/// Inverse-distance weighted mean of the neighbours' labels, clamped to the
/// unit square. `None` when there is nothing to weight.
pub fn weighted_estimate(neighbors: &[Neighbor], labels: &[(f64, f64)]) -> Option<RawEstimate> {
    let mut wx = 0.0;
    let mut wy = 0.0;
    let mut wsum = 0.0;
    let mut dsum = 0.0;
    let mut used = 0usize;

    for neighbor in neighbors {
        let Some((x, y)) = labels.get(neighbor.row) else {
            continue;
        };
        let w = 1.0 / (neighbor.distance + DISTANCE_EPSILON);
        wx += w * x;
        wy += w * y;
        wsum += w;
        dsum += neighbor.distance;
        used += 1;
    }

    if used == 0 || wsum <= 0.0 {
        return None;
    }

    let avg_distance = dsum / used as f64;
    Some(RawEstimate {
        x_norm: (wx / wsum).clamp(0.0, 1.0),
        y_norm: (wy / wsum).clamp(0.0, 1.0),
        confidence: 1.0 / (1.0 + avg_distance),
        neighbors: used,
    })
}

pub fn regress(
    rows: &[Vec<f64>],
    labels: &[(f64, f64)],
    query: &[f64],
    k: usize,
) -> Option<RawEstimate> {
    weighted_estimate(&nearest(rows, query, k), labels)
}

/// Exponential smoothing of successive positions.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaSmoother {
    alpha: f64,
    carry: Option<(f64, f64)>,
}

impl EmaSmoother {
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            carry: None,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn carry(&self) -> Option<(f64, f64)> {
        self.carry
    }

    /// The first value after a reset passes through unchanged.
    pub fn apply(&mut self, x: f64, y: f64) -> (f64, f64) {
        let smoothed = match self.carry {
            Some((px, py)) => (px + self.alpha * (x - px), py + self.alpha * (y - py)),
            None => (x, y),
        };
        self.carry = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.carry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn euclidean_matches_hand_computation() {
        assert_relative_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_relative_eq!(euclidean(&[1.0, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn nearest_sorts_and_caps_at_row_count() {
        let rows = vec![vec![5.0], vec![1.0], vec![3.0]];
        let picked = nearest(&rows, &[0.0], 10);
        let order: Vec<usize> = picked.iter().map(|n| n.row).collect();
        assert_eq!(order, vec![1, 2, 0]);

        assert_eq!(nearest(&rows, &[0.0], 2).len(), 2);
        assert!(nearest(&rows, &[0.0], 0).is_empty());
    }

    #[test]
    fn single_neighbour_returns_its_label_with_higher_confidence() {
        let rows = vec![vec![0.0, 0.0], vec![10.0, 0.0]];
        let labels = vec![(0.2, 0.3), (0.8, 0.9)];
        let query = [0.0, 0.0];

        let k1 = regress(&rows, &labels, &query, 1).unwrap();
        assert_relative_eq!(k1.x_norm, 0.2);
        assert_relative_eq!(k1.y_norm, 0.3);
        assert_relative_eq!(k1.confidence, 1.0);

        let k2 = regress(&rows, &labels, &query, 2).unwrap();
        assert!((k2.x_norm - 0.2).abs() < 1e-3);
        assert!(k2.confidence < k1.confidence);
        assert_relative_eq!(k2.confidence, 1.0 / 6.0);
    }

    #[test]
    fn equidistant_neighbours_average_evenly() {
        let rows = vec![vec![-1.0], vec![1.0]];
        let labels = vec![(0.0, 0.4), (1.0, 0.6)];
        let est = regress(&rows, &labels, &[0.0], 2).unwrap();
        assert_relative_eq!(est.x_norm, 0.5);
        assert_relative_eq!(est.y_norm, 0.5);
    }

    #[test]
    fn output_is_clamped_to_unit_square() {
        let rows = vec![vec![0.0]];
        let labels = vec![(1.4, -0.2)];
        let est = regress(&rows, &labels, &[0.0], 1).unwrap();
        assert_eq!((est.x_norm, est.y_norm), (1.0, 0.0));
    }

    #[test]
    fn zero_k_yields_no_estimate() {
        let rows = vec![vec![0.0]];
        let labels = vec![(0.5, 0.5)];
        assert!(regress(&rows, &labels, &[0.0], 0).is_none());
    }

    #[test]
    fn ema_passes_first_value_then_smooths() {
        let mut ema = EmaSmoother::new(0.35);
        assert_eq!(ema.apply(0.2, 0.4), (0.2, 0.4));

        let (x, y) = ema.apply(0.6, 0.0);
        assert_relative_eq!(x, 0.2 + 0.35 * (0.6 - 0.2));
        assert_relative_eq!(y, 0.4 + 0.35 * (0.0 - 0.4));

        ema.reset();
        assert_eq!(ema.carry(), None);
        assert_eq!(ema.apply(0.9, 0.9), (0.9, 0.9));
    }
}
