//! Density-based clustering of foreground points into candidate touches:
//! a DBSCAN-equivalent over a fixed-cell spatial grid.

use std::collections::{HashMap, VecDeque};

use crate::types::{Candidate, FgPoint};

type CellKey = (i64, i64);

fn cell_of(point: (f64, f64), eps: f64) -> CellKey {
    ((point.0 / eps).floor() as i64, (point.1 / eps).floor() as i64)
}

fn build_grid(points: &[FgPoint], eps: f64) -> HashMap<CellKey, Vec<usize>> {
    let mut grid: HashMap<CellKey, Vec<usize>> = HashMap::new();
    for (i, p) in points.iter().enumerate() {
        grid.entry(cell_of((p.x, p.y), eps)).or_default().push(i);
    }
    grid
}

fn region_query(points: &[FgPoint], grid: &HashMap<CellKey, Vec<usize>>, eps: f64, i: usize) -> Vec<usize> {
    let (cx, cy) = cell_of((points[i].x, points[i].y), eps);
    let mut neighbors = Vec::new();
    for dx in -1..=1 {
        for dy in -1..=1 {
            if let Some(bucket) = grid.get(&(cx + dx, cy + dy)) {
                for &j in bucket {
                    let d = ((points[i].x - points[j].x).powi(2)
                        + (points[i].y - points[j].y).powi(2))
                    .sqrt();
                    if d <= eps {
                        neighbors.push(j);
                    }
                }
            }
        }
    }
    neighbors
}

/// Cluster `points` (all attributed to the same sensor and scan) into
/// `Candidate`s. Noise points are discarded. Ties in cluster membership are
/// broken by the smaller cluster id, assigned in discovery order starting
/// at 0, by construction: a point is only ever assigned once, to whichever
/// cluster's breadth-first expansion reaches it first.
pub fn cluster(points: &[FgPoint], eps: f64, min_pts: usize, sensor_id: &str, timestamp_ns: u64) -> Vec<Candidate> {
    let n = points.len();
    if n == 0 {
        return Vec::new();
    }

    let grid = build_grid(points, eps);
    let neighbors: Vec<Vec<usize>> = (0..n).map(|i| region_query(points, &grid, eps, i)).collect();
    let is_core: Vec<bool> = neighbors.iter().map(|nb| nb.len() >= min_pts).collect();

    let mut assigned: Vec<Option<usize>> = vec![None; n];
    let mut next_cluster_id = 0usize;

    for i in 0..n {
        if !is_core[i] || assigned[i].is_some() {
            continue;
        }
        let cluster_id = next_cluster_id;
        next_cluster_id += 1;

        let mut queue = VecDeque::new();
        assigned[i] = Some(cluster_id);
        queue.push_back(i);

        while let Some(p) = queue.pop_front() {
            if !is_core[p] {
                continue;
            }
            for &q in &neighbors[p] {
                if assigned[q].is_none() {
                    assigned[q] = Some(cluster_id);
                    if is_core[q] {
                        queue.push_back(q);
                    }
                }
            }
        }
    }

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); next_cluster_id];
    for (i, cluster_id) in assigned.iter().enumerate() {
        if let Some(c) = cluster_id {
            members[*c].push(i);
        }
    }

    members
        .into_iter()
        .filter(|m| !m.is_empty())
        .map(|idxs| {
            let n = idxs.len() as f64;
            let cx = idxs.iter().map(|&i| points[i].x).sum::<f64>() / n;
            let cy = idxs.iter().map(|&i| points[i].y).sum::<f64>() / n;
            let radius = idxs
                .iter()
                .map(|&i| ((points[i].x - cx).powi(2) + (points[i].y - cy).powi(2)).sqrt())
                .fold(0.0_f64, f64::max);
            Candidate {
                x: cx,
                y: cy,
                count: idxs.len(),
                radius,
                sensor_id: sensor_id.to_string(),
                timestamp_ns,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(x: f64, y: f64) -> FgPoint {
        FgPoint {
            x,
            y,
            angle_index: 0,
            raw_distance: 0.0,
        }
    }

    #[test]
    fn forms_one_cluster_from_a_dense_blob() {
        let points = vec![
            point(0.0, 0.0),
            point(0.01, 0.0),
            point(0.0, 0.01),
            point(0.01, 0.01),
            point(0.005, 0.005),
        ];
        let candidates = cluster(&points, 0.05, 3, "s1", 1000);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].count, 5);
        assert!((candidates[0].x - 0.005).abs() < 0.01);
    }

    #[test]
    fn sparse_points_become_noise_and_are_discarded() {
        let points = vec![point(0.0, 0.0), point(5.0, 5.0), point(-5.0, -5.0)];
        let candidates = cluster(&points, 0.05, 3, "s1", 1000);
        assert!(candidates.is_empty());
    }

    #[test]
    fn two_separated_blobs_become_two_candidates() {
        let mut points = vec![
            point(0.0, 0.0),
            point(0.01, 0.0),
            point(0.0, 0.01),
            point(0.01, 0.01),
        ];
        points.extend(vec![
            point(1.0, 1.0),
            point(1.01, 1.0),
            point(1.0, 1.01),
            point(1.01, 1.01),
        ]);
        let candidates = cluster(&points, 0.05, 3, "s1", 1000);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn border_point_attaches_to_smaller_cluster_id() {
        // Two dense cores far enough apart not to merge directly, with a
        // single border point equidistant (within eps) of both cores.
        let mut points = vec![
            point(0.0, 0.0),
            point(0.01, 0.0),
            point(-0.01, 0.0),
            point(0.0, 0.01),
        ];
        // second core, discovered later in iteration order
        points.extend(vec![
            point(10.0, 0.0),
            point(10.01, 0.0),
            point(9.99, 0.0),
            point(10.0, 0.01),
        ]);
        // border point reachable (eps=0.05) only from the first core's
        // nearest member, so it should join cluster 0
        points.push(point(0.02, 0.03));
        let candidates = cluster(&points, 0.05, 3, "s1", 1000);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].count, 5);
        assert_eq!(candidates[1].count, 4);
    }
}
