//! Multi-sensor fusion: merge mapped candidates from different sensors that
//! land on the same touch point on a screen.

use crate::types::{euclidean, MappedCandidate};

/// A fused point: the weighted centroid of one or more `MappedCandidate`s
/// that converged to within `r_merge` of each other.
#[derive(Debug, Clone)]
pub struct FusedPoint {
    pub u: f64,
    pub v: f64,
    pub weight: f64,
    pub sources: Vec<MappedCandidate>,
}

/// Iteratively merge `candidates` (already normalized to the same screen's
/// unit square) into fused points. Two candidates merge if their distance is
/// within `r_merge`; merging repeats until no further merge occurs
/// (candidates converge to a fixed point), then the surviving groups are
/// reduced to their weighted centroid.
pub fn fuse(candidates: &[MappedCandidate], r_merge: f64) -> Vec<FusedPoint> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let n = candidates.len();
    let mut parent: Vec<usize> = (0..n).collect();

    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    fn union(parent: &mut [usize], a: usize, b: usize) {
        let ra = find(parent, a);
        let rb = find(parent, b);
        if ra != rb {
            let keep = ra.min(rb);
            let drop = ra.max(rb);
            parent[drop] = keep;
        }
    }

    // Fixed-point merge: repeat pairwise distance checks against each
    // group's current centroid until group membership stops changing.
    loop {
        let mut changed = false;
        let centroids = group_centroids(candidates, &mut parent);
        for i in 0..n {
            let ri = find(&mut parent, i);
            for j in (i + 1)..n {
                let rj = find(&mut parent, j);
                if ri == rj {
                    continue;
                }
                let ci = centroids[&ri];
                let cj = centroids[&rj];
                if euclidean(ci, cj) <= r_merge {
                    union(&mut parent, i, j);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }

    let mut groups: std::collections::HashMap<usize, Vec<usize>> = std::collections::HashMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        groups.entry(root).or_default().push(i);
    }

    let mut roots: Vec<usize> = groups.keys().copied().collect();
    roots.sort_unstable();

    roots
        .into_iter()
        .map(|root| {
            let idxs = &groups[&root];
            let total_weight: f64 = idxs.iter().map(|&i| candidates[i].weight()).sum();
            let u = idxs
                .iter()
                .map(|&i| candidates[i].u * candidates[i].weight())
                .sum::<f64>()
                / total_weight;
            let v = idxs
                .iter()
                .map(|&i| candidates[i].v * candidates[i].weight())
                .sum::<f64>()
                / total_weight;
            FusedPoint {
                u,
                v,
                weight: total_weight,
                sources: idxs.iter().map(|&i| candidates[i].clone()).collect(),
            }
        })
        .collect()
}

fn group_centroids(
    candidates: &[MappedCandidate],
    parent: &mut [usize],
) -> std::collections::HashMap<usize, (f64, f64)> {
    fn find(parent: &mut [usize], x: usize) -> usize {
        if parent[x] != x {
            parent[x] = find(parent, parent[x]);
        }
        parent[x]
    }

    let mut sums: std::collections::HashMap<usize, (f64, f64, f64)> = std::collections::HashMap::new();
    for (i, c) in candidates.iter().enumerate() {
        let root = find(parent, i);
        let entry = sums.entry(root).or_insert((0.0, 0.0, 0.0));
        let w = c.weight();
        entry.0 += c.u * w;
        entry.1 += c.v * w;
        entry.2 += w;
    }
    sums.into_iter()
        .map(|(root, (su, sv, sw))| (root, (su / sw, sv / sw)))
        .collect()
}
