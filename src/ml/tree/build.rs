use rand::rngs::StdRng;

use super::Node;
use crate::ml::math::argmax;

/// Which features a node may split on.
pub(crate) enum FeatureSampler<'a> {
    /// Every feature, every node.
    All,
    /// A fresh random subset per node; all features are scanned if the subset cannot split.
    Random { rng: &'a mut StdRng, per_split: usize },
}

impl FeatureSampler<'_> {
    fn sample(&mut self, dim: usize) -> Option<Vec<usize>> {
        match self {
            FeatureSampler::All => None,
            FeatureSampler::Random { rng, per_split } => {
                let amount = (*per_split).clamp(1, dim);
                Some(rand::seq::index::sample(*rng, dim, amount).into_vec())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Split {
    score: f64,
    feature: usize,
    threshold: f32,
}

/// Grow an unpruned CART tree over `indices` and return its flattened nodes.
pub(crate) fn grow(
    x: &[Vec<f32>],
    y: &[u8],
    classes: &[u8],
    indices: Vec<usize>,
    sampler: &mut FeatureSampler<'_>,
) -> Vec<Node> {
    let dim = x.first().map(Vec::len).unwrap_or(0);
    let targets: Vec<usize> = y
        .iter()
        .map(|label| classes.binary_search(label).unwrap_or(0))
        .collect();

    let mut nodes = vec![Node::Leaf { label: 0 }];
    let mut stack = vec![(0usize, indices)];
    while let Some((slot, idxs)) = stack.pop() {
        let counts = class_counts(&targets, &idxs, classes.len());
        let majority = classes[argmax(&counts)];
        let populated = counts.iter().filter(|&&c| c > 0).count();
        if populated <= 1 {
            nodes[slot] = Node::Leaf { label: majority };
            continue;
        }

        let split = match sampler.sample(dim) {
            Some(subset) => best_split(x, &targets, &idxs, &counts, subset.into_iter())
                .or_else(|| best_split(x, &targets, &idxs, &counts, 0..dim)),
            None => best_split(x, &targets, &idxs, &counts, 0..dim),
        };
        let Some(split) = split else {
            nodes[slot] = Node::Leaf { label: majority };
            continue;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = idxs
            .into_iter()
            .partition(|&i| x[i][split.feature] <= split.threshold);
        let left_slot = nodes.len();
        nodes.push(Node::Leaf { label: majority });
        let right_slot = nodes.len();
        nodes.push(Node::Leaf { label: majority });
        nodes[slot] = Node::Split {
            feature: split.feature as u32,
            threshold: split.threshold,
            left: left_slot as u32,
            right: right_slot as u32,
        };
        stack.push((right_slot, right));
        stack.push((left_slot, left));
    }
    nodes
}

fn class_counts(targets: &[usize], idxs: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0usize; n_classes];
    for &i in idxs {
        counts[targets[i]] += 1;
    }
    counts
}

fn gini(counts: &[usize], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / total;
            p * p
        })
        .sum::<f64>()
}

/// Lowest weighted Gini split among `features`; the first candidate wins ties.
fn best_split(
    x: &[Vec<f32>],
    targets: &[usize],
    idxs: &[usize],
    totals: &[usize],
    features: impl Iterator<Item = usize>,
) -> Option<Split> {
    let n = idxs.len();
    let mut best: Option<Split> = None;
    let mut pairs: Vec<(f32, usize)> = Vec::with_capacity(n);
    let mut left = vec![0usize; totals.len()];
    let mut right = vec![0usize; totals.len()];

    for feature in features {
        pairs.clear();
        pairs.extend(idxs.iter().map(|&i| (x[i][feature], targets[i])));
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        if pairs[0].0 == pairs[n - 1].0 {
            continue;
        }
        left.iter_mut().for_each(|c| *c = 0);
        for s in 0..n - 1 {
            left[pairs[s].1] += 1;
            let (lo, hi) = (pairs[s].0, pairs[s + 1].0);
            if lo == hi {
                continue;
            }
            for (r, (t, l)) in right.iter_mut().zip(totals.iter().zip(&left)) {
                *r = t - l;
            }
            let n_left = s + 1;
            let n_right = n - n_left;
            let score = (n_left as f64 * gini(&left, n_left)
                + n_right as f64 * gini(&right, n_right))
                / n as f64;
            if best.is_none_or(|b| score < b.score) {
                best = Some(Split {
                    score,
                    feature,
                    threshold: midpoint(lo, hi),
                });
            }
        }
    }
    best
}

/// A threshold `t` with `lo <= t < hi`.
fn midpoint(lo: f32, hi: f32) -> f32 {
    let mid = lo + (hi - lo) / 2.0;
    if mid >= lo && mid < hi { mid } else { lo }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn midpoint_stays_below_upper_bound() {
        assert_eq!(midpoint(0.0, 1.0), 0.5);
        let lo = 1.0f32;
        let hi = f32::from_bits(lo.to_bits() + 1);
        assert_eq!(midpoint(lo, hi), lo);
    }

    #[test]
    fn random_sampler_falls_back_to_all_features() {
        // Only feature 3 separates the classes; a one-feature sample will usually miss it.
        let x = vec![
            vec![1.0, 1.0, 1.0, 0.0],
            vec![1.0, 1.0, 1.0, 0.2],
            vec![1.0, 1.0, 1.0, 0.9],
            vec![1.0, 1.0, 1.0, 1.0],
        ];
        let y = vec![1, 1, 2, 2];
        let mut rng = StdRng::seed_from_u64(3);
        let mut sampler = FeatureSampler::Random {
            rng: &mut rng,
            per_split: 1,
        };
        let nodes = grow(&x, &y, &[1, 2], (0..4).collect(), &mut sampler);
        assert!(matches!(nodes[0], Node::Split { feature: 3, .. }));
        assert_eq!(nodes.len(), 3);
    }
}
