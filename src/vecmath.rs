//! Vector math shared by the vector store and the concept builder.

use rand::Rng;

/// Cosine similarity between two vectors, 0.0 when either has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for i in 0..a.len().min(b.len()) {
        dot += a[i] as f64 * b[i] as f64;
        norm_a += a[i] as f64 * a[i] as f64;
        norm_b += b[i] as f64 * b[i] as f64;
    }
    let norm = norm_a.sqrt() * norm_b.sqrt();
    if norm == 0.0 {
        return 0.0;
    }
    dot / norm
}

/// Normalize a vector to unit length. A zero vector stays zero.
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f64 = v.iter().map(|&x| x as f64 * x as f64).sum::<f64>().sqrt();
    if norm == 0.0 {
        return vec![0.0; v.len()];
    }
    v.iter().map(|&x| (x as f64 / norm) as f32).collect()
}

pub fn dot_product(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x as f64 * y as f64)
        .sum()
}

fn sq_dist(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let diff = x as f64 - y as f64;
            diff * diff
        })
        .sum()
}

/// k-means clustering with k-means++ initialization and Lloyd iteration.
/// Returns (labels, centroids). When n <= k, every vector is its own cluster.
pub fn kmeans(vectors: &[Vec<f32>], k: usize, max_iter: usize) -> (Vec<usize>, Vec<Vec<f32>>) {
    let n = vectors.len();
    if n == 0 {
        return (Vec::new(), Vec::new());
    }
    let dim = vectors[0].len();

    if n <= k {
        let labels = (0..n).collect();
        let centroids = vectors.to_vec();
        return (labels, centroids);
    }

    let mut rng = rand::thread_rng();

    // k-means++: first centroid uniform, each next weighted by squared
    // distance to the closest already-chosen centroid.
    let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(k);
    centroids.push(vectors[rng.gen_range(0..n)].clone());

    while centroids.len() < k {
        let dists: Vec<f64> = vectors
            .iter()
            .map(|v| {
                centroids
                    .iter()
                    .map(|c| sq_dist(v, c))
                    .fold(f64::MAX, f64::min)
            })
            .collect();

        let total: f64 = dists.iter().sum();
        if total == 0.0 {
            centroids.push(vectors[rng.gen_range(0..n)].clone());
            continue;
        }
        let threshold = rng.gen::<f64>() * total;
        let mut cumsum = 0.0;
        let mut chosen = 0;
        for (j, d) in dists.iter().enumerate() {
            cumsum += d;
            if cumsum >= threshold {
                chosen = j;
                break;
            }
        }
        centroids.push(vectors[chosen].clone());
    }

    let mut labels = vec![0usize; n];
    for _ in 0..max_iter {
        let mut changed = false;
        for (i, v) in vectors.iter().enumerate() {
            let mut best = 0;
            let mut best_dist = sq_dist(v, &centroids[0]);
            for (ci, c) in centroids.iter().enumerate().skip(1) {
                let d = sq_dist(v, c);
                if d < best_dist {
                    best_dist = d;
                    best = ci;
                }
            }
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut counts = vec![0usize; k];
        let mut sums = vec![vec![0.0f32; dim]; k];
        for (i, v) in vectors.iter().enumerate() {
            let ci = labels[i];
            counts[ci] += 1;
            for (d, &x) in v.iter().enumerate() {
                sums[ci][d] += x;
            }
        }
        for ci in 0..k {
            if counts[ci] > 0 {
                for x in sums[ci].iter_mut() {
                    *x /= counts[ci] as f32;
                }
                centroids[ci] = std::mem::take(&mut sums[ci]);
            }
        }
    }

    (labels, centroids)
}
