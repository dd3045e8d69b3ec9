// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! A t-digest sketch for approximate quantiles.
//!
//! An implementation of the [merging t-digest] with the piecewise-quadratic
//! scale function: incoming values are buffered, sorted, and folded into
//! the centroid list whenever the buffer fills, keeping at most O(delta)
//! centroids. Accuracy is highest near the distribution tails.
//!
//! [merging t-digest]: https://arxiv.org/abs/1902.04023

/// A weighted point of the sketch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    mean: f64,
    weight: f64,
}

impl Centroid {
    fn new(mean: f64, weight: f64) -> Self {
        Self { mean, weight }
    }

    fn add(&mut self, mean: f64, weight: f64) {
        let total = self.weight + weight;
        self.mean = (self.mean * self.weight + mean * weight) / total;
        self.weight = total;
    }
}

/// Inverse of the scale function: the quantile at which the k-index
/// reaches `k`, for compression parameter `delta`.
fn k_to_q(k: f64, delta: f64) -> f64 {
    let k_div_delta = k / delta;
    if k_div_delta >= 0.5 {
        let base = 1.0 - k_div_delta;
        1.0 - 2.0 * base * base
    } else {
        2.0 * k_div_delta * k_div_delta
    }
}

/// A per-group quantile sketch.
#[derive(Debug, Clone)]
pub struct TDigest {
    delta: u32,
    buffer_size: u32,
    /// Compressed centroids, sorted by mean.
    centroids: Vec<Centroid>,
    /// Weight held in `centroids`.
    centroid_weight: f64,
    /// Values not yet folded into `centroids`.
    buffer: Vec<f64>,
    min: f64,
    max: f64,
}

impl TDigest {
    pub fn new(delta: u32, buffer_size: u32) -> Self {
        Self {
            delta: delta.max(1),
            buffer_size: buffer_size.max(1),
            centroids: vec![],
            centroid_weight: 0.0,
            buffer: vec![],
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    /// Adds a value, ignoring NaNs.
    pub fn nan_add(&mut self, value: f64) {
        if value.is_nan() {
            return;
        }
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.buffer.push(value);
        if self.buffer.len() >= self.buffer_size as usize {
            self.flush();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty() && self.buffer.is_empty()
    }

    /// Total weight of the sketch.
    pub fn count(&self) -> f64 {
        self.centroid_weight + self.buffer.len() as f64
    }

    /// Concatenates another sketch into this one.
    pub fn merge(&mut self, other: &TDigest) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        let mut merged: Vec<Centroid> = Vec::with_capacity(
            self.centroids.len()
                + other.centroids.len()
                + self.buffer.len()
                + other.buffer.len(),
        );
        merged.extend_from_slice(&self.centroids);
        merged.extend_from_slice(&other.centroids);
        merged.extend(self.buffer.drain(..).map(|v| Centroid::new(v, 1.0)));
        merged.extend(other.buffer.iter().map(|&v| Centroid::new(v, 1.0)));
        merged.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        self.centroids = Self::compress(merged, self.delta);
        self.centroid_weight =
            self.centroids.iter().map(|c| c.weight).sum();
    }

    /// Folds buffered values into the centroid list.
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let mut merged: Vec<Centroid> = Vec::with_capacity(
            self.centroids.len() + self.buffer.len(),
        );
        merged.extend_from_slice(&self.centroids);
        merged.extend(self.buffer.drain(..).map(|v| Centroid::new(v, 1.0)));
        merged.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        self.centroids = Self::compress(merged, self.delta);
        self.centroid_weight =
            self.centroids.iter().map(|c| c.weight).sum();
    }

    /// Merges a sorted centroid run down to at most O(delta) centroids.
    fn compress(sorted: Vec<Centroid>, delta: u32) -> Vec<Centroid> {
        if sorted.is_empty() {
            return sorted;
        }
        let total: f64 = sorted.iter().map(|c| c.weight).sum();
        let delta = delta as f64;

        let mut result: Vec<Centroid> = Vec::new();
        let mut iter = sorted.into_iter();
        // `iter` is non-empty per the check above
        let mut current = match iter.next() {
            Some(c) => c,
            None => return result,
        };
        let mut weight_so_far = 0.0;
        let mut k_limit = 1.0;
        let mut q_limit_times_count = k_to_q(k_limit, delta) * total;

        for next in iter {
            if weight_so_far + current.weight + next.weight
                <= q_limit_times_count
            {
                current.add(next.mean, next.weight);
            } else {
                weight_so_far += current.weight;
                k_limit += 1.0;
                q_limit_times_count = k_to_q(k_limit, delta) * total;
                result.push(current);
                current = next;
            }
        }
        result.push(current);
        result
    }

    /// Estimates the `q`-quantile, `q` in `[0, 1]`. The sketch must not
    /// be empty.
    pub fn quantile(&mut self, q: f64) -> f64 {
        self.flush();
        let centroids = &self.centroids;
        match centroids.len() {
            0 => 0.0,
            1 => centroids[0].mean,
            _ => {
                let total = self.centroid_weight;
                let rank = q.clamp(0.0, 1.0) * total;

                // Treat each centroid as located at the midpoint of the
                // weight it covers and interpolate between neighbors;
                // clamp the extremes to the observed min/max.
                let mut cumulative = 0.0;
                let mut prev_center = 0.0;
                let mut prev_mean = self.min;
                for centroid in centroids {
                    let center = cumulative + centroid.weight / 2.0;
                    if rank <= center {
                        let span = center - prev_center;
                        let t = if span > 0.0 {
                            (rank - prev_center) / span
                        } else {
                            0.0
                        };
                        return prev_mean + t * (centroid.mean - prev_mean);
                    }
                    cumulative += centroid.weight;
                    prev_center = center;
                    prev_mean = centroid.mean;
                }
                // beyond the last centroid's midpoint
                let span = total - prev_center;
                let t = if span > 0.0 {
                    (rank - prev_center) / span
                } else {
                    1.0
                };
                (prev_mean + t * (self.max - prev_mean)).min(self.max)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sketch() {
        let digest = TDigest::new(100, 500);
        assert!(digest.is_empty());
        assert_eq!(digest.count(), 0.0);
    }

    #[test]
    fn nan_values_are_ignored() {
        let mut digest = TDigest::new(100, 500);
        digest.nan_add(f64::NAN);
        assert!(digest.is_empty());
        digest.nan_add(1.0);
        assert_eq!(digest.count(), 1.0);
    }

    #[test]
    fn small_sketch_median_is_exact() {
        let mut digest = TDigest::new(100, 500);
        for v in [3.0, 1.0, 2.0] {
            digest.nan_add(v);
        }
        assert_eq!(digest.quantile(0.5), 2.0);
        assert_eq!(digest.quantile(0.0), 1.0);
        assert_eq!(digest.quantile(1.0), 3.0);
    }

    #[test]
    fn uniform_quantiles_are_close() {
        let mut digest = TDigest::new(100, 500);
        // 1..=10_000 in a scrambled order
        for i in 0..10_000_u64 {
            digest.nan_add(((i * 7919) % 10_000) as f64 + 1.0);
        }
        for (q, expected) in
            [(0.01, 100.0), (0.25, 2500.0), (0.5, 5000.0), (0.99, 9900.0)]
        {
            let estimate = digest.quantile(q);
            let err = (estimate - expected).abs() / 10_000.0;
            assert!(
                err < 0.01,
                "q={q}: estimate {estimate}, expected about {expected}"
            );
        }
    }

    #[test]
    fn compresses_to_bounded_centroids() {
        let mut digest = TDigest::new(100, 200);
        for i in 0..50_000_u64 {
            digest.nan_add((i % 1000) as f64);
        }
        digest.flush();
        assert!(digest.centroids.len() < 300, "{}", digest.centroids.len());
        assert_eq!(digest.count(), 50_000.0);
    }

    #[test]
    fn merge_concatenates_sketches() {
        let mut left = TDigest::new(100, 500);
        let mut right = TDigest::new(100, 500);
        for i in 0..1000 {
            left.nan_add(i as f64);
            right.nan_add((i + 1000) as f64);
        }
        left.merge(&right);
        assert_eq!(left.count(), 2000.0);
        let median = left.quantile(0.5);
        assert!((median - 1000.0).abs() < 20.0, "median {median}");
    }
}
