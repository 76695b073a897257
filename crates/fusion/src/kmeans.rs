//! Masked k-means clustering with k-means++ seeding, used to derive land
//! classes from a tasseled cap image. Channels are the feature dimensions.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use raster::{DenseImage, Mask, mask};

const MAX_ITERATIONS: usize = 100;
const CENTER_MOVEMENT_TOLERANCE: f64 = 1.0;
const ATTEMPTS: usize = 3;

/// Clusters the valid pixels of `img` into `k` classes.
///
/// Returns a single-channel label image with classes 0..k and -1 at invalid
/// locations. The seed makes the clustering reproducible.
pub fn cluster(img: &DenseImage<f32>, valid_mask: &Mask, k: u32, seed: u64) -> DenseImage<i32> {
    let width = img.width();
    let height = img.height();
    let dims = img.channels();

    let mut positions = Vec::new();
    let mut features: Vec<f64> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            if mask::allows(valid_mask, x, y, 0) {
                positions.push((x, y));
                for c in 0..dims {
                    features.push(img.at(x, y, c) as f64);
                }
            }
        }
    }

    let mut labels = DenseImage::filled_with(-1i32, width, height, 1).expect("label image geometry");
    let n = positions.len();
    if n == 0 {
        return labels;
    }
    let k = (k.max(1) as usize).min(n);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best_assignment: Vec<usize> = Vec::new();
    let mut best_inertia = f64::INFINITY;
    for attempt in 0..ATTEMPTS {
        let (assignment, inertia) = run_attempt(&features, n, dims, k, &mut rng);
        if inertia < best_inertia {
            best_inertia = inertia;
            best_assignment = assignment;
        }
        debug!("kmeans: attempt {attempt} with k={k} reached inertia {inertia:.3}");
    }

    for (&(x, y), &label) in positions.iter().zip(best_assignment.iter()) {
        labels.set(x, y, 0, label as i32);
    }
    labels
}

fn run_attempt(features: &[f64], n: usize, dims: usize, k: usize, rng: &mut StdRng) -> (Vec<usize>, f64) {
    let mut centers = plus_plus_init(features, n, dims, k, rng);
    let mut assignment = vec![0usize; n];

    for _ in 0..MAX_ITERATIONS {
        for (i, slot) in assignment.iter_mut().enumerate() {
            *slot = nearest_center(&features[i * dims..(i + 1) * dims], &centers, dims).0;
        }

        let mut sums = vec![0.0f64; k * dims];
        let mut counts = vec![0usize; k];
        for (i, &a) in assignment.iter().enumerate() {
            counts[a] += 1;
            for d in 0..dims {
                sums[a * dims + d] += features[i * dims + d];
            }
        }

        let mut movement: f64 = 0.0;
        for c in 0..k {
            if counts[c] == 0 {
                continue;
            }
            let mut distance = 0.0;
            for d in 0..dims {
                let updated = sums[c * dims + d] / counts[c] as f64;
                let delta = updated - centers[c * dims + d];
                distance += delta * delta;
                centers[c * dims + d] = updated;
            }
            movement = movement.max(distance.sqrt());
        }
        if movement < CENTER_MOVEMENT_TOLERANCE {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, slot) in assignment.iter_mut().enumerate() {
        let (nearest, distance) = nearest_center(&features[i * dims..(i + 1) * dims], &centers, dims);
        *slot = nearest;
        inertia += distance;
    }
    (assignment, inertia)
}

/// k-means++ seeding: subsequent centers are drawn with probability
/// proportional to the squared distance to the nearest chosen center.
fn plus_plus_init(features: &[f64], n: usize, dims: usize, k: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut centers = Vec::with_capacity(k * dims);
    let first = rng.gen_range(0..n);
    centers.extend_from_slice(&features[first * dims..(first + 1) * dims]);

    let mut distances = vec![0.0f64; n];
    while centers.len() < k * dims {
        let mut total = 0.0;
        for i in 0..n {
            let (_, d) = nearest_center(&features[i * dims..(i + 1) * dims], &centers, dims);
            distances[i] = d;
            total += d;
        }

        let chosen = if total > 0.0 {
            let mut target = rng.gen_range(0.0..total);
            let mut pick = n - 1;
            for (i, &d) in distances.iter().enumerate() {
                if target < d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        } else {
            // all remaining points coincide with a center
            rng.gen_range(0..n)
        };
        centers.extend_from_slice(&features[chosen * dims..(chosen + 1) * dims]);
    }
    centers
}

fn nearest_center(point: &[f64], centers: &[f64], dims: usize) -> (usize, f64) {
    let mut best = (0usize, f64::INFINITY);
    for (c, center) in centers.chunks_exact(dims).enumerate() {
        let mut distance = 0.0;
        for d in 0..dims {
            let delta = point[d] - center[d];
            distance += delta * delta;
        }
        if distance < best.1 {
            best = (c, distance);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blob_image() -> DenseImage<f32> {
        // left half near 0, right half near 100
        let mut img = DenseImage::zeros(6, 4, 2).unwrap();
        for y in 0..4 {
            for x in 0..6 {
                let base = if x < 3 { 0.0 } else { 100.0 };
                img.set(x, y, 0, base + (x + y) as f32 * 0.1);
                img.set(x, y, 1, base - (x * y) as f32 * 0.1);
            }
        }
        img
    }

    #[test]
    fn separates_two_blobs() {
        let img = two_blob_image();
        let labels = cluster(&img, &Mask::none(), 2, 7);

        let left = labels.at(0, 0, 0);
        let right = labels.at(5, 3, 0);
        assert_ne!(left, right);
        for y in 0..4 {
            for x in 0..6 {
                let expected = if x < 3 { left } else { right };
                assert_eq!(labels.at(x, y, 0), expected);
            }
        }
    }

    #[test]
    fn invalid_pixels_are_labelled_negative() {
        let img = two_blob_image();
        let mut valid = Mask::all_valid(6, 4);
        valid.set(2, 2, 0, 0);
        let labels = cluster(&img, &valid, 2, 7);
        assert_eq!(labels.at(2, 2, 0), -1);
        assert!(labels.at(0, 0, 0) >= 0);
    }

    #[test]
    fn seeding_is_reproducible() {
        let img = two_blob_image();
        let a = cluster(&img, &Mask::none(), 3, 42);
        let b = cluster(&img, &Mask::none(), 3, 42);
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn more_classes_than_pixels() {
        let img = DenseImage::<f32>::from_vec(2, 1, 1, vec![1.0, 2.0]).unwrap();
        let labels = cluster(&img, &Mask::none(), 10, 0);
        assert!(labels.as_slice().iter().all(|&l| (0..2).contains(&l)));
    }
}
