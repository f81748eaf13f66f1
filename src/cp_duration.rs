//! Service-time sampling
//!
//! Stage durations follow an approximately normal distribution built from the
//! central limit theorem: twelve uniform samples on [0, 1) summed and shifted
//! by six give mean 0 and standard deviation 1. The result depends only on the
//! random stream and the numeric inputs, so a fixed seed reproduces a run.

use rand::Rng;

use crate::cp_interface::CpDuration;

/// Number of uniform samples summed per normal sample (12 gives sigma = 1)
const NORMAL_TERMS: u32 = 12;

/// Resolution of each uniform sample
const UNIFORM_STEPS: u32 = 100_000;

/// Timing parameters of a stage, in minutes
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize)]
pub struct StageTimes {
    #[serde(default)]
    pub min: CpDuration,
    #[serde(default)]
    pub mean: CpDuration,
    /// Limit above which a team is rejected (0 = no limit)
    #[serde(default)]
    pub max: CpDuration,
    /// Standard deviation relative to the mean
    #[serde(default = "default_sigma")]
    pub sigma: f64,
}

fn default_sigma() -> f64 {
    0.2
}

impl Default for StageTimes {
    fn default() -> Self {
        Self {
            min: 0,
            mean: 0,
            max: 0,
            sigma: default_sigma(),
        }
    }
}

impl StageTimes {
    pub fn new(min: CpDuration, mean: CpDuration, max: CpDuration, sigma: f64) -> Self {
        Self {
            min,
            mean,
            max,
            sigma,
        }
    }
}

/// Approximately normal random value with the given expectation and a
/// standard deviation of `deviation * expected`
pub fn normal_random<R: Rng + ?Sized>(rng: &mut R, expected: f64, deviation: f64) -> f64 {
    let mut sum = 0.0;
    for _ in 0..NORMAL_TERMS {
        sum += rng.gen_range(0..UNIFORM_STEPS) as f64 / UNIFORM_STEPS as f64;
    }
    sum -= (NORMAL_TERMS / 2) as f64;

    sum * deviation * expected + expected
}

/// Sample a service duration for a team with the given speed factor.
///
/// Clamped below at `times.min` and at zero, rounded to whole minutes. The
/// upper limit is not applied here, see [`apply_limit`].
pub fn sample_duration<R: Rng + ?Sized>(rng: &mut R, times: &StageTimes, speed: f64) -> CpDuration {
    let mut minutes = normal_random(rng, times.mean as f64 * speed, times.sigma);

    if minutes < times.min as f64 {
        minutes = times.min as f64;
    }
    if minutes < 0.0 {
        minutes = 0.0;
    }

    minutes.round() as CpDuration
}

/// Scale a fixed overhead by `multiplier` with the same spread as the stage.
///
/// A zero overhead draws nothing from the random stream.
pub fn scale_overhead<R: Rng + ?Sized>(
    rng: &mut R,
    nominal: CpDuration,
    sigma: f64,
    multiplier: f64,
) -> CpDuration {
    if nominal == 0 {
        return 0;
    }
    let times = StageTimes::new(0, nominal, 0, sigma);
    sample_duration(rng, &times, multiplier)
}

/// Clamp a sampled duration to the stage limit.
///
/// Returns the applied duration and whether the team was rejected. A zero
/// limit never rejects.
pub fn apply_limit(duration: CpDuration, max: CpDuration) -> (CpDuration, bool) {
    if max != 0 && duration > max {
        (max, true)
    } else {
        (duration, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_sigma_gives_exact_mean() {
        let mut rng = StdRng::from_seed([7u8; 32]);
        let times = StageTimes::new(5, 10, 20, 0.0);

        for _ in 0..100 {
            assert_eq!(sample_duration(&mut rng, &times, 1.0), 10);
        }
        assert_eq!(sample_duration(&mut rng, &times, 1.5), 15);
    }

    #[test]
    fn test_min_clamp() {
        let mut rng = StdRng::from_seed([1u8; 32]);
        // speed pulls the expectation below min
        let times = StageTimes::new(8, 10, 0, 0.0);
        assert_eq!(sample_duration(&mut rng, &times, 0.5), 8);
    }

    #[test]
    fn test_negative_samples_clamp_to_zero() {
        let mut rng = StdRng::from_seed([3u8; 32]);
        // stddev 50 around a mean of 10: about 40% of raw samples are negative
        let times = StageTimes::new(0, 10, 0, 5.0);
        let samples: Vec<_> = (0..1000)
            .map(|_| sample_duration(&mut rng, &times, 1.0))
            .collect();

        let zeros = samples.iter().filter(|&&d| d == 0).count();
        assert!(zeros > 100, "only {} samples clamped", zeros);
        assert!(samples.iter().any(|&d| d > 10));
    }

    #[test]
    fn test_normal_approximation_moments() {
        let mut rng = StdRng::from_seed([42u8; 32]);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| normal_random(&mut rng, 100.0, 0.1)).collect();

        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n as f64;

        assert!((mean - 100.0).abs() < 0.5, "mean was {}", mean);
        assert!((var.sqrt() - 10.0).abs() < 0.5, "stddev was {}", var.sqrt());
    }

    #[test]
    fn test_same_seed_same_samples() {
        let times = StageTimes::new(0, 30, 0, 0.3);
        let mut a = StdRng::from_seed([9u8; 32]);
        let mut b = StdRng::from_seed([9u8; 32]);

        let xs: Vec<_> = (0..50).map(|_| sample_duration(&mut a, &times, 1.2)).collect();
        let ys: Vec<_> = (0..50).map(|_| sample_duration(&mut b, &times, 1.2)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_zero_overhead_draws_nothing() {
        let mut a = StdRng::from_seed([5u8; 32]);
        let mut b = StdRng::from_seed([5u8; 32]);

        assert_eq!(scale_overhead(&mut a, 0, 0.2, 3.0), 0);
        assert_eq!(a.gen::<u64>(), b.gen::<u64>());
    }

    #[test]
    fn test_overhead_scaling() {
        let mut rng = StdRng::from_seed([5u8; 32]);
        assert_eq!(scale_overhead(&mut rng, 10, 0.0, 2.0), 20);
        assert_eq!(scale_overhead(&mut rng, 10, 0.0, 0.25), 3);
    }

    #[test]
    fn test_apply_limit() {
        assert_eq!(apply_limit(25, 20), (20, true));
        assert_eq!(apply_limit(20, 20), (20, false));
        assert_eq!(apply_limit(10_000, 0), (10_000, false));
    }
}
