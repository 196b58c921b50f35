//! Distribution sampling natives: `normal` and `gamma`.
//!
//! Both draw from the evaluator's ChaCha stream, which is seeded from OS
//! entropy by default and from an explicit seed in deterministic runs.

use rand::distributions::{Distribution, Standard};
use rand_chacha::ChaCha12Rng;

use crate::{
    args::ArgValues,
    errors::{RunError, RunResult},
    evaluate::Evaluator,
    value::Value,
};

/// Uniform draw in `[0, 1)`.
fn uniform(rng: &mut ChaCha12Rng) -> f64 {
    Standard.sample(rng)
}

/// Standard normal draw via the Box–Muller transform.
fn standard_normal(rng: &mut ChaCha12Rng) -> f64 {
    // 1 - u keeps the logarithm away from ln(0).
    let u1: f64 = 1.0 - uniform(rng);
    let u2: f64 = uniform(rng);
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// `normal(mu, sigma)` — one draw from N(mu, sigma²).
pub(crate) fn native_normal(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (mu, sigma) = args.get_two("normal")?;
    let mu = expect_number(ev, mu, "normal")?;
    let sigma = expect_number(ev, sigma, "normal")?;
    if sigma < 0.0 {
        return Err(RunError::native("normal() standard deviation must be non-negative"));
    }
    let draw = mu + sigma * standard_normal(&mut ev.rng);
    Ok(ev.alloc_double(draw))
}

/// `gamma(shape, scale)` — one draw via Marsaglia–Tsang squeeze, with the
/// usual boost for shape < 1.
pub(crate) fn native_gamma(ev: &mut Evaluator<'_>, args: ArgValues) -> RunResult<Value> {
    let (shape, scale) = args.get_two("gamma")?;
    let shape = expect_number(ev, shape, "gamma")?;
    let scale = expect_number(ev, scale, "gamma")?;
    if shape <= 0.0 || scale <= 0.0 {
        return Err(RunError::native("gamma() shape and scale must be positive"));
    }
    let draw = sample_gamma(&mut ev.rng, shape) * scale;
    Ok(ev.alloc_double(draw))
}

fn sample_gamma(rng: &mut ChaCha12Rng, shape: f64) -> f64 {
    if shape < 1.0 {
        // Boost: Gamma(a) = Gamma(a + 1) * U^(1/a).
        let u = 1.0 - uniform(rng);
        return sample_gamma(rng, shape + 1.0) * u.powf(1.0 / shape);
    }
    let d = shape - 1.0 / 3.0;
    let c = 1.0 / (9.0 * d).sqrt();
    loop {
        let x = standard_normal(rng);
        let v = (1.0 + c * x).powi(3);
        if v <= 0.0 {
            continue;
        }
        let u = 1.0 - uniform(rng);
        if u < 1.0 - 0.0331 * x.powi(4) {
            return d * v;
        }
        if u.ln() < 0.5 * x * x + d * (1.0 - v + v.ln()) {
            return d * v;
        }
    }
}

fn expect_number(ev: &Evaluator<'_>, value: Value, name: &str) -> RunResult<f64> {
    value
        .as_f64(&ev.heap)
        .ok_or_else(|| RunError::native(format!("{name}() expects numeric parameters")))
}
