//! Black-Scholes put valuation and the normal-CDF approximation behind it.
//!
//! Pricing here is a ranking signal, not a settlement engine: the model is
//! the plain European put with a flat rate, and degenerate inputs collapse
//! to intrinsic value.

/// Flat risk-free rate used for theoretical pricing.
pub const RISK_FREE_RATE: f64 = 0.05;

/// Volatility used when the feed reports none.
pub const DEFAULT_SIGMA: f64 = 1.0;

const SIGMA_MIN: f64 = 0.05;
const SIGMA_MAX: f64 = 6.0;

/// Standard normal CDF via the Abramowitz-Stegun polynomial (26.2.17),
/// accurate to about 1e-7. Monotonic and antisymmetric about zero.
pub fn normal_cdf(x: f64) -> f64 {
    if x.is_nan() {
        return 0.5;
    }
    if x <= -8.0 {
        return 0.0;
    }
    if x >= 8.0 {
        return 1.0;
    }

    let z = x.abs();
    let t = 1.0 / (1.0 + 0.2316419 * z);
    let poly = t
        * (0.319381530
            + t * (-0.356563782 + t * (1.781477937 + t * (-1.821255978 + t * 1.330274429))));
    let pdf = (-0.5 * z * z).exp() / (2.0 * std::f64::consts::PI).sqrt();
    let upper = 1.0 - pdf * poly;

    if x < 0.0 {
        1.0 - upper
    } else {
        upper
    }
}

/// Intrinsic value of a put: `max(strike - spot, 0)`.
pub fn intrinsic_put(spot: f64, strike: f64) -> f64 {
    (strike - spot).max(0.0)
}

/// Volatility actually fed into the model.
///
/// Missing or non-positive IV defaults to [`DEFAULT_SIGMA`] (conservative:
/// a high vol raises the theoretical price and lowers the ratio). Feeds
/// occasionally report IV as a percentage; anything above 10 is divided by
/// 100 before clamping into `[0.05, 6.0]`.
pub fn effective_sigma(implied_volatility: Option<f64>) -> f64 {
    let mut sigma = match implied_volatility {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => DEFAULT_SIGMA,
    };
    if sigma > 10.0 {
        sigma /= 100.0;
    }
    sigma.clamp(SIGMA_MIN, SIGMA_MAX)
}

/// Black-Scholes European put value.
///
/// `t_years <= 0` or `sigma <= 0` returns intrinsic value, as does a
/// non-positive spot or strike (the log-moneyness term is undefined there).
pub fn theoretical_put(spot: f64, strike: f64, t_years: f64, rate: f64, sigma: f64) -> f64 {
    let intrinsic = intrinsic_put(spot, strike);
    if t_years <= 0.0 || sigma <= 0.0 || spot <= 0.0 || strike <= 0.0 {
        return intrinsic;
    }

    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate + 0.5 * sigma * sigma) * t_years) / (sigma * sqrt_t);
    let d2 = d1 - sigma * sqrt_t;

    strike * (-rate * t_years).exp() * normal_cdf(-d2) - spot * normal_cdf(-d1)
}

/// Theoretical put value from raw feed inputs: applies the sigma policy
/// and the flat risk-free rate.
pub fn put_value(spot: f64, strike: f64, t_years: f64, implied_volatility: Option<f64>) -> f64 {
    theoretical_put(
        spot,
        strike,
        t_years,
        RISK_FREE_RATE,
        effective_sigma(implied_volatility),
    )
}
