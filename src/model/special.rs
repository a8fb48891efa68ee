//! Special functions used by the micro-models
//!
//! References:
//! - Lanczos (1964): gamma function approximation (g = 7, n = 9)
//! - Press et al., Numerical Recipes §6.2: incomplete gamma by series and
//!   continued fraction (modified Lentz)
//! - Press et al., Numerical Recipes §6.4: incomplete beta by continued
//!   fraction

use std::f64::consts::{LN_2, PI};

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEF: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

const MAX_ITERATIONS: usize = 500;
/// The beta fraction needs `O(sqrt(max(a, b)))` terms; the cap bounds the
/// cost for huge counts
const BETA_MAX_ITERATIONS: usize = 20_000;
const EPS: f64 = 1e-15;
const TINY: f64 = 1e-300;

/// Natural log of the gamma function for `x > 0`
#[must_use]
pub fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection: Γ(x)Γ(1-x) = π / sin(πx)
        (PI / (PI * x).sin()).abs().ln() - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut acc = LANCZOS_COEF[0];
        let t = x + LANCZOS_G + 0.5;
        for (i, &c) in LANCZOS_COEF.iter().enumerate().skip(1) {
            #[allow(clippy::cast_precision_loss)]
            let i = i as f64;
            acc += c / (x + i);
        }
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + acc.ln()
    }
}

/// Regularized lower incomplete gamma by series (valid for `x < a + 1`)
fn gamma_p_series(a: f64, x: f64) -> f64 {
    let mut ap = a;
    let mut del = 1.0 / a;
    let mut sum = del;
    for _ in 0..MAX_ITERATIONS {
        ap += 1.0;
        del *= x / ap;
        sum += del;
        if del.abs() < sum.abs() * EPS {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma(a)).exp()
}

/// Log of the regularized upper incomplete gamma by continued fraction
/// (valid for `x >= a + 1`)
fn ln_gamma_q_cf(a: f64, x: f64) -> f64 {
    let mut b = x + 1.0 - a;
    let mut c = 1.0 / TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    for i in 1..=MAX_ITERATIONS {
        #[allow(clippy::cast_precision_loss)]
        let an = -(i as f64) * (i as f64 - a);
        b += 2.0;
        d = an.mul_add(d, b);
        if d.abs() < TINY {
            d = TINY;
        }
        c = b + an / c;
        if c.abs() < TINY {
            c = TINY;
        }
        d = 1.0 / d;
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    -x + a * x.ln() - ln_gamma(a) + h.ln()
}

/// Natural log of the regularized upper incomplete gamma `Q(a, x)`
///
/// Stays finite far into the tail where `Q` itself underflows.
#[must_use]
pub fn ln_gamma_q(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        0.0
    } else if x < a + 1.0 {
        (1.0 - gamma_p_series(a, x)).max(TINY).ln()
    } else {
        ln_gamma_q_cf(a, x)
    }
}

/// Continued fraction of the incomplete beta (valid for
/// `x < (a + 1) / (a + b + 2)`)
fn beta_cf(a: f64, b: f64, x: f64) -> f64 {
    let clamp = |v: f64| if v.abs() < TINY { TINY } else { v };
    let (qab, qap, qam) = (a + b, a + 1.0, a - 1.0);
    let mut c = 1.0;
    let mut d = 1.0 / clamp(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=BETA_MAX_ITERATIONS {
        #[allow(clippy::cast_precision_loss)]
        let m = m as f64;
        let m2 = 2.0 * m;

        let aa = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / clamp(aa.mul_add(d, 1.0));
        c = clamp(1.0 + aa / c);
        h *= d * c;

        let aa = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / clamp(aa.mul_add(d, 1.0));
        c = clamp(1.0 + aa / c);
        let del = d * c;
        h *= del;
        if (del - 1.0).abs() < EPS {
            break;
        }
    }
    h
}

/// `ln(1 - e^v)` for `v <= 0`
fn ln_one_minus_exp(v: f64) -> f64 {
    if v > -LN_2 {
        (-v.exp_m1()).ln()
    } else {
        (-v.exp()).ln_1p()
    }
}

/// Natural log of the regularized incomplete beta `I_x(a, b)`
///
/// The direct fraction is used on the side where `I_x` is small, so far
/// tails stay accurate in log space.
#[must_use]
pub fn ln_beta_inc(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if x >= 1.0 {
        return 0.0;
    }
    let ln_front =
        a.mul_add(x.ln(), b * (-x).ln_1p()) + ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b);
    if x < (a + 1.0) / (a + b + 2.0) {
        ln_front + beta_cf(a, b, x).ln() - a.ln()
    } else {
        ln_one_minus_exp((ln_front + beta_cf(b, a, 1.0 - x).ln() - b.ln()).min(0.0))
    }
}

/// Upper tail anomaly of a chi-square statistic: `-ln P(X >= stat)`
#[must_use]
pub fn chi_square_anomaly(dof: usize, stat: f64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let a = dof as f64 / 2.0;
    (-ln_gamma_q(a, stat / 2.0)).max(0.0)
}

/// Standardized distance whose one-dimensional chi-square anomaly equals
/// `threshold`
#[must_use]
pub fn chi_square_radius(threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 0.0;
    }
    let (mut lo, mut hi) = (0.0_f64, 64.0_f64);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if chi_square_anomaly(1, mid * mid) < threshold {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    0.5 * (lo + hi)
}

/// Log-sum-exp of two log-space values
pub(crate) fn ln_add(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    hi + (lo - hi).exp().ln_1p()
}

/// Negative binomial predictive distribution
///
/// `P(X = k) = Γ(k + r) / (Γ(r) k!) · p^r · (1 - p)^k`, `r > 0`, `0 < p <= 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativeBinomial {
    r: f64,
    p: f64,
}

impl NegativeBinomial {
    /// Create the distribution (parameters are clamped into their domain)
    #[must_use]
    pub fn new(r: f64, p: f64) -> Self {
        Self {
            r: r.max(f64::MIN_POSITIVE),
            p: p.clamp(f64::MIN_POSITIVE, 1.0),
        }
    }

    /// Mean `r (1 - p) / p`
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.r * (1.0 - self.p) / self.p
    }

    /// Variance `r (1 - p) / p²`
    #[must_use]
    pub fn variance(&self) -> f64 {
        self.mean() / self.p
    }

    /// Most probable count
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn mode(&self) -> u64 {
        if self.r <= 1.0 {
            0
        } else {
            ((self.r - 1.0) * (1.0 - self.p) / self.p).floor().max(0.0) as u64
        }
    }

    /// Log probability mass at `k`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ln_pmf(&self, k: u64) -> f64 {
        let k = k as f64;
        let tail = if k > 0.0 { k * (1.0 - self.p).ln() } else { 0.0 };
        ln_gamma(k + self.r) - ln_gamma(self.r) - ln_gamma(k + 1.0) + self.r * self.p.ln() + tail
    }

    /// Natural logs of `(P(X <= k), P(X >= k))`
    ///
    /// Both tails come from the regularized incomplete beta, so the cost does
    /// not grow with `k`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ln_tails(&self, k: u64) -> (f64, f64) {
        let k = k as f64;
        // P(X <= k) = I_p(r, k + 1), P(X >= k) = I_{1-p}(k, r)
        let ln_lower = ln_beta_inc(self.r, k + 1.0, self.p);
        let ln_upper = if k > 0.0 {
            ln_beta_inc(k, self.r, 1.0 - self.p)
        } else {
            0.0
        };
        (ln_lower.min(0.0), ln_upper.min(0.0))
    }

    /// `(P(X <= k), P(X >= k))`
    #[must_use]
    pub fn tails(&self, k: u64) -> (f64, f64) {
        let (ln_lower, ln_upper) = self.ln_tails(k);
        (ln_lower.exp(), ln_upper.exp())
    }

    /// Two-sided tail anomaly `-ln min(1, 2 · min(P(X <= k), P(X >= k)))`
    #[must_use]
    pub fn two_sided_anomaly(&self, k: u64) -> f64 {
        let (ln_lower, ln_upper) = self.ln_tails(k);
        let ln_p_value = (LN_2 + ln_lower.min(ln_upper)).min(0.0);
        if ln_p_value.is_finite() {
            -ln_p_value
        } else {
            -TINY.ln()
        }
    }
}
