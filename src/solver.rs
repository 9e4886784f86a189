//! Root finding
//!
//! Bracket expansion around a start value followed by Brent's method. The
//! scores solved here are step functions in the parameter, so a bracket
//! endpoint where the score is exactly zero counts as a sign change.
use crate::constants::{BRACKET_STEP, BRENT_MAXITER, BRENT_RTOL, BRENT_XTOL};
use crate::errors::DmlError;
use log::debug;

/// Sign with a zero class, `NaN` for `NaN`.
#[inline]
fn sign(v: f64) -> f64 {
    if v > 0.0 {
        1.0
    } else if v < 0.0 {
        -1.0
    } else if v == 0.0 {
        0.0
    } else {
        f64::NAN
    }
}

#[inline]
fn signs_differ(a: f64, b: f64) -> bool {
    let (sa, sb) = (sign(a), sign(b));
    !sa.is_nan() && !sb.is_nan() && sa != sb
}

/// Grow a bracket around `start` until `f` changes sign at its endpoints.
///
/// The half-width grows in steps of `BRACKET_STEP` times half the length of
/// `bounds` and both ends are clipped to `bounds`. The last attempt spans the
/// whole of `bounds` wherever `start` lies. Returns whether a sign change was
/// found, together with the last bracket tried.
pub fn bracket_guess<F: Fn(f64) -> f64>(f: F, start: f64, bounds: (f64, f64)) -> (bool, (f64, f64)) {
    let (lo, hi) = bounds;
    let max_len = hi - lo;
    let n_steps = (2.0 / BRACKET_STEP).round() as usize;
    let mut guess = bounds;
    for k in 1..=n_steps {
        let delta = k as f64 * BRACKET_STEP;
        let a = (start - delta * max_len / 2.0).max(lo);
        let b = (start + delta * max_len / 2.0).min(hi);
        guess = (a, b);
        if signs_differ(f(a), f(b)) {
            return (true, guess);
        }
    }
    (false, guess)
}

/// Brent's method on `[xa, xb]`.
///
/// `f(xa)` and `f(xb)` must not have the same sign. Converges once the
/// bracket half-width drops below `(xtol + rtol * |x|) / 2`.
pub fn brentq<F: Fn(f64) -> f64>(f: F, xa: f64, xb: f64, xtol: f64, rtol: f64, maxiter: usize) -> Result<f64, DmlError> {
    let mut xpre = xa;
    let mut xcur = xb;
    let mut xblk = 0.0;
    let mut fpre = f(xpre);
    let mut fcur = f(xcur);
    let mut fblk = 0.0;
    let mut spre = 0.0;
    let mut scur = 0.0;

    if fpre == 0.0 {
        return Ok(xpre);
    }
    if fcur == 0.0 {
        return Ok(xcur);
    }
    if !signs_differ(fpre, fcur) {
        return Err(DmlError::RootNotBracketed { lower: xa, upper: xb });
    }

    for _ in 0..maxiter {
        if fpre != 0.0 && fcur != 0.0 && signs_differ(fpre, fcur) {
            xblk = xpre;
            fblk = fpre;
            spre = xcur - xpre;
            scur = spre;
        }
        if fblk.abs() < fcur.abs() {
            xpre = xcur;
            xcur = xblk;
            xblk = xpre;
            fpre = fcur;
            fcur = fblk;
            fblk = fpre;
        }

        let delta = (xtol + rtol * xcur.abs()) / 2.0;
        let sbis = (xblk - xcur) / 2.0;
        if fcur == 0.0 || sbis.abs() < delta {
            return Ok(xcur);
        }

        if spre.abs() > delta && fcur.abs() < fpre.abs() {
            let stry = if xpre == xblk {
                // interpolate
                -fcur * (xcur - xpre) / (fcur - fpre)
            } else {
                // extrapolate
                let dpre = (fpre - fcur) / (xpre - xcur);
                let dblk = (fblk - fcur) / (xblk - xcur);
                -fcur * (fblk * dblk - fpre * dpre) / (dblk * dpre * (fblk - fpre))
            };
            if 2.0 * stry.abs() < spre.abs().min(3.0 * sbis.abs() - delta) {
                spre = scur;
                scur = stry;
            } else {
                // bisect
                spre = sbis;
                scur = sbis;
            }
        } else {
            spre = sbis;
            scur = sbis;
        }

        xpre = xcur;
        fpre = fcur;
        if scur.abs() > delta {
            xcur += scur;
        } else {
            xcur += if sbis > 0.0 { delta } else { -delta };
        }
        fcur = f(xcur);
    }
    Err(DmlError::RootNotConverged(maxiter))
}

/// Find a root of `f` within `bounds`, starting the bracket search at `start`.
pub fn solve_bracketed<F: Fn(f64) -> f64>(f: F, start: f64, bounds: (f64, f64)) -> Result<f64, DmlError> {
    let (found, (a, b)) = bracket_guess(&f, start, bounds);
    if !found {
        return Err(DmlError::RootNotBracketed { lower: a, upper: b });
    }
    debug!("root bracket [{:.6}, {:.6}] from start value {:.6}", a, b, start);
    brentq(&f, a, b, BRENT_XTOL, BRENT_RTOL, BRENT_MAXITER)
}
