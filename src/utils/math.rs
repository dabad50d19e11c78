//! Checked integer helpers.
//!
//! All coefficient arithmetic goes through these so that an overflow
//! surfaces as [`PolyError::Overflow`] instead of wrapping.

use crate::utils::errors::{PolyError, PolyResult};
use num_integer::Integer;

pub fn add(a: i64, b: i64) -> PolyResult<i64> {
    a.checked_add(b)
        .ok_or_else(|| PolyError::Overflow(format!("{} + {}", a, b)))
}

pub fn sub(a: i64, b: i64) -> PolyResult<i64> {
    a.checked_sub(b)
        .ok_or_else(|| PolyError::Overflow(format!("{} - {}", a, b)))
}

pub fn mul(a: i64, b: i64) -> PolyResult<i64> {
    a.checked_mul(b)
        .ok_or_else(|| PolyError::Overflow(format!("{} * {}", a, b)))
}

pub fn neg(a: i64) -> PolyResult<i64> {
    a.checked_neg()
        .ok_or_else(|| PolyError::Overflow(format!("-({})", a)))
}

/// `a * b + c`
pub fn mul_add(a: i64, b: i64, c: i64) -> PolyResult<i64> {
    add(mul(a, b)?, c)
}

/// Floor division for a positive divisor.
pub fn floor_div(a: i64, b: i64) -> PolyResult<i64> {
    if b <= 0 {
        return Err(PolyError::Overflow(format!("floor division by {}", b)));
    }
    Ok(Integer::div_floor(&a, &b))
}

/// Ceiling division for a positive divisor.
pub fn ceil_div(a: i64, b: i64) -> PolyResult<i64> {
    neg(floor_div(neg(a)?, b)?)
}

/// Non-negative remainder for a positive divisor.
pub fn floor_mod(a: i64, b: i64) -> PolyResult<i64> {
    if b <= 0 {
        return Err(PolyError::Overflow(format!("modulo by {}", b)));
    }
    Ok(Integer::mod_floor(&a, &b))
}

/// Greatest common divisor, always non-negative.
///
/// `i64::MIN` has no positive counterpart, so it is rejected.
pub fn gcd(a: i64, b: i64) -> PolyResult<i64> {
    if a == i64::MIN || b == i64::MIN {
        return Err(PolyError::Overflow(format!("gcd({}, {})", a, b)));
    }
    Ok(Integer::gcd(&a, &b))
}

/// Gcd of a slice, 0 for an all-zero slice.
pub fn gcd_all(values: &[i64]) -> PolyResult<i64> {
    values.iter().try_fold(0, |g, &v| gcd(g, v))
}

/// Least common multiple of two positive values.
pub fn lcm(a: i64, b: i64) -> PolyResult<i64> {
    let g = gcd(a, b)?;
    if g == 0 {
        return Ok(0);
    }
    mul(a / g, b).map(i64::abs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_floor_and_ceil() {
        assert_eq!(floor_div(7, 2).unwrap(), 3);
        assert_eq!(floor_div(-7, 2).unwrap(), -4);
        assert_eq!(ceil_div(7, 2).unwrap(), 4);
        assert_eq!(ceil_div(-7, 2).unwrap(), -3);
        assert_eq!(ceil_div(-31, 32).unwrap(), 0);
        assert_eq!(floor_mod(-3, 32).unwrap(), 29);
    }

    #[test]
    fn test_gcd_helpers() {
        assert_eq!(gcd(-12, 18).unwrap(), 6);
        assert_eq!(gcd_all(&[0, 0]).unwrap(), 0);
        assert_eq!(gcd_all(&[4, -6, 8]).unwrap(), 2);
        assert_eq!(lcm(4, 6).unwrap(), 12);
    }

    #[test]
    fn test_overflow_is_reported() {
        assert!(matches!(mul(i64::MAX, 2), Err(PolyError::Overflow(_))));
        assert!(matches!(neg(i64::MIN), Err(PolyError::Overflow(_))));
        assert!(matches!(add(i64::MAX, 1), Err(PolyError::Overflow(_))));
        assert!(matches!(gcd(i64::MIN, 4), Err(PolyError::Overflow(_))));
        assert!(matches!(gcd_all(&[6, i64::MIN]), Err(PolyError::Overflow(_))));
    }
}
