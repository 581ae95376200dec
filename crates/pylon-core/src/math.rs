use primitive_types::U256;

use crate::{PylonError, Result};

/// `floor(a * b / denom)` with a 256-bit intermediate product.
///
/// The product of two `u128` values always fits in 256 bits, so the only failure modes are a zero
/// denominator and a quotient that does not fit back into `u128`.
pub fn mul_div_floor(a: u128, b: u128, denom: u128) -> Result<u128> {
    if denom == 0 {
        return Err(PylonError::InvalidInput("division by zero".into()));
    }
    if a == 0 || b == 0 {
        return Ok(0);
    }
    let num = U256::from(a)
        .checked_mul(U256::from(b))
        .ok_or_else(|| PylonError::BoundedValueExceeded("u256 overflow in mul".into()))?;
    let out = num / U256::from(denom);
    if out > U256::from(u128::MAX) {
        return Err(PylonError::BoundedValueExceeded(
            "u128 overflow in div".into(),
        ));
    }
    Ok(out.low_u128())
}

pub fn add_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b)
        .ok_or_else(|| PylonError::BoundedValueExceeded("u128 overflow in add".into()))
}

pub fn sub_u128(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b)
        .ok_or_else(|| PylonError::InvalidInput("u128 underflow in sub".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn mul_div_floor_truncates() {
        assert_eq!(mul_div_floor(9, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_floor(10, 1, 3).unwrap(), 3);
        assert_eq!(mul_div_floor(10, 2, 3).unwrap(), 6);
        assert_eq!(mul_div_floor(0, 7, 3).unwrap(), 0);
    }

    #[test]
    fn mul_div_floor_handles_wide_products() {
        // u128::MAX * u128::MAX / u128::MAX must not overflow the intermediate.
        assert_eq!(
            mul_div_floor(u128::MAX, u128::MAX, u128::MAX).unwrap(),
            u128::MAX
        );
    }

    #[test]
    fn mul_div_floor_rejects_zero_denominator_and_overflow() {
        assert!(matches!(
            mul_div_floor(1, 1, 0),
            Err(PylonError::InvalidInput(_))
        ));
        assert!(matches!(
            mul_div_floor(u128::MAX, 2, 1),
            Err(PylonError::BoundedValueExceeded(_))
        ));
    }

    proptest! {
        #[test]
        fn mul_div_floor_matches_narrow_arithmetic(
            a in 0u128..(1u128 << 60),
            b in 0u128..(1u128 << 60),
            d in 1u128..(1u128 << 60),
        ) {
            prop_assert_eq!(mul_div_floor(a, b, d).unwrap(), a * b / d);
        }

        #[test]
        fn mul_div_floor_never_exceeds_a_when_b_le_denom(
            a in any::<u128>(),
            d in 1u128..u128::MAX,
            b_frac in 0u128..=1_000u128,
        ) {
            let b = mul_div_floor(d, b_frac, 1_000).unwrap();
            prop_assert!(mul_div_floor(a, b, d).unwrap() <= a);
        }
    }
}
