//! Fee split between burning and the treasury

use crate::common::{Error, Result};

/// Share of fees sent to the treasury unless configured otherwise
pub const DEFAULT_TREASURY_PERCENT: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeePortions {
    pub burnt: u128,
    pub treasury: u128,
}

/// Split a fee: `burnt = fee * (100 - treasury%) / 100`, treasury gets the rest
///
/// The treasury portion is the remainder, so both parts always add up to
/// the fee.
pub fn fee_portions(fee: u128, treasury_percent: u8) -> Result<FeePortions> {
    if treasury_percent > 100 {
        return Err(Error::InvalidInput(format!(
            "Treasury share must be 0..=100, got {}",
            treasury_percent
        )));
    }
    let burn_percent = u128::from(100 - treasury_percent);
    // floor(fee * p / 100) without overflowing
    let burnt = (fee / 100) * burn_percent + (fee % 100) * burn_percent / 100;
    Ok(FeePortions {
        burnt,
        treasury: fee - burnt,
    })
}
