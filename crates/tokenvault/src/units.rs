//! Conversions between human input and on-chain values.

use std::str::FromStr;

use alloy::primitives::{Address, U256};
use tokenvault_error::{Result, TokenVaultError};

/// Largest scale whose unit (`10^decimals`) fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

/// Decimals of every EVM native currency.
pub const NATIVE_DECIMALS: u8 = 18;

fn ten_pow(exp: u8) -> Option<U256> {
    U256::from(10u8).checked_pow(U256::from(exp))
}

fn invalid(amount: &str, reason: &str) -> TokenVaultError {
    TokenVaultError::InvalidAmount(format!("'{amount}': {reason}"))
}

/// Parses a plain decimal string (`"12"`, `"0.5"`, `".5"`, `"1."`) into
/// raw units at `decimals`.
///
/// Signs, exponents, separators and whitespace are rejected, as are more
/// fraction digits than the token supports.
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256> {
    if decimals > MAX_DECIMALS {
        return Err(invalid(amount, "token decimals out of range"));
    }
    let (int, frac) = match amount.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (amount, ""),
    };
    if int.is_empty() && frac.is_empty() {
        return Err(invalid(amount, "no digits"));
    }
    if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid(amount, "not a plain decimal number"));
    }
    if frac.len() > decimals as usize {
        return Err(invalid(amount, &format!("more than {decimals} decimal places")));
    }

    let overflow = || invalid(amount, "amount too large");
    let unit = ten_pow(decimals).ok_or_else(overflow)?;
    let whole = if int.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(int, 10).map_err(|_| overflow())?
    };

    let mut fraction = U256::ZERO;
    if !frac.is_empty() {
        // `frac.len() <= decimals`, so the padded fraction is below `unit`
        let padded = format!("{frac:0<width$}", width = decimals as usize);
        fraction = U256::from_str_radix(&padded, 10).map_err(|_| overflow())?;
    }

    whole.checked_mul(unit).and_then(|w| w.checked_add(fraction)).ok_or_else(overflow)
}

/// Exact decimal rendering of `raw` at `decimals`, trailing fraction
/// zeros trimmed.
pub fn format_units(raw: U256, decimals: u8) -> String {
    let digits = raw.to_string();
    if decimals == 0 {
        return digits;
    }
    let width = decimals as usize + 1;
    let padded = format!("{digits:0>width$}");
    let (int, frac) = padded.split_at(padded.len() - decimals as usize);
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        int.to_string()
    } else {
        format!("{int}.{frac}")
    }
}

/// Splits `raw` into whole units and a fraction rounded half-up to
/// `digits` places. A rounding carry is folded into the whole part.
fn round_split(raw: U256, decimals: u8, digits: u8) -> (U256, U256) {
    let Some(unit) = ten_pow(decimals) else {
        return (U256::ZERO, U256::ZERO);
    };
    let mut whole = raw / unit;
    let rem = raw % unit;

    let mut frac = if decimals >= digits {
        let divisor = ten_pow(decimals - digits).unwrap_or(U256::MAX);
        (rem + divisor / U256::from(2u8)) / divisor
    } else {
        rem * ten_pow(digits - decimals).unwrap_or(U256::ZERO)
    };

    let scale = ten_pow(digits).unwrap_or(U256::MAX);
    if frac >= scale {
        whole = whole.saturating_add(U256::from(1u8));
        frac -= scale;
    }
    (whole, frac)
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Display string for a balance.
///
/// | value | rendering |
/// |---|---|
/// | 0 | `0.00` |
/// | below 0.0001 | `< 0.0001` |
/// | below 1 | four fraction digits |
/// | otherwise | `en-US` grouping, four to six fraction digits |
///
/// Rounding is half-up.
pub fn display_amount(raw: U256, decimals: u8) -> String {
    if raw.is_zero() {
        return "0.00".to_string();
    }
    let below_min = match decimals.checked_sub(4) {
        Some(exp) => ten_pow(exp).map_or(true, |threshold| raw < threshold),
        None => false,
    };
    if below_min {
        return "< 0.0001".to_string();
    }

    let below_one = ten_pow(decimals).map_or(true, |unit| raw < unit);
    if below_one {
        let (whole, frac) = round_split(raw, decimals, 4);
        return format!("{whole}.{:0>4}", frac.to_string());
    }

    let (whole, frac) = round_split(raw, decimals, 6);
    let frac = format!("{:0>6}", frac.to_string());
    let trimmed = frac.trim_end_matches('0');
    let frac = if trimmed.len() < 4 { &frac[..4] } else { trimmed };
    format!("{}.{frac}", group_thousands(&whole.to_string()))
}

/// Parses a `0x`-prefixed 20-byte hex address. Mixed-case input must
/// carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address> {
    let trimmed = input.trim();
    if !trimmed.starts_with("0x") {
        return Err(TokenVaultError::InvalidAddress {
            address: input.to_string(),
            reason: "missing 0x prefix".into(),
        });
    }
    let digits = &trimmed[2..];
    let mixed = digits.chars().any(|c| c.is_ascii_lowercase()) && digits.chars().any(|c| c.is_ascii_uppercase());
    let parsed = if mixed {
        Address::parse_checksummed(trimmed, None).map_err(|e| e.to_string())
    } else {
        Address::from_str(trimmed).map_err(|e| e.to_string())
    };
    parsed.map_err(|reason| TokenVaultError::InvalidAddress { address: input.to_string(), reason })
}
