#![no_main]

use alloy::primitives::U256;
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokenvault::units::{display_amount, format_units, parse_units, MAX_DECIMALS};

#[derive(Debug, Arbitrary)]
struct AmountInput {
    // Use 4 u64s to construct a U256
    raw_parts: [u64; 4],
    decimals: u8,
    text: String,
}

fuzz_target!(|input: AmountInput| {
    let raw = U256::from_limbs(input.raw_parts);

    // Arbitrary user text must never panic
    let parsed = parse_units(&input.text, input.decimals);
    if input.decimals > MAX_DECIMALS {
        assert!(parsed.is_err());
        return;
    }
    if let Ok(value) = parsed {
        // Whatever parses formats back to the same value
        assert_eq!(parse_units(&format_units(value, input.decimals), input.decimals).unwrap(), value);
    }

    // Exact formatting round-trips
    let text = format_units(raw, input.decimals);
    assert_eq!(parse_units(&text, input.decimals).unwrap(), raw, "round-trip failed for {text}");

    // Display never panics and is never empty
    assert!(!display_amount(raw, input.decimals).is_empty());
});
