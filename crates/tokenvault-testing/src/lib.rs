//! # TokenVault Testing Infrastructure
//!
//! Testing utilities for the tokenvault crates:
//! - A scripted, call-recording EIP-1193 provider
//! - Well-known fixture addresses
//! - Edge case amounts and property-based testing strategies
//! - Tracing setup for tests
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tokenvault_testing::*;
//!
//! let mock = Arc::new(MockProvider::with_account(ACCOUNT, SEPOLIA));
//! mock.auto_mine();
//! mock.on_call(USDC, IERC20::decimalsCall::SELECTOR, MockReply::uint(6u8));
//!
//! proptest! {
//!     #[test]
//!     fn test_amount_roundtrip(s in decimal_amount(6)) {
//!         // ...
//!     }
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod mock;

pub use mock::{MockProvider, MockReply, RecordedCall};

use alloy::primitives::{address, Address};
use proptest::prelude::*;

// ============================================================================
// Fixtures
// ============================================================================

/// Sepolia chain id
pub const SEPOLIA: u64 = 11_155_111;

/// The connected test account
pub const ACCOUNT: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");

/// A second account, for account switches and transfer counterparties
pub const OTHER_ACCOUNT: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

/// Transfer recipient
pub const RECIPIENT: Address = address!("cccccccccccccccccccccccccccccccccccccccc");

/// Circle's USDC on Sepolia
pub const USDC: Address = address!("1c7d4b196cb0c7b01d743fbc6116a902379c7238");

// ============================================================================
// Edge Case Amounts
// ============================================================================

/// Amount strings for testing parsing boundaries
pub struct EdgeCaseAmounts;

impl EdgeCaseAmounts {
    /// Strings no token amount may parse from
    pub fn invalid() -> Vec<&'static str> {
        vec![
            "",
            ".",
            "-1",
            "+1",
            "1e18",
            "1.2.3",
            " 1",
            "1 ",
            "abc",
            "0x10",
            "1,000",
            "١",
        ]
    }

    /// Accepted amounts at 6 decimals with their raw values
    pub fn valid_6_decimals() -> Vec<(&'static str, u128)> {
        vec![
            ("0", 0),
            ("0.0", 0),
            ("1", 1_000_000),
            ("1.", 1_000_000),
            (".5", 500_000),
            ("0.000001", 1),
            ("10", 10_000_000),
            ("1234.5", 1_234_500_000),
            ("00012", 12_000_000),
        ]
    }
}

// ============================================================================
// Property-Based Testing Strategies
// ============================================================================

/// Generates token decimals in the commonly used range
pub fn token_decimals() -> impl Strategy<Value = u8> {
    0u8..=18u8
}

/// Generates plain decimal strings with at most `decimals` fraction digits
pub fn decimal_amount(decimals: u8) -> impl Strategy<Value = String> {
    (0u64..=1_000_000_000_000_000u64, prop::collection::vec(0u8..10u8, 0..=decimals as usize)).prop_map(
        |(int, frac)| {
            if frac.is_empty() {
                int.to_string()
            } else {
                let digits: String = frac.iter().map(|d| char::from(b'0' + d)).collect();
                format!("{int}.{digits}")
            }
        },
    )
}

/// Generates arbitrary addresses
pub fn any_address() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::from)
}

// ============================================================================
// Tracing
// ============================================================================

/// Installs a test-writer `tracing` subscriber; honours `RUST_LOG`.
/// Safe to call from every test.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tokenvault=debug"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

// ============================================================================
// Tests
// ============================================================================
