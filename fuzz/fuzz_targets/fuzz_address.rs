#![no_main]

use libfuzzer_sys::fuzz_target;
use tokenvault::units::parse_address;

fuzz_target!(|data: &str| {
    // Should never panic
    if let Ok(address) = parse_address(data) {
        // Accepted input re-parses from its checksummed form
        assert_eq!(parse_address(&address.to_checksum(None)).unwrap(), address);
    }
});
