//! APRS-IS login passcode.

use crate::callsign;

const PASSCODE_SEED: u16 = 0x73e2;

/// Compute the APRS-IS passcode for `callsign`.
///
/// The SSID is ignored and the hash is case-insensitive, so `N0CALL`,
/// `n0call` and `N0CALL-9` share one passcode. The result is always in
/// `0..=32767`.
pub fn passcode(callsign: &str) -> i16 {
    let base = callsign::base(callsign.trim()).to_ascii_uppercase();
    let bytes = base.as_bytes();

    let mut hash = PASSCODE_SEED;
    for pair in bytes.chunks(2) {
        hash ^= u16::from(pair[0]) << 8;
        if let Some(&low) = pair.get(1) {
            hash ^= u16::from(low);
        }
    }

    (hash & 0x7fff) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_passcodes() {
        assert_eq!(passcode("N0CALL"), 13023);
        assert_eq!(passcode("W1AW"), 25988);
    }

    #[test]
    fn test_case_and_ssid_insensitive() {
        let expected = passcode("N0CALL");
        assert_eq!(passcode("n0call"), expected);
        assert_eq!(passcode("N0CALL-9"), expected);
        assert_eq!(passcode(" n0call-15 "), expected);
    }

    #[test]
    fn test_always_non_negative() {
        for call in ["A", "ZZ9ZZZ", "ICA3D17F2", "DL4MEA-10", "0"] {
            assert!(passcode(call) >= 0, "{call}");
        }
    }
}
