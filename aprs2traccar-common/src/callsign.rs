//! Callsign helpers shared by the parser, the watchlist and the dispatcher.

/// Longest base callsign accepted on APRS-IS (e.g. 9-char OGN/ICAO ids)
const MAX_BASE_LEN: usize = 9;
/// Longest SSID suffix after the `-`
const MAX_SSID_LEN: usize = 2;

/// Callsign without its `-SSID` suffix.
pub fn base(callsign: &str) -> &str {
    callsign
        .split_once('-')
        .map(|(base, _)| base)
        .unwrap_or(callsign)
}

/// Canonical form used for watchlist keys and lookups.
///
/// Trims, uppercases and drops a `-0` SSID, which APRS treats as identical
/// to no SSID at all.
pub fn normalize(callsign: &str) -> String {
    let upper = callsign.trim().to_ascii_uppercase();
    match upper.strip_suffix("-0") {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

/// Whether `callsign` is a syntactically valid APRS-IS station identifier:
/// 1-9 alphanumerics, optionally followed by `-` and a 1-2 char SSID.
pub fn is_valid(callsign: &str) -> bool {
    let (base, ssid) = match callsign.split_once('-') {
        Some((base, ssid)) => (base, Some(ssid)),
        None => (callsign, None),
    };

    let base_ok = !base.is_empty()
        && base.len() <= MAX_BASE_LEN
        && base.chars().all(|c| c.is_ascii_alphanumeric());

    let ssid_ok = match ssid {
        Some(ssid) => {
            !ssid.is_empty()
                && ssid.len() <= MAX_SSID_LEN
                && ssid.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => true,
    };

    base_ok && ssid_ok
}

/// Looser check for packet source fields: 1-9 chars of `[A-Za-z0-9-]`.
///
/// Feed stations use SSIDs like `-WX1` or `-ABC` that a login would reject.
pub fn is_valid_source(source: &str) -> bool {
    !source.is_empty()
        && source.len() <= MAX_BASE_LEN
        && source.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
