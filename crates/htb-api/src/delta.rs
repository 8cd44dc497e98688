use std::time::Duration;

use htb_core::{HtbError, Result};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Parse an API duration such as `"1D 02H 03M"` or `"0H 45M 37S"`
///
/// Units are case-insensitive: `Y` (365 days), `W`, `D`, `H`, `M` (minutes)
/// and `S`. Spaces between components are optional.
pub fn parse_delta(text: &str) -> Result<Duration> {
    let invalid = || HtbError::Api(format!("invalid duration '{text}'"));

    let mut total: u64 = 0;
    let mut digits = String::new();
    let mut components = 0;

    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if c.is_whitespace() {
            if digits.is_empty() {
                continue;
            }
            return Err(invalid());
        }

        let unit = match c.to_ascii_uppercase() {
            'Y' => 365 * DAY,
            'W' => 7 * DAY,
            'D' => DAY,
            'H' => HOUR,
            'M' => MINUTE,
            'S' => 1,
            _ => return Err(invalid()),
        };
        let amount: u64 = digits.parse().map_err(|_| invalid())?;
        total = amount
            .checked_mul(unit)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(invalid)?;
        digits.clear();
        components += 1;
    }

    if components == 0 || !digits.is_empty() {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}
