/// Parses text the way spreadsheet front-ends coerce cell strings to numbers.
///
/// Surrounding whitespace is ignored, an all-whitespace string is zero, `0x`/`0o`/`0b`
/// literals and signed `Infinity` are accepted. Anything else that is not a plain
/// decimal literal yields `None`.
pub fn parse_js_number(input: &str) -> Option<f64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }

    for (prefix, radix) in [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)] {
        if let Some(digits) = trimmed.strip_prefix(prefix) {
            if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                return None;
            }
            return u64::from_str_radix(digits, radix).ok().map(|v| v as f64);
        }
    }

    let (sign, unsigned) = match trimmed.as_bytes()[0] {
        b'-' => (-1.0, &trimmed[1..]),
        b'+' => (1.0, &trimmed[1..]),
        _ => (1.0, trimmed),
    };
    if unsigned == "Infinity" {
        return Some(sign * f64::INFINITY);
    }

    // Rust also accepts "inf", "nan" and friends.
    if unsigned
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-')))
    {
        return None;
    }

    trimmed.parse::<f64>().ok()
}

/// Rounds half away from zero to `places` decimals.
pub fn round_to(value: f64, places: usize) -> f64 {
    let factor = 10f64.powi(places as i32);
    (value * factor).round() / factor
}

/// `100 * part / total`, or `None` when there is nothing to divide by.
pub fn percentage(part: usize, total: usize) -> Option<f64> {
    if total == 0 {
        None
    } else {
        Some(part as f64 / total as f64 * 100.0)
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_padded_numbers() {
        assert_eq!(parse_js_number("3"), Some(3.0));
        assert_eq!(parse_js_number("  4 "), Some(4.0));
        assert_eq!(parse_js_number("2.5"), Some(2.5));
        assert_eq!(parse_js_number("-7"), Some(-7.0));
        assert_eq!(parse_js_number("1e1"), Some(10.0));
        assert_eq!(parse_js_number(".5"), Some(0.5));
    }

    #[test]
    fn blank_text_is_zero() {
        assert_eq!(parse_js_number(""), Some(0.0));
        assert_eq!(parse_js_number("   "), Some(0.0));
    }

    #[test]
    fn radix_literals_and_infinity() {
        assert_eq!(parse_js_number("0x0A"), Some(10.0));
        assert_eq!(parse_js_number("0b101"), Some(5.0));
        assert_eq!(parse_js_number("0x"), None);
        assert_eq!(parse_js_number("0x+5"), None);
        assert_eq!(parse_js_number("-Infinity"), Some(f64::NEG_INFINITY));
    }

    #[test]
    fn rejects_words() {
        assert_eq!(parse_js_number("five"), None);
        assert_eq!(parse_js_number("inf"), None);
        assert_eq!(parse_js_number("NaN"), None);
        assert_eq!(parse_js_number("3 stars"), None);
        assert_eq!(parse_js_number("1e"), None);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(6.25, 1), 6.3);
        assert_eq!(round_to(16.666666, 2), 16.67);
        assert_eq!(round_to(-0.125, 2), -0.13);
    }

    #[test]
    fn percentage_guards_empty_totals() {
        assert_eq!(percentage(3, 0), None);
        assert_eq!(percentage(3, 5), Some(60.0));
    }
}
