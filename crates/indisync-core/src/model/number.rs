// ── Number value encoding ──
//
// Number members carry their value as a string. Drivers and clients may
// send plain decimals or sexagesimal strings ("12:30:15", "-5 30"), and the
// member's printf-style format decides how a float is rendered back.

/// Parse a number string, accepting decimal and sexagesimal notation.
///
/// Sexagesimal parts may be separated by `:` or whitespace; up to three
/// parts (degrees, minutes, seconds) are accepted, each of which may carry
/// a fractional part. Returns `None` if the string is empty or malformed.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parts: Vec<&str> = trimmed
        .split(|c: char| c == ':' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();

    match parts.as_slice() {
        [single] => single.parse::<f64>().ok().filter(|v| v.is_finite()),
        [first, rest @ ..] if rest.len() <= 2 => {
            let negative = first.starts_with('-');
            let degrees = first.parse::<f64>().ok()?.abs();
            let mut total = degrees;
            let mut scale = 60.0;
            for part in rest {
                let value = part.parse::<f64>().ok()?;
                if value < 0.0 {
                    return None;
                }
                total += value / scale;
                scale *= 60.0;
            }
            Some(if negative { -total } else { total })
        }
        _ => None,
    }
}

/// A parsed printf-style number format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatSpec {
    width: usize,
    precision: Option<usize>,
    conversion: char,
}

fn parse_format(format: &str) -> Option<FormatSpec> {
    let body = format.trim().strip_prefix('%')?;
    let conversion = body.chars().last()?;
    if !matches!(conversion, 'd' | 'i' | 'f' | 'e' | 'E' | 'g' | 'G' | 'm') {
        return None;
    }
    let spec = &body[..body.len() - conversion.len_utf8()];
    let (width, precision) = match spec.split_once('.') {
        Some((w, p)) => (w, Some(p.parse::<usize>().ok()?)),
        None => (spec, None),
    };
    let width = if width.is_empty() {
        0
    } else {
        width.parse::<usize>().ok()?
    };
    Some(FormatSpec {
        width,
        precision,
        conversion,
    })
}

/// Render `value` using an INDI printf-style `format`.
///
/// Supports `%d`, `%i`, `%f`, `%e`, `%g` (and the upper-case `%E`, `%G`)
/// with optional width and precision, and the sexagesimal `%<w>.<f>m` form.
/// Exponents are written C-style (`1.5e+03`). Unknown formats fall back to
/// the shortest round-trip representation.
#[allow(clippy::cast_possible_truncation)]
pub fn format_number(value: f64, format: &str) -> String {
    let Some(spec) = parse_format(format) else {
        return value.to_string();
    };
    let w = spec.width;
    match spec.conversion {
        'd' | 'i' => format!("{:>w$}", value.round() as i64),
        'f' => {
            let p = spec.precision.unwrap_or(6);
            format!("{value:>w$.p$}")
        }
        'e' | 'E' | 'g' | 'G' => {
            let p = spec.precision.unwrap_or(6);
            let rendered = if matches!(spec.conversion, 'g' | 'G') {
                general(value, p.max(1))
            } else {
                scientific(value, p)
            };
            let rendered = if spec.conversion.is_ascii_uppercase() {
                rendered.to_uppercase()
            } else {
                rendered
            };
            format!("{rendered:>w$}")
        }
        'm' => format!("{:>w$}", sexagesimal(value, spec.precision.unwrap_or(6))),
        _ => format!("{:>w$}", value),
    }
}

/// `%.<p>e`: mantissa with `p` decimals, signed two-digit exponent.
fn scientific(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let rendered = format!("{value:.precision$e}");
    let (mantissa, exponent) = rendered.split_once('e').unwrap_or((rendered.as_str(), "0"));
    with_exponent(mantissa, exponent.parse().unwrap_or(0))
}

/// `%.<p>g`: `p` significant digits, fixed or scientific depending on
/// the exponent, trailing zeros removed.
fn general(value: f64, precision: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_owned();
    }
    // Exponent after rounding to `precision` significant digits.
    let rounded = format!("{value:.prec$e}", prec = precision - 1);
    let (mantissa, exponent) = rounded.split_once('e').unwrap_or((rounded.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let limit = i32::try_from(precision).unwrap_or(i32::MAX);

    if exponent < -4 || exponent >= limit {
        with_exponent(trim_fraction(mantissa), exponent)
    } else {
        let decimals = usize::try_from(limit - 1 - exponent).unwrap_or(0);
        trim_fraction(&format!("{value:.decimals$}")).to_owned()
    }
}

fn with_exponent(mantissa: &str, exponent: i32) -> String {
    let sign = if exponent < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
}

fn trim_fraction(digits: &str) -> &str {
    if digits.contains('.') {
        digits.trim_end_matches('0').trim_end_matches('.')
    } else {
        digits
    }
}

/// Sexagesimal rendering; `fraction` selects the resolution the way
/// INDI's `%m` does: 3 → `:mm`, 5 → `:mm.m`, 6 → `:mm:ss`, 8 → `:mm:ss.s`,
/// 9 → `:mm:ss.ss`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn sexagesimal(value: f64, fraction: usize) -> String {
    let sign = if value < 0.0 { "-" } else { "" };
    let abs = value.abs();
    match fraction {
        3 => {
            let total = (abs * 60.0).round() as u64;
            format!("{sign}{}:{:02}", total / 60, total % 60)
        }
        5 => {
            let total = (abs * 600.0).round() as u64;
            let rem = total % 600;
            format!("{sign}{}:{:02}.{}", total / 600, rem / 10, rem % 10)
        }
        8 => {
            let total = (abs * 36_000.0).round() as u64;
            let rem = total % 36_000;
            format!(
                "{sign}{}:{:02}:{:02}.{}",
                total / 36_000,
                rem / 600,
                (rem % 600) / 10,
                rem % 10
            )
        }
        9 => {
            let total = (abs * 360_000.0).round() as u64;
            let rem = total % 360_000;
            format!(
                "{sign}{}:{:02}:{:02}.{:02}",
                total / 360_000,
                rem / 6_000,
                (rem % 6_000) / 100,
                rem % 100
            )
        }
        _ => {
            let total = (abs * 3_600.0).round() as u64;
            let rem = total % 3_600;
            format!("{sign}{}:{:02}:{:02}", total / 3_600, rem / 60, rem % 60)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_decimals() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number(" -3 "), Some(-3.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
    }

    #[test]
    fn parses_sexagesimal() {
        assert_eq!(parse_number("12:30"), Some(12.5));
        assert_eq!(parse_number("-5 30"), Some(-5.5));
        let v = parse_number("1:30:36").unwrap_or_default();
        assert!((v - 1.51).abs() < 1e-9);
        assert_eq!(parse_number("1:2:3:4"), None);
        assert_eq!(parse_number("1:-30"), None);
    }

    #[test]
    fn formats_printf_styles() {
        assert_eq!(format_number(7.6, "%d"), "8");
        assert_eq!(format_number(20.04, "%3.1f"), "20.0");
        assert_eq!(format_number(3.14159, "%.2f"), "3.14");
        assert_eq!(format_number(1.5, "%6.2f"), "  1.50");
        assert_eq!(format_number(2.5, "bogus"), "2.5");
    }

    #[test]
    fn formats_exponent_and_general_styles() {
        assert_eq!(format_number(1500.0, "%.2e"), "1.50e+03");
        assert_eq!(format_number(-0.00042, "%E"), "-4.200000E-04");
        assert_eq!(format_number(20.0, "%g"), "20");
        assert_eq!(format_number(0.0, "%g"), "0");
        assert_eq!(format_number(3.14159, "%.3g"), "3.14");
        assert_eq!(format_number(1_234_567.0, "%g"), "1.23457e+06");
        assert_eq!(format_number(0.000_012_5, "%g"), "1.25e-05");
        assert_eq!(format_number(0.0001, "%g"), "0.0001");
        assert_eq!(format_number(999_999.7, "%g"), "1e+06");
        assert_eq!(format_number(2.5, "%8.2G"), "     2.5");
    }

    #[test]
    fn formats_sexagesimal() {
        assert_eq!(format_number(12.5, "%9.6m"), " 12:30:00");
        assert_eq!(format_number(-5.5, "%.3m"), "-5:30");
        assert_eq!(format_number(1.51, "%.5m"), "1:30.6");
    }
}
