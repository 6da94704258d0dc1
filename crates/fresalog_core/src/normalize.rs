//! Barcode and price normalization.
//!
//! Spreadsheet numeric cells mangle scanned codes: `12345` becomes
//! `12345,00` or even `1.2345E+4` depending on the cell format. The same
//! normalization runs at catalog-build time and at lookup time so the two
//! sides always agree.

/// Normalize a scanned or stored barcode.
///
/// Uppercases, trims, strips a trailing all-zero decimal tail (`,00` /
/// `.0`), and expands scientific-notation renderings back to digit strings.
pub fn normalize_barcode(raw: &str) -> String {
    let mut code = raw.trim().to_uppercase();
    if code.is_empty() {
        return code;
    }

    // Trailing ,0 / ,00 / .0 / .00 from numeric cells
    if let Some(pos) = code.rfind([',', '.']) {
        let tail = &code[pos + 1..];
        if pos > 0 && !tail.is_empty() && tail.bytes().all(|b| b == b'0') {
            code.truncate(pos);
        }
    }

    // Scientific notation (e.g. 8.412345E+12) from wide numeric cells
    if code.contains("E+") || code.contains("E-") {
        if let Ok(value) = code.replace(',', ".").parse::<f64>() {
            if value.is_finite() && value >= 0.0 && value < 9.0e18 {
                code = format!("{}", value.trunc() as u64);
            }
        }
    }

    code
}

/// Parse a price cell into a numeric value.
///
/// Store cells carry decorated strings like `"12,50 €"` or `"EUR 8.75"`;
/// the first numeric run wins, with either `,` or `.` accepted as the
/// decimal separator.
pub fn parse_precio(raw: &str) -> Option<f64> {
    let bytes = raw.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;

    let mut end = start;
    let mut seen_sep = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if b.is_ascii_digit() {
            end = i + 1;
        } else if (b == b',' || b == b'.') && !seen_sep {
            seen_sep = true;
        } else {
            break;
        }
    }

    raw[start..end].replace(',', ".").parse::<f64>().ok()
}
