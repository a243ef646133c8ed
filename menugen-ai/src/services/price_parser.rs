//! Menu price text → integer cents
//!
//! Printed menus mix symbols, ISO codes, thousands separators and free text
//! ("Market Price", "ask server"). Anything that does not reduce to a plain
//! non-negative decimal yields `None`; the caller keeps the raw text.

/// Symbols stripped anywhere in the text
const CURRENCY_SYMBOLS: &[char] = &[
    '$', '€', '£', '¥', '₹', '₩', '₽', '₺', '₪', '฿', '₫', '₱', '¢',
];

/// ISO codes stripped from either end (case-insensitive)
const CURRENCY_CODES: &[&str] = &[
    "USD", "EUR", "GBP", "JPY", "CNY", "INR", "CAD", "AUD", "NZD", "CHF", "MXN", "KRW", "SGD",
    "HKD",
];

/// Parse raw price text into cents, rounding half up to the nearest cent
///
/// `"$12.50"` → `Some(1250)`, `"1,200"` → `Some(120000)`,
/// `"€12,50"` → `Some(1250)`, `"Market Price"` → `None`.
pub fn parse_price_cents(raw: &str) -> Option<i64> {
    let text: String = raw
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && !c.is_whitespace())
        .collect();

    let text = normalize_separators(&strip_currency_code(&text));

    parse_decimal_cents(&text)
}

/// Rewrite grouping and decimal marks into plain `digits[.digits]`
///
/// A last comma followed by one or two digits (and no later dot) is a decimal
/// comma, so `"1.234,50"` becomes `"1234.50"`. Any other comma groups
/// thousands and is dropped.
fn normalize_separators(text: &str) -> String {
    let decimal_comma = text.rfind(',').filter(|&idx| {
        let tail = &text[idx + 1..];
        (1..=2).contains(&tail.len()) && tail.bytes().all(|b| b.is_ascii_digit())
    });

    match decimal_comma {
        Some(idx) => {
            let whole: String = text[..idx].chars().filter(|c| *c != '.' && *c != ',').collect();
            format!("{}.{}", whole, &text[idx + 1..])
        }
        None => text.chars().filter(|c| *c != ',').collect(),
    }
}

fn strip_currency_code(text: &str) -> String {
    let upper = text.to_ascii_uppercase();
    for code in CURRENCY_CODES {
        if upper.starts_with(code) {
            return text[code.len()..].to_string();
        }
        if upper.ends_with(code) {
            return text[..text.len() - code.len()].to_string();
        }
    }
    // "US$" leaves a bare "US" once the symbol is gone
    if upper.starts_with("US") {
        return text[2..].to_string();
    }
    text.to_string()
}

/// Plain `digits[.digits]` (or `.digits`) → cents with integer arithmetic
fn parse_decimal_cents(text: &str) -> Option<i64> {
    let (whole, fraction) = match text.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (text, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let whole_value: i64 = if whole.is_empty() {
        0
    } else {
        whole.parse().ok()?
    };

    let digits: Vec<i64> = fraction.bytes().map(|b| i64::from(b - b'0')).collect();
    let tenths = digits.first().copied().unwrap_or(0);
    let hundredths = digits.get(1).copied().unwrap_or(0);
    let round_up = digits.get(2).map(|d| *d >= 5).unwrap_or(false);

    whole_value
        .checked_mul(100)?
        .checked_add(tenths * 10 + hundredths)?
        .checked_add(i64::from(round_up))
}
