use crate::domain::ports::CurrencyFormatter;
use rust_decimal::{Decimal, RoundingStrategy};

/// Currencies displayed without minor units.
const ZERO_DECIMAL: &[&str] = &["TZS", "KES", "UGX", "RWF", "JPY"];

/// Locales whose digit groups are separated by `.` and decimals by `,`.
const COMMA_DECIMAL_LOCALES: &[&str] = &["de", "fr", "es", "it", "pt", "nl", "id"];

/// `TZS 1,234,567` style formatting with locale-aware separators.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupedCurrencyFormatter;

impl GroupedCurrencyFormatter {
    pub fn fraction_digits(currency: &str) -> u32 {
        if ZERO_DECIMAL
            .iter()
            .any(|code| code.eq_ignore_ascii_case(currency))
        {
            0
        } else {
            2
        }
    }
}

impl CurrencyFormatter for GroupedCurrencyFormatter {
    fn format(&self, amount: Decimal, currency: &str, locale: &str) -> String {
        let digits = Self::fraction_digits(currency);
        let rounded = amount.round_dp_with_strategy(digits, RoundingStrategy::MidpointAwayFromZero);
        let (group_sep, decimal_sep) = separators(locale);

        let plain = format!("{:.*}", digits as usize, rounded.abs());
        let (whole, fraction) = plain.split_once('.').unwrap_or((plain.as_str(), ""));

        let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
        for (i, ch) in whole.chars().enumerate() {
            if i > 0 && (whole.len() - i) % 3 == 0 {
                grouped.push(group_sep);
            }
            grouped.push(ch);
        }
        if !fraction.is_empty() {
            grouped.push(decimal_sep);
            grouped.push_str(fraction);
        }

        let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
            "-"
        } else {
            ""
        };
        format!("{} {sign}{grouped}", currency.to_ascii_uppercase())
    }
}

fn separators(locale: &str) -> (char, char) {
    let language = locale
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if COMMA_DECIMAL_LOCALES.contains(&language.as_str()) {
        ('.', ',')
    } else {
        (',', '.')
    }
}
