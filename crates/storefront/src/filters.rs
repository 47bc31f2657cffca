//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

use rust_decimal::Decimal;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Returns the content hash for main.css.
///
/// The hash is computed at build time from the CSS file content.
///
/// Usage in templates: `{{ ""|css_hash }}`
#[askama::filter_fn]
pub fn css_hash(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<&'static str> {
    Ok(env!("CSS_HASH"))
}

/// Formats a decimal amount as money, e.g. `$19.99`.
///
/// Usage in templates: `{{ cart.total()|money }}`
#[askama::filter_fn]
pub fn money(value: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    Ok(format_amount(&value.to_string()))
}

fn format_amount(raw: &str) -> String {
    raw.parse::<Decimal>()
        .map_or_else(|_| raw.to_owned(), corner_shop_core::format_money)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("12.5"), "$12.50");
        assert_eq!(format_amount("0"), "$0.00");
        assert_eq!(format_amount("3.335"), "$3.34");
        assert_eq!(format_amount("n/a"), "n/a");
    }
}
