//! Alert message formatting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use stockwatch_core::Ticker;

/// Render a price with at least two decimal places.
pub fn format_price(price: Decimal) -> String {
    let price = price.normalize();
    if price.scale() < 2 {
        format!("{:.2}", price)
    } else {
        price.to_string()
    }
}

/// Plain-text message sent when a ticker reaches its target.
pub fn format_alert_message(
    ticker: &Ticker,
    price: Decimal,
    target_price: Decimal,
    at: DateTime<Utc>,
) -> String {
    format!(
        "📢 {} reached target {}! Current price: {}\n\n⏰ {}",
        ticker,
        format_price(target_price),
        format_price(price),
        at.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    #[test]
    fn test_format_price() {
        assert_eq!(format_price(dec!(150)), "150.00");
        assert_eq!(format_price(dec!(150.5)), "150.50");
        assert_eq!(format_price(dec!(0.1235)), "0.1235");
        assert_eq!(format_price(dec!(151.000)), "151.00");
    }

    #[test]
    fn test_format_alert_message() {
        let ticker = Ticker::parse("AAPL").unwrap();
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap();
        let message = format_alert_message(&ticker, dec!(150), dec!(150), at);
        assert_eq!(
            message,
            "📢 AAPL reached target 150.00! Current price: 150.00\n\n⏰ 2024-03-01 14:30:00 UTC"
        );
    }
}
