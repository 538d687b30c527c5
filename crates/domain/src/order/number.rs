//! Human-readable order numbers.

use chrono::NaiveDate;

/// Formats an order number as `{YY}{MM}{DD}-{sequence}`.
///
/// The sequence is zero-padded to four digits and grows beyond that when a
/// day has more than 9999 orders.
pub fn format_order_number(day: NaiveDate, sequence: u64) -> String {
    format!("{}-{:04}", day.format("%y%m%d"), sequence)
}
