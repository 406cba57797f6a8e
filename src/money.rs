// 💵 Money - exact decimal currency
//
// Prices, discounts and payments travel as JSON numbers or strings and are
// stored as TEXT with two decimal places. All arithmetic happens on
// `rust_decimal::Decimal`; rounding to cents only happens on the way out.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// 16% value-added tax
pub const TAX_RATE: Decimal = Decimal::from_parts(16, 0, 0, false, 2);

/// Currency scale used for storage and responses
pub const CURRENCY_SCALE: u32 = 2;

/// Largest storable amount: seven integer digits, two places
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 2);

/// Fits the storage precision: at most 7 integer digits and 2 places
pub fn fits_precision(amount: Decimal) -> bool {
    amount.normalize().scale() <= CURRENCY_SCALE && amount.abs() <= MAX_AMOUNT
}

/// Accepts `12`, `12.5`, `"12.50"` and `"1.25e1"`. Anything else is `None`.
pub fn parse_money(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Decimal::from(i));
            }
            parse_str(&n.to_string())
        }
        Value::String(s) => parse_str(s.trim()),
        _ => None,
    }
}

fn parse_str(raw: &str) -> Option<Decimal> {
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

/// Storage form: fixed two places, e.g. `"40.60"`
pub fn to_storage(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(CURRENCY_SCALE);
    rounded.rescale(CURRENCY_SCALE);
    rounded.to_string()
}

/// Response form: a JSON number rounded to cents
pub fn money_json(amount: Decimal) -> Value {
    let rounded = amount.round_dp(CURRENCY_SCALE);
    match rounded.to_f64().and_then(serde_json::Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(to_storage(rounded)),
    }
}
