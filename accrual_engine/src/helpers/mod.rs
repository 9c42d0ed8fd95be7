mod order_number;

pub use order_number::{luhn_valid, parse_order_number};
