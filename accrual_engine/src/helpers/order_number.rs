use crate::db_types::OrderNumber;

/// Returns true if `digits` is a non-empty string of ASCII digits that passes the Luhn checksum.
///
/// Digits are summed right-to-left, with every second digit doubled (and reduced by 9 if the doubled value exceeds 9).
/// The number is valid if the total is divisible by 10.
pub fn luhn_valid(digits: &str) -> bool {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let sum = digits.bytes().rev().enumerate().fold(0u32, |sum, (i, b)| {
        let d = u32::from(b - b'0');
        let d = if i % 2 == 1 {
            let doubled = d * 2;
            if doubled > 9 {
                doubled - 9
            } else {
                doubled
            }
        } else {
            d
        };
        sum + d
    });
    sum % 10 == 0
}

/// Trims the input and returns it as an [`OrderNumber`] if it is numeric and passes the Luhn check.
pub fn parse_order_number(input: &str) -> Option<OrderNumber> {
    let trimmed = input.trim();
    luhn_valid(trimmed).then(|| OrderNumber::from(trimmed))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn valid_numbers() {
        for n in ["24619735244", "61508349208", "62794305672", "79927398713", "0", "18"] {
            assert!(luhn_valid(n), "{n} should be valid");
        }
    }

    #[test]
    fn invalid_numbers() {
        for n in ["", "12345678901", "79927398710", "1a", " 18", "-18", "4561 2612 1234 5467"] {
            assert!(!luhn_valid(n), "{n} should be invalid");
        }
    }

    #[test]
    fn parse_trims_whitespace() {
        let number = parse_order_number(" 61508349208\n").unwrap();
        assert_eq!(number.as_str(), "61508349208");
        assert!(parse_order_number("61508349209").is_none());
    }
}
