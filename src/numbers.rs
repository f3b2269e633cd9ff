#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumberToken {
    pub start: usize,
    pub end: usize,
    pub value: f64,
}

/// Finds decimal numbers in free text. Commas between digits are read as digit
/// grouping (`1,50,000`). With `signed`, a `-`/`+` directly before the digits
/// counts as a sign unless it follows a digit, so `13.5-17.5` stays two numbers.
pub fn scan_numbers(text: &str, signed: bool) -> Vec<NumberToken> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        let starts_fraction =
            bytes[index] == b'.' && bytes.get(index + 1).is_some_and(u8::is_ascii_digit);
        if !bytes[index].is_ascii_digit() && !starts_fraction {
            index += 1;
            continue;
        }

        let mut start = index;
        if signed && start > 0 && matches!(bytes[start - 1], b'-' | b'+') {
            let follows_digit = start >= 2 && bytes[start - 2].is_ascii_digit();
            if !follows_digit {
                start -= 1;
            }
        }

        let mut digits = String::new();
        if start < index {
            digits.push(bytes[start] as char);
        }

        let mut seen_dot = false;
        while index < bytes.len() {
            let byte = bytes[index];
            if byte.is_ascii_digit() {
                digits.push(byte as char);
            } else if byte == b'.'
                && !seen_dot
                && bytes.get(index + 1).is_some_and(u8::is_ascii_digit)
            {
                seen_dot = true;
                digits.push('.');
            } else if byte == b','
                && !seen_dot
                && index > 0
                && bytes[index - 1].is_ascii_digit()
                && bytes.get(index + 1).is_some_and(u8::is_ascii_digit)
            {
                // grouping separator
            } else {
                break;
            }
            index += 1;
        }

        if let Ok(value) = digits.parse::<f64>() {
            tokens.push(NumberToken {
                start,
                end: index,
                value,
            });
        }
    }

    tokens
}

/// First float-looking substring of a stored value, e.g. `"18 ng/mL"` -> 18.
pub fn first_number(text: &str) -> Option<f64> {
    scan_numbers(text, true).first().map(|token| token.value)
}
