//! Request dispatcher.
//!
//! Maps a request line to a response line based on the channel it arrived
//! on. This is the only business logic in the server and it never fails:
//! malformed numeric input produces the invalid-input message.

use crate::channel::ChannelKind;

/// Prefix of every string channel response.
pub const STRING_PREFIX: &str = "String response";

/// Prefix of every successful number channel response.
pub const NUMBER_PREFIX: &str = "Number squared";

/// Response sent when a number channel request is not an integer.
pub const INVALID_INPUT: &str = "Error: invalid input";

/// Compute the response for `request` received on `kind`.
pub fn dispatch(kind: ChannelKind, request: &str) -> String {
    match kind {
        ChannelKind::String => format!("{STRING_PREFIX}: {}", request.to_uppercase()),
        ChannelKind::Number => match request.trim().parse::<i64>() {
            Ok(n) => {
                // i64 * i64 always fits in i128
                let n = i128::from(n);
                format!("{NUMBER_PREFIX}: {}", n * n)
            }
            Err(_) => INVALID_INPUT.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_uppercase() {
        assert_eq!(
            dispatch(ChannelKind::String, "hello"),
            "String response: HELLO"
        );
    }

    #[test]
    fn test_string_empty_and_idempotent() {
        assert_eq!(dispatch(ChannelKind::String, ""), "String response: ");
        assert_eq!(
            dispatch(ChannelKind::String, "ALREADY UP"),
            "String response: ALREADY UP"
        );
    }

    #[test]
    fn test_string_unicode() {
        assert_eq!(
            dispatch(ChannelKind::String, "requisição única"),
            "String response: REQUISIÇÃO ÚNICA"
        );
    }

    #[test]
    fn test_number_square() {
        assert_eq!(dispatch(ChannelKind::Number, "6"), "Number squared: 36");
        assert_eq!(dispatch(ChannelKind::Number, "-7"), "Number squared: 49");
        assert_eq!(dispatch(ChannelKind::Number, "+3"), "Number squared: 9");
        assert_eq!(dispatch(ChannelKind::Number, " 12 "), "Number squared: 144");
        assert_eq!(dispatch(ChannelKind::Number, "0"), "Number squared: 0");
    }

    #[test]
    fn test_number_extremes_do_not_overflow() {
        let expected = i128::from(i64::MIN) * i128::from(i64::MIN);
        assert_eq!(
            dispatch(ChannelKind::Number, &i64::MIN.to_string()),
            format!("Number squared: {expected}")
        );
        let expected = i128::from(i64::MAX) * i128::from(i64::MAX);
        assert_eq!(
            dispatch(ChannelKind::Number, &i64::MAX.to_string()),
            format!("Number squared: {expected}")
        );
    }

    #[test]
    fn test_number_invalid() {
        for input in ["abc", "", "1.5", "12a", "99999999999999999999", "- 4"] {
            assert_eq!(dispatch(ChannelKind::Number, input), INVALID_INPUT, "{input:?}");
        }
    }
}
