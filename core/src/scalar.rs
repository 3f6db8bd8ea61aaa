//! Text-to-number conversion for raw-body decoding.
//!
//! # Design
//! Each numeric destination type declares its bit width through `Scalar`,
//! and parsing uses that width's own parser so an out-of-range payload is an
//! error instead of a silent truncation. `isize` and `usize` have width 0
//! ("platform width"): they parse at 64 bits and narrow with a checked
//! conversion. `i64` additionally accepts duration literals such as `1h30m`
//! and yields nanoseconds.

use crate::error::Error;

/// A numeric type a response body can be parsed into.
pub trait Scalar: Sized {
    const TYPE_NAME: &'static str;
    /// Declared bit width, 0 for platform-natural width.
    const BITS: u32;

    /// Parse `text`, returning a human-readable reason on failure.
    fn parse_scalar(text: &str) -> Result<Self, String>;
}

/// A settable numeric destination, erased over its concrete type.
///
/// Holding `&mut dyn ScalarSlot` is what makes a destination settable;
/// a read-only value simply cannot be turned into one.
pub trait ScalarSlot {
    fn type_name(&self) -> &'static str;
    fn assign_text(&mut self, text: &str) -> Result<(), Error>;
}

impl<T: Scalar> ScalarSlot for T {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn assign_text(&mut self, text: &str) -> Result<(), Error> {
        *self = decode_scalar(text)?;
        Ok(())
    }
}

/// Parse `text` into `T`, naming the type and payload on failure.
pub fn decode_scalar<T: Scalar>(text: &str) -> Result<T, Error> {
    T::parse_scalar(text).map_err(|reason| Error::Scalar {
        type_name: T::TYPE_NAME,
        payload: text.to_string(),
        reason,
    })
}

macro_rules! fixed_width {
    ($($t:ty => $bits:expr),* $(,)?) => {$(
        impl Scalar for $t {
            const TYPE_NAME: &'static str = stringify!($t);
            const BITS: u32 = $bits;

            fn parse_scalar(text: &str) -> Result<Self, String> {
                text.parse::<$t>().map_err(|e| e.to_string())
            }
        }
    )*};
}

fixed_width! {
    i8 => 8, i16 => 16, i32 => 32,
    u8 => 8, u16 => 16, u32 => 32, u64 => 64,
}

macro_rules! float_width {
    ($($t:ty => $bits:expr),* $(,)?) => {$(
        impl Scalar for $t {
            const TYPE_NAME: &'static str = stringify!($t);
            const BITS: u32 = $bits;

            fn parse_scalar(text: &str) -> Result<Self, String> {
                let value = text.parse::<$t>().map_err(|e| e.to_string())?;
                if value.is_infinite() && !is_infinity_literal(text) {
                    return Err(format!("value out of range for {}", stringify!($t)));
                }
                Ok(value)
            }
        }
    )*};
}

float_width! {
    f32 => 32, f64 => 64,
}

/// `inf`/`infinity` with an optional sign, any case.
fn is_infinity_literal(text: &str) -> bool {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

macro_rules! natural_width {
    ($($t:ty => $wide:ty),* $(,)?) => {$(
        impl Scalar for $t {
            const TYPE_NAME: &'static str = stringify!($t);
            const BITS: u32 = 0;

            fn parse_scalar(text: &str) -> Result<Self, String> {
                let wide = text.parse::<$wide>().map_err(|e| e.to_string())?;
                <$t>::try_from(wide).map_err(|e| e.to_string())
            }
        }
    )*};
}

natural_width! {
    isize => i64,
    usize => u64,
}

impl Scalar for i64 {
    const TYPE_NAME: &'static str = "i64";
    const BITS: u32 = 64;

    fn parse_scalar(text: &str) -> Result<Self, String> {
        if let Some(nanos) = parse_duration_nanos(text) {
            return Ok(nanos);
        }
        text.parse::<i64>().map_err(|e| e.to_string())
    }
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("µs", 1_000),
    ("μs", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

/// Parse a duration literal (`300ms`, `-1.5h`, `2h45m`) into nanoseconds.
///
/// Returns `None` for anything that is not a well-formed literal, including
/// bare integers other than `0`, and for values outside the `i64` range.
pub fn parse_duration_nanos(text: &str) -> Option<i64> {
    let (negative, mut rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let limit = i64::MAX as u128 + u128::from(negative);
    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let int_part = &rest[..int_end];
        rest = &rest[int_end..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_end = after_dot
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(after_dot.len());
            frac_part = &after_dot[..frac_end];
            rest = &after_dot[frac_end..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_end = rest
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_end];
        rest = &rest[unit_end..];
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        total = total.checked_add(whole.checked_mul(scale)?)?;

        // Digits past nanosecond precision for the largest unit cannot change the result.
        let mut frac: u128 = 0;
        let mut denom: u128 = 1;
        for digit in frac_part.bytes().take(20) {
            frac = frac * 10 + u128::from(digit - b'0');
            denom *= 10;
        }
        total = total.checked_add(frac * scale / denom)?;

        if total > limit {
            return None;
        }
    }

    let signed = if negative {
        -(total as i128)
    } else {
        total as i128
    };
    i64::try_from(signed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip<T: Scalar + ToString + PartialEq + std::fmt::Debug + Copy>(values: &[T]) {
        for v in values {
            let back: T = decode_scalar(&v.to_string()).unwrap();
            assert_eq!(back, *v);
        }
    }

    #[test]
    fn integers_round_trip_at_their_limits() {
        round_trip(&[i8::MIN, -1, 0, i8::MAX]);
        round_trip(&[i16::MIN, i16::MAX]);
        round_trip(&[i32::MIN, i32::MAX]);
        round_trip(&[i64::MIN, 42, i64::MAX]);
        round_trip(&[isize::MIN, isize::MAX]);
        round_trip(&[0u8, u8::MAX]);
        round_trip(&[0u16, u16::MAX]);
        round_trip(&[0u32, u32::MAX]);
        round_trip(&[0u64, u64::MAX]);
        round_trip(&[0usize, usize::MAX]);
    }

    #[test]
    fn floats_round_trip() {
        round_trip(&[0.5f32, -3.25, f32::MAX]);
        round_trip(&[0.1f64, -2.5e300, f64::MIN_POSITIVE]);
    }

    #[test]
    fn out_of_range_errors_instead_of_truncating() {
        assert!(decode_scalar::<i8>("128").is_err());
        assert!(decode_scalar::<u8>("256").is_err());
        assert!(decode_scalar::<u16>("-1").is_err());
        assert!(decode_scalar::<i32>("2147483648").is_err());
    }

    #[test]
    fn float_overflow_errors_instead_of_becoming_infinite() {
        assert!(decode_scalar::<f32>("1e39").is_err());
        assert!(decode_scalar::<f32>("-1e39").is_err());
        assert!(decode_scalar::<f64>("1e400").is_err());
        assert_eq!(decode_scalar::<f64>("1e39").unwrap(), 1e39);

        assert_eq!(decode_scalar::<f32>("inf").unwrap(), f32::INFINITY);
        assert_eq!(decode_scalar::<f64>("-Infinity").unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn parse_failure_names_type_and_payload() {
        let err = decode_scalar::<u32>("abc").unwrap_err();
        match &err {
            Error::Scalar {
                type_name, payload, ..
            } => {
                assert_eq!(*type_name, "u32");
                assert_eq!(payload, "abc");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("\"abc\""));
    }

    #[test]
    fn declared_widths() {
        assert_eq!(<i8 as Scalar>::BITS, 8);
        assert_eq!(<u64 as Scalar>::BITS, 64);
        assert_eq!(<usize as Scalar>::BITS, 0);
        assert_eq!(<isize as Scalar>::BITS, 0);
    }

    #[test]
    fn i64_accepts_duration_literals() {
        assert_eq!(decode_scalar::<i64>("1h30m").unwrap(), 5_400_000_000_000);
        assert_eq!(decode_scalar::<i64>("300ms").unwrap(), 300_000_000);
        assert_eq!(decode_scalar::<i64>("1.5s").unwrap(), 1_500_000_000);
        assert_eq!(decode_scalar::<i64>("-2us").unwrap(), -2_000);
        assert_eq!(decode_scalar::<i64>("10µs").unwrap(), 10_000);
    }

    #[test]
    fn i64_falls_back_to_integer() {
        assert_eq!(decode_scalar::<i64>("1000").unwrap(), 1000);
        assert_eq!(decode_scalar::<i64>("-7").unwrap(), -7);
        assert!(decode_scalar::<i64>("5x").is_err());
    }

    #[test]
    fn duration_literal_edge_cases() {
        assert_eq!(parse_duration_nanos("0"), Some(0));
        assert_eq!(parse_duration_nanos(".5s"), Some(500_000_000));
        assert_eq!(parse_duration_nanos(""), None);
        assert_eq!(parse_duration_nanos("-"), None);
        assert_eq!(parse_duration_nanos("12"), None);
        assert_eq!(parse_duration_nanos("1d"), None);
        assert_eq!(parse_duration_nanos("s"), None);
        assert_eq!(parse_duration_nanos("3000000h"), None);
    }

    #[test]
    fn slot_assigns_through_erased_reference() {
        let mut value = 0u16;
        let slot: &mut dyn ScalarSlot = &mut value;
        assert_eq!(slot.type_name(), "u16");
        slot.assign_text("65535").unwrap();
        assert_eq!(value, u16::MAX);
    }
}
