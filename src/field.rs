// Copyright (C) Thalia Archibald. All rights reserved.
//
// This file is part of fast-csv, distributed under the GPL 2.0 with a linking
// exception. For the full terms, see the included COPYING file.

use std::{
    borrow::Cow,
    fmt::{self, Debug, Formatter},
    num::{IntErrorKind, ParseIntError},
    str,
};

use bstr::{BStr, BString, ByteSlice};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use static_assertions::const_assert_eq;

use crate::{
    error::{ErrorCode, FieldResult},
    policy::NullPolicy,
};

/// A zero-copy view of one field's bytes within the mapping.
///
/// Fields are handed to iteration callbacks and are only valid for the
/// duration of one callback invocation; copy the bytes out to retain them.
/// The handle is two words, so passing it by value is as cheap as passing
/// the pointer pair it wraps.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    bytes: &'a [u8],
}

#[cfg(target_pointer_width = "64")]
const_assert_eq!(std::mem::size_of::<Field<'static>>(), 16);

impl<'a> Field<'a> {
    #[inline(always)]
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Field { bytes }
    }

    /// The raw bytes of the field.
    #[inline(always)]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// The raw bytes as a byte string, for display and lossless comparison.
    #[inline(always)]
    pub fn as_bstr(&self) -> &'a BStr {
        self.bytes.as_bstr()
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the field matches the null vocabulary of `V`.
    #[inline(always)]
    pub fn is_null<V: NullPolicy>(&self) -> bool {
        V::is_null(self.bytes)
    }

    /// Extracts the field as `T`. The whole field must be consumed; trailing
    /// bytes fail the extraction.
    #[inline(always)]
    pub fn parse<T: FromField<'a>>(&self) -> FieldResult<T> {
        T::from_field(self.bytes)
    }

    /// Extracts the field as `T`, substituting `default` on any error.
    #[inline(always)]
    pub fn parse_or<T: FromField<'a>>(&self, default: T) -> T {
        self.parse().unwrap_or(default)
    }

    /// Like [`parse`](Field::parse), but a field matching the null
    /// vocabulary of `V` reports [`ErrorCode::NullValue`] instead of being
    /// handed to the extractor.
    #[inline(always)]
    pub fn parse_checked<T: FromField<'a>, V: NullPolicy>(&self) -> FieldResult<T> {
        if self.is_null::<V>() {
            Err(ErrorCode::NullValue)
        } else {
            self.parse()
        }
    }

    /// Null-aware extraction: `None` both for a null token under `V` and for
    /// an extraction failure. Callers that need to tell the two apart use
    /// [`is_null`](Field::is_null) and [`parse`](Field::parse) directly.
    #[inline(always)]
    pub fn as_optional<T: FromField<'a>, V: NullPolicy>(&self) -> Option<T> {
        if self.is_null::<V>() {
            None
        } else {
            self.parse().ok()
        }
    }

    /// Strict `YYYY-MM-DD`, calendar-checked.
    #[inline]
    pub fn parse_date(&self) -> FieldResult<NaiveDate> {
        self.parse()
    }

    /// Strict `YYYY-MM-DD HH:MM:SS`, with `T` accepted as the separator and
    /// a leap second tolerated.
    #[inline]
    pub fn parse_datetime(&self) -> FieldResult<NaiveDateTime> {
        self.parse()
    }
}

impl Debug for Field<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.bytes.as_bstr()).finish()
    }
}

/// Conversion from a field's raw bytes.
///
/// Borrowed targets (`&[u8]`, `&BStr`, `Cow`) are zero-copy and tie the
/// result to the mapping; owned targets copy. Numeric, boolean, and calendar
/// targets validate that the whole field is consumed.
pub trait FromField<'a>: Sized {
    fn from_field(bytes: &'a [u8]) -> FieldResult<Self>;
}

impl<'a> FromField<'a> for &'a [u8] {
    #[inline(always)]
    fn from_field(bytes: &'a [u8]) -> FieldResult<Self> {
        Ok(bytes)
    }
}

impl<'a> FromField<'a> for &'a BStr {
    #[inline(always)]
    fn from_field(bytes: &'a [u8]) -> FieldResult<Self> {
        Ok(BStr::new(bytes))
    }
}

impl<'a> FromField<'a> for Cow<'a, [u8]> {
    #[inline(always)]
    fn from_field(bytes: &'a [u8]) -> FieldResult<Self> {
        Ok(Cow::Borrowed(bytes))
    }
}

impl FromField<'_> for Vec<u8> {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        Ok(bytes.to_vec())
    }
}

impl FromField<'_> for BString {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        Ok(BString::new(bytes.to_vec()))
    }
}

impl FromField<'_> for String {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[inline]
fn int_error(err: ParseIntError) -> ErrorCode {
    match err.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => ErrorCode::OutOfRange,
        _ => ErrorCode::InvalidInteger,
    }
}

macro_rules! impl_from_field_signed {
    ($($ty:ident)*) => {$(
        impl FromField<'_> for $ty {
            #[inline]
            fn from_field(bytes: &[u8]) -> FieldResult<Self> {
                let digits = match bytes {
                    [b'+' | b'-', rest @ ..] => rest,
                    _ => bytes,
                };
                if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                    return Err(ErrorCode::InvalidInteger);
                }
                // SAFETY: only ASCII sign and digit bytes reach here.
                let s = unsafe { str::from_utf8_unchecked(bytes) };
                <$ty>::from_str_radix(s, 10).map_err(int_error)
            }
        }
    )*};
}

macro_rules! impl_from_field_unsigned {
    ($($ty:ident)*) => {$(
        impl FromField<'_> for $ty {
            #[inline]
            fn from_field(bytes: &[u8]) -> FieldResult<Self> {
                if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
                    return Err(ErrorCode::InvalidInteger);
                }
                // SAFETY: only ASCII digit bytes reach here.
                let s = unsafe { str::from_utf8_unchecked(bytes) };
                <$ty>::from_str_radix(s, 10).map_err(int_error)
            }
        }
    )*};
}

impl_from_field_signed!(i8 i16 i32 i64 i128);
impl_from_field_unsigned!(u8 u16 u32 u64 u128);

/// Exponent-free decimal fast path. Limited to 15 significant digits so the
/// mantissa stays below 2^53 and the final quotient is exact; everything
/// else falls through to the general parser.
#[inline]
fn float_fast(bytes: &[u8]) -> Option<f64> {
    const POW10: [f64; 16] = [
        1e0, 1e1, 1e2, 1e3, 1e4, 1e5, 1e6, 1e7, 1e8, 1e9, 1e10, 1e11, 1e12, 1e13, 1e14, 1e15,
    ];

    let (negative, rest) = match bytes {
        [b'-', rest @ ..] => (true, rest),
        [b'+', rest @ ..] => (false, rest),
        _ => (false, bytes),
    };
    let mut mantissa = 0u64;
    let mut digits = 0usize;
    let mut i = 0;
    while i < rest.len() && rest[i].is_ascii_digit() {
        if digits == 15 {
            return None;
        }
        mantissa = mantissa * 10 + u64::from(rest[i] - b'0');
        digits += 1;
        i += 1;
    }
    let mut frac = 0usize;
    if i < rest.len() && rest[i] == b'.' {
        i += 1;
        while i < rest.len() && rest[i].is_ascii_digit() {
            if digits == 15 {
                return None;
            }
            mantissa = mantissa * 10 + u64::from(rest[i] - b'0');
            digits += 1;
            frac += 1;
            i += 1;
        }
    }
    if i != rest.len() || digits == 0 {
        return None;
    }
    let value = mantissa as f64 / POW10[frac];
    Some(if negative { -value } else { value })
}

/// Grammar gate for the general float parser: optional sign, digits with at
/// most one dot, optional `[eE][+-]?digits`, at least one mantissa digit.
/// Rejects the `inf` and `nan` spellings `str::parse` would accept.
fn float_shape_ok(bytes: &[u8]) -> bool {
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - int_start;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        mantissa_digits += i - frac_start;
    }
    if mantissa_digits == 0 {
        return false;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}

impl FromField<'_> for f64 {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        if let Some(value) = float_fast(bytes) {
            return Ok(value);
        }
        if !float_shape_ok(bytes) {
            return Err(ErrorCode::InvalidFloat);
        }
        // SAFETY: the shape check admits only ASCII bytes.
        let s = unsafe { str::from_utf8_unchecked(bytes) };
        s.parse().map_err(|_| ErrorCode::InvalidFloat)
    }
}

impl FromField<'_> for f32 {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        if !float_shape_ok(bytes) {
            return Err(ErrorCode::InvalidFloat);
        }
        // SAFETY: the shape check admits only ASCII bytes.
        let s = unsafe { str::from_utf8_unchecked(bytes) };
        s.parse().map_err(|_| ErrorCode::InvalidFloat)
    }
}

impl FromField<'_> for bool {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        match bytes {
            b"1" | b"t" | b"T" | b"y" | b"Y" | b"true" | b"True" | b"TRUE" | b"yes" | b"Yes"
            | b"YES" => Ok(true),
            b"0" | b"f" | b"F" | b"n" | b"N" | b"false" | b"False" | b"FALSE" | b"no" | b"No"
            | b"NO" => Ok(false),
            _ => Err(ErrorCode::InvalidBool),
        }
    }
}

#[inline]
fn ascii_number(bytes: &[u8]) -> Option<u32> {
    let mut value = 0u32;
    for &b in bytes {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value * 10 + u32::from(b - b'0');
    }
    Some(value)
}

fn parse_date(bytes: &[u8]) -> FieldResult<NaiveDate> {
    if bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
        return Err(ErrorCode::InvalidDate);
    }
    let year = ascii_number(&bytes[0..4]).ok_or(ErrorCode::InvalidDate)?;
    let month = ascii_number(&bytes[5..7]).ok_or(ErrorCode::InvalidDate)?;
    let day = ascii_number(&bytes[8..10]).ok_or(ErrorCode::InvalidDate)?;
    NaiveDate::from_ymd_opt(year as i32, month, day).ok_or(ErrorCode::InvalidDate)
}

fn parse_datetime(bytes: &[u8]) -> FieldResult<NaiveDateTime> {
    if bytes.len() != 19
        || !matches!(bytes[10], b' ' | b'T')
        || bytes[13] != b':'
        || bytes[16] != b':'
    {
        return Err(ErrorCode::InvalidDateTime);
    }
    let date = parse_date(&bytes[0..10]).map_err(|_| ErrorCode::InvalidDateTime)?;
    let hour = ascii_number(&bytes[11..13]).ok_or(ErrorCode::InvalidDateTime)?;
    let minute = ascii_number(&bytes[14..16]).ok_or(ErrorCode::InvalidDateTime)?;
    let second = ascii_number(&bytes[17..19]).ok_or(ErrorCode::InvalidDateTime)?;
    if hour > 23 || minute > 59 || second > 60 {
        return Err(ErrorCode::InvalidDateTime);
    }
    let time = if second == 60 {
        // Leap second: chrono represents `:60` as second 59 with the
        // nanosecond field overflowing into the next second.
        NaiveTime::from_hms_nano_opt(hour, minute, 59, 1_000_000_000)
    } else {
        NaiveTime::from_hms_opt(hour, minute, second)
    }
    .ok_or(ErrorCode::InvalidDateTime)?;
    Ok(NaiveDateTime::new(date, time))
}

impl FromField<'_> for NaiveDate {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        parse_date(bytes)
    }
}

impl FromField<'_> for NaiveDateTime {
    #[inline]
    fn from_field(bytes: &[u8]) -> FieldResult<Self> {
        parse_datetime(bytes)
    }
}

#[cfg(test)]
mod tests {
    use paste::paste;

    use super::*;
    use crate::policy::{NullsLenient, NullsOff, NullsStrict};

    fn parse<'a, T: FromField<'a>>(bytes: &'a [u8]) -> FieldResult<T> {
        T::from_field(bytes)
    }

    macro_rules! int_limit_tests {
        ($($ty:ident)*) => { paste! {$(
            #[test]
            fn [<$ty _limits_and_overflow>]() {
                let max = $ty::MAX.to_string();
                let min = $ty::MIN.to_string();
                assert_eq!(parse::<$ty>(max.as_bytes()), Ok($ty::MAX));
                assert_eq!(parse::<$ty>(min.as_bytes()), Ok($ty::MIN));
                let over = format!("{max}0");
                assert_eq!(parse::<$ty>(over.as_bytes()), Err(ErrorCode::OutOfRange));
                let under = format!("{min}0");
                if $ty::MIN != 0 {
                    assert_eq!(parse::<$ty>(under.as_bytes()), Err(ErrorCode::OutOfRange));
                }
            }
        )*}};
    }

    int_limit_tests!(i8 i16 i32 i64 i128 u8 u16 u32 u64 u128);

    #[test]
    fn signed_accepts_sign_prefix() {
        assert_eq!(parse::<i32>(b"+42"), Ok(42));
        assert_eq!(parse::<i32>(b"-42"), Ok(-42));
        assert_eq!(parse::<i64>(b"0"), Ok(0));
    }

    #[test]
    fn unsigned_rejects_sign_prefix() {
        assert_eq!(parse::<u32>(b"+42"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<u32>(b"-42"), Err(ErrorCode::InvalidInteger));
    }

    #[test]
    fn integer_must_consume_whole_field() {
        assert_eq!(parse::<i32>(b""), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b"+"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b"-"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b"12x"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b" 12"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b"1 2"), Err(ErrorCode::InvalidInteger));
        assert_eq!(parse::<i32>(b"1.0"), Err(ErrorCode::InvalidInteger));
    }

    #[test]
    fn float_plain_decimal() {
        assert_eq!(parse::<f64>(b"0"), Ok(0.0));
        assert_eq!(parse::<f64>(b"3.25"), Ok(3.25));
        assert_eq!(parse::<f64>(b"-3.25"), Ok(-3.25));
        assert_eq!(parse::<f64>(b"+0.5"), Ok(0.5));
        assert_eq!(parse::<f64>(b".5"), Ok(0.5));
        assert_eq!(parse::<f64>(b"5."), Ok(5.0));
        assert_eq!(parse::<f32>(b"2.5"), Ok(2.5f32));
    }

    #[test]
    fn float_exponent_falls_back() {
        assert_eq!(parse::<f64>(b"1e3"), Ok(1000.0));
        assert_eq!(parse::<f64>(b"1.5E-2"), Ok(0.015));
        assert_eq!(parse::<f64>(b"-2e+4"), Ok(-20000.0));
        // 16+ significant digits leave the fast path but stay valid.
        assert_eq!(
            parse::<f64>(b"1234567890.1234567"),
            Ok("1234567890.1234567".parse().unwrap())
        );
    }

    #[test]
    fn float_rejects_partial_and_non_decimal() {
        for junk in [
            &b""[..],
            b"+",
            b"-",
            b".",
            b"1e",
            b"1e+",
            b"e5",
            b"1.2.3",
            b"1f",
            b" 1",
            b"1 ",
            b"inf",
            b"-inf",
            b"nan",
            b"NaN",
            b"infinity",
        ] {
            assert_eq!(
                parse::<f64>(junk),
                Err(ErrorCode::InvalidFloat),
                "{:?}",
                junk.as_bstr()
            );
        }
    }

    #[test]
    fn bool_vocabulary() {
        for token in [
            &b"1"[..],
            b"t",
            b"T",
            b"y",
            b"Y",
            b"true",
            b"True",
            b"TRUE",
            b"yes",
            b"Yes",
            b"YES",
        ] {
            assert_eq!(parse::<bool>(token), Ok(true), "{:?}", token.as_bstr());
        }
        for token in [
            &b"0"[..],
            b"f",
            b"F",
            b"n",
            b"N",
            b"false",
            b"False",
            b"FALSE",
            b"no",
            b"No",
            b"NO",
        ] {
            assert_eq!(parse::<bool>(token), Ok(false), "{:?}", token.as_bstr());
        }
        for junk in [&b""[..], b"2", b"tr", b"yess", b"on", b"off", b"tRue"] {
            assert_eq!(
                parse::<bool>(junk),
                Err(ErrorCode::InvalidBool),
                "{:?}",
                junk.as_bstr()
            );
        }
    }

    #[test]
    fn date_calendar_checked() {
        assert_eq!(
            parse::<NaiveDate>(b"2024-02-29"),
            Ok(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert_eq!(
            parse::<NaiveDate>(b"2023-02-29"),
            Err(ErrorCode::InvalidDate)
        );
        assert_eq!(
            parse::<NaiveDate>(b"2024-13-01"),
            Err(ErrorCode::InvalidDate)
        );
        assert_eq!(
            parse::<NaiveDate>(b"2024-04-31"),
            Err(ErrorCode::InvalidDate)
        );
        assert_eq!(parse::<NaiveDate>(b"2024-1-01"), Err(ErrorCode::InvalidDate));
        assert_eq!(
            parse::<NaiveDate>(b"2024/01/01"),
            Err(ErrorCode::InvalidDate)
        );
        assert_eq!(parse::<NaiveDate>(b"2024-01-0"), Err(ErrorCode::InvalidDate));
    }

    #[test]
    fn datetime_separators_and_bounds() {
        let expected = NaiveDate::from_ymd_opt(2024, 2, 29)
            .unwrap()
            .and_hms_opt(13, 5, 59)
            .unwrap();
        assert_eq!(parse::<NaiveDateTime>(b"2024-02-29 13:05:59"), Ok(expected));
        assert_eq!(parse::<NaiveDateTime>(b"2024-02-29T13:05:59"), Ok(expected));
        assert!(parse::<NaiveDateTime>(b"2023-12-31 23:59:60").is_ok());
        for junk in [
            &b"2024-02-29 24:00:00"[..],
            b"2024-02-29 12:60:00",
            b"2024-02-29 12:00:61",
            b"2024-02-29_12:00:00",
            b"2024-02-29 12:00",
            b"2023-02-29 12:00:00",
        ] {
            assert_eq!(
                parse::<NaiveDateTime>(junk),
                Err(ErrorCode::InvalidDateTime),
                "{:?}",
                junk.as_bstr()
            );
        }
    }

    #[test]
    fn string_targets_always_succeed() {
        assert_eq!(parse::<&[u8]>(b"abc"), Ok(&b"abc"[..]));
        assert_eq!(parse::<Vec<u8>>(b"abc"), Ok(b"abc".to_vec()));
        assert_eq!(parse::<String>(b"abc"), Ok("abc".to_string()));
        assert_eq!(parse::<BString>(b"abc"), Ok(BString::from("abc")));
        // Invalid UTF-8 is replaced, not rejected.
        assert_eq!(parse::<String>(b"a\xffb"), Ok("a\u{fffd}b".to_string()));
    }

    #[test]
    fn field_accessors() {
        let field = Field::new(b"1234");
        assert_eq!(field.len(), 4);
        assert!(!field.is_empty());
        assert_eq!(field.as_bytes(), b"1234");
        assert_eq!(field.parse::<i32>(), Ok(1234));
        assert_eq!(field.parse_or(-1i32), 1234);
        assert_eq!(Field::new(b"junk").parse_or(-1i32), -1);
    }

    #[test]
    fn optional_folds_null_and_failure() {
        assert_eq!(Field::new(b"7").as_optional::<i32, NullsLenient>(), Some(7));
        assert_eq!(Field::new(b"NA").as_optional::<i32, NullsLenient>(), None);
        assert_eq!(Field::new(b"junk").as_optional::<i32, NullsLenient>(), None);
        // With nulls off, an empty field is a parse failure instead.
        assert_eq!(Field::new(b"").as_optional::<i32, NullsOff>(), None);
    }

    #[test]
    fn checked_parse_reports_null() {
        assert_eq!(
            Field::new(b"").parse_checked::<i32, NullsStrict>(),
            Err(ErrorCode::NullValue)
        );
        assert_eq!(
            Field::new(b"junk").parse_checked::<i32, NullsStrict>(),
            Err(ErrorCode::InvalidInteger)
        );
        assert_eq!(Field::new(b"3").parse_checked::<i32, NullsStrict>(), Ok(3));
    }
}
