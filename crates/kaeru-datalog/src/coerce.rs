//! Value cleaning and type coercion for fact fields.
//!
//! Fact files are tab-delimited with one tuple per line, so tabs and line
//! breaks inside string values are cleaned before they are written. Numeric
//! and boolean values are checked against their declared type; a value that
//! does not conform rejects the whole row.

use std::borrow::Cow;

use crate::error::RowErrorKind;
use crate::options::{ConvertOptions, NumberWidth, TabPolicy};
use crate::schema::{ColumnRole, ColumnSpec, ValueType};

fn needs_cleaning(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
}

/// Remove field and record separators from a string value.
pub fn clean_symbol(raw: &str, policy: TabPolicy) -> Cow<'_, str> {
    if !raw.contains(needs_cleaning) {
        return Cow::Borrowed(raw);
    }
    let cleaned = match policy {
        TabPolicy::Space => raw
            .chars()
            .map(|c| if needs_cleaning(c) { ' ' } else { c })
            .collect(),
        TabPolicy::Strip => raw.chars().filter(|c| !needs_cleaning(*c)).collect(),
    };
    Cow::Owned(cleaned)
}

/// Coerces raw CSV text into fact field text.
pub struct Coercer<'a> {
    options: &'a ConvertOptions,
    cleaned: u64,
}

impl<'a> Coercer<'a> {
    pub fn new(options: &'a ConvertOptions) -> Self {
        Self {
            options,
            cleaned: 0,
        }
    }

    /// Number of string values cleaned since the last call. Called once per
    /// row so a rejected row's count can be dropped.
    pub fn take_cleaned(&mut self) -> u64 {
        std::mem::take(&mut self.cleaned)
    }

    /// Coerce a scalar value of `column`.
    ///
    /// Empty identifiers are rejected. Other empty values become the null
    /// symbol for strings and `0` for numbers and booleans.
    pub fn scalar(&mut self, raw: &str, column: &ColumnSpec) -> Result<String, RowErrorKind> {
        if raw.is_empty() {
            return match column.role {
                ColumnRole::Id | ColumnRole::StartId | ColumnRole::EndId => {
                    Err(RowErrorKind::EmptyId)
                }
                _ => Ok(self.null(column.ty.value)),
            };
        }
        self.value(raw, column.ty.value)
    }

    /// Coerce every element of an array value. An empty value has no
    /// elements.
    pub fn elements(&mut self, raw: &str, column: &ColumnSpec) -> Result<Vec<String>, RowErrorKind> {
        if raw.is_empty() {
            return Ok(Vec::new());
        }
        raw.split(self.options.array_delimiter)
            .map(|element| {
                if element.is_empty() {
                    Ok(self.null(column.ty.value))
                } else {
                    self.value(element, column.ty.value)
                }
            })
            .collect()
    }

    fn null(&mut self, ty: ValueType) -> String {
        match ty {
            ValueType::String => {
                let options = self.options;
                self.symbol(&options.null_symbol)
            }
            ValueType::Int | ValueType::Float | ValueType::Boolean => "0".to_string(),
        }
    }

    fn value(&mut self, raw: &str, ty: ValueType) -> Result<String, RowErrorKind> {
        match ty {
            ValueType::String => Ok(self.symbol(raw)),
            ValueType::Int => parse_int(raw, self.options.number_width),
            ValueType::Float => parse_float(raw),
            ValueType::Boolean => parse_bool(raw),
        }
    }

    fn symbol(&mut self, raw: &str) -> String {
        match clean_symbol(raw, self.options.tabs) {
            Cow::Borrowed(s) => s.to_string(),
            Cow::Owned(s) => {
                self.cleaned += 1;
                s
            }
        }
    }
}

fn invalid(expected: &'static str, raw: &str) -> RowErrorKind {
    RowErrorKind::InvalidValue {
        expected,
        value: raw.to_string(),
    }
}

fn parse_int(raw: &str, width: NumberWidth) -> Result<String, RowErrorKind> {
    let n = raw.trim().parse::<i64>().map_err(|_| invalid("int", raw))?;
    if width == NumberWidth::Bits32 && i32::try_from(n).is_err() {
        return Err(RowErrorKind::OutOfRange {
            value: raw.to_string(),
            bits: width.bits(),
        });
    }
    Ok(n.to_string())
}

fn parse_float(raw: &str) -> Result<String, RowErrorKind> {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(f) if f.is_finite() => Ok(trimmed.to_string()),
        _ => Err(invalid("float", raw)),
    }
}

fn parse_bool(raw: &str) -> Result<String, RowErrorKind> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") || trimmed == "1" {
        Ok("1".to_string())
    } else if trimmed.eq_ignore_ascii_case("false") || trimmed == "0" {
        Ok("0".to_string())
    } else {
        Err(invalid("boolean", raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnType;
    use test_case::test_case;

    fn property(value: ValueType) -> ColumnSpec {
        ColumnSpec {
            position: 0,
            name: "p".to_string(),
            role: ColumnRole::Property,
            ty: ColumnType::scalar(value),
            id_space: None,
        }
    }

    fn array(value: ValueType) -> ColumnSpec {
        ColumnSpec {
            ty: ColumnType::array(value),
            ..property(value)
        }
    }

    #[test_case("plain", TabPolicy::Space, "plain")]
    #[test_case("a\tb", TabPolicy::Space, "a b")]
    #[test_case("a\tb", TabPolicy::Strip, "ab")]
    #[test_case("line\nbreak\r", TabPolicy::Space, "line break ")]
    #[test_case("\t\t", TabPolicy::Strip, "")]
    fn test_clean_symbol(raw: &str, policy: TabPolicy, expected: &str) {
        assert_eq!(clean_symbol(raw, policy), expected);
    }

    #[test]
    fn test_clean_symbol_borrows_when_clean() {
        assert!(matches!(
            clean_symbol("no tabs here", TabPolicy::Space),
            Cow::Borrowed(_)
        ));
    }

    #[test_case(ValueType::Int, "36", "36")]
    #[test_case(ValueType::Int, " +7 ", "7")]
    #[test_case(ValueType::Int, "-12", "-12")]
    #[test_case(ValueType::Float, "3.25", "3.25")]
    #[test_case(ValueType::Float, " 1e3", "1e3")]
    #[test_case(ValueType::Boolean, "TRUE", "1")]
    #[test_case(ValueType::Boolean, "false", "0")]
    #[test_case(ValueType::Boolean, "1", "1")]
    #[test_case(ValueType::String, "Ada", "Ada")]
    fn test_scalar_ok(ty: ValueType, raw: &str, expected: &str) {
        let options = ConvertOptions::default();
        let mut coercer = Coercer::new(&options);
        assert_eq!(coercer.scalar(raw, &property(ty)).unwrap(), expected);
    }

    #[test_case(ValueType::Int, "thirty")]
    #[test_case(ValueType::Int, "1.5")]
    #[test_case(ValueType::Float, "NaN")]
    #[test_case(ValueType::Float, "inf")]
    #[test_case(ValueType::Float, "abc")]
    #[test_case(ValueType::Boolean, "yes")]
    fn test_scalar_rejected(ty: ValueType, raw: &str) {
        let options = ConvertOptions::default();
        let mut coercer = Coercer::new(&options);
        let err = coercer.scalar(raw, &property(ty)).unwrap_err();
        match err {
            RowErrorKind::InvalidValue { expected, value } => {
                assert_eq!(expected, ty.name());
                assert_eq!(value, raw);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test_case(NumberWidth::Bits32, "2147483647", Some("2147483647") ; "max 32")]
    #[test_case(NumberWidth::Bits32, "-2147483648", Some("-2147483648") ; "min 32")]
    #[test_case(NumberWidth::Bits32, "2147483648", None ; "over 32")]
    #[test_case(NumberWidth::Bits64, "2147483648", Some("2147483648") ; "over 32 in 64")]
    #[test_case(NumberWidth::Bits64, "9223372036854775808", None ; "over 64")]
    fn test_number_width(width: NumberWidth, raw: &str, expected: Option<&str>) {
        let options = ConvertOptions::default().with_number_width(width);
        let mut coercer = Coercer::new(&options);
        let result = coercer.scalar(raw, &property(ValueType::Int));
        match expected {
            Some(expected) => assert_eq!(result.unwrap(), expected),
            None => assert!(result.is_err()),
        }
    }

    #[test]
    fn test_out_of_range_names_width() {
        let options = ConvertOptions::default();
        let mut coercer = Coercer::new(&options);
        let err = coercer
            .scalar("3000000000", &property(ValueType::Int))
            .unwrap_err();
        assert!(matches!(err, RowErrorKind::OutOfRange { bits: 32, .. }));
    }

    #[test]
    fn test_empty_values() {
        let options = ConvertOptions::default().with_null_symbol("nil");
        let mut coercer = Coercer::new(&options);
        assert_eq!(coercer.scalar("", &property(ValueType::String)).unwrap(), "nil");
        assert_eq!(coercer.scalar("", &property(ValueType::Int)).unwrap(), "0");
        assert_eq!(coercer.scalar("", &property(ValueType::Boolean)).unwrap(), "0");

        let id = ColumnSpec {
            role: ColumnRole::Id,
            ..property(ValueType::Int)
        };
        assert!(matches!(coercer.scalar("", &id), Err(RowErrorKind::EmptyId)));
    }

    #[test]
    fn test_cleaned_values_are_counted() {
        let options = ConvertOptions::default();
        let mut coercer = Coercer::new(&options);
        let column = property(ValueType::String);
        coercer.scalar("ok", &column).unwrap();
        coercer.scalar("a\tb", &column).unwrap();
        coercer.scalar("c\nd", &column).unwrap();
        assert_eq!(coercer.take_cleaned(), 2);
        assert_eq!(coercer.take_cleaned(), 0);
    }

    #[test]
    fn test_elements() {
        let options = ConvertOptions::default();
        let mut coercer = Coercer::new(&options);

        assert_eq!(
            coercer.elements("1;2;3", &array(ValueType::Int)).unwrap(),
            vec!["1", "2", "3"]
        );
        assert!(coercer.elements("", &array(ValueType::Int)).unwrap().is_empty());
        assert_eq!(
            coercer.elements("a;;b", &array(ValueType::String)).unwrap(),
            vec!["a", "NULL", "b"]
        );
        assert!(coercer.elements("1;x", &array(ValueType::Int)).is_err());
    }

    #[test]
    fn test_custom_array_delimiter() {
        let options = ConvertOptions::default().with_array_delimiter('|');
        let mut coercer = Coercer::new(&options);
        assert_eq!(
            coercer.elements("x|y", &array(ValueType::String)).unwrap(),
            vec!["x", "y"]
        );
    }
}
