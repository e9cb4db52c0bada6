//! Field checks shared by the typed form structs.
//!
//! Each form collects every problem before giving up so the client can show
//! all field messages at once.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use std::str::FromStr;

use crate::internal_error::{FieldError, InternalError, InternalResult};

const REQUIRED: &str = "This field is required.";

#[derive(Default, Debug)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Validator {
        Validator::default()
    }

    pub fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    /// Trims `value` and checks it is present and at most `max_len` characters.
    pub fn required_text(&mut self, field: &'static str, value: &str, max_len: usize) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.error(field, REQUIRED);
        } else {
            self.check_length(field, value, max_len);
        }
        value.to_string()
    }

    pub fn optional_text(&mut self, field: &'static str, value: &str, max_len: usize) -> String {
        let value = value.trim();
        self.check_length(field, value, max_len);
        value.to_string()
    }

    fn check_length(&mut self, field: &'static str, value: &str, max_len: usize) {
        let len = value.chars().count();
        if len > max_len {
            self.error(
                field,
                format!(
                    "Ensure this value has at most {} characters (it has {}).",
                    max_len, len
                ),
            );
        }
    }

    /// Parses an optional `YYYY-MM-DD` value; blank input counts as absent.
    pub fn optional_date(&mut self, field: &'static str, value: Option<&str>) -> Option<NaiveDate> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.error(field, "Enter a valid date.");
                None
            }
        }
    }

    pub fn not_before(
        &mut self,
        field: &'static str,
        date: Option<NaiveDate>,
        today: NaiveDate,
        message: &str,
    ) {
        if matches!(date, Some(date) if date < today) {
            self.error(field, message);
        }
    }

    pub fn not_after(
        &mut self,
        field: &'static str,
        date: Option<NaiveDate>,
        today: NaiveDate,
        message: &str,
    ) {
        if matches!(date, Some(date) if date > today) {
            self.error(field, message);
        }
    }

    /// Parses a decimal with at most `max_digits` digits of which
    /// `decimal_places` follow the point.
    pub fn decimal(
        &mut self,
        field: &'static str,
        value: &str,
        max_digits: u32,
        decimal_places: u32,
    ) -> Option<Decimal> {
        let value = value.trim();
        if value.is_empty() {
            self.error(field, REQUIRED);
            return None;
        }

        let parsed = match Decimal::from_str(value) {
            Ok(parsed) => parsed.normalize(),
            Err(_) => {
                self.error(field, "Enter a number.");
                return None;
            }
        };

        let before_point = max_digits - decimal_places;
        if parsed.scale() > decimal_places {
            self.error(
                field,
                format!(
                    "Ensure that there are no more than {} decimal places.",
                    decimal_places
                ),
            );
            None
        } else if parsed.abs() >= Decimal::from(10i64.pow(before_point)) {
            self.error(
                field,
                format!(
                    "Ensure that there are no more than {} digits in total.",
                    max_digits
                ),
            );
            None
        } else {
            Some(parsed)
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Hands back `value` if no field was rejected.
    pub fn finish<T>(self, value: T) -> InternalResult<T> {
        if self.errors.is_empty() {
            Ok(value)
        } else {
            Err(InternalError::Validation(self.errors))
        }
    }
}
