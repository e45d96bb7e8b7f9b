//! Merchant order id codec.
//!
//! The checkout flow hands iPaymu a reference of the form
//! `sessionPrefix-userId-courseId-instanceId`; the callback echoes it back
//! and this is the only place it is taken apart.

use std::fmt;
use std::str::FromStr;

use crate::error::CallbackError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderReference {
    pub prefix: String,
    pub user_id: i64,
    pub course_id: i64,
    pub instance_id: i64,
}

impl OrderReference {
    pub fn new(prefix: impl Into<String>, user_id: i64, course_id: i64, instance_id: i64) -> Self {
        Self {
            prefix: prefix.into(),
            user_id,
            course_id,
            instance_id,
        }
    }

    pub fn parse(reference: &str) -> Result<Self, CallbackError> {
        let fields: Vec<&str> = reference.split('-').collect();

        let [prefix, user, course, instance] = fields.as_slice() else {
            return Err(CallbackError::MalformedReference(format!(
                "expected 4 dash-separated fields, got {} in '{}'",
                fields.len(),
                reference
            )));
        };

        Ok(Self {
            prefix: (*prefix).to_string(),
            user_id: parse_id(user, "user id", reference)?,
            course_id: parse_id(course, "course id", reference)?,
            instance_id: parse_id(instance, "instance id", reference)?,
        })
    }
}

fn parse_id(field: &str, name: &str, reference: &str) -> Result<i64, CallbackError> {
    let malformed =
        || CallbackError::MalformedReference(format!("invalid {} '{}' in '{}'", name, field, reference));

    // i64::from_str also accepts a leading '+', which the checkout never emits.
    if field.is_empty() || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }

    match field.parse::<i64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(malformed()),
    }
}

impl FromStr for OrderReference {
    type Err = CallbackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for OrderReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.prefix, self.user_id, self.course_id, self.instance_id
        )
    }
}
