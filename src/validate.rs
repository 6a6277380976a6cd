use std::num::IntErrorKind;

use chrono_tz::TZ_VARIANTS;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::models::FieldKind;
use crate::models::PrefValue;
use crate::models::TimeOfDay;

static TIME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{2}:\d{2}$").expect("valid regex"));
static OFFSET_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,\s]+").expect("valid regex"));

pub const MAX_REMINDER_OFFSETS: usize = 5;
pub const MAX_OFFSET_MINUTES: u16 = 24 * 60;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("time must be written as HH:MM with a colon, for example 08:30")]
  MalformedTime,
  #[error("hours and minutes must be numbers")]
  NonNumericTime,
  #[error("hour {0} is out of range, use 00-23")]
  HourOutOfRange(u32),
  #[error("minute {0} is out of range, use 00-59")]
  MinuteOutOfRange(u32),
  #[error("'{0}' is not a recognized timezone")]
  UnknownTimezone(String),
  #[error("send at least one reminder time")]
  NoOffsets,
  #[error("'{0}' is not a number of minutes")]
  NonNumericOffset(String),
  #[error("reminders must be between 1 and {MAX_OFFSET_MINUTES} minutes before the shift, got {0}")]
  OffsetOutOfRange(String),
  #[error("at most {MAX_REMINDER_OFFSETS} reminder times are supported")]
  TooManyOffsets,
  #[error("expected on or off")]
  InvalidToggle,
}

pub fn validate(kind: FieldKind, raw: &str) -> Result<PrefValue, ValidationError> {
  match kind {
    FieldKind::TimeOfDay => validate_time(raw).map(PrefValue::Time),
    FieldKind::MinuteOffsets => validate_offsets(raw).map(PrefValue::Offsets),
    FieldKind::Toggle => validate_toggle(raw).map(PrefValue::Toggle),
    FieldKind::Timezone => validate_timezone(raw).map(PrefValue::Zone),
  }
}

pub fn validate_time(raw: &str) -> Result<TimeOfDay, ValidationError> {
  let input = raw.trim();
  let Some((hours, minutes)) = input.split_once(':') else {
    return Err(ValidationError::MalformedTime);
  };
  if minutes.contains(':') {
    return Err(ValidationError::MalformedTime);
  }

  let numeric = |part: &str| part.chars().all(|c| c.is_ascii_digit());
  if !numeric(hours) || !numeric(minutes) {
    return Err(ValidationError::NonNumericTime);
  }
  if !TIME_PATTERN.is_match(input) {
    return Err(ValidationError::MalformedTime);
  }

  let hour: u32 = hours.parse().map_err(|_| ValidationError::NonNumericTime)?;
  let minute: u32 = minutes.parse().map_err(|_| ValidationError::NonNumericTime)?;
  if hour > 23 {
    return Err(ValidationError::HourOutOfRange(hour));
  }
  if minute > 59 {
    return Err(ValidationError::MinuteOutOfRange(minute));
  }
  TimeOfDay::new(hour as u8, minute as u8).ok_or(ValidationError::MalformedTime)
}

/// Accepts any canonical IANA zone name, ignoring ASCII case.
pub fn validate_timezone(raw: &str) -> Result<Tz, ValidationError> {
  let input = raw.trim();
  if let Ok(tz) = input.parse::<Tz>() {
    return Ok(tz);
  }
  TZ_VARIANTS
    .iter()
    .find(|tz| tz.name().eq_ignore_ascii_case(input))
    .copied()
    .ok_or_else(|| ValidationError::UnknownTimezone(input.to_string()))
}

/// Minutes-before-shift list, deduplicated and ordered largest first.
pub fn validate_offsets(raw: &str) -> Result<Vec<u16>, ValidationError> {
  let mut offsets = Vec::new();
  for part in OFFSET_SEPARATOR.split(raw.trim()).filter(|part| !part.is_empty()) {
    let minutes = match part.parse::<u16>() {
      Ok(minutes) if (1 ..= MAX_OFFSET_MINUTES).contains(&minutes) => minutes,
      Ok(_) => return Err(ValidationError::OffsetOutOfRange(part.to_string())),
      Err(err) if *err.kind() == IntErrorKind::PosOverflow => {
        return Err(ValidationError::OffsetOutOfRange(part.to_string()));
      },
      Err(_) => return Err(ValidationError::NonNumericOffset(part.to_string())),
    };
    offsets.push(minutes);
  }

  if offsets.is_empty() {
    return Err(ValidationError::NoOffsets);
  }
  offsets.sort_unstable_by(|a, b| b.cmp(a));
  offsets.dedup();
  if offsets.len() > MAX_REMINDER_OFFSETS {
    return Err(ValidationError::TooManyOffsets);
  }
  Ok(offsets)
}

pub fn validate_toggle(raw: &str) -> Result<bool, ValidationError> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "on" | "true" | "yes" => Ok(true),
    "off" | "false" | "no" => Ok(false),
    _ => Err(ValidationError::InvalidToggle),
  }
}
