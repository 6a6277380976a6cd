use std::fmt;

use chrono::NaiveTime;
use chrono::TimeDelta;
use chrono_tz::Tz;

pub type UserId = i64; // tg id

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
  ShiftTimes,
  Reminders,
  Timezone,
}

impl Category {
  pub const ALL: [Category; 3] = [Category::ShiftTimes, Category::Reminders, Category::Timezone];

  pub fn namespace(self) -> &'static str {
    match self {
      Self::ShiftTimes => "shift_times",
      Self::Reminders => "reminders",
      Self::Timezone => "timezone",
    }
  }

  pub fn from_namespace(namespace: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|category| category.namespace() == namespace)
  }

  pub fn title(self) -> &'static str {
    match self {
      Self::ShiftTimes => "⏰ Shift times",
      Self::Reminders => "🔔 Reminders",
      Self::Timezone => "🌍 Timezone",
    }
  }

  pub fn fields(self) -> &'static [Field] {
    match self {
      Self::ShiftTimes => &[
        Field::MorningStart,
        Field::MorningEnd,
        Field::NoonStart,
        Field::NoonEnd,
        Field::EveningStart,
        Field::EveningEnd,
      ],
      Self::Reminders => &[Field::ReminderOffsets, Field::RemindersEnabled, Field::ReminderSound],
      Self::Timezone => &[Field::Timezone],
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
  TimeOfDay,
  MinuteOffsets,
  Toggle,
  Timezone,
}

impl FieldKind {
  /// Expected input format, shown to the user after a rejected value.
  pub fn format_hint(self) -> &'static str {
    match self {
      Self::TimeOfDay => "Send the time as HH:MM in 24-hour format, for example 08:30.",
      Self::MinuteOffsets => "Send minutes before the shift separated by commas, for example 30, 15.",
      Self::Toggle => "Send on or off.",
      Self::Timezone => "Send a timezone name such as Europe/London or America/New_York.",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shift {
  Morning,
  Noon,
  Evening,
}

impl Shift {
  pub const ALL: [Shift; 3] = [Shift::Morning, Shift::Noon, Shift::Evening];

  pub fn key(self) -> &'static str {
    match self {
      Self::Morning => "morning",
      Self::Noon => "noon",
      Self::Evening => "evening",
    }
  }

  pub fn label(self) -> &'static str {
    match self {
      Self::Morning => "Morning",
      Self::Noon => "Noon",
      Self::Evening => "Evening",
    }
  }

  pub fn emoji(self) -> &'static str {
    match self {
      Self::Morning => "🌅",
      Self::Noon => "🌇",
      Self::Evening => "🌆",
    }
  }

  pub fn start_field(self) -> Field {
    match self {
      Self::Morning => Field::MorningStart,
      Self::Noon => Field::NoonStart,
      Self::Evening => Field::EveningStart,
    }
  }

  pub fn end_field(self) -> Field {
    match self {
      Self::Morning => Field::MorningEnd,
      Self::Noon => Field::NoonEnd,
      Self::Evening => Field::EveningEnd,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
  MorningStart,
  MorningEnd,
  NoonStart,
  NoonEnd,
  EveningStart,
  EveningEnd,
  ReminderOffsets,
  RemindersEnabled,
  ReminderSound,
  Timezone,
}

impl Field {
  pub const ALL: [Field; 10] = [
    Field::MorningStart,
    Field::MorningEnd,
    Field::NoonStart,
    Field::NoonEnd,
    Field::EveningStart,
    Field::EveningEnd,
    Field::ReminderOffsets,
    Field::RemindersEnabled,
    Field::ReminderSound,
    Field::Timezone,
  ];

  /// Storage key, also used in `edit_<key>` callback actions.
  pub fn key(self) -> &'static str {
    match self {
      Self::MorningStart => "morning_start",
      Self::MorningEnd => "morning_end",
      Self::NoonStart => "noon_start",
      Self::NoonEnd => "noon_end",
      Self::EveningStart => "evening_start",
      Self::EveningEnd => "evening_end",
      Self::ReminderOffsets => "reminder_offsets",
      Self::RemindersEnabled => "reminders_enabled",
      Self::ReminderSound => "reminder_sound",
      Self::Timezone => "timezone",
    }
  }

  pub fn from_key(key: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|field| field.key() == key)
  }

  pub fn category(self) -> Category {
    match self {
      Self::MorningStart | Self::MorningEnd | Self::NoonStart | Self::NoonEnd | Self::EveningStart | Self::EveningEnd => {
        Category::ShiftTimes
      },
      Self::ReminderOffsets | Self::RemindersEnabled | Self::ReminderSound => Category::Reminders,
      Self::Timezone => Category::Timezone,
    }
  }

  pub fn kind(self) -> FieldKind {
    match self {
      Self::ReminderOffsets => FieldKind::MinuteOffsets,
      Self::RemindersEnabled | Self::ReminderSound => FieldKind::Toggle,
      Self::Timezone => FieldKind::Timezone,
      _ => FieldKind::TimeOfDay,
    }
  }

  /// Toggles are flipped by buttons and never wait for a text reply.
  pub fn is_text_editable(self) -> bool {
    self.kind() != FieldKind::Toggle
  }

  pub fn shift(self) -> Option<Shift> {
    match self {
      Self::MorningStart | Self::MorningEnd => Some(Shift::Morning),
      Self::NoonStart | Self::NoonEnd => Some(Shift::Noon),
      Self::EveningStart | Self::EveningEnd => Some(Shift::Evening),
      _ => None,
    }
  }

  pub fn label(self) -> String {
    match self {
      Self::MorningStart | Self::NoonStart | Self::EveningStart => {
        format!("{} shift start", self.shift().map(Shift::label).unwrap_or_default())
      },
      Self::MorningEnd | Self::NoonEnd | Self::EveningEnd => {
        format!("{} shift end", self.shift().map(Shift::label).unwrap_or_default())
      },
      Self::ReminderOffsets => "Reminder times".to_string(),
      Self::RemindersEnabled => "Reminders".to_string(),
      Self::ReminderSound => "Reminder sound".to_string(),
      Self::Timezone => "Timezone".to_string(),
    }
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.key())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimeOfDay {
  pub hour: u8,
  pub minute: u8,
}

impl TimeOfDay {
  pub fn new(hour: u8, minute: u8) -> Option<Self> {
    (hour < 24 && minute < 60).then_some(Self { hour, minute })
  }

  pub fn as_naive(self) -> NaiveTime {
    NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0).unwrap_or(NaiveTime::MIN)
  }
}

impl fmt::Display for TimeOfDay {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:02}:{:02}", self.hour, self.minute)
  }
}

/// Length of a shift window; an end before the start wraps past midnight.
pub fn shift_length(start: TimeOfDay, end: TimeOfDay) -> TimeDelta {
  let span = end.as_naive() - start.as_naive();
  if end < start { span + TimeDelta::days(1) } else { span }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefValue {
  Time(TimeOfDay),
  Offsets(Vec<u16>),
  Toggle(bool),
  Zone(Tz),
}

impl PrefValue {
  /// Canonical text form, as persisted and as accepted back by the validators.
  pub fn to_stored(&self) -> String {
    match self {
      Self::Time(time) => time.to_string(),
      Self::Offsets(minutes) => minutes.iter().map(u16::to_string).collect::<Vec<_>>().join(","),
      Self::Toggle(flag) => flag.to_string(),
      Self::Zone(tz) => tz.name().to_string(),
    }
  }

  pub fn as_time(&self) -> Option<TimeOfDay> {
    match self {
      Self::Time(time) => Some(*time),
      _ => None,
    }
  }

  pub fn as_offsets(&self) -> Option<&[u16]> {
    match self {
      Self::Offsets(minutes) => Some(minutes),
      _ => None,
    }
  }

  pub fn as_toggle(&self) -> Option<bool> {
    match self {
      Self::Toggle(flag) => Some(*flag),
      _ => None,
    }
  }

  pub fn as_zone(&self) -> Option<Tz> {
    match self {
      Self::Zone(tz) => Some(*tz),
      _ => None,
    }
  }
}

impl fmt::Display for PrefValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Time(time) => write!(f, "{time}"),
      Self::Offsets(minutes) if minutes.is_empty() => f.write_str("none"),
      Self::Offsets(minutes) => {
        let rendered = minutes.iter().map(|m| format!("{m} min")).collect::<Vec<_>>().join(", ");
        f.write_str(&rendered)
      },
      Self::Toggle(true) => f.write_str("on"),
      Self::Toggle(false) => f.write_str("off"),
      Self::Zone(tz) => f.write_str(tz.name()),
    }
  }
}

/// Values a user gets for every field they never edited.
#[derive(Debug, Clone)]
pub struct Defaults {
  pub timezone: Tz,
}

impl Default for Defaults {
  fn default() -> Self {
    Self {
      timezone: chrono_tz::Asia::Jerusalem,
    }
  }
}

impl Defaults {
  pub fn value_for(&self, field: Field) -> PrefValue {
    let time = |hour| PrefValue::Time(TimeOfDay { hour, minute: 0 });
    match field {
      Field::MorningStart => time(8),
      Field::MorningEnd => time(16),
      Field::NoonStart => time(12),
      Field::NoonEnd => time(20),
      Field::EveningStart => time(16),
      Field::EveningEnd => time(0),
      Field::ReminderOffsets => PrefValue::Offsets(vec![30, 15]),
      Field::RemindersEnabled | Field::ReminderSound => PrefValue::Toggle(true),
      Field::Timezone => PrefValue::Zone(self.timezone),
    }
  }
}
