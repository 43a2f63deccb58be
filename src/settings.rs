use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

const MS_PER_SECOND: i64 = 1000;
const MS_PER_MINUTE: i64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: i64 = 60 * MS_PER_MINUTE;

/// Durations a run is started with. Fixed for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSettings {
    pub target_duration_ms: i64,
    pub threshold_duration_ms: i64,
}

impl TimerSettings {
    pub fn new(target: DurationFields, threshold: DurationFields) -> Result<Self, SettingsError> {
        if target.is_zero() {
            return Err(SettingsError::MissingTarget);
        }
        if threshold.is_zero() {
            return Err(SettingsError::MissingThreshold);
        }
        Ok(Self {
            target_duration_ms: target.to_ms(),
            threshold_duration_ms: threshold.to_ms(),
        })
    }
}

/// An hours/minutes/seconds triple as entered by the user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationFields {
    pub hours: u32,
    pub minutes: u32,
    pub seconds: u32,
}

impl DurationFields {
    pub fn new(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self {
            hours,
            minutes,
            seconds,
        }
    }

    pub fn to_ms(&self) -> i64 {
        self.hours as i64 * MS_PER_HOUR
            + self.minutes as i64 * MS_PER_MINUTE
            + self.seconds as i64 * MS_PER_SECOND
    }

    /// Inverse of [`DurationFields::to_ms`] for durations under a day;
    /// sub-second remainders are dropped.
    pub fn from_ms(ms: i64) -> Self {
        let ms = ms.max(0);
        Self {
            hours: ((ms / MS_PER_HOUR) % 24) as u32,
            minutes: ((ms % MS_PER_HOUR) / MS_PER_MINUTE) as u32,
            seconds: ((ms % MS_PER_MINUTE) / MS_PER_SECOND) as u32,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.hours == 0 && self.minutes == 0 && self.seconds == 0
    }
}

impl DurationFields {
    /// Parse `HH:MM:SS` as the target duration.
    pub fn parse_target(s: &str) -> Result<Self, SettingsError> {
        Self::parse_hms(s, SettingsField::TARGET)
    }

    /// Parse `HH:MM:SS` as the lap threshold.
    pub fn parse_threshold(s: &str) -> Result<Self, SettingsError> {
        Self::parse_hms(s, SettingsField::THRESHOLD)
    }

    /// Errors name the hours, minutes or seconds input of `fields`, with the
    /// same range rules as the settings form.
    fn parse_hms(s: &str, fields: [SettingsField; 3]) -> Result<Self, SettingsError> {
        let [hours_field, minutes_field, seconds_field] = fields;
        let parts: Vec<&str> = s.split(':').collect();
        let [h, m, sec] = parts.as_slice() else {
            return Err(SettingsError::NotANumber { field: hours_field });
        };
        Ok(Self {
            hours: parse_field(hours_field, h)?,
            minutes: parse_field(minutes_field, m)?,
            seconds: parse_field(seconds_field, sec)?,
        })
    }
}

/// The six settings inputs, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum SettingsField {
    #[strum(serialize = "target_hours")]
    TargetHours,
    #[strum(serialize = "target_minutes")]
    TargetMinutes,
    #[strum(serialize = "target_seconds")]
    TargetSeconds,
    #[strum(serialize = "threshold_hours")]
    ThresholdHours,
    #[strum(serialize = "threshold_minutes")]
    ThresholdMinutes,
    #[strum(serialize = "threshold_seconds")]
    ThresholdSeconds,
}

impl SettingsField {
    pub const ALL: [SettingsField; 6] = [
        SettingsField::TargetHours,
        SettingsField::TargetMinutes,
        SettingsField::TargetSeconds,
        SettingsField::ThresholdHours,
        SettingsField::ThresholdMinutes,
        SettingsField::ThresholdSeconds,
    ];
    pub const TARGET: [SettingsField; 3] = [
        SettingsField::TargetHours,
        SettingsField::TargetMinutes,
        SettingsField::TargetSeconds,
    ];
    pub const THRESHOLD: [SettingsField; 3] = [
        SettingsField::ThresholdHours,
        SettingsField::ThresholdMinutes,
        SettingsField::ThresholdSeconds,
    ];

    pub fn max(&self) -> u32 {
        match self {
            Self::TargetHours | Self::ThresholdHours => 23,
            _ => 59,
        }
    }

    pub fn is_target(&self) -> bool {
        matches!(
            self,
            Self::TargetHours | Self::TargetMinutes | Self::TargetSeconds
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TargetHours | Self::ThresholdHours => "Hours",
            Self::TargetMinutes | Self::ThresholdMinutes => "Minutes",
            Self::TargetSeconds | Self::ThresholdSeconds => "Seconds",
        }
    }

    fn index(&self) -> usize {
        Self::ALL.iter().position(|f| f == self).unwrap_or(0)
    }
}

/// Validate one field's raw text. Empty text counts as zero.
pub fn parse_field(field: SettingsField, text: &str) -> Result<u32, SettingsError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    let value: i64 = text
        .parse()
        .map_err(|_| SettingsError::NotANumber { field })?;
    if value < 0 || value > field.max() as i64 {
        return Err(SettingsError::OutOfRange {
            field,
            max: field.max(),
        });
    }
    Ok(value as u32)
}

/// Numeric settings input as handed over by the settings form.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsInput {
    pub target_hours: u32,
    pub target_minutes: u32,
    pub target_seconds: u32,
    pub threshold_hours: u32,
    pub threshold_minutes: u32,
    pub threshold_seconds: u32,
}

impl SettingsInput {
    pub fn from_fields(target: DurationFields, threshold: DurationFields) -> Self {
        Self {
            target_hours: target.hours,
            target_minutes: target.minutes,
            target_seconds: target.seconds,
            threshold_hours: threshold.hours,
            threshold_minutes: threshold.minutes,
            threshold_seconds: threshold.seconds,
        }
    }

    pub fn from_settings(settings: &TimerSettings) -> Self {
        Self::from_fields(
            DurationFields::from_ms(settings.target_duration_ms),
            DurationFields::from_ms(settings.threshold_duration_ms),
        )
    }

    pub fn get(&self, field: SettingsField) -> u32 {
        match field {
            SettingsField::TargetHours => self.target_hours,
            SettingsField::TargetMinutes => self.target_minutes,
            SettingsField::TargetSeconds => self.target_seconds,
            SettingsField::ThresholdHours => self.threshold_hours,
            SettingsField::ThresholdMinutes => self.threshold_minutes,
            SettingsField::ThresholdSeconds => self.threshold_seconds,
        }
    }

    pub fn set(&mut self, field: SettingsField, value: u32) {
        let slot = match field {
            SettingsField::TargetHours => &mut self.target_hours,
            SettingsField::TargetMinutes => &mut self.target_minutes,
            SettingsField::TargetSeconds => &mut self.target_seconds,
            SettingsField::ThresholdHours => &mut self.threshold_hours,
            SettingsField::ThresholdMinutes => &mut self.threshold_minutes,
            SettingsField::ThresholdSeconds => &mut self.threshold_seconds,
        };
        *slot = value;
    }

    pub fn target(&self) -> DurationFields {
        DurationFields::new(self.target_hours, self.target_minutes, self.target_seconds)
    }

    pub fn threshold(&self) -> DurationFields {
        DurationFields::new(
            self.threshold_hours,
            self.threshold_minutes,
            self.threshold_seconds,
        )
    }

    /// Range-check every field, then convert to millisecond settings.
    pub fn to_settings(&self) -> Result<TimerSettings, SettingsError> {
        for field in SettingsField::ALL {
            if self.get(field) > field.max() {
                return Err(SettingsError::OutOfRange {
                    field,
                    max: field.max(),
                });
            }
        }
        TimerSettings::new(self.target(), self.threshold())
    }
}

/// Editable state of the settings screen.
#[derive(Debug, Clone)]
pub struct SettingsForm {
    input: SettingsInput,
    texts: [String; 6],
    focus: usize,
    target_error: Option<String>,
    threshold_error: Option<String>,
}

impl Default for SettingsForm {
    fn default() -> Self {
        Self::new(SettingsInput::default())
    }
}

impl SettingsForm {
    pub fn new(input: SettingsInput) -> Self {
        Self {
            texts: SettingsField::ALL.map(|f| format!("{:02}", input.get(f))),
            input,
            focus: 0,
            target_error: None,
            threshold_error: None,
        }
    }

    pub fn input(&self) -> &SettingsInput {
        &self.input
    }

    pub fn text(&self, field: SettingsField) -> &str {
        &self.texts[field.index()]
    }

    pub fn focused(&self) -> SettingsField {
        SettingsField::ALL[self.focus]
    }

    pub fn target_error(&self) -> Option<&str> {
        self.target_error.as_deref()
    }

    pub fn threshold_error(&self) -> Option<&str> {
        self.threshold_error.as_deref()
    }

    pub fn focus_next(&mut self) {
        self.blur();
        self.focus = (self.focus + 1) % SettingsField::ALL.len();
    }

    pub fn focus_prev(&mut self) {
        self.blur();
        self.focus = (self.focus + SettingsField::ALL.len() - 1) % SettingsField::ALL.len();
    }

    /// Append a character to the focused field (at most two characters).
    pub fn type_char(&mut self, c: char) {
        let text = &mut self.texts[self.focus];
        if text.chars().count() >= 2 {
            return;
        }
        text.push(c);
        let _ = self.revalidate(self.focused());
    }

    pub fn backspace(&mut self) {
        self.texts[self.focus].pop();
        let _ = self.revalidate(self.focused());
    }

    /// Replace a field's text wholesale and validate it.
    pub fn set_text(&mut self, field: SettingsField, text: &str) -> Result<u32, SettingsError> {
        self.texts[field.index()] = text.to_string();
        self.revalidate(field)
    }

    /// Validate the field's text. On success the value is taken and both
    /// messages are cleared; on failure the message goes to the field's
    /// group and the last good value is kept.
    fn revalidate(&mut self, field: SettingsField) -> Result<u32, SettingsError> {
        self.target_error = None;
        self.threshold_error = None;

        let result = parse_field(field, &self.texts[field.index()]);
        match &result {
            Ok(value) => self.input.set(field, *value),
            Err(err) if field.is_target() => self.target_error = Some(err.to_string()),
            Err(err) => self.threshold_error = Some(err.to_string()),
        }
        result
    }

    /// Zero-pad a single digit when focus leaves the field.
    fn blur(&mut self) {
        let text = &mut self.texts[self.focus];
        if text.len() == 1 {
            text.insert(0, '0');
        }
    }

    pub fn submit(&self) -> Result<TimerSettings, SettingsError> {
        self.input.to_settings()
    }
}
