use std::collections::HashMap;

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

pub const FALLBACK_GREETING: &str = "Hello, how can I help you today?";
pub const DEFAULT_APPOINTMENT_MINUTES: u32 = 60;

const WEEK: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProfileError {
    #[error("invalid weekday: {0}")]
    InvalidWeekday(String),

    #[error("invalid business hours for {day}: {value}")]
    InvalidHours { day: String, value: String },

    #[error("business hours for {day} close before they open")]
    CloseBeforeOpen { day: String },

    #[error("appointment scheduling is enabled but no calendar is configured")]
    MissingCalendar,

    #[error("appointment duration must be positive")]
    InvalidDuration,
}

/// Opening rule for a single weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaySchedule {
    /// Nothing configured; slot generation falls back to 09:00-17:00.
    Unspecified,
    Closed,
    Open { open: NaiveTime, close: NaiveTime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    days: [DaySchedule; 7],
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            days: [DaySchedule::Unspecified; 7],
        }
    }
}

impl BusinessHours {
    pub fn get(&self, day: Weekday) -> DaySchedule {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn set(&mut self, day: Weekday, schedule: DaySchedule) {
        self.days[day.num_days_from_monday() as usize] = schedule;
    }

    pub fn with(mut self, day: Weekday, schedule: DaySchedule) -> Self {
        self.set(day, schedule);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.days.iter().all(|d| *d == DaySchedule::Unspecified)
    }

    pub fn to_human_readable(&self) -> String {
        WEEK.iter()
            .filter_map(|day| {
                let hours = match self.get(*day) {
                    DaySchedule::Unspecified => return None,
                    DaySchedule::Closed => "Closed".to_string(),
                    DaySchedule::Open { open, close } => {
                        format!("{} - {}", format_clock(open), format_clock(close))
                    }
                };
                Some(format!("{}: {hours}", weekday_name(*day)))
            })
            .collect::<Vec<_>>()
            .join(". ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Faq {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentSettings {
    pub enabled: bool,
    pub calendar_ref: String,
    pub duration_minutes: u32,
}

impl Default for AppointmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            calendar_ref: String::new(),
            duration_minutes: DEFAULT_APPOINTMENT_MINUTES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransferSettings {
    pub keywords: Vec<String>,
    pub transfer_number: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub sms: Option<String>,
}

/// Validated, read-only view of a business for the duration of a call.
#[derive(Debug, Clone, PartialEq)]
pub struct BusinessProfile {
    pub business_id: String,
    pub name: String,
    pub greeting: String,
    pub business_hours: BusinessHours,
    pub services: Vec<String>,
    pub faqs: Vec<Faq>,
    pub appointment: AppointmentSettings,
    pub transfer: TransferSettings,
    pub notification: NotificationSettings,
}

impl BusinessProfile {
    /// Profile used when the store has nothing (or fails) for a business.
    pub fn minimal(business_id: &str) -> Self {
        Self {
            business_id: business_id.to_string(),
            name: "our business".to_string(),
            greeting: FALLBACK_GREETING.to_string(),
            business_hours: BusinessHours::default(),
            services: Vec::new(),
            faqs: Vec::new(),
            appointment: AppointmentSettings::default(),
            transfer: TransferSettings::default(),
            notification: NotificationSettings::default(),
        }
    }

    pub fn from_document(business_id: &str, doc: ProfileDocument) -> Result<Self, ProfileError> {
        let mut business_hours = BusinessHours::default();
        for (day, value) in &doc.business_hours {
            let weekday: Weekday = day
                .trim()
                .parse()
                .map_err(|_| ProfileError::InvalidWeekday(day.clone()))?;
            business_hours.set(weekday, parse_day_schedule(day, value)?);
        }

        let appointment = match doc.appointment {
            Some(a) => {
                let duration_minutes = a.duration_minutes.unwrap_or(DEFAULT_APPOINTMENT_MINUTES);
                if duration_minutes == 0 {
                    return Err(ProfileError::InvalidDuration);
                }
                let calendar_ref = a.calendar_ref.unwrap_or_default();
                if a.enabled && calendar_ref.trim().is_empty() {
                    return Err(ProfileError::MissingCalendar);
                }
                AppointmentSettings {
                    enabled: a.enabled,
                    calendar_ref,
                    duration_minutes,
                }
            }
            None => AppointmentSettings::default(),
        };

        let transfer = doc
            .transfer
            .map(|t| TransferSettings {
                keywords: t
                    .keywords
                    .into_iter()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
                    .collect(),
                transfer_number: t.transfer_number.filter(|n| !n.trim().is_empty()),
            })
            .unwrap_or_default();

        Ok(Self {
            business_id: business_id.to_string(),
            name: doc
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| "our business".to_string()),
            greeting: doc
                .greeting
                .filter(|g| !g.trim().is_empty())
                .unwrap_or_else(|| FALLBACK_GREETING.to_string()),
            business_hours,
            services: doc.services,
            faqs: doc.faqs,
            appointment,
            transfer,
            notification: doc.notification.unwrap_or_default(),
        })
    }

    pub fn from_json(business_id: &str, json: &str) -> anyhow::Result<Self> {
        let doc: ProfileDocument = serde_json::from_str(json)?;
        Ok(Self::from_document(business_id, doc)?)
    }
}

// ── Stored document shape ──

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileDocument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub greeting: Option<String>,
    #[serde(default)]
    pub business_hours: HashMap<String, HoursValue>,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub faqs: Vec<Faq>,
    #[serde(default)]
    pub appointment: Option<AppointmentDocument>,
    #[serde(default)]
    pub transfer: Option<TransferDocument>,
    #[serde(default)]
    pub notification: Option<NotificationSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HoursValue {
    Text(String),
    Range { open: String, close: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentDocument {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub calendar_ref: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferDocument {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub transfer_number: Option<String>,
}

fn parse_day_schedule(day: &str, value: &HoursValue) -> Result<DaySchedule, ProfileError> {
    let invalid = |raw: &str| ProfileError::InvalidHours {
        day: day.to_string(),
        value: raw.to_string(),
    };

    let (open, close) = match value {
        HoursValue::Text(text) if text.trim().eq_ignore_ascii_case("closed") => {
            return Ok(DaySchedule::Closed);
        }
        HoursValue::Text(text) => {
            let normalized = text.replace('–', "-");
            let (open, close) = normalized.split_once('-').ok_or_else(|| invalid(text))?;
            (
                parse_clock(open).ok_or_else(|| invalid(text))?,
                parse_clock(close).ok_or_else(|| invalid(text))?,
            )
        }
        HoursValue::Range { open, close } => (
            parse_clock(open).ok_or_else(|| invalid(open))?,
            parse_clock(close).ok_or_else(|| invalid(close))?,
        ),
    };

    if open >= close {
        return Err(ProfileError::CloseBeforeOpen {
            day: day.to_string(),
        });
    }
    Ok(DaySchedule::Open { open, close })
}

/// Parses "9:00 AM", "9am", "5:30 p.m." or 24-hour "17:00".
pub fn parse_clock(raw: &str) -> Option<NaiveTime> {
    let s = raw.trim().to_ascii_lowercase().replace('.', "");
    let (body, pm) = if let Some(b) = s.strip_suffix("am") {
        (b.trim(), Some(false))
    } else if let Some(b) = s.strip_suffix("pm") {
        (b.trim(), Some(true))
    } else {
        (s.as_str(), None)
    };

    let (hour, minute) = match body.split_once(':') {
        Some((h, m)) => (h.trim().parse::<u32>().ok()?, m.trim().parse::<u32>().ok()?),
        None => (body.parse::<u32>().ok()?, 0),
    };

    let hour = match pm {
        Some(pm) => {
            if hour == 0 || hour > 12 {
                return None;
            }
            hour % 12 + if pm { 12 } else { 0 }
        }
        None => hour,
    };
    NaiveTime::from_hms_opt(hour, minute, 0)
}

pub fn format_clock(t: NaiveTime) -> String {
    t.format("%-I:%M %p").to_string()
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
