use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::errors::AppError;
use crate::models::profile::parse_clock;
use crate::models::{
    Attendee, BookingResult, BusinessHours, BusinessProfile, CalendarEvent, CallerDetails,
    DaySchedule, Interval, Slot,
};
use crate::services::calendar::CalendarProvider;
use crate::services::clock::Clock;

/// Most slots offered to a caller in one go.
pub const SUGGESTION_LIMIT: usize = 5;

/// Hours assumed for a weekday the profile says nothing about.
const DEFAULT_OPEN: (u32, u32) = (9, 0);
const DEFAULT_CLOSE: (u32, u32) = (17, 0);

/// Longest date range a single availability search may cover.
pub const MAX_WINDOW_DAYS: i64 = 62;

/// Inclusive date range to search, optionally narrowed to a time of day on every date.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotWindow {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub daily_range: Option<(NaiveTime, NaiveTime)>,
}

impl SlotWindow {
    pub fn single_day(date: NaiveDate) -> Self {
        Self {
            start_date: date,
            end_date: date,
            daily_range: None,
        }
    }
}

pub struct Scheduler {
    calendar: Arc<dyn CalendarProvider>,
    clock: Arc<dyn Clock>,
    timeout: std::time::Duration,
    // Held from the availability check until the event exists.
    booking: tokio::sync::Mutex<()>,
}

impl Scheduler {
    pub fn new(
        calendar: Arc<dyn CalendarProvider>,
        clock: Arc<dyn Clock>,
        timeout: std::time::Duration,
    ) -> Self {
        Self {
            calendar,
            clock,
            timeout,
            booking: tokio::sync::Mutex::new(()),
        }
    }

    pub fn now(&self) -> NaiveDateTime {
        self.clock.now()
    }

    /// Free, non-overlapping slots of `duration_minutes` inside business hours, in
    /// chronological order. Slots that have already started are left out.
    pub async fn generate_slots(
        &self,
        calendar_ref: &str,
        window: &SlotWindow,
        duration_minutes: u32,
        hours: &BusinessHours,
    ) -> Result<Vec<Slot>, AppError> {
        if duration_minutes == 0 {
            return Err(AppError::InvalidRequest(
                "slot duration must be positive".to_string(),
            ));
        }
        if window.end_date < window.start_date {
            return Err(AppError::InvalidRequest(
                "end_date must not be before start_date".to_string(),
            ));
        }
        let span = (window.end_date - window.start_date).num_days() + 1;
        if span > MAX_WINDOW_DAYS {
            return Err(AppError::InvalidRequest(format!(
                "search window is {span} days, at most {MAX_WINDOW_DAYS} allowed"
            )));
        }

        let now = self.clock.now();
        let mut slots = Vec::new();
        let mut day = window.start_date;

        while day <= window.end_date {
            if let Some((day_start, day_end)) = day_bounds(day, hours, window.daily_range) {
                if day_end > now {
                    let busy = self.fetch_busy(calendar_ref, day_start, day_end).await?;
                    let busy = normalize_busy(busy, day_start, day_end);
                    slots.extend(
                        free_slots(day_start, day_end, duration_minutes, &busy)
                            .into_iter()
                            .filter(|s| s.start >= now),
                    );
                }
            }

            day = match day.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        tracing::debug!(
            calendar_ref,
            from = %window.start_date,
            to = %window.end_date,
            count = slots.len(),
            "generated slots"
        );
        Ok(slots)
    }

    /// Maps spoken date/time phrases onto a window and returns the first few free slots.
    /// Empty when the business does not take appointments.
    pub async fn suggest_slots(
        &self,
        profile: &BusinessProfile,
        date: Option<&str>,
        time: Option<&str>,
    ) -> Result<Vec<Slot>, AppError> {
        if !profile.appointment.enabled {
            return Ok(Vec::new());
        }

        let window = resolve_window(date, time, self.clock.now());
        let mut slots = self
            .generate_slots(
                &profile.appointment.calendar_ref,
                &window,
                profile.appointment.duration_minutes,
                &profile.business_hours,
            )
            .await?;
        slots.truncate(SUGGESTION_LIMIT);
        Ok(slots)
    }

    /// Books `slot` on the business calendar once it is known to be bookable: in the
    /// future, inside opening hours and clear of every busy interval. Calendar failures
    /// are returned as-is, no retry.
    pub async fn schedule_appointment(
        &self,
        profile: &BusinessProfile,
        slot: &Slot,
        caller: &CallerDetails,
    ) -> Result<BookingResult, AppError> {
        if !profile.appointment.enabled {
            return Err(AppError::SchedulingDisabled(profile.business_id.clone()));
        }
        if caller.name.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "caller name is required to book".to_string(),
            ));
        }

        if slot.end <= slot.start {
            return Err(AppError::InvalidRequest(
                "slot duration must be positive".to_string(),
            ));
        }

        let _guard = self.booking.lock().await;
        self.ensure_bookable(profile, slot).await?;

        let event = appointment_event(slot, caller);
        let created = tokio::time::timeout(
            self.timeout,
            self.calendar
                .create_event(&profile.appointment.calendar_ref, &event),
        )
        .await
        .map_err(|_| AppError::Timeout {
            operation: "calendar booking",
        })?
        .map_err(|e| AppError::Calendar(format!("{e:#}")))?;

        let event_id = created
            .id
            .ok_or_else(|| AppError::Calendar("calendar did not return an event id".to_string()))?;

        tracing::info!(
            business_id = %profile.business_id,
            event_id = %event_id,
            start = %created.start,
            "appointment booked"
        );

        Ok(BookingResult {
            event_id,
            summary: created.summary,
            start: created.start,
            end: created.end,
        })
    }

    async fn ensure_bookable(&self, profile: &BusinessProfile, slot: &Slot) -> Result<(), AppError> {
        let unavailable = |reason: &str| {
            tracing::info!(
                business_id = %profile.business_id,
                start = %slot.start,
                reason,
                "slot rejected"
            );
            AppError::SlotUnavailable(format!("{} {reason}", slot.describe()))
        };

        if slot.start < self.clock.now() {
            return Err(unavailable("has already passed"));
        }
        let Some((day_start, day_end)) =
            day_bounds(slot.start.date(), &profile.business_hours, None)
        else {
            return Err(unavailable("falls on a closed day"));
        };
        if slot.start < day_start || slot.end > day_end {
            return Err(unavailable("is outside business hours"));
        }

        let calendar_ref = &profile.appointment.calendar_ref;
        let busy = self.fetch_busy(calendar_ref, day_start, day_end).await?;
        if normalize_busy(busy, day_start, day_end)
            .iter()
            .any(|b| b.overlaps(slot.start, slot.end))
        {
            return Err(unavailable("is already taken"));
        }
        Ok(())
    }

    async fn fetch_busy(
        &self,
        calendar_ref: &str,
        day_start: NaiveDateTime,
        day_end: NaiveDateTime,
    ) -> Result<Vec<Interval>, AppError> {
        let window = Interval {
            start: day_start,
            end: day_end,
        };
        tokio::time::timeout(
            self.timeout,
            self.calendar.list_busy_intervals(calendar_ref, &window),
        )
        .await
        .map_err(|_| {
            tracing::warn!(calendar_ref, day = %day_start.date(), "busy lookup timed out");
            AppError::Timeout {
                operation: "calendar lookup",
            }
        })?
        .map_err(|e| {
            tracing::warn!(calendar_ref, error = %e, "busy lookup failed");
            AppError::Calendar(format!("{e:#}"))
        })
    }
}

/// Opening window of `day`, intersected with `daily_range`. `None` when closed or empty.
pub fn day_bounds(
    day: NaiveDate,
    hours: &BusinessHours,
    daily_range: Option<(NaiveTime, NaiveTime)>,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let (mut open, mut close) = match hours.get(day.weekday()) {
        DaySchedule::Closed => return None,
        DaySchedule::Open { open, close } => (open, close),
        DaySchedule::Unspecified => (
            NaiveTime::from_hms_opt(DEFAULT_OPEN.0, DEFAULT_OPEN.1, 0)?,
            NaiveTime::from_hms_opt(DEFAULT_CLOSE.0, DEFAULT_CLOSE.1, 0)?,
        ),
    };

    if let Some((from, to)) = daily_range {
        open = open.max(from);
        close = close.min(to);
    }

    (open < close).then(|| (day.and_time(open), day.and_time(close)))
}

/// Clips to the day, drops anything empty, sorts by start. Overlaps are kept.
pub fn normalize_busy(
    busy: Vec<Interval>,
    day_start: NaiveDateTime,
    day_end: NaiveDateTime,
) -> Vec<Interval> {
    let mut clipped: Vec<Interval> = busy
        .iter()
        .filter_map(|b| b.clip(day_start, day_end))
        .collect();
    clipped.sort_by_key(|b| (b.start, b.end));
    clipped
}

/// Walks the day back to back; on a collision the cursor jumps to the end of the
/// busy interval, so it only ever moves forward.
pub fn free_slots(
    day_start: NaiveDateTime,
    day_end: NaiveDateTime,
    duration_minutes: u32,
    busy: &[Interval],
) -> Vec<Slot> {
    let step = Duration::minutes(i64::from(duration_minutes));
    let mut slots = Vec::new();
    let mut cursor = day_start;

    while cursor + step <= day_end {
        match busy.iter().find(|b| b.overlaps(cursor, cursor + step)) {
            Some(b) => cursor = b.end,
            None => {
                slots.push(Slot::new(cursor, duration_minutes));
                cursor += step;
            }
        }
    }
    slots
}

fn appointment_event(slot: &Slot, caller: &CallerDetails) -> CalendarEvent {
    let name = caller.name.trim();
    let mut description = format!("Appointment with {name}\n\n");
    if let Some(email) = &caller.email {
        description.push_str(&format!("Email: {email}\n"));
    }
    if let Some(phone) = &caller.phone {
        description.push_str(&format!("Phone: {phone}\n"));
    }
    if let Some(reason) = &caller.reason {
        description.push_str(&format!("\nReason: {reason}\n"));
    }

    CalendarEvent {
        id: None,
        summary: format!("Appointment with {name}"),
        description,
        start: slot.start,
        end: slot.end,
        attendees: caller
            .email
            .iter()
            .map(|email| Attendee {
                email: email.clone(),
            })
            .collect(),
    }
}

// ── Spoken phrases → search window ──

/// Unrecognized or missing dates search the coming week.
pub fn resolve_window(date: Option<&str>, time: Option<&str>, now: NaiveDateTime) -> SlotWindow {
    let today = now.date();
    let (start_date, end_date) = date
        .and_then(|d| resolve_date(d, now))
        .unwrap_or((today, today + Duration::days(6)));

    SlotWindow {
        start_date,
        end_date,
        daily_range: time.and_then(resolve_time_of_day),
    }
}

fn resolve_date(phrase: &str, now: NaiveDateTime) -> Option<(NaiveDate, NaiveDate)> {
    let lower = phrase.to_lowercase();
    let today = now.date();

    if lower.contains("today") {
        return Some((today, today));
    }
    if lower.contains("tomorrow") {
        let day = today.succ_opt()?;
        return Some((day, day));
    }
    if lower.contains("next week") {
        let monday = today + Duration::days(7 - i64::from(today.weekday().num_days_from_monday()));
        return Some((monday, monday + Duration::days(6)));
    }

    let words: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    for word in &words {
        if word.len() >= 6 {
            if let Ok(weekday) = word.parse::<Weekday>() {
                let day = next_weekday(weekday, now);
                return Some((day, day));
            }
        }
        if let Ok(day) = NaiveDate::parse_from_str(word, "%Y-%m-%d") {
            return Some((day, day));
        }
    }

    // "june 16"
    for pair in words.windows(2) {
        let candidate = format!("{} {} {}", pair[0], pair[1], today.year());
        if let Ok(day) = NaiveDate::parse_from_str(&candidate, "%B %d %Y") {
            let day = if day < today {
                day.with_year(today.year() + 1).unwrap_or(day)
            } else {
                day
            };
            return Some((day, day));
        }
    }

    None
}

/// Next occurrence of `weekday`; today only counts while it is still morning.
fn next_weekday(weekday: Weekday, now: NaiveDateTime) -> NaiveDate {
    let today = now.date();
    let mut ahead = (weekday.num_days_from_monday() + 7 - today.weekday().num_days_from_monday()) % 7;
    if ahead == 0 && now.hour() >= 12 {
        ahead = 7;
    }
    today + Duration::days(i64::from(ahead))
}

fn resolve_time_of_day(phrase: &str) -> Option<(NaiveTime, NaiveTime)> {
    let lower = phrase.to_lowercase();
    let range = |from: u32, to: u32| {
        Some((
            NaiveTime::from_hms_opt(from, 0, 0)?,
            NaiveTime::from_hms_opt(to, 0, 0)?,
        ))
    };

    if lower.contains("morning") {
        return range(8, 12);
    }
    if lower.contains("afternoon") {
        return range(12, 17);
    }
    if lower.contains("evening") {
        return range(17, 20);
    }

    let from = find_clock(&lower)?;
    Some((from, NaiveTime::from_hms_opt(23, 59, 59)?))
}

/// First clock time mentioned in free text: "2pm", "2:30 p.m.", "at 14:00", "noon".
/// Bare numbers without am/pm are ignored.
pub fn find_clock(text: &str) -> Option<NaiveTime> {
    let tokens: Vec<String> = text
        .split_whitespace()
        .map(|t| {
            t.to_ascii_lowercase()
                .replace('.', "")
                .trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != ':')
                .to_string()
        })
        .filter(|t| !t.is_empty())
        .collect();

    for (i, token) in tokens.iter().enumerate() {
        if token == "noon" {
            return NaiveTime::from_hms_opt(12, 0, 0);
        }
        if !token.starts_with(|c: char| c.is_ascii_digit()) {
            continue;
        }
        if token.ends_with("am") || token.ends_with("pm") {
            if let Some(t) = parse_clock(token) {
                return Some(t);
            }
            continue;
        }
        match tokens.get(i + 1).map(String::as_str) {
            Some(meridiem @ ("am" | "pm")) => {
                if let Some(t) = parse_clock(&format!("{token} {meridiem}")) {
                    return Some(t);
                }
            }
            _ if token.contains(':') => {
                if let Some(t) = parse_clock(token) {
                    return Some(t);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::models::profile::AppointmentSettings;
    use crate::services::calendar::memory::InMemoryCalendar;
    use crate::services::clock::FixedClock;

    fn dt(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn busy(start: &str, end: &str) -> Interval {
        Interval::new(dt(start), dt(end)).unwrap()
    }

    fn weekday_hours() -> BusinessHours {
        let open = DaySchedule::Open {
            open: t(9, 0),
            close: t(17, 0),
        };
        BusinessHours::default()
            .with(Weekday::Mon, open)
            .with(Weekday::Tue, open)
            .with(Weekday::Sat, DaySchedule::Closed)
            .with(Weekday::Sun, DaySchedule::Closed)
    }

    // Sunday morning; 2025-06-16 is a Monday.
    fn scheduler(calendar: InMemoryCalendar, now: &str) -> Scheduler {
        Scheduler::new(
            Arc::new(calendar),
            Arc::new(FixedClock(dt(now))),
            std::time::Duration::from_secs(1),
        )
    }

    fn bookable_profile() -> BusinessProfile {
        let mut profile = BusinessProfile::minimal("biz-1");
        profile.business_hours = weekday_hours();
        profile.appointment = AppointmentSettings {
            enabled: true,
            calendar_ref: "cal-1".to_string(),
            duration_minutes: 60,
        };
        profile
    }

    fn starts(slots: &[Slot]) -> Vec<String> {
        slots
            .iter()
            .map(|s| s.start.format("%m-%d %H:%M").to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_busy_hour_is_skipped() {
        let calendar = InMemoryCalendar::new()
            .with_busy("cal-1", vec![busy("2025-06-16 10:00", "2025-06-16 11:00")]);
        let scheduler = scheduler(calendar, "2025-06-15 08:00");

        let slots = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await
            .unwrap();

        assert_eq!(
            starts(&slots),
            vec![
                "06-16 09:00",
                "06-16 11:00",
                "06-16 12:00",
                "06-16 13:00",
                "06-16 14:00",
                "06-16 15:00",
                "06-16 16:00"
            ]
        );
        for slot in &slots {
            assert_eq!(slot.end - slot.start, Duration::minutes(60));
            assert!(slot.start.time() >= t(9, 0) && slot.end.time() <= t(17, 0));
        }
    }

    #[tokio::test]
    async fn test_slots_abut_busy_intervals() {
        let calendar = InMemoryCalendar::new().with_busy(
            "cal-1",
            vec![
                busy("2025-06-16 09:30", "2025-06-16 10:00"),
                busy("2025-06-16 10:30", "2025-06-16 11:00"),
            ],
        );
        let scheduler = scheduler(calendar, "2025-06-15 08:00");

        let slots = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 30, &weekday_hours())
            .await
            .unwrap();

        let first: Vec<String> = starts(&slots).into_iter().take(3).collect();
        assert_eq!(first, vec!["06-16 09:00", "06-16 10:00", "06-16 11:00"]);
    }

    #[tokio::test]
    async fn test_overlapping_busy_intervals_tolerated() {
        let calendar = InMemoryCalendar::new().with_busy(
            "cal-1",
            vec![
                busy("2025-06-16 11:00", "2025-06-16 12:00"),
                busy("2025-06-16 10:00", "2025-06-16 11:30"),
                busy("2025-06-16 10:00", "2025-06-16 11:30"),
            ],
        );
        let scheduler = scheduler(calendar, "2025-06-15 08:00");

        let slots = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await
            .unwrap();

        assert_eq!(
            starts(&slots),
            vec!["06-16 09:00", "06-16 12:00", "06-16 13:00", "06-16 14:00", "06-16 15:00", "06-16 16:00"]
        );
        for pair in slots.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
    }

    #[tokio::test]
    async fn test_closed_and_unspecified_days() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");
        let window = SlotWindow {
            start_date: date("2025-06-18"), // Wednesday, unspecified
            end_date: date("2025-06-21"),   // Saturday, closed
            daily_range: None,
        };

        let slots = scheduler
            .generate_slots("cal-1", &window, 60, &weekday_hours())
            .await
            .unwrap();

        // Wed, Thu, Fri fall back to 9-5: eight slots each.
        assert_eq!(slots.len(), 24);
        assert!(slots.iter().all(|s| s.start.weekday() != Weekday::Sat));
        assert!(slots.windows(2).all(|p| p[0].start < p[1].start));
    }

    #[tokio::test]
    async fn test_elapsed_part_of_today_is_skipped() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-16 12:30");
        let slots = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await
            .unwrap();
        assert_eq!(
            starts(&slots),
            vec!["06-16 13:00", "06-16 14:00", "06-16 15:00", "06-16 16:00"]
        );

        let after_close = scheduler_at_evening();
        let none = after_close
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    fn scheduler_at_evening() -> Scheduler {
        scheduler(InMemoryCalendar::new(), "2025-06-16 18:00")
    }

    #[tokio::test]
    async fn test_generate_slots_is_idempotent() {
        let calendar = InMemoryCalendar::new()
            .with_busy("cal-1", vec![busy("2025-06-17 13:15", "2025-06-17 14:45")]);
        let scheduler = scheduler(calendar, "2025-06-15 08:00");
        let window = SlotWindow {
            start_date: date("2025-06-16"),
            end_date: date("2025-06-17"),
            daily_range: None,
        };

        let first = scheduler.generate_slots("cal-1", &window, 45, &weekday_hours()).await.unwrap();
        let second = scheduler.generate_slots("cal-1", &window, 45, &weekday_hours()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_zero_duration_rejected() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");
        let result = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 0, &weekday_hours())
            .await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_daily_range_narrows_hours() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");
        let window = SlotWindow {
            start_date: date("2025-06-16"),
            end_date: date("2025-06-16"),
            daily_range: Some((t(8, 0), t(12, 0))),
        };
        let slots = scheduler.generate_slots("cal-1", &window, 60, &weekday_hours()).await.unwrap();
        assert_eq!(starts(&slots), vec!["06-16 09:00", "06-16 10:00", "06-16 11:00"]);
    }

    struct FailingCalendar;

    #[async_trait]
    impl CalendarProvider for FailingCalendar {
        async fn list_busy_intervals(&self, _: &str, _: &Interval) -> anyhow::Result<Vec<Interval>> {
            anyhow::bail!("calendar unreachable")
        }

        async fn create_event(&self, _: &str, _: &CalendarEvent) -> anyhow::Result<CalendarEvent> {
            anyhow::bail!("calendar unreachable")
        }
    }

    struct SlowCalendar;

    #[async_trait]
    impl CalendarProvider for SlowCalendar {
        async fn list_busy_intervals(&self, _: &str, _: &Interval) -> anyhow::Result<Vec<Interval>> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok(vec![])
        }

        async fn create_event(&self, _: &str, event: &CalendarEvent) -> anyhow::Result<CalendarEvent> {
            Ok(event.clone())
        }
    }

    #[tokio::test]
    async fn test_calendar_failure_propagates() {
        let scheduler = Scheduler::new(
            Arc::new(FailingCalendar),
            Arc::new(FixedClock(dt("2025-06-15 08:00"))),
            std::time::Duration::from_secs(1),
        );
        let result = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await;
        assert!(matches!(result, Err(AppError::Calendar(_))));

        let booking = scheduler
            .schedule_appointment(
                &bookable_profile(),
                &Slot::new(dt("2025-06-16 09:00"), 60),
                &CallerDetails {
                    name: "Dana".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(booking, Err(AppError::Calendar(_))));
    }

    #[tokio::test]
    async fn test_calendar_timeout() {
        let scheduler = Scheduler::new(
            Arc::new(SlowCalendar),
            Arc::new(FixedClock(dt("2025-06-15 08:00"))),
            std::time::Duration::from_millis(20),
        );
        let result = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await;
        assert!(matches!(result, Err(AppError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_suggest_slots_limits_and_respects_disabled() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");

        let slots = scheduler
            .suggest_slots(&bookable_profile(), Some("tomorrow"), None)
            .await
            .unwrap();
        assert_eq!(slots.len(), SUGGESTION_LIMIT);
        assert_eq!(slots[0].start, dt("2025-06-16 09:00"));

        let afternoon = scheduler
            .suggest_slots(&bookable_profile(), Some("monday"), Some("in the afternoon"))
            .await
            .unwrap();
        assert_eq!(afternoon[0].start, dt("2025-06-16 12:00"));

        let disabled = BusinessProfile::minimal("biz-2");
        assert!(scheduler
            .suggest_slots(&disabled, Some("tomorrow"), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_schedule_appointment_creates_event() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let scheduler = Scheduler::new(
            calendar.clone(),
            Arc::new(FixedClock(dt("2025-06-15 08:00"))),
            std::time::Duration::from_secs(1),
        );
        let caller = CallerDetails {
            name: "Dana Scully".to_string(),
            email: Some("dana@example.com".to_string()),
            phone: Some("+15551234567".to_string()),
            reason: Some("checkup".to_string()),
        };

        let booking = scheduler
            .schedule_appointment(&bookable_profile(), &Slot::new(dt("2025-06-16 11:00"), 60), &caller)
            .await
            .unwrap();
        assert_eq!(booking.summary, "Appointment with Dana Scully");
        assert_eq!(booking.end, dt("2025-06-16 12:00"));

        let events = calendar.events("cal-1");
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].description,
            "Appointment with Dana Scully\n\nEmail: dana@example.com\nPhone: +15551234567\n\nReason: checkup\n"
        );
        assert_eq!(events[0].attendees, vec![Attendee { email: "dana@example.com".to_string() }]);
        assert_eq!(events[0].id.as_deref(), Some(booking.event_id.as_str()));

        let slots = scheduler
            .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), 60, &weekday_hours())
            .await
            .unwrap();
        assert!(slots.iter().all(|s| s.start != dt("2025-06-16 11:00")));
    }

    #[tokio::test]
    async fn test_schedule_appointment_disabled() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");
        let result = scheduler
            .schedule_appointment(
                &BusinessProfile::minimal("biz-2"),
                &Slot::new(dt("2025-06-16 11:00"), 60),
                &CallerDetails {
                    name: "Dana".to_string(),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AppError::SchedulingDisabled(_))));
    }

    fn dana() -> CallerDetails {
        CallerDetails {
            name: "Dana".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_schedule_appointment_rejects_unbookable_slots() {
        let calendar = InMemoryCalendar::new()
            .with_busy("cal-1", vec![busy("2025-06-17 10:00", "2025-06-17 11:00")]);
        let scheduler = scheduler(calendar, "2025-06-16 12:30");
        let profile = bookable_profile();

        let rejected = [
            ("2025-06-22 03:00", 60), // Sunday, closed
            ("2025-06-16 08:00", 60), // before opening
            ("2025-06-16 16:30", 60), // runs past closing
            ("2025-06-16 10:00", 60), // earlier today
            ("2025-06-17 10:30", 60), // overlaps a busy hour
            ("2025-06-17 09:30", 60),
        ];
        for (start, minutes) in rejected {
            let result = scheduler
                .schedule_appointment(&profile, &Slot::new(dt(start), minutes), &dana())
                .await;
            assert!(
                matches!(result, Err(AppError::SlotUnavailable(_))),
                "{start} should not be bookable: {result:?}"
            );
        }

        // Abutting a busy interval is fine.
        let ok = scheduler
            .schedule_appointment(&profile, &Slot::new(dt("2025-06-17 11:00"), 60), &dana())
            .await;
        assert!(ok.is_ok());
    }

    #[tokio::test]
    async fn test_double_booking_rejected() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let scheduler = Scheduler::new(
            calendar.clone(),
            Arc::new(FixedClock(dt("2025-06-15 08:00"))),
            std::time::Duration::from_secs(1),
        );
        let profile = bookable_profile();

        scheduler
            .schedule_appointment(&profile, &Slot::new(dt("2025-06-16 09:00"), 60), &dana())
            .await
            .unwrap();
        let overlapping = scheduler
            .schedule_appointment(&profile, &Slot::new(dt("2025-06-16 09:30"), 60), &dana())
            .await;
        assert!(matches!(overlapping, Err(AppError::SlotUnavailable(_))));
        let same = scheduler
            .schedule_appointment(&profile, &Slot::new(dt("2025-06-16 09:00"), 60), &dana())
            .await;
        assert!(matches!(same, Err(AppError::SlotUnavailable(_))));

        scheduler
            .schedule_appointment(&profile, &Slot::new(dt("2025-06-16 10:00"), 60), &dana())
            .await
            .unwrap();
        assert_eq!(calendar.events("cal-1").len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_bookings_for_one_slot() {
        let calendar = Arc::new(InMemoryCalendar::new());
        let scheduler = Arc::new(Scheduler::new(
            calendar.clone(),
            Arc::new(FixedClock(dt("2025-06-15 08:00"))),
            std::time::Duration::from_secs(1),
        ));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let scheduler = scheduler.clone();
            tasks.push(tokio::spawn(async move {
                scheduler
                    .schedule_appointment(
                        &bookable_profile(),
                        &Slot::new(dt("2025-06-16 14:00"), 60),
                        &dana(),
                    )
                    .await
            }));
        }
        let mut booked = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                booked += 1;
            }
        }
        assert_eq!(booked, 1);
        assert_eq!(calendar.events("cal-1").len(), 1);
    }

    #[tokio::test]
    async fn test_window_span_is_capped() {
        let scheduler = scheduler(InMemoryCalendar::new(), "2025-06-15 08:00");

        let huge = SlotWindow {
            start_date: date("2025-01-01"),
            end_date: date("9999-12-31"),
            daily_range: None,
        };
        let result = scheduler.generate_slots("cal-1", &huge, 60, &weekday_hours()).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));

        let reversed = SlotWindow {
            start_date: date("2025-06-20"),
            end_date: date("2025-06-16"),
            daily_range: None,
        };
        let result = scheduler.generate_slots("cal-1", &reversed, 60, &weekday_hours()).await;
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));

        let widest = SlotWindow {
            start_date: date("2025-06-16"),
            end_date: date("2025-06-16") + Duration::days(MAX_WINDOW_DAYS - 1),
            daily_range: None,
        };
        let slots = scheduler.generate_slots("cal-1", &widest, 60, &weekday_hours()).await.unwrap();
        assert!(!slots.is_empty());
        assert!(slots.iter().all(|s| s.start.date() <= widest.end_date));
    }

    #[tokio::test]
    async fn test_slot_invariants_across_layouts() {
        let layouts: Vec<Vec<Interval>> = vec![
            vec![],
            vec![busy("2025-06-16 10:00", "2025-06-16 11:00")],
            vec![
                busy("2025-06-16 09:10", "2025-06-16 09:20"),
                busy("2025-06-16 12:05", "2025-06-16 13:55"),
            ],
            vec![
                busy("2025-06-16 11:00", "2025-06-16 12:30"),
                busy("2025-06-16 11:45", "2025-06-16 14:00"),
                busy("2025-06-16 13:00", "2025-06-16 13:30"),
            ],
            vec![
                busy("2025-06-16 06:00", "2025-06-16 09:45"),
                busy("2025-06-16 16:50", "2025-06-16 23:00"),
            ],
            vec![busy("2025-06-15 20:00", "2025-06-17 02:00")],
        ];
        let hours = [(9, 0, 17, 0), (8, 30, 12, 15), (13, 0, 21, 45)];
        let durations = [15, 30, 45, 60, 90];

        for layout in &layouts {
            for &(oh, om, ch, cm) in &hours {
                let hours = BusinessHours::default().with(
                    Weekday::Mon,
                    DaySchedule::Open {
                        open: t(oh, om),
                        close: t(ch, cm),
                    },
                );
                let (day_start, day_end) = day_bounds(date("2025-06-16"), &hours, None).unwrap();

                for &minutes in &durations {
                    let calendar = InMemoryCalendar::new().with_busy("cal-1", layout.clone());
                    let scheduler = scheduler(calendar, "2025-06-15 08:00");
                    let slots = scheduler
                        .generate_slots("cal-1", &SlotWindow::single_day(date("2025-06-16")), minutes, &hours)
                        .await
                        .unwrap();

                    let case = format!("layout {layout:?}, hours {oh}:{om}-{ch}:{cm}, {minutes} min");
                    for slot in &slots {
                        assert_eq!(slot.end - slot.start, Duration::minutes(i64::from(minutes)), "{case}");
                        assert!(slot.start >= day_start && slot.end <= day_end, "{case}: {slot:?}");
                        assert!(
                            layout.iter().all(|b| !b.overlaps(slot.start, slot.end)),
                            "{case}: {slot:?} overlaps a busy interval"
                        );
                    }
                    for pair in slots.windows(2) {
                        assert!(pair[0].end <= pair[1].start, "{case}: {pair:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_resolve_window_phrases() {
        let now = dt("2025-06-15 08:00");

        let w = resolve_window(Some("tomorrow"), None, now);
        assert_eq!((w.start_date, w.end_date), (date("2025-06-16"), date("2025-06-16")));

        let w = resolve_window(Some("next week"), None, now);
        assert_eq!((w.start_date, w.end_date), (date("2025-06-16"), date("2025-06-22")));

        let w = resolve_window(Some("on Thursday"), Some("morning"), now);
        assert_eq!(w.start_date, date("2025-06-19"));
        assert_eq!(w.daily_range, Some((t(8, 0), t(12, 0))));

        // Sunday before noon still means today.
        let w = resolve_window(Some("sunday"), None, now);
        assert_eq!(w.start_date, date("2025-06-15"));
        let w = resolve_window(Some("sunday"), None, dt("2025-06-15 13:00"));
        assert_eq!(w.start_date, date("2025-06-22"));

        let w = resolve_window(Some("June 20"), None, now);
        assert_eq!(w.start_date, date("2025-06-20"));

        let w = resolve_window(Some("2025-07-01"), Some("at 2pm"), now);
        assert_eq!(w.start_date, date("2025-07-01"));
        assert_eq!(w.daily_range.map(|r| r.0), Some(t(14, 0)));

        let w = resolve_window(None, None, now);
        assert_eq!((w.start_date, w.end_date), (date("2025-06-15"), date("2025-06-21")));
    }

    #[test]
    fn test_find_clock() {
        assert_eq!(find_clock("how about 2pm then"), Some(t(14, 0)));
        assert_eq!(find_clock("the 2:30 p.m. one"), Some(t(14, 30)));
        assert_eq!(find_clock("at 10:00, please"), Some(t(10, 0)));
        assert_eq!(find_clock("around noon"), Some(t(12, 0)));
        assert_eq!(find_clock("for 2 people"), None);
    }
}
