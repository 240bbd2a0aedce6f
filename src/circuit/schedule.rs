// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Switch-program schedules.
//!
//! A switch program is a weekly list of switch points. Each switch point
//! starts a window that lasts until the next one and names either a
//! temperature level (`comfort2`, `eco`, ...) or the active-program sentinel,
//! in which case the active program's own setpoint record decides.
//!
//! Level temperatures are fetched once per program from the level property
//! the program points to and cached until the active program changes.

use std::collections::{HashMap, HashSet};

use chrono::{Datelike, Local, NaiveDateTime, Timelike, Weekday};
use serde_json::Value;

use crate::circuit::OperationClass;
use crate::circuit::data_cache::{MAX_VALUE, MIN_VALUE, VALUE, as_number};
use crate::error::ParseError;
use crate::protocol::{Payload, Transport};

/// Switch-point setpoint meaning "use the active program's setpoint".
pub const ACTIVE_PROGRAM_SENTINEL: &str = "activeProgram";

const SWITCH_POINTS: &str = "switchPoints";
const SETPOINT_PROPERTY: &str = "setpointProperty";
const REFERENCES: &str = "references";

/// What a schedule window points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleTarget {
    /// A named temperature level.
    Level(String),
    /// Delegate to the active program's setpoint.
    ActiveProgram,
}

impl ScheduleTarget {
    fn parse(setpoint: &str) -> Self {
        if setpoint == ACTIVE_PROGRAM_SENTINEL {
            Self::ActiveProgram
        } else {
            Self::Level(setpoint.to_string())
        }
    }
}

/// Start of a schedule window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchPoint {
    /// Day the window starts.
    pub day: Weekday,
    /// Minutes since midnight the window starts.
    pub minutes: u32,
    /// What the window points to.
    pub target: ScheduleTarget,
}

impl SwitchPoint {
    fn week_position(&self) -> (u32, u32) {
        (self.day.num_days_from_monday(), self.minutes)
    }
}

/// A fetched temperature level.
#[derive(Debug, Clone, PartialEq)]
pub struct SetpointLevel {
    /// Level name as used in switch points.
    pub name: String,
    /// Remote address of the level.
    pub address: String,
    /// Level temperature.
    pub value: Option<f64>,
    /// Lower bound of the level.
    pub min: Option<f64>,
    /// Upper bound of the level.
    pub max: Option<f64>,
}

impl SetpointLevel {
    fn from_record(name: &str, address: String, record: &Payload) -> Self {
        Self {
            name: name.to_string(),
            address,
            value: record.get(VALUE).and_then(as_number),
            min: record.get(MIN_VALUE).and_then(as_number),
            max: record.get(MAX_VALUE).and_then(as_number),
        }
    }
}

/// Schedule answer for the current mode.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScheduleValue<'a> {
    /// A literal temperature level.
    Level(&'a SetpointLevel),
    /// Delegated to the active program.
    ActiveProgram,
}

/// Active switch program of one circuit.
#[derive(Debug, Clone)]
pub struct ScheduleEngine {
    circuit: String,
    program_template: Option<String>,
    date_format: String,
    active_program: Option<String>,
    switch_points: Vec<SwitchPoint>,
    levels: HashMap<String, SetpointLevel>,
    time: Option<NaiveDateTime>,
}

impl ScheduleEngine {
    /// Creates an empty schedule.
    ///
    /// # Arguments
    ///
    /// * `circuit` - Circuit id, substituted for `{circuit}` in the template
    /// * `program_template` - Switch program address template
    /// * `date_format` - `strftime` format of gateway timestamps
    #[must_use]
    pub fn new(
        circuit: impl Into<String>,
        program_template: Option<String>,
        date_format: impl Into<String>,
    ) -> Self {
        Self {
            circuit: circuit.into(),
            program_template,
            date_format: date_format.into(),
            active_program: None,
            switch_points: Vec::new(),
            levels: HashMap::new(),
            time: None,
        }
    }

    /// Picks the program to follow.
    ///
    /// A non-empty active-program value wins. Otherwise the first program
    /// referenced by the program list record is used.
    #[must_use]
    pub fn resolve_active_program(
        raw: Option<&str>,
        program_list: Option<&Payload>,
    ) -> Option<String> {
        if let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) {
            return Some(raw.to_string());
        }
        let first = program_list?
            .get(REFERENCES)?
            .as_array()?
            .first()?
            .get("id")?
            .as_str()?;
        first
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Returns the active program.
    #[must_use]
    pub fn active_program(&self) -> Option<&str> {
        self.active_program.as_deref()
    }

    /// Returns the switch points of the active program.
    #[must_use]
    pub fn switch_points(&self) -> &[SwitchPoint] {
        &self.switch_points
    }

    /// Returns a cached level.
    #[must_use]
    pub fn level(&self, name: &str) -> Option<&SetpointLevel> {
        self.levels.get(name)
    }

    /// Returns the gateway time of the last update.
    #[must_use]
    pub fn time(&self) -> Option<NaiveDateTime> {
        self.time
    }

    /// Returns the gateway time of the last update, or local time.
    #[must_use]
    pub fn now(&self) -> NaiveDateTime {
        self.time.unwrap_or_else(|| Local::now().naive_local())
    }

    /// Sets the reference time.
    pub fn set_time(&mut self, time: NaiveDateTime) {
        self.time = Some(time);
    }

    /// Parses a gateway timestamp with the configured format.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InvalidDate`] if the text does not match.
    pub fn parse_time(&self, raw: &str) -> Result<NaiveDateTime, ParseError> {
        NaiveDateTime::parse_from_str(raw, &self.date_format).map_err(|_| ParseError::InvalidDate {
            input: raw.to_string(),
            format: self.date_format.clone(),
        })
    }

    /// Returns the address of a program.
    #[must_use]
    pub fn program_address(&self, program: &str) -> Option<String> {
        self.program_template.as_ref().map(|template| {
            template
                .replace("{circuit}", &self.circuit)
                .replace("{program}", program)
        })
    }

    /// Installs a program's switch points.
    ///
    /// Switching to a different program drops the cached levels.
    pub fn load_program(&mut self, program: &str, switch_points: Vec<SwitchPoint>) {
        if self.active_program.as_deref() != Some(program) {
            self.levels.clear();
        }
        self.active_program = Some(program.to_string());
        self.switch_points = switch_points;
    }

    /// Caches a level.
    pub fn insert_level(&mut self, level: SetpointLevel) {
        self.levels.insert(level.name.clone(), level);
    }

    /// Overwrites the temperature of a cached level after a write.
    pub fn set_level_value(&mut self, name: &str, value: f64) {
        if let Some(level) = self.levels.get_mut(name) {
            level.value = Some(value);
        }
    }

    /// Fetches the program and any level not cached yet.
    ///
    /// Failures are logged; the previous schedule stays in place.
    pub async fn update<T: Transport>(&mut self, transport: &T, program: &str, now: NaiveDateTime) {
        self.time = Some(now);

        let Some(address) = self.program_address(program) else {
            tracing::debug!(circuit = %self.circuit, "No switch program address configured");
            return;
        };
        let payload = match transport.get(&address).await {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(circuit = %self.circuit, program = %program, error = %err, "Failed to fetch switch program");
                return;
            }
        };
        let switch_points = match parse_switch_points(&payload) {
            Ok(points) => points,
            Err(err) => {
                tracing::warn!(circuit = %self.circuit, program = %program, error = %err, "Malformed switch program");
                return;
            }
        };
        self.load_program(program, switch_points);

        let Some(level_base) = payload
            .get(SETPOINT_PROPERTY)
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(|base| base.trim_end_matches('/').to_string())
        else {
            return;
        };

        let mut seen = HashSet::new();
        let missing: Vec<String> = self
            .switch_points
            .iter()
            .filter_map(|p| match &p.target {
                ScheduleTarget::Level(name) => Some(name.clone()),
                ScheduleTarget::ActiveProgram => None,
            })
            .filter(|name| !self.levels.contains_key(name) && seen.insert(name.clone()))
            .collect();

        for name in missing {
            let address = format!("{level_base}/{name}");
            match transport.get(&address).await {
                Ok(record) => self.insert_level(SetpointLevel::from_record(&name, address, &record)),
                Err(err) => {
                    tracing::debug!(circuit = %self.circuit, level = %name, error = %err, "Failed to fetch temperature level");
                }
            }
        }
    }

    /// Returns the window target covering `now`.
    ///
    /// The window is opened by the last switch point at or before `now` in
    /// the week; before the first point of the week the last point of the
    /// previous week still applies.
    #[must_use]
    pub fn target_at(&self, now: NaiveDateTime) -> Option<&ScheduleTarget> {
        let position = (
            now.weekday().num_days_from_monday(),
            now.hour() * 60 + now.minute(),
        );
        let mut ordered: Vec<&SwitchPoint> = self.switch_points.iter().collect();
        ordered.sort_by_key(|p| p.week_position());

        ordered
            .iter()
            .rev()
            .copied()
            .find(|p| p.week_position() <= position)
            .or_else(|| ordered.last().copied())
            .map(|p| &p.target)
    }

    /// Returns the scheduled temperature source for a mode.
    ///
    /// Manual modes read the level named like the mode; program modes read
    /// the window covering `now`.
    #[must_use]
    pub fn temperature_for_current_mode(
        &self,
        mode: &str,
        class: OperationClass,
        now: NaiveDateTime,
    ) -> Option<ScheduleValue<'_>> {
        match class {
            OperationClass::Off => None,
            OperationClass::Manual => self.levels.get(mode).map(ScheduleValue::Level),
            OperationClass::Auto => match self.target_at(now)? {
                ScheduleTarget::Level(name) => self.levels.get(name).map(ScheduleValue::Level),
                ScheduleTarget::ActiveProgram => Some(ScheduleValue::ActiveProgram),
            },
        }
    }

    /// Returns which setpoint a mode is using at `now`.
    #[must_use]
    pub fn setpoint_for_current_mode(
        &self,
        mode: &str,
        class: OperationClass,
        now: NaiveDateTime,
    ) -> Option<ScheduleTarget> {
        match class {
            OperationClass::Off => None,
            OperationClass::Manual => Some(ScheduleTarget::Level(mode.to_string())),
            OperationClass::Auto => self.target_at(now).cloned(),
        }
    }
}

/// Parses the switch points of a program record.
///
/// # Errors
///
/// Returns `ParseError` if the list is missing or an entry is malformed.
pub fn parse_switch_points(payload: &Payload) -> Result<Vec<SwitchPoint>, ParseError> {
    let entries = payload
        .get(SWITCH_POINTS)
        .and_then(Value::as_array)
        .ok_or_else(|| ParseError::MissingField(SWITCH_POINTS.to_string()))?;

    entries
        .iter()
        .map(|entry| {
            let day = entry
                .get("dayOfWeek")
                .and_then(Value::as_str)
                .and_then(parse_day)
                .ok_or_else(|| ParseError::UnexpectedFormat(format!("bad dayOfWeek in {entry}")))?;
            let minutes = entry
                .get("time")
                .and_then(Value::as_u64)
                .and_then(|m| u32::try_from(m).ok())
                .filter(|m| *m < 24 * 60)
                .ok_or_else(|| ParseError::UnexpectedFormat(format!("bad time in {entry}")))?;
            let setpoint = entry
                .get("setpoint")
                .and_then(Value::as_str)
                .ok_or_else(|| ParseError::MissingField("setpoint".to_string()))?;
            Ok(SwitchPoint {
                day,
                minutes,
                target: ScheduleTarget::parse(setpoint),
            })
        })
        .collect()
}

fn parse_day(day: &str) -> Option<Weekday> {
    match day {
        "Mo" => Some(Weekday::Mon),
        "Tu" => Some(Weekday::Tue),
        "We" => Some(Weekday::Wed),
        "Th" => Some(Weekday::Thu),
        "Fr" => Some(Weekday::Fri),
        "Sa" => Some(Weekday::Sat),
        "Su" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn at(raw: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").unwrap()
    }

    fn point(day: Weekday, minutes: u32, setpoint: &str) -> SwitchPoint {
        SwitchPoint {
            day,
            minutes,
            target: ScheduleTarget::parse(setpoint),
        }
    }

    fn level(name: &str, value: f64) -> SetpointLevel {
        SetpointLevel {
            name: name.to_string(),
            address: format!("/levels/{name}"),
            value: Some(value),
            min: Some(5.0),
            max: Some(30.0),
        }
    }

    fn engine() -> ScheduleEngine {
        let mut schedule = ScheduleEngine::new(
            "hc1",
            Some("/heatingCircuits/{circuit}/switchPrograms/{program}".to_string()),
            "%Y-%m-%dT%H:%M:%S",
        );
        schedule.load_program(
            "A",
            vec![
                point(Weekday::Mon, 360, "comfort"),
                point(Weekday::Mon, 1320, "eco"),
                point(Weekday::Wed, 600, ACTIVE_PROGRAM_SENTINEL),
            ],
        );
        schedule.insert_level(level("comfort", 21.0));
        schedule.insert_level(level("eco", 17.0));
        schedule
    }

    #[test]
    fn resolve_prefers_raw_program() {
        assert_eq!(
            ScheduleEngine::resolve_active_program(Some("B"), None).as_deref(),
            Some("B")
        );
    }

    #[test]
    fn resolve_falls_back_to_first_listed_program() {
        let list = json!({
            "references": [
                { "id": "/heatingCircuits/hc1/switchPrograms/A" },
                { "id": "/heatingCircuits/hc1/switchPrograms/B" }
            ]
        });
        let list = list.as_object().unwrap();
        assert_eq!(
            ScheduleEngine::resolve_active_program(Some(""), Some(list)).as_deref(),
            Some("A")
        );
    }

    #[test]
    fn resolve_without_any_program() {
        let empty = json!({ "references": [] });
        assert_eq!(
            ScheduleEngine::resolve_active_program(None, empty.as_object()),
            None
        );
        assert_eq!(ScheduleEngine::resolve_active_program(None, None), None);
    }

    #[test]
    fn window_covers_until_next_switch_point() {
        let schedule = engine();
        let monday_noon = at("2024-01-15T12:00:00");
        assert_eq!(
            schedule.target_at(monday_noon),
            Some(&ScheduleTarget::Level("comfort".to_string()))
        );
        let tuesday = at("2024-01-16T08:00:00");
        assert_eq!(
            schedule.target_at(tuesday),
            Some(&ScheduleTarget::Level("eco".to_string()))
        );
    }

    #[test]
    fn window_wraps_to_previous_week() {
        let schedule = engine();
        let early_monday = at("2024-01-15T05:59:00");
        assert_eq!(
            schedule.target_at(early_monday),
            Some(&ScheduleTarget::ActiveProgram)
        );
    }

    #[test]
    fn switch_point_starts_at_its_minute() {
        let schedule = engine();
        assert_eq!(
            schedule.target_at(at("2024-01-15T06:00:00")),
            Some(&ScheduleTarget::Level("comfort".to_string()))
        );
    }

    #[test]
    fn temperature_for_auto_mode_reads_level() {
        let schedule = engine();
        let value = schedule.temperature_for_current_mode(
            "clock",
            OperationClass::Auto,
            at("2024-01-15T12:00:00"),
        );
        assert!(matches!(value, Some(ScheduleValue::Level(l)) if l.value == Some(21.0)));
    }

    #[test]
    fn temperature_for_auto_mode_may_delegate() {
        let schedule = engine();
        let value = schedule.temperature_for_current_mode(
            "clock",
            OperationClass::Auto,
            at("2024-01-17T11:00:00"),
        );
        assert_eq!(value, Some(ScheduleValue::ActiveProgram));
    }

    #[test]
    fn temperature_for_manual_mode_reads_level_named_like_mode() {
        let schedule = engine();
        let now = at("2024-01-15T12:00:00");
        assert!(matches!(
            schedule.temperature_for_current_mode("eco", OperationClass::Manual, now),
            Some(ScheduleValue::Level(l)) if l.name == "eco"
        ));
        assert_eq!(
            schedule.temperature_for_current_mode("manual", OperationClass::Manual, now),
            None
        );
    }

    #[test]
    fn setpoint_for_current_mode_names_the_window() {
        let schedule = engine();
        let now = at("2024-01-15T23:00:00");
        assert_eq!(
            schedule.setpoint_for_current_mode("clock", OperationClass::Auto, now),
            Some(ScheduleTarget::Level("eco".to_string()))
        );
        assert_eq!(
            schedule.setpoint_for_current_mode("manual", OperationClass::Manual, now),
            Some(ScheduleTarget::Level("manual".to_string()))
        );
        assert_eq!(
            schedule.setpoint_for_current_mode("off", OperationClass::Off, now),
            None
        );
    }

    #[test]
    fn empty_schedule_has_no_window() {
        let schedule = ScheduleEngine::new("hc1", None, "%Y-%m-%dT%H:%M:%S");
        assert_eq!(schedule.target_at(at("2024-01-15T12:00:00")), None);
    }

    #[test]
    fn parse_time_uses_configured_format() {
        let schedule = ScheduleEngine::new("hc1", None, "%d.%m.%Y %H:%M");
        assert_eq!(
            schedule.parse_time("15.01.2024 10:30").unwrap(),
            at("2024-01-15T10:30:00")
        );
        assert!(matches!(
            schedule.parse_time("2024-01-15T10:30:00"),
            Err(ParseError::InvalidDate { .. })
        ));
    }

    #[test]
    fn parse_switch_points_rejects_bad_day() {
        let payload = json!({ "switchPoints": [{ "dayOfWeek": "Xx", "time": 0, "setpoint": "eco" }] });
        assert!(parse_switch_points(payload.as_object().unwrap()).is_err());
    }

    #[test]
    fn switching_program_drops_levels() {
        let mut schedule = engine();
        schedule.load_program("A", Vec::new());
        assert!(schedule.level("eco").is_some());
        schedule.load_program("B", Vec::new());
        assert!(schedule.level("eco").is_none());
    }

    #[tokio::test]
    async fn update_fetches_program_and_levels_once() {
        let transport = MockTransport::new()
            .with(
                "/heatingCircuits/hc1/switchPrograms/A",
                json!({
                    "switchPoints": [
                        { "dayOfWeek": "Mo", "time": 360, "setpoint": "comfort" },
                        { "dayOfWeek": "Mo", "time": 1320, "setpoint": "eco" },
                        { "dayOfWeek": "Tu", "time": 360, "setpoint": "comfort" }
                    ],
                    "setpointProperty": { "id": "/heatingCircuits/hc1/temperatureLevels" }
                }),
            )
            .with(
                "/heatingCircuits/hc1/temperatureLevels/comfort",
                json!({ "value": 21.5, "minValue": 5, "maxValue": 30 }),
            )
            .with(
                "/heatingCircuits/hc1/temperatureLevels/eco",
                json!({ "value": 16.0 }),
            );

        let mut schedule = ScheduleEngine::new(
            "hc1",
            Some("/heatingCircuits/{circuit}/switchPrograms/{program}".to_string()),
            "%Y-%m-%dT%H:%M:%S",
        );
        let now = at("2024-01-15T12:00:00");
        schedule.update(&transport, "A", now).await;
        schedule.update(&transport, "A", now).await;

        assert_eq!(schedule.active_program(), Some("A"));
        assert_eq!(schedule.switch_points().len(), 3);
        assert_eq!(schedule.level("comfort").unwrap().value, Some(21.5));
        assert_eq!(schedule.level("eco").unwrap().max, None);
        assert_eq!(schedule.time(), Some(now));

        let level_gets = transport
            .gets()
            .iter()
            .filter(|p| p.contains("temperatureLevels"))
            .count();
        assert_eq!(level_gets, 2);
    }

    #[tokio::test]
    async fn failed_program_fetch_keeps_previous_schedule() {
        let transport = MockTransport::new();
        let mut schedule = engine();
        schedule
            .update(&transport, "A", at("2024-01-15T12:00:00"))
            .await;
        assert_eq!(schedule.switch_points().len(), 3);
        assert!(schedule.level("comfort").is_some());
    }
}
