//! Response generation
//!
//! Turns a classified intent into the sentence the assistant speaks. Weather
//! and calendar intents call out to their services; any failure there
//! becomes a spoken apology rather than an error.

use std::sync::Arc;

use chrono::Local;

use crate::config::DEFAULT_LOCATION;
use crate::integrations::{CalendarEntry, CalendarService, WeatherService};
use crate::nlu::{Intent, IntentName, SlotValue};

pub const GREETING: &str = "Hello! How can I help?";
pub const FAREWELL: &str = "Goodbye!";
pub const NOT_UNDERSTOOD: &str = "Sorry, I didn't get that.";
pub const CALENDAR_UNAVAILABLE: &str = "Calendar API is not available yet.";

/// Builds responses for intents
#[derive(Clone)]
pub struct DialogueManager {
    weather: Option<Arc<dyn WeatherService>>,
    calendar: Option<Arc<dyn CalendarService>>,
    default_location: String,
}

impl Default for DialogueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DialogueManager {
    /// Manager with no services attached
    #[must_use]
    pub fn new() -> Self {
        Self {
            weather: None,
            calendar: None,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }

    #[must_use]
    pub fn with_weather(mut self, weather: Arc<dyn WeatherService>) -> Self {
        self.weather = Some(weather);
        self
    }

    #[must_use]
    pub fn with_calendar(mut self, calendar: Arc<dyn CalendarService>) -> Self {
        self.calendar = Some(calendar);
        self
    }

    /// Location used when the question names none
    #[must_use]
    pub fn with_default_location(mut self, location: impl Into<String>) -> Self {
        self.default_location = location.into();
        self
    }

    /// Response for `intent`
    ///
    /// May block on network calls for weather and calendar questions.
    #[must_use]
    pub fn respond(&self, intent: &Intent, raw_text: &str) -> String {
        tracing::debug!(intent = %intent.name, raw = raw_text, "responding");

        match intent.name {
            IntentName::WeatherQuery => self.weather_response(intent),
            IntentName::CalendarQuery => self.calendar_response(),
            IntentName::GetTime => format!("It is {}", Local::now().format("%H:%M")),
            IntentName::Greet => GREETING.to_string(),
            IntentName::Exit => FAREWELL.to_string(),
            IntentName::Fallback => NOT_UNDERSTOOD.to_string(),
        }
    }

    fn weather_response(&self, intent: &Intent) -> String {
        let location = intent
            .slot("location")
            .and_then(SlotValue::as_text)
            .unwrap_or(&self.default_location);
        let day = intent
            .slot("day")
            .and_then(SlotValue::as_number)
            .map_or(0, |d| usize::try_from(d).unwrap_or(0));

        let Some(weather) = &self.weather else {
            return "Sorry, the weather service is not configured.".to_string();
        };

        let report = match weather.forecast(location) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(location, error = %e, "weather lookup failed");
                return format!("Sorry, I could not get the weather for {location} right now.");
            }
        };

        let Some(forecast) = report.forecast.get(day) else {
            return format!(
                "Sorry, I only have weather data for {} days ahead.",
                report.forecast.len()
            );
        };

        let day_phrase = match day {
            0 => "today".to_string(),
            1 => "tomorrow".to_string(),
            _ => format!("on {}", forecast.day),
        };

        format!(
            "The weather in {location} {day_phrase} is {}, with temperatures between {} and {} degrees Celsius.",
            forecast.weather, forecast.temperature.min, forecast.temperature.max
        )
    }

    fn calendar_response(&self) -> String {
        let Some(calendar) = &self.calendar else {
            return CALENDAR_UNAVAILABLE.to_string();
        };

        match calendar.list() {
            Ok(entries) => describe_entries(&entries),
            Err(e) => {
                tracing::warn!(error = %e, "calendar lookup failed");
                "Sorry, I could not reach your calendar right now.".to_string()
            }
        }
    }
}

fn describe_entries(entries: &[CalendarEntry]) -> String {
    let Some(earliest) = entries
        .iter()
        .filter(|e| !e.start_time.is_empty())
        .min_by(|a, b| a.start_time.cmp(&b.start_time))
        .or_else(|| entries.first())
    else {
        return "You have no calendar entries.".to_string();
    };

    let count = match entries.len() {
        1 => "1 calendar entry".to_string(),
        n => format!("{n} calendar entries"),
    };

    let title = if earliest.title.is_empty() {
        "an untitled entry"
    } else {
        earliest.title.as_str()
    };

    if earliest.start_time.is_empty() {
        format!("You have {count}. The first one is {title}.")
    } else {
        format!(
            "You have {count}. The earliest is {title} at {}.",
            earliest.start_time.replace('T', " ")
        )
    }
}
