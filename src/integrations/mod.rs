//! External service integrations
//!
//! Weather and calendar collaborators. Clients are blocking: they are called
//! from the recognition thread, which already serializes all responses.

pub mod calendar;
pub mod weather;

pub use calendar::{CalendarEntry, CalendarService, EntryUpdate, NewEntry, RestCalendarClient};
pub use weather::{DayForecast, RestWeatherClient, Temperature, WeatherReport, WeatherService};

use reqwest::blocking::Response;

use crate::{Error, Result};

/// Turn a non-success response into [`Error::Api`]
fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    tracing::warn!(status = %status, "service returned error");
    Err(Error::Api {
        status: status.as_u16(),
        body,
    })
}
