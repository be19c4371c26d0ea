//! Calendar service integration
//!
//! REST client for a simple calendar store addressed by `?id=N` query
//! parameters on a single endpoint.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::integrations::check_status;
use crate::{Error, Result};

/// Calendar operations used by the assistant
pub trait CalendarService: Send + Sync {
    /// Create an entry
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success status
    fn create(&self, entry: &NewEntry) -> Result<CalendarEntry>;

    /// Fetch one entry
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success status
    fn get(&self, id: i64) -> Result<CalendarEntry>;

    /// Change the provided fields of an entry
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success status
    fn update(&self, id: i64, changes: &EntryUpdate) -> Result<CalendarEntry>;

    /// Delete an entry
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a non-success status, or a
    /// response that does not confirm the deletion
    fn delete(&self, id: i64) -> Result<CalendarEntry>;

    /// All entries
    ///
    /// # Errors
    ///
    /// Returns error on transport failure or a non-success status
    fn list(&self) -> Result<Vec<CalendarEntry>>;
}

/// A calendar entry
///
/// Servers may omit fields; missing ones deserialize to their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarEntry {
    pub id: i64,
    pub title: String,
    pub description: String,
    /// ISO-8601 local time, e.g. `2025-11-03T09:00`
    pub start_time: String,
    pub end_time: String,
    pub location: Option<String>,
}

/// Fields for a new entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewEntry {
    pub title: String,
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    pub location: String,
}

/// Partial update; only `Some` fields are sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntryUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Deserialize)]
struct EntryBody {
    entry: CalendarEntry,
}

#[derive(Deserialize)]
struct EntriesBody {
    #[serde(default)]
    entries: Vec<CalendarEntry>,
}

#[derive(Deserialize)]
struct DeleteBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    entry: Option<CalendarEntry>,
}

/// Client for the calendar REST service
#[derive(Debug, Clone)]
pub struct RestCalendarClient {
    /// HTTP client
    client: Client,
    /// Endpoint URL
    base_url: String,
}

impl RestCalendarClient {
    /// Create a new calendar client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client can't be built
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Endpoint URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn entry_url(&self, id: i64) -> String {
        format!("{}?id={id}", self.base_url)
    }
}

fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let response = check_status(response)?;
    let text = response.text()?;
    Ok(serde_json::from_str(&text)?)
}

impl CalendarService for RestCalendarClient {
    fn create(&self, entry: &NewEntry) -> Result<CalendarEntry> {
        tracing::debug!(title = %entry.title, "creating calendar entry");
        let response = self.client.post(&self.base_url).json(entry).send()?;
        let body: EntryBody = parse(response)?;
        Ok(body.entry)
    }

    fn get(&self, id: i64) -> Result<CalendarEntry> {
        let response = self.client.get(self.entry_url(id)).send()?;
        let body: EntryBody = parse(response)?;
        Ok(body.entry)
    }

    fn update(&self, id: i64, changes: &EntryUpdate) -> Result<CalendarEntry> {
        tracing::debug!(id, "updating calendar entry");
        let response = self.client.put(self.entry_url(id)).json(changes).send()?;
        let body: EntryBody = parse(response)?;
        Ok(body.entry)
    }

    fn delete(&self, id: i64) -> Result<CalendarEntry> {
        tracing::debug!(id, "deleting calendar entry");
        let response = self.client.delete(self.entry_url(id)).send()?;
        let body: DeleteBody = parse(response)?;

        match body.message.as_deref() {
            Some("deleted") => Ok(body.entry.unwrap_or(CalendarEntry {
                id,
                ..CalendarEntry::default()
            })),
            other => Err(Error::Calendar(format!(
                "Could not delete the event {id} (message: {})",
                other.unwrap_or("none")
            ))),
        }
    }

    fn list(&self) -> Result<Vec<CalendarEntry>> {
        let response = self.client.get(&self.base_url).send()?;
        let body: EntriesBody = parse(response)?;
        tracing::debug!(count = body.entries.len(), "listed calendar entries");
        Ok(body.entries)
    }
}
