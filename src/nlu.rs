//! Intent classification
//!
//! Maps a transcript to an [`Intent`] with an ordered list of keyword rules.
//! The first matching rule wins, so overlapping vocabulary ("what's the
//! weather for my meeting") resolves to the earlier rule.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Intent names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IntentName {
    GetTime,
    Greet,
    Exit,
    WeatherQuery,
    CalendarQuery,
    /// Nothing matched; the text is kept in the `text` slot
    Fallback,
}

impl IntentName {
    /// Snake-case name used in logs and output
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetTime => "get_time",
            Self::Greet => "greet",
            Self::Exit => "exit",
            Self::WeatherQuery => "weather_query",
            Self::CalendarQuery => "calendar_query",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for IntentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A slot value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Text(String),
    Number(i64),
}

impl SlotValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }

    #[must_use]
    pub const fn as_number(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

/// A classified utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    pub name: IntentName,
    pub slots: BTreeMap<String, SlotValue>,
}

impl Intent {
    /// Intent with no slots
    #[must_use]
    pub const fn new(name: IntentName) -> Self {
        Self {
            name,
            slots: BTreeMap::new(),
        }
    }

    /// Add a slot
    #[must_use]
    pub fn with_slot(mut self, key: impl Into<String>, value: SlotValue) -> Self {
        self.slots.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn slot(&self, key: &str) -> Option<&SlotValue> {
        self.slots.get(key)
    }

    /// Whether this intent ends the session
    #[must_use]
    pub fn is_exit(&self) -> bool {
        self.name == IntentName::Exit
    }
}

static WEATHER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(weather|temperature|forecast|rain|raining|sunny|cloudy|snow)\b")
        .expect("valid regex")
});

static CALENDAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(calendar|calender|meeting|meet|event|schedule|appointment|reminder)\b")
        .expect("valid regex")
});

static TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(time|current time|what time is it|what('s| is) the time)\b")
        .expect("valid regex")
});

static GREET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(hi|hello|hey|good (morning|afternoon|evening))\b").expect("valid regex")
});

static EXIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(exit|quit|stop|close|goodbye)\b").expect("valid regex"));

static IN_DAYS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bin (\d+|one|two|three|four|five|six) days?\b").expect("valid regex")
});

static RELATIVE_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(the )?(day after tomorrow|tomorrow|today|tonight)\b").expect("valid regex")
});

static TRAILING_PLACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bin ([a-z][a-z .'-]*?)\s*$").expect("valid regex"));

/// Rules in priority order
static RULES: LazyLock<[(&'static Regex, IntentName); 5]> = LazyLock::new(|| {
    [
        (&*WEATHER, IntentName::WeatherQuery),
        (&*CALENDAR, IntentName::CalendarQuery),
        (&*TIME, IntentName::GetTime),
        (&*GREET, IntentName::Greet),
        (&*EXIT, IntentName::Exit),
    ]
});

/// Classify a transcript
///
/// Returns `None` only when the text is empty after trimming; anything else
/// yields an intent, with [`IntentName::Fallback`] for unmatched text.
#[must_use]
pub fn classify(text: &str) -> Option<Intent> {
    let normalized = text.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }

    let name = RULES
        .iter()
        .find(|(rule, _)| rule.is_match(&normalized))
        .map_or(IntentName::Fallback, |(_, name)| *name);

    let intent = match name {
        IntentName::WeatherQuery => weather_slots(&normalized),
        IntentName::Fallback => {
            Intent::new(IntentName::Fallback).with_slot("text", SlotValue::Text(normalized))
        }
        other => Intent::new(other),
    };

    tracing::debug!(intent = %intent.name, slots = ?intent.slots, "classified");
    Some(intent)
}

/// Extract `day` and `location` from a weather question
fn weather_slots(text: &str) -> Intent {
    let mut intent = Intent::new(IntentName::WeatherQuery);

    if let Some(day) = day_offset(text) {
        intent = intent.with_slot("day", SlotValue::Number(day));
    }

    let without_days = IN_DAYS.replace_all(text, "");
    let without_days = RELATIVE_DAY.replace_all(&without_days, "");
    let stripped = without_days.trim_end_matches(|c: char| c.is_whitespace() || "?.!,".contains(c));

    if let Some(place) = TRAILING_PLACE
        .captures(stripped)
        .and_then(|c| c.get(1))
        .map(|m| title_case(m.as_str()))
        .filter(|p| !p.is_empty())
    {
        intent = intent.with_slot("location", SlotValue::Text(place));
    }

    intent
}

fn day_offset(text: &str) -> Option<i64> {
    if let Some(caps) = IN_DAYS.captures(text) {
        return number_word(&caps[1]);
    }
    RELATIVE_DAY.captures(text).map(|caps| match &caps[2] {
        "day after tomorrow" => 2,
        "tomorrow" => 1,
        _ => 0,
    })
}

fn number_word(word: &str) -> Option<i64> {
    match word {
        "one" => Some(1),
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        "six" => Some(6),
        digits => digits.parse().ok(),
    }
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}
