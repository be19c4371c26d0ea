//! Text-to-speech (TTS) output
//!
//! Synthesis runs through local command-line engines. The backend is chosen
//! once from an ordered preference list; the first one that initializes is
//! kept for the life of the process.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use crate::{Error, Result};

/// eSpeak rate bounds (words per minute)
const ESPEAK_RATE: (u32, u32) = (80, 450);

/// eSpeak amplitude bounds
const ESPEAK_VOLUME: (u32, u32) = (0, 200);

/// A synthesis engine
pub trait SpeechBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Speak `text`, blocking until playback completes
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to synthesize or play
    fn speak(&self, text: &str) -> Result<()>;

    /// Voices the engine offers
    fn voices(&self) -> Vec<Voice>;
}

/// Backends available in a preference list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// `espeak-ng` / `espeak`
    Espeak,
    /// speech-dispatcher via `spd-say`
    SpeechDispatcher,
    /// Print responses to stdout
    Console,
}

impl BackendKind {
    /// Every backend, in default preference order
    pub const ALL: [Self; 3] = [Self::Espeak, Self::SpeechDispatcher, Self::Console];

    /// Name used in config and on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Espeak => "espeak",
            Self::SpeechDispatcher => "spd-say",
            Self::Console => "console",
        }
    }

    /// Initialize this backend
    ///
    /// # Errors
    ///
    /// Returns error if the engine is not installed
    pub fn init(self, options: &SpeechOptions) -> Result<Box<dyn SpeechBackend>> {
        match self {
            Self::Espeak => Ok(Box::new(EspeakBackend::new(options)?)),
            Self::SpeechDispatcher => Ok(Box::new(SpeechDispatcherBackend::new(options)?)),
            Self::Console => Ok(Box::new(ConsoleBackend)),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "espeak" | "espeak-ng" => Ok(Self::Espeak),
            "spd-say" | "speech-dispatcher" | "spd" => Ok(Self::SpeechDispatcher),
            "console" | "stdout" => Ok(Self::Console),
            other => Err(Error::Config(format!("unknown TTS backend: {other}"))),
        }
    }
}

/// A voice reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voice {
    /// Identifier passed back to the engine
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Language codes, e.g. `en-us`
    pub languages: Vec<String>,
}

/// Requested voice, matched in order: name, language, first voice
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoicePreference {
    pub name: Option<String>,
    pub language: Option<String>,
}

/// Shared synthesis settings
#[derive(Debug, Clone)]
pub struct SpeechOptions {
    pub voice: VoicePreference,
    /// Words per minute
    pub rate: u32,
    /// Engine volume (eSpeak amplitude scale)
    pub volume: u32,
}

impl Default for SpeechOptions {
    fn default() -> Self {
        Self {
            voice: VoicePreference {
                name: None,
                language: Some("en".to_string()),
            },
            rate: 180,
            volume: 120,
        }
    }
}

/// Pick a voice with the three-tier cascade
#[must_use]
pub fn select_voice<'a>(voices: &'a [Voice], preference: &VoicePreference) -> Option<&'a Voice> {
    if let Some(wanted) = preference.name.as_deref().map(str::to_lowercase) {
        let by_name = voices.iter().find(|v| {
            v.name.to_lowercase().contains(&wanted) || v.id.to_lowercase() == wanted
        });
        if by_name.is_some() {
            return by_name;
        }
        tracing::debug!(voice = %wanted, "requested voice not found");
    }

    if let Some(language) = preference.language.as_deref() {
        let by_code = voices
            .iter()
            .find(|v| v.languages.iter().any(|l| language_matches(l, language)));
        if by_code.is_some() {
            return by_code;
        }
        let by_language_name = language_name(language).and_then(|name| {
            voices
                .iter()
                .find(|v| v.name.to_lowercase().contains(name))
        });
        if by_language_name.is_some() {
            return by_language_name;
        }
        tracing::debug!(language, "no voice for language");
    }

    voices.first()
}

/// `en` matches `en`, `en-us` and `en_GB`
fn language_matches(code: &str, wanted: &str) -> bool {
    let code = code.to_lowercase().replace('_', "-");
    let wanted = wanted.to_lowercase().replace('_', "-");
    code == wanted || code.starts_with(&format!("{wanted}-"))
}

fn language_name(code: &str) -> Option<&'static str> {
    let primary = code.split(['-', '_']).next()?.to_lowercase();
    match primary.as_str() {
        "en" => Some("english"),
        "de" => Some("german"),
        "fr" => Some("french"),
        "es" => Some("spanish"),
        "it" => Some("italian"),
        "nl" => Some("dutch"),
        _ => None,
    }
}

/// The selected backend
pub struct SpeechOutput {
    backend: Box<dyn SpeechBackend>,
}

impl SpeechOutput {
    /// Initialize the first backend in `preferences` that works
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if no backend initializes
    pub fn select(preferences: &[BackendKind], options: &SpeechOptions) -> Result<Self> {
        Self::select_with(preferences, |kind| kind.init(options))
    }

    /// Like [`SpeechOutput::select`] with a custom backend factory
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tts`] if the factory fails for every preference
    pub fn select_with<F>(preferences: &[BackendKind], mut factory: F) -> Result<Self>
    where
        F: FnMut(BackendKind) -> Result<Box<dyn SpeechBackend>>,
    {
        let mut failures = Vec::new();

        for &kind in preferences {
            match factory(kind) {
                Ok(backend) => {
                    tracing::info!(backend = backend.name(), "speech output ready");
                    return Ok(Self { backend });
                }
                Err(e) => {
                    tracing::warn!(backend = %kind, error = %e, "speech backend unavailable");
                    failures.push(format!("{kind}: {e}"));
                }
            }
        }

        if failures.is_empty() {
            return Err(Error::Tts("no speech backends configured".to_string()));
        }
        Err(Error::Tts(format!(
            "no speech backend could be initialized ({})",
            failures.join("; ")
        )))
    }

    /// Wrap an already initialized backend
    #[must_use]
    pub fn from_backend(backend: Box<dyn SpeechBackend>) -> Self {
        Self { backend }
    }

    /// Name of the backend in use
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Voices offered by the backend in use
    #[must_use]
    pub fn voices(&self) -> Vec<Voice> {
        self.backend.voices()
    }

    /// Speak `text` and block until done
    ///
    /// Empty text is skipped. Synthesis failures are logged; a missed
    /// response never takes down the session.
    pub fn speak(&self, text: &str) {
        if let Err(e) = self.try_speak(text) {
            tracing::warn!(backend = self.backend.name(), error = %e, "failed to speak");
        }
    }

    /// Speak `text`, returning synthesis failures
    ///
    /// # Errors
    ///
    /// Returns error if the backend fails
    pub fn try_speak(&self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        tracing::debug!(backend = self.backend.name(), text, "speaking");
        self.backend.speak(text)
    }
}

impl fmt::Debug for SpeechOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpeechOutput")
            .field("backend", &self.backend.name())
            .finish()
    }
}

/// Run a synthesis command to completion
fn run(program: &Path, args: &[String]) -> Result<()> {
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| Error::Tts(format!("failed to run {}: {e}", program.display())))?;

    if status.success() {
        Ok(())
    } else {
        Err(Error::Tts(format!(
            "{} exited with code {}",
            program.display(),
            status
                .code()
                .map_or_else(|| "none".to_string(), |c| c.to_string())
        )))
    }
}

fn capture_stdout(program: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// eSpeak / eSpeak NG
pub struct EspeakBackend {
    program: PathBuf,
    voice: Option<String>,
    rate: u32,
    volume: u32,
    voices: Vec<Voice>,
}

impl EspeakBackend {
    /// Locate eSpeak on `PATH` and resolve the voice
    ///
    /// # Errors
    ///
    /// Returns error if neither `espeak-ng` nor `espeak` is installed
    pub fn new(options: &SpeechOptions) -> Result<Self> {
        let program = which::which("espeak-ng")
            .or_else(|_| which::which("espeak"))
            .map_err(|_| Error::Tts("espeak-ng/espeak not found on PATH".to_string()))?;

        let voices = capture_stdout(&program, &["--voices"])
            .map(|listing| parse_espeak_voices(&listing))
            .unwrap_or_default();

        let voice = select_voice(&voices, &options.voice).map(|v| v.id.clone());
        tracing::debug!(
            program = %program.display(),
            voices = voices.len(),
            voice = voice.as_deref().unwrap_or("default"),
            "espeak initialized"
        );

        Ok(Self {
            program,
            voice,
            rate: options.rate.clamp(ESPEAK_RATE.0, ESPEAK_RATE.1),
            volume: options.volume.clamp(ESPEAK_VOLUME.0, ESPEAK_VOLUME.1),
            voices,
        })
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = Vec::with_capacity(8);
        if let Some(voice) = &self.voice {
            args.push("-v".to_string());
            args.push(voice.clone());
        }
        args.push("-s".to_string());
        args.push(self.rate.to_string());
        args.push("-a".to_string());
        args.push(self.volume.to_string());
        // Text starting with '-' must not be read as a flag
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

impl SpeechBackend for EspeakBackend {
    fn name(&self) -> &'static str {
        "espeak"
    }

    fn speak(&self, text: &str) -> Result<()> {
        run(&self.program, &self.args(text))
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}

/// Parse `espeak --voices`
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  en-gb           M  english              en            (en 2)
/// ```
fn parse_espeak_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let _priority = cols.next()?;
            let language = cols.next()?;
            let _gender = cols.next()?;
            let name = cols.next()?;
            Some(Voice {
                id: language.to_string(),
                name: name.replace('_', " "),
                languages: vec![language.to_string()],
            })
        })
        .collect()
}

/// speech-dispatcher through `spd-say`
pub struct SpeechDispatcherBackend {
    program: PathBuf,
    voice: Option<String>,
    language: Option<String>,
    voices: Vec<Voice>,
}

impl SpeechDispatcherBackend {
    /// Locate `spd-say` on `PATH`
    ///
    /// # Errors
    ///
    /// Returns error if `spd-say` is not installed
    pub fn new(options: &SpeechOptions) -> Result<Self> {
        let program = which::which("spd-say")
            .map_err(|_| Error::Tts("spd-say not found on PATH".to_string()))?;

        let voices = capture_stdout(&program, &["-L"])
            .map(|listing| parse_spd_voices(&listing))
            .unwrap_or_default();

        let chosen = select_voice(&voices, &options.voice);
        let voice = chosen.map(|v| v.id.clone());
        let language = chosen
            .and_then(|v| v.languages.first().cloned())
            .or_else(|| options.voice.language.clone());

        tracing::debug!(
            voices = voices.len(),
            voice = voice.as_deref().unwrap_or("default"),
            "spd-say initialized"
        );

        Ok(Self {
            program,
            voice,
            language,
            voices,
        })
    }

    fn args(&self, text: &str) -> Vec<String> {
        let mut args = vec!["-w".to_string()];
        if let Some(language) = &self.language {
            args.push("-l".to_string());
            args.push(language.clone());
        }
        if let Some(voice) = &self.voice {
            args.push("-y".to_string());
            args.push(voice.clone());
        }
        args.push("--".to_string());
        args.push(text.to_string());
        args
    }
}

impl SpeechBackend for SpeechDispatcherBackend {
    fn name(&self) -> &'static str {
        "spd-say"
    }

    fn speak(&self, text: &str) -> Result<()> {
        run(&self.program, &self.args(text))
    }

    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }
}

/// Parse `spd-say -L` (`NAME LANGUAGE VARIANT` table)
fn parse_spd_voices(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("NAME"))
        .filter_map(|line| {
            let mut cols = line.split_whitespace();
            let name = cols.next()?;
            let language = cols.next()?;
            Some(Voice {
                id: name.to_string(),
                name: name.to_string(),
                languages: vec![language.to_string()],
            })
        })
        .collect()
}

/// Prints responses instead of speaking them
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleBackend;

impl SpeechBackend for ConsoleBackend {
    fn name(&self) -> &'static str {
        "console"
    }

    fn speak(&self, text: &str) -> Result<()> {
        println!("hark: {text}");
        Ok(())
    }

    fn voices(&self) -> Vec<Voice> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn voice(id: &str, name: &str, language: &str) -> Voice {
        Voice {
            id: id.to_string(),
            name: name.to_string(),
            languages: vec![language.to_string()],
        }
    }

    fn catalog() -> Vec<Voice> {
        vec![
            voice("de", "German", "de"),
            voice("en-gb", "English", "en-gb"),
            voice("en-us", "English America", "en_US"),
        ]
    }

    #[test]
    fn test_select_voice_by_name() {
        let voices = catalog();
        let pref = VoicePreference {
            name: Some("america".to_string()),
            language: Some("de".to_string()),
        };
        assert_eq!(select_voice(&voices, &pref).unwrap().id, "en-us");
    }

    #[test]
    fn test_select_voice_by_language() {
        let voices = catalog();
        let pref = VoicePreference {
            name: Some("missing".to_string()),
            language: Some("en".to_string()),
        };
        assert_eq!(select_voice(&voices, &pref).unwrap().id, "en-gb");

        let pref = VoicePreference {
            name: None,
            language: Some("en-US".to_string()),
        };
        assert_eq!(select_voice(&voices, &pref).unwrap().id, "en-us");
    }

    #[test]
    fn test_select_voice_by_language_name() {
        let voices = vec![voice("v1", "Samantha", "x"), voice("v2", "Daniel (English)", "x")];
        let pref = VoicePreference {
            name: None,
            language: Some("en".to_string()),
        };
        assert_eq!(select_voice(&voices, &pref).unwrap().id, "v2");
    }

    #[test]
    fn test_select_voice_falls_back_to_first() {
        let voices = catalog();
        let pref = VoicePreference {
            name: None,
            language: Some("ja".to_string()),
        };
        assert_eq!(select_voice(&voices, &pref).unwrap().id, "de");
        assert!(select_voice(&[], &pref).is_none());
    }

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("espeak".parse::<BackendKind>().unwrap(), BackendKind::Espeak);
        assert_eq!(" SPD-SAY ".parse::<BackendKind>().unwrap(), BackendKind::SpeechDispatcher);
        assert_eq!("console".parse::<BackendKind>().unwrap(), BackendKind::Console);
        assert!(matches!("pyttsx".parse::<BackendKind>(), Err(Error::Config(_))));
    }

    struct Recording {
        spoken: Arc<Mutex<Vec<String>>>,
    }

    impl SpeechBackend for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn speak(&self, text: &str) -> Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn voices(&self) -> Vec<Voice> {
            Vec::new()
        }
    }

    #[test]
    fn test_select_first_working_backend() {
        let spoken = Arc::new(Mutex::new(Vec::new()));
        let mut tried = Vec::new();
        let sink = Arc::clone(&spoken);

        let output = SpeechOutput::select_with(
            &[BackendKind::Espeak, BackendKind::SpeechDispatcher, BackendKind::Console],
            |kind| {
                tried.push(kind);
                match kind {
                    BackendKind::Espeak => Err(Error::Tts("missing".to_string())),
                    _ => Ok(Box::new(Recording {
                        spoken: Arc::clone(&sink),
                    }) as Box<dyn SpeechBackend>),
                }
            },
        )
        .unwrap();

        assert_eq!(tried, vec![BackendKind::Espeak, BackendKind::SpeechDispatcher]);
        output.speak("hello");
        output.speak("   ");
        assert_eq!(*spoken.lock().unwrap(), vec!["hello"]);
    }

    #[test]
    fn test_select_fails_when_nothing_initializes() {
        let result = SpeechOutput::select_with(&[BackendKind::Espeak], |_| {
            Err(Error::Tts("missing".to_string()))
        });
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Tts(_)));
        assert!(err.is_fatal_at_startup());

        assert!(SpeechOutput::select_with(&[], |kind| kind.init(&SpeechOptions::default())).is_err());
    }

    #[test]
    fn test_parse_espeak_voices() {
        let listing = "Pty Language       Age/Gender VoiceName          File                 Other Languages\n \
                        5  af              --/M      Afrikaans          gmw/af\n \
                        2  en-gb           --/M      English_(Great_Britain) gmw/en  (en 2)\n";
        let voices = parse_espeak_voices(listing);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[1].id, "en-gb");
        assert_eq!(voices[1].name, "English (Great Britain)");
    }

    #[test]
    fn test_parse_spd_voices() {
        let listing = "         NAME     LANGUAGE  VARIANT\n    Alan  en-gb  none\n    Anna  de  none\n";
        let voices = parse_spd_voices(listing);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].id, "Alan");
        assert_eq!(voices[1].languages, vec!["de"]);
    }

    #[test]
    fn test_espeak_args_clamped() {
        let backend = EspeakBackend {
            program: PathBuf::from("espeak-ng"),
            voice: Some("en-gb".to_string()),
            rate: 1000u32.clamp(ESPEAK_RATE.0, ESPEAK_RATE.1),
            volume: 500u32.clamp(ESPEAK_VOLUME.0, ESPEAK_VOLUME.1),
            voices: Vec::new(),
        };
        assert_eq!(
            backend.args("hi"),
            vec!["-v", "en-gb", "-s", "450", "-a", "200", "--", "hi"]
        );
    }

    #[test]
    fn test_text_never_parsed_as_flags() {
        let espeak = EspeakBackend {
            program: PathBuf::from("espeak-ng"),
            voice: None,
            rate: 180,
            volume: 120,
            voices: Vec::new(),
        };
        assert_eq!(
            espeak.args("-x --stdout"),
            vec!["-s", "180", "-a", "120", "--", "-x --stdout"]
        );

        let spd = SpeechDispatcherBackend {
            program: PathBuf::from("spd-say"),
            voice: Some("Alan".to_string()),
            language: Some("en".to_string()),
            voices: Vec::new(),
        };
        assert_eq!(
            spd.args("-C"),
            vec!["-w", "-l", "en", "-y", "Alan", "--", "-C"]
        );
    }
}
