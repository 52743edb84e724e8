use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_with::{serde_as, NoneAsEmptyString};
use uuid::Uuid;

use crate::error::{UnknownMethodologyError, ValidationError};

/// Rendered in place of any optional field left blank on the form.
pub const INFER_FROM_IMAGE: &str = "infer from the image";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Methodology {
    #[serde(rename = "PPP")]
    Ppp,
    #[serde(rename = "TTT")]
    Ttt,
    #[serde(rename = "TBL")]
    TaskBased,
}

impl Methodology {
    pub const ALL: [Methodology; 3] = [Methodology::Ppp, Methodology::Ttt, Methodology::TaskBased];

    pub fn key(self) -> &'static str {
        match self {
            Self::Ppp => "PPP",
            Self::Ttt => "TTT",
            Self::TaskBased => "TBL",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Ppp => "PPP (Presentation-Practice-Production)",
            Self::Ttt => "TTT (Test-Teach-Test)",
            Self::TaskBased => "TBL (Task-Based Learning)",
        }
    }
}

impl FromStr for Methodology {
    type Err = UnknownMethodologyError;

    /// Accepts the short key or the full label, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(wanted) || m.label().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownMethodologyError(wanted.to_string()))
    }
}

impl fmt::Display for Methodology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How the class compares to the textbook's level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LevelMatch {
    Below,
    #[default]
    OnLevel,
    Above,
    Mixed,
}

impl LevelMatch {
    pub const ALL: [LevelMatch; 4] = [LevelMatch::Below, LevelMatch::OnLevel, LevelMatch::Above, LevelMatch::Mixed];

    pub fn key(self) -> &'static str {
        match self {
            Self::Below => "below",
            Self::OnLevel => "on-level",
            Self::Above => "above",
            Self::Mixed => "mixed",
        }
    }

    pub fn phrase(self) -> &'static str {
        match self {
            Self::Below => "below the textbook level",
            Self::OnLevel => "matches the textbook level",
            Self::Above => "above the textbook level",
            Self::Mixed => "mixed ability",
        }
    }
}

impl FromStr for LevelMatch {
    type Err = ValidationError;

    /// Also takes the 0..=3 slider positions of the form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
            return Self::ALL
                .get(idx)
                .copied()
                .ok_or_else(|| ValidationError::invalid("level_match", format!("no level position {idx}")));
        }
        Self::ALL
            .into_iter()
            .find(|l| l.key().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::invalid("level_match", format!("unknown value '{s}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LessonFormat {
    Individual,
    #[default]
    Group,
}

impl LessonFormat {
    pub fn key(self) -> &'static str {
        match self {
            Self::Individual => "individual",
            Self::Group => "group",
        }
    }
}

impl FromStr for LessonFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(Self::Individual),
            "group" => Ok(Self::Group),
            other => Err(ValidationError::invalid("format", format!("unknown lesson format '{other}'"))),
        }
    }
}

/// Task levels of the learning taxonomy, in the order they are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskLevel {
    Repetition,
    Application,
    Analysis,
    Creativity,
}

impl TaskLevel {
    pub const ALL: [TaskLevel; 4] =
        [TaskLevel::Repetition, TaskLevel::Application, TaskLevel::Analysis, TaskLevel::Creativity];

    pub fn key(self) -> &'static str {
        match self {
            Self::Repetition => "repetition",
            Self::Application => "application",
            Self::Analysis => "analysis",
            Self::Creativity => "creativity",
        }
    }
}

impl FromStr for TaskLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.key().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::invalid("task_levels", format!("unknown task level '{}'", s.trim())))
    }
}

pub const CEFR_LEVELS: [&str; 6] = ["A1", "A2", "B1", "B2", "C1", "C2"];

/// Raw form submission. Nothing here is trusted until it passes the normalizer.
#[serde_as]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LessonForm {
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub methodology: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub textbook: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub cefr_level: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub topic: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub goal: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub inventory: Option<String>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub extra_info: Option<String>,
    #[serde(default)]
    pub format: LessonFormat,
    #[serde(default)]
    pub class_size: Option<u32>,
    #[serde_as(as = "NoneAsEmptyString")]
    #[serde(default)]
    pub age: Option<String>,
    #[serde(default)]
    pub adults: bool,
    #[serde(default, deserialize_with = "level_match_from_key_or_position")]
    pub level_match: LevelMatch,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub homework_required: bool,
    #[serde(default)]
    pub web_search_enabled: bool,
    #[serde(default)]
    pub task_levels: Vec<TaskLevel>,
}

impl LessonForm {
    /// Sets one field from its textual form, as multipart submissions deliver them.
    pub fn apply_field(&mut self, name: &str, value: &str) -> Result<(), ValidationError> {
        let text = || Some(value.to_string()).filter(|v| !v.trim().is_empty());
        match name {
            "methodology" => self.methodology = text(),
            "textbook" => self.textbook = text(),
            "cefr_level" => self.cefr_level = text(),
            "topic" => self.topic = text(),
            "goal" => self.goal = text(),
            "inventory" => self.inventory = text(),
            "extra_info" => self.extra_info = text(),
            "age" => self.age = text(),
            "format" => self.format = value.parse()?,
            "level_match" => self.level_match = value.parse()?,
            "class_size" => self.class_size = parse_number("class_size", value)?,
            "duration_minutes" => self.duration_minutes = parse_number("duration_minutes", value)?,
            "adults" => self.adults = parse_flag(value),
            "homework_required" => self.homework_required = parse_flag(value),
            "web_search_enabled" => self.web_search_enabled = parse_flag(value),
            "task_levels" => {
                for part in value.split(',').filter(|p| !p.trim().is_empty()) {
                    let level: TaskLevel = part.parse()?;
                    if !self.task_levels.contains(&level) {
                        self.task_levels.push(level);
                    }
                }
            }
            _ => tracing::debug!("ignoring unknown form field '{}'", name),
        }
        Ok(())
    }
}

/// JSON bodies may send the key or the slider position, as a string or a number.
fn level_match_from_key_or_position<'de, D: Deserializer<'de>>(deserializer: D) -> Result<LevelMatch, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum KeyOrPosition {
        Position(u64),
        Key(String),
    }

    let parsed = match KeyOrPosition::deserialize(deserializer)? {
        KeyOrPosition::Position(idx) => idx.to_string().parse(),
        KeyOrPosition::Key(key) => key.parse(),
    };
    parsed.map_err(de::Error::custom)
}

fn parse_number(field: &'static str, value: &str) -> Result<Option<u32>, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value.parse().map(Some).map_err(|_| ValidationError::invalid(field, format!("'{value}' is not a whole number")))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1" | "yes")
}

/// An optional text field after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Given(String),
    InferFromImage,
}

impl FieldValue {
    pub fn from_input(raw: Option<String>) -> Self {
        match raw.as_deref().map(str::trim) {
            Some(v) if !v.is_empty() => Self::Given(v.to_string()),
            _ => Self::InferFromImage,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Given(v) => f.write_str(v),
            Self::InferFromImage => f.write_str(INFER_FROM_IMAGE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgeGroup {
    Adults,
    Age(String),
}

impl fmt::Display for AgeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adults => f.write_str("adults"),
            Self::Age(age) => f.write_str(age),
        }
    }
}

/// URL of a page image that already lives on the image host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference(String);

impl ImageReference {
    pub fn new(url: impl Into<String>) -> Option<Self> {
        let url = url.into().trim().to_string();
        (!url.is_empty()).then_some(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Normalized, immutable input of one generation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonParameters {
    pub methodology: Methodology,
    pub textbook: FieldValue,
    pub cefr_level: FieldValue,
    pub topic: FieldValue,
    pub goal: FieldValue,
    pub inventory: FieldValue,
    pub extra_info: FieldValue,
    pub format: LessonFormat,
    pub class_size: u32,
    pub age: AgeGroup,
    pub level_match: LevelMatch,
    pub duration_minutes: u32,
    pub homework_required: bool,
    pub task_levels: Vec<TaskLevel>,
    pub web_search_enabled: bool,
    pub image_reference: ImageReference,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionText(String);

impl InstructionText {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for InstructionText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedText(pub String);

#[derive(Debug, Serialize, Clone)]
pub struct LessonPlanResponse {
    pub request_id: Uuid,
    pub plan: String,
    pub instruction: String,
    pub methodology: Methodology,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub methodology: Methodology,
    pub instruction: String,
}

#[derive(Debug, Deserialize)]
pub struct JsonLessonRequest {
    #[serde(flatten)]
    pub form: LessonForm,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_base64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub text: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeedbackRequest {
    #[serde(default)]
    pub comment: String,
    pub rating: u8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn methodology_parses_keys_and_labels() {
        assert_eq!("ppp".parse::<Methodology>().unwrap(), Methodology::Ppp);
        assert_eq!("TTT (Test-Teach-Test)".parse::<Methodology>().unwrap(), Methodology::Ttt);
        assert_eq!(" TBL ".parse::<Methodology>().unwrap(), Methodology::TaskBased);
        assert_eq!("CLIL".parse::<Methodology>(), Err(UnknownMethodologyError("CLIL".into())));
    }

    #[test]
    fn level_match_accepts_slider_positions() {
        assert_eq!("0".parse::<LevelMatch>().unwrap(), LevelMatch::Below);
        assert_eq!("3".parse::<LevelMatch>().unwrap(), LevelMatch::Mixed);
        assert_eq!("on-level".parse::<LevelMatch>().unwrap(), LevelMatch::OnLevel);
        assert!("4".parse::<LevelMatch>().is_err());
    }

    #[test]
    fn json_level_match_agrees_with_multipart() {
        let form: LessonForm = serde_json::from_str(r#"{"level_match":"2"}"#).unwrap();
        assert_eq!(form.level_match, LevelMatch::Above);
        let form: LessonForm = serde_json::from_str(r#"{"level_match":0}"#).unwrap();
        assert_eq!(form.level_match, LevelMatch::Below);
        let form: LessonForm = serde_json::from_str(r#"{"level_match":"Mixed"}"#).unwrap();
        assert_eq!(form.level_match, LevelMatch::Mixed);
        assert!(serde_json::from_str::<LessonForm>(r#"{"level_match":"way-above"}"#).is_err());
        assert_eq!(serde_json::to_value(LevelMatch::OnLevel).unwrap(), "on-level");
    }

    #[test]
    fn json_form_treats_empty_strings_as_absent() {
        let form: LessonForm = serde_json::from_str(
            r#"{"methodology":"PPP","textbook":"","topic":"Daily routines","level_match":"mixed","task_levels":["analysis"]}"#,
        ).unwrap();
        assert_eq!(form.textbook, None);
        assert_eq!(form.topic.as_deref(), Some("Daily routines"));
        assert_eq!(form.level_match, LevelMatch::Mixed);
        assert_eq!(form.format, LessonFormat::Group);
        assert_eq!(form.task_levels, vec![TaskLevel::Analysis]);
    }

    #[test]
    fn apply_field_parses_multipart_values() {
        let mut form = LessonForm::default();
        form.apply_field("class_size", "12").unwrap();
        form.apply_field("adults", "on").unwrap();
        form.apply_field("topic", "   ").unwrap();
        form.apply_field("task_levels", "creativity,repetition,creativity").unwrap();
        form.apply_field("format", "Individual").unwrap();
        assert_eq!(form.class_size, Some(12));
        assert!(form.adults);
        assert_eq!(form.topic, None);
        assert_eq!(form.task_levels, vec![TaskLevel::Creativity, TaskLevel::Repetition]);
        assert_eq!(form.format, LessonFormat::Individual);

        let err = form.apply_field("duration_minutes", "an hour").unwrap_err();
        assert_eq!(err.fields(), vec!["duration_minutes"]);
    }

    #[test]
    fn blank_field_becomes_sentinel() {
        assert_eq!(FieldValue::from_input(Some("  ".into())), FieldValue::InferFromImage);
        assert_eq!(FieldValue::from_input(Some(" Spotlight 5 ".into())).to_string(), "Spotlight 5");
        assert_eq!(FieldValue::InferFromImage.to_string(), INFER_FROM_IMAGE);
    }
}
