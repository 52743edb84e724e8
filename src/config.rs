use std::{path::PathBuf, time::Duration};

use crate::error::ConfigError;

/// Inclusive bounds for a numeric form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds { pub min: u32, pub max: u32 }

impl Bounds {
    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Pulls a built-in default inside operator-configured bounds.
    pub fn clamp(&self, value: u32) -> u32 {
        value.clamp(self.min, self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub class_size: Bounds,
    pub duration_minutes: Bounds,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            class_size: Bounds { min: 1, max: 40 },
            duration_minutes: Bounds { min: 30, max: 180 },
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub max_output_tokens: u32,
    pub timeout: Option<Duration>,
    pub search_context_size: String,
    pub search_country: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            max_output_tokens: 2000,
            timeout: None,
            search_context_size: "medium".into(),
            search_country: "RU".into(),
        }
    }
}

/// Lesson languages whose text the builtin PDF font can encode.
const BUILTIN_FONT_LANGUAGES: [&str; 12] = [
    "English", "French", "German", "Spanish", "Italian", "Portuguese", "Dutch", "Danish", "Norwegian", "Swedish",
    "Finnish", "Catalan",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmSettings,
    pub image_host_url: String,
    pub image_host_timeout: Duration,
    pub lesson_language: String,
    pub limits: Limits,
    pub feedback_log_path: PathBuf,
    pub pdf_font_path: Option<PathBuf>,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// True when plans in the configured language cannot be exported without `PDF_FONT_PATH`.
    pub fn pdf_needs_external_font(&self) -> bool {
        self.pdf_font_path.is_none()
            && !BUILTIN_FONT_LANGUAGES.iter().any(|l| l.eq_ignore_ascii_case(self.lesson_language.trim()))
    }

    /// Builds the config from any key lookup; empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let number = |key: &'static str, default: u32| -> Result<u32, ConfigError> {
            match get(key) {
                Some(v) => v.parse().map_err(|_| ConfigError::NotANumber { var: key, value: v }),
                None => Ok(default),
            }
        };
        let seconds = |key: &'static str, default: u32| -> Result<Duration, ConfigError> {
            match number(key, default)? {
                0 => Err(ConfigError::ZeroTimeout { var: key }),
                secs => Ok(Duration::from_secs(u64::from(secs))),
            }
        };
        let bounds = |name: &'static str, keys: [&'static str; 2], default: Bounds| -> Result<Bounds, ConfigError> {
            let b = Bounds { min: number(keys[0], default.min)?, max: number(keys[1], default.max)? };
            if b.min > b.max {
                return Err(ConfigError::InvertedBounds { name, min: b.min, max: b.max });
            }
            Ok(b)
        };

        let defaults = LlmSettings::default();
        let limit_defaults = Limits::default();
        let timeout = match get("LLM_TIMEOUT_SECS") {
            Some(_) => Some(seconds("LLM_TIMEOUT_SECS", 0)?),
            None => None,
        };
        let port = number("PORT", 8080)?;

        Ok(Self {
            llm: LlmSettings {
                api_key: get("LLM_API_KEY"),
                base_url: get("LLM_API_BASE").unwrap_or(defaults.base_url),
                model: get("LLM_MODEL").unwrap_or(defaults.model),
                max_output_tokens: number("LLM_MAX_OUTPUT_TOKENS", defaults.max_output_tokens)?,
                timeout,
                search_context_size: get("WEB_SEARCH_CONTEXT_SIZE").unwrap_or(defaults.search_context_size),
                search_country: get("WEB_SEARCH_COUNTRY").unwrap_or(defaults.search_country),
            },
            image_host_url: get("IMAGE_HOST_URL").unwrap_or_else(|| "https://catbox.moe/user/api.php".into()),
            image_host_timeout: seconds("IMAGE_HOST_TIMEOUT_SECS", 10)?,
            lesson_language: get("LESSON_LANGUAGE").unwrap_or_else(|| "Russian".into()),
            limits: Limits {
                class_size: bounds("class size", ["CLASS_SIZE_MIN", "CLASS_SIZE_MAX"], limit_defaults.class_size)?,
                duration_minutes: bounds(
                    "duration",
                    ["DURATION_MIN", "DURATION_MAX"],
                    limit_defaults.duration_minutes,
                )?,
            },
            feedback_log_path: get("FEEDBACK_LOG_PATH").unwrap_or_else(|| "feedback.jsonl".into()).into(),
            pdf_font_path: get("PDF_FONT_PATH").map(PathBuf::from),
            port: u16::try_from(port).map_err(|_| ConfigError::NotANumber { var: "PORT", value: port.to_string() })?,
        })
    }
}
