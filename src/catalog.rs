use serde::Serialize;

use crate::{
    config::Limits,
    models::{LevelMatch, Methodology, TaskLevel, CEFR_LEVELS},
};

/// Course series with the levels they are published in; expanded to "Series Level".
const SERIES: &[(&str, &[&str])] = &[
    ("Spotlight", &["Starter", "2", "3", "4", "5", "6", "7", "8", "9", "10", "11"]),
    ("Starlight", &["2", "3", "4", "5", "6", "7", "8", "9", "10", "11"]),
    ("English File", &["Beginner", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    (
        "New English File",
        &["Beginner", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"],
    ),
    ("Headway", &["Beginner", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    ("Solutions", &["Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    ("Family and Friends", &["Starter", "1", "2", "3", "4", "5", "6"]),
    ("Cutting Edge", &["Starter", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    ("Round-Up", &["Starter", "1", "2", "3", "4", "5", "6"]),
    ("Global", &["Beginner", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    ("Navigate", &["A1", "A2", "B1", "B1+", "B2", "C1"]),
    ("Innovations", &["Beginner", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
    ("Speakout", &["Starter", "Elementary", "Pre-Intermediate", "Intermediate", "Upper-Intermediate", "Advanced"]),
];

const STANDALONE: &[&str] = &["Basic Grammar in Use", "English Grammar in Use", "Advanced Grammar in Use"];

pub fn textbooks() -> Vec<String> {
    SERIES
        .iter()
        .flat_map(|(series, levels)| levels.iter().map(move |level| format!("{series} {level}")))
        .chain(STANDALONE.iter().map(|s| s.to_string()))
        .collect()
}

/// Case-insensitive substring match, in catalogue order.
pub fn search_textbooks(query: &str, limit: usize) -> Vec<String> {
    let needle = query.trim().to_lowercase();
    textbooks()
        .into_iter()
        .filter(|t| needle.is_empty() || t.to_lowercase().contains(&needle))
        .take(limit)
        .collect()
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub key: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Serialize)]
pub struct RangeChoice {
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub methodologies: Vec<Choice>,
    pub cefr_levels: Vec<&'static str>,
    pub level_match: Vec<Choice>,
    pub formats: Vec<&'static str>,
    pub task_levels: Vec<&'static str>,
    pub class_size: RangeChoice,
    pub duration_minutes: RangeChoice,
}

pub fn form_options(limits: &Limits) -> FormOptions {
    FormOptions {
        methodologies: Methodology::ALL.into_iter().map(|m| Choice { key: m.key(), label: m.label() }).collect(),
        cefr_levels: CEFR_LEVELS.to_vec(),
        level_match: LevelMatch::ALL.into_iter().map(|l| Choice { key: l.key(), label: l.phrase() }).collect(),
        formats: vec!["individual", "group"],
        task_levels: TaskLevel::ALL.into_iter().map(TaskLevel::key).collect(),
        class_size: RangeChoice { min: limits.class_size.min, max: limits.class_size.max },
        duration_minutes: RangeChoice { min: limits.duration_minutes.min, max: limits.duration_minutes.max },
    }
}
