use std::{collections::HashMap, fmt::Write as _};

use crate::{
    error::UnknownMethodologyError,
    models::{InstructionText, LessonParameters, Methodology, INFER_FROM_IMAGE},
};

/// The pedagogical stages a methodology requires, in lesson order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodologyTemplate {
    pub methodology: Methodology,
    pub heading: &'static str,
    pub stages: Vec<Stage>,
    pub example: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: &'static str,
    pub minutes: &'static str,
    pub activity: &'static str,
}

const fn stage(name: &'static str, minutes: &'static str, activity: &'static str) -> Stage {
    Stage { name, minutes, activity }
}

fn builtin_template(methodology: Methodology) -> MethodologyTemplate {
    match methodology {
        Methodology::Ppp => MethodologyTemplate {
            methodology,
            heading: "PPP METHODOLOGY",
            stages: vec![
                stage("Presentation", "5-10", "introduce the target language through a dialogue or text from the page"),
                stage("Practice", "15", "controlled substitution and transformation exercises"),
                stage("Production", "20", "role play or students creating their own content"),
            ],
            example: "textbook page 45 -> exercise 3A -> students write their own dialogue",
        },
        Methodology::Ttt => MethodologyTemplate {
            methodology,
            heading: "TTT METHODOLOGY",
            stages: vec![
                stage("Test", "10", "diagnostic task revealing what students already know"),
                stage("Teach", "15", "explain the problem areas the first test exposed"),
                stage("Test", "20", "apply the language in a new situation"),
            ],
            example: "pre-test on tenses -> explanation of Past Perfect -> case tasks",
        },
        Methodology::TaskBased => MethodologyTemplate {
            methodology,
            heading: "TBL METHODOLOGY",
            stages: vec![
                stage("Pre-task", "5-10", "introduce the topic and the task, activate useful vocabulary"),
                stage("Task cycle", "20", "students complete the task in pairs or groups, plan and report back"),
                stage("Language focus", "15", "analyse and practise language that came up during the task"),
            ],
            example: "plan a weekend trip in groups -> present plans -> review future forms",
        },
    }
}

/// Methodology templates keyed by methodology.
///
/// Compilation never falls back to another methodology's template: a missing entry
/// is an [`UnknownMethodologyError`].
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    templates: HashMap<Methodology, MethodologyTemplate>,
    language: String,
}

impl PromptCompiler {
    pub fn new(templates: impl IntoIterator<Item = MethodologyTemplate>, language: impl Into<String>) -> Self {
        Self {
            templates: templates.into_iter().map(|t| (t.methodology, t)).collect(),
            language: language.into(),
        }
    }

    pub fn builtin(language: impl Into<String>) -> Self {
        Self::new(Methodology::ALL.into_iter().map(builtin_template), language)
    }

    /// Fails on the first methodology that has no template; run at startup.
    pub fn verify_complete(&self) -> Result<(), UnknownMethodologyError> {
        match Methodology::ALL.into_iter().find(|m| !self.templates.contains_key(m)) {
            Some(m) => Err(UnknownMethodologyError(m.key().to_string())),
            None => Ok(()),
        }
    }

    pub fn template(&self, methodology: Methodology) -> Result<&MethodologyTemplate, UnknownMethodologyError> {
        self.templates.get(&methodology).ok_or_else(|| UnknownMethodologyError(methodology.key().to_string()))
    }

    /// Renders the parameters as a fixed-order labelled list followed by the
    /// methodology block. Identical input gives byte-identical output.
    pub fn compile(&self, params: &LessonParameters) -> Result<InstructionText, UnknownMethodologyError> {
        let template = self.template(params.methodology)?;
        let mut out = String::from("Create a lesson plan from the following data:\n");

        let task_levels = if params.task_levels.is_empty() {
            INFER_FROM_IMAGE.to_string()
        } else {
            params.task_levels.iter().map(|t| t.key()).collect::<Vec<_>>().join(", ")
        };

        let lines: [(&str, String); 16] = [
            ("Textbook page", "the attached image".to_string()),
            ("Textbook", params.textbook.to_string()),
            ("Textbook CEFR level", params.cefr_level.to_string()),
            ("Class level relative to the textbook", params.level_match.phrase().to_string()),
            ("Topic", params.topic.to_string()),
            ("Goal", params.goal.to_string()),
            ("Lesson format", params.format.key().to_string()),
            ("Number of students", params.class_size.to_string()),
            ("Age", params.age.to_string()),
            ("Duration", format!("{} min", params.duration_minutes)),
            ("Inventory", params.inventory.to_string()),
            ("Task levels", task_levels),
            ("Homework", yes_no(params.homework_required).to_string()),
            ("Methodology", params.methodology.label().to_string()),
            ("Additional information", params.extra_info.to_string()),
            ("Web sources", web_sources(params.web_search_enabled).to_string()),
        ];
        for (label, value) in lines {
            let _ = writeln!(out, "- {label}: {value}");
        }

        let _ = writeln!(out, "\nSpecial instructions:\n[{}]\nRequired stages:", template.heading);
        for (i, s) in template.stages.iter().enumerate() {
            let _ = writeln!(out, "{}. {} ({} min): {}", i + 1, s.name, s.minutes, s.activity);
        }
        let _ = writeln!(out, "Example: {}", template.example);
        if params.homework_required {
            out.push_str("Finish the plan with a homework assignment.\n");
        }
        let _ = write!(out, "\nWrite the lesson plan in {}.", self.language);

        Ok(InstructionText::new(out))
    }
}

fn web_sources(enabled: bool) -> &'static str {
    if enabled {
        "may be consulted for extra materials"
    } else {
        "do not use"
    }
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}
