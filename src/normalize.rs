use crate::{
    config::{Bounds, Limits},
    error::{PipelineError, ValidationError},
    models::{
        AgeGroup, FieldValue, ImageReference, LessonForm, LessonFormat, LessonParameters, Methodology, CEFR_LEVELS,
    },
};

pub const DEFAULT_CLASS_SIZE: u32 = 10;
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

/// Checks everything that can be checked before the page image is uploaded.
///
/// Missing mandatory fields are reported together. Range violations and malformed
/// values come next, and an unrecognised methodology key last. Nothing is clamped:
/// a value outside its bounds is rejected. Only the built-in defaults are pulled into
/// the configured bounds.
pub fn validate(form: &LessonForm, has_image: bool, limits: &Limits) -> Result<Methodology, PipelineError> {
    let mut missing = Vec::new();
    if !has_image {
        missing.push("image");
    }
    if !form.adults && form.age.as_deref().map_or(true, |a| a.trim().is_empty()) {
        missing.push("age");
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing).into());
    }

    if form.format == LessonFormat::Group {
        check_range("class_size", class_size_or_default(form, limits), &limits.class_size)?;
    }
    check_range("duration_minutes", duration_or_default(form, limits), &limits.duration_minutes)?;

    if let Some(level) = form.cefr_level.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        if !CEFR_LEVELS.iter().any(|c| c.eq_ignore_ascii_case(level)) {
            return Err(ValidationError::invalid("cefr_level", format!("'{level}' is not a CEFR level")).into());
        }
    }

    let methodology = match form.methodology.as_deref() {
        Some(key) => key.parse()?,
        None => Methodology::Ppp,
    };
    Ok(methodology)
}

/// Turns a raw form plus the hosted page image into [`LessonParameters`].
pub fn normalize(
    form: LessonForm,
    image_reference: Option<ImageReference>,
    limits: &Limits,
) -> Result<LessonParameters, PipelineError> {
    let methodology = validate(&form, image_reference.is_some(), limits)?;
    let image_reference = image_reference.ok_or_else(|| ValidationError::MissingFields(vec!["image"]))?;

    let age = if form.adults {
        AgeGroup::Adults
    } else {
        let age = form.age.as_deref().map(str::trim).unwrap_or_default();
        AgeGroup::Age(age.to_string())
    };
    let class_size = match form.format {
        LessonFormat::Individual => 1,
        LessonFormat::Group => class_size_or_default(&form, limits),
    };
    let duration_minutes = duration_or_default(&form, limits);
    let cefr_level = FieldValue::from_input(form.cefr_level.map(|l| l.trim().to_ascii_uppercase()));
    let mut task_levels = form.task_levels;
    task_levels.sort();
    task_levels.dedup();

    Ok(LessonParameters {
        methodology,
        textbook: FieldValue::from_input(form.textbook),
        cefr_level,
        topic: FieldValue::from_input(form.topic),
        goal: FieldValue::from_input(form.goal),
        inventory: FieldValue::from_input(form.inventory),
        extra_info: FieldValue::from_input(form.extra_info),
        format: form.format,
        class_size,
        age,
        level_match: form.level_match,
        duration_minutes,
        homework_required: form.homework_required,
        task_levels,
        web_search_enabled: form.web_search_enabled,
        image_reference,
    })
}

fn class_size_or_default(form: &LessonForm, limits: &Limits) -> u32 {
    form.class_size.unwrap_or_else(|| limits.class_size.clamp(DEFAULT_CLASS_SIZE))
}

fn duration_or_default(form: &LessonForm, limits: &Limits) -> u32 {
    form.duration_minutes.unwrap_or_else(|| limits.duration_minutes.clamp(DEFAULT_DURATION_MINUTES))
}

fn check_range(field: &'static str, value: u32, bounds: &Bounds) -> Result<(), ValidationError> {
    if bounds.contains(value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, min: bounds.min, max: bounds.max, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Bounds,
        error::UnknownMethodologyError,
        models::{LevelMatch, TaskLevel},
    };
    use pretty_assertions::assert_eq;

    fn image() -> Option<ImageReference> {
        ImageReference::new("https://img/x.png")
    }

    fn form() -> LessonForm {
        LessonForm { age: Some("10-11".into()), ..LessonForm::default() }
    }

    #[test]
    fn defaults_fill_unset_fields() {
        let p = normalize(form(), image(), &Limits::default()).unwrap();
        assert_eq!(p.methodology, Methodology::Ppp);
        assert_eq!(p.textbook, FieldValue::InferFromImage);
        assert_eq!(p.extra_info, FieldValue::InferFromImage);
        assert_eq!(p.class_size, DEFAULT_CLASS_SIZE);
        assert_eq!(p.duration_minutes, DEFAULT_DURATION_MINUTES);
        assert_eq!(p.level_match, LevelMatch::OnLevel);
        assert_eq!(p.age, AgeGroup::Age("10-11".into()));
    }

    #[test]
    fn whitespace_only_text_becomes_sentinel() {
        let f = LessonForm { topic: Some(" \t ".into()), goal: Some(" Past Simple ".into()), ..form() };
        let p = normalize(f, image(), &Limits::default()).unwrap();
        assert_eq!(p.topic, FieldValue::InferFromImage);
        assert_eq!(p.goal, FieldValue::Given("Past Simple".into()));
    }

    #[test]
    fn adults_flag_overrides_age_text() {
        let f = LessonForm { adults: true, age: Some("14".into()), ..form() };
        assert_eq!(normalize(f, image(), &Limits::default()).unwrap().age, AgeGroup::Adults);

        let f = LessonForm { adults: true, age: None, ..form() };
        assert_eq!(normalize(f, image(), &Limits::default()).unwrap().age, AgeGroup::Adults);
    }

    #[test]
    fn missing_image_and_age_are_reported_together() {
        let f = LessonForm { age: Some("  ".into()), ..LessonForm::default() };
        let err = normalize(f, None, &Limits::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::MissingFields(ref m)) if *m == vec!["image", "age"]
        ));
    }

    #[test]
    fn out_of_range_values_are_rejected_not_clamped() {
        let f = LessonForm { class_size: Some(41), ..form() };
        let err = normalize(f, image(), &Limits::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::OutOfRange { field: "class_size", value: 41, .. })
        ));

        let f = LessonForm { duration_minutes: Some(15), ..form() };
        let err = normalize(f, image(), &Limits::default()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::OutOfRange { field: "duration_minutes", min: 30, .. })
        ));

        let f = LessonForm { class_size: Some(0), ..form() };
        assert!(normalize(f, image(), &Limits::default()).is_err());
    }

    #[test]
    fn range_ends_are_accepted() {
        let f = LessonForm { class_size: Some(40), duration_minutes: Some(30), ..form() };
        let p = normalize(f, image(), &Limits::default()).unwrap();
        assert_eq!((p.class_size, p.duration_minutes), (40, 30));

        let f = LessonForm { class_size: Some(1), duration_minutes: Some(180), ..form() };
        let p = normalize(f, image(), &Limits::default()).unwrap();
        assert_eq!((p.class_size, p.duration_minutes), (1, 180));
    }

    #[test]
    fn omitted_values_follow_narrowed_bounds() {
        let limits = Limits { class_size: Bounds { min: 12, max: 20 }, duration_minutes: Bounds { min: 90, max: 120 } };
        let p = normalize(form(), image(), &limits).unwrap();
        assert_eq!((p.class_size, p.duration_minutes), (12, 90));

        let f = LessonForm { duration_minutes: Some(60), ..form() };
        let err = normalize(f, image(), &limits).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Validation(ValidationError::OutOfRange { field: "duration_minutes", value: 60, .. })
        ));
    }

    #[test]
    fn individual_lessons_have_one_student() {
        let f = LessonForm { format: LessonFormat::Individual, class_size: Some(99), ..form() };
        assert_eq!(normalize(f, image(), &Limits::default()).unwrap().class_size, 1);
    }

    #[test]
    fn cefr_level_is_checked_and_uppercased() {
        let f = LessonForm { cefr_level: Some("b1".into()), ..form() };
        assert_eq!(normalize(f, image(), &Limits::default()).unwrap().cefr_level, FieldValue::Given("B1".into()));

        let f = LessonForm { cefr_level: Some("D4".into()), ..form() };
        let err = normalize(f, image(), &Limits::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(ValidationError::Invalid { field: "cefr_level", .. })));
    }

    #[test]
    fn unknown_methodology_key_fails() {
        let f = LessonForm { methodology: Some("Suggestopedia".into()), ..form() };
        let err = normalize(f, image(), &Limits::default()).unwrap_err();
        assert!(
            matches!(err, PipelineError::UnknownMethodology(UnknownMethodologyError(ref k)) if k == "Suggestopedia")
        );
    }

    #[test]
    fn task_levels_are_put_in_canonical_order() {
        let f = LessonForm {
            task_levels: vec![TaskLevel::Creativity, TaskLevel::Repetition, TaskLevel::Creativity],
            ..form()
        };
        let p = normalize(f, image(), &Limits::default()).unwrap();
        assert_eq!(p.task_levels, vec![TaskLevel::Repetition, TaskLevel::Creativity]);
    }
}
