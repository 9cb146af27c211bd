//! Prompt builders for the portrait, the written report and the periodic readings.

use celestia_readings::{AstrologyProfile, GenerationPayload, PeriodKey, ReadingKind};

use crate::generator::Prompt;

const PORTRAIT_STYLE: &str = "\
Draw a hand-drawn graphite pencil portrait on plain white paper.
Exactly one person, face fully visible, centered, with hair, neck and the top of the shoulders.
Black and white only: fine linework, soft cross-hatching, smooth tonal blending, visible paper grain.
Show only the finished drawing: no pencils, hands, tools, text, logos, borders or frames.";

/// Quiz answers that shape the portrait, with the label used in the prompt.
const PORTRAIT_HINTS: [(&str, &str); 13] = [
    ("ethnicity", "Ethnicity hint"),
    ("ageRange", "Apparent age"),
    ("appearanceImportance", "Appearance priority"),
    ("decisionMaking", "Decision style"),
    ("challenge", "Personal challenge"),
    ("redFlag", "Avoids"),
    ("partnerPreference", "Prefers partner"),
    ("relationshipDynamic", "Relationship dynamic"),
    ("loveLanguage", "Love language"),
    ("idealConnection", "Ideal connection"),
    ("relationshipFear", "Biggest fear"),
    ("element", "Personality element"),
    ("gender", "Own gender"),
];

/// Gender the portrait should depict. "Who are you interested in?" wins over
/// the owner's own gender.
pub fn portrait_subject(payload: &GenerationPayload) -> &str {
    payload
        .answer("genderConfirm")
        .or_else(|| payload.answer("gender"))
        .unwrap_or("Person")
}

pub fn portrait(payload: &GenerationPayload, astrology: &AstrologyProfile) -> Prompt {
    let mut lines = vec![
        PORTRAIT_STYLE.to_string(),
        String::new(),
        "Base the person on these quiz answers and astrology data:".to_string(),
        format!("Gender: {}.", portrait_subject(payload)),
    ];

    for (key, label) in PORTRAIT_HINTS {
        if let Some(value) = payload.answer(key) {
            if key == "ethnicity" && value.eq_ignore_ascii_case("no preference") {
                continue;
            }
            lines.push(format!("{label}: {value}."));
        }
    }
    for key in ["keyTraits", "lifeGoals"] {
        if let Some(list) = answer_list(payload, key) {
            let label = if key == "keyTraits" { "Vibe" } else { "Life goals" };
            lines.push(format!("{label}: {list}."));
        }
    }
    push_astrology(&mut lines, astrology);

    Prompt::new("portrait", lines.join("\n"))
}

pub fn report(payload: &GenerationPayload, astrology: &AstrologyProfile) -> Prompt {
    let mut lines = vec![
        "Write a warm, personal soulmate reading of about 300 words addressed to the reader."
            .to_string(),
        format!("Their soulmate is described as: {}.", portrait_subject(payload)),
    ];
    if let Some(traits) = answer_list(payload, "keyTraits") {
        lines.push(format!("Traits they look for: {traits}."));
    }
    if let Some(love) = payload.answer("loveLanguage") {
        lines.push(format!("Love language: {love}."));
    }
    push_astrology(&mut lines, astrology);
    lines.push("Plain prose, no headings, no markdown.".to_string());

    Prompt::new("report", lines.join("\n"))
}

pub fn natal_chart(astrology: &AstrologyProfile) -> Prompt {
    let mut lines = vec![
        "Write a natal chart overview in four short sections: personality, love, career, growth."
            .to_string(),
    ];
    push_astrology(&mut lines, astrology);
    if astrology.moon_sign.is_none() {
        lines.push("Moon and rising signs are unknown; do not invent them.".to_string());
    }

    Prompt::new("natal_chart", lines.join("\n"))
}

/// Periodic reading. The model is asked for a small JSON object so scores can
/// be extracted; callers must tolerate plain text anyway.
pub fn reading(kind: ReadingKind, period: &PeriodKey, astrology: &AstrologyProfile) -> Prompt {
    let scope = match kind {
        ReadingKind::Daily => format!("today, {period}"),
        ReadingKind::Tomorrow => format!("tomorrow, {period}"),
        ReadingKind::Monthly => format!("the month {period}"),
    };
    let length = match kind {
        ReadingKind::Monthly => "250-400 words",
        ReadingKind::Daily | ReadingKind::Tomorrow => "80-120 words",
    };

    let mut lines = vec![format!(
        "Write a personal horoscope for {scope} of {length}, focused on love and relationships."
    )];
    push_astrology(&mut lines, astrology);
    lines.push(
        "Respond with JSON only: {\"guidance\": string, \"emotionScore\": 0-100, \"energyScore\": 0-100}."
            .to_string(),
    );

    Prompt::new(kind.as_str(), lines.join("\n"))
}

fn push_astrology(lines: &mut Vec<String>, astrology: &AstrologyProfile) {
    if let Some(sign) = astrology.sun_sign {
        lines.push(format!("Sun sign: {sign}."));
    }
    if let Some(element) = astrology.element {
        lines.push(format!("Element: {element}."));
    }
    if let Some(moon) = astrology.moon_sign {
        lines.push(format!("Moon sign: {moon}."));
    }
    if let Some(rising) = astrology.rising_sign {
        lines.push(format!("Rising sign: {rising}."));
    }
}

fn answer_list(payload: &GenerationPayload, key: &str) -> Option<String> {
    let items: Vec<&str> = payload
        .answers
        .get(key)?
        .as_array()?
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    (!items.is_empty()).then(|| items.join(", "))
}
