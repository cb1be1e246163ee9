//! Task modes and their instruction templates.
//!
//! Each mode pairs an instruction template with the parameters it needs.
//! Templates use `{name}` placeholders; `{input}` is the caller's message.

use std::fmt;
use std::str::FromStr;

use mailmate_core::ValidationError;
use serde::{Deserialize, Serialize};

/// System prompt used when none is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Always respond in the language of the user's request unless asked to translate. \
You are a professional email assistant who can:
1. Correct grammar and spelling errors in emails.
2. Adjust tone and style (formal, friendly, professional, etc.).
3. Suggest rewrites for clarity and impact.
4. Translate emails into different languages.
5. Provide email templates for various scenarios.
6. Summarize long emails into concise key points.
7. Write follow-up emails based on earlier correspondence.
Understand the user's intent and reply helpfully, keeping context across turns.";

const ANALYZE_TEMPLATE: &str = "Please analyze the following email and provide:
1. A concise summary of its main points.
2. Corrections for any grammar or spelling errors.
3. Feedback on tone and style, with suggestions for improvement.
4. An evaluation of overall structure and clarity.

Email content:
{input}";

const REWRITE_TEMPLATE: &str = "Please rewrite the following email according to these requirements:
Requirements: {requirements}
Tone: {tone}

Original email:
{input}

Reply with the fully rewritten email only.";

const TRANSLATE_TEMPLATE: &str = "Please translate the following email into {target_language}, \
preserving its meaning, tone and formatting.

Original email:
{input}

Translation into {target_language}:";

const TEMPLATE_TEMPLATE: &str = "Please generate a professional email template for the following scenario:
Scenario: {template_kind}

Details to include:
{fields}

Additional notes:
{input}

Provide a complete email including a subject line and body. Use placeholders like [Name] \
or [Company] for details that were not provided.";

const SUMMARIZE_TEMPLATE: &str = "Summarize the following email in at most {max_points} bullet points, \
capturing the key points and any action items. Be direct and factual. Do not include \
greetings or sign-offs in the summary.

Email content:
{input}";

const FOLLOW_UP_TEMPLATE: &str = "Based on the following previous email and the instruction \"{instruction}\", \
please write an appropriate follow-up email.

Previous email:
{input}

Provide a complete follow-up email including a subject line and body.";

/// What the user wants done with their message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskMode {
    /// Free-form conversation; the input is sent verbatim.
    #[default]
    Chat,
    /// Summary, corrections and tone feedback.
    #[serde(alias = "grammar")]
    Analyze,
    Rewrite,
    Translate,
    Template,
    Summarize,
    #[serde(alias = "follow-up")]
    FollowUp,
}

/// Static description of a mode: its template and parameters.
#[derive(Debug)]
pub struct ModeSpec {
    pub template: &'static str,
    /// Parameters that must be present and non-blank.
    pub required: &'static [&'static str],
    /// Optional parameters with the value used when absent.
    pub optional: &'static [(&'static str, &'static str)],
    /// Alternate parameter names, as `(alias, canonical)`.
    pub aliases: &'static [(&'static str, &'static str)],
}

static CHAT: ModeSpec = ModeSpec {
    template: "{input}",
    required: &[],
    optional: &[],
    aliases: &[],
};

static ANALYZE: ModeSpec = ModeSpec {
    template: ANALYZE_TEMPLATE,
    required: &[],
    optional: &[],
    aliases: &[],
};

static REWRITE: ModeSpec = ModeSpec {
    template: REWRITE_TEMPLATE,
    required: &[],
    optional: &[
        ("requirements", "clearer and more professional"),
        ("tone", "professional"),
    ],
    aliases: &[],
};

static TRANSLATE: ModeSpec = ModeSpec {
    template: TRANSLATE_TEMPLATE,
    required: &["target_language"],
    optional: &[],
    aliases: &[("language", "target_language")],
};

static TEMPLATE: ModeSpec = ModeSpec {
    template: TEMPLATE_TEMPLATE,
    required: &["template_kind"],
    optional: &[],
    aliases: &[("scenario", "template_kind")],
};

static SUMMARIZE: ModeSpec = ModeSpec {
    template: SUMMARIZE_TEMPLATE,
    required: &[],
    optional: &[("max_points", "5")],
    aliases: &[],
};

static FOLLOW_UP: ModeSpec = ModeSpec {
    template: FOLLOW_UP_TEMPLATE,
    required: &[],
    optional: &[("instruction", "politely ask for an update")],
    aliases: &[],
};

impl TaskMode {
    pub const ALL: [TaskMode; 7] = [
        Self::Chat,
        Self::Analyze,
        Self::Rewrite,
        Self::Translate,
        Self::Template,
        Self::Summarize,
        Self::FollowUp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Analyze => "analyze",
            Self::Rewrite => "rewrite",
            Self::Translate => "translate",
            Self::Template => "template",
            Self::Summarize => "summarize",
            Self::FollowUp => "follow_up",
        }
    }

    pub fn spec(&self) -> &'static ModeSpec {
        match self {
            Self::Chat => &CHAT,
            Self::Analyze => &ANALYZE,
            Self::Rewrite => &REWRITE,
            Self::Translate => &TRANSLATE,
            Self::Template => &TEMPLATE,
            Self::Summarize => &SUMMARIZE,
            Self::FollowUp => &FOLLOW_UP,
        }
    }
}

impl fmt::Display for TaskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "analyze" | "grammar" => Ok(Self::Analyze),
            "rewrite" => Ok(Self::Rewrite),
            "translate" => Ok(Self::Translate),
            "template" => Ok(Self::Template),
            "summarize" => Ok(Self::Summarize),
            "follow_up" | "follow-up" => Ok(Self::FollowUp),
            _ => Err(ValidationError::UnknownMode(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_names_and_aliases() {
        assert_eq!("chat".parse::<TaskMode>(), Ok(TaskMode::Chat));
        assert_eq!("Grammar".parse::<TaskMode>(), Ok(TaskMode::Analyze));
        assert_eq!("follow-up".parse::<TaskMode>(), Ok(TaskMode::FollowUp));
        assert_eq!(
            "poem".parse::<TaskMode>(),
            Err(ValidationError::UnknownMode("poem".into()))
        );
    }

    #[test]
    fn name_round_trips_for_every_mode() {
        for mode in TaskMode::ALL {
            assert_eq!(mode.as_str().parse::<TaskMode>(), Ok(mode));
        }
    }

    #[test]
    fn serde_accepts_alias() {
        let mode: TaskMode = serde_json::from_str(r#""grammar""#).unwrap();
        assert_eq!(mode, TaskMode::Analyze);
        assert_eq!(
            serde_json::to_string(&TaskMode::FollowUp).unwrap(),
            r#""follow_up""#
        );
    }

    #[test]
    fn every_template_mentions_input() {
        for mode in TaskMode::ALL {
            assert!(mode.spec().template.contains("{input}"), "{mode}");
        }
    }

    #[test]
    fn required_and_optional_placeholders_exist() {
        for mode in TaskMode::ALL {
            let spec = mode.spec();
            for name in spec.required {
                assert!(spec.template.contains(&format!("{{{name}}}")), "{mode}: {name}");
            }
            for (name, _) in spec.optional {
                assert!(spec.template.contains(&format!("{{{name}}}")), "{mode}: {name}");
            }
        }
    }
}
