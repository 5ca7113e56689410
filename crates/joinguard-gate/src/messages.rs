//! Message templates
//!
//! Placeholders: `{name}`, `{reasons}`, `{minutes}`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageTemplates {
    pub welcome: String,
    pub challenge: String,
    pub button_label: String,
    pub verified: String,
    pub timeout: String,
    pub not_yours: String,
    pub expired: String,
    pub verified_ack: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            welcome: "Welcome {name}, please read the pinned message.".to_string(),
            challenge: "{name}, your profile {reasons}. Tap the button below within {minutes} \
                        minutes to confirm you are human, or you will be removed."
                .to_string(),
            button_label: "I am human".to_string(),
            verified: "{name} has been verified. Welcome, and please read the pinned message."
                .to_string(),
            timeout: "{name} did not confirm in time and was removed.".to_string(),
            not_yours: "This button is not for you.".to_string(),
            expired: "This verification is no longer active.".to_string(),
            verified_ack: "Thanks, you can post now.".to_string(),
        }
    }
}

/// Values substituted into a template
#[derive(Debug, Clone, Default)]
pub struct TemplateArgs<'a> {
    pub name: &'a str,
    pub reasons: &'a str,
    pub minutes: u64,
}

pub fn render(template: &str, args: &TemplateArgs<'_>) -> String {
    template
        .replace("{name}", args.name)
        .replace("{reasons}", args.reasons)
        .replace("{minutes}", &args.minutes.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_substitutes_all() {
        let templates = MessageTemplates::default();
        let text = render(
            &templates.challenge,
            &TemplateArgs {
                name: "@mallory",
                reasons: "contains link",
                minutes: 5,
            },
        );
        assert!(text.starts_with("@mallory, your profile contains link."));
        assert!(text.contains("within 5 minutes"));
        assert!(!text.contains('{'));
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let templates: MessageTemplates =
            serde_json::from_str(r#"{"welcome": "Hi {name}"}"#).unwrap();
        assert_eq!(templates.welcome, "Hi {name}");
        assert_eq!(templates.button_label, "I am human");
    }
}
