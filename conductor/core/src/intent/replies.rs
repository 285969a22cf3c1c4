//! Canned assistant replies
//!
//! Used for help and small talk when no model is configured. The topic is
//! picked from keywords in the input, first match wins.

use chrono::{Local, Timelike};

const PREFIX: &str = "🤖 AssistBot:";

/// Reply topic detected from user input
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyTopic {
    /// Hello, hi, hey
    Greeting,
    /// Something is broken
    Troubleshooting,
    /// Security practices
    Security,
    /// Speed and bandwidth
    Performance,
    /// How do I, what can you do
    Help,
    /// Nothing specific
    General,
}

const TROUBLE_WORDS: &[&str] = &[
    "error", "problem", "issue", "fail", "can't", "cannot", "trouble", "broken",
];
const SECURITY_WORDS: &[&str] = &["security", "secure", "safe", "protect", "encryption", "auth"];
const PERFORMANCE_WORDS: &[&str] = &["slow", "lag", "performance", "speed", "optimiz", "bandwidth"];
const HELP_WORDS: &[&str] = &["help", "how", "what", "guide", "tutorial", "learn"];
const GREETING_WORDS: &[&str] = &["hello", "hi", "hey", "greetings", "howdy"];

impl ReplyTopic {
    /// Detect the topic of `input`
    #[must_use]
    pub fn detect(input: &str) -> Self {
        let words: Vec<String> = input
            .split_whitespace()
            .map(|w| {
                w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();

        let any_prefix = |targets: &[&str]| {
            words
                .iter()
                .any(|w| targets.iter().any(|t| w.starts_with(t)))
        };

        if words.iter().any(|w| GREETING_WORDS.contains(&w.as_str())) {
            Self::Greeting
        } else if any_prefix(TROUBLE_WORDS) {
            Self::Troubleshooting
        } else if any_prefix(SECURITY_WORDS) {
            Self::Security
        } else if any_prefix(PERFORMANCE_WORDS) {
            Self::Performance
        } else if words.iter().any(|w| HELP_WORDS.contains(&w.as_str())) {
            Self::Help
        } else {
            Self::General
        }
    }
}

/// Canned reply for `input`
#[must_use]
pub fn reply_for(input: &str) -> String {
    let body = match ReplyTopic::detect(input) {
        ReplyTopic::Greeting => format!(
            "{} I'm here to help you manage RDP connections. What can I do for you?",
            greeting()
        ),
        ReplyTopic::Troubleshooting => "I'm here to help troubleshoot! Common RDP problems include:\n\n\
             • Authentication failures: check username and password\n\
             • Network connectivity: verify the server is reachable\n\
             • Firewall blocking: make sure port 3389 is open\n\
             • RDP service disabled: the server may need configuration\n\n\
             What error message or behavior are you seeing?"
            .to_string(),
        ReplyTopic::Security => "Security matters for RDP! Key practices:\n\n\
             🔒 Use strong passwords and 2FA where possible\n\
             🔒 Enable Network Level Authentication (NLA)\n\
             🔒 Restrict access by IP address when feasible\n\
             🔒 Keep client and server patched"
            .to_string(),
        ReplyTopic::Performance => "Let's speed things up! Try these settings:\n\n\
             ⚡ Lower color depth (16-bit instead of 32-bit)\n\
             ⚡ Disable audio redirection if you don't need it\n\
             ⚡ Turn off remote visual effects and themes\n\
             ⚡ Use the Performance preset on slow links"
            .to_string(),
        ReplyTopic::Help => "I can connect to servers, list and disconnect sessions, take \
             screenshots, and save or load connection profiles. Try:\n\n\
             • \"connect to server.example.com as admin\"\n\
             • \"show sessions\"\n\
             • \"screenshot session 1\"\n\
             • \"save profile prod for server.example.com\"\n\
             • \"connect to web.example.com and take a screenshot\""
            .to_string(),
        ReplyTopic::General => "I understand you're asking about RDP connections. I can help \
             with connecting to servers, managing sessions, and troubleshooting. What \
             specifically would you like assistance with?"
            .to_string(),
    };
    format!("{PREFIX} {body}")
}

/// Reply for empty input
#[must_use]
pub fn empty_input_reply() -> String {
    format!("{PREFIX} I didn't catch that. Tell me what you'd like to do, or ask for help.")
}

fn greeting() -> &'static str {
    match Local::now().hour() {
        5..=11 => "Good morning!",
        12..=17 => "Good afternoon!",
        _ => "Good evening!",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_topics() {
        assert_eq!(ReplyTopic::detect("hello there"), ReplyTopic::Greeting);
        assert_eq!(ReplyTopic::detect("Hi!"), ReplyTopic::Greeting);
        assert_eq!(ReplyTopic::detect("I get an error"), ReplyTopic::Troubleshooting);
        assert_eq!(ReplyTopic::detect("is it secure?"), ReplyTopic::Security);
        assert_eq!(ReplyTopic::detect("everything is so slow"), ReplyTopic::Performance);
        assert_eq!(ReplyTopic::detect("what can you do"), ReplyTopic::Help);
        assert_eq!(ReplyTopic::detect("tell me about this"), ReplyTopic::General);
    }

    #[test]
    fn test_hi_inside_word_is_not_greeting() {
        assert_eq!(ReplyTopic::detect("this thing"), ReplyTopic::General);
    }

    #[test]
    fn test_replies_are_prefixed() {
        for input in ["hello", "help", "security", "lag", "error", "anything"] {
            assert!(reply_for(input).starts_with("🤖 AssistBot:"));
        }
        assert!(empty_input_reply().starts_with("🤖 AssistBot:"));
    }
}
