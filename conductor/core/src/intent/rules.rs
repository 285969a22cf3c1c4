//! Keyword rules
//!
//! Deterministic intent classification. Rules are checked in a fixed order and
//! the first match wins, so overlapping keywords resolve predictably:
//!
//! ```text
//!  1. "disconnect all" / "close all"               → DisconnectAll
//!  2. save|create + profile|connection              → CreateProfile
//!  3. load + profile                                → LoadProfile
//!  4. and|then|"," joining 2+ actionable clauses    → ChainedCommands
//!  5. disconnect|close|terminate|"end session"      → Disconnect
//!  6. list|sessions|status                          → ListSessions
//!  7. screenshot|capture                            → Screenshot
//!  8. connect|rdp                                   → Connect
//!  9. anything else                                 → GeneralHelp
//! ```
//!
//! Rules 5, 7 and 8 look at every word of the input, not just the first verb,
//! and their keywords match anywhere inside a word ("reconnect", "closing").
//! Other keywords match whole words. Words containing a dot are never
//! keywords, so a host such as `status.example.com` cannot trigger a rule by
//! accident.

use crate::command::{
    follow_up_question, Command, CommandAction, ScreenshotMode, DEFAULT_RDP_PORT,
};

use super::replies;

/// Characters stripped from both ends of every word
const TRIM: &[char] = &[
    ',', '.', ';', ':', '!', '?', '(', ')', '"', '\'', '[', ']', '{', '}', '<', '>',
];

/// Words that never name a host, session or profile
const STOPWORDS: &[&str] = &[
    "a", "again", "all", "an", "and", "as", "called", "connection", "desktop", "display",
    "for", "from", "image", "in", "it", "me", "mode", "my", "named", "now", "of", "on",
    "picture", "please", "profile", "screen", "server", "session", "sessions", "shot", "take",
    "that", "the", "then", "this", "to", "window", "with",
];

/// Words that describe a screenshot mode rather than a target
const MODE_WORDS: &[&str] = &["app", "application", "full", "fullscreen", "full-screen"];

#[derive(Debug, Clone)]
struct Token<'a> {
    raw: &'a str,
    lower: String,
    comma: bool,
}

impl Token<'_> {
    fn is(&self, word: &str) -> bool {
        self.lower == word
    }

    fn is_any(&self, words: &[&str]) -> bool {
        words.contains(&self.lower.as_str())
    }

    /// Keyword stem match; dotted words are never keywords
    fn stem(&self, prefix: &str) -> bool {
        !self.raw.contains('.') && self.lower.starts_with(prefix)
    }

    /// Keyword anywhere inside the word; dotted words are never keywords
    fn mentions(&self, keyword: &str) -> bool {
        !self.raw.contains('.') && self.lower.contains(keyword)
    }

    fn is_host_like(&self) -> bool {
        self.raw.contains('.')
            && !self.raw.contains('@')
            && self.raw.chars().any(char::is_alphanumeric)
    }

    fn is_filler(&self) -> bool {
        self.is_any(STOPWORDS) || self.is_any(MODE_WORDS) || verb_at(std::slice::from_ref(self), 0).is_some()
    }
}

fn tokenize(text: &str) -> Vec<Token<'_>> {
    text.split_whitespace()
        .filter_map(|word| {
            let raw = word.trim_matches(TRIM);
            (!raw.is_empty()).then(|| Token {
                raw,
                lower: raw.to_lowercase(),
                comma: word.ends_with(','),
            })
        })
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Verb {
    Connect,
    Disconnect,
    Screenshot,
}

fn verb_at(tokens: &[Token<'_>], i: usize) -> Option<Verb> {
    let t = &tokens[i];
    let next_is_session = tokens
        .get(i + 1)
        .is_some_and(|n| n.is("session") || n.is("sessions"));

    if t.mentions("disconnect")
        || t.mentions("close")
        || t.mentions("closing")
        || t.mentions("terminat")
        || (t.is("end") && next_is_session)
    {
        Some(Verb::Disconnect)
    } else if t.mentions("screenshot") || t.mentions("captur") || t.mentions("snapshot") {
        Some(Verb::Screenshot)
    } else if t.mentions("connect") || t.is("rdp") {
        Some(Verb::Connect)
    } else {
        None
    }
}

fn first_verb(tokens: &[Token<'_>]) -> Option<(usize, Verb)> {
    (0..tokens.len()).find_map(|i| verb_at(tokens, i).map(|v| (i, v)))
}

/// Position of the first word naming `verb`, wherever it sits in the input
fn find_verb(tokens: &[Token<'_>], verb: Verb) -> Option<usize> {
    (0..tokens.len()).find(|&i| verb_at(tokens, i) == Some(verb))
}

fn word_after<'t, 'a>(tokens: &'t [Token<'a>], words: &[&str]) -> Option<&'t Token<'a>> {
    tokens
        .iter()
        .position(|t| t.is_any(words))
        .and_then(|i| tokens.get(i + 1))
}

fn word_before<'t, 'a>(tokens: &'t [Token<'a>], word: &str) -> Option<&'t Token<'a>> {
    tokens
        .iter()
        .position(|t| t.is(word))
        .and_then(|i| i.checked_sub(1))
        .map(|i| &tokens[i])
}

fn has(tokens: &[Token<'_>], word: &str) -> bool {
    tokens.iter().any(|t| t.is(word))
}

fn has_stem(tokens: &[Token<'_>], prefix: &str) -> bool {
    tokens.iter().any(|t| t.stem(prefix))
}

/// Classify `text` with the keyword rules
///
/// Always returns a command. Commands missing required fields come back
/// flagged as needing more information, with follow-up questions attached.
#[must_use]
pub fn classify(text: &str) -> Command {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Command::general_help(replies::empty_input_reply());
    }

    let raw_lower = text.to_lowercase();
    let joined = tokens
        .iter()
        .map(|t| t.lower.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let contains = |phrase: &str| raw_lower.contains(phrase) || joined.contains(phrase);

    if contains("disconnect all") || contains("close all") {
        tracing::debug!(rule = "disconnect_all", "Keyword rule matched");
        return Command::disconnect_all().with_explanation("Disconnecting all active sessions");
    }

    if (has_stem(&tokens, "save") || has_stem(&tokens, "creat"))
        && (has(&tokens, "profile") || has(&tokens, "connection"))
    {
        tracing::debug!(rule = "create_profile", "Keyword rule matched");
        return finish(create_profile_from(&tokens));
    }

    if has_stem(&tokens, "load") && has(&tokens, "profile") {
        tracing::debug!(rule = "load_profile", "Keyword rule matched");
        return finish(load_profile_from(&tokens));
    }

    if let Some(chain) = chain_from(&tokens) {
        tracing::debug!(rule = "chain", steps = chain.sub_commands().len(), "Keyword rule matched");
        return chain;
    }

    if let Some(i) = find_verb(&tokens, Verb::Disconnect) {
        tracing::debug!(rule = "disconnect", "Keyword rule matched");
        return finish(disconnect_from(&tokens, i));
    }

    if has(&tokens, "list") || has(&tokens, "sessions") || has(&tokens, "status") {
        tracing::debug!(rule = "list_sessions", "Keyword rule matched");
        return Command::list_sessions().with_explanation("Listing active sessions");
    }

    if let Some(i) = find_verb(&tokens, Verb::Screenshot) {
        tracing::debug!(rule = "screenshot", "Keyword rule matched");
        return finish(screenshot_from(&tokens, i));
    }

    if find_verb(&tokens, Verb::Connect).is_some() {
        tracing::debug!(rule = "connect", "Keyword rule matched");
        return finish(connect_from(&tokens));
    }

    tracing::debug!(rule = "general_help", "No keyword rule matched");
    Command::general_help(replies::reply_for(text))
}

/// Flag incomplete commands and attach follow-up questions
///
/// Steps of a chain are checked one by one.
pub(crate) fn finish(mut command: Command) -> Command {
    if let CommandAction::Chained(steps) = &mut command.action {
        *steps = std::mem::take(steps).into_iter().map(finish).collect();
    }
    if command.validate() || command.needs_more_info {
        return command;
    }
    let questions = match &command.action {
        CommandAction::Connect { username, .. } => {
            let mut questions = vec![follow_up_question("host").to_string()];
            if username.is_none() {
                questions.push(follow_up_question("username").to_string());
            }
            questions
        }
        _ => command
            .missing_fields()
            .into_iter()
            .map(|field| follow_up_question(field).to_string())
            .collect(),
    };
    command.needing_more_info(questions)
}

// ============================================================================
// Extractors
// ============================================================================

fn connect_from(tokens: &[Token<'_>]) -> Command {
    let after_to = word_after(tokens, &["to"]);
    let mut username = None;

    let target = after_to
        .filter(|t| t.is_host_like())
        .or_else(|| tokens.iter().find(|t| t.is_host_like()))
        .map(|t| t.raw.to_string())
        .or_else(|| {
            let t = after_to.filter(|t| !t.is_filler())?;
            match t.raw.split_once('@') {
                Some((user, host)) if !host.is_empty() => {
                    if !user.is_empty() {
                        username = Some(user.to_string());
                    }
                    Some(host.to_string())
                }
                Some(_) => None,
                None => Some(t.raw.to_string()),
            }
        });

    if let Some(t) = word_after(tokens, &["as"]).filter(|t| !t.is_filler()) {
        username = Some(t.raw.to_string());
    }

    let (host, mut port) = match target {
        Some(target) => {
            let (host, port) = split_port(&target);
            (Some(host), port)
        }
        None => (None, None),
    };
    if let Some(p) = word_after(tokens, &["port"]).and_then(|t| t.raw.parse::<u16>().ok()) {
        port = Some(p);
    }

    let explanation = match (&host, &username) {
        (Some(h), Some(u)) => format!("Connecting to {h} as {u}"),
        (Some(h), None) => format!("Connecting to {h}"),
        (None, _) => "Connection request detected".to_string(),
    };

    Command::new(CommandAction::Connect {
        host,
        username,
        port: port.unwrap_or(DEFAULT_RDP_PORT),
    })
    .with_explanation(explanation)
}

fn split_port(target: &str) -> (String, Option<u16>) {
    match target.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => match port.parse::<u16>() {
            Ok(port) => (host.to_string(), Some(port)),
            Err(_) => (target.to_string(), None),
        },
        _ => (target.to_string(), None),
    }
}

fn session_reference(tokens: &[Token<'_>], verb_index: usize) -> Option<String> {
    let usable = |t: &&Token<'_>| !t.is_filler();

    word_after(tokens, &["session", "sessions"])
        .filter(usable)
        .or_else(|| tokens.iter().find(|t| t.is("last") || t.is("latest")))
        .or_else(|| word_after(tokens, &["to", "from", "of", "on"]).filter(usable))
        .or_else(|| tokens.iter().find(|t| t.is_host_like()))
        .or_else(|| {
            tokens
                .iter()
                .find(|t| t.raw.trim_start_matches('#').parse::<usize>().is_ok())
        })
        .or_else(|| tokens.iter().skip(verb_index + 1).find(usable))
        .map(|t| t.raw.trim_start_matches('#').to_string())
}

fn disconnect_from(tokens: &[Token<'_>], verb_index: usize) -> Command {
    let session = session_reference(tokens, verb_index);
    let explanation = match &session {
        Some(s) => format!("Disconnecting session {s}"),
        None => "Disconnect request detected".to_string(),
    };
    Command::new(CommandAction::Disconnect { session }).with_explanation(explanation)
}

fn screenshot_mode(tokens: &[Token<'_>]) -> ScreenshotMode {
    let fullscreen = tokens.iter().enumerate().any(|(i, t)| {
        t.stem("fullscreen")
            || t.stem("full-screen")
            || (t.is("full") && tokens.get(i + 1).is_some_and(|n| n.stem("screen")))
    });
    if fullscreen {
        ScreenshotMode::Fullscreen
    } else if tokens.iter().any(|t| t.stem("application") || t.is("app")) {
        ScreenshotMode::Application
    } else {
        ScreenshotMode::Session
    }
}

fn screenshot_from(tokens: &[Token<'_>], verb_index: usize) -> Command {
    let mode = screenshot_mode(tokens);
    let session = session_reference(tokens, verb_index);
    let explanation = match &session {
        Some(s) => format!("Capturing {mode} screenshot of session {s}"),
        None => "Screenshot request detected".to_string(),
    };
    Command::new(CommandAction::Screenshot { session, mode }).with_explanation(explanation)
}

fn create_profile_from(tokens: &[Token<'_>]) -> Command {
    let host = tokens
        .iter()
        .find(|t| t.is_host_like())
        .map(|t| t.raw.to_string());

    let mut name = word_after(tokens, &["named", "called"])
        .or_else(|| {
            word_after(tokens, &["profile"]).filter(|t| !t.is_filler() && !t.is_host_like())
        })
        .map(|t| t.raw.to_string());

    let mut username = None;
    if let Some(t) = word_after(tokens, &["as"]).filter(|t| !t.is_filler()) {
        if name.is_none() {
            name = Some(t.raw.to_string());
        } else {
            username = Some(t.raw.to_string());
        }
    }
    if let Some(t) = word_after(tokens, &["user", "username"]).filter(|t| !t.is_filler()) {
        username = Some(t.raw.to_string());
    }
    let name = name.or_else(|| host.clone());

    let explanation = match &name {
        Some(n) => format!("Saving profile {n}"),
        None => "Profile creation request detected".to_string(),
    };
    Command::new(CommandAction::CreateProfile {
        name,
        host,
        username,
    })
    .with_explanation(explanation)
}

fn load_profile_from(tokens: &[Token<'_>]) -> Command {
    let name = word_after(tokens, &["named", "called"])
        .or_else(|| word_after(tokens, &["profile"]).filter(|t| !t.is_filler()))
        .or_else(|| word_before(tokens, "profile").filter(|t| !t.is_filler() && !t.stem("load")))
        .map(|t| t.raw.to_string());

    let explanation = match &name {
        Some(n) => format!("Loading profile {n}"),
        None => "Profile load request detected".to_string(),
    };
    Command::new(CommandAction::LoadProfile { name }).with_explanation(explanation)
}

// ============================================================================
// Chains
// ============================================================================

/// Split on "and", "then" and commas, then read one command per clause
///
/// A clause without a verb continues a preceding connect when it names a
/// host ("connect to a.example.com and b.example.com"). Screenshot and
/// disconnect steps without a session reference target the session opened by
/// an earlier connect step.
fn chain_from(tokens: &[Token<'_>]) -> Option<Command> {
    let has_conjunction = tokens
        .iter()
        .any(|t| t.is("and") || t.is("then") || t.comma);
    if !has_conjunction {
        return None;
    }

    let mut clauses: Vec<&[Token<'_>]> = Vec::new();
    let mut start = 0;
    for (i, t) in tokens.iter().enumerate() {
        if t.is("and") || t.is("then") {
            clauses.push(&tokens[start..i]);
            start = i + 1;
        } else if t.comma {
            clauses.push(&tokens[start..=i]);
            start = i + 1;
        }
    }
    clauses.push(&tokens[start..]);

    let mut steps: Vec<Command> = Vec::new();
    let mut previous: Option<Verb> = None;
    let mut connected = false;

    for clause in clauses.into_iter().filter(|c| !c.is_empty()) {
        let (index, verb) = match first_verb(clause) {
            Some(found) => found,
            None if previous == Some(Verb::Connect) && clause.iter().any(Token::is_host_like) => {
                (0, Verb::Connect)
            }
            None => continue,
        };

        let mut step = match verb {
            Verb::Connect => connect_from(clause),
            Verb::Disconnect => disconnect_from(clause, index),
            Verb::Screenshot => screenshot_from(clause, index),
        };

        if connected {
            step.action = match step.action {
                CommandAction::Screenshot { session: None, mode } => CommandAction::Screenshot {
                    session: Some("last".to_string()),
                    mode,
                },
                CommandAction::Disconnect { session: None } => CommandAction::Disconnect {
                    session: Some("last".to_string()),
                },
                other => other,
            };
        }
        connected |= verb == Verb::Connect;
        previous = Some(verb);
        steps.push(step);
    }

    if steps.len() < 2 {
        return None;
    }

    let summary = steps
        .iter()
        .filter_map(|s| s.explanation.clone())
        .collect::<Vec<_>>()
        .join(", then ");
    let steps = steps
        .into_iter()
        .zip(1u32..)
        .map(|(step, priority)| finish(step).with_priority(priority))
        .collect();

    Some(Command::chained(steps).with_explanation(summary))
}
