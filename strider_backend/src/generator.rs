use std::sync::Arc;

use thiserror::Error;

use crate::clock::TimeOfDay;
use crate::error::GenerationFailure;
use crate::forum::Destination;
use crate::history::HistoryEntry;
use crate::llm_client::TextGenerator;
use crate::persona::{PersonaIdentity, PersonaState};

const TITLE_MARKER: &str = "title:";
const BODY_MARKER: &str = "body:";
const SUMMARY_ENTRIES: usize = 3;
const SUMMARY_CHARS: usize = 100;
const MAX_PROMPT_RULES: usize = 5;
const COMMENT_SOURCE_CHARS: usize = 1500;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPost {
    /// Empty when the model produced no title line.
    pub title: String,
    pub body: String,
}

impl ParsedPost {
    pub fn has_title(&self) -> bool {
        !self.title.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseFailure {
    #[error("generation service returned empty text")]
    Empty,
}

/// Split `Title:` / `Body:` formatted text.
///
/// A `Title:` line (any case) sets the title; a `Body:` line is dropped whole; every other
/// line is body. A missing title line leaves the title empty rather than failing.
pub fn parse_post(text: &str) -> Result<ParsedPost, ParseFailure> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ParseFailure::Empty);
    }

    let mut title = String::new();
    let mut body_lines = Vec::new();
    for line in text.lines() {
        if let Some(rest) = strip_marker(line, TITLE_MARKER) {
            title = rest.trim().to_string();
        } else if strip_marker(line, BODY_MARKER).is_some() {
            continue;
        } else {
            body_lines.push(line);
        }
    }

    Ok(ParsedPost {
        title,
        body: body_lines.join("\n"),
    })
}

fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let prefix = line.get(..marker.len())?;
    if prefix.eq_ignore_ascii_case(marker) {
        Some(&line[marker.len()..])
    } else {
        None
    }
}

/// Destination-specific framing for replies. Unknown destinations get the default.
pub fn comment_template(destination: &str) -> &'static str {
    match destination.to_ascii_lowercase().as_str() {
        "running" => {
            "You are replying as a fellow runner. Share a concrete detail from your own \
             training (pace, distance, a tough session) that relates to the post, and be \
             supportive without lecturing."
        }
        "c25k" => {
            "You are replying to someone working through Couch to 5K. Be warm and encouraging, \
             remember what the early weeks felt like, and keep any advice gentle and practical."
        }
        "getdisciplined" => {
            "You are replying in a community about building discipline. Talk about routines, \
             showing up on the days you don't feel like it, and what has worked for you in \
             marathon training."
        }
        "selfimprovement" => {
            "You are replying in a self-improvement community. Connect the post to a lesson \
             running has taught you about patience and small daily progress."
        }
        _ => {
            "You are replying to a post online. Respond thoughtfully and personally, relate it \
             to your running journey where it fits naturally, and stay kind."
        }
    }
}

pub struct ContentGenerator {
    llm: Arc<dyn TextGenerator>,
    identity: PersonaIdentity,
    comment_max_chars: usize,
}

impl ContentGenerator {
    pub fn new(
        llm: Arc<dyn TextGenerator>,
        identity: PersonaIdentity,
        comment_max_chars: usize,
    ) -> Self {
        Self {
            llm,
            identity,
            comment_max_chars,
        }
    }

    pub fn identity(&self) -> &PersonaIdentity {
        &self.identity
    }

    /// One generation call, no retry. Failures are for the control loop to handle.
    pub async fn generate_post(
        &self,
        persona: &PersonaState,
        history: &[HistoryEntry],
        time: TimeOfDay,
        destination: &Destination,
    ) -> Result<ParsedPost, GenerationFailure> {
        let prompt = build_post_prompt(&self.identity, persona, history, time, destination);
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(GenerationFailure::Upstream)?;
        Ok(parse_post(&raw)?)
    }

    pub async fn generate_comment(
        &self,
        post_title: &str,
        post_body: &str,
        destination_name: &str,
    ) -> Result<String, GenerationFailure> {
        let prompt = build_comment_prompt(
            &self.identity,
            post_title,
            post_body,
            destination_name,
            self.comment_max_chars,
        );
        let raw = self
            .llm
            .complete(&prompt)
            .await
            .map_err(GenerationFailure::Upstream)?;

        let comment = raw.trim().trim_matches('"').trim();
        if comment.is_empty() {
            return Err(ParseFailure::Empty.into());
        }
        Ok(comment.to_string())
    }
}

pub fn build_post_prompt(
    identity: &PersonaIdentity,
    persona: &PersonaState,
    history: &[HistoryEntry],
    time: TimeOfDay,
    destination: &Destination,
) -> String {
    let feeling = persona.mood_context();
    format!(
        "You are {name}, {description}, currently on day {day} of a {length}-day marathon \
         training challenge.\n\
         You have run about {distance} km in total so far.\n\
         You are feeling {mood}, and struggling with things like {struggles}.\n\
         You are sharing your reflections and thoughts on Reddit in r/{destination}.\n\n\
         ## Time of Day ({bucket})\n{narrative}\n\n\
         ## Your Recent Posts\n{recent}\n\n\
         ## Your Latest Post (continue the story, do not repeat it)\n{latest}\n\n\
         ## Community Rules\n{rules}\n\n\
         Write a Reddit post that:\n\
         - Is from {name}, staying consistent with the story so far\n\
         - Has a title and a body (formatted clearly)\n\
         - Feels personal and real\n\
         - Invites interaction\n\
         - Avoids promotion and links\n\
         - Is 100-200 words\n\n\
         Output format:\n\
         Title: ...\n\
         Body: ...",
        name = identity.name,
        description = identity.description,
        day = persona.day,
        length = identity.challenge_length_days,
        distance = persona.total_distance,
        mood = feeling.mood,
        struggles = feeling.struggles.join(", "),
        destination = destination.name,
        bucket = time.label(),
        narrative = time.narrative(),
        recent = format_recent_posts(history),
        latest = format_latest_post(history),
        rules = format_rules(&destination.rules),
    )
}

fn build_comment_prompt(
    identity: &PersonaIdentity,
    post_title: &str,
    post_body: &str,
    destination_name: &str,
    max_chars: usize,
) -> String {
    let body = if post_body.trim().is_empty() {
        "(no text, title only)".to_string()
    } else {
        truncate(post_body.trim(), COMMENT_SOURCE_CHARS)
    };
    format!(
        "You are {name}, {description}, in the middle of a {length}-day marathon training \
         challenge.\n\
         {template}\n\n\
         Post in r/{destination}:\n\
         Title: {title}\n\
         {body}\n\n\
         Write a reply comment. Keep it under {max_chars} characters. No links, no \
         self-promotion, no hashtags. Reply with the comment text only.",
        name = identity.name,
        description = identity.description,
        length = identity.challenge_length_days,
        template = comment_template(destination_name),
        destination = destination_name,
        title = post_title,
    )
}

fn format_recent_posts(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "None yet. This is your first post.".to_string();
    }
    let skip = history.len().saturating_sub(SUMMARY_ENTRIES);
    history
        .iter()
        .skip(skip)
        .map(|entry| {
            format!(
                "- Day {}: \"{}\" {}",
                entry.day,
                entry.title,
                truncate(&entry.body, SUMMARY_CHARS)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_latest_post(history: &[HistoryEntry]) -> String {
    match history.last() {
        Some(entry) => format!("Title: {}\n{}", entry.title, entry.body),
        None => "None".to_string(),
    }
}

fn format_rules(rules: &[String]) -> String {
    if rules.is_empty() {
        return "None listed".to_string();
    }
    rules
        .iter()
        .take(MAX_PROMPT_RULES)
        .map(|rule| format!("- {rule}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(input: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for (idx, ch) in input.chars().enumerate() {
        if idx >= max_chars {
            out.push_str("...");
            break;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::fake::ScriptedLlm;

    fn identity() -> PersonaIdentity {
        PersonaIdentity {
            name: "Patrick".to_string(),
            description: "an upbeat running coach".to_string(),
            challenge_length_days: 100,
        }
    }

    fn history(days: std::ops::RangeInclusive<u32>) -> Vec<HistoryEntry> {
        days.map(|day| HistoryEntry {
            day,
            title: format!("Title {day}"),
            body: format!("Body {day} {}", "x".repeat(150)),
        })
        .collect()
    }

    #[test]
    fn parses_title_and_body() {
        let parsed = parse_post("Title: Hello\nBody:\nLine one\nLine two").expect("parse");
        assert_eq!(parsed.title, "Hello");
        assert_eq!(parsed.body, "Line one\nLine two");
    }

    #[test]
    fn markers_are_case_insensitive() {
        let parsed = parse_post("TITLE: Loud\nbody:\ntext").expect("parse");
        assert_eq!(parsed.title, "Loud");
        assert_eq!(parsed.body, "text");
    }

    #[test]
    fn missing_title_keeps_every_line() {
        let parsed = parse_post("Just a run today.\n\nFelt great.").expect("parse");
        assert!(!parsed.has_title());
        assert_eq!(parsed.title, "");
        assert_eq!(parsed.body, "Just a run today.\n\nFelt great.");
    }

    #[test]
    fn crlf_output_leaves_no_carriage_returns() {
        let parsed = parse_post("Title: Week 2\r\nBody:\r\nHill repeats.\r\nLegs hate me.\r\n")
            .expect("parse");
        assert_eq!(parsed.title, "Week 2");
        assert_eq!(parsed.body, "Hill repeats.\nLegs hate me.");
    }

    #[test]
    fn blank_output_is_parse_failure() {
        assert_eq!(parse_post("  \n\t "), Err(ParseFailure::Empty));
    }

    #[test]
    fn post_prompt_embeds_context() {
        let persona = PersonaState::at(9, 63);
        let dest = Destination {
            rules: vec!["No spam".to_string()],
            ..Destination::new("running", Vec::new())
        };
        let prompt = build_post_prompt(
            &identity(),
            &persona,
            &history(1..=5),
            TimeOfDay::Evening,
            &dest,
        );

        assert!(prompt.contains("day 9 of a 100-day"));
        assert!(prompt.contains("about 63 km"));
        assert!(prompt.contains("feeling determined"));
        assert!(prompt.contains("r/running"));
        assert!(prompt.contains(TimeOfDay::Evening.narrative()));
        assert!(prompt.contains("- No spam"));
        // only the last three entries are summarised
        assert!(!prompt.contains("\"Title 2\""));
        assert!(prompt.contains("\"Title 3\""));
        assert!(prompt.contains("\"Title 5\""));
        // the latest entry appears in full
        assert!(prompt.contains(&history(5..=5)[0].body));
    }

    #[test]
    fn first_post_prompt_has_no_history() {
        let prompt = build_post_prompt(
            &identity(),
            &PersonaState::seed(),
            &[],
            TimeOfDay::Dawn,
            &Destination::new("C25K", Vec::new()),
        );
        assert!(prompt.contains("None yet"));
        assert!(prompt.contains("None listed"));
    }

    #[test]
    fn comment_templates_dispatch_by_name() {
        assert!(comment_template("C25K").contains("Couch to 5K"));
        assert!(comment_template("running").contains("fellow runner"));
        assert_eq!(comment_template("AskReddit"), comment_template("unknown"));
    }

    #[tokio::test]
    async fn generate_post_parses_reply() {
        let llm = ScriptedLlm::ok("Title: Day 2\nBody:\nLegs are sore.");
        let generator = ContentGenerator::new(llm.clone(), identity(), 300);
        let post = generator
            .generate_post(
                &PersonaState::seed(),
                &[],
                TimeOfDay::Morning,
                &Destination::new("running", Vec::new()),
            )
            .await
            .expect("post");
        assert_eq!(post.title, "Day 2");
        assert_eq!(llm.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upstream_error_propagates() {
        let generator =
            ContentGenerator::new(ScriptedLlm::failing("503 overloaded"), identity(), 300);
        let err = generator
            .generate_comment("title", "body", "running")
            .await
            .expect_err("fails");
        assert!(matches!(err, GenerationFailure::Upstream(_)));
        assert!(err.to_string().contains("503 overloaded"));
    }

    #[tokio::test]
    async fn comment_prompt_states_length_limit() {
        let llm = ScriptedLlm::ok("\"Nice work, keep going!\"");
        let generator = ContentGenerator::new(llm.clone(), identity(), 280);
        let comment = generator
            .generate_comment("Finished week 3", "", "C25K")
            .await
            .expect("comment");
        assert_eq!(comment, "Nice work, keep going!");
        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("under 280 characters"));
        assert!(prompts[0].contains("title only"));
    }
}
