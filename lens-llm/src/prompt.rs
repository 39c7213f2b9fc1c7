//! Prompt templates and answer extraction.
//!
//! Every system prompt is assembled the same way: the project description,
//! then a `<FORMATTING>` block telling the model to wrap its answer in
//! `<ANSWER>` tags, then an optional `<INSTRUCTIONS>` block for the task.
//! [`parse_answer`] pulls the tagged answer back out of the reply.

use std::sync::LazyLock;

use lens_core::error::{ProviderFailure, ProviderResult};
use regex::Regex;

/// Who the model is talking for.
pub const PROJECT_DESCRIPTION: &str = "You are an AI assistant for Urban Lens. This web application allows urban \
explorers to organize and share information about abandoned locations.";

/// Output contract shared by every task.
pub const FORMATTING: &str = "Place the relevant part of your answer inside <ANSWER> tags. The text inside the tag \
will be extracted and parsed by a script, so it needs to be formatted correctly and not contain any extra content. \
For example, if the task is to interpret a date from a string, and the string is 'Employee was paid on January 1, \
2023', your reply should include <ANSWER>2023-01-01</ANSWER>, so that it can be easily parsed into a date object. \
If the task is to choose a category for a location, and the location is a church, your reply should include \
<ANSWER>church</ANSWER>. No other text should be included inside the answer tag.";

/// Task instructions for category suggestion.
pub const CATEGORY_INSTRUCTIONS: &str = "Look at the following information about a location and determine what \
category it belongs in. Example categories are: Airport, Amusement Park, Asylum, Bank, Bridge, Bunker, Cars, Castle, \
Church, Factory, Firehouse, Fire Tower, Funeral Home, Graveyard, Hospital, Hotel, House, Laboratory, Library, \
Lighthouse, Mall, Mansion, Military Base, Monument, Police Station, Power Plant, Prison, Resort, Ruins, School, \
Stadium, Theater, Traincar, Train Station, Tunnel. If the location does not fit into any of these categories, \
provide a new category that is broad enough to include a variety of similar urbex locations. Do not answer with the \
name of the location; always answer with a category, like this: <ANSWER>Factory</ANSWER>.";

/// Appended to [`CATEGORY_INSTRUCTIONS`] when a geocoder place name is part
/// of the description.
pub const PLACE_NAME_CAVEAT: &str = "The google maps description may be helpful, but it also may be inaccurate. \
Use your best judgement.";

/// Location description template. Unused lines are dropped.
pub const LOCATION_TEMPLATE: &str = "address: {address}
google maps description: {place_name}
location title: {title}
user notes: {notes}";

static ANSWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)[<\[]ANSWER:?[>\]](.*?)[<\[](?:[/\\]|END\s*)ANSWER[>\]]").expect("valid regex")
});

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("valid regex"));

/// Simple template interpolation for prompts.
///
/// Replaces `{key}` with the corresponding value in a single pass, so
/// placeholders inside substituted values are left as written. Unknown
/// placeholders are kept.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            vars.iter()
                .find(|(key, _)| *key == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| (*value).to_string())
        })
        .into_owned()
}

/// Extract the text between the first answer tag pair.
///
/// Accepts `<ANSWER>…</ANSWER>` plus the variants models tend to produce:
/// square brackets, `ANSWER:`, backslash closers and `END ANSWER`.
///
/// # Errors
/// `MalformedResponse` when no balanced tag pair is found or the answer
/// is blank.
pub fn parse_answer(reply: &str) -> ProviderResult<String> {
    let Some(caps) = ANSWER.captures(reply) else {
        return Err(ProviderFailure::malformed(format!(
            "no <ANSWER> tag in reply: {}",
            reply.chars().take(120).collect::<String>()
        )));
    };
    let answer = caps[1].trim();
    if answer.is_empty() {
        return Err(ProviderFailure::malformed("empty <ANSWER> tag"));
    }
    Ok(answer.to_string())
}

/// Builder for the system message.
///
/// ```
/// use lens_llm::prompt::{SystemPrompt, FORMATTING};
///
/// let prompt = SystemPrompt::default().with_instructions("Name the county.").render();
/// assert!(prompt.contains(&format!("<FORMATTING>{FORMATTING}</FORMATTING>")));
/// assert!(prompt.ends_with("<INSTRUCTIONS>Name the county.</INSTRUCTIONS>"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemPrompt {
    project_description: String,
    formatting: String,
    instructions: String,
}

impl Default for SystemPrompt {
    fn default() -> Self {
        Self {
            project_description: PROJECT_DESCRIPTION.to_string(),
            formatting: FORMATTING.to_string(),
            instructions: String::new(),
        }
    }
}

impl SystemPrompt {
    /// Replace the task instructions.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Replace the project description.
    #[must_use]
    pub fn with_project_description(mut self, description: impl Into<String>) -> Self {
        self.project_description = description.into();
        self
    }

    /// Replace the formatting contract. An empty string omits the block.
    #[must_use]
    pub fn with_formatting(mut self, formatting: impl Into<String>) -> Self {
        self.formatting = formatting.into();
        self
    }

    /// The assembled system message.
    #[must_use]
    pub fn render(&self) -> String {
        let mut prompt = self.project_description.clone();
        if !self.formatting.is_empty() {
            prompt.push_str(&format!("\n\n<FORMATTING>{}</FORMATTING>", self.formatting));
        }
        if !self.instructions.is_empty() {
            prompt.push_str(&format!("\n\n<INSTRUCTIONS>{}</INSTRUCTIONS>", self.instructions));
        }
        prompt
    }
}
