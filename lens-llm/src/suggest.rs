//! Category suggestion for a location.
//!
//! Turns whatever text we hold about a location into a prompt, asks the
//! provider chain, and returns the tagged category. Persisting the
//! category is the caller's job.

use lens_core::error::{ProviderFailure, ProviderResult};
use tracing::{debug, warn};

use crate::fallback::FallbackChain;
use crate::prompt::{CATEGORY_INSTRUCTIONS, LOCATION_TEMPLATE, PLACE_NAME_CAVEAT, SystemPrompt, render_template};

/// Placeholder the geocoder lookup stores when it found nothing.
pub const NO_INFORMATION: &str = "No Information Available";

/// Categories shorter than this are rejected.
pub const MIN_CATEGORY_LEN: usize = 3;

/// Descriptive text about a location. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationDescription {
    /// Street address.
    pub address: Option<String>,
    /// Geocoder place name.
    pub place_name: Option<String>,
    /// User-supplied title.
    pub title: Option<String>,
    /// User notes.
    pub notes: Option<String>,
}

impl LocationDescription {
    fn usable(value: Option<&String>) -> Option<&str> {
        value.map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    fn place_name(&self) -> Option<&str> {
        Self::usable(self.place_name.as_ref()).filter(|name| *name != NO_INFORMATION)
    }

    /// The prompt text, one `label: value` line per usable field. `None`
    /// when nothing usable is present.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        let fields = [
            ("address", Self::usable(self.address.as_ref())),
            ("place_name", self.place_name()),
            ("title", Self::usable(self.title.as_ref())),
            ("notes", Self::usable(self.notes.as_ref())),
        ];
        let vars: Vec<(&str, &str)> = fields
            .iter()
            .filter_map(|(key, value)| value.map(|v| (*key, v)))
            .collect();
        if vars.is_empty() {
            return None;
        }

        let lines: Vec<String> = LOCATION_TEMPLATE
            .lines()
            .filter(|line| vars.iter().any(|(key, _)| line.contains(&format!("{{{key}}}"))))
            .map(|line| render_template(line, &vars))
            .collect();
        Some(lines.join("\n"))
    }

    fn instructions(&self) -> String {
        if self.place_name().is_some() {
            format!("{CATEGORY_INSTRUCTIONS}\n{PLACE_NAME_CAVEAT}")
        } else {
            CATEGORY_INSTRUCTIONS.to_string()
        }
    }
}

/// Suggests a category label for a location.
#[derive(Debug, Clone)]
pub struct CategorySuggester {
    chain: FallbackChain,
}

impl CategorySuggester {
    /// Suggest through `chain`.
    #[must_use]
    pub fn new(chain: FallbackChain) -> Self {
        Self { chain }
    }

    /// Suggest a lowercase category label.
    ///
    /// # Errors
    /// `InvalidQuery` when the description has no usable text (no call is
    /// made), `MalformedResponse` for a too-short answer, otherwise the
    /// chain's failure.
    pub async fn suggest(&self, location: &LocationDescription) -> ProviderResult<String> {
        let Some(prompt) = location.render() else {
            return Err(ProviderFailure::invalid_query("location has no descriptive text"));
        };
        let system = SystemPrompt::default().with_instructions(location.instructions());

        let category = self.chain.ask(&system, &prompt).await?.to_lowercase();
        if category.chars().count() < MIN_CATEGORY_LEN {
            return Err(ProviderFailure::malformed(format!("category too short: '{category}'")));
        }
        debug!(category = %category, "Category suggested");
        Ok(category)
    }

    /// [`CategorySuggester::suggest`], logging and discarding any failure.
    pub async fn suggest_or_none(&self, location: &LocationDescription) -> Option<String> {
        match self.suggest(location).await {
            Ok(category) => Some(category),
            Err(failure) => {
                warn!(kind = %failure.kind, detail = %failure.detail, "No category suggestion");
                None
            }
        }
    }
}
