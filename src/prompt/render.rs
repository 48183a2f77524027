//! Placeholder substitution over active templates.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

use super::store::TemplateStore;
use super::types::TemplateKind;
use crate::error::{Error, Result};

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Distinct placeholder names of a body, in order of first appearance.
pub fn placeholders(body: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in placeholder_regex().captures_iter(body) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Substitute `{name}` placeholders in a single pass.
///
/// Placeholders without a variable stay verbatim. Substituted values are
/// not scanned again, so a value containing `{x}` is emitted as-is.
pub fn render_body(body: &str, variables: &HashMap<String, String>) -> String {
    placeholder_regex()
        .replace_all(body, |caps: &Captures| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Renders the active template of a kind.
#[derive(Clone)]
pub struct PromptTemplateEngine {
    templates: Arc<dyn TemplateStore>,
}

impl PromptTemplateEngine {
    pub fn new(templates: Arc<dyn TemplateStore>) -> Self {
        Self { templates }
    }

    #[instrument(skip(self, variables), fields(vars = variables.len()))]
    pub fn render(
        &self,
        kind: TemplateKind,
        variables: &HashMap<String, String>,
    ) -> Result<String> {
        let template = self
            .templates
            .active_template(kind)?
            .ok_or_else(|| Error::not_found("active template", kind.as_str()))?;

        let unresolved: Vec<String> = placeholders(&template.body)
            .into_iter()
            .filter(|name| !variables.contains_key(name))
            .collect();
        if !unresolved.is_empty() {
            debug!(?unresolved, "Leaving placeholders unresolved");
        }

        Ok(render_body(&template.body, variables))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SqliteMemoryStore;
    use pretty_assertions::assert_eq;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_unknown_placeholder_is_left_verbatim() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        store
            .save_template(
                TemplateKind::CharacterChat,
                "{character_name} says hi to {unknown_var}",
                true,
            )
            .unwrap();
        let engine = PromptTemplateEngine::new(Arc::new(store));

        let out = engine
            .render(TemplateKind::CharacterChat, &vars(&[("character_name", "Aria")]))
            .unwrap();

        assert_eq!(out, "Aria says hi to {unknown_var}");
    }

    #[test]
    fn test_missing_active_template_is_not_found() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let engine = PromptTemplateEngine::new(Arc::new(store));

        let err = engine
            .render(TemplateKind::WorldBuilding, &HashMap::new())
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_every_occurrence_is_replaced_and_empty_values_substitute() {
        let out = render_body("{a}-{b}-{a}", &vars(&[("a", "x"), ("b", "")]));
        assert_eq!(out, "x--x");
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let out = render_body("{a} {b}", &vars(&[("a", "{b}"), ("b", "two")]));
        assert_eq!(out, "{b} two");
    }

    #[test]
    fn test_non_identifier_braces_are_untouched() {
        let out = render_body("{ not a var } {1x} {ok}", &vars(&[("ok", "yes")]));
        assert_eq!(out, "{ not a var } {1x} yes");
    }

    #[test]
    fn test_placeholders_are_distinct_in_order() {
        assert_eq!(
            placeholders("{b} then {a} then {b}"),
            vec!["b".to_string(), "a".to_string()]
        );
    }
}
