//! Stage templates: named, ordered stage lists with default config.
//!
//! A template fixes a pipeline's `stage_order` at creation time. The
//! built-ins cover the standard software-change workflows; callers can
//! register their own or override a built-in by name.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;

/// A named, ordered list of stage names plus default config values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTemplate {
    pub name: String,
    pub stages: Vec<String>,
    #[serde(default)]
    pub defaults: HashMap<String, Value>,
}

impl StageTemplate {
    pub fn new(name: &str, stages: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            stages: stages.iter().map(|s| s.to_string()).collect(),
            defaults: HashMap::new(),
        }
    }

    /// Attach a default config value.
    pub fn with_default(mut self, key: &str, value: Value) -> Self {
        self.defaults.insert(key.to_string(), value);
        self
    }
}

/// Registry of stage templates, seeded with the built-in workflows.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, StageTemplate>,
}

impl TemplateRegistry {
    /// An empty registry with no templates.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A registry seeded with the built-in templates:
    /// `implement`, `design`, `test`, and `fix`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(
            StageTemplate::new(
                "implement",
                &[
                    "intake", "clarify", "analyze", "spec", "red", "green", "refactor", "deliver",
                ],
            )
            .with_default("tdd", json!(true)),
        );
        registry.register(StageTemplate::new(
            "design",
            &["intake", "clarify", "analyze", "spec", "deliver"],
        ));
        registry.register(
            StageTemplate::new("test", &["intake", "analyze", "red", "deliver"])
                .with_default("tdd", json!(true)),
        );
        registry.register(StageTemplate::new(
            "fix",
            &["intake", "analyze", "green", "refactor", "deliver"],
        ));
        registry
    }

    /// Register a template. Re-registering a name replaces the previous
    /// definition, which is how built-ins are overridden.
    pub fn register(&mut self, template: StageTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&StageTemplate> {
        self.templates.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Names of all registered templates, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.templates.keys().cloned().collect();
        names.sort();
        names
    }
}
