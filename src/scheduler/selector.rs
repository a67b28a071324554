//! Choice of the template and passage for each new request.

use std::sync::Arc;

use rand::{RngExt, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{ConfigError, PassageError};
use crate::passage::PassagePool;
use crate::template::{PromptTemplate, TemplateRegistry};

/// A template together with the passage drawn for it.
#[derive(Debug, Clone)]
pub struct Selection {
    pub template: Arc<PromptTemplate>,
    pub passage: String,
}

/// Uniform template choice over a registry, with passages drawn from the
/// chosen template's dataset.
#[derive(Debug)]
pub struct Selector {
    templates: TemplateRegistry,
    passages: PassagePool,
    rng: ChaCha8Rng,
}

impl Selector {
    /// Builds a selector seeded from the thread RNG.
    ///
    /// # Errors
    ///
    /// Fails when the registry is empty or a template names a dataset that
    /// has no passage source.
    pub fn new(templates: TemplateRegistry, passages: PassagePool) -> Result<Self, ConfigError> {
        Self::with_rng(templates, passages, ChaCha8Rng::from_rng(&mut rand::rng()))
    }

    /// Deterministic selector for reproducible runs and tests.
    pub fn seeded(
        templates: TemplateRegistry,
        passages: PassagePool,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::with_rng(templates, passages, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(
        templates: TemplateRegistry,
        passages: PassagePool,
        rng: ChaCha8Rng,
    ) -> Result<Self, ConfigError> {
        if templates.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "no prompt templates registered".to_string(),
            ));
        }
        for template in templates.iter() {
            if !passages.contains(&template.dataset) {
                return Err(ConfigError::ValidationFailed(format!(
                    "template '{}' uses dataset '{}', which has no passage source",
                    template.name, template.dataset
                )));
            }
        }
        Ok(Self {
            templates,
            passages,
            rng,
        })
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Pick a template uniformly at random and draw the next passage of its
    /// dataset.
    pub fn select(&mut self) -> Result<Selection, PassageError> {
        let index = self.rng.random_range(0..self.templates.len());
        let template = Arc::clone(&self.templates.as_slice()[index]);
        let passage = self.passages.draw(&template.dataset)?;
        Ok(Selection { template, passage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passage::CyclicPassages;
    use crate::template::ExtractRule;
    use std::collections::HashMap;

    fn pool(entries: &[(&str, &[&str])]) -> PassagePool {
        let mut pool = PassagePool::new();
        for (dataset, items) in entries {
            let items = items.iter().map(|s| s.to_string()).collect();
            pool.insert(
                *dataset,
                Box::new(CyclicPassages::new(dataset, items).unwrap()),
            );
        }
        pool
    }

    fn template(name: &str, dataset: &str) -> PromptTemplate {
        PromptTemplate::new(
            name,
            dataset,
            "{{ passage }}",
            ExtractRule::Section {
                tag: "out".to_string(),
            },
        )
    }

    #[test]
    fn test_missing_dataset_is_config_error() {
        let result = Selector::new(TemplateRegistry::builtin(), pool(&[("text", &["t"])]));
        assert!(matches!(result, Err(ConfigError::ValidationFailed(msg)) if msg.contains("code")));
    }

    #[test]
    fn test_empty_registry_is_config_error() {
        let result = Selector::new(TemplateRegistry::new(), pool(&[("text", &["t"])]));
        assert!(result.is_err());
    }

    #[test]
    fn test_passage_matches_template_dataset() {
        let mut selector = Selector::seeded(
            TemplateRegistry::builtin(),
            pool(&[("text", &["t1", "t2"]), ("code", &["c1", "c2", "c3"])]),
            42,
        )
        .unwrap();

        for _ in 0..50 {
            let selection = selector.select().unwrap();
            let expected_prefix = if selection.template.dataset == "code" {
                "c"
            } else {
                "t"
            };
            assert!(selection.passage.starts_with(expected_prefix));
        }
    }

    #[test]
    fn test_cursor_advances_per_draw() {
        let mut registry = TemplateRegistry::new();
        registry.register(template("only", "text")).unwrap();
        let mut selector = Selector::seeded(registry, pool(&[("text", &["a", "b"])]), 1).unwrap();

        let drawn: Vec<String> = (0..5).map(|_| selector.select().unwrap().passage).collect();
        assert_eq!(drawn, vec!["a", "b", "a", "b", "a"]);
    }

    #[test]
    fn test_template_choice_is_roughly_uniform() {
        let mut registry = TemplateRegistry::new();
        for name in ["a", "b", "c"] {
            registry.register(template(name, "text")).unwrap();
        }
        let mut selector = Selector::seeded(registry, pool(&[("text", &["p"])]), 7).unwrap();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..3000 {
            let selection = selector.select().unwrap();
            *counts.entry(selection.template.name.clone()).or_default() += 1;
        }
        assert_eq!(counts.len(), 3);
        for count in counts.values() {
            assert!((800..1200).contains(count), "skewed counts: {:?}", counts);
        }
    }
}
