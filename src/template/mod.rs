//! Prompt templates: how a passage becomes a prompt, and how the model's
//! answer becomes an output record.
//!
//! A template is plain data: a Tera prompt body rendered with a `passage`
//! variable, the name of the dataset its passages come from, and an
//! [`ExtractRule`]. Templates are kept in a [`TemplateRegistry`], which starts
//! from the built-in set and can be extended from YAML files.
//!
//! # Example
//!
//! ```yaml
//! templates:
//!   - name: essay
//!     dataset: text
//!     prompt: |
//!       Read <passage>{{ passage }}</passage> and write an essay in <essay></essay> tags.
//!     extract:
//!       kind: section
//!       tag: essay
//! ```

pub mod builtin;
pub mod extract;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tera::{Context, Tera};

use crate::error::TemplateError;

/// How the output text is pulled out of a raw model response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractRule {
    /// The content of the last `<tag>...</tag>` section.
    Section { tag: String },
    /// `"{heading} \"{title}\":\n\n{body}"`, built from two sections.
    TitledSection {
        title_tag: String,
        body_tag: String,
        heading: String,
    },
}

/// A named render/extract pair bound to one passage dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    /// Logical dataset the passages for this template are drawn from.
    pub dataset: String,
    /// Tera template; the passage is available as `{{ passage }}`.
    pub prompt: String,
    pub extract: ExtractRule,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        prompt: impl Into<String>,
        extract: ExtractRule,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            prompt: prompt.into(),
            extract,
        }
    }

    /// Render the prompt for a passage. The result is trimmed.
    pub fn render(&self, passage: &str) -> Result<String, TemplateError> {
        let mut context = Context::new();
        context.insert("passage", passage);
        let rendered =
            Tera::one_off(&self.prompt, &context, false).map_err(|source| TemplateError::Render {
                template: self.name.clone(),
                source,
            })?;
        Ok(rendered.trim().to_string())
    }

    /// Extract the output text from a raw response.
    ///
    /// `Ok("")` means the response was well-formed but carried nothing worth
    /// writing; an `Err` means the expected delimiters were not there.
    pub fn extract(&self, raw: &str) -> Result<String, TemplateError> {
        match &self.extract {
            ExtractRule::Section { tag } => Ok(extract::delimited(raw, tag)?.to_string()),
            ExtractRule::TitledSection {
                title_tag,
                body_tag,
                heading,
            } => {
                let title = extract::delimited(raw, title_tag)?;
                let body = extract::delimited(raw, body_tag)?;
                if body.is_empty() {
                    return Ok(String::new());
                }
                let quoted = serde_json::to_string(title)?;
                Ok(format!("{} {}:\n\n{}", heading, quoted, body))
            }
        }
    }

    /// Check the template is usable: non-empty names and a prompt that renders.
    pub fn validate(&self) -> Result<(), TemplateError> {
        let invalid = |message: &str| TemplateError::Invalid {
            name: self.name.clone(),
            message: message.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name cannot be empty"));
        }
        if self.dataset.trim().is_empty() {
            return Err(invalid("dataset cannot be empty"));
        }
        let tags: Vec<&String> = match &self.extract {
            ExtractRule::Section { tag } => vec![tag],
            ExtractRule::TitledSection {
                title_tag,
                body_tag,
                ..
            } => vec![title_tag, body_tag],
        };
        if tags.iter().any(|t| t.trim().is_empty()) {
            return Err(invalid("extract tags cannot be empty"));
        }

        let sample = self.render("sample passage")?;
        if !sample.contains("sample passage") {
            return Err(invalid("prompt never uses {{ passage }}"));
        }
        Ok(())
    }
}

/// On-disk layout of a template file.
#[derive(Debug, Deserialize)]
struct TemplateFile {
    templates: Vec<PromptTemplate>,
}

/// The list of templates dispatch chooses from.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Arc<PromptTemplate>>,
}

impl TemplateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in templates.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for template in builtin::templates() {
            registry
                .register(template)
                .expect("built-in templates are valid and uniquely named");
        }
        registry
    }

    /// Validate and add a template. Names must be unique.
    pub fn register(&mut self, template: PromptTemplate) -> Result<(), TemplateError> {
        template.validate()?;
        if self.get(&template.name).is_some() {
            return Err(TemplateError::DuplicateName(template.name));
        }
        self.templates.push(Arc::new(template));
        Ok(())
    }

    /// Load every template from a YAML file.
    ///
    /// # Returns
    ///
    /// The number of templates added.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize, TemplateError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let file: TemplateFile =
            serde_yaml::from_str(&content).map_err(|e| TemplateError::ParseError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        let count = file.templates.len();
        for template in file.templates {
            self.register(template)?;
        }
        tracing::info!(path = %path.display(), count, "Loaded prompt templates");
        Ok(count)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<PromptTemplate>> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<PromptTemplate>> {
        self.templates.iter()
    }

    /// Templates in registration order.
    pub fn as_slice(&self) -> &[Arc<PromptTemplate>] {
        &self.templates
    }

    /// Distinct dataset names referenced by the registered templates.
    pub fn datasets(&self) -> BTreeSet<&str> {
        self.templates.iter().map(|t| t.dataset.as_str()).collect()
    }
}
