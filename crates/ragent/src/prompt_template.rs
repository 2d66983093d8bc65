use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tera::{Context, Error as TeraError, Tera};

use crate::errors::{RagError, RagResult};

pub const GRADE_PROMPT: &str = include_str!("prompts/grade.md");
pub const REWRITE_PROMPT: &str = include_str!("prompts/rewrite.md");
pub const GENERATE_PROMPT: &str = include_str!("prompts/generate.md");

lazy_static! {
    // Either an already-doubled tera expression (kept as is) or a single-brace placeholder.
    static ref PLACEHOLDER: Regex = Regex::new(r"\{\{.*?\}\}|\{%.*?%\}|\{(\w+)\}").unwrap();
}

pub fn load_prompt<T: Serialize>(template: &str, context_data: &T) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let context = Context::from_serialize(context_data)?;
    let rendered = tera.render("inline_template", &context)?;
    Ok(rendered)
}

/// Rewrite python-style `{question}` placeholders into tera's `{{ question }}`.
/// Existing tera expressions and blocks are left untouched.
pub fn normalize_placeholders(template: &str) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match caps.get(1) {
            Some(name) => format!("{{{{ {} }}}}", name.as_str()),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Variables available to the loop's prompts
#[derive(Debug, Serialize)]
pub struct PromptVars<'a> {
    pub question: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<&'a str>,
}

/// A named prompt template over `question` and/or `context`
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    name: String,
    source: String,
}

impl PromptTemplate {
    pub fn new<N: Into<String>>(name: N, source: &str) -> Self {
        Self {
            name: name.into(),
            source: normalize_placeholders(source),
        }
    }

    /// Read a template from disk
    pub fn from_file<N: Into<String>>(name: N, path: &Path) -> RagResult<Self> {
        let name = name.into();
        let source = fs::read_to_string(path).map_err(|e| {
            RagError::configuration(format!(
                "failed to read {} prompt from {}: {}",
                name,
                path.display(),
                e
            ))
        })?;
        Ok(Self::new(name, &source))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check the template is non-empty, parses, and references every required variable
    pub fn validate(&self, required: &[&str]) -> RagResult<()> {
        if self.source.trim().is_empty() {
            return Err(RagError::configuration(format!(
                "the {} prompt is empty",
                self.name
            )));
        }
        let mut tera = Tera::default();
        tera.add_raw_template(&self.name, &self.source).map_err(|e| {
            RagError::configuration(format!("the {} prompt does not parse: {}", self.name, e))
        })?;
        for var in required {
            let pattern = Regex::new(&format!(r"\{{\{{\s*{}\b", regex::escape(var)))
                .map_err(|e| RagError::configuration(e.to_string()))?;
            if !pattern.is_match(&self.source) {
                return Err(RagError::configuration(format!(
                    "the {} prompt must reference {{{{ {} }}}}",
                    self.name, var
                )));
            }
        }
        Ok(())
    }

    pub fn render(&self, vars: &PromptVars<'_>) -> RagResult<String> {
        load_prompt(&self.source, vars).map_err(|e| {
            RagError::configuration(format!("failed to render {} prompt: {}", self.name, e))
        })
    }
}

/// The three templates the control loop depends on
#[derive(Debug, Clone, PartialEq)]
pub struct PromptSet {
    pub grade: PromptTemplate,
    pub rewrite: PromptTemplate,
    pub generate: PromptTemplate,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            grade: PromptTemplate::new("grade", GRADE_PROMPT),
            rewrite: PromptTemplate::new("rewrite", REWRITE_PROMPT),
            generate: PromptTemplate::new("generate", GENERATE_PROMPT),
        }
    }
}

impl PromptSet {
    pub fn new(grade: &str, rewrite: &str, generate: &str) -> Self {
        Self {
            grade: PromptTemplate::new("grade", grade),
            rewrite: PromptTemplate::new("rewrite", rewrite),
            generate: PromptTemplate::new("generate", generate),
        }
    }

    /// Load `grade.md`, `rewrite.md` and `generate.md` from a directory
    pub fn from_dir(dir: &Path) -> RagResult<Self> {
        Ok(Self {
            grade: PromptTemplate::from_file("grade", &dir.join("grade.md"))?,
            rewrite: PromptTemplate::from_file("rewrite", &dir.join("rewrite.md"))?,
            generate: PromptTemplate::from_file("generate", &dir.join("generate.md"))?,
        })
    }

    pub fn validate(&self) -> RagResult<()> {
        self.grade.validate(&["question", "context"])?;
        self.rewrite.validate(&["question"])?;
        self.generate.validate(&["question", "context"])?;
        Ok(())
    }
}
