//! Static template catalog and `{{key}}` substitution.
//!
//! Substitution is lenient and exact: `{{key}}` is replaced only when a
//! variable is named exactly `key`, spaces included, so `{{ key }}` and any
//! placeholder with no matching variable are left in the output verbatim. Rendering is pure, so the same id and variables always
//! produce the same subject/html/text triple.

mod catalog;

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};
use crate::models::TemplateVariables;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([^{}]+)\}\}").expect("valid placeholder regex"));

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

/// Catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailTemplate {
    pub id: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

impl EmailTemplate {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            html: html.into(),
            text: text.into(),
        }
    }

    pub fn render(&self, variables: &TemplateVariables) -> RenderedTemplate {
        RenderedTemplate {
            subject: substitute(&self.subject, variables),
            html: substitute(&self.html, variables),
            text: substitute(&self.text, variables),
        }
    }
}

/// Concrete message content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedTemplate {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Immutable set of templates looked up by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateCatalog {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// One template per known trigger.
    pub fn builtin() -> Self {
        catalog::builtin()
            .into_iter()
            .fold(Self::new(), |catalog, template| catalog.with_template(template))
    }

    pub fn with_template(mut self, template: EmailTemplate) -> Self {
        self.templates.insert(template.id.clone(), template);
        self
    }

    pub fn get(&self, id: &str) -> Option<&EmailTemplate> {
        self.templates.get(id)
    }

    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Render `id` with `variables`.
    pub fn render(&self, id: &str, variables: &TemplateVariables) -> DispatchResult<RenderedTemplate> {
        self.get(id)
            .map(|template| template.render(variables))
            .ok_or_else(|| DispatchError::TemplateNotFound(id.to_string()))
    }
}

/// Replace every `{{key}}` that has a variable; leave the rest untouched.
pub fn substitute(template: &str, variables: &TemplateVariables) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value_to_string(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Plain-text fallback for an HTML body.
pub fn strip_html(html: &str) -> String {
    let without_tags = TAG.replace_all(html, " ");
    let decoded = without_tags
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&");
    WHITESPACE.replace_all(&decoded, " ").trim().to_string()
}
