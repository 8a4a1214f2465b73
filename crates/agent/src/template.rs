use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Value substituted for a `{{name}}` placeholder. Lists render one item per line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateValue {
    Text(String),
    List(Vec<String>),
}

impl TemplateValue {
    fn render(&self) -> String {
        match self {
            TemplateValue::Text(s) => s.clone(),
            TemplateValue::List(items) => items.join("\n"),
        }
    }
}

impl From<&str> for TemplateValue {
    fn from(value: &str) -> Self {
        TemplateValue::Text(value.to_string())
    }
}

impl From<Vec<String>> for TemplateValue {
    fn from(value: Vec<String>) -> Self {
        TemplateValue::List(value)
    }
}

pub type TemplateVariables = HashMap<String, TemplateValue>;

/// Replace `{{word}}` placeholders. Unknown names, and anything that is not a
/// single word between the braces, stay as written.
pub fn render_template(template: &str, variables: &TemplateVariables) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        match after_open.find("}}") {
            Some(end) => {
                let key = &after_open[..end];
                let is_word =
                    !key.is_empty() && key.chars().all(|c| c.is_alphanumeric() || c == '_');
                match variables.get(key).filter(|_| is_word) {
                    Some(value) => out.push_str(&value.render()),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after_open[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}
