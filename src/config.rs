//! Session options for the importers and the exporter.
use serde::{Deserialize, Serialize};

use crate::names::XmlForm;

pub const DEFAULT_RECURSION_LIMIT: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImportOptions {
    /// Struct nesting depth after which member population is deferred.
    pub recursion_limit: usize,
    /// Namespace of top-level elements and types that name none.
    pub default_namespace: Option<String>,
    /// Struct mappings accept unknown content.
    pub open_model: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            default_namespace: None,
            open_model: false,
        }
    }
}

impl ImportOptions {
    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit;
        self
    }

    pub fn with_default_namespace(mut self, ns: impl Into<String>) -> Self {
        self.default_namespace = Some(ns.into());
        self
    }

    /// A limit below one would defer the outermost struct itself.
    pub fn effective_recursion_limit(&self) -> usize {
        self.recursion_limit.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportOptions {
    pub element_form_default: XmlForm,
    pub attribute_form_default: XmlForm,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            element_form_default: XmlForm::Qualified,
            attribute_form_default: XmlForm::Unqualified,
        }
    }
}

/// Both halves as read from an `--options` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Options {
    pub import: ImportOptions,
    pub export: ExportOptions,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_documents_fill_in_defaults() {
        let options: Options = serde_json::from_str(r#"{"import": {"openModel": true}}"#).unwrap();
        assert!(options.import.open_model);
        assert_eq!(options.import.recursion_limit, DEFAULT_RECURSION_LIMIT);
        assert_eq!(options.export.attribute_form_default, XmlForm::Unqualified);
    }

    #[test]
    fn recursion_limit_never_drops_below_one() {
        assert_eq!(ImportOptions::default().with_recursion_limit(0).effective_recursion_limit(), 1);
    }
}
