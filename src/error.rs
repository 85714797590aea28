use thiserror::Error;

use crate::names::QualifiedName;

pub type MappingResult<T> = Result<T, MappingError>;

/// What kind of schema object a failed lookup or a reference cycle was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ReferenceKind {
    Type,
    Element,
    Attribute,
    Group,
    AttributeGroup,
    SimpleType,
}

// Every variant aborts the whole session; none are recoverable.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("conflicting accessor `{name}`: {reason}")]
    Conflict { name: QualifiedName, reason: String },

    #[error("type `{type_name}` cannot be used as {context}: {reason}")]
    UnsupportedShape {
        type_name: String,
        context: String,
        reason: String,
    },

    #[error("invalid annotation on `{target}`: {reason}")]
    InvalidAnnotation { target: String, reason: String },

    #[error("missing {kind} `{name}`")]
    MissingReference {
        kind: ReferenceKind,
        name: QualifiedName,
    },

    #[error("circular {kind} reference through `{name}`")]
    CircularReference {
        kind: ReferenceKind,
        name: QualifiedName,
    },

    #[error("inconsistent particle order in `{type_name}`: {reason}")]
    SequenceConsistency { type_name: String, reason: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl MappingError {
    pub fn conflict(name: QualifiedName, reason: impl Into<String>) -> Self {
        Self::Conflict { name, reason: reason.into() }
    }

    pub fn unsupported(
        type_name: impl Into<String>,
        context: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedShape {
            type_name: type_name.into(),
            context: context.into(),
            reason: reason.into(),
        }
    }

    pub fn annotation(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAnnotation { target: target.into(), reason: reason.into() }
    }

    pub fn missing(kind: ReferenceKind, name: QualifiedName) -> Self {
        Self::MissingReference { kind, name }
    }

    pub fn sequence(type_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SequenceConsistency { type_name: type_name.into(), reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offender() {
        let err = MappingError::missing(
            ReferenceKind::AttributeGroup,
            QualifiedName::new("common", Some("urn:a")),
        );
        assert_eq!(err.to_string(), "missing attribute-group `{urn:a}common`");

        let err = MappingError::conflict(QualifiedName::local("Order"), "different types");
        assert!(err.to_string().contains("`Order`"));
    }
}
