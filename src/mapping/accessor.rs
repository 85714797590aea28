use serde::Serialize;

use crate::default_value::DefaultValue;
use crate::mapping::MappingId;
use crate::names::{QualifiedName, XmlForm};
use crate::type_desc::TypeDescId;

/// A named binding of an element, attribute or text node to a mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Accessor {
    pub name: String,
    pub namespace: Option<String>,
    pub form: XmlForm,
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<DefaultValue>,
    /// Wildcard (`xs:any` / `xs:anyAttribute`); `name` may be empty.
    pub any: bool,
    pub mapping: MappingId,
    /// Declared at the top level of its namespace's schema.
    pub is_top_level_in_schema: bool,
    /// Attribute holding a whitespace separated list.
    pub is_list: bool,
    /// `xml:lang` and friends; never exported as a declaration of our own.
    pub is_special_xml_namespace: bool,
}

impl Accessor {
    pub fn new(name: impl Into<String>, namespace: Option<&str>, mapping: MappingId) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.map(str::to_owned),
            form: XmlForm::Qualified,
            is_nullable: false,
            default: None,
            any: false,
            mapping,
            is_top_level_in_schema: false,
            is_list: false,
            is_special_xml_namespace: false,
        }
    }

    pub fn qname(&self) -> QualifiedName {
        QualifiedName { name: self.name.clone(), namespace: self.namespace.clone() }
    }

    pub fn with_form(mut self, form: XmlForm) -> Self {
        self.form = form;
        self
    }

    pub fn nullable(mut self, is_nullable: bool) -> Self {
        self.is_nullable = is_nullable;
        self
    }
}

/// The member that captures in-scope namespace declarations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlnsAccessor {
    pub member_name: String,
}

/// Enumerant xml name matched by unnamed wildcard alternatives.
pub const ANY_ELEMENT_CONSTANT: &str = "##any:";

/// Correlates each element alternative of a member with an enumerant of
/// `mapping`, held in the sibling member `member_name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceIdentifier {
    pub member_name: String,
    pub mapping: MappingId,
    /// Enumerant name per entry of the owning member's `elements`.
    pub member_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMapping {
    pub name: String,
    pub type_desc: TypeDescId,
    pub elements: Vec<Accessor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<Accessor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<Accessor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<XmlnsAccessor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choice_identifier: Option<ChoiceIdentifier>,
    pub check_specified: bool,
    /// Elements repeat in place (a flattened array).
    pub repeats: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<u32>,
    /// Holds a value but binds to no XML node (a generated choice identifier).
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub ignore: bool,
}

impl MemberMapping {
    pub fn new(name: impl Into<String>, type_desc: TypeDescId) -> Self {
        Self {
            name: name.into(),
            type_desc,
            elements: Vec::new(),
            attribute: None,
            text: None,
            xmlns: None,
            choice_identifier: None,
            check_specified: false,
            repeats: false,
            sequence_id: None,
            ignore: false,
        }
    }

    pub fn is_particle(&self) -> bool {
        !self.elements.is_empty()
    }

    pub fn is_sequence(&self) -> bool {
        self.sequence_id.is_some()
    }

    /// Every accessor this member exposes, in export order.
    pub fn accessors(&self) -> impl Iterator<Item = &Accessor> {
        self.elements.iter().chain(self.attribute.iter()).chain(self.text.iter())
    }
}
