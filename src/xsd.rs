//! A schema object model: just enough of XSD for the importer to read and the
//! exporter to write, serializable as JSON.
pub mod set;

use serde::{Deserialize, Serialize};

use crate::names::{QualifiedName, XmlForm};

pub use set::{SchemaType, XmlSchemaSet};

// ————————————————————————————————————————————————————————————————————————————
// OCCURRENCE
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unbounded {
    Unbounded,
}

/// `maxOccurs`: a number, or `"unbounded"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxOccurs {
    Bounded(u32),
    Unbounded(Unbounded),
}

impl MaxOccurs {
    pub const ONE: Self = Self::Bounded(1);
    pub const UNBOUNDED: Self = Self::Unbounded(Unbounded::Unbounded);

    pub fn repeats(self) -> bool {
        !matches!(self, Self::Bounded(0 | 1))
    }
}

impl Default for MaxOccurs {
    fn default() -> Self {
        Self::ONE
    }
}

fn one() -> u32 {
    1
}

fn is_one(value: &u32) -> bool {
    *value == 1
}

fn is_max_one(value: &MaxOccurs) -> bool {
    *value == MaxOccurs::ONE
}

fn is_false(value: &bool) -> bool {
    !*value
}

// ————————————————————————————————————————————————————————————————————————————
// DECLARATIONS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementDecl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<QualifiedName>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<QualifiedName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex_type: Option<Box<ComplexType>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_type: Option<Box<SimpleType>>,
    #[serde(skip_serializing_if = "is_one")]
    pub min_occurs: u32,
    #[serde(skip_serializing_if = "is_max_one")]
    pub max_occurs: MaxOccurs,
    #[serde(skip_serializing_if = "is_false")]
    pub nillable: bool,
    #[serde(rename = "abstract", skip_serializing_if = "is_false")]
    pub is_abstract: bool,
    #[serde(rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(rename = "fixed", skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<XmlForm>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substitution_group: Option<QualifiedName>,
}

impl Default for ElementDecl {
    fn default() -> Self {
        Self {
            name: None,
            ref_name: None,
            type_name: None,
            complex_type: None,
            simple_type: None,
            min_occurs: 1,
            max_occurs: MaxOccurs::ONE,
            nillable: false,
            is_abstract: false,
            default_value: None,
            fixed_value: None,
            form: None,
            substitution_group: None,
        }
    }
}

impl ElementDecl {
    pub fn named(name: impl Into<String>, type_name: QualifiedName) -> Self {
        Self { name: Some(name.into()), type_name: Some(type_name), ..Self::default() }
    }

    pub fn reference(ref_name: QualifiedName) -> Self {
        Self { ref_name: Some(ref_name), ..Self::default() }
    }

    pub fn occurs(mut self, min: u32, max: MaxOccurs) -> Self {
        self.min_occurs = min;
        self.max_occurs = max;
        self
    }

    /// Default or fixed value, whichever is given.
    pub fn value_constraint(&self) -> Option<&str> {
        self.default_value.as_deref().or(self.fixed_value.as_deref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AttributeUse {
    #[default]
    Optional,
    Required,
    Prohibited,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeDecl {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_name: Option<QualifiedName>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<QualifiedName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simple_type: Option<Box<SimpleType>>,
    #[serde(rename = "use")]
    pub use_: AttributeUse,
    #[serde(rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(rename = "fixed", skip_serializing_if = "Option::is_none")]
    pub fixed_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<XmlForm>,
}

impl AttributeDecl {
    pub fn value_constraint(&self) -> Option<&str> {
        self.default_value.as_deref().or(self.fixed_value.as_deref())
    }
}

/// `xs:any` / `xs:anyAttribute`. `namespace` is the raw constraint
/// (`##any`, `##other`, a URI list).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Wildcard {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "is_one")]
    pub min_occurs: u32,
    #[serde(skip_serializing_if = "is_max_one")]
    pub max_occurs: MaxOccurs,
}

impl Default for Wildcard {
    fn default() -> Self {
        Self { namespace: None, min_occurs: 1, max_occurs: MaxOccurs::ONE }
    }
}

impl Wildcard {
    /// A concrete namespace, `None` for the `##` constraints.
    pub fn single_namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.starts_with("##") && !ns.contains(' '))
    }
}

// ————————————————————————————————————————————————————————————————————————————
// CONTENT MODELS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelGroup {
    #[serde(skip_serializing_if = "is_one")]
    pub min_occurs: u32,
    #[serde(skip_serializing_if = "is_max_one")]
    pub max_occurs: MaxOccurs,
    pub items: Vec<Particle>,
}

impl Default for ModelGroup {
    fn default() -> Self {
        Self::of(Vec::new())
    }
}

impl ModelGroup {
    pub fn of(items: Vec<Particle>) -> Self {
        Self { min_occurs: 1, max_occurs: MaxOccurs::ONE, items }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRef {
    #[serde(rename = "ref")]
    pub ref_name: QualifiedName,
    #[serde(default = "one", skip_serializing_if = "is_one")]
    pub min_occurs: u32,
    #[serde(default, skip_serializing_if = "is_max_one")]
    pub max_occurs: MaxOccurs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Particle {
    Element(ElementDecl),
    Sequence(ModelGroup),
    Choice(ModelGroup),
    All(ModelGroup),
    Any(Wildcard),
    Group(GroupRef),
}

impl Particle {
    pub fn max_occurs(&self) -> MaxOccurs {
        match self {
            Self::Element(e) => e.max_occurs,
            Self::Sequence(g) | Self::Choice(g) | Self::All(g) => g.max_occurs,
            Self::Any(w) => w.max_occurs,
            Self::Group(g) => g.max_occurs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AttributeItem {
    Attribute(AttributeDecl),
    AttributeGroup {
        #[serde(rename = "ref")]
        ref_name: QualifiedName,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DerivationMethod {
    #[default]
    Extension,
    Restriction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Derivation {
    #[serde(default)]
    pub method: DerivationMethod,
    pub base: QualifiedName,
    /// `simpleContent` rather than `complexContent`.
    #[serde(default, skip_serializing_if = "is_false")]
    pub simple_content: bool,
}

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComplexType {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "abstract", skip_serializing_if = "is_false")]
    pub is_abstract: bool,
    #[serde(rename = "mixed", skip_serializing_if = "is_false")]
    pub is_mixed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub particle: Option<Particle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<AttributeItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_attribute: Option<Wildcard>,
    /// Instances keep their in-scope namespace declarations.
    #[serde(skip_serializing_if = "is_false")]
    pub keep_namespace_declarations: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SimpleContent {
    #[serde(rename_all = "camelCase")]
    Restriction {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base: Option<QualifiedName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        simple_type: Option<Box<SimpleType>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        enumeration: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_type: Option<QualifiedName>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        simple_type: Option<Box<SimpleType>>,
    },
    #[serde(rename_all = "camelCase")]
    Union {
        #[serde(default)]
        member_types: Vec<QualifiedName>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleType {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: SimpleContent,
}

impl SimpleType {
    pub fn enumeration(name: Option<String>, values: Vec<String>) -> Self {
        Self {
            name,
            content: SimpleContent::Restriction {
                base: Some(QualifiedName::xsd("string")),
                simple_type: None,
                enumeration: values,
                pattern: None,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupDecl {
    pub name: String,
    pub particle: Particle,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttributeGroupDecl {
    pub name: String,
    pub attributes: Vec<AttributeItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub any_attribute: Option<Wildcard>,
}

// ————————————————————————————————————————————————————————————————————————————
// SCHEMA
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SchemaItem {
    Element(ElementDecl),
    Attribute(AttributeDecl),
    ComplexType(ComplexType),
    SimpleType(SimpleType),
    Group(GroupDecl),
    AttributeGroup(AttributeGroupDecl),
}

impl SchemaItem {
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Element(e) => e.name.as_deref(),
            Self::Attribute(a) => a.name.as_deref(),
            Self::ComplexType(t) => t.name.as_deref(),
            Self::SimpleType(t) => t.name.as_deref(),
            Self::Group(g) => Some(&g.name),
            Self::AttributeGroup(g) => Some(&g.name),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaImport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XmlSchema {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,
    pub element_form_default: XmlForm,
    pub attribute_form_default: XmlForm,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<SchemaImport>,
    pub items: Vec<SchemaItem>,
}

/// XSD's own defaults: both forms unqualified.
impl Default for XmlSchema {
    fn default() -> Self {
        Self {
            target_namespace: None,
            element_form_default: XmlForm::Unqualified,
            attribute_form_default: XmlForm::Unqualified,
            imports: Vec::new(),
            items: Vec::new(),
        }
    }
}

impl XmlSchema {
    pub fn new(target_namespace: Option<&str>) -> Self {
        Self { target_namespace: target_namespace.map(str::to_owned), ..Self::default() }
    }

    pub fn qname(&self, local: &str) -> QualifiedName {
        QualifiedName::new(local, self.target_namespace.as_deref())
    }

    pub fn imports_namespace(&self, ns: Option<&str>) -> bool {
        self.imports.iter().any(|i| i.namespace.as_deref() == ns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occurs_defaults_and_unbounded() {
        let e: ElementDecl =
            serde_json::from_str(r#"{"name": "item", "type": "{http://www.w3.org/2001/XMLSchema}string", "maxOccurs": "unbounded"}"#)
                .unwrap();
        assert_eq!(e.min_occurs, 1);
        assert!(e.max_occurs.repeats());
        assert_eq!(e.type_name, Some(QualifiedName::xsd("string")));

        let json = serde_json::to_value(ElementDecl::named("id", QualifiedName::xsd("int"))).unwrap();
        assert!(json.get("minOccurs").is_none());
        assert!(json.get("maxOccurs").is_none());
    }

    #[test]
    fn particles_are_tagged() {
        let p: Particle = serde_json::from_str(
            r#"{"kind": "sequence", "items": [{"kind": "element", "name": "a"}, {"kind": "any", "maxOccurs": 3}]}"#,
        )
        .unwrap();
        let Particle::Sequence(group) = p else { panic!("expected a sequence") };
        assert_eq!(group.items.len(), 2);
        assert_eq!(group.items[1].max_occurs(), MaxOccurs::Bounded(3));
        assert!(group.items[1].max_occurs().repeats());
    }

    #[test]
    fn schema_defaults_to_unqualified_forms() {
        let s: XmlSchema = serde_json::from_str(r#"{"targetNamespace": "urn:a"}"#).unwrap();
        assert_eq!(s.element_form_default, XmlForm::Unqualified);
        assert_eq!(s.qname("x"), QualifiedName::new("x", Some("urn:a")));
    }
}
