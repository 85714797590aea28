//! A set of schemas indexed by qualified name.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MappingError, MappingResult};
use crate::names::{QualifiedName, XSD_NAMESPACE, XmlForm};
use crate::xsd::{
    AttributeDecl, AttributeGroupDecl, ComplexType, ElementDecl, GroupDecl, SchemaImport, SchemaItem, SimpleType,
    XmlSchema,
};

/// Where a top-level item lives: `(schema, item)` indexes.
type Location = (usize, usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ItemKind {
    Element,
    Attribute,
    Type,
    Group,
    AttributeGroup,
}

impl ItemKind {
    fn of(item: &SchemaItem) -> Self {
        match item {
            SchemaItem::Element(_) => Self::Element,
            SchemaItem::Attribute(_) => Self::Attribute,
            SchemaItem::ComplexType(_) | SchemaItem::SimpleType(_) => Self::Type,
            SchemaItem::Group(_) => Self::Group,
            SchemaItem::AttributeGroup(_) => Self::AttributeGroup,
        }
    }
}

/// A named type from the set.
#[derive(Debug, Clone, Copy)]
pub enum SchemaType<'s> {
    Complex(&'s ComplexType),
    Simple(&'s SimpleType),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct XmlSchemaSet {
    schemas: Vec<XmlSchema>,
    #[serde(skip)]
    index: HashMap<(ItemKind, QualifiedName), Location>,
}

impl XmlSchemaSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index a batch of parsed schemas; a name defined twice is a conflict.
    pub fn from_schemas(schemas: Vec<XmlSchema>) -> MappingResult<Self> {
        let mut set = Self { schemas, index: HashMap::new() };
        set.reindex()?;
        Ok(set)
    }

    pub fn reindex(&mut self) -> MappingResult<()> {
        self.index.clear();
        for (s, schema) in self.schemas.iter().enumerate() {
            for (i, item) in schema.items.iter().enumerate() {
                let Some(name) = item.name() else { continue };
                let key = (ItemKind::of(item), schema.qname(name));
                if self.index.insert(key.clone(), (s, i)).is_some() {
                    return Err(MappingError::conflict(key.1, "defined twice in the schema set"));
                }
            }
        }
        debug!(schemas = self.schemas.len(), items = self.index.len(), "indexed schema set");
        Ok(())
    }

    pub fn schemas(&self) -> &[XmlSchema] {
        &self.schemas
    }

    pub fn into_schemas(self) -> Vec<XmlSchema> {
        self.schemas
    }

    pub fn schema(&self, ns: Option<&str>) -> Option<&XmlSchema> {
        self.schemas.iter().find(|s| s.target_namespace.as_deref() == ns)
    }

    fn position(&self, ns: Option<&str>) -> Option<usize> {
        self.schemas.iter().position(|s| s.target_namespace.as_deref() == ns)
    }

    /// The schema for `ns`, created on first use with the given forms.
    pub fn schema_mut(&mut self, ns: Option<&str>, element_form: XmlForm, attribute_form: XmlForm) -> &mut XmlSchema {
        let index = match self.position(ns) {
            Some(index) => index,
            None => {
                let mut schema = XmlSchema::new(ns);
                schema.element_form_default = element_form;
                schema.attribute_form_default = attribute_form;
                self.schemas.push(schema);
                self.schemas.len() - 1
            }
        };
        &mut self.schemas[index]
    }

    fn lookup(&self, kind: ItemKind, name: &QualifiedName) -> Option<&SchemaItem> {
        let (s, i) = *self.index.get(&(kind, name.clone()))?;
        self.schemas.get(s)?.items.get(i)
    }

    // ------ Lookups ------ //

    pub fn find_element(&self, name: &QualifiedName) -> Option<&ElementDecl> {
        match self.lookup(ItemKind::Element, name)? {
            SchemaItem::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn find_attribute(&self, name: &QualifiedName) -> Option<&AttributeDecl> {
        match self.lookup(ItemKind::Attribute, name)? {
            SchemaItem::Attribute(a) => Some(a),
            _ => None,
        }
    }

    pub fn find_type(&self, name: &QualifiedName) -> Option<SchemaType<'_>> {
        match self.lookup(ItemKind::Type, name)? {
            SchemaItem::ComplexType(t) => Some(SchemaType::Complex(t)),
            SchemaItem::SimpleType(t) => Some(SchemaType::Simple(t)),
            _ => None,
        }
    }

    pub fn find_group(&self, name: &QualifiedName) -> Option<&GroupDecl> {
        match self.lookup(ItemKind::Group, name)? {
            SchemaItem::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn find_attribute_group(&self, name: &QualifiedName) -> Option<&AttributeGroupDecl> {
        match self.lookup(ItemKind::AttributeGroup, name)? {
            SchemaItem::AttributeGroup(g) => Some(g),
            _ => None,
        }
    }

    pub fn contains_element(&self, name: &QualifiedName) -> bool {
        self.index.contains_key(&(ItemKind::Element, name.clone()))
    }

    pub fn contains_type(&self, name: &QualifiedName) -> bool {
        self.index.contains_key(&(ItemKind::Type, name.clone()))
    }

    pub fn element_form_default(&self, ns: Option<&str>) -> XmlForm {
        self.schema(ns).map(|s| s.element_form_default).unwrap_or(XmlForm::Unqualified)
    }

    pub fn attribute_form_default(&self, ns: Option<&str>) -> XmlForm {
        self.schema(ns).map(|s| s.attribute_form_default).unwrap_or(XmlForm::Unqualified)
    }

    /// Top-level elements in schema order.
    pub fn elements(&self) -> impl Iterator<Item = (QualifiedName, &ElementDecl)> {
        self.schemas.iter().flat_map(|schema| {
            schema.items.iter().filter_map(move |item| match item {
                SchemaItem::Element(e) => e.name.as_deref().map(|n| (schema.qname(n), e)),
                _ => None,
            })
        })
    }

    /// Named complex types declaring `base` as their base, in schema order.
    pub fn derived_types(&self, base: &QualifiedName) -> Vec<QualifiedName> {
        self.schemas
            .iter()
            .flat_map(|schema| {
                schema.items.iter().filter_map(move |item| match item {
                    SchemaItem::ComplexType(t) if t.derivation.as_ref().is_some_and(|d| &d.base == base) => {
                        t.name.as_deref().map(|n| schema.qname(n))
                    }
                    _ => None,
                })
            })
            .collect()
    }

    /// Elements naming `head` as their substitution group, transitively.
    pub fn substitution_members(&self, head: &QualifiedName) -> Vec<QualifiedName> {
        let mut out = Vec::new();
        let mut queue = vec![head.clone()];
        while let Some(current) = queue.pop() {
            for (name, decl) in self.elements() {
                if decl.substitution_group.as_ref() == Some(&current) && !out.contains(&name) && &name != head {
                    queue.push(name.clone());
                    out.push(name);
                }
            }
        }
        out
    }

    // ------ Building ------ //

    /// Append a top-level item to the schema for `ns` and index it.
    pub fn add_item(&mut self, ns: Option<&str>, item: SchemaItem) -> MappingResult<()> {
        let s = self.position(ns).ok_or_else(|| {
            MappingError::Internal(format!("no schema for namespace `{}`", ns.unwrap_or_default()))
        })?;
        let schema = &mut self.schemas[s];
        if let Some(name) = item.name() {
            let key = (ItemKind::of(&item), schema.qname(name));
            if self.index.contains_key(&key) {
                return Err(MappingError::conflict(key.1, "defined twice in the schema set"));
            }
            self.index.insert(key, (s, schema.items.len()));
        }
        schema.items.push(item);
        Ok(())
    }

    pub fn complex_type_mut(&mut self, name: &QualifiedName) -> Option<&mut ComplexType> {
        let (s, i) = *self.index.get(&(ItemKind::Type, name.clone()))?;
        match self.schemas.get_mut(s)?.items.get_mut(i)? {
            SchemaItem::ComplexType(t) => Some(t),
            _ => None,
        }
    }

    /// Make `from` import `to`; returns false when nothing had to change.
    pub fn add_import(&mut self, from: Option<&str>, to: Option<&str>) -> bool {
        if from == to || to == Some(XSD_NAMESPACE) {
            return false;
        }
        let Some(s) = self.position(from) else { return false };
        let schema = &mut self.schemas[s];
        if schema.imports_namespace(to) {
            return false;
        }
        schema.imports.push(SchemaImport { namespace: to.map(str::to_owned), schema_location: None });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xsd::Derivation;

    fn set() -> XmlSchemaSet {
        let mut schema = XmlSchema::new(Some("urn:a"));
        schema.items = vec![
            SchemaItem::ComplexType(ComplexType { name: Some("Base".into()), ..Default::default() }),
            SchemaItem::ComplexType(ComplexType {
                name: Some("Derived".into()),
                derivation: Some(Derivation {
                    method: Default::default(),
                    base: QualifiedName::new("Base", Some("urn:a")),
                    simple_content: false,
                }),
                ..Default::default()
            }),
            SchemaItem::Element(ElementDecl::named("Base", QualifiedName::new("Base", Some("urn:a")))),
            SchemaItem::Element(ElementDecl {
                substitution_group: Some(QualifiedName::new("Base", Some("urn:a"))),
                ..ElementDecl::named("Derived", QualifiedName::new("Derived", Some("urn:a")))
            }),
        ];
        XmlSchemaSet::from_schemas(vec![schema]).unwrap()
    }

    #[test]
    fn types_and_elements_have_separate_symbol_spaces() {
        let set = set();
        let base = QualifiedName::new("Base", Some("urn:a"));
        assert!(matches!(set.find_type(&base), Some(SchemaType::Complex(_))));
        assert!(set.find_element(&base).is_some());
        assert!(set.find_type(&QualifiedName::local("Base")).is_none());
    }

    #[test]
    fn derived_and_substitution_links() {
        let set = set();
        let base = QualifiedName::new("Base", Some("urn:a"));
        let derived = QualifiedName::new("Derived", Some("urn:a"));
        assert_eq!(set.derived_types(&base), vec![derived.clone()]);
        assert_eq!(set.substitution_members(&base), vec![derived]);
    }

    #[test]
    fn duplicate_definition_is_a_conflict() {
        let mut schema = XmlSchema::new(None);
        schema.items = vec![
            SchemaItem::SimpleType(SimpleType::enumeration(Some("T".into()), vec!["a".into()])),
            SchemaItem::ComplexType(ComplexType { name: Some("T".into()), ..Default::default() }),
        ];
        assert!(matches!(XmlSchemaSet::from_schemas(vec![schema]), Err(MappingError::Conflict { .. })));
    }

    #[test]
    fn imports_are_added_once() {
        let mut set = XmlSchemaSet::new();
        set.schema_mut(Some("urn:a"), XmlForm::Qualified, XmlForm::Unqualified);
        assert!(set.add_import(Some("urn:a"), Some("urn:b")));
        assert!(!set.add_import(Some("urn:a"), Some("urn:b")));
        assert!(!set.add_import(Some("urn:a"), Some(XSD_NAMESPACE)));
        assert_eq!(set.schema(Some("urn:a")).unwrap().imports.len(), 1);
    }
}
