//! Array-like types become `ArrayOf…` mappings with one element per item
//! alternative.
use std::iter;

use tracing::trace;

use crate::annotations::XmlArrayItemAttribute;
use crate::error::{MappingError, MappingResult};
use crate::mapping::{Accessor, ArrayMapping, Mapping, MappingId, MappingKind};
use crate::names::{encode_local_name, make_pascal, unique_with_suffix};
use crate::reflection::{ImportContext, ReflectionImporter};
use crate::type_desc::TypeDescId;

impl<'m> ReflectionImporter<'m> {
    /// `items` holds the array item annotations of every nesting level;
    /// only those for `nesting` apply here.
    pub(crate) fn import_array(
        &mut self,
        desc: TypeDescId,
        items: &[XmlArrayItemAttribute],
        ns: Option<&str>,
        nesting: u32,
    ) -> MappingResult<MappingId> {
        let array_desc = self.graph.types.get(desc).clone();
        let element_desc = array_desc
            .element
            .ok_or_else(|| MappingError::Internal(format!("array-like `{}` has no item type", array_desc.name)))?;

        let implicit = XmlArrayItemAttribute::default();
        let mut level: Vec<&XmlArrayItemAttribute> = items.iter().filter(|i| i.nesting_level == nesting).collect();
        if level.is_empty() {
            level.push(&implicit);
        }

        let mut elements = Vec::with_capacity(level.len());
        for item in level {
            let item_desc = match &item.type_name {
                None => element_desc,
                Some(name) => {
                    let alt = self.models.resolve(&mut self.graph.types, name)?;
                    if !self.graph.types.is_derived_from(alt, element_desc) {
                        return Err(MappingError::annotation(
                            array_desc.name.clone(),
                            format!("array item type `{name}` is not assignable to `{}`", self.graph.types.get(element_desc).name),
                        ));
                    }
                    alt
                }
            };
            let item_type = self.graph.types.get(item_desc).clone();
            let mapping = if item_type.is_array_like() {
                self.import_array(item_desc, items, ns, nesting + 1)?
            } else {
                self.import_type(item_desc, ns, ImportContext::Element, item.data_type.as_deref(), false)?
            };
            let name = match &item.element_name {
                Some(name) => encode_local_name(name),
                None => self.graph.get(self.graph.unwrap_nullable(mapping)).type_name.clone(),
            };
            let (item_ns, form) =
                Self::accessor_namespace(&array_desc.name, item.namespace.as_deref(), item.form, ns, false)?;
            let is_nullable = match item.is_nullable {
                Some(true) if item_type.is_value_type() => {
                    return Err(MappingError::annotation(array_desc.name.clone(), "a value type item cannot be nillable"));
                }
                Some(value) => value,
                None => item_type.is_nullable() || item_type.is_optional_value(),
            };
            elements.push(Accessor::new(name, item_ns.as_deref(), mapping).with_form(form).nullable(is_nullable));
        }

        let default_name = match elements.as_slice() {
            [single] => format!("ArrayOf{}", make_pascal(&self.graph.get(self.graph.unwrap_nullable(single.mapping)).type_name)),
            _ => "ArrayOfChoice".to_owned(),
        };

        let first = self.types.get(&default_name, ns).copied();
        let name = match first {
            Some(first) if self.graph.get(first).is_array() => {
                let chain: Vec<MappingId> = iter::once(first).chain(self.graph.alternates(first).iter().copied()).collect();
                for candidate in chain {
                    let existing = self.graph.get(candidate);
                    let same = existing.type_desc == Some(desc)
                        && existing.as_array().is_some_and(|a| self.graph.elements_match(&a.elements, &elements));
                    if same {
                        return Ok(candidate);
                    }
                }
                unique_with_suffix(&default_name, |c| self.types.contains(c, ns))
            }
            Some(_) => unique_with_suffix(&default_name, |c| self.types.contains(c, ns)),
            None => default_name.clone(),
        };

        trace!(array = %array_desc.name, type_name = %name, "new array mapping");
        let mut mapping = Mapping::new(
            name.clone(),
            ns,
            Some(desc),
            MappingKind::Array(ArrayMapping { elements, top_level: None }),
        );
        mapping.is_fully_initialized = true;
        let id = self.graph.add(mapping);
        self.types.insert(&name, ns, id);
        if let Some(first) = first.filter(|f| self.graph.get(*f).is_array()) {
            self.graph.add_alternate(first, id);
        }
        Ok(id)
    }
}
