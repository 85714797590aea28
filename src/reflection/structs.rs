//! Struct import and the deferred population loop.
use tracing::{debug, trace};

use crate::error::{MappingError, MappingResult};
use crate::mapping::{Mapping, MappingId, MappingKind, MemberMapping, MemberScope, StructMapping};
use crate::model::{StructModel, TypeModel};
use crate::names::{QualifiedName, encode_local_name};
use crate::reflection::{ImportStructWorkItem, Progress, ReflectionImporter};

impl<'m> ReflectionImporter<'m> {
    pub(crate) fn import_struct(
        &mut self,
        model: StructModel<'m>,
        ns: Option<&str>,
        open_model: bool,
    ) -> MappingResult<MappingId> {
        let attrs = self.models.resolver().type_attributes(model.name(), &model.ty.attributes)?;
        let xml_type = attrs.xml_type.clone().unwrap_or_default();
        let type_name = xml_type.type_name.clone().unwrap_or_else(|| encode_local_name(model.name()));
        let type_ns = xml_type.namespace.clone().or(ns.map(str::to_owned));
        let anonymous = attrs.is_anonymous_in(ns);

        let existing = if anonymous {
            self.anonymous.get(&model.desc).copied()
        } else {
            self.types.get(&type_name, type_ns.as_deref()).copied()
        };
        if let Some(id) = existing {
            if self.graph.get(id).is_struct() {
                return self.check_same_type(id, model.desc, &type_name, type_ns.as_deref());
            }
            return Err(MappingError::conflict(
                QualifiedName::new(type_name, type_ns.as_deref()),
                format!("`{}` clashes with a non-struct mapping of the same name", model.name()),
            ));
        }

        let mut mapping = Mapping::new(
            type_name.clone(),
            type_ns.as_deref(),
            Some(model.desc),
            MappingKind::Struct(StructMapping { is_open_model: open_model, ..StructMapping::default() }),
        );
        mapping.include_in_schema = attrs.include_in_schema();
        mapping.is_anonymous = anonymous;
        let id = self.graph.add(mapping);
        if anonymous {
            self.anonymous.insert(model.desc, id);
        } else {
            self.types.insert(&type_name, type_ns.as_deref(), id);
        }

        let item = ImportStructWorkItem { model, mapping: id, ns: ns.map(str::to_owned) };
        if self.limiter.is_exceeded_limit() {
            trace!(type_name = %type_name, depth = self.limiter.depth(), "recursion limit reached, deferring");
            self.limiter.defer(item);
        } else {
            self.limiter.enter();
            let outermost = self.limiter.depth() == 1;
            self.initialize_struct_members(&item)?;
            self.drain_deferred(outermost)?;
            self.limiter.leave();
        }

        for include in &attrs.include {
            debug!(base = %type_name, derived = %include, "importing included type");
            self.include_type(include)?;
        }
        Ok(id)
    }

    /// Retry queued structs, newest first. Stops early when the top entry
    /// waits on a struct still being populated further up the stack; at the
    /// outermost level that can only mean the loop is stuck.
    fn drain_deferred(&mut self, outermost: bool) -> MappingResult<()> {
        while let Some(item) = self.limiter.top().cloned() {
            match self.initialize_struct_members(&item)? {
                Progress::Done => self.limiter.remove(item.mapping),
                Progress::Deferred => continue,
                Progress::Blocked if outermost => {
                    return Err(MappingError::Internal(format!(
                        "deferred import of `{}` made no progress",
                        item.model.name()
                    )));
                }
                Progress::Blocked => break,
            }
        }
        Ok(())
    }

    fn initialize_struct_members(&mut self, item: &ImportStructWorkItem<'m>) -> MappingResult<Progress> {
        let id = item.mapping;
        if self.graph.get(id).is_fully_initialized {
            return Ok(Progress::Done);
        }
        if self.in_progress.contains(&id) {
            return Ok(Progress::Blocked);
        }
        self.in_progress.insert(id);
        let model = item.model;
        let ns = item.ns.as_deref();

        let base = match self.graph.types.get(model.desc).base {
            None => None,
            Some(base_desc) => Some(match self.models.type_model(&self.graph.types, base_desc)? {
                TypeModel::Root(_) => self.graph.root_mapping(),
                TypeModel::Struct(base_model) => self.import_struct(base_model, ns, false)?,
                other => {
                    return Err(MappingError::unsupported(
                        self.graph.types.get(other.desc()).name.clone(),
                        "a base type",
                        "only structs can be derived from",
                    ));
                }
            }),
        };
        if let Some(base) = base {
            if let Some(index) = self.limiter.position(base) {
                self.limiter.defer(item.clone());
                self.limiter.promote(index);
                self.in_progress.remove(&id);
                trace!(derived = %model.name(), "base is deferred, retrying it first");
                return Ok(Progress::Deferred);
            }
            if self.in_progress.contains(&base) {
                self.limiter.defer(item.clone());
                self.in_progress.remove(&id);
                trace!(derived = %model.name(), "base is still being populated");
                return Ok(Progress::Blocked);
            }
            if !self.graph.get(base).is_fully_initialized {
                return Err(MappingError::Internal(format!(
                    "base of `{}` is neither populated, queued nor in progress",
                    model.name()
                )));
            }
        }

        let type_ns = self.graph.get(id).namespace.clone();
        let (mut scope, base_is_sequence, inherited) = match base {
            Some(base) if !self.graph.is_root(base) => {
                let base_is_sequence = self.graph.get(base).as_struct().is_some_and(|s| s.is_sequence);
                let inherited: Vec<MemberMapping> = self
                    .graph
                    .base_chain(base)
                    .iter()
                    .flat_map(|b| self.graph.members_of(*b).to_vec())
                    .collect();
                (MemberScope::for_base(&self.graph, base), base_is_sequence, inherited)
            }
            _ => (MemberScope::default(), false, Vec::new()),
        };

        let fields = self.models.fields(&mut self.graph.types, model)?;
        for field in &fields {
            let member = self.import_field(model.name(), field, model.members(), type_ns.as_deref(), ns)?;
            if let Some(declared) = inherited.iter().find(|m| m.name == member.name) {
                if declared.type_desc == member.type_desc && self.same_accessors(declared, &member) {
                    continue;
                }
                return Err(MappingError::conflict(
                    QualifiedName::new(member.name.clone(), type_ns.as_deref()),
                    format!("`{}` redeclares an inherited member with a different mapping", model.name()),
                ));
            }
            scope.add(model.name(), member)?;
        }
        let scope = scope.finish(model.name(), base_is_sequence)?;

        {
            let target = self.graph.struct_mut(id)?;
            target.members = scope.members;
            target.is_sequence = scope.is_sequence;
            target.xmlns_member = scope.xmlns_member;
            target.local_elements = scope.local_elements;
            target.local_attributes = scope.local_attributes;
        }
        if let Some(base) = base {
            self.graph.set_base(id, base)?;
        }
        self.graph.get_mut(id).is_fully_initialized = true;
        self.in_progress.remove(&id);
        Ok(Progress::Done)
    }

    fn same_accessors(&self, a: &MemberMapping, b: &MemberMapping) -> bool {
        let names = |m: &MemberMapping| -> Vec<(String, Option<String>)> {
            m.accessors().map(|x| (x.name.clone(), x.namespace.clone())).collect()
        };
        names(a) == names(b)
    }
}
