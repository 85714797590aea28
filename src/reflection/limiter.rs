//! Depth guard and deferred work-list for struct population, shared by the
//! reflection and schema importers.
use crate::mapping::MappingId;
use crate::model::StructModel;

/// Outcome of one attempt at populating a struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Progress {
    Done,
    /// The base is queued; it was moved to the top to run first.
    Deferred,
    /// The base is being populated further up the stack.
    Blocked,
}

/// An entry of the deferred work-list, keyed by the mapping it fills.
pub trait WorkItem: Clone {
    fn mapping(&self) -> MappingId;
}

/// A struct whose members still have to be populated.
#[derive(Debug, Clone)]
pub struct ImportStructWorkItem<'m> {
    pub model: StructModel<'m>,
    pub mapping: MappingId,
    /// Namespace the struct's nested types are imported into.
    pub ns: Option<String>,
}

impl WorkItem for ImportStructWorkItem<'_> {
    fn mapping(&self) -> MappingId {
        self.mapping
    }
}

#[derive(Debug)]
pub struct RecursionLimiter<W> {
    depth: usize,
    max_depth: usize,
    deferred: Vec<W>,
}

impl<W: WorkItem> RecursionLimiter<W> {
    pub fn new(max_depth: usize) -> Self {
        Self { depth: 0, max_depth: max_depth.max(1), deferred: Vec::new() }
    }

    pub fn is_exceeded_limit(&self) -> bool {
        self.depth >= self.max_depth
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn enter(&mut self) {
        self.depth += 1;
    }

    pub fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn position(&self, mapping: MappingId) -> Option<usize> {
        self.deferred.iter().position(|item| item.mapping() == mapping)
    }

    pub fn is_deferred(&self, mapping: MappingId) -> bool {
        self.position(mapping).is_some()
    }

    /// Append unless already queued.
    pub fn defer(&mut self, item: W) {
        if !self.is_deferred(item.mapping()) {
            self.deferred.push(item);
        }
    }

    pub fn top(&self) -> Option<&W> {
        self.deferred.last()
    }

    /// Swap the entry at `index` with the top so it is retried next.
    pub fn promote(&mut self, index: usize) {
        let top = self.deferred.len().saturating_sub(1);
        if index < top {
            self.deferred.swap(index, top);
        }
    }

    pub fn remove(&mut self, mapping: MappingId) {
        if let Some(index) = self.position(mapping) {
            self.deferred.remove(index);
        }
    }

    pub fn pending(&self) -> usize {
        self.deferred.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelScope, ReflectedModel, ReflectedType, TypeModel};
    use crate::mapping::{Mapping, MappingGraph, MappingKind, StructMapping};
    use crate::type_desc::TypeScope;

    #[test]
    fn promote_moves_entry_to_top() {
        let model = ReflectedModel::new().with_type(ReflectedType::class("A"));
        let mut types = TypeScope::new();
        let mut scope = ModelScope::new(&model);
        let desc = scope.resolve(&mut types, "A").unwrap();
        let TypeModel::Struct(sm) = scope.type_model(&types, desc).unwrap() else {
            panic!("expected struct");
        };
        let mut graph = MappingGraph::new(types);
        let ids: Vec<_> = (0..3)
            .map(|_| graph.add(Mapping::new("A", None, Some(desc), MappingKind::Struct(StructMapping::default()))))
            .collect();

        let mut limiter = RecursionLimiter::new(1);
        for id in &ids {
            limiter.defer(ImportStructWorkItem { model: sm, mapping: *id, ns: None });
        }
        limiter.defer(ImportStructWorkItem { model: sm, mapping: ids[0], ns: None });
        assert_eq!(limiter.pending(), 3);

        limiter.promote(0);
        assert_eq!(limiter.top().map(|i| i.mapping), Some(ids[0]));
        assert_eq!(limiter.position(ids[2]), Some(0));
        limiter.remove(ids[0]);
        assert_eq!(limiter.pending(), 2);
    }

    #[test]
    fn limit_is_reached_at_depth() {
        let mut limiter: RecursionLimiter<ImportStructWorkItem<'_>> = RecursionLimiter::new(2);
        assert!(!limiter.is_exceeded_limit());
        limiter.enter();
        limiter.enter();
        assert!(limiter.is_exceeded_limit());
        limiter.leave();
        assert!(!limiter.is_exceeded_limit());
    }
}
