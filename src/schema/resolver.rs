//! Identifier and namespace resolution
//!
//! Prefixes resolve relative to a [`Unit`]: the unit's own prefix first,
//! then the submodule's imports, then the main module's imports. Typedefs
//! and groupings are looked up lexically, walking the enclosing nodes
//! before the module's top-level tables.

use std::collections::HashSet;
use std::hash::Hash;

use crate::error::{Error, Result, SchemaError};
use crate::ids::{FeatureId, IdentityId, ModuleId, NodeId, TypedefId};
use crate::names::split_prefixed;
use crate::xpath::NamespaceMap;

use super::{Context, Import, Unit};

/// Find a path from `start` back to itself through `neighbors`
///
/// Returns the cycle as a list starting and ending with `start`.
pub(crate) fn trace_cycle<T, F>(start: T, neighbors: F) -> Option<Vec<T>>
where
    T: Copy + Eq + Hash,
    F: Fn(T) -> Vec<T>,
{
    fn visit<T, F>(node: T, start: T, neighbors: &F, path: &mut Vec<T>, visited: &mut HashSet<T>) -> bool
    where
        T: Copy + Eq + Hash,
        F: Fn(T) -> Vec<T>,
    {
        for next in neighbors(node) {
            if next == start {
                path.push(next);
                return true;
            }
            if visited.insert(next) {
                path.push(next);
                if visit(next, start, neighbors, path, visited) {
                    return true;
                }
                path.pop();
            }
        }
        false
    }

    let mut path = vec![start];
    let mut visited = HashSet::new();
    visited.insert(start);
    if visit(start, start, &neighbors, &mut path, &mut visited) {
        Some(path)
    } else {
        None
    }
}

impl Context {
    /// Own prefix of a unit
    pub(crate) fn unit_prefix(&self, unit: Unit) -> &str {
        let module = self.module(unit.module);
        match unit.submodule {
            Some(i) => &module.submodules[i].prefix,
            None => &module.prefix,
        }
    }

    /// Imports visible from a unit, most specific first
    pub(crate) fn unit_imports(&self, unit: Unit) -> Vec<&Import> {
        let module = self.module(unit.module);
        let mut imports: Vec<&Import> = Vec::new();
        if let Some(i) = unit.submodule {
            imports.extend(module.submodules[i].imports.iter());
        }
        imports.extend(module.imports.iter());
        imports
    }

    /// Resolve a prefix relative to a unit
    ///
    /// An absent prefix or the unit's own prefix is the unit's module.
    pub fn resolve_prefix(&self, unit: Unit, prefix: Option<&str>) -> Result<ModuleId> {
        let Some(prefix) = prefix.filter(|p| !p.is_empty()) else {
            return Ok(unit.module);
        };
        if prefix == self.unit_prefix(unit) {
            return Ok(unit.module);
        }
        self.unit_imports(unit)
            .into_iter()
            .find(|i| i.prefix == prefix)
            .map(|i| i.module)
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "prefix '{}' in module '{}'",
                    prefix,
                    self.module(unit.module).name
                ))
            })
    }

    pub(crate) fn prefix_module(
        &self,
        unit: Unit,
        prefix: Option<&str>,
    ) -> std::result::Result<ModuleId, SchemaError> {
        self.resolve_prefix(unit, prefix)
            .map_err(|_| SchemaError::unresolved(format!("Unknown prefix '{}'", prefix.unwrap_or(""))))
    }

    /// Resolve a prefix from any unit of a module
    pub(crate) fn resolve_prefix_any(&self, module: ModuleId, prefix: &str) -> Option<ModuleId> {
        if let Ok(id) = self.resolve_prefix(Unit::main(module), Some(prefix)) {
            return Some(id);
        }
        (0..self.module(module).submodules.len()).find_map(|i| {
            self.resolve_prefix(
                Unit {
                    module,
                    submodule: Some(i),
                },
                Some(prefix),
            )
            .ok()
        })
    }

    /// Prefix to module name map of a unit, for XPath expressions
    pub(crate) fn namespace_map(&self, unit: Unit) -> NamespaceMap {
        let mut map = NamespaceMap::new();
        map.insert(
            self.unit_prefix(unit).to_string(),
            self.module(unit.module).name.clone(),
        );
        for import in self.unit_imports(unit) {
            map.entry(import.prefix.clone())
                .or_insert_with(|| import.name.clone());
        }
        map
    }

    /// Namespace map using module names as prefixes, for instance data paths
    pub(crate) fn module_name_map(&self) -> NamespaceMap {
        self.arena
            .modules
            .iter()
            .map(|m| (m.name.clone(), m.name.clone()))
            .collect()
    }

    /// Lexical typedef lookup
    ///
    /// Returns `Ok(None)` when the name is not a typedef anywhere in scope.
    pub(crate) fn find_typedef(
        &self,
        unit: Unit,
        scope: Option<NodeId>,
        name: &str,
    ) -> std::result::Result<Option<TypedefId>, SchemaError> {
        let (prefix, local) = split_prefixed(name);
        let module = self.prefix_module(unit, prefix)?;
        if module == unit.module {
            let mut current = scope;
            while let Some(id) = current {
                let node = self.node(id);
                if let Some(td) = node.typedefs.get(local) {
                    return Ok(Some(*td));
                }
                current = node.parent;
            }
        }
        Ok(self.module(module).typedefs.get(local).copied())
    }

    /// Lexical grouping lookup
    pub(crate) fn find_grouping(
        &self,
        unit: Unit,
        scope: Option<NodeId>,
        name: &str,
    ) -> std::result::Result<Option<NodeId>, SchemaError> {
        let (prefix, local) = split_prefixed(name);
        let module = self.prefix_module(unit, prefix)?;
        if module == unit.module {
            let mut current = scope;
            while let Some(id) = current {
                let node = self.node(id);
                if let Some(g) = node.groupings.get(local) {
                    return Ok(Some(*g));
                }
                current = node.parent;
            }
        }
        Ok(self.module(module).groupings.get(local).copied())
    }

    /// Resolve a feature name used in an if-feature expression
    pub(crate) fn find_feature(
        &self,
        unit: Unit,
        name: &str,
    ) -> std::result::Result<FeatureId, SchemaError> {
        let (prefix, local) = split_prefixed(name);
        let module = self.prefix_module(unit, prefix)?;
        self.module(module)
            .features
            .get(local)
            .copied()
            .ok_or_else(|| SchemaError::unresolved(format!("Feature '{}' not found", name)))
    }

    /// Resolve an identity name used as a base
    pub(crate) fn find_identity_ref(
        &self,
        unit: Unit,
        name: &str,
    ) -> std::result::Result<IdentityId, SchemaError> {
        let (prefix, local) = split_prefixed(name);
        let module = self.prefix_module(unit, prefix)?;
        self.module(module)
            .identities
            .get(local)
            .copied()
            .ok_or_else(|| SchemaError::unresolved(format!("Identity '{}' not found", name)))
    }

    /// Resolve an extension keyword `prefix:name`
    pub(crate) fn find_extension(
        &self,
        unit: Unit,
        keyword: &str,
    ) -> std::result::Result<(ModuleId, String), SchemaError> {
        let (prefix, local) = split_prefixed(keyword);
        let module = self.prefix_module(unit, prefix)?;
        if self.module(module).extensions.contains_key(local) {
            Ok((module, local.to_string()))
        } else {
            Err(SchemaError::unresolved(format!(
                "Extension '{}' not found",
                keyword
            )))
        }
    }

    /// Whether a typedef or grouping name is already visible from `scope`
    ///
    /// Used for the shadowing rule: a scoped definition may not reuse a name
    /// visible from an enclosing scope or the module top level.
    pub(crate) fn scoped_name_taken(
        &self,
        module: ModuleId,
        scope: Option<NodeId>,
        name: &str,
        typedef: bool,
    ) -> bool {
        let mut current = scope;
        while let Some(id) = current {
            let node = self.node(id);
            let taken = if typedef {
                node.typedefs.contains_key(name)
            } else {
                node.groupings.contains_key(name)
            };
            if taken {
                return true;
            }
            current = node.parent;
        }
        let m = self.module(module);
        if typedef {
            m.typedefs.contains_key(name)
        } else {
            m.groupings.contains_key(name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_cycle() {
        let edges = |n: u32| match n {
            1 => vec![2],
            2 => vec![3, 4],
            3 => vec![1],
            _ => vec![],
        };
        assert_eq!(trace_cycle(1, edges), Some(vec![1, 2, 3, 1]));
        assert_eq!(trace_cycle(4, edges), None);
    }

    #[test]
    fn test_self_loop() {
        assert_eq!(trace_cycle(7u32, |n| vec![n]), Some(vec![7, 7]));
    }
}
