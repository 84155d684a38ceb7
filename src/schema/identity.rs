//! Identity derivation graph
//!
//! Base edges are stored in both directions (`bases` and `derived`). Each
//! time an edge is added the full ancestor chain of the new base is walked;
//! reaching the derived identity again is a circular reference.

use std::collections::HashSet;

use crate::error::SchemaError;
use crate::ids::{IdentityId, ModuleId};
use crate::statement::{SourcePos, Statement};

use super::iffeature::IfFeature;
use super::node::Status;
use super::{Context, Unit};

/// An `identity` definition
#[derive(Debug, Clone)]
pub struct Identity {
    /// Identity name
    pub name: String,
    /// Owning module
    pub module: ModuleId,
    /// Module or submodule where it is written
    pub unit: Unit,
    /// Direct bases
    pub bases: Vec<IdentityId>,
    /// Direct derivatives
    pub derived: Vec<IdentityId>,
    /// Gating if-features
    pub if_features: Vec<IfFeature>,
    /// Status
    pub status: Status,
    /// The `identity` statement
    pub stmt: Statement,
    /// Source position
    pub position: SourcePos,
}

impl Context {
    /// Whether `id` is derived, directly or transitively, from `base`
    pub fn is_derived_from(&self, id: IdentityId, base: IdentityId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = self.identity(id).bases.clone();
        while let Some(current) = stack.pop() {
            if current == base {
                return true;
            }
            if visited.insert(current) {
                stack.extend(self.identity(current).bases.iter().copied());
            }
        }
        false
    }

    /// Every identity derived from `base`, transitively
    pub fn derived_identities(&self, base: IdentityId) -> Vec<IdentityId> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = self.identity(base).derived.clone();
        while let Some(current) = stack.pop() {
            if visited.insert(current) {
                out.push(current);
                stack.extend(self.identity(current).derived.iter().copied());
            }
        }
        out
    }

    /// Qualified `module:name` of an identity
    pub fn identity_name(&self, id: IdentityId) -> String {
        let identity = self.identity(id);
        format!("{}:{}", self.module(identity.module).name, identity.name)
    }

    /// Record a base edge, rejecting it if it closes a cycle
    pub(crate) fn add_identity_base(
        &mut self,
        id: IdentityId,
        base: IdentityId,
    ) -> Result<(), SchemaError> {
        if id == base || self.is_derived_from(base, id) {
            let mut chain = vec![self.identity(id).name.clone()];
            let mut current = base;
            let mut visited = HashSet::new();
            while current != id && visited.insert(current) {
                chain.push(self.identity(current).name.clone());
                match self
                    .identity(current)
                    .bases
                    .iter()
                    .find(|b| **b == id || self.is_derived_from(**b, id))
                {
                    Some(next) => current = *next,
                    None => break,
                }
            }
            chain.push(self.identity(id).name.clone());
            return Err(SchemaError::circular(format!(
                "Identity '{}' is derived from itself ({})",
                self.identity(id).name,
                chain.join(" -> ")
            ))
            .with_position(self.identity(id).position));
        }

        let identities = &mut self.arena.identities;
        if !identities[id.to_index()].bases.contains(&base) {
            identities[id.to_index()].bases.push(base);
        }
        if !identities[base.to_index()].derived.contains(&id) {
            identities[base.to_index()].derived.push(id);
        }
        Ok(())
    }
}
