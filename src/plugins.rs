//! Process-wide extension and type plugin registry
//!
//! The registry is the one piece of shared mutable state in the crate. It is
//! reference counted by live [`crate::schema::Context`]s: the first context
//! loads the built-in plugins, the last one to drop clears the registry.
//! Every access goes through an internal mutex.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Mutex;

use indexmap::IndexMap;
use once_cell::sync::Lazy;

/// Validator for values of a derived type
pub type TypeValidator = fn(&str) -> std::result::Result<(), String>;

/// Descriptor of an extension handled by a plugin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionPlugin {
    /// Module defining the extension
    pub module: String,
    /// Extension name
    pub name: String,
    /// Short description
    pub description: String,
}

#[derive(Debug, Default)]
struct Registry {
    contexts: usize,
    extensions: IndexMap<(String, String), ExtensionPlugin>,
    types: IndexMap<(String, String), TypeValidator>,
}

impl Registry {
    fn load_builtins(&mut self) {
        for (module, name, description) in [
            ("ietf-netconf-acm", "default-deny-write", "NACM write protection"),
            ("ietf-netconf-acm", "default-deny-all", "NACM read and write protection"),
            ("ietf-yang-metadata", "annotation", "Metadata annotation"),
        ] {
            self.extensions.insert(
                (module.to_string(), name.to_string()),
                ExtensionPlugin {
                    module: module.to_string(),
                    name: name.to_string(),
                    description: description.to_string(),
                },
            );
        }
        self.types.insert(
            ("ietf-inet-types".to_string(), "ipv4-address-no-zone".to_string()),
            validate_ipv4,
        );
        self.types.insert(
            ("ietf-inet-types".to_string(), "ipv6-address-no-zone".to_string()),
            validate_ipv6,
        );
        self.types.insert(
            ("ietf-inet-types".to_string(), "ipv4-address".to_string()),
            validate_ipv4_zoned,
        );
        self.types.insert(
            ("ietf-inet-types".to_string(), "ipv6-address".to_string()),
            validate_ipv6_zoned,
        );
    }
}

static REGISTRY: Lazy<Mutex<Registry>> = Lazy::new(|| Mutex::new(Registry::default()));

fn with_registry<T>(f: impl FnOnce(&mut Registry) -> T) -> T {
    let mut guard = REGISTRY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Register one more live context
pub fn acquire() {
    with_registry(|r| {
        if r.contexts == 0 {
            r.load_builtins();
            tracing::debug!("plugin registry loaded");
        }
        r.contexts += 1;
    });
}

/// Drop one live context, clearing the registry with the last one
pub fn release() {
    with_registry(|r| {
        r.contexts = r.contexts.saturating_sub(1);
        if r.contexts == 0 {
            r.extensions.clear();
            r.types.clear();
            tracing::debug!("plugin registry cleared");
        }
    });
}

/// Number of live contexts holding the registry
pub fn live_contexts() -> usize {
    with_registry(|r| r.contexts)
}

/// Register an extension plugin
///
/// Only effective while at least one context is alive.
pub fn register_extension(plugin: ExtensionPlugin) -> bool {
    with_registry(|r| {
        if r.contexts == 0 {
            return false;
        }
        r.extensions
            .insert((plugin.module.clone(), plugin.name.clone()), plugin);
        true
    })
}

/// Register a validator for a typedef
///
/// Only effective while at least one context is alive.
pub fn register_type_validator(module: &str, typedef: &str, validator: TypeValidator) -> bool {
    with_registry(|r| {
        if r.contexts == 0 {
            return false;
        }
        r.types
            .insert((module.to_string(), typedef.to_string()), validator);
        true
    })
}

/// Look up an extension plugin
pub fn extension(module: &str, name: &str) -> Option<ExtensionPlugin> {
    with_registry(|r| {
        r.extensions
            .get(&(module.to_string(), name.to_string()))
            .cloned()
    })
}

/// Look up a type validator
pub fn type_validator(module: &str, typedef: &str) -> Option<TypeValidator> {
    with_registry(|r| r.types.get(&(module.to_string(), typedef.to_string())).copied())
}

/// RAII handle keeping the registry alive
#[derive(Debug)]
pub struct PluginHandle(());

impl PluginHandle {
    /// Acquire the registry
    pub fn acquire() -> Self {
        acquire();
        Self(())
    }
}

impl Clone for PluginHandle {
    fn clone(&self) -> Self {
        Self::acquire()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        release();
    }
}

// =============================================================================
// Built-in type validators
// =============================================================================

fn split_zone(value: &str) -> &str {
    value.split_once('%').map(|(addr, _)| addr).unwrap_or(value)
}

fn validate_ipv4(value: &str) -> std::result::Result<(), String> {
    value
        .parse::<Ipv4Addr>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not an IPv4 address", value))
}

fn validate_ipv6(value: &str) -> std::result::Result<(), String> {
    value
        .parse::<Ipv6Addr>()
        .map(|_| ())
        .map_err(|_| format!("'{}' is not an IPv6 address", value))
}

fn validate_ipv4_zoned(value: &str) -> std::result::Result<(), String> {
    validate_ipv4(split_zone(value))
}

fn validate_ipv6_zoned(value: &str) -> std::result::Result<(), String> {
    validate_ipv6(split_zone(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_keeps_registry_alive() {
        let handle = PluginHandle::acquire();
        assert!(live_contexts() >= 1);
        assert!(type_validator("ietf-inet-types", "ipv4-address").is_some());
        assert!(extension("ietf-netconf-acm", "default-deny-all").is_some());
        let clone = handle.clone();
        assert!(live_contexts() >= 2);
        drop(clone);
        drop(handle);
    }

    #[test]
    fn test_builtin_validators() {
        assert!(validate_ipv4("192.0.2.1").is_ok());
        assert!(validate_ipv4("192.0.2.300").is_err());
        assert!(validate_ipv4_zoned("10.0.0.1%eth0").is_ok());
        assert!(validate_ipv6("2001:db8::1").is_ok());
        assert!(validate_ipv6("2001:db8::g").is_err());
    }
}
