//! Type ids shared by native values, descriptors and converters
//!
//! Built-in ids are fixed constants. Native types that cross the bridge as
//! objects get an id from a process-wide table the first time they are
//! registered; ids are never reused or renumbered.

use std::any::{Any, TypeId as RustTypeId};
use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use parking_lot::RwLock;

/// Identifier of a value type that can cross the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    /// No value
    pub const VOID: TypeId = TypeId(0);
    /// Fully dynamic value; the concrete type is carried inside
    pub const VARIANT: TypeId = TypeId(1);
    /// Boolean
    pub const BOOL: TypeId = TypeId(2);
    /// 32-bit signed integer
    pub const INT: TypeId = TypeId(3);
    /// 64-bit float
    pub const DOUBLE: TypeId = TypeId(4);
    /// UTF-8 string
    pub const STRING: TypeId = TypeId(5);
    /// Opaque shared byte buffer
    pub const BUFFER: TypeId = TypeId(6);
    /// Ordered list of values
    pub const LIST: TypeId = TypeId(7);
    /// Deferred result settled later, possibly from another thread
    pub const DEFERRED: TypeId = TypeId(8);

    /// First id handed out to registered object types
    pub const FIRST_USER: u32 = 64;

    const BUILTIN: [(TypeId, &'static str); 9] = [
        (TypeId::VOID, "void"),
        (TypeId::VARIANT, "variant"),
        (TypeId::BOOL, "bool"),
        (TypeId::INT, "int"),
        (TypeId::DOUBLE, "double"),
        (TypeId::STRING, "string"),
        (TypeId::BUFFER, "buffer"),
        (TypeId::LIST, "list"),
        (TypeId::DEFERRED, "deferred"),
    ];

    /// Create from a raw id
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    /// Get the raw id
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Check if this is one of the fixed built-in ids
    pub fn is_builtin(self) -> bool {
        self.0 < Self::FIRST_USER
    }

    /// Human-readable name, as used in method signatures
    pub fn name(self) -> String {
        if let Some((_, name)) = Self::BUILTIN.iter().find(|(id, _)| *id == self) {
            return (*name).to_string();
        }
        if self.0 >= Self::FIRST_USER {
            if let Some(name) = TABLE.read().names.get((self.0 - Self::FIRST_USER) as usize) {
                return name.clone();
            }
        }
        format!("#{}", self.0)
    }

    /// Register a Rust type under `name`, returning its id.
    ///
    /// Registering the same Rust type again returns the id it already has.
    pub fn register<T: Any>(name: &str) -> TypeId {
        let key = RustTypeId::of::<T>();
        if let Some(id) = TABLE.read().by_rust.get(&key) {
            return *id;
        }
        let mut table = TABLE.write();
        if let Some(id) = table.by_rust.get(&key) {
            return *id;
        }
        let id = TypeId(Self::FIRST_USER + table.names.len() as u32);
        table.names.push(name.to_string());
        table.by_rust.insert(key, id);
        table.by_name.entry(name.to_string()).or_insert(id);
        id
    }

    /// Look up the id of a registered Rust type
    pub fn of<T: Any>() -> Option<TypeId> {
        TABLE.read().by_rust.get(&RustTypeId::of::<T>()).copied()
    }

    /// Look up an id by name, built-in or registered
    pub fn lookup(name: &str) -> Option<TypeId> {
        if let Some((id, _)) = Self::BUILTIN.iter().find(|(_, n)| *n == name) {
            return Some(*id);
        }
        TABLE.read().by_name.get(name).copied()
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[derive(Default)]
struct TypeTable {
    names: Vec<String>,
    by_rust: HashMap<RustTypeId, TypeId>,
    by_name: HashMap<String, TypeId>,
}

static TABLE: Lazy<RwLock<TypeTable>> = Lazy::new(|| RwLock::new(TypeTable::default()));

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe;
    struct Other;

    #[test]
    fn test_builtin_names() {
        assert_eq!(TypeId::INT.name(), "int");
        assert_eq!(TypeId::VARIANT.to_string(), "variant");
        assert_eq!(TypeId::lookup("buffer"), Some(TypeId::BUFFER));
        assert!(TypeId::DEFERRED.is_builtin());
    }

    #[test]
    fn test_register_is_idempotent() {
        let first = TypeId::register::<Probe>("Probe");
        let second = TypeId::register::<Probe>("Renamed");
        assert_eq!(first, second);
        assert!(!first.is_builtin());
        assert_eq!(first.name(), "Probe");
        assert_eq!(TypeId::of::<Probe>(), Some(first));
        assert_eq!(TypeId::lookup("Probe"), Some(first));
    }

    #[test]
    fn test_distinct_types_get_distinct_ids() {
        let a = TypeId::register::<Probe>("Probe");
        let b = TypeId::register::<Other>("Other");
        assert_ne!(a, b);
        assert_eq!(TypeId::of::<String>(), None);
    }

    #[test]
    fn test_unknown_id_name() {
        assert_eq!(TypeId::from_raw(63).name(), "#63");
        assert_eq!(TypeId::from_raw(1_000_000).name(), "#1000000");
    }
}
