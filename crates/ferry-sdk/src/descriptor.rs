//! Reflection descriptors
//!
//! A [`TypeDescriptor`] lists what a native type exposes: methods (including
//! event channels), properties and class constants. Descriptors are built
//! once, usually inside a `Lazy` static, and never change afterwards, so
//! method and property indices stay valid for the life of the process.

use crate::types::TypeId;
use crate::value::NativeValue;

/// What a method entry stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    /// Invokable method
    Method,
    /// Event channel; fired by the native side, never invoked
    Event,
}

/// Method metadata
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    /// Method name
    pub name: String,
    /// Declared parameter types, in order
    pub parameter_types: Vec<TypeId>,
    /// Declared return type (`TypeId::VOID` for none)
    pub return_type: TypeId,
    /// Whether the method is called without an instance
    pub is_static: bool,
    /// Method or event channel
    pub kind: MemberKind,
}

impl MethodDescriptor {
    /// Number of declared parameters
    pub fn arity(&self) -> usize {
        self.parameter_types.len()
    }

    /// Signature string, e.g. `changed(int)`
    pub fn signature(&self) -> String {
        let params: Vec<String> = self.parameter_types.iter().map(|t| t.name()).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// Check if this entry is an event channel
    pub fn is_event(&self) -> bool {
        self.kind == MemberKind::Event
    }
}

/// Property metadata
#[derive(Debug, Clone)]
pub struct PropertyDescriptor {
    /// Property name
    pub name: String,
    /// Declared type
    pub type_id: TypeId,
    /// Whether the property can be read
    pub readable: bool,
    /// Whether the property can be written
    pub writable: bool,
}

/// Class-level constant
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Boolean literal
    Bool(bool),
    /// Integer literal
    Int(i32),
    /// Float literal
    Double(f64),
    /// String literal
    String(String),
}

impl Constant {
    /// Convert to a native value
    pub fn to_native(&self) -> NativeValue {
        match self {
            Constant::Bool(b) => NativeValue::bool(*b),
            Constant::Int(i) => NativeValue::int(*i),
            Constant::Double(d) => NativeValue::double(*d),
            Constant::String(s) => NativeValue::string(s.clone()),
        }
    }
}

/// Reflection table for one native type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    name: String,
    methods: Vec<MethodDescriptor>,
    properties: Vec<PropertyDescriptor>,
    constants: Vec<(String, Constant)>,
}

impl TypeDescriptor {
    /// Start building a descriptor for the type `name`
    pub fn builder(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                name: name.into(),
                methods: Vec::new(),
                properties: Vec::new(),
                constants: Vec::new(),
            },
        }
    }

    /// Type name as seen by foreign code
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All methods and event channels, in index order
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// All properties, in index order
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// All constants, in declaration order
    pub fn constants(&self) -> &[(String, Constant)] {
        &self.constants
    }

    /// Method by index
    pub fn method(&self, index: usize) -> Option<&MethodDescriptor> {
        self.methods.get(index)
    }

    /// Property by index
    pub fn property(&self, index: usize) -> Option<&PropertyDescriptor> {
        self.properties.get(index)
    }

    /// Index of the first method or event named `name`
    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods.iter().position(|m| m.name == name)
    }

    /// Index of the property named `name`
    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Event channels with their method indices
    pub fn events(&self) -> impl Iterator<Item = (usize, &MethodDescriptor)> {
        self.methods.iter().enumerate().filter(|(_, m)| m.is_event())
    }

    /// Check if the type declares any event channel
    pub fn has_events(&self) -> bool {
        self.methods.iter().any(MethodDescriptor::is_event)
    }
}

/// Builder for [`TypeDescriptor`]
pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    /// Add an instance method
    pub fn method(self, name: &str, params: &[TypeId], returns: TypeId) -> Self {
        self.push_method(name, params, returns, false, MemberKind::Method)
    }

    /// Add a static method
    pub fn static_method(self, name: &str, params: &[TypeId], returns: TypeId) -> Self {
        self.push_method(name, params, returns, true, MemberKind::Method)
    }

    /// Add an event channel
    pub fn event(self, name: &str, params: &[TypeId]) -> Self {
        self.push_method(name, params, TypeId::VOID, false, MemberKind::Event)
    }

    /// Add a readable and writable property
    pub fn property(self, name: &str, type_id: TypeId) -> Self {
        self.push_property(name, type_id, true, true)
    }

    /// Add a read-only property
    pub fn readonly_property(self, name: &str, type_id: TypeId) -> Self {
        self.push_property(name, type_id, true, false)
    }

    /// Add a class constant
    pub fn constant(mut self, name: &str, value: Constant) -> Self {
        self.descriptor.constants.push((name.to_string(), value));
        self
    }

    /// Finish
    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }

    fn push_method(
        mut self,
        name: &str,
        params: &[TypeId],
        returns: TypeId,
        is_static: bool,
        kind: MemberKind,
    ) -> Self {
        self.descriptor.methods.push(MethodDescriptor {
            name: name.to_string(),
            parameter_types: params.to_vec(),
            return_type: returns,
            is_static,
            kind,
        });
        self
    }

    fn push_property(mut self, name: &str, type_id: TypeId, readable: bool, writable: bool) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.to_string(),
            type_id,
            readable,
            writable,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TypeDescriptor {
        TypeDescriptor::builder("Counter")
            .method("add", &[TypeId::INT, TypeId::INT], TypeId::INT)
            .event("changed", &[TypeId::INT])
            .static_method("version", &[], TypeId::STRING)
            .event("reset", &[])
            .property("value", TypeId::INT)
            .readonly_property("label", TypeId::STRING)
            .constant("MAX", Constant::Int(10))
            .build()
    }

    #[test]
    fn test_indices_follow_declaration_order() {
        let d = sample();
        assert_eq!(d.name(), "Counter");
        assert_eq!(d.method_index("add"), Some(0));
        assert_eq!(d.method_index("version"), Some(2));
        assert_eq!(d.property_index("label"), Some(1));
        assert_eq!(d.method(0).unwrap().arity(), 2);
        assert!(d.method(2).unwrap().is_static);
        assert!(d.method(9).is_none());
    }

    #[test]
    fn test_event_signatures() {
        let d = sample();
        let events: Vec<(usize, String)> = d.events().map(|(i, m)| (i, m.signature())).collect();
        assert_eq!(
            events,
            vec![(1, "changed(int)".to_string()), (3, "reset()".to_string())]
        );
        assert!(d.has_events());
    }

    #[test]
    fn test_property_flags() {
        let d = sample();
        let label = d.property(1).unwrap();
        assert!(label.readable);
        assert!(!label.writable);
        assert!(d.property(0).unwrap().writable);
    }

    #[test]
    fn test_constants() {
        let d = sample();
        assert_eq!(d.constants().len(), 1);
        assert_eq!(d.constants()[0].1.to_native().as_int(), Some(10));
    }
}
