//! Calculator native implementation
//!
//! Exercises every member kind the bridge supports: instance and static
//! methods, read-write, read-only and variant properties, and constants.

use ferry_sdk::{AbiResult, Constant, NativeError, NativeValue, Reflect, TypeDescriptor, TypeId};
use once_cell::sync::Lazy;

static DESCRIPTOR: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Calculator")
        .method("add", &[TypeId::INT, TypeId::INT], TypeId::INT)
        .method("subtract", &[TypeId::INT, TypeId::INT], TypeId::INT)
        .method("divide", &[TypeId::DOUBLE, TypeId::DOUBLE], TypeId::DOUBLE)
        .method("concat", &[TypeId::STRING, TypeId::STRING], TypeId::STRING)
        .method("sum", &[TypeId::LIST], TypeId::DOUBLE)
        .method("remember", &[TypeId::VARIANT], TypeId::VOID)
        .static_method("square", &[TypeId::INT], TypeId::INT)
        .property("memory", TypeId::DOUBLE)
        .readonly_property("calls", TypeId::INT)
        .property("last", TypeId::VARIANT)
        .constant("PI", Constant::Double(std::f64::consts::PI))
        .constant("VERSION", Constant::String("1".to_string()))
        .build()
});

const ADD: usize = 0;
const SUBTRACT: usize = 1;
const DIVIDE: usize = 2;
const CONCAT: usize = 3;
const SUM: usize = 4;
const REMEMBER: usize = 5;
const SQUARE: usize = 6;

const MEMORY: usize = 0;
const CALLS: usize = 1;
const LAST: usize = 2;

/// Stateful calculator
#[derive(Debug, Default)]
pub struct Calculator {
    memory: f64,
    calls: i32,
    last: Option<NativeValue>,
}

impl Calculator {
    /// Number of instance method calls so far
    pub fn calls(&self) -> i32 {
        self.calls
    }

    /// Stored memory value
    pub fn memory(&self) -> f64 {
        self.memory
    }
}

impl Reflect for Calculator {
    fn descriptor() -> &'static TypeDescriptor {
        &DESCRIPTOR
    }

    fn invoke(&mut self, index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
        self.calls += 1;
        match index {
            ADD => {
                let (a, b) = (args[0].extract::<i32>()?, args[1].extract::<i32>()?);
                a.checked_add(b)
                    .map(NativeValue::int)
                    .ok_or_else(|| NativeError::InvocationFailed("integer overflow".into()))
            }
            SUBTRACT => {
                let (a, b) = (args[0].extract::<i32>()?, args[1].extract::<i32>()?);
                a.checked_sub(b)
                    .map(NativeValue::int)
                    .ok_or_else(|| NativeError::InvocationFailed("integer overflow".into()))
            }
            DIVIDE => {
                let (a, b) = (args[0].extract::<f64>()?, args[1].extract::<f64>()?);
                if b == 0.0 {
                    return Err(NativeError::InvocationFailed("division by zero".into()));
                }
                Ok(NativeValue::double(a / b))
            }
            CONCAT => {
                let mut s = args[0].extract::<String>()?;
                s.push_str(&args[1].extract::<String>()?);
                Ok(NativeValue::string(s))
            }
            SUM => {
                let items = args[0].extract::<Vec<NativeValue>>()?;
                let mut total = 0.0;
                for item in &items {
                    total += item.extract::<f64>()?;
                }
                Ok(NativeValue::double(total))
            }
            REMEMBER => {
                self.last = Some(args[0].unwrap_variant().clone());
                Ok(NativeValue::void())
            }
            _ => Err(NativeError::UnknownMember(index)),
        }
    }

    fn invoke_static(index: usize, args: &[NativeValue]) -> AbiResult<NativeValue> {
        match index {
            SQUARE => {
                let n = args[0].extract::<i32>()?;
                n.checked_mul(n)
                    .map(NativeValue::int)
                    .ok_or_else(|| NativeError::InvocationFailed("integer overflow".into()))
            }
            _ => Err(NativeError::UnknownMember(index)),
        }
    }

    fn read_property(&self, index: usize) -> Option<NativeValue> {
        match index {
            MEMORY => Some(NativeValue::double(self.memory)),
            CALLS => Some(NativeValue::int(self.calls)),
            LAST => Some(self.last.clone().unwrap_or_else(NativeValue::void)),
            _ => None,
        }
    }

    fn write_property(&mut self, index: usize, value: NativeValue) -> bool {
        match (index, value.as_double()) {
            (MEMORY, Some(memory)) => {
                self.memory = memory;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_call_count() {
        let mut calc = Calculator::default();
        let sum = calc.invoke(ADD, &[NativeValue::int(2), NativeValue::int(3)]).unwrap();
        assert_eq!(sum.as_int(), Some(5));
        assert_eq!(calc.calls(), 1);
        assert_eq!(calc.read_property(CALLS).unwrap().as_int(), Some(1));
    }

    #[test]
    fn test_overflow_and_division_errors() {
        let mut calc = Calculator::default();
        assert!(calc
            .invoke(ADD, &[NativeValue::int(i32::MAX), NativeValue::int(1)])
            .is_err());
        let err = calc
            .invoke(DIVIDE, &[NativeValue::double(1.0), NativeValue::double(0.0)])
            .unwrap_err();
        assert_eq!(err.to_string(), "Invocation failed: division by zero");
    }

    #[test]
    fn test_sum_of_variants() {
        let mut calc = Calculator::default();
        let list = NativeValue::list(vec![
            NativeValue::variant(NativeValue::int(1)),
            NativeValue::variant(NativeValue::double(2.5)),
        ]);
        let total = calc.invoke(SUM, &[list]).unwrap();
        assert_eq!(total.as_double(), Some(3.5));

        let bad = NativeValue::list(vec![NativeValue::variant(NativeValue::string("x"))]);
        assert!(calc.invoke(SUM, &[bad]).is_err());
    }

    #[test]
    fn test_memory_property() {
        let mut calc = Calculator::default();
        assert!(calc.write_property(MEMORY, NativeValue::double(1.5)));
        assert_eq!(calc.memory(), 1.5);
        assert!(!calc.write_property(CALLS, NativeValue::int(3)));
    }

    #[test]
    fn test_remember_and_static_square() {
        let mut calc = Calculator::default();
        assert!(calc.read_property(LAST).unwrap().is_void());
        calc.invoke(REMEMBER, &[NativeValue::variant(NativeValue::string("hi"))])
            .unwrap();
        assert_eq!(calc.read_property(LAST).unwrap().as_str(), Some("hi"));
        let squared = Calculator::invoke_static(SQUARE, &[NativeValue::int(9)]).unwrap();
        assert_eq!(squared.as_int(), Some(81));
    }

    #[test]
    fn test_descriptor_shape() {
        let descriptor = Calculator::descriptor();
        assert_eq!(descriptor.method_index("square"), Some(SQUARE));
        assert!(descriptor.method(SQUARE).unwrap().is_static);
        assert_eq!(descriptor.property_index("last"), Some(LAST));
        assert_eq!(descriptor.constants().len(), 2);
    }
}
