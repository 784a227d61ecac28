//! Errors reported to foreign callers

use ferry_sdk::NativeError;
use thiserror::Error;

use crate::runtime::{Context, Throw};

/// Contract violation by a foreign caller.
///
/// These never abort; they surface as a thrown foreign error at the call
/// site via [`BridgeError::throw`].
#[derive(Debug, Clone, Error)]
pub enum BridgeError {
    /// Wrong number of arguments for a method
    #[error("{method}: expected {expected} argument(s), got {got}")]
    ArityMismatch {
        /// Method name
        method: String,
        /// Declared parameter count
        expected: usize,
        /// Supplied argument count
        got: usize,
    },

    /// An argument could not be converted to its declared type
    #[error("{method}: argument {index} cannot be converted to {expected}")]
    ArgumentConversion {
        /// Method name
        method: String,
        /// Zero-based argument position
        index: usize,
        /// Declared type name
        expected: String,
    },

    /// A return value could not be converted back to a foreign value
    #[error("{member}: result of type {type_name} cannot be converted to a foreign value")]
    ResultConversion {
        /// Method or property name
        member: String,
        /// Native type name
        type_name: String,
    },

    /// The native instance refused to produce a property value
    #[error("failed to read property {property}")]
    PropertyRead {
        /// Property name
        property: String,
    },

    /// A property setter was called with other than one value
    #[error("setting {property} takes exactly one value, got {got}")]
    PropertySetArity {
        /// Property name
        property: String,
        /// Supplied argument count
        got: usize,
    },

    /// Assigning a property whose type is fully dynamic
    #[error("property {property} has dynamic type {type_name} and cannot be assigned")]
    DynamicProperty {
        /// Property name
        property: String,
        /// Declared type name
        type_name: String,
    },

    /// The assigned value could not be converted to the property type
    #[error("value for {property} cannot be converted to {expected}")]
    PropertyConversion {
        /// Property name
        property: String,
        /// Declared type name
        expected: String,
    },

    /// The native instance rejected a property write
    #[error("failed to write property {property}")]
    WriteFailed {
        /// Property name
        property: String,
    },

    /// The native method reported an error
    #[error("{method}: {source}")]
    Invocation {
        /// Method name
        method: String,
        /// Native error
        source: NativeError,
    },

    /// Subscribing to a channel the type does not declare
    #[error("unknown event channel: {0}")]
    UnknownChannel(String),

    /// `on` called with an unsupported argument shape
    #[error("usage: on() lists channels, on(signature, callback | null | undefined) subscribes")]
    SubscribeUsage,

    /// Class constructor called without `new`
    #[error("class constructor {0} cannot be invoked without 'new'")]
    NotConstructed(String),
}

impl BridgeError {
    /// Build the foreign throw for this error
    pub fn throw(&self, cx: &Context) -> Throw {
        match self {
            BridgeError::SubscribeUsage | BridgeError::NotConstructed(_) => {
                cx.type_error(self.to_string())
            }
            _ => cx.error(self.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = BridgeError::ArityMismatch {
            method: "add".to_string(),
            expected: 2,
            got: 1,
        };
        assert_eq!(err.to_string(), "add: expected 2 argument(s), got 1");
        assert_eq!(
            BridgeError::UnknownChannel("gone(int)".to_string()).to_string(),
            "unknown event channel: gone(int)"
        );
    }

    #[test]
    fn test_throw_kinds() {
        let cx = Context::new();
        let throw = BridgeError::WriteFailed {
            property: "x".to_string(),
        }
        .throw(&cx);
        assert_eq!(cx.describe(throw.value()), "Error: failed to write property x");

        let throw = BridgeError::SubscribeUsage.throw(&cx);
        assert!(cx.describe(throw.value()).starts_with("TypeError: usage"));
    }
}
