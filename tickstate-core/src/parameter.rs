//! Transition parameters.
//!
//! A parameter is an optional, heterogeneous payload handed to the leaving
//! and entered hooks of a transition (or the start/end hooks of a popup).
//! States that depend on a particular payload shape use [`require`] or
//! [`optional`] so that a wrong shape fails loudly with
//! [`MachineError::ParameterTypeMismatch`] instead of being ignored.

use crate::error::MachineError;
use crate::trace::short_type_name;
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// A type-erased transition payload.
#[derive(Clone)]
pub struct Parameter {
    value: Rc<dyn Any>,
    type_name: &'static str,
}

impl Parameter {
    /// Wraps a value as a parameter.
    pub fn new<P: Any>(value: P) -> Self {
        Self {
            value: Rc::new(value),
            type_name: short_type_name(std::any::type_name::<P>()),
        }
    }

    /// Returns the (shortened) type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns true if the wrapped value is exactly a `P`.
    pub fn is<P: Any>(&self) -> bool {
        self.value.is::<P>()
    }

    /// Returns the wrapped value if it is exactly a `P`.
    pub fn downcast_ref<P: Any>(&self) -> Option<&P> {
        self.value.downcast_ref::<P>()
    }

    /// Returns the wrapped value as a `P`, or a mismatch error naming `state`.
    pub fn expect<P: Any>(&self, state: &'static str) -> Result<&P, MachineError> {
        self.downcast_ref::<P>()
            .ok_or_else(|| MachineError::ParameterTypeMismatch {
                state,
                expected: short_type_name(std::any::type_name::<P>()),
                actual: self.type_name,
            })
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("type", &self.type_name)
            .finish()
    }
}

/// Requires a parameter of type `P`; absence is a mismatch too.
pub fn require<'a, P: Any>(
    parameter: Option<&'a Parameter>,
    state: &'static str,
) -> Result<&'a P, MachineError> {
    match parameter {
        Some(parameter) => parameter.expect::<P>(state),
        None => Err(MachineError::ParameterTypeMismatch {
            state,
            expected: short_type_name(std::any::type_name::<P>()),
            actual: "nothing",
        }),
    }
}

/// Accepts either no parameter or one of type `P`.
pub fn optional<'a, P: Any>(
    parameter: Option<&'a Parameter>,
    state: &'static str,
) -> Result<Option<&'a P>, MachineError> {
    parameter.map(|p| p.expect::<P>(state)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct JumpParameter {
        multiplier: f32,
    }

    #[test]
    fn test_downcast() {
        let parameter = Parameter::new(JumpParameter { multiplier: 2.0 });
        assert!(parameter.is::<JumpParameter>());
        assert!(!parameter.is::<u32>());
        assert_eq!(parameter.type_name(), "JumpParameter");
        assert_eq!(
            parameter.downcast_ref::<JumpParameter>(),
            Some(&JumpParameter { multiplier: 2.0 })
        );
    }

    #[test]
    fn test_require_missing() {
        let err = require::<JumpParameter>(None, "Jumping").unwrap_err();
        assert!(matches!(
            err,
            MachineError::ParameterTypeMismatch {
                actual: "nothing",
                ..
            }
        ));
    }

    #[test]
    fn test_require_wrong_shape() {
        let parameter = Parameter::new(42u32);
        let err = require::<JumpParameter>(Some(&parameter), "Jumping").unwrap_err();
        match err {
            MachineError::ParameterTypeMismatch {
                state,
                expected,
                actual,
            } => {
                assert_eq!(state, "Jumping");
                assert_eq!(expected, "JumpParameter");
                assert_eq!(actual, "u32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_optional() {
        assert!(optional::<JumpParameter>(None, "Jumping").unwrap().is_none());

        let parameter = Parameter::new(JumpParameter { multiplier: 1.5 });
        let value = optional::<JumpParameter>(Some(&parameter), "Jumping").unwrap();
        assert_eq!(value.map(|p| p.multiplier), Some(1.5));

        let wrong = Parameter::new("text");
        assert!(optional::<JumpParameter>(Some(&wrong), "Jumping").is_err());
    }

    #[test]
    fn test_clone_shares_value() {
        let parameter = Parameter::new(7i64);
        let cloned = parameter.clone();
        assert_eq!(cloned.downcast_ref::<i64>(), Some(&7));
    }
}
