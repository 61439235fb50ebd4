//! Errors raised while building and resolving type metadata

use crate::kind::TypeKind;
use crate::ty::TypeId;
use thiserror::Error;

/// Registry and descriptor errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// Type id does not exist in the registry
    #[error("Unknown type: {0}")]
    UnknownType(TypeId),

    /// A reserved slot was never defined
    #[error("Type {0} was reserved but never defined")]
    Undefined(TypeId),

    /// A slot was defined twice
    #[error("Type {0} is already defined")]
    AlreadyDefined(TypeId),

    /// A class is its own ancestor
    #[error("Cyclic inheritance through class '{name}'")]
    CyclicInheritance {
        /// Name of a class on the cycle
        name: String,
    },

    /// Super type is not a class
    #[error("Super type of '{name}' is not an object type (found {found})")]
    InvalidSuper {
        /// Name of the class
        name: String,
        /// Kind found in the super slot
        found: TypeKind,
    },

    /// Payload requested from a descriptor of another kind
    #[error("Expected {expected} type, found {found}")]
    WrongKind {
        /// Kind the caller needed
        expected: TypeKind,
        /// Kind of the descriptor
        found: TypeKind,
    },
}

/// Object, virtual and enum layout errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Underlying descriptor error
    #[error(transparent)]
    Type(#[from] TypeError),

    /// Same field name declared twice along the inheritance chain
    #[error("Duplicate field '{field}' in '{class}'")]
    DuplicateField {
        /// Class declaring the second copy
        class: String,
        /// Field name
        field: String,
    },

    /// Name used both as a field and as a method in one class
    #[error("Member '{member}' in '{class}' is both a field and a method")]
    MemberConflict {
        /// Class declaring the conflicting member
        class: String,
        /// Member name
        member: String,
    },

    /// Same method name declared twice in one class
    #[error("Duplicate method '{method}' in '{class}'")]
    DuplicateMethod {
        /// Declaring class
        class: String,
        /// Method name
        method: String,
    },

    /// Override whose signature differs from the inherited method
    #[error("Method '{method}' in '{class}' overrides an incompatible signature")]
    IncompatibleOverride {
        /// Overriding class
        class: String,
        /// Method name
        method: String,
    },

    /// Method type is not a function
    #[error("Method '{method}' in '{class}' does not have a function type")]
    NotAFunction {
        /// Declaring class
        class: String,
        /// Method name
        method: String,
    },
}

/// Native signature parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// Unknown type code
    #[error("Invalid signature code '{code}' at {pos}")]
    InvalidCode {
        /// Offending character
        code: char,
        /// Byte position
        pos: usize,
    },

    /// Signature ended early
    #[error("Unexpected end of signature")]
    UnexpectedEnd,

    /// Characters after the return type
    #[error("Trailing characters in signature at {0}")]
    Trailing(usize),
}
