//! The elaborated program representation shared by the semantic builder,
//! the bytecode codec, the textual serializer, and the evaluator.

pub mod block;
pub mod composite;
pub mod error;
pub mod function;
pub mod ids;
pub mod operation;
pub mod program;
pub mod registry;
pub mod response;
pub mod scope;
pub mod signature;
pub mod strings;
pub mod types;

pub use block::Block;
pub use composite::{CompositeKind, CompositeType, MemberInfo};
pub use error::{IrError, IrErrorKind};
pub use function::{Function, FunctionArena, FunctionKind, NativeCall};
pub use ids::{CompositeId, FunctionId, ScopeId, StringId};
pub use operation::{
    ArithmeticKind, ComparisonKind, Operation, Payload, PayloadValue, PushSource,
};
pub use program::{DebugTable, ExtensionBlock, Program, TypeContext};
pub use registry::TypeRegistry;
pub use response::{ResponseMap, ResponseMapEntry};
pub use scope::{Scope, ScopeArena, Variable};
pub use signature::{FunctionSignature, PARAM_FLAG_REFERENCE};
pub use strings::StringPool;
pub use types::ValueType;
