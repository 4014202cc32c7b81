pub mod code;
pub mod error;
pub mod frame;
pub mod id;
pub mod module;
pub mod object;
pub mod payload;
pub mod record;
pub mod runtime;
pub mod value;

// Re-export commonly used types
pub use code::CodeUnit;
pub use error::{CoreError, Fault, SnapshotError};
pub use frame::{ExitKind, Frame, Instruction};
pub use id::{CodeId, FrameId};
pub use module::Module;
pub use object::{
    getattr_static, Attr, BoundMethod, Class, Function, FunctionBody, GeneratorStep, Instance,
    NativeFunction, Property,
};
pub use payload::Payload;
pub use record::{CallRecord, CallableIdentity, RecordLogger};
pub use runtime::{Args, CallEvent, CallHook, EventKind, Generator, Runtime};
pub use value::Value;
