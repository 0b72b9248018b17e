pub mod builder;
pub mod compile;
pub mod constraints;
pub mod custom_class;
pub mod examples;
pub mod formats;
pub mod name;
pub mod polymorphism;
pub mod resolver;
pub mod shape;
pub mod type_infer;

pub use compile::{CompileTarget, Compiler, DEFAULT_DOCUMENT_URI, definition_targets};
