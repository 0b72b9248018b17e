pub mod model;
pub mod types;
pub mod values;

pub use model::*;
pub use types::*;
pub use values::{NumberValue, NumericClass};
