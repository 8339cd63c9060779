pub mod spec;
pub mod template;
pub mod vm;

pub use spec::*;
pub use template::*;
pub use vm::*;
