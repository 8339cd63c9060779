pub mod disk;
pub mod objects;
pub mod vm;

pub use disk::DiskApi;
pub use objects::ObjectsApi;
pub use vm::VmApi;
