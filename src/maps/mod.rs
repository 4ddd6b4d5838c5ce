mod compiler;
mod writer;

pub use compiler::{compile, CompiledMaps, MapKind};
pub use writer::{MapPaths, MapWriter, WriteReport, WrittenMap};
