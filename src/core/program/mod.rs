//! Whole-program model of a Go module: loading, symbol tables and the
//! lightweight type inference that call resolution relies on.

mod index;
mod loader;
mod resolver;
mod scope;
mod types;

pub use index::{FunctionSymbol, Package, ProgramIndex, SourceFile, TypeKind};
pub use loader::PackageLoader;
pub use resolver::{implementation_type, Resolution, SymbolResolver};
