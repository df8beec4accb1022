//! Go syntax helpers over tree-sitter nodes.
//!
//! Everything here is purely syntactic: no lookups into the program index.
//! The loader uses these to build symbol tables, the resolver and tracer use
//! them to read call expressions.

mod go;

pub use go::{
    call_expressions, call_label, collect_specs, default_import_name, field_nodes, is_builtin_func, is_exported,
    is_predeclared_type, named_children, node_text, receiver_base, strip_string_quotes,
    has_token,
};
