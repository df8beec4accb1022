use std::fmt;

use serde::Serialize;
use tree_sitter::Node;

use super::index::ImportTable;
use crate::core::languages::{is_predeclared_type, named_children, node_text};

/// A declared type, identified by its declaring package path and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NamedType {
    pub package: String,
    pub name: String,
}

/// Static type of an expression, reduced to the shapes the analysis needs.
///
/// Slices, maps, channels, function types, predeclared types and anything the
/// checker could not work out all collapse into `Other`, carrying their text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GoType {
    Named(NamedType),
    Pointer(Box<GoType>),
    Other(String),
}

impl GoType {
    pub fn named(package: &str, name: &str) -> Self {
        GoType::Named(NamedType {
            package: package.to_string(),
            name: name.to_string(),
        })
    }

    pub fn pointer_to(inner: GoType) -> Self {
        GoType::Pointer(Box::new(inner))
    }

    pub fn invalid() -> Self {
        GoType::Other("invalid type".to_string())
    }

    /// The named type behind any number of pointer indirections
    pub fn named_base(&self) -> Option<&NamedType> {
        match strip_pointers(self) {
            GoType::Named(named) => Some(named),
            _ => None,
        }
    }
}

/// Peel `*T`, `**T`, ... down to `T`
pub fn strip_pointers(ty: &GoType) -> &GoType {
    match ty {
        GoType::Pointer(inner) => strip_pointers(inner),
        other => other,
    }
}

impl fmt::Display for GoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoType::Named(named) => write!(f, "{}.{}", named.package, named.name),
            GoType::Pointer(inner) => write!(f, "*{}", inner),
            GoType::Other(text) => f.write_str(text),
        }
    }
}

/// Turns type syntax into [`GoType`]s for one source file
#[derive(Clone, Copy)]
pub struct TypeContext<'a> {
    /// Path of the package the file belongs to
    pub package: &'a str,
    pub source: &'a str,
    pub imports: &'a ImportTable,
}

impl<'a> TypeContext<'a> {
    /// Resolve a type node, or an expression used in type position
    /// (`new(T)` arguments, conversion callees).
    pub fn resolve(&self, node: Node) -> GoType {
        match node.kind() {
            "type_identifier" | "identifier" => {
                let name = node_text(node, self.source);
                if is_predeclared_type(name) {
                    GoType::Other(name.to_string())
                } else {
                    GoType::named(self.package, name)
                }
            }
            "qualified_type" => {
                let alias = node.child_by_field_name("package");
                let name = node.child_by_field_name("name");
                match (alias, name) {
                    (Some(alias), Some(name)) => {
                        self.qualified(node_text(alias, self.source), node_text(name, self.source))
                    }
                    _ => GoType::Other(node_text(node, self.source).to_string()),
                }
            }
            "selector_expression" => {
                let operand = node.child_by_field_name("operand");
                let field = node.child_by_field_name("field");
                match (operand, field) {
                    (Some(operand), Some(field)) if operand.kind() == "identifier" => {
                        self.qualified(node_text(operand, self.source), node_text(field, self.source))
                    }
                    _ => GoType::Other(node_text(node, self.source).to_string()),
                }
            }
            "pointer_type" => match named_children(node).into_iter().next() {
                Some(inner) => GoType::pointer_to(self.resolve(inner)),
                None => GoType::invalid(),
            },
            "generic_type" => match node.child_by_field_name("type") {
                Some(base) => self.resolve(base),
                None => GoType::invalid(),
            },
            "parenthesized_type" | "parenthesized_expression" => {
                match named_children(node).into_iter().next() {
                    Some(inner) => self.resolve(inner),
                    None => GoType::invalid(),
                }
            }
            _ => GoType::Other(node_text(node, self.source).to_string()),
        }
    }

    fn qualified(&self, alias: &str, name: &str) -> GoType {
        match self.imports.package_for(alias) {
            Some(path) => GoType::named(path, name),
            None => GoType::Other(format!("{}.{}", alias, name)),
        }
    }
}
