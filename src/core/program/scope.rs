use std::ops::Range;

use tree_sitter::Node;

use super::index::{Package, SourceFile};
use super::types::{GoType, TypeContext};
use crate::core::languages::node_text;

/// Lexically scoped local bindings of one function declaration
#[derive(Debug, Default)]
pub struct LocalScope {
    bindings: Vec<Binding>,
}

#[derive(Debug)]
struct Binding {
    name: String,
    ty: GoType,
    /// First byte at which the name refers to this binding
    visible_from: usize,
    /// Byte range of the enclosing block, clause or function
    region: Range<usize>,
}

impl LocalScope {
    pub fn bind(&mut self, name: &str, ty: GoType, visible_from: usize, region: Range<usize>) {
        if name == "_" {
            return;
        }
        self.bindings.push(Binding {
            name: name.to_string(),
            ty,
            visible_from,
            region,
        });
    }

    /// Innermost binding of `name` visible at byte offset `at`
    pub fn lookup(&self, name: &str, at: usize) -> Option<&GoType> {
        self.bindings
            .iter()
            .filter(|b| b.name == name && b.visible_from <= at && b.region.contains(&at))
            .max_by_key(|b| b.region.start)
            .map(|b| &b.ty)
    }

    pub fn is_local(&self, name: &str, at: usize) -> bool {
        self.lookup(name, at).is_some()
    }

}

/// Everything needed to resolve names inside one declaration: its package,
/// its file (for imports), and its local scope.
pub struct FunctionContext<'a> {
    pub package: &'a Package,
    pub file: &'a SourceFile,
    /// The enclosing top-level declaration, absent for file-level contexts
    pub decl: Option<Node<'a>>,
    pub scope: LocalScope,
}

impl<'a> FunctionContext<'a> {
    pub fn new(package: &'a Package, file: &'a SourceFile, decl: Option<Node<'a>>) -> Self {
        Self {
            package,
            file,
            decl,
            scope: LocalScope::default(),
        }
    }

    pub fn text(&self, node: Node) -> &'a str {
        node_text(node, &self.file.source)
    }

    pub fn types(&self) -> TypeContext<'a> {
        self.file.type_context(&self.package.path)
    }

    pub fn body(&self) -> Option<Node<'a>> {
        self.decl?.child_by_field_name("body")
    }

    /// Import path bound to `name` at `at`, unless a local or package-level
    /// declaration shadows it.
    pub fn import_alias(&self, name: &str, at: usize) -> Option<&'a str> {
        if self.scope.is_local(name, at) {
            return None;
        }
        if self.package.var_type(name).is_some()
            || self.package.function(name).is_some()
            || self.package.type_decl(name).is_some()
        {
            return None;
        }
        self.file.imports.package_for(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(name: &str) -> GoType {
        GoType::Other(name.to_string())
    }

    #[test]
    fn test_binding_not_visible_before_declaration() {
        let mut scope = LocalScope::default();
        scope.bind("x", ty("int"), 50, 10..200);

        assert!(scope.lookup("x", 40).is_none());
        assert_eq!(scope.lookup("x", 60), Some(&ty("int")));
        assert!(scope.lookup("x", 250).is_none());
    }

    #[test]
    fn test_inner_block_shadows_outer_binding() {
        let mut scope = LocalScope::default();
        scope.bind("x", ty("outer"), 20, 10..300);
        scope.bind("x", ty("inner"), 120, 100..150);

        assert_eq!(scope.lookup("x", 130), Some(&ty("inner")));
        assert_eq!(scope.lookup("x", 160), Some(&ty("outer")));
    }

    #[test]
    fn test_redeclaration_in_same_block_takes_latest() {
        let mut scope = LocalScope::default();
        scope.bind("err", ty("first"), 20, 0..300);
        scope.bind("err", ty("second"), 80, 0..300);

        assert_eq!(scope.lookup("err", 50), Some(&ty("first")));
        assert_eq!(scope.lookup("err", 90), Some(&ty("second")));
    }

    #[test]
    fn test_blank_identifier_is_never_bound() {
        let mut scope = LocalScope::default();
        scope.bind("_", ty("int"), 0, 0..100);
        assert!(scope.bindings.is_empty());
    }
}
