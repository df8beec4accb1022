use std::fmt;
use std::ops::Range;

use tracing::trace;
use tree_sitter::Node;

use super::index::{FunctionSymbol, Package, ProgramIndex, SourceFile, TypeKind};
use super::scope::FunctionContext;
use super::types::{strip_pointers, GoType, NamedType};
use crate::core::languages::{
    field_nodes, has_token, is_builtin_func, is_predeclared_type, named_children,
};

/// Embedding chains longer than this are treated as unresolvable
const MAX_EMBEDDING_DEPTH: usize = 8;

/// Node kinds that open a new lexical region for `:=` / `var` bindings
const SCOPE_KINDS: &[&str] = &[
    "block",
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
    "expression_case",
    "type_case",
    "default_case",
    "communication_case",
    "func_literal",
];

/// Outcome of resolving one call site
#[derive(Debug, Clone)]
pub enum Resolution<'a> {
    Resolved(&'a FunctionSymbol),
    Unresolved(Unresolved),
}

/// Why a call site has no declaration in the index. None of these are errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// `len`, `append`, `panic`, ...
    Builtin(String),
    /// `int32(x)`, `MyType(x)`
    Conversion(String),
    /// Declared in a package outside the loaded tree
    External(String),
    /// Interface method, function value, or field of function type
    Dynamic,
    /// Callee is neither an identifier nor a selector
    UnknownShape,
}

impl fmt::Display for Unresolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unresolved::Builtin(name) => write!(f, "built-in {}", name),
            Unresolved::Conversion(ty) => write!(f, "conversion to {}", ty),
            Unresolved::External(path) => write!(f, "external package {}", path),
            Unresolved::Dynamic => f.write_str("dynamic call"),
            Unresolved::UnknownShape => f.write_str("unsupported callee expression"),
        }
    }
}

/// Maps call expressions to their declarations using the program index
pub struct SymbolResolver<'a> {
    index: &'a ProgramIndex,
}

impl<'a> SymbolResolver<'a> {
    pub fn new(index: &'a ProgramIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &'a ProgramIndex {
        self.index
    }

    /// Resolution context for a declared function or method, with its
    /// receiver, parameters and locals bound.
    pub fn function_context(&self, symbol: &FunctionSymbol) -> Option<FunctionContext<'a>> {
        let package = self.index.package(&symbol.package)?;
        let file = package.file(symbol.file)?;
        let decl = file.declaration_at(symbol.decl_start)?;
        Some(self.declaration_context(package, file, decl))
    }

    /// Resolution context for an arbitrary node: the context of the top-level
    /// declaration containing it.
    pub fn enclosing_context(
        &self,
        package: &'a Package,
        file: &'a SourceFile,
        node: Node<'a>,
    ) -> FunctionContext<'a> {
        let mut top = node;
        while let Some(parent) = top.parent() {
            if parent.kind() == "source_file" {
                break;
            }
            top = parent;
        }
        self.declaration_context(package, file, top)
    }

    fn declaration_context(
        &self,
        package: &'a Package,
        file: &'a SourceFile,
        decl: Node<'a>,
    ) -> FunctionContext<'a> {
        let mut ctx = FunctionContext::new(package, file, Some(decl));
        if matches!(decl.kind(), "function_declaration" | "method_declaration") {
            self.bind_locals(&mut ctx, decl);
        } else {
            self.bind_initializers(&mut ctx, decl);
        }
        ctx
    }

    /// Find the declaration a call expression invokes
    pub fn resolve_call(&self, call: Node<'a>, ctx: &FunctionContext<'a>) -> Resolution<'a> {
        let resolution = match call.child_by_field_name("function") {
            Some(function) if function.kind() == "identifier" => {
                self.resolve_identifier(function, ctx)
            }
            Some(function) if function.kind() == "selector_expression" => {
                self.resolve_selector(function, ctx)
            }
            _ => Resolution::Unresolved(Unresolved::UnknownShape),
        };

        if let Resolution::Unresolved(reason) = &resolution {
            trace!(
                "Unresolved call at {}:{}: {}",
                ctx.file.path.display(),
                call.start_position().row + 1,
                reason
            );
        }
        resolution
    }

    fn resolve_identifier(&self, ident: Node<'a>, ctx: &FunctionContext<'a>) -> Resolution<'a> {
        let name = ctx.text(ident);

        if ctx.scope.is_local(name, ident.start_byte()) {
            return Resolution::Unresolved(Unresolved::Dynamic);
        }
        if let Some(symbol) = ctx.package.function(name) {
            return Resolution::Resolved(symbol);
        }
        if ctx.package.type_decl(name).is_some() || is_predeclared_type(name) {
            return Resolution::Unresolved(Unresolved::Conversion(name.to_string()));
        }
        if is_builtin_func(name) {
            return Resolution::Unresolved(Unresolved::Builtin(name.to_string()));
        }
        for path in ctx.file.imports.dot_imports() {
            if let Some(symbol) = self.index.package(path).and_then(|p| p.function(name)) {
                return Resolution::Resolved(symbol);
            }
        }
        Resolution::Unresolved(Unresolved::Dynamic)
    }

    fn resolve_selector(&self, selector: Node<'a>, ctx: &FunctionContext<'a>) -> Resolution<'a> {
        let (Some(operand), Some(field)) = (
            selector.child_by_field_name("operand"),
            selector.child_by_field_name("field"),
        ) else {
            return Resolution::Unresolved(Unresolved::UnknownShape);
        };
        let method = ctx.text(field);

        if operand.kind() == "identifier" {
            if let Some(path) = ctx.import_alias(ctx.text(operand), operand.start_byte()) {
                return match self.index.package(path) {
                    None => Resolution::Unresolved(Unresolved::External(path.to_string())),
                    Some(package) => {
                        if let Some(symbol) = package.function(method) {
                            Resolution::Resolved(symbol)
                        } else if package.type_decl(method).is_some() {
                            Resolution::Unresolved(Unresolved::Conversion(method.to_string()))
                        } else {
                            Resolution::Unresolved(Unresolved::Dynamic)
                        }
                    }
                };
            }
        }

        match self.infer(operand, ctx).named_base() {
            Some(named) => self.find_method(named, method, 0),
            None => Resolution::Unresolved(Unresolved::Dynamic),
        }
    }

    /// Method lookup by (receiver type, name), following embedded fields
    fn find_method(&self, named: &NamedType, method: &str, depth: usize) -> Resolution<'a> {
        if depth > MAX_EMBEDDING_DEPTH {
            return Resolution::Unresolved(Unresolved::Dynamic);
        }
        let Some(package) = self.index.package(&named.package) else {
            return Resolution::Unresolved(Unresolved::External(named.package.clone()));
        };
        if let Some(symbol) = package.method(&named.name, method) {
            return Resolution::Resolved(symbol);
        }

        match package.type_decl(&named.name).map(|decl| &decl.kind) {
            Some(TypeKind::Struct(fields)) => {
                for field in fields.iter().filter(|f| f.embedded) {
                    if let Some(inner) = field.ty.named_base() {
                        if let found @ Resolution::Resolved(_) = self.find_method(inner, method, depth + 1) {
                            return found;
                        }
                    }
                }
                Resolution::Unresolved(Unresolved::Dynamic)
            }
            Some(TypeKind::Alias(target)) => match target.named_base() {
                Some(inner) => self.find_method(inner, method, depth + 1),
                None => Resolution::Unresolved(Unresolved::Dynamic),
            },
            _ => Resolution::Unresolved(Unresolved::Dynamic),
        }
    }

    /// Best-effort static type of an expression
    pub fn infer(&self, expr: Node<'a>, ctx: &FunctionContext<'a>) -> GoType {
        match expr.kind() {
            "identifier" => {
                let name = ctx.text(expr);
                if let Some(ty) = ctx.scope.lookup(name, expr.start_byte()) {
                    return ty.clone();
                }
                if let Some(ty) = ctx.package.var_type(name) {
                    return ty.clone();
                }
                if ctx.package.type_decl(name).is_some() {
                    return GoType::named(&ctx.package.path, name);
                }
                GoType::invalid()
            }
            "selector_expression" => {
                let (Some(operand), Some(field)) = (
                    expr.child_by_field_name("operand"),
                    expr.child_by_field_name("field"),
                ) else {
                    return GoType::invalid();
                };
                let field = ctx.text(field);

                if operand.kind() == "identifier" {
                    if let Some(path) = ctx.import_alias(ctx.text(operand), operand.start_byte()) {
                        return match self.index.package(path) {
                            Some(package) => match package.var_type(field) {
                                Some(ty) => ty.clone(),
                                None if package.type_decl(field).is_some() => GoType::named(path, field),
                                None => GoType::invalid(),
                            },
                            None => GoType::Other(format!("{}.{}", path, field)),
                        };
                    }
                }

                let base = self.infer(operand, ctx);
                self.field_type(&base, field, 0).unwrap_or_else(GoType::invalid)
            }
            "unary_expression" => {
                let operator = expr.child_by_field_name("operator").map(|op| ctx.text(op));
                let Some(operand) = expr.child_by_field_name("operand") else {
                    return GoType::invalid();
                };
                match operator {
                    Some("&") => GoType::pointer_to(self.infer(operand, ctx)),
                    Some("*") => match self.infer(operand, ctx) {
                        GoType::Pointer(inner) => *inner,
                        // `(*T).Method` in a method expression
                        named @ GoType::Named(_) if self.names_type(operand, ctx) => {
                            GoType::pointer_to(named)
                        }
                        _ => GoType::invalid(),
                    },
                    _ => GoType::invalid(),
                }
            }
            "parenthesized_expression" => match named_children(expr).into_iter().next() {
                Some(inner) => self.infer(inner, ctx),
                None => GoType::invalid(),
            },
            "composite_literal" | "type_assertion_expression" | "type_conversion_expression" => {
                match expr.child_by_field_name("type") {
                    Some(ty) => ctx.types().resolve(ty),
                    None => GoType::invalid(),
                }
            }
            "call_expression" => self.call_results(expr, ctx).into_iter().next().unwrap_or_else(GoType::invalid),
            _ => GoType::invalid(),
        }
    }

    /// Whether an identifier operand denotes a type rather than a value
    fn names_type(&self, operand: Node<'a>, ctx: &FunctionContext<'a>) -> bool {
        if operand.kind() != "identifier" {
            return false;
        }
        let name = ctx.text(operand);
        !ctx.scope.is_local(name, operand.start_byte())
            && ctx.package.var_type(name).is_none()
            && ctx.package.type_decl(name).is_some()
    }

    /// Result types of a call, in order
    fn call_results(&self, call: Node<'a>, ctx: &FunctionContext<'a>) -> Vec<GoType> {
        let Some(function) = call.child_by_field_name("function") else {
            return Vec::new();
        };

        if function.kind() == "identifier"
            && ctx.text(function) == "new"
            && !ctx.scope.is_local("new", function.start_byte())
        {
            let argument = call
                .child_by_field_name("arguments")
                .and_then(|args| named_children(args).into_iter().next());
            return match argument {
                Some(ty) => vec![GoType::pointer_to(ctx.types().resolve(ty))],
                None => Vec::new(),
            };
        }

        match self.resolve_call(call, ctx) {
            Resolution::Resolved(symbol) => symbol.results.clone(),
            Resolution::Unresolved(Unresolved::Conversion(_)) => vec![ctx.types().resolve(function)],
            Resolution::Unresolved(_) => Vec::new(),
        }
    }

    /// Type of `field` on a value of type `ty`, including promoted fields
    fn field_type(&self, ty: &GoType, field: &str, depth: usize) -> Option<GoType> {
        if depth > MAX_EMBEDDING_DEPTH {
            return None;
        }
        let named = ty.named_base()?;
        let package = self.index.package(&named.package)?;

        match &package.type_decl(&named.name)?.kind {
            TypeKind::Struct(fields) => {
                if let Some(found) = fields.iter().find(|f| f.name == field) {
                    return Some(found.ty.clone());
                }
                fields
                    .iter()
                    .filter(|f| f.embedded)
                    .find_map(|f| self.field_type(&f.ty, field, depth + 1))
            }
            TypeKind::Alias(target) => self.field_type(target, field, depth + 1),
            _ => None,
        }
    }

    /// Bind receiver, parameters, named results and every local declaration
    /// of a function or method, in source order.
    fn bind_locals(&self, ctx: &mut FunctionContext<'a>, decl: Node<'a>) {
        let whole = decl.byte_range();
        for field in ["receiver", "parameters", "result"] {
            if let Some(list) = decl.child_by_field_name(field) {
                if list.kind() == "parameter_list" {
                    self.bind_parameters(ctx, list, whole.clone());
                }
            }
        }

        if let Some(body) = decl.child_by_field_name("body") {
            self.bind_subtree(ctx, body);
        }
    }

    /// Bind the locals of every function literal inside a package-level
    /// declaration. The declaration's own specs are package vars and stay
    /// unbound here.
    fn bind_initializers(&self, ctx: &mut FunctionContext<'a>, decl: Node<'a>) {
        let mut cursor = decl.walk();
        loop {
            let node = cursor.node();
            // bind_subtree covers literals nested inside this one
            let descend = if node.kind() == "func_literal" {
                self.bind_subtree(ctx, node);
                false
            } else {
                true
            };

            if descend && cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    fn bind_subtree(&self, ctx: &mut FunctionContext<'a>, root: Node<'a>) {
        let mut cursor = root.walk();
        loop {
            let node = cursor.node();
            self.bind_declaration(ctx, node);

            if cursor.goto_first_child() {
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    return;
                }
            }
        }
    }

    fn bind_declaration(&self, ctx: &mut FunctionContext<'a>, node: Node<'a>) {
        match node.kind() {
            "short_var_declaration" => {
                let (Some(left), Some(right)) = (
                    node.child_by_field_name("left"),
                    node.child_by_field_name("right"),
                ) else {
                    return;
                };
                let names = named_children(left);
                let values = named_children(right);
                let types = self.assigned_types(&values, names.len(), ctx);
                self.bind_names(ctx, &names, types, node.end_byte(), enclosing_region(node));
            }
            "var_spec" => {
                let names = field_nodes(node, "name");
                let types = match node.child_by_field_name("type") {
                    Some(ty) => vec![ctx.types().resolve(ty); names.len()],
                    None => {
                        let values = node
                            .child_by_field_name("value")
                            .map(named_children)
                            .unwrap_or_default();
                        self.assigned_types(&values, names.len(), ctx)
                    }
                };
                self.bind_names(ctx, &names, types, node.end_byte(), enclosing_region(node));
            }
            "range_clause" | "receive_statement" if has_token(node, ":=") => {
                let names = node
                    .child_by_field_name("left")
                    .map(named_children)
                    .unwrap_or_default();
                self.bind_names(ctx, &names, Vec::new(), node.end_byte(), enclosing_region(node));
            }
            "type_switch_statement" => {
                if let Some(alias) = node.child_by_field_name("alias") {
                    let names = named_children(alias);
                    self.bind_names(ctx, &names, Vec::new(), alias.end_byte(), node.byte_range());
                }
            }
            "func_literal" => {
                for field in ["parameters", "result"] {
                    if let Some(list) = node.child_by_field_name(field) {
                        if list.kind() == "parameter_list" {
                            self.bind_parameters(ctx, list, node.byte_range());
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Types produced by the right-hand side of an `n`-name declaration
    pub(super) fn assigned_types(&self, values: &[Node<'a>], n: usize, ctx: &FunctionContext<'a>) -> Vec<GoType> {
        if values.len() == n {
            values.iter().map(|value| self.infer(*value, ctx)).collect()
        } else if values.len() == 1 && values[0].kind() == "call_expression" {
            self.call_results(values[0], ctx)
        } else {
            Vec::new()
        }
    }

    fn bind_names(
        &self,
        ctx: &mut FunctionContext<'a>,
        names: &[Node<'a>],
        types: Vec<GoType>,
        visible_from: usize,
        region: Range<usize>,
    ) {
        let mut types = types.into_iter();
        for name in names {
            let ty = types.next().unwrap_or_else(GoType::invalid);
            if name.kind() == "identifier" {
                let text = ctx.text(*name);
                ctx.scope.bind(text, ty, visible_from, region.clone());
            }
        }
    }

    fn bind_parameters(&self, ctx: &mut FunctionContext<'a>, list: Node<'a>, region: Range<usize>) {
        let visible_from = region.start;
        for param in named_children(list) {
            let ty = match (param.kind(), param.child_by_field_name("type")) {
                ("parameter_declaration", Some(ty)) => ctx.types().resolve(ty),
                ("variadic_parameter_declaration", Some(ty)) => {
                    GoType::Other(format!("[]{}", ctx.text(ty)))
                }
                _ => continue,
            };
            for name in field_nodes(param, "name") {
                let text = ctx.text(name);
                ctx.scope.bind(text, ty.clone(), visible_from, region.clone());
            }
        }
    }
}

/// Byte range of the innermost block, clause or function enclosing `node`
fn enclosing_region(node: Node) -> Range<usize> {
    let mut current = node.parent();
    while let Some(parent) = current {
        if SCOPE_KINDS.contains(&parent.kind())
            || matches!(parent.kind(), "function_declaration" | "method_declaration")
        {
            return parent.byte_range();
        }
        current = parent.parent();
    }
    node.byte_range()
}

/// Drop pointer indirections and return the declared name, if any
pub fn implementation_type(ty: &GoType) -> Option<&NamedType> {
    match strip_pointers(ty) {
        GoType::Named(named) => Some(named),
        _ => None,
    }
}
