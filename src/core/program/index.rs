use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tree_sitter::{Node, Tree};

use super::types::{GoType, TypeContext};

/// Read-only whole-program model: every loaded package keyed by import path.
///
/// Built once by [`super::PackageLoader`] and never mutated afterwards; all
/// resolution borrows it.
pub struct ProgramIndex {
    root: PathBuf,
    module_path: String,
    packages: BTreeMap<String, Package>,
}

impl ProgramIndex {
    pub(super) fn new(root: PathBuf, module_path: String, packages: BTreeMap<String, Package>) -> Self {
        Self {
            root,
            module_path,
            packages,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn package(&self, path: &str) -> Option<&Package> {
        self.packages.get(path)
    }

    pub(super) fn package_mut(&mut self, path: &str) -> Option<&mut Package> {
        self.packages.get_mut(path)
    }

    /// Packages in import-path order
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn file_count(&self) -> usize {
        self.packages.values().map(|p| p.files.len()).sum()
    }

    pub fn function_count(&self) -> usize {
        self.packages.values().map(|p| p.symbols.len()).sum()
    }
}

/// One Go package: a directory of source files sharing a package clause
pub struct Package {
    /// Import path
    pub path: String,

    /// Declared package name
    pub name: String,

    /// Source files sorted by path
    pub files: Vec<SourceFile>,

    /// Functions and methods in declaration order
    symbols: Vec<FunctionSymbol>,
    functions: HashMap<String, usize>,
    methods: HashMap<(String, String), usize>,
    types: HashMap<String, TypeDecl>,
    vars: HashMap<String, GoType>,
}

impl Package {
    pub(super) fn new(path: String, name: String, files: Vec<SourceFile>) -> Self {
        Self {
            path,
            name,
            files,
            symbols: Vec::new(),
            functions: HashMap::new(),
            methods: HashMap::new(),
            types: HashMap::new(),
            vars: HashMap::new(),
        }
    }

    pub fn symbols(&self) -> &[FunctionSymbol] {
        &self.symbols
    }

    /// Package-level function (no receiver)
    pub fn function(&self, name: &str) -> Option<&FunctionSymbol> {
        self.functions.get(name).map(|&i| &self.symbols[i])
    }

    /// Method declared on `receiver` (the base type name, pointer or not)
    pub fn method(&self, receiver: &str, name: &str) -> Option<&FunctionSymbol> {
        self.methods
            .get(&(receiver.to_string(), name.to_string()))
            .map(|&i| &self.symbols[i])
    }

    /// Methods declared on `receiver`, in declaration order
    pub fn methods_of<'p>(&'p self, receiver: &'p str) -> impl Iterator<Item = &'p FunctionSymbol> + 'p {
        self.symbols.iter().filter(move |symbol| {
            symbol
                .receiver
                .as_ref()
                .is_some_and(|r| r.type_name == receiver)
        })
    }

    pub fn type_decl(&self, name: &str) -> Option<&TypeDecl> {
        self.types.get(name)
    }

    pub fn var_type(&self, name: &str) -> Option<&GoType> {
        self.vars.get(name)
    }

    pub fn file(&self, index: usize) -> Option<&SourceFile> {
        self.files.get(index)
    }

    /// Register a function or method; returns the previous symbol's line when
    /// the name (or receiver/name pair) is already taken.
    pub(super) fn add_symbol(&mut self, symbol: FunctionSymbol) -> Option<usize> {
        let slot = self.symbols.len();
        let previous = match &symbol.receiver {
            Some(receiver) => {
                let key = (receiver.type_name.clone(), symbol.name.clone());
                self.methods.get(&key).copied().or_else(|| {
                    self.methods.insert(key, slot);
                    None
                })
            }
            None if symbol.name == "init" || symbol.name == "_" => None,
            None if self.types.contains_key(&symbol.name) => {
                return self.types.get(&symbol.name).map(|t| t.line);
            }
            None => self.functions.get(&symbol.name).copied().or_else(|| {
                self.functions.insert(symbol.name.clone(), slot);
                None
            }),
        };

        match previous {
            Some(existing) => Some(self.symbols[existing].line),
            None => {
                self.symbols.push(symbol);
                None
            }
        }
    }

    /// Register a type; returns the previous declaration's line when the name
    /// is already taken.
    pub(super) fn add_type(&mut self, decl: TypeDecl) -> Option<usize> {
        if let Some(existing) = self.types.get(&decl.name) {
            return Some(existing.line);
        }
        if let Some(function) = self.function(&decl.name) {
            return Some(function.line);
        }
        self.types.insert(decl.name.clone(), decl);
        None
    }

    pub(super) fn set_var_type(&mut self, name: String, ty: GoType) {
        self.vars.insert(name, ty);
    }
}

/// A parsed file kept alive for the whole run
pub struct SourceFile {
    pub path: PathBuf,
    pub source: String,
    pub tree: Tree,
    pub imports: ImportTable,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Top-level declaration starting at `start_byte`
    pub fn declaration_at(&self, start_byte: usize) -> Option<Node<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        let found = root
            .named_children(&mut cursor)
            .find(|child| child.start_byte() == start_byte);
        found
    }

    pub fn type_context<'a>(&'a self, package: &'a str) -> TypeContext<'a> {
        TypeContext {
            package,
            source: &self.source,
            imports: &self.imports,
        }
    }
}

/// Import aliases visible in one file
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    aliases: HashMap<String, String>,
    dot_imports: Vec<String>,
}

impl ImportTable {
    pub fn package_for(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    /// Packages imported with `import . "path"`
    pub fn dot_imports(&self) -> &[String] {
        &self.dot_imports
    }

    pub(super) fn insert(&mut self, alias: String, path: String) {
        self.aliases.insert(alias, path);
    }

    pub(super) fn insert_dot(&mut self, path: String) {
        self.dot_imports.push(path);
    }
}

/// A function or method declaration
#[derive(Debug, Clone, Serialize)]
pub struct FunctionSymbol {
    /// Import path of the declaring package
    pub package: String,
    pub package_name: String,
    pub name: String,
    pub receiver: Option<Receiver>,
    pub file_path: PathBuf,
    pub line: usize,
    pub exported: bool,

    /// Index into the owning package's `files`
    #[serde(skip)]
    pub file: usize,

    /// Start byte of the declaration node
    #[serde(skip)]
    pub decl_start: usize,

    #[serde(skip)]
    pub results: Vec<GoType>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Receiver {
    pub type_name: String,
    pub pointer: bool,
}

impl FunctionSymbol {
    /// VisitedSet key: package path, receiver type for methods, then name
    pub fn qualified_name(&self) -> String {
        match &self.receiver {
            Some(receiver) => format!("{}.{}.{}", self.package, receiver.type_name, self.name),
            None => format!("{}.{}", self.package, self.name),
        }
    }

    /// `pkgname.Name`, as printed for registration roots
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.package_name, self.name)
    }
}

#[derive(Debug, Clone)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub line: usize,
}

#[derive(Debug, Clone)]
pub enum TypeKind {
    Struct(Vec<FieldDecl>),
    Interface,
    /// `type A = B`
    Alias(GoType),
    /// Any other defined type (`type Handler func()`, `type IDs []int`, ...)
    Other,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    /// Field name; for embedded fields, the embedded type's name
    pub name: String,
    pub ty: GoType,
    pub embedded: bool,
}
