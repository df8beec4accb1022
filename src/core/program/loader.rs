use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};

use ignore::overrides::OverrideBuilder;
use ignore::WalkBuilder;
use tracing::{debug, info, warn};
use tree_sitter::Node;

use super::index::{
    FieldDecl, FunctionSymbol, ImportTable, Package, ProgramIndex, Receiver, SourceFile, TypeDecl,
    TypeKind,
};
use super::resolver::SymbolResolver;
use super::scope::FunctionContext;
use super::types::{GoType, TypeContext};
use crate::config::LoaderConfig;
use crate::core::cancellation::CancellationFlag;
use crate::core::languages::{
    collect_specs, default_import_name, field_nodes, has_token, is_exported, named_children,
    node_text, receiver_base,
};
use crate::core::parser::{GoParser, ImportAlias, ParsedFile};
use crate::error::{CallseqError, Result};

/// Directory names `go list ./...` never descends into
const SKIPPED_DIRS: &[&str] = &["vendor", "testdata"];

/// Discovers, parses and type-checks every package under a module root
pub struct PackageLoader {
    config: LoaderConfig,
    parser: GoParser,
    cancel: CancellationFlag,
}

impl PackageLoader {
    pub fn new(config: LoaderConfig, cancel: CancellationFlag) -> Result<Self> {
        Ok(Self {
            config,
            parser: GoParser::new()?,
            cancel,
        })
    }

    /// Load the whole tree rooted at `root`. Any syntax or type error aborts
    /// the load.
    pub fn load(&mut self, root: &Path) -> Result<ProgramIndex> {
        let module_path = read_module_path(root)?;
        debug!("Module path: {}", module_path);

        let paths = self.discover(root)?;
        debug!("Discovered {} Go files under {}", paths.len(), root.display());

        let mut by_dir: BTreeMap<PathBuf, Vec<ParsedFile>> = BTreeMap::new();
        for path in paths {
            self.cancel.check()?;
            let parsed = self.parser.parse_file(&path, self.config.max_file_size)?;
            let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
            by_dir.entry(dir).or_default().push(parsed);
        }

        if by_dir.is_empty() {
            return Err(CallseqError::NoPackages(root.to_path_buf()));
        }

        let mut grouped = Vec::with_capacity(by_dir.len());
        for (dir, files) in by_dir {
            let import_path = package_path(&module_path, root, &dir);
            let name = package_name(&import_path, &files)?;
            grouped.push((import_path, name, dir, files));
        }

        let names: HashMap<String, String> = grouped
            .iter()
            .map(|(path, name, _, _)| (path.clone(), name.clone()))
            .collect();

        let mut packages = BTreeMap::new();
        for (import_path, name, dir, files) in grouped {
            let files = files
                .into_iter()
                .map(|parsed| link_imports(parsed, &module_path, &names))
                .collect::<Result<Vec<_>>>()?;

            debug!("Package {} ({}) in {}", import_path, name, dir.display());
            let mut package = Package::new(import_path.clone(), name, files);
            declare_types(&mut package)?;
            declare_functions(&mut package)?;
            declare_vars(&mut package);
            packages.insert(import_path, package);
        }

        let mut index = ProgramIndex::new(root.to_path_buf(), module_path, packages);
        infer_package_vars(&mut index);

        info!(
            "Loaded module {}: {} packages ({} files, {} functions) from {}",
            index.module_path(),
            index.packages().count(),
            index.file_count(),
            index.function_count(),
            index.root().display()
        );
        Ok(index)
    }

    /// Non-test `.go` files in `go list ./...` order
    fn discover(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let mut overrides = OverrideBuilder::new(root);
        for pattern in &self.config.ignore_patterns {
            overrides
                .add(&format!("!{}", pattern))
                .map_err(|e| CallseqError::Config(format!("Invalid ignore pattern '{}': {}", pattern, e)))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| CallseqError::Config(e.to_string()))?;

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .parents(false)
            .ignore(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .overrides(overrides)
            .sort_by_file_path(|a, b| a.cmp(b))
            .filter_entry(|entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if !is_dir || entry.depth() == 0 {
                    return true;
                }
                let name = entry.file_name().to_string_lossy();
                let nested_module = entry.path().join("go.mod").is_file();
                if nested_module {
                    debug!("Skipping nested module {}", entry.path().display());
                }
                !(SKIPPED_DIRS.contains(&&*name) || name.starts_with('_') || nested_module)
            })
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| CallseqError::FileSystem(e.to_string()))?;
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            let name = entry.file_name().to_string_lossy();
            // the go tool ignores `_*.go`; hidden files are filtered by the walker
            if is_file && name.ends_with(".go") && !name.ends_with("_test.go") && !name.starts_with('_') {
                files.push(entry.into_path());
            }
        }

        Ok(files)
    }
}

/// Module path from `go.mod`, or the root directory's name without one
fn read_module_path(root: &Path) -> Result<String> {
    let go_mod = root.join("go.mod");
    if !go_mod.is_file() {
        let fallback = root
            .canonicalize()
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "main".to_string());
        warn!("No go.mod in {}; using '{}' as the module path", root.display(), fallback);
        return Ok(fallback);
    }

    let content = std::fs::read_to_string(&go_mod)
        .map_err(|e| CallseqError::FileSystem(format!("{}: {}", go_mod.display(), e)))?;

    content
        .lines()
        .map(|line| line.split("//").next().unwrap_or("").trim())
        .find_map(|line| line.strip_prefix("module"))
        .map(|rest| strip_module_quotes(rest.trim()))
        .filter(|path| !path.is_empty())
        .ok_or_else(|| CallseqError::Config(format!("{}: no module directive", go_mod.display())))
}

fn strip_module_quotes(path: &str) -> String {
    path.trim_matches(|c: char| c == '"' || c == '`').to_string()
}

fn package_path(module_path: &str, root: &Path, dir: &Path) -> String {
    let relative: Vec<String> = dir
        .strip_prefix(root)
        .unwrap_or(dir)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if relative.is_empty() {
        module_path.to_string()
    } else {
        format!("{}/{}", module_path, relative.join("/"))
    }
}

/// The single package name shared by every file of a directory
fn package_name(import_path: &str, files: &[ParsedFile]) -> Result<String> {
    let Some(first) = files.first() else {
        return Err(CallseqError::TypeCheck {
            package: import_path.to_string(),
            message: "no source files".to_string(),
        });
    };

    if let Some(other) = files.iter().find(|f| f.package_name != first.package_name) {
        return Err(CallseqError::TypeCheck {
            package: import_path.to_string(),
            message: format!(
                "found packages {} ({}) and {} ({})",
                first.package_name,
                first.path.display(),
                other.package_name,
                other.path.display()
            ),
        });
    }

    Ok(first.package_name.clone())
}

/// Turn a parsed file's import specs into an alias table, rejecting imports
/// of module paths that were not loaded.
fn link_imports(
    parsed: ParsedFile,
    module_path: &str,
    names: &HashMap<String, String>,
) -> Result<SourceFile> {
    let mut imports = ImportTable::default();

    for spec in &parsed.imports {
        let in_module = spec.path == module_path || spec.path.starts_with(&format!("{}/", module_path));
        if in_module && !names.contains_key(&spec.path) {
            return Err(CallseqError::TypeCheck {
                package: spec.path.clone(),
                message: format!(
                    "{}:{}: imported package is not part of the loaded tree",
                    parsed.path.display(),
                    spec.line
                ),
            });
        }

        match &spec.alias {
            ImportAlias::Blank => {}
            ImportAlias::Dot => imports.insert_dot(spec.path.clone()),
            ImportAlias::Named(alias) => imports.insert(alias.clone(), spec.path.clone()),
            ImportAlias::Default => {
                let alias = names
                    .get(&spec.path)
                    .cloned()
                    .unwrap_or_else(|| default_import_name(&spec.path));
                imports.insert(alias, spec.path.clone());
            }
        }
    }

    Ok(SourceFile {
        path: parsed.path,
        source: parsed.source,
        tree: parsed.tree,
        imports,
    })
}

fn redeclared(package: &Package, file: &SourceFile, name: &str, line: usize, previous: usize) -> CallseqError {
    CallseqError::TypeCheck {
        package: package.path.clone(),
        message: format!(
            "{}:{}: {} redeclared in this block (previous declaration at line {})",
            file.path.display(),
            line,
            name,
            previous
        ),
    }
}

fn declare_types(package: &mut Package) -> Result<()> {
    let mut decls = Vec::new();

    for file in &package.files {
        let types = file.type_context(&package.path);
        for decl in named_children(file.root())
            .into_iter()
            .filter(|n| n.kind() == "type_declaration")
        {
            let mut specs = Vec::new();
            collect_specs(decl, "type_spec", &mut specs);
            collect_specs(decl, "type_alias", &mut specs);

            for spec in specs {
                let (Some(name), Some(ty)) = (
                    spec.child_by_field_name("name"),
                    spec.child_by_field_name("type"),
                ) else {
                    continue;
                };
                let kind = if spec.kind() == "type_alias" {
                    TypeKind::Alias(types.resolve(ty))
                } else {
                    type_kind(ty, types)
                };
                let decl = TypeDecl {
                    name: node_text(name, &file.source).to_string(),
                    kind,
                    line: spec.start_position().row + 1,
                };
                decls.push((decl, file.path.clone()));
            }
        }
    }

    for (decl, path) in decls {
        let (name, line) = (decl.name.clone(), decl.line);
        if let Some(previous) = package.add_type(decl) {
            return Err(CallseqError::TypeCheck {
                package: package.path.clone(),
                message: format!(
                    "{}:{}: {} redeclared in this block (previous declaration at line {})",
                    path.display(),
                    line,
                    name,
                    previous
                ),
            });
        }
    }

    Ok(())
}

fn type_kind(ty: Node, types: TypeContext) -> TypeKind {
    match ty.kind() {
        "struct_type" => {
            let mut fields = Vec::new();
            let mut specs = Vec::new();
            collect_specs(ty, "field_declaration", &mut specs);
            for field in specs {
                let Some(field_type) = field.child_by_field_name("type") else {
                    continue;
                };
                let resolved = types.resolve(field_type);
                let names = field_nodes(field, "name");

                if names.is_empty() {
                    let resolved = if has_token(field, "*") {
                        GoType::pointer_to(resolved)
                    } else {
                        resolved
                    };
                    fields.push(FieldDecl {
                        name: embedded_name(field_type, types.source),
                        ty: resolved,
                        embedded: true,
                    });
                } else {
                    for name in names {
                        fields.push(FieldDecl {
                            name: node_text(name, types.source).to_string(),
                            ty: resolved.clone(),
                            embedded: false,
                        });
                    }
                }
            }
            TypeKind::Struct(fields)
        }
        "interface_type" => TypeKind::Interface,
        _ => TypeKind::Other,
    }
}

/// Field name an embedded type is accessible under: `pkg.T` and `T[X]` are `T`
fn embedded_name(ty: Node, source: &str) -> String {
    let name = match ty.kind() {
        "qualified_type" => ty.child_by_field_name("name"),
        "generic_type" => ty.child_by_field_name("type"),
        _ => None,
    };
    match name {
        Some(name) => embedded_name(name, source),
        None => node_text(ty, source).to_string(),
    }
}

fn declare_functions(package: &mut Package) -> Result<()> {
    let mut symbols = Vec::new();

    for (file_index, file) in package.files.iter().enumerate() {
        let types = file.type_context(&package.path);
        for decl in named_children(file.root())
            .into_iter()
            .filter(|n| matches!(n.kind(), "function_declaration" | "method_declaration"))
        {
            let Some(name) = decl.child_by_field_name("name") else {
                continue;
            };
            let name = node_text(name, &file.source).to_string();

            let receiver = match decl.child_by_field_name("receiver") {
                Some(list) => {
                    let Some((type_name, pointer)) = receiver_base(list, &file.source) else {
                        return Err(CallseqError::TypeCheck {
                            package: package.path.clone(),
                            message: format!(
                                "{}:{}: invalid receiver for method {}",
                                file.path.display(),
                                decl.start_position().row + 1,
                                name
                            ),
                        });
                    };
                    Some(Receiver { type_name, pointer })
                }
                None => None,
            };

            symbols.push(FunctionSymbol {
                package: package.path.clone(),
                package_name: package.name.clone(),
                exported: is_exported(&name),
                name,
                receiver,
                file_path: file.path.clone(),
                line: decl.start_position().row + 1,
                file: file_index,
                decl_start: decl.start_byte(),
                results: decl
                    .child_by_field_name("result")
                    .map(|result| result_types(result, types))
                    .unwrap_or_default(),
            });
        }
    }

    for symbol in symbols {
        if let Some(receiver) = &symbol.receiver {
            if package.type_decl(&receiver.type_name).is_none() {
                return Err(CallseqError::TypeCheck {
                    package: package.path.clone(),
                    message: format!(
                        "{}:{}: undefined receiver type {} for method {}",
                        symbol.file_path.display(),
                        symbol.line,
                        receiver.type_name,
                        symbol.name
                    ),
                });
            }
        }

        let label = match &symbol.receiver {
            Some(receiver) => format!("method {}.{}", receiver.type_name, symbol.name),
            None => symbol.name.clone(),
        };
        let line = symbol.line;
        let file = symbol.file;
        if let Some(previous) = package.add_symbol(symbol) {
            let source = &package.files[file];
            return Err(redeclared(package, source, &label, line, previous));
        }
    }

    Ok(())
}

/// Result list of a signature: `T`, `(T, error)`, `(a, b int)`
fn result_types(result: Node, types: TypeContext) -> Vec<GoType> {
    if result.kind() != "parameter_list" {
        return vec![types.resolve(result)];
    }

    let mut out = Vec::new();
    for param in named_children(result) {
        let Some(ty) = param.child_by_field_name("type") else {
            continue;
        };
        let resolved = types.resolve(ty);
        let count = field_nodes(param, "name").len().max(1);
        out.extend(std::iter::repeat(resolved).take(count));
    }
    out
}

/// Record package-level variables; explicitly typed ones get their type now,
/// the rest are inferred once the whole index exists.
fn declare_vars(package: &mut Package) {
    let mut vars = Vec::new();

    for file in &package.files {
        let types = file.type_context(&package.path);
        for spec in package_var_specs(file) {
            let ty = spec
                .child_by_field_name("type")
                .map(|ty| types.resolve(ty))
                .unwrap_or_else(GoType::invalid);
            for name in field_nodes(spec, "name") {
                let name = node_text(name, &file.source);
                if name != "_" {
                    vars.push((name.to_string(), ty.clone()));
                }
            }
        }
    }

    for (name, ty) in vars {
        package.set_var_type(name, ty);
    }
}

fn package_var_specs(file: &SourceFile) -> Vec<Node<'_>> {
    let mut specs = Vec::new();
    for decl in named_children(file.root())
        .into_iter()
        .filter(|n| n.kind() == "var_declaration")
    {
        collect_specs(decl, "var_spec", &mut specs);
    }
    specs
}

/// Infer the types of untyped package-level variables from their
/// initialisers, in file and source order.
fn infer_package_vars(index: &mut ProgramIndex) {
    let mut inferred: Vec<(String, String, GoType)> = Vec::new();

    {
        let resolver = SymbolResolver::new(index);
        for package in index.packages() {
            for file in &package.files {
                let ctx = FunctionContext::new(package, file, None);
                for spec in package_var_specs(file) {
                    if spec.child_by_field_name("type").is_some() {
                        continue;
                    }
                    let names = field_nodes(spec, "name");
                    let values = spec
                        .child_by_field_name("value")
                        .map(named_children)
                        .unwrap_or_default();
                    let types = resolver.assigned_types(&values, names.len(), &ctx);

                    for (name, ty) in names.into_iter().zip(types) {
                        let name = ctx.text(name);
                        if name != "_" {
                            inferred.push((package.path.clone(), name.to_string(), ty));
                        }
                    }
                }
            }
        }
    }

    for (package, name, ty) in inferred {
        if let Some(package) = index.package_mut(&package) {
            package.set_var_type(name, ty);
        }
    }
}
