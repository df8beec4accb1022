use std::path::{Path, PathBuf};
use tree_sitter::{Language, Node, Parser, Tree};

use crate::error::{CallseqError, Result};
use super::languages::{collect_specs, named_children, node_text, strip_string_quotes};

/// A Go source file parsed into a concrete syntax tree
pub struct ParsedFile {
    /// File path on disk
    pub path: PathBuf,

    /// Raw source content; every node of `tree` indexes into it
    pub source: String,

    pub tree: Tree,

    /// Name from the `package` clause
    pub package_name: String,

    /// Import specs in source order
    pub imports: Vec<ImportSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSpec {
    pub alias: ImportAlias,
    pub path: String,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportAlias {
    /// No alias: the imported package's own name
    Default,
    Named(String),
    /// `import . "path"`
    Dot,
    /// `import _ "path"`
    Blank,
}

/// Go parser using Tree-sitter
pub struct GoParser {
    parser: Parser,
}

impl GoParser {
    pub fn new() -> Result<Self> {
        let mut parser = Parser::new();
        let go_language: Language = tree_sitter_go::LANGUAGE.into();
        parser
            .set_language(&go_language)
            .map_err(|e| CallseqError::Parser(format!("Failed to set Go language: {}", e)))?;

        Ok(Self { parser })
    }

    /// Read and parse a single source file
    pub fn parse_file(&mut self, path: &Path, max_file_size: usize) -> Result<ParsedFile> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| CallseqError::FileSystem(format!("{}: {}", path.display(), e)))?;

        if source.len() > max_file_size {
            return Err(CallseqError::Parser(format!(
                "File {} exceeds maximum size limit ({} bytes)",
                path.display(),
                max_file_size
            )));
        }

        self.parse_source(path.to_path_buf(), source)
    }

    /// Parse in-memory source; any syntax error is fatal
    pub fn parse_source(&mut self, path: PathBuf, source: String) -> Result<ParsedFile> {
        let tree = self
            .parser
            .parse(&source, None)
            .ok_or_else(|| CallseqError::Parser(format!("Failed to parse {}", path.display())))?;

        let root = tree.root_node();
        if root.has_error() {
            return Err(syntax_error(&path, &source, root));
        }

        let package_name = named_children_of_kind(root, "package_clause")
            .first()
            .and_then(|clause| named_children(*clause).into_iter().next())
            .map(|ident| node_text(ident, &source).to_string())
            .ok_or_else(|| CallseqError::Syntax {
                file: path.clone(),
                line: 1,
                column: 1,
                message: "expected 'package' clause".to_string(),
            })?;

        let imports = extract_imports(root, &source);

        Ok(ParsedFile {
            path,
            source,
            tree,
            package_name,
            imports,
        })
    }
}

fn named_children_of_kind<'t>(node: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let matches = node
        .named_children(&mut cursor)
        .filter(|child| child.kind() == kind)
        .collect();
    matches
}

fn extract_imports(root: Node, source: &str) -> Vec<ImportSpec> {
    let mut specs = Vec::new();
    for declaration in named_children_of_kind(root, "import_declaration") {
        collect_specs(declaration, "import_spec", &mut specs);
    }

    specs
        .into_iter()
        .filter_map(|spec| {
            let path = strip_string_quotes(node_text(spec.child_by_field_name("path")?, source));
            let alias = match spec.child_by_field_name("name") {
                None => ImportAlias::Default,
                Some(name) => match name.kind() {
                    "dot" => ImportAlias::Dot,
                    "blank_identifier" => ImportAlias::Blank,
                    _ => ImportAlias::Named(node_text(name, source).to_string()),
                },
            };
            Some(ImportSpec {
                alias,
                path,
                line: spec.start_position().row + 1,
            })
        })
        .collect()
}

/// Build a diagnostic for the first ERROR or MISSING node in the tree
fn syntax_error(path: &Path, source: &str, root: Node) -> CallseqError {
    let mut cursor = root.walk();
    let offending = loop {
        let node = cursor.node();
        if node.is_error() || node.is_missing() {
            break Some(node);
        }
        if node.has_error() && cursor.goto_first_child() {
            continue;
        }
        let mut advanced = false;
        while !advanced {
            if cursor.goto_next_sibling() {
                advanced = true;
            } else if !cursor.goto_parent() {
                break;
            }
        }
        if !advanced {
            break None;
        }
    };

    let node = offending.unwrap_or(root);
    let message = if node.is_missing() {
        format!("missing {}", node.kind())
    } else {
        let text = node_text(node, source);
        let snippet: String = text.chars().take(40).collect();
        format!("unexpected `{}`", snippet.trim())
    };

    CallseqError::Syntax {
        file: path.to_path_buf(),
        line: node.start_position().row + 1,
        column: node.start_position().column + 1,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<ParsedFile> {
        GoParser::new()?.parse_source(PathBuf::from("demo/main.go"), source.to_string())
    }

    #[test]
    fn test_package_and_imports() {
        let parsed = parse(
            r#"package main

import (
	"fmt"
	pb "example.com/demo/proto"
	. "example.com/demo/dsl"
	_ "embed"
)

func main() { fmt.Println("hi") }
"#,
        )
        .unwrap();

        assert_eq!(parsed.package_name, "main");
        assert_eq!(parsed.imports.len(), 4);
        assert_eq!(parsed.imports[0].alias, ImportAlias::Default);
        assert_eq!(parsed.imports[0].path, "fmt");
        assert_eq!(parsed.imports[1].alias, ImportAlias::Named("pb".to_string()));
        assert_eq!(parsed.imports[1].path, "example.com/demo/proto");
        assert_eq!(parsed.imports[2].alias, ImportAlias::Dot);
        assert_eq!(parsed.imports[3].alias, ImportAlias::Blank);
    }

    #[test]
    fn test_syntax_error_names_file_and_position() {
        let err = parse("package main\n\nfunc main() {\n\tfoo(\n}\n").err().unwrap();
        match err {
            CallseqError::Syntax { file, line, .. } => {
                assert_eq!(file, PathBuf::from("demo/main.go"));
                assert!(line >= 3, "error reported on line {}", line);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_package_clause_is_rejected() {
        let err = parse("func main() {}\n").err().unwrap();
        assert!(matches!(err, CallseqError::Syntax { .. }));
    }
}
