use tree_sitter::Node;

/// Label printed for calls whose callee is neither an identifier nor a selector
pub const UNKNOWN_CALL_LABEL: &str = "(Unknown call)";

/// Receiver placeholder for selector calls on a non-identifier operand
const UNKNOWN_RECEIVER: &str = "unknown";

const PREDECLARED_TYPES: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32",
    "float64", "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8",
    "uint16", "uint32", "uint64", "uintptr",
];

const BUILTIN_FUNCS: &[&str] = &[
    "append", "cap", "clear", "close", "complex", "copy", "delete", "imag", "len", "make",
    "max", "min", "new", "panic", "print", "println", "real", "recover",
];

pub fn node_text<'a>(node: Node, source: &'a str) -> &'a str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    node.named_children(&mut node.walk()).collect()
}

/// All children stored under a (possibly repeated) field name
pub fn field_nodes<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    node.children_by_field_name(field, &mut node.walk()).collect()
}

/// Whether `node` has a direct anonymous child token of the given kind
pub fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}

/// Every call expression below `node`, in pre-order (document order)
pub fn call_expressions<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut calls = Vec::new();
    let mut cursor = node.walk();
    loop {
        if cursor.node().kind() == "call_expression" {
            calls.push(cursor.node());
        }
        if cursor.goto_first_child() {
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                break;
            }
            if !cursor.goto_parent() {
                return calls;
            }
        }
    }
}

/// Collect `spec_kind` nodes below a declaration, looking through the
/// parenthesised `*_list` wrappers the grammar uses for grouped declarations.
pub fn collect_specs<'t>(node: Node<'t>, spec_kind: &str, specs: &mut Vec<Node<'t>>) {
    for child in named_children(node) {
        if child.kind() == spec_kind {
            specs.push(child);
        } else if child.kind().ends_with("_list") {
            collect_specs(child, spec_kind, specs);
        }
    }
}

pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

pub fn is_predeclared_type(name: &str) -> bool {
    PREDECLARED_TYPES.contains(&name)
}

pub fn is_builtin_func(name: &str) -> bool {
    BUILTIN_FUNCS.contains(&name)
}

pub fn strip_string_quotes(text: &str) -> String {
    text.trim_matches(|c: char| c == '"' || c == '`').to_string()
}

/// Package name Go would bind for an import without an explicit alias, when
/// the imported package is not available to ask.
///
/// `github.com/labstack/echo/v4` → `echo`, `gopkg.in/yaml.v3` → `yaml`,
/// `github.com/mattn/go-isatty` → `isatty`.
pub fn default_import_name(path: &str) -> String {
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    if segments.len() > 1 {
        if let Some(last) = segments.last() {
            let is_major_version = last.len() > 1
                && last.starts_with('v')
                && last[1..].chars().all(|c| c.is_ascii_digit());
            if is_major_version {
                segments.pop();
            }
        }
    }

    let last = segments.last().copied().unwrap_or(path);
    let last = match last.rsplit_once(".v") {
        Some((stem, version)) if !version.is_empty() && version.chars().all(|c| c.is_ascii_digit()) => stem,
        _ => last,
    };
    let last = last.strip_prefix("go-").unwrap_or(last);

    last.replace(|c: char| c == '-' || c == '.', "_")
}

/// Base type name of a method receiver and whether it is a pointer receiver.
///
/// `func (s *Server[T]) Run()` → `("Server", true)`
pub fn receiver_base(receiver_list: Node, source: &str) -> Option<(String, bool)> {
    let param = named_children(receiver_list)
        .into_iter()
        .find(|n| n.kind() == "parameter_declaration")?;
    let mut ty = param.child_by_field_name("type")?;
    let mut pointer = false;

    loop {
        match ty.kind() {
            "pointer_type" => {
                pointer = true;
                ty = named_children(ty).into_iter().next()?;
            }
            "generic_type" => {
                ty = ty.child_by_field_name("type")?;
            }
            "parenthesized_type" => {
                ty = named_children(ty).into_iter().next()?;
            }
            "type_identifier" => return Some((node_text(ty, source).to_string(), pointer)),
            _ => return None,
        }
    }
}

/// Textual label for a call site: `recv.Sel` for selector calls, the bare name
/// for identifier calls, and a placeholder for every other callee shape.
pub fn call_label(call: Node, source: &str) -> String {
    let Some(function) = call.child_by_field_name("function") else {
        return UNKNOWN_CALL_LABEL.to_string();
    };

    match function.kind() {
        "identifier" => node_text(function, source).to_string(),
        "selector_expression" => {
            let field = function
                .child_by_field_name("field")
                .map(|f| node_text(f, source))
                .unwrap_or_default();
            let receiver = function
                .child_by_field_name("operand")
                .and_then(|operand| receiver_text(operand, source))
                .unwrap_or_else(|| UNKNOWN_RECEIVER.to_string());
            format!("{}.{}", receiver, field)
        }
        _ => UNKNOWN_CALL_LABEL.to_string(),
    }
}

/// Identifier or dotted identifier chain; anything else has no receiver text.
fn receiver_text(operand: Node, source: &str) -> Option<String> {
    match operand.kind() {
        "identifier" => Some(node_text(operand, source).to_string()),
        "selector_expression" => {
            let inner = receiver_text(operand.child_by_field_name("operand")?, source)?;
            let field = node_text(operand.child_by_field_name("field")?, source);
            Some(format!("{}.{}", inner, field))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::GoParser;

    fn labels(source: &str) -> Vec<String> {
        let mut parser = GoParser::new().unwrap();
        let parsed = parser.parse_source("labels.go".into(), source.to_string()).unwrap();
        call_expressions(parsed.tree.root_node())
            .into_iter()
            .map(|call| call_label(call, &parsed.source))
            .collect()
    }

    #[test]
    fn test_call_labels_follow_callee_shape() {
        let found = labels(
            r#"package demo

func run() {
	fmt.Println(compute())
	s.Svc.Multiply(1, 2)
	build()()
	items[0].Close()
}
"#,
        );

        assert_eq!(
            found,
            vec![
                "fmt.Println",
                "compute",
                "s.Svc.Multiply",
                "(Unknown call)",
                "build",
                "unknown.Close",
            ]
        );
    }

    #[test]
    fn test_default_import_name() {
        assert_eq!(default_import_name("fmt"), "fmt");
        assert_eq!(default_import_name("net/http"), "http");
        assert_eq!(default_import_name("github.com/labstack/echo/v4"), "echo");
        assert_eq!(default_import_name("gopkg.in/yaml.v3"), "yaml");
        assert_eq!(default_import_name("github.com/mattn/go-isatty"), "isatty");
    }

    #[test]
    fn test_exported_names() {
        assert!(is_exported("Culc"));
        assert!(!is_exported("culc"));
        assert!(!is_exported("_"));
    }
}
