// src/core/call_graph/entry_point_detector.rs
use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use tree_sitter::Node;

use crate::core::languages::{call_expressions, named_children, node_text};
use crate::core::program::{
    implementation_type, FunctionSymbol, Package, ProgramIndex, SourceFile, SymbolResolver,
    TypeKind,
};
use crate::error::Result;

/// Finds the roots of the analysis: `main` functions and the exported
/// methods of implementations handed to service registration calls.
pub struct EntryPointDetector {
    /// Selector names that count as registration calls
    registration_pattern: Regex,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryPoint {
    pub function: FunctionSymbol,
    pub entry_type: EntryPointType,
    pub reasoning: String,
    /// Registration call that produced this root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<RegistrationSite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPointType {
    /// Program entry point
    Main,
    /// Method of a type passed to `Register<Service>Server`
    ServiceRegistration,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationSite {
    pub file: PathBuf,
    pub line: usize,
    /// Selector name of the registration call
    pub registration: String,
    /// Implementation type after pointer unwrapping
    pub implementation: String,
}

/// A registration site that produced no roots
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Default, Serialize)]
pub struct EntryPoints {
    pub mains: Vec<EntryPoint>,
    pub registrations: Vec<EntryPoint>,
    pub diagnostics: Vec<Diagnostic>,
}

impl EntryPoint {
    /// First line of the root's trace
    pub fn label(&self) -> String {
        match self.entry_type {
            EntryPointType::Main => self.function.name.clone(),
            EntryPointType::ServiceRegistration => self.function.display_name(),
        }
    }
}

impl EntryPointDetector {
    pub fn new(registration_pattern: &str) -> Result<Self> {
        Ok(Self {
            registration_pattern: Regex::new(registration_pattern)?,
        })
    }

    /// Detect every root in the index, in package then source order
    pub fn detect_entry_points(&self, resolver: &SymbolResolver) -> EntryPoints {
        let index = resolver.index();
        let mut found = EntryPoints {
            mains: self.detect_mains(index),
            ..EntryPoints::default()
        };

        for package in index.packages() {
            for file in &package.files {
                for call in call_expressions(file.root()) {
                    self.check_registration(resolver, package, file, call, &mut found);
                }
            }
        }

        found
    }

    fn detect_mains(&self, index: &ProgramIndex) -> Vec<EntryPoint> {
        index
            .packages()
            .flat_map(|package| package.symbols())
            .filter(|symbol| symbol.receiver.is_none() && symbol.name == "main")
            .map(|symbol| EntryPoint {
                function: symbol.clone(),
                entry_type: EntryPointType::Main,
                reasoning: format!("func main in package {}", symbol.package),
                site: None,
            })
            .collect()
    }

    fn check_registration<'a>(
        &self,
        resolver: &SymbolResolver<'a>,
        package: &'a Package,
        file: &'a SourceFile,
        call: Node<'a>,
        found: &mut EntryPoints,
    ) {
        let Some(selector) = call
            .child_by_field_name("function")
            .filter(|f| f.kind() == "selector_expression")
        else {
            return;
        };
        let Some(field) = selector.child_by_field_name("field") else {
            return;
        };
        let registration = node_text(field, &file.source);
        if !self.registration_pattern.is_match(registration) {
            return;
        }

        let arguments = call
            .child_by_field_name("arguments")
            .map(named_children)
            .unwrap_or_default();
        let line = call.start_position().row + 1;
        let mut skip = |message: String| {
            warn!("Skipping registration at {}:{}: {}", file.path.display(), line, message);
            found.diagnostics.push(Diagnostic {
                file: file.path.clone(),
                line,
                message,
            });
        };

        let [_, server] = arguments.as_slice() else {
            debug!(
                "{}:{}: {} called with {} arguments, not a registration",
                file.path.display(),
                line,
                registration,
                arguments.len()
            );
            return;
        };

        let ctx = resolver.enclosing_context(package, file, call);
        let server_type = resolver.infer(*server, &ctx);
        debug!("[ServerArg] {} at {}:{}", server_type, file.path.display(), line);

        let Some(named) = implementation_type(&server_type) else {
            skip(format!(
                "cannot determine a named type for `{}` (got {})",
                ctx.text(*server),
                server_type
            ));
            return;
        };
        let Some(impl_package) = resolver.index().package(&named.package) else {
            skip(format!("implementation type {} is outside the loaded tree", server_type));
            return;
        };
        match impl_package.type_decl(&named.name).map(|decl| &decl.kind) {
            Some(TypeKind::Struct(_)) => {}
            Some(_) => {
                skip(format!("implementation type {} is not a struct", server_type));
                return;
            }
            None => {
                skip(format!("implementation type {} is not declared", server_type));
                return;
            }
        }

        let methods: Vec<&FunctionSymbol> = impl_package
            .methods_of(&named.name)
            .filter(|method| method.exported)
            .collect();
        if methods.is_empty() {
            skip(format!("{} declares no exported methods", server_type));
            return;
        }

        let site = RegistrationSite {
            file: file.path.clone(),
            line,
            registration: registration.to_string(),
            implementation: format!("{}.{}", named.package, named.name),
        };
        for method in methods {
            found.registrations.push(EntryPoint {
                function: method.clone(),
                entry_type: EntryPointType::ServiceRegistration,
                reasoning: format!("exported method of {} registered via {}", named.name, registration),
                site: Some(site.clone()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_REGISTRATION_PATTERN;
    use crate::core::test_support::{load_tree, GO_MOD};

    const SERVER: &str = r#"package server

type ExampleServer struct{}

func (s *ExampleServer) Culc() {}

func (s *ExampleServer) helper() {}

func (s ExampleServer) Print() {}

type Handler interface{ Serve() }
"#;

    fn detect(main_go: &str) -> EntryPoints {
        let (_dir, index) = load_tree(&[
            ("go.mod", GO_MOD),
            ("main.go", main_go),
            ("server/server.go", SERVER),
            ("pb/pb.go", "package pb\n\nfunc RegisterExampleServiceServer(s interface{}, impl interface{}) {}\n"),
        ]);
        let resolver = SymbolResolver::new(&index);
        EntryPointDetector::new(DEFAULT_REGISTRATION_PATTERN)
            .unwrap()
            .detect_entry_points(&resolver)
    }

    #[test]
    fn test_main_and_registered_methods() {
        let found = detect(
            r#"package main

import (
	"example.com/demo/pb"
	"example.com/demo/server"
)

func main() {
	var grpcServer interface{}
	pb.RegisterExampleServiceServer(grpcServer, &server.ExampleServer{})
}
"#,
        );

        assert_eq!(found.mains.len(), 1);
        assert_eq!(found.mains[0].label(), "main");

        let labels: Vec<String> = found.registrations.iter().map(EntryPoint::label).collect();
        assert_eq!(labels, vec!["server.Culc", "server.Print"]);
        assert!(found.diagnostics.is_empty());

        let site = found.registrations[0].site.as_ref().unwrap();
        assert_eq!(site.line, 10);
        assert_eq!(site.registration, "RegisterExampleServiceServer");
        assert_eq!(site.implementation, "example.com/demo/server.ExampleServer");
    }

    #[test]
    fn test_registration_inside_package_level_func_literal() {
        let found = detect(
            r#"package main

import (
	"example.com/demo/pb"
	"example.com/demo/server"
)

var setup = func() {
	impl := &server.ExampleServer{}
	pb.RegisterExampleServiceServer(nil, impl)
}

func main() {
	setup()
}
"#,
        );

        let labels: Vec<String> = found.registrations.iter().map(EntryPoint::label).collect();
        assert_eq!(labels, vec!["server.Culc", "server.Print"]);
        assert!(found.diagnostics.is_empty());
        assert_eq!(found.registrations[0].site.as_ref().unwrap().line, 10);
    }

    #[test]
    fn test_registration_through_local_variable_and_double_pointer() {
        let found = detect(
            r#"package main

import (
	"example.com/demo/pb"
	"example.com/demo/server"
)

func main() {
	impl := &server.ExampleServer{}
	pp := &impl
	pb.RegisterExampleServiceServer(nil, impl)
	pb.RegisterExampleServiceServer(nil, *pp)
}
"#,
        );

        // Each site contributes its own roots
        assert_eq!(found.registrations.len(), 4);
    }

    #[test]
    fn test_unresolvable_argument_is_skipped_with_diagnostic() {
        let found = detect(
            r#"package main

import (
	"example.com/demo/pb"
	"example.com/demo/server"
)

func build() server.Handler { return nil }

func main() {
	pb.RegisterExampleServiceServer(nil, makeServer())
	pb.RegisterExampleServiceServer(nil, build())
	pb.RegisterExampleServiceServer(nil)
}

var makeServer = func() interface{} { return nil }
"#,
        );

        assert!(found.registrations.is_empty());
        assert_eq!(found.diagnostics.len(), 2);
        assert!(found.diagnostics[1].message.contains("not a struct"));
    }

    #[test]
    fn test_custom_pattern_limits_matches() {
        let (_dir, index) = load_tree(&[
            ("go.mod", GO_MOD),
            (
                "main.go",
                "package main\n\ntype Impl struct{}\n\nfunc (Impl) Run() {}\n\nfunc RegisterOtherServer(a, b interface{}) {}\n\nfunc main() {\n\tvar x struct{ RegisterOtherServer func(a, b interface{}) }\n\tx.RegisterOtherServer(nil, Impl{})\n}\n",
            ),
        ]);
        let resolver = SymbolResolver::new(&index);

        let narrow = EntryPointDetector::new("^RegisterExampleServiceServer$").unwrap();
        assert!(narrow.detect_entry_points(&resolver).registrations.is_empty());

        let broad = EntryPointDetector::new(DEFAULT_REGISTRATION_PATTERN).unwrap();
        assert_eq!(broad.detect_entry_points(&resolver).registrations.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        assert!(EntryPointDetector::new("Register(").is_err());
    }
}
