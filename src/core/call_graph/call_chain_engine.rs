// src/core/call_graph/call_chain_engine.rs
use serde::Serialize;
use tracing::{debug, info};

use super::{CallChain, CallChainTracer, Diagnostic, EntryPointDetector, EntryPoints};
use crate::config::AnalysisConfig;
use crate::core::cancellation::CancellationFlag;
use crate::core::program::{ProgramIndex, SymbolResolver};
use crate::error::Result;

/// Main orchestrator for call-sequence analysis over a loaded index
pub struct CallChainEngine {
    entry_point_detector: EntryPointDetector,
    max_depth: Option<usize>,
    cancel: CancellationFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallChainAnalysisResult {
    /// One chain per `main` root
    pub main_chains: Vec<CallChain>,
    /// One chain per registered method, per registration site
    pub registration_chains: Vec<CallChain>,
    /// Registration sites that produced no roots
    pub diagnostics: Vec<Diagnostic>,
    pub stats: AnalysisStatistics,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisStatistics {
    pub packages: usize,
    pub files_analyzed: usize,
    pub total_functions: usize,
    pub main_roots: usize,
    pub registration_roots: usize,
    pub call_sites: usize,
    pub resolved_call_sites: usize,
    pub expanded_call_sites: usize,
    pub skipped_registrations: usize,
    pub analysis_time_ms: u128,
}

impl CallChainEngine {
    pub fn new(config: &AnalysisConfig, cancel: CancellationFlag) -> Result<Self> {
        Ok(Self {
            entry_point_detector: EntryPointDetector::new(&config.registration_pattern)?,
            max_depth: config.max_depth,
            cancel,
        })
    }

    /// Detect roots without walking them
    pub fn detect(&self, index: &ProgramIndex) -> EntryPoints {
        let resolver = SymbolResolver::new(index);
        self.entry_point_detector.detect_entry_points(&resolver)
    }

    /// Detect every root and trace each one with its own VisitedSet
    pub fn analyze(&self, index: &ProgramIndex) -> Result<CallChainAnalysisResult> {
        let start_time = std::time::Instant::now();
        let resolver = SymbolResolver::new(index);

        info!("🚪 Detecting entry points...");
        let roots = self.entry_point_detector.detect_entry_points(&resolver);
        info!(
            "Found {} main roots and {} registration roots ({} sites skipped)",
            roots.mains.len(),
            roots.registrations.len(),
            roots.diagnostics.len()
        );
        for root in roots.mains.iter().chain(&roots.registrations) {
            debug!("Entry point: {} ({})", root.label(), root.reasoning);
        }

        let tracer = CallChainTracer::new(&resolver, self.max_depth, self.cancel.clone());
        match self.max_depth {
            Some(depth) => info!("🔗 Tracing call chains (max depth: {})...", depth),
            None => info!("🔗 Tracing call chains..."),
        }
        let main_chains = tracer.trace_all_chains(&roots.mains)?;
        let registration_chains = tracer.trace_all_chains(&roots.registrations)?;

        let sites = || main_chains.iter().chain(&registration_chains).flat_map(|chain| chain.call_sites());
        let stats = AnalysisStatistics {
            packages: index.packages().count(),
            files_analyzed: index.file_count(),
            total_functions: index.function_count(),
            main_roots: roots.mains.len(),
            registration_roots: roots.registrations.len(),
            call_sites: sites().count(),
            resolved_call_sites: sites().filter(|s| s.callee.is_some()).count(),
            expanded_call_sites: sites().filter(|s| s.expanded).count(),
            skipped_registrations: roots.diagnostics.len(),
            analysis_time_ms: start_time.elapsed().as_millis(),
        };

        info!(
            "✅ Traced {} chains: {} call sites, {} resolved, {} expanded in {}ms",
            main_chains.len() + registration_chains.len(),
            stats.call_sites,
            stats.resolved_call_sites,
            stats.expanded_call_sites,
            stats.analysis_time_ms
        );

        Ok(CallChainAnalysisResult {
            main_chains,
            registration_chains,
            diagnostics: roots.diagnostics,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_graph::TraceReporter;
    use crate::core::test_support::{load_tree, GO_MOD};

    /// The sample service tree: a main that calls into a helper package and
    /// registers a server whose methods fan out to two embedded services.
    fn sample_tree() -> Vec<(&'static str, &'static str)> {
        vec![
            ("go.mod", GO_MOD),
            (
                "main.go",
                r#"package main

import (
	"fmt"
	"net"

	"example.com/demo/a"
	"example.com/demo/pb"
	"example.com/demo/server"
)

func main() {
	lis, _ := net.Listen("tcp", ":50051")
	a.Foo()
	s := pb.NewServer()
	pb.RegisterExampleServiceServer(s, &server.ExampleServer{})
	fmt.Println(lis)
}
"#,
            ),
            (
                "a/a.go",
                r#"package a

func Foo() {
	Bar()
}

func Bar() {
	Foo()
}
"#,
            ),
            (
                "pb/pb.go",
                r#"package pb

type Server struct{}

func NewServer() *Server { return &Server{} }

func RegisterExampleServiceServer(s *Server, impl interface{}) {}
"#,
            ),
            (
                "server/server.go",
                r#"package server

import "example.com/demo/service"

type ExampleServer struct {
	CulcService  *service.CulcService
	PrintService service.PrintService
}

func (s *ExampleServer) Culc(a, b int32) int32 {
	result := s.CulcService.Multiply(a, b)
	s.PrintService.Print(result)
	return result
}

func (s *ExampleServer) Echo(msg string) string {
	return msg
}
"#,
            ),
            (
                "service/service.go",
                r#"package service

import "fmt"

type CulcService struct{}

func (s *CulcService) Multiply(a, b int32) int32 {
	total := int32(0)
	for i := int32(0); i < b; i++ {
		total = s.Add(total, a)
	}
	return total
}

func (s *CulcService) Add(a, b int32) int32 { return a + b }

type PrintService struct{}

func (p PrintService) Print(v int32) { fmt.Println(v) }
"#,
            ),
        ]
    }

    fn analyze(files: &[(&str, &str)], config: AnalysisConfig) -> CallChainAnalysisResult {
        let (_dir, index) = load_tree(files);
        CallChainEngine::new(&config, CancellationFlag::new())
            .unwrap()
            .analyze(&index)
            .unwrap()
    }

    #[test]
    fn test_sample_tree_report() {
        let result = analyze(&sample_tree(), AnalysisConfig::default());
        let text = TraceReporter::new(true).render_text(&result);

        let expected = "\
=== Analyzing main function calls ===
main
  net.Listen
  a.Foo
    Bar
      Foo
  pb.NewServer
  pb.RegisterExampleServiceServer
  fmt.Println

=== Analyzing gRPC service registrations ===
server.Culc
  s.CulcService.Multiply
    int32
    int32
    s.Add
  s.PrintService.Print
    fmt.Println
server.Echo
";
        assert_eq!(text, expected);
        assert!(result.diagnostics.is_empty());
        assert_eq!(result.stats.main_roots, 1);
        assert_eq!(result.stats.registration_roots, 2);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let first = analyze(&sample_tree(), AnalysisConfig::default());
        let second = analyze(&sample_tree(), AnalysisConfig::default());

        let reporter = TraceReporter::new(true);
        assert_eq!(reporter.render_text(&first), reporter.render_text(&second));
    }

    #[test]
    fn test_depths_follow_nesting() {
        let result = analyze(&sample_tree(), AnalysisConfig::default());

        for chain in result.main_chains.iter().chain(&result.registration_chains) {
            assert_eq!(chain.steps[0].depth, 0);
            for pair in chain.steps.windows(2) {
                // A step is at most one level deeper than the one before it,
                // and only when the one before it was expanded.
                if pair[1].depth > pair[0].depth {
                    assert_eq!(pair[1].depth, pair[0].depth + 1);
                    assert!(pair[0].expanded);
                }
            }
        }
    }

    #[test]
    fn test_external_calls_are_leaves() {
        let result = analyze(&sample_tree(), AnalysisConfig::default());
        let listen = result.main_chains[0]
            .call_sites()
            .find(|s| s.label == "net.Listen")
            .unwrap();

        assert!(listen.callee.is_none());
        assert!(!listen.expanded);
    }

    #[test]
    fn test_max_depth_limits_recorded_sites() {
        let config = AnalysisConfig {
            max_depth: Some(1),
            ..AnalysisConfig::default()
        };
        let result = analyze(&sample_tree(), config);

        let all = result.main_chains.iter().chain(&result.registration_chains);
        assert!(all.flat_map(|c| &c.steps).all(|s| s.depth <= 1));
        assert_eq!(result.registration_chains[0].steps.len(), 3);
    }
}
