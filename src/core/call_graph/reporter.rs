// src/core/call_graph/reporter.rs
use std::fmt::Write as _;

use super::{CallChain, CallChainAnalysisResult};
use crate::error::Result;

/// One level of trace nesting
pub const INDENT_UNIT: &str = "  ";

pub const MAIN_SECTION_HEADER: &str = "=== Analyzing main function calls ===";
pub const REGISTRATION_SECTION_HEADER: &str = "=== Analyzing gRPC service registrations ===";

/// Renders traced chains as indented text or as a JSON report
pub struct TraceReporter {
    section_headers: bool,
}

impl TraceReporter {
    pub fn new(section_headers: bool) -> Self {
        Self { section_headers }
    }

    /// Main-root traces, then registration-root traces
    pub fn render_text(&self, result: &CallChainAnalysisResult) -> String {
        let mut out = String::new();

        if self.section_headers {
            out.push_str(MAIN_SECTION_HEADER);
            out.push('\n');
        }
        for chain in &result.main_chains {
            render_chain(chain, &mut out);
        }

        if self.section_headers {
            out.push('\n');
            out.push_str(REGISTRATION_SECTION_HEADER);
            out.push('\n');
        }
        for chain in &result.registration_chains {
            render_chain(chain, &mut out);
        }

        out
    }

    pub fn render_json(&self, result: &CallChainAnalysisResult) -> Result<String> {
        Ok(serde_json::to_string_pretty(result)?)
    }
}

/// `<INDENT_UNIT × depth><label>` per step
pub fn render_chain(chain: &CallChain, out: &mut String) {
    for step in &chain.steps {
        let _ = writeln!(out, "{}{}", INDENT_UNIT.repeat(step.depth), step.label);
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::call_graph::call_chain_engine::AnalysisStatistics;
    use crate::core::call_graph::call_chain_tracer::CallStep;
    use crate::core::call_graph::entry_point_detector::EntryPointType;
    use crate::core::call_graph::EntryPoint;
    use crate::core::program::FunctionSymbol;

    fn chain(label: &str, steps: &[(usize, &str)]) -> CallChain {
        let function = FunctionSymbol {
            package: "example.com/demo".to_string(),
            package_name: "main".to_string(),
            name: label.to_string(),
            receiver: None,
            file_path: PathBuf::from("main.go"),
            line: 1,
            exported: false,
            file: 0,
            decl_start: 0,
            results: Vec::new(),
        };
        CallChain {
            entry_point: EntryPoint {
                function,
                entry_type: EntryPointType::Main,
                reasoning: String::new(),
                site: None,
            },
            steps: steps
                .iter()
                .map(|(depth, label)| CallStep {
                    depth: *depth,
                    label: label.to_string(),
                    callee: None,
                    expanded: false,
                    file: PathBuf::from("main.go"),
                    line: 1,
                })
                .collect(),
        }
    }

    fn result(main: Vec<CallChain>, registrations: Vec<CallChain>) -> CallChainAnalysisResult {
        CallChainAnalysisResult {
            main_chains: main,
            registration_chains: registrations,
            diagnostics: Vec::new(),
            stats: AnalysisStatistics::default(),
        }
    }

    #[test]
    fn test_text_indents_two_spaces_per_depth() {
        let report = result(
            vec![chain("main", &[(0, "main"), (1, "a.Foo"), (2, "Bar"), (3, "a.Foo")])],
            vec![chain("Culc", &[(0, "server.Culc"), (1, "s.CulcService.Multiply")])],
        );

        let text = TraceReporter::new(true).render_text(&report);
        assert_eq!(
            text,
            "=== Analyzing main function calls ===\n\
             main\n  a.Foo\n    Bar\n      a.Foo\n\
             \n=== Analyzing gRPC service registrations ===\n\
             server.Culc\n  s.CulcService.Multiply\n"
        );
    }

    #[test]
    fn test_headers_can_be_disabled() {
        let report = result(vec![chain("main", &[(0, "main"), (1, "(Unknown call)")])], Vec::new());
        let text = TraceReporter::new(false).render_text(&report);
        assert_eq!(text, "main\n  (Unknown call)\n");
    }

    #[test]
    fn test_json_report_carries_steps() {
        let report = result(vec![chain("main", &[(0, "main"), (1, "helper")])], Vec::new());
        let json = TraceReporter::new(true).render_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["main_chains"][0]["steps"][1]["label"], "helper");
        assert_eq!(value["main_chains"][0]["steps"][1]["depth"], 1);
        assert_eq!(value["main_chains"][0]["entry_point"]["entry_type"], "main");
    }
}
