// src/core/call_graph/call_chain_tracer.rs
use std::collections::HashSet;
use std::path::PathBuf;

use serde::Serialize;
use tracing::debug;

use super::EntryPoint;
use crate::core::cancellation::CancellationFlag;
use crate::core::languages::{call_expressions, call_label};
use crate::core::program::{FunctionSymbol, Resolution, SymbolResolver};
use crate::error::Result;

/// Fully-qualified names already expanded within one root's trace
#[derive(Debug, Default)]
pub struct VisitedSet {
    expanded: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `name` was already present
    pub fn insert(&mut self, name: &str) -> bool {
        self.expanded.insert(name.to_string())
    }

    pub fn remove(&mut self, name: &str) {
        self.expanded.remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.expanded.contains(name)
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }
}

/// Walks function bodies depth-first, recording every call site in
/// pre-order and expanding each resolved callee at most once per root.
pub struct CallChainTracer<'a> {
    resolver: &'a SymbolResolver<'a>,
    /// Deepest call-site depth to record
    max_depth: Option<usize>,
    cancel: CancellationFlag,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallChain {
    /// Root this chain starts from
    pub entry_point: EntryPoint,
    /// Root line at depth 0, then every call site in traversal order
    pub steps: Vec<CallStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CallStep {
    pub depth: usize,
    pub label: String,
    /// Fully-qualified name of the resolved callee
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee: Option<String>,
    /// Whether the callee's body was walked from this step
    pub expanded: bool,
    pub file: PathBuf,
    pub line: usize,
}

impl CallChain {
    pub fn call_sites(&self) -> impl Iterator<Item = &CallStep> {
        self.steps.iter().skip(1)
    }
}

impl<'a> CallChainTracer<'a> {
    pub fn new(resolver: &'a SymbolResolver<'a>, max_depth: Option<usize>, cancel: CancellationFlag) -> Self {
        Self {
            resolver,
            max_depth,
            cancel,
        }
    }

    /// Trace one root with a fresh VisitedSet seeded with the root itself
    pub fn trace_from_entry_point(&self, entry_point: &EntryPoint) -> Result<CallChain> {
        let symbol = &entry_point.function;
        let qualified = symbol.qualified_name();
        let mut visited = VisitedSet::new();
        visited.insert(&qualified);

        let mut steps = vec![CallStep {
            depth: 0,
            label: entry_point.label(),
            callee: Some(qualified),
            expanded: true,
            file: symbol.file_path.clone(),
            line: symbol.line,
        }];
        let complete = self.walk(symbol, 1, &mut visited, &mut steps)?;
        steps[0].expanded = complete;

        debug!(
            "Traced {}: {} call sites, {} functions expanded",
            entry_point.label(),
            steps.len() - 1,
            visited.len()
        );
        Ok(CallChain {
            entry_point: entry_point.clone(),
            steps,
        })
    }

    /// Trace every root, in order
    pub fn trace_all_chains(&self, entry_points: &[EntryPoint]) -> Result<Vec<CallChain>> {
        entry_points
            .iter()
            .map(|entry_point| self.trace_from_entry_point(entry_point))
            .collect()
    }

    /// Record the call sites of `symbol`'s body at `depth`, expanding
    /// resolved callees. Returns `false` when the depth limit cut the walk
    /// before this body was entered.
    fn walk(
        &self,
        symbol: &FunctionSymbol,
        depth: usize,
        visited: &mut VisitedSet,
        steps: &mut Vec<CallStep>,
    ) -> Result<bool> {
        if self.max_depth.is_some_and(|max| depth > max) {
            return Ok(false);
        }
        let Some(ctx) = self.resolver.function_context(symbol) else {
            return Ok(true);
        };
        let Some(body) = ctx.body() else {
            return Ok(true);
        };

        for call in call_expressions(body) {
            self.cancel.check()?;

            let mut step = CallStep {
                depth,
                label: call_label(call, &ctx.file.source),
                callee: None,
                expanded: false,
                file: ctx.file.path.clone(),
                line: call.start_position().row + 1,
            };

            let Resolution::Resolved(callee) = self.resolver.resolve_call(call, &ctx) else {
                steps.push(step);
                continue;
            };

            let qualified = callee.qualified_name();
            step.callee = Some(qualified.clone());
            let slot = steps.len();
            steps.push(step);

            if visited.contains(&qualified) {
                continue;
            }
            visited.insert(&qualified);
            if self.walk(callee, depth + 1, visited, steps)? {
                steps[slot].expanded = true;
            } else {
                visited.remove(&qualified);
            }
        }

        Ok(true)
    }
}
