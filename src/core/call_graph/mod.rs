// src/core/call_graph/mod.rs
//! Call-sequence analysis over a loaded program
//!
//! Roots come from the entry point detector, the tracer walks each root's
//! body depth-first through the resolver, and the reporter prints the
//! resulting chains.

mod call_chain_engine;
mod call_chain_tracer;
mod entry_point_detector;
mod reporter;

pub use call_chain_engine::{CallChainAnalysisResult, CallChainEngine};
pub use call_chain_tracer::{CallChain, CallChainTracer};
pub use entry_point_detector::{Diagnostic, EntryPoint, EntryPointDetector, EntryPoints};
pub use reporter::TraceReporter;
