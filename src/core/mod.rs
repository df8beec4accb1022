mod cancellation;
mod engine;
mod parser;

// Call-sequence analysis
mod call_graph;

// Go syntax helpers
mod languages;

// Whole-program index and resolution
mod program;

#[cfg(test)]
mod test_support;

pub use engine::{Engine, TraceOverrides};
