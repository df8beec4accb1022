// src/core/engine.rs
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::config::{Config, OutputFormat};
use crate::error::CallseqError;
use super::call_graph::{CallChainAnalysisResult, CallChainEngine, EntryPoint, EntryPoints, TraceReporter};
use super::cancellation::CancellationFlag;
use super::program::PackageLoader;

/// Name written by `init` and picked up from the working directory
pub const CONFIG_FILE_NAME: &str = "callseq.toml";

/// Command-line values that take precedence over the config file
#[derive(Debug, Default)]
pub struct TraceOverrides {
    pub format: Option<OutputFormat>,
    pub max_depth: Option<usize>,
    pub registration_pattern: Option<String>,
}

/// Main orchestration engine: loads a tree, runs the analysis off the async
/// runtime, and prints the report.
pub struct Engine {
    config: Config,
    cancel: CancellationFlag,
}

impl Engine {
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self {
            config,
            cancel: CancellationFlag::new(),
        })
    }

    fn apply_overrides(&mut self, overrides: TraceOverrides) {
        if let Some(format) = overrides.format {
            self.config.output.format = format;
        }
        if let Some(depth) = overrides.max_depth {
            self.config.analysis.max_depth = Some(depth);
        }
        if let Some(pattern) = overrides.registration_pattern {
            self.config.analysis.registration_pattern = pattern;
        }
    }

    /// Load the tree, trace every root and print the report to stdout
    pub async fn trace(&mut self, root: PathBuf, overrides: TraceOverrides) -> Result<()> {
        self.apply_overrides(overrides);
        info!("🔍 Analyzing call sequences in {}", root.display());

        let config = self.config.clone();
        let result = self
            .run_blocking(move |cancel| -> crate::error::Result<CallChainAnalysisResult> {
                let index = PackageLoader::new(config.loader.clone(), cancel.clone())?.load(&root)?;
                CallChainEngine::new(&config.analysis, cancel)?.analyze(&index)
            })
            .await?;

        let reporter = TraceReporter::new(self.config.output.section_headers);
        match self.config.output.format {
            OutputFormat::Text => print!("{}", reporter.render_text(&result)),
            OutputFormat::Json => println!("{}", reporter.render_json(&result)?),
        }
        Ok(())
    }

    /// Load the tree and list its roots without tracing them
    pub async fn roots(&mut self, root: PathBuf) -> Result<()> {
        let config = self.config.clone();
        let tree_root = root.clone();
        let found = self
            .run_blocking(move |cancel| -> crate::error::Result<EntryPoints> {
                let index = PackageLoader::new(config.loader.clone(), cancel.clone())?.load(&tree_root)?;
                Ok(CallChainEngine::new(&config.analysis, cancel)?.detect(&index))
            })
            .await?;

        match self.config.output.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&found)?),
            OutputFormat::Text => {
                for entry in found.mains.iter().chain(&found.registrations) {
                    println!("{}", describe_root(entry, &root));
                }
            }
        }
        for diagnostic in &found.diagnostics {
            debug!("Skipped site {}:{}", relative(&diagnostic.file, &root).display(), diagnostic.line);
        }
        Ok(())
    }

    /// Write a default configuration file
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        info!("Initializing callseq in: {}", target_dir.display());

        let target = target_dir.join(CONFIG_FILE_NAME);
        if target.exists() {
            return Err(CallseqError::Config(format!("{} already exists", target.display())).into());
        }

        std::fs::create_dir_all(&target_dir)?;
        Config::default().save(&target)?;
        info!("✅ Wrote {}", target.display());
        Ok(())
    }

    /// Run synchronous analysis on the blocking pool; Ctrl-C raises the
    /// cancellation flag and waits for the worker to stop.
    async fn run_blocking<T, F>(&self, job: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationFlag) -> crate::error::Result<T> + Send + 'static,
    {
        let cancel = self.cancel.clone();
        let mut handle = tokio::task::spawn_blocking(move || job(cancel));

        tokio::select! {
            joined = &mut handle => Ok(joined??),
            // A failed handler install disables this branch and the worker runs to completion
            Ok(()) = tokio::signal::ctrl_c() => {
                warn!("⚠️ Interrupt received, stopping analysis...");
                self.cancel.cancel();
                let _ = handle.await;
                Err(CallseqError::Cancelled.into())
            }
        }
    }
}

fn relative<'p>(path: &'p Path, root: &Path) -> &'p Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn describe_root(entry: &EntryPoint, root: &Path) -> String {
    let function = &entry.function;
    let location = format!("{}:{}", relative(&function.file_path, root).display(), function.line);
    match &entry.site {
        Some(site) => format!(
            "{}\t{}\t(via {} at {}:{})",
            entry.label(),
            location,
            site.registration,
            relative(&site.file, root).display(),
            site.line
        ),
        None => format!("{}\t{}\t({})", entry.label(), location, function.package),
    }
}
