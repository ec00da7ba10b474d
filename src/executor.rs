use crate::analysis::report::parse_report;
use crate::config::AnalysisConfig;
use crate::model::{ResolvedDependencyReport, RestoreWarning};
use crate::traits::{DependencyResolver, ResolverError};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, LazyLock};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

static RESTORE_WARNING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:(.+?)\s*:\s*)?warning\s+(NU\d+)\s*:\s*(.*?)(?:\s+\[[^\]]+\])?\s*$")
        .expect("valid restore warning regex")
});

/// Runs the `dotnet` CLI, at most `concurrency_limit` processes at a time.
pub struct DotnetExecutor {
    dotnet: PathBuf,
    semaphore: Arc<Semaphore>,
}

impl DotnetExecutor {
    pub fn new(dotnet: impl Into<PathBuf>, concurrency_limit: usize) -> Self {
        Self {
            dotnet: dotnet.into(),
            semaphore: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(&config.dotnet_path, config.max_concurrent_processes)
    }

    #[instrument(skip(self, args), fields(command = %args.join(" ")))]
    async fn run(&self, cwd: &Path, args: &[String]) -> Result<Output, ResolverError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|e| ResolverError::Unknown(format!("Semaphore error: {}", e)))?;

        debug!("Starting dotnet");
        let output = Command::new(&self.dotnet)
            .args(args)
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    ResolverError::Unavailable(self.dotnet.display().to_string())
                }
                _ => ResolverError::IoError(e),
            })?;

        debug!(status = ?output.status.code(), "dotnet finished");
        Ok(output)
    }

    async fn list_packages(
        &self,
        root: &Path,
        target: Option<&Path>,
        vulnerable: bool,
    ) -> Result<ResolvedDependencyReport, ResolverError> {
        let mut args = vec!["list".to_string()];
        if let Some(target) = target {
            args.push(target.display().to_string());
        }
        args.push("package".to_string());
        if vulnerable {
            args.push("--vulnerable".to_string());
        }
        args.extend(["--include-transitive", "--format", "json"].map(String::from));

        let output = self.run(root, &args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match parse_report(&stdout) {
            Ok(report) => {
                if !output.status.success() {
                    // The CLI exits non-zero alongside a valid body in some cases.
                    debug!(status = ?output.status.code(), "Using JSON from failed dotnet list");
                }
                Ok(report)
            }
            Err(ResolverError::NoParseableOutput) => {
                // Older SDKs reject `--format json` with text on stdout.
                if !output.status.success() {
                    warn!(
                        status = ?output.status.code(),
                        stdout = %stdout.trim(),
                        stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                        "dotnet list produced no JSON"
                    );
                }
                Err(ResolverError::NoParseableOutput)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl DependencyResolver for DotnetExecutor {
    async fn is_available(&self) -> bool {
        let cwd = std::env::temp_dir();
        match self.run(&cwd, &["--version".to_string()]).await {
            Ok(output) => output.status.success(),
            Err(_) => false,
        }
    }

    async fn list_transitive_packages(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<ResolvedDependencyReport, ResolverError> {
        self.list_packages(root, target, false).await
    }

    async fn list_vulnerable_packages(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<ResolvedDependencyReport, ResolverError> {
        self.list_packages(root, target, true).await
    }

    async fn restore_and_get_warnings(
        &self,
        root: &Path,
        target: Option<&Path>,
    ) -> Result<Vec<RestoreWarning>, ResolverError> {
        let mut args = vec!["restore".to_string()];
        if let Some(target) = target {
            args.push(target.display().to_string());
        }

        let output = self.run(root, &args).await?;
        let text = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );

        let fallback = target.unwrap_or(root);
        let warnings = parse_restore_output(&text, fallback);

        if !output.status.success() {
            warn!(status = ?output.status.code(), "dotnet restore failed");
        }
        info!(warnings = warnings.len(), "Restore completed");
        Ok(warnings)
    }
}

/// Extracts `[<path> :] warning NUxxxx: <message> [<entry>]` lines.
///
/// Restore repeats each warning in its summary, so duplicates are dropped.
/// Lines without a usable path are attributed to `fallback_project`.
pub fn parse_restore_output(output: &str, fallback_project: &Path) -> Vec<RestoreWarning> {
    let mut seen = HashSet::new();
    let mut warnings = Vec::new();

    for line in output.lines() {
        let Some(caps) = RESTORE_WARNING.captures(line) else {
            continue;
        };

        let project_path = match caps.get(1).map(|m| m.as_str().trim()) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => fallback_project.to_path_buf(),
        };

        let warning = RestoreWarning {
            code: caps[2].to_string(),
            message: caps[3].trim().to_string(),
            project_path,
        };
        if seen.insert(warning.clone()) {
            warnings.push(warning);
        }
    }

    warnings
}
