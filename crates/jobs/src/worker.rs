// crates/jobs/src/worker.rs
//! Worker invocation and artifact locator configuration.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::types::DownloadUrls;

/// Placeholder replaced by the job's input path.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced by the job's output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

/// How to launch the external conversion worker.
///
/// `args` is a template: `{input}` and `{output}` are substituted with the
/// job's paths. An argument that is exactly a placeholder is passed as the
/// raw path, so non-UTF-8 paths survive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl WorkerCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Arguments with the placeholders filled in.
    pub fn render_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| match arg.as_str() {
                INPUT_PLACEHOLDER => input.as_os_str().to_owned(),
                OUTPUT_PLACEHOLDER => output.as_os_str().to_owned(),
                _ => OsString::from(
                    arg.replace(INPUT_PLACEHOLDER, &input.to_string_lossy())
                        .replace(OUTPUT_PLACEHOLDER, &output.to_string_lossy()),
                ),
            })
            .collect()
    }

    /// Build the process: stdin closed, stdout and stderr piped.
    pub fn build(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for WorkerCommand {
    fn default() -> Self {
        Self::new("python3", ["convert.py", INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER])
    }
}

/// Derives public retrieval URLs for a job's artifacts.
///
/// The primary artifact is the output file itself; the sibling shares its
/// stem with `sibling_extension` as suffix. URLs are keyed by suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLocator {
    url_prefix: String,
    sibling_extension: String,
}

impl ArtifactLocator {
    pub fn new(url_prefix: impl Into<String>, sibling_extension: impl Into<String>) -> Self {
        let url_prefix = url_prefix.into().trim_end_matches('/').to_string();
        let sibling_extension = sibling_extension
            .into()
            .trim_start_matches('.')
            .to_string();
        Self {
            url_prefix,
            sibling_extension,
        }
    }

    pub fn sibling_path(&self, output: &Path) -> PathBuf {
        output.with_extension(&self.sibling_extension)
    }

    /// Locators for the primary and sibling artifacts, by suffix substitution
    /// only. Nothing is checked on disk.
    pub fn locate(&self, output: &Path) -> DownloadUrls {
        let mut urls = DownloadUrls::new();
        urls.insert(suffix_of(output), self.url_for(output));
        let sibling = self.sibling_path(output);
        urls.entry(self.sibling_extension.clone())
            .or_insert_with(|| self.url_for(&sibling));
        urls
    }

    /// Like [`locate`](Self::locate), but the sibling is only advertised if
    /// the file is actually there.
    pub async fn collect(&self, output: &Path) -> DownloadUrls {
        let mut urls = self.locate(output);
        let sibling = self.sibling_path(output);
        if sibling != output && !tokio::fs::try_exists(&sibling).await.unwrap_or(false) {
            tracing::debug!(path = %sibling.display(), "sibling artifact missing, not advertised");
            urls.remove(&self.sibling_extension);
        }
        urls
    }

    fn url_for(&self, path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}/{}", self.url_prefix, name)
    }
}

impl Default for ArtifactLocator {
    fn default() -> Self {
        Self::new("/downloads", "json")
    }
}

fn suffix_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default()
}
