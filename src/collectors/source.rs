//! Acquisition sources: external tool invocations and kernel pseudo-files.

use super::privilege;
use crate::config::CollectorsConfig;
use crate::error::SourceError;
use crate::parser::{self, ConnectionRecord};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// `<program> <args...>`, stdout parsed as tool output
    Command { program: String, args: Vec<String> },
    /// Pseudo-file read in full, parsed with fixed offsets
    ProcFile { path: PathBuf },
}

impl Source {
    pub fn command(program: impl Into<String>, args: &[&str]) -> Self {
        Source::Command {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn proc_file(path: impl Into<PathBuf>) -> Self {
        Source::ProcFile { path: path.into() }
    }

    /// Priority order: extended output, extended + numeric, default output, pseudo-files.
    pub fn default_chain(config: &CollectorsConfig) -> Vec<Source> {
        let mut chain = vec![
            Source::command(&config.command, &["-L", "-o", "extended"]),
            Source::command(&config.command, &["-L", "-o", "extended", "-n"]),
            Source::command(&config.command, &["-L"]),
        ];
        chain.extend(config.proc_paths.iter().cloned().map(Source::proc_file));
        chain
    }

    pub fn label(&self) -> String {
        match self {
            Source::Command { program, args } => {
                if args.is_empty() {
                    program.clone()
                } else {
                    format!("{} {}", program, args.join(" "))
                }
            }
            Source::ProcFile { path } => path.display().to_string(),
        }
    }

    /// Raw text from this source. Empty output counts as failure.
    pub async fn fetch(&self, timeout: Duration) -> Result<String, SourceError> {
        let text = match self {
            Source::Command { program, args } => {
                let mut cmd = tokio::process::Command::new(program);
                cmd.args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
                let output = tokio::time::timeout(timeout, cmd.output())
                    .await
                    .map_err(|_| SourceError::Timeout(timeout.as_secs()))?
                    .map_err(SourceError::from_io)?;
                if !output.status.success() {
                    return Err(privilege::classify_failure(&String::from_utf8_lossy(
                        &output.stderr,
                    )));
                }
                String::from_utf8_lossy(&output.stdout).into_owned()
            }
            Source::ProcFile { path } => {
                let raw = tokio::time::timeout(timeout, tokio::fs::read(path))
                    .await
                    .map_err(|_| SourceError::Timeout(timeout.as_secs()))?
                    .map_err(SourceError::from_io)?;
                String::from_utf8_lossy(&raw).into_owned()
            }
        };
        if text.trim().is_empty() {
            return Err(SourceError::Empty);
        }
        Ok(text)
    }

    pub fn parse(&self, text: &str) -> Vec<ConnectionRecord> {
        match self {
            Source::Command { .. } => parser::parse_command_output(text),
            Source::ProcFile { .. } => parser::parse_procfs(text),
        }
    }
}
