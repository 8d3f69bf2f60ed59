//! Host conventions for locating a process and its config files
//!
//! POSIX hosts read the process table through `sysinfo`. Windows hosts ask CIM
//! for `Win32_Process.CommandLine`, since the raw command line is only
//! available there. Both variants answer the same three questions, so callers
//! never branch on the operating system themselves.

use std::path::PathBuf;
use std::process::Command;
use sysinfo::System;

const POSIX_CONFIG_CANDIDATES: &[&str] = &[
    "/etc/kubernetes/kubelet/config.json",
    "/var/lib/kubelet/config.yaml",
];

const WINDOWS_CONFIG_CANDIDATES: &[&str] = &[
    r"C:\etc\kubernetes\kubelet\config.json",
    r"C:\var\lib\kubelet\config.yaml",
];

/// Process table access and path conventions of the host
pub trait Platform: Send + Sync {
    /// Raw command line of the first running process with this executable name
    ///
    /// Returns an empty string when no such process is running.
    fn command_line(&self, process_name: &str) -> String;

    /// Rewrite a path into the host's canonical form
    fn normalize_path(&self, path: &str) -> String;

    /// Default kubelet config file locations, in priority order
    fn config_candidates(&self) -> Vec<PathBuf>;
}

/// Linux and other Unix-like hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct Posix;

impl Platform for Posix {
    fn command_line(&self, process_name: &str) -> String {
        let mut system = System::new();
        system.refresh_processes();

        let mut candidates: Vec<_> = system
            .processes_by_exact_name(process_name)
            .map(|p| (p.pid(), join_args(p.cmd())))
            .filter(|(_, cmd)| !cmd.is_empty())
            .collect();
        candidates.sort_by_key(|(pid, _)| *pid);

        match candidates.into_iter().next() {
            Some((pid, cmd)) => {
                tracing::debug!("Found {} process (pid {})", process_name, pid);
                cmd
            }
            None => {
                tracing::debug!("No running {} process", process_name);
                String::new()
            }
        }
    }

    fn normalize_path(&self, path: &str) -> String {
        path.to_string()
    }

    fn config_candidates(&self) -> Vec<PathBuf> {
        POSIX_CONFIG_CANDIDATES.iter().map(PathBuf::from).collect()
    }
}

/// Windows hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct Windows;

impl Platform for Windows {
    fn command_line(&self, process_name: &str) -> String {
        let image = if process_name.ends_with(".exe") {
            process_name.to_string()
        } else {
            format!("{}.exe", process_name)
        };
        let query = format!(
            "(Get-CimInstance Win32_Process -Filter \"Name='{}'\" | Select-Object -First 1).CommandLine",
            image
        );

        let output = Command::new("powershell.exe")
            .args(["-NoProfile", "-NonInteractive", "-Command", &query])
            .output();

        match output {
            Ok(output) if output.status.success() => {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            }
            Ok(output) => {
                tracing::debug!(
                    "CIM query for {} failed: {}",
                    image,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                String::new()
            }
            Err(e) => {
                tracing::warn!("Failed to run powershell for process query: {}", e);
                String::new()
            }
        }
    }

    fn normalize_path(&self, path: &str) -> String {
        path.replace('/', "\\").replace(['"', '\''], "")
    }

    fn config_candidates(&self) -> Vec<PathBuf> {
        WINDOWS_CONFIG_CANDIDATES.iter().map(PathBuf::from).collect()
    }
}

/// Pick the platform implementation for the running host
pub fn detect() -> Box<dyn Platform> {
    if cfg!(windows) {
        Box::new(Windows)
    } else {
        Box::new(Posix)
    }
}

/// Join argv back into one command line, quoting arguments that contain whitespace
///
/// For `--name=value` only the value is quoted, so the flag name stays visible
/// to the tokenizer.
fn join_args(args: &[String]) -> String {
    args.iter()
        .map(|arg| {
            if !arg.chars().any(char::is_whitespace) {
                return arg.clone();
            }
            match arg.split_once('=') {
                Some((name, value))
                    if name.starts_with("--") && !name.chars().any(char::is_whitespace) =>
                {
                    format!("{}=\"{}\"", name, value)
                }
                _ => format!("\"{}\"", arg),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
        .trim()
        .to_string()
}
