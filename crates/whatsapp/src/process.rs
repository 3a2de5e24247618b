//! Discovery, build and supervision of the Node.js sidecar process.

use std::{
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        process::{Child, Command},
    },
    tracing::{debug, error, info, warn},
};

use crate::error::{Error, Result};

/// Environment variable pointing at the sidecar directory.
pub const SIDECAR_DIR_ENV: &str = "WABRIDGE_SIDECAR_DIR";

const SIDECAR_REL_PATH: &str = "sidecar/whatsapp-web";
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Handle to a running sidecar process.
pub struct SidecarProcess {
    child: Child,
}

impl SidecarProcess {
    /// SIGTERM, then kill if the process has not exited within the grace
    /// period.
    pub async fn stop(&mut self) {
        info!("stopping WhatsApp sidecar process");

        #[cfg(unix)]
        {
            use nix::{
                sys::signal::{Signal, kill},
                unistd::Pid,
            };

            if let Some(pid) = self.child.id()
                && let Ok(pid) = i32::try_from(pid)
            {
                let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
            }
        }

        #[cfg(not(unix))]
        {
            let _ = self.child.kill().await;
        }

        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!(?status, "WhatsApp sidecar process exited"),
            Ok(Err(e)) => warn!(error = %e, "error waiting for sidecar process"),
            Err(_) => {
                warn!("sidecar process did not exit gracefully, killing");
                let _ = self.child.kill().await;
            },
        }
    }
}

/// How to launch the sidecar.
#[derive(Debug, Clone)]
pub struct SidecarLaunch {
    /// Directory containing the sidecar's `package.json`.
    pub sidecar_dir: PathBuf,
    pub port: u16,
    /// Handed to the sidecar for its local auth strategy.
    pub session_dir: PathBuf,
}

/// Find the sidecar directory.
///
/// Searches in order:
/// 1. Explicit path if provided
/// 2. `WABRIDGE_SIDECAR_DIR`
/// 3. Relative to the executable
/// 4. Development paths relative to the working directory
pub fn find_sidecar_dir(explicit_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit_path {
        if is_sidecar_dir(path) {
            return Ok(path.to_path_buf());
        }
        return Err(Error::sidecar(format!(
            "sidecar directory does not exist or missing package.json: {}",
            path.display()
        )));
    }

    if let Ok(dir) = std::env::var(SIDECAR_DIR_ENV) {
        let path = PathBuf::from(&dir);
        if is_sidecar_dir(&path) {
            return Ok(path);
        }
        warn!(path = %dir, "{SIDECAR_DIR_ENV} set but package.json not found");
    }

    if let Ok(exe_path) = std::env::current_exe()
        && let Some(exe_dir) = exe_path.parent()
    {
        for prefix in ["..", "../.."] {
            let candidate = exe_dir.join(prefix).join(SIDECAR_REL_PATH);
            if is_sidecar_dir(&candidate) {
                return Ok(candidate);
            }
        }
    }

    for prefix in [".", "..", "../.."] {
        let path = Path::new(prefix).join(SIDECAR_REL_PATH);
        if is_sidecar_dir(&path) {
            return Ok(path.canonicalize().unwrap_or(path));
        }
    }

    Err(Error::sidecar(format!(
        "WhatsApp sidecar not found. Set {SIDECAR_DIR_ENV} or ensure \
         {SIDECAR_REL_PATH} exists with package.json"
    )))
}

fn is_sidecar_dir(path: &Path) -> bool {
    path.join("package.json").exists()
}

/// `dist/index.js` exists.
pub fn is_sidecar_built(sidecar_dir: &Path) -> bool {
    sidecar_dir.join("dist/index.js").exists()
}

pub fn has_node_modules(sidecar_dir: &Path) -> bool {
    sidecar_dir.join("node_modules").exists()
}

/// Build the sidecar if needed and start it.
pub async fn start_sidecar(launch: SidecarLaunch) -> Result<SidecarProcess> {
    let sidecar_dir = &launch.sidecar_dir;

    if !is_sidecar_dir(sidecar_dir) {
        return Err(Error::sidecar(format!(
            "WhatsApp sidecar not found at {}. Run `cd {} && npm install && npm run build` first.",
            sidecar_dir.display(),
            sidecar_dir.display()
        )));
    }

    if !is_sidecar_built(sidecar_dir) {
        info!(path = %sidecar_dir.display(), "building WhatsApp sidecar");
        if !has_node_modules(sidecar_dir) {
            run_npm(sidecar_dir, &["install"]).await?;
        }
        run_npm(sidecar_dir, &["run", "build"]).await?;
    }

    info!(
        path = %sidecar_dir.display(),
        port = launch.port,
        "starting WhatsApp sidecar process"
    );

    let mut child = Command::new("node")
        .arg("dist/index.js")
        .current_dir(sidecar_dir)
        .env("WABRIDGE_SIDECAR_PORT", launch.port.to_string())
        .env("WABRIDGE_SESSION_DIR", &launch.session_dir)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::sidecar(format!("failed to spawn sidecar process: {e}")))?;

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                forward_log_line(&line);
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "whatsapp_sidecar", "{}", line);
            }
        });
    }

    // Give the process a moment to fail on bad installs.
    tokio::time::sleep(Duration::from_millis(500)).await;

    match child.try_wait() {
        Ok(Some(status)) => {
            return Err(Error::sidecar(format!(
                "sidecar process exited immediately with status: {status}"
            )));
        },
        Ok(None) => {},
        Err(e) => {
            return Err(Error::sidecar(format!(
                "failed to check sidecar process status: {e}"
            )));
        },
    }

    info!(port = launch.port, "WhatsApp sidecar process started");

    Ok(SidecarProcess { child })
}

/// Pino log level of a JSON log line and its message.
fn parse_pino_line(line: &str) -> Option<(u64, String)> {
    if !line.starts_with('{') {
        return None;
    }
    let log = serde_json::from_str::<serde_json::Value>(line).ok()?;
    let level = log.get("level").and_then(|v| v.as_u64()).unwrap_or(30);
    let msg = log
        .get("msg")
        .and_then(|v| v.as_str())
        .unwrap_or(line)
        .to_string();
    Some((level, msg))
}

fn forward_log_line(line: &str) {
    match parse_pino_line(line) {
        Some((10 | 20, msg)) => debug!(target: "whatsapp_sidecar", "{}", msg),
        Some((30, msg)) => info!(target: "whatsapp_sidecar", "{}", msg),
        Some((40, msg)) => warn!(target: "whatsapp_sidecar", "{}", msg),
        Some((_, msg)) => error!(target: "whatsapp_sidecar", "{}", msg),
        None => info!(target: "whatsapp_sidecar", "{}", line),
    }
}

async fn run_npm(sidecar_dir: &Path, args: &[&str]) -> Result<()> {
    let command = format!("npm {}", args.join(" "));
    info!(path = %sidecar_dir.display(), "running {command} for sidecar");

    let output = Command::new("npm")
        .args(args)
        .current_dir(sidecar_dir)
        .output()
        .await
        .map_err(|e| Error::sidecar(format!("failed to run {command}: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::sidecar(format!("{command} failed: {stderr}")));
    }

    Ok(())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_dir_needs_package_json() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            find_sidecar_dir(Some(dir.path())),
            Err(Error::Sidecar { .. })
        ));

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(find_sidecar_dir(Some(dir.path())).unwrap(), dir.path());
        assert!(!is_sidecar_built(dir.path()));
        assert!(!has_node_modules(dir.path()));
    }

    #[test]
    fn pino_levels_are_parsed() {
        assert_eq!(
            parse_pino_line(r#"{"level":40,"msg":"reconnecting"}"#),
            Some((40, "reconnecting".to_string()))
        );
        assert_eq!(
            parse_pino_line(r#"{"msg":"no level"}"#),
            Some((30, "no level".to_string()))
        );
        assert!(parse_pino_line("plain text").is_none());
        assert!(parse_pino_line("{not json").is_none());
    }

    #[tokio::test]
    async fn start_fails_without_package_json() {
        let dir = tempfile::tempdir().unwrap();
        let result = start_sidecar(SidecarLaunch {
            sidecar_dir: dir.path().to_path_buf(),
            port: 3101,
            session_dir: dir.path().join(".session"),
        })
        .await;
        assert!(matches!(result, Err(Error::Sidecar { .. })));
    }
}
