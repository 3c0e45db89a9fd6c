//! Locating and starting a Chromium process

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::debug;

use super::BrowserError;
use crate::config::BrowserConfig;

/// Executable names tried on PATH, in order
const CANDIDATES: &[&str] = &[
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

const DEFAULT_ARGS: &[&str] = &[
    "--remote-debugging-port=0",
    "--no-first-run",
    "--no-default-browser-check",
    "--disable-background-networking",
    "--disable-extensions",
    "--disable-sync",
    "--mute-audio",
];

const DEVTOOLS_BANNER: &str = "DevTools listening on ";

/// A started browser process and its DevTools endpoint
pub struct Launched {
    pub child: Child,
    pub ws_url: String,
    pub profile_dir: PathBuf,
}

/// Resolve the browser executable from config or PATH
pub fn find_executable(config: &BrowserConfig) -> Result<PathBuf, BrowserError> {
    if let Some(explicit) = &config.executable {
        return which::which(explicit)
            .map_err(|_| BrowserError::NotFound(Some(explicit.clone())));
    }

    CANDIDATES
        .iter()
        .find_map(|name| which::which(name).ok())
        .ok_or(BrowserError::NotFound(None))
}

/// Start the browser and wait for its DevTools URL
pub async fn spawn(config: &BrowserConfig) -> Result<Launched, BrowserError> {
    let executable = find_executable(config)?;
    let profile_dir =
        std::env::temp_dir().join(format!("localebundle-profile-{}", std::process::id()));

    let mut command = Command::new(&executable);
    command
        .args(DEFAULT_ARGS)
        .arg(format!("--user-data-dir={}", profile_dir.display()));
    if config.headless {
        command.arg("--headless=new");
    }
    command
        .args(&config.args)
        .arg("about:blank")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Launching {}", executable.display());

    let mut child = command
        .spawn()
        .map_err(|e| BrowserError::Launch(format!("{}: {}", executable.display(), e)))?;

    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| BrowserError::Launch("browser stderr unavailable".to_string()))?;
    let mut lines = BufReader::new(stderr).lines();

    let mut ws_url = None;
    while let Some(line) = lines.next_line().await? {
        if let Some(url) = parse_devtools_banner(&line) {
            ws_url = Some(url);
            break;
        }
        debug!("browser: {}", line);
    }

    let ws_url = ws_url.ok_or_else(|| {
        BrowserError::Launch("browser exited before opening a DevTools endpoint".to_string())
    })?;

    // keep draining so the browser never blocks on a full stderr pipe
    tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

    Ok(Launched {
        child,
        ws_url,
        profile_dir,
    })
}

fn parse_devtools_banner(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix(DEVTOOLS_BANNER)
        .map(|url| url.trim().to_string())
        .filter(|url| url.starts_with("ws://"))
}
