//! Switching the operating system's proxy settings
//!
//! The actual switch is done by a small platform tool shipped next to the
//! executable; this module only picks the tool and builds its arguments.

use anyhow::{Context, Result, bail};
use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::{debug, info};

/// ProxyMode is the system-wide proxy setting to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyMode {
    /// Route through a PAC script
    Auto { pac_url: String },
    /// Route everything through one proxy
    Global { host: String, port: u16 },
    /// No system proxy
    Off,
}

/// ProxyMode implementation block
impl ProxyMode {
    /// global points the system at a local listener. A wildcard bind
    /// address is not dialable, so it becomes loopback of the same family
    pub fn global(listen: SocketAddr) -> Self {
        let host = match listen.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
            ip => ip,
        };
        let host = match host {
            IpAddr::V6(ip) => format!("[{ip}]"),
            ip => ip.to_string(),
        };
        ProxyMode::Global {
            host,
            port: listen.port(),
        }
    }

    /// args returns the command line for the sysproxy tool
    pub fn args(&self) -> Vec<String> {
        match self {
            ProxyMode::Auto { pac_url } => vec!["pac".into(), pac_url.clone()],
            ProxyMode::Global { host, port } => vec!["global".into(), format!("{host}:{port}")],
            ProxyMode::Off => vec!["off".into()],
        }
    }
}

impl fmt::Display for ProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyMode::Auto { pac_url } => write!(f, "auto ({pac_url})"),
            ProxyMode::Global { host, port } => write!(f, "global ({host}:{port})"),
            ProxyMode::Off => write!(f, "off"),
        }
    }
}

/// SystemProxy drives the sysproxy tool
#[derive(Debug, Clone)]
pub struct SystemProxy {
    runner: PathBuf,
}

/// SystemProxy implementation block
impl SystemProxy {
    /// new uses the tool at `runner`
    pub fn new(runner: impl Into<PathBuf>) -> Self {
        Self {
            runner: runner.into(),
        }
    }

    /// from_exec_dir uses the tool shipped next to the current executable
    pub fn from_exec_dir() -> Result<Self> {
        Ok(Self::new(exec_dir()?.join(runner_name())))
    }

    pub fn runner(&self) -> &Path {
        &self.runner
    }

    /// apply switches the system proxy to `mode` and returns whatever the
    /// tool printed
    pub async fn apply(&self, mode: &ProxyMode) -> Result<String> {
        debug!("running {} {:?}", self.runner.display(), mode.args());

        let output = Command::new(&self.runner)
            .args(mode.args())
            .output()
            .await
            .with_context(|| format!("failed to run {}", self.runner.display()))?;

        let mut message = String::from_utf8_lossy(&output.stdout).into_owned();
        message.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            bail!(
                "{} exited with {}: {}",
                self.runner.display(),
                output.status,
                message.trim()
            );
        }

        info!("system proxy set to {}", mode);
        Ok(message)
    }
}

/// exec_dir is the directory holding the running executable
pub fn exec_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate current executable")?;
    exe.parent()
        .map(Path::to_path_buf)
        .context("current executable has no parent directory")
}

fn runner_name() -> &'static str {
    if cfg!(all(windows, target_arch = "x86_64")) {
        "sysproxy64.exe"
    } else if cfg!(windows) {
        "sysproxy.exe"
    } else {
        "sysproxy"
    }
}
