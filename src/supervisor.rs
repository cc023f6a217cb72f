use anyhow::{Context, Result, bail};
use std::{
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
};
use tokio::process::{Child, Command};
use tracing::{debug, info};

/// ChildSupervisor owns one helper process, such as the bundled filtering
/// proxy, and gives it an explicit start/stop lifecycle. The child is killed
/// when the supervisor is dropped
#[derive(Debug)]
pub struct ChildSupervisor {
    program: PathBuf,
    args: Vec<String>,
    child: Option<Child>,
}

/// ChildSupervisor implementation block
impl ChildSupervisor {
    /// new is a constructor for the ChildSupervisor type
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            child: None,
        }
    }

    /// privoxy supervises the privoxy binary found in `dir`, running in the
    /// foreground with config file `conf`
    pub fn privoxy(dir: &Path, conf: &Path) -> Self {
        let program = if cfg!(windows) { "privoxy.exe" } else { "privoxy" };
        Self::new(
            dir.join(program),
            vec!["--no-daemon".into(), conf.display().to_string()],
        )
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// start spawns the child, failing if one is still running
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("{} is already running", self.program.display());
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;

        info!(
            "started {} (pid {})",
            self.program.display(),
            child.id().unwrap_or_default()
        );
        self.child = Some(child);
        Ok(())
    }

    /// is_running tells whether the child has been started and not yet exited
    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                Ok(Some(status)) => {
                    debug!("{} exited with {}", self.program.display(), status);
                    self.child = None;
                    false
                }
                Err(_) => false,
            },
            None => false,
        }
    }

    /// wait blocks until the child exits on its own
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        let Some(child) = self.child.as_mut() else {
            bail!("{} is not running", self.program.display());
        };

        let status = child.wait().await?;
        self.child = None;
        info!("{} exited with {}", self.program.display(), status);
        Ok(status)
    }

    /// stop kills the child and reaps it. Stopping a child that isn't running
    /// does nothing
    pub async fn stop(&mut self) -> Result<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        child
            .kill()
            .await
            .with_context(|| format!("failed to stop {}", self.program.display()))?;
        info!("stopped {}", self.program.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privoxy_runs_in_foreground() {
        let sup = ChildSupervisor::privoxy(Path::new("/opt/app"), Path::new("/opt/app/privoxy.conf"));
        assert!(sup.program().starts_with("/opt/app"));
        assert_eq!(sup.args(), ["--no-daemon", "/opt/app/privoxy.conf"]);
    }

    #[tokio::test]
    async fn missing_program_fails_to_start() {
        let mut sup = ChildSupervisor::new("/nonexistent/privoxy", Vec::new());
        assert!(sup.start().is_err());
        assert!(!sup.is_running());
        sup.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn start_then_stop() {
        let mut sup = ChildSupervisor::new("sleep", vec!["30".into()]);
        sup.start().unwrap();
        assert!(sup.is_running());
        assert!(sup.start().is_err());

        sup.stop().await.unwrap();
        assert!(!sup.is_running());
        // Stopping twice is fine
        sup.stop().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn wait_collects_exit_and_allows_restart() {
        let mut sup = ChildSupervisor::new("true", Vec::new());
        sup.start().unwrap();
        assert!(sup.wait().await.unwrap().success());
        assert!(!sup.is_running());
        assert!(sup.wait().await.is_err());

        sup.start().unwrap();
        sup.wait().await.unwrap();
    }
}
