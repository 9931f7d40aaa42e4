//! OpenSSH transport
//!
//! Each session is a multiplexing control master started with key-only
//! authentication; commands run as ssh clients over that master's socket.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::config::RemoteConfig;
use crate::error::{OpsError, Result};
use crate::id::generate_session_id;
use crate::tools::RemoteCommand;

use super::transport::{RawOutput, RemoteSession, RemoteTransport, RunOutcome, TransportError};

/// Exit status the ssh client reserves for its own failures
const SSH_CLIENT_FAILURE: i32 = 255;

/// Deadline for `-O exit` on close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection settings for the ssh client
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
    pub control_dir: PathBuf,
    pub connect_timeout: Duration,
    pub program: PathBuf,
}

impl From<&RemoteConfig> for SshConfig {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            user: config.user.clone(),
            key_path: config.key_path.clone(),
            control_dir: config.control_dir.clone(),
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            program: PathBuf::from("ssh"),
        }
    }
}

/// Transport backed by the system `ssh` binary
#[derive(Debug, Clone)]
pub struct SshTransport {
    config: SshConfig,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(OpsError::Config(
                "remote.host is not set (config file or OPSGATE_SSH_HOST)".to_string(),
            ));
        }
        if config.user.trim().is_empty() {
            return Err(OpsError::Config("remote.user is not set".to_string()));
        }
        Ok(Self { config })
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    /// Options shared by the master and every client using it
    fn common_args(config: &SshConfig, control_path: &Path) -> Vec<String> {
        let connect_secs = config.connect_timeout.as_secs().max(1);
        vec![
            "-p".to_string(),
            config.port.to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", connect_secs),
            "-o".to_string(),
            format!("ControlPath={}", control_path.display()),
        ]
    }

    /// Arguments that start an authenticated control master (key-only)
    fn master_args(&self, control_path: &Path) -> Vec<String> {
        let mut args = Self::common_args(&self.config, control_path);
        args.extend(
            [
                "-o",
                "PasswordAuthentication=no",
                "-o",
                "KbdInteractiveAuthentication=no",
                "-o",
                "PreferredAuthentications=publickey",
                "-o",
                "IdentitiesOnly=yes",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "-o",
                "ControlMaster=yes",
                "-o",
                "ControlPersist=yes",
                "-i",
            ]
            .map(String::from),
        );
        args.push(self.config.key_path.display().to_string());
        args.push("-N".to_string());
        args.push("-f".to_string());
        args.push(self.destination());
        args
    }

    fn classify_connect_failure(&self, stderr: &str) -> TransportError {
        let message = stderr.trim().to_string();
        if message.contains("Permission denied") || message.contains("no such identity") {
            TransportError::Auth {
                target: self.target(),
                message,
            }
        } else {
            TransportError::Connect {
                target: self.target(),
                message,
            }
        }
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    async fn connect(&self) -> std::result::Result<Box<dyn RemoteSession>, TransportError> {
        tokio::fs::create_dir_all(&self.config.control_dir)
            .await
            .map_err(|e| TransportError::Spawn(format!("control dir {}: {}", self.config.control_dir.display(), e)))?;

        let id = generate_session_id();
        let control_path = self.config.control_dir.join(format!("{}.sock", id));

        log::debug!("Starting ssh master {} for {}", id, self.target());

        // The forked master keeps inherited descriptors open, so stdout is
        // discarded and stderr is only read when the client failed.
        let mut child = Command::new(&self.config.program)
            .args(self.master_args(&control_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        let status = match tokio::time::timeout(self.config.connect_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => return Err(TransportError::Spawn(e.to_string())),
            Err(_) => {
                let _ = child.kill().await;
                return Err(TransportError::Connect {
                    target: self.target(),
                    message: format!("timed out after {}ms", self.config.connect_timeout.as_millis()),
                });
            }
        };

        if !status.success() {
            let mut stderr = String::new();
            if let Some(mut err) = child.stderr.take() {
                let _ = err.read_to_string(&mut stderr).await;
            }
            return Err(self.classify_connect_failure(&stderr));
        }

        log::info!("Remote session {} established to {}", id, self.target());
        Ok(Box::new(SshSession {
            id,
            control_path,
            destination: self.destination(),
            config: self.config.clone(),
            healthy: AtomicBool::new(true),
        }))
    }

    fn target(&self) -> String {
        format!("{}@{}:{}", self.config.user, self.config.host, self.config.port)
    }
}

/// A session multiplexed over one control master
#[derive(Debug)]
pub struct SshSession {
    id: String,
    control_path: PathBuf,
    destination: String,
    config: SshConfig,
    healthy: AtomicBool,
}

impl SshSession {
    fn client_args(&self, command_line: String) -> Vec<String> {
        let mut args = SshTransport::common_args(&self.config, &self.control_path);
        args.push("-o".to_string());
        args.push("ControlMaster=no".to_string());
        args.push("--".to_string());
        args.push(self.destination.clone());
        args.push(command_line);
        args
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(
        &self,
        command: &RemoteCommand,
        timeout: Duration,
        output_limit: usize,
    ) -> std::result::Result<RunOutcome, TransportError> {
        let command_line = command
            .command_line()
            .map_err(|e| TransportError::Channel(e.to_string()))?;
        log::debug!("[{}] remote: {}", self.id, command_line);

        let mut child = Command::new(&self.config.program)
            .args(self.client_args(command_line))
            .stdin(if command.stdin().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        let payload = command.stdin().map(|s| s.as_bytes().to_vec());
        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Feed stdin while draining output so a chatty command cannot stall on a full pipe
        // A write failure means the command exited early; its exit status tells the story
        let writer = async move {
            if let (Some(mut pipe), Some(bytes)) = (stdin, payload) {
                let _ = pipe.write_all(&bytes).await;
                let _ = pipe.shutdown().await;
            }
        };

        let result = tokio::time::timeout(timeout, async {
            let ((), out, err) = tokio::join!(
                writer,
                read_capped(stdout, output_limit),
                read_capped(stderr, output_limit)
            );
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((status, out?, err?))
        })
        .await;

        let (status, stdout, stderr) = match result {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                self.healthy.store(false, Ordering::SeqCst);
                return Err(TransportError::Channel(e.to_string()));
            }
            // Dropping the child kills the local client, which closes the channel
            Err(_) => return Ok(RunOutcome::TimedOut),
        };

        let stdout = String::from_utf8_lossy(&stdout).into_owned();
        let stderr = String::from_utf8_lossy(&stderr).into_owned();

        match status.code() {
            Some(SSH_CLIENT_FAILURE) => {
                self.healthy.store(false, Ordering::SeqCst);
                Err(TransportError::Channel(stderr.trim().to_string()))
            }
            Some(code) => Ok(RunOutcome::Completed(RawOutput::new(code, stdout, stderr))),
            None => {
                self.healthy.store(false, Ordering::SeqCst);
                Err(TransportError::Channel("ssh client terminated by signal".to_string()))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst) && self.control_path.exists()
    }

    async fn close(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        let mut args = SshTransport::common_args(&self.config, &self.control_path);
        args.extend(["-O".to_string(), "exit".to_string(), self.destination.clone()]);

        let mut exit = Command::new(&self.config.program);
        exit.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(CLOSE_TIMEOUT, exit.status()).await {
            Ok(Ok(_)) => log::debug!("Remote session {} closed", self.id),
            Ok(Err(e)) => log::warn!("Failed to close remote session {}: {}", self.id, e),
            Err(_) => log::warn!("Timed out closing remote session {}", self.id),
        }
        let _ = tokio::fs::remove_file(&self.control_path).await;
    }
}

/// Keep at most `limit + 1` bytes of a pipe and discard the remainder
///
/// The extra byte lets the caller tell a full stream from an oversized one.
async fn read_capped<R>(pipe: Option<R>, limit: usize) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(mut pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut kept = Vec::new();
    (&mut pipe).take(limit as u64 + 1).read_to_end(&mut kept).await?;
    tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await?;
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SshConfig {
        SshConfig {
            host: "192.168.10.56".to_string(),
            port: 2222,
            user: "ops".to_string(),
            key_path: PathBuf::from("/keys/id_ed25519"),
            control_dir: PathBuf::from("/tmp/opsgate-test"),
            connect_timeout: Duration::from_secs(15),
            program: PathBuf::from("ssh"),
        }
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    #[test]
    fn test_new_requires_host() {
        let mut cfg = config();
        cfg.host = String::new();
        assert!(matches!(SshTransport::new(cfg), Err(OpsError::Config(_))));
    }

    #[test]
    fn test_from_remote_config() {
        let remote = RemoteConfig {
            host: "example".to_string(),
            connect_timeout_ms: 2_500,
            ..RemoteConfig::default()
        };
        let cfg = SshConfig::from(&remote);
        assert_eq!(cfg.host, "example");
        assert_eq!(cfg.port, 22);
        assert_eq!(cfg.connect_timeout, Duration::from_millis(2_500));
    }

    #[test]
    fn test_master_args_are_key_only() {
        let transport = SshTransport::new(config()).unwrap();
        let args = transport.master_args(Path::new("/tmp/opsgate-test/s1.sock"));

        assert!(has_pair(&args, "-o", "BatchMode=yes"));
        assert!(has_pair(&args, "-o", "PasswordAuthentication=no"));
        assert!(has_pair(&args, "-o", "KbdInteractiveAuthentication=no"));
        assert!(has_pair(&args, "-o", "PreferredAuthentications=publickey"));
        assert!(has_pair(&args, "-o", "ControlMaster=yes"));
        assert!(has_pair(&args, "-o", "ControlPath=/tmp/opsgate-test/s1.sock"));
        assert!(has_pair(&args, "-i", "/keys/id_ed25519"));
        assert!(has_pair(&args, "-p", "2222"));
        assert!(args.contains(&"-N".to_string()));
        assert_eq!(args.last().unwrap(), "ops@192.168.10.56");
    }

    #[test]
    fn test_client_args_end_with_single_command_line() {
        let session = SshSession {
            id: "s1".to_string(),
            control_path: PathBuf::from("/tmp/opsgate-test/s1.sock"),
            destination: "ops@192.168.10.56".to_string(),
            config: config(),
            healthy: AtomicBool::new(true),
        };
        let args = session.client_args("cat -- '/ws/a b'".to_string());
        let n = args.len();
        assert_eq!(args[n - 3], "--");
        assert_eq!(args[n - 2], "ops@192.168.10.56");
        assert_eq!(args[n - 1], "cat -- '/ws/a b'");
        assert!(has_pair(&args, "-o", "ControlMaster=no"));
    }

    #[test]
    fn test_classify_connect_failure() {
        let transport = SshTransport::new(config()).unwrap();
        let auth = transport.classify_connect_failure("ops@192.168.10.56: Permission denied (publickey).");
        assert!(matches!(auth, TransportError::Auth { .. }));

        let refused = transport.classify_connect_failure("ssh: connect to host 192.168.10.56 port 2222: Connection refused");
        assert!(matches!(refused, TransportError::Connect { .. }));
    }

    /// A stand-in `ssh` that ignores its arguments and runs `body`
    #[cfg(unix)]
    fn fake_ssh(dir: &Path, body: &str) -> SshSession {
        use std::os::unix::fs::PermissionsExt;

        let program = dir.join("fake-ssh");
        std::fs::write(&program, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut cfg = config();
        cfg.program = program;
        cfg.control_dir = dir.to_path_buf();
        SshSession {
            id: "s1".to_string(),
            control_path: dir.join("s1.sock"),
            destination: "ops@192.168.10.56".to_string(),
            config: cfg,
            healthy: AtomicBool::new(true),
        }
    }

    fn cat_file() -> RemoteCommand {
        let mut args = std::collections::BTreeMap::new();
        args.insert("path".to_string(), crate::tools::ArgValue::Path("/ws/big.log".to_string()));
        crate::tools::CommandTemplate::program("cat")
            .literal("--")
            .arg("path")
            .render(&args, "/ws")
            .unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_keeps_only_limit_plus_one_byte() {
        let dir = tempfile::tempdir().unwrap();
        // 8 MiB on stdout, a little on stderr
        let session = fake_ssh(dir.path(), "head -c 8388608 /dev/zero | tr '\\000' y\necho done >&2");

        let outcome = session.run(&cat_file(), Duration::from_secs(30), 1024).await.unwrap();
        let RunOutcome::Completed(raw) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert_eq!(raw.exit_code, 0);
        assert_eq!(raw.stdout.len(), 1025);
        assert!(raw.stdout.chars().all(|c| c == 'y'));
        assert_eq!(raw.stderr, "done\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_client_failure_is_channel_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = fake_ssh(dir.path(), "echo 'mux_client: master hung up' >&2\nexit 255");

        let err = session.run(&cat_file(), Duration::from_secs(10), 1024).await.unwrap_err();
        assert!(matches!(err, TransportError::Channel(ref m) if m.contains("master hung up")));
        assert!(!session.healthy.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config();
        cfg.control_dir = dir.path().to_path_buf();
        cfg.program = PathBuf::from("/nonexistent/opsgate-ssh");
        let transport = SshTransport::new(cfg).unwrap();

        let err = transport.connect().await.err().unwrap();
        assert!(matches!(err, TransportError::Spawn(_)));
    }
}
