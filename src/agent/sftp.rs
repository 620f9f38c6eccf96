//! SFTP agent (ssh2) with password or client-key authentication and
//! optional host public key pinning.

use std::io::Read;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ssh2::Session;
use tracing::debug;

use super::{AgentError, File, FileTransferAgent};
use crate::repository::{FileTransferConfig, SftpConfig};

const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SftpAgent {
    session: Session,
    sftp: ssh2::Sftp,
    conf: FileTransferConfig,
}

impl SftpAgent {
    pub fn connect(cfg: &SftpConfig, conf: FileTransferConfig) -> Result<Self, AgentError> {
        let addr = if cfg.hostname.contains(':') {
            cfg.hostname.clone()
        } else {
            format!("{}:22", cfg.hostname)
        };
        let tcp = TcpStream::connect(&addr)
            .map_err(|e| AgentError::Connect(addr.clone(), e.to_string()))?;
        tcp.set_read_timeout(Some(IO_TIMEOUT))?;
        tcp.set_write_timeout(Some(IO_TIMEOUT))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.set_timeout(IO_TIMEOUT.as_millis() as u32);
        session.handshake()?;

        verify_host_key(&session, cfg)?;

        if let Some(key) = cfg.client_private_key.as_deref().filter(|k| !k.is_empty()) {
            session.userauth_pubkey_memory(&cfg.username, None, key, None)?;
        } else if let Some(password) = cfg.password.as_deref().filter(|p| !p.is_empty()) {
            session.userauth_password(&cfg.username, password)?;
        } else {
            return Err(AgentError::Auth(
                "sftp config has neither a password nor a client private key".to_string(),
            ));
        }
        if !session.authenticated() {
            return Err(AgentError::Auth(format!("sftp auth rejected for {}", addr)));
        }

        let sftp = session.sftp()?;
        debug!(hostname = %cfg.hostname, routing_number = %cfg.routing_number, "sftp connected");
        Ok(Self {
            session,
            sftp,
            conf,
        })
    }

    fn fetch_dir(&mut self, path: &str) -> Result<Vec<File>, AgentError> {
        let entries = self.sftp.readdir(Path::new(path))?;
        let mut out = Vec::new();
        for (remote, stat) in entries {
            if stat.is_dir() {
                continue;
            }
            let filename = match remote.file_name() {
                Some(name) => name.to_string_lossy().into_owned(),
                None => continue,
            };
            let mut fd = self.sftp.open(&remote)?;
            let mut bytes = Vec::new();
            fd.read_to_end(&mut bytes)?;
            out.push(File::from_bytes(filename, bytes));
        }
        Ok(out)
    }
}

/// Compare the session's host key against the pinned value, when one is
/// configured. A blank pin accepts any host key.
fn verify_host_key(session: &Session, cfg: &SftpConfig) -> Result<(), AgentError> {
    let pinned = match cfg.host_public_key.as_deref().filter(|k| !k.is_empty()) {
        Some(p) => p,
        None => return Ok(()),
    };
    let (key, _) = session
        .host_key()
        .ok_or_else(|| AgentError::HostKeyMismatch(cfg.hostname.clone()))?;
    let encoded = BASE64.encode(key);
    // accept either the bare base64 blob or an authorized_keys style
    // "ssh-ed25519 AAAA... comment" line
    if pinned.split_whitespace().any(|field| field == encoded) {
        Ok(())
    } else {
        Err(AgentError::HostKeyMismatch(cfg.hostname.clone()))
    }
}

impl FileTransferAgent for SftpAgent {
    fn get_inbound_files(&mut self) -> Result<Vec<File>, AgentError> {
        let path = self.conf.inbound_path.clone();
        self.fetch_dir(&path)
    }

    fn get_return_files(&mut self) -> Result<Vec<File>, AgentError> {
        let path = self.conf.return_path.clone();
        self.fetch_dir(&path)
    }

    fn upload_file(&mut self, mut file: File) -> Result<(), AgentError> {
        let remote = format!("{}{}", self.conf.outbound_path, file.filename);
        let mut fd = self.sftp.create(Path::new(&remote))?;
        std::io::copy(&mut file.contents, &mut fd)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), AgentError> {
        self.sftp.unlink(Path::new(path))?;
        Ok(())
    }

    fn inbound_path(&self) -> &str {
        &self.conf.inbound_path
    }

    fn outbound_path(&self) -> &str {
        &self.conf.outbound_path
    }

    fn return_path(&self) -> &str {
        &self.conf.return_path
    }

    fn close(&mut self) -> Result<(), AgentError> {
        self.session.disconnect(None, "session complete", None)?;
        Ok(())
    }
}
