//! File Transfer Agents
//!
//! Capability for moving files to and from an ODFI: list the inbound and
//! return directories, upload into the outbound directory, delete processed
//! remote files. Backends: FTP (passive mode), SFTP (password or key auth),
//! and the local filesystem for development.
//!
//! Agents are used sequentially from within one tick; none of them is
//! required to support concurrent calls.

pub mod ftp;
pub mod local;
pub mod sftp;

pub use ftp::FtpAgent;
pub use local::LocalAgent;
pub use sftp::SftpAgent;

use std::io::Read;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Connect to {0} failed: {1}")]
    Connect(String, String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Host key mismatch for {0}")]
    HostKeyMismatch(String),

    #[error("FTP error: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A file fetched from (or headed to) a remote server.
pub struct File {
    pub filename: String,
    pub contents: Box<dyn Read + Send>,
}

impl File {
    pub fn new(filename: impl Into<String>, contents: Box<dyn Read + Send>) -> Self {
        Self {
            filename: filename.into(),
            contents,
        }
    }

    pub fn from_bytes(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(filename, Box::new(std::io::Cursor::new(bytes)))
    }
}

/// Two-way file transfer with one ODFI.
///
/// `upload_file` must fully consume the file's reader before returning;
/// callers close the underlying descriptor as soon as the call ends.
pub trait FileTransferAgent: Send {
    fn get_inbound_files(&mut self) -> Result<Vec<File>, AgentError>;
    fn get_return_files(&mut self) -> Result<Vec<File>, AgentError>;
    fn upload_file(&mut self, file: File) -> Result<(), AgentError>;
    fn delete(&mut self, path: &str) -> Result<(), AgentError>;
    fn inbound_path(&self) -> &str;
    fn outbound_path(&self) -> &str;
    fn return_path(&self) -> &str;
    fn close(&mut self) -> Result<(), AgentError>;
}
