//! FTP agent (passive mode, plain authentication).

use std::time::Duration;

use suppaftp::{FtpStream, Mode};
use tracing::debug;

use super::{AgentError, File, FileTransferAgent};
use crate::repository::{FileTransferConfig, FtpConfig};

const IO_TIMEOUT: Duration = Duration::from_secs(30);

pub struct FtpAgent {
    stream: FtpStream,
    conf: FileTransferConfig,
}

impl FtpAgent {
    pub fn connect(ftp: &FtpConfig, conf: FileTransferConfig) -> Result<Self, AgentError> {
        let addr = if ftp.hostname.contains(':') {
            ftp.hostname.clone()
        } else {
            format!("{}:21", ftp.hostname)
        };
        let mut stream = FtpStream::connect(&addr)
            .map_err(|e| AgentError::Connect(addr.clone(), e.to_string()))?;
        stream.get_ref().set_read_timeout(Some(IO_TIMEOUT))?;
        stream.get_ref().set_write_timeout(Some(IO_TIMEOUT))?;
        stream
            .login(&ftp.username, &ftp.password)
            .map_err(|e| AgentError::Auth(e.to_string()))?;
        stream.set_mode(Mode::Passive);
        debug!(hostname = %ftp.hostname, routing_number = %ftp.routing_number, "ftp connected");
        Ok(Self { stream, conf })
    }

    fn fetch_dir(&mut self, path: &str) -> Result<Vec<File>, AgentError> {
        let names = self.stream.nlst(Some(path))?;
        let mut out = Vec::new();
        for name in names {
            let filename = name.rsplit('/').next().unwrap_or(name.as_str());
            if filename.is_empty() || filename == "." || filename == ".." {
                continue;
            }
            let remote = format!("{}{}", path, filename);
            let buffer = self.stream.retr_as_buffer(&remote)?;
            out.push(File::from_bytes(filename, buffer.into_inner()));
        }
        Ok(out)
    }
}

impl FileTransferAgent for FtpAgent {
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
        self.stream.put_file(&remote, &mut file.contents)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), AgentError> {
        self.stream.rm(path)?;
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
        self.stream.quit()?;
        Ok(())
    }
}
