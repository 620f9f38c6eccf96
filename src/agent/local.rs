//! Local filesystem agent, used by development setups and tests.

use std::fs;
use std::path::{Path, PathBuf};

use super::{AgentError, File, FileTransferAgent};
use crate::repository::FileTransferConfig;

/// Serves the inbound/outbound/return directories from under a local root.
pub struct LocalAgent {
    root: PathBuf,
    conf: FileTransferConfig,
}

impl LocalAgent {
    pub fn new(root: impl Into<PathBuf>, conf: FileTransferConfig) -> Result<Self, AgentError> {
        let root = root.into();
        for sub in [&conf.inbound_path, &conf.outbound_path, &conf.return_path] {
            fs::create_dir_all(root.join(sub))?;
        }
        Ok(Self { root, conf })
    }

    fn read_dir_files(&self, sub: &str) -> Result<Vec<File>, AgentError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(self.root.join(sub))? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let filename = entry.file_name().to_string_lossy().into_owned();
            let bytes = fs::read(entry.path())?;
            out.push(File::from_bytes(filename, bytes));
        }
        Ok(out)
    }
}

impl FileTransferAgent for LocalAgent {
    fn get_inbound_files(&mut self) -> Result<Vec<File>, AgentError> {
        self.read_dir_files(&self.conf.inbound_path)
    }

    fn get_return_files(&mut self) -> Result<Vec<File>, AgentError> {
        self.read_dir_files(&self.conf.return_path)
    }

    fn upload_file(&mut self, mut file: File) -> Result<(), AgentError> {
        let path = self.root.join(&self.conf.outbound_path).join(&file.filename);
        let mut fd = fs::File::create(path)?;
        std::io::copy(&mut file.contents, &mut fd)?;
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<(), AgentError> {
        let target = self.root.join(path.trim_start_matches('/'));
        if target.starts_with(&self.root) && Path::new(&target).exists() {
            fs::remove_file(target)?;
        }
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
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn test_config() -> FileTransferConfig {
        FileTransferConfig {
            routing_number: "121042882".to_string(),
            inbound_path: "inbound/".to_string(),
            outbound_path: "outbound/".to_string(),
            return_path: "return/".to_string(),
            outbound_filename_template: None,
            allowed_ips: None,
            cleanup_local_directory: false,
            keep_remote_files: false,
        }
    }

    #[test]
    fn test_local_agent_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut agent = LocalAgent::new(dir.path(), test_config()).unwrap();

        assert!(agent.get_inbound_files().unwrap().is_empty());

        std::fs::write(dir.path().join("inbound/in.ach"), b"inbound bytes").unwrap();
        std::fs::write(dir.path().join("return/ret.ach"), b"return bytes").unwrap();

        let mut inbound = agent.get_inbound_files().unwrap();
        assert_eq!(inbound.len(), 1);
        assert_eq!(inbound[0].filename, "in.ach");
        let mut bytes = Vec::new();
        inbound[0].contents.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes, b"inbound bytes");

        let returns = agent.get_return_files().unwrap();
        assert_eq!(returns.len(), 1);
        assert_eq!(returns[0].filename, "ret.ach");

        agent
            .upload_file(File::from_bytes("out.ach", b"upload bytes".to_vec()))
            .unwrap();
        let written = std::fs::read(dir.path().join("outbound/out.ach")).unwrap();
        assert_eq!(written, b"upload bytes");

        agent.delete("inbound/in.ach").unwrap();
        assert!(agent.get_inbound_files().unwrap().is_empty());
        // deleting a missing file is a no-op
        agent.delete("inbound/in.ach").unwrap();
    }
}
