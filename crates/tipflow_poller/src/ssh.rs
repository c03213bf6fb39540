//! K1. SFTP puller. Ported from
//! `original_source/sftp_download_tips.py` (paramiko connect/list/download),
//! re-expressed over `russh`/`russh-sftp` with an async connection honoured
//! by the pipeline's cooperative shutdown flag.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use russh::client;
use russh_keys::key::PublicKey;
use russh_sftp::client::SftpSession;
use tipflow_config::SftpConfig;

use crate::error::{PollerError, Result};

struct HostKeyCheck {
    expected_fingerprint: Option<String>,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        match &self.expected_fingerprint {
            Some(expected) => Ok(server_public_key.fingerprint() == *expected),
            // No pinned fingerprint configured: accept on trust. Operators
            // who need strict verification should set
            // `sftp.host_key_fingerprint`.
            None => Ok(true),
        }
    }
}

pub struct RemoteFile {
    pub name: String,
    pub modified: std::time::SystemTime,
}

pub struct SftpPuller {
    session: SftpSession,
    remote_dir: String,
}

impl SftpPuller {
    pub async fn connect(config: &SftpConfig) -> Result<Self> {
        if !config.enabled {
            return Err(PollerError::SftpDisabled);
        }
        let host = config.host.as_deref().ok_or_else(|| PollerError::SftpConnect("missing sftp.host".into()))?;
        let username = config.username.as_deref().ok_or_else(|| PollerError::SftpConnect("missing sftp.username".into()))?;
        let key_path = config
            .private_key_path
            .as_deref()
            .ok_or_else(|| PollerError::SftpConnect("missing sftp.private_key_path".into()))?;

        let key_pair = russh_keys::load_secret_key(key_path, None)
            .map_err(|e| PollerError::SftpConnect(format!("loading private key {key_path}: {e}")))?;

        let handler = HostKeyCheck { expected_fingerprint: config.host_key_fingerprint.clone() };
        let client_config = Arc::new(client::Config {
            connection_timeout: Some(Duration::from_secs(config.connect_timeout_secs.max(1))),
            ..Default::default()
        });

        let mut handle = client::connect(client_config, (host, config.port), handler)
            .await
            .map_err(|e| PollerError::SftpConnect(e.to_string()))?;

        let authenticated = handle
            .authenticate_publickey(username, Arc::new(key_pair))
            .await
            .map_err(|e| PollerError::SftpConnect(e.to_string()))?;
        if !authenticated {
            return Err(PollerError::SftpConnect("public-key authentication rejected".into()));
        }

        let channel = handle.channel_open_session().await.map_err(|e| PollerError::Sftp(e.to_string()))?;
        channel.request_subsystem(true, "sftp").await.map_err(|e| PollerError::Sftp(e.to_string()))?;
        let session = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| PollerError::Sftp(e.to_string()))?;

        Ok(SftpPuller { session, remote_dir: config.remote_dir.clone().unwrap_or_else(|| ".".to_string()) })
    }

    /// Lists `.csv` files in the remote directory, oldest-first by mtime.
    pub async fn list_csv_files(&mut self) -> Result<Vec<RemoteFile>> {
        let entries = self
            .session
            .read_dir(&self.remote_dir)
            .await
            .map_err(|e| PollerError::Sftp(e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let name = entry.file_name();
            if !name.to_lowercase().ends_with(".csv") {
                continue;
            }
            let modified = entry
                .metadata()
                .modified()
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            files.push(RemoteFile { name, modified });
        }
        files.sort_by_key(|f| f.modified);
        Ok(files)
    }

    pub async fn download(&mut self, remote_name: &str, local_dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(local_dir).map_err(|source| PollerError::Io {
            path: local_dir.display().to_string(),
            source,
        })?;
        let remote_path = format!("{}/{}", self.remote_dir.trim_end_matches('/'), remote_name);
        let data = self
            .session
            .read(&remote_path)
            .await
            .map_err(|e| PollerError::Sftp(e.to_string()))?;

        let local_path = local_dir.join(remote_name);
        std::fs::write(&local_path, data).map_err(|source| PollerError::Io {
            path: local_path.display().to_string(),
            source,
        })?;
        Ok(local_path)
    }

    /// Deletes every queued remote file, logging (not failing the cycle on)
    /// individual failures.
    pub async fn execute_deletions(&mut self, files: &[String]) -> usize {
        let mut deleted = 0;
        for name in files {
            let remote_path = format!("{}/{}", self.remote_dir.trim_end_matches('/'), name);
            match self.session.remove_file(&remote_path).await {
                Ok(()) => deleted += 1,
                Err(e) => tracing::error!(file = %name, error = %e, "failed to delete remote file after archiving"),
            }
        }
        deleted
    }

    pub async fn close(self) -> Result<()> {
        self.session.close().await.map_err(|e| PollerError::Sftp(e.to_string()))
    }
}
