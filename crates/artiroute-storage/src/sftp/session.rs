//! Blocking SFTP sessions.
//!
//! A session is opened per operation and closed when it finishes. The ssh2
//! implementation lives behind the `transfer-ssh2` feature; tests plug in
//! their own [`RemoteSessionFactory`].

use std::path::Path;

use super::server::ServerConfig;
use crate::error::StorageResult;

/// One authenticated SFTP session. All calls block.
pub trait RemoteSession: Send {
    /// Copy a local file to `remote_path`, creating remote parent directories.
    fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> StorageResult<u64>;

    /// Copy `remote_path` into an already-creatable `local_path`.
    fn download_file(&mut self, remote_path: &str, local_path: &Path) -> StorageResult<u64>;

    /// `Ok(false)` only when the server reports no such file.
    fn file_exists(&mut self, remote_path: &str) -> StorageResult<bool>;

    fn close(self: Box<Self>) -> StorageResult<()>;
}

pub trait RemoteSessionFactory: Send + Sync {
    fn open(&self, server: &ServerConfig) -> StorageResult<Box<dyn RemoteSession>>;
}

#[cfg(feature = "transfer-ssh2")]
pub use self::ssh2_impl::{Ssh2Session, Ssh2SessionFactory};

#[cfg(feature = "transfer-ssh2")]
mod ssh2_impl {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::net::{TcpStream, ToSocketAddrs};
    use std::path::Path;

    use ssh2::{ErrorCode, Session, Sftp};

    use super::{RemoteSession, RemoteSessionFactory};
    use crate::error::{StorageError, StorageResult};
    use crate::paths::remote_parent;
    use crate::sftp::server::ServerConfig;

    const SFTP_NO_SUCH_FILE: i32 = 2;
    const COPY_BUFFER_SIZE: usize = 64 * 1024;

    fn is_no_such_file(err: &ssh2::Error) -> bool {
        matches!(err.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
    }

    /// Side of a stream copy that failed.
    #[derive(Debug)]
    pub(super) enum CopyError {
        Read(io::Error),
        Write(io::Error),
    }

    /// Copy until EOF and flush the writer.
    pub(super) fn copy_stream<R: Read, W: Write>(
        reader: &mut R,
        writer: &mut W,
    ) -> Result<u64, CopyError> {
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];
        let mut total = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CopyError::Read(e)),
            };
            writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
            total += n as u64;
        }
        writer.flush().map_err(CopyError::Write)?;
        Ok(total)
    }

    /// Opens sessions with public key authentication.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct Ssh2SessionFactory;

    impl RemoteSessionFactory for Ssh2SessionFactory {
        fn open(&self, server: &ServerConfig) -> StorageResult<Box<dyn RemoteSession>> {
            Ok(Box::new(Ssh2Session::connect(server)?))
        }
    }

    pub struct Ssh2Session {
        server: String,
        session: Session,
        sftp: Sftp,
    }

    impl Ssh2Session {
        pub fn connect(server: &ServerConfig) -> StorageResult<Self> {
            let ssh_error = |message: String| StorageError::Ssh {
                server: server.name.clone(),
                message,
            };

            let port = u16::try_from(server.port)
                .map_err(|_| ssh_error(format!("port {} out of range", server.port)))?;
            let addr = (server.host.as_str(), port)
                .to_socket_addrs()
                .map_err(|e| ssh_error(format!("resolve {}: {}", server.address(), e)))?
                .next()
                .ok_or_else(|| ssh_error(format!("no address for {}", server.address())))?;

            let tcp = TcpStream::connect_timeout(&addr, server.timeout)
                .map_err(|e| ssh_error(format!("connect {}: {}", server.address(), e)))?;

            let mut session =
                Session::new().map_err(|e| ssh_error(format!("session init: {}", e)))?;
            session.set_tcp_stream(tcp);
            session.set_timeout(u32::try_from(server.timeout.as_millis()).unwrap_or(u32::MAX));
            session
                .handshake()
                .map_err(|e| ssh_error(format!("handshake: {}", e)))?;
            session
                .userauth_pubkey_file(&server.user, None, Path::new(&server.private_key_path), None)
                .map_err(|e| ssh_error(format!("auth as {}: {}", server.user, e)))?;
            if !session.authenticated() {
                return Err(ssh_error(format!("auth as {} rejected", server.user)));
            }

            let sftp = session
                .sftp()
                .map_err(|e| ssh_error(format!("sftp subsystem: {}", e)))?;

            tracing::debug!(
                server_name = %server.name,
                address = %server.address(),
                user = %server.user,
                "SFTP session opened"
            );

            Ok(Self {
                server: server.name.clone(),
                session,
                sftp,
            })
        }

        fn sftp_error(&self, operation: &'static str, path: &str, message: impl ToString) -> StorageError {
            StorageError::Sftp {
                server: self.server.clone(),
                operation,
                path: path.to_string(),
                message: message.to_string(),
            }
        }

        /// `mkdir -p` by walking each path prefix.
        fn make_dirs(&self, dir: &str) -> StorageResult<()> {
            let mut current = String::new();
            for segment in dir.split('/').filter(|s| !s.is_empty()) {
                current.push('/');
                current.push_str(segment);
                let path = Path::new(&current);
                match self.sftp.stat(path) {
                    Ok(stat) if stat.is_dir() => continue,
                    Ok(_) => {
                        return Err(self.sftp_error("mkdir", &current, "exists and is not a directory"))
                    }
                    Err(e) if is_no_such_file(&e) => {}
                    Err(e) => return Err(self.sftp_error("stat", &current, e)),
                }
                if let Err(e) = self.sftp.mkdir(path, 0o755) {
                    // Lost a race with another writer.
                    if !self.sftp.stat(path).map(|s| s.is_dir()).unwrap_or(false) {
                        return Err(self.sftp_error("mkdir", &current, e));
                    }
                }
            }
            Ok(())
        }
    }

    impl RemoteSession for Ssh2Session {
        fn upload_file(&mut self, local_path: &Path, remote_path: &str) -> StorageResult<u64> {
            let mut local = File::open(local_path).map_err(|e| {
                StorageError::io(format!("opening {}", local_path.display()), e)
            })?;
            if let Some(parent) = remote_parent(remote_path) {
                self.make_dirs(parent)?;
            }
            let mut remote = self
                .sftp
                .create(Path::new(remote_path))
                .map_err(|e| self.sftp_error("create", remote_path, e))?;
            let bytes = copy_stream(&mut local, &mut remote).map_err(|e| match e {
                CopyError::Read(e) => StorageError::io(format!("reading {}", local_path.display()), e),
                CopyError::Write(e) => self.sftp_error("write", remote_path, e),
            })?;
            remote
                .close()
                .map_err(|e| self.sftp_error("close", remote_path, e))?;
            Ok(bytes)
        }

        fn download_file(&mut self, remote_path: &str, local_path: &Path) -> StorageResult<u64> {
            let mut remote = self
                .sftp
                .open(Path::new(remote_path))
                .map_err(|e| self.sftp_error("open", remote_path, e))?;
            let mut local = File::create(local_path).map_err(|e| {
                StorageError::io(format!("creating {}", local_path.display()), e)
            })?;
            let bytes = copy_stream(&mut remote, &mut local).map_err(|e| match e {
                CopyError::Read(e) => self.sftp_error("read", remote_path, e),
                CopyError::Write(e) => StorageError::io(format!("writing {}", local_path.display()), e),
            })?;
            remote
                .close()
                .map_err(|e| self.sftp_error("close", remote_path, e))?;
            local
                .sync_all()
                .map_err(|e| StorageError::io(format!("syncing {}", local_path.display()), e))?;
            Ok(bytes)
        }

        fn file_exists(&mut self, remote_path: &str) -> StorageResult<bool> {
            match self.sftp.stat(Path::new(remote_path)) {
                Ok(_) => Ok(true),
                Err(e) if is_no_such_file(&e) => Ok(false),
                Err(e) => Err(self.sftp_error("stat", remote_path, e)),
            }
        }

        fn close(self: Box<Self>) -> StorageResult<()> {
            let Ssh2Session { server, session, sftp } = *self;
            drop(sftp);
            session
                .disconnect(None, "transfer complete", None)
                .map_err(|e| StorageError::Ssh {
                    server,
                    message: format!("disconnect: {}", e),
                })
        }
    }

}
