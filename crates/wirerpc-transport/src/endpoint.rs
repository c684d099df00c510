use std::fmt;
use std::net::SocketAddr;
#[cfg(unix)]
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::codec::CodecConfig;
use crate::error::{Result, TransportError};
use crate::framed::spawn_framed;
use crate::traits::MessageChannel;

/// Where a stream peer lives.
///
/// Parsed from `tcp://host:port`, `unix:///path/to.sock`, a bare socket
/// address (`127.0.0.1:7000`) or a bare path (`/tmp/app.sock`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Tcp(SocketAddr),
    #[cfg(unix)]
    Unix(PathBuf),
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        if let Some(addr) = s.strip_prefix("tcp://") {
            return addr.parse().map(Endpoint::Tcp).map_err(|_| invalid());
        }
        if let Some(path) = s.strip_prefix("unix://") {
            return unix_endpoint(path).ok_or_else(invalid);
        }
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(Endpoint::Tcp(addr));
        }
        if s.contains('/') {
            return unix_endpoint(s).ok_or_else(invalid);
        }
        Err(invalid())
    }
}

#[cfg(unix)]
fn unix_endpoint(path: &str) -> Option<Endpoint> {
    (!path.is_empty()).then(|| Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn unix_endpoint(_path: &str) -> Option<Endpoint> {
    None
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Connect to a listening endpoint and frame the stream.
pub async fn connect(endpoint: &Endpoint, config: CodecConfig) -> Result<MessageChannel> {
    let connect_err = |source| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };

    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr).await.map_err(connect_err)?;
            stream.set_nodelay(true).map_err(connect_err)?;
            debug!(%endpoint, "connected");
            Ok(spawn_framed(stream, config))
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(connect_err)?;
            debug!(%endpoint, "connected");
            Ok(spawn_framed(stream, config))
        }
    }
}

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(unix::UnixSocketListener),
}

/// A bound endpoint accepting framed peers.
pub struct EndpointListener {
    listener: Listener,
    endpoint: Endpoint,
    config: CodecConfig,
}

impl EndpointListener {
    /// Bind and listen.
    ///
    /// For Unix sockets a stale socket file at the path is removed first; any
    /// other kind of file there is an error. The socket file is created with
    /// mode `0o600` and removed again when the listener is dropped.
    pub async fn bind(endpoint: &Endpoint, config: CodecConfig) -> Result<Self> {
        let (listener, endpoint) = match endpoint {
            Endpoint::Tcp(addr) => {
                let listener =
                    TcpListener::bind(addr)
                        .await
                        .map_err(|source| TransportError::Bind {
                            endpoint: endpoint.to_string(),
                            source,
                        })?;
                // Resolve port 0 to the port actually assigned.
                let local = listener
                    .local_addr()
                    .map_err(|source| TransportError::Bind {
                        endpoint: endpoint.to_string(),
                        source,
                    })?;
                (Listener::Tcp(listener), Endpoint::Tcp(local))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => (
                Listener::Unix(unix::UnixSocketListener::bind(path)?),
                endpoint.clone(),
            ),
        };

        info!(%endpoint, "listening");
        Ok(Self {
            listener,
            endpoint,
            config,
        })
    }

    /// The bound endpoint. For TCP this carries the resolved port.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait for the next peer.
    pub async fn accept(&self) -> Result<MessageChannel> {
        match &self.listener {
            Listener::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                stream.set_nodelay(true).map_err(TransportError::Accept)?;
                debug!(%peer, "accepted connection");
                Ok(spawn_framed(stream, self.config.clone()))
            }
            #[cfg(unix)]
            Listener::Unix(listener) => {
                let stream = listener.accept().await?;
                debug!(path = ?listener.path(), "accepted connection");
                Ok(spawn_framed(stream, self.config.clone()))
            }
        }
    }
}

#[cfg(unix)]
mod unix {
    use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};

    use tokio::net::{UnixListener, UnixStream};

    use super::*;

    /// Default permission mode for created socket paths.
    const DEFAULT_SOCKET_MODE: u32 = 0o600;

    /// `sockaddr_un.sun_path` is 108 bytes on Linux, 104 on macOS and the BSDs.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    pub(super) struct UnixSocketListener {
        listener: UnixListener,
        path: PathBuf,
        created_inode: (u64, u64),
    }

    impl UnixSocketListener {
        pub(super) fn bind(path: &Path) -> Result<Self> {
            let bind_err = |source| TransportError::Bind {
                endpoint: path.display().to_string(),
                source,
            };

            let len = path.as_os_str().len();
            if len >= MAX_PATH_LEN {
                return Err(TransportError::PathTooLong {
                    path: path.to_path_buf(),
                    len,
                    max: MAX_PATH_LEN,
                });
            }

            if let Ok(metadata) = std::fs::symlink_metadata(path) {
                if !metadata.file_type().is_socket() {
                    return Err(bind_err(std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    )));
                }
                debug!(?path, "removing stale socket");
                std::fs::remove_file(path).map_err(bind_err)?;
            }

            let listener = UnixListener::bind(path).map_err(bind_err)?;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(DEFAULT_SOCKET_MODE))
                .map_err(bind_err)?;
            let created = std::fs::symlink_metadata(path).map_err(bind_err)?;

            Ok(Self {
                listener,
                path: path.to_path_buf(),
                created_inode: (created.dev(), created.ino()),
            })
        }

        pub(super) async fn accept(&self) -> Result<UnixStream> {
            let (stream, _addr) = self.listener.accept().await.map_err(TransportError::Accept)?;
            Ok(stream)
        }

        pub(super) fn path(&self) -> &Path {
            &self.path
        }
    }

    impl Drop for UnixSocketListener {
        fn drop(&mut self) {
            let Ok(metadata) = std::fs::symlink_metadata(&self.path) else {
                return;
            };
            if metadata.file_type().is_socket()
                && (metadata.dev(), metadata.ino()) == self.created_inode
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(path = ?self.path, "socket path replaced; skipping cleanup");
            }
        }
    }
}
