//! Single-use local socket rsync's remote shell dials into.
//!
//! On Linux the endpoint lives in the abstract namespace (`@treesync/<uuid>`)
//! and leaves nothing on disk. Other unix platforms get a socket file inside a
//! private 0700 temporary directory that is removed with the listener.

use std::io;

use tokio::net::{UnixListener, UnixStream};
use uuid::Uuid;

use crate::errors::{Result, TransferError};

/// `sizeof(sockaddr_un.sun_path)` on Linux.
pub const ABSTRACT_UNIX_SOCK_LEN: usize = 108;

const ENDPOINT_PREFIX: &str = "@treesync/";

/// Listening endpoint that hands out exactly one connection.
///
/// [`accept`](Self::accept) consumes the listener, so the socket is closed
/// as soon as the connection is taken; dropping it (accept timed out, setup
/// failed) closes it too.
pub struct RendezvousListener {
    name: String,
    listener: UnixListener,
    #[cfg(not(target_os = "linux"))]
    _dir: tempfile::TempDir,
}

impl RendezvousListener {
    /// Bind a fresh endpoint under a generated unique name.
    pub fn bind() -> Result<Self> {
        Self::bind_named(endpoint_name(&Uuid::new_v4().to_string()))
    }

    #[cfg(target_os = "linux")]
    fn bind_named(name: String) -> Result<Self> {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::{SocketAddr, UnixListener as StdUnixListener};

        let bind = || -> io::Result<UnixListener> {
            let addr = SocketAddr::from_abstract_name(abstract_bytes(&name))?;
            let listener = StdUnixListener::bind_addr(&addr)?;
            listener.set_nonblocking(true)?;
            UnixListener::from_std(listener)
        };
        let listener =
            bind().map_err(|err| TransferError::io(format!("listening on {name}"), err))?;
        Ok(Self { name, listener })
    }

    #[cfg(not(target_os = "linux"))]
    fn bind_named(_name: String) -> Result<Self> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::Builder::new()
            .prefix("treesync-")
            .tempdir()
            .map_err(|err| TransferError::io("creating rendezvous directory", err))?;
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o700))
            .map_err(|err| TransferError::io("restricting rendezvous directory", err))?;
        let path = dir.path().join("rendezvous.sock");
        let name = path.to_string_lossy().into_owned();
        let listener = UnixListener::bind(&path)
            .map_err(|err| TransferError::io(format!("listening on {name}"), err))?;
        Ok(Self {
            name,
            listener,
            _dir: dir,
        })
    }

    /// Address the netcat helper should connect to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Take the single connection and release the endpoint.
    pub async fn accept(self) -> io::Result<UnixStream> {
        let (stream, _) = self.listener.accept().await?;
        log::debug!("rendezvous {} connected", self.name);
        Ok(stream)
    }
}

/// Build an endpoint name, clipped to what the kernel accepts for an
/// abstract address (the leading NUL takes one byte of `sun_path`).
pub(crate) fn endpoint_name(id: &str) -> String {
    let mut name = format!("{ENDPOINT_PREFIX}{id}");
    if name.len() > ABSTRACT_UNIX_SOCK_LEN - 1 {
        let mut end = ABSTRACT_UNIX_SOCK_LEN - 1;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }
    name
}

#[cfg(target_os = "linux")]
fn abstract_bytes(name: &str) -> &[u8] {
    name.strip_prefix('@').unwrap_or(name).as_bytes()
}

/// Connect to an endpoint produced by [`RendezvousListener::name`]. A leading
/// `@` selects the abstract namespace; anything else is a filesystem path.
pub async fn connect(endpoint: &str) -> io::Result<UnixStream> {
    if endpoint.starts_with('@') {
        connect_abstract(endpoint)
    } else {
        UnixStream::connect(endpoint).await
    }
}

#[cfg(target_os = "linux")]
fn connect_abstract(endpoint: &str) -> io::Result<UnixStream> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::{SocketAddr, UnixStream as StdUnixStream};

    let addr = SocketAddr::from_abstract_name(abstract_bytes(endpoint))?;
    let stream = StdUnixStream::connect_addr(&addr)?;
    stream.set_nonblocking(true)?;
    UnixStream::from_std(stream)
}

#[cfg(not(target_os = "linux"))]
fn connect_abstract(endpoint: &str) -> io::Result<UnixStream> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("abstract socket {endpoint} is not supported on this platform"),
    ))
}
