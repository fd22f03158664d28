//! The per-connection byte-level socket wrapper (C3): plaintext or TLS, behind one
//! enum so every layer above (parser, writer, proxies, tunnels) is transport-agnostic.

use socket2::SockRef;
use std::{
    io,
    net::{Shutdown, SocketAddr},
    pin::Pin,
    task::{Context, Poll},
};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf},
    net::TcpStream,
};
use tokio_rustls::server::TlsStream;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// One accepted connection's transport, plaintext or behind a completed TLS handshake.
///
/// Implements [`AsyncRead`]/[`AsyncWrite`] by forwarding to whichever variant is
/// live, so the request parser, response writer and tunnel splice never need to
/// know which one they're holding.
pub enum ConnectionSocket {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ConnectionSocket {
    /// Wraps a freshly accepted `TcpStream`, applying the listener's TCP tuning:
    /// `NODELAY` off (Nagle stays on until [`flush`](Self::flush) asks for TTFB),
    /// platform `CORK`/`NOPUSH` on where the OS exposes it.
    pub fn new_plain(stream: TcpStream) -> io::Result<Self> {
        let sock = SockRef::from(&stream);
        sock.set_nodelay(false)?;
        apply_cork(&sock, true);
        Ok(Self::Plain(stream))
    }

    pub fn new_tls(stream: TlsStream<TcpStream>) -> Self {
        Self::Tls(Box::new(stream))
    }

    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Plain(s) => s.peer_addr(),
            Self::Tls(s) => s.get_ref().0.peer_addr(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        match self {
            Self::Plain(s) => s.local_addr(),
            Self::Tls(s) => s.get_ref().0.local_addr(),
        }
    }

    /// Reads up to `buf.len()` bytes. A zero-length read means the peer closed its
    /// write half (`GracefulDisconnect`, mapped by the caller from `Ok(0)`).
    pub async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(s) => s.read(buf).await,
            Self::Tls(s) => s.read(buf).await,
        }
    }

    /// Writes the full buffer, looping over any partial writes.
    pub async fn send_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Self::Plain(s) => s.write_all(buf).await,
            Self::Tls(s) => s.write_all(buf).await,
        }
    }

    /// Sends `len` bytes from `file` (already positioned at the desired offset).
    ///
    /// Zero-copy via `sendfile(2)` for a plaintext socket on unix; everywhere else
    /// (TLS can't see through its own encryption, non-unix has no equivalent
    /// syscall this crate binds) falls back to a read-and-send loop.
    pub async fn send_file(&mut self, file: &mut File, len: u64) -> io::Result<u64> {
        #[cfg(unix)]
        if let Self::Plain(stream) = self {
            return sendfile_unix(stream, file, len).await;
        }

        send_file_fallback(self, file, len).await
    }

    /// Forces the kernel to flush the current send queue: toggle `NODELAY` on then
    /// off. A time-to-first-byte optimization distinct from `AsyncWriteExt::flush`,
    /// which only drains this process's userspace buffers.
    pub fn cork_flush(&self) -> io::Result<()> {
        let Self::Plain(stream) = self else {
            return Ok(());
        };
        let sock = SockRef::from(stream);
        sock.set_nodelay(true)?;
        sock.set_nodelay(false)?;
        Ok(())
    }

    /// Half-closes the read direction (unblocks a peer stuck reading on some
    /// kernels), then fully closes. TLS streams send `close_notify` instead, since
    /// a raw half-close would desynchronize the record layer.
    pub async fn close(&mut self) {
        match self {
            Self::Plain(stream) => {
                let _ = SockRef::from(&*stream).shutdown(Shutdown::Read);
                let _ = stream.shutdown().await;
            }
            Self::Tls(stream) => {
                let _ = stream.shutdown().await;
            }
        }
    }
}

impl AsyncRead for ConnectionSocket {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for ConnectionSocket {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

#[cfg(target_os = "linux")]
fn apply_cork(sock: &SockRef<'_>, on: bool) {
    use std::os::unix::io::AsRawFd;
    let fd = sock.as_raw_fd();
    let value: libc::c_int = on as libc::c_int;
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_CORK,
            &value as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_cork(_sock: &SockRef<'_>, _on: bool) {}

/// `sendfile(2)` shares the underlying open-file-description's offset with any
/// ordinary `read`, so a caller that falls back mid-transfer (unsupported fd type,
/// `EINVAL`) can keep reading from `file` without separately tracking position.
#[cfg(unix)]
async fn sendfile_unix(stream: &mut TcpStream, file: &mut File, len: u64) -> io::Result<u64> {
    let in_fd = file.as_raw_fd();
    let mut remaining = len;
    let mut sent = 0u64;

    loop {
        if remaining == 0 {
            return Ok(sent);
        }

        stream.writable().await?;

        let chunk = remaining.min(1 << 20) as usize;
        let result = stream.try_io(tokio::io::Interest::WRITABLE, || {
            let out_fd = stream.as_raw_fd();
            let rc = unsafe { libc::sendfile(out_fd, in_fd, std::ptr::null_mut(), chunk) };
            if rc < 0 {
                Err(io::Error::last_os_error())
            } else {
                Ok(rc as usize)
            }
        });

        match result {
            Ok(0) => return Ok(sent),
            Ok(n) => {
                sent += n as u64;
                remaining -= n as u64;
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(ref e) if is_unsupported(e) => {
                let rest = send_file_fallback_raw(stream, file, remaining).await?;
                return Ok(sent + rest);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(unix)]
fn is_unsupported(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::EINVAL) | Some(libc::ENOSYS) | Some(libc::EOPNOTSUPP)
    )
}

async fn send_file_fallback_raw(stream: &mut TcpStream, file: &mut File, len: u64) -> io::Result<u64> {
    let mut remaining = len;
    let mut buf = vec![0u8; 64 * 1024];
    let mut sent = 0u64;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = file.read(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        stream.write_all(&buf[..read]).await?;
        sent += read as u64;
        remaining -= read as u64;
    }

    Ok(sent)
}

async fn send_file_fallback(socket: &mut ConnectionSocket, file: &mut File, len: u64) -> io::Result<u64> {
    let mut remaining = len;
    let mut buf = vec![0u8; 64 * 1024];
    let mut sent = 0u64;

    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let read = file.read(&mut buf[..want]).await?;
        if read == 0 {
            break;
        }
        socket.send_all(&buf[..read]).await?;
        sent += read as u64;
        remaining -= read as u64;
    }

    Ok(sent)
}
