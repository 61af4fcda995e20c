use std::fmt::Debug;
use std::hash::Hash;
use std::net::Shutdown;
use tracing::trace;

/// OS-level handle of a socket (file descriptor on unix, SOCKET on windows)
#[cfg(unix)]
pub type RawDescriptor = std::os::fd::RawFd;
#[cfg(windows)]
pub type RawDescriptor = std::os::windows::io::RawSocket;

#[cfg(unix)]
fn raw_descriptor<T: std::os::fd::AsRawFd>(socket: &T) -> RawDescriptor {
    socket.as_raw_fd()
}

#[cfg(windows)]
fn raw_descriptor<T: std::os::windows::io::AsRawSocket>(socket: &T) -> RawDescriptor {
    socket.as_raw_socket()
}

/// A connection the pool can hold on to.
///
/// The pool never reads or writes the socket. It only needs a descriptor that
/// stays stable while the socket is pooled, and a way to get rid of it.
pub trait PoolSocket: Send + 'static {
    type Descriptor: Copy + Eq + Hash + Debug + Send + 'static;

    /// Stable identifier of the underlying connection
    fn descriptor(&self) -> Self::Descriptor;

    /// Close the connection. Failures are swallowed, callers cannot act on them.
    fn close(self);
}

impl PoolSocket for std::net::TcpStream {
    type Descriptor = RawDescriptor;

    fn descriptor(&self) -> RawDescriptor {
        raw_descriptor(self)
    }

    fn close(self) {
        if let Err(e) = self.shutdown(Shutdown::Both) {
            trace!("Ignoring shutdown error on close: {}", e);
        }
    }
}

impl PoolSocket for tokio::net::TcpStream {
    type Descriptor = RawDescriptor;

    fn descriptor(&self) -> RawDescriptor {
        raw_descriptor(self)
    }

    fn close(self) {
        match self.into_std() {
            Ok(stream) => stream.close(),
            Err(e) => trace!("Ignoring deregistration error on close: {}", e),
        }
    }
}

/// Client-side TLS sessions are pooled by the descriptor of their transport.
impl<S: PoolSocket> PoolSocket for tokio_rustls::client::TlsStream<S> {
    type Descriptor = S::Descriptor;

    fn descriptor(&self) -> S::Descriptor {
        self.get_ref().0.descriptor()
    }

    fn close(self) {
        let (transport, _session) = self.into_inner();
        transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn std_stream_descriptor_is_stable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (_server, _) = listener.accept().unwrap();

        assert_eq!(client.descriptor(), client.descriptor());
    }

    #[test]
    fn closing_std_stream_signals_eof_to_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        PoolSocket::close(client);

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[tokio::test]
    async fn closing_tokio_stream_signals_eof_to_peer() {
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let fd = client.descriptor();
        assert_eq!(fd, client.descriptor());
        PoolSocket::close(client);

        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);
    }
}
