//! Generic TCP framing used by all line/message oriented servers in this
//! workspace (the stratum listener, and any future admin/API listener).
//!
//! A protocol implementation picks a wire-level [`Codec`](tokio_util::codec)
//! and describes it with a [`Framing`] marker type; `ii-wire` supplies the
//! plumbing to bind a [`Server`] and exchange framed messages over each
//! accepted [`Connection`].

use ii_async_compat::{futures, tokio, tokio_util};

use futures::{Sink, Stream};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder, Framed};

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Binds together the wire types for one protocol: what goes out (`Tx`),
/// what comes in (`Rx`), the error type shared by encoder and decoder, and
/// the `Codec` that translates between bytes and those types.
pub trait Framing {
    type Tx;
    type Rx;
    type Error: std::error::Error + From<io::Error>;
    type Codec: Decoder<Item = Self::Rx, Error = Self::Error>
        + Encoder<Self::Tx, Error = Self::Error>
        + Default
        + Unpin;
}

/// One accepted, framed TCP connection.
pub struct Connection<F: Framing> {
    framed: Framed<TcpStream, F::Codec>,
    peer_addr: SocketAddr,
}

impl<F: Framing> Connection<F> {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            framed: Framed::new(stream, F::Codec::default()),
            peer_addr,
        })
    }

    /// `(ip, port)` captured at accept time.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn set_keepalive(&self, keepalive: bool) -> io::Result<()> {
        // TcpStream keepalive knobs live behind socket2 on recent tokio; a
        // plain on/off toggle is all the stratum listener needs.
        let sock_ref = socket2::SockRef::from(self.framed.get_ref());
        sock_ref.set_keepalive(keepalive)
    }
}

impl<F: Framing> Stream for Connection<F> {
    type Item = Result<F::Rx, F::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.framed).poll_next(cx)
    }
}

impl<F: Framing> Sink<F::Tx> for Connection<F> {
    type Error = F::Error;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        Pin::new(&mut this.framed).poll_ready(cx)
    }

    fn start_send(self: Pin<&mut Self>, item: F::Tx) -> Result<(), Self::Error> {
        let this = self.get_mut();
        Pin::new(&mut this.framed).start_send(item)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        Pin::new(&mut this.framed).poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        Pin::new(&mut this.framed).poll_close(cx)
    }
}

/// A bound TCP listener that yields [`Connection`]s.
pub struct Server<F: Framing> {
    listener: TcpListener,
    _framing: std::marker::PhantomData<fn() -> F>,
}

impl<F: Framing> Server<F> {
    pub async fn bind(addr: &SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            _framing: std::marker::PhantomData,
        })
    }

    /// Accept a single connection. Most callers drive this in a loop via
    /// the `Stream` impl below instead.
    pub async fn accept(&self) -> io::Result<Connection<F>> {
        let (stream, _peer) = self.listener.accept().await?;
        Connection::new(stream)
    }
}

impl<F: Framing> Stream for Server<F> {
    type Item = io::Result<Connection<F>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.listener.poll_accept(cx) {
            Poll::Ready(Ok((stream, _peer))) => Poll::Ready(Some(Connection::new(stream))),
            Poll::Ready(Err(err)) => Poll::Ready(Some(Err(err))),
            Poll::Pending => Poll::Pending,
        }
    }
}
