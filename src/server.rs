//! Serving WebSocket sessions over monoio TCP connections.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::BytesMut;
use log::{debug, info, trace, warn};
use monoio::{
    io::{AsyncReadRent, AsyncWriteRent, AsyncWriteRentExt},
    net::TcpListener,
};
use monoio_codec::Encoder;

use crate::{
    error::{Error, Result},
    protocol::frame::{Frame, FrameEncoder},
    registry::{ConnectionId, Registry},
    session::{Session, SessionConfig},
};

/// The configuration for [`serve`].
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct ServerConfig {
    /// The size of a single read from a connection.
    ///
    /// The default value is 4 KiB.
    pub read_chunk_size: usize,
    /// Period of the registry sweep. `None` disables it.
    ///
    /// The sweep uses monoio timers, so the runtime must be built with the timer enabled
    /// when this is set. The default value is `None`.
    pub tick_interval: Option<Duration>,
    /// Configuration of every session.
    pub session: SessionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 4 * 1024,
            tick_interval: None,
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Sets [`Self::read_chunk_size`].
    pub fn read_chunk_size(mut self, read_chunk_size: usize) -> Self {
        self.read_chunk_size = read_chunk_size;
        self
    }

    /// Sets [`Self::tick_interval`].
    pub fn tick_interval(mut self, tick_interval: Option<Duration>) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    /// Sets [`Self::session`].
    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }
}

/// The frame handler trait.
///
/// The handler is called for every frame decoded on an upgraded connection, control frames
/// included. Returning a frame writes it back to the same peer. Each connection gets its own
/// clone of the handler.
pub trait FrameHandler: Clone + 'static {
    /// Called with every decoded frame, in wire order.
    fn on_frame(&mut self, id: ConnectionId, frame: Frame) -> Option<Frame>;
}

impl<F> FrameHandler for F
where
    F: FnMut(ConnectionId, Frame) -> Option<Frame> + Clone + 'static,
{
    fn on_frame(&mut self, id: ConnectionId, frame: Frame) -> Option<Frame> {
        self(id, frame)
    }
}

/// Accepts connections from `listener` forever, serving each one on its own task.
///
/// Returns only if accepting fails.
pub async fn serve<H>(
    listener: TcpListener,
    registry: Arc<Registry>,
    config: ServerConfig,
    handler: H,
) -> Result<()>
where
    H: FrameHandler,
{
    if let Some(period) = config.tick_interval {
        monoio::spawn(tick(registry.clone(), period));
    }

    loop {
        let (stream, peer) = listener.accept().await?;
        let id = registry.open(peer);
        debug!("{id}: accepted connection from {peer}");

        let registry = registry.clone();
        let session = Session::new(id, Some(config.session));
        let handler = handler.clone();
        monoio::spawn(async move {
            let result = handle_connection(stream, session, handler, config.read_chunk_size).await;
            registry.close(id);
            log_close(id, peer, result);
        });
    }
}

fn log_close(id: ConnectionId, peer: SocketAddr, result: Result<()>) {
    match result {
        Ok(()) => debug!("{id}: {peer} closed the connection"),
        Err(e) if e.is_bad_handshake() => debug!("{id}: rejected upgrade from {peer}: {e}"),
        Err(Error::Io(e)) => debug!("{id}: connection to {peer} failed: {e}"),
        Err(e) => warn!("{id}: dropping {peer}: {e}"),
    }
}

/// Drives one connection until the peer disconnects or an error occurs.
///
/// Every read is handed to `session`; the handshake response and the frames returned by
/// `handler` are written back before the next read.
pub async fn handle_connection<S, H>(
    mut stream: S,
    mut session: Session,
    mut handler: H,
    read_chunk_size: usize,
) -> Result<()>
where
    S: AsyncReadRent + AsyncWriteRent,
    H: FrameHandler,
{
    let mut read_buf = Vec::with_capacity(read_chunk_size);
    let mut write_buf = BytesMut::new();

    loop {
        read_buf.clear();
        let (res, buf) = stream.read(read_buf).await;
        read_buf = buf;
        let n = res?;
        if n == 0 {
            return Ok(());
        }

        let output = session.on_data(&read_buf[..n])?;
        if let Some(response) = output.response {
            write_buf.extend_from_slice(&response);
        }
        for frame in output.frames {
            trace!("{}: {} frame, {} bytes", session.id(), frame.opcode(), frame.payload().len());
            if let Some(reply) = handler.on_frame(session.id(), frame) {
                FrameEncoder.encode(reply, &mut write_buf)?;
            }
        }

        if !write_buf.is_empty() {
            let (res, buf) = stream.write_all(write_buf).await;
            write_buf = buf;
            res?;
            write_buf.clear();
            stream.flush().await?;
        }
    }
}

async fn tick(registry: Arc<Registry>, period: Duration) {
    let mut interval = monoio::time::interval(period);
    loop {
        interval.tick().await;
        info!("tick: {} live connections", registry.len());
        registry.for_each(|id, info| {
            trace!("{id}: {} open for {:?}", info.peer, info.opened_at.elapsed());
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use monoio::{
        BufResult,
        buf::{IoBuf, IoBufMut, IoVecBuf, IoVecBufMut},
    };

    use super::*;
    use crate::protocol::frame::coding::{Control, OpCode};

    /// Replays scripted reads one chunk at a time and records everything written.
    struct MockStream {
        reads: Vec<Vec<u8>>,
        written: Rc<RefCell<Vec<u8>>>,
    }

    impl AsyncWriteRent for MockStream {
        async fn write<T: IoBuf>(&mut self, buf: T) -> BufResult<usize, T> {
            let len = buf.bytes_init();
            let data = unsafe { std::slice::from_raw_parts(buf.read_ptr(), len) };
            self.written.borrow_mut().extend_from_slice(data);
            (Ok(len), buf)
        }

        async fn writev<T: IoVecBuf>(&mut self, buf_vec: T) -> BufResult<usize, T> {
            (Ok(0), buf_vec)
        }

        async fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        async fn shutdown(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl AsyncReadRent for MockStream {
        async fn read<T: IoBufMut>(&mut self, mut buf: T) -> BufResult<usize, T> {
            if self.reads.is_empty() {
                return (Ok(0), buf);
            }
            let chunk = self.reads.remove(0);
            let len = chunk.len().min(buf.bytes_total());
            unsafe {
                std::ptr::copy_nonoverlapping(chunk.as_ptr(), buf.write_ptr(), len);
                buf.set_init(len);
            }
            (Ok(len), buf)
        }

        async fn readv<T: IoVecBufMut>(&mut self, buf: T) -> BufResult<usize, T> {
            (Ok(0), buf)
        }
    }

    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\n\
        Host: localhost\r\n\
        Connection: Upgrade\r\n\
        Upgrade: websocket\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        \r\n";

    fn echo_pings(_id: ConnectionId, frame: Frame) -> Option<Frame> {
        match frame.opcode() {
            OpCode::Control(Control::Ping) => Some(Frame::pong(frame.into_payload())),
            _ => None,
        }
    }

    #[monoio::test]
    async fn answers_handshake_then_frames() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = MockStream {
            reads: vec![
                REQUEST[..20].to_vec(),
                REQUEST[20..].to_vec(),
                // masked ping "ab" split across two reads
                vec![0x89, 0x82, 0x01, 0x02],
                vec![0x03, 0x04, b'a' ^ 0x01, b'b' ^ 0x02],
            ],
            written: written.clone(),
        };
        let session = Session::new(ConnectionId::from(1), None);

        handle_connection(stream, session, echo_pings, 1024).await.unwrap();

        let written = written.borrow();
        let mut expected = b"HTTP/1.1 101 Switching Protocols\r\n\
            Upgrade: websocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\
            \r\n"
            .to_vec();
        expected.extend_from_slice(&[0x8a, 0x02, b'a', b'b']);
        assert_eq!(*written, expected);
    }

    #[monoio::test]
    async fn bad_handshake_writes_nothing() {
        let written = Rc::new(RefCell::new(Vec::new()));
        let stream = MockStream {
            reads: vec![b"POST / HTTP/1.1\r\nHost: localhost\r\n\r\n".to_vec()],
            written: written.clone(),
        };
        let session = Session::new(ConnectionId::from(1), None);

        let err = handle_connection(stream, session, echo_pings, 1024)
            .await
            .unwrap_err();
        assert!(err.is_bad_handshake());
        assert!(written.borrow().is_empty());
    }
}
