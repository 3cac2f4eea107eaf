/*
 * Copyright (C) 2026 Fastly, Inc.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use crate::core::buffer::Buffer;
use crate::core::net::{Conn, Error, Reader, Writer};
use log::debug;
use std::cmp;
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

pub const READ_BUFFER_SIZE_DEFAULT: usize = 4096;

// buffered transport over a pair of blocking std streams. read timeouts
// can only be enforced when built from a socket
pub struct IoConn<R, W> {
    reader: R,
    writer: W,
    rbuf: Buffer,
    wbuf: Buffer,
    read_size: usize,
    read_timeout: Option<Duration>,
    socket: Option<TcpStream>,
    eof: bool,
    closed: bool,
}

impl<R: Read, W: Write> IoConn<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self::with_buffer_size(reader, writer, READ_BUFFER_SIZE_DEFAULT)
    }

    pub fn with_buffer_size(reader: R, writer: W, read_size: usize) -> Self {
        assert!(read_size > 0);

        Self {
            reader,
            writer,
            rbuf: Buffer::new(read_size),
            wbuf: Buffer::new(0),
            read_size,
            read_timeout: None,
            socket: None,
            eof: false,
            closed: false,
        }
    }

    pub fn get_ref(&self) -> (&R, &W) {
        (&self.reader, &self.writer)
    }

    // bytes staged but not yet flushed
    pub fn staged(&self) -> &[u8] {
        self.wbuf.read_buf()
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed {
            return Err(Error::Closed);
        }

        Ok(())
    }

    // read from the source until at least n bytes are buffered
    fn fill(&mut self, n: usize) -> Result<(), Error> {
        self.check_open()?;

        while self.rbuf.read_avail() < n {
            if self.eof {
                return Err(Error::InsufficientData {
                    wanted: n,
                    avail: self.rbuf.read_avail(),
                });
            }

            let want = n - self.rbuf.read_avail();
            self.rbuf.reserve(cmp::max(want, self.read_size))?;

            match self.rbuf.write_from(&mut self.reader) {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

impl IoConn<TcpStream, TcpStream> {
    pub fn from_tcp(stream: TcpStream) -> Result<Self, io::Error> {
        let reader = stream.try_clone()?;
        let writer = stream.try_clone()?;

        let mut c = Self::new(reader, writer);
        c.socket = Some(stream);

        Ok(c)
    }
}

impl<R: Read, W: Write> Reader for IoConn<R, W> {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        self.fill(n)?;

        Ok(&self.rbuf.read_buf()[..n])
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.check_open()?;

        let avail = self.rbuf.read_avail();

        if avail < n {
            return Err(Error::InsufficientData { wanted: n, avail });
        }

        self.rbuf.read_commit(n);

        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        self.fill(1)?;

        let b = self.rbuf.read_buf()[0];
        self.rbuf.read_commit(1);

        Ok(b)
    }

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        self.fill(n)?;

        let data = self.rbuf.read_buf()[..n].to_vec();
        self.rbuf.read_commit(n);

        Ok(data)
    }

    fn len(&self) -> usize {
        self.rbuf.read_avail()
    }
}

impl<R: Read, W: Write> Writer for IoConn<R, W> {
    fn malloc(&mut self, n: usize) -> &mut [u8] {
        self.wbuf.alloc(n)
    }

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error> {
        self.check_open()?;

        self.wbuf.alloc(src.len()).copy_from_slice(src);

        Ok(src.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.check_open()?;

        while self.wbuf.read_avail() > 0 {
            let size = match self.writer.write(self.wbuf.read_buf()) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(size) => size,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            self.wbuf.read_commit(size);
        }

        self.writer.flush()?;

        Ok(())
    }
}

impl<R: Read, W: Write> Conn for IoConn<R, W> {
    fn close(&mut self) -> Result<(), Error> {
        if self.closed {
            return Ok(());
        }

        self.closed = true;

        if let Some(socket) = &self.socket {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                debug!("socket shutdown failed: {}", e);
            }
        }

        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.peer_addr().ok())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        // zero means no deadline, which is also what the socket option
        // expects, except that it rejects an explicit zero
        let timeout = timeout.filter(|t| !t.is_zero());

        match &self.socket {
            Some(socket) => socket.set_read_timeout(timeout)?,

            // a plain reader offers no way to interrupt a blocked read
            None if timeout.is_some() => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    "read timeout requires a socket",
                )
                .into())
            }
            None => {}
        }

        self.read_timeout = timeout;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    // hands out at most max bytes per read
    struct Trickle {
        data: io::Cursor<Vec<u8>>,
        max: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
            let size = cmp::min(buf.len(), self.max);

            self.data.read(&mut buf[..size])
        }
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> Result<usize, io::Error> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> Result<(), io::Error> {
            Ok(())
        }
    }

    #[test]
    fn test_peek_and_skip() {
        let src = Trickle {
            data: io::Cursor::new(b"hello world".to_vec()),
            max: 2,
        };

        let mut c = IoConn::with_buffer_size(src, io::sink(), 2);

        assert_eq!(c.len(), 0);
        assert_eq!(c.peek(5).unwrap(), b"hello");
        assert!(c.len() >= 5);

        // peeking again does not consume
        assert_eq!(c.peek(5).unwrap(), b"hello");

        c.skip(5).unwrap();
        assert_eq!(c.read_byte().unwrap(), b' ');
        assert_eq!(c.read_binary(5).unwrap(), b"world");
        assert_eq!(c.len(), 0);

        match c.peek(1) {
            Err(Error::InsufficientData {
                wanted: 1,
                avail: 0,
            }) => {}
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn test_skip_requires_buffered() {
        let mut c = IoConn::new(io::Cursor::new(b"abcdef".to_vec()), io::sink());

        // nothing has been read from the source yet
        assert!(matches!(
            c.skip(1),
            Err(Error::InsufficientData {
                wanted: 1,
                avail: 0
            })
        ));

        c.peek(1).unwrap();
        c.skip(6).unwrap();
        assert_eq!(c.len(), 0);
    }

    #[test]
    fn test_write_and_flush() {
        let mut c = IoConn::new(io::empty(), Vec::new());

        c.malloc(3).copy_from_slice(b"abc");
        assert_eq!(c.write_binary(b"def").unwrap(), 3);
        assert_eq!(c.staged(), b"abcdef");
        assert!(c.get_ref().1.is_empty());

        c.flush().unwrap();
        assert!(c.staged().is_empty());
        assert_eq!(c.get_ref().1, b"abcdef");
    }

    #[test]
    fn test_flush_error() {
        let mut c = IoConn::new(io::empty(), BrokenPipe);

        c.write_binary(b"abc").unwrap();

        match c.flush() {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::BrokenPipe),
            r => panic!("unexpected result: {:?}", r),
        }
    }

    #[test]
    fn test_closed() {
        let mut c = IoConn::new(io::Cursor::new(b"abc".to_vec()), io::sink());

        c.close().unwrap();

        assert!(matches!(c.peek(1), Err(Error::Closed)));
        assert!(matches!(c.write_binary(b"x"), Err(Error::Closed)));
        assert!(matches!(c.flush(), Err(Error::Closed)));
    }

    // a source that never produces data
    struct Silent;

    impl Read for Silent {
        fn read(&mut self, _buf: &mut [u8]) -> Result<usize, io::Error> {
            loop {
                thread::park();
            }
        }
    }

    #[test]
    fn test_read_timeout_requires_socket() {
        let mut c = IoConn::new(Silent, io::sink());

        match c.set_read_timeout(Some(Duration::from_millis(50))) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::Unsupported),
            r => panic!("unexpected result: {:?}", r),
        }
        assert_eq!(c.read_timeout(), None);

        assert!(c.set_read_deadline(Instant::now()).is_err());
        assert_eq!(c.read_timeout(), None);

        // clearing is always allowed
        c.set_read_timeout(None).unwrap();
        c.set_read_timeout(Some(Duration::ZERO)).unwrap();
    }

    #[test]
    fn test_peek_impossible_size() {
        let mut c = IoConn::new(io::Cursor::new(b"abc".to_vec()), io::sink());

        assert_eq!(c.peek(1).unwrap(), b"a");

        match c.peek(usize::MAX) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::OutOfMemory),
            r => panic!("unexpected result: {:?}", r),
        }

        match c.read_binary(usize::MAX - 1) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::OutOfMemory),
            r => panic!("unexpected result: {:?}", r),
        }

        // still usable
        assert_eq!(c.read_binary(3).unwrap(), b"abc");
    }

    #[test]
    fn test_tcp_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();

            stream.write_all(b"ab").unwrap();

            // hold the connection open without sending more
            let mut buf = [0; 1];
            let _ = stream.read(&mut buf);
        });

        let stream = TcpStream::connect(addr).unwrap();
        let mut c = IoConn::from_tcp(stream).unwrap();

        assert_eq!(c.remote_addr(), Some(addr));
        assert!(c.local_addr().is_some());

        c.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
        assert_eq!(c.read_timeout(), Some(Duration::from_millis(50)));

        assert_eq!(c.peek(2).unwrap(), b"ab");

        let start = Instant::now();
        let e = c.peek(3).unwrap_err();
        assert!(e.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(40));

        // buffered bytes survive the timeout
        assert_eq!(c.len(), 2);

        c.set_read_timeout(Some(Duration::ZERO)).unwrap();
        assert_eq!(c.read_timeout(), None);

        c.close().unwrap();
        peer.join().unwrap();
    }
}
