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

//! In-memory transports for exercising callers under adversarial timing.
//!
//! [`MockConn`] serves reads from a fixed source and records everything
//! that gets flushed. When a peek can't be satisfied it either sleeps for
//! the configured read timeout and fails with [`Error::Timeout`], or, with
//! no timeout configured, never returns at all. The latter models a peer
//! that goes silent on a connection without a deadline, and is what tests
//! use to check that callers enforce their own deadlines.

use crate::core::buffer::Buffer;
use crate::core::net::{Conn, Error, Reader, Writer};
use std::io;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

pub const SLOW_READ_LATENCY: Duration = Duration::from_millis(100);

pub const STREAM_LEN: usize = 1 << 15;
pub const STREAM_CAPACITY: usize = 1 << 16;

fn block_forever() -> ! {
    loop {
        // parking can wake spuriously, so keep parking
        thread::park();
    }
}

pub struct MockConn {
    rbuf: Buffer,
    wbuf: Buffer,
    recorded: Vec<u8>,
    read_timeout: Option<Duration>,
    write_limit: Option<usize>,
    written: usize,
    flush_error: Option<io::ErrorKind>,
}

impl MockConn {
    pub fn new(source: &[u8]) -> Self {
        Self {
            rbuf: Buffer::from(source.to_vec()),
            wbuf: Buffer::new(0),
            recorded: Vec::new(),
            read_timeout: None,
            write_limit: None,
            written: 0,
            flush_error: None,
        }
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    // bytes that have been flushed, in order
    pub fn writer_recorder(&self) -> &[u8] {
        &self.recorded
    }

    // bytes that have been written but not yet flushed
    pub fn staged(&self) -> &[u8] {
        self.wbuf.read_buf()
    }

    // makes write_binary fail, accepting nothing, once the total number of
    // bytes written (staged or flushed) would exceed limit. malloc is not
    // affected
    pub fn set_write_limit(&mut self, limit: Option<usize>) {
        self.write_limit = limit;
    }

    pub fn set_flush_error(&mut self, kind: Option<io::ErrorKind>) {
        self.flush_error = kind;
    }

    fn stall(&self) -> Error {
        match self.read_timeout {
            Some(timeout) => {
                thread::sleep(timeout);

                Error::Timeout
            }
            None => block_forever(),
        }
    }

    fn check_avail(&self, n: usize) -> Result<(), Error> {
        let avail = self.rbuf.read_avail();

        if avail < n {
            return Err(Error::InsufficientData { wanted: n, avail });
        }

        Ok(())
    }
}

impl Reader for MockConn {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        if self.rbuf.read_avail() < n {
            return Err(self.stall());
        }

        Ok(&self.rbuf.read_buf()[..n])
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.check_avail(n)?;

        self.rbuf.read_commit(n);

        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        self.check_avail(1)?;

        let b = self.rbuf.read_buf()[0];
        self.rbuf.read_commit(1);

        Ok(b)
    }

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        self.check_avail(n)?;

        let data = self.rbuf.read_buf()[..n].to_vec();
        self.rbuf.read_commit(n);

        Ok(data)
    }

    fn len(&self) -> usize {
        self.rbuf.read_avail()
    }
}

impl Writer for MockConn {
    fn malloc(&mut self, n: usize) -> &mut [u8] {
        self.written += n;

        self.wbuf.alloc(n)
    }

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error> {
        if let Some(limit) = self.write_limit {
            if self.written + src.len() > limit {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }
        }

        self.written += src.len();
        self.wbuf.alloc(src.len()).copy_from_slice(src);

        Ok(src.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if let Some(kind) = self.flush_error {
            return Err(io::Error::from(kind).into());
        }

        self.recorded.extend_from_slice(self.wbuf.read_buf());
        self.wbuf.clear();

        Ok(())
    }
}

impl Conn for MockConn {
    fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.read_timeout = timeout.filter(|t| !t.is_zero());

        Ok(())
    }
}

// same as MockConn, except every peek first waits SLOW_READ_LATENCY
pub struct SlowReadConn {
    inner: MockConn,
}

impl SlowReadConn {
    pub fn new(source: &[u8]) -> Self {
        Self {
            inner: MockConn::new(source),
        }
    }

    pub fn get_ref(&self) -> &MockConn {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut MockConn {
        &mut self.inner
    }
}

impl Reader for SlowReadConn {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        thread::sleep(SLOW_READ_LATENCY);

        self.inner.peek(n)
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.inner.skip(n)
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        self.inner.read_byte()
    }

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        self.inner.read_binary(n)
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Writer for SlowReadConn {
    fn malloc(&mut self, n: usize) -> &mut [u8] {
        self.inner.malloc(n)
    }

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error> {
        self.inner.write_binary(src)
    }

    fn flush(&mut self) -> Result<(), Error> {
        self.inner.flush()
    }
}

impl Conn for SlowReadConn {
    fn close(&mut self) -> Result<(), Error> {
        self.inner.close()
    }

    fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.local_addr()
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr()
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error> {
        self.inner.set_read_timeout(timeout)
    }
}

// read-only transport over a zeroed backing store of STREAM_CAPACITY bytes,
// of which the first STREAM_LEN are initially readable.
//
// with legacy_peek enabled, peek(1) on an exhausted readable window widens
// the window to the end of the backing store rather than failing, so the
// remaining (stale) capacity becomes readable. this reproduces the behavior
// of an older fixture that some tests rely on. it is not part of the Reader
// contract
pub struct StreamConn {
    buf: Vec<u8>,
    start: usize,
    end: usize,
    legacy_peek: bool,
}

#[allow(clippy::new_without_default)]
impl StreamConn {
    pub fn new() -> Self {
        Self {
            buf: vec![0; STREAM_CAPACITY],
            start: 0,
            end: STREAM_LEN,
            legacy_peek: true,
        }
    }

    pub fn set_legacy_peek(&mut self, enabled: bool) {
        self.legacy_peek = enabled;
    }

    // readable window plus the stale bytes behind it
    pub fn capacity(&self) -> usize {
        self.buf.len() - self.start
    }

    fn insufficient(&self, n: usize) -> Error {
        Error::InsufficientData {
            wanted: n,
            avail: self.end - self.start,
        }
    }
}

impl Reader for StreamConn {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        if self.end - self.start >= n {
            return Ok(&self.buf[self.start..(self.start + n)]);
        }

        if n == 1 && self.legacy_peek && self.start < self.buf.len() {
            self.end = self.buf.len();

            return Ok(&self.buf[self.start..(self.start + 1)]);
        }

        Err(self.insufficient(n))
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        if self.end - self.start < n {
            return Err(self.insufficient(n));
        }

        self.start += n;

        Ok(())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        if self.end == self.start {
            return Err(self.insufficient(1));
        }

        let b = self.buf[self.start];
        self.start += 1;

        Ok(b)
    }

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        if self.end - self.start < n {
            return Err(self.insufficient(n));
        }

        let data = self.buf[self.start..(self.start + n)].to_vec();
        self.start += n;

        Ok(data)
    }

    fn len(&self) -> usize {
        self.end - self.start
    }
}
