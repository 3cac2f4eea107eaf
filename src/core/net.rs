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

//! Buffered transport contract.
//!
//! Protocol code touches bytes only through [`Reader`] and [`Writer`]. Reads
//! are expressed as a cursor over transport-owned memory (`peek`, `skip`),
//! which makes speculative parsing cheap: look at the next bytes, and only
//! consume them once a complete unit has been recognized. Writes can be
//! staged directly into transport memory with `malloc`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

// an elapsed deadline still has to produce a timeout rather than "no
// deadline", so deadlines are never converted to less than this
const DEADLINE_MIN: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("insufficient data: wanted {wanted} bytes, {avail} available")]
    InsufficientData { wanted: usize, avail: usize },

    #[error("timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Io(Arc<io::Error>),
}

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Io(Arc::new(e)),
        }
    }
}

#[allow(clippy::len_without_is_empty)]
pub trait Reader {
    // returns the next n unread bytes without consuming them. may wait for
    // more data to arrive
    fn peek(&mut self, n: usize) -> Result<&[u8], Error>;

    // discards n bytes that are already buffered
    fn skip(&mut self, n: usize) -> Result<(), Error>;

    fn read_byte(&mut self) -> Result<u8, Error>;

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error>;

    // number of buffered unread bytes. performs no I/O
    fn len(&self) -> usize;
}

pub trait Writer {
    // stages n bytes in the write buffer and returns them for the caller to
    // fill. never fails, the buffer grows as needed
    fn malloc(&mut self, n: usize) -> &mut [u8];

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error>;

    fn flush(&mut self) -> Result<(), Error>;

    fn write_all(&mut self, src: &[u8]) -> Result<(), Error> {
        let mut pos = 0;

        while pos < src.len() {
            let size = self.write_binary(&src[pos..])?;

            if size == 0 {
                return Err(io::Error::from(io::ErrorKind::WriteZero).into());
            }

            pos += size;
        }

        Ok(())
    }
}

pub trait Conn: Reader + Writer {
    fn close(&mut self) -> Result<(), Error>;

    fn local_addr(&self) -> Option<SocketAddr>;

    fn remote_addr(&self) -> Option<SocketAddr>;

    // None or a zero duration means reads may wait forever. a transport
    // that cannot enforce a timeout must fail here rather than ignore it
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<(), Error>;

    fn set_read_deadline(&mut self, deadline: Instant) -> Result<(), Error> {
        let timeout = deadline.saturating_duration_since(Instant::now());

        self.set_read_timeout(Some(timeout.max(DEADLINE_MIN)))
    }
}

impl<R: Reader + ?Sized> Reader for &mut R {
    fn peek(&mut self, n: usize) -> Result<&[u8], Error> {
        (**self).peek(n)
    }

    fn skip(&mut self, n: usize) -> Result<(), Error> {
        (**self).skip(n)
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        (**self).read_byte()
    }

    fn read_binary(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        (**self).read_binary(n)
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<W: Writer + ?Sized> Writer for &mut W {
    fn malloc(&mut self, n: usize) -> &mut [u8] {
        (**self).malloc(n)
    }

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error> {
        (**self).write_binary(src)
    }

    fn flush(&mut self) -> Result<(), Error> {
        (**self).flush()
    }
}

// plain in-memory sink. flushing is a no-op
impl Writer for Vec<u8> {
    fn malloc(&mut self, n: usize) -> &mut [u8] {
        let start = self.len();
        self.resize(start + n, 0);

        &mut self[start..]
    }

    fn write_binary(&mut self, src: &[u8]) -> Result<usize, Error> {
        self.extend_from_slice(src);

        Ok(src.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
