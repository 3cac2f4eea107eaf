/*
 * Copyright (C) 2020-2023 Fanout, Inc.
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

use std::io;
use std::io::{Read, Write};

// linear byte buffer with a read cursor (start) and a write cursor (end).
// unlike a ring buffer it can grow, which is what lets transports hand out
// staging memory on demand without ever failing
pub struct Buffer {
    buf: Vec<u8>,
    start: usize,
    end: usize,
}

impl Buffer {
    pub fn new(size: usize) -> Buffer {
        let buf = vec![0; size];

        Buffer {
            buf,
            start: 0,
            end: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.start = 0;
        self.end = 0;
    }

    pub fn read_avail(&self) -> usize {
        self.end - self.start
    }

    pub fn read_buf(&self) -> &[u8] {
        &self.buf[self.start..self.end]
    }

    pub fn read_commit(&mut self, amount: usize) {
        assert!(self.start + amount <= self.end);

        self.start += amount;

        if self.start == self.end {
            self.start = 0;
            self.end = 0;
        }
    }

    pub fn write_avail(&self) -> usize {
        self.buf.len() - self.end
    }

    pub fn write_buf(&mut self) -> &mut [u8] {
        let len = self.buf.len();

        &mut self.buf[self.end..len]
    }

    pub fn write_commit(&mut self, amount: usize) {
        assert!(self.end + amount <= self.buf.len());

        self.end += amount;
    }

    // move readable bytes to the front. returns the number of readable bytes
    pub fn align(&mut self) -> usize {
        let size = self.end - self.start;

        if self.start > 0 {
            self.buf.copy_within(self.start..self.end, 0);
            self.start = 0;
            self.end = size;
        }

        size
    }

    // ensure at least amount bytes of write space, reclaiming consumed space
    // first and growing only if that isn't enough. amount may come from the
    // peer, so an impossible size is an error rather than an abort
    pub fn reserve(&mut self, amount: usize) -> Result<(), io::Error> {
        if self.write_avail() >= amount {
            return Ok(());
        }

        self.align();

        if self.write_avail() < amount {
            let size = match self.end.checked_add(amount) {
                Some(size) => size,
                None => return Err(io::Error::from(io::ErrorKind::OutOfMemory)),
            };

            if self.buf.try_reserve_exact(size - self.buf.len()).is_err() {
                return Err(io::Error::from(io::ErrorKind::OutOfMemory));
            }

            self.buf.resize(size, 0);
        }

        Ok(())
    }

    // commit amount bytes of write space, growing as needed, and return them
    // for the caller to fill. amount is sized by local code, never the peer
    pub fn alloc(&mut self, amount: usize) -> &mut [u8] {
        if self.write_avail() < amount {
            self.align();

            let size = self.end + amount;

            if self.buf.len() < size {
                self.buf.resize(size, 0);
            }
        }

        let start = self.end;
        self.end += amount;

        &mut self.buf[start..self.end]
    }

    pub fn write_from<R: Read>(&mut self, r: &mut R) -> Result<usize, io::Error> {
        let size = r.read(self.write_buf())?;

        self.write_commit(size);

        Ok(size)
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        let end = data.len();

        Buffer {
            buf: data,
            start: 0,
            end,
        }
    }
}

#[cfg(test)]
impl Read for Buffer {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, io::Error> {
        // fully qualified to work around future method warning
        // https://github.com/rust-lang/rust/issues/48919
        let src = Buffer::read_buf(self);
        let size = std::cmp::min(src.len(), buf.len());

        buf[..size].copy_from_slice(&src[..size]);

        self.read_commit(size);

        Ok(size)
    }
}

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        self.alloc(buf.len()).copy_from_slice(buf);

        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        Ok(())
    }
}
