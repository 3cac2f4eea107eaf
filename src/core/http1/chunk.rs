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

//! Chunked transfer coding.
//!
//! A chunked body is a sequence of `<hex-size>\r\n<data>\r\n` frames ended by
//! a zero-size frame, an optional block of trailer fields, and an empty line.
//! No chunk extensions are ever emitted. When decoding, extensions are
//! accepted and ignored.

use super::header::Trailer;
use super::Error;
use crate::core::net::{self, Reader, Writer};
use std::cmp;
use std::convert::TryFrom;

pub const CRLF: &[u8] = b"\r\n";
pub const CHUNK_TERMINATOR: &[u8] = b"0\r\n";

// size lines longer than this are rejected rather than buffered
pub const CHUNK_SIZE_LINE_MAX: usize = 1024;
pub const TRAILER_SIZE_MAX: usize = 8192;
pub const TRAILERS_MAX: usize = 64;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

fn hex_len(n: usize) -> usize {
    if n == 0 {
        return 1;
    }

    let bits = (usize::BITS - n.leading_zeros()) as usize;

    (bits + 3) / 4
}

// writes n as lowercase hex, filling all of dest. dest must be hex_len(n)
// bytes long
fn write_hex(dest: &mut [u8], n: usize) {
    let mut n = n;

    for b in dest.iter_mut().rev() {
        *b = HEX_DIGITS[n & 0xf];
        n >>= 4;
    }
}

// the size line and the trailing CRLF are staged in transport memory. only
// the payload itself is copied in
pub fn write_chunk<W: Writer + ?Sized>(
    w: &mut W,
    payload: &[u8],
    is_final: bool,
) -> Result<(), net::Error> {
    if is_final {
        w.malloc(CHUNK_TERMINATOR.len())
            .copy_from_slice(CHUNK_TERMINATOR);

        return Ok(());
    }

    let size = payload.len();
    let digits = hex_len(size);

    let line = w.malloc(digits + CRLF.len());
    write_hex(&mut line[..digits], size);
    line[digits..].copy_from_slice(CRLF);

    if !payload.is_empty() {
        w.write_all(payload)?;
    }

    w.malloc(CRLF.len()).copy_from_slice(CRLF);

    Ok(())
}

// must follow the terminating chunk
pub fn write_trailer<W: Writer + ?Sized>(trailer: &Trailer, w: &mut W) -> Result<(), net::Error> {
    for (name, value) in trailer.iter() {
        w.write_all(name.as_bytes())?;
        w.write_all(b": ")?;
        w.write_all(value)?;
        w.write_all(CRLF)?;
    }

    w.write_all(CRLF)
}

// parses the size line without consuming anything until it is complete
pub fn read_chunk_size<R: Reader + ?Sized>(r: &mut R) -> Result<usize, Error> {
    let mut want = 1;

    loop {
        let buf = r.peek(want)?;

        match httparse::parse_chunk_size(buf) {
            Ok(httparse::Status::Complete((pos, size))) => {
                let size = usize::try_from(size).map_err(|_| Error::InvalidChunkSize)?;

                r.skip(pos)?;

                return Ok(size);
            }
            Ok(httparse::Status::Partial) => {}
            Err(_) => return Err(Error::InvalidChunkSize),
        }

        if want >= CHUNK_SIZE_LINE_MAX {
            return Err(Error::InvalidChunkSize);
        }

        // everything already buffered can be examined without waiting
        want = cmp::max(want + 1, r.len());
    }
}

fn read_crlf<R: Reader + ?Sized>(r: &mut R) -> Result<(), Error> {
    if r.peek(CRLF.len())? != CRLF {
        return Err(Error::InvalidChunkSuffix);
    }

    r.skip(CRLF.len())?;

    Ok(())
}

// returns the chunk data. an empty result is the terminating chunk, after
// which the trailer block is left unread. a chunk larger than max_size is
// rejected before any of its data is read
pub fn read_chunk<R: Reader + ?Sized>(r: &mut R, max_size: usize) -> Result<Vec<u8>, Error> {
    let size = read_chunk_size(r)?;

    if size == 0 {
        return Ok(Vec::new());
    }

    if size > max_size {
        return Err(Error::ChunkTooLarge);
    }

    let data = r.read_binary(size)?;
    read_crlf(r)?;

    Ok(data)
}

pub fn read_trailer<R: Reader + ?Sized>(r: &mut R) -> Result<Trailer, Error> {
    let mut want = CRLF.len();

    loop {
        let buf = r.peek(want)?;

        let mut headers = [httparse::EMPTY_HEADER; TRAILERS_MAX];

        match httparse::parse_headers(buf, &mut headers)? {
            httparse::Status::Complete((pos, fields)) => {
                let mut trailer = Trailer::new();

                for h in fields {
                    trailer.add(h.name, h.value)?;
                }

                r.skip(pos)?;

                return Ok(trailer);
            }
            httparse::Status::Partial => {}
        }

        if want >= TRAILER_SIZE_MAX {
            return Err(Error::TrailerTooLarge);
        }

        want = cmp::max(want + 1, r.len());
    }
}

pub fn read_chunked_body<R: Reader + ?Sized>(
    r: &mut R,
    max_body_size: usize,
) -> Result<(Vec<u8>, Trailer), Error> {
    let mut body = Vec::new();

    loop {
        let size = read_chunk_size(r)?;

        if size == 0 {
            break;
        }

        if size > max_body_size - body.len() {
            return Err(Error::BodyTooLarge);
        }

        body.extend_from_slice(&r.read_binary(size)?);
        read_crlf(r)?;
    }

    let trailer = read_trailer(r)?;

    Ok((body, trailer))
}
