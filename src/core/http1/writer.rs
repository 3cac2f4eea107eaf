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

use super::chunk::{write_chunk, write_trailer};
use super::header::{status_allows_body, write_header, BodySize, ResponseHeader};
use super::Error;
use crate::core::net::Writer;
use log::{debug, trace, warn};
use std::io;

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum State {
    // call: write, finalize
    // next: HeaderWritten, Finalized
    Fresh,

    // call: write, flush, finalize
    // next: HeaderWritten, Finalized
    HeaderWritten,

    // body has been closed out. finalize replays its first result
    Finalized,
}

// writes a response body of unknown length using chunked encoding. the
// header block goes out lazily with the first chunk.
//
// bytes are only staged in the transport. they reach the peer on flush or
// finalize
pub struct ChunkedBodyWriter<'a, W: Writer + ?Sized> {
    resp: &'a mut ResponseHeader,
    w: &'a mut W,
    header_written: bool,
    finalized: Option<Result<(), Error>>,
}

impl<'a, W: Writer + ?Sized> ChunkedBodyWriter<'a, W> {
    pub fn new(resp: &'a mut ResponseHeader, w: &'a mut W) -> Self {
        Self {
            resp,
            w,
            header_written: false,
            finalized: None,
        }
    }

    pub fn state(&self) -> State {
        if self.finalized.is_some() {
            State::Finalized
        } else if self.header_written {
            State::HeaderWritten
        } else {
            State::Fresh
        }
    }

    pub fn header(&self) -> &ResponseHeader {
        &*self.resp
    }

    // a failure here leaves the writer fresh, so the call may be retried
    fn write_header_once(&mut self) -> Result<(), Error> {
        if self.header_written {
            return Ok(());
        }

        self.resp.set_body_size(BodySize::Unknown);

        if let Err(e) = write_header(self.resp, self.w) {
            debug!("failed to write header block: {}", e);

            return Err(Error::HeaderEncodeFailed(e));
        }

        self.header_written = true;

        trace!("wrote header block for {} response", self.resp.code());

        Ok(())
    }

    // frames payload as one chunk and returns its size. an empty payload is
    // framed too, as 0\r\n\r\n, which peers read as the end of the body.
    // responses whose status forbids a body only ever get the header block
    pub fn write(&mut self, payload: &[u8]) -> Result<usize, Error> {
        if self.finalized.is_some() {
            return Err(Error::Finalized);
        }

        let code = self.resp.code();

        if !payload.is_empty() && !status_allows_body(code) {
            return Err(Error::BodyNotAllowed(code));
        }

        self.write_header_once()?;

        if !status_allows_body(code) {
            return Ok(0);
        }

        write_chunk(self.w, payload, false).map_err(Error::ChunkWriteFailed)?;

        trace!("wrote chunk of {} bytes", payload.len());

        Ok(payload.len())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.w.flush()?;

        Ok(())
    }

    // writes the terminating chunk and the trailers, then flushes. only the
    // first call has any effect; later calls return the same result without
    // touching the transport
    pub fn finalize(&mut self) -> Result<(), Error> {
        if let Some(ret) = &self.finalized {
            return ret.clone();
        }

        let ret = self.finalize_inner();

        match &ret {
            Ok(()) => debug!("finalized chunked body"),
            Err(e) => warn!("failed to finalize chunked body: {}", e),
        }

        self.finalized = Some(ret.clone());

        ret
    }

    fn finalize_inner(&mut self) -> Result<(), Error> {
        // the header block always precedes the body, even an empty one
        self.write_header_once()?;

        if status_allows_body(self.resp.code()) {
            write_chunk(self.w, &[], true).map_err(Error::ChunkWriteFailed)?;
            write_trailer(self.resp.trailer(), self.w).map_err(Error::TrailerWriteFailed)?;
        }

        self.w.flush()?;

        Ok(())
    }
}

impl<W: Writer + ?Sized> io::Write for ChunkedBodyWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> Result<usize, io::Error> {
        // formatting may produce empty writes, which must not end the body
        if buf.is_empty() {
            return Ok(0);
        }

        ChunkedBodyWriter::write(self, buf).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn flush(&mut self) -> Result<(), io::Error> {
        ChunkedBodyWriter::flush(self).map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::http1::chunk::read_chunked_body;
    use crate::core::mock::{MockConn, SlowReadConn};
    use crate::core::net;
    use std::io::Write;
    use test_log::test;

    fn header_block(resp: &ResponseHeader) -> Vec<u8> {
        let mut resp = resp.clone();
        resp.set_body_size(BodySize::Unknown);

        let mut out: Vec<u8> = Vec::new();
        write_header(&resp, &mut out).unwrap();

        out
    }

    #[test]
    fn test_write_and_finalize() {
        let mut resp = ResponseHeader::new(200);
        resp.add("Content-Type", b"text/plain").unwrap();

        let expected_header = header_block(&resp);

        let mut c = MockConn::new(b"");

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
            assert_eq!(w.state(), State::Fresh);

            assert_eq!(w.write(b"abc").unwrap(), 3);
            assert_eq!(w.state(), State::HeaderWritten);

            assert_eq!(w.write(b"de").unwrap(), 2);

            w.finalize().unwrap();
            assert_eq!(w.state(), State::Finalized);
        }

        let mut expected = expected_header;
        expected.extend_from_slice(b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");

        assert_eq!(c.writer_recorder(), expected.as_slice());
        assert!(c.staged().is_empty());

        assert_eq!(resp.body_size(), BodySize::Unknown);
    }

    #[test]
    fn test_stream_shape() {
        let payloads: &[&[u8]] = &[b"a", &[b'x'; 300], b"hello world", &[b'y'; 16]];

        let mut resp = ResponseHeader::new(200);
        resp.trailer_mut().add("X-Checksum", b"abc").unwrap();

        let mut expected = header_block(&resp);

        for p in payloads {
            expected.extend_from_slice(format!("{:x}\r\n", p.len()).as_bytes());
            expected.extend_from_slice(p);
            expected.extend_from_slice(b"\r\n");
        }

        expected.extend_from_slice(b"0\r\nX-Checksum: abc\r\n\r\n");

        let mut out: Vec<u8> = Vec::new();

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut out);

            for p in payloads {
                assert_eq!(w.write(p).unwrap(), p.len());
            }

            w.finalize().unwrap();
        }

        assert_eq!(out, expected);

        // the body reads back through the decoder
        let header_len = header_block(&resp).len();
        let mut c = MockConn::new(&out[header_len..]);
        let (body, trailer) = read_chunked_body(&mut c, 1024).unwrap();

        assert_eq!(body, payloads.concat());
        assert_eq!(trailer.get("x-checksum"), Some(&b"abc"[..]));
    }

    #[test]
    fn test_finalize_once() {
        let mut resp = ResponseHeader::new(200);
        let mut c = MockConn::new(b"");

        let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
        w.write(b"abc").unwrap();

        w.finalize().unwrap();
        let after_one = w.w.writer_recorder().to_vec();

        for _ in 0..3 {
            w.finalize().unwrap();
        }

        assert_eq!(w.w.writer_recorder(), after_one.as_slice());
        assert!(after_one.ends_with(b"3\r\nabc\r\n0\r\n\r\n"));

        assert!(matches!(w.write(b"more"), Err(Error::Finalized)));
        assert_eq!(w.w.writer_recorder(), after_one.as_slice());
    }

    #[test]
    fn test_finalize_without_write() {
        let mut resp = ResponseHeader::new(200);

        let mut expected = header_block(&resp);
        expected.extend_from_slice(b"0\r\n\r\n");

        let mut c = MockConn::new(b"");

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
            w.finalize().unwrap();
        }

        assert_eq!(c.writer_recorder(), expected.as_slice());
    }

    #[test]
    fn test_empty_write() {
        let mut resp = ResponseHeader::new(200);

        let mut expected = header_block(&resp);
        expected.extend_from_slice(b"3\r\nabc\r\n0\r\n\r\n0\r\n\r\n");

        let mut out: Vec<u8> = Vec::new();

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut out);

            assert_eq!(w.write(b"abc").unwrap(), 3);

            // framed like any other payload
            assert_eq!(w.write(b"").unwrap(), 0);
            assert_eq!(w.state(), State::HeaderWritten);

            w.finalize().unwrap();
        }

        assert_eq!(out, expected);
    }

    #[test]
    fn test_io_write_skips_empty() {
        let mut resp = ResponseHeader::new(200);

        let mut expected = header_block(&resp);
        expected.extend_from_slice(b"3\r\nabc\r\n0\r\n\r\n");

        let mut out: Vec<u8> = Vec::new();

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut out);

            assert_eq!(Write::write(&mut w, b"abc").unwrap(), 3);
            assert_eq!(Write::write(&mut w, b"").unwrap(), 0);
            write!(w, "{}", "").unwrap();

            w.finalize().unwrap();
        }

        assert_eq!(out, expected);
    }

    #[test]
    fn test_status_without_body() {
        for code in [101, 204, 304] {
            let mut resp = ResponseHeader::new(code);
            resp.trailer_mut().add("X-Checksum", b"abc").unwrap();

            let expected = header_block(&resp);
            assert!(!expected
                .windows(b"Transfer-Encoding".len())
                .any(|w| w == b"Transfer-Encoding"));

            let mut c = MockConn::new(b"");

            {
                let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);

                match w.write(b"abc") {
                    Err(Error::BodyNotAllowed(status)) => assert_eq!(status, code),
                    r => panic!("unexpected result: {:?}", r),
                }

                // rejected before anything was staged
                assert_eq!(w.state(), State::Fresh);
                assert!(w.w.staged().is_empty());

                assert_eq!(w.write(b"").unwrap(), 0);
                assert_eq!(w.state(), State::HeaderWritten);

                w.finalize().unwrap();
            }

            // no chunks, no terminator, no trailers
            assert_eq!(c.writer_recorder(), expected.as_slice());
        }
    }

    #[test]
    fn test_header_failure_is_retryable() {
        let mut resp = ResponseHeader::new(200);
        let expected_header = header_block(&resp);

        let mut c = MockConn::new(b"");
        c.set_write_limit(Some(0));

        let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);

        match w.write(b"abc") {
            Err(Error::HeaderEncodeFailed(net::Error::Io(_))) => {}
            r => panic!("unexpected result: {:?}", r),
        }

        assert_eq!(w.state(), State::Fresh);
        assert!(w.w.staged().is_empty());

        w.w.set_write_limit(None);

        assert_eq!(w.write(b"abc").unwrap(), 3);
        w.flush().unwrap();

        let mut expected = expected_header;
        expected.extend_from_slice(b"3\r\nabc\r\n");

        assert_eq!(w.w.writer_recorder(), expected.as_slice());
    }

    #[test]
    fn test_chunk_failure() {
        let mut resp = ResponseHeader::new(200);
        let header_len = header_block(&resp).len();

        let mut c = MockConn::new(b"");

        // room for the header block and the size line only
        c.set_write_limit(Some(header_len + 3));

        let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);

        match w.write(b"abc") {
            Err(Error::ChunkWriteFailed(net::Error::Io(_))) => {}
            r => panic!("unexpected result: {:?}", r),
        }

        // the header block is not rewritten
        assert_eq!(w.state(), State::HeaderWritten);
    }

    #[test]
    fn test_trailer_failure_is_cached() {
        let mut resp = ResponseHeader::new(200);
        resp.trailer_mut().add("X-Checksum", b"abc").unwrap();

        let header_len = header_block(&resp).len();

        let mut c = MockConn::new(b"");

        // header, "3\r\n" + "abc" + "\r\n", then the terminator
        c.set_write_limit(Some(header_len + 8 + 3));

        let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
        w.write(b"abc").unwrap();

        let e = w.finalize().unwrap_err();
        assert!(matches!(e, Error::TrailerWriteFailed(_)));
        assert_eq!(w.state(), State::Finalized);

        let staged = w.w.staged().to_vec();
        assert!(staged.ends_with(b"0\r\n"));

        // not retried, even once writes would succeed
        w.w.set_write_limit(None);

        let e2 = w.finalize().unwrap_err();
        assert!(matches!(e2, Error::TrailerWriteFailed(_)));
        assert_eq!(e.to_string(), e2.to_string());
        assert_eq!(w.w.staged(), staged.as_slice());
        assert!(w.w.writer_recorder().is_empty());
    }

    #[test]
    fn test_flush_failure() {
        let mut resp = ResponseHeader::new(200);
        let mut c = MockConn::new(b"");
        c.set_flush_error(Some(io::ErrorKind::BrokenPipe));

        let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
        w.write(b"abc").unwrap();

        assert!(matches!(
            w.flush(),
            Err(Error::Transport(net::Error::Io(_)))
        ));
        assert_eq!(w.state(), State::HeaderWritten);

        assert!(matches!(
            w.finalize(),
            Err(Error::Transport(net::Error::Io(_)))
        ));
        assert!(matches!(
            w.finalize(),
            Err(Error::Transport(net::Error::Io(_)))
        ));
    }

    #[test]
    fn test_io_write() {
        let mut resp = ResponseHeader::new(200);
        let mut out: Vec<u8> = Vec::new();

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut out);

            write!(w, "hello {}", 42).unwrap();
            Write::flush(&mut w).unwrap();
            w.finalize().unwrap();
        }

        let header_len = header_block(&resp).len();
        let mut c = MockConn::new(&out[header_len..]);
        let (body, _) = read_chunked_body(&mut c, 1024).unwrap();

        assert_eq!(body, b"hello 42");
    }

    #[test]
    fn test_slow_transport() {
        let mut resp = ResponseHeader::new(200);
        let mut c = SlowReadConn::new(b"");

        {
            let mut w = ChunkedBodyWriter::new(&mut resp, &mut c);
            w.write(b"abc").unwrap();
            w.finalize().unwrap();
        }

        assert!(c.get_mut().writer_recorder().ends_with(b"3\r\nabc\r\n0\r\n\r\n"));
    }
}
