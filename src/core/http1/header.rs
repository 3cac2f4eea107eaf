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

use super::Error;
use crate::core::net::{self, Writer};
use log::trace;
use std::io::Write;

// fields that carry framing, routing or authentication information and
// therefore may not be sent after the body
const FORBIDDEN_TRAILERS: &[&str] = &[
    "Age",
    "Authorization",
    "Cache-Control",
    "Content-Disposition",
    "Content-Encoding",
    "Content-Length",
    "Content-Range",
    "Content-Type",
    "Date",
    "Expect",
    "Expires",
    "Host",
    "Location",
    "Max-Forwards",
    "Pragma",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "Range",
    "Retry-After",
    "Set-Cookie",
    "Te",
    "Trailer",
    "Transfer-Encoding",
    "Vary",
    "Warning",
    "Www-Authenticate",
];

// headers the encoder derives from the body size
const FRAMING_HEADERS: &[&str] = &["Content-Length", "Transfer-Encoding", "Trailer"];

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum BodySize {
    NoBody,
    Known(usize),
    Unknown,
}

pub fn status_reason(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        _ => "Unknown Status Code",
    }
}

// content-md5 -> Content-Md5
pub fn canonical_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;

    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }

        upper = c == '-';
    }

    out
}

fn is_token_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&c)
}

fn validate(name: &str, value: &[u8]) -> Result<(), Error> {
    if name.is_empty() || !name.bytes().all(is_token_char) {
        return Err(Error::InvalidHeader(name.to_string()));
    }

    if value.iter().any(|&c| c == b'\r' || c == b'\n') {
        return Err(Error::InvalidHeader(name.to_string()));
    }

    Ok(())
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Trailer {
    fields: Vec<(String, Vec<u8>)>,
}

impl Trailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    fn check(name: &str, value: &[u8]) -> Result<String, Error> {
        validate(name, value)?;

        let name = canonical_name(name);

        if FORBIDDEN_TRAILERS.contains(&name.as_str()) {
            return Err(Error::ForbiddenTrailer(name));
        }

        Ok(name)
    }

    pub fn add(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        let name = Self::check(name, value)?;

        self.fields.push((name, value.to_vec()));

        Ok(())
    }

    // replaces all existing values of the field
    pub fn set(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        let name = Self::check(name, value)?;

        match self.fields.iter().position(|(n, _)| *n == name) {
            Some(pos) => {
                self.fields[pos].1 = value.to_vec();

                let mut index = 0;
                self.fields.retain(|(n, _)| {
                    let keep = index <= pos || *n != name;
                    index += 1;

                    keep
                });
            }
            None => self.fields.push((name, value.to_vec())),
        }

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    // value for the Trailer header announcing these fields
    pub fn declaration(&self) -> String {
        let mut names: Vec<&str> = Vec::new();

        for (name, _) in self.fields.iter() {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }

        names.join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct ResponseHeader {
    code: u16,
    reason: Option<String>,
    headers: Vec<(String, Vec<u8>)>,
    body_size: BodySize,
    trailer: Trailer,
}

impl Default for ResponseHeader {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ResponseHeader {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            reason: None,
            headers: Vec::new(),
            body_size: BodySize::Known(0),
            trailer: Trailer::new(),
        }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn set_code(&mut self, code: u16) {
        self.code = code;
    }

    pub fn reason(&self) -> &str {
        match &self.reason {
            Some(s) => s,
            None => status_reason(self.code),
        }
    }

    pub fn set_reason(&mut self, reason: &str) -> Result<(), Error> {
        if reason.contains(|c: char| c == '\r' || c == '\n') {
            return Err(Error::InvalidHeader(reason.to_string()));
        }

        self.reason = Some(reason.to_string());

        Ok(())
    }

    pub fn add(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        validate(name, value)?;

        self.headers.push((name.to_string(), value.to_vec()));

        Ok(())
    }

    pub fn set(&mut self, name: &str, value: &[u8]) -> Result<(), Error> {
        validate(name, value)?;

        self.remove(name);
        self.headers.push((name.to_string(), value.to_vec()));

        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_slice())
    }

    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    pub fn body_size(&self) -> BodySize {
        self.body_size
    }

    pub fn set_body_size(&mut self, body_size: BodySize) {
        self.body_size = body_size;
    }

    // None means the length is not known up front
    pub fn set_content_length(&mut self, len: Option<usize>) {
        self.body_size = match len {
            Some(len) => BodySize::Known(len),
            None => BodySize::Unknown,
        };
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn trailer_mut(&mut self) -> &mut Trailer {
        &mut self.trailer
    }
}

// informational, 204 and 304 responses never carry a body
pub fn status_allows_body(code: u16) -> bool {
    !matches!(code, 100..=199 | 204 | 304)
}

// encodes the status line and header block, handing it to the writer in a
// single write so that a failure leaves nothing partial behind
pub fn write_header<W: Writer + ?Sized>(h: &ResponseHeader, w: &mut W) -> Result<(), net::Error> {
    let mut out = Vec::new();

    let mut body_size = h.body_size();

    if !status_allows_body(h.code()) {
        body_size = BodySize::NoBody;
    }

    write!(out, "HTTP/1.1 {} {}\r\n", h.code(), h.reason())?;

    for (name, value) in h.iter() {
        // we'll override these headers
        if FRAMING_HEADERS.iter().any(|f| name.eq_ignore_ascii_case(f)) {
            continue;
        }

        write!(out, "{}: ", name)?;
        out.extend_from_slice(value);
        out.extend_from_slice(b"\r\n");
    }

    match body_size {
        BodySize::Known(x) => write!(out, "Content-Length: {}\r\n", x)?,
        BodySize::Unknown => {
            out.extend_from_slice(b"Transfer-Encoding: chunked\r\n");

            if !h.trailer().is_empty() {
                write!(out, "Trailer: {}\r\n", h.trailer().declaration())?;
            }
        }
        BodySize::NoBody => {}
    }

    out.extend_from_slice(b"\r\n");

    trace!("header block: {} bytes, body size {:?}", out.len(), body_size);

    w.write_all(&out)
}
