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

pub mod chunk;
pub mod header;
pub mod writer;

use crate::core::net;

pub use self::chunk::{
    read_chunk, read_chunk_size, read_chunked_body, read_trailer, write_chunk, write_trailer,
};
pub use self::header::{status_allows_body, write_header, BodySize, ResponseHeader, Trailer};
pub use self::writer::{ChunkedBodyWriter, State};

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("failed to write header: {0}")]
    HeaderEncodeFailed(#[source] net::Error),

    #[error("failed to write chunk: {0}")]
    ChunkWriteFailed(#[source] net::Error),

    #[error("failed to write trailer: {0}")]
    TrailerWriteFailed(#[source] net::Error),

    #[error("body already finalized")]
    Finalized,

    #[error(transparent)]
    Transport(#[from] net::Error),

    #[error(transparent)]
    Parse(#[from] httparse::Error),

    #[error("invalid chunk size")]
    InvalidChunkSize,

    #[error("invalid chunk suffix")]
    InvalidChunkSuffix,

    #[error("trailer too large")]
    TrailerTooLarge,

    #[error("chunk too large")]
    ChunkTooLarge,

    #[error("body too large")]
    BodyTooLarge,

    #[error("status {0} does not allow a body")]
    BodyNotAllowed(u16),

    #[error("invalid header: {0}")]
    InvalidHeader(String),

    #[error("forbidden trailer: {0}")]
    ForbiddenTrailer(String),
}
