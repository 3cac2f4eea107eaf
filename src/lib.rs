/*
 * Copyright (C) 2020-2023 Fanout, Inc.
 * Copyright (C) 2024-2026 Fastly, Inc.
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

//! Chunked HTTP/1.1 response bodies over buffered transports.
//!
//! Transports expose their buffers directly (see [`core::net`]) and
//! [`core::http1::ChunkedBodyWriter`] frames a body of unknown length into
//! them. [`core::mock`] provides in-memory transports for tests.

pub mod core;
