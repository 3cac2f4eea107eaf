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

use chunkwire::core::config::Settings;
use chunkwire::core::conn::IoConn;
use chunkwire::core::http1::{read_chunked_body, ChunkedBodyWriter, ResponseHeader};
use chunkwire::core::log::{get_simple_logger, level_filter, local_offset_check};
use chunkwire::core::net::Conn;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::error::Error;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process;

#[derive(Parser, Debug)]
#[command(
    name = "chunkwire",
    version,
    about = "Encode and decode chunked HTTP/1.1 response bodies"
)]
struct CliArgs {
    /// Config file (TOML or INI)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level, 0 (errors only) to 4 (trace). Overrides the config file
    #[arg(long, value_name = "N")]
    log_level: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a body from stdin and write it to stdout as a chunked response
    Encode {
        /// Response status code
        #[arg(short = 's', long, value_name = "CODE", default_value_t = 200)]
        status: u16,

        /// Response header, may be repeated
        #[arg(short = 'H', long = "header", value_name = "K: V")]
        headers: Vec<String>,

        /// Trailer field sent after the body, may be repeated
        #[arg(short = 'T', long = "trailer", value_name = "K: V")]
        trailers: Vec<String>,
    },

    /// Read a chunked body. The payload goes to stdout and the trailers to
    /// stderr
    Decode {
        /// Read from a TCP peer instead of stdin
        #[arg(long, value_name = "HOST:PORT")]
        connect: Option<String>,
    },
}

fn parse_field(s: &str) -> Result<(&str, &str), Box<dyn Error>> {
    match s.split_once(':') {
        Some((name, value)) => Ok((name.trim(), value.trim())),
        None => Err(format!("invalid field \"{}\", expected \"K: V\"", s).into()),
    }
}

// fills buf unless the input ends first. returns the number of bytes read
fn read_block<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<usize, io::Error> {
    let mut pos = 0;

    while pos < buf.len() {
        match r.read(&mut buf[pos..]) {
            Ok(0) => break,
            Ok(size) => pos += size,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    Ok(pos)
}

fn encode(
    settings: &Settings,
    status: u16,
    headers: &[String],
    trailers: &[String],
) -> Result<(), Box<dyn Error>> {
    let mut resp = ResponseHeader::new(status);

    for h in headers {
        let (name, value) = parse_field(h)?;
        resp.add(name, value.as_bytes())?;
    }

    for t in trailers {
        let (name, value) = parse_field(t)?;
        resp.trailer_mut().add(name, value.as_bytes())?;
    }

    let mut input = io::stdin().lock();
    let mut conn = IoConn::new(io::empty(), io::stdout().lock());

    let mut block = vec![0; settings.block_size];
    let mut total = 0;

    {
        let mut w = ChunkedBodyWriter::new(&mut resp, &mut conn);

        loop {
            let size = read_block(&mut input, &mut block)?;
            if size == 0 {
                break;
            }

            w.write(&block[..size])?;
            w.flush()?;

            total += size;
        }

        w.finalize()?;
    }

    conn.close()?;

    info!("encoded {} body bytes", total);

    Ok(())
}

fn decode_from<C: Conn>(conn: &mut C, settings: &Settings) -> Result<(), Box<dyn Error>> {
    let (body, trailer) = read_chunked_body(conn, settings.max_body_size)?;

    let mut out = io::stdout().lock();
    out.write_all(&body)?;
    out.flush()?;

    let mut err = io::stderr().lock();
    for (name, value) in trailer.iter() {
        writeln!(err, "{}: {}", name, String::from_utf8_lossy(value))?;
    }

    info!("decoded {} body bytes", body.len());

    Ok(())
}

fn decode(settings: &Settings, connect: Option<&str>) -> Result<(), Box<dyn Error>> {
    match connect {
        Some(addr) => {
            let stream = TcpStream::connect(addr)?;

            let mut conn = IoConn::from_tcp(stream)?;
            conn.set_read_timeout(settings.read_timeout())?;

            debug!("reading from {:?}", conn.remote_addr());

            let ret = decode_from(&mut conn, settings);

            conn.close()?;

            ret
        }
        None => {
            if settings.read_timeout().is_some() {
                warn!("read_timeout_ms only applies to --connect, ignoring");
            }

            let mut conn = IoConn::with_buffer_size(
                io::stdin().lock(),
                io::sink(),
                settings.read_buffer_size,
            );

            decode_from(&mut conn, settings)
        }
    }
}

fn process_args_and_run(args: CliArgs) -> Result<(), Box<dyn Error>> {
    let settings = Settings::new(args.config.as_deref())?;

    log::set_logger(get_simple_logger())?;
    log::set_max_level(level_filter(args.log_level.unwrap_or(settings.log_level)));

    local_offset_check();

    debug!("settings: {:?}", settings);

    match &args.command {
        Command::Encode {
            status,
            headers,
            trailers,
        } => encode(&settings, *status, headers, trailers),
        Command::Decode { connect } => decode(&settings, connect.as_deref()),
    }
}

fn main() {
    let args = CliArgs::parse();

    if let Err(e) = process_args_and_run(args) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("Content-Type: text/plain").unwrap(),
            ("Content-Type", "text/plain")
        );
        assert_eq!(parse_field("X-A:b:c").unwrap(), ("X-A", "b:c"));
        assert!(parse_field("nocolon").is_err());
    }

    #[test]
    fn test_read_block() {
        let mut r = io::Cursor::new(b"abcdefg".to_vec());
        let mut buf = [0u8; 3];

        assert_eq!(read_block(&mut r, &mut buf).unwrap(), 3);
        assert_eq!(&buf, b"abc");
        assert_eq!(read_block(&mut r, &mut buf).unwrap(), 3);
        assert_eq!(read_block(&mut r, &mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"g");
        assert_eq!(read_block(&mut r, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_cli_args() {
        let args = CliArgs::try_parse_from([
            "chunkwire",
            "--log-level",
            "3",
            "encode",
            "-s",
            "201",
            "-H",
            "Content-Type: text/plain",
            "-T",
            "X-Checksum: abc",
        ])
        .unwrap();

        assert_eq!(args.log_level, Some(3));

        match args.command {
            Command::Encode {
                status,
                headers,
                trailers,
            } => {
                assert_eq!(status, 201);
                assert_eq!(headers, vec!["Content-Type: text/plain".to_string()]);
                assert_eq!(trailers, vec!["X-Checksum: abc".to_string()]);
            }
            c => panic!("unexpected command: {:?}", c),
        }

        let args = CliArgs::try_parse_from(["chunkwire", "decode"]).unwrap();
        assert!(matches!(args.command, Command::Decode { connect: None }));

        let args =
            CliArgs::try_parse_from(["chunkwire", "decode", "--connect", "127.0.0.1:8080"])
                .unwrap();

        match args.command {
            Command::Decode { connect } => assert_eq!(connect.as_deref(), Some("127.0.0.1:8080")),
            c => panic!("unexpected command: {:?}", c),
        }
    }
}
