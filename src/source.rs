//! Input byte sources.
//!
//! The receiver reads raw bytes from a file, the standard input, a serial
//! device or a TCP connection, selected by a source specification string.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::net::TcpStream;

/// A byte source for the receiver.
///
/// Recognized specification strings:
///
/// - `filepath` or `file:filepath` reads from a file,
/// - `serial:dev:baudrate` reads from a serial device node (the line speed
///   must be configured externally, for instance with `stty`),
/// - `net:ip:port` connects over TCP,
/// - no specification reads from the standard input.
///
/// The underlying handle is released when the source is dropped.
#[derive(Debug)]
pub enum Source {
    /// Standard input.
    Stdin(io::Stdin),
    /// A file or serial device node.
    File(File),
    /// A TCP connection.
    Tcp(TcpStream),
}

impl Source {
    /// Opens a source from its specification string.
    pub fn open(spec: Option<&str>) -> io::Result<Source> {
        let Some(spec) = spec else {
            log::info!("no source specification given: reading from stdin");
            return Ok(Source::Stdin(io::stdin()));
        };
        let mut parts = spec.splitn(3, ':');
        let head = parts.next().unwrap();
        match (head, parts.next(), parts.next()) {
            ("file", Some(path), None) => Ok(Source::File(File::open(path)?)),
            ("serial", Some(dev), Some(_baudrate)) => {
                log::info!("opening serial device {}", dev);
                Ok(Source::File(File::open(dev)?))
            }
            ("net", Some(ip), Some(port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| invalid_spec(spec, "port is not a number"))?;
                log::info!("connecting to {}:{}", ip, port);
                Ok(Source::Tcp(TcpStream::connect((ip, port))?))
            }
            (path, None, None) => Ok(Source::File(File::open(path)?)),
            _ => Err(invalid_spec(spec, "unrecognized source form")),
        }
    }
}

fn invalid_spec(spec: &str, reason: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("invalid source specification '{spec}': {reason}"),
    )
}

impl Read for Source {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Stdin(stdin) => stdin.read(buf),
            Source::File(file) => file.read(buf),
            Source::Tcp(stream) => stream.read(buf),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Stdin(_) => "stdin".fmt(f),
            Source::File(_) => "file".fmt(f),
            Source::Tcp(_) => "tcp".fmt(f),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bad_specs() {
        assert!(Source::open(Some("serial:/dev/ttyUSB0")).is_err());
        assert!(Source::open(Some("net:localhost")).is_err());
        assert!(Source::open(Some("net:localhost:notaport")).is_err());
        assert!(Source::open(Some("bogus:a:b")).is_err());
    }

    #[test]
    fn file_spec() {
        let dir = std::env::temp_dir().join("osnma-rx-test-source");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("input.bin");
        std::fs::write(&path, b"abc").unwrap();
        let spec = format!("file:{}", path.display());
        let mut source = Source::open(Some(&spec)).unwrap();
        let mut contents = Vec::new();
        source.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"abc");
        // A bare path works too
        let spec = format!("{}", path.display());
        assert!(Source::open(Some(&spec)).is_ok());
        let _ = std::fs::remove_file(&path);
    }
}
