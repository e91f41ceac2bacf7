use std::convert::From;
use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::io;
use std::result;

/// StatusCode describes the various failure modes of storage operations.
#[derive(Clone, Debug, PartialEq)]
pub enum StatusCode {
    NotFound,
    Corruption,
    NotSupported,
    InvalidArgument,
    IOError,
}

/// Status encapsulates a `StatusCode` and an error message. It can be displayed, and also
/// implements `Error`.
#[derive(Clone, Debug, PartialEq)]
pub struct Status {
    pub code: StatusCode,
    pub err: String,
}

impl Display for Status {
    fn fmt(&self, fmt: &mut Formatter) -> result::Result<(), fmt::Error> {
        fmt.write_str(&self.err)
    }
}

impl Error for Status {}

impl Status {
    pub fn new(code: StatusCode, msg: &str) -> Status {
        let err = if msg.is_empty() {
            format!("{:?}", code)
        } else {
            format!("{:?}: {}", code, msg)
        };
        Status { code, err }
    }

    pub fn annotate<S: AsRef<str>>(self, msg: S) -> Status {
        Status {
            code: self.code,
            err: format!("{}: {}", msg.as_ref(), self.err),
        }
    }
}

/// The crate-wide result type.
pub type Result<T> = result::Result<T, Status>;

impl From<io::Error> for Status {
    fn from(e: io::Error) -> Status {
        let c = match e.kind() {
            io::ErrorKind::NotFound => StatusCode::NotFound,
            io::ErrorKind::InvalidData => StatusCode::Corruption,
            io::ErrorKind::InvalidInput => StatusCode::InvalidArgument,
            _ => StatusCode::IOError,
        };

        Status::new(c, &e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        let s = Status::new(StatusCode::Corruption, "bad block");
        assert_eq!(format!("{}", s), "Corruption: bad block");
        let s = Status::new(StatusCode::NotFound, "");
        assert_eq!(format!("{}", s), "NotFound");
    }

    #[test]
    fn test_status_annotate() {
        let s = Status::new(StatusCode::IOError, "disk gone").annotate("while flushing");
        assert_eq!(s.code, StatusCode::IOError);
        assert_eq!(s.err, "while flushing: IOError: disk gone");
    }

    #[test]
    fn test_status_from_io() {
        let e = io::Error::new(io::ErrorKind::InvalidData, "truncated");
        assert_eq!(Status::from(e).code, StatusCode::Corruption);
        let e = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        assert_eq!(Status::from(e).code, StatusCode::IOError);
    }
}
