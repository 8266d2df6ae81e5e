//! All possible errors.

use std::io;
use std::string;
use std::sync::{MutexGuard, PoisonError};

use cfb8::cipher::errors::InvalidLength;
use quick_error::quick_error;

quick_error! {
    #[derive(Debug)]
    pub enum Error {
        Io(err: io::Error) {
            from()
            display("io error: {}", err)
            source(err)
        }
        FromUtf8Error(err: string::FromUtf8Error) {
            from()
            display("invalid utf-8: {}", err)
            source(err)
        }
        FromUtf16Error(err: string::FromUtf16Error) {
            from()
            display("invalid utf-16: {}", err)
            source(err)
        }
        InvalidKeyLen(err: InvalidLength) {
            from()
            display("invalid cipher key length: {}", err)
            source(err)
        }
        InvalidValue(err: InvalidValue) {
            from()
            display("{}", err)
        }
        VersionMismatch(expected: u32, actual: u32) {
            display("version mismatch: expected {}, got {}", expected, actual)
        }
        UnexpectedHandshakeOpcode(opcode: u16) {
            display("unexpected handshake opcode: {:#06x}", opcode)
        }
        UnexpectedOpcode(opcode: u16) {
            display("unexpected opcode: {:#06x}", opcode)
        }
        ShortFrame {
            display("frame shorter than a packet header")
        }
        ConnectionClosed {
            display("connection closed by peer")
        }
        NotConnected {
            display("transport is not connected")
        }
        Timeout {
            display("timed out waiting for a reply")
        }
        MigrationFailed(code: u8) {
            display("migration failed with code {}", code)
        }
        InvalidArgument(reason: String) {
            display("invalid argument: {}", reason)
        }
    }
}

#[derive(Debug)]
pub struct InvalidValue {
    pub expected: String,
}

impl std::error::Error for InvalidValue {}

impl std::fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid value received, expected: {}", self.expected)
    }
}

/// Error while reading/writing through a transport whose internal state is
/// behind a `Mutex`.
#[derive(Debug)]
pub enum ConnectionError<'a, T> {
    LockError(PoisonError<MutexGuard<'a, T>>),
    Error(Error),
}

impl<'a, T> From<PoisonError<MutexGuard<'a, T>>> for ConnectionError<'a, T> {
    fn from(item: PoisonError<MutexGuard<'a, T>>) -> Self {
        Self::LockError(item)
    }
}

impl<'a, T> From<Error> for ConnectionError<'a, T> {
    fn from(item: Error) -> Self {
        Self::Error(item)
    }
}

pub type FieldResult<T> = Result<T, Error>;
