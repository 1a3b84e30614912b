// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {crate::client::scanner::ScanError, thiserror::Error};

/// Errors which parsing a received frame can produce. Malformed frames are dropped
/// by the state machines, so these never escalate beyond a log line.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameParseError {
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },
    #[error("invalid value for field \"{0}\"")]
    InvalidFieldValue(&'static str),
    #[error("unsupported frame type")]
    UnsupportedFrameType,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error parsing frame: {0}")]
    ParsingFrame(#[from] FrameParseError),
    #[error("error writing frame: {0}")]
    WritingFrame(&'static str),
    #[error("scan error: {0}")]
    ScanError(#[from] ScanError),
    #[error("device failure in {0}")]
    Device(&'static str),
    #[error("failed to arm timer for deadline {0:?}")]
    Timer(crate::time::Time),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
    #[error("{0}")]
    Status(String),
}

impl Error {
    pub fn status(msg: impl Into<String>) -> Self {
        Error::Status(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, anyhow::format_err};

    #[test]
    fn error_display() {
        let e = Error::from(FrameParseError::FrameTooShort { expected: 24, actual: 10 });
        assert_eq!(
            e.to_string(),
            "error parsing frame: frame too short: expected at least 24 bytes, got 10"
        );

        let e = Error::from(format_err!("lorem"));
        assert_eq!(e.to_string(), "lorem");

        let e = Error::Device("set_channel");
        assert_eq!(e.to_string(), "device failure in set_channel");
    }
}
