//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use sdnrace_utils::ids::{Dpid, HostId, PacketTag, SwitchId};
use sdnrace_utils::openflow::DecodeError;
use tracing::{error, warn};

// Logger errors.
#[derive(Debug)]
pub enum Error {
    // I/O errors
    IoError(IoError),
    // Trace assembly
    TraceNotOpen,
    HandleEndWithoutBegin(Dpid),
    HostHandleEndWithoutBegin(HostId),
    PacketUpdateEndWithoutBegin(Dpid),
    PacketUpdateTagMissing(Dpid, PacketTag),
    MessageDecodeError(Dpid, DecodeError),
    // Controller instrumentation
    UnmatchedControllerMsgIn(SwitchId),
}

// Logger I/O errors.
#[derive(Debug)]
pub enum IoError {
    TraceFileOpen(std::io::Error),
    TraceFileWrite(std::io::Error),
    ControllerPipeRead(std::io::Error),
}

// ===== impl Error =====

impl Error {
    pub(crate) fn log(&self) {
        match self {
            Error::IoError(error) => {
                error.log();
            }
            Error::TraceNotOpen => {
                warn!("{}", self);
            }
            Error::HandleEndWithoutBegin(dpid) => {
                warn!(%dpid, "{}", self);
            }
            Error::HostHandleEndWithoutBegin(hid) => {
                warn!(%hid, "{}", self);
            }
            Error::PacketUpdateEndWithoutBegin(dpid) => {
                warn!(%dpid, "{}", self);
            }
            Error::PacketUpdateTagMissing(dpid, tag) => {
                warn!(%dpid, %tag, "{}", self);
            }
            Error::MessageDecodeError(dpid, error) => {
                warn!(%dpid, error = %with_source(error), "{}", self);
            }
            Error::UnmatchedControllerMsgIn(swid) => {
                // The switch always logs the send before the controller can
                // print a line about it, so this is a fatal-class trace bug.
                error!(%swid, "{}", self);
            }
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(error) => error.fmt(f),
            Error::TraceNotOpen => {
                write!(f, "trace file is not open")
            }
            Error::HandleEndWithoutBegin(..) => {
                write!(f, "switch handle end without a matching begin")
            }
            Error::HostHandleEndWithoutBegin(..) => {
                write!(f, "host handle end without a matching begin")
            }
            Error::PacketUpdateEndWithoutBegin(..) => {
                write!(f, "packet update end without a matching begin")
            }
            Error::PacketUpdateTagMissing(..) => {
                write!(f, "packet update tag is no longer registered")
            }
            Error::MessageDecodeError(..) => {
                write!(f, "failed to decode OpenFlow message")
            }
            Error::UnmatchedControllerMsgIn(..) => {
                write!(f, "controller MessageIn has no matching message send")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(error) => Some(error),
            Error::MessageDecodeError(_, error) => Some(error),
            _ => None,
        }
    }
}

impl From<IoError> for Error {
    fn from(error: IoError) -> Error {
        Error::IoError(error)
    }
}

// ===== impl IoError =====

impl IoError {
    pub(crate) fn log(&self) {
        match self {
            IoError::TraceFileOpen(error)
            | IoError::TraceFileWrite(error)
            | IoError::ControllerPipeRead(error) => {
                warn!(error = %with_source(error), "{}", self);
            }
        }
    }
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::TraceFileOpen(..) => {
                write!(f, "failed to create trace file")
            }
            IoError::TraceFileWrite(..) => {
                write!(f, "failed to write to trace file")
            }
            IoError::ControllerPipeRead(..) => {
                write!(f, "failed to read from controller pipe")
            }
        }
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoError::TraceFileOpen(error)
            | IoError::TraceFileWrite(error)
            | IoError::ControllerPipeRead(error) => Some(error),
        }
    }
}

// ===== global functions =====

fn with_source<E: std::error::Error>(error: E) -> String {
    if let Some(source) = error.source() {
        format!("{} ({})", error, with_source(source))
    } else {
        error.to_string()
    }
}
