// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! station-wire: IPC wire DTOs and length-prefixed JSON framing.
//!
//! Wire format: a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! payload, one object per frame, over a Unix domain socket connection per
//! direction (command/response, event fan-in).

pub mod command;
pub mod event;
pub mod framing;
pub mod register;
pub mod response;

pub use command::{Command, CommandType};
pub use event::{
    BarcodeScannedData, ErrorData, Event, EventType, InputRequestData, LogData, SequenceCompleteData,
    StatusUpdateData, StepCompleteData, StepStartData, WipProcessCompleteData,
};
pub use framing::{read_message, write_message, FramingError, MAX_FRAME_LEN};
pub use register::{Register, RegisterAck, RegisterMessageType, REGISTER_ACK_TIMEOUT};
pub use response::{Response, ResponseStatus};
