//! Modem wire protocol and serial transport.

pub mod frame;
pub mod message;
pub mod plmn;
pub mod runtime;
pub mod tty;

pub use frame::{build_command, is_valid_response, parse_frame, CommandFrame, ParsedMessage};
pub use message::{Command, MessageKind, MobileStatus, StatusSnapshot};
pub use runtime::{
    LineAssembler, PortOpener, PortReader, PortWriter, SerialConfig, SerialPortOpener, SplitPort,
};
