//! Protocol definitions for NEX communication.
//!
//! This module contains the low-level protocol pieces:
//! - Fragment classification and length tables
//! - Command encoding
//! - Fragment reassembly
//! - Status payload parsing

pub mod assembler;
pub mod command;
pub mod frame;
pub mod parser;

pub use assembler::{Completion, MessageReassembler};
pub use command::{CommandOpcode, encode_hello, encode_no_op, encode_turn_off, encode_turn_on};
pub use frame::{
    Fragment, HEADER_LEN, LengthTable, MESSAGE_MAGIC, MessageKind, classify_fragment,
};
pub use parser::{StatusLayout, parse_status};
