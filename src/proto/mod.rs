//! The DNS wire format: reading and writing headers, questions, resource records and whole
//! packets. Compressed names are understood when reading but never produced when writing.

mod domain_name;
mod header;
mod macros;
mod packet;
mod question;
mod reader;
mod record;
mod types;

use thiserror::Error;

pub use self::domain_name::{DomainName, DomainNameError, MAX_LABEL_LENGTH, MAX_NAME_LENGTH};
pub use self::header::{Header, Opcode, PacketFlags, PacketType, ResponseCode};
pub use self::packet::{Packet, PacketBuilder};
pub use self::question::Question;
pub use self::reader::{ByteReader, ReadError};
pub use self::record::{Record, RecordData, RecordError};
pub use self::types::{Class, Type};

/// The maximum size of a message over plain UDP.
pub const MAX_UDP_MESSAGE_SIZE: usize = 512;

#[derive(Debug, Error)]
pub enum PacketError {
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error(transparent)]
    DomainName(#[from] DomainNameError),
}
