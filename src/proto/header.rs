//! The DNS packet header is a struct with an id a few flags and the number of questions, answers,
//! name servers in the authority section, and the number of additional records. The structure is
//! as the following, and multibyte items are in big endian order.
//! ```text
//!                                     1  1  1  1  1  1
//!       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |                      ID                       |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |                    QDCOUNT                    |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |                    ANCOUNT                    |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |                    NSCOUNT                    |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//!     |                    ARCOUNT                    |
//!     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//! ```
//!
//! - **ID**: The id of the packet, copied into the response so that the requester can match
//!   replies to outstanding queries.
//! - **QR**: Defines if the packet is a query (0) or a response (1). Maps to [PacketType].
//! - **Opcode**: What kind of query the packet is for. See [Opcode].
//! - **AA**: Set when the responding name server is an authority for the domain name.
//! - **TC**: Set when the message was truncated by the transmission channel.
//! - **RD**: Asks the name server to pursue the query recursively.
//! - **RA**: Set in responses to indicate that the server supports recursive queries.
//! - **Z**: Reserved, must be 0.
//! - **AD / CD**: The DNSSEC authentic data and checking disabled bits. They are carried but
//!   never acted upon.
//! - **RCODE**: The response code, see [ResponseCode].
//! - **QDCOUNT / ANCOUNT / NSCOUNT / ARCOUNT**: The amount of entries in each of the sections.
//!
//! All flags live in one 16 bit field and are read and written through masks. The opcode and
//! response code are 4 bit wide, so raw values that do not fit are truncated by the mask.

use std::{fmt, ops::BitOr};

use bytes::BufMut;

use super::reader::{ByteReader, ReadError};

const QR_MASK: u16 = 1 << 15;
const OPCODE_SHIFT: u16 = 11;
const OPCODE_MASK: u16 = 0xf << OPCODE_SHIFT;
const AA_MASK: u16 = 1 << 10;
const TC_MASK: u16 = 1 << 9;
const RD_MASK: u16 = 1 << 8;
const RA_MASK: u16 = 1 << 7;
const Z_MASK: u16 = 1 << 6;
const AD_MASK: u16 = 1 << 5;
const CD_MASK: u16 = 1 << 4;
const RCODE_MASK: u16 = 0x000f;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    Query,
    Response,
}

impl PacketType {
    pub const fn as_u8(&self) -> u8 {
        match self {
            Self::Query => 0,
            Self::Response => 1,
        }
    }

    /// Read the QR bit straight from a raw message without decoding anything else.
    pub const fn of(message: &[u8]) -> Option<Self> {
        if message.len() < 3 {
            None
        } else if (message[2] & 0x80) == 0x80 {
            Some(Self::Response)
        } else {
            Some(Self::Query)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Query,
    InverseQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl Opcode {
    pub const fn as_u8(&self) -> u8 {
        match self {
            Opcode::Query => 0,
            Opcode::InverseQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(code) => *code,
        }
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::InverseQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            code => Opcode::Unknown(code),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    /// No error condition
    NoError,
    /// The name server was unable to interpret the query.
    FormatError,
    /// The name server was unable to process this query due to
    /// a problem with the name server.
    ServerFailure,
    /// Meaningful only for responses from an authoritative name
    /// server, this code signifies that the domain name referenced
    /// in the query does not exist.
    NameError,
    /// The name server does not support the requested kind of query.
    NotImplemented,
    /// The name server refuses to perform the specified operation
    /// for policy reasons.
    Refused,
    Unknown(u8),
}

impl ResponseCode {
    pub const fn as_u8(&self) -> u8 {
        match self {
            ResponseCode::NoError => 0,
            ResponseCode::FormatError => 1,
            ResponseCode::ServerFailure => 2,
            ResponseCode::NameError => 3,
            ResponseCode::NotImplemented => 4,
            ResponseCode::Refused => 5,
            ResponseCode::Unknown(code) => *code,
        }
    }
}

impl From<u8> for ResponseCode {
    fn from(value: u8) -> Self {
        match value {
            0 => ResponseCode::NoError,
            1 => ResponseCode::FormatError,
            2 => ResponseCode::ServerFailure,
            3 => ResponseCode::NameError,
            4 => ResponseCode::NotImplemented,
            5 => ResponseCode::Refused,
            code => ResponseCode::Unknown(code),
        }
    }
}

/// The single bit header flags, combinable with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(u16);

impl PacketFlags {
    pub const NONE: Self = Self(0);
    pub const RESPONSE: Self = Self(QR_MASK);
    pub const AUTHORITATIVE: Self = Self(AA_MASK);
    pub const TRUNCATED: Self = Self(TC_MASK);
    pub const RECURSION_DESIRED: Self = Self(RD_MASK);
    pub const RECURSION_AVAILABLE: Self = Self(RA_MASK);

    pub const fn bits(&self) -> u16 {
        self.0
    }

    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// A 16 bit identifier assigned by the program that
    /// generates any kind of query.  This identifier is copied
    /// the corresponding reply and can be used by the requester
    /// to match up replies to outstanding queries.
    ///
    /// Field: ID
    pub id: u16,

    /// Every single bit flag plus the opcode and response code.
    flags: u16,

    /// An unsigned 16 bit integer specifying the number of
    /// entries in the question section.
    ///
    /// Field: QDCOUNT
    pub question_entries: u16,

    /// An unsigned 16 bit integer specifying the number of
    /// resource records in the answer section.
    ///
    /// Field: ANCOUNT
    pub answer_entries: u16,

    /// An unsigned 16 bit integer specifying the number of name
    /// server resource records in the authority records
    /// section.
    ///
    /// Field: NSCOUNT
    pub authority_entries: u16,

    /// An unsigned 16 bit integer specifying the number of
    /// resource records in the additional records section.
    ///
    /// Field: ARCOUNT
    pub additional_entries: u16,
}

impl Header {
    pub const SIZE: usize = 12;

    pub fn new(id: u16) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub const fn raw_flags(&self) -> u16 {
        self.flags
    }

    pub fn set_raw_flags(&mut self, flags: u16) {
        self.flags = flags;
    }

    fn set_bit(&mut self, mask: u16, value: bool) {
        if value {
            self.flags |= mask;
        } else {
            self.flags &= !mask;
        }
    }

    /// Sets or clears all single bit flags to match `flags`. Opcode and response code are
    /// left untouched.
    pub fn set_flags(&mut self, flags: PacketFlags) {
        self.set_bit(QR_MASK, flags.contains(PacketFlags::RESPONSE));
        self.set_bit(AA_MASK, flags.contains(PacketFlags::AUTHORITATIVE));
        self.set_bit(TC_MASK, flags.contains(PacketFlags::TRUNCATED));
        self.set_bit(RD_MASK, flags.contains(PacketFlags::RECURSION_DESIRED));
        self.set_bit(RA_MASK, flags.contains(PacketFlags::RECURSION_AVAILABLE));
    }

    /// A one bit field that specifies whether this message is a
    /// query (0), or a response (1).
    ///
    /// Field: QR
    pub const fn packet_type(&self) -> PacketType {
        if (self.flags & QR_MASK) == QR_MASK {
            PacketType::Response
        } else {
            PacketType::Query
        }
    }

    pub const fn is_response(&self) -> bool {
        matches!(self.packet_type(), PacketType::Response)
    }

    pub fn set_packet_type(&mut self, packet_type: PacketType) {
        self.set_bit(QR_MASK, matches!(packet_type, PacketType::Response));
    }

    /// A four bit field that specifies kind of query in this
    /// message.  This value is set by the originator of a query
    /// and copied into the response.
    ///
    /// Field: Opcode
    pub fn opcode(&self) -> Opcode {
        Opcode::from(self.opcode_raw())
    }

    pub const fn opcode_raw(&self) -> u8 {
        ((self.flags & OPCODE_MASK) >> OPCODE_SHIFT) as u8
    }

    pub fn set_opcode(&mut self, opcode: Opcode) {
        self.set_opcode_raw(opcode.as_u8());
    }

    /// Only the low 4 bits of `opcode` are kept.
    pub fn set_opcode_raw(&mut self, opcode: u8) {
        self.flags &= !OPCODE_MASK;
        self.flags |= ((opcode as u16) << OPCODE_SHIFT) & OPCODE_MASK;
    }

    /// Authoritative Answer - this bit is valid in responses,
    /// and specifies that the responding name server is an
    /// authority for the domain name in question section.
    ///
    /// Field: AA
    pub const fn authoritive_answer(&self) -> bool {
        (self.flags & AA_MASK) == AA_MASK
    }

    pub fn set_authoritive_answer(&mut self, value: bool) {
        self.set_bit(AA_MASK, value);
    }

    /// TrunCation - specifies that this message was truncated
    /// due to length greater than that permitted on the
    /// transmission channel.
    ///
    /// Field: TC
    pub const fn truncated(&self) -> bool {
        (self.flags & TC_MASK) == TC_MASK
    }

    pub fn set_truncated(&mut self, value: bool) {
        self.set_bit(TC_MASK, value);
    }

    /// Recursion Desired - this bit may be set in a query and
    /// is copied into the response.  If RD is set, it directs
    /// the name server to pursue the query recursively.
    ///
    /// Field: RD
    pub const fn recursion_desired(&self) -> bool {
        (self.flags & RD_MASK) == RD_MASK
    }

    pub fn set_recursion_desired(&mut self, value: bool) {
        self.set_bit(RD_MASK, value);
    }

    /// Recursion Available - this be is set or cleared in a
    /// response, and denotes whether recursive query support is
    /// available in the name server.
    ///
    /// Field: RA
    pub const fn recursion_available(&self) -> bool {
        (self.flags & RA_MASK) == RA_MASK
    }

    pub fn set_recursion_available(&mut self, value: bool) {
        self.set_bit(RA_MASK, value);
    }

    /// Field: Z
    pub const fn z(&self) -> bool {
        (self.flags & Z_MASK) == Z_MASK
    }

    /// Field: AD
    pub const fn authentic_data(&self) -> bool {
        (self.flags & AD_MASK) == AD_MASK
    }

    pub fn set_authentic_data(&mut self, value: bool) {
        self.set_bit(AD_MASK, value);
    }

    /// Field: CD
    pub const fn checking_disabled(&self) -> bool {
        (self.flags & CD_MASK) == CD_MASK
    }

    pub fn set_checking_disabled(&mut self, value: bool) {
        self.set_bit(CD_MASK, value);
    }

    /// Response code - this 4 bit field is set as part of responses.
    ///
    /// Field: RCODE
    pub fn response_code(&self) -> ResponseCode {
        ResponseCode::from((self.flags & RCODE_MASK) as u8)
    }

    /// Only the low 4 bits of the code are kept.
    pub fn set_response_code(&mut self, code: ResponseCode) {
        self.flags &= !RCODE_MASK;
        self.flags |= (code.as_u8() as u16) & RCODE_MASK;
    }

    pub fn write_into<B: BufMut>(&self, buffer: &mut B) {
        buffer.put_u16(self.id);
        buffer.put_u16(self.flags);
        buffer.put_u16(self.question_entries);
        buffer.put_u16(self.answer_entries);
        buffer.put_u16(self.authority_entries);
        buffer.put_u16(self.additional_entries);
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, ReadError> {
        Ok(Self {
            id: reader.read_u16()?,
            flags: reader.read_u16()?,
            question_entries: reader.read_u16()?,
            answer_entries: reader.read_u16()?,
            authority_entries: reader.read_u16()?,
            additional_entries: reader.read_u16()?,
        })
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "id: {:#06x}", self.id)?;
        write!(f, "flags: {:?} {:?}", self.packet_type(), self.opcode())?;
        for (set, name) in [
            (self.authoritive_answer(), "aa"),
            (self.truncated(), "tc"),
            (self.recursion_desired(), "rd"),
            (self.recursion_available(), "ra"),
            (self.authentic_data(), "ad"),
            (self.checking_disabled(), "cd"),
        ] {
            if set {
                write!(f, " {name}")?;
            }
        }
        writeln!(f, " {:?}", self.response_code())?;
        write!(
            f,
            "qdcount: {} ancount: {} nscount: {} arcount: {}",
            self.question_entries,
            self.answer_entries,
            self.authority_entries,
            self.additional_entries
        )
    }
}
