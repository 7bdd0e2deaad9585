//! Resource records.
//!
//! A record is the common header (owner name, type, class and TTL) plus one of a closed set of
//! data variants. Only the types the resolver acts upon are decoded; everything else is kept
//! as raw RDATA so it can be passed through unchanged.

use std::{fmt, net::Ipv4Addr};

use bytes::{BufMut, Bytes};
use thiserror::Error;

use super::{
    domain_name::DomainName,
    reader::ByteReader,
    types::{Class, Type},
    PacketError,
};

/// Size of the fixed part following the owner name: type, class, ttl and rdlength.
const FIXED_SIZE: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("The record data is {0} bytes long but at most 65535 bytes fit in a record")]
    DataTooLong(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    NS(DomainName),
    CNAME(DomainName),
    PTR(DomainName),
    MX {
        preference: u16,
        exchange: DomainName,
    },
    /// Data of a type that is not interpreted, kept as it was received.
    Unknown { typ: Type, data: Bytes },
}

impl RecordData {
    pub fn typ(&self) -> Type {
        match self {
            Self::A(_) => Type::A,
            Self::NS(_) => Type::NS,
            Self::CNAME(_) => Type::CNAME,
            Self::PTR(_) => Type::PTR,
            Self::MX { .. } => Type::MX,
            Self::Unknown { typ, .. } => *typ,
        }
    }

    pub fn len_in_packet(&self) -> usize {
        match self {
            Self::A(_) => 4,
            Self::NS(name) | Self::CNAME(name) | Self::PTR(name) => name.len_in_packet(),
            Self::MX { exchange, .. } => 2 + exchange.len_in_packet(),
            Self::Unknown { data, .. } => data.len(),
        }
    }

    fn write_into<B: BufMut>(&self, buffer: &mut B) {
        match self {
            Self::A(addr) => buffer.put_slice(&addr.octets()),
            Self::NS(name) | Self::CNAME(name) | Self::PTR(name) => name.write_into(buffer),
            Self::MX {
                preference,
                exchange,
            } => {
                buffer.put_u16(*preference);
                exchange.write_into(buffer);
            }
            Self::Unknown { data, .. } => buffer.put_slice(data),
        }
    }

    /// Decode the RDATA of a record of type `typ`. The reader only covers the RDATA.
    fn parse(typ: Type, rdata: &mut ByteReader<'_>) -> Result<Self, PacketError> {
        Ok(match typ {
            Type::A => Self::A(Ipv4Addr::from(rdata.read_u32()?)),
            Type::NS => Self::NS(read_name(rdata)?),
            Type::CNAME => Self::CNAME(read_name(rdata)?),
            Type::PTR => Self::PTR(read_name(rdata)?),
            Type::MX => Self::MX {
                preference: rdata.read_u16()?,
                exchange: read_name(rdata)?,
            },
            typ => Self::Unknown {
                typ,
                data: Bytes::copy_from_slice(rdata.read_bytes(rdata.remaining())?),
            },
        })
    }
}

fn read_name(reader: &mut ByteReader<'_>) -> Result<DomainName, PacketError> {
    Ok(DomainName::new(&reader.read_domain()?)?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    name: DomainName,
    class: Class,
    ttl: u32,
    data: RecordData,
}

impl Record {
    pub fn new(name: DomainName, ttl: u32, data: RecordData) -> Self {
        Self {
            name,
            class: Class::IN,
            ttl,
            data,
        }
    }

    pub fn a(name: DomainName, ttl: u32, addr: Ipv4Addr) -> Self {
        Self::new(name, ttl, RecordData::A(addr))
    }

    pub fn ns(name: DomainName, ttl: u32, host: DomainName) -> Self {
        Self::new(name, ttl, RecordData::NS(host))
    }

    pub fn cname(name: DomainName, ttl: u32, target: DomainName) -> Self {
        Self::new(name, ttl, RecordData::CNAME(target))
    }

    pub fn ptr(name: DomainName, ttl: u32, target: DomainName) -> Self {
        Self::new(name, ttl, RecordData::PTR(target))
    }

    pub fn mx(name: DomainName, ttl: u32, preference: u16, exchange: DomainName) -> Self {
        Self::new(
            name,
            ttl,
            RecordData::MX {
                preference,
                exchange,
            },
        )
    }

    pub fn unknown(
        name: DomainName,
        type_code: u16,
        ttl: u32,
        data: impl Into<Bytes>,
    ) -> Result<Self, RecordError> {
        let data = data.into();
        if data.len() > u16::MAX as usize {
            return Err(RecordError::DataTooLong(data.len()));
        }
        Ok(Self::new(
            name,
            ttl,
            RecordData::Unknown {
                typ: Type::from(type_code),
                data,
            },
        ))
    }

    pub fn name(&self) -> &DomainName {
        &self.name
    }

    pub fn typ(&self) -> Type {
        self.data.typ()
    }

    pub fn class(&self) -> Class {
        self.class
    }

    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    pub fn len_in_packet(&self) -> usize {
        self.name.len_in_packet() + FIXED_SIZE + self.data.len_in_packet()
    }

    pub fn write_into<B: BufMut>(&self, buffer: &mut B) {
        self.name.write_into(buffer);
        buffer.put_u16(self.typ().as_u16());
        buffer.put_u16(self.class.as_u16());
        buffer.put_u32(self.ttl);
        buffer.put_u16(self.data.len_in_packet() as u16);
        self.data.write_into(buffer);
    }

    /// Parse one record. However much of the RDATA the type specific decoder consumes, the
    /// reader is left exactly at the end of the RDATA afterwards.
    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, PacketError> {
        let name = read_name(reader)?;
        let typ = Type::from(reader.read_u16()?);
        let class = Class::from(reader.read_u16()?);
        let ttl = reader.read_u32()?;
        let data_len = reader.read_u16()? as usize;

        let mut rdata = reader.limited(data_len)?;
        let end = reader.position() + data_len;
        let data = RecordData::parse(typ, &mut rdata)?;
        reader.set_position(end)?;

        Ok(Self {
            name,
            class,
            ttl,
            data,
        })
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} ", self.name, self.ttl, self.class)?;
        match &self.data {
            RecordData::A(addr) => write!(f, "A {addr}"),
            RecordData::NS(host) => write!(f, "NS {host}"),
            RecordData::CNAME(target) => write!(f, "CNAME {target}"),
            RecordData::PTR(target) => write!(f, "PTR {target}"),
            RecordData::MX {
                preference,
                exchange,
            } => write!(f, "MX {preference} {exchange}"),
            RecordData::Unknown { typ, data } => {
                write!(f, "TYPE{} \\# {}", typ.as_u16(), data.len())?;
                if !data.is_empty() {
                    write!(f, " (")?;
                    for byte in data.iter() {
                        write!(f, " {byte:02X}")?;
                    }
                    write!(f, " )")?;
                }
                Ok(())
            }
        }
    }
}
