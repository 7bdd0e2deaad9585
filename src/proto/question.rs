use std::fmt;

use bytes::BufMut;

use super::{
    domain_name::DomainName,
    reader::ByteReader,
    types::{Class, Type},
    PacketError,
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Question {
    name: DomainName,
    q_type: Type,
    q_class: Class,
}

impl Question {
    pub fn new(name: DomainName, q_type: Type, q_class: Class) -> Self {
        Self {
            name,
            q_type,
            q_class,
        }
    }

    pub fn name(&self) -> &DomainName {
        &self.name
    }

    pub fn q_type(&self) -> Type {
        self.q_type
    }

    pub fn q_class(&self) -> Class {
        self.q_class
    }

    pub fn len_in_packet(&self) -> usize {
        4 + self.name.len_in_packet()
    }

    pub fn write_into<B: BufMut>(&self, buffer: &mut B) {
        self.name.write_into(buffer);
        buffer.put_u16(self.q_type.as_u16());
        buffer.put_u16(self.q_class.as_u16());
    }

    pub fn parse(reader: &mut ByteReader<'_>) -> Result<Self, PacketError> {
        let name = DomainName::new(&reader.read_domain()?)?;
        let q_type = Type::from(reader.read_u16()?);
        let q_class = Class::from(reader.read_u16()?);
        Ok(Self {
            name,
            q_type,
            q_class,
        })
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.name, self.q_class, self.q_type)
    }
}
