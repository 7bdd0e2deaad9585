use std::{fmt, sync::Arc};

use bytes::{BufMut, BytesMut};

use super::{
    header::{Header, Opcode, PacketFlags, PacketType, ResponseCode},
    question::Question,
    reader::ByteReader,
    record::Record,
    PacketError,
};

/// A full DNS message. Records are shared so the same allocations can be held by the cache and
/// by any number of packets at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<Arc<Record>>,
    authority: Vec<Arc<Record>>,
    additional: Vec<Arc<Record>>,
}

#[derive(Debug, Clone)]
pub struct PacketBuilder {
    packet: Packet,
}

/// The counts come from the wire, so only trust them up to a point when reserving space.
fn entry_vec<T>(entries: u16) -> Vec<T> {
    Vec::with_capacity(usize::from(entries.min(16)))
}

fn parse_records(
    reader: &mut ByteReader<'_>,
    entries: u16,
) -> Result<Vec<Arc<Record>>, PacketError> {
    let mut records = entry_vec(entries);
    for _ in 0..entries {
        records.push(Arc::new(Record::parse(reader)?));
    }
    Ok(records)
}

impl Packet {
    pub fn builder(id: u16) -> PacketBuilder {
        PacketBuilder::new(id)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn id(&self) -> u16 {
        self.header.id
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn answers(&self) -> &[Arc<Record>] {
        &self.answers
    }

    pub fn authority(&self) -> &[Arc<Record>] {
        &self.authority
    }

    pub fn additional(&self) -> &[Arc<Record>] {
        &self.additional
    }

    /// Parse a complete message. Exactly as many entries as the header announces are read for
    /// each section, trailing bytes after the last one are ignored.
    pub fn parse(bytes: &[u8]) -> Result<Self, PacketError> {
        let mut reader = ByteReader::new(bytes);
        let header = Header::parse(&mut reader)?;

        let mut questions = entry_vec(header.question_entries);
        for _ in 0..header.question_entries {
            questions.push(Question::parse(&mut reader)?);
        }
        let answers = parse_records(&mut reader, header.answer_entries)?;
        let authority = parse_records(&mut reader, header.authority_entries)?;
        let additional = parse_records(&mut reader, header.additional_entries)?;

        Ok(Self {
            header,
            questions,
            answers,
            authority,
            additional,
        })
    }

    pub fn len_in_packet(&self) -> usize {
        Header::SIZE
            + self.questions.iter().map(Question::len_in_packet).sum::<usize>()
            + self
                .records()
                .map(|record| record.len_in_packet())
                .sum::<usize>()
    }

    fn records(&self) -> impl Iterator<Item = &Arc<Record>> {
        self.answers
            .iter()
            .chain(self.authority.iter())
            .chain(self.additional.iter())
    }

    pub fn write_into<B: BufMut>(&self, buffer: &mut B) {
        self.header.write_into(buffer);
        for question in &self.questions {
            question.write_into(buffer);
        }
        for record in self.records() {
            record.write_into(buffer);
        }
    }

    pub fn to_bytes(&self) -> BytesMut {
        let mut buffer = BytesMut::with_capacity(self.len_in_packet());
        self.write_into(&mut buffer);
        buffer
    }

    /// Start a reply to this message: same id, opcode and recursion desired bit, with the
    /// response bit set.
    pub fn respond(&self, code: ResponseCode) -> PacketBuilder {
        let mut builder = PacketBuilder::new(self.header.id);
        let header = &mut builder.packet.header;
        header.set_packet_type(PacketType::Response);
        header.set_opcode_raw(self.header.opcode_raw());
        header.set_recursion_desired(self.header.recursion_desired());
        header.set_response_code(code);
        builder
    }
}

impl PacketBuilder {
    pub fn new(id: u16) -> Self {
        Self {
            packet: Packet {
                header: Header::new(id),
                questions: Vec::new(),
                answers: Vec::new(),
                authority: Vec::new(),
                additional: Vec::new(),
            },
        }
    }

    /// Start a standard query with the recursion desired bit set.
    pub fn query(id: u16) -> Self {
        Self::new(id).flags(PacketFlags::RECURSION_DESIRED)
    }

    /// Replace all header flags at once.
    pub fn flags(mut self, flags: PacketFlags) -> Self {
        self.packet.header.set_flags(flags);
        self
    }

    pub fn raw_flags(mut self, flags: u16) -> Self {
        self.packet.header.set_raw_flags(flags);
        self
    }

    pub fn opcode(mut self, opcode: Opcode) -> Self {
        self.packet.header.set_opcode(opcode);
        self
    }

    pub fn response_code(mut self, code: ResponseCode) -> Self {
        self.packet.header.set_response_code(code);
        self
    }

    pub fn recursion_available(mut self, value: bool) -> Self {
        self.packet.header.set_recursion_available(value);
        self
    }

    pub fn question(mut self, question: Question) -> Self {
        self.packet.questions.push(question);
        self.packet.header.question_entries += 1;
        self
    }

    pub fn answer(mut self, record: impl Into<Arc<Record>>) -> Self {
        self.packet.answers.push(record.into());
        self.packet.header.answer_entries += 1;
        self
    }

    /// Add every record of `records` to the answer section, sharing them.
    pub fn answers<'a>(mut self, records: impl IntoIterator<Item = &'a Arc<Record>>) -> Self {
        for record in records {
            self = self.answer(Arc::clone(record));
        }
        self
    }

    pub fn authority(mut self, record: impl Into<Arc<Record>>) -> Self {
        self.packet.authority.push(record.into());
        self.packet.header.authority_entries += 1;
        self
    }

    pub fn additional(mut self, record: impl Into<Arc<Record>>) -> Self {
        self.packet.additional.push(record.into());
        self.packet.header.additional_entries += 1;
        self
    }

    pub fn build(self) -> Packet {
        self.packet
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.header)?;
        writeln!(f, ";; QUESTION SECTION:")?;
        for question in &self.questions {
            writeln!(f, "{question}")?;
        }
        for (title, records) in [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authority),
            ("ADDITIONAL", &self.additional),
        ] {
            if records.is_empty() {
                continue;
            }
            writeln!(f, ";; {title} SECTION:")?;
            for record in records {
                writeln!(f, "{record}")?;
            }
        }
        Ok(())
    }
}
