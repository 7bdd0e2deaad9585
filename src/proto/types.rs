use super::macros::define_code;

define_code! {
    /// The type of a resource record or of the record asked for in a question.
    ///
    /// Only A, NS, CNAME, PTR, and MX have their data interpreted, every other type is carried
    /// as raw bytes.
    pub enum Type / Unknown("TYPE") {
        /// A host address
        A => 1,
        /// An authoritative name server
        NS => 2,
        /// The canonical name for an alias
        CNAME => 5,
        /// Marks the start of a zone of authority
        SOA => 6,
        /// A domain name pointer
        PTR => 12,
        /// Host information
        HINFO => 13,
        /// Mailbox or mail list information
        MINFO => 14,
        /// Mail exchange
        MX => 15,
        /// Text strings
        TXT => 16,
        AAAA => 28,
        SRV => 33,
        OPT => 41,
        /// A request for all records (question only)
        ANY => 255,
    }
}

define_code! {
    pub enum Class / Unknown("CLASS") {
        /// The Internet
        IN => 1,
        /// The CHAOS class
        CH => 3,
        /// Hesiod
        HS => 4,
        ANY => 255,
    }
}
