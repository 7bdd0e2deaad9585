//! The resolver worker.
//!
//! Requests are resolved one at a time and to completion: the worker owns the cache and a
//! blocking upstream socket, walks the hierarchy starting at a random root server, and follows
//! CNAME answers for address queries. Replies that carry no answer only move the walk on to the
//! next candidate unless [ReferralPolicy::Follow] is configured.

pub mod upstream;

use std::{
    collections::VecDeque,
    net::{IpAddr, SocketAddr},
    num::NonZeroUsize,
    sync::Arc,
    time::Duration,
};

use rand::Rng;
use thiserror::Error;

use crate::{
    cache::{empty_set, CacheKey, RecordSet, TlruCache},
    message::Message,
    proto::{
        Class, DomainName, Packet, PacketBuilder, PacketError, PacketFlags, PacketType, Question,
        RecordData, ResponseCode, Type,
    },
    queue::MessageQueue,
};

use self::upstream::{Upstream, UpstreamError, DNS_PORT, ROOT_SERVERS};

/// Upper bound of upstream queries for a single name, so that referral loops end.
const MAX_QUERIES_PER_NAME: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferralPolicy {
    /// A reply without answers counts as no answer from that server.
    #[default]
    Ignore,
    /// Continue with the name servers named in the authority section that have an address in
    /// the additional section.
    Follow,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub cache_capacity: NonZeroUsize,
    /// Deepest CNAME nesting that is still resolved.
    pub max_depth: usize,
    pub root_servers: Vec<SocketAddr>,
    pub upstream_timeout: Duration,
    pub referral_policy: ReferralPolicy,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: NonZeroUsize::new(4096).unwrap_or(NonZeroUsize::MIN),
            max_depth: 10,
            root_servers: ROOT_SERVERS
                .iter()
                .map(|addr| SocketAddr::new(IpAddr::V4(*addr), DNS_PORT))
                .collect(),
            upstream_timeout: Duration::from_secs(2),
            referral_policy: ReferralPolicy::Ignore,
        }
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("Message of {0} bytes is too short to reply to")]
    TooShort(usize),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Reply id {found:#06x} does not match query id {expected:#06x}")]
    IdMismatch { expected: u16, found: u16 },
}

pub struct Resolver<U> {
    config: ResolverConfig,
    cache: TlruCache,
    upstream: U,
}

impl<U: Upstream> Resolver<U> {
    pub fn new(config: ResolverConfig, upstream: U) -> Self {
        Self {
            cache: TlruCache::new(config.cache_capacity),
            config,
            upstream,
        }
    }

    pub fn cache(&self) -> &TlruCache {
        &self.cache
    }

    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Serve messages from `inbound` forever, pushing replies to `outbound`. A message that
    /// cannot be handled is logged and dropped.
    pub fn run(
        mut self,
        inbound: &MessageQueue<Message>,
        outbound: &MessageQueue<Message>,
    ) -> ! {
        loop {
            let message = inbound.pop();
            let peer = message.peer;
            match self.handle(message) {
                Ok(Some(reply)) => outbound.push(reply),
                Ok(None) => {}
                Err(err) => tracing::warn!("Dropping message from {peer}: {err}"),
            }
        }
    }

    /// Turn a client message into the reply to send back, reusing its buffer and peer.
    pub fn handle(&mut self, mut message: Message) -> Result<Option<Message>, ResolverError> {
        if PacketType::of(&message.data) == Some(PacketType::Response) {
            tracing::warn!("Dropping unsolicited response from {}", message.peer);
            return Ok(None);
        }

        let request = match Packet::parse(&message.data) {
            Ok(request) => request,
            Err(err) if message.data.len() >= 2 => {
                let id = u16::from_be_bytes([message.data[0], message.data[1]]);
                tracing::warn!("Malformed request {id:#06x} from {}: {err}", message.peer);
                let reply = PacketBuilder::new(id)
                    .flags(PacketFlags::RESPONSE)
                    .response_code(ResponseCode::FormatError)
                    .build();
                message.data = reply.to_bytes();
                return Ok(Some(message));
            }
            Err(_) => return Err(ResolverError::TooShort(message.data.len())),
        };

        // Only the first question is answered.
        let Some(question) = request.questions().first() else {
            tracing::debug!("Request {:#06x} without questions", request.id());
            let reply = request.respond(ResponseCode::FormatError).build();
            message.data = reply.to_bytes();
            return Ok(Some(message));
        };
        tracing::debug!("Request {:#06x} from {}: {question}", request.id(), message.peer);

        let answers = self.resolve(question.name(), question.q_type(), 0);
        let code = if answers.is_empty() {
            ResponseCode::NameError
        } else {
            ResponseCode::NoError
        };
        let reply = request
            .respond(code)
            .recursion_available(true)
            .question(question.clone())
            .answers(answers.iter())
            .build();
        message.data = reply.to_bytes();
        Ok(Some(message))
    }

    /// Resolve `name` for records of type `typ`. An empty set means resolution failed.
    pub fn resolve(&mut self, name: &DomainName, typ: Type, depth: usize) -> RecordSet {
        if depth > self.config.max_depth {
            tracing::debug!("Giving up on {name} {typ}: too deep");
            return empty_set();
        }

        let key = CacheKey::new(name, typ);
        if let Some(records) = self.cache.get(&key) {
            tracing::debug!("Cache hit for {name} {typ}");
            return records;
        }
        tracing::debug!("Cache miss for {name} {typ}");

        let mut candidates = self.root_candidates();
        let mut queries = 0;
        while let Some(server) = candidates.pop_front() {
            if queries == MAX_QUERIES_PER_NAME {
                tracing::debug!("Giving up on {name} {typ} after {queries} queries");
                break;
            }
            queries += 1;

            let reply = match self.query(server, name, typ) {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::debug!("Query for {name} {typ} to {server} failed: {err}");
                    continue;
                }
            };

            if let Some(first) = reply.answers().first() {
                let records: RecordSet = reply.answers().iter().cloned().collect();
                self.cache.put(key, Arc::clone(&records), first.ttl());
                if typ == Type::A {
                    if let RecordData::CNAME(target) = first.data() {
                        tracing::debug!("Following {name} to {target}");
                        return self.resolve(target, Type::A, depth + 1);
                    }
                }
                return records;
            }

            if self.config.referral_policy == ReferralPolicy::Follow {
                let next = referral_servers(name, &reply);
                if !next.is_empty() {
                    tracing::debug!("{server} referred {name} to {} servers", next.len());
                    candidates = next;
                    continue;
                }
            }
            tracing::debug!("No answer for {name} {typ} from {server}");
        }

        empty_set()
    }

    /// The configured root servers, starting at a random one.
    fn root_candidates(&self) -> VecDeque<SocketAddr> {
        let roots = &self.config.root_servers;
        if roots.is_empty() {
            return VecDeque::new();
        }
        let start = rand::thread_rng().gen_range(0..roots.len());
        roots[start..].iter().chain(&roots[..start]).copied().collect()
    }

    fn query(
        &mut self,
        server: SocketAddr,
        name: &DomainName,
        typ: Type,
    ) -> Result<Packet, ResolverError> {
        let id: u16 = rand::thread_rng().gen();
        let query = PacketBuilder::query(id)
            .question(Question::new(name.clone(), typ, Class::IN))
            .build();
        let bytes = self.upstream.exchange(server, &query.to_bytes())?;
        let reply = Packet::parse(&bytes)?;
        if reply.id() != id {
            return Err(ResolverError::IdMismatch {
                expected: id,
                found: reply.id(),
            });
        }
        Ok(reply)
    }
}

/// Addresses of the name servers a referral points at: NS records of the authority section
/// with an A record for the server name in the additional section. Only delegations of a zone
/// that contains `name` count.
fn referral_servers(name: &DomainName, reply: &Packet) -> VecDeque<SocketAddr> {
    let mut servers = VecDeque::new();
    for record in reply.authority() {
        let RecordData::NS(host) = record.data() else {
            continue;
        };
        if !name.is_subdomain_of(record.name()) {
            tracing::debug!("Ignoring referral to {host} for unrelated zone {}", record.name());
            continue;
        }
        for glue in reply.additional() {
            if let RecordData::A(addr) = glue.data() {
                if glue.name() == host {
                    servers.push_back(SocketAddr::new(IpAddr::V4(*addr), DNS_PORT));
                }
            }
        }
    }
    servers
}

#[cfg(test)]
mod test {
    use std::{collections::HashMap, net::Ipv4Addr, os::fd::RawFd};

    use bytes::BytesMut;

    use crate::{
        message::Transport,
        proto::{Header, Record},
    };

    use super::*;

    fn name(s: &str) -> DomainName {
        DomainName::new(s).unwrap()
    }

    const CLIENT: &str = "192.0.2.10:5353";
    const SOURCE: RawFd = 3;

    type Answerer = Box<dyn FnMut(SocketAddr, &Question) -> Option<Packet>>;

    /// Answers queries through a closure and counts them. `None` from the closure acts as a
    /// timeout.
    struct Scripted {
        answer: Answerer,
        queries: Vec<(SocketAddr, Question)>,
    }

    impl Scripted {
        fn new(answer: impl FnMut(SocketAddr, &Question) -> Option<Packet> + 'static) -> Self {
            Self {
                answer: Box::new(answer),
                queries: Vec::new(),
            }
        }

        /// Every server knows every name in `records`.
        fn zone(records: Vec<Record>) -> Self {
            let mut zone: HashMap<DomainName, Vec<Record>> = HashMap::new();
            for record in records {
                zone.entry(record.name().clone()).or_default().push(record);
            }
            Self::new(move |_, question| {
                let mut reply = PacketBuilder::new(0).flags(PacketFlags::RESPONSE);
                for record in zone.get(question.name()).into_iter().flatten() {
                    reply = reply.answer(record.clone());
                }
                Some(reply.build())
            })
        }
    }

    impl Upstream for Scripted {
        fn exchange(
            &mut self,
            server: SocketAddr,
            query: &[u8],
        ) -> Result<Vec<u8>, UpstreamError> {
            let query = Packet::parse(query).unwrap();
            let question = query.questions()[0].clone();
            let reply = (self.answer)(server, &question);
            self.queries.push((server, question));
            let Some(reply) = reply else {
                return Err(UpstreamError::Timeout(server));
            };
            let mut bytes = reply.to_bytes();
            // Give the reply the id of the query.
            bytes[..2].copy_from_slice(&query.id().to_be_bytes());
            Ok(bytes.to_vec())
        }
    }

    fn resolver(upstream: Scripted) -> Resolver<Scripted> {
        Resolver::new(ResolverConfig::default(), upstream)
    }

    fn request(id: u16, qname: &str, typ: Type) -> Message {
        let packet = PacketBuilder::query(id)
            .question(Question::new(name(qname), typ, Class::IN))
            .build();
        Message::new(packet.to_bytes(), CLIENT.parse().unwrap(), Transport::Udp, SOURCE)
    }

    fn addresses(records: &RecordSet) -> Vec<Ipv4Addr> {
        records
            .iter()
            .filter_map(|record| match record.data() {
                RecordData::A(addr) => Some(*addr),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn resolves_and_replies() {
        let mut resolver = resolver(Scripted::zone(vec![Record::a(
            name("example.com"),
            300,
            Ipv4Addr::new(93, 184, 216, 34),
        )]));
        let reply = resolver
            .handle(request(0x1234, "example.com", Type::A))
            .unwrap()
            .unwrap();
        assert_eq!(reply.peer, CLIENT.parse::<SocketAddr>().unwrap());
        assert_eq!(reply.source, SOURCE);

        let packet = Packet::parse(&reply.data).unwrap();
        let header = packet.header();
        assert_eq!(header.id, 0x1234);
        assert!(header.is_response());
        assert!(header.recursion_desired());
        assert!(header.recursion_available());
        assert_eq!(header.response_code(), ResponseCode::NoError);
        assert_eq!(packet.questions()[0].name(), "example.com");
        assert_eq!(packet.answers().len(), 1);
        assert_eq!(packet.answers()[0].ttl(), 300);
    }

    #[test]
    fn cache_hit_skips_upstream() {
        let mut resolver = resolver(Scripted::zone(vec![Record::a(
            name("example.com"),
            300,
            Ipv4Addr::new(10, 0, 0, 1),
        )]));
        let first = resolver.resolve(&name("example.com"), Type::A, 0);
        let second = resolver.resolve(&name("EXAMPLE.com"), Type::A, 0);
        assert_eq!(resolver.upstream().queries.len(), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.cache().stats().hits, 1);
    }

    #[test]
    fn follows_cname_for_address_queries() {
        let mut resolver = resolver(Scripted::zone(vec![
            Record::cname(name("www.example.com"), 60, name("web.example.net")),
            Record::a(name("web.example.net"), 60, Ipv4Addr::new(10, 0, 0, 7)),
        ]));
        let records = resolver.resolve(&name("www.example.com"), Type::A, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name(), "web.example.net");
        assert_eq!(addresses(&records), [Ipv4Addr::new(10, 0, 0, 7)]);
        // Both steps are cached.
        assert_eq!(resolver.cache().len(), 2);

        // A cache hit hands back the stored alias set as is, without following it again.
        let cached = resolver.resolve(&name("www.example.com"), Type::A, 0);
        assert_eq!(resolver.upstream().queries.len(), 2);
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].data(), &RecordData::CNAME(name("web.example.net")));
    }

    #[test]
    fn cname_is_returned_for_other_types() {
        let mut resolver = resolver(Scripted::zone(vec![Record::cname(
            name("www.example.com"),
            60,
            name("web.example.net"),
        )]));
        let records = resolver.resolve(&name("www.example.com"), Type::MX, 0);
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].data(),
            &RecordData::CNAME(name("web.example.net"))
        );
        assert_eq!(resolver.upstream().queries.len(), 1);
    }

    #[test]
    fn long_cname_chain_ends_empty() {
        let chain = (0..20)
            .map(|n| {
                let target = name(&format!("n{}.test", n + 1));
                Record::cname(name(&format!("n{n}.test")), 60, target)
            })
            .collect();
        let mut resolver = resolver(Scripted::zone(chain));
        let records = resolver.resolve(&name("n0.test"), Type::A, 0);
        assert!(records.is_empty());
        // Depths 0 through 10 each asked once.
        assert_eq!(resolver.upstream().queries.len(), 11);
    }

    #[test]
    fn timeouts_move_to_next_server() {
        let mut calls = 0;
        let mut resolver = resolver(Scripted::new(move |_, question| {
            calls += 1;
            (calls > 2).then(|| {
                PacketBuilder::new(0)
                    .flags(PacketFlags::RESPONSE)
                    .answer(Record::a(question.name().clone(), 60, Ipv4Addr::LOCALHOST))
                    .build()
            })
        }));
        let records = resolver.resolve(&name("slow.test"), Type::A, 0);
        assert_eq!(addresses(&records), [Ipv4Addr::LOCALHOST]);
        let servers: Vec<SocketAddr> = resolver
            .upstream()
            .queries
            .iter()
            .map(|(server, _)| *server)
            .collect();
        assert_eq!(servers.len(), 3);
        assert_ne!(servers[0], servers[1]);
        assert_ne!(servers[1], servers[2]);
    }

    #[test]
    fn exhausted_servers_reply_name_error() {
        let mut resolver = resolver(Scripted::new(|_, _| None));
        let reply = resolver
            .handle(request(9, "nowhere.test", Type::A))
            .unwrap()
            .unwrap();
        let packet = Packet::parse(&reply.data).unwrap();
        assert_eq!(packet.header().response_code(), ResponseCode::NameError);
        assert!(packet.answers().is_empty());
        assert_eq!(packet.questions().len(), 1);
        assert_eq!(resolver.upstream().queries.len(), ROOT_SERVERS.len());
        assert!(resolver.cache().is_empty());
    }

    #[test]
    fn referrals_are_ignored_by_default() {
        let mut resolver = resolver(Scripted::new(|_, _| {
            Some(
                PacketBuilder::new(0)
                    .flags(PacketFlags::RESPONSE)
                    .authority(Record::ns(name("test"), 60, name("ns.test")))
                    .additional(Record::a(name("ns.test"), 60, Ipv4Addr::new(10, 9, 9, 9)))
                    .build(),
            )
        }));
        assert!(resolver.resolve(&name("a.test"), Type::A, 0).is_empty());
        assert!(resolver
            .upstream()
            .queries
            .iter()
            .all(|(server, _)| server.ip() != Ipv4Addr::new(10, 9, 9, 9)));
    }

    #[test]
    fn follows_referrals_when_enabled() {
        let delegated: SocketAddr = "10.9.9.9:53".parse().unwrap();
        let upstream = Scripted::new(move |server, question| {
            let reply = PacketBuilder::new(0).flags(PacketFlags::RESPONSE);
            Some(if server == delegated {
                reply
                    .answer(Record::a(question.name().clone(), 60, Ipv4Addr::new(10, 1, 1, 1)))
                    .build()
            } else {
                reply
                    .authority(Record::ns(name("test"), 60, name("ns.test")))
                    .authority(Record::ns(name("test"), 60, name("unglued.test")))
                    .additional(Record::a(name("ns.test"), 60, Ipv4Addr::new(10, 9, 9, 9)))
                    .build()
            })
        });
        let config = ResolverConfig {
            referral_policy: ReferralPolicy::Follow,
            ..ResolverConfig::default()
        };
        let mut resolver = Resolver::new(config, upstream);
        let records = resolver.resolve(&name("a.test"), Type::A, 0);
        assert_eq!(addresses(&records), [Ipv4Addr::new(10, 1, 1, 1)]);
        assert_eq!(resolver.upstream().queries.len(), 2);
        assert_eq!(resolver.upstream().queries[1].0, delegated);
    }

    #[test]
    fn referrals_for_unrelated_zones_are_skipped() {
        let hijack: SocketAddr = "10.6.6.6:53".parse().unwrap();
        let upstream = Scripted::new(move |server, question| {
            let reply = PacketBuilder::new(0).flags(PacketFlags::RESPONSE);
            Some(if server == hijack {
                reply
                    .answer(Record::a(question.name().clone(), 60, Ipv4Addr::new(10, 6, 6, 6)))
                    .build()
            } else {
                reply
                    .authority(Record::ns(name("other.org"), 60, name("ns.other.org")))
                    .additional(Record::a(name("ns.other.org"), 60, Ipv4Addr::new(10, 6, 6, 6)))
                    .build()
            })
        });
        let config = ResolverConfig {
            referral_policy: ReferralPolicy::Follow,
            ..ResolverConfig::default()
        };
        let mut resolver = Resolver::new(config, upstream);
        assert!(resolver.resolve(&name("a.test"), Type::A, 0).is_empty());
        assert_eq!(resolver.upstream().queries.len(), ROOT_SERVERS.len());
        assert!(resolver
            .upstream()
            .queries
            .iter()
            .all(|(server, _)| *server != hijack));
    }

    #[test]
    fn mismatched_reply_id_is_skipped() {
        struct WrongId(usize);
        impl Upstream for WrongId {
            fn exchange(&mut self, _: SocketAddr, query: &[u8]) -> Result<Vec<u8>, UpstreamError> {
                self.0 += 1;
                let query = Packet::parse(query).unwrap();
                let reply = PacketBuilder::new(query.id().wrapping_add(1))
                    .flags(PacketFlags::RESPONSE)
                    .answer(Record::a(name("a.test"), 60, Ipv4Addr::LOCALHOST))
                    .build();
                Ok(reply.to_bytes().to_vec())
            }
        }
        let mut resolver = Resolver::new(ResolverConfig::default(), WrongId(0));
        assert!(resolver.resolve(&name("a.test"), Type::A, 0).is_empty());
        assert_eq!(resolver.upstream().0, ROOT_SERVERS.len());
    }

    #[test]
    fn malformed_request_gets_format_error() {
        let mut resolver = resolver(Scripted::new(|_, _| None));
        // A header announcing one question that is not there.
        let mut data = BytesMut::new();
        let mut header = Header::new(0xbeef);
        header.question_entries = 1;
        header.write_into(&mut data);
        let message = Message::new(data, CLIENT.parse().unwrap(), Transport::Udp, SOURCE);

        let reply = resolver.handle(message).unwrap().unwrap();
        let packet = Packet::parse(&reply.data).unwrap();
        assert_eq!(packet.id(), 0xbeef);
        assert!(packet.header().is_response());
        assert_eq!(packet.header().response_code(), ResponseCode::FormatError);
        assert!(resolver.upstream().queries.is_empty());
    }

    #[test]
    fn single_byte_is_dropped() {
        let mut resolver = resolver(Scripted::new(|_, _| None));
        let message = Message::udp(&[0xab], CLIENT.parse().unwrap(), SOURCE);
        assert!(matches!(
            resolver.handle(message),
            Err(ResolverError::TooShort(1))
        ));
    }

    #[test]
    fn request_without_question_gets_format_error() {
        let mut resolver = resolver(Scripted::new(|_, _| None));
        let data = PacketBuilder::query(5).build().to_bytes();
        let message = Message::new(data, CLIENT.parse().unwrap(), Transport::Udp, SOURCE);
        let reply = resolver.handle(message).unwrap().unwrap();
        let packet = Packet::parse(&reply.data).unwrap();
        assert_eq!(packet.id(), 5);
        assert_eq!(packet.header().response_code(), ResponseCode::FormatError);
    }

    #[test]
    fn responses_are_dropped() {
        let mut resolver = resolver(Scripted::new(|_, _| None));
        let data = PacketBuilder::new(5)
            .flags(PacketFlags::RESPONSE)
            .build()
            .to_bytes();
        let message = Message::new(data, CLIENT.parse().unwrap(), Transport::Udp, SOURCE);
        assert!(resolver.handle(message).unwrap().is_none());
    }

    #[test]
    fn only_first_question_is_resolved() {
        let mut resolver = resolver(Scripted::zone(vec![Record::a(
            name("one.test"),
            60,
            Ipv4Addr::new(10, 0, 0, 1),
        )]));
        let data = PacketBuilder::query(77)
            .question(Question::new(name("one.test"), Type::A, Class::IN))
            .question(Question::new(name("two.test"), Type::A, Class::IN))
            .build()
            .to_bytes();
        let message = Message::new(data, CLIENT.parse().unwrap(), Transport::Udp, SOURCE);
        let reply = resolver.handle(message).unwrap().unwrap();
        let packet = Packet::parse(&reply.data).unwrap();
        assert_eq!(packet.questions().len(), 1);
        assert_eq!(packet.answers().len(), 1);
        assert_eq!(resolver.upstream().queries.len(), 1);
    }
}
