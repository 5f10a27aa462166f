//! The UDP DNS responder.
//!
//! Each query is resolved against the registry first; if nothing matches
//! and a recursive resolver is configured, the query is forwarded upstream
//! and the first address it returns is relayed back as a single `A`
//! record, mirroring a simple forwarding resolver rather than a full
//! recursive one. `AAAA` queries that DO match the registry get a
//! successful, empty answer — this implementation only ever holds `A`
//! records, and an empty NOERROR beats making the client wait out a
//! separate AAAA timeout.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use hickory_server::authority::MessageResponseBuilder;
use hickory_server::proto::op::{Header, MessageType, OpCode, ResponseCode};
use hickory_server::proto::rr::rdata::A;
use hickory_server::proto::rr::{RData, Record, RecordType};
use hickory_server::server::{Request, RequestHandler, ResponseHandler, ResponseInfo, ServerFuture};

use crate::error::dns::DNSError;
use crate::label::Label;
use crate::registry::Registry;

const MAX_ANSWERS: usize = 15;
const ANSWER_TTL: u32 = 30;

pub struct DnsHandler {
    registry: Arc<Registry>,
    resolver: Option<TokioAsyncResolver>,
}

impl DnsHandler {
    pub fn new(registry: Arc<Registry>, resolver: Option<TokioAsyncResolver>) -> Self {
        DnsHandler { registry, resolver }
    }

    async fn answer(&self, request: &Request) -> Result<(Header, Vec<Record>), DNSError> {
        let mut header = Header::response_from_request(request.header());
        header.set_recursion_available(self.resolver.is_some());

        let mut records = Vec::new();
        for query in request.queries() {
            let query_type = query.query_type();
            if !matches!(query_type, RecordType::A | RecordType::AAAA | RecordType::ANY) {
                continue;
            }

            let name = query.name().to_string();
            let label = match Label::parse(&name) {
                Ok(label) => label,
                Err(_) => continue,
            };

            let addrs = self.registry.resolve(&label);
            if !addrs.is_empty() {
                header.set_authoritative(true);
                if query_type == RecordType::AAAA {
                    // Successful but empty: we only hold A records.
                    continue;
                }
                for addr in addrs.into_iter().take(MAX_ANSWERS) {
                    if let Ok(ip) = addr.parse() {
                        records.push(Record::from_rdata(query.name().clone().into(), ANSWER_TTL, RData::A(A(ip))));
                    }
                }
                continue;
            }

            if let Some(resolver) = &self.resolver {
                match resolver.lookup_ip(name.as_str()).await {
                    Ok(lookup) => {
                        if let Some(IpAddr::V4(ip)) = lookup.iter().find(|ip| ip.is_ipv4()) {
                            records.push(Record::from_rdata(query.name().clone().into(), ANSWER_TTL, RData::A(A(ip))));
                        }
                    }
                    Err(err) => {
                        if is_not_found(&err) {
                            log::debug!("[dns] {} not found upstream", name);
                        } else {
                            log::error!("[dns] error resolving {} upstream: {}", name, err);
                        }
                    }
                }
            }
        }

        Ok((header, records))
    }
}

fn is_not_found(err: &ResolveError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. } | ResolveErrorKind::Timeout)
}

impl DnsHandler {
    async fn respond<R: ResponseHandler>(&self, request: &Request, mut response_handle: R) -> Result<ResponseInfo, DNSError> {
        if request.op_code() != OpCode::Query {
            return Err(DNSError::InvalidOpCode(request.op_code()));
        }
        if request.message_type() != MessageType::Query {
            return Err(DNSError::InvalidMessageType(request.message_type()));
        }

        let builder = MessageResponseBuilder::from_message_request(request);
        let (header, records) = self.answer(request).await?;
        let response = builder.build(header, records.iter(), &[], &[], &[]);
        Ok(response_handle.send_response(response).await?)
    }
}

#[async_trait]
impl RequestHandler for DnsHandler {
    async fn handle_request<R: ResponseHandler>(&self, request: &Request, response_handle: R) -> ResponseInfo {
        match self.respond(request, response_handle).await {
            Ok(info) => info,
            Err(err) => {
                log::error!("[dns] error handling request: {}", err);
                let mut header = Header::response_from_request(request.header());
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

pub struct DnsServerConfig {
    pub bind: SocketAddr,
    pub resolvers: Vec<SocketAddr>,
}

/// Builds a recursive resolver with a tight timeout/retry budget: a 3
/// second timeout and a single attempt per upstream server, so a dead
/// resolver never stalls a query for long.
pub fn build_resolver(resolvers: &[SocketAddr]) -> Option<TokioAsyncResolver> {
    if resolvers.is_empty() {
        return None;
    }
    let ips: Vec<IpAddr> = resolvers.iter().map(|s| s.ip()).collect();
    let port = resolvers[0].port();
    let group = NameServerConfigGroup::from_ips_clear(&ips, port, true);
    let config = ResolverConfig::from_parts(None, vec![], group);
    let mut opts = ResolverOpts::default();
    opts.timeout = Duration::from_secs(3);
    opts.attempts = 1;
    Some(TokioAsyncResolver::tokio(config, opts))
}

pub async fn serve(config: DnsServerConfig, registry: Arc<Registry>) -> std::io::Result<()> {
    let resolver = build_resolver(&config.resolvers);
    log::info!(
        "[dns] starting DNS responder on {} (recursion={})",
        config.bind,
        resolver.is_some()
    );
    let handler = DnsHandler::new(registry, resolver);
    let mut server = ServerFuture::new(handler);
    server.register_socket(tokio::net::UdpSocket::bind(config.bind).await?);
    server.block_until_done().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_resolver_is_none_without_upstreams() {
        assert!(build_resolver(&[]).is_none());
    }

    #[test]
    fn build_resolver_is_some_with_upstreams() {
        let resolvers = vec!["8.8.8.8:53".parse().unwrap()];
        assert!(build_resolver(&resolvers).is_some());
    }
}
