//! Network operators (@ipMatch, @ipMatchFromFile, @geoLookup, @rbl).

use super::pattern::{data_lines, read_data_file};
use super::traits::{Operator, OperatorContext};
use crate::error::{Error, Result};
use crate::variables::VariableName;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::Resolver;
use ipnetwork::IpNetwork;
use once_cell::sync::OnceCell;
use std::fmt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

/// Parse `a.b.c.d`, `a.b.c.d/n` or an IPv6 form; bare addresses become
/// `/32` or `/128` networks.
pub fn parse_network(s: &str) -> Result<IpNetwork> {
    let invalid = |message: String| Error::InvalidIp {
        value: s.to_string(),
        message,
    };
    if s.contains('/') {
        return s.parse::<IpNetwork>().map_err(|e| invalid(e.to_string()));
    }
    let ip: IpAddr = s.parse().map_err(|e: std::net::AddrParseError| invalid(e.to_string()))?;
    let prefix = if ip.is_ipv4() { 32 } else { 128 };
    IpNetwork::new(ip, prefix).map_err(|e| invalid(e.to_string()))
}

/// IP match operator (@ipMatch, @ipMatchFromFile).
pub struct IpMatchOperator {
    networks: Vec<IpNetwork>,
    name: &'static str,
}

impl IpMatchOperator {
    /// Build from a comma- or space-separated list.
    pub fn new(list: &str) -> Result<Self> {
        let networks = list
            .split(|c: char| c == ',' || c.is_ascii_whitespace())
            .filter(|s| !s.is_empty())
            .map(parse_network)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            networks,
            name: "ipMatch",
        })
    }

    /// Build from files (space-separated paths) resolved against `root`.
    pub fn from_files(paths: &str, root: &Path) -> Result<Self> {
        let mut networks = Vec::new();
        for path in paths.split_whitespace() {
            let content = read_data_file(path, root)?;
            for line in data_lines(&content) {
                networks.push(parse_network(line)?);
            }
        }
        Ok(Self {
            networks,
            name: "ipMatchFromFile",
        })
    }
}

impl Operator for IpMatchOperator {
    fn evaluate(&self, _ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        parse_ip(value).is_some_and(|ip| self.networks.iter().any(|net| net.contains(ip)))
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Country lookup backend used by `@geoLookup`.
pub trait GeoDatabase: Send + Sync + fmt::Debug {
    /// ISO-3166 alpha-2 code for `ip`.
    fn country_code(&self, ip: IpAddr) -> Option<String>;
}

/// Text database of `CIDR COUNTRY` lines; the most specific network wins.
#[derive(Debug, Default)]
pub struct CidrGeoDatabase {
    entries: Vec<(IpNetwork, String)>,
}

impl CidrGeoDatabase {
    /// Load from a file.
    pub fn open(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::RuleFileLoad {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content)
    }

    /// Parse database text.
    pub fn parse(content: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for line in data_lines(content) {
            let mut parts = line.split_whitespace();
            let (Some(net), Some(code)) = (parts.next(), parts.next()) else {
                return Err(Error::Config {
                    message: format!("malformed geo database line '{}'", line),
                });
            };
            entries.push((parse_network(net)?, code.to_ascii_uppercase()));
        }
        entries.sort_by(|a, b| b.0.prefix().cmp(&a.0.prefix()));
        Ok(Self { entries })
    }
}

impl GeoDatabase for CidrGeoDatabase {
    fn country_code(&self, ip: IpAddr) -> Option<String> {
        self.entries
            .iter()
            .find(|(net, _)| net.contains(ip))
            .map(|(_, code)| code.clone())
    }
}

/// Geo lookup operator (@geoLookup). Sets `COUNTRY_CODE` on success.
pub struct GeoLookupOperator;

impl Operator for GeoLookupOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        let Some(geo) = ctx.geo else {
            ctx.debug.warn("@geoLookup used without SecGeoLookupDb");
            return false;
        };
        let Some(ip) = parse_ip(value) else {
            return false;
        };
        match geo.country_code(ip) {
            Some(code) => {
                ctx.store.set_value(VariableName::CountryCode, code);
                true
            }
            None => false,
        }
    }

    fn name(&self) -> &'static str {
        "geoLookup"
    }
}

/// Pending `@rbl` lookups allowed per operator before new ones are refused.
const RBL_QUEUE: usize = 64;

struct RblRequest {
    name: String,
    reply: mpsc::Sender<RblAnswer>,
}

enum RblAnswer {
    /// Listed; the TXT record when the list publishes one, else the A record.
    Listed(String),
    NotListed,
    Failed(String),
}

/// DNS block list operator (@rbl).
///
/// Lookups run on one resolver thread per operator, fed through a bounded
/// queue. A lookup that misses the deadline is abandoned by the caller
/// and the worker's own resolver timeout ends it.
pub struct RblOperator {
    service: String,
    timeout: Duration,
    config: Option<ResolverConfig>,
    worker: OnceCell<std::result::Result<mpsc::SyncSender<RblRequest>, String>>,
}

impl RblOperator {
    /// Query `service` (e.g. `zen.spamhaus.org`) through the system
    /// resolver with a one second deadline.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.trim().trim_end_matches('.').to_string(),
            timeout: Duration::from_secs(1),
            config: None,
            worker: OnceCell::new(),
        }
    }

    /// Query through the given name servers instead of the system ones.
    pub fn with_name_servers(service: &str, servers: &[IpAddr], timeout: Duration) -> Self {
        Self {
            timeout,
            config: Some(ResolverConfig::from_parts(
                None,
                vec![],
                NameServerConfigGroup::from_ips_clear(servers, 53, true),
            )),
            ..Self::new(service)
        }
    }

    /// Query name for `ip`: reversed octets (or nibbles) under the service.
    pub fn query_name(&self, ip: IpAddr) -> String {
        let reversed = match ip {
            IpAddr::V4(v4) => {
                let o = v4.octets();
                format!("{}.{}.{}.{}", o[3], o[2], o[1], o[0])
            }
            IpAddr::V6(v6) => v6
                .octets()
                .iter()
                .rev()
                .flat_map(|b| [b & 0x0f, b >> 4])
                .map(|n| format!("{:x}", n))
                .collect::<Vec<_>>()
                .join("."),
        };
        format!("{}.{}", reversed, self.service)
    }

    fn worker(&self) -> std::result::Result<&mpsc::SyncSender<RblRequest>, String> {
        self.worker
            .get_or_init(|| {
                let (tx, rx) = mpsc::sync_channel::<RblRequest>(RBL_QUEUE);
                let config = self.config.clone();
                let timeout = self.timeout;
                std::thread::Builder::new()
                    .name(format!("rbl-{}", self.service))
                    .spawn(move || serve_lookups(config, timeout, rx))
                    .map(|_| tx)
                    .map_err(|e| format!("cannot start rbl resolver: {}", e))
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    fn lookup(&self, name: String) -> std::result::Result<Option<String>, String> {
        let worker = self.worker()?;
        let (reply, answer) = mpsc::channel();
        worker
            .try_send(RblRequest { name, reply })
            .map_err(|_| "rbl lookup queue full".to_string())?;
        match answer.recv_timeout(self.timeout) {
            Ok(RblAnswer::Listed(record)) => Ok(Some(record)),
            Ok(RblAnswer::NotListed) => Ok(None),
            Ok(RblAnswer::Failed(message)) => Err(message),
            Err(_) => Err("rbl lookup timed out".to_string()),
        }
    }
}

/// Resolver thread body. Runs until the operator is dropped.
fn serve_lookups(config: Option<ResolverConfig>, timeout: Duration, requests: mpsc::Receiver<RblRequest>) {
    let resolver = build_resolver(config, timeout);
    for request in requests {
        let answer = match &resolver {
            Ok(resolver) => resolve_listing(resolver, &request.name),
            Err(message) => RblAnswer::Failed(message.clone()),
        };
        let _ = request.reply.send(answer);
    }
}

fn build_resolver(config: Option<ResolverConfig>, timeout: Duration) -> std::result::Result<Resolver, String> {
    let (config, mut opts) = match config {
        Some(config) => (config, ResolverOpts::default()),
        None => read_system_conf().map_err(|e| format!("cannot read resolver config: {}", e))?,
    };
    opts.timeout = timeout;
    opts.attempts = 1;
    Resolver::new(config, opts).map_err(|e| format!("cannot build resolver: {}", e))
}

fn resolve_listing(resolver: &Resolver, name: &str) -> RblAnswer {
    match resolver.ipv4_lookup(name) {
        Ok(addresses) => {
            let txt = resolver
                .txt_lookup(name)
                .ok()
                .and_then(|records| records.iter().next().map(ToString::to_string));
            let a = addresses.iter().next().map(ToString::to_string);
            RblAnswer::Listed(txt.or(a).unwrap_or_default())
        }
        Err(e) if matches!(e.kind(), ResolveErrorKind::NoRecordsFound { .. }) => RblAnswer::NotListed,
        Err(e) => RblAnswer::Failed(e.to_string()),
    }
}

impl Operator for RblOperator {
    fn evaluate(&self, ctx: &mut OperatorContext<'_>, value: &[u8]) -> bool {
        let Some(ip) = parse_ip(value) else {
            return false;
        };
        let name = self.query_name(ip);
        match self.lookup(name.clone()) {
            Ok(Some(record)) => {
                ctx.capture(0, record.as_bytes());
                true
            }
            Ok(None) => false,
            Err(message) => {
                ctx.debug.warn(format_args!("{} for {}", message, name));
                false
            }
        }
    }

    fn name(&self) -> &'static str {
        "rbl"
    }
}

/// Parse an operator value as an IP address.
fn parse_ip(value: &[u8]) -> Option<IpAddr> {
    std::str::from_utf8(value).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debuglog::DebugLogger;
    use crate::operators::tests::eval;
    use crate::variables::CollectionStore;

    #[test]
    fn test_ip_match_list() {
        let op = IpMatchOperator::new("127.0.0.1, 192.168.0.0/24").unwrap();
        assert!(eval(&op, "127.0.0.1"));
        assert!(eval(&op, "192.168.0.253"));
        assert!(!eval(&op, "192.168.1.1"));
        assert!(!eval(&op, "not-an-ip"));
    }

    #[test]
    fn test_ip_match_v6() {
        let op = IpMatchOperator::new("2001:db8::/32 ::1").unwrap();
        assert!(eval(&op, "2001:db8::42"));
        assert!(eval(&op, "::1"));
        assert!(!eval(&op, "::2"));
    }

    #[test]
    fn test_ip_match_invalid() {
        assert!(IpMatchOperator::new("300.1.1.1").is_err());
    }

    #[test]
    fn test_ip_match_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ips.txt"), "# blocked\n10.0.0.0/8\r\n203.0.113.7\n").unwrap();
        let op = IpMatchOperator::from_files("ips.txt", dir.path()).unwrap();
        assert!(eval(&op, "10.20.30.40"));
        assert!(eval(&op, "203.0.113.7"));
        assert!(!eval(&op, "203.0.113.8"));
    }

    #[test]
    fn test_geo_lookup_sets_country_code() {
        let db = CidrGeoDatabase::parse("10.0.0.0/8 us\n10.1.0.0/16 DE\n").unwrap();
        let logger = DebugLogger::new();
        let mut store = CollectionStore::new();
        let mut ctx = OperatorContext::new(&mut store, logger.scope(0, "t"), Some(&db), false);

        assert!(GeoLookupOperator.evaluate(&mut ctx, b"10.1.2.3"));
        assert_eq!(ctx.store.value(VariableName::CountryCode), Some("DE"));
        assert!(GeoLookupOperator.evaluate(&mut ctx, b"10.2.2.3"));
        assert_eq!(ctx.store.value(VariableName::CountryCode), Some("US"));
        assert!(!GeoLookupOperator.evaluate(&mut ctx, b"192.0.2.1"));
    }

    #[test]
    fn test_geo_lookup_without_database() {
        assert!(!eval(&GeoLookupOperator, "10.1.2.3"));
    }

    #[test]
    fn test_rbl_query_name() {
        let op = RblOperator::new("bl.example.org.");
        assert_eq!(
            op.query_name("192.0.2.10".parse().unwrap()),
            "10.2.0.192.bl.example.org"
        );
        let v6 = op.query_name("2001:db8::1".parse().unwrap());
        assert!(v6.starts_with("1.0.0.0."));
        assert!(v6.ends_with("8.b.d.0.1.0.0.2.bl.example.org"));
        assert!(!eval(&op, "not-an-ip"));
    }

    #[test]
    fn test_rbl_gives_up_at_deadline() {
        // 192.0.2.1 (TEST-NET-1) never answers.
        let op = RblOperator::with_name_servers(
            "bl.example.org",
            &["192.0.2.1".parse().unwrap()],
            Duration::from_millis(200),
        );
        let started = std::time::Instant::now();
        assert!(!eval(&op, "127.0.0.2"));
        assert!(!eval(&op, "127.0.0.3"));
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
