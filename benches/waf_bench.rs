//! Benchmarks for zentinel-waf.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use zentinel_waf::transformations::{lookup, TransformationPipeline};
use zentinel_waf::Waf;

// ============================================================================
// Test Data
// ============================================================================

const SIMPLE_RULE: &str = r#"
SecRuleEngine On
SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny,status:403"
"#;

const SQLI_RULE: &str = r#"
SecRuleEngine On
SecRequestBodyAccess On
SecRule ARGS "@detectSQLi" "id:942100,phase:2,deny,status:403,msg:'SQL Injection'"
"#;

const COMPLEX_RULE: &str = r#"
SecRuleEngine On
SecRequestBodyAccess On
SecDefaultAction "phase:2,log,auditlog,deny,status:403"
SecRule REQUEST_HEADERS:Content-Type "application/json" \
    "id:200001,phase:1,pass,nolog,ctl:requestBodyProcessor=JSON"

SecRule REQUEST_URI|ARGS|ARGS_NAMES "@rx (?i)(?:union.*select|select.*from|insert.*into)" \
    "id:942101,phase:2,block,\
    msg:'SQL Injection Attack',\
    tag:'OWASP_CRS',\
    tag:'attack-sqli',\
    severity:'CRITICAL',\
    t:lowercase,t:urlDecodeUni,t:htmlEntityDecode,\
    setvar:tx.anomaly_score=+5"
"#;

const CHAIN_RULE: &str = r#"
SecRuleEngine On
SecRule REQUEST_METHOD "POST" \
    "id:100,phase:1,chain,deny,status:403"
    SecRule REQUEST_URI "@beginsWith /api" "chain"
        SecRule ARGS "@detectSQLi" ""
"#;

const CLEAN_REQUESTS: &[(&str, &str)] = &[
    ("/", "GET"),
    ("/api/users", "GET"),
    ("/api/users/123", "GET"),
    ("/search?q=hello+world", "GET"),
    ("/products?category=electronics&page=1", "GET"),
    ("/api/orders", "POST"),
];

const SQLI_PAYLOADS: &[&str] = &[
    "/api/users?id=1' OR '1'='1",
    "/api/users?id=1; DROP TABLE users--",
    "/api/users?id=1 UNION SELECT * FROM passwords--",
    "/search?q=' OR 1=1--",
    "/login?user=admin'--",
];

const BODY_SIZES: &[usize] = &[0, 100, 1_000, 10_000, 100_000];

// ============================================================================
// Benchmark: Rule Loading
// ============================================================================

fn bench_rule_loading(c: &mut Criterion) {
    let mut group = c.benchmark_group("loading");
    for (name, rules) in [
        ("simple_rule", SIMPLE_RULE),
        ("sqli_rule", SQLI_RULE),
        ("complex_rule", COMPLEX_RULE),
        ("chain_rule", CHAIN_RULE),
    ] {
        group.bench_function(name, |b| b.iter(|| Waf::from_string(black_box(rules)).unwrap()));
    }
    group.finish();
}

// ============================================================================
// Benchmark: Transaction Processing
// ============================================================================

fn bench_transaction_processing(c: &mut Criterion) {
    let waf = Waf::from_string(COMPLEX_RULE).unwrap();
    let mut group = c.benchmark_group("transaction");

    group.bench_function("clean_request", |b| {
        b.iter(|| {
            let mut tx = waf.new_transaction();
            tx.process_uri("GET", black_box("/api/users"), "HTTP/1.1");
            tx.add_request_header("Host", "example.com");
            tx.add_request_header("User-Agent", "Mozilla/5.0");
            tx.process_request_headers();
            tx.process_request_body().unwrap();
            tx.is_interrupted()
        })
    });

    group.bench_function("sqli_request", |b| {
        b.iter(|| {
            let mut tx = waf.new_transaction();
            tx.process_uri("GET", black_box("/api/users?id=1 union select password from users"), "HTTP/1.1");
            tx.add_request_header("Host", "example.com");
            tx.process_request_headers();
            tx.process_request_body().unwrap();
            tx.is_interrupted()
        })
    });

    group.finish();
}

fn bench_body_processing(c: &mut Criterion) {
    let waf = Waf::from_string(SQLI_RULE).unwrap();
    let mut group = c.benchmark_group("body_processing");

    for &size in BODY_SIZES {
        let body = generate_body(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("urlencoded", size), &body, |b, body| {
            b.iter(|| {
                let mut tx = waf.new_transaction();
                tx.process_uri("POST", "/api/data", "HTTP/1.1");
                tx.add_request_header("Content-Type", "application/x-www-form-urlencoded");
                tx.process_request_headers();
                tx.write_request_body(black_box(body.as_bytes())).unwrap();
                tx.process_request_body().unwrap();
                tx.is_interrupted()
            })
        });
    }

    let json = r#"{"user": {"name": "alice", "roles": ["admin", "dev"]}, "query": "1' OR '1'='1"}"#;
    group.bench_function("json_sqli", |b| {
        b.iter(|| {
            let mut tx = waf.new_transaction();
            tx.process_uri("POST", "/api/search", "HTTP/1.1");
            tx.add_request_header("Content-Type", "application/json");
            tx.process_request_headers();
            tx.write_request_body(black_box(json.as_bytes())).unwrap();
            tx.process_request_body().unwrap();
            tx.is_interrupted()
        })
    });

    group.finish();
}

// ============================================================================
// Benchmark: Transformations
// ============================================================================

fn bench_transformations(c: &mut Criterion) {
    let mut group = c.benchmark_group("transformations");
    for (name, input) in [
        ("urlDecodeUni", "hello%20world%u0021"),
        ("base64Decode", "SGVsbG8gV29ybGQh"),
        ("htmlEntityDecode", "&lt;script&gt;alert(1)&lt;/script&gt;"),
        ("lowercase", "HELLO WORLD"),
        ("normalizePath", "/foo/../bar/./baz"),
        ("cmdLine", "CMD;/C;DIR"),
    ] {
        let t = lookup(name).unwrap();
        group.bench_function(name, |b| b.iter(|| t.apply(black_box(input.as_bytes())).into_owned()));
    }

    let pipeline = TransformationPipeline::from_names(&["urlDecodeUni", "htmlEntityDecode", "lowercase", "compressWhitespace"]).unwrap();
    group.bench_function("crs_pipeline", |b| {
        b.iter(|| pipeline.apply(black_box(b"SELECT%20*%20&amp;%20FROM   users".as_slice())).into_owned())
    });
    group.finish();
}

// ============================================================================
// Benchmark: Throughput
// ============================================================================

fn bench_throughput(c: &mut Criterion) {
    let rules = r#"
SecRuleEngine On
SecRequestBodyAccess On
SecRule REQUEST_URI|ARGS "@detectSQLi" "id:942100,phase:2,deny"
SecRule REQUEST_URI|ARGS "@detectXSS" "id:941100,phase:2,deny"
SecRule REQUEST_URI "@contains /admin" "id:1,phase:1,deny"
"#;
    let waf = Waf::from_string(rules).unwrap();

    let mut group = c.benchmark_group("throughput");
    group.throughput(Throughput::Elements(1));

    group.bench_function("clean_traffic", |b| {
        let mut idx = 0;
        b.iter(|| {
            let (uri, method) = CLEAN_REQUESTS[idx % CLEAN_REQUESTS.len()];
            idx += 1;
            let mut tx = waf.new_transaction();
            tx.process_uri(method, black_box(uri), "HTTP/1.1");
            tx.add_request_header("Host", "example.com");
            tx.process_request_headers();
            tx.process_request_body().unwrap();
            tx.is_interrupted()
        })
    });

    group.bench_function("attack_traffic", |b| {
        let mut idx = 0;
        b.iter(|| {
            let uri = SQLI_PAYLOADS[idx % SQLI_PAYLOADS.len()];
            idx += 1;
            let mut tx = waf.new_transaction();
            tx.process_uri("GET", black_box(uri), "HTTP/1.1");
            tx.add_request_header("Host", "example.com");
            tx.process_request_headers();
            tx.process_request_body().unwrap();
            tx.is_interrupted()
        })
    });

    group.finish();
}

fn generate_body(size: usize) -> String {
    let mut body = String::with_capacity(size);
    let mut i = 0;
    while body.len() < size {
        if !body.is_empty() {
            body.push('&');
        }
        body.push_str(&format!("field{}=value{}", i, i));
        i += 1;
    }
    body.truncate(size);
    body
}

criterion_group!(
    benches,
    bench_rule_loading,
    bench_transaction_processing,
    bench_body_processing,
    bench_transformations,
    bench_throughput,
);
criterion_main!(benches);
