#![allow(dead_code)]

mod trace;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, StatusCode};
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time::sleep;

pub use trace::trace_init;

const WAIT_FOR_SECS: u64 = 5; // The default time to wait in `wait_for_scrape`
const WAIT_FOR_MIN_MILLIS: u64 = 5; // The minimum time to pause before retrying
const WAIT_FOR_MAX_MILLIS: u64 = 200; // The maximum time to pause before retrying

pub struct Scraped {
    pub status: StatusCode,
    pub body: String,
}

pub async fn get(addr: SocketAddr, path: &str) -> Scraped {
    let client = Client::builder(TokioExecutor::new()).build_http::<Empty<Bytes>>();
    let req = Request::get(format!("http://{addr}{path}"))
        .body(Empty::new())
        .unwrap();

    let resp = client.request(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();

    Scraped {
        status,
        body: String::from_utf8(body.to_vec()).unwrap(),
    }
}

pub async fn scrape(addr: SocketAddr) -> String {
    let scraped = get(addr, "/metrics").await;
    assert_eq!(scraped.status, StatusCode::OK);
    scraped.body
}

/// Scrapes until `f` accepts the exposition text, or panics after 5s.
pub async fn wait_for_scrape<F>(addr: SocketAddr, f: F) -> String
where
    F: Fn(&str) -> bool,
{
    let started = Instant::now();
    let mut delay = WAIT_FOR_MIN_MILLIS;

    loop {
        let text = scrape(addr).await;
        if f(&text) {
            return text;
        }

        if started.elapsed() > Duration::from_secs(WAIT_FOR_SECS) {
            panic!("Timed out while waiting, last scrape:\n{text}");
        }

        sleep(Duration::from_millis(delay)).await;
        // quadratic backoff up to a maximum delay
        delay = (2 * delay).min(WAIT_FOR_MAX_MILLIS);
    }
}

/// Sample lines of metric `name`, keyed by the series, e.g.
/// `foo{host="a"}`, valued by the sample text.
pub fn samples(text: &str, name: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| line.rsplit_once(' '))
        .filter(|(series, _)| {
            *series == name
                || series
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('{'))
        })
        .map(|(series, value)| (series.to_string(), value.to_string()))
        .collect()
}
