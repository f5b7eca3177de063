//! One HTTP(S) round trip against a node's status endpoint.
//!
//! Certificate-trust failures get a single retry with verification disabled,
//! so "reachable but badly configured" is distinguishable from "unreachable".
//! No other failure class is retried.

use std::time::{Duration, Instant};

use anyhow::Result;
use fedwatch_core::BaseUrl;
use reqwest::{redirect::Policy, Client};
use serde::Deserialize;
use tracing::debug;

/// Well-known status endpoint, relative to the node's base URL.
pub const PROBE_PATH: &str = "/friendica/json";

const USER_AGENT: &str = "fedwatch-probe/0.1";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct ProbeOptions {
    /// Total request timeout. A floor of one second is enforced.
    pub timeout: Duration,
    /// Maximum redirect hops to follow.
    pub redirects: usize,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        ProbeOptions {
            timeout: Duration::from_secs(10),
            redirects: 8,
        }
    }
}

/// The status document a node self-reports. Strictly decoded: a missing or
/// mistyped required field is a parse failure, not partially-populated data.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeInfo {
    pub url: String,
    pub site_name: String,
    pub version: String,
    pub plugins: Vec<String>,
    pub register_policy: String,
    pub info: String,
    pub admin_name: String,
    pub admin_profile: String,
    #[serde(default)]
    pub no_scrape_url: Option<String>,
}

#[derive(Debug)]
pub struct ProbeSuccess {
    pub elapsed_ms: i64,
    pub status: u16,
    pub info: NodeInfo,
    /// The response only came back once certificate verification was disabled.
    pub cert_fallback: bool,
    /// The post-redirect URL normalizes to a different base URL. Detection
    /// only; nothing acts on a moved node yet.
    pub moved: bool,
}

#[derive(Debug)]
pub enum ProbeOutcome {
    /// Network or TLS level failure; nothing came back.
    Transport { cert_issue: bool },
    /// HTTP completed but the body is not a usable status document.
    Parse { status: u16, elapsed_ms: i64 },
    Success(ProbeSuccess),
}

pub struct Prober {
    strict: Client,
    insecure: Client,
}

struct Fetched {
    status: u16,
    final_url: String,
    body: String,
}

impl Prober {
    pub fn new(opts: &ProbeOptions) -> Result<Self> {
        let builder = || {
            Client::builder()
                .redirect(Policy::limited(opts.redirects))
                .timeout(opts.timeout.max(Duration::from_secs(1)))
                .connect_timeout(CONNECT_TIMEOUT)
                .user_agent(USER_AGENT)
        };
        Ok(Prober {
            strict: builder().build()?,
            insecure: builder().danger_accept_invalid_certs(true).build()?,
        })
    }

    pub async fn probe(&self, base_url: &BaseUrl) -> ProbeOutcome {
        let target = format!("{}{}", base_url, PROBE_PATH);

        let (result, mut elapsed_ms) = fetch(&self.strict, &target).await;
        let (fetched, cert_fallback) = match result {
            Ok(f) => (f, false),
            Err(e) if is_cert_error(&e) => {
                debug!(url = %target, error = %e, "certificate rejected, retrying unverified");
                let (retry, retry_ms) = fetch(&self.insecure, &target).await;
                elapsed_ms = retry_ms;
                match retry {
                    Ok(f) => (f, true),
                    Err(e) => {
                        debug!(url = %target, error = %e, "fallback probe failed");
                        return ProbeOutcome::Transport { cert_issue: true };
                    }
                }
            }
            Err(e) => {
                debug!(url = %target, error = %e, "probe failed");
                return ProbeOutcome::Transport { cert_issue: false };
            }
        };

        let moved = BaseUrl::parse(&fetched.final_url)
            .map(|effective| effective != *base_url)
            .unwrap_or(true);

        match serde_json::from_str::<NodeInfo>(&fetched.body) {
            Ok(info) => ProbeOutcome::Success(ProbeSuccess {
                elapsed_ms,
                status: fetched.status,
                info,
                cert_fallback,
                moved,
            }),
            Err(e) => {
                debug!(url = %target, status = fetched.status, error = %e, "unusable status document");
                ProbeOutcome::Parse {
                    status: fetched.status,
                    elapsed_ms,
                }
            }
        }
    }
}

/// Run one GET and read the whole body, measuring wall-clock time for the
/// full transfer.
async fn fetch(client: &Client, url: &str) -> (std::result::Result<Fetched, reqwest::Error>, i64) {
    let start = Instant::now();
    let result = async {
        let resp = client.get(url).send().await?;
        let status = resp.status().as_u16();
        let final_url = resp.url().to_string();
        let body = resp.text().await?;
        Ok(Fetched {
            status,
            final_url,
            body,
        })
    }
    .await;
    (result, start.elapsed().as_millis() as i64)
}

/// Whether a request error is specifically a certificate trust/issuer problem,
/// as opposed to a timeout, refusal or other TLS fault.
fn is_cert_error(err: &reqwest::Error) -> bool {
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        let msg = s.to_string();
        if msg.contains("certificate") || msg.contains("Certificate") || msg.contains("UnknownIssuer") {
            return true;
        }
        source = s.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const GOOD_BODY: &str = r#"{
        "url": "https://example.com",
        "site_name": "Example Node",
        "version": "3.5.2",
        "plugins": ["poke", "statistics"],
        "register_policy": "REGISTER_OPEN",
        "info": "a friendly node",
        "admin_name": "Admin",
        "admin_profile": "https://example.com/profile/admin",
        "no_scrape_url": "https://example.com/noscrape"
    }"#;

    #[test]
    fn decodes_full_document() {
        let info: NodeInfo = serde_json::from_str(GOOD_BODY).unwrap();
        assert_eq!(info.site_name, "Example Node");
        assert_eq!(info.plugins, vec!["poke", "statistics"]);
        assert_eq!(info.no_scrape_url.as_deref(), Some("https://example.com/noscrape"));
    }

    #[test]
    fn no_scrape_url_is_optional_everything_else_is_not() {
        let mut v: serde_json::Value = serde_json::from_str(GOOD_BODY).unwrap();
        v.as_object_mut().unwrap().remove("no_scrape_url");
        let info: NodeInfo = serde_json::from_value(v.clone()).unwrap();
        assert!(info.no_scrape_url.is_none());

        for field in [
            "url",
            "site_name",
            "version",
            "plugins",
            "register_policy",
            "info",
            "admin_name",
            "admin_profile",
        ] {
            let mut v = v.clone();
            v.as_object_mut().unwrap().remove(field);
            assert!(
                serde_json::from_value::<NodeInfo>(v).is_err(),
                "{field} should be required"
            );
        }
    }

    #[test]
    fn rejects_mistyped_fields() {
        let mut v: serde_json::Value = serde_json::from_str(GOOD_BODY).unwrap();
        v["plugins"] = serde_json::json!("poke,statistics");
        assert!(serde_json::from_value::<NodeInfo>(v).is_err());
    }

    async fn one_shot_server(responses: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for resp in responses {
                let Ok((mut sock, _)) = listener.accept().await else { return };
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let resp = resp.replace("{port}", &addr.port().to_string());
                let _ = sock.write_all(resp.as_bytes()).await;
            }
        });
        format!("http://127.0.0.1:{}", addr.port())
    }

    fn http_ok(body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }

    /// Serve one HTTP response over TLS with a freshly generated self-signed
    /// certificate. The verified attempt aborts mid-handshake, so the server
    /// keeps accepting until a connection gets far enough to send a request.
    fn spawn_self_signed_server(body: &str) -> u16 {
        use std::io::{Read, Write};

        let key_pair = rcgen::KeyPair::generate().unwrap();
        let cert_params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let cert = cert_params.self_signed(&key_pair).unwrap();
        let server_cert = rustls::pki_types::CertificateDer::from(cert.der().to_vec());
        let server_key = rustls::pki_types::PrivateKeyDer::try_from(key_pair.serialize_der()).unwrap();
        let config = std::sync::Arc::new(
            rustls::ServerConfig::builder_with_provider(
                rustls::crypto::ring::default_provider().into(),
            )
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_no_client_auth()
            .with_single_cert(vec![server_cert], server_key)
            .unwrap(),
        );

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let resp = http_ok(body);
        std::thread::spawn(move || {
            for _ in 0..4 {
                let Ok((tcp, _)) = listener.accept() else { return };
                let conn = rustls::ServerConnection::new(config.clone()).unwrap();
                let mut tls = rustls::StreamOwned::new(conn, tcp);
                let mut buf = [0u8; 4096];
                match tls.read(&mut buf) {
                    Ok(n) if n > 0 => {
                        let _ = tls.write_all(resp.as_bytes());
                        return;
                    }
                    _ => continue,
                }
            }
        });
        port
    }

    #[tokio::test]
    async fn self_signed_certificate_falls_back_to_unverified() {
        let port = spawn_self_signed_server(GOOD_BODY);
        let prober = Prober::new(&ProbeOptions::default()).unwrap();
        let base = BaseUrl::parse(&format!("https://127.0.0.1:{port}")).unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Success(s) => {
                assert!(s.cert_fallback);
                assert_eq!(s.status, 200);
                assert_eq!(s.info.version, "3.5.2");
            }
            other => panic!("expected fallback success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_server_is_transport_failure_not_cert_issue() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let Ok((mut sock, _)) = listener.accept().await else { return };
            let mut buf = [0u8; 4096];
            let _ = sock.read(&mut buf).await;
            // hold the connection open without ever answering
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(sock);
        });

        let prober = Prober::new(&ProbeOptions {
            timeout: Duration::from_secs(1),
            redirects: 8,
        })
        .unwrap();
        let base = BaseUrl::parse(&format!("http://127.0.0.1:{port}")).unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Transport { cert_issue } => assert!(!cert_issue),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn refused_connection_is_transport_failure() {
        let prober = Prober::new(&ProbeOptions {
            timeout: Duration::from_secs(1),
            redirects: 8,
        })
        .unwrap();
        // port 1 won't be listening
        let base = BaseUrl::parse("http://127.0.0.1:1").unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Transport { cert_issue } => assert!(!cert_issue),
            other => panic!("expected transport failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn good_document_is_success() {
        let base = one_shot_server(vec![http_ok(GOOD_BODY)]).await;
        let prober = Prober::new(&ProbeOptions::default()).unwrap();
        let base = BaseUrl::parse(&base).unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Success(s) => {
                assert_eq!(s.status, 200);
                assert_eq!(s.info.version, "3.5.2");
                assert!(!s.cert_fallback);
                assert!(!s.moved);
                assert!(s.elapsed_ms >= 0);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_body_is_parse_failure() {
        let base = one_shot_server(vec![http_ok("<html>not a status document</html>")]).await;
        let prober = Prober::new(&ProbeOptions::default()).unwrap();
        let base = BaseUrl::parse(&base).unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Parse { status, .. } => assert_eq!(status, 200),
            other => panic!("expected parse failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn redirect_to_another_host_sets_moved() {
        let redirect = "HTTP/1.1 301 Moved Permanently\r\nLocation: http://localhost:{port}/friendica/json\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
        let base = one_shot_server(vec![redirect, http_ok(GOOD_BODY)]).await;
        let prober = Prober::new(&ProbeOptions::default()).unwrap();
        let base = BaseUrl::parse(&base).unwrap();
        match prober.probe(&base).await {
            ProbeOutcome::Success(s) => assert!(s.moved),
            other => panic!("expected success, got {other:?}"),
        }
    }
}
