//! The two XRPC procedures the hook calls, their wire types, and the
//! [`Service`] trait that abstracts over the network so the deploy flow can be
//! tested without it. [`Client`] is the real implementation over `ureq`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::facet::Facet;

/// The service sessions and records are created against by default.
pub const DEFAULT_SERVICE: &str = "https://bsky.social";

/// Logs in with a handle and app password.
pub const CREATE_SESSION: &str = "com.atproto.server.createSession";

/// Writes a record into the caller's repository.
pub const CREATE_RECORD: &str = "com.atproto.repo.createRecord";

/// The collection and record type of a feed post.
pub const FEED_POST: &str = "app.bsky.feed.post";

const USER_AGENT: &str = concat!("bluesky-feed/", env!("CARGO_PKG_VERSION"));

/// The body of a `createSession` call.
#[derive(Serialize, Clone, Copy)]
pub struct CreateSession<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

impl fmt::Debug for CreateSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CreateSession")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The interesting part of a `createSession` response. Both fields are
/// optional on the wire so a malformed session can be reported as such
/// instead of as a JSON error.
#[derive(Deserialize, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    #[serde(default)]
    pub access_jwt: Option<String>,

    #[serde(default)]
    pub did: Option<String>,

    #[serde(default)]
    pub handle: Option<String>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_jwt", &self.access_jwt.as_ref().map(|_| "<redacted>"))
            .field("did", &self.did)
            .field("handle", &self.handle)
            .finish()
    }
}

/// An `app.bsky.feed.post` record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub kind: String,

    pub text: String,

    /// ISO-8601 in UTC with millisecond precision.
    #[serde(rename = "createdAt")]
    pub created_at: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
}

impl PostRecord {
    pub fn new(text: String, facets: Vec<Facet>, created_at: DateTime<Utc>) -> Self {
        PostRecord {
            kind: FEED_POST.to_owned(),
            text,
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            facets,
        }
    }
}

/// The body of a `createRecord` call.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct CreateRecord<'a> {
    /// The DID of the repository to write to.
    pub repo: &'a str,
    pub collection: &'a str,
    pub record: &'a PostRecord,
}

impl<'a> CreateRecord<'a> {
    /// Creates a feed post in `repo`.
    pub fn post(repo: &'a str, record: &'a PostRecord) -> Self {
        CreateRecord {
            repo,
            collection: FEED_POST,
            record,
        }
    }
}

/// A reference to a created record.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct RecordRef {
    pub uri: String,
    pub cid: String,
}

/// The XRPC procedures the deploy flow depends on.
pub trait Service {
    /// Calls `com.atproto.server.createSession`.
    fn create_session(&self, request: &CreateSession) -> Result<Session>;

    /// Calls `com.atproto.repo.createRecord` authenticated with
    /// `access_jwt`.
    fn create_record(&self, access_jwt: &str, request: &CreateRecord) -> Result<RecordRef>;
}

/// Calls XRPC procedures over HTTP.
pub struct Client {
    agent: ureq::Agent,
    service: Url,
}

impl Client {
    /// Creates a client for the service hosted at `service` (e.g.
    /// `https://bsky.social`).
    pub fn new(service: Url) -> Self {
        // Error statuses are read as responses so the XRPC error body can be
        // reported.
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build();
        Client {
            agent: ureq::Agent::new_with_config(config),
            service,
        }
    }

    /// The service this client calls.
    pub fn service(&self) -> &Url {
        &self.service
    }

    fn endpoint(&self, nsid: &str) -> String {
        format!(
            "{}/xrpc/{}",
            self.service.as_str().trim_end_matches('/'),
            nsid
        )
    }

    fn procedure<B, T>(&self, nsid: &str, access_jwt: Option<&str>, body: &B) -> Result<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let mut request = self
            .agent
            .post(&self.endpoint(nsid))
            .header("User-Agent", USER_AGENT);
        if let Some(token) = access_jwt {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let mut response = request.send_json(body)?;
        let status = response.status();
        if !status.is_success() {
            let text = response.body_mut().read_to_string().unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                error: body.error,
                message: body.message.or_else(|| {
                    let text = text.trim();
                    if text.is_empty() {
                        None
                    } else {
                        Some(text.to_owned())
                    }
                }),
            });
        }
        Ok(response.body_mut().read_json()?)
    }
}

impl Service for Client {
    fn create_session(&self, request: &CreateSession) -> Result<Session> {
        self.procedure(CREATE_SESSION, None, request)
    }

    fn create_record(&self, access_jwt: &str, request: &CreateRecord) -> Result<RecordRef> {
        self.procedure(CREATE_RECORD, Some(access_jwt), request)
    }
}

/// The body XRPC services send with error statuses.
#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    message: Option<String>,
}

fn describe(error: &Option<String>, message: &Option<String>) -> String {
    match (error, message) {
        (Some(error), Some(message)) => format!("{}: {}", error, message),
        (Some(only), None) | (None, Some(only)) => only.clone(),
        (None, None) => "no details".to_owned(),
    }
}

/// Represents the result of an XRPC call.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents a failed XRPC call.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when the request couldn't be sent or the response couldn't
    /// be read (DNS, TLS, connection, malformed JSON).
    #[error(transparent)]
    Http(#[from] ureq::Error),

    /// Returned when the service answers with a non-success status.
    #[error("HTTP {status}: {}", describe(.error, .message))]
    Status {
        status: u16,
        error: Option<String>,
        message: Option<String>,
    },
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::facet::link_facets;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn test_create_record_wire_format() -> anyhow::Result<()> {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let text = "New: https://a.org/x".to_owned();
        let facets = link_facets(&text, "https://a.org/x");
        let record = PostRecord::new(text, facets, created_at);
        assert_eq!(
            json!({
                "repo": "did:plc:abc",
                "collection": "app.bsky.feed.post",
                "record": {
                    "$type": "app.bsky.feed.post",
                    "text": "New: https://a.org/x",
                    "createdAt": "2024-01-02T03:04:05.000Z",
                    "facets": [{
                        "index": { "byteStart": 5, "byteEnd": 20 },
                        "features": [{
                            "$type": "app.bsky.richtext.facet#link",
                            "uri": "https://a.org/x",
                        }],
                    }],
                },
            }),
            serde_json::to_value(CreateRecord::post("did:plc:abc", &record))?,
        );
        Ok(())
    }

    #[test]
    fn test_record_without_facets_omits_key() -> anyhow::Result<()> {
        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = PostRecord::new("plain".to_owned(), Vec::new(), created_at);
        let value = serde_json::to_value(&record)?;
        assert!(value.get("facets").is_none());
        Ok(())
    }

    #[test]
    fn test_session_missing_fields() -> anyhow::Result<()> {
        let session: Session = serde_json::from_str(r#"{"did":"did:plc:abc"}"#)?;
        assert_eq!(None, session.access_jwt);
        assert_eq!(Some("did:plc:abc".to_owned()), session.did);
        Ok(())
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let request = CreateSession {
            identifier: "alice.example.org",
            password: "hunter2",
        };
        assert!(!format!("{:?}", request).contains("hunter2"));

        let session = Session {
            access_jwt: Some("secret-token".to_owned()),
            ..Session::default()
        };
        assert!(!format!("{:?}", session).contains("secret-token"));
    }

    #[test]
    fn test_error_display() {
        let err = Error::Status {
            status: 401,
            error: Some("AuthenticationRequired".to_owned()),
            message: Some("Invalid identifier or password".to_owned()),
        };
        assert_eq!(
            "HTTP 401: AuthenticationRequired: Invalid identifier or password",
            err.to_string()
        );
    }

    #[test]
    fn test_client_create_record() -> anyhow::Result<()> {
        let (service, server) = serve(
            "200 OK",
            r#"{"uri":"at://did:plc:abc/app.bsky.feed.post/1","cid":"bafy"}"#,
        )?;
        let created_at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let record = PostRecord::new("hi".to_owned(), Vec::new(), created_at);
        let got = Client::new(service)
            .create_record("token", &CreateRecord::post("did:plc:abc", &record))?;
        assert_eq!(
            RecordRef {
                uri: "at://did:plc:abc/app.bsky.feed.post/1".to_owned(),
                cid: "bafy".to_owned(),
            },
            got
        );

        let request = server.join().unwrap()?.to_lowercase();
        assert!(request.starts_with("post /xrpc/com.atproto.repo.createrecord "));
        assert!(request.contains("authorization: bearer token"));
        assert!(request.contains("content-type: application/json"));
        let compact: String = request.chars().filter(|c| !c.is_whitespace()).collect();
        assert!(compact.contains("\"repo\":\"did:plc:abc\""));
        Ok(())
    }

    #[test]
    fn test_client_error_status() -> anyhow::Result<()> {
        let (service, server) = serve(
            "401 Unauthorized",
            r#"{"error":"AuthenticationRequired","message":"Invalid identifier or password"}"#,
        )?;
        let err = Client::new(service)
            .create_session(&CreateSession {
                identifier: "alice.example.org",
                password: "wrong",
            })
            .unwrap_err();
        match err {
            Error::Status {
                status,
                error,
                message,
            } => {
                assert_eq!(401, status);
                assert_eq!(Some("AuthenticationRequired".to_owned()), error);
                assert_eq!(Some("Invalid identifier or password".to_owned()), message);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let request = server.join().unwrap()?.to_lowercase();
        assert!(request.starts_with("post /xrpc/com.atproto.server.createsession "));
        assert!(!request.contains("authorization:"));
        Ok(())
    }

    /// Serves a single canned response on a loopback port. The thread yields
    /// the raw request it received.
    fn serve(
        status: &'static str,
        body: &'static str,
    ) -> std::io::Result<(Url, thread::JoinHandle<std::io::Result<String>>)> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let service = Url::parse(&format!("http://{}", listener.local_addr()?)).unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept()?;
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = stream.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
                if request_complete(&request) {
                    break;
                }
            }
            write!(
                stream,
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            )?;
            stream.flush()?;
            Ok(String::from_utf8_lossy(&request).into_owned())
        });
        Ok((service, handle))
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        match text.find("\r\n\r\n") {
            None => false,
            Some(end) => {
                let head = text[..end].to_lowercase();
                if head.contains("transfer-encoding: chunked") {
                    return text[end + 4..].contains("0\r\n\r\n");
                }
                let content_length = head
                    .lines()
                    .filter_map(|line| line.split_once(':'))
                    .find(|(name, _)| name.trim() == "content-length")
                    .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                request.len() >= end + 4 + content_length
            }
        }
    }
}
