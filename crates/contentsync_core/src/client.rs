use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::collection::MatchingKey;
use crate::config::{EnvLookup, SyncConfig, env_u64, env_usize, process_env};
use crate::record::{Fields, RemoteRecord};

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_RETRIES: usize = 2;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub page: usize,
    pub page_size: usize,
    pub populate: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemotePage {
    pub records: Vec<RemoteRecord>,
    pub page: usize,
    pub page_count: usize,
}

pub trait ContentReadApi {
    /// Every remote record of `collection` whose `key.field` equals `key.value`.
    fn find_matches(&mut self, collection: &str, key: &MatchingKey) -> Result<Vec<RemoteRecord>>;
    fn find_page(&mut self, collection: &str, query: &PageQuery) -> Result<RemotePage>;
    /// `None` when the singleton has no content yet.
    fn find_single(&mut self, singleton: &str, populate: Option<&str>) -> Result<Option<Fields>>;
    /// Upload metadata; `None` when the server does not expose the upload API.
    fn find_media(&mut self) -> Result<Option<Vec<Value>>>;
    fn request_count(&self) -> usize;
}

/// Mutating calls. Each returns the remote identifier when the response exposes one.
pub trait ContentWriteApi: ContentReadApi {
    fn create(&mut self, collection: &str, fields: &Fields) -> Result<Option<String>>;
    fn update(&mut self, collection: &str, id: &str, fields: &Fields) -> Result<Option<String>>;
    fn update_single(&mut self, singleton: &str, fields: &Fields) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub rate_limit_ms: u64,
}

impl ClientConfig {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::from_config_with(config, &process_env)
    }

    pub(crate) fn from_config_with(config: &SyncConfig, lookup: EnvLookup<'_>) -> Result<Self> {
        let base_url = config.base_url_with(lookup).ok_or_else(|| {
            anyhow::anyhow!("remote URL is not configured (set STRAPI_URL or [remote].url)")
        })?;
        Url::parse(&base_url).with_context(|| format!("invalid remote URL: {base_url}"))?;

        let remote = &config.remote;
        Ok(Self {
            base_url,
            token: config.token_with(lookup),
            user_agent: config.user_agent(),
            timeout_ms: env_u64(lookup, "STRAPI_HTTP_TIMEOUT_MS")
                .or(remote.timeout_ms)
                .unwrap_or(DEFAULT_TIMEOUT_MS),
            max_retries: env_usize(lookup, "STRAPI_HTTP_RETRIES")
                .or(remote.retries)
                .unwrap_or(DEFAULT_RETRIES),
            retry_delay_ms: env_u64(lookup, "STRAPI_HTTP_RETRY_DELAY_MS")
                .or(remote.retry_delay_ms)
                .unwrap_or(DEFAULT_RETRY_DELAY_MS),
            rate_limit_ms: env_u64(lookup, "STRAPI_RATE_LIMIT_MS")
                .or(remote.rate_limit_ms)
                .unwrap_or(0),
        })
    }
}

pub struct StrapiClient {
    client: Client,
    config: ClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl StrapiClient {
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        Self::new(ClientConfig::from_config(config)?)
    }

    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build content API HTTP client")?;
        if config.token.is_none() {
            warn!(base_url = %config.base_url, "no API token configured; requests are sent anonymously");
        }

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// GET with bounded retries. A 404 yields `None` when `allow_missing` is set.
    fn request_get(
        &mut self,
        url: Url,
        query: &[(String, String)],
        allow_missing: bool,
    ) -> Result<Option<Value>> {
        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            debug!(method = "GET", url = %url, attempt, "content api request");
            let response = self
                .authorized(self.client.get(url.clone()))
                .query(query)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::NOT_FOUND && allow_missing {
                        return Ok(None);
                    }
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        let body = response.text().unwrap_or_default();
                        bail!("{}", describe_http_failure("GET", &url, status, &body));
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode content API JSON response")?;
                    return Ok(Some(payload));
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).with_context(|| format!("failed to call GET {url}"));
                }
            }
        }

        bail!("content API request exhausted retry budget")
    }

    /// Single-attempt write; a rejected write is never replayed.
    fn request_write(&mut self, method: Method, url: Url, fields: &Fields) -> Result<Value> {
        self.apply_rate_limit();
        debug!(method = %method, url = %url, "content api request");
        let response = self
            .authorized(self.client.request(method.clone(), url.clone()))
            .json(&json!({ "data": fields }))
            .send()
            .with_context(|| format!("failed to call {method} {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            bail!("{}", describe_http_failure(method.as_str(), &url, status, &body));
        }
        let text = response
            .text()
            .context("failed to read content API response body")?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).context("failed to decode content API JSON response")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl ContentReadApi for StrapiClient {
    fn find_matches(&mut self, collection: &str, key: &MatchingKey) -> Result<Vec<RemoteRecord>> {
        let url = endpoint_url(&self.config.base_url, &[collection])?;
        let query = vec![filter_param(key)];
        let payload = self.request_get(url, &query, false)?.unwrap_or(Value::Null);
        let parsed: ListResponse = serde_json::from_value(payload)
            .with_context(|| format!("failed to decode {collection} lookup response"))?;
        parsed
            .data
            .into_iter()
            .map(RemoteRecord::from_value)
            .collect()
    }

    fn find_page(&mut self, collection: &str, query: &PageQuery) -> Result<RemotePage> {
        let url = endpoint_url(&self.config.base_url, &[collection])?;
        let payload = self
            .request_get(url, &page_params(query), false)?
            .unwrap_or(Value::Null);
        let parsed: ListResponse = serde_json::from_value(payload)
            .with_context(|| format!("failed to decode {collection} page response"))?;
        let records = parsed
            .data
            .into_iter()
            .map(RemoteRecord::from_value)
            .collect::<Result<Vec<_>>>()?;
        let pagination = parsed.meta.pagination.unwrap_or_default();
        Ok(RemotePage {
            records,
            page: pagination.page.unwrap_or(query.page),
            page_count: pagination.page_count.unwrap_or(query.page),
        })
    }

    fn find_single(&mut self, singleton: &str, populate: Option<&str>) -> Result<Option<Fields>> {
        let url = endpoint_url(&self.config.base_url, &[singleton])?;
        let query = populate
            .map(|value| vec![("populate".to_string(), value.to_string())])
            .unwrap_or_default();
        let Some(payload) = self.request_get(url, &query, true)? else {
            return Ok(None);
        };
        let parsed: SingleResponse = serde_json::from_value(payload)
            .with_context(|| format!("failed to decode {singleton} response"))?;
        match parsed.data {
            Some(Value::Object(fields)) => Ok(Some(fields)),
            Some(Value::Null) | None => Ok(None),
            Some(_) => bail!("{singleton} response `data` is not a JSON object"),
        }
    }

    fn find_media(&mut self) -> Result<Option<Vec<Value>>> {
        let url = endpoint_url(&self.config.base_url, &["upload", "files"])?;
        let Some(payload) = self.request_get(url, &[], true)? else {
            return Ok(None);
        };
        match payload {
            Value::Array(files) => Ok(Some(files)),
            Value::Object(mut envelope) => match envelope.remove("data") {
                Some(Value::Array(files)) => Ok(Some(files)),
                _ => bail!("upload files response is not a JSON array"),
            },
            _ => bail!("upload files response is not a JSON array"),
        }
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl ContentWriteApi for StrapiClient {
    fn create(&mut self, collection: &str, fields: &Fields) -> Result<Option<String>> {
        let url = endpoint_url(&self.config.base_url, &[collection])?;
        let payload = self.request_write(Method::POST, url, fields)?;
        Ok(response_identifier(payload))
    }

    fn update(&mut self, collection: &str, id: &str, fields: &Fields) -> Result<Option<String>> {
        let url = endpoint_url(&self.config.base_url, &[collection, id])?;
        let payload = self.request_write(Method::PUT, url, fields)?;
        Ok(response_identifier(payload).or_else(|| Some(id.to_string())))
    }

    fn update_single(&mut self, singleton: &str, fields: &Fields) -> Result<()> {
        let url = endpoint_url(&self.config.base_url, &[singleton])?;
        self.request_write(Method::PUT, url, fields)?;
        Ok(())
    }
}

/// Read every page of a collection, in server order.
pub fn fetch_all_records<A: ContentReadApi>(
    api: &mut A,
    collection: &str,
    page_size: usize,
    populate: Option<&str>,
) -> Result<Vec<RemoteRecord>> {
    let mut records = Vec::new();
    let mut page = 1;
    loop {
        let query = PageQuery {
            page,
            page_size: page_size.max(1),
            populate: populate.map(ToString::to_string),
        };
        let result = api
            .find_page(collection, &query)
            .with_context(|| format!("failed to read {collection} page {page}"))?;
        let received = result.records.len();
        records.extend(result.records);
        if received == 0 || page >= result.page_count {
            break;
        }
        page += 1;
    }
    Ok(records)
}

/// `<base>/api/<segment>/...`, keeping any path prefix on the base URL.
pub fn endpoint_url(base_url: &str, segments: &[&str]) -> Result<Url> {
    let mut url =
        Url::parse(base_url).with_context(|| format!("invalid remote URL: {base_url}"))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("remote URL cannot be a base: {base_url}"))?;
        path.pop_if_empty().push("api");
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

pub fn filter_param(key: &MatchingKey) -> (String, String) {
    (format!("filters[{}][$eq]", key.field), key.value.clone())
}

fn page_params(query: &PageQuery) -> Vec<(String, String)> {
    let mut params = vec![
        ("pagination[page]".to_string(), query.page.to_string()),
        ("pagination[pageSize]".to_string(), query.page_size.to_string()),
    ];
    if let Some(populate) = &query.populate {
        params.push(("populate".to_string(), populate.clone()));
    }
    params
}

fn response_identifier(payload: Value) -> Option<String> {
    let data = match payload {
        Value::Object(mut envelope) => envelope.remove("data")?,
        _ => return None,
    };
    RemoteRecord::from_value(data).ok().map(|record| record.id)
}

fn describe_http_failure(method: &str, url: &Url, status: StatusCode, body: &str) -> String {
    match api_error_message(body) {
        Some(message) => format!("{method} {url} failed with HTTP {status}: {message}"),
        None => format!("{method} {url} failed with HTTP {status}"),
    }
}

/// Pull `error.name` / `error.message` out of a content API error body.
pub fn api_error_message(body: &str) -> Option<String> {
    let payload: Value = serde_json::from_str(body).ok()?;
    let error = payload.get("error")?;
    let message = error.get("message").and_then(Value::as_str)?;
    match error.get("name").and_then(Value::as_str) {
        Some(name) => Some(format!("{name}: {message}")),
        None => Some(message.to_string()),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct ListResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    meta: ListMeta,
}

#[derive(Debug, Deserialize, Default)]
struct ListMeta {
    pagination: Option<Pagination>,
}

#[derive(Debug, Deserialize, Default)]
struct Pagination {
    page: Option<usize>,
    #[serde(rename = "pageCount")]
    page_count: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SingleResponse {
    data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{Ipv4Addr, TcpListener, TcpStream};
    use std::thread::{self, JoinHandle};

    use super::*;
    use crate::config::RemoteSection;

    /// Answer one connection per canned `(status, body)` and hand back the raw requests.
    fn serve(responses: Vec<(u16, &'static str)>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let handle = thread::spawn(move || {
            let mut requests = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().expect("accept");
                requests.push(read_request(&mut stream));
                let reason = match status {
                    200 => "OK",
                    400 => "Bad Request",
                    404 => "Not Found",
                    503 => "Service Unavailable",
                    _ => "Unknown",
                };
                let response = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(response.as_bytes()).expect("write response");
            }
            requests
        });
        (format!("http://{addr}"), handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));
        let mut head = String::new();
        let mut content_length = 0;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).expect("read request line");
            if line.is_empty() || line == "\r\n" {
                break;
            }
            if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
            head.push_str(&line);
        }
        let mut body = vec![0; content_length];
        reader.read_exact(&mut body).expect("read request body");
        format!("{head}\r\n{}", String::from_utf8_lossy(&body))
    }

    fn local_client(base_url: String) -> StrapiClient {
        StrapiClient::new(ClientConfig {
            base_url,
            token: Some("t0k3n".to_string()),
            user_agent: "contentsync-test".to_string(),
            timeout_ms: 5_000,
            max_retries: 2,
            retry_delay_ms: 0,
            rate_limit_ms: 0,
        })
        .expect("client")
    }

    #[test]
    fn lookup_sends_eq_filter_and_bearer_token() {
        let (base_url, server) = serve(vec![(
            200,
            r#"{"data":[{"id":7,"documentId":"abc","name":"Tech & Life"}],"meta":{}}"#,
        )]);
        let mut client = local_client(base_url);
        let key = MatchingKey {
            field: "name".to_string(),
            value: "Tech & Life".to_string(),
        };

        let matches = client.find_matches("categories", &key).expect("lookup");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, "abc");

        let requests = server.join().expect("server");
        assert!(requests[0].starts_with(
            "GET /api/categories?filters%5Bname%5D%5B%24eq%5D=Tech+%26+Life HTTP/1.1"
        ));
        assert!(
            requests[0]
                .to_ascii_lowercase()
                .contains("authorization: bearer t0k3n")
        );
    }

    #[test]
    fn reads_retry_on_service_unavailable() {
        let (base_url, server) = serve(vec![
            (503, ""),
            (
                200,
                r#"{"data":[{"id":1,"name":"Tech"}],"meta":{"pagination":{"page":1,"pageCount":3}}}"#,
            ),
        ]);
        let mut client = local_client(base_url);

        let page = client
            .find_page(
                "categories",
                &PageQuery {
                    page: 1,
                    page_size: 1,
                    populate: None,
                },
            )
            .expect("page");
        assert_eq!(page.records[0].id, "1");
        assert_eq!(page.page_count, 3);
        assert_eq!(client.request_count(), 2);

        let requests = server.join().expect("server");
        assert_eq!(requests.len(), 2);
        assert!(requests[1].contains("pagination%5BpageSize%5D=1"));
    }

    #[test]
    fn create_posts_data_envelope_and_returns_document_id() {
        let (base_url, server) = serve(vec![(
            200,
            r#"{"data":{"id":4,"documentId":"new4","name":"Tech"},"meta":{}}"#,
        )]);
        let mut client = local_client(base_url);
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!("Tech"));

        let id = client.create("categories", &fields).expect("create");
        assert_eq!(id.as_deref(), Some("new4"));

        let requests = server.join().expect("server");
        assert!(requests[0].starts_with("POST /api/categories HTTP/1.1"));
        assert!(requests[0].ends_with(r#"{"data":{"name":"Tech"}}"#));
    }

    #[test]
    fn failed_write_is_an_error_and_never_retried() {
        let (base_url, server) = serve(vec![(
            503,
            r#"{"data":null,"error":{"status":503,"name":"ServiceUnavailableError","message":"maintenance"}}"#,
        )]);
        let mut client = local_client(base_url);
        let mut fields = Fields::new();
        fields.insert("name".to_string(), json!("Tech"));

        let error = client
            .update("categories", "abc", &fields)
            .expect_err("write must fail");
        let message = format!("{error:#}");
        assert!(message.contains("PUT"));
        assert!(message.contains("503"));
        assert!(message.contains("ServiceUnavailableError: maintenance"));
        assert_eq!(client.request_count(), 1);

        let requests = server.join().expect("server");
        assert_eq!(requests.len(), 1);
        assert!(requests[0].starts_with("PUT /api/categories/abc HTTP/1.1"));
    }

    #[test]
    fn missing_singleton_and_media_are_none() {
        let (base_url, server) = serve(vec![
            (404, r#"{"data":null,"error":{"status":404,"name":"NotFoundError","message":"Not Found"}}"#),
            (404, ""),
        ]);
        let mut client = local_client(base_url);

        assert!(client.find_single("about", Some("*")).expect("single").is_none());
        assert!(client.find_media().expect("media").is_none());

        let requests = server.join().expect("server");
        assert!(requests[0].starts_with("GET /api/about?populate="));
        assert!(requests[1].starts_with("GET /api/upload/files HTTP/1.1"));
    }

    #[test]
    fn singleton_update_has_no_id_segment_and_media_reads_bare_array() {
        let (base_url, server) = serve(vec![
            (200, r#"{"data":{"id":1,"siteName":"Blog"},"meta":{}}"#),
            (200, r#"[{"id":1,"name":"cover.png","url":"/uploads/cover.png"}]"#),
        ]);
        let mut client = local_client(base_url);
        let mut fields = Fields::new();
        fields.insert("siteName".to_string(), json!("Blog"));

        client.update_single("global", &fields).expect("update single");
        let media = client.find_media().expect("media").expect("media present");
        assert_eq!(media.len(), 1);
        assert_eq!(media[0]["name"], json!("cover.png"));

        let requests = server.join().expect("server");
        assert!(requests[0].starts_with("PUT /api/global HTTP/1.1"));
    }

    #[test]
    fn endpoint_url_appends_api_segments() {
        let url = endpoint_url("https://cms.example.org", &["articles"]).expect("url");
        assert_eq!(url.as_str(), "https://cms.example.org/api/articles");

        let url = endpoint_url("https://example.org/cms/", &["articles", "abc123"]).expect("url");
        assert_eq!(url.as_str(), "https://example.org/cms/api/articles/abc123");
    }

    #[test]
    fn endpoint_url_encodes_identifier() {
        let url = endpoint_url("https://cms.example.org", &["articles", "a b/c"]).expect("url");
        assert_eq!(url.as_str(), "https://cms.example.org/api/articles/a%20b%2Fc");
    }

    #[test]
    fn filter_param_uses_eq_operator() {
        let key = MatchingKey {
            field: "name".to_string(),
            value: "Tech & Life".to_string(),
        };
        assert_eq!(
            filter_param(&key),
            ("filters[name][$eq]".to_string(), "Tech & Life".to_string())
        );
    }

    #[test]
    fn page_params_include_populate_when_set() {
        let params = page_params(&PageQuery {
            page: 2,
            page_size: 50,
            populate: Some("*".to_string()),
        });
        assert_eq!(params.len(), 3);
        assert_eq!(params[0], ("pagination[page]".to_string(), "2".to_string()));
        assert_eq!(params[2], ("populate".to_string(), "*".to_string()));
    }

    #[test]
    fn api_error_message_reads_error_envelope() {
        let body = r#"{"data":null,"error":{"status":400,"name":"ValidationError","message":"This attribute must be unique"}}"#;
        assert_eq!(
            api_error_message(body).as_deref(),
            Some("ValidationError: This attribute must be unique")
        );
        assert!(api_error_message("<html>bad gateway</html>").is_none());
    }

    #[test]
    fn response_identifier_reads_data_envelope() {
        let payload = json!({"data": {"id": 3, "documentId": "doc3", "name": "Tech"}, "meta": {}});
        assert_eq!(response_identifier(payload).as_deref(), Some("doc3"));
        assert!(response_identifier(Value::Null).is_none());
    }

    #[test]
    fn client_config_requires_url_and_applies_env() {
        let empty = |_: &str| -> Option<String> { None };
        assert!(ClientConfig::from_config_with(&SyncConfig::default(), &empty).is_err());

        let config = SyncConfig {
            remote: RemoteSection {
                url: Some("https://cms.example.org/".to_string()),
                timeout_ms: Some(1_000),
                ..RemoteSection::default()
            },
            ..SyncConfig::default()
        };
        let env = |key: &str| match key {
            "STRAPI_HTTP_TIMEOUT_MS" => Some("2500".to_string()),
            "STRAPI_API_TOKEN" => Some("t0k3n".to_string()),
            _ => None,
        };
        let resolved = ClientConfig::from_config_with(&config, &env).expect("config");
        assert_eq!(resolved.base_url, "https://cms.example.org");
        assert_eq!(resolved.timeout_ms, 2_500);
        assert_eq!(resolved.token.as_deref(), Some("t0k3n"));
        assert_eq!(resolved.max_retries, DEFAULT_RETRIES);
        assert_eq!(resolved.rate_limit_ms, 0);
    }
}
