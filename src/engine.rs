// Request engines
// One capability (get / post_and_poll) with decorators: Live talks to the service, Cached reads
// through a CacheStore, Slow adds a random delay. Callers choose the wrapping order.

use crate::cache::{CacheError, CacheStore, MemoryStore, WriteOnlyStore};
use crate::config::ClientConfig;
use crate::parser::{poll_status, ParseError, UPDATES_COMPLETE};
use crate::request::Form;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use reqwest::header::{ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::Url;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const API_KEY_PARAM: &str = "apiKey";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error: {status_code} for {url}")]
    HttpStatus { status_code: u16, url: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Search submitted but no poll location returned")]
    MissingLocation,

    #[error("Live search not complete after {0}ms")]
    PollTimeout(u64),

    #[error("Decode error: {0}")]
    Decode(#[from] ParseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
}

impl From<reqwest::Error> for EngineError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => EngineError::HttpStatus {
                status_code: status.as_u16(),
                url: error.url().map(|url| url.to_string()).unwrap_or_default(),
            },
            None => EngineError::Network(error.to_string()),
        }
    }
}

#[async_trait]
pub trait RequestEngine: Send + Sync + 'static {
    // Idempotent read
    async fn get(&self, url: &str) -> Result<Bytes, EngineError>;

    // Submit a search, then wait until its results are complete
    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError>;
}

#[async_trait]
impl<E: RequestEngine + ?Sized> RequestEngine for Arc<E> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        (**self).get(url).await
    }

    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError> {
        (**self).post_and_poll(url, form).await
    }
}

#[async_trait]
impl<E: RequestEngine + ?Sized> RequestEngine for Box<E> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        (**self).get(url).await
    }

    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError> {
        (**self).post_and_poll(url, form).await
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostResponse {
    pub location: Option<String>,
    pub body: Bytes,
}

// Raw HTTP exchange underneath the live engine
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError>;

    async fn post_form(&self, url: &str, form: &Form) -> Result<PostResponse, EngineError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        (**self).get(url).await
    }

    async fn post_form(&self, url: &str, form: &Form) -> Result<PostResponse, EngineError> {
        (**self).post_form(url, form).await
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    accept: &'static str,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, EngineError> {
        // Redirects stay visible: the session location is read from the submit response
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            accept: config.reply_format.mime_type(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        let response = self
            .client
            .get(url)
            .header(ACCEPT, self.accept)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }

    async fn post_form(&self, url: &str, form: &Form) -> Result<PostResponse, EngineError> {
        let response = self
            .client
            .post(url)
            .header(ACCEPT, self.accept)
            .form(form)
            .send()
            .await?
            .error_for_status()?;

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;
        Ok(PostResponse { location, body })
    }
}

pub fn with_api_key(url: &str, api_key: &str) -> Result<String, EngineError> {
    let mut parsed = parse_url(url)?;
    parsed.query_pairs_mut().append_pair(API_KEY_PARAM, api_key);
    Ok(parsed.to_string())
}

// Submission URL followed by the encoded form
pub fn form_cache_key(url: &str, form: &Form) -> Result<String, EngineError> {
    let mut key = parse_url(url)?;
    key.query_pairs_mut().extend_pairs(form.iter());
    Ok(key.to_string())
}

fn parse_url(url: &str) -> Result<Url, EngineError> {
    Url::parse(url).map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))
}

// The session location may be relative to the submission URL
fn resolve_location(submitted_to: &str, location: &str) -> Result<String, EngineError> {
    parse_url(submitted_to)?
        .join(location)
        .map(|url| url.to_string())
        .map_err(|e| EngineError::InvalidUrl(format!("{}: {}", location, e)))
}

fn is_blank(payload: &[u8]) -> bool {
    payload.iter().all(u8::is_ascii_whitespace)
}

pub struct LiveEngine<T = HttpTransport> {
    transport: T,
    api_key: String,
    poll_interval: Duration,
    poll_timeout: Option<Duration>,
}

impl LiveEngine<HttpTransport> {
    pub fn new(config: &ClientConfig) -> Result<Self, EngineError> {
        Ok(Self::with_transport(HttpTransport::new(config)?, config))
    }
}

impl<T: Transport> LiveEngine<T> {
    pub fn with_transport(transport: T, config: &ClientConfig) -> Self {
        Self {
            transport,
            api_key: config.api_key.clone(),
            poll_interval: config.poll_interval,
            poll_timeout: config.poll_timeout,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // Empty and not yet complete replies are retried after the poll interval
    async fn poll(&self, poll_url: &str) -> Result<Bytes, EngineError> {
        let url = with_api_key(poll_url, &self.api_key)?;
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            if let Some(timeout) = self.poll_timeout {
                if started.elapsed() >= timeout {
                    warn!(poll_url, attempts, "live search poll deadline reached");
                    return Err(EngineError::PollTimeout(timeout.as_millis() as u64));
                }
            }

            attempts += 1;
            let payload = self.transport.get(&url).await?;
            if is_blank(&payload) {
                debug!(poll_url, attempts, "empty poll reply");
            } else {
                let status = poll_status(&payload)?;
                if status == UPDATES_COMPLETE {
                    info!(poll_url, attempts, "live search complete");
                    return Ok(payload);
                }
                debug!(poll_url, attempts, status = %status, "live search pending");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl<T: Transport> RequestEngine for LiveEngine<T> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        debug!(url, "live get");
        let keyed = with_api_key(url, &self.api_key)?;
        self.transport.get(&keyed).await
    }

    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError> {
        let mut submitted = form.clone();
        submitted.insert(API_KEY_PARAM.to_string(), self.api_key.clone());

        let response = self.transport.post_form(url, &submitted).await?;
        let location = response.location.ok_or(EngineError::MissingLocation)?;
        let poll_url = resolve_location(url, &location)?;
        info!(url, poll_url = %poll_url, "live search session created");

        self.poll(&poll_url).await
    }
}

// Read-through, write-back cache in front of another engine
pub struct CachedEngine<E, S> {
    inner: E,
    store: S,
}

impl<E: RequestEngine, S: CacheStore> CachedEngine<E, S> {
    pub fn new(inner: E, store: S) -> Self {
        Self { inner, store }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn remember(&self, key: &str, data: &Bytes) -> Result<(), EngineError> {
        // A failed write aborts the call
        self.store.set(key, data).map_err(|e| {
            warn!(key, error = %e, "cache write failed");
            EngineError::from(e)
        })
    }
}

#[async_trait]
impl<E: RequestEngine, S: CacheStore> RequestEngine for CachedEngine<E, S> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        if let Some(data) = self.store.get(url) {
            return Ok(Bytes::from(data));
        }
        let data = self.inner.get(url).await?;
        self.remember(url, &data)?;
        Ok(data)
    }

    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError> {
        let key = form_cache_key(url, form)?;
        if let Some(data) = self.store.get(&key) {
            return Ok(Bytes::from(data));
        }
        let data = self.inner.post_and_poll(url, form).await?;
        self.remember(&key, &data)?;
        Ok(data)
    }
}

// Sleeps a uniformly random time up to max_delay before every call
pub struct SlowEngine<E> {
    inner: E,
    max_delay: Duration,
}

impl<E: RequestEngine> SlowEngine<E> {
    pub fn new(inner: E, max_delay: Duration) -> Self {
        Self { inner, max_delay }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn delay(&self) -> Duration {
        let max_ms = self.max_delay.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[async_trait]
impl<E: RequestEngine> RequestEngine for SlowEngine<E> {
    async fn get(&self, url: &str) -> Result<Bytes, EngineError> {
        let delay = self.delay();
        debug!(url, delay_ms = delay.as_millis() as u64, "throttling get");
        tokio::time::sleep(delay).await;
        self.inner.get(url).await
    }

    async fn post_and_poll(&self, url: &str, form: &Form) -> Result<Bytes, EngineError> {
        let delay = self.delay();
        debug!(url, delay_ms = delay.as_millis() as u64, "throttling post");
        tokio::time::sleep(delay).await;
        self.inner.post_and_poll(url, form).await
    }
}

// Default stack: Slow(Cached(Live)), or Cached(Live) when the delay is zero.
// With no_cache the store only records replies and never serves them.
pub fn create_engine(
    config: &ClientConfig,
    no_cache: bool,
) -> Result<Box<dyn RequestEngine>, EngineError> {
    Ok(create_memory_engine(
        HttpTransport::new(config)?,
        config,
        no_cache,
    ))
}

// Default stack over any transport, cached in memory within config.cache
pub fn create_memory_engine<T: Transport>(
    transport: T,
    config: &ClientConfig,
    no_cache: bool,
) -> Box<dyn RequestEngine> {
    let store = MemoryStore::new(config.cache.clone());
    create_engine_with(transport, config, store, no_cache)
}

pub fn create_engine_with<T: Transport, S: CacheStore>(
    transport: T,
    config: &ClientConfig,
    store: S,
    no_cache: bool,
) -> Box<dyn RequestEngine> {
    let live = LiveEngine::with_transport(transport, config);
    let store: Box<dyn CacheStore> = if no_cache {
        Box::new(WriteOnlyStore::new(store))
    } else {
        Box::new(store)
    };
    let cached = CachedEngine::new(live, store);

    if config.slow_max_delay.is_zero() {
        Box::new(cached)
    } else {
        Box::new(SlowEngine::new(cached, config.slow_max_delay))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, MemoryStore};
    use mock_transport::MockTransport;
    use test_case::test_case;

    const BROWSE_URL: &str = "http://test.local/browse/UK/GBP/en-GB/LOND/anywhere/20170218/20170227";
    const PRICING_URL: &str = "http://test.local/apiservices/pricing/v1.0";
    const POLL_URL: &str = "http://test.local/apiservices/pricing/v1.0/session-1";
    const PENDING: &str = r#"{"Status": "UpdatesPending", "Itineraries": []}"#;
    const COMPLETE: &str = r#"{"SessionKey": "session-1", "Status": "UpdatesComplete"}"#;

    fn config() -> ClientConfig {
        ClientConfig {
            poll_interval: Duration::from_millis(1),
            slow_max_delay: Duration::ZERO,
            ..ClientConfig::new("KEY")
        }
    }

    fn form() -> Form {
        let mut form = Form::new();
        form.insert("originplace".to_string(), "LGW".to_string());
        form.insert("destinationplace".to_string(), "VIE".to_string());
        form
    }

    fn live(transport: MockTransport) -> LiveEngine<MockTransport> {
        LiveEngine::with_transport(transport, &config())
    }

    #[test]
    fn test_api_key_is_appended() {
        assert_eq!(
            with_api_key("http://test.local/browse", "KEY").unwrap(),
            "http://test.local/browse?apiKey=KEY"
        );
        assert_eq!(
            with_api_key("http://test.local/browse?x=1", "KEY").unwrap(),
            "http://test.local/browse?x=1&apiKey=KEY"
        );
        assert!(matches!(
            with_api_key("not a url", "KEY"),
            Err(EngineError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_form_cache_key_is_url_and_encoded_form() {
        assert_eq!(
            form_cache_key(PRICING_URL, &form()).unwrap(),
            "http://test.local/apiservices/pricing/v1.0?destinationplace=VIE&originplace=LGW"
        );
    }

    #[tokio::test]
    async fn test_cached_get_fetches_once() {
        let store = Arc::new(MemoryStore::default());
        let engine = CachedEngine::new(
            live(MockTransport::new().with_repeat("payload")),
            Arc::clone(&store),
        );

        let first = engine.get(BROWSE_URL).await.unwrap();
        assert_eq!(engine.inner().transport().get_count(), 1);
        assert_eq!(store.stats().write_count, 1);

        let second = engine.get(BROWSE_URL).await.unwrap();
        assert_eq!(engine.inner().transport().get_count(), 1);
        assert_eq!(store.stats().write_count, 1);
        assert_eq!(first, second);
        assert_eq!(
            engine.inner().transport().requested(),
            vec![format!("{}?apiKey=KEY", BROWSE_URL)]
        );
    }

    #[tokio::test]
    async fn test_poll_until_complete() {
        let engine = live(
            MockTransport::new()
                .with_location(POLL_URL)
                .with_script(&["", PENDING, PENDING, COMPLETE]),
        );

        let payload = engine.post_and_poll(PRICING_URL, &form()).await.unwrap();

        assert_eq!(payload, Bytes::from(COMPLETE));
        let transport = engine.transport();
        assert_eq!(transport.post_count(), 1);
        assert_eq!(transport.get_count(), 4);
        assert!(transport
            .requested()
            .iter()
            .all(|url| url == &format!("{}?apiKey=KEY", POLL_URL)));
        assert_eq!(transport.posted()[0][API_KEY_PARAM], "KEY");
        assert_eq!(transport.posted()[0]["originplace"], "LGW");
    }

    #[tokio::test]
    async fn test_relative_location_is_resolved() {
        let engine = live(
            MockTransport::new()
                .with_location("/apiservices/pricing/v1.0/session-1")
                .with_script(&[COMPLETE]),
        );

        engine.post_and_poll(PRICING_URL, &form()).await.unwrap();
        assert_eq!(
            engine.transport().requested(),
            vec![format!("{}?apiKey=KEY", POLL_URL)]
        );
    }

    #[tokio::test]
    async fn test_missing_location_fails() {
        let engine = live(MockTransport::new().with_repeat(COMPLETE));

        let result = engine.post_and_poll(PRICING_URL, &form()).await;
        assert!(matches!(result, Err(EngineError::MissingLocation)));
        assert_eq!(engine.transport().get_count(), 0);
    }

    #[tokio::test]
    async fn test_poll_deadline() {
        let config = ClientConfig {
            poll_interval: Duration::from_millis(5),
            poll_timeout: Some(Duration::from_millis(30)),
            ..config()
        };
        let engine = LiveEngine::with_transport(
            MockTransport::new().with_location(POLL_URL).with_repeat(PENDING),
            &config,
        );

        let result = engine.post_and_poll(PRICING_URL, &form()).await;
        assert!(matches!(result, Err(EngineError::PollTimeout(30))));
        assert!(engine.transport().get_count() >= 1);
    }

    #[tokio::test]
    async fn test_poll_decode_error_is_fatal() {
        let engine = live(
            MockTransport::new()
                .with_location(POLL_URL)
                .with_script(&["{broken", COMPLETE]),
        );

        let result = engine.post_and_poll(PRICING_URL, &form()).await;
        assert!(matches!(result, Err(EngineError::Decode(ParseError::Json(_)))));
        assert_eq!(engine.transport().get_count(), 1);
    }

    #[tokio::test]
    async fn test_cached_post_and_poll_keyed_by_form() {
        let store = Arc::new(MemoryStore::default());
        let engine = CachedEngine::new(
            live(
                MockTransport::new()
                    .with_location(POLL_URL)
                    .with_repeat(COMPLETE),
            ),
            Arc::clone(&store),
        );

        engine.post_and_poll(PRICING_URL, &form()).await.unwrap();
        engine.post_and_poll(PRICING_URL, &form()).await.unwrap();
        assert_eq!(engine.inner().transport().post_count(), 1);
        assert!(store.contains(&form_cache_key(PRICING_URL, &form()).unwrap()));

        let mut other = form();
        other.insert("destinationplace".to_string(), "FRA".to_string());
        engine.post_and_poll(PRICING_URL, &other).await.unwrap();
        assert_eq!(engine.inner().transport().post_count(), 2);
    }

    #[tokio::test]
    async fn test_write_only_store_forces_fetch() {
        let store = Arc::new(MemoryStore::default());
        let engine = CachedEngine::new(
            live(MockTransport::new().with_repeat("payload")),
            WriteOnlyStore::new(Arc::clone(&store)),
        );

        engine.get(BROWSE_URL).await.unwrap();
        engine.get(BROWSE_URL).await.unwrap();

        assert_eq!(engine.inner().transport().get_count(), 2);
        assert!(store.contains(BROWSE_URL));
    }

    #[tokio::test]
    async fn test_cache_write_failure_is_fatal() {
        let store = MemoryStore::new(CacheConfig { max_size_mb: 0 });
        let engine = CachedEngine::new(live(MockTransport::new().with_repeat("payload")), store);

        let result = engine.get(BROWSE_URL).await;
        assert!(matches!(
            result,
            Err(EngineError::Cache(CacheError::CapacityExceeded { .. }))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_cached() {
        let store = Arc::new(MemoryStore::default());
        let engine = CachedEngine::new(
            live(MockTransport::new().with_repeat("payload")),
            Arc::clone(&store),
        );
        engine.inner().transport().set_failing(true);

        let result = engine.get(BROWSE_URL).await;
        assert!(matches!(
            result,
            Err(EngineError::HttpStatus { status_code: 500, .. })
        ));
        assert!(store.is_empty());

        engine.inner().transport().set_failing(false);
        assert!(engine.get(BROWSE_URL).await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_engine_delegates_within_bound() {
        let max_delay = Duration::from_millis(20);
        let engine = SlowEngine::new(live(MockTransport::new().with_repeat("payload")), max_delay);

        for _ in 0..50 {
            assert!(engine.delay() <= max_delay);
        }
        assert_eq!(engine.get(BROWSE_URL).await.unwrap(), Bytes::from("payload"));
        assert_eq!(engine.inner().transport().get_count(), 1);

        let immediate = SlowEngine::new(live(MockTransport::new()), Duration::ZERO);
        assert_eq!(immediate.delay(), Duration::ZERO);
    }

    #[test]
    fn test_engine_from_blocking_code() {
        let engine = CachedEngine::new(
            live(MockTransport::new().with_repeat("payload")),
            MemoryStore::default(),
        );

        let first = tokio_test::block_on(engine.get(BROWSE_URL)).unwrap();
        let second = tokio_test::block_on(engine.get(BROWSE_URL)).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.inner().transport().get_count(), 1);
    }

    #[tokio::test]
    async fn test_default_stack_without_cache_reads() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(MockTransport::new().with_repeat("payload"));
        let engine = create_engine_with(Arc::clone(&transport), &config(), Arc::clone(&store), true);

        engine.get(BROWSE_URL).await.unwrap();
        engine.get(BROWSE_URL).await.unwrap();

        assert_eq!(transport.get_count(), 2);
        assert_eq!(store.stats().write_count, 2);
    }

    #[test_case(256, true; "#1 default capacity")]
    #[test_case(0, false; "#2 no capacity")]
    #[tokio::test]
    async fn test_memory_stack_sized_by_config(max_size_mb: usize, cached: bool) {
        let config = ClientConfig {
            cache: CacheConfig { max_size_mb },
            ..config()
        };
        let transport = Arc::new(MockTransport::new().with_repeat("payload"));
        let engine = create_memory_engine(Arc::clone(&transport), &config, false);

        let result = engine.get(BROWSE_URL).await;
        if cached {
            assert_eq!(result.unwrap(), Bytes::from("payload"));
            engine.get(BROWSE_URL).await.unwrap();
            assert_eq!(transport.get_count(), 1);
        } else {
            assert!(matches!(
                result,
                Err(EngineError::Cache(CacheError::CapacityExceeded { .. }))
            ));
        }
    }

    #[tokio::test]
    async fn test_default_stack_serves_from_cache() {
        let store = Arc::new(MemoryStore::default());
        let transport = Arc::new(MockTransport::new().with_repeat("payload"));
        let engine = create_engine_with(Arc::clone(&transport), &config(), Arc::clone(&store), false);

        engine.get(BROWSE_URL).await.unwrap();
        engine.get(BROWSE_URL).await.unwrap();

        assert_eq!(transport.get_count(), 1);
        assert_eq!(store.stats().hit_count, 1);
    }
}
