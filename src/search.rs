// Search orchestration
// Browse discovery (anywhere -> countries -> towns) and live pricing, both fanned out with one task
// per destination and a single result channel. The first failed task fails the whole batch.

use crate::config::ClientConfig;
use crate::dto::{BrowseRoutesReply, PlaceDto};
use crate::engine::{EngineError, RequestEngine};
use crate::model::FlightGraph;
use crate::parser::{parse_browse_reply, parse_live_reply, ParseError};
use crate::quotes::FullQuotes;
use crate::request::{BrowseRoutesRequest, LiveRequest, RequestError, SearchRequest};
use crate::resolver::{resolve_live_reply, ResolveError};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Decode error: {0}")]
    Decode(#[from] ParseError),

    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    #[error("Search task failed: {0}")]
    TaskFailed(String),
}

// Result of the two browse rounds, each sorted cheapest first
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Discovery {
    pub countries: FullQuotes,
    pub towns: FullQuotes,
}

pub struct FlightSearch<E> {
    engine: Arc<E>,
    config: ClientConfig,
}

impl<E: RequestEngine> FlightSearch<E> {
    pub fn new(engine: E, config: ClientConfig) -> Self {
        Self::with_shared_engine(Arc::new(engine), config)
    }

    pub fn with_shared_engine(engine: Arc<E>, config: ClientConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub async fn browse(
        &self,
        request: &BrowseRoutesRequest,
    ) -> Result<BrowseRoutesReply, SearchError> {
        browse_reply(&*self.engine, &self.config.browse_routes_url, request).await
    }

    // One browse query per destination, reduced to the best quote per destination place
    pub async fn look_for_destinations(
        &self,
        request: &BrowseRoutesRequest,
        destinations: &[PlaceDto],
    ) -> Result<FullQuotes, SearchError> {
        let requests: Vec<BrowseRoutesRequest> = destinations
            .iter()
            .map(|place| {
                debug!(destination = %place.skyscanner_code, name = %place.name, "searching");
                request.with_destination(&place.skyscanner_code)
            })
            .collect();

        let base_url = Arc::new(self.config.browse_routes_url.clone());
        let replies = fan_out(
            &self.engine,
            self.config.max_concurrency,
            requests,
            move |engine, request| {
                let base_url = Arc::clone(&base_url);
                async move {
                    let reply = browse_reply(&*engine, &base_url, &request).await?;
                    Ok::<_, SearchError>(reply.best_quotes())
                }
            },
        )
        .await?;

        Ok(replies.into_iter().flatten().collect())
    }

    // anywhere -> countries, then the towns quoted for those countries
    pub async fn discover(&self, request: &BrowseRoutesRequest) -> Result<Discovery, SearchError> {
        let anywhere = self.browse(request).await?;
        let countries = anywhere.countries();
        info!(origin = %request.origin, countries = countries.len(), "browsing countries");

        let mut country_quotes = self.look_for_destinations(request, &countries).await?;
        country_quotes.sort_by_price();

        let towns = country_quotes.towns();
        info!(origin = %request.origin, towns = towns.len(), "browsing towns");

        let mut town_quotes = self.look_for_destinations(request, &towns).await?;
        town_quotes.sort_by_price();

        Ok(Discovery {
            countries: country_quotes,
            towns: town_quotes,
        })
    }

    pub async fn live(&self, request: &LiveRequest) -> Result<FlightGraph, SearchError> {
        live_graph(&*self.engine, &self.config.pricing_url, request).await
    }

    // One live search per destination; pairs come back in completion order
    pub async fn live_many(
        &self,
        search: &SearchRequest,
    ) -> Result<Vec<(String, FlightGraph)>, SearchError> {
        let pricing_url = Arc::new(self.config.pricing_url.clone());
        fan_out(
            &self.engine,
            self.config.max_concurrency,
            search.live_requests(),
            move |engine, request| {
                let pricing_url = Arc::clone(&pricing_url);
                async move {
                    let graph = live_graph(&*engine, &pricing_url, &request).await?;
                    Ok::<_, SearchError>((request.destination, graph))
                }
            },
        )
        .await
    }
}

async fn browse_reply<E: RequestEngine + ?Sized>(
    engine: &E,
    base_url: &str,
    request: &BrowseRoutesRequest,
) -> Result<BrowseRoutesReply, SearchError> {
    let payload = engine.get(&request.url(base_url)).await?;
    Ok(parse_browse_reply(&payload)?)
}

async fn live_graph<E: RequestEngine + ?Sized>(
    engine: &E,
    pricing_url: &str,
    request: &LiveRequest,
) -> Result<FlightGraph, SearchError> {
    let form = request.form()?;
    let payload = engine.post_and_poll(pricing_url, &form).await?;
    let reply = parse_live_reply(&payload)?;
    let graph = resolve_live_reply(&reply)?;
    debug!(destination = %request.destination, itineraries = graph.stats().itineraries, "live search resolved");
    Ok(graph)
}

// Spawns one task per item and drains exactly items.len() results, in completion order.
// On the first error the remaining tasks keep running; their results are never read.
async fn fan_out<E, I, T, F, Fut>(
    engine: &Arc<E>,
    max_concurrency: Option<usize>,
    items: Vec<I>,
    task: F,
) -> Result<Vec<T>, SearchError>
where
    E: RequestEngine,
    F: Fn(Arc<E>, I) -> Fut,
    Fut: Future<Output = Result<T, SearchError>> + Send + 'static,
    T: Send + 'static,
{
    let expected = items.len();
    if expected == 0 {
        return Ok(Vec::new());
    }

    let (sender, mut receiver) = mpsc::channel(expected);
    let limiter = max_concurrency.map(|limit| Arc::new(Semaphore::new(limit.max(1))));

    for item in items {
        let sender = sender.clone();
        let limiter = limiter.clone();
        let work = task(Arc::clone(engine), item);
        tokio::spawn(async move {
            let _permit = match limiter {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            // Capacity equals the batch size, so this never waits; a closed channel is ignored
            let _ = sender.send(work.await).await;
        });
    }
    drop(sender);

    let mut results = Vec::with_capacity(expected);
    for _ in 0..expected {
        match receiver.recv().await {
            Some(Ok(result)) => results.push(result),
            Some(Err(error)) => {
                warn!(error = %error, completed = results.len(), expected, "fan-out aborted");
                return Err(error);
            }
            None => {
                return Err(SearchError::TaskFailed(format!(
                    "{} of {} tasks ended without a result",
                    expected - results.len(),
                    expected
                )))
            }
        }
    }
    debug!(expected, "fan-out complete");
    Ok(results)
}
