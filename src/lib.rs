// Flight search client: browse discovery, live pricing sessions and itinerary graphs

pub mod cache;
pub mod config;
pub mod dto;
pub mod engine;
pub mod filter;
pub mod model;
pub mod parser;
pub mod quotes;
pub mod request;
pub mod resolver;
pub mod search;

// Re-export key types for convenience
pub use cache::{CacheConfig, CacheError, CacheStats, CacheStore, MemoryStore, WriteOnlyStore};
pub use config::{ClientConfig, ConfigError};
pub use dto::{BrowseRoutesReply, LiveReply, PlaceDto, QuoteDto};
pub use engine::{
    create_engine, create_engine_with, create_memory_engine, CachedEngine, EngineError,
    HttpTransport, LiveEngine, RequestEngine, SlowEngine, Transport,
};
pub use filter::{
    apply_filter, CompositeFilter, DepartureTimeFilter, DirectFilter, ItineraryFilter, LegSelector,
    TimeBound,
};
pub use model::{FlightGraph, Itinerary, ItineraryView, Leg, Place, PlaceType};
pub use parser::{parse_browse_reply, parse_live_reply, ParseError, ReplyFormat};
pub use quotes::{FullQuote, FullQuotes};
pub use request::{BrowseRoutesRequest, Localisation, LiveRequest, SearchRequest};
pub use resolver::{resolve_live_reply, ResolveError};
pub use search::{Discovery, FlightSearch, SearchError};
