// Resolved live reply: entities live in id-keyed maps and refer to each other by id
use crate::dto::CurrencyDto;
use chrono::{Duration, NaiveDateTime, Timelike};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

numeric_id!(PlaceId);
numeric_id!(CarrierId);
numeric_id!(SegmentId);
numeric_id!(AgentId);

// Composite id, e.g. "13542-1611010820-EZ-0-17517-1611011135"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LegId(pub String);

impl fmt::Display for LegId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LegId {
    fn from(value: &str) -> Self {
        LegId(value.to_string())
    }
}

// Declaration order is the taxonomic order: broader places first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PlaceType {
    Country,
    City,
    Airport,
    Station,
}

impl FromStr for PlaceType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Country" => Ok(PlaceType::Country),
            "City" => Ok(PlaceType::City),
            "Airport" => Ok(PlaceType::Airport),
            "Station" => Ok(PlaceType::Station),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Place {
    pub id: PlaceId,
    pub name: String,
    pub code: String,
    pub place_type: PlaceType,
    pub parent: Option<PlaceId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Carrier {
    pub id: CarrierId,
    pub code: String,
    pub name: String,
    pub display_code: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub id: SegmentId,
    pub origin: PlaceId,
    pub destination: PlaceId,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub carrier: Option<CarrierId>,
    pub operating_carrier: Option<CarrierId>,
    pub duration: Duration,
    pub flight_number: String,
    pub journey_mode: String,
    pub directionality: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlightNumber {
    pub number: String,
    pub carrier: CarrierId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Leg {
    pub id: LegId,
    pub segments: Vec<SegmentId>,
    pub origin: PlaceId,
    pub destination: PlaceId,
    pub departure: NaiveDateTime,
    pub arrival: NaiveDateTime,
    pub duration: Duration,
    pub journey_mode: String,
    pub stops: Vec<PlaceId>,
    pub carriers: Vec<CarrierId>,
    pub operating_carriers: Vec<CarrierId>,
    pub directionality: String,
    pub flight_numbers: Vec<FlightNumber>,
}

impl Leg {
    pub fn is_direct(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn departure_minute_of_day(&self) -> u32 {
        self.departure.hour() * 60 + self.departure.minute()
    }

    // LGW=>VIE LGW-FRA FRA-VIE 2016-11-01 06:00 2016-11-01 11:15
    pub fn describe(&self, graph: &FlightGraph) -> String {
        let segments = self
            .segments
            .iter()
            .filter_map(|id| graph.segment(*id))
            .map(|segment| {
                format!(
                    "{}-{}",
                    graph.place_code(segment.origin),
                    graph.place_code(segment.destination)
                )
            })
            .collect::<Vec<_>>()
            .join(" ");

        format!(
            "{}=>{} {} {} {}",
            graph.place_code(self.origin),
            graph.place_code(self.destination),
            segments,
            self.departure.format("%Y-%m-%d %H:%M"),
            self.arrival.format("%Y-%m-%d %H:%M")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub image_url: String,
    pub status: String,
    pub optimised_for_mobile: bool,
    pub booking_number: String,
    pub agent_type: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingOption {
    pub agents: Vec<AgentId>,
    pub quote_age: Duration,
    pub price: f64,
    pub deeplink_url: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookingDetails {
    pub uri: String,
    pub body: String,
    pub method: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Itinerary {
    pub outbound: LegId,
    pub inbound: LegId,
    pub pricing_options: Vec<PricingOption>,
    pub booking_details: BookingDetails,
}

impl Itinerary {
    // Cheapest pricing option; +inf without options so unpriced itineraries sort last
    pub fn price(&self) -> f64 {
        self.pricing_options
            .iter()
            .map(|option| option.price)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn cheapest_option(&self) -> Option<&PricingOption> {
        self.pricing_options
            .iter()
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub places: usize,
    pub carriers: usize,
    pub segments: usize,
    pub legs: usize,
    pub agents: usize,
    pub itineraries: usize,
}

// Built once per reply by the resolver, read only afterwards
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlightGraph {
    pub(crate) session_key: String,
    pub(crate) places: HashMap<PlaceId, Place>,
    pub(crate) carriers: HashMap<CarrierId, Carrier>,
    pub(crate) segments: HashMap<SegmentId, Segment>,
    pub(crate) legs: HashMap<LegId, Leg>,
    pub(crate) agents: HashMap<AgentId, Agent>,
    pub(crate) itineraries: Vec<Itinerary>,
    pub(crate) currencies: Vec<CurrencyDto>,
}

impl FlightGraph {
    pub fn session_key(&self) -> &str {
        &self.session_key
    }

    pub fn currencies(&self) -> &[CurrencyDto] {
        &self.currencies
    }

    pub fn place(&self, id: PlaceId) -> Option<&Place> {
        self.places.get(&id)
    }

    pub fn place_by_code(&self, code: &str) -> Option<&Place> {
        self.places.values().find(|place| place.code == code)
    }

    pub fn carrier(&self, id: CarrierId) -> Option<&Carrier> {
        self.carriers.get(&id)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    pub fn leg(&self, id: &LegId) -> Option<&Leg> {
        self.legs.get(id)
    }

    pub fn agent(&self, id: AgentId) -> Option<&Agent> {
        self.agents.get(&id)
    }

    pub fn places(&self) -> impl Iterator<Item = &Place> {
        self.places.values()
    }

    pub fn legs(&self) -> impl Iterator<Item = &Leg> {
        self.legs.values()
    }

    fn place_code(&self, id: PlaceId) -> &str {
        self.place(id).map(|place| place.code.as_str()).unwrap_or("?")
    }

    // Parents of a place, nearest first, ending at a root
    pub fn ancestors(&self, id: PlaceId) -> Vec<&Place> {
        let mut chain = Vec::new();
        let mut current = self.place(id).and_then(|place| place.parent);
        while let Some(parent_id) = current {
            // bounded by the map size in case the input was cyclic
            if chain.len() >= self.places.len() {
                break;
            }
            match self.place(parent_id) {
                Some(parent) => {
                    chain.push(parent);
                    current = parent.parent;
                }
                None => break,
            }
        }
        chain
    }

    pub fn itineraries(&self) -> impl Iterator<Item = ItineraryView<'_>> {
        self.itineraries.iter().map(move |itinerary| ItineraryView {
            graph: self,
            itinerary,
        })
    }

    // Ascending by price, unpriced itineraries last
    pub fn itineraries_by_price(&self) -> Vec<ItineraryView<'_>> {
        let mut views: Vec<_> = self.itineraries().collect();
        views.sort_by(|a, b| a.price().total_cmp(&b.price()));
        views
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            places: self.places.len(),
            carriers: self.carriers.len(),
            segments: self.segments.len(),
            legs: self.legs.len(),
            agents: self.agents.len(),
            itineraries: self.itineraries.len(),
        }
    }
}

// An itinerary together with the graph its ids point into
#[derive(Debug, Clone, Copy)]
pub struct ItineraryView<'g> {
    graph: &'g FlightGraph,
    itinerary: &'g Itinerary,
}

impl<'g> ItineraryView<'g> {
    pub fn new(graph: &'g FlightGraph, itinerary: &'g Itinerary) -> Self {
        Self { graph, itinerary }
    }

    pub fn graph(&self) -> &'g FlightGraph {
        self.graph
    }

    pub fn itinerary(&self) -> &'g Itinerary {
        self.itinerary
    }

    pub fn outbound(&self) -> Option<&'g Leg> {
        self.graph.leg(&self.itinerary.outbound)
    }

    pub fn inbound(&self) -> Option<&'g Leg> {
        self.graph.leg(&self.itinerary.inbound)
    }

    pub fn price(&self) -> f64 {
        self.itinerary.price()
    }

    pub fn cheapest_option(&self) -> Option<&'g PricingOption> {
        self.itinerary.cheapest_option()
    }

    // Outbound carriers followed by inbound carriers
    pub fn carriers(&self) -> Vec<&'g Carrier> {
        self.outbound()
            .into_iter()
            .chain(self.inbound())
            .flat_map(|leg| leg.carriers.iter())
            .filter_map(|id| self.graph.carrier(*id))
            .collect()
    }

    pub fn agents(&self) -> Vec<&'g Agent> {
        self.cheapest_option()
            .map(|option| {
                option
                    .agents
                    .iter()
                    .filter_map(|id| self.graph.agent(*id))
                    .collect()
            })
            .unwrap_or_default()
    }
}
