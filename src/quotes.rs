// Browse routes reply queries and the quote collections built from them
use crate::dto::{BrowseRoutesReply, PlaceDto, QuoteDto};
use crate::request::BrowseRoutesRequest;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const COUNTRY: &str = "Country";

impl QuoteDto {
    // Both directions priced
    pub fn is_return(&self) -> bool {
        self.outbound_leg.destination_id != 0 && self.inbound_leg.destination_id != 0
    }
}

impl PlaceDto {
    pub fn is_country(&self) -> bool {
        self.place_type == COUNTRY
    }
}

// A quote together with a copy of its destination place
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FullQuote {
    pub quote: QuoteDto,
    pub destination: PlaceDto,
}

impl FullQuote {
    pub fn price(&self) -> f64 {
        self.quote.min_price
    }

    pub fn link(&self, request: &BrowseRoutesRequest) -> String {
        request.link_to(&self.destination.skyscanner_code)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FullQuotes(Vec<FullQuote>);

impl FullQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FullQuote> {
        self.0.iter()
    }

    pub fn push(&mut self, quote: FullQuote) {
        self.0.push(quote);
    }

    pub fn as_slice(&self) -> &[FullQuote] {
        &self.0
    }

    pub fn into_inner(self) -> Vec<FullQuote> {
        self.0
    }

    pub fn prices(&self) -> Vec<f64> {
        self.0.iter().map(FullQuote::price).collect()
    }

    // Distinct destinations, one per code, ordered by code
    pub fn towns(&self) -> Vec<PlaceDto> {
        let towns: BTreeMap<&str, &PlaceDto> = self
            .0
            .iter()
            .map(|quote| {
                (
                    quote.destination.skyscanner_code.as_str(),
                    &quote.destination,
                )
            })
            .collect();
        towns.into_values().cloned().collect()
    }

    pub fn directs(&self) -> FullQuotes {
        self.0
            .iter()
            .filter(|quote| quote.quote.direct)
            .cloned()
            .collect()
    }

    // Cheapest first; stable for equal prices
    pub fn sort_by_price(&mut self) {
        self.0
            .sort_by(|a, b| a.quote.min_price.total_cmp(&b.quote.min_price));
    }

    // Most expensive first, the display order of result listings
    pub fn sort_by_price_desc(&mut self) {
        self.sort_by_price();
        self.0.reverse();
    }
}

impl From<Vec<FullQuote>> for FullQuotes {
    fn from(quotes: Vec<FullQuote>) -> Self {
        Self(quotes)
    }
}

impl FromIterator<FullQuote> for FullQuotes {
    fn from_iter<I: IntoIterator<Item = FullQuote>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<FullQuote> for FullQuotes {
    fn extend<I: IntoIterator<Item = FullQuote>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl IntoIterator for FullQuotes {
    type Item = FullQuote;
    type IntoIter = std::vec::IntoIter<FullQuote>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FullQuotes {
    type Item = &'a FullQuote;
    type IntoIter = std::slice::Iter<'a, FullQuote>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseStats {
    pub currencies: usize,
    pub quotes: usize,
    pub routes: usize,
    pub places: usize,
    pub carriers: usize,
}

impl BrowseRoutesReply {
    pub fn countries(&self) -> Vec<PlaceDto> {
        self.places
            .iter()
            .filter(|place| place.is_country())
            .cloned()
            .collect()
    }

    pub fn places_by_id(&self) -> HashMap<i64, &PlaceDto> {
        self.places
            .iter()
            .map(|place| (place.place_id, place))
            .collect()
    }

    // Return quotes whose destination is a known place
    pub fn full_quotes(&self) -> FullQuotes {
        let places = self.places_by_id();
        self.quotes
            .iter()
            .filter(|quote| quote.is_return())
            .filter_map(|quote| full_quote(&places, quote))
            .collect()
    }

    // Cheapest return quote per outbound destination
    pub fn best_quotes(&self) -> FullQuotes {
        let mut best: BTreeMap<i64, &QuoteDto> = BTreeMap::new();
        for quote in self.quotes.iter().filter(|quote| quote.is_return()) {
            let destination = quote.outbound_leg.destination_id;
            let cheaper = best
                .get(&destination)
                .map_or(true, |current| quote.min_price < current.min_price);
            if cheaper {
                best.insert(destination, quote);
            }
        }

        let places = self.places_by_id();
        best.into_values()
            .filter_map(|quote| full_quote(&places, quote))
            .collect()
    }

    // +inf when there is no return quote
    pub fn best_price(&self) -> f64 {
        self.quotes
            .iter()
            .filter(|quote| quote.is_return())
            .map(|quote| quote.min_price)
            .fold(f64::INFINITY, f64::min)
    }

    // Destination code to price; a later quote for the same code replaces an earlier one
    pub fn price_by_destination(&self) -> HashMap<String, f64> {
        let places = self.places_by_id();
        self.quotes
            .iter()
            .filter(|quote| quote.is_return())
            .filter_map(|quote| {
                places
                    .get(&quote.outbound_leg.destination_id)
                    .map(|place| (place.skyscanner_code.clone(), quote.min_price))
            })
            .collect()
    }

    // Destination codes of the routes carrying an integer price, cheapest first
    pub fn destinations_by_route_price(&self) -> Vec<String> {
        let mut priced: Vec<(i64, i64)> = self
            .routes
            .iter()
            .filter_map(|route| {
                route
                    .price
                    .as_deref()
                    .and_then(|price| price.parse::<i64>().ok())
                    .map(|price| (price, route.destination_id))
            })
            .collect();
        priced.sort_by_key(|(price, _)| *price);

        let places = self.places_by_id();
        priced
            .into_iter()
            .filter_map(|(_, destination)| places.get(&destination))
            .map(|place| place.skyscanner_code.clone())
            .collect()
    }

    pub fn stats(&self) -> BrowseStats {
        BrowseStats {
            currencies: self.currencies.len(),
            quotes: self.quotes.len(),
            routes: self.routes.len(),
            places: self.places.len(),
            carriers: self.carriers.len(),
        }
    }
}

fn full_quote(places: &HashMap<i64, &PlaceDto>, quote: &QuoteDto) -> Option<FullQuote> {
    let destination = quote.outbound_leg.destination_id;
    match places.get(&destination) {
        Some(place) => Some(FullQuote {
            quote: quote.clone(),
            destination: (*place).clone(),
        }),
        None => {
            debug!(quote_id = quote.quote_id, destination, "quote destination not in reply");
            None
        }
    }
}
