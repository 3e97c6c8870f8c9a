// Itinerary filters; a composite filter is the AND of its members
use crate::model::{ItineraryView, Leg};

pub trait ItineraryFilter: Send + Sync {
    fn matches(&self, itinerary: &ItineraryView<'_>) -> bool;
}

// Keeps itineraries whose outbound and inbound legs are both direct (or, with `direct: false`,
// the ones that are not)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectFilter {
    pub direct: bool,
}

impl ItineraryFilter for DirectFilter {
    fn matches(&self, itinerary: &ItineraryView<'_>) -> bool {
        let outbound_direct = itinerary.outbound().map_or(false, Leg::is_direct);
        let inbound_direct = itinerary.inbound().map_or(false, Leg::is_direct);
        (outbound_direct && inbound_direct) == self.direct
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSelector {
    Outbound,
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBound {
    Before,
    After,
}

// Departure time of day against a limit, both bounds inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepartureTimeFilter {
    pub leg: LegSelector,
    pub bound: TimeBound,
    pub minute_of_day: u32,
}

impl DepartureTimeFilter {
    pub fn new(leg: LegSelector, bound: TimeBound, hour: u32, minute: u32) -> Self {
        Self {
            leg,
            bound,
            minute_of_day: hour * 60 + minute,
        }
    }
}

impl ItineraryFilter for DepartureTimeFilter {
    fn matches(&self, itinerary: &ItineraryView<'_>) -> bool {
        let leg = match self.leg {
            LegSelector::Outbound => itinerary.outbound(),
            LegSelector::Inbound => itinerary.inbound(),
        };
        let Some(leg) = leg else {
            return false;
        };

        let diff = i64::from(leg.departure_minute_of_day()) - i64::from(self.minute_of_day);
        match self.bound {
            TimeBound::Before => diff <= 0,
            TimeBound::After => diff >= 0,
        }
    }
}

#[derive(Default)]
pub struct CompositeFilter {
    filters: Vec<Box<dyn ItineraryFilter>>,
}

impl CompositeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, filter: impl ItineraryFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn direct_only(self) -> Self {
        self.with(DirectFilter { direct: true })
    }

    // No limit, no filter
    pub fn departure_time(self, leg: LegSelector, bound: TimeBound, limit: Option<(u32, u32)>) -> Self {
        match limit {
            Some((hour, minute)) => self.with(DepartureTimeFilter::new(leg, bound, hour, minute)),
            None => self,
        }
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl ItineraryFilter for CompositeFilter {
    fn matches(&self, itinerary: &ItineraryView<'_>) -> bool {
        self.filters.iter().all(|filter| filter.matches(itinerary))
    }
}

pub fn apply_filter<'g, I>(itineraries: I, filter: &dyn ItineraryFilter) -> Vec<ItineraryView<'g>>
where
    I: IntoIterator<Item = ItineraryView<'g>>,
{
    itineraries
        .into_iter()
        .filter(|itinerary| filter.matches(itinerary))
        .collect()
}
