// Turns the flat, id-referenced live reply into a FlightGraph.
// Entity maps are built in dependency order: places, carriers, segments, legs, agents, itineraries.
// An id of 0 means "not supplied"; it is tolerated only where the reference is optional.

use crate::dto::{
    AgentApiDto, CarrierApiDto, ItineraryApiDto, ItineraryLegApiDto, LiveReply, PlaceApiDto,
    SegmentApiDto,
};
use crate::model::{
    Agent, AgentId, BookingDetails, Carrier, CarrierId, FlightGraph, FlightNumber, Itinerary, Leg,
    LegId, Place, PlaceId, PlaceType, PricingOption, Segment, SegmentId,
};
use chrono::{Duration, NaiveDateTime};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Duplicate place id {0}")]
    DuplicatePlace(i64),

    #[error("Duplicate carrier id {0}")]
    DuplicateCarrier(i64),

    #[error("Duplicate segment id {0}")]
    DuplicateSegment(i64),

    #[error("Duplicate leg id {0}")]
    DuplicateLeg(String),

    #[error("Duplicate agent id {0}")]
    DuplicateAgent(i64),

    #[error("Unknown place {id} referenced by {referenced_by}")]
    MissingPlace { id: i64, referenced_by: String },

    #[error("Unknown carrier {id} referenced by {referenced_by}")]
    MissingCarrier { id: i64, referenced_by: String },

    #[error("Unknown segment {id} referenced by {referenced_by}")]
    MissingSegment { id: i64, referenced_by: String },

    #[error("Unknown leg '{id}' referenced by {referenced_by}")]
    MissingLeg { id: String, referenced_by: String },

    #[error("Unknown agent {id} referenced by {referenced_by}")]
    MissingAgent { id: i64, referenced_by: String },

    #[error("Unknown place type {0}")]
    UnknownPlaceType(String),

    #[error("Invalid timestamp in {field}: {value}")]
    InvalidTimestamp { field: String, value: String },
}

pub fn resolve_live_reply(reply: &LiveReply) -> Result<FlightGraph, ResolveError> {
    let places = resolve_places(&reply.places)?;
    let carriers = resolve_carriers(&reply.carriers)?;

    let mut graph = FlightGraph {
        session_key: reply.session_key.clone(),
        places,
        carriers,
        currencies: reply.currencies.clone(),
        ..FlightGraph::default()
    };
    graph.segments = resolve_segments(&graph, &reply.segments)?;
    graph.legs = resolve_legs(&graph, &reply.legs)?;
    graph.agents = resolve_agents(&reply.agents)?;
    graph.itineraries = resolve_itineraries(&graph, &reply.itineraries)?;

    let stats = graph.stats();
    debug!(
        session_key = %graph.session_key,
        places = stats.places,
        legs = stats.legs,
        itineraries = stats.itineraries,
        "resolved live reply"
    );
    Ok(graph)
}

// Broader places first (ties by code) so a parent is always in the map before its children
pub fn resolve_places(dtos: &[PlaceApiDto]) -> Result<HashMap<PlaceId, Place>, ResolveError> {
    let mut typed = dtos
        .iter()
        .map(|dto| {
            dto.place_type
                .parse::<PlaceType>()
                .map(|place_type| (place_type, dto))
                .map_err(ResolveError::UnknownPlaceType)
        })
        .collect::<Result<Vec<_>, _>>()?;
    typed.sort_by(|(a_type, a), (b_type, b)| a_type.cmp(b_type).then_with(|| a.code.cmp(&b.code)));

    let mut places = HashMap::with_capacity(typed.len());
    for (place_type, dto) in typed {
        let id = PlaceId(dto.id);
        if places.contains_key(&id) {
            return Err(ResolveError::DuplicatePlace(dto.id));
        }

        // Unparseable, zero or not yet resolved parent ids leave the place without a parent
        let parent = dto
            .parent_id
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|parent_id| *parent_id != 0)
            .map(PlaceId)
            .filter(|parent_id| places.contains_key(parent_id));

        places.insert(
            id,
            Place {
                id,
                name: dto.name.clone(),
                code: dto.code.clone(),
                place_type,
                parent,
            },
        );
    }
    Ok(places)
}

fn resolve_carriers(
    dtos: &[CarrierApiDto],
) -> Result<HashMap<CarrierId, Carrier>, ResolveError> {
    let mut carriers = HashMap::with_capacity(dtos.len());
    for dto in dtos {
        let id = CarrierId(dto.id);
        let carrier = Carrier {
            id,
            code: dto.code.clone(),
            name: dto.name.clone(),
            display_code: dto.display_code.clone(),
            image_url: dto.image_url.clone(),
        };
        if carriers.insert(id, carrier).is_some() {
            return Err(ResolveError::DuplicateCarrier(dto.id));
        }
    }
    Ok(carriers)
}

fn resolve_segments(
    graph: &FlightGraph,
    dtos: &[SegmentApiDto],
) -> Result<HashMap<SegmentId, Segment>, ResolveError> {
    let mut segments = HashMap::with_capacity(dtos.len());
    for dto in dtos {
        let owner = format!("segment {}", dto.id);
        let segment = Segment {
            id: SegmentId(dto.id),
            origin: place_ref(graph, dto.origin_station, &owner)?,
            destination: place_ref(graph, dto.destination_station, &owner)?,
            departure: timestamp(&dto.departure_date_time, "DepartureDateTime")?,
            arrival: timestamp(&dto.arrival_date_time, "ArrivalDateTime")?,
            carrier: optional_carrier_ref(graph, dto.carrier, &owner)?,
            operating_carrier: optional_carrier_ref(graph, dto.operating_carrier, &owner)?,
            duration: Duration::minutes(dto.duration),
            flight_number: dto.flight_number.clone(),
            journey_mode: dto.journey_mode.clone(),
            directionality: dto.directionality.clone(),
        };
        if segments.insert(segment.id, segment).is_some() {
            return Err(ResolveError::DuplicateSegment(dto.id));
        }
    }
    Ok(segments)
}

fn resolve_legs(
    graph: &FlightGraph,
    dtos: &[ItineraryLegApiDto],
) -> Result<HashMap<LegId, Leg>, ResolveError> {
    let mut legs = HashMap::with_capacity(dtos.len());
    for dto in dtos {
        let id = LegId(dto.id.clone());
        if legs.contains_key(&id) {
            return Err(ResolveError::DuplicateLeg(dto.id.clone()));
        }
        let leg = resolve_leg(graph, dto)?;
        legs.insert(id, leg);
    }
    Ok(legs)
}

fn resolve_leg(graph: &FlightGraph, dto: &ItineraryLegApiDto) -> Result<Leg, ResolveError> {
    let owner = format!("leg {}", dto.id);

    let segments = dto
        .segment_ids
        .iter()
        .map(|id| {
            let id = SegmentId(*id);
            if graph.segments.contains_key(&id) {
                Ok(id)
            } else {
                Err(ResolveError::MissingSegment {
                    id: id.0,
                    referenced_by: owner.clone(),
                })
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    // A zero stop is a placeholder, not a place
    let stops = dto
        .stops
        .iter()
        .filter(|id| **id != 0)
        .map(|id| place_ref(graph, *id, &owner))
        .collect::<Result<Vec<_>, _>>()?;

    let carriers = dto
        .carriers
        .iter()
        .map(|id| carrier_ref(graph, *id, &owner))
        .collect::<Result<Vec<_>, _>>()?;

    let operating_carriers = dto
        .operating_carriers
        .iter()
        .map(|id| carrier_ref(graph, *id, &owner))
        .collect::<Result<Vec<_>, _>>()?;

    let flight_numbers = dto
        .flight_numbers
        .iter()
        .map(|flight_number| -> Result<FlightNumber, ResolveError> {
            Ok(FlightNumber {
                number: flight_number.flight_number.clone(),
                carrier: carrier_ref(graph, flight_number.carrier_id, &owner)?,
            })
        })
        .collect::<Result<Vec<_>, ResolveError>>()?;

    Ok(Leg {
        id: LegId(dto.id.clone()),
        segments,
        origin: place_ref(graph, dto.origin_station, &owner)?,
        destination: place_ref(graph, dto.destination_station, &owner)?,
        departure: timestamp(&dto.departure, "Departure")?,
        arrival: timestamp(&dto.arrival, "Arrival")?,
        duration: Duration::minutes(dto.duration),
        journey_mode: dto.journey_mode.clone(),
        stops,
        carriers,
        operating_carriers,
        directionality: dto.directionality.clone(),
        flight_numbers,
    })
}

fn resolve_agents(dtos: &[AgentApiDto]) -> Result<HashMap<AgentId, Agent>, ResolveError> {
    let mut agents = HashMap::with_capacity(dtos.len());
    for dto in dtos {
        let id = AgentId(dto.id);
        let agent = Agent {
            id,
            name: dto.name.clone(),
            image_url: dto.image_url.clone(),
            status: dto.status.clone(),
            optimised_for_mobile: dto.optimised_for_mobile,
            booking_number: dto.booking_number.clone(),
            agent_type: dto.agent_type.clone(),
        };
        if agents.insert(id, agent).is_some() {
            return Err(ResolveError::DuplicateAgent(dto.id));
        }
    }
    Ok(agents)
}

fn resolve_itineraries(
    graph: &FlightGraph,
    dtos: &[ItineraryApiDto],
) -> Result<Vec<Itinerary>, ResolveError> {
    dtos.iter()
        .enumerate()
        .map(|(index, dto)| -> Result<Itinerary, ResolveError> {
            let owner = format!("itinerary {}", index);
            let outbound = leg_ref(graph, &dto.outbound_leg_id, &owner)?;
            let inbound = leg_ref(graph, &dto.inbound_leg_id, &owner)?;

            let pricing_options = dto
                .pricing_options
                .iter()
                .map(|option| -> Result<PricingOption, ResolveError> {
                    let agents = option
                        .agents
                        .iter()
                        .map(|id| agent_ref(graph, *id, &owner))
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(PricingOption {
                        agents,
                        quote_age: Duration::minutes(option.quote_age_in_minutes),
                        price: option.price,
                        deeplink_url: option.deeplink_url.clone(),
                    })
                })
                .collect::<Result<Vec<_>, ResolveError>>()?;

            Ok(Itinerary {
                outbound,
                inbound,
                pricing_options,
                booking_details: BookingDetails {
                    uri: dto.booking_details_link.uri.clone(),
                    body: dto.booking_details_link.body.clone(),
                    method: dto.booking_details_link.method.clone(),
                },
            })
        })
        .collect()
}

fn place_ref(graph: &FlightGraph, id: i64, owner: &str) -> Result<PlaceId, ResolveError> {
    let id = PlaceId(id);
    if graph.places.contains_key(&id) {
        Ok(id)
    } else {
        Err(ResolveError::MissingPlace {
            id: id.0,
            referenced_by: owner.to_string(),
        })
    }
}

fn carrier_ref(graph: &FlightGraph, id: i64, owner: &str) -> Result<CarrierId, ResolveError> {
    let id = CarrierId(id);
    if graph.carriers.contains_key(&id) {
        Ok(id)
    } else {
        Err(ResolveError::MissingCarrier {
            id: id.0,
            referenced_by: owner.to_string(),
        })
    }
}

fn optional_carrier_ref(
    graph: &FlightGraph,
    id: i64,
    owner: &str,
) -> Result<Option<CarrierId>, ResolveError> {
    match id {
        0 => Ok(None),
        id => carrier_ref(graph, id, owner).map(Some),
    }
}

fn agent_ref(graph: &FlightGraph, id: i64, owner: &str) -> Result<AgentId, ResolveError> {
    let id = AgentId(id);
    if graph.agents.contains_key(&id) {
        Ok(id)
    } else {
        Err(ResolveError::MissingAgent {
            id: id.0,
            referenced_by: owner.to_string(),
        })
    }
}

fn leg_ref(graph: &FlightGraph, id: &str, owner: &str) -> Result<LegId, ResolveError> {
    let id = LegId(id.to_string());
    if graph.legs.contains_key(&id) {
        Ok(id)
    } else {
        Err(ResolveError::MissingLeg {
            id: id.0,
            referenced_by: owner.to_string(),
        })
    }
}

fn timestamp(value: &str, field: &str) -> Result<NaiveDateTime, ResolveError> {
    NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT).map_err(|_| {
        ResolveError::InvalidTimestamp {
            field: field.to_string(),
            value: value.to_string(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_live_reply;
    use test_case::test_case;

    const LIVE_REPLY_XML: &str = include_str!("../samples/live_reply.xml");

    fn sample_reply() -> LiveReply {
        parse_live_reply(LIVE_REPLY_XML.as_bytes()).unwrap()
    }

    fn place(id: i64, parent: Option<i64>, code: &str, place_type: &str) -> PlaceApiDto {
        PlaceApiDto {
            id,
            parent_id: parent.map(|parent| parent.to_string()),
            code: code.to_string(),
            place_type: place_type.to_string(),
            name: code.to_string(),
        }
    }

    fn codes(places: Vec<&Place>) -> Vec<&str> {
        places.into_iter().map(|place| place.code.as_str()).collect()
    }

    #[test]
    fn test_resolve_sample_reply() {
        let graph = resolve_live_reply(&sample_reply()).unwrap();

        let stats = graph.stats();
        assert_eq!(stats.places, 9);
        assert_eq!(stats.carriers, 3);
        assert_eq!(stats.segments, 4);
        assert_eq!(stats.legs, 3);
        assert_eq!(stats.agents, 2);
        assert_eq!(stats.itineraries, 2);
        assert_eq!(graph.session_key(), "7973f72c4c37493c9d4fddf626a2efc8_ecilpojl");
        assert_eq!(graph.currencies()[0].code, "GBP");

        let segment = graph.segment(SegmentId(4)).unwrap();
        assert_eq!(segment.carrier, Some(CarrierId(1324)));
        assert_eq!(segment.operating_carrier, Some(CarrierId(1755)));

        let via_frankfurt = graph
            .leg(&LegId::from("13542-1611010600-LH-1-17517-1611011115"))
            .unwrap();
        assert!(!via_frankfurt.is_direct());
        assert_eq!(via_frankfurt.stops, vec![PlaceId(11235)]);
        assert_eq!(via_frankfurt.segments, vec![SegmentId(3), SegmentId(4)]);
        assert_eq!(via_frankfurt.flight_numbers.len(), 2);
        assert_eq!(via_frankfurt.departure_minute_of_day(), 6 * 60);
        assert_eq!(
            via_frankfurt.describe(&graph),
            "LGW=>VIE LGW-FRA FRA-VIE 2016-11-01 06:00 2016-11-01 11:15"
        );

        let first = graph.itineraries().next().unwrap();
        assert!(first.outbound().unwrap().is_direct());
        assert!(first.inbound().unwrap().is_direct());
        assert_eq!(first.price(), 67.06);
        assert_eq!(first.agents()[0].name, "easyJet");
        assert_eq!(first.itinerary().booking_details.method, "PUT");
        assert_eq!(
            first
                .carriers()
                .iter()
                .map(|carrier| carrier.code.as_str())
                .collect::<Vec<_>>(),
            vec!["U2", "U2"]
        );
    }

    #[test_case(13542, vec!["LON", "GB"]; "#1 airport to city to country")]
    #[test_case(11235, vec!["FRAA", "DE"]; "#2 frankfurt")]
    #[test_case(2343, vec!["AT"]; "#3 city to country")]
    #[test_case(837, vec![]; "#4 country is a root")]
    fn test_parent_chains(place_id: i64, expected: Vec<&str>) {
        let graph = resolve_live_reply(&sample_reply()).unwrap();
        assert_eq!(codes(graph.ancestors(PlaceId(place_id))), expected);
    }

    #[test]
    fn test_places_resolve_regardless_of_input_order() {
        let dtos = vec![
            place(3, Some(2), "LGW", "Airport"),
            place(2, Some(1), "LON", "City"),
            place(1, None, "GB", "Country"),
        ];

        let places = resolve_places(&dtos).unwrap();
        assert_eq!(places[&PlaceId(3)].parent, Some(PlaceId(2)));
        assert_eq!(places[&PlaceId(2)].parent, Some(PlaceId(1)));
        assert_eq!(places[&PlaceId(1)].parent, None);
    }

    #[test_case(Some("abc".to_string()); "#1 unparseable")]
    #[test_case(Some("0".to_string()); "#2 zero")]
    #[test_case(Some("777".to_string()); "#3 unknown")]
    #[test_case(None; "#4 missing")]
    fn test_unusable_parent_means_no_parent(parent_id: Option<String>) {
        let mut dto = place(3, None, "LGW", "Airport");
        dto.parent_id = parent_id;

        let places = resolve_places(&[dto]).unwrap();
        assert_eq!(places[&PlaceId(3)].parent, None);
    }

    #[test]
    fn test_unknown_place_type_fails() {
        let result = resolve_places(&[place(1, None, "MARS", "Planet")]);
        assert_eq!(result, Err(ResolveError::UnknownPlaceType("Planet".to_string())));
    }

    #[test_case(|reply: &mut LiveReply| { let dup = reply.places[0].clone(); reply.places.push(dup); },
        ResolveError::DuplicatePlace(13542); "#1 duplicate place")]
    #[test_case(|reply: &mut LiveReply| { let dup = reply.carriers[0].clone(); reply.carriers.push(dup); },
        ResolveError::DuplicateCarrier(1050); "#2 duplicate carrier")]
    #[test_case(|reply: &mut LiveReply| { let dup = reply.segments[0].clone(); reply.segments.push(dup); },
        ResolveError::DuplicateSegment(1); "#3 duplicate segment")]
    #[test_case(|reply: &mut LiveReply| { let dup = reply.legs[0].clone(); reply.legs.push(dup); },
        ResolveError::DuplicateLeg("13542-1611010820-EZ-0-17517-1611011135".to_string()); "#4 duplicate leg")]
    #[test_case(|reply: &mut LiveReply| { let dup = reply.agents[1].clone(); reply.agents.push(dup); },
        ResolveError::DuplicateAgent(3503883); "#5 duplicate agent")]
    fn test_duplicate_ids_fail(mutate: fn(&mut LiveReply), expected: ResolveError) {
        let mut reply = sample_reply();
        mutate(&mut reply);
        assert_eq!(resolve_live_reply(&reply), Err(expected));
    }

    #[test]
    fn test_missing_segment_carrier_fails() {
        let mut reply = sample_reply();
        reply.carriers.retain(|carrier| carrier.id != 1324);

        let result = resolve_live_reply(&reply);
        assert_eq!(
            result,
            Err(ResolveError::MissingCarrier {
                id: 1324,
                referenced_by: "segment 3".to_string(),
            })
        );
    }

    #[test]
    fn test_zero_segment_carrier_is_absent() {
        let mut reply = sample_reply();
        reply.segments[0].operating_carrier = 0;

        let graph = resolve_live_reply(&reply).unwrap();
        assert_eq!(graph.segment(SegmentId(1)).unwrap().operating_carrier, None);
    }

    #[test]
    fn test_missing_segment_place_fails() {
        let mut reply = sample_reply();
        reply.segments[1].destination_station = 4242;

        assert!(matches!(
            resolve_live_reply(&reply),
            Err(ResolveError::MissingPlace { id: 4242, .. })
        ));
    }

    #[test]
    fn test_missing_leg_segment_fails() {
        let mut reply = sample_reply();
        reply.legs[2].segment_ids.push(99);

        assert!(matches!(
            resolve_live_reply(&reply),
            Err(ResolveError::MissingSegment { id: 99, .. })
        ));
    }

    #[test]
    fn test_missing_itinerary_leg_fails() {
        let mut reply = sample_reply();
        reply.itineraries[1].inbound_leg_id = "nowhere".to_string();

        assert_eq!(
            resolve_live_reply(&reply),
            Err(ResolveError::MissingLeg {
                id: "nowhere".to_string(),
                referenced_by: "itinerary 1".to_string(),
            })
        );
    }

    #[test_case(|dto: &mut ItineraryApiDto| dto.inbound_leg_id.clear(); "#1 no inbound leg")]
    #[test_case(|dto: &mut ItineraryApiDto| dto.outbound_leg_id.clear(); "#2 no outbound leg")]
    fn test_itinerary_without_leg_id_fails(clear: fn(&mut ItineraryApiDto)) {
        let mut reply = sample_reply();
        clear(&mut reply.itineraries[0]);

        assert_eq!(
            resolve_live_reply(&reply),
            Err(ResolveError::MissingLeg {
                id: String::new(),
                referenced_by: "itinerary 0".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_pricing_agent_fails() {
        let mut reply = sample_reply();
        reply.itineraries[0].pricing_options[1].agents = vec![1];

        assert!(matches!(
            resolve_live_reply(&reply),
            Err(ResolveError::MissingAgent { id: 1, .. })
        ));
    }

    #[test]
    fn test_invalid_timestamp_fails() {
        let mut reply = sample_reply();
        reply.segments[2].arrival_date_time = "yesterday".to_string();

        assert_eq!(
            resolve_live_reply(&reply),
            Err(ResolveError::InvalidTimestamp {
                field: "ArrivalDateTime".to_string(),
                value: "yesterday".to_string(),
            })
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let reply = sample_reply();
        let first = resolve_live_reply(&reply).unwrap();
        let second = resolve_live_reply(&reply).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.stats(), second.stats());
    }
}
