// Wire shapes of the remote pricing service replies.
// The same structures decode both the JSON and the XML encoding: collections accept either a
// JSON array or an XML wrapper element holding repeated children.

use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CurrencyDto {
    pub code: String,
    pub symbol: String,
    pub thousands_separator: String,
    pub decimal_separator: String,
    pub symbol_on_left: bool,
    pub space_between_amount_and_symbol: bool,
    pub rounding_coefficient: i32,
    pub decimal_digits: i32,
}

// Browse routes side

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BrowseRoutesReply {
    #[serde(deserialize_with = "list")]
    pub currencies: Vec<CurrencyDto>,
    #[serde(deserialize_with = "list")]
    pub routes: Vec<RouteDto>,
    #[serde(deserialize_with = "list")]
    pub quotes: Vec<QuoteDto>,
    #[serde(deserialize_with = "list")]
    pub places: Vec<PlaceDto>,
    #[serde(deserialize_with = "list")]
    pub carriers: Vec<CarriersDto>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct RouteDto {
    pub quote_date_time: String,
    // Absent when the route has no priced quote
    #[serde(deserialize_with = "lenient_text")]
    pub price: Option<String>,
    #[serde(deserialize_with = "list")]
    pub quote_ids: Vec<i64>,
    pub destination_id: i64,
    pub origin_id: i64,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct QuoteLegDto {
    #[serde(deserialize_with = "list")]
    pub carrier_ids: Vec<i64>,
    pub origin_id: i64,
    pub destination_id: i64,
    pub departure_date: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct QuoteDto {
    pub quote_id: i64,
    pub min_price: f64,
    pub direct: bool,
    pub outbound_leg: QuoteLegDto,
    pub inbound_leg: QuoteLegDto,
    pub quote_date_time: String,
}

#[derive(Debug, PartialEq, Eq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlaceDto {
    pub place_id: i64,
    pub name: String,
    #[serde(rename = "Type")]
    pub place_type: String,
    pub skyscanner_code: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CarriersDto {
    pub carrier_id: i64,
    pub name: String,
}

// Live pricing side

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LiveReply {
    pub session_key: String,
    pub status: String,
    pub query: LiveQueryDto,
    #[serde(deserialize_with = "list")]
    pub segments: Vec<SegmentApiDto>,
    #[serde(deserialize_with = "list")]
    pub carriers: Vec<CarrierApiDto>,
    #[serde(deserialize_with = "list")]
    pub agents: Vec<AgentApiDto>,
    #[serde(deserialize_with = "list")]
    pub places: Vec<PlaceApiDto>,
    #[serde(deserialize_with = "list")]
    pub currencies: Vec<CurrencyDto>,
    #[serde(deserialize_with = "list")]
    pub legs: Vec<ItineraryLegApiDto>,
    #[serde(deserialize_with = "list")]
    pub itineraries: Vec<ItineraryApiDto>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct LiveQueryDto {
    pub country: String,
    pub currency: String,
    pub locale: String,
    pub adults: i32,
    pub children: i32,
    pub infants: i32,
    #[serde(deserialize_with = "lenient_text")]
    pub origin_place: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub destination_place: Option<String>,
    pub outbound_date: String,
    pub inbound_date: String,
    pub location_schema: String,
    pub cabin_class: String,
    pub group_pricing: bool,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct CarrierApiDto {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub image_url: String,
    pub display_code: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PlaceApiDto {
    pub id: i64,
    // Countries carry no parent; the service sometimes sends it as a string
    #[serde(deserialize_with = "lenient_text")]
    pub parent_id: Option<String>,
    pub code: String,
    #[serde(rename = "Type")]
    pub place_type: String,
    pub name: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct AgentApiDto {
    pub id: i64,
    pub name: String,
    pub image_url: String,
    pub status: String,
    pub optimised_for_mobile: bool,
    pub booking_number: String,
    #[serde(rename = "Type")]
    pub agent_type: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SegmentApiDto {
    pub id: i64,
    pub origin_station: i64,
    pub destination_station: i64,
    pub departure_date_time: String,
    pub arrival_date_time: String,
    pub carrier: i64,
    pub operating_carrier: i64,
    // Minutes
    pub duration: i64,
    pub flight_number: String,
    pub journey_mode: String,
    pub directionality: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct FlightNumberDto {
    pub flight_number: String,
    pub carrier_id: i64,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ItineraryLegApiDto {
    pub id: String,
    #[serde(deserialize_with = "list")]
    pub segment_ids: Vec<i64>,
    pub origin_station: i64,
    pub destination_station: i64,
    pub departure: String,
    pub arrival: String,
    pub duration: i64,
    pub journey_mode: String,
    #[serde(deserialize_with = "list")]
    pub stops: Vec<i64>,
    #[serde(deserialize_with = "list")]
    pub carriers: Vec<i64>,
    #[serde(deserialize_with = "list")]
    pub operating_carriers: Vec<i64>,
    pub directionality: String,
    #[serde(deserialize_with = "list")]
    pub flight_numbers: Vec<FlightNumberDto>,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct PricingOptionApiDto {
    #[serde(deserialize_with = "list")]
    pub agents: Vec<i64>,
    pub quote_age_in_minutes: i64,
    pub price: f64,
    pub deeplink_url: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BookingDetailsLinkDto {
    pub uri: String,
    pub body: String,
    pub method: String,
}

#[derive(Debug, PartialEq, Default, Deserialize, Clone, Serialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ItineraryApiDto {
    pub outbound_leg_id: String,
    pub inbound_leg_id: String,
    #[serde(deserialize_with = "list")]
    pub pricing_options: Vec<PricingOptionApiDto>,
    pub booking_details_link: BookingDetailsLinkDto,
}

// Accepts `[a, b]` (JSON), `<Wrapper><Item/><Item/></Wrapper>` (XML), null or an empty element.
fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    struct ListVisitor<T>(PhantomData<T>);

    impl<'de, T: Deserialize<'de>> Visitor<'de> for ListVisitor<T> {
        type Value = Vec<T>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a sequence or an element wrapping repeated items")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(item) = seq.next_element()? {
                items.push(item);
            }
            Ok(items)
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut items = Vec::new();
            while let Some(key) = map.next_key::<String>()? {
                // attributes and stray text of the wrapper element
                if key.starts_with('@') || key == "$text" {
                    map.next_value::<IgnoredAny>()?;
                    continue;
                }
                items.extend(map.next_value::<Vec<T>>()?);
            }
            Ok(items)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(Vec::new())
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            if value.trim().is_empty() {
                Ok(Vec::new())
            } else {
                Err(E::invalid_type(Unexpected::Str(value), &self))
            }
        }
    }

    deserializer.deserialize_any(ListVisitor(PhantomData))
}

// Scalar that may arrive as a number, a string, an empty element or not at all
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct TextVisitor;

    impl<'de> Visitor<'de> for TextVisitor {
        type Value = Option<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a number, a string or nothing")
        }

        fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
            let value = value.trim();
            Ok((!value.is_empty()).then(|| value.to_string()))
        }

        fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_f64<E: de::Error>(self, value: f64) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_bool<E: de::Error>(self, value: bool) -> Result<Self::Value, E> {
            Ok(Some(value.to_string()))
        }

        fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Self::Value, D::Error> {
            deserializer.deserialize_any(TextVisitor)
        }

        // XML elements surface their content under `$text`
        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut text = None;
            while let Some(key) = map.next_key::<String>()? {
                if key == "$text" || key == "$value" {
                    text = map.next_value::<String>().map(|value| {
                        let value = value.trim();
                        (!value.is_empty()).then(|| value.to_string())
                    })?;
                } else {
                    map.next_value::<IgnoredAny>()?;
                }
            }
            Ok(text)
        }
    }

    deserializer.deserialize_any(TextVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_accepts_null_and_missing() {
        let leg: ItineraryLegApiDto =
            serde_json::from_str(r#"{"Id": "a", "Stops": null}"#).unwrap();
        assert!(leg.stops.is_empty());
        assert!(leg.segment_ids.is_empty());
    }

    #[test]
    fn test_lenient_parent_id_from_number_string_or_missing() {
        let place: PlaceApiDto =
            serde_json::from_str(r#"{"Id": 1, "ParentId": 4698, "Code": "LGW"}"#).unwrap();
        assert_eq!(place.parent_id.as_deref(), Some("4698"));

        let place: PlaceApiDto =
            serde_json::from_str(r#"{"Id": 1, "ParentId": "4698", "Code": "LGW"}"#).unwrap();
        assert_eq!(place.parent_id.as_deref(), Some("4698"));

        let place: PlaceApiDto = serde_json::from_str(r#"{"Id": 1, "Code": "GB"}"#).unwrap();
        assert_eq!(place.parent_id, None);

        let place: PlaceApiDto =
            serde_json::from_str(r#"{"Id": 1, "ParentId": "", "Code": "GB"}"#).unwrap();
        assert_eq!(place.parent_id, None);
    }

    #[test]
    fn test_route_price_number_becomes_integer_text() {
        let route: RouteDto = serde_json::from_str(r#"{"Price": 568, "DestinationId": 1752}"#).unwrap();
        assert_eq!(route.price.as_deref(), Some("568"));
        assert_eq!(route.destination_id, 1752);
    }
}
