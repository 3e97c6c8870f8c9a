// Search requests and the URLs / forms they become on the wire
use chrono::NaiveDate;
use std::collections::BTreeMap;
use thiserror::Error;

// Destination placeholder understood by the browse endpoint
pub const ANYWHERE: &str = "anywhere";
pub const LOCATION_SCHEMA: &str = "Iata";

const LINK_BASE: &str = "https://www.skyscanner.net/transport/flights";
const COMPACT_DATE_FORMAT: &str = "%Y%m%d";
const FORM_DATE_FORMAT: &str = "%Y-%m-%d";

// Submitted search form; ordered so its encoding is stable (it is part of the cache key)
pub type Form = BTreeMap<String, String>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RequestError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localisation {
    pub country: String,
    pub currency: String,
    pub locale: String,
}

impl Localisation {
    pub fn new(country: &str, currency: &str, locale: &str) -> Self {
        Self {
            country: country.to_string(),
            currency: currency.to_string(),
            locale: locale.to_string(),
        }
    }

    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.country, self.currency, self.locale)
    }
}

impl Default for Localisation {
    fn default() -> Self {
        Self::new("UK", "GBP", "en-GB")
    }
}

// Coarse price discovery; dates are YYYYMMDD, an empty inbound date means one way
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseRoutesRequest {
    pub localisation: Localisation,
    pub origin: String,
    pub destination: String,
    pub outbound_date: String,
    pub inbound_date: String,
}

impl BrowseRoutesRequest {
    pub fn anywhere(
        localisation: Localisation,
        origin: &str,
        outbound_date: &str,
        inbound_date: &str,
    ) -> Self {
        Self {
            localisation,
            origin: origin.to_string(),
            destination: ANYWHERE.to_string(),
            outbound_date: outbound_date.to_string(),
            inbound_date: inbound_date.to_string(),
        }
    }

    // Same origin, dates and localisation, narrowed to one destination
    pub fn with_destination(&self, destination: &str) -> Self {
        Self {
            destination: destination.to_string(),
            ..self.clone()
        }
    }

    pub fn url(&self, base: &str) -> String {
        let mut url = format!(
            "{}/{}/{}/{}/{}",
            base.trim_end_matches('/'),
            self.localisation.path(),
            self.origin,
            self.destination,
            self.outbound_date
        );
        if !self.inbound_date.is_empty() {
            url.push('/');
            url.push_str(&self.inbound_date);
        }
        url
    }

    pub fn link_to(&self, destination: &str) -> String {
        search_link(
            &self.origin,
            destination,
            &self.outbound_date,
            &self.inbound_date,
        )
    }

    pub fn to_live(&self) -> LiveRequest {
        LiveRequest {
            localisation: self.localisation.clone(),
            origin: self.origin.clone(),
            destination: self.destination.clone(),
            outbound_date: self.outbound_date.clone(),
            inbound_date: self.inbound_date.clone(),
        }
    }
}

// Session based pricing search for one origin/destination pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRequest {
    pub localisation: Localisation,
    pub origin: String,
    pub destination: String,
    pub outbound_date: String,
    pub inbound_date: String,
}

impl LiveRequest {
    pub fn form(&self) -> Result<Form, RequestError> {
        let mut form = Form::new();
        form.insert("country".to_string(), self.localisation.country.clone());
        form.insert("currency".to_string(), self.localisation.currency.clone());
        form.insert("locale".to_string(), self.localisation.locale.clone());
        form.insert("originplace".to_string(), self.origin.clone());
        form.insert("destinationplace".to_string(), self.destination.clone());
        form.insert(
            "outbounddate".to_string(),
            form_date(&self.outbound_date)?,
        );
        if !self.inbound_date.is_empty() {
            form.insert("inbounddate".to_string(), form_date(&self.inbound_date)?);
        }
        form.insert("locationschema".to_string(), LOCATION_SCHEMA.to_string());
        Ok(form)
    }

    pub fn link(&self) -> String {
        search_link(
            &self.origin,
            &self.destination,
            &self.outbound_date,
            &self.inbound_date,
        )
    }
}

// One origin, many candidate destinations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub localisation: Localisation,
    pub origin: String,
    pub destinations: Vec<String>,
    pub outbound_date: String,
    pub inbound_date: String,
}

impl SearchRequest {
    pub fn live_requests(&self) -> Vec<LiveRequest> {
        self.destinations
            .iter()
            .map(|destination| LiveRequest {
                localisation: self.localisation.clone(),
                origin: self.origin.clone(),
                destination: destination.clone(),
                outbound_date: self.outbound_date.clone(),
                inbound_date: self.inbound_date.clone(),
            })
            .collect()
    }
}

// YYYYMMDD (or an already formatted YYYY-MM-DD) to YYYY-MM-DD
pub fn form_date(date: &str) -> Result<String, RequestError> {
    NaiveDate::parse_from_str(date, COMPACT_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(date, FORM_DATE_FORMAT))
        .map(|parsed| parsed.format(FORM_DATE_FORMAT).to_string())
        .map_err(|_| RequestError::InvalidDate(date.to_string()))
}

// Human facing deep link for a search
pub fn search_link(origin: &str, destination: &str, outbound: &str, inbound: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}/",
        LINK_BASE, origin, destination, outbound, inbound
    )
}
