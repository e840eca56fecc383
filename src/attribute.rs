//! Attributes hang off a file, group, dataset, or committed datatype. The service gives
//! them no URI of their own, so handles are cached under `"{parent_uri}/{name}"`.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::handle::{HandleState, Located, Location, construct};
use crate::object::ObjectKind;
use crate::plist::PlistId;
use crate::request::attribute_create_body;
use crate::response::{self, AttributeInfo, parse_response};
use crate::transport::check_status;
use crate::types::{Dataspace, Datatype};

pub struct Attribute {
    state: HandleState,
    parent_uri: String,
    parent_kind: ObjectKind,
    name: String,
    datatype: Datatype,
    dataspace: Dataspace,
    created: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeGet {
    Info,
    Space,
    Type,
    Name,
    CreatePlist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Info(AttributeInfo),
    Space(Dataspace),
    Type(Datatype),
    Name(String),
    CreatePlist(PlistId),
}

fn parent_collection(loc: &Location<'_>) -> Result<&'static str> {
    loc.require_location()?;
    loc.kind.collection().ok_or_else(|| {
        RestError::Argument(format!("{} objects can't carry attributes", loc.kind))
    })
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(RestError::Argument("attribute name was empty".to_string()));
    }
    Ok(())
}

fn cache_key(parent_uri: &str, name: &str) -> String {
    format!("{parent_uri}/{name}")
}

impl Attribute {
    pub fn create(
        parent: &impl Located,
        name: &str,
        datatype: &Datatype,
        dataspace: &Dataspace,
        acpl: PlistId,
        aapl: PlistId,
    ) -> Result<Attribute> {
        let loc = parent.location();
        let collection = parent_collection(&loc)?;
        check_name(name)?;
        loc.domain.check_write_intent()?;
        tracing::info!("creating attribute '{}' on {} '{}'", name, loc.kind, loc.uri);

        let body = attribute_create_body(&datatype.to_json_string()?, &dataspace.shape_fragment()?)?;

        let state = construct(HandleState::new(ObjectKind::Attribute, loc.domain), |state| {
            state.attach(loc.domain)?;
            state.adopt_plists(acpl, aapl)?;
            state.path = loc.path.map(str::to_string);

            let request = loc
                .domain
                .request()
                .put(&[collection, loc.uri, "attributes", name], Some(body))?;
            loc.domain.execute(&request)?;
            state.populate(cache_key(loc.uri, name))
        })?;

        Ok(Attribute {
            state,
            parent_uri: loc.uri.to_string(),
            parent_kind: loc.kind,
            name: name.to_string(),
            datatype: datatype.clone(),
            dataspace: dataspace.clone(),
            created: None,
        })
    }

    pub fn open(parent: &impl Located, name: &str, aapl: PlistId) -> Result<Attribute> {
        let loc = parent.location();
        let collection = parent_collection(&loc)?;
        check_name(name)?;

        let info = fetch_info(loc.domain, collection, loc.uri, name)?;
        let state = construct(HandleState::new(ObjectKind::Attribute, loc.domain), |state| {
            state.attach(loc.domain)?;
            state.access_plist = loc.domain.shared.plists.copy(aapl)?;
            state.path = loc.path.map(str::to_string);
            state.populate(cache_key(loc.uri, name))
        })?;

        Ok(Attribute {
            state,
            parent_uri: loc.uri.to_string(),
            parent_kind: loc.kind,
            name: info.name,
            datatype: info.datatype,
            dataspace: info.dataspace,
            created: info.created,
        })
    }

    pub fn exists(parent: &impl Located, name: &str) -> Result<bool> {
        let loc = parent.location();
        let collection = parent_collection(&loc)?;
        check_name(name)?;
        let request = loc
            .domain
            .request()
            .get(&[collection, loc.uri, "attributes", name], &[])?;
        let response = loc.domain.perform(&request)?;
        match response.status {
            404 | 410 => Ok(false),
            status => check_status(status).map(|_| true),
        }
    }

    pub fn delete(parent: &impl Located, name: &str) -> Result<()> {
        let loc = parent.location();
        let collection = parent_collection(&loc)?;
        check_name(name)?;
        loc.domain.check_write_intent()?;
        let request = loc
            .domain
            .request()
            .delete(&[collection, loc.uri, "attributes", name])?;
        loc.domain.execute(&request)?;
        tracing::info!("deleted attribute '{}' from '{}'", name, loc.uri);
        Ok(())
    }

    pub fn list_names(parent: &impl Located) -> Result<Vec<String>> {
        let loc = parent.location();
        let collection = parent_collection(&loc)?;
        let request = loc
            .domain
            .request()
            .get(&[collection, loc.uri, "attributes"], &[])?;
        let response = loc.domain.execute(&request)?;
        parse_response(&response.body, response::attribute_names)
    }

    pub fn get(&self, query: AttributeGet) -> Result<AttributeValue> {
        Ok(match query {
            AttributeGet::Info => {
                let collection = self.parent_kind.collection().ok_or_else(|| {
                    RestError::Internal(format!("attribute parent is a {}", self.parent_kind))
                })?;
                AttributeValue::Info(fetch_info(
                    &self.state.domain,
                    collection,
                    &self.parent_uri,
                    &self.name,
                )?)
            }
            AttributeGet::Space => AttributeValue::Space(self.dataspace.clone()),
            AttributeGet::Type => AttributeValue::Type(self.datatype.clone()),
            AttributeGet::Name => AttributeValue::Name(self.name.clone()),
            AttributeGet::CreatePlist => AttributeValue::CreatePlist(
                self.state
                    .domain
                    .shared
                    .plists
                    .copy(self.state.creation_plist)?,
            ),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_uri(&self) -> &str {
        &self.parent_uri
    }

    pub fn created(&self) -> Option<OffsetDateTime> {
        self.created
    }

    /// The key this attribute is cached under.
    pub fn cache_key(&self) -> &str {
        &self.state.uri
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.state.domain
    }

    pub fn close(mut self) -> Result<()> {
        tracing::debug!("closing attribute '{}'", self.state.uri);
        self.state.close()
    }
}

fn fetch_info(domain: &Domain, collection: &str, parent_uri: &str, name: &str) -> Result<AttributeInfo> {
    let request = domain
        .request()
        .get(&[collection, parent_uri, "attributes", name], &[])?;
    let response = domain.execute(&request)?;
    parse_response(&response.body, response::attribute_info)
}
