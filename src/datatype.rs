use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::group::decode_creation_plist;
use crate::handle::{HandleState, Located, Location, construct};
use crate::object::ObjectKind;
use crate::plist::{PlistClass, PlistId};
use crate::request::{LinkTarget, datatype_commit_body, encode_plist};
use crate::resolver::{self, Resolved, find_object_by_path};
use crate::response::{self, parse_response};
use crate::types::Datatype;
use crate::utils;

/// A datatype committed to the domain as an object of its own.
pub struct CommittedDatatype {
    state: HandleState,
    datatype: Datatype,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatatypeGet {
    Type,
    CreatePlist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatatypeValue {
    Type(Datatype),
    CreatePlist(PlistId),
}

impl CommittedDatatype {
    pub fn commit(
        loc: &impl Located,
        name: Option<&str>,
        datatype: &Datatype,
        lcpl: PlistId,
        tcpl: PlistId,
        tapl: PlistId,
    ) -> Result<CommittedDatatype> {
        let loc = loc.location();
        loc.require_container()?;
        loc.domain.check_write_intent()?;
        let type_json = datatype.to_json_string()?;

        let state = construct(HandleState::new(ObjectKind::Datatype, loc.domain), |state| {
            state.attach(loc.domain)?;
            state.adopt_plists(tcpl, tapl)?;

            let link = match name {
                Some(name) => {
                    state.path = utils::join_handle_path(loc.path, name);
                    Some(resolver::resolve_link_parent(loc, name, lcpl)?)
                }
                None => None,
            };

            let tcpl_b64 = encode_plist(
                &loc.domain.shared.plists,
                state.creation_plist,
                PlistClass::DatatypeCreate,
            )?;
            let body = datatype_commit_body(
                &type_json,
                link.as_ref().map(|(parent_uri, name)| LinkTarget { parent_uri, name }),
                &tcpl_b64,
            )?;

            let request = loc.domain.request().post(&["datatypes"], body)?;
            let response = loc.domain.execute(&request)?;
            let uri = parse_response(&response.body, response::copy_object_uri)?.ok_or_else(
                || RestError::Internal("datatype commit response carried no URI".to_string()),
            )?;
            state.populate(uri)
        })?;

        tracing::info!("committed datatype '{}'", state.uri);
        Ok(CommittedDatatype {
            state,
            datatype: datatype.clone(),
        })
    }

    pub fn open(loc: &impl Located, path: &str, tapl: PlistId) -> Result<CommittedDatatype> {
        let loc = loc.location();
        let resolved = find_object_by_path(loc, path, ObjectKind::Datatype)?
            .ok_or_else(|| RestError::Path(format!("can't locate datatype '{path}'")))?;
        Self::from_resolved(loc, path, resolved, tapl)
    }

    pub(crate) fn from_resolved(
        loc: Location<'_>,
        path: &str,
        mut resolved: Resolved,
        tapl: PlistId,
    ) -> Result<CommittedDatatype> {
        let domain: Arc<Domain> = resolved.domain(loc.domain).clone();
        let mut datatype = None;
        let result = construct(HandleState::new(ObjectKind::Datatype, &domain), |state| {
            state.attach(&domain)?;
            state.access_plist = domain.shared.plists.copy(tapl)?;

            let request = domain.request().get(&["datatypes", &resolved.uri], &[])?;
            let response = domain.execute(&request)?;
            datatype = Some(parse_response(&response.body, response::datatype_of)?);

            state.creation_plist = decode_creation_plist(
                &domain,
                resolved.creation_properties.as_deref(),
                PlistClass::DatatypeCreate,
            )?;
            state.path = utils::join_handle_path(loc.path, path);
            state.populate(resolved.uri.clone())
        });
        resolved.release_external();

        let state = result?;
        let datatype = datatype
            .ok_or_else(|| RestError::Internal("datatype opened without a type".to_string()))?;
        Ok(CommittedDatatype { state, datatype })
    }

    pub fn get(&self, query: DatatypeGet) -> Result<DatatypeValue> {
        Ok(match query {
            DatatypeGet::Type => DatatypeValue::Type(self.datatype.clone()),
            DatatypeGet::CreatePlist => DatatypeValue::CreatePlist(
                self.state
                    .domain
                    .shared
                    .plists
                    .copy(self.state.creation_plist)?,
            ),
        })
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn uri(&self) -> &str {
        &self.state.uri
    }

    pub fn name(&self) -> Option<&str> {
        self.state.path.as_deref()
    }

    pub fn close(mut self) -> Result<()> {
        self.state.close()
    }
}

impl Located for CommittedDatatype {
    fn location(&self) -> Location<'_> {
        self.state.location()
    }
}
