use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::group::decode_creation_plist;
use crate::handle::{HandleState, Located, Location, construct};
use crate::object::ObjectKind;
use crate::plist::{PlistClass, PlistId};
use crate::request::{LinkTarget, dataset_create_body, encode_plist};
use crate::resolver::{self, Resolved, find_object_by_path};
use crate::response::{self, parse_response};
use crate::types::{Dataspace, Datatype};
use crate::utils;

pub struct Dataset {
    state: HandleState,
    datatype: Datatype,
    dataspace: Dataspace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetGet {
    Space,
    Type,
    CreatePlist,
    AccessPlist,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DatasetValue {
    Space(Dataspace),
    Type(Datatype),
    CreatePlist(PlistId),
    AccessPlist(PlistId),
}

impl Dataset {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        loc: &impl Located,
        name: Option<&str>,
        datatype: &Datatype,
        dataspace: &Dataspace,
        lcpl: PlistId,
        dcpl: PlistId,
        dapl: PlistId,
    ) -> Result<Dataset> {
        let loc = loc.location();
        loc.require_container()?;
        loc.domain.check_write_intent()?;
        tracing::info!(
            "creating dataset {} under {} '{}'",
            name.unwrap_or("<anonymous>"),
            loc.kind,
            loc.uri
        );

        // Serialise up front so bad shapes fail before anything is allocated.
        let type_json = datatype.to_json_string()?;
        let shape = dataspace.shape_fragment()?;

        let state = construct(HandleState::new(ObjectKind::Dataset, loc.domain), |state| {
            state.attach(loc.domain)?;
            state.adopt_plists(dcpl, dapl)?;

            let link = match name {
                Some(name) => {
                    state.path = utils::join_handle_path(loc.path, name);
                    Some(resolver::resolve_link_parent(loc, name, lcpl)?)
                }
                None => None,
            };

            let dcpl_b64 = encode_plist(
                &loc.domain.shared.plists,
                state.creation_plist,
                PlistClass::DatasetCreate,
            )?;
            let body = dataset_create_body(
                &type_json,
                &shape,
                link.as_ref().map(|(parent_uri, name)| LinkTarget { parent_uri, name }),
                &dcpl_b64,
            )?;

            let request = loc.domain.request().post(&["datasets"], body)?;
            let response = loc.domain.execute(&request)?;
            let uri = parse_response(&response.body, response::copy_object_uri)?.ok_or_else(
                || RestError::Internal("dataset create response carried no URI".to_string()),
            )?;
            state.populate(uri)
        })?;

        tracing::info!("created dataset '{}'", state.uri);
        Ok(Dataset {
            state,
            datatype: datatype.clone(),
            dataspace: dataspace.clone(),
        })
    }

    pub fn open(loc: &impl Located, path: &str, dapl: PlistId) -> Result<Dataset> {
        let loc = loc.location();
        let resolved = find_object_by_path(loc, path, ObjectKind::Dataset)?
            .ok_or_else(|| RestError::Path(format!("can't locate dataset '{path}'")))?;
        Self::from_resolved(loc, path, resolved, dapl)
    }

    pub(crate) fn from_resolved(
        loc: Location<'_>,
        path: &str,
        mut resolved: Resolved,
        dapl: PlistId,
    ) -> Result<Dataset> {
        let domain: Arc<Domain> = resolved.domain(loc.domain).clone();
        let mut shape = None;
        let result = construct(HandleState::new(ObjectKind::Dataset, &domain), |state| {
            state.attach(&domain)?;
            state.access_plist = domain.shared.plists.copy(dapl)?;

            let request = domain.request().get(&["datasets", &resolved.uri], &[])?;
            let response = domain.execute(&request)?;
            let (datatype, dataspace, dcpl) = parse_response(&response.body, |doc| {
                Ok((
                    response::datatype_of(doc)?,
                    response::dataspace_of(doc)?,
                    response::get_opt_str(doc, &["creationProperties"])?.map(str::to_string),
                ))
            })?;
            let encoded = dcpl.or_else(|| resolved.creation_properties.clone());
            state.creation_plist =
                decode_creation_plist(&domain, encoded.as_deref(), PlistClass::DatasetCreate)?;
            shape = Some((datatype, dataspace));

            state.path = utils::join_handle_path(loc.path, path);
            state.populate(resolved.uri.clone())
        });
        resolved.release_external();

        let state = result?;
        let (datatype, dataspace) = shape.ok_or_else(|| {
            RestError::Internal("dataset opened without a type and shape".to_string())
        })?;
        tracing::debug!("opened dataset '{}' as {}", path, state.uri);
        Ok(Dataset {
            state,
            datatype,
            dataspace,
        })
    }

    pub fn get(&self, query: DatasetGet) -> Result<DatasetValue> {
        let plists = &self.state.domain.shared.plists;
        Ok(match query {
            DatasetGet::Space => DatasetValue::Space(self.dataspace.clone()),
            DatasetGet::Type => DatasetValue::Type(self.datatype.clone()),
            DatasetGet::CreatePlist => {
                DatasetValue::CreatePlist(plists.copy(self.state.creation_plist)?)
            }
            DatasetGet::AccessPlist => {
                DatasetValue::AccessPlist(plists.copy(self.state.access_plist)?)
            }
        })
    }

    pub fn datatype(&self) -> &Datatype {
        &self.datatype
    }

    pub fn dataspace(&self) -> &Dataspace {
        &self.dataspace
    }

    pub fn uri(&self) -> &str {
        &self.state.uri
    }

    pub fn name(&self) -> Option<&str> {
        self.state.path.as_deref()
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.state.domain
    }

    pub fn close(mut self) -> Result<()> {
        tracing::debug!("closing dataset '{}'", self.state.uri);
        self.state.close()
    }
}

impl Located for Dataset {
    fn location(&self) -> Location<'_> {
        self.state.location()
    }
}
