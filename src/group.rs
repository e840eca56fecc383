use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::handle::{HandleState, Located, Location, construct};
use crate::link;
use crate::object::{Locator, ObjectKind};
use crate::plist::{PlistClass, PlistId};
use crate::request::{LinkTarget, encode_plist, group_create_body};
use crate::resolver::{self, Resolved, find_object_by_path};
use crate::response::{self, GroupInfo, LinkValue, parse_response};
use crate::utils;

pub struct Group {
    state: HandleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupGet {
    CreatePlist,
    Info,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupValue {
    CreatePlist(PlistId),
    Info(GroupInfo),
}

impl Group {
    /// Creates a group. With a name, the group is linked into the hierarchy at that path;
    /// without one it is anonymous and only reachable through its handle.
    pub fn create(
        loc: &impl Located,
        name: Option<&str>,
        lcpl: PlistId,
        gcpl: PlistId,
        gapl: PlistId,
    ) -> Result<Group> {
        Self::create_at(loc.location(), name, lcpl, gcpl, gapl)
    }

    pub(crate) fn create_at(
        loc: Location<'_>,
        name: Option<&str>,
        lcpl: PlistId,
        gcpl: PlistId,
        gapl: PlistId,
    ) -> Result<Group> {
        loc.require_container()?;
        loc.domain.check_write_intent()?;
        tracing::info!(
            "creating group {} under {} '{}'",
            name.unwrap_or("<anonymous>"),
            loc.kind,
            loc.uri
        );

        let state = construct(HandleState::new(ObjectKind::Group, loc.domain), |state| {
            state.attach(loc.domain)?;
            state.adopt_plists(gcpl, gapl)?;

            let link = match name {
                Some(name) => {
                    state.path = utils::join_handle_path(loc.path, name);
                    Some(resolver::resolve_link_parent(loc, name, lcpl)?)
                }
                None => None,
            };

            let gcpl_b64 = encode_plist(
                &loc.domain.shared.plists,
                state.creation_plist,
                PlistClass::GroupCreate,
            )?;
            let body = group_create_body(
                link.as_ref().map(|(parent_uri, name)| LinkTarget { parent_uri, name }),
                &gcpl_b64,
            )?;

            let request = loc.domain.request().post(&["groups"], body)?;
            let response = loc.domain.execute(&request)?;
            let uri = parse_response(&response.body, response::copy_object_uri)?.ok_or_else(
                || RestError::Internal("group create response carried no URI".to_string()),
            )?;
            state.populate(uri)
        })?;

        tracing::info!("created group '{}'", state.uri);
        Ok(Group { state })
    }

    pub fn open(loc: &impl Located, path: &str, gapl: PlistId) -> Result<Group> {
        let loc = loc.location();
        let resolved = find_object_by_path(loc, path, ObjectKind::Group)?
            .ok_or_else(|| RestError::Path(format!("can't locate group '{path}'")))?;
        Self::from_resolved(loc, path, resolved, gapl)
    }

    pub(crate) fn from_resolved(
        loc: Location<'_>,
        path: &str,
        mut resolved: Resolved,
        gapl: PlistId,
    ) -> Result<Group> {
        let domain: Arc<Domain> = resolved.domain(loc.domain).clone();
        let result = construct(HandleState::new(ObjectKind::Group, &domain), |state| {
            state.attach(&domain)?;
            state.access_plist = domain.shared.plists.copy(gapl)?;
            state.creation_plist = decode_creation_plist(
                &domain,
                resolved.creation_properties.as_deref(),
                PlistClass::GroupCreate,
            )?;
            state.path = utils::join_handle_path(loc.path, path);
            state.populate(resolved.uri.clone())
        });
        resolved.release_external();

        let state = result?;
        tracing::debug!("opened group '{}' as {}", path, state.uri);
        Ok(Group { state })
    }

    pub fn get(&self, query: GroupGet, locator: Locator<'_>) -> Result<GroupValue> {
        match query {
            GroupGet::CreatePlist => match locator {
                Locator::BySelf => Ok(GroupValue::CreatePlist(
                    self.state
                        .domain
                        .shared
                        .plists
                        .copy(self.state.creation_plist)?,
                )),
                _ => Err(RestError::Argument(
                    "creation properties can only be read from the group itself".to_string(),
                )),
            },
            GroupGet::Info => {
                let uri = match locator {
                    Locator::BySelf => self.state.uri.clone(),
                    Locator::ByName(name) => {
                        find_object_by_path(self.location(), name, ObjectKind::Group)?
                            .map(Resolved::into_uri)
                            .ok_or_else(|| {
                                RestError::Path(format!("can't locate group '{name}'"))
                            })?
                    }
                    Locator::ByIndex {
                        group_path,
                        index,
                        order,
                    } => {
                        let links = link::list(self, Some(group_path), order)?;
                        let picked = links.get(index as usize).ok_or_else(|| {
                            RestError::Argument(format!(
                                "link index {index} out of range ({} links)",
                                links.len()
                            ))
                        })?;
                        match &picked.value {
                            LinkValue::Hard {
                                uri,
                                kind: ObjectKind::Group,
                            } => uri.clone(),
                            _ => {
                                return Err(RestError::Argument(format!(
                                    "link {index} does not point at a group"
                                )));
                            }
                        }
                    }
                };
                Ok(GroupValue::Info(group_info(&self.state.domain, &uri)?))
            }
        }
    }

    pub fn info(&self) -> Result<GroupInfo> {
        group_info(&self.state.domain, &self.state.uri)
    }

    pub fn uri(&self) -> &str {
        &self.state.uri
    }

    /// The absolute path this handle was reached by, if it has one.
    pub fn name(&self) -> Option<&str> {
        self.state.path.as_deref()
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.state.domain
    }

    pub fn close(mut self) -> Result<()> {
        tracing::debug!("closing group '{}'", self.state.uri);
        self.state.close()
    }
}

impl Located for Group {
    fn location(&self) -> Location<'_> {
        self.state.location()
    }
}

fn group_info(domain: &Domain, uri: &str) -> Result<GroupInfo> {
    let request = domain.request().get(&["groups", uri], &[])?;
    let response = domain.execute(&request)?;
    parse_response(&response.body, response::group_info)
}

/// Servers from 0.8.0 on send creation properties with lookups. Older ones (or a response
/// without them) get a fresh default list.
pub(crate) fn decode_creation_plist(
    domain: &Domain,
    encoded: Option<&str>,
    class: PlistClass,
) -> Result<PlistId> {
    let plists = &domain.shared.plists;
    match encoded {
        Some(encoded) if domain.server_version().at_least(0, 8, 0) && !encoded.is_empty() => {
            let bytes = crate::request::decode_plist_bytes(encoded)?;
            plists.decode(&bytes)
        }
        _ => Ok(plists.create(class)),
    }
}
