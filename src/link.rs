//! Links are not handles: these operations act directly on the group that holds the link
//! and never touch the URI cache.

use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::handle::{Located, Location};
use crate::object::{IterOrder, ObjectKind};
use crate::plist::PlistId;
use crate::request::{LinkPayload, link_create_body};
use crate::resolver::{self, find_object_by_path, group_uri_for};
use crate::response::{self, LinkInfo, LinkValue, parse_response};
use crate::transport::check_status;
use crate::utils;

/// Servers from this version on accept link names in the request body.
const LONG_NAME_VERSION: (u32, u32, u32) = (0, 8, 6);

fn send_create(domain: &Domain, parent_uri: &str, name: &str, payload: &LinkPayload<'_>) -> Result<()> {
    let (major, minor, patch) = LONG_NAME_VERSION;
    let request = if domain.server_version().at_least(major, minor, patch) {
        let body = link_create_body(payload, Some(name))?;
        domain
            .request()
            .put(&["groups", parent_uri, "links"], Some(body))?
    } else {
        let body = link_create_body(payload, None)?;
        domain
            .request()
            .put(&["groups", parent_uri, "links", name], Some(body))?
    };
    domain.execute(&request)?;
    tracing::info!("created link '{}' in group '{}'", name, parent_uri);
    Ok(())
}

fn prepare_create<'n>(loc: Location<'_>, name: &'n str, lcpl: PlistId) -> Result<(String, &'n str)> {
    loc.require_container()?;
    loc.domain.check_write_intent()?;
    resolver::resolve_link_parent(loc, name, lcpl)
}

/// Links `name` to `target`, or to the object at `target_path` relative to `target`.
pub fn create_hard(
    loc: &impl Located,
    name: &str,
    target: &impl Located,
    target_path: Option<&str>,
    lcpl: PlistId,
) -> Result<()> {
    let loc = loc.location();
    let target = target.location();
    if !Arc::ptr_eq(loc.domain, target.domain) && loc.domain.path() != target.domain.path() {
        return Err(RestError::Argument(format!(
            "can't create a hard link from '{}' into '{}'",
            loc.domain.path(),
            target.domain.path()
        )));
    }

    let target_uri = match target_path {
        Some(path) => {
            let mut resolved = find_object_by_path(target, path, ObjectKind::Unknown)?
                .ok_or_else(|| RestError::Path(format!("can't locate link target '{path}'")))?;
            let crossed = resolved.external.is_some();
            resolved.release_external();
            if crossed {
                return Err(RestError::Argument(format!(
                    "link target '{path}' lives in another domain"
                )));
            }
            resolved.uri
        }
        None => target.uri.to_string(),
    };

    let (parent_uri, base) = prepare_create(loc, name, lcpl)?;
    send_create(
        loc.domain,
        &parent_uri,
        base,
        &LinkPayload::Hard {
            target_uri: &target_uri,
        },
    )
}

pub fn create_soft(loc: &impl Located, name: &str, target_path: &str, lcpl: PlistId) -> Result<()> {
    if target_path.is_empty() {
        return Err(RestError::Argument("soft link target was empty".to_string()));
    }
    let loc = loc.location();
    let (parent_uri, base) = prepare_create(loc, name, lcpl)?;
    send_create(loc.domain, &parent_uri, base, &LinkPayload::Soft { target_path })
}

pub fn create_external(
    loc: &impl Located,
    name: &str,
    file: &str,
    target_path: &str,
    lcpl: PlistId,
) -> Result<()> {
    if file.is_empty() || target_path.is_empty() {
        return Err(RestError::Argument(
            "external link needs both a domain and a path".to_string(),
        ));
    }
    let loc = loc.location();
    let (parent_uri, base) = prepare_create(loc, name, lcpl)?;
    send_create(
        loc.domain,
        &parent_uri,
        base,
        &LinkPayload::External {
            domain: file,
            target_path,
        },
    )
}

/// The group holding link `name`, and the link's own name.
fn locate_link<'n>(loc: Location<'_>, name: &'n str) -> Result<Option<(String, &'n str)>> {
    let (dir, base) = utils::split_link_path(name)?;
    Ok(group_uri_for(loc, dir)?.map(|uri| (uri, base)))
}

pub fn get_info(loc: &impl Located, name: &str) -> Result<LinkInfo> {
    let loc = loc.location();
    loc.require_location()?;
    let (parent_uri, base) = locate_link(loc, name)?
        .ok_or_else(|| RestError::Path(format!("can't locate the group holding link '{name}'")))?;
    let request = loc
        .domain
        .request()
        .get(&["groups", &parent_uri, "links", base], &[])?;
    let response = loc.domain.execute(&request)?;
    let mut info = parse_response(&response.body, response::link_info)?;
    if info.name.is_none() {
        info.name = Some(base.to_string());
    }
    Ok(info)
}

pub fn get_value(loc: &impl Located, name: &str) -> Result<LinkValue> {
    Ok(get_info(loc, name)?.value)
}

pub fn exists(loc: &impl Located, name: &str) -> Result<bool> {
    let loc = loc.location();
    loc.require_location()?;
    let Some((parent_uri, base)) = locate_link(loc, name)? else {
        return Ok(false);
    };
    let request = loc
        .domain
        .request()
        .get(&["groups", &parent_uri, "links", base], &[])?;
    let response = loc.domain.perform(&request)?;
    match response.status {
        404 | 410 => Ok(false),
        status => check_status(status).map(|_| true),
    }
}

pub fn delete(loc: &impl Located, name: &str) -> Result<()> {
    let loc = loc.location();
    loc.require_location()?;
    loc.domain.check_write_intent()?;
    let (parent_uri, base) = locate_link(loc, name)?
        .ok_or_else(|| RestError::Path(format!("can't locate the group holding link '{name}'")))?;
    let request = loc
        .domain
        .request()
        .delete(&["groups", &parent_uri, "links", base])?;
    loc.domain.execute(&request)?;
    tracing::info!("deleted link '{}'", name);
    Ok(())
}

/// Links in the group at `group_path` (or `loc` itself), in name or creation order.
pub fn list(loc: &impl Located, group_path: Option<&str>, order: IterOrder) -> Result<Vec<LinkInfo>> {
    let loc = loc.location();
    loc.require_location()?;
    let group_uri = group_uri_for(loc, group_path.unwrap_or("."))?.ok_or_else(|| {
        RestError::Path(format!(
            "can't locate group '{}'",
            group_path.unwrap_or(".")
        ))
    })?;

    let query: &[(&str, &str)] = match order {
        IterOrder::Creation => &[("CreateOrder", "1")],
        IterOrder::Name => &[],
    };
    let request = loc
        .domain
        .request()
        .get(&["groups", &group_uri, "links"], query)?;
    let response = loc.domain.execute(&request)?;
    let mut links = parse_response(&response.body, response::link_list)?;

    match order {
        IterOrder::Name => links.sort_by(|a, b| a.name.cmp(&b.name)),
        IterOrder::Creation => links.sort_by_key(|l| l.created),
    }
    Ok(links)
}
