//! Path resolution: turns a start object plus a path into the URI of the object the path
//! names, asking the server to walk the path in a single lookup wherever it can.

use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::{Domain, File};
use crate::group::Group;
use crate::handle::Location;
use crate::object::ObjectKind;
use crate::plist::PlistId;
use crate::response::{self, LinkValue, parse_response};
use crate::utils;

const MAX_LINK_TRAVERSALS: usize = 16;

/// The object a path led to. Copies everything out of the response it came from.
pub struct Resolved {
    pub uri: String,
    pub kind: ObjectKind,
    pub creation_properties: Option<String>,
    /// Set when the object lives in another domain, either because the path crossed an
    /// external link or because the server reported a different domain for it. The caller
    /// owns this handle and must close it once it holds its own reference on that domain.
    pub external: Option<File>,
}

impl Resolved {
    /// The domain the resolved object lives in.
    pub fn domain<'a>(&'a self, start: &'a Arc<Domain>) -> &'a Arc<Domain> {
        self.external.as_ref().map(File::domain).unwrap_or(start)
    }

    /// Just the URI, releasing any other-domain handle on the way.
    pub fn into_uri(mut self) -> String {
        self.release_external();
        self.uri
    }

    /// Closes the other-domain handle, if there is one.
    pub fn release_external(&mut self) {
        if let Some(file) = self.external.take() {
            let name = file.domain().path().to_string();
            if let Err(e) = file.close() {
                tracing::warn!("releasing external domain '{}': {}", name, e);
            }
        }
    }
}

/// Resolves `path` from `loc`. `Ok(None)` means the server has nothing at that path.
pub fn find_object_by_path(
    loc: Location<'_>,
    path: &str,
    wanted: ObjectKind,
) -> Result<Option<Resolved>> {
    find_with_depth(loc, path, wanted, 0)
}

fn find_with_depth(
    loc: Location<'_>,
    path: &str,
    wanted: ObjectKind,
    depth: usize,
) -> Result<Option<Resolved>> {
    loc.require_location()?;
    if depth > MAX_LINK_TRAVERSALS {
        return Err(RestError::Path(format!(
            "too many soft or external links while resolving '{path}'"
        )));
    }

    let path = utils::normalize(utils::clean_lookup_path(path));
    let path = path.as_str();
    if path.is_empty() {
        return Err(RestError::Argument("object path was empty".to_string()));
    }
    tracing::debug!(
        "resolving '{}' ({}) from {} '{}'",
        path,
        wanted,
        loc.kind,
        loc.uri
    );

    if path == "." {
        let kind = match (wanted, loc.kind) {
            (ObjectKind::Unknown, ObjectKind::File) => ObjectKind::Group,
            (ObjectKind::Unknown, kind) => kind,
            (wanted, _) => wanted,
        };
        return fetch_by_uri(loc, loc.uri, kind);
    }
    if path == "/" {
        return fetch_by_uri(loc, loc.domain.root_uri(), ObjectKind::Group);
    }

    match wanted {
        ObjectKind::Unknown => find_unknown(loc, path, depth),
        ObjectKind::File | ObjectKind::Group | ObjectKind::Dataset | ObjectKind::Datatype => {
            find_typed(loc, path, wanted)
        }
        other => Err(RestError::Argument(format!(
            "can't resolve a path to a {other}"
        ))),
    }
}

/// Re-reads an object whose URI is already known, to pick up its creation properties.
fn fetch_by_uri(loc: Location<'_>, uri: &str, kind: ObjectKind) -> Result<Option<Resolved>> {
    let collection = kind
        .collection()
        .ok_or_else(|| RestError::Argument(format!("{kind} objects have no collection")))?;
    let request = loc.domain.request().get(&[collection, uri], &[])?;
    lookup_response(loc, &request, kind)
}

fn find_typed(loc: Location<'_>, path: &str, wanted: ObjectKind) -> Result<Option<Resolved>> {
    let relative = !utils::is_absolute(path);
    let path = path.strip_prefix("./").unwrap_or(path);
    let rb = loc.domain.request();

    let request = match wanted {
        ObjectKind::Dataset | ObjectKind::Datatype => {
            let collection = wanted.collection().unwrap_or("datasets");
            if relative {
                rb.get(&[collection, ""], &[("grpid", loc.uri), ("h5path", path)])?
            } else {
                rb.get(&[collection, ""], &[("h5path", path)])?
            }
        }
        _ => {
            let base = if relative { loc.uri } else { "" };
            rb.get(&["groups", base], &[("h5path", path)])?
        }
    };
    let kind = match wanted {
        ObjectKind::File => ObjectKind::Group,
        other => other,
    };
    lookup_response(loc, &request, kind)
}

fn lookup_response(
    loc: Location<'_>,
    request: &crate::transport::RequestContext,
    kind: ObjectKind,
) -> Result<Option<Resolved>> {
    let response = loc.domain.perform(request)?;
    if matches!(response.status, 404 | 410) {
        tracing::debug!("lookup {} found nothing", request.url);
        return Ok(None);
    }
    crate::transport::check_status(response.status)?;

    let info = parse_response(&response.body, response::loc_info)?;
    let external = match info.domain.as_deref() {
        Some(domain) if domain != loc.domain.path() => {
            tracing::debug!(
                "object '{}' lives in domain '{}', not '{}'",
                info.uri,
                domain,
                loc.domain.path()
            );
            Some(File::open_shared(
                &loc.domain.shared,
                domain,
                loc.domain.intent(),
                PlistId::DEFAULT,
            )?)
        }
        _ => None,
    };
    Ok(Some(Resolved {
        uri: info.uri,
        kind,
        creation_properties: info.creation_properties,
        external,
    }))
}

/// The kind isn't known, so read the link that names the object in its parent group
/// and follow it.
fn find_unknown(loc: Location<'_>, path: &str, depth: usize) -> Result<Option<Resolved>> {
    let trimmed = path.trim_end_matches(utils::SEPARATOR);
    let dir = utils::dirname(trimmed);
    let base = utils::basename(trimmed);
    if base.is_empty() || base == "." {
        return find_with_depth(loc, ".", ObjectKind::Unknown, depth);
    }

    let Some(parent_uri) = group_uri_for(loc, dir)? else {
        return Ok(None);
    };

    let request = loc
        .domain
        .request()
        .get(&["groups", &parent_uri, "links", base], &[])?;
    let response = loc.domain.perform(&request)?;
    if matches!(response.status, 404 | 410) {
        return Ok(None);
    }
    crate::transport::check_status(response.status)?;
    let link = parse_response(&response.body, response::link_info)?;

    match link.value {
        LinkValue::Hard { uri, kind } => fetch_by_uri(loc, &uri, kind),
        LinkValue::Soft { path: target } => {
            tracing::debug!("following soft link '{}' -> '{}'", path, target);
            find_with_depth(loc, &target, ObjectKind::Unknown, depth + 1)
        }
        LinkValue::External {
            domain,
            path: target,
        } => {
            tracing::debug!("following external link '{}' -> {}:{}", path, domain, target);
            let external = File::open_shared(
                &loc.domain.shared,
                &domain,
                loc.domain.intent(),
                PlistId::DEFAULT,
            )?;
            let found = find_with_depth(
                crate::handle::Located::location(&external),
                &target,
                ObjectKind::Unknown,
                depth + 1,
            );
            match found {
                Ok(Some(mut resolved)) => {
                    if resolved.external.is_none() {
                        resolved.external = Some(external);
                    } else {
                        close_quietly(external);
                    }
                    Ok(Some(resolved))
                }
                other => {
                    close_quietly(external);
                    other
                }
            }
        }
        LinkValue::UserDefined => Err(RestError::Unsupported(format!(
            "user-defined link '{path}'"
        ))),
    }
}

fn close_quietly(file: File) {
    let name = file.domain().path().to_string();
    if let Err(e) = file.close() {
        tracing::warn!("closing external domain '{}': {}", name, e);
    }
}

/// URI of the group at `dir` relative to `loc`. An empty `dir` means `loc` itself.
pub(crate) fn group_uri_for(loc: Location<'_>, dir: &str) -> Result<Option<String>> {
    match dir {
        "" | "." => Ok(Some(loc.uri.to_string())),
        "/" => Ok(Some(loc.domain.root_uri().to_string())),
        dir => Ok(find_with_depth(loc, dir, ObjectKind::Group, 0)?.map(Resolved::into_uri)),
    }
}

/// Finds the group a new link called `name` should go into, creating missing
/// intermediate groups when `lcpl` asks for it. Returns the group's URI and the link name.
pub(crate) fn resolve_link_parent<'n>(
    loc: Location<'_>,
    name: &'n str,
    lcpl: PlistId,
) -> Result<(String, &'n str)> {
    loc.require_container()?;
    let (dir, base) = utils::split_link_path(name)?;

    if let Some(uri) = group_uri_for(loc, dir)? {
        return Ok((uri, base));
    }

    if !loc.domain.shared.plists.create_intermediate_group(lcpl)? {
        return Err(RestError::Path(format!(
            "can't locate parent group '{dir}' and intermediate group creation is disabled"
        )));
    }

    tracing::info!("creating intermediate group '{}'", dir);
    let intermediate = Group::create_at(
        loc,
        Some(dir),
        lcpl,
        PlistId::DEFAULT,
        PlistId::DEFAULT,
    )?;
    if let Err(e) = intermediate.close() {
        tracing::warn!("closing intermediate group '{}': {}", dir, e);
    }

    match group_uri_for(loc, dir)? {
        Some(uri) => Ok((uri, base)),
        None => Err(RestError::Path(format!(
            "intermediate group '{dir}' can't be found after creating it"
        ))),
    }
}
