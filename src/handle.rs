//! The lifecycle every object handle shares.
//!
//! A handle is allocated empty, attached to its domain (taking a reference), populated with
//! its URI (which registers it in the URI cache), and finally closed. Closing works on a
//! handle in any of those states, so a failed construction is torn down by the same routine
//! as a normal close.

use std::sync::Arc;

use crate::error::{RestError, Result};
use crate::file::Domain;
use crate::object::ObjectKind;
use crate::plist::PlistId;

pub(crate) struct HandleState {
    pub(crate) kind: ObjectKind,
    pub(crate) domain: Arc<Domain>,
    /// Empty until the first successful create/open response.
    pub(crate) uri: String,
    pub(crate) path: Option<String>,
    pub(crate) creation_plist: PlistId,
    pub(crate) access_plist: PlistId,
    attached: bool,
    registered: bool,
}

impl HandleState {
    pub(crate) fn new(kind: ObjectKind, domain: &Arc<Domain>) -> Self {
        Self {
            kind,
            domain: domain.clone(),
            uri: String::new(),
            path: None,
            creation_plist: PlistId::DEFAULT,
            access_plist: PlistId::DEFAULT,
            attached: false,
            registered: false,
        }
    }

    /// Takes a reference on `domain` for the lifetime of this handle.
    pub(crate) fn attach(&mut self, domain: &Arc<Domain>) -> Result<()> {
        if self.attached {
            return Err(RestError::Internal(format!(
                "{} handle is already attached to domain '{}'",
                self.kind,
                self.domain.path()
            )));
        }
        domain.acquire();
        self.domain = domain.clone();
        self.attached = true;
        Ok(())
    }

    /// Copies the caller's property lists so later queries don't depend on the caller
    /// keeping theirs open. Defaults stay defaults.
    pub(crate) fn adopt_plists(&mut self, creation: PlistId, access: PlistId) -> Result<()> {
        let plists = &self.domain.shared.plists;
        self.creation_plist = plists.copy(creation)?;
        self.access_plist = plists.copy(access)?;
        Ok(())
    }

    /// Sets the URI and registers the handle in the cache. Happens exactly once.
    pub(crate) fn populate(&mut self, uri: String) -> Result<()> {
        if self.registered || !self.uri.is_empty() {
            return Err(RestError::Internal(format!(
                "{} handle '{}' populated twice",
                self.kind, self.uri
            )));
        }
        if !self.attached {
            return Err(RestError::Internal(format!(
                "{} handle populated before being attached to a domain",
                self.kind
            )));
        }
        self.uri = uri;
        self.domain
            .shared
            .cache
            .insert(self.kind, &self.uri, self.domain.path())?;
        self.registered = true;
        Ok(())
    }

    /// Releases property lists, leaves the cache, drops the domain reference and forgets
    /// the path, in that order. Every step runs; the first failure is returned.
    pub(crate) fn close(&mut self) -> Result<()> {
        let mut first_err: Option<RestError> = None;
        let mut record = |step: &str, res: Result<()>| {
            if let Err(e) = res {
                tracing::warn!("closing {} '{}': {} failed: {}", self.kind, self.uri, step, e);
                first_err.get_or_insert(e);
            }
        };

        let plists = &self.domain.shared.plists;
        for id in [&mut self.creation_plist, &mut self.access_plist] {
            if !id.is_default() {
                record("property list release", plists.close(*id));
                *id = PlistId::DEFAULT;
            }
        }

        if self.registered {
            record(
                "cache removal",
                self.domain.shared.cache.remove(self.kind, &self.uri),
            );
            self.registered = false;
        }

        if self.attached {
            record("domain release", self.domain.release().map(|_| ()));
            self.attached = false;
        }

        self.path = None;

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn location(&self) -> Location<'_> {
        Location {
            domain: &self.domain,
            uri: &self.uri,
            kind: self.kind,
            path: self.path.as_deref(),
        }
    }
}

/// Runs `init` against a fresh handle. If it fails, the half-built handle goes through the
/// normal close routine before the original error is returned.
pub(crate) fn construct<F>(mut state: HandleState, init: F) -> Result<HandleState>
where
    F: FnOnce(&mut HandleState) -> Result<()>,
{
    match init(&mut state) {
        Ok(()) => Ok(state),
        Err(e) => {
            tracing::debug!("{} construction failed: {}", state.kind, e);
            if let Err(cleanup) = state.close() {
                tracing::warn!("cleanup after failed {} construction: {}", state.kind, cleanup);
            }
            Err(e)
        }
    }
}

/// Where a lookup or create starts from: an open file, group, dataset, or datatype.
#[derive(Clone, Copy)]
pub struct Location<'a> {
    pub(crate) domain: &'a Arc<Domain>,
    pub(crate) uri: &'a str,
    pub(crate) kind: ObjectKind,
    pub(crate) path: Option<&'a str>,
}

impl<'a> Location<'a> {
    pub fn domain(&self) -> &'a Arc<Domain> {
        self.domain
    }

    pub fn uri(&self) -> &'a str {
        self.uri
    }

    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    pub fn path(&self) -> Option<&'a str> {
        self.path
    }

    pub(crate) fn require_location(&self) -> Result<()> {
        if !self.kind.is_location() {
            return Err(RestError::Argument(format!(
                "parent object is a {}, not a file, group, dataset or datatype",
                self.kind
            )));
        }
        Ok(())
    }

    pub(crate) fn require_container(&self) -> Result<()> {
        if !self.kind.is_container() {
            return Err(RestError::Argument(format!(
                "parent object is a {}, not a file or group",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Handles that can act as a starting point for lookups.
pub trait Located {
    fn location(&self) -> Location<'_>;
}
