use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::connector::{Connector, Shared};
use crate::error::{RestError, Result};
use crate::handle::{HandleState, Located, Location, construct};
use crate::object::ObjectKind;
use crate::plist::PlistId;
use crate::request::RequestBuilder;
use crate::response::{self, ServerVersion, parse_response};
use crate::transport::{RequestContext, Response, check_status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateFlags {
    /// Delete an existing domain of the same name first.
    pub truncate: bool,
    /// Fail if the domain already exists.
    pub exclusive: bool,
}

/// One open remote domain. Every handle opened under it holds one reference; the domain
/// is torn down when the last one is released.
pub struct Domain {
    pub(crate) shared: Arc<Shared>,
    path: String,
    intent: Intent,
    root_uri: String,
    version: ServerVersion,
    fcpl: PlistId,
    fapl: PlistId,
    ref_count: AtomicUsize,
}

impl Domain {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub fn server_version(&self) -> ServerVersion {
        self.version
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::SeqCst)
    }

    pub(crate) fn acquire(&self) -> usize {
        let count = self.ref_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!("domain '{}' ref count -> {}", self.path, count);
        count
    }

    /// Drops one reference and tears the domain down when it was the last. Releasing
    /// more references than were taken is an internal error.
    pub fn release(&self) -> Result<usize> {
        let previous = self
            .ref_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .map_err(|_| {
                RestError::Internal(format!(
                    "domain '{}' released more times than it was opened",
                    self.path
                ))
            })?;
        let count = previous - 1;
        tracing::debug!("domain '{}' ref count -> {}", self.path, count);
        if count == 0 {
            self.teardown()?;
        }
        Ok(count)
    }

    fn teardown(&self) -> Result<()> {
        let mut first_err = None;
        for id in [self.fcpl, self.fapl] {
            if let Err(e) = self.shared.plists.close(id) {
                tracing::warn!("closing domain '{}': {}", self.path, e);
                first_err.get_or_insert(e);
            }
        }
        tracing::info!("domain '{}' closed", self.path);
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) fn check_write_intent(&self) -> Result<()> {
        match self.intent {
            Intent::ReadWrite => Ok(()),
            Intent::ReadOnly => Err(RestError::PermissionDenied(self.path.clone())),
        }
    }

    pub(crate) fn request(&self) -> RequestBuilder<'_> {
        RequestBuilder::new(&self.shared.config, &self.path)
    }

    pub(crate) fn execute(&self, request: &RequestContext) -> Result<Response> {
        self.shared.execute(request)
    }

    pub(crate) fn perform(&self, request: &RequestContext) -> Result<Response> {
        self.shared.perform(request)
    }
}

/// An open file handle: the root group of a domain.
pub struct File {
    state: HandleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileGet {
    AccessPlist,
    CreatePlist,
    Intent,
    Name,
    ObjectCount,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileInfo {
    AccessPlist(PlistId),
    CreatePlist(PlistId),
    Intent(Intent),
    Name(String),
    ObjectCount(usize),
}

fn fetch_server_version(shared: &Shared, domain: &str) -> Result<ServerVersion> {
    let request = RequestBuilder::new(&shared.config, domain).get(&["about"], &[])?;
    let response = shared.perform(&request)?;
    if !response.is_success() {
        tracing::warn!(
            "server version request returned HTTP {}, assuming 0.0.0",
            response.status
        );
        return Ok(ServerVersion::default());
    }
    match parse_response(&response.body, response::server_version) {
        Ok(version) => Ok(version),
        Err(e) => {
            tracing::warn!("can't read server version ({}), assuming 0.0.0", e);
            Ok(ServerVersion::default())
        }
    }
}

impl File {
    pub fn create(
        connector: &Connector,
        name: &str,
        flags: CreateFlags,
        fcpl: PlistId,
        fapl: PlistId,
    ) -> Result<File> {
        if name.is_empty() {
            return Err(RestError::Argument("domain name was empty".to_string()));
        }
        let shared = &connector.shared;
        let rb = RequestBuilder::new(&shared.config, name);
        tracing::info!("creating domain '{}'", name);

        let version = fetch_server_version(shared, name)?;

        if flags.truncate || flags.exclusive {
            let existing = shared.perform(&rb.get(&[], &[])?)?;
            let exists = match existing.status {
                404 | 410 => false,
                status => {
                    check_status(status)?;
                    true
                }
            };
            if exists {
                if flags.exclusive {
                    return Err(RestError::Argument(format!(
                        "domain '{name}' already exists"
                    )));
                }
                tracing::info!("domain '{}' exists and truncate was requested; deleting it", name);
                shared.execute(&rb.delete(&[])?)?;
            }
        }

        let response = shared.execute(&rb.put(&[], None)?)?;
        let root = parse_response(&response.body, response::copy_object_uri)?
            .ok_or_else(|| RestError::Internal("domain create returned no root URI".to_string()))?;

        Self::attach_new(shared, name, Intent::ReadWrite, root, version, fcpl, fapl)
    }

    pub fn open(connector: &Connector, name: &str, intent: Intent, fapl: PlistId) -> Result<File> {
        if name.is_empty() {
            return Err(RestError::Argument("domain name was empty".to_string()));
        }
        let shared = &connector.shared;
        Self::open_shared(shared, name, intent, fapl)
    }

    pub(crate) fn open_shared(
        shared: &Arc<Shared>,
        name: &str,
        intent: Intent,
        fapl: PlistId,
    ) -> Result<File> {
        tracing::info!("opening domain '{}'", name);
        let version = fetch_server_version(shared, name)?;
        let rb = RequestBuilder::new(&shared.config, name);
        let response = shared.execute(&rb.get(&[], &[])?)?;
        let root = parse_response(&response.body, response::copy_object_uri)?
            .ok_or_else(|| RestError::Internal("domain open returned no root URI".to_string()))?;

        Self::attach_new(shared, name, intent, root, version, PlistId::DEFAULT, fapl)
    }

    fn attach_new(
        shared: &Arc<Shared>,
        name: &str,
        intent: Intent,
        root: String,
        version: ServerVersion,
        fcpl: PlistId,
        fapl: PlistId,
    ) -> Result<File> {
        let fcpl = shared.plists.copy(fcpl)?;
        let fapl = match shared.plists.copy(fapl) {
            Ok(fapl) => fapl,
            Err(e) => {
                if let Err(cleanup) = shared.plists.close(fcpl) {
                    tracing::warn!("releasing creation properties for '{}': {}", name, cleanup);
                }
                return Err(e);
            }
        };
        let domain = Arc::new(Domain {
            shared: shared.clone(),
            path: name.to_string(),
            intent,
            root_uri: root.clone(),
            version,
            fcpl,
            fapl,
            ref_count: AtomicUsize::new(0),
        });

        let state = construct(HandleState::new(ObjectKind::File, &domain), |state| {
            state.attach(&domain)?;
            state.path = Some("/".to_string());
            state.populate(root)
        })?;
        tracing::info!(
            "domain '{}' ready (root {}, server {})",
            name,
            domain.root_uri,
            version
        );
        Ok(File { state })
    }

    /// Another handle on the same domain.
    pub fn reopen(&self) -> Result<File> {
        let domain = self.state.domain.clone();
        let state = construct(HandleState::new(ObjectKind::File, &domain), |state| {
            state.attach(&domain)?;
            state.path = Some("/".to_string());
            state.populate(domain.root_uri.clone())
        })?;
        Ok(File { state })
    }

    pub fn delete(connector: &Connector, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(RestError::Argument("domain name was empty".to_string()));
        }
        let shared = &connector.shared;
        let rb = RequestBuilder::new(&shared.config, name);
        shared.execute(&rb.delete(&[])?)?;
        tracing::info!("deleted domain '{}'", name);
        Ok(())
    }

    pub fn get(&self, query: FileGet) -> Result<FileInfo> {
        let domain = &self.state.domain;
        let plists = &domain.shared.plists;
        Ok(match query {
            FileGet::AccessPlist => FileInfo::AccessPlist(plists.copy(domain.fapl)?),
            FileGet::CreatePlist => FileInfo::CreatePlist(plists.copy(domain.fcpl)?),
            FileGet::Intent => FileInfo::Intent(domain.intent),
            FileGet::Name => FileInfo::Name(domain.path.clone()),
            FileGet::ObjectCount => {
                FileInfo::ObjectCount(domain.shared.cache.count_in_domain(&domain.path))
            }
        })
    }

    pub fn domain(&self) -> &Arc<Domain> {
        &self.state.domain
    }

    pub fn uri(&self) -> &str {
        &self.state.uri
    }

    pub fn close(mut self) -> Result<()> {
        tracing::debug!("closing file handle on '{}'", self.state.domain.path);
        self.state.close()
    }
}

impl Located for File {
    fn location(&self) -> Location<'_> {
        self.state.location()
    }
}
