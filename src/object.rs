use std::fmt;

use crate::dataset::Dataset;
use crate::datatype::CommittedDatatype;
use crate::error::{RestError, Result};
use crate::group::Group;
use crate::handle::{Located, Location};
use crate::plist::PlistId;
use crate::resolver::find_object_by_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    File,
    Group,
    Dataset,
    Attribute,
    Datatype,
    Link,
    /// Not known yet; the resolver finds out from the parent's link.
    Unknown,
}

impl ObjectKind {
    /// The server collection that stores objects of this kind.
    pub fn collection(&self) -> Option<&'static str> {
        match self {
            ObjectKind::File | ObjectKind::Group => Some("groups"),
            ObjectKind::Dataset => Some("datasets"),
            ObjectKind::Datatype => Some("datatypes"),
            _ => None,
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        match collection {
            "groups" => Some(ObjectKind::Group),
            "datasets" => Some(ObjectKind::Dataset),
            "datatypes" => Some(ObjectKind::Datatype),
            _ => None,
        }
    }

    /// Kinds that can hold links or attributes and so act as a lookup start.
    pub fn is_location(&self) -> bool {
        matches!(
            self,
            ObjectKind::File | ObjectKind::Group | ObjectKind::Dataset | ObjectKind::Datatype
        )
    }

    pub fn is_container(&self) -> bool {
        matches!(self, ObjectKind::File | ObjectKind::Group)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjectKind::File => "file",
            ObjectKind::Group => "group",
            ObjectKind::Dataset => "dataset",
            ObjectKind::Attribute => "attribute",
            ObjectKind::Datatype => "datatype",
            ObjectKind::Link => "link",
            ObjectKind::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterOrder {
    #[default]
    Name,
    Creation,
}

/// How an operation finds its target relative to the handle it was invoked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locator<'a> {
    BySelf,
    ByName(&'a str),
    ByIndex {
        group_path: &'a str,
        index: u64,
        order: IterOrder,
    },
}

/// An object opened by path without knowing its kind in advance.
pub enum Object {
    Group(Group),
    Dataset(Dataset),
    Datatype(CommittedDatatype),
}

impl Object {
    pub fn open(loc: &impl Located, path: &str) -> Result<Object> {
        let loc = loc.location();
        let resolved = find_object_by_path(loc, path, ObjectKind::Unknown)?
            .ok_or_else(|| RestError::Path(format!("can't locate object '{path}'")))?;
        tracing::debug!("'{}' resolved to {} '{}'", path, resolved.kind, resolved.uri);

        match resolved.kind {
            ObjectKind::Group | ObjectKind::File => Ok(Object::Group(Group::from_resolved(
                loc,
                path,
                resolved,
                PlistId::DEFAULT,
            )?)),
            ObjectKind::Dataset => Ok(Object::Dataset(Dataset::from_resolved(
                loc,
                path,
                resolved,
                PlistId::DEFAULT,
            )?)),
            ObjectKind::Datatype => Ok(Object::Datatype(CommittedDatatype::from_resolved(
                loc,
                path,
                resolved,
                PlistId::DEFAULT,
            )?)),
            other => {
                let mut resolved = resolved;
                resolved.release_external();
                Err(RestError::Unsupported(format!("opening a {other} by path")))
            }
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Group(_) => ObjectKind::Group,
            Object::Dataset(_) => ObjectKind::Dataset,
            Object::Datatype(_) => ObjectKind::Datatype,
        }
    }

    pub fn uri(&self) -> &str {
        match self {
            Object::Group(g) => g.uri(),
            Object::Dataset(d) => d.uri(),
            Object::Datatype(t) => t.uri(),
        }
    }

    pub fn close(self) -> Result<()> {
        match self {
            Object::Group(g) => g.close(),
            Object::Dataset(d) => d.close(),
            Object::Datatype(t) => t.close(),
        }
    }
}

impl Located for Object {
    fn location(&self) -> Location<'_> {
        match self {
            Object::Group(g) => g.location(),
            Object::Dataset(d) => d.location(),
            Object::Datatype(t) => t.location(),
        }
    }
}
