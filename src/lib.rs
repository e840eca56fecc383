//! A connector that maps a hierarchical file/group/dataset/attribute/link object model onto
//! an HSDS-style REST service.

pub mod attribute;
pub mod cache;
pub mod config;
pub mod connector;
pub mod dataset;
pub mod datatype;
pub mod error;
pub mod file;
pub mod group;
mod handle;
pub mod link;
pub mod object;
pub mod plist;
pub mod request;
pub mod resolver;
pub mod response;
pub mod transport;
pub mod types;
pub mod utils;

pub use attribute::{Attribute, AttributeGet, AttributeValue};
pub use cache::UriCache;
pub use config::{ConfigOverrides, ConnectionConfig};
pub use connector::Connector;
pub use dataset::{Dataset, DatasetGet, DatasetValue};
pub use datatype::{CommittedDatatype, DatatypeGet, DatatypeValue};
pub use error::{ProtocolError, RestError, Result};
pub use file::{CreateFlags, Domain, File, FileGet, FileInfo, Intent};
pub use group::{Group, GroupGet, GroupValue};
pub use handle::{Located, Location};
pub use object::{IterOrder, Locator, Object, ObjectKind};
pub use plist::{PlistClass, PlistId, PlistRegistry};
pub use transport::{HttpTransport, Method, RequestContext, Response, Transport};
pub use types::{ByteOrder, CharSet, Dataspace, Datatype, StrLength};
