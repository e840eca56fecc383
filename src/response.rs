//! Response interpretation: parse a body, walk to a key path, type-check, extract.
//!
//! Every call site passes a small extractor closure to [`parse_response`]; the parsed tree
//! only lives for the duration of that call, so extractors copy out what they keep.

use serde_json::Value;
use time::OffsetDateTime;

use crate::error::{ProtocolError, RestError, Result};
use crate::object::ObjectKind;
use crate::types::{Dataspace, Datatype};

pub const URI_MAX_LENGTH: usize = 256;

pub fn parse_response<T, F>(body: &[u8], extract: F) -> Result<T>
where
    F: FnOnce(&Value) -> Result<T>,
{
    if body.is_empty() {
        return Err(ProtocolError::Parse("response buffer was empty".to_string()).into());
    }
    let doc: Value = serde_json::from_slice(body)?;
    extract(&doc)
}

/// Walks `keys` from the document root.
pub fn lookup<'a>(doc: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().try_fold(doc, |node, key| node.get(key))
}

fn key_path(keys: &[&str]) -> String {
    keys.join(".")
}

fn require<'a>(doc: &'a Value, keys: &[&str]) -> Result<&'a Value> {
    lookup(doc, keys).ok_or_else(|| ProtocolError::MissingKey(key_path(keys)).into())
}

pub fn get_str<'a>(doc: &'a Value, keys: &[&str]) -> Result<&'a str> {
    require(doc, keys)?
        .as_str()
        .ok_or_else(|| wrong_type(keys, "a string"))
}

pub fn get_opt_str<'a>(doc: &'a Value, keys: &[&str]) -> Result<Option<&'a str>> {
    match lookup(doc, keys) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(wrong_type(keys, "a string")),
    }
}

/// An integer that must not be negative.
pub fn get_count(doc: &Value, keys: &[&str]) -> Result<u64> {
    let node = require(doc, keys)?;
    if let Some(n) = node.as_u64() {
        return Ok(n);
    }
    match node.as_i64() {
        Some(_) => Err(ProtocolError::OutOfRange {
            key: key_path(keys),
            reason: "was negative".to_string(),
        }
        .into()),
        None => Err(wrong_type(keys, "an integer")),
    }
}

/// Seconds since the epoch, sent as a float.
pub fn get_opt_timestamp(doc: &Value, keys: &[&str]) -> Result<Option<OffsetDateTime>> {
    let Some(node) = lookup(doc, keys) else {
        return Ok(None);
    };
    let secs = node.as_f64().ok_or_else(|| wrong_type(keys, "a number"))?;
    let nanos = (secs * 1e9) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .map(Some)
        .map_err(|e| {
            ProtocolError::OutOfRange {
                key: key_path(keys),
                reason: e.to_string(),
            }
            .into()
        })
}

fn wrong_type(keys: &[&str], expected: &'static str) -> RestError {
    ProtocolError::WrongType {
        key: key_path(keys),
        expected,
    }
    .into()
}

fn checked_uri(keys: &[&str], uri: &str) -> Result<String> {
    if uri.is_empty() || uri.len() >= URI_MAX_LENGTH {
        return Err(ProtocolError::OutOfRange {
            key: key_path(keys),
            reason: format!("has length {} (limit {})", uri.len(), URI_MAX_LENGTH - 1),
        }
        .into());
    }
    Ok(uri.to_string())
}

// --- Extractors ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkClass {
    Hard,
    Soft,
    External,
    UserDefined,
}

impl LinkClass {
    fn parse(raw: &str) -> Result<Self> {
        match raw {
            "H5L_TYPE_HARD" => Ok(LinkClass::Hard),
            "H5L_TYPE_SOFT" => Ok(LinkClass::Soft),
            "H5L_TYPE_EXTERNAL" => Ok(LinkClass::External),
            "H5L_TYPE_UD" => Ok(LinkClass::UserDefined),
            other => Err(ProtocolError::OutOfRange {
                key: "link.class".to_string(),
                reason: format!("has invalid link class '{other}'"),
            }
            .into()),
        }
    }
}

/// The object URI in a create or lookup response. Tries `link.id`, then `id`, then `root`.
/// A soft, external or user-defined link has no target URI, which is not an error.
pub fn copy_object_uri(doc: &Value) -> Result<Option<String>> {
    if let Some(class) = get_opt_str(doc, &["link", "class"])? {
        if LinkClass::parse(class)? != LinkClass::Hard {
            return Ok(None);
        }
    }

    for keys in [&["link", "id"][..], &["id"][..], &["root"][..]] {
        if let Some(uri) = get_opt_str(doc, keys)? {
            return checked_uri(keys, uri).map(Some);
        }
    }
    Err(ProtocolError::MissingKey("id".to_string()).into())
}

/// A resolved object location: its URI, the domain it lives in when the server says so,
/// and its encoded creation properties when the server sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocInfo {
    pub uri: String,
    pub domain: Option<String>,
    pub creation_properties: Option<String>,
}

pub fn loc_info(doc: &Value) -> Result<LocInfo> {
    let uri = copy_object_uri(doc)?
        .ok_or_else(|| ProtocolError::MissingKey("link.id".to_string()))?;
    Ok(LocInfo {
        uri,
        domain: get_opt_str(doc, &["domain"])?.map(str::to_string),
        creation_properties: get_opt_str(doc, &["creationProperties"])?.map(str::to_string),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('.').map(|p| {
            p.chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u32>()
                .ok()
        });
        let major = parts.next()??;
        let minor = parts.next().flatten().unwrap_or(0);
        let patch = parts.next().flatten().unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }

    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        *self >= Self::new(major, minor, patch)
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Missing or unparseable versions read as 0.0.0.
pub fn server_version(doc: &Value) -> Result<ServerVersion> {
    Ok(get_opt_str(doc, &["version"])
        .ok()
        .flatten()
        .and_then(ServerVersion::parse)
        .unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupInfo {
    pub link_count: u64,
    pub attribute_count: Option<u64>,
    pub created: Option<OffsetDateTime>,
    pub last_modified: Option<OffsetDateTime>,
}

pub fn group_info(doc: &Value) -> Result<GroupInfo> {
    let attribute_count = match lookup(doc, &["attributeCount"]) {
        Some(_) => Some(get_count(doc, &["attributeCount"])?),
        None => None,
    };
    Ok(GroupInfo {
        link_count: get_count(doc, &["linkCount"])?,
        attribute_count,
        created: get_opt_timestamp(doc, &["created"])?,
        last_modified: get_opt_timestamp(doc, &["lastModified"])?,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkValue {
    Hard { uri: String, kind: ObjectKind },
    Soft { path: String },
    External { domain: String, path: String },
    UserDefined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinkInfo {
    pub name: Option<String>,
    pub class: LinkClass,
    pub value: LinkValue,
    pub created: Option<OffsetDateTime>,
}

/// Reads one link object (the value under `link` in a single-link response, or one element
/// of a `links` array).
pub fn link_from_json(link: &Value) -> Result<LinkInfo> {
    let class = LinkClass::parse(get_str(link, &["class"])?)?;
    let value = match class {
        LinkClass::Hard => {
            let uri = checked_uri(&["link", "id"], get_str(link, &["id"])?)?;
            let collection = get_str(link, &["collection"])?;
            let kind = ObjectKind::from_collection(collection).ok_or_else(|| {
                RestError::from(ProtocolError::OutOfRange {
                    key: "link.collection".to_string(),
                    reason: format!("names unknown collection '{collection}'"),
                })
            })?;
            LinkValue::Hard { uri, kind }
        }
        LinkClass::Soft => LinkValue::Soft {
            path: get_str(link, &["h5path"])?.to_string(),
        },
        LinkClass::External => LinkValue::External {
            domain: get_str(link, &["h5domain"])?.to_string(),
            path: get_str(link, &["h5path"])?.to_string(),
        },
        LinkClass::UserDefined => LinkValue::UserDefined,
    };
    Ok(LinkInfo {
        name: get_opt_str(link, &["title"])?.map(str::to_string),
        class,
        value,
        created: get_opt_timestamp(link, &["created"])?,
    })
}

pub fn link_info(doc: &Value) -> Result<LinkInfo> {
    let mut info = link_from_json(require(doc, &["link"])?)?;
    if info.created.is_none() {
        info.created = get_opt_timestamp(doc, &["created"])?;
    }
    Ok(info)
}

pub fn link_list(doc: &Value) -> Result<Vec<LinkInfo>> {
    require(doc, &["links"])?
        .as_array()
        .ok_or_else(|| wrong_type(&["links"], "an array"))?
        .iter()
        .map(link_from_json)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub datatype: Datatype,
    pub dataspace: Dataspace,
    pub created: Option<OffsetDateTime>,
}

pub fn attribute_info(doc: &Value) -> Result<AttributeInfo> {
    Ok(AttributeInfo {
        name: get_str(doc, &["name"])?.to_string(),
        datatype: Datatype::from_json(require(doc, &["type"])?)?,
        dataspace: Dataspace::from_json(require(doc, &["shape"])?)?,
        created: get_opt_timestamp(doc, &["created"])?,
    })
}

pub fn attribute_names(doc: &Value) -> Result<Vec<String>> {
    require(doc, &["attributes"])?
        .as_array()
        .ok_or_else(|| wrong_type(&["attributes"], "an array"))?
        .iter()
        .map(|a| get_str(a, &["name"]).map(str::to_string))
        .collect()
}

pub fn datatype_of(doc: &Value) -> Result<Datatype> {
    Datatype::from_json(require(doc, &["type"])?)
}

pub fn dataspace_of(doc: &Value) -> Result<Dataspace> {
    Dataspace::from_json(require(doc, &["shape"])?)
}
