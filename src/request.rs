//! Request construction: endpoint URLs, headers, and hand-built JSON bodies.
//!
//! Bodies are produced from `%s` templates. Every variable field is escaped first, the
//! output is sized up front as `template + fields + 1`, and the finished body is checked
//! against that size before it is handed to the transport.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use crate::config::ConnectionConfig;
use crate::error::{RestError, Result};
use crate::plist::{PlistClass, PlistId, PlistRegistry};
use crate::transport::{Method, RequestContext};

pub const DOMAIN_HEADER: &str = "X-Hdf-domain";
pub const URL_MAX_LENGTH: usize = 2048;

const PLACEHOLDER: &str = "%s";

// --- JSON escaping ---

fn escaped_char_len(c: char) -> usize {
    match c {
        '"' | '\\' | '\n' | '\r' | '\t' | '\u{08}' | '\u{0c}' => 2,
        c if (c as u32) < 0x20 => 6,
        c => c.len_utf8(),
    }
}

/// Number of bytes `json_escape` will produce for `input`.
pub fn json_escaped_len(input: &str) -> usize {
    input.chars().map(escaped_char_len).sum()
}

/// Escapes `input` for embedding between the quotes of a JSON string.
pub fn json_escape(input: &str) -> Result<String> {
    let size = json_escaped_len(input);
    let mut out = String::with_capacity(size);

    for c in input.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }

    if out.len() != size {
        return Err(RestError::Encoding(format!(
            "JSON escaping produced {} bytes but {} were computed",
            out.len(),
            size
        )));
    }
    Ok(out)
}

// --- Body templates ---

/// Fills each `%s` in `template` with the next field. Fields are inserted verbatim, so
/// callers escape them first.
pub fn fill_template(template: &str, fields: &[&str]) -> Result<String> {
    let placeholders = template.matches(PLACEHOLDER).count();
    if placeholders != fields.len() {
        return Err(RestError::Internal(format!(
            "body template expects {} fields but {} were supplied",
            placeholders,
            fields.len()
        )));
    }

    let nalloc = template.len() + fields.iter().map(|f| f.len()).sum::<usize>() + 1;
    let mut body = String::with_capacity(nalloc);

    let mut pieces = template.split(PLACEHOLDER);
    if let Some(first) = pieces.next() {
        body.push_str(first);
    }
    for (piece, field) in pieces.zip(fields) {
        body.push_str(field);
        body.push_str(piece);
    }

    if body.len() >= nalloc {
        return Err(RestError::Internal(
            "request body size exceeded allocated buffer size".to_string(),
        ));
    }
    Ok(body)
}

/// Where a newly created object gets linked in.
#[derive(Debug, Clone, Copy)]
pub struct LinkTarget<'a> {
    pub parent_uri: &'a str,
    pub name: &'a str,
}

fn link_fragment(link: LinkTarget<'_>) -> Result<String> {
    let parent = json_escape(link.parent_uri)?;
    let name = json_escape(link.name)?;
    fill_template(r#""link": {"id": "%s", "name": "%s"}"#, &[&parent, &name])
}

pub fn group_create_body(link: Option<LinkTarget<'_>>, gcpl_base64: &str) -> Result<String> {
    match link {
        Some(link) => {
            let link = link_fragment(link)?;
            fill_template(
                r#"{%s, "creationProperties": "%s"}"#,
                &[&link, gcpl_base64],
            )
        }
        None => fill_template(r#"{"creationProperties": "%s"}"#, &[gcpl_base64]),
    }
}

/// `type_json` and `shape_fragment` are already-serialised JSON.
pub fn dataset_create_body(
    type_json: &str,
    shape_fragment: &str,
    link: Option<LinkTarget<'_>>,
    dcpl_base64: &str,
) -> Result<String> {
    match link {
        Some(link) => {
            let link = link_fragment(link)?;
            fill_template(
                r#"{"type": %s%s, %s, "creationProperties": "%s"}"#,
                &[type_json, shape_fragment, &link, dcpl_base64],
            )
        }
        None => fill_template(
            r#"{"type": %s%s, "creationProperties": "%s"}"#,
            &[type_json, shape_fragment, dcpl_base64],
        ),
    }
}

pub fn datatype_commit_body(
    type_json: &str,
    link: Option<LinkTarget<'_>>,
    tcpl_base64: &str,
) -> Result<String> {
    match link {
        Some(link) => {
            let link = link_fragment(link)?;
            fill_template(
                r#"{"type": %s, %s, "creationProperties": "%s"}"#,
                &[type_json, &link, tcpl_base64],
            )
        }
        None => fill_template(
            r#"{"type": %s, "creationProperties": "%s"}"#,
            &[type_json, tcpl_base64],
        ),
    }
}

pub fn attribute_create_body(type_json: &str, shape_fragment: &str) -> Result<String> {
    fill_template(r#"{"type": %s%s}"#, &[type_json, shape_fragment])
}

/// The link payload by kind, before it is optionally wrapped under its name.
#[derive(Debug, Clone)]
pub enum LinkPayload<'a> {
    Hard { target_uri: &'a str },
    Soft { target_path: &'a str },
    External { domain: &'a str, target_path: &'a str },
}

pub fn link_create_body(payload: &LinkPayload<'_>, titled_name: Option<&str>) -> Result<String> {
    let inner = match payload {
        LinkPayload::Hard { target_uri } => {
            fill_template(r#"{"id": "%s"}"#, &[&json_escape(target_uri)?])?
        }
        LinkPayload::Soft { target_path } => {
            fill_template(r#"{"h5path": "%s"}"#, &[&json_escape(target_path)?])?
        }
        LinkPayload::External {
            domain,
            target_path,
        } => fill_template(
            r#"{"h5domain": "%s", "h5path": "%s"}"#,
            &[&json_escape(domain)?, &json_escape(target_path)?],
        )?,
    };

    match titled_name {
        Some(name) => fill_template(r#"{"links": {"%s": %s}}"#, &[&json_escape(name)?, &inner]),
        None => Ok(inner),
    }
}

// --- Property list payloads ---

/// Serialises a property list through the registry and base64-encodes the bytes.
pub fn encode_plist(plists: &PlistRegistry, id: PlistId, class: PlistClass) -> Result<String> {
    let bytes = plists.encode(id, class)?;
    Ok(STANDARD.encode(bytes))
}

pub fn decode_plist_bytes(encoded: &str) -> Result<Vec<u8>> {
    Ok(STANDARD.decode(encoded.as_bytes())?)
}

// --- URLs and headers ---

/// Builds `{endpoint}/{segments...}?{query...}`. Segments are percent-encoded individually.
pub fn endpoint_url(endpoint: &str, segments: &[&str], query: &[(&str, &str)]) -> Result<Url> {
    let mut url = Url::parse(endpoint)?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            RestError::Argument(format!("endpoint '{endpoint}' cannot be used as a base URL"))
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (k, v) in query {
            pairs.append_pair(k, v);
        }
    }

    if url.as_str().len() >= URL_MAX_LENGTH {
        return Err(RestError::Internal(format!(
            "request URL size exceeded maximum URL size ({URL_MAX_LENGTH})"
        )));
    }
    Ok(url)
}

/// Builds requests addressed to one domain on one server.
pub struct RequestBuilder<'a> {
    config: &'a ConnectionConfig,
    domain_path: &'a str,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(config: &'a ConnectionConfig, domain_path: &'a str) -> Self {
        Self {
            config,
            domain_path,
        }
    }

    pub fn build(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> Result<RequestContext> {
        let url = endpoint_url(&self.config.endpoint, segments, query)?;

        let mut headers = vec![(DOMAIN_HEADER.to_string(), self.domain_path.to_string())];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }

        let basic_auth = self
            .config
            .username
            .as_ref()
            .map(|u| (u.clone(), self.config.password.clone()));

        Ok(RequestContext {
            method,
            url,
            headers,
            body: body.map(String::into_bytes).unwrap_or_default(),
            basic_auth,
        })
    }

    pub fn get(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<RequestContext> {
        self.build(Method::Get, segments, query, None)
    }

    pub fn delete(&self, segments: &[&str]) -> Result<RequestContext> {
        self.build(Method::Delete, segments, &[], None)
    }

    pub fn put(&self, segments: &[&str], body: Option<String>) -> Result<RequestContext> {
        self.build(Method::Put, segments, &[], body)
    }

    pub fn post(&self, segments: &[&str], body: String) -> Result<RequestContext> {
        self.build(Method::Post, segments, &[], Some(body))
    }
}
