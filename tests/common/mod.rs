#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use hsds_vol::{ConnectionConfig, Connector, Method, RequestContext, Response, RestError, Transport};
use serde_json::{Value, json};

pub const ENDPOINT: &str = "http://hsds.test:5101";

// ==========================================================================================
//  In-memory HSDS
//
//  Enough of the service to drive the connector end to end: domains, groups, datasets,
//  committed datatypes, links and attributes. URIs come from per-kind counters, so the
//  first group created is always "g-1". Faults can be injected per method and path prefix.
// ==========================================================================================

#[derive(Debug, Clone)]
enum MockLink {
    Hard { id: String, collection: String },
    Soft { path: String },
    External { domain: String, path: String },
}

#[derive(Debug, Clone)]
struct LinkEntry {
    link: MockLink,
    created: f64,
}

#[derive(Debug, Clone)]
struct MockObject {
    collection: String,
    domain: String,
    links: BTreeMap<String, LinkEntry>,
    attributes: BTreeMap<String, Value>,
    type_json: Option<Value>,
    shape: Option<Value>,
    creation_properties: Option<String>,
    created: f64,
}

#[derive(Debug, Clone, Copy)]
pub enum Fault {
    Transport,
    Status(u16),
}

struct Rule {
    method: Method,
    path_prefix: String,
    exact: bool,
    fault: Fault,
    remaining: Option<usize>,
}

impl Rule {
    fn matches(&self, method: Method, path: &str) -> bool {
        self.method == method
            && if self.exact {
                path == self.path_prefix
            } else {
                path.starts_with(&self.path_prefix)
            }
    }
}

struct State {
    version: String,
    domains: HashMap<String, String>,
    objects: HashMap<String, MockObject>,
    counters: HashMap<&'static str, u64>,
    clock: f64,
    rules: Vec<Rule>,
    log: Vec<String>,
}

pub struct MockHsds {
    state: Mutex<State>,
}

impl MockHsds {
    pub fn new() -> Arc<Self> {
        Self::with_version("0.8.6")
    }

    pub fn with_version(version: &str) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                version: version.to_string(),
                domains: HashMap::new(),
                objects: HashMap::new(),
                counters: HashMap::new(),
                clock: 1_700_000_000.0,
                rules: Vec::new(),
                log: Vec::new(),
            }),
        })
    }

    /// Every matching request fails until `clear_faults` is called.
    pub fn fail(&self, method: Method, path_prefix: &str, fault: Fault) {
        self.state.lock().unwrap().rules.push(Rule {
            method,
            path_prefix: path_prefix.to_string(),
            exact: false,
            fault,
            remaining: None,
        });
    }

    pub fn fail_once(&self, method: Method, path_prefix: &str, fault: Fault) {
        self.state.lock().unwrap().rules.push(Rule {
            method,
            path_prefix: path_prefix.to_string(),
            exact: false,
            fault,
            remaining: Some(1),
        });
    }

    /// Like `fail_once`, but only for a request to exactly `path`.
    pub fn fail_path_once(&self, method: Method, path: &str, fault: Fault) {
        self.state.lock().unwrap().rules.push(Rule {
            method,
            path_prefix: path.to_string(),
            exact: true,
            fault,
            remaining: Some(1),
        });
    }

    pub fn clear_faults(&self) {
        self.state.lock().unwrap().rules.clear();
    }

    /// `"METHOD /path"` for every request seen, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn count_requests(&self, prefix: &str) -> usize {
        self.requests().iter().filter(|r| r.starts_with(prefix)).count()
    }

    pub fn has_domain(&self, name: &str) -> bool {
        self.state.lock().unwrap().domains.contains_key(name)
    }

    /// Groups in `domain`, the root included.
    pub fn group_count(&self, domain: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .objects
            .values()
            .filter(|o| o.collection == "groups" && o.domain == domain)
            .count()
    }

    pub fn link_names(&self, group_uri: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(group_uri)
            .map(|o| o.links.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Follows hard links from the root of `domain`.
    pub fn uri_at(&self, domain: &str, path: &str) -> Option<String> {
        let st = self.state.lock().unwrap();
        let root = st.domains.get(domain)?.clone();
        st.walk(&root, path)
    }

    /// Adds a hard link named `name` in `group_uri` to `target_uri`, whichever domain
    /// the target belongs to.
    pub fn graft(&self, group_uri: &str, name: &str, target_uri: &str) {
        let mut st = self.state.lock().unwrap();
        let created = st.tick();
        let collection = st.objects[target_uri].collection.clone();
        st.objects.get_mut(group_uri).unwrap().links.insert(
            name.to_string(),
            LinkEntry {
                link: MockLink::Hard {
                    id: target_uri.to_string(),
                    collection,
                },
                created,
            },
        );
    }

    pub fn creation_properties(&self, uri: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(uri)
            .and_then(|o| o.creation_properties.clone())
    }
}

impl Transport for MockHsds {
    fn perform(&self, request: &RequestContext) -> hsds_vol::Result<Response> {
        let mut st = self.state.lock().unwrap();
        let path = request.url.path().to_string();
        st.log.push(format!("{} {}", request.method.as_str(), path));

        if let Some(idx) = st
            .rules
            .iter()
            .position(|r| r.matches(request.method, &path))
        {
            let fault = st.rules[idx].fault;
            if let Some(n) = st.rules[idx].remaining.as_mut() {
                *n -= 1;
                if *n == 0 {
                    st.rules.remove(idx);
                }
            }
            return match fault {
                Fault::Transport => Err(RestError::Request("connection reset by peer".to_string())),
                Fault::Status(status) => Ok(Response::new(status, "{}")),
            };
        }

        let domain = request.header("X-Hdf-domain").unwrap_or("").to_string();
        let segments: Vec<String> = request
            .url
            .path_segments()
            .map(|s| s.map(percent_decode).collect())
            .unwrap_or_default();
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();
        let body: Value = if request.body.is_empty() {
            Value::Null
        } else {
            match serde_json::from_slice(&request.body) {
                Ok(v) => v,
                Err(e) => return Ok(Response::new(400, json!({"error": e.to_string()}).to_string())),
            }
        };

        let (status, reply) = st.route(request.method, &domain, &segments, &query, &body);
        Ok(Response::new(status, reply.to_string()))
    }
}

fn not_found() -> (u16, Value) {
    (404, json!({"error": "not found"}))
}

fn conflict() -> (u16, Value) {
    (409, json!({"error": "already exists"}))
}

fn bad_request(msg: &str) -> (u16, Value) {
    (400, json!({"error": msg}))
}

fn percent_decode(segment: &str) -> String {
    percent_encoding::percent_decode_str(segment)
        .decode_utf8_lossy()
        .into_owned()
}

fn shape_object(shape: Option<&Value>, maxdims: Option<&Value>) -> Value {
    match shape {
        None => json!({"class": "H5S_SCALAR"}),
        Some(Value::String(s)) if s == "H5S_NULL" => json!({"class": "H5S_NULL"}),
        Some(dims) => match maxdims {
            Some(m) => json!({"class": "H5S_SIMPLE", "dims": dims, "maxdims": m}),
            None => json!({"class": "H5S_SIMPLE", "dims": dims}),
        },
    }
}

impl State {
    fn tick(&mut self) -> f64 {
        self.clock += 1.0;
        self.clock
    }

    fn next_uri(&mut self, collection: &str) -> String {
        let prefix: &'static str = match collection {
            "groups" => "g",
            "datasets" => "d",
            "datatypes" => "t",
            _ => "r",
        };
        let n = self.counters.entry(prefix).or_insert(0);
        *n += 1;
        format!("{prefix}-{n}")
    }

    fn new_object(&mut self, collection: &str, domain: &str) -> MockObject {
        MockObject {
            collection: collection.to_string(),
            domain: domain.to_string(),
            links: BTreeMap::new(),
            attributes: BTreeMap::new(),
            type_json: None,
            shape: None,
            creation_properties: None,
            created: self.tick(),
        }
    }

    fn walk(&self, start: &str, path: &str) -> Option<String> {
        let mut current = start.to_string();
        for seg in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
            let obj = self.objects.get(&current)?;
            match &obj.links.get(seg)?.link {
                MockLink::Hard { id, .. } => current = id.clone(),
                _ => return None,
            }
        }
        Some(current)
    }

    fn route(
        &mut self,
        method: Method,
        domain: &str,
        segments: &[&str],
        query: &HashMap<String, String>,
        body: &Value,
    ) -> (u16, Value) {
        match (method, segments) {
            (Method::Get, ["about"]) => (200, json!({"version": self.version, "name": "mock"})),

            (Method::Put, [""]) => {
                if self.domains.contains_key(domain) {
                    return conflict();
                }
                let root = self.next_uri("root");
                let obj = self.new_object("groups", domain);
                self.objects.insert(root.clone(), obj);
                self.domains.insert(domain.to_string(), root.clone());
                (201, json!({"root": root, "domain": domain}))
            }
            (Method::Get, [""]) => match self.domains.get(domain) {
                Some(root) => (200, json!({"root": root, "domain": domain})),
                None => not_found(),
            },
            (Method::Delete, [""]) => match self.domains.remove(domain) {
                Some(_) => {
                    self.objects.retain(|_, o| o.domain != domain);
                    (200, json!({}))
                }
                None => not_found(),
            },

            (Method::Post, [collection]) => self.create_object(domain, collection, body),

            (Method::Get, [collection, id]) if query.contains_key("h5path") => {
                self.lookup(domain, collection, id, query)
            }
            (Method::Get, [collection, id]) => self.describe(collection, id),

            (Method::Put, ["groups", id, "links"]) => {
                let Some(links) = body.get("links").and_then(Value::as_object) else {
                    return bad_request("missing links");
                };
                for (name, link) in links {
                    let res = self.put_link(id, name, link);
                    if res.0 >= 300 {
                        return res;
                    }
                }
                (201, json!({}))
            }
            (Method::Put, ["groups", id, "links", name]) => self.put_link(id, name, body),
            (Method::Get, ["groups", id, "links", name]) => {
                let Some(entry) = self.objects.get(*id).and_then(|o| o.links.get(*name)) else {
                    return not_found();
                };
                (200, json!({"link": link_json(name, entry), "created": entry.created}))
            }
            (Method::Delete, ["groups", id, "links", name]) => {
                match self.objects.get_mut(*id).and_then(|o| o.links.remove(*name)) {
                    Some(_) => (200, json!({})),
                    None => not_found(),
                }
            }
            (Method::Get, ["groups", id, "links"]) => {
                let Some(obj) = self.objects.get(*id) else {
                    return not_found();
                };
                let mut entries: Vec<(&String, &LinkEntry)> = obj.links.iter().collect();
                if query.get("CreateOrder").map(String::as_str) == Some("1") {
                    entries.sort_by(|a, b| a.1.created.total_cmp(&b.1.created));
                }
                let links: Vec<Value> = entries.into_iter().map(|(n, e)| link_json(n, e)).collect();
                (200, json!({"links": links}))
            }

            (Method::Put, [collection, id, "attributes", name]) => {
                let created = self.tick();
                let Some(obj) = self.objects.get_mut(*id).filter(|o| o.collection == *collection)
                else {
                    return not_found();
                };
                if obj.attributes.contains_key(*name) {
                    return conflict();
                }
                let Some(type_json) = body.get("type") else {
                    return bad_request("missing type");
                };
                obj.attributes.insert(
                    name.to_string(),
                    json!({
                        "name": name,
                        "type": type_json,
                        "shape": shape_object(body.get("shape"), body.get("maxdims")),
                        "created": created,
                    }),
                );
                (201, json!({}))
            }
            (Method::Get, [collection, id, "attributes", name]) => {
                match self
                    .objects
                    .get(*id)
                    .filter(|o| o.collection == *collection)
                    .and_then(|o| o.attributes.get(*name))
                {
                    Some(attr) => (200, attr.clone()),
                    None => not_found(),
                }
            }
            (Method::Delete, [collection, id, "attributes", name]) => {
                match self
                    .objects
                    .get_mut(*id)
                    .filter(|o| o.collection == *collection)
                    .and_then(|o| o.attributes.remove(*name))
                {
                    Some(_) => (200, json!({})),
                    None => not_found(),
                }
            }
            (Method::Get, [collection, id, "attributes"]) => {
                match self.objects.get(*id).filter(|o| o.collection == *collection) {
                    Some(obj) => {
                        let attrs: Vec<Value> = obj.attributes.values().cloned().collect();
                        (200, json!({"attributes": attrs}))
                    }
                    None => not_found(),
                }
            }

            _ => bad_request("unrouted request"),
        }
    }

    fn create_object(&mut self, domain: &str, collection: &str, body: &Value) -> (u16, Value) {
        if !matches!(collection, "groups" | "datasets" | "datatypes") {
            return bad_request("unknown collection");
        }
        let Some(root) = self.domains.get(domain).cloned() else {
            return not_found();
        };

        let link = match body.get("link") {
            Some(link) => {
                let (Some(parent), Some(name)) = (
                    link.get("id").and_then(Value::as_str),
                    link.get("name").and_then(Value::as_str),
                ) else {
                    return bad_request("malformed link");
                };
                match self.objects.get(parent) {
                    Some(p) if p.collection == "groups" => {
                        if p.links.contains_key(name) {
                            return conflict();
                        }
                    }
                    _ => return not_found(),
                }
                Some((parent.to_string(), name.to_string()))
            }
            None => None,
        };

        if collection != "groups" && body.get("type").is_none() {
            return bad_request("missing type");
        }

        let uri = self.next_uri(collection);
        let mut obj = self.new_object(collection, domain);
        obj.type_json = body.get("type").cloned();
        if collection == "datasets" {
            obj.shape = Some(shape_object(body.get("shape"), body.get("maxdims")));
        }
        obj.creation_properties = body
            .get("creationProperties")
            .and_then(Value::as_str)
            .map(str::to_string);
        let created = obj.created;
        self.objects.insert(uri.clone(), obj);

        if let Some((parent, name)) = link {
            if let Some(p) = self.objects.get_mut(&parent) {
                p.links.insert(
                    name,
                    LinkEntry {
                        link: MockLink::Hard {
                            id: uri.clone(),
                            collection: collection.to_string(),
                        },
                        created,
                    },
                );
            }
        }
        (201, json!({"id": uri, "root": root, "created": created}))
    }

    fn lookup(
        &self,
        domain: &str,
        collection: &str,
        id: &str,
        query: &HashMap<String, String>,
    ) -> (u16, Value) {
        let path = query.get("h5path").map(String::as_str).unwrap_or("");
        let start = if path.starts_with('/') {
            self.domains.get(domain).cloned()
        } else if let Some(grp) = query.get("grpid") {
            Some(grp.clone())
        } else if !id.is_empty() {
            Some(id.to_string())
        } else {
            None
        };
        let Some(start) = start else {
            return bad_request("relative path without a start group");
        };
        match self.walk(&start, path) {
            Some(uri) => self.describe(collection, &uri),
            None => not_found(),
        }
    }

    fn describe(&self, collection: &str, id: &str) -> (u16, Value) {
        let Some(obj) = self.objects.get(id).filter(|o| o.collection == collection) else {
            return not_found();
        };
        let root = self.domains.get(&obj.domain).cloned().unwrap_or_default();
        let mut reply = json!({
            "id": id,
            "root": root,
            "domain": obj.domain,
            "created": obj.created,
            "lastModified": obj.created,
            "attributeCount": obj.attributes.len(),
        });
        if collection == "groups" {
            reply["linkCount"] = json!(obj.links.len());
        }
        if let Some(t) = &obj.type_json {
            reply["type"] = t.clone();
        }
        if let Some(s) = &obj.shape {
            reply["shape"] = s.clone();
        }
        if let Some(cp) = &obj.creation_properties {
            reply["creationProperties"] = json!(cp);
        }
        (200, reply)
    }

    fn put_link(&mut self, group: &str, name: &str, body: &Value) -> (u16, Value) {
        let link = if let Some(id) = body.get("id").and_then(Value::as_str) {
            match self.objects.get(id) {
                Some(target) => MockLink::Hard {
                    id: id.to_string(),
                    collection: target.collection.clone(),
                },
                None => return not_found(),
            }
        } else if let Some(path) = body.get("h5path").and_then(Value::as_str) {
            match body.get("h5domain").and_then(Value::as_str) {
                Some(domain) => MockLink::External {
                    domain: domain.to_string(),
                    path: path.to_string(),
                },
                None => MockLink::Soft {
                    path: path.to_string(),
                },
            }
        } else {
            return bad_request("link body names no target");
        };

        let created = self.tick();
        let Some(obj) = self
            .objects
            .get_mut(group)
            .filter(|o| o.collection == "groups")
        else {
            return not_found();
        };
        if obj.links.contains_key(name) {
            return conflict();
        }
        obj.links.insert(name.to_string(), LinkEntry { link, created });
        (201, json!({}))
    }
}

fn link_json(name: &str, entry: &LinkEntry) -> Value {
    match &entry.link {
        MockLink::Hard { id, collection } => json!({
            "class": "H5L_TYPE_HARD",
            "id": id,
            "collection": collection,
            "title": name,
            "created": entry.created,
        }),
        MockLink::Soft { path } => json!({
            "class": "H5L_TYPE_SOFT",
            "h5path": path,
            "title": name,
            "created": entry.created,
        }),
        MockLink::External { domain, path } => json!({
            "class": "H5L_TYPE_EXTERNAL",
            "h5domain": domain,
            "h5path": path,
            "title": name,
            "created": entry.created,
        }),
    }
}

// --- helpers ---

pub fn connector(mock: &Arc<MockHsds>) -> Connector {
    let config = ConnectionConfig::new(ENDPOINT).with_credentials("test_user", "test_pw");
    Connector::new(config, mock.clone())
}

pub fn unique_domain() -> String {
    format!("/home/test_user/{}.h5", uuid::Uuid::new_v4())
}
