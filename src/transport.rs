use std::time::Duration;

use url::Url;

use crate::error::{RestError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Everything needed to issue one request. Built fresh for every call and handed to the
/// transport explicitly, so there is no shared scratch state between operations.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub basic_auth: Option<(String, Option<String>)>,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A blocking "configure, perform, receive" primitive.
pub trait Transport: Send + Sync {
    fn perform(&self, request: &RequestContext) -> Result<Response>;
}

/// Maps a non-success status onto the error the caller sees. 404 becomes `NotFound`.
pub fn check_status(status: u16) -> Result<()> {
    let message = match status {
        200..=299 => return Ok(()),
        400 => "Malformed/Bad request for resource",
        401 => "Valid authentication needed to access resource",
        403 => "Unauthorized access to resource",
        404 => return Err(RestError::NotFound("Resource not found".to_string())),
        405 => "Method not allowed",
        409 => "Resource already exists",
        410 => "Resource has been deleted",
        413 => "Selection too large",
        500 => "An internal server error occurred",
        501 => "Functionality not implemented",
        503 => "Service unavailable",
        504 => "Gateway timeout",
        _ => "Unknown error occurred",
    };
    Err(RestError::Http { status, message })
}

pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn perform(&self, request: &RequestContext) -> Result<Response> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some((user, pass)) = &request.basic_auth {
            builder = builder.basic_auth(user, pass.as_ref());
        }
        if !request.body.is_empty() || request.method == Method::Put {
            builder = builder.body(request.body.clone());
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let body = response.bytes()?.to_vec();
        tracing::debug!(
            "{} {} -> {} ({} bytes)",
            request.method.as_str(),
            request.url,
            status,
            body.len()
        );
        Ok(Response { status, body })
    }
}
