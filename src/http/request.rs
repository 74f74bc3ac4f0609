use std::collections::HashMap;

use url::form_urlencoded;

/// HTTP request methods.
///
/// The origin answers every method the same way, so unknown tokens are kept
/// as [`Method::Extension`] instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other method token, kept verbatim
    Extension(String),
}

impl Method {
    /// Parses an HTTP method token.
    ///
    /// Matching is case-sensitive: `"get"` becomes `Extension("get")`.
    ///
    /// # Example
    ///
    /// ```
    /// # use faultline::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Method::GET);
    /// assert_eq!(Method::parse("PURGE"), Method::Extension("PURGE".to_string()));
    /// ```
    pub fn parse(s: &str) -> Self {
        match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other => Method::Extension(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Extension(token) => token,
        }
    }
}

/// The first line of a request, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target, query string included (e.g. "/echo/hi?sleep=1")
    pub target: String,
    /// The target without its query string (e.g. "/echo/hi")
    pub path: String,
    /// Everything after the first `?`, if present
    pub query: Option<String>,
    /// Protocol version as sent (typically "HTTP/1.1"); absent on HTTP/0.9-style lines
    pub version: Option<String>,
}

impl RequestLine {
    /// Splits `"<METHOD> <target>[ <version>]"`.
    ///
    /// Returns `None` when the method or the target is missing.
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(3, ' ');

        let method = parts.next().filter(|m| !m.is_empty())?;
        let target = parts.next().filter(|t| !t.is_empty())?;
        let version = parts.next().map(str::to_string);

        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (target, None),
        };

        Some(Self {
            method: Method::parse(method),
            target: target.to_string(),
            path: path.to_string(),
            query,
            version,
        })
    }

    /// Decodes the query string into a [`FieldMap`].
    pub fn query_params(&self) -> FieldMap {
        let mut params = FieldMap::new();

        if let Some(query) = &self.query {
            for (name, value) in form_urlencoded::parse(query.as_bytes()) {
                params.insert(name, value);
            }
        }

        params
    }
}

/// Name/value pairs with an original-case view and a lower-case view.
///
/// Both views are written together on insert, so case-insensitive lookups
/// never fold the stored names again. Last write wins in each view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    original: HashMap<String, String>,
    lower: HashMap<String, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        self.lower.insert(name.to_lowercase(), value.clone());
        self.original.insert(name, value);
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.original.get(name).map(String::as_str)
    }

    /// Lookup in the lower-case view. `name` must already be lower-case.
    pub fn get_lower(&self, name: &str) -> Option<&str> {
        self.lower.get(name).map(String::as_str)
    }

    pub fn get_ignore_case(&self, name: &str) -> Option<&str> {
        self.get_lower(&name.to_lowercase())
    }

    pub fn contains_lower(&self, name: &str) -> bool {
        self.lower.contains_key(name)
    }

    /// Number of distinct original-case names.
    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.original.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
