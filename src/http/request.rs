/// HTTP request methods.
///
/// Only `GET` is served; the others are recognized so that rejections can
/// name what the client sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    POST,
    HEAD,
    PUT,
    DELETE,
    TRACE,
    OPTIONS,
    CONNECT,
    PATCH,
}

impl Method {
    /// Parses a method token, ignoring ASCII case.
    ///
    /// # Example
    ///
    /// ```
    /// # use quay::http::request::Method;
    /// assert_eq!(Method::from_token("GET"), Some(Method::GET));
    /// assert_eq!(Method::from_token("get"), Some(Method::GET));
    /// assert_eq!(Method::from_token("BREW"), None);
    /// ```
    pub fn from_token(s: &str) -> Option<Self> {
        const METHODS: [(&str, Method); 9] = [
            ("GET", Method::GET),
            ("POST", Method::POST),
            ("HEAD", Method::HEAD),
            ("PUT", Method::PUT),
            ("DELETE", Method::DELETE),
            ("TRACE", Method::TRACE),
            ("OPTIONS", Method::OPTIONS),
            ("CONNECT", Method::CONNECT),
            ("PATCH", Method::PATCH),
        ];

        METHODS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(s))
            .map(|(_, method)| *method)
    }
}

/// A fully parsed request, detached from the connection's read buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Origin-form target, e.g. `/index.html?x=1`.
    pub path: String,
    pub version: String,
    pub host: Option<String>,
    /// `Connection: keep-alive` was sent.
    pub linger: bool,
    pub content_length: Option<usize>,
    pub body: Vec<u8>,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Method,
    path: Option<String>,
    version: String,
    host: Option<String>,
    linger: bool,
    body: Vec<u8>,
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            path: None,
            version: "HTTP/1.1".to_string(),
            host: None,
            linger: false,
            body: Vec::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn linger(mut self, linger: bool) -> Self {
        self.linger = linger;
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        let path = self.path.ok_or("path missing")?;
        let content_length = (!self.body.is_empty()).then_some(self.body.len());
        Ok(Request {
            method: self.method,
            path,
            version: self.version,
            host: self.host,
            linger: self.linger,
            content_length,
            body: self.body,
        })
    }
}

impl Request {
    /// The target without its query string.
    pub fn resource_path(&self) -> &str {
        match self.path.split_once('?') {
            Some((path, _query)) => path,
            None => &self.path,
        }
    }

    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, query)| query)
    }

    pub fn has_body(&self) -> bool {
        self.content_length.is_some_and(|len| len > 0)
    }

    pub fn keep_alive(&self) -> bool {
        self.linger
    }
}
