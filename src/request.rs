//! Request payload sent to the gateway.
//!
//! The gateway parses a small HTTP-like text block:
//!
//! ```text
//! GET https://example.com/\r\n
//! host: example.com\r\n
//! \r\n
//! ```
//!
//! To the protocol engine the result is an opaque byte blob. What goes into
//! it (target, host, body) is supplied by the application.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::config::REQUEST_CAPACITY;
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// An encoded request, at most [`REQUEST_CAPACITY`] bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    bytes: Vec<u8, REQUEST_CAPACITY>,
}

impl Request {
    /// Wrap an already encoded request.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let bytes = Vec::from_slice(bytes).map_err(|_| Error::RequestTooLarge)?;
        Ok(Self { bytes })
    }

    /// `GET <target>` with a host header and no body.
    pub fn get(target: &str, host: &str) -> Result<Self, Error> {
        RequestBuilder::new(Method::Get, target, host).build()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Assembles a request from its parts.
pub struct RequestBuilder<'a> {
    method: Method,
    target: &'a str,
    host: &'a str,
    headers: Vec<(&'a str, &'a str), 8>,
    body: Option<&'a [u8]>,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(method: Method, target: &'a str, host: &'a str) -> Self {
        Self {
            method,
            target,
            host,
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header line. Fails once eight extra headers are set.
    pub fn header(mut self, name: &'a str, value: &'a str) -> Result<Self, Error> {
        self.headers
            .push((name, value))
            .map_err(|_| Error::RequestTooLarge)?;
        Ok(self)
    }

    /// Attach a body; a `content-length` header is emitted for it.
    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Result<Request, Error> {
        let mut head: String<REQUEST_CAPACITY> = String::new();
        write!(head, "{} {}\r\nhost: {}\r\n", self.method.as_str(), self.target, self.host)
            .map_err(|_| Error::RequestTooLarge)?;
        for (name, value) in &self.headers {
            write!(head, "{}: {}\r\n", name, value).map_err(|_| Error::RequestTooLarge)?;
        }
        if let Some(body) = self.body {
            write!(head, "content-length: {}\r\n", body.len())
                .map_err(|_| Error::RequestTooLarge)?;
        }
        head.push_str("\r\n").map_err(|_| Error::RequestTooLarge)?;

        let mut bytes: Vec<u8, REQUEST_CAPACITY> =
            Vec::from_slice(head.as_bytes()).map_err(|_| Error::RequestTooLarge)?;
        if let Some(body) = self.body {
            bytes
                .extend_from_slice(body)
                .map_err(|_| Error::RequestTooLarge)?;
        }
        Ok(Request { bytes })
    }
}
