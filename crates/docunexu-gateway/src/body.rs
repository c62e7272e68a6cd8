use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::Method;

/// A single field of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormPart {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Inbound body, classified once per request by its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    /// No body is forwarded (GET/HEAD, or an empty JSON body).
    Empty,
    /// `application/json`, relayed as the raw text received.
    Json(Bytes),
    /// `multipart/form-data`, decoded into parts and re-encoded with a fresh boundary.
    Multipart(Vec<FormPart>),
    /// Anything else, relayed as opaque bytes.
    Binary(Bytes),
}

#[derive(Debug, thiserror::Error)]
pub enum BodyError {
    #[error("multipart boundary is missing")]
    MissingBoundary,

    #[error("malformed multipart body: {0}")]
    Malformed(&'static str),

    #[error("invalid part content type: {0}")]
    InvalidPartContentType(String),
}

impl RequestBody {
    /// Classify and decode an inbound body.
    pub fn from_request(
        method: &Method,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<Self, BodyError> {
        if *method == Method::GET || *method == Method::HEAD {
            return Ok(RequestBody::Empty);
        }

        let lowered = content_type.map(str::to_ascii_lowercase);
        match lowered.as_deref() {
            Some(ct) if ct.contains("multipart/form-data") => {
                // Parse with the original header: boundaries are case-sensitive.
                let parts = parse_multipart(content_type.unwrap_or_default(), &body)?;
                Ok(RequestBody::Multipart(parts))
            }
            Some(ct) if ct.contains("application/json") => {
                if body.is_empty() {
                    Ok(RequestBody::Empty)
                } else {
                    Ok(RequestBody::Json(body))
                }
            }
            _ => Ok(RequestBody::Binary(body)),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestBody::Empty => "empty",
            RequestBody::Json(_) => "json",
            RequestBody::Multipart(_) => "multipart",
            RequestBody::Binary(_) => "binary",
        }
    }

    /// Whether the inbound `Content-Type` header may be copied upstream.
    /// Multipart bodies get a new boundary, so their header is generated by the client.
    pub fn forwards_content_type(&self) -> bool {
        !matches!(self, RequestBody::Multipart(_))
    }

    /// Attach this body to an outgoing request.
    pub fn apply(
        self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, BodyError> {
        match self {
            RequestBody::Empty => Ok(builder),
            RequestBody::Json(text) => Ok(builder.body(text)),
            RequestBody::Binary(bytes) => Ok(builder.body(bytes)),
            RequestBody::Multipart(parts) => Ok(builder.multipart(build_form(parts)?)),
        }
    }
}

/// Re-encode parsed parts as a fresh multipart form, preserving order.
///
/// Names and filenames are written as received; reqwest would otherwise
/// percent-encode them into the `name*=` extended form.
pub fn build_form(parts: Vec<FormPart>) -> Result<Form, BodyError> {
    let mut form = Form::new().percent_encode_noop();
    for part in parts {
        let mut encoded = Part::bytes(part.data.to_vec());
        if let Some(filename) = part.filename {
            encoded = encoded.file_name(filename);
        }
        if let Some(content_type) = part.content_type {
            encoded = encoded
                .mime_str(&content_type)
                .map_err(|_| BodyError::InvalidPartContentType(content_type))?;
        }
        form = form.part(part.name, encoded);
    }
    Ok(form)
}

fn find_subslice(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if start > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| start + pos)
}

fn multipart_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').map(str::trim).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Split header parameters on `;`, ignoring separators inside quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

/// Decode an RFC 5987 `charset''percent-encoded` value.
fn decode_extended(value: &str) -> Option<String> {
    let (_, encoded) = value.trim().split_once("''")?;
    urlencoding::decode(encoded).ok().map(|v| v.into_owned())
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .replace("\\\"", "\"")
}

/// Parse a `multipart/form-data` body into its parts.
pub fn parse_multipart(content_type: &str, body: &Bytes) -> Result<Vec<FormPart>, BodyError> {
    let boundary = multipart_boundary(content_type).ok_or(BodyError::MissingBoundary)?;
    let marker = format!("--{boundary}");
    let delimiter = format!("\r\n{marker}");
    let bytes = body.as_ref();

    let mut cursor = find_subslice(bytes, marker.as_bytes(), 0)
        .ok_or(BodyError::Malformed("missing opening boundary"))?
        + marker.len();

    let mut parts = Vec::new();
    loop {
        // Closing delimiter
        if bytes.get(cursor..cursor + 2) == Some(b"--") {
            break;
        }
        if bytes.get(cursor..cursor + 2) == Some(b"\r\n") {
            cursor += 2;
        } else {
            return Err(BodyError::Malformed("boundary not followed by CRLF"));
        }

        let headers_end = find_subslice(bytes, b"\r\n\r\n", cursor)
            .ok_or(BodyError::Malformed("part missing header separator"))?;
        let headers = String::from_utf8_lossy(&bytes[cursor..headers_end]);

        let mut name = None;
        let mut filename = None;
        let mut part_type = None;
        for line in headers.split("\r\n") {
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-disposition") {
                for param in split_params(value) {
                    if let Some((k, v)) = param.split_once('=') {
                        match k.trim().to_ascii_lowercase().as_str() {
                            "name" if name.is_none() => name = Some(unquote(v)),
                            "filename" if filename.is_none() => filename = Some(unquote(v)),
                            // The extended form wins over the plain one when both are sent
                            "name*" => name = decode_extended(v).or(name),
                            "filename*" => filename = decode_extended(v).or(filename),
                            _ => {}
                        }
                    }
                }
            } else if key.trim().eq_ignore_ascii_case("content-type") {
                let value = value.trim();
                if !value.is_empty() {
                    part_type = Some(value.to_string());
                }
            }
        }

        let name = name.ok_or(BodyError::Malformed("part missing content-disposition name"))?;
        let data_start = headers_end + 4;
        let data_end = find_subslice(bytes, delimiter.as_bytes(), data_start)
            .ok_or(BodyError::Malformed("part missing trailing boundary"))?;

        parts.push(FormPart {
            name,
            filename,
            content_type: part_type,
            data: body.slice(data_start..data_end),
        });

        cursor = data_end + delimiter.len();
    }

    Ok(parts)
}
