//! Request credentials extraction.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::identity::AuthScheme;

/// Transport-independent view of an incoming request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request target as sent on the request line (path and query).
    pub uri: String,
    /// Raw `Authorization` header value.
    pub authorization: Option<String>,
    /// `access_token` query or form parameter.
    pub access_token: Option<String>,
}

impl AuthRequest {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            authorization: None,
            access_token: None,
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Whether the request carries a bearer token in any position.
    pub fn has_bearer(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// Bearer token from the `Authorization` header, else the parameter.
    pub fn bearer_token(&self) -> Option<&str> {
        if let Some((scheme, rest)) = self.authorization.as_deref().and_then(split_scheme) {
            let token = rest.trim();
            if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
                return Some(token);
            }
        }
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Digest `Authorization` parameters (RFC 2617 section 3.2.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestCredentials {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub qop: Option<String>,
    pub nc: Option<String>,
    pub cnonce: Option<String>,
    pub opaque: Option<String>,
    pub algorithm: Option<String>,
}

/// Credentials presented by a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    Digest(DigestCredentials),
    Bearer(String),
    /// A known scheme whose payload could not be decoded.
    Malformed { scheme: AuthScheme, reason: String },
}

impl Credentials {
    /// Scheme the credentials were presented under.
    pub fn scheme(&self) -> AuthScheme {
        match self {
            Credentials::Basic { .. } => AuthScheme::Basic,
            Credentials::Digest(_) => AuthScheme::Digest,
            Credentials::Bearer(_) => AuthScheme::Bearer,
            Credentials::Malformed { scheme, .. } => *scheme,
        }
    }

    /// Extract at most one credential set from `request`.
    ///
    /// A bearer token in any position wins over the `Authorization` header.
    pub fn from_request(request: &AuthRequest) -> Option<Self> {
        if let Some(token) = request.bearer_token() {
            return Some(Credentials::Bearer(token.to_string()));
        }
        request
            .authorization
            .as_deref()
            .and_then(Self::parse_authorization)
    }

    /// Parse an `Authorization` header value.
    ///
    /// Returns `None` for unknown schemes.
    pub fn parse_authorization(header: &str) -> Option<Self> {
        let (scheme, rest) = split_scheme(header)?;
        let rest = rest.trim();

        let credentials = match scheme.to_ascii_lowercase().as_str() {
            "basic" => parse_basic(rest),
            "digest" => parse_digest(rest),
            "bearer" if rest.is_empty() => Credentials::Malformed {
                scheme: AuthScheme::Bearer,
                reason: "empty bearer token".to_string(),
            },
            "bearer" => Credentials::Bearer(rest.to_string()),
            _ => return None,
        };
        Some(credentials)
    }
}

fn split_scheme(header: &str) -> Option<(&str, &str)> {
    let header = header.trim();
    if header.is_empty() {
        return None;
    }
    Some(match header.split_once(char::is_whitespace) {
        Some((scheme, rest)) => (scheme, rest),
        None => (header, ""),
    })
}

fn parse_basic(payload: &str) -> Credentials {
    let malformed = |reason: &str| Credentials::Malformed {
        scheme: AuthScheme::Basic,
        reason: reason.to_string(),
    };

    let Ok(decoded) = STANDARD.decode(payload) else {
        return malformed("invalid base64 payload");
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return malformed("payload is not UTF-8");
    };
    match decoded.split_once(':') {
        Some((username, password)) if !username.is_empty() => Credentials::Basic {
            username: username.to_string(),
            password: password.to_string(),
        },
        _ => malformed("expected username:password"),
    }
}

fn parse_digest(payload: &str) -> Credentials {
    match parse_auth_params(payload).and_then(digest_from_params) {
        Ok(digest) => Credentials::Digest(digest),
        Err(reason) => Credentials::Malformed {
            scheme: AuthScheme::Digest,
            reason,
        },
    }
}

fn digest_from_params(mut params: HashMap<String, String>) -> Result<DigestCredentials, String> {
    let mut required = |name: &str| {
        params
            .remove(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| format!("missing digest parameter '{}'", name))
    };

    let username = required("username")?;
    let realm = required("realm")?;
    let nonce = required("nonce")?;
    let uri = required("uri")?;
    let response = required("response")?;

    let qop = params.remove("qop");
    let nc = params.remove("nc");
    let cnonce = params.remove("cnonce");
    if qop.is_some() && (nc.is_none() || cnonce.is_none()) {
        return Err("qop requires nc and cnonce".to_string());
    }

    Ok(DigestCredentials {
        username,
        realm,
        nonce,
        uri,
        response,
        qop,
        nc,
        cnonce,
        opaque: params.remove("opaque"),
        algorithm: params.remove("algorithm"),
    })
}

/// Parse a comma-separated `name=value` list where values may be quoted.
///
/// Parameter names are lowercased.
pub fn parse_auth_params(input: &str) -> Result<HashMap<String, String>, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() || c == ',' {
                break;
            }
            name.push(c);
            chars.next();
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        if chars.next() != Some('=') {
            return Err(format!("expected '=' after parameter '{}'", name));
        }
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    c => value.push(c),
                }
            }
            if !closed {
                return Err(format!("unterminated quoted value for '{}'", name));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c == ',' {
                    break;
                }
                value.push(c);
                chars.next();
            }
            value = value.trim_end().to_string();
        }

        if name.is_empty() {
            return Err("empty parameter name".to_string());
        }
        params.insert(name.to_ascii_lowercase(), value);
    }

    Ok(params)
}
