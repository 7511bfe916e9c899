// Copyright 2025 Reposcope Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Request authentication for the http transport: none, HTTP basic, or
//! API key. Health checks bypass authentication via routing, not here.

use anyhow::Result;
use axum::http::HeaderMap;
use base64::Engine;

pub const AUTH_TYPE_NONE: &str = "none";
pub const AUTH_TYPE_BASIC: &str = "basic";
pub const AUTH_TYPE_APIKEY: &str = "apikey";

/// Authentication configuration for the http transport.
#[derive(Debug, Clone, Default)]
pub struct AuthSettings {
    /// One of `none`, `basic`, `apikey`. Empty means `none`.
    pub auth_type: String,
    pub username: String,
    pub password: String,
    pub api_keys: Vec<String>,
}

impl AuthSettings {
    /// The effective auth type, with the empty default reading as `none`.
    pub fn auth_type_or_none(&self) -> &str {
        if self.auth_type.is_empty() {
            AUTH_TYPE_NONE
        } else {
            &self.auth_type
        }
    }

    /// Rejects conflicting or incomplete auth configuration.
    pub fn validate(&self) -> Result<()> {
        let has_basic_creds = !self.username.is_empty() || !self.password.is_empty();
        let has_api_keys = !self.api_keys.is_empty();

        match self.auth_type.as_str() {
            AUTH_TYPE_NONE | "" => {
                if has_basic_creds || has_api_keys {
                    anyhow::bail!("auth type 'none' is incompatible with auth credentials");
                }
            }
            AUTH_TYPE_BASIC => {
                if has_api_keys {
                    anyhow::bail!("auth type 'basic' is mutually exclusive with API keys");
                }
                if self.username.is_empty() || self.password.is_empty() {
                    anyhow::bail!("auth type 'basic' requires both username and password");
                }
            }
            AUTH_TYPE_APIKEY => {
                if has_basic_creds {
                    anyhow::bail!("auth type 'apikey' is mutually exclusive with basic credentials");
                }
                if !has_api_keys {
                    anyhow::bail!("auth type 'apikey' requires at least one API key");
                }
            }
            other => anyhow::bail!("unknown auth type: {other}"),
        }
        Ok(())
    }
}

/// Validates request headers against the configured scheme.
#[derive(Debug, Clone)]
pub enum Authenticator {
    None,
    Basic { username: String, password: String },
    ApiKey { keys: Vec<String> },
}

impl Authenticator {
    /// Builds an authenticator from validated settings.
    pub fn new(settings: &AuthSettings) -> Result<Self> {
        settings.validate()?;
        Ok(match settings.auth_type.as_str() {
            AUTH_TYPE_BASIC => Self::Basic {
                username: settings.username.clone(),
                password: settings.password.clone(),
            },
            AUTH_TYPE_APIKEY => Self::ApiKey {
                keys: settings.api_keys.clone(),
            },
            _ => Self::None,
        })
    }

    /// Returns true when the request carries valid credentials.
    pub fn authorize(&self, headers: &HeaderMap) -> bool {
        match self {
            Self::None => true,
            Self::Basic { username, password } => {
                let Some((user, pass)) = decode_basic_auth(headers) else {
                    return false;
                };
                // Both comparisons always run so timing does not reveal
                // which part mismatched.
                let user_match = constant_time_compare(user.as_bytes(), username.as_bytes());
                let pass_match = constant_time_compare(pass.as_bytes(), password.as_bytes());
                user_match && pass_match
            }
            Self::ApiKey { keys } => {
                let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) else {
                    return false;
                };
                if key.is_empty() {
                    return false;
                }
                keys.iter()
                    .any(|valid| constant_time_compare(key.as_bytes(), valid.as_bytes()))
            }
        }
    }
}

fn decode_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
