//! 宿主函数
//! Host functions exposed to adapter scripts
//!
//! Scripts never touch the network or the filesystem directly. They call the
//! functions registered here, which forward to a [`ScriptHost`] and are gated
//! by [`ScriptSecurityConfig`](super::engine::ScriptSecurityConfig).
//!
//! | function | gate |
//! |---|---|
//! | `http_post_json(url, headers, body)` | `allow_network_operations` |
//! | `read_image_base64(path)` | `allow_file_operations` |
//! | `image_mime_type(path)` | `allow_file_operations` |
//! | `env_var(name)` | always available, `()` when unset |

use super::engine::ScriptSecurityConfig;
use rhai::{Dynamic, Engine, EvalAltResult, Map};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Services a script may reach through host functions.
///
/// Calls arrive on a blocking thread; implementations may block.
pub trait ScriptHost: Send + Sync {
    /// POST a JSON body and return the decoded JSON response.
    ///
    /// Non-success statuses are errors.
    fn http_post_json(
        &self,
        url: &str,
        headers: &BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, String>;

    /// Read an image file and return its base64 encoding
    fn read_image_base64(&self, path: &Path) -> Result<String, String>;

    /// MIME type of an image file, e.g. `image/png`
    fn image_mime_type(&self, path: &Path) -> Result<String, String>;

    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Host that refuses every network and file request
#[derive(Debug, Default, Clone, Copy)]
pub struct DeniedHost;

impl ScriptHost for DeniedHost {
    fn http_post_json(
        &self,
        url: &str,
        _headers: &BTreeMap<String, String>,
        _body: &serde_json::Value,
    ) -> Result<serde_json::Value, String> {
        Err(format!("no network access available for {}", url))
    }

    fn read_image_base64(&self, path: &Path) -> Result<String, String> {
        Err(format!("no file access available for {}", path.display()))
    }

    fn image_mime_type(&self, path: &Path) -> Result<String, String> {
        Err(format!("no file access available for {}", path.display()))
    }
}

type HostResult<T> = Result<T, Box<EvalAltResult>>;

/// Register the host functions on an engine
pub(crate) fn register_host_functions(
    engine: &mut Engine,
    security: &ScriptSecurityConfig,
    host: Arc<dyn ScriptHost>,
) {
    let allow_network = security.allow_network_operations;
    let allow_files = security.allow_file_operations;

    let h = host.clone();
    engine.register_fn(
        "http_post_json",
        move |url: &str, headers: Map, body: Dynamic| -> HostResult<Dynamic> {
            if !allow_network {
                return Err(format!("network operations are disabled (POST {})", url).into());
            }
            let headers: BTreeMap<String, String> = headers
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect();
            let body: serde_json::Value = rhai::serde::from_dynamic(&body)?;
            let response = h.http_post_json(url, &headers, &body)?;
            rhai::serde::to_dynamic(response)
        },
    );

    let h = host.clone();
    engine.register_fn("read_image_base64", move |path: &str| -> HostResult<String> {
        if !allow_files {
            return Err(format!("file operations are disabled (read {})", path).into());
        }
        Ok(h.read_image_base64(Path::new(path))?)
    });

    let h = host.clone();
    engine.register_fn("image_mime_type", move |path: &str| -> HostResult<String> {
        if !allow_files {
            return Err(format!("file operations are disabled (inspect {})", path).into());
        }
        Ok(h.image_mime_type(Path::new(path))?)
    });

    let h = host;
    engine.register_fn("env_var", move |name: &str| -> Dynamic {
        h.env_var(name).map(Dynamic::from).unwrap_or(Dynamic::UNIT)
    });
}
