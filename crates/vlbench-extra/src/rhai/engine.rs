//! Rhai 脚本引擎核心实现
//! Rhai script engine core implementation
//!
//! 编译适配器脚本、构造状态并调用方法
//! Compiles adapter scripts, constructs their state and calls their methods

use super::error::{RhaiError, RhaiResult};
use super::host::{ScriptHost, register_host_functions};
use rhai::{AST, CallFnOptions, Dynamic, Engine, Scope};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// 脚本引擎配置
// Script Engine Configuration
// ============================================================================

/// 脚本引擎安全配置
/// Script engine security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptSecurityConfig {
    /// 最大调用栈深度
    /// Maximum call stack depth
    pub max_call_stack_depth: usize,
    /// 最大运算次数，0 表示不限
    /// Maximum number of operations, 0 for unlimited
    pub max_operations: u64,
    /// 最大数组大小
    /// Maximum array size
    pub max_array_size: usize,
    /// 最大字符串长度
    /// Maximum string size
    pub max_string_size: usize,
    /// 是否允许循环
    /// Whether to allow loops
    pub allow_loops: bool,
    /// 是否允许文件操作
    /// Whether to allow file operations
    pub allow_file_operations: bool,
    /// 是否允许网络操作
    /// Whether to allow network operations
    pub allow_network_operations: bool,
}

impl Default for ScriptSecurityConfig {
    fn default() -> Self {
        Self {
            max_call_stack_depth: 64,
            max_operations: 1_000_000,
            max_array_size: 10_000,
            // base64-encoded images pass through script strings
            max_string_size: 64 * 1024 * 1024,
            allow_loops: true,
            allow_file_operations: false,
            allow_network_operations: false,
        }
    }
}

impl ScriptSecurityConfig {
    /// Limits for an adapter the operator has approved: network and image
    /// reads allowed, everything else at the defaults.
    pub fn approved_adapter() -> Self {
        Self {
            allow_file_operations: true,
            allow_network_operations: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// 已编译脚本
// Compiled Script
// ============================================================================

/// 脚本中声明的函数
/// A function declared by a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFunction {
    pub name: String,
    pub params: Vec<String>,
}

/// 已编译的脚本
/// A compiled script
pub struct CompiledScript {
    /// 单元名称
    /// Unit name
    pub unit: String,
    /// 编译后的 AST
    /// Compiled AST
    ast: AST,
    /// 源代码（用于调试）
    /// Source code (for debugging)
    source: String,
    /// 编译时间戳
    /// Compilation timestamp
    pub compiled_at: u64,
}

impl CompiledScript {
    fn new(unit: &str, ast: AST, source: String) -> Self {
        Self {
            unit: unit.to_string(),
            ast,
            source,
            compiled_at: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every function the script declares, sorted by name then arity
    pub fn functions(&self) -> Vec<ScriptFunction> {
        let mut functions: Vec<ScriptFunction> = self
            .ast
            .iter_functions()
            .map(|f| ScriptFunction {
                name: f.name.to_string(),
                params: f.params.iter().map(|p| p.to_string()).collect(),
            })
            .collect();
        functions.sort_by(|a, b| a.name.cmp(&b.name).then(a.params.len().cmp(&b.params.len())));
        functions
    }

    /// Whether a function with this name and arity is declared
    pub fn has_function(&self, name: &str, arity: usize) -> bool {
        self.ast
            .iter_functions()
            .any(|f| f.name == name && f.params.len() == arity)
    }

    /// Fail with [`RhaiError::NotFound`] unless the function is declared
    pub fn require_function(&self, name: &str, arity: usize) -> RhaiResult<()> {
        if self.has_function(name, arity) {
            Ok(())
        } else {
            Err(RhaiError::NotFound(format!(
                "function {}/{} in unit {}",
                name, arity, self.unit
            )))
        }
    }
}

impl std::fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledScript")
            .field("unit", &self.unit)
            .field("compiled_at", &self.compiled_at)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Rhai 脚本引擎
// Rhai Script Engine
// ============================================================================

/// vlbench Rhai 脚本引擎
/// vlbench Rhai script engine
pub struct RhaiScriptEngine {
    /// Rhai 引擎实例
    /// Rhai engine instance
    engine: Engine,
}

impl RhaiScriptEngine {
    /// 创建新的脚本引擎
    /// Create a new script engine
    pub fn new(security: ScriptSecurityConfig, host: Arc<dyn ScriptHost>) -> Self {
        let mut engine = Engine::new();

        Self::apply_security_limits(&mut engine, &security);
        Self::register_builtin_functions(&mut engine);
        register_host_functions(&mut engine, &security, host);

        Self { engine }
    }

    /// 应用安全限制
    /// Apply security limits
    fn apply_security_limits(engine: &mut Engine, security: &ScriptSecurityConfig) {
        engine.set_max_call_levels(security.max_call_stack_depth);
        engine.set_max_operations(security.max_operations);
        engine.set_max_array_size(security.max_array_size);
        engine.set_max_string_size(security.max_string_size);

        if !security.allow_loops {
            engine.set_allow_looping(false);
        }

        // 脚本函数只能看到参数和 this
        // Script functions only see their parameters and `this`
        engine.set_strict_variables(true);
    }

    /// 注册内置函数
    /// Register built-in functions
    fn register_builtin_functions(engine: &mut Engine) {
        engine.on_print(|msg| info!(target: "vlbench::script", "{}", msg));
        engine.on_debug(|msg, src, pos| {
            debug!(target: "vlbench::script", source = src.unwrap_or(""), %pos, "{}", msg)
        });

        engine.register_fn("log", |msg: &str| info!(target: "vlbench::script", "{}", msg));
        engine.register_fn("warn", |msg: &str| warn!(target: "vlbench::script", "{}", msg));
        engine.register_fn("error", |msg: &str| error!(target: "vlbench::script", "{}", msg));

        // JSON 操作函数
        // JSON operation functions
        engine.register_fn("to_json", |value: Dynamic| -> String {
            serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string())
        });

        engine.register_fn("from_json", |json: &str| -> Dynamic {
            serde_json::from_str::<serde_json::Value>(json)
                .ok()
                .and_then(|v| rhai::serde::to_dynamic(v).ok())
                .unwrap_or(Dynamic::UNIT)
        });
    }

    /// 编译脚本
    /// Compile script
    pub fn compile(&self, unit: &str, source: &str) -> RhaiResult<CompiledScript> {
        let ast = self
            .engine
            .compile(source)
            .map_err(|e| RhaiError::CompileError(format!("{}: {}", unit, e)))?;

        debug!(unit, functions = ast.iter_functions().count(), "script compiled");
        Ok(CompiledScript::new(unit, ast, source.to_string()))
    }

    /// 从文件加载脚本，单元名取文件名
    /// Load script from file; the unit name is the file stem
    pub async fn load_from_file(&self, path: &Path) -> RhaiResult<CompiledScript> {
        let source = tokio::fs::read_to_string(path).await?;
        let unit = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unnamed");

        self.compile(unit, &source)
    }

    /// 调用构造函数，返回适配器状态
    /// Call a constructor and return the adapter state
    pub fn construct(
        &self,
        script: &CompiledScript,
        constructor: &str,
        context: &serde_json::Value,
    ) -> RhaiResult<Dynamic> {
        script.require_function(constructor, 1)?;
        let ctx = rhai::serde::to_dynamic(context)?;

        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false);
        let state: Dynamic =
            self.engine
                .call_fn_with_options(options, &mut scope, &script.ast, constructor, (ctx,))?;
        Ok(state)
    }

    /// 以 `this` 绑定状态调用脚本函数
    /// Call a script function with the state bound to `this`
    pub fn call_method(
        &self,
        script: &CompiledScript,
        this: &mut Dynamic,
        function: &str,
        args: Vec<Dynamic>,
    ) -> RhaiResult<Dynamic> {
        script.require_function(function, args.len())?;

        let mut scope = Scope::new();
        let options = CallFnOptions::new().eval_ast(false).bind_this_ptr(this);
        let result: Dynamic =
            self.engine
                .call_fn_with_options(options, &mut scope, &script.ast, function, args)?;
        Ok(result)
    }

}

// ============================================================================
// 测试
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rhai::host::DeniedHost;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    const ECHO_ADAPTER: &str = r#"
        fn EchoResponseGenerator(ctx) {
            #{ prefix: ctx.prefix, calls: 0 }
        }

        fn generate_response(question, image_path) {
            this.calls += 1;
            this.prefix + question + " @ " + image_path + " #" + this.calls
        }

        // never evaluated
        throw "top-level statements must not run";
    "#;

    fn engine() -> RhaiScriptEngine {
        RhaiScriptEngine::new(ScriptSecurityConfig::default(), Arc::new(DeniedHost))
    }

    #[derive(Default)]
    struct RecordingHost {
        posts: Mutex<Vec<(String, serde_json::Value)>>,
    }

    impl ScriptHost for RecordingHost {
        fn http_post_json(
            &self,
            url: &str,
            _headers: &BTreeMap<String, String>,
            body: &serde_json::Value,
        ) -> Result<serde_json::Value, String> {
            self.posts.lock().unwrap().push((url.to_string(), body.clone()));
            Ok(serde_json::json!({"answer": "a cat"}))
        }

        fn read_image_base64(&self, _path: &Path) -> Result<String, String> {
            Ok("aGVsbG8=".to_string())
        }

        fn image_mime_type(&self, _path: &Path) -> Result<String, String> {
            Ok("image/png".to_string())
        }
    }

    #[test]
    fn test_lists_declared_functions() {
        let script = engine().compile("adapter_echo", ECHO_ADAPTER).unwrap();
        let names: Vec<String> = script.functions().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["EchoResponseGenerator", "generate_response"]);
        assert!(script.has_function("generate_response", 2));
        assert!(!script.has_function("generate_response", 1));
    }

    #[test]
    fn test_construct_and_call_keeps_state() {
        let engine = engine();
        let script = engine.compile("adapter_echo", ECHO_ADAPTER).unwrap();
        let mut state = engine
            .construct(&script, "EchoResponseGenerator", &serde_json::json!({"prefix": "Q: "}))
            .unwrap();

        let first = engine
            .call_method(
                &script,
                &mut state,
                "generate_response",
                vec!["what?".into(), "img.png".into()],
            )
            .unwrap();
        assert_eq!(first.into_string().unwrap(), "Q: what? @ img.png #1");

        let second = engine
            .call_method(
                &script,
                &mut state,
                "generate_response",
                vec!["again".into(), "img.png".into()],
            )
            .unwrap();
        assert_eq!(second.into_string().unwrap(), "Q: again @ img.png #2");
    }

    #[test]
    fn test_missing_function_is_not_found() {
        let engine = engine();
        let script = engine.compile("adapter_echo", ECHO_ADAPTER).unwrap();
        let err = engine
            .construct(&script, "OtherResponseGenerator", &serde_json::json!({}))
            .unwrap_err();
        assert!(matches!(err, RhaiError::NotFound(_)));
    }

    #[test]
    fn test_compile_error() {
        let err = engine().compile("adapter_bad", "fn broken( {").unwrap_err();
        assert!(matches!(err, RhaiError::CompileError(_)));
    }

    #[test]
    fn test_json_helpers_round_trip() {
        const JSON_ADAPTER: &str = r#"
            fn JsonResponseGenerator(ctx) { #{} }

            fn generate_response(question, image_path) {
                let reply = from_json(question);
                reply.answer + " " + to_json(#{ n: reply.n + 1 })
            }
        "#;
        let engine = engine();
        let script = engine.compile("adapter_json", JSON_ADAPTER).unwrap();
        let mut state = engine
            .construct(&script, "JsonResponseGenerator", &serde_json::json!({}))
            .unwrap();
        let out = engine
            .call_method(
                &script,
                &mut state,
                "generate_response",
                vec![
                    Dynamic::from(r#"{"answer": "ok", "n": 1}"#.to_string()),
                    Dynamic::from("img.png".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(out.into_string().unwrap(), r#"ok {"n":2}"#);
    }

    #[test]
    fn test_network_disabled_by_default() {
        let engine = RhaiScriptEngine::new(
            ScriptSecurityConfig::default(),
            Arc::new(RecordingHost::default()),
        );
        let script = engine
            .compile(
                "adapter_net",
                r#"
                fn NetResponseGenerator(ctx) { #{} }
                fn generate_response(q, p) { http_post_json("http://x", #{}, #{q: q}) }
                "#,
            )
            .unwrap();
        let mut state = engine
            .construct(&script, "NetResponseGenerator", &serde_json::json!({}))
            .unwrap();
        let err = engine
            .call_method(&script, &mut state, "generate_response", vec!["q".into(), "p".into()])
            .unwrap_err();
        assert!(err.to_string().contains("network operations are disabled"));
    }

    #[test]
    fn test_host_functions_when_allowed() {
        let host = Arc::new(RecordingHost::default());
        let engine = RhaiScriptEngine::new(ScriptSecurityConfig::approved_adapter(), host.clone());
        let script = engine
            .compile(
                "adapter_net",
                r#"
                fn NetResponseGenerator(ctx) { #{ url: ctx.url } }
                fn generate_response(q, p) {
                    let data = "data:" + image_mime_type(p) + ";base64," + read_image_base64(p);
                    let resp = http_post_json(this.url, #{ "x-key": "k" }, #{ q: q, image: data });
                    resp.answer
                }
                "#,
            )
            .unwrap();
        let mut state = engine
            .construct(&script, "NetResponseGenerator", &serde_json::json!({"url": "http://api"}))
            .unwrap();
        let out = engine
            .call_method(&script, &mut state, "generate_response", vec!["q".into(), "i.png".into()])
            .unwrap();

        assert_eq!(out.into_string().unwrap(), "a cat");
        let posts = host.posts.lock().unwrap();
        assert_eq!(posts[0].0, "http://api");
        assert_eq!(posts[0].1["image"], "data:image/png;base64,aGVsbG8=");
    }
}
