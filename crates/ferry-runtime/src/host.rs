//! Host: one runtime context with the bridge and library classes installed
//!
//! The converter registry and the worker pool are process-wide. The registry
//! for the default conversion settings is built once and shared by every
//! host; a host configured differently gets its own. The first host starts
//! the worker pool and installs it as the background queue native code
//! submits to.

use std::sync::Arc;
use std::time::Duration;

use ferry_engine::bridge::{self, ConverterRegistry};
use ferry_engine::runtime::PropertySpec;
use ferry_engine::{
    BridgeConfig, ConfigError, ContextId, Context, ConversionConfig, JsResult, ObjectRef,
    ShutdownReport, Value, WorkerConfig, WorkerPool,
};
use ferry_sdk::{task, Reflect, TypeDescriptor};
use ferry_stdlib::{Calculator, Imaging, Matrix, Ticker};
use once_cell::sync::OnceCell;

use crate::{RuntimeError, RuntimeOptions};

/// Global property holding the exported classes
pub const EXPORTS_NAME: &str = "ferry";

static DEFAULT_REGISTRY: OnceCell<Arc<ConverterRegistry>> = OnceCell::new();
static WORKER_POOL: OnceCell<Arc<WorkerPool>> = OnceCell::new();

// ============================================================================
// Registry
// ============================================================================

/// Descriptors of every library type, in export order
pub fn descriptors() -> Vec<&'static TypeDescriptor> {
    vec![
        Calculator::descriptor(),
        Matrix::descriptor(),
        Imaging::descriptor(),
        Ticker::descriptor(),
    ]
}

fn build_registry(config: &BridgeConfig) -> Result<ConverterRegistry, ConfigError> {
    Ok(ConverterRegistry::builder()
        .with_config(config)?
        .register_class::<Calculator>()
        .register_class::<Matrix>()
        .register_class::<Imaging>()
        .register_class::<Ticker>()
        .build())
}

/// Shared registry for the default conversion settings
pub fn default_registry() -> Result<Arc<ConverterRegistry>, ConfigError> {
    DEFAULT_REGISTRY
        .get_or_try_init(|| build_registry(&BridgeConfig::default()).map(Arc::new))
        .cloned()
}

/// Registry for `config`, shared when its conversion settings are the defaults
pub fn registry_for(config: &BridgeConfig) -> Result<Arc<ConverterRegistry>, ConfigError> {
    if config.bridge == ConversionConfig::default() {
        default_registry()
    } else {
        log::debug!("building registry for custom conversion settings");
        build_registry(config).map(Arc::new)
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

/// Process-wide worker pool, started by the first call
pub fn worker_pool(config: &WorkerConfig) -> std::io::Result<Arc<WorkerPool>> {
    let pool = WORKER_POOL.get_or_try_init(|| {
        let pool = Arc::new(WorkerPool::from_config(config)?);
        if !task::install(pool.clone()) {
            log::warn!("a background queue is already installed; library jobs bypass the worker pool");
        }
        Ok::<_, std::io::Error>(pool)
    })?;
    if pool.thread_count() != config.thread_count() {
        log::debug!(
            "worker pool already running with {} thread(s)",
            pool.thread_count()
        );
    }
    Ok(pool.clone())
}

// ============================================================================
// Host
// ============================================================================

/// Runtime context with every library class exported.
///
/// The classes are defined on an exports object, which is also reachable
/// from foreign code as the global `ferry`.
pub struct Host {
    cx: Context,
    exports: ObjectRef,
    pool: Arc<WorkerPool>,
}

impl Host {
    /// Set up a context as configured by `options`
    pub fn new(options: &RuntimeOptions) -> Result<Self, RuntimeError> {
        let registry = registry_for(&options.config)?;
        let pool = worker_pool(&options.config.workers)?;

        let cx = Context::new();
        bridge::install(&cx, registry);
        let exports = cx.create_object();
        bridge::export_classes(&cx, &exports);
        cx.define_properties(
            &cx.global(),
            &[PropertySpec::value(EXPORTS_NAME, Value::Object(exports.clone())).read_only()],
        );
        log::info!(
            "host ready on context {} ({} class(es), {} worker(s))",
            cx.id().as_u64(),
            exports.keys().len(),
            pool.thread_count()
        );

        Ok(Host { cx, exports, pool })
    }

    /// Runtime context
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// Context ID
    pub fn id(&self) -> ContextId {
        self.cx.id()
    }

    /// Object holding the exported classes
    pub fn exports(&self) -> &ObjectRef {
        &self.exports
    }

    /// Worker pool shared by every host
    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Exported class by name; `undefined` if there is none
    pub fn class(&self, name: &str) -> JsResult<Value> {
        self.cx.get(&self.exports, name)
    }

    /// Construct an instance of an exported class
    pub fn construct(&self, name: &str, args: &[Value]) -> JsResult<ObjectRef> {
        let class = self.class(name)?;
        if class.is_undefined() {
            return Err(self.cx.type_error(format!("{} is not an exported class", name)));
        }
        match self.cx.construct(&class, args)? {
            Value::Object(object) => Ok(object),
            other => Err(self.cx.type_error(format!(
                "{} constructed a non-object: {}",
                name,
                self.cx.describe(&other)
            ))),
        }
    }

    /// Pump the event loop until it goes idle or `timeout` passes
    pub fn run_until_idle(&self, timeout: Duration) -> bool {
        self.cx.run_until_idle(timeout)
    }

    /// Drain everything written to the diagnostic channel
    pub fn take_diagnostics(&self) -> Vec<String> {
        self.cx.take_diagnostics()
    }

    /// Deliver queued wakes, then stop the process-wide worker pool.
    ///
    /// Background jobs submitted afterwards run on dedicated threads.
    pub fn shutdown(self) -> ShutdownReport {
        let delivered = self.cx.run_pending();
        log::debug!("delivered {} wake(s) before shutdown", delivered);
        self.pool.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_names() {
        let names: Vec<&str> = descriptors().into_iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["Calculator", "Matrix", "Imaging", "Ticker"]);
    }

    #[test]
    fn test_default_registry_is_shared() {
        let a = registry_for(&BridgeConfig::default()).unwrap();
        let b = default_registry().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.classes().len(), 4);
    }

    #[test]
    fn test_custom_settings_get_own_registry() {
        let config = BridgeConfig::from_toml_str("[bridge]\nmax_external_buffer_len = 64\n").unwrap();
        let registry = registry_for(&config).unwrap();
        assert_eq!(registry.max_buffer_len(), 64);
        assert!(!Arc::ptr_eq(&registry, &default_registry().unwrap()));
    }

    #[test]
    fn test_unknown_dynamic_type_rejected() {
        let config = BridgeConfig::from_toml_str("[bridge]\ndynamic_types = [\"nope\"]\n").unwrap();
        assert!(matches!(registry_for(&config), Err(ConfigError::UnknownType(_))));
    }

    #[test]
    fn test_exports_reachable_from_global() {
        let host = Host::new(&RuntimeOptions::default().with_threads(2)).unwrap();
        let cx = host.context();
        let exports = cx.get(&cx.global(), EXPORTS_NAME).unwrap();
        assert!(exports.as_object().unwrap().ptr_eq(host.exports()));
        assert!(host.class("Calculator").unwrap().is_function());
        assert!(host.class("Nope").unwrap().is_undefined());
    }

    #[test]
    fn test_construct_unknown_class_throws() {
        let host = Host::new(&RuntimeOptions::default()).unwrap();
        let err = host.construct("Nope", &[]).unwrap_err();
        assert_eq!(
            host.context().describe(err.value()),
            "TypeError: Nope is not an exported class"
        );
    }
}
