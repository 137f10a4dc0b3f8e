use colored::Colorize;
use futures::future::{self, BoxFuture, FutureExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt;
use std::fs;
use std::future::Future;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

// =============================================================================
// Milestone 1: Error types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    #[error("Invalid proxy state: {0}")]
    InvalidProxyState(String),
}

impl ProxyError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidProxyState(message.into())
    }
}

/// Errors surfaced by a [`Service`] call.
///
/// `Failed` belongs to the target and passes through the proxy untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("Service call failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

// =============================================================================
// Milestone 2: The capability set
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallShape {
    Sync,
    AsyncUnit,
    AsyncValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capability {
    pub name: &'static str,
    pub shape: CallShape,
}

impl Capability {
    pub const fn new(name: &'static str, shape: CallShape) -> Self {
        Self { name, shape }
    }
}

pub trait Service: Send + Sync {
    fn do_something(&self) -> Result<(), ServiceError>;

    fn do_something_async(&self) -> BoxFuture<'_, Result<(), ServiceError>>;

    fn get_result_async(&self) -> BoxFuture<'_, Result<bool, ServiceError>>;
}

pub const SERVICE_CAPABILITIES: &[Capability] = &[
    Capability::new("do_something", CallShape::Sync),
    Capability::new("do_something_async", CallShape::AsyncUnit),
    Capability::new("get_result_async", CallShape::AsyncValue),
];

// Lets several owners share one target while a proxy wraps it.
impl<S: Service + ?Sized> Service for Arc<S> {
    fn do_something(&self) -> Result<(), ServiceError> {
        (**self).do_something()
    }

    fn do_something_async(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        (**self).do_something_async()
    }

    fn get_result_async(&self) -> BoxFuture<'_, Result<bool, ServiceError>> {
        (**self).get_result_async()
    }
}

/// Every operation takes `delay` to finish.
#[derive(Debug, Clone)]
pub struct SlowService {
    delay: Duration,
}

impl SlowService {
    pub fn new(delay: Duration) -> Self {
        SlowService { delay }
    }
}

impl Service for SlowService {
    fn do_something(&self) -> Result<(), ServiceError> {
        thread::sleep(self.delay);
        Ok(())
    }

    fn do_something_async(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        async move {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }
        .boxed()
    }

    fn get_result_async(&self) -> BoxFuture<'_, Result<bool, ServiceError>> {
        async move {
            tokio::time::sleep(self.delay).await;
            Ok(true)
        }
        .boxed()
    }
}

/// Validated method table of a capability set.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    methods: Vec<Capability>,
}

impl CapabilityTable {
    pub fn new(methods: &[Capability]) -> Result<Self, ProxyError> {
        if methods.is_empty() {
            return Err(ProxyError::invalid("capability set declares no methods"));
        }

        let mut seen = HashSet::new();
        for method in methods {
            if method.name.is_empty() {
                return Err(ProxyError::invalid("capability set contains an unnamed method"));
            }
            if !seen.insert(method.name) {
                return Err(ProxyError::invalid(format!(
                    "method `{}` is declared more than once",
                    method.name
                )));
            }
        }

        Ok(CapabilityTable {
            methods: methods.to_vec(),
        })
    }

    pub fn resolve(&self, name: &str, shape: CallShape) -> Result<Capability, ProxyError> {
        let method = self
            .methods
            .iter()
            .find(|method| method.name == name)
            .copied()
            .ok_or_else(|| {
                ProxyError::invalid(format!("method `{name}` is not part of the capability set"))
            })?;

        if method.shape != shape {
            return Err(ProxyError::invalid(format!(
                "method `{name}` is declared {:?} but was invoked as {:?}",
                method.shape, shape
            )));
        }

        Ok(method)
    }
}

// =============================================================================
// Milestone 3: One intercepted call, one measurement
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
}

impl Outcome {
    fn of<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => Outcome::Completed,
            Err(_) => Outcome::Failed,
        }
    }
}

/// Started right before the target begins its work; consumed by [`InterceptedCall::finish`].
#[derive(Debug)]
pub struct InterceptedCall {
    method: Capability,
    started: Instant,
}

impl InterceptedCall {
    fn start(method: Capability) -> Self {
        InterceptedCall {
            method,
            started: Instant::now(),
        }
    }

    fn finish(self, threshold: Duration, outcome: Outcome) -> Measurement {
        Measurement {
            method: self.method.name,
            elapsed: self.started.elapsed(),
            threshold,
            outcome,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Measurement {
    pub method: &'static str,
    pub elapsed: Duration,
    pub threshold: Duration,
    pub outcome: Outcome,
}

impl Measurement {
    pub fn exceeded(&self) -> bool {
        self.elapsed > self.threshold
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Method {} took {}ms, exceeding the threshold of {}ms.",
            self.method,
            self.elapsed.as_millis(),
            self.threshold.as_millis()
        )?;
        if self.outcome == Outcome::Failed {
            write!(f, " (call failed)")?;
        }
        Ok(())
    }
}

// =============================================================================
// Milestone 4: The monitor (timing + threshold check around any call)
// =============================================================================

/// Times calls against a fixed threshold and reports the slow ones to `W`.
///
/// Per-call state lives in the [`InterceptedCall`] of that call only, so
/// concurrent calls never observe each other. The mutex guards the output
/// stream, not the measurements.
pub struct Monitor<W = io::Stdout> {
    capabilities: CapabilityTable,
    threshold: Duration,
    out: Mutex<W>,
}

impl Monitor<io::Stdout> {
    pub fn new(capabilities: &[Capability], threshold: Duration) -> Result<Self, ProxyError> {
        Self::with_writer(capabilities, threshold, io::stdout())
    }
}

impl<W: Write + Send> Monitor<W> {
    pub fn with_writer(
        capabilities: &[Capability],
        threshold: Duration,
        out: W,
    ) -> Result<Self, ProxyError> {
        Ok(Monitor {
            capabilities: CapabilityTable::new(capabilities)?,
            threshold,
            out: Mutex::new(out),
        })
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub fn intercept_sync<T, E>(
        &self,
        method: &str,
        forward: impl FnOnce() -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<ProxyError>,
    {
        let call = InterceptedCall::start(self.resolve(method, CallShape::Sync)?);
        let result = forward();
        self.complete(call, &result);
        result
    }

    pub fn intercept_async_unit<'a, E, F>(
        &'a self,
        method: &str,
        forward: impl FnOnce() -> F,
    ) -> BoxFuture<'a, Result<(), E>>
    where
        F: Future<Output = Result<(), E>> + Send + 'a,
        E: From<ProxyError> + Send + 'a,
    {
        self.intercept_async(method, CallShape::AsyncUnit, forward)
    }

    pub fn intercept_async_value<'a, T, E, F>(
        &'a self,
        method: &str,
        forward: impl FnOnce() -> F,
    ) -> BoxFuture<'a, Result<T, E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: From<ProxyError> + Send + 'a,
    {
        self.intercept_async(method, CallShape::AsyncValue, forward)
    }

    fn intercept_async<'a, T, E, F>(
        &'a self,
        method: &str,
        shape: CallShape,
        forward: impl FnOnce() -> F,
    ) -> BoxFuture<'a, Result<T, E>>
    where
        F: Future<Output = Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: From<ProxyError> + Send + 'a,
    {
        let capability = match self.resolve(method, shape) {
            Ok(capability) => capability,
            Err(err) => return future::ready(Err(err.into())).boxed(),
        };

        // The target does no work until first polled, so the clock starts there.
        let pending = forward();
        async move {
            let call = InterceptedCall::start(capability);
            let result = pending.await;
            self.complete(call, &result);
            result
        }
        .boxed()
    }

    fn resolve(&self, method: &str, shape: CallShape) -> Result<Capability, ProxyError> {
        self.capabilities.resolve(method, shape)
    }

    fn complete<T, E>(&self, call: InterceptedCall, result: &Result<T, E>) {
        let measurement = call.finish(self.threshold, Outcome::of(result));
        if measurement.exceeded() {
            self.report(&measurement);
        }
    }

    fn report(&self, measurement: &Measurement) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(err) = writeln!(out, "{measurement}").and_then(|()| out.flush()) {
            eprintln!("failed to report slow call: {err}");
        }
    }
}

// =============================================================================
// Milestone 5: The proxy
// =============================================================================

/// Presents the same [`Service`] as `target`, timing every call.
pub struct PerformanceMonitoringProxy<S, W = io::Stdout> {
    target: S,
    monitor: Monitor<W>,
}

impl<S: Service> PerformanceMonitoringProxy<S> {
    pub fn create(target: S, threshold: Duration) -> Result<Self, ProxyError> {
        let monitor = Monitor::new(SERVICE_CAPABILITIES, threshold)?;
        Ok(PerformanceMonitoringProxy { target, monitor })
    }
}

impl<S: Service, W: Write + Send> PerformanceMonitoringProxy<S, W> {
    pub fn create_with_writer(target: S, threshold: Duration, out: W) -> Result<Self, ProxyError> {
        let monitor = Monitor::with_writer(SERVICE_CAPABILITIES, threshold, out)?;
        Ok(PerformanceMonitoringProxy { target, monitor })
    }

    pub fn threshold(&self) -> Duration {
        self.monitor.threshold()
    }
}

impl<S: Service, W: Write + Send> Service for PerformanceMonitoringProxy<S, W> {
    fn do_something(&self) -> Result<(), ServiceError> {
        self.monitor
            .intercept_sync("do_something", || self.target.do_something())
    }

    fn do_something_async(&self) -> BoxFuture<'_, Result<(), ServiceError>> {
        self.monitor
            .intercept_async_unit("do_something_async", || self.target.do_something_async())
    }

    fn get_result_async(&self) -> BoxFuture<'_, Result<bool, ServiceError>> {
        self.monitor
            .intercept_async_value("get_result_async", || self.target.get_result_async())
    }
}

// =============================================================================
// Milestone 6: Configuration
// =============================================================================

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub threshold_ms: u64,
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemoConfig {
    pub delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            threshold_ms: 100,
            demo: DemoConfig::default(),
        }
    }
}

impl Default for DemoConfig {
    fn default() -> Self {
        DemoConfig { delay_ms: 150 }
    }
}

impl MonitorConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.demo.delay_ms)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => MonitorConfig::from_file(Path::new(&path))?,
        None => MonitorConfig::default(),
    };

    println!("{}", "=== Performance Monitoring Proxy ===".bold());
    println!(
        "threshold: {}ms, service delay: {}ms\n",
        config.threshold_ms, config.demo.delay_ms
    );

    let proxy =
        PerformanceMonitoringProxy::create(SlowService::new(config.delay()), config.threshold())?;

    println!("{}", "-- do_something (blocking)".cyan());
    proxy.do_something()?;

    println!("{}", "-- do_something_async".cyan());
    proxy.do_something_async().await?;

    println!("{}", "-- get_result_async".cyan());
    let result = proxy.get_result_async().await?;
    println!("result: {result}");

    println!("{}", "-- two overlapping calls".cyan());
    let (unit, value) = tokio::join!(proxy.do_something_async(), proxy.get_result_async());
    unit?;
    println!("result: {}", value?);

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
