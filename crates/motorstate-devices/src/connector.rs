/*!
 * Endpoint connection.
 *
 * Connectors turn endpoint addresses into live handles. The engine never
 * connects on its own; it is handed an [`EndpointPair`] per motor.
 */
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use motorstate_core::types::{EndpointClass, Value};
use motorstate_core::utils::with_timeout;

use crate::device::{CommitStatus, Endpoint, Result};
use crate::resolver::MotorTarget;

/// Connector trait for control-system backends
#[async_trait]
pub trait EndpointConnector: Send + Sync + Debug {
    /// Get the backend name
    fn name(&self) -> &'static str;

    /// Connect to the endpoint at `address`
    async fn connect(&self, address: &str, class: EndpointClass) -> Result<Arc<dyn Endpoint>>;
}

/// The two endpoints of one motor
#[derive(Debug, Clone)]
pub struct EndpointPair {
    /// Primary (`oms`) endpoint
    pub primary: Arc<dyn Endpoint>,
    /// Secondary (`zmx`) endpoint
    pub secondary: Arc<dyn Endpoint>,
}

impl EndpointPair {
    /// Create a pair from two handles
    pub fn new(primary: Arc<dyn Endpoint>, secondary: Arc<dyn Endpoint>) -> Self {
        Self { primary, secondary }
    }

    /// Endpoint of `class`
    pub fn get(&self, class: EndpointClass) -> &dyn Endpoint {
        match class {
            EndpointClass::Primary => self.primary.as_ref(),
            EndpointClass::Secondary => self.secondary.as_ref(),
        }
    }
}

/// Connect both endpoints of a motor, optionally bounding every call
pub async fn connect_pair(
    connector: &dyn EndpointConnector,
    target: &MotorTarget,
    limit: Option<Duration>,
) -> Result<EndpointPair> {
    debug!(
        "Connecting {} via {} ({}, {})",
        target.motor,
        connector.name(),
        target.primary_address,
        target.secondary_address
    );

    let primary = connect_one(connector, target, EndpointClass::Primary, limit).await?;
    let secondary = connect_one(connector, target, EndpointClass::Secondary, limit).await?;
    Ok(EndpointPair::new(primary, secondary))
}

async fn connect_one(
    connector: &dyn EndpointConnector,
    target: &MotorTarget,
    class: EndpointClass,
    limit: Option<Duration>,
) -> Result<Arc<dyn Endpoint>> {
    let address = target.address(class);
    match limit {
        Some(limit) => {
            let handle = with_timeout(limit, connector.connect(address, class)).await?;
            Ok(Arc::new(TimedEndpoint::new(handle, limit)))
        }
        None => connector.connect(address, class).await,
    }
}

/// Endpoint decorator that bounds every call with a timeout
#[derive(Debug)]
pub struct TimedEndpoint {
    inner: Arc<dyn Endpoint>,
    limit: Duration,
}

impl TimedEndpoint {
    /// Wrap `inner`, failing any call that takes longer than `limit`
    pub fn new(inner: Arc<dyn Endpoint>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl Endpoint for TimedEndpoint {
    fn address(&self) -> &str {
        self.inner.address()
    }

    fn class(&self) -> EndpointClass {
        self.inner.class()
    }

    async fn list_attributes(&self) -> Result<Vec<String>> {
        with_timeout(self.limit, self.inner.list_attributes()).await
    }

    async fn read_attribute(&self, name: &str) -> Result<Value> {
        with_timeout(self.limit, self.inner.read_attribute(name)).await
    }

    async fn write_attribute(&self, name: &str, value: Value) -> Result<()> {
        with_timeout(self.limit, self.inner.write_attribute(name, value)).await
    }

    async fn commit(&self) -> Result<CommitStatus> {
        with_timeout(self.limit, self.inner.commit()).await
    }
}
