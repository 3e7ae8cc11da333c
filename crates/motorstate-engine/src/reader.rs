/*!
 * Attribute reading.
 *
 * Captures every attribute both endpoints of a motor expose. Attributes the
 * device cannot report are recorded as the not-a-number sentinel so that a
 * single bad attribute never prevents a snapshot.
 */
use tracing::{debug, info, warn, Instrument};

use motorstate_core::logging::motor_span;
use motorstate_core::types::{AttributeKey, AttributeMap, EndpointClass, MotorId, Value};
use motorstate_devices::{DeviceError, Endpoint, EndpointPair};

use crate::error::Result;

/// Read all attributes of both endpoints of `motor`
///
/// The primary endpoint is read first. Keys are `<class>:<name>`.
pub async fn read_parameters(motor: &MotorId, endpoints: &EndpointPair) -> Result<AttributeMap> {
    let span = motor_span("read", motor);

    async {
        let mut parameters = AttributeMap::new();
        for class in EndpointClass::ALL {
            read_endpoint(endpoints.get(class), class, &mut parameters).await?;
        }

        debug!("Read {} attributes of {}", parameters.len(), motor);
        Ok(parameters)
    }
    .instrument(span)
    .await
}

/// Read every attribute of one endpoint into `parameters`
pub async fn read_endpoint(
    endpoint: &dyn Endpoint,
    class: EndpointClass,
    parameters: &mut AttributeMap,
) -> Result<()> {
    for name in endpoint.list_attributes().await? {
        let value = match endpoint.read_attribute(&name).await {
            Ok(value) => value,
            Err(err @ DeviceError::NoValue { .. }) => {
                info!("{}, recording nan", err);
                Value::nan()
            }
            Err(err) if err.is_soft_read_failure() => {
                warn!("{}, recording nan", err);
                Value::nan()
            }
            Err(err) => return Err(err.into()),
        };

        parameters.insert(AttributeKey::new(class, &name), value);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use motorstate_devices::{connect_pair, MotorTarget, SimulatedBus};

    use crate::error::Error;

    fn target() -> MotorTarget {
        MotorTarget {
            motor: MotorId::from("EH1A.01"),
            primary_address: "p022/motor/EH1A.01".to_string(),
            secondary_address: "p022/ZMX/EH1A.01".to_string(),
        }
    }

    fn bus() -> SimulatedBus {
        let bus = SimulatedBus::new();
        let table = BTreeMap::from([
            ("a1".to_string(), Value::Integer(4)),
            ("a2".to_string(), Value::Integer(4)),
        ]);
        bus.insert_device("p022/motor/EH1A.01", table.clone()).unwrap();
        bus.insert_device("p022/ZMX/EH1A.01", table).unwrap();
        bus
    }

    #[tokio::test]
    async fn test_reads_both_endpoints() {
        let bus = bus();
        let target = target();
        let pair = connect_pair(&bus, &target, None).await.unwrap();

        let parameters = read_parameters(&target.motor, &pair).await.unwrap();
        let keys: Vec<_> = parameters.keys().map(|k| k.as_str()).collect();
        assert_eq!(keys, vec!["oms:a1", "oms:a2", "zmx:a1", "zmx:a2"]);
        assert!(parameters.values().all(|v| *v == Value::Integer(4)));
    }

    #[test_log::test(tokio::test)]
    async fn test_soft_failures_become_nan() {
        let bus = bus();
        bus.mark_undefined("p022/motor/EH1A.01", "a1").unwrap();
        bus.mark_undecodable("p022/ZMX/EH1A.01", "a2").unwrap();
        let target = target();
        let pair = connect_pair(&bus, &target, None).await.unwrap();

        let parameters = read_parameters(&target.motor, &pair).await.unwrap();
        assert_eq!(parameters.len(), 4);
        assert!(parameters[&AttributeKey::from("oms:a1")].is_nan());
        assert!(parameters[&AttributeKey::from("zmx:a2")].is_nan());
        assert_eq!(parameters[&AttributeKey::from("oms:a2")], Value::Integer(4));
    }

    #[tokio::test]
    async fn test_hard_failure_propagates() {
        let bus = bus();
        bus.mark_unreachable("p022/ZMX/EH1A.01", "a1").unwrap();
        let target = target();
        let pair = connect_pair(&bus, &target, None).await.unwrap();

        let err = read_parameters(&target.motor, &pair).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Device(DeviceError::CommunicationError(_))
        ));
    }
}
