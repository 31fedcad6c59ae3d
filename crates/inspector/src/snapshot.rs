//! Device snapshot builder
//!
//! Walks the interface and endpoint descriptors of one device and produces an
//! immutable [`DeviceSnapshot`]. Permission state is never touched here.

use crate::classifier::{classify_interface_class, endpoint_transfer_type};
use crate::provider::{Connection, UsbProvider};
use types::{
    AccessError, DescriptorLocation, DeviceIdentity, DeviceSnapshot, Direction,
    EndpointDescriptor, InterfaceDescriptor, ProviderError, RawInterface,
};
use tracing::{debug, warn};

/// Read the full descriptor tree of `identity`
///
/// The connection is opened once and released before returning on every
/// path. A failed open performs no further reads.
pub fn build_snapshot<P: UsbProvider + ?Sized>(
    identity: &DeviceIdentity,
    provider: &P,
) -> Result<DeviceSnapshot, AccessError> {
    let connection = Connection::open(provider, identity).map_err(|reason| {
        warn!("Failed to open {}: {}", identity, reason);
        AccessError::OpenFailed { reason }
    })?;

    let product_name = connection.product_name();
    let manufacturer_name = connection.manufacturer_name();

    let interface_count = connection
        .interface_count()
        .map_err(|e| malformed(DescriptorLocation::configuration(), &e))?;
    let mut interfaces = Vec::with_capacity(usize::from(interface_count));

    for index in 0..interface_count {
        let raw = connection
            .interface(index)
            .map_err(|e| malformed(DescriptorLocation::interface(index), &e))?;
        interfaces.push(read_interface(&connection, index, &raw)?);
    }

    debug!(
        "Read {} interface(s) from {}",
        interfaces.len(),
        identity
    );

    Ok(DeviceSnapshot {
        identity: identity.clone(),
        product_name,
        manufacturer_name,
        interfaces,
    })
}

fn read_interface<P: UsbProvider + ?Sized>(
    connection: &Connection<'_, P>,
    index: u8,
    raw: &RawInterface,
) -> Result<InterfaceDescriptor, AccessError> {
    let mut endpoints = Vec::with_capacity(usize::from(raw.endpoint_count));

    for endpoint_index in 0..raw.endpoint_count {
        let location = DescriptorLocation::endpoint(index, endpoint_index);
        let endpoint = connection
            .endpoint(raw, endpoint_index)
            .map_err(|e| malformed(location, &e))?;

        if endpoint.max_packet_size == 0 {
            return Err(AccessError::MalformedDescriptor {
                location,
                detail: "max packet size is 0".to_string(),
            });
        }

        endpoints.push(EndpointDescriptor {
            index: endpoint_index,
            address: endpoint.address,
            direction: Direction::from_code(endpoint.direction_code),
            transfer_type: endpoint_transfer_type(endpoint.type_code),
            max_packet_size: endpoint.max_packet_size,
            interval: endpoint.interval,
        });
    }

    Ok(InterfaceDescriptor {
        index,
        interface_class: raw.class,
        interface_class_label: classify_interface_class(raw.class).into_owned(),
        subclass: raw.subclass,
        protocol: raw.protocol,
        endpoints,
    })
}

fn malformed(location: DescriptorLocation, error: &ProviderError) -> AccessError {
    AccessError::MalformedDescriptor {
        location,
        detail: format!("descriptor read failed: {}", error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify_endpoint_type;
    use crate::testing::{MockDevice, MockProvider, create_mock_identity};
    use types::{RawEndpoint, TransferType};

    #[test]
    fn test_mass_storage_snapshot() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678);
        let identity = device.identity.clone();
        let provider = MockProvider::new(vec![device]);

        let snapshot = build_snapshot(&identity, &provider).unwrap();

        assert_eq!(snapshot.identity, identity);
        assert_eq!(snapshot.interfaces.len(), 1);

        let interface = &snapshot.interfaces[0];
        assert_eq!(interface.index, 0);
        assert_eq!(interface.interface_class, 0x08);
        assert_eq!(interface.interface_class_label, "Mass Storage");
        assert_eq!(interface.endpoints.len(), 2);

        assert_eq!(interface.endpoints[0].index, 0);
        assert_eq!(interface.endpoints[0].direction, Direction::In);
        assert_eq!(interface.endpoints[0].transfer_type, TransferType::Bulk);
        assert_eq!(interface.endpoints[0].max_packet_size, 512);
        assert_eq!(interface.endpoints[1].index, 1);
        assert_eq!(interface.endpoints[1].direction, Direction::Out);
        assert_eq!(interface.endpoints[1].transfer_type, TransferType::Bulk);
        assert_eq!(interface.endpoints[1].max_packet_size, 512);

        assert_eq!(provider.open_count(), 1);
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_absent_strings_are_not_errors() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678).with_names(None, None);
        let identity = device.identity.clone();
        let provider = MockProvider::new(vec![device]);

        let snapshot = build_snapshot(&identity, &provider).unwrap();
        assert!(snapshot.product_name.is_none());
        assert!(snapshot.manufacturer_name.is_none());
    }

    #[test]
    fn test_open_failure_performs_no_reads() {
        let device = MockDevice::mass_storage(1, 0x1234, 0x5678).with_open_error(ProviderError::Busy);
        let identity = device.identity.clone();
        let provider = MockProvider::new(vec![device]);

        let result = build_snapshot(&identity, &provider);

        assert_eq!(
            result,
            Err(AccessError::OpenFailed {
                reason: ProviderError::Busy
            })
        );
        assert_eq!(provider.read_count(), 0);
        assert_eq!(provider.close_count(), 0);
    }

    #[test]
    fn test_zero_packet_size_is_malformed_and_closes() {
        let identity = create_mock_identity(2, 0x046d, 0xc077);
        let device = MockDevice::new(identity.clone()).with_interface(
            0x03,
            vec![RawEndpoint {
                address: 0x81,
                direction_code: 0x80,
                type_code: 3,
                max_packet_size: 0,
                interval: 10,
            }],
        );
        let provider = MockProvider::new(vec![device]);

        let result = build_snapshot(&identity, &provider);

        match result {
            Err(AccessError::MalformedDescriptor { location, detail }) => {
                assert_eq!(location, DescriptorLocation::endpoint(0, 0));
                assert!(detail.contains("max packet size is 0"));
            }
            other => panic!("expected malformed descriptor, got {:?}", other),
        }
        assert_eq!(provider.open_count(), 1);
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_unreadable_interface_is_malformed() {
        let device = MockDevice::mass_storage(3, 0x1234, 0x5678).with_broken_interface(0);
        let identity = device.identity.clone();
        let provider = MockProvider::new(vec![device]);

        let result = build_snapshot(&identity, &provider);

        assert!(matches!(
            result,
            Err(AccessError::MalformedDescriptor { location, .. }) if location == DescriptorLocation::interface(0)
        ));
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_missing_configuration_is_malformed() {
        let device = MockDevice::mass_storage(5, 0x1234, 0x5678).without_config();
        let identity = device.identity.clone();
        let provider = MockProvider::new(vec![device]);

        let result = build_snapshot(&identity, &provider);

        match result {
            Err(AccessError::MalformedDescriptor { location, detail }) => {
                assert_eq!(location, DescriptorLocation::configuration());
                assert!(detail.contains("Not found"));
            }
            other => panic!("expected malformed descriptor, got {:?}", other),
        }
        assert_eq!(provider.open_count(), 1);
        assert_eq!(provider.close_count(), 1);
    }

    #[test]
    fn test_reserved_transfer_type_is_unknown() {
        let identity = create_mock_identity(6, 0x1234, 0x0007);
        let device = MockDevice::new(identity.clone()).with_interface(
            0xFF,
            vec![RawEndpoint {
                address: 0x83,
                direction_code: 0x80,
                type_code: 7,
                max_packet_size: 64,
                interval: 0,
            }],
        );
        let provider = MockProvider::new(vec![device]);

        let snapshot = build_snapshot(&identity, &provider).unwrap();

        let endpoint = &snapshot.interfaces[0].endpoints[0];
        assert_eq!(endpoint.transfer_type, TransferType::Unknown);
        assert_eq!(endpoint.transfer_type.label(), classify_endpoint_type(7));
    }

    #[test]
    fn test_interfaces_keep_provider_order() {
        let identity = create_mock_identity(4, 0x0bda, 0x8153);
        let device = MockDevice::new(identity.clone())
            .with_interface(0xFF, vec![MockDevice::bulk_in(0x81, 64)])
            .with_interface(0x0E, vec![])
            .with_interface(0x13, vec![MockDevice::bulk_out(0x02, 64)]);
        let provider = MockProvider::new(vec![device]);

        let snapshot = build_snapshot(&identity, &provider).unwrap();

        let indices: Vec<u8> = snapshot.interfaces.iter().map(|i| i.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(snapshot.interfaces[0].interface_class_label, "Vendor Specific");
        assert_eq!(snapshot.interfaces[1].interface_class_label, "Video");
        assert_eq!(snapshot.interfaces[2].interface_class_label, "code 19");
        assert_eq!(snapshot.endpoint_count(), 2);
    }
}
