//! Behavioural tests for the OpenStack Nova adapter driven through the
//! scripted gateway.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::collections::BTreeSet;

use iaas_connector::test_support::{ScriptedNovaGateway, floating_ip, infrastructure};
use iaas_connector::{
    AddressError, ConnectorConfig, InfrastructureProvider, InstanceCredentials, InstanceRequest,
    OpenStackProvider, OpenStackProviderError,
};
use rstest::{fixture, rstest};

use test_constants::OPENSTACK_FLAVOR;

#[fixture]
fn gateway() -> ScriptedNovaGateway {
    ScriptedNovaGateway::new()
}

fn provider(gateway: &ScriptedNovaGateway) -> OpenStackProvider<ScriptedNovaGateway> {
    OpenStackProvider::new(gateway.clone(), &ConnectorConfig::with_defaults())
        .unwrap_or_else(|err| panic!("provider should build: {err}"))
}

fn request(number: u32) -> InstanceRequest {
    InstanceRequest::builder()
        .tag("integration")
        .image("ubuntu-22.04")
        .number(number)
        .hardware_type(OPENSTACK_FLAVOR)
        .credentials(Some(InstanceCredentials::with_key_pair("ubuntu", "ops-key")))
        .build()
        .unwrap_or_else(|err| panic!("request should build: {err}"))
}

#[rstest]
#[tokio::test]
async fn two_sequential_creations_yield_two_distinct_instances(gateway: ScriptedNovaGateway) {
    let provider = provider(&gateway);

    let instances = provider
        .create_instance(&infrastructure("openstack-nova"), &request(2))
        .await
        .unwrap_or_else(|err| panic!("creation should succeed: {err}"));

    let ids: BTreeSet<&str> = instances.iter().map(|instance| instance.id.as_str()).collect();
    assert_eq!(instances.len(), 2);
    assert_eq!(ids.len(), 2);
    assert!(instances.iter().all(|instance| instance.status == "ACTIVE"));
}

#[rstest]
#[tokio::test]
async fn floating_ip_lifecycle(gateway: ScriptedNovaGateway) {
    gateway.push_floating_ip(floating_ip("172.24.4.10", Some("srv-other")));
    gateway.push_floating_ip(floating_ip("172.24.4.11", None));
    let provider = provider(&gateway);
    let infra = infrastructure("openstack-nova");
    let instances = provider
        .create_instance(&infra, &request(1))
        .await
        .unwrap_or_else(|err| panic!("creation should succeed: {err}"));
    let Some(instance) = instances.into_iter().next() else {
        panic!("one instance expected");
    };

    let ip = provider
        .add_public_ip(&infra, &instance.id, None)
        .await
        .unwrap_or_else(|err| panic!("floating IP should bind: {err}"));
    provider
        .remove_public_ip(&infra, &instance.id, None)
        .await
        .unwrap_or_else(|err| panic!("floating IP should unbind: {err}"));

    assert_eq!(ip, "172.24.4.11");
    assert_eq!(
        gateway.removed_floating_ips(),
        vec![(String::from("172.24.4.11"), instance.id)]
    );
}

#[rstest]
#[tokio::test]
async fn pool_without_free_entry_differs_from_missing_extension(gateway: ScriptedNovaGateway) {
    gateway.push_floating_ip(floating_ip("172.24.4.10", Some("srv-other")));
    let provider = provider(&gateway);
    let infra = infrastructure("openstack-nova");
    provider
        .create_instance(&infra, &request(1))
        .await
        .unwrap_or_else(|err| panic!("creation should succeed: {err}"));

    let exhausted = provider
        .add_public_ip(&infra, "srv-1", None)
        .await
        .expect_err("pool has no free entry");
    gateway.set_floating_ips_enabled(false);
    let unsupported = provider
        .add_public_ip(&infra, "srv-1", None)
        .await
        .expect_err("extension is disabled");

    assert!(matches!(
        exhausted,
        OpenStackProviderError::Address(AddressError::NoFloatingIp { .. })
    ));
    assert!(matches!(
        unsupported,
        OpenStackProviderError::Address(AddressError::Unsupported { .. })
    ));
    assert_ne!(exhausted.to_string(), unsupported.to_string());
}
