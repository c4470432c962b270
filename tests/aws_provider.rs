//! Behavioural tests for the AWS EC2 adapter driven through the scripted
//! gateway.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::time::Duration;

use iaas_connector::gateway::PublicAddress;
use iaas_connector::test_support::{ScriptedEc2Gateway, infrastructure};
use iaas_connector::{
    AwsEc2Provider, AwsProviderError, ConnectorConfig, InfrastructureProvider, InstanceRequest,
};
use rstest::{fixture, rstest};

use test_constants::{AWS_IMAGE, AWS_REGION};

#[fixture]
fn gateway() -> ScriptedEc2Gateway {
    ScriptedEc2Gateway::new()
}

fn provider(gateway: &ScriptedEc2Gateway) -> AwsEc2Provider<ScriptedEc2Gateway> {
    AwsEc2Provider::new(gateway.clone(), &ConnectorConfig::with_defaults())
        .unwrap_or_else(|err| panic!("provider should build: {err}"))
}

fn request(image: &str, number: u32) -> InstanceRequest {
    InstanceRequest::builder()
        .tag("integration")
        .image(image)
        .number(number)
        .min_ram(1024)
        .min_cores(1.0)
        .build()
        .unwrap_or_else(|err| panic!("request should build: {err}"))
}

/// Creates one instance and attaches an address through any adapter.
async fn provision_with_address<P>(
    provider: &P,
    request: &InstanceRequest,
) -> Result<(String, String), P::Error>
where
    P: InfrastructureProvider,
{
    let infra = infrastructure(P::TYPE);
    let instances = provider.create_instance(&infra, request).await?;
    let Some(instance) = instances.into_iter().next() else {
        panic!("provider returned no instance");
    };
    let address = provider.add_public_ip(&infra, &instance.id, None).await?;
    Ok((instance.id, address))
}

#[rstest]
#[tokio::test]
async fn full_lifecycle_reuses_a_free_address(gateway: ScriptedEc2Gateway) {
    gateway.push_address(AWS_REGION, PublicAddress::free("198.51.100.10"));
    let provider = provider(&gateway);

    let (instance_id, address) = provision_with_address(&provider, &request(AWS_IMAGE, 1))
        .await
        .unwrap_or_else(|err| panic!("provisioning should succeed: {err}"));

    assert_eq!(address, "198.51.100.10");
    assert_eq!(gateway.allocations(), 0);

    let infra = infrastructure("aws-ec2");
    provider
        .remove_public_ip(&infra, &instance_id, Some(&address))
        .await
        .unwrap_or_else(|err| panic!("release should succeed: {err}"));

    assert_eq!(
        gateway.addresses(AWS_REGION),
        vec![PublicAddress::free("198.51.100.10")]
    );
}

#[rstest]
#[tokio::test]
async fn key_deleted_remotely_is_replaced_on_next_request(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");

    provider
        .create_instance(&infra, &request(AWS_IMAGE, 1))
        .await
        .unwrap_or_else(|err| panic!("first batch: {err}"));
    let Some(first) = provider.key_pairs().cached(AWS_REGION) else {
        panic!("first key should be cached");
    };
    gateway.delete_remote_key_pair(AWS_REGION, &first.name);

    provider
        .create_instance(&infra, &request(AWS_IMAGE, 1))
        .await
        .unwrap_or_else(|err| panic!("second batch: {err}"));
    let Some(second) = provider.key_pairs().cached(AWS_REGION) else {
        panic!("replacement key should be cached");
    };

    assert_ne!(first.name, second.name);
    assert_eq!(gateway.key_pair_creations().len(), 2);
    let last_template_key = gateway
        .batches()
        .last()
        .and_then(|batch| batch.template.options.key_pair_name.clone());
    assert_eq!(last_template_key, Some(second.name));
}

#[rstest]
#[tokio::test]
async fn concurrent_requests_in_two_regions_cache_two_keys(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");
    let west = request(AWS_IMAGE, 1);
    let east = request("us-east-1/ami-0def5678", 2);

    let (west_result, east_result) = tokio::join!(
        provider.create_instance(&infra, &west),
        provider.create_instance(&infra, &east),
    );

    let west_instances = west_result.unwrap_or_else(|err| panic!("west batch: {err}"));
    let east_instances = east_result.unwrap_or_else(|err| panic!("east batch: {err}"));
    assert_eq!(west_instances.len(), 1);
    assert_eq!(east_instances.len(), 2);
    assert_eq!(provider.key_pairs().len(), 2);
    assert!(provider.key_pairs().cached("us-east-1").is_some());
}

#[rstest]
#[tokio::test]
async fn concurrent_address_requests_bind_distinct_addresses(gateway: ScriptedEc2Gateway) {
    gateway.push_address(AWS_REGION, PublicAddress::free("198.51.100.1"));
    gateway.push_allocatable("203.0.113.7");
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");
    let instances = provider
        .create_instance(&infra, &request(AWS_IMAGE, 2))
        .await
        .unwrap_or_else(|err| panic!("batch should succeed: {err}"));
    let ids: Vec<&str> = instances.iter().map(|instance| instance.id.as_str()).collect();
    let [first, second] = ids.as_slice() else {
        panic!("expected two instances, got {ids:?}");
    };

    let (first_address, second_address) = tokio::join!(
        provider.add_public_ip(&infra, first, None),
        provider.add_public_ip(&infra, second, None),
    );

    let first_address = first_address.unwrap_or_else(|err| panic!("first address: {err}"));
    let second_address = second_address.unwrap_or_else(|err| panic!("second address: {err}"));
    assert_ne!(first_address, second_address);
    let listed = gateway.addresses(AWS_REGION);
    assert_eq!(listed.len(), 2);
    assert!(listed.iter().all(|address| !address.is_free()));
    let shared: Vec<_> = listed
        .iter()
        .filter(|address| address.value == "198.51.100.1")
        .collect();
    assert_eq!(shared.len(), 1);
    assert_ne!(
        listed[0].associated_instance_id,
        listed[1].associated_instance_id
    );
}

#[rstest]
#[tokio::test]
async fn batch_failure_is_fatal_and_surfaces_no_instances(gateway: ScriptedEc2Gateway) {
    gateway.fail_batch("InsufficientInstanceCapacity");
    let provider = provider(&gateway);

    let result = provider
        .create_instance(&infrastructure("aws-ec2"), &request(AWS_IMAGE, 3))
        .await;

    let err = result.expect_err("batch should fail");
    assert!(
        matches!(err, AwsProviderError::BatchCreation { requested: 3, .. }),
        "expected BatchCreation, got {err:?}"
    );
    assert_eq!(gateway.node_count(), 0);
}

#[rstest]
#[tokio::test]
async fn exhausted_pool_fails_without_hanging(gateway: ScriptedEc2Gateway) {
    gateway.push_address(AWS_REGION, PublicAddress::free("198.51.100.10"));
    gateway.reject_association("198.51.100.10");
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");
    let instances = provider
        .create_instance(&infra, &request(AWS_IMAGE, 1))
        .await
        .unwrap_or_else(|err| panic!("creation should succeed: {err}"));
    let Some(instance) = instances.into_iter().next() else {
        panic!("one instance expected");
    };

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        provider.add_public_ip(&infra, &instance.id, None),
    )
    .await
    .unwrap_or_else(|_| panic!("acquisition should finish"));

    let err = outcome.expect_err("pool is exhausted");
    assert!(
        err.to_string().contains("no addresses available in region eu-west-1"),
        "unexpected error: {err}"
    );
    assert_eq!(gateway.association_attempts().len(), 1);
}
