//! Unit tests for the AWS EC2 adapter.

use super::*;
use crate::address::AddressError;
use crate::gateway::{GatewayError, PublicAddress};
use crate::test_support::{ScriptedEc2Gateway, ec2_node, infrastructure};
use rstest::{fixture, rstest};

const REGION: &str = "eu-west-1";

#[fixture]
fn gateway() -> ScriptedEc2Gateway {
    ScriptedEc2Gateway::new()
}

fn provider(gateway: &ScriptedEc2Gateway) -> AwsEc2Provider<ScriptedEc2Gateway> {
    AwsEc2Provider::new(gateway.clone(), &ConnectorConfig::with_defaults())
        .expect("default configuration should be valid")
}

fn request(number: u32) -> InstanceRequest {
    InstanceRequest::builder()
        .tag("workers")
        .image("eu-west-1/ami-0abc")
        .number(number)
        .min_ram(2048)
        .min_cores(2.0)
        .build()
        .expect("request should build")
}

#[rstest]
#[tokio::test]
async fn creates_instances_with_the_region_key_pair(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let infra = infrastructure(AwsEc2Provider::<ScriptedEc2Gateway>::TYPE);

    let instances = provider
        .create_instance(&infra, &request(2))
        .await
        .expect("creation should succeed");

    assert_eq!(instances.len(), 2);
    assert!(instances.iter().all(|instance| instance.id.starts_with("eu-west-1/")));
    assert!(instances.iter().all(|instance| instance.number == 1));

    let creations = gateway.key_pair_creations();
    assert_eq!(creations.len(), 1);
    let (region, name) = &creations[0];
    assert_eq!(region, REGION);
    assert!(name.starts_with("default-eu-west-1-"));

    let batches = gateway.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].count, 2);
    assert_eq!(batches[0].template.options.key_pair_name.as_deref(), Some(name.as_str()));
    assert_eq!(batches[0].template.options.login_user.as_deref(), Some("ubuntu"));
}

#[rstest]
#[tokio::test]
async fn second_request_reuses_the_cached_key_pair(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");

    provider.create_instance(&infra, &request(1)).await.expect("first batch");
    provider.create_instance(&infra, &request(1)).await.expect("second batch");

    assert_eq!(gateway.key_pair_creations().len(), 1);
    assert_eq!(gateway.key_pair_listings(), 1);
    assert_eq!(provider.key_pairs().len(), 1);
}

#[rstest]
#[tokio::test]
async fn explicit_credentials_bypass_the_cache(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let credentials = InstanceCredentials::with_key_pair("admin", "my-key");
    let request = InstanceRequest::builder()
        .tag("workers")
        .image("eu-west-1/ami-0abc")
        .min_ram(1024)
        .min_cores(1.0)
        .credentials(Some(credentials))
        .build()
        .expect("request should build");

    provider
        .create_instance(&infrastructure("aws-ec2"), &request)
        .await
        .expect("creation should succeed");

    assert!(gateway.key_pair_creations().is_empty());
    assert!(provider.key_pairs().is_empty());
    let batches = gateway.batches();
    assert_eq!(batches[0].template.options.key_pair_name.as_deref(), Some("my-key"));
    assert_eq!(batches[0].template.options.login_user.as_deref(), Some("admin"));
}

#[rstest]
#[tokio::test]
async fn batch_failure_returns_no_partial_set(gateway: ScriptedEc2Gateway) {
    gateway.fail_batch("InsufficientInstanceCapacity");
    let provider = provider(&gateway);

    let err = provider
        .create_instance(&infrastructure("aws-ec2"), &request(3))
        .await
        .expect_err("batch should fail");

    assert_eq!(
        err,
        AwsProviderError::BatchCreation {
            group: String::from("workers"),
            requested: 3,
            message: String::from("RunInstances failed: InsufficientInstanceCapacity"),
        }
    );
}

#[rstest]
#[tokio::test]
async fn image_without_region_is_rejected(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);
    let request = InstanceRequest::builder()
        .tag("workers")
        .image("ami-0abc")
        .min_ram(1024)
        .min_cores(1.0)
        .build()
        .expect("request should build");

    let err = provider
        .create_instance(&infrastructure("aws-ec2"), &request)
        .await
        .expect_err("image has no region");

    assert!(matches!(err, AwsProviderError::Region(RegionError::MalformedImage { .. })));
    assert!(gateway.batches().is_empty());
}

#[rstest]
#[tokio::test]
async fn key_pair_failure_continues_without_a_key(gateway: ScriptedEc2Gateway) {
    gateway.fail_key_pair_creation(true);
    let provider = provider(&gateway);

    let instances = provider
        .create_instance(&infrastructure("aws-ec2"), &request(1))
        .await
        .expect("creation should continue");

    assert_eq!(instances.len(), 1);
    let batches = gateway.batches();
    assert_eq!(batches[0].template.options.key_pair_name, None);
    assert_eq!(batches[0].template.options.login_user.as_deref(), Some("ubuntu"));
}

#[rstest]
#[tokio::test]
async fn key_pair_failure_is_fatal_when_required(gateway: ScriptedEc2Gateway) {
    gateway.fail_key_pair_creation(true);
    let config = ConnectorConfig {
        require_default_key_pair: true,
        ..ConnectorConfig::with_defaults()
    };
    let provider = AwsEc2Provider::new(gateway.clone(), &config).expect("valid configuration");

    let err = provider
        .create_instance(&infrastructure("aws-ec2"), &request(1))
        .await
        .expect_err("key pair is required");

    assert!(matches!(err, AwsProviderError::KeyPairUnavailable { ref region, .. } if region == REGION));
    assert!(gateway.batches().is_empty());
}

#[rstest]
fn rejects_invalid_configuration(gateway: ScriptedEc2Gateway) {
    let config = ConnectorConfig {
        max_association_attempts: Some(0),
        ..ConnectorConfig::with_defaults()
    };

    let err = AwsEc2Provider::new(gateway, &config).expect_err("zero cap is invalid");

    assert!(matches!(err, AwsProviderError::Config(_)));
}

#[rstest]
#[tokio::test]
async fn add_public_ip_uses_the_identifier_region(gateway: ScriptedEc2Gateway) {
    gateway.insert_node(ec2_node("eu-west-1/i-0001", "eu-west-1a", REGION, &[]));
    gateway.push_address(REGION, PublicAddress::free("198.51.100.1"));
    let provider = provider(&gateway);

    let address = provider
        .add_public_ip(&infrastructure("aws-ec2"), "eu-west-1/i-0001", None)
        .await
        .expect("address should be acquired");

    assert_eq!(address, "198.51.100.1");
    let attempts = gateway.association_attempts();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].region, REGION);
    assert_eq!(attempts[0].instance_id, "i-0001");
}

#[rstest]
#[tokio::test]
async fn add_public_ip_walks_locations_for_bare_identifiers(gateway: ScriptedEc2Gateway) {
    gateway.insert_node(ec2_node("i-0002", "us-east-1c", "us-east-1", &[]));
    gateway.set_assignable_locations(&["us-east-1", "eu-west-1"]);
    gateway.push_allocatable("203.0.113.7");
    let provider = provider(&gateway);

    let address = provider
        .add_public_ip(&infrastructure("aws-ec2"), "i-0002", None)
        .await
        .expect("address should be acquired");

    assert_eq!(address, "203.0.113.7");
    assert_eq!(gateway.association_attempts()[0].region, "us-east-1");
}

#[rstest]
#[tokio::test]
async fn zone_locations_resolve_to_their_region(gateway: ScriptedEc2Gateway) {
    gateway.insert_node(ec2_node("i-0003", "us-east-1c", "us-east-1", &["203.0.113.7"]));
    gateway.set_assignable_locations(&["us-east-1c"]);
    gateway.push_allocatable("203.0.113.7");
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");

    provider
        .add_public_ip(&infra, "i-0003", None)
        .await
        .expect("address should be acquired");
    provider
        .remove_public_ip(&infra, "i-0003", None)
        .await
        .expect("release should succeed");

    assert_eq!(gateway.association_attempts()[0].region, "us-east-1");
    assert_eq!(
        gateway.disassociations(),
        vec![(String::from("us-east-1"), String::from("203.0.113.7"))]
    );
}

#[rstest]
#[tokio::test]
async fn add_public_ip_reports_exhaustion(gateway: ScriptedEc2Gateway) {
    gateway.insert_node(ec2_node("eu-west-1/i-0001", "eu-west-1a", REGION, &[]));
    let provider = provider(&gateway);

    let err = provider
        .add_public_ip(&infrastructure("aws-ec2"), "eu-west-1/i-0001", None)
        .await
        .expect_err("no address can be allocated");

    assert!(matches!(err, AwsProviderError::Address(AddressError::Exhausted { .. })));
}

#[rstest]
#[case(Some("198.51.100.2"), "198.51.100.2")]
#[case(None, "198.51.100.1")]
#[tokio::test]
async fn remove_public_ip_disassociates_one_address(
    gateway: ScriptedEc2Gateway,
    #[case] desired: Option<&'static str>,
    #[case] expected: &'static str,
) {
    gateway.insert_node(ec2_node(
        "eu-west-1/i-0001",
        "eu-west-1a",
        REGION,
        &["198.51.100.1", "198.51.100.2"],
    ));
    let provider = provider(&gateway);

    provider
        .remove_public_ip(&infrastructure("aws-ec2"), "eu-west-1/i-0001", desired)
        .await
        .expect("release should succeed");

    assert_eq!(
        gateway.disassociations(),
        vec![(REGION.to_owned(), expected.to_owned())]
    );
}

#[rstest]
#[tokio::test]
async fn unknown_instance_surfaces_gateway_error(gateway: ScriptedEc2Gateway) {
    let provider = provider(&gateway);

    let err = provider
        .remove_public_ip(&infrastructure("aws-ec2"), "eu-west-1/i-missing", None)
        .await
        .expect_err("instance does not exist");

    assert!(matches!(err, AwsProviderError::Gateway(GatewayError::Remote { .. })));
}

#[rstest]
#[tokio::test]
async fn default_ssh_credentials_follow_the_generated_key(gateway: ScriptedEc2Gateway) {
    gateway.set_assignable_locations(&["eu-west-1a", "eu-west-1b"]);
    let provider = provider(&gateway);
    let infra = infrastructure("aws-ec2");
    let instances = provider
        .create_instance(&infra, &request(1))
        .await
        .expect("creation should succeed");
    let instance = instances.iter().next().expect("one instance");

    let credentials = provider
        .default_ssh_credentials(&infra, &instance.id)
        .await
        .expect("lookup should succeed")
        .expect("key pair was generated");

    assert_eq!(credentials.username, "ubuntu");
    let cached = provider.key_pairs().cached(REGION).expect("cached record");
    assert_eq!(
        credentials.private_key.as_deref(),
        Some(cached.private_key_material.as_str())
    );
}

#[rstest]
#[tokio::test]
async fn default_ssh_credentials_are_absent_without_a_key(gateway: ScriptedEc2Gateway) {
    gateway.insert_node(ec2_node("eu-west-1/i-0001", "eu-west-1a", REGION, &[]));
    gateway.set_assignable_locations(&[REGION]);
    let provider = provider(&gateway);

    let credentials = provider
        .default_ssh_credentials(&infrastructure("aws-ec2"), "eu-west-1/i-0001")
        .await
        .expect("lookup should succeed");

    assert!(credentials.is_none());
}

#[rstest]
#[case(Some("admin"), "admin")]
#[case(Some("   "), "ubuntu")]
#[case(None, "ubuntu")]
fn ssh_credentials_fall_back_to_the_configured_user(
    gateway: ScriptedEc2Gateway,
    #[case] username: Option<&str>,
    #[case] expected: &str,
) {
    let provider = provider(&gateway);
    let credentials = InstanceCredentials {
        username: username.map(str::to_owned),
        private_key: Some(String::from("KEY")),
        ..InstanceCredentials::default()
    };

    let ssh = provider.ssh_credentials_for(&credentials);

    assert_eq!(ssh.username, expected);
    assert_eq!(ssh.private_key.as_deref(), Some("KEY"));
}
