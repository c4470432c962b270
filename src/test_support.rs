//! Test support utilities shared across unit and integration tests.
//!
//! The scripted gateways keep provider state in memory, record every remote
//! call, and can be told to fail specific operations. Key-pair and address
//! calls yield to the runtime once before touching state, so joined futures
//! interleave the way concurrent remote calls do. Each gateway is also
//! its own [`GatewayConnector`], so a provider built around a clone shares
//! state with the test that drives it.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task;

use crate::backend::{BackendFuture, Infrastructure};
use crate::gateway::{
    Ec2Gateway, FloatingIp, GatewayConnector, GatewayError, InstanceTemplate, KeyPairRecord,
    Location, NovaGateway, NodeRecord, PublicAddress, ServerOptions,
};
use crate::region::{REGION_SEPARATOR, region_from_instance_id};

/// Records a single association request made through a scripted gateway.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AssociationCall {
    /// Region passed to the call.
    pub region: String,
    /// Address the call tried to bind.
    pub address: String,
    /// Instance the address was bound to.
    pub instance_id: String,
}

/// Records a batch creation request made through [`ScriptedEc2Gateway`].
#[derive(Clone, Debug, PartialEq)]
pub struct BatchCall {
    /// Group tag.
    pub group: String,
    /// Requested instance count.
    pub count: u32,
    /// Template passed to the provider.
    pub template: InstanceTemplate,
}

#[derive(Debug, Default)]
struct Ec2State {
    remote_key_pairs: BTreeMap<String, BTreeSet<String>>,
    fail_key_pair_creation: bool,
    fail_key_pair_listing: bool,
    key_pair_creations: Vec<(String, String)>,
    key_pair_listings: u32,
    addresses: BTreeMap<String, Vec<PublicAddress>>,
    rejected_addresses: BTreeSet<String>,
    association_attempts: Vec<AssociationCall>,
    disassociations: Vec<(String, String)>,
    allocatable: VecDeque<String>,
    allocations: u32,
    nodes: BTreeMap<String, NodeRecord>,
    assignable: BTreeSet<String>,
    batch_failure: Option<String>,
    batches: Vec<BatchCall>,
    next_node: u32,
}

/// In-memory stand-in for an AWS EC2 account.
#[derive(Clone, Debug, Default)]
pub struct ScriptedEc2Gateway {
    state: Arc<Mutex<Ec2State>>,
}

impl ScriptedEc2Gateway {
    /// Creates an account with no key pairs, addresses or nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every key-pair creation fail.
    pub fn fail_key_pair_creation(&self, fail: bool) {
        self.state.lock().fail_key_pair_creation = fail;
    }

    /// Makes every key-pair listing fail.
    pub fn fail_key_pair_listing(&self, fail: bool) {
        self.state.lock().fail_key_pair_listing = fail;
    }

    /// Deletes a key pair on the provider side, simulating drift.
    pub fn delete_remote_key_pair(&self, region: &str, name: &str) {
        if let Some(names) = self.state.lock().remote_key_pairs.get_mut(region) {
            names.remove(name);
        }
    }

    /// Returns the `(region, name)` of every key-pair creation attempt.
    #[must_use]
    pub fn key_pair_creations(&self) -> Vec<(String, String)> {
        self.state.lock().key_pair_creations.clone()
    }

    /// Returns how many key-pair listings were issued.
    #[must_use]
    pub fn key_pair_listings(&self) -> u32 {
        self.state.lock().key_pair_listings
    }

    /// Returns the key-pair names the provider currently holds in `region`.
    #[must_use]
    pub fn remote_key_pairs(&self, region: &str) -> BTreeSet<String> {
        self.state
            .lock()
            .remote_key_pairs
            .get(region)
            .cloned()
            .unwrap_or_default()
    }

    /// Adds an elastic address to `region` in listing order.
    pub fn push_address(&self, region: &str, address: PublicAddress) {
        self.state
            .lock()
            .addresses
            .entry(region.to_owned())
            .or_default()
            .push(address);
    }

    /// Makes association of `address` fail, as if another request won it.
    pub fn reject_association(&self, address: &str) {
        self.state
            .lock()
            .rejected_addresses
            .insert(address.to_owned());
    }

    /// Queues an address the next allocation returns.
    pub fn push_allocatable(&self, address: &str) {
        self.state.lock().allocatable.push_back(address.to_owned());
    }

    /// Returns every association attempt, successful or not.
    #[must_use]
    pub fn association_attempts(&self) -> Vec<AssociationCall> {
        self.state.lock().association_attempts.clone()
    }

    /// Returns `(region, address)` for every disassociation.
    #[must_use]
    pub fn disassociations(&self) -> Vec<(String, String)> {
        self.state.lock().disassociations.clone()
    }

    /// Returns how many allocations were attempted.
    #[must_use]
    pub fn allocations(&self) -> u32 {
        self.state.lock().allocations
    }

    /// Returns the addresses currently listed for `region`.
    #[must_use]
    pub fn addresses(&self, region: &str) -> Vec<PublicAddress> {
        self.state
            .lock()
            .addresses
            .get(region)
            .cloned()
            .unwrap_or_default()
    }

    /// Registers a node the gateway can look up.
    pub fn insert_node(&self, node: NodeRecord) {
        self.state.lock().nodes.insert(node.id.clone(), node);
    }

    /// Sets the account's assignable location identifiers.
    pub fn set_assignable_locations(&self, ids: &[&str]) {
        self.state.lock().assignable = ids.iter().map(|id| (*id).to_owned()).collect();
    }

    /// Makes batch creation fail with `message`.
    pub fn fail_batch(&self, message: &str) {
        self.state.lock().batch_failure = Some(message.to_owned());
    }

    /// Returns every batch creation request.
    #[must_use]
    pub fn batches(&self) -> Vec<BatchCall> {
        self.state.lock().batches.clone()
    }

    /// Returns how many nodes exist in the account.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.lock().nodes.len()
    }
}

impl GatewayConnector for ScriptedEc2Gateway {
    type Gateway = Self;

    fn connect(&self, _infrastructure: &Infrastructure) -> Result<Self::Gateway, GatewayError> {
        Ok(self.clone())
    }
}

impl Ec2Gateway for ScriptedEc2Gateway {
    fn create_key_pair<'a>(
        &'a self,
        region: &'a str,
        name: &'a str,
    ) -> BackendFuture<'a, KeyPairRecord, GatewayError> {
        Box::pin(async move {
            task::yield_now().await;
            let mut state = self.state.lock();
            state
                .key_pair_creations
                .push((region.to_owned(), name.to_owned()));
            if state.fail_key_pair_creation {
                return Err(GatewayError::remote("CreateKeyPair", "KeyPairLimitExceeded"));
            }
            state
                .remote_key_pairs
                .entry(region.to_owned())
                .or_default()
                .insert(name.to_owned());
            Ok(KeyPairRecord {
                name: name.to_owned(),
                private_key_material: format!("PRIVATE KEY FOR {name}"),
            })
        })
    }

    fn list_key_pairs<'a>(
        &'a self,
        region: &'a str,
        name_filter: &'a str,
    ) -> BackendFuture<'a, BTreeSet<String>, GatewayError> {
        Box::pin(async move {
            task::yield_now().await;
            let mut state = self.state.lock();
            state.key_pair_listings += 1;
            if state.fail_key_pair_listing {
                return Err(GatewayError::remote("DescribeKeyPairs", "unreachable"));
            }
            Ok(state
                .remote_key_pairs
                .get(region)
                .map(|names| {
                    names
                        .iter()
                        .filter(|name| name.as_str() == name_filter)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        })
    }

    fn describe_addresses<'a>(
        &'a self,
        region: &'a str,
    ) -> BackendFuture<'a, Vec<PublicAddress>, GatewayError> {
        Box::pin(async move {
            task::yield_now().await;
            Ok(self.addresses(region))
        })
    }

    fn associate_address<'a>(
        &'a self,
        region: &'a str,
        address: &'a str,
        provider_instance_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError> {
        Box::pin(async move {
            task::yield_now().await;
            let mut state = self.state.lock();
            state.association_attempts.push(AssociationCall {
                region: region.to_owned(),
                address: address.to_owned(),
                instance_id: provider_instance_id.to_owned(),
            });
            if state.rejected_addresses.contains(address) {
                return Err(GatewayError::remote(
                    "AssociateAddress",
                    format!("{address} is already in use"),
                ));
            }
            let listed = state.addresses.entry(region.to_owned()).or_default();
            match listed.iter_mut().find(|entry| entry.value == address) {
                Some(entry) if !entry.is_free() => Err(GatewayError::remote(
                    "AssociateAddress",
                    format!("{address} is already associated"),
                )),
                Some(entry) => {
                    entry.associated_instance_id = Some(provider_instance_id.to_owned());
                    Ok(())
                }
                None => {
                    listed.push(PublicAddress::associated(address, provider_instance_id));
                    Ok(())
                }
            }
        })
    }

    fn disassociate_address<'a>(
        &'a self,
        region: &'a str,
        address: &'a str,
    ) -> BackendFuture<'a, (), GatewayError> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state
                .disassociations
                .push((region.to_owned(), address.to_owned()));
            if let Some(entry) = state
                .addresses
                .get_mut(region)
                .and_then(|listed| listed.iter_mut().find(|entry| entry.value == address))
            {
                entry.associated_instance_id = None;
            }
            Ok(())
        })
    }

    fn allocate_address<'a>(&'a self, region: &'a str) -> BackendFuture<'a, String, GatewayError> {
        Box::pin(async move {
            task::yield_now().await;
            let mut state = self.state.lock();
            state.allocations += 1;
            let address = state.allocatable.pop_front().ok_or_else(|| {
                GatewayError::remote("AllocateAddress", "AddressLimitExceeded")
            })?;
            state
                .addresses
                .entry(region.to_owned())
                .or_default()
                .push(PublicAddress::free(address.clone()));
            Ok(address)
        })
    }

    fn create_nodes<'a>(
        &'a self,
        group: &'a str,
        count: u32,
        template: &'a InstanceTemplate,
    ) -> BackendFuture<'a, Vec<NodeRecord>, GatewayError> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.batches.push(BatchCall {
                group: group.to_owned(),
                count,
                template: template.clone(),
            });
            if let Some(message) = state.batch_failure.clone() {
                return Err(GatewayError::remote("RunInstances", message));
            }
            let region = template
                .image_id
                .split_once(REGION_SEPARATOR)
                .map_or("", |(prefix, _)| prefix)
                .to_owned();
            let mut created = Vec::new();
            for _ in 0..count {
                state.next_node += 1;
                let provider_id = format!("i-{:08x}", state.next_node);
                let node = NodeRecord {
                    id: format!("{region}{REGION_SEPARATOR}{provider_id}"),
                    provider_id,
                    group: group.to_owned(),
                    image: template.image_id.clone(),
                    hardware_type: Some(String::from("t3.micro")),
                    location: Some(
                        Location::new(format!("{region}a")).within(Location::new(region.clone())),
                    ),
                    public_addresses: Vec::new(),
                    status: String::from("RUNNING"),
                };
                state.nodes.insert(node.id.clone(), node.clone());
                created.push(node);
            }
            Ok(created)
        })
    }

    fn get_node<'a>(&'a self, instance_id: &'a str) -> BackendFuture<'a, NodeRecord, GatewayError> {
        Box::pin(async move {
            self.state
                .lock()
                .nodes
                .get(instance_id)
                .cloned()
                .ok_or_else(|| {
                    GatewayError::remote("DescribeInstances", format!("{instance_id} not found"))
                })
        })
    }

    fn list_assignable_locations(&self) -> BackendFuture<'_, BTreeSet<String>, GatewayError> {
        Box::pin(async move { Ok(self.state.lock().assignable.clone()) })
    }
}

/// Builds a node record placed in `zone` under `region`, for lookups.
#[must_use]
pub fn ec2_node(id: &str, zone: &str, region: &str, public_addresses: &[&str]) -> NodeRecord {
    let provider_id = id
        .split_once(REGION_SEPARATOR)
        .map_or(id, |(_, bare)| bare)
        .to_owned();
    NodeRecord {
        id: id.to_owned(),
        provider_id,
        group: String::from("group"),
        image: format!(
            "{}{REGION_SEPARATOR}ami-0abc",
            region_from_instance_id(id).unwrap_or(region)
        ),
        hardware_type: Some(String::from("t3.micro")),
        location: Some(Location::new(zone).within(Location::new(region))),
        public_addresses: public_addresses
            .iter()
            .map(|address| (*address).to_owned())
            .collect(),
        status: String::from("RUNNING"),
    }
}

#[derive(Debug)]
struct NovaState {
    floating_ips_enabled: bool,
    floating_ips: Vec<FloatingIp>,
    servers: BTreeMap<String, NodeRecord>,
    created: Vec<(String, ServerOptions)>,
    fail_create_after: Option<usize>,
    fixed_server_id: Option<String>,
    added: Vec<(String, String)>,
    removed: Vec<(String, String)>,
    next_server: u32,
}

impl Default for NovaState {
    fn default() -> Self {
        Self {
            floating_ips_enabled: true,
            floating_ips: Vec::new(),
            servers: BTreeMap::new(),
            created: Vec::new(),
            fail_create_after: None,
            fixed_server_id: None,
            added: Vec::new(),
            removed: Vec::new(),
            next_server: 0,
        }
    }
}

/// In-memory stand-in for an OpenStack Nova project.
#[derive(Clone, Debug, Default)]
pub struct ScriptedNovaGateway {
    state: Arc<Mutex<NovaState>>,
}

impl ScriptedNovaGateway {
    /// Creates a project with the floating-IP extension enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the floating-IP extension.
    pub fn set_floating_ips_enabled(&self, enabled: bool) {
        self.state.lock().floating_ips_enabled = enabled;
    }

    /// Adds a floating IP to the pool, in listing order.
    pub fn push_floating_ip(&self, ip: FloatingIp) {
        self.state.lock().floating_ips.push(ip);
    }

    /// Makes server creation fail once `successes` servers were created.
    pub fn fail_create_after(&self, successes: usize) {
        self.state.lock().fail_create_after = Some(successes);
    }

    /// Makes every created server report the same identifier.
    pub fn reuse_server_id(&self, id: &str) {
        self.state.lock().fixed_server_id = Some(id.to_owned());
    }

    /// Returns the name and options of every created server.
    #[must_use]
    pub fn created_servers(&self) -> Vec<(String, ServerOptions)> {
        self.state.lock().created.clone()
    }

    /// Returns `(ip, server)` for every floating IP binding.
    #[must_use]
    pub fn added_floating_ips(&self) -> Vec<(String, String)> {
        self.state.lock().added.clone()
    }

    /// Returns `(ip, server)` for every floating IP removal.
    #[must_use]
    pub fn removed_floating_ips(&self) -> Vec<(String, String)> {
        self.state.lock().removed.clone()
    }

    /// Registers a server the gateway can look up.
    pub fn insert_server(&self, server: NodeRecord) {
        self.state.lock().servers.insert(server.id.clone(), server);
    }
}

impl GatewayConnector for ScriptedNovaGateway {
    type Gateway = Self;

    fn connect(&self, _infrastructure: &Infrastructure) -> Result<Self::Gateway, GatewayError> {
        Ok(self.clone())
    }
}

impl NovaGateway for ScriptedNovaGateway {
    fn create_server<'a>(
        &'a self,
        _region: &'a str,
        name: &'a str,
        image: &'a str,
        flavor: &'a str,
        options: &'a ServerOptions,
    ) -> BackendFuture<'a, String, GatewayError> {
        Box::pin(async move {
            let mut state = self.state.lock();
            if state
                .fail_create_after
                .is_some_and(|limit| state.created.len() >= limit)
            {
                return Err(GatewayError::remote("CreateServer", "quota exceeded"));
            }
            state.created.push((name.to_owned(), options.clone()));
            state.next_server += 1;
            let id = state
                .fixed_server_id
                .clone()
                .unwrap_or_else(|| format!("srv-{}", state.next_server));
            let server = NodeRecord {
                id: id.clone(),
                provider_id: id.clone(),
                group: name.to_owned(),
                image: image.to_owned(),
                hardware_type: Some(flavor.to_owned()),
                location: None,
                public_addresses: Vec::new(),
                status: String::from("ACTIVE"),
            };
            state.servers.insert(id.clone(), server);
            Ok(id)
        })
    }

    fn get_server<'a>(
        &'a self,
        _region: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, NodeRecord, GatewayError> {
        Box::pin(async move {
            self.state
                .lock()
                .servers
                .get(server_id)
                .cloned()
                .ok_or_else(|| GatewayError::remote("GetServer", format!("{server_id} not found")))
        })
    }

    fn supports_floating_ips(&self, _region: &str) -> bool {
        self.state.lock().floating_ips_enabled
    }

    fn list_floating_ips<'a>(
        &'a self,
        _region: &'a str,
    ) -> BackendFuture<'a, Vec<FloatingIp>, GatewayError> {
        Box::pin(async move { Ok(self.state.lock().floating_ips.clone()) })
    }

    fn add_floating_ip<'a>(
        &'a self,
        _region: &'a str,
        ip: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.added.push((ip.to_owned(), server_id.to_owned()));
            if let Some(entry) = state.floating_ips.iter_mut().find(|entry| entry.ip == ip) {
                entry.fixed_ip = Some(String::from("10.0.0.10"));
                entry.instance_id = Some(server_id.to_owned());
            }
            Ok(())
        })
    }

    fn remove_floating_ip<'a>(
        &'a self,
        _region: &'a str,
        ip: &'a str,
        server_id: &'a str,
    ) -> BackendFuture<'a, (), GatewayError> {
        Box::pin(async move {
            let mut state = self.state.lock();
            state.removed.push((ip.to_owned(), server_id.to_owned()));
            if let Some(entry) = state.floating_ips.iter_mut().find(|entry| entry.ip == ip) {
                entry.fixed_ip = None;
                entry.instance_id = None;
            }
            Ok(())
        })
    }
}

/// Builds a floating IP entry; `server` binds it when present.
#[must_use]
pub fn floating_ip(ip: &str, server: Option<&str>) -> FloatingIp {
    FloatingIp {
        ip: ip.to_owned(),
        fixed_ip: server.map(|_| String::from("10.0.0.10")),
        instance_id: server.map(str::to_owned),
    }
}

/// Infrastructure fixture for the given provider type.
#[must_use]
pub fn infrastructure(kind: &str) -> Infrastructure {
    Infrastructure {
        id: format!("{kind}-infra"),
        kind: kind.to_owned(),
        endpoint: None,
        credentials: crate::backend::InfrastructureCredentials {
            username: String::from("access"),
            password: String::from("secret"),
        },
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding [`ENV_LOCK`].
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }

    /// Removes environment variables while holding [`ENV_LOCK`].
    pub async fn remove_vars(keys: &[&str]) -> Self {
        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(keys.len());
        for key in keys {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`.
            unsafe { env::remove_var(key) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in self.previous.iter().rev() {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(value) => env::set_var(key, value),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
