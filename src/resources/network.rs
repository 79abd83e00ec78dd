//! Isolated virtual network: VPC, internet gateway, per-zone public and
//! private subnets, and NAT egress for the private tier.

use crate::core::builder::StackBuilder;
use crate::core::template::{map, props, Declaration, Value};
use crate::core::types::{Component, NetworkConfig};
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

pub const VPC_ID: &str = "FleetVPC";

/// Smallest subnet the platform allows.
pub const MIN_SUBNET_PREFIX: u8 = 28;

/// Zone counts a stack may span. `Fn::GetAZs` rarely lists more than six.
pub const AZ_RANGE: RangeInclusive<u32> = 2..=6;

/// Prefix lengths the platform accepts for a VPC block.
pub const VPC_PREFIX_RANGE: RangeInclusive<u8> = 16..=28;

/// Logical ids of the declared network.
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    pub vpc_id: String,
    pub public_subnets: Vec<String>,
    pub private_subnets: Vec<String>,
    /// Public default routes; internet-facing entry points wait on these
    pub public_routes: Vec<String>,
}

impl NetworkHandle {
    pub fn vpc(&self) -> Value {
        Value::reference(&self.vpc_id)
    }

    /// The VPC's address block, resolved at deploy time.
    pub fn vpc_cidr(&self) -> Value {
        Value::get_att(&self.vpc_id, "CidrBlock")
    }

    pub fn public_subnet_refs(&self) -> Value {
        Value::list_of_refs(&self.public_subnets)
    }

    pub fn private_subnet_refs(&self) -> Value {
        Value::list_of_refs(&self.private_subnets)
    }
}

/// Parse `a.b.c.d/n`.
pub fn parse_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| format!("invalid CIDR '{}': missing prefix length", cidr))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|e| format!("invalid CIDR '{}': {}", cidr, e))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|e| format!("invalid CIDR '{}': {}", cidr, e))?;
    if prefix > 32 {
        return Err(format!("invalid CIDR '{}': prefix exceeds 32", cidr));
    }
    let host_bits = 32 - u32::from(prefix);
    let mask = if host_bits == 32 { 0 } else { u32::MAX << host_bits };
    if u32::from(addr) & !mask != 0 {
        return Err(format!(
            "invalid CIDR '{}': address is not aligned to /{}",
            cidr, prefix
        ));
    }
    Ok((addr, prefix))
}

/// Split a range into `count` equal, contiguous subnets.
pub fn split_cidr(cidr: &str, count: usize) -> Result<Vec<String>, String> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let (base, prefix) = parse_cidr(cidr)?;
    let extra_bits = count.next_power_of_two().trailing_zeros();
    let new_prefix = u32::from(prefix) + extra_bits;
    if new_prefix > u32::from(MIN_SUBNET_PREFIX) {
        return Err(format!(
            "{} is too small for {} subnets (would need /{})",
            cidr, count, new_prefix
        ));
    }
    let size = 1u32 << (32 - new_prefix);
    let base = u32::from(base);
    Ok((0..count as u32)
        .map(|i| format!("{}/{}", Ipv4Addr::from(base + i * size), new_prefix))
        .collect())
}

/// Check a VPC block's prefix length. Returns the parsed block.
pub fn check_vpc_cidr(cidr: &str) -> Result<(Ipv4Addr, u8), String> {
    let (addr, prefix) = parse_cidr(cidr)?;
    if !VPC_PREFIX_RANGE.contains(&prefix) {
        return Err(format!(
            "{} has prefix /{}; a VPC block must be /{} to /{}",
            cidr,
            prefix,
            VPC_PREFIX_RANGE.start(),
            VPC_PREFIX_RANGE.end()
        ));
    }
    Ok((addr, prefix))
}

/// Subnet ranges for a network: one public and one private per zone.
/// Zone count and VPC prefix are checked before anything is allocated.
pub fn subnet_layout(cfg: &NetworkConfig) -> Result<Vec<String>, String> {
    if !AZ_RANGE.contains(&cfg.max_azs) {
        return Err(format!(
            "max_azs must be between {} and {}, got {}",
            AZ_RANGE.start(),
            AZ_RANGE.end(),
            cfg.max_azs
        ));
    }
    check_vpc_cidr(&cfg.cidr)?;
    split_cidr(&cfg.cidr, cfg.max_azs as usize * 2)
}

/// Declare the network: 1 VPC, `max_azs` public and private subnets,
/// `nat_gateways` NAT gateways in the first public subnets.
pub fn declare(b: &mut StackBuilder, cfg: &NetworkConfig) -> Result<NetworkHandle, String> {
    let zones = cfg.max_azs as usize;
    let nats = cfg.nat_gateways as usize;
    let cidrs = subnet_layout(cfg)?;

    let vpc_id = b.declare(
        Declaration::new(VPC_ID, "AWS::EC2::VPC", Component::Network).with_props(props([
            ("CidrBlock", Value::str(&cfg.cidr)),
            ("EnableDnsHostnames", true.into()),
            ("EnableDnsSupport", true.into()),
            ("InstanceTenancy", "default".into()),
        ])),
    )?;
    let vpc = Value::reference(&vpc_id);

    let igw = b.declare(Declaration::new(
        "FleetVPCIGW",
        "AWS::EC2::InternetGateway",
        Component::Network,
    ))?;
    let attachment = b.declare(
        Declaration::new(
            "FleetVPCGatewayAttachment",
            "AWS::EC2::VPCGatewayAttachment",
            Component::Network,
        )
        .with_props(props([
            ("VpcId", vpc.clone()),
            ("InternetGatewayId", Value::reference(&igw)),
        ])),
    )?;

    let mut public_subnets = Vec::with_capacity(zones);
    let mut public_routes = Vec::with_capacity(zones);
    let mut nat_gateways = Vec::with_capacity(nats);
    for (zone, cidr) in cidrs.iter().take(zones).enumerate() {
        let n = zone + 1;
        let (subnet, table, association) =
            declare_subnet(b, &vpc, "Public", n, zone, cidr, true)?;
        let route = b.declare(
            Declaration::new(
                &format!("FleetVPCPublicSubnet{}DefaultRoute", n),
                "AWS::EC2::Route",
                Component::Network,
            )
            .with_props(props([
                ("RouteTableId", Value::reference(&table)),
                ("DestinationCidrBlock", "0.0.0.0/0".into()),
                ("GatewayId", Value::reference(&igw)),
            ]))
            .depends_on(&attachment),
        )?;

        if zone < nats {
            let eip = b.declare(
                Declaration::new(
                    &format!("FleetVPCPublicSubnet{}EIP", n),
                    "AWS::EC2::EIP",
                    Component::Network,
                )
                .prop("Domain", "vpc"),
            )?;
            let nat = b.declare(
                Declaration::new(
                    &format!("FleetVPCPublicSubnet{}NATGateway", n),
                    "AWS::EC2::NatGateway",
                    Component::Network,
                )
                .with_props(props([
                    ("SubnetId", Value::reference(&subnet)),
                    ("AllocationId", Value::get_att(&eip, "AllocationId")),
                ]))
                .depends_on(&route)
                .depends_on(&association),
            )?;
            nat_gateways.push(nat);
        }

        public_subnets.push(subnet);
        public_routes.push(route);
    }

    let mut private_subnets = Vec::with_capacity(zones);
    for (zone, cidr) in cidrs.iter().skip(zones).enumerate() {
        let n = zone + 1;
        let (subnet, table, _) = declare_subnet(b, &vpc, "Private", n, zone, cidr, false)?;
        let nat = nat_gateways
            .get(zone % nat_gateways.len().max(1))
            .ok_or_else(|| "private subnets need at least one NAT gateway".to_string())?;
        b.declare(
            Declaration::new(
                &format!("FleetVPCPrivateSubnet{}DefaultRoute", n),
                "AWS::EC2::Route",
                Component::Network,
            )
            .with_props(props([
                ("RouteTableId", Value::reference(&table)),
                ("DestinationCidrBlock", "0.0.0.0/0".into()),
                ("NatGatewayId", Value::reference(nat)),
            ])),
        )?;
        private_subnets.push(subnet);
    }

    tracing::info!(
        zones,
        nat_gateways = nat_gateways.len(),
        "network declared"
    );

    Ok(NetworkHandle {
        vpc_id,
        public_subnets,
        private_subnets,
        public_routes,
    })
}

/// Subnet, route table and association. Returns their logical ids.
fn declare_subnet(
    b: &mut StackBuilder,
    vpc: &Value,
    tier: &str,
    n: usize,
    zone: usize,
    cidr: &str,
    public: bool,
) -> Result<(String, String, String), String> {
    let prefix = format!("FleetVPC{}Subnet{}", tier, n);
    let subnet = b.declare(
        Declaration::new(&prefix, "AWS::EC2::Subnet", Component::Network).with_props(props([
            ("VpcId", vpc.clone()),
            ("AvailabilityZone", Value::az(zone)),
            ("CidrBlock", Value::str(cidr)),
            ("MapPublicIpOnLaunch", public.into()),
        ])),
    )?;
    let table = b.declare(
        Declaration::new(
            &format!("{}RouteTable", prefix),
            "AWS::EC2::RouteTable",
            Component::Network,
        )
        .prop("VpcId", vpc.clone()),
    )?;
    let association = b.declare(
        Declaration::new(
            &format!("{}RouteTableAssociation", prefix),
            "AWS::EC2::SubnetRouteTableAssociation",
            Component::Network,
        )
        .with_props(props([
            ("RouteTableId", Value::reference(&table)),
            ("SubnetId", Value::reference(&subnet)),
        ])),
    )?;
    Ok((subnet, table, association))
}

/// Security group in the network. `egress` of `None` keeps the platform
/// default (all outbound traffic allowed).
pub fn security_group(
    id: &str,
    description: &str,
    component: Component,
    network: &NetworkHandle,
    ingress: Vec<Value>,
    egress: Option<Vec<Value>>,
) -> Declaration {
    let mut decl = Declaration::new(id, "AWS::EC2::SecurityGroup", component).with_props(props([
        ("GroupDescription", Value::str(description)),
        ("VpcId", network.vpc()),
    ]));
    if !ingress.is_empty() {
        decl = decl.prop("SecurityGroupIngress", Value::List(ingress));
    }
    let egress = egress.unwrap_or_else(|| {
        vec![map([
            ("CidrIp", "0.0.0.0/0".into()),
            ("Description", "Allow all outbound traffic by default".into()),
            ("IpProtocol", "-1".into()),
        ])]
    });
    decl.prop("SecurityGroupEgress", Value::List(egress))
}
