//! Resource descriptor registry: the static catalog of providers and kinds.
//!
//! Built once per process and read-only afterwards. Kinds cover what the
//! deployment programs declare: EC2 + RDS + ElastiCache on AWS, a bridge
//! network of containers on Docker, and Cloud Run on Google.

use super::error::{Result, SynthError};
use super::types::{AttrType, AttributeSpec, ProviderSpec, ResourceDescriptor};
use indexmap::IndexMap;
use std::sync::OnceLock;

/// Read-only catalog of providers and resource kinds.
#[derive(Debug)]
pub struct Registry {
    providers: IndexMap<&'static str, ProviderSpec>,
    kinds: IndexMap<&'static str, ResourceDescriptor>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        REGISTRY.get_or_init(Registry::builtin)
    }

    /// Look up a resource kind.
    pub fn lookup(&self, kind: &str) -> Option<&ResourceDescriptor> {
        self.kinds.get(kind)
    }

    /// Look up a resource kind on behalf of a declared resource.
    pub fn require(&self, resource: &str, kind: &str) -> Result<&ResourceDescriptor> {
        self.lookup(kind).ok_or_else(|| SynthError::UnknownKind {
            resource: resource.to_string(),
            kind: kind.to_string(),
        })
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.get(name)
    }

    /// Kinds a provider can realize, in catalog order.
    pub fn kinds_for<'a>(&'a self, provider: &'a str) -> impl Iterator<Item = &'a ResourceDescriptor> {
        self.kinds.values().filter(move |d| d.provider == provider)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.kinds.values()
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderSpec> {
        self.providers.values()
    }

    fn builtin() -> Self {
        let mut providers = IndexMap::new();
        for p in builtin_providers() {
            providers.insert(p.name, p);
        }
        let mut kinds = IndexMap::new();
        for d in builtin_kinds() {
            kinds.insert(d.kind, d);
        }
        Self { providers, kinds }
    }
}

// ============================================================================
// Catalog
// ============================================================================

const fn spec(
    name: &'static str,
    ty: AttrType,
    required: bool,
    output: bool,
    computed: bool,
) -> AttributeSpec {
    AttributeSpec {
        name,
        ty,
        required,
        output,
        computed,
    }
}

/// Required input.
const fn req(name: &'static str, ty: AttrType) -> AttributeSpec {
    spec(name, ty, true, false, false)
}

/// Optional input.
const fn opt(name: &'static str, ty: AttrType) -> AttributeSpec {
    spec(name, ty, false, false, false)
}

/// Required input that other resources may reference.
const fn req_out(name: &'static str, ty: AttrType) -> AttributeSpec {
    spec(name, ty, true, true, false)
}

/// Optional input that other resources may reference.
const fn opt_out(name: &'static str, ty: AttrType) -> AttributeSpec {
    spec(name, ty, false, true, false)
}

/// Output known only after apply.
const fn computed(name: &'static str, ty: AttrType) -> AttributeSpec {
    spec(name, ty, false, true, true)
}

fn builtin_providers() -> Vec<ProviderSpec> {
    vec![
        ProviderSpec {
            name: "aws",
            description: "Amazon Web Services",
            required_settings: vec!["region"],
        },
        ProviderSpec {
            name: "google",
            description: "Google Cloud Platform",
            required_settings: vec!["project", "region"],
        },
        ProviderSpec {
            name: "docker",
            description: "Local container runtime",
            required_settings: vec![],
        },
    ]
}

fn builtin_kinds() -> Vec<ResourceDescriptor> {
    use AttrType::*;
    vec![
        ResourceDescriptor {
            kind: "aws_security_group",
            provider: "aws",
            description: "VPC security group",
            attributes: vec![
                req_out("name", String),
                opt("description", String),
                opt("ingress", List),
                opt("egress", List),
                opt("tags", Map),
                computed("id", String),
                computed("arn", String),
            ],
        },
        ResourceDescriptor {
            kind: "aws_instance",
            provider: "aws",
            description: "EC2 virtual machine",
            attributes: vec![
                req("ami", String),
                req("instance_type", String),
                opt("key_name", String),
                opt("security_groups", StringList),
                opt("vpc_security_group_ids", StringList),
                opt("user_data", String),
                opt("tags", Map),
                computed("id", String),
                computed("arn", String),
                computed("public_ip", String),
                computed("private_ip", String),
                computed("public_dns", String),
            ],
        },
        ResourceDescriptor {
            kind: "aws_db_subnet_group",
            provider: "aws",
            description: "RDS subnet group",
            attributes: vec![
                req_out("name", String),
                req("subnet_ids", StringList),
                opt("tags", Map),
                computed("id", String),
                computed("arn", String),
            ],
        },
        ResourceDescriptor {
            kind: "aws_db_instance",
            provider: "aws",
            description: "RDS managed database",
            attributes: vec![
                req("engine", String),
                req("instance_class", String),
                req("allocated_storage", Integer),
                req("username", String),
                req("password", String),
                opt("db_name", String),
                opt("publicly_accessible", Bool),
                opt("vpc_security_group_ids", StringList),
                opt("db_subnet_group_name", String),
                opt("tags", Map),
                computed("id", String),
                computed("arn", String),
                computed("host", String),
                computed("port", Integer),
                computed("endpoint", String),
            ],
        },
        ResourceDescriptor {
            kind: "aws_elasticache_cluster",
            provider: "aws",
            description: "ElastiCache cache cluster",
            attributes: vec![
                req_out("cluster_id", String),
                req("engine", String),
                req("node_type", String),
                req("num_cache_nodes", Integer),
                opt_out("port", Integer),
                opt("security_group_ids", StringList),
                opt("tags", Map),
                computed("id", String),
                computed("arn", String),
                computed("host", String),
            ],
        },
        ResourceDescriptor {
            kind: "docker_network",
            provider: "docker",
            description: "Container network",
            attributes: vec![
                req_out("name", String),
                opt("driver", String),
                computed("id", String),
            ],
        },
        ResourceDescriptor {
            kind: "docker_container",
            provider: "docker",
            description: "Container from an image",
            attributes: vec![
                req("image", String),
                req_out("name", String),
                opt("ports", List),
                opt("env", StringList),
                opt("command", StringList),
                opt("restart", String),
                opt("networks_advanced", List),
                computed("id", String),
                computed("hostname", String),
            ],
        },
        ResourceDescriptor {
            kind: "google_cloud_run_service",
            provider: "google",
            description: "Cloud Run managed service",
            attributes: vec![
                req_out("name", String),
                req_out("location", String),
                req("image", String),
                opt("container_port", Integer),
                opt("env", Map),
                computed("id", String),
                computed("url", String),
                computed("status", String),
            ],
        },
        ResourceDescriptor {
            kind: "google_cloud_run_service_iam_member",
            provider: "google",
            description: "IAM binding on a Cloud Run service",
            attributes: vec![
                req("service", String),
                req("location", String),
                req("role", String),
                req("member", String),
                computed("id", String),
                computed("etag", String),
            ],
        },
    ]
}
