//! Process-start configuration, parsed from the environment variables listed
//! in SPEC_FULL.md §6. No config crate is introduced (none of the teacher
//! examples reach for one); this follows the same plain `std::env::var`
//! style `wormhole`'s binaries use for their own handful of knobs.

use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadModel {
    Serialize,
    Multiple,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextModel {
    Default,
    Region,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenFamModel {
    MemoryServer,
    SharedMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcFramework {
    /// Our one concrete binding: length-prefixed bincode frames over TCP.
    Framed,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub cis_server: String,
    pub memserver_list: Vec<String>,
    pub libfabric_provider: String,
    pub thread_model: ThreadModel,
    pub context_model: ContextModel,
    pub openfam_model: OpenFamModel,
    pub interleave_size: u64,
    pub rpc_framework: RpcFramework,
    pub enable_resource_release: bool,
    pub num_consumer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cis_server: "127.0.0.1:9700".to_string(),
            memserver_list: vec!["127.0.0.1:9710".to_string()],
            libfabric_provider: "sockets".to_string(),
            thread_model: ThreadModel::Multiple,
            context_model: ContextModel::Default,
            openfam_model: OpenFamModel::MemoryServer,
            interleave_size: crate::constants::DEFAULT_INTERLEAVE_SIZE,
            rpc_framework: RpcFramework::Framed,
            enable_resource_release: true,
            num_consumer: crate::constants::DEFAULT_NUM_CONSUMER,
        }
    }
}

impl Config {
    /// Reads recognized options from the process environment, falling back
    /// to the defaults in [`Default::default`] for anything unset.
    pub fn from_env() -> Self {
        let mut cfg = Config::default();

        if let Ok(v) = env::var("CIS_SERVER") {
            cfg.cis_server = v;
        }
        if let Ok(v) = env::var("MEMSERVER_LIST") {
            cfg.memserver_list = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Ok(v) = env::var("LIBFABRIC_PROVIDER") {
            cfg.libfabric_provider = v;
        }
        if let Ok(v) = env::var("FAM_THREAD_MODEL") {
            cfg.thread_model = match v.as_str() {
                "SERIALIZE" => ThreadModel::Serialize,
                _ => ThreadModel::Multiple,
            };
        }
        if let Ok(v) = env::var("FAM_CONTEXT_MODEL") {
            cfg.context_model = match v.as_str() {
                "REGION" => ContextModel::Region,
                _ => ContextModel::Default,
            };
        }
        if let Ok(v) = env::var("OPENFAM_MODEL") {
            cfg.openfam_model = match v.as_str() {
                "shared_memory" => OpenFamModel::SharedMemory,
                _ => OpenFamModel::MemoryServer,
            };
        }
        if let Ok(v) = env::var("INTERLEAVE_SIZE") {
            if let Ok(parsed) = v.parse() {
                cfg.interleave_size = parsed;
            }
        }
        if let Ok(v) = env::var("ENABLE_RESOURCE_RELEASE") {
            cfg.enable_resource_release = matches!(v.as_str(), "1" | "true" | "TRUE");
        }
        if let Ok(v) = env::var("NUM_CONSUMER") {
            if let Ok(parsed) = v.parse() {
                cfg.num_consumer = parsed;
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.interleave_size, crate::constants::DEFAULT_INTERLEAVE_SIZE);
        assert!(cfg.enable_resource_release);
    }
}
