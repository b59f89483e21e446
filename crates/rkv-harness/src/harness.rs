//! Minimal server context for the fuzz targets.
//!
//! Skips bootstrap entirely: a temporary directory, a sled backend with the
//! meta tree, a one-member cluster bound to that backend, and a server owning
//! the consistent index and wait registry. Storage is removed when the
//! context drops, including while unwinding.

use std::path::Path;

use rkv_server::{Attributes, Backend, Member, RaftAttributes, RaftCluster, Server};
use tempfile::TempDir;
use tracing::debug;

use crate::config::HarnessConfig;
use crate::error::HarnessError;

pub struct HarnessContext {
    // Dropped before `dir` so sled releases its files first.
    server: Server,
    dir: TempDir,
}

impl HarnessContext {
    pub fn server(&self) -> &Server {
        &self.server
    }

    pub fn server_mut(&mut self) -> &mut Server {
        &mut self.server
    }

    /// Directory holding this context's backend.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

pub struct HarnessServerBuilder<'a> {
    config: &'a HarnessConfig,
}

impl<'a> HarnessServerBuilder<'a> {
    pub fn new(config: &'a HarnessConfig) -> Self {
        Self { config }
    }

    pub fn build(&self) -> Result<HarnessContext, HarnessError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("rkv-fuzz-");
        let dir = match &self.config.temp_dir_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(HarnessError::TempDir)?;

        let backend = Backend::open(dir.path().join("member"))?;
        backend.create_meta_tree()?;

        let member = Member {
            id: self.config.member_id,
            raft_attributes: RaftAttributes {
                peer_urls: self.config.peer_urls.clone(),
                is_learner: false,
            },
            attributes: Attributes {
                name: self.config.member_name.clone(),
                client_urls: self.config.client_urls.clone(),
            },
        };
        let mut cluster = RaftCluster::new(member.id);
        cluster.set_backend(backend.clone());
        cluster.add_member(member, true)?;

        let server = Server::new(self.config.member_id, cluster, backend)?;
        debug!(path = %dir.path().display(), "built harness context");
        Ok(HarnessContext { server, dir })
    }
}
