//! Process-wide pool of live [`StdioClient`]s, keyed by server key or, in
//! share-process mode, by a content hash of the command line (spec §4.2).

use std::sync::Arc;

use dashmap::DashMap;
use mr_config::Config;
use mr_types::RouterResult;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::client::StdioClient;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Table {
    CmdHash,
    Key,
}

/// At most one live [`StdioClient`] per key, for either keying strategy.
///
/// A registration lock per key prevents the race spec §4.2 calls out
/// ("a loser constructor must close its client"): two concurrent `Get`s for
/// the same key serialize on the lock rather than both spawning a child and
/// discarding one.
#[derive(Default)]
pub struct ClientRegistry {
    by_cmd_hash: DashMap<String, Arc<StdioClient>>,
    by_key: DashMap<String, Arc<StdioClient>>,
    cmd_hash_locks: DashMap<String, Arc<Mutex<()>>>,
    key_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ClientRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `GetStdioClient(config)` per spec §4.2.
    pub async fn get_stdio_client(
        self: &Arc<Self>,
        config: Config,
    ) -> RouterResult<Arc<StdioClient>> {
        if config.share_process {
            let hash = cmd_hash(&config.cmd);
            self.get_or_spawn(Table::CmdHash, hash, config).await
        } else {
            let key = config.key.clone();
            self.get_or_spawn(Table::Key, key, config).await
        }
    }

    fn table(&self, which: Table) -> &DashMap<String, Arc<StdioClient>> {
        match which {
            Table::CmdHash => &self.by_cmd_hash,
            Table::Key => &self.by_key,
        }
    }

    fn locks(&self, which: Table) -> &DashMap<String, Arc<Mutex<()>>> {
        match which {
            Table::CmdHash => &self.cmd_hash_locks,
            Table::Key => &self.key_locks,
        }
    }

    async fn get_or_spawn(
        self: &Arc<Self>,
        which: Table,
        key: String,
        config: Config,
    ) -> RouterResult<Arc<StdioClient>> {
        if let Some(existing) = self.table(which).get(&key) {
            return Ok(existing.clone());
        }

        let lock = self
            .locks(which)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check: another task may have won the race while we waited on
        // the per-key lock.
        if let Some(existing) = self.table(which).get(&key) {
            return Ok(existing.clone());
        }

        let registry = self.clone();
        let key_for_close = key.clone();
        let client = StdioClient::spawn(config, move || {
            registry.table(which).remove(&key_for_close);
        })
        .await?;

        self.table(which).insert(key, client.clone());
        Ok(client)
    }
}

fn cmd_hash(cmd: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cmd.as_bytes());
    format!("{:x}", hasher.finalize())
}
