//! Index shards.
//!
//! A shard is one worker's private slice of the usage index. The core only
//! talks to shards through [`IndexShard`]; [`ClassFileShard`] is the stock
//! implementation, an actor thread that owns a [`ReferenceIndex`] and serves
//! requests arriving over a channel.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::references::ReferenceIndex;
use crate::usage::{UsageKey, UsageString};

#[async_trait]
pub trait IndexShard: Send + Sync {
    /// Absorbs every reference site found in one class entry.
    async fn ingest(&self, bytes: Vec<u8>) -> Result<()>;

    /// Usages of `key` among the entries this shard ingested.
    async fn get_usage(&self, key: &UsageKey) -> Result<Vec<UsageString>>;

    /// Diagnostic record count.
    async fn usage_size(&self) -> Result<usize>;

    /// Drops everything ingested so far.
    async fn clear(&self) -> Result<()>;

    /// Releases the shard's execution resources. Later calls fail.
    async fn shutdown(&self) {}
}

enum ShardRequest {
    Ingest {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<usize>>,
    },
    Query {
        key: UsageKey,
        reply: oneshot::Sender<Vec<UsageString>>,
    },
    Size {
        reply: oneshot::Sender<usize>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
}

pub struct ClassFileShard {
    id: usize,
    tx: Mutex<Option<mpsc::UnboundedSender<ShardRequest>>>,
}

impl ClassFileShard {
    pub fn spawn(id: usize, namespaces: Vec<String>) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel::<ShardRequest>();
        let index = ReferenceIndex::new(namespaces);
        std::thread::Builder::new()
            .name(format!("usage-shard-{id}"))
            .spawn(move || serve(rx, index))?;

        Ok(Self {
            id,
            tx: Mutex::new(Some(tx)),
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ShardRequest) -> Result<T> {
        let (reply, response) = oneshot::channel();
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("shard {} is shut down", self.id))?;
        tx.send(make(reply))
            .map_err(|_| anyhow!("shard {} stopped accepting requests", self.id))?;
        response
            .await
            .map_err(|_| anyhow!("shard {} dropped a request", self.id))
    }
}

#[async_trait]
impl IndexShard for ClassFileShard {
    async fn ingest(&self, bytes: Vec<u8>) -> Result<()> {
        self.request(|reply| ShardRequest::Ingest { bytes, reply })
            .await?
            .map(|_| ())
    }

    async fn get_usage(&self, key: &UsageKey) -> Result<Vec<UsageString>> {
        let key = key.clone();
        self.request(|reply| ShardRequest::Query { key, reply }).await
    }

    async fn usage_size(&self) -> Result<usize> {
        self.request(|reply| ShardRequest::Size { reply }).await
    }

    async fn clear(&self) -> Result<()> {
        self.request(|reply| ShardRequest::Clear { reply }).await
    }

    async fn shutdown(&self) {
        // Closing the channel lets the thread drain what is queued and exit.
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }
}

fn serve(mut rx: mpsc::UnboundedReceiver<ShardRequest>, mut index: ReferenceIndex) {
    while let Some(request) = rx.blocking_recv() {
        match request {
            ShardRequest::Ingest { bytes, reply } => {
                let outcome = index.ingest(&bytes).map_err(anyhow::Error::from);
                let _ = reply.send(outcome);
            }
            ShardRequest::Query { key, reply } => {
                let _ = reply.send(index.get_usage(&key));
            }
            ShardRequest::Size { reply } => {
                let _ = reply.send(index.usage_size());
            }
            ShardRequest::Clear { reply } => {
                index.clear();
                let _ = reply.send(());
            }
        }
    }
    tracing::debug!(records = index.usage_size(), "shard worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::fixture::{ClassBuilder, CodeBuilder};

    fn class_calling(name: &str, target: &str) -> Vec<u8> {
        let mut class = ClassBuilder::new(name, Some("java/lang/Object"));
        let call = class.method_ref(target, "run", "()V");
        let mut code = CodeBuilder::new();
        code.invoke(0xb8, call).op(0xb1);
        class.method("main", "()V", Some(code.finish()));
        class.finish()
    }

    #[tokio::test]
    async fn shard_serves_ingest_query_and_size() -> Result<()> {
        let shard = ClassFileShard::spawn(0, Vec::new())?;
        shard.ingest(class_calling("a/One", "a/Target")).await?;
        shard.ingest(class_calling("a/Two", "a/Target")).await?;

        let key: UsageKey = "a/Target:run:()V".parse()?;
        let mut found: Vec<String> = shard
            .get_usage(&key)
            .await?
            .iter()
            .map(ToString::to_string)
            .collect();
        found.sort();
        assert_eq!(found, vec!["m:a/One:main:()V", "m:a/Two:main:()V"]);
        assert_eq!(shard.usage_size().await?, 4);

        shard.clear().await?;
        assert_eq!(shard.usage_size().await?, 0);
        assert!(shard.get_usage(&key).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_entry_is_reported_and_shard_keeps_serving() -> Result<()> {
        let shard = ClassFileShard::spawn(3, Vec::new())?;
        assert!(shard.ingest(b"garbage".to_vec()).await.is_err());
        shard.ingest(class_calling("a/One", "a/Target")).await?;
        assert!(shard.usage_size().await? > 0);
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_rejects_later_requests() -> Result<()> {
        let shard = ClassFileShard::spawn(1, Vec::new())?;
        assert_eq!(shard.id(), 1);
        shard.shutdown().await;
        let err = shard.usage_size().await.unwrap_err();
        assert!(err.to_string().contains("shut down"));
        Ok(())
    }
}
