//! Node roles and the single-writer node service
//!
//! Every node owns one [`ChainForkManager`] and one [`Mempool`]. A plain
//! [`Node`] only consumes blocks; a [`MinerNode`] also produces them. Both
//! delegate to the same engine, so a mined block and a peer block take the
//! same acceptance path.
//!
//! [`spawn_node`] moves a node into a tokio task that is the only writer of
//! its state. Callers talk to it through a cloneable [`NodeHandle`].

use crate::blockchain::{Block, BlockStatus, ChainForkManager, ChainSummary};
use crate::config::ChainConfig;
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::miner::{CancelToken, MiningEngine, MiningTemplate};
use crate::sync::SyncReport;
use crate::transaction::Transaction;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Anything that accepts blocks from the outside.
pub trait BlockConsumer {
    fn receive_block(&mut self, block: Block) -> BlockStatus;
    fn receive_blocks(&mut self, blocks: Vec<Block>) -> SyncReport;
}

/// Anything that can mine a block onto its own chain.
pub trait BlockProducer {
    fn produce_block(&mut self, cancel: &CancelToken) -> Result<(Block, BlockStatus), ChainError>;
}

/// A validating node: chain state plus a transaction pool.
pub struct Node {
    chain: ChainForkManager,
    mempool: Mempool,
}

impl Node {
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        let mempool = Mempool::new(&config.mempool);
        let chain = ChainForkManager::new(config)?;
        Ok(Node { chain, mempool })
    }

    pub fn chain(&self) -> &ChainForkManager {
        &self.chain
    }

    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        self.mempool.add_transaction(tx)
    }

    pub fn summary(&self) -> ChainSummary {
        self.chain.summary()
    }

    fn prune_mempool(&mut self) {
        let pruned = self.mempool.prune_included(self.chain.main_chain());
        if pruned > 0 {
            debug!(pruned, "dropped pending transactions now on the main chain");
        }
    }

    fn handle(&mut self, command: NodeCommand) {
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            NodeCommand::SubmitBlock { block, reply } => {
                let _ = reply.send(self.receive_block(block));
            }
            NodeCommand::Sync { blocks, reply } => {
                let _ = reply.send(self.receive_blocks(blocks));
            }
            NodeCommand::AddTransaction { tx, reply } => {
                let _ = reply.send(self.add_transaction(tx));
            }
            NodeCommand::Template { engine, reply } => {
                let _ = reply.send(engine.build_candidate(&self.chain, &self.mempool));
            }
            NodeCommand::Summary { reply } => {
                let _ = reply.send(self.summary());
            }
            NodeCommand::MainChain { reply } => {
                let _ = reply.send(self.chain.main_chain().to_vec());
            }
        }
    }
}

impl BlockConsumer for Node {
    fn receive_block(&mut self, block: Block) -> BlockStatus {
        let status = self.chain.submit_block(block);
        if status.is_attached() {
            self.prune_mempool();
        }
        status
    }

    fn receive_blocks(&mut self, blocks: Vec<Block>) -> SyncReport {
        let report = self.chain.sync(blocks);
        if report.attached > 0 {
            self.prune_mempool();
        }
        report
    }
}

/// A node that also mines.
pub struct MinerNode {
    node: Node,
    engine: MiningEngine,
}

impl MinerNode {
    pub fn new(config: ChainConfig) -> Result<Self, ChainError> {
        let engine = MiningEngine::new(&config);
        Ok(MinerNode {
            node: Node::new(config)?,
            engine,
        })
    }

    pub fn with_engine(node: Node, engine: MiningEngine) -> Self {
        MinerNode { node, engine }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn engine(&self) -> &MiningEngine {
        &self.engine
    }

    pub fn add_transaction(&mut self, tx: Transaction) -> Result<(), ChainError> {
        self.node.add_transaction(tx)
    }

    pub fn into_node(self) -> Node {
        self.node
    }
}

impl BlockConsumer for MinerNode {
    fn receive_block(&mut self, block: Block) -> BlockStatus {
        self.node.receive_block(block)
    }

    fn receive_blocks(&mut self, blocks: Vec<Block>) -> SyncReport {
        self.node.receive_blocks(blocks)
    }
}

impl BlockProducer for MinerNode {
    fn produce_block(&mut self, cancel: &CancelToken) -> Result<(Block, BlockStatus), ChainError> {
        let Node { chain, mempool } = &mut self.node;
        self.engine.produce(chain, mempool, cancel)
    }
}

// ============================================================================
// Node service
// ============================================================================

/// Requests handled by the node worker, in arrival order.
pub enum NodeCommand {
    SubmitBlock {
        block: Block,
        reply: oneshot::Sender<BlockStatus>,
    },
    Sync {
        blocks: Vec<Block>,
        reply: oneshot::Sender<SyncReport>,
    },
    AddTransaction {
        tx: Transaction,
        reply: oneshot::Sender<Result<(), ChainError>>,
    },
    Template {
        engine: Arc<MiningEngine>,
        reply: oneshot::Sender<MiningTemplate>,
    },
    Summary {
        reply: oneshot::Sender<ChainSummary>,
    },
    MainChain {
        reply: oneshot::Sender<Vec<Block>>,
    },
}

#[derive(Debug, Clone)]
pub struct NodeHandle {
    commands: mpsc::Sender<NodeCommand>,
}

/// Move `node` into a worker task. The task ends, returning the node, once
/// every handle has been dropped.
///
/// A `Sync` batch replays whole branches and can run for a long time. On a
/// multi-threaded runtime it runs under `block_in_place` so other tasks move
/// off the worker's thread; on a current-thread runtime it runs inline and
/// the runtime waits for it.
pub fn spawn_node(mut node: Node, queue_depth: usize) -> (NodeHandle, JoinHandle<Node>) {
    let (commands, mut inbox) = mpsc::channel(queue_depth.max(1));
    let worker = tokio::spawn(async move {
        let multi_thread = Handle::current().runtime_flavor() == RuntimeFlavor::MultiThread;
        info!(height = node.chain.height(), multi_thread, "node worker started");
        while let Some(command) = inbox.recv().await {
            if multi_thread && matches!(command, NodeCommand::Sync { .. }) {
                tokio::task::block_in_place(|| node.handle(command));
            } else {
                node.handle(command);
            }
        }
        info!(height = node.chain.height(), "node worker stopped");
        node
    });
    (NodeHandle { commands }, worker)
}

impl NodeHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> Result<T, ChainError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| ChainError::NodeStopped)?;
        response.await.map_err(|_| ChainError::NodeStopped)
    }

    pub async fn submit_block(&self, block: Block) -> Result<BlockStatus, ChainError> {
        self.request(|reply| NodeCommand::SubmitBlock { block, reply })
            .await
    }

    pub async fn sync(&self, blocks: Vec<Block>) -> Result<SyncReport, ChainError> {
        self.request(|reply| NodeCommand::Sync { blocks, reply }).await
    }

    pub async fn add_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        self.request(|reply| NodeCommand::AddTransaction { tx, reply })
            .await?
    }

    pub async fn template(&self, engine: Arc<MiningEngine>) -> Result<MiningTemplate, ChainError> {
        self.request(|reply| NodeCommand::Template { engine, reply })
            .await
    }

    pub async fn summary(&self) -> Result<ChainSummary, ChainError> {
        self.request(|reply| NodeCommand::Summary { reply }).await
    }

    pub async fn main_chain(&self) -> Result<Vec<Block>, ChainError> {
        self.request(|reply| NodeCommand::MainChain { reply }).await
    }

    /// Fetch a template, search the nonce on the blocking pool so the worker
    /// keeps serving other requests, then submit the result like any peer
    /// block.
    pub async fn mine_block(
        &self,
        engine: Arc<MiningEngine>,
        cancel: CancelToken,
    ) -> Result<(Block, BlockStatus), ChainError> {
        let template = self.template(Arc::clone(&engine)).await?;
        let block = tokio::task::spawn_blocking(move || engine.mine(template, &cancel))
            .await
            .map_err(|e| ChainError::MiningTask(e.to_string()))??;

        let status = self.submit_block(block.clone()).await?;
        if let BlockStatus::Rejected(e) = status {
            return Err(e);
        }
        Ok((block, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_config() -> ChainConfig {
        let mut config = ChainConfig::default();
        config.difficulty.initial_level = 1;
        config.genesis.miner_address = "alice".to_string();
        config.genesis.reward = 10;
        config
    }

    #[test]
    fn test_miner_node_feeds_validator() {
        let mut miner = MinerNode::new(test_config()).unwrap();
        let mut validator = Node::new(test_config()).unwrap();

        for _ in 0..3 {
            let (block, status) = miner.produce_block(&CancelToken::new()).unwrap();
            assert_eq!(status, BlockStatus::AppendedToMain);
            assert_eq!(validator.receive_block(block), BlockStatus::AppendedToMain);
        }
        assert_eq!(validator.chain().main_chain(), miner.node().chain().main_chain());
    }

    #[test]
    fn test_receiving_block_prunes_mempool() {
        let mut miner = MinerNode::new(test_config()).unwrap();
        let mut validator = Node::new(test_config()).unwrap();
        let tx = Transaction::new("alice", "bob", 3, 1);
        miner.add_transaction(tx.clone()).unwrap();
        validator.add_transaction(tx).unwrap();

        let (block, _) = miner.produce_block(&CancelToken::new()).unwrap();
        assert!(miner.node().mempool().is_empty());
        let report = validator.receive_blocks(vec![block]);
        assert_eq!(report.attached, 1);
        assert!(validator.mempool().is_empty());
    }

    #[tokio::test]
    async fn test_node_service_round_trip() {
        tokio::time::timeout(Duration::from_secs(10), async {
            let config = test_config();
            let engine = Arc::new(MiningEngine::new(&config));
            let (handle, worker) = spawn_node(Node::new(config).unwrap(), 8);

            let (block, status) = handle
                .mine_block(Arc::clone(&engine), CancelToken::new())
                .await
                .unwrap();
            assert_eq!(status, BlockStatus::AppendedToMain);
            assert_eq!(handle.submit_block(block).await.unwrap(), BlockStatus::Duplicate);

            let summary = handle.summary().await.unwrap();
            assert_eq!(summary.height, 1);

            drop(handle);
            let node = worker.await.unwrap();
            assert_eq!(node.chain().height(), 1);
        })
        .await
        .expect("test_node_service_round_trip timed out");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_sync_on_multi_thread_runtime_keeps_other_tasks_running() {
        tokio::time::timeout(Duration::from_secs(20), async {
            let mut source = MinerNode::new(test_config()).unwrap();
            let mut blocks = Vec::new();
            for _ in 0..6 {
                let (block, _) = source.produce_block(&CancelToken::new()).unwrap();
                blocks.push(block);
            }
            blocks.reverse();

            let (handle, worker) = spawn_node(Node::new(test_config()).unwrap(), 4);
            let ticker = tokio::spawn(async {
                let mut ticks = 0u32;
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    ticks += 1;
                }
                ticks
            });

            let report = handle.sync(blocks).await.unwrap();
            assert_eq!(report.attached, 6);
            assert!(report.unresolved.is_empty());
            assert_eq!(ticker.await.unwrap(), 5);

            drop(handle);
            let node = worker.await.unwrap();
            assert_eq!(node.chain().main_chain(), source.node().chain().main_chain());
        })
        .await
        .expect("test_sync_on_multi_thread_runtime_keeps_other_tasks_running timed out");
    }

    #[tokio::test]
    async fn test_stopped_worker_reports_node_stopped() {
        tokio::time::timeout(Duration::from_secs(5), async {
            let (handle, worker) = spawn_node(Node::new(test_config()).unwrap(), 1);
            worker.abort();
            let _ = worker.await;
            assert_eq!(handle.summary().await, Err(ChainError::NodeStopped));
        })
        .await
        .expect("test_stopped_worker_reports_node_stopped timed out");
    }
}
