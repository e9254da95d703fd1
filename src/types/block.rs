use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{BlockHash, ReplicaId, ViewNumber};

/// A proposed block. Immutable once created; identified by its hash.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
pub struct Block {
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub view: ViewNumber,
    pub height: u64,
    pub proposer: ReplicaId,
    pub payload_seq: u64,
}

impl Block {
    pub fn new(
        parent_hash: BlockHash,
        view: ViewNumber,
        height: u64,
        proposer: ReplicaId,
        payload_seq: u64,
    ) -> Self {
        let mut data = Vec::new();
        data.extend_from_slice(parent_hash.as_bytes());
        data.extend_from_slice(&view.to_be_bytes());
        data.extend_from_slice(&proposer.to_be_bytes());
        data.extend_from_slice(&payload_seq.to_be_bytes());
        let hash = BlockHash::from_bytes(&data);

        Self {
            hash,
            parent_hash,
            view,
            height,
            proposer,
            payload_seq,
        }
    }

    /// The genesis block: height 0, view 0, zero sentinel parent.
    pub fn genesis() -> Self {
        Self::new(BlockHash::zero(), 0, 0, 0, 0)
    }

    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.parent_hash.is_zero()
    }
}

impl std::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Block {{ hash: {}, parent: {}, view: {}, height: {}, proposer: {} }}",
            self.hash.short(),
            self.parent_hash.short(),
            self.view,
            self.height,
            self.proposer
        )
    }
}

/// Content-addressed block storage, one per replica.
///
/// Blocks hold only their parent hash; the chain is traversed by lookup,
/// never by pointer chasing.
#[derive(Clone, Debug)]
pub struct BlockStore {
    blocks: HashMap<BlockHash, Block>,
    genesis_hash: BlockHash,
}

impl BlockStore {
    pub fn new() -> Self {
        let genesis = Block::genesis();
        let genesis_hash = genesis.hash;
        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);
        Self {
            blocks,
            genesis_hash,
        }
    }

    pub fn genesis_hash(&self) -> BlockHash {
        self.genesis_hash
    }

    pub fn insert(&mut self, block: Block) {
        self.blocks.insert(block.hash, block);
    }

    pub fn get(&self, hash: &BlockHash) -> Option<&Block> {
        self.blocks.get(hash)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Whether `descendant` reaches `ancestor` by following parent links.
    /// A block extends itself.
    pub fn extends(&self, descendant: &BlockHash, ancestor: &BlockHash) -> bool {
        let mut current = *descendant;
        loop {
            if current == *ancestor {
                return true;
            }
            match self.get(&current) {
                Some(block) if !block.is_genesis() => current = block.parent_hash,
                _ => return false,
            }
        }
    }
}

impl Default for BlockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain_of(store: &mut BlockStore, len: u64) -> Vec<Block> {
        let mut parent = store.genesis_hash();
        let mut out = Vec::new();
        for i in 1..=len {
            let block = Block::new(parent, i, i, i % 4, i);
            parent = block.hash;
            store.insert(block.clone());
            out.push(block);
        }
        out
    }

    #[test]
    fn test_block_hash_deterministic() {
        let a = Block::new(BlockHash::zero(), 1, 1, 2, 7);
        let b = Block::new(BlockHash::zero(), 1, 1, 2, 7);
        assert_eq!(a.hash, b.hash);

        let c = Block::new(BlockHash::zero(), 1, 1, 2, 8);
        assert_ne!(a.hash, c.hash);
    }

    #[test]
    fn test_serde_round_trip_preserves_hash() {
        let block = Block::new(BlockHash::zero(), 3, 3, 1, 3);
        let json = serde_json::to_string(&block).unwrap();
        let back: Block = serde_json::from_str(&json).unwrap();
        assert_eq!(block, back);
        assert_eq!(block.hash, back.hash);
    }

    #[test]
    fn test_extends_walks_parent_links() {
        let mut store = BlockStore::new();
        let chain = chain_of(&mut store, 3);

        assert!(store.extends(&chain[2].hash, &chain[0].hash));
        assert!(store.extends(&chain[2].hash, &store.genesis_hash()));
        assert!(store.extends(&chain[1].hash, &chain[1].hash));
        assert!(!store.extends(&chain[0].hash, &chain[2].hash));
    }

}
