use std::{
    io,
    sync::atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;

use crate::{BlockKey, Result};

use super::Adapter;

/// A block device kept entirely in memory. Blocks never written read as zeros.
#[derive(Debug)]
pub struct MemDisk {
    blocks: DashMap<BlockKey, Box<[u8]>>,
    block_size: usize,
    /// Blocks per device; addresses at or past this fail like a read past EOF.
    limit: Option<u32>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemDisk {
    pub fn new(block_size: usize) -> Self {
        Self {
            blocks: Default::default(),
            block_size,
            limit: None,
            reads: Default::default(),
            writes: Default::default(),
        }
    }

    pub fn with_limit(block_size: usize, blocks_per_device: u32) -> Self {
        Self {
            limit: Some(blocks_per_device),
            ..Self::new(block_size)
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// The persisted contents of a block, if it was ever written.
    pub fn block(&self, key: BlockKey) -> Option<Box<[u8]>> {
        self.blocks.get(&key).map(|b| b.clone())
    }

    fn check(&self, key: BlockKey, len: usize) -> Result<()> {
        if len != self.block_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("transfer of {} bytes, block size is {}", len, self.block_size),
            )
            .into());
        }
        match self.limit {
            Some(limit) if key.block >= limit => Err(io::ErrorKind::UnexpectedEof.into()),
            _ => Ok(()),
        }
    }
}

impl Adapter for MemDisk {
    fn read(&self, key: BlockKey, buf: &mut [u8]) -> Result<()> {
        self.check(key, buf.len())?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        match self.blocks.get(&key) {
            Some(block) => buf.copy_from_slice(&block),
            None => buf.fill(0),
        }
        Ok(())
    }

    fn write(&self, key: BlockKey, buf: &[u8]) -> Result<()> {
        self.check(key, buf.len())?;
        self.writes.fetch_add(1, Ordering::Relaxed);

        self.blocks.insert(key, buf.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{BlockKey, ErrorKind};

    use super::{Adapter, MemDisk};

    #[test]
    fn unwritten_blocks_read_as_zero() {
        let disk = MemDisk::new(16);
        let mut buf = [0xffu8; 16];
        disk.read(BlockKey::new(0, 3), &mut buf).unwrap();
        assert_eq!(buf, [0; 16]);
        assert_eq!(disk.reads(), 1);
    }

    #[test]
    fn writes_persist_per_device() {
        let disk = MemDisk::new(4);
        disk.write(BlockKey::new(1, 2), &[1, 2, 3, 4]).unwrap();

        let mut buf = [0u8; 4];
        disk.read(BlockKey::new(1, 2), &mut buf).unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
        disk.read(BlockKey::new(0, 2), &mut buf).unwrap();
        assert_eq!(buf, [0; 4]);
        assert_eq!(disk.writes(), 1);
    }

    #[test]
    fn limit_and_size_are_enforced() {
        let disk = MemDisk::with_limit(4, 8);
        let mut buf = [0u8; 4];

        let err = disk.read(BlockKey::new(0, 8), &mut buf).unwrap_err();
        match err.kind() {
            ErrorKind::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::UnexpectedEof),
            kind => panic!("unexpected error {:?}", kind),
        }

        assert!(disk.write(BlockKey::new(0, 1), &[0; 3]).is_err());
        assert_eq!(disk.writes(), 0);
    }
}
