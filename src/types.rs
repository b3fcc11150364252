use std::fmt;

/// Address of one device block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockKey {
    pub dev: u32,
    pub block: u32,
}

impl BlockKey {
    pub const fn new(dev: u32, block: u32) -> Self {
        Self { dev, block }
    }

    pub const fn from_u64(v: u64) -> Self {
        Self {
            dev: (v >> 32) as u32,
            block: v as u32,
        }
    }

    pub const fn to_u64(self) -> u64 {
        (self.dev as u64) << 32 | self.block as u64
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.block)
    }
}
