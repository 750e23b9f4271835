//! FAT volume access through `embedded-sdmmc`

use core::cell::RefCell;

use embedded_sdmmc::{Block, BlockCount, BlockDevice, BlockIdx};

use crate::bus::{self, Error};
use crate::SD;

pub struct SDBlockDevice<BUS> {
    sd: RefCell<SD<BUS>>,
}

impl<BUS> SD<BUS>
where
    BUS: bus::Read + bus::Write + bus::Bus,
{
    pub fn into_block_device(self) -> SDBlockDevice<BUS> {
        SDBlockDevice { sd: RefCell::new(self) }
    }
}

impl<BUS> SDBlockDevice<BUS> {
    pub fn into_inner(self) -> SD<BUS> {
        self.sd.into_inner()
    }
}

fn block_index(start: BlockIdx, offset: usize) -> Result<u32, Error> {
    let offset = u32::try_from(offset).map_err(|_| Error::OutOfRange)?;
    start.0.checked_add(offset).ok_or(Error::OutOfRange)
}

impl<BUS> BlockDevice for SDBlockDevice<BUS>
where
    BUS: bus::Read + bus::Write + bus::Bus,
{
    type Error = Error;

    fn read(
        &self,
        blocks: &mut [Block],
        start_block_idx: BlockIdx,
        reason: &str,
    ) -> Result<(), Error> {
        trace!("Read {} blocks from {} for {}", blocks.len(), start_block_idx.0, reason);
        let mut sd = self.sd.borrow_mut();
        for (i, block) in blocks.iter_mut().enumerate() {
            sd.read(block_index(start_block_idx, i)?, &mut block.contents)?;
        }
        Ok(())
    }

    fn write(&self, blocks: &[Block], start_block_idx: BlockIdx) -> Result<(), Error> {
        let mut sd = self.sd.borrow_mut();
        for (i, block) in blocks.iter().enumerate() {
            sd.write(block_index(start_block_idx, i)?, &block.contents)?;
        }
        Ok(())
    }

    fn num_blocks(&self) -> Result<BlockCount, Error> {
        let sd = self.sd.borrow();
        match sd.card().class.ready() {
            true => Ok(BlockCount(sd.num_blocks())),
            false => Err(Error::Uninitialized),
        }
    }
}
