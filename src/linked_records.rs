//! Singly-linked chains of fixed-size rows, independent of any hash table
//! (§4.6). Each row is `[next: u32][payload: ROW_SIZE]`; `next == u32::MAX`
//! terminates a chain. Grounded on
//! `original_source/include/bitcoin/blockchain/database/linked_records.hpp`.
use crate::error::Result;
use crate::mmfile::Mmfile;
use crate::record_allocator::RecordAllocator;

pub const EMPTY: u32 = u32::MAX;
const NEXT_SIZE: usize = std::mem::size_of::<u32>();

pub struct LinkedRecords {
    records: RecordAllocator,
    payload_size: usize,
}

impl LinkedRecords {
    pub fn new(start: usize, payload_size: usize) -> Self {
        Self {
            records: RecordAllocator::new(start, NEXT_SIZE + payload_size),
            payload_size,
        }
    }

    pub fn create(&mut self, file: &mut Mmfile) -> Result<()> {
        self.records.create(file)
    }

    pub fn start(&mut self, file: &Mmfile) -> Result<()> {
        self.records.start(file)
    }

    /// Prepend a new row in front of `previous_head`, returning the new
    /// head's record index.
    pub fn insert(&mut self, file: &mut Mmfile, previous_head: u32, payload: &[u8]) -> Result<u32> {
        debug_assert_eq!(payload.len(), self.payload_size);
        let index = self.records.allocate(file)?;
        let row = self.records.get_mut(file, index);
        row[..NEXT_SIZE].copy_from_slice(&previous_head.to_le_bytes());
        row[NEXT_SIZE..].copy_from_slice(payload);
        Ok(index)
    }

    pub fn payload(&self, file: &Mmfile, record: u32) -> &[u8] {
        &self.records.get(file, record)[NEXT_SIZE..]
    }

    pub fn next(&self, file: &Mmfile, record: u32) -> u32 {
        let row = self.records.get(file, record);
        u32::from_le_bytes(row[..NEXT_SIZE].try_into().unwrap())
    }

    /// Iterate a chain starting at `head` (inclusive), oldest-inserted last.
    pub fn iter<'a>(&'a self, file: &'a Mmfile, head: u32) -> ChainIter<'a> {
        ChainIter {
            records: self,
            file,
            current: head,
        }
    }

    pub fn sync(&self, file: &mut Mmfile) -> Result<()> {
        self.records.sync(file)
    }
}

pub struct ChainIter<'a> {
    records: &'a LinkedRecords,
    file: &'a Mmfile,
    current: u32,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = (u32, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        if self.current == EMPTY {
            return None;
        }
        let record = self.current;
        let payload = self.records.payload(self.file, record);
        self.current = self.records.next(self.file, record);
        Some((record, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_iterates_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = Mmfile::open(dir.path().join("links")).unwrap();
        let mut links = LinkedRecords::new(0, 4);
        links.create(&mut file).unwrap();

        let r0 = links.insert(&mut file, EMPTY, b"one!").unwrap();
        let r1 = links.insert(&mut file, r0, b"two!").unwrap();

        let collected: Vec<_> = links.iter(&file, r1).map(|(_, p)| p.to_vec()).collect();
        assert_eq!(collected, vec![b"two!".to_vec(), b"one!".to_vec()]);
    }

    #[test]
    fn empty_head_iterates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = Mmfile::open(dir.path().join("links")).unwrap();
        let mut links = LinkedRecords::new(0, 4);
        links.create(&mut file).unwrap();
        assert_eq!(links.iter(&file, EMPTY).count(), 0);
    }
}
