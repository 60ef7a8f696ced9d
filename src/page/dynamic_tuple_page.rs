use crate::common::PAGE_SIZE;

const CURSOR_OFFSET: usize = 0;
const HEADER_SIZE: usize = 4;
const REGION_SIZE: usize = PAGE_SIZE - HEADER_SIZE;
const LENGTH_PREFIX_SIZE: usize = 2;

/// Variable-length byte blob arena overlaid on a page: `{cursor: i32,
/// data[PAGE_SIZE - 4]}`. Each append writes a 2-byte length prefix
/// followed by the bytes and returns the offset into the data region,
/// which the caller keeps as a record pointer to read it back later.
pub struct DynamicTuplePage<'a> {
    data: &'a mut [u8],
}

impl<'a> DynamicTuplePage<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    pub fn init(&mut self) {
        self.set_cursor(0);
    }

    fn cursor(&self) -> usize {
        i32::from_le_bytes(self.data[CURSOR_OFFSET..CURSOR_OFFSET + 4].try_into().unwrap()) as usize
    }

    fn set_cursor(&mut self, cursor: usize) {
        self.data[CURSOR_OFFSET..CURSOR_OFFSET + 4].copy_from_slice(&(cursor as i32).to_le_bytes());
    }

    pub fn remaining_bytes(&self) -> usize {
        REGION_SIZE - self.cursor()
    }

    /// Appends `bytes`, returning the record pointer to read it back with
    /// [`Self::get`]. Returns `None` if the page has no room.
    pub fn append(&mut self, bytes: &[u8]) -> Option<u32> {
        let needed = LENGTH_PREFIX_SIZE + bytes.len();
        if needed > self.remaining_bytes() {
            return None;
        }

        let record_offset = self.cursor();
        let region_start = HEADER_SIZE + record_offset;
        self.data[region_start..region_start + LENGTH_PREFIX_SIZE]
            .copy_from_slice(&(bytes.len() as u16).to_le_bytes());
        let payload_start = region_start + LENGTH_PREFIX_SIZE;
        self.data[payload_start..payload_start + bytes.len()].copy_from_slice(bytes);

        self.set_cursor(record_offset + needed);
        Some(record_offset as u32)
    }

    /// Reads back the bytes written at `record_offset`.
    pub fn get(&self, record_offset: u32) -> &[u8] {
        let region_start = HEADER_SIZE + record_offset as usize;
        let len = u16::from_le_bytes(
            self.data[region_start..region_start + LENGTH_PREFIX_SIZE]
                .try_into()
                .unwrap(),
        ) as usize;
        let payload_start = region_start + LENGTH_PREFIX_SIZE;
        &self.data[payload_start..payload_start + len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_get_round_trips_variable_length_records() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = DynamicTuplePage::new(&mut data);
        page.init();

        let first = page.append(b"hello").unwrap();
        let second = page.append(b"a longer record").unwrap();

        assert_eq!(page.get(first), b"hello");
        assert_eq!(page.get(second), b"a longer record");
    }

    #[test]
    fn append_fails_once_region_is_exhausted() {
        let mut data = [0u8; PAGE_SIZE];
        let mut page = DynamicTuplePage::new(&mut data);
        page.init();

        let chunk = vec![0u8; 1000];
        while page.append(&chunk).is_some() {}
        assert!(page.append(&chunk).is_none());
    }
}
