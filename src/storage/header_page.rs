use crate::common::PageId;

const ROOT_PAGE_ID_OFFSET: usize = 0;
const ALLOCATE_COUNT_OFFSET: usize = 4;
const AUX_OFFSET: usize = 8;

/// Read-only view over page 0's layout: `{root_page_id: i32, allocate_count:
/// i32, aux: i64}`. `root_page_id` belongs to the B+ tree index,
/// `allocate_count` to the buffer pool manager's page allocator, and `aux`
/// is reserved for collaborators to stash their own bookkeeping without
/// colliding with either.
pub struct HeaderPageView<'a> {
    bytes: &'a [u8],
}

impl<'a> HeaderPageView<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    pub fn root_page_id(&self) -> PageId {
        PageId::new(read_i32(self.bytes, ROOT_PAGE_ID_OFFSET))
    }

    pub fn allocate_count(&self) -> i32 {
        read_i32(self.bytes, ALLOCATE_COUNT_OFFSET)
    }

    pub fn aux(&self) -> i64 {
        read_i64(self.bytes, AUX_OFFSET)
    }
}

/// Mutable view over page 0, see [`HeaderPageView`].
pub struct HeaderPageMut<'a> {
    bytes: &'a mut [u8],
}

impl<'a> HeaderPageMut<'a> {
    pub fn new(bytes: &'a mut [u8]) -> Self {
        Self { bytes }
    }

    pub fn root_page_id(&self) -> PageId {
        PageId::new(read_i32(self.bytes, ROOT_PAGE_ID_OFFSET))
    }

    pub fn set_root_page_id(&mut self, page_id: PageId) {
        write_i32(self.bytes, ROOT_PAGE_ID_OFFSET, page_id.as_i32());
    }

    pub fn allocate_count(&self) -> i32 {
        read_i32(self.bytes, ALLOCATE_COUNT_OFFSET)
    }

    pub fn set_allocate_count(&mut self, count: i32) {
        write_i32(self.bytes, ALLOCATE_COUNT_OFFSET, count);
    }

    pub fn aux(&self) -> i64 {
        read_i64(self.bytes, AUX_OFFSET)
    }

    pub fn set_aux(&mut self, value: i64) {
        write_i64(self.bytes, AUX_OFFSET, value);
    }

    /// Initializes a freshly allocated header page: no root, no pages
    /// allocated yet, aux cleared.
    pub fn init(&mut self) {
        self.set_root_page_id(PageId::INVALID);
        self.set_allocate_count(0);
        self.set_aux(0);
    }
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

fn write_i32(bytes: &mut [u8], offset: usize, value: i32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

fn write_i64(bytes: &mut [u8], offset: usize, value: i64) {
    bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PAGE_SIZE;

    #[test]
    fn init_then_round_trip_fields() {
        let mut data = [0u8; PAGE_SIZE];
        HeaderPageMut::new(&mut data).init();

        {
            let mut header = HeaderPageMut::new(&mut data);
            header.set_root_page_id(PageId::new(7));
            header.set_allocate_count(12);
            header.set_aux(-99);
        }

        let view = HeaderPageView::new(&data);
        assert_eq!(view.root_page_id(), PageId::new(7));
        assert_eq!(view.allocate_count(), 12);
        assert_eq!(view.aux(), -99);
    }

    #[test]
    fn fields_do_not_overlap() {
        let mut data = [0u8; PAGE_SIZE];
        let mut header = HeaderPageMut::new(&mut data);
        header.init();
        header.set_allocate_count(5);
        header.set_root_page_id(PageId::new(3));

        assert_eq!(header.allocate_count(), 5);
        assert_eq!(header.root_page_id(), PageId::new(3));
    }
}
