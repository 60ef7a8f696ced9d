use crate::common::{PageId, PAGE_SIZE};

const SIZE_OFFSET: usize = 0;
const NEXT_PAGE_OFFSET: usize = 4;
const HEADER_SIZE: usize = 8;

/// [`super::TuplePage`] plus a `next_page_id`, for chaining several pages
/// of `T` into a linked list.
pub struct LinkedTuplePage<'a, T: Copy> {
    data: &'a mut [u8],
    _marker: std::marker::PhantomData<T>,
}

impl<'a, T: Copy> LinkedTuplePage<'a, T> {
    pub fn capacity() -> usize {
        (PAGE_SIZE - HEADER_SIZE) / std::mem::size_of::<T>()
    }

    pub fn new(data: &'a mut [u8]) -> Self {
        assert!(
            Self::capacity() > 0,
            "T is too large to fit at least one element in a page"
        );
        Self {
            data,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn init(&mut self) {
        self.set_size(0);
        self.set_next_page_id(PageId::INVALID);
    }

    pub fn size(&self) -> usize {
        i32::from_le_bytes(self.data[SIZE_OFFSET..SIZE_OFFSET + 4].try_into().unwrap()) as usize
    }

    fn set_size(&mut self, size: usize) {
        self.data[SIZE_OFFSET..SIZE_OFFSET + 4].copy_from_slice(&(size as i32).to_le_bytes());
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(i32::from_le_bytes(
            self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4]
                .try_into()
                .unwrap(),
        ))
    }

    pub fn set_next_page_id(&mut self, page_id: PageId) {
        self.data[NEXT_PAGE_OFFSET..NEXT_PAGE_OFFSET + 4]
            .copy_from_slice(&page_id.as_i32().to_le_bytes());
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        self.size() >= Self::capacity()
    }

    fn offset_of(index: usize) -> usize {
        HEADER_SIZE + index * std::mem::size_of::<T>()
    }

    pub fn get(&self, index: usize) -> T {
        assert!(index < self.size(), "linked tuple page index out of bounds");
        let offset = Self::offset_of(index);
        unsafe {
            (self.data[offset..offset + std::mem::size_of::<T>()].as_ptr() as *const T)
                .read_unaligned()
        }
    }

    pub fn append(&mut self, value: T) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let index = self.size();
        let offset = Self::offset_of(index);
        unsafe {
            (self.data[offset..offset + std::mem::size_of::<T>()].as_mut_ptr() as *mut T)
                .write_unaligned(value);
        }
        self.set_size(index + 1);
        Some(index)
    }
}
